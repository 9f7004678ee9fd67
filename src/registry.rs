use std::sync::Arc;

use crate::error::{Error, Result};
use crate::storage::ChatStore;
use crate::types::ChatSummary;

/// What to open when a session starts without an active conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultChat {
    /// Open the newest existing conversation.
    Existing(String),
    /// No conversations exist; create one.
    CreateNew,
}

/// Read-side view of the stored conversations.
#[derive(Clone)]
pub struct ChatRegistry {
    store: Arc<dyn ChatStore>,
}

impl ChatRegistry {
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self { store }
    }

    /// Conversations with display titles, newest first.
    pub fn list(&self) -> Result<Vec<ChatSummary>> {
        self.store.list()
    }

    /// Pick the conversation a fresh session should open.
    pub fn default_chat(&self) -> Result<DefaultChat> {
        Ok(match self.list()?.into_iter().next() {
            Some(summary) => DefaultChat::Existing(summary.id),
            None => DefaultChat::CreateNew,
        })
    }

    /// Resolve a user-supplied reference to a conversation id.
    ///
    /// A number is a 1-based position in [`ChatRegistry::list`]; anything else must be the id
    /// of a listed conversation.
    pub fn resolve(&self, reference: &str) -> Result<String> {
        let reference = reference.trim();
        let chats = self.list()?;
        if let Ok(index) = reference.parse::<usize>() {
            return index
                .checked_sub(1)
                .and_then(|idx| chats.get(idx))
                .map(|summary| summary.id.clone())
                .ok_or_else(|| {
                    Error::validation(
                        format!("no conversation at position {index}"),
                        Some("index".to_string()),
                    )
                });
        }
        chats
            .into_iter()
            .find(|summary| summary.id == reference)
            .map(|summary| summary.id)
            .ok_or_else(|| Error::not_found(format!("no conversation with id {reference}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FileStore;

    fn registry() -> (tempfile::TempDir, Arc<FileStore>, ChatRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileStore::open(dir.path(), "Hello!").unwrap());
        let registry = ChatRegistry::new(store.clone());
        (dir, store, registry)
    }

    #[test]
    fn empty_store_asks_for_new_chat() {
        let (_dir, _store, registry) = registry();
        assert_eq!(registry.default_chat().unwrap(), DefaultChat::CreateNew);
    }

    #[test]
    fn newest_chat_is_default() {
        let (_dir, store, registry) = registry();
        let _older = store.create("New Chat").unwrap();
        let newer = store.create("New Chat").unwrap();
        assert_eq!(registry.default_chat().unwrap(), DefaultChat::Existing(newer));
    }

    #[test]
    fn resolve_by_position_and_id() {
        let (_dir, store, registry) = registry();
        let older = store.create("New Chat").unwrap();
        let newer = store.create("New Chat").unwrap();
        assert_eq!(registry.resolve("1").unwrap(), newer);
        assert_eq!(registry.resolve(" 2 ").unwrap(), older);
        assert_eq!(registry.resolve(&older).unwrap(), older);
        assert!(registry.resolve("0").unwrap_err().is_validation());
        assert!(registry.resolve("3").unwrap_err().is_validation());
        assert!(registry.resolve("chat_missing").is_err());
    }
}
