//! Durable storage for conversations.
//!
//! Each conversation lives in its own JSON document named `<id>.json` inside a chat
//! directory.  A document is an object with a `title` and a `messages` array; older documents
//! that are a bare array of messages are still read.  Reads never fail for missing or corrupt
//! documents: they degrade to placeholder titles so that one bad file cannot hide the others.
//! Writes go to a temporary sibling that is synced to disk and renamed over the document, so a
//! reader never sees a partially written file.  A document that exists but cannot be parsed is
//! never overwritten.

use std::fs::{self, File};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::{Map, Value};
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::observability::{
    STORE_CORRUPT_DOCUMENTS, STORE_CREATES, STORE_DELETES, STORE_SAVES, STORE_WRITE_ERRORS,
};
use crate::types::{
    ChatMessage, ChatSummary, Conversation, SENTINEL_TITLE, UNTITLED_TITLE,
    fallback_title,
};

/// File extension of conversation documents.
const DOCUMENT_EXTENSION: &str = "json";

/// Base title used by `save` when there is no prior document to inherit one from.
const UNSAVED_TITLE: &str = "Chat";

/// Base title used by `save` when the prior document is a bare message array.
const LEGACY_TITLE: &str = "Legacy Chat";

/// Durable CRUD over conversation documents.
///
/// Implementations must be safe to share between tasks; the session controller guarantees
/// that saves for one conversation never overlap.
pub trait ChatStore: Send + Sync {
    /// Enumerate stored conversations, newest first.
    ///
    /// Unreadable documents are listed with a title derived from their id.
    fn list(&self) -> Result<Vec<ChatSummary>>;

    /// Create a conversation containing only the seed message and return its id.
    fn create(&self, initial_title: &str) -> Result<String>;

    /// Load a conversation.
    ///
    /// A missing document yields the sentinel title and no messages; an unreadable one
    /// yields [`Conversation::unreadable`].
    fn load(&self, id: &str) -> Conversation;

    /// Replace the stored messages of `id`, keeping the stored title unless `new_title` is
    /// given, and return the title now stored.
    ///
    /// A document that exists but cannot be read or parsed is never overwritten: saving over
    /// it is a storage error, so the messages it holds are not lost.
    fn save(&self, id: &str, messages: &[ChatMessage], new_title: Option<&str>) -> Result<String>;

    /// Remove a conversation.  Removing one that does not exist succeeds.
    fn delete(&self, id: &str) -> Result<()>;
}

/// A [`ChatStore`] keeping one JSON file per conversation in a directory.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    seed_message: String,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>, seed_message: impl Into<String>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|err| {
            Error::storage(
                format!("failed to create chat directory {}", dir.display()),
                None,
                Some(err),
            )
        })?;
        Ok(Self {
            dir,
            seed_message: seed_message.into(),
            write_lock: Mutex::new(()),
        })
    }

    /// The directory documents are stored in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn document_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.{DOCUMENT_EXTENSION}"))
    }

    fn read_document(&self, id: &str) -> io::Result<Option<Value>> {
        let path = self.document_path(id);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err),
        };
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|err| io::Error::new(ErrorKind::InvalidData, err))
    }

    fn write_document(&self, id: &str, document: &Value) -> Result<()> {
        let mut contents = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut contents, formatter);
        serde::Serialize::serialize(document, &mut serializer)?;
        contents.push(b'\n');

        let path = self.document_path(id);
        let tmp = path.with_extension(format!("{DOCUMENT_EXTENSION}.tmp"));
        let result = write_synced(&tmp, &contents).and_then(|()| fs::rename(&tmp, &path));
        if let Err(err) = result {
            STORE_WRITE_ERRORS.click();
            let _ = fs::remove_file(&tmp);
            return Err(Error::storage(
                "failed to write chat document",
                Some(id.to_string()),
                Some(err),
            ));
        }
        if let Err(err) = File::open(&self.dir).and_then(|dir| dir.sync_all()) {
            debug!(error = %err, "could not sync chat directory");
        }
        Ok(())
    }

    fn next_id(&self) -> Result<String> {
        let now = OffsetDateTime::now_utc();
        let stamp = now
            .format(format_description!(
                "[year][month][day]_[hour][minute][second]_[subsecond digits:6]"
            ))
            .map_err(|err| {
                Error::storage(format!("failed to format chat id: {err}"), None, None)
            })?;
        let base = format!("chat_{stamp}");
        let mut id = base.clone();
        let mut suffix = 1;
        while self.document_path(&id).exists() {
            id = format!("{base}_{suffix}");
            suffix += 1;
        }
        Ok(id)
    }
}

impl ChatStore for FileStore {
    fn list(&self) -> Result<Vec<ChatSummary>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(Error::storage(
                    format!("failed to read chat directory {}", self.dir.display()),
                    None,
                    Some(err),
                ));
            }
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(error = %err, "skipping unreadable directory entry");
                    continue;
                }
            };
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(DOCUMENT_EXTENSION) {
                continue;
            }
            if let Some(id) = path.file_stem().and_then(|stem| stem.to_str()) {
                if validate_id(id).is_ok() {
                    ids.push(id.to_string());
                }
            }
        }
        ids.sort_unstable_by(|a, b| b.cmp(a));

        let summaries = ids
            .into_iter()
            .map(|id| {
                let title = match self.read_document(&id) {
                    Ok(Some(Value::Object(map))) => map
                        .get("title")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| fallback_title(&id)),
                    Ok(Some(Value::Array(_))) | Ok(None) => fallback_title(&id),
                    Ok(Some(_)) => {
                        STORE_CORRUPT_DOCUMENTS.click();
                        warn!(chat_id = %id, "chat document is not an object");
                        fallback_title(&id)
                    }
                    Err(err) => {
                        STORE_CORRUPT_DOCUMENTS.click();
                        warn!(chat_id = %id, error = %err, "unreadable chat document");
                        fallback_title(&id)
                    }
                };
                ChatSummary::new(id, title)
            })
            .collect();
        Ok(summaries)
    }

    fn create(&self, initial_title: &str) -> Result<String> {
        let _guard = self.write_lock.lock().unwrap_or_else(|poison| poison.into_inner());
        let id = self.next_id()?;
        let mut document = Map::new();
        document.insert("title".to_string(), Value::from(initial_title));
        document.insert(
            "messages".to_string(),
            serde_json::to_value(vec![ChatMessage::assistant(self.seed_message.as_str())])?,
        );
        self.write_document(&id, &Value::Object(document))?;
        STORE_CREATES.click();
        debug!(chat_id = %id, "created chat");
        Ok(id)
    }

    fn load(&self, id: &str) -> Conversation {
        if let Err(err) = validate_id(id) {
            warn!(chat_id = %id, error = %err, "refusing to load chat with invalid id");
            return Conversation::new(id, SENTINEL_TITLE, Vec::new());
        }
        let document = match self.read_document(id) {
            Ok(Some(document)) => document,
            Ok(None) => return Conversation::new(id, SENTINEL_TITLE, Vec::new()),
            Err(err) => {
                STORE_CORRUPT_DOCUMENTS.click();
                warn!(chat_id = %id, error = %err, "failed to load chat");
                return Conversation::unreadable(id);
            }
        };
        match parse_document(id, document) {
            Ok(conversation) => conversation,
            Err(err) => {
                STORE_CORRUPT_DOCUMENTS.click();
                warn!(chat_id = %id, error = %err, "malformed chat document");
                Conversation::unreadable(id)
            }
        }
    }

    fn save(&self, id: &str, messages: &[ChatMessage], new_title: Option<&str>) -> Result<String> {
        validate_id(id)?;
        let _guard = self.write_lock.lock().unwrap_or_else(|poison| poison.into_inner());
        let prior = self.read_document(id).map_err(|err| {
            Error::storage(
                "refusing to overwrite unreadable chat document",
                Some(id.to_string()),
                Some(err),
            )
        })?;
        let mut document = match prior {
            Some(document) => {
                parse_document(id, document.clone()).map_err(|err| {
                    Error::storage(
                        format!("refusing to overwrite malformed chat document: {err}"),
                        Some(id.to_string()),
                        None,
                    )
                })?;
                match document {
                    Value::Object(map) => map,
                    _ => {
                        let mut map = Map::new();
                        map.insert("title".to_string(), Value::from(LEGACY_TITLE));
                        map
                    }
                }
            }
            None => {
                let mut map = Map::new();
                map.insert("title".to_string(), Value::from(UNSAVED_TITLE));
                map
            }
        };
        document.insert("messages".to_string(), serde_json::to_value(messages)?);
        if let Some(title) = new_title {
            document.insert("title".to_string(), Value::from(title));
        }
        let title = document
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or(UNTITLED_TITLE)
            .to_string();
        self.write_document(id, &Value::Object(document))?;
        STORE_SAVES.click();
        debug!(chat_id = %id, messages = messages.len(), "saved chat");
        Ok(title)
    }

    fn delete(&self, id: &str) -> Result<()> {
        validate_id(id)?;
        match fs::remove_file(self.document_path(id)) {
            Ok(()) => {
                STORE_DELETES.click();
                debug!(chat_id = %id, "deleted chat");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Error::storage(
                "failed to delete chat document",
                Some(id.to_string()),
                Some(err),
            )),
        }
    }
}

/// Write `contents` to `path` and flush it to disk before returning.
fn write_synced(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

/// Interpret a stored document, accepting both the object form and the legacy bare array.
fn parse_document(id: &str, document: Value) -> Result<Conversation> {
    match document {
        Value::Array(_) => {
            let messages: Vec<ChatMessage> = serde_json::from_value(document)?;
            Ok(Conversation::new(id, fallback_title(id), messages))
        }
        Value::Object(mut map) => {
            let title = map
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or(UNTITLED_TITLE)
                .to_string();
            let messages = match map.remove("messages") {
                Some(Value::Null) | None => Vec::new(),
                Some(messages) => serde_json::from_value(messages)?,
            };
            Ok(Conversation::new(id, title, messages))
        }
        _ => Err(Error::validation(
            "chat document is neither an object nor an array",
            Some(id.to_string()),
        )),
    }
}

/// Check that `id` is safe to use as a file name: non-empty and made only of ASCII
/// alphanumerics, `-` and `_`.
pub fn validate_id(id: &str) -> Result<()> {
    if !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        Ok(())
    } else {
        Err(Error::validation(
            format!("invalid chat id {id:?}"),
            Some("id".to_string()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ERROR_TITLE;

    const SEED: &str = "Hello! I'm your test assistant.";

    fn store() -> (tempfile::TempDir, FileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("chats"), SEED).unwrap();
        (dir, store)
    }

    #[test]
    fn create_writes_seed_message() {
        let (_dir, store) = store();
        let id = store.create(SENTINEL_TITLE).unwrap();
        assert!(id.starts_with("chat_"));
        let conversation = store.load(&id);
        assert_eq!(conversation.title, SENTINEL_TITLE);
        assert_eq!(conversation.messages, vec![ChatMessage::assistant(SEED)]);
    }

    #[test]
    fn create_allocates_unique_ids() {
        let (_dir, store) = store();
        let mut ids: Vec<String> = (0..5).map(|_| store.create(SENTINEL_TITLE).unwrap()).collect();
        let count = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), count);
    }

    #[test]
    fn save_then_load_round_trips() {
        let (_dir, store) = store();
        let id = store.create(SENTINEL_TITLE).unwrap();
        let messages = vec![
            ChatMessage::assistant(SEED),
            ChatMessage::user("Plan a trip to Kyoto"),
            ChatMessage::assistant("Sure, here's a plan..."),
        ];
        store.save(&id, &messages, Some("Kyoto Trip Plan")).unwrap();
        let conversation = store.load(&id);
        assert_eq!(conversation.title, "Kyoto Trip Plan");
        assert_eq!(conversation.messages, messages);
    }

    #[test]
    fn save_without_title_keeps_stored_title() {
        let (_dir, store) = store();
        let id = store.create(SENTINEL_TITLE).unwrap();
        store
            .save(&id, &[ChatMessage::user("one")], Some("Named"))
            .unwrap();
        store
            .save(&id, &[ChatMessage::user("one"), ChatMessage::assistant("two")], None)
            .unwrap();
        let conversation = store.load(&id);
        assert_eq!(conversation.title, "Named");
        assert_eq!(conversation.messages.len(), 2);
    }

    #[test]
    fn save_preserves_unknown_fields() {
        let (_dir, store) = store();
        fs::write(
            store.document_path("chat_extra"),
            r#"{"title": "Kept", "pinned": true, "messages": []}"#,
        )
        .unwrap();
        store
            .save("chat_extra", &[ChatMessage::user("hi")], None)
            .unwrap();
        let raw: Value =
            serde_json::from_str(&fs::read_to_string(store.document_path("chat_extra")).unwrap())
                .unwrap();
        assert_eq!(raw["pinned"], Value::Bool(true));
        assert_eq!(raw["title"], Value::from("Kept"));
    }

    #[test]
    fn save_without_prior_document_uses_base_title() {
        let (_dir, store) = store();
        store
            .save("chat_new", &[ChatMessage::user("hi")], None)
            .unwrap();
        assert_eq!(store.load("chat_new").title, UNSAVED_TITLE);
    }

    #[test]
    fn save_over_legacy_document_upgrades_it() {
        let (_dir, store) = store();
        fs::write(
            store.document_path("chat_old"),
            r#"[{"role": "user", "content": "hi"}]"#,
        )
        .unwrap();
        let stored_title = store
            .save(
                "chat_old",
                &[ChatMessage::user("hi"), ChatMessage::assistant("hello")],
                None,
            )
            .unwrap();
        assert_eq!(stored_title, LEGACY_TITLE);
        let conversation = store.load("chat_old");
        assert_eq!(conversation.title, LEGACY_TITLE);
        assert_eq!(conversation.messages.len(), 2);
    }

    #[test]
    fn save_reports_the_stored_title() {
        let (_dir, store) = store();
        let id = store.create(SENTINEL_TITLE).unwrap();
        assert_eq!(store.save(&id, &[], None).unwrap(), SENTINEL_TITLE);
        assert_eq!(store.save(&id, &[], Some("Named")).unwrap(), "Named");
        assert_eq!(store.save(&id, &[], None).unwrap(), "Named");
    }

    #[test]
    fn save_never_overwrites_unparseable_documents() {
        let (_dir, store) = store();
        let malformed = r#"{"title": "Trip", "messages": [
            {"role": "user", "content": "a"},
            {"role": "assistant", "content": "b"},
            {"role": "system", "content": "c"}
        ]}"#;
        fs::write(store.document_path("chat_old"), malformed).unwrap();
        fs::write(store.document_path("chat_bad"), "{ not json").unwrap();

        for (id, contents) in [("chat_old", malformed), ("chat_bad", "{ not json")] {
            let err = store
                .save(id, &[ChatMessage::user("hi")], Some("Other"))
                .unwrap_err();
            assert!(err.is_storage());
            assert_eq!(fs::read_to_string(store.document_path(id)).unwrap(), contents);
        }
    }

    #[test]
    fn save_leaves_no_temporary_file() {
        let (_dir, store) = store();
        let id = store.create(SENTINEL_TITLE).unwrap();
        store.save(&id, &[ChatMessage::user("hi")], None).unwrap();
        let leftovers: Vec<_> = fs::read_dir(store.dir())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn save_into_missing_directory_is_a_storage_error() {
        let (_dir, store) = store();
        let id = store.create(SENTINEL_TITLE).unwrap();
        fs::remove_dir_all(store.dir()).unwrap();
        let err = store
            .save(&id, &[ChatMessage::user("hi")], None)
            .unwrap_err();
        assert!(err.is_storage());
    }

    #[test]
    fn load_missing_returns_defaults() {
        let (_dir, store) = store();
        let conversation = store.load("chat_missing");
        assert_eq!(conversation.title, SENTINEL_TITLE);
        assert!(conversation.messages.is_empty());
    }

    #[test]
    fn load_legacy_array_uses_id_label() {
        let (_dir, store) = store();
        fs::write(
            store.document_path("chat_20240101_120000"),
            r#"[{"role": "user", "content": "hi"}, {"role": "assistant", "content": "hello"}]"#,
        )
        .unwrap();
        let conversation = store.load("chat_20240101_120000");
        assert_eq!(conversation.title, "chat 20240101 120000");
        assert_eq!(
            conversation.messages,
            vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")]
        );
    }

    #[test]
    fn load_object_without_title_is_untitled() {
        let (_dir, store) = store();
        fs::write(store.document_path("chat_nt"), r#"{"messages": []}"#).unwrap();
        assert_eq!(store.load("chat_nt").title, UNTITLED_TITLE);
    }

    #[test]
    fn load_corrupt_returns_error_title() {
        let (_dir, store) = store();
        fs::write(store.document_path("chat_bad"), "{ not json").unwrap();
        let conversation = store.load("chat_bad");
        assert_eq!(conversation.title, ERROR_TITLE);
        assert!(conversation.unreadable);
        assert!(conversation.messages.is_empty());
    }

    #[test]
    fn load_malformed_messages_returns_error_title() {
        let (_dir, store) = store();
        fs::write(
            store.document_path("chat_bad"),
            r#"{"title": "x", "messages": [{"role": "robot"}]}"#,
        )
        .unwrap();
        assert_eq!(store.load("chat_bad").title, ERROR_TITLE);
    }

    #[test]
    fn list_is_newest_first_and_tolerates_corruption() {
        let (_dir, store) = store();
        fs::write(
            store.document_path("chat_20240101_000000_000000"),
            r#"{"title": "Oldest", "messages": []}"#,
        )
        .unwrap();
        fs::write(
            store.document_path("chat_20240102_000000_000000"),
            "garbage",
        )
        .unwrap();
        fs::write(
            store.document_path("chat_20240103_000000_000000"),
            r#"[{"role": "user", "content": "legacy"}]"#,
        )
        .unwrap();
        fs::write(store.dir().join("notes.txt"), "ignored").unwrap();

        let listing = store.list().unwrap();
        assert_eq!(
            listing,
            vec![
                ChatSummary::new(
                    "chat_20240103_000000_000000",
                    "chat 20240103 000000 000000"
                ),
                ChatSummary::new(
                    "chat_20240102_000000_000000",
                    "chat 20240102 000000 000000"
                ),
                ChatSummary::new("chat_20240101_000000_000000", "Oldest"),
            ]
        );
    }

    #[test]
    fn list_of_missing_directory_is_empty() {
        let (_dir, store) = store();
        fs::remove_dir_all(store.dir()).unwrap();
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn delete_is_idempotent() {
        let (_dir, store) = store();
        let id = store.create(SENTINEL_TITLE).unwrap();
        store.delete(&id).unwrap();
        store.delete(&id).unwrap();
        assert!(store.list().unwrap().is_empty());
        assert_eq!(store.load(&id).title, SENTINEL_TITLE);
    }

    #[test]
    fn invalid_ids_are_rejected() {
        let (_dir, store) = store();
        assert!(validate_id("../etc/passwd").is_err());
        assert!(validate_id("").is_err());
        assert!(validate_id("chat_20240101_120000").is_ok());
        assert!(store.save("../escape", &[], None).unwrap_err().is_validation());
        assert!(store.delete("a/b").unwrap_err().is_validation());
    }
}
