use crate::types::ChatMessage;

/// Title of a conversation that has not been named yet.
pub const SENTINEL_TITLE: &str = "New Chat";

/// Title reported for a conversation whose document could not be read.
pub const ERROR_TITLE: &str = "Error Loading Chat";

/// Title used when a document has a `messages` field but no `title`.
pub const UNTITLED_TITLE: &str = "Untitled Chat";

/// Title used when title generation fails or produces nothing.
pub const FALLBACK_TITLE: &str = "Chat";

/// A titled, ordered sequence of messages stored under one identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    /// Storage key; never changes once created.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Messages in chronological order.
    pub messages: Vec<ChatMessage>,
    /// Set when the stored document exists but could not be read; `messages` is then empty
    /// and must not be written back.
    pub unreadable: bool,
}

impl Conversation {
    /// Create a conversation from its parts.
    pub fn new(id: impl Into<String>, title: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            messages,
            unreadable: false,
        }
    }

    /// A placeholder for a conversation whose document could not be read.
    pub fn unreadable(id: impl Into<String>) -> Self {
        Self {
            unreadable: true,
            ..Self::new(id, ERROR_TITLE, Vec::new())
        }
    }

    /// Returns true while the conversation still carries the placeholder title.
    pub fn has_sentinel_title(&self) -> bool {
        self.title == SENTINEL_TITLE
    }

    /// The most recent message, if any.
    pub fn last_message(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }
}

/// An entry in the conversation listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSummary {
    /// Storage key of the conversation.
    pub id: String,
    /// Title to display for it.
    pub title: String,
}

impl ChatSummary {
    /// Create a new summary.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

/// Derive a display label from a conversation id, e.g. `chat_20240101_120000` becomes
/// `chat 20240101 120000`.
pub fn fallback_title(id: &str) -> String {
    id.replace('_', " ")
}
