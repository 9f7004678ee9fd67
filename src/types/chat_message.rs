use serde::{Deserialize, Serialize};

/// Who authored a message.
///
/// Seed messages written when a conversation is created use `Assistant`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// User role.
    User,

    /// Assistant role.
    Assistant,
}

/// One entry in a conversation: a role and its text.
///
/// This is both the unit stored in conversation documents and the unit sent to the model as
/// history, so its JSON form is exactly `{"role": ..., "content": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The role of the message.
    pub role: MessageRole,

    /// The text of the message.
    pub content: String,
}

impl ChatMessage {
    /// Create a new `ChatMessage` with the given role and content.
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// Returns true if the user wrote this message.
    pub fn is_user(&self) -> bool {
        self.role == MessageRole::User
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, to_value};

    #[test]
    fn chat_message_serialization() {
        let message = ChatMessage::user("Plan a trip to Kyoto");
        assert_eq!(
            to_value(&message).unwrap(),
            json!({
                "role": "user",
                "content": "Plan a trip to Kyoto"
            })
        );
    }

    #[test]
    fn chat_message_ignores_extra_fields() {
        let message: ChatMessage = serde_json::from_value(json!({
            "role": "assistant",
            "content": "Hello!",
            "timestamp": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(message, ChatMessage::assistant("Hello!"));
    }

    #[test]
    fn unknown_role_is_rejected() {
        let result: Result<ChatMessage, _> = serde_json::from_value(json!({
            "role": "system",
            "content": "You are helpful."
        }));
        assert!(result.is_err());
    }
}
