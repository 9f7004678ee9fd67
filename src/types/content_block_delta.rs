use serde::{Deserialize, Serialize};

/// A text delta, representing a piece of text in a streaming response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextDelta {
    /// The text content.
    pub text: String,
}

/// A streaming update to a content block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlockDelta {
    /// A text delta.
    #[serde(rename = "text_delta")]
    TextDelta(TextDelta),

    /// Thinking, signature, tool-input and citation deltas.
    #[serde(other)]
    Other,
}

impl ContentBlockDelta {
    /// Create a text delta.
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlockDelta::TextDelta(TextDelta { text: text.into() })
    }

    /// The text carried by this delta, if it is a text delta.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlockDelta::TextDelta(delta) => Some(&delta.text),
            ContentBlockDelta::Other => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_delta_deserialization() {
        let delta: ContentBlockDelta =
            serde_json::from_value(json!({"type": "text_delta", "text": "Sure"})).unwrap();
        assert_eq!(delta.as_text(), Some("Sure"));
    }

    #[test]
    fn other_deltas_carry_no_text() {
        let delta: ContentBlockDelta = serde_json::from_value(
            json!({"type": "input_json_delta", "partial_json": "{\"a\""}),
        )
        .unwrap();
        assert_eq!(delta, ContentBlockDelta::Other);
        assert_eq!(delta.as_text(), None);
    }
}
