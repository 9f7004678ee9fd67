use serde::{Deserialize, Serialize};

use crate::types::{StopReason, Usage};

/// A text content block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextBlock {
    /// The text content.
    pub text: String,
}

/// A block of content in a model response.
///
/// Only text is consumed here; every other block type deserializes to `Unsupported` so that
/// responses carrying them still parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    /// A text block.
    #[serde(rename = "text")]
    Text(TextBlock),

    /// A block type this crate ignores.
    #[serde(other)]
    Unsupported,
}

/// A complete (non-streamed) response from the Messages API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique object identifier.
    #[serde(default)]
    pub id: String,

    /// Content generated by the model.
    #[serde(default)]
    pub content: Vec<ContentBlock>,

    /// The model that handled the request.
    #[serde(default)]
    pub model: Option<String>,

    /// The reason that generation stopped.
    #[serde(default)]
    pub stop_reason: Option<StopReason>,

    /// Billing and rate-limit usage.
    #[serde(default)]
    pub usage: Usage,
}

impl Message {
    /// Concatenate every text block in the response.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text(text) => Some(text.text.as_str()),
                ContentBlock::Unsupported => None,
            })
            .collect()
    }
}
