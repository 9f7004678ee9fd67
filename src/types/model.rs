use std::fmt;

use serde::{Deserialize, Serialize};

/// A model identifier understood by the Messages API.
///
/// Chats always run against one fixed model; the `Custom` variant exists so the identifier can
/// still be parsed from documents or settings written by newer releases.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Model {
    /// Known model versions
    Known(KnownModel),

    /// Custom model identifier
    Custom(String),
}

/// Known model versions.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KnownModel {
    /// Claude Haiku 4.5
    #[serde(rename = "claude-haiku-4-5")]
    ClaudeHaiku45,

    /// Claude Sonnet 4.5
    #[serde(rename = "claude-sonnet-4-5")]
    ClaudeSonnet45,

    /// Claude Sonnet 4.0
    #[serde(rename = "claude-sonnet-4-0")]
    ClaudeSonnet40,
}

/// The model every chat request is issued against.
pub const DEFAULT_MODEL: Model = Model::Known(KnownModel::ClaudeHaiku45);

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Model::Known(known_model) => write!(f, "{known_model}"),
            Model::Custom(custom) => write!(f, "{custom}"),
        }
    }
}

impl fmt::Display for KnownModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KnownModel::ClaudeHaiku45 => write!(f, "claude-haiku-4-5"),
            KnownModel::ClaudeSonnet45 => write!(f, "claude-sonnet-4-5"),
            KnownModel::ClaudeSonnet40 => write!(f, "claude-sonnet-4-0"),
        }
    }
}

impl From<KnownModel> for Model {
    fn from(model: KnownModel) -> Self {
        Model::Known(model)
    }
}

impl From<&str> for Model {
    fn from(model: &str) -> Self {
        serde_json::from_value(serde_json::Value::String(model.to_string()))
            .unwrap_or_else(|_| Model::Custom(model.to_string()))
    }
}
