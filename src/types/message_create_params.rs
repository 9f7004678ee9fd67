use serde::{Deserialize, Serialize};

use crate::types::{ChatMessage, Model};

/// Body of a request to the Messages API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageCreateParams {
    /// The model that will complete the prompt.
    pub model: Model,

    /// The maximum number of tokens to generate before stopping.
    pub max_tokens: u32,

    /// Input messages, oldest first.
    pub messages: Vec<ChatMessage>,

    /// Optional system prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// Amount of randomness injected into the response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Whether to incrementally stream the response using server-sent events.
    #[serde(default)]
    pub stream: bool,
}

impl MessageCreateParams {
    /// Create non-streaming parameters with the required fields.
    pub fn new(max_tokens: u32, messages: Vec<ChatMessage>, model: Model) -> Self {
        Self {
            model,
            max_tokens,
            messages,
            system: None,
            temperature: None,
            stream: false,
        }
    }

    /// Create streaming parameters with the required fields.
    pub fn new_streaming(max_tokens: u32, messages: Vec<ChatMessage>, model: Model) -> Self {
        Self {
            stream: true,
            ..Self::new(max_tokens, messages, model)
        }
    }

    /// Set the system prompt.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set the temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}
