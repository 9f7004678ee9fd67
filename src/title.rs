//! Short titles for new conversations.

use std::time::Duration;

use tracing::{debug, warn};

use crate::client::ModelClient;
use crate::error::{Error, Result};
use crate::observability::{TITLE_FALLBACKS, TITLE_REQUESTS};
use crate::types::{ChatMessage, FALLBACK_TITLE, MessageCreateParams, Model, SENTINEL_TITLE};

/// Output cap for title requests.
pub const TITLE_MAX_TOKENS: u32 = 20;

/// Temperature for title requests.
pub const TITLE_TEMPERATURE: f32 = 0.2;

const TITLE_TIMEOUT: Duration = Duration::from_secs(15);

/// Derives a short display title from the first user message of a conversation.
///
/// Implementations never fail: a title is cosmetic, so any problem yields the fallback label.
#[async_trait::async_trait]
pub trait TitleGenerator: Send + Sync {
    async fn generate_title(&self, first_message: &str) -> String;
}

/// Generates titles with one single-shot request to the model.
#[derive(Debug, Clone)]
pub struct ClientTitleGenerator {
    client: ModelClient,
    model: Model,
    max_tokens: u32,
    temperature: f32,
    timeout: Duration,
}

impl ClientTitleGenerator {
    pub fn new(client: ModelClient, model: Model) -> Self {
        Self {
            client,
            model,
            max_tokens: TITLE_MAX_TOKENS,
            temperature: TITLE_TEMPERATURE,
            timeout: TITLE_TIMEOUT,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Request a title, reporting every failure as [`Error::TitleGeneration`].
    pub async fn try_generate(&self, first_message: &str) -> Result<String> {
        TITLE_REQUESTS.click();
        let params = MessageCreateParams::new(
            self.max_tokens,
            vec![ChatMessage::user(title_prompt(first_message))],
            self.model.clone(),
        )
        .with_temperature(self.temperature);
        let response = tokio::time::timeout(self.timeout, self.client.send(params))
            .await
            .map_err(|_| Error::title_generation("title request timed out"))?
            .map_err(|err| Error::title_generation(format!("title request failed: {err}")))?;
        clean_title(&response.text())
            .ok_or_else(|| Error::title_generation("model returned an empty title"))
    }
}

#[async_trait::async_trait]
impl TitleGenerator for ClientTitleGenerator {
    async fn generate_title(&self, first_message: &str) -> String {
        match self.try_generate(first_message).await {
            Ok(title) => {
                debug!(title = %title, "generated title");
                title
            }
            Err(err) => {
                TITLE_FALLBACKS.click();
                warn!(error = %err, "title generation failed; using fallback");
                FALLBACK_TITLE.to_string()
            }
        }
    }
}

/// The prompt sent to the model to name a conversation.
pub fn title_prompt(first_message: &str) -> String {
    format!(
        "Generate a short, 2-4 word title for a conversation that starts with this message. \
         Reply with the title only.\n\n{first_message}"
    )
}

/// Normalize raw model output into a title.
///
/// Whitespace and surrounding quotes are stripped.  Returns `None` when nothing is left, and
/// never returns the sentinel title, which would cause the conversation to be titled again.
pub fn clean_title(raw: &str) -> Option<String> {
    let title = raw
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim();
    if title.is_empty() {
        None
    } else if title == SENTINEL_TITLE {
        Some(FALLBACK_TITLE.to_string())
    } else {
        Some(title.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_title_strips_quotes_and_whitespace() {
        assert_eq!(clean_title("  \"Kyoto Trip\"\n").as_deref(), Some("Kyoto Trip"));
        assert_eq!(clean_title("'Rust Lifetimes'").as_deref(), Some("Rust Lifetimes"));
        assert_eq!(clean_title("Plain"), Some("Plain".to_string()));
    }

    #[test]
    fn clean_title_rejects_empty_output() {
        assert_eq!(clean_title(""), None);
        assert_eq!(clean_title("   "), None);
        assert_eq!(clean_title("\"\""), None);
    }

    #[test]
    fn clean_title_never_returns_sentinel() {
        assert_eq!(clean_title("New Chat").as_deref(), Some(FALLBACK_TITLE));
    }

    #[test]
    fn prompt_includes_message() {
        let prompt = title_prompt("Plan a trip to Kyoto");
        assert!(prompt.contains("2-4 word"));
        assert!(prompt.ends_with("Plan a trip to Kyoto"));
    }

    #[tokio::test]
    async fn unreachable_endpoint_falls_back() {
        let client = ModelClient::with_options(
            Some("test-key".to_string()),
            Some("http://127.0.0.1:1/v1/".to_string()),
            Some(Duration::from_secs(2)),
        )
        .unwrap();
        let titler = ClientTitleGenerator::new(client, crate::types::DEFAULT_MODEL);
        let err = titler.try_generate("hello").await.unwrap_err();
        assert!(matches!(err, Error::TitleGeneration { .. }));
        assert_eq!(titler.generate_title("hello").await, FALLBACK_TITLE);
    }
}
