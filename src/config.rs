//! Configuration types for the chat application.
//!
//! This module provides CLI argument parsing via `arrrg` and the resolved settings used to
//! assemble a session.

use std::path::PathBuf;

use arrrg_derive::CommandLine;

use crate::title::{TITLE_MAX_TOKENS, TITLE_TEMPERATURE};
use crate::types::{DEFAULT_MODEL, Model};

/// Default maximum tokens per reply.
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Default directory holding conversation documents.
const DEFAULT_CHAT_DIR: &str = "chats";

/// Default first message of every new conversation.
pub const DEFAULT_SEED_MESSAGE: &str = "Hello! I'm your AI chat assistant.";

/// Command-line arguments for the palaver-chat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Directory for conversation documents.
    #[arrrg(optional, "Directory holding conversations (default: chats)", "DIR")]
    pub chat_dir: Option<String>,

    /// Maximum tokens per reply.
    #[arrrg(optional, "Max tokens per reply (default: 1024)", "TOKENS")]
    pub max_tokens: Option<u32>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Configuration for a chat session.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatConfig {
    /// Where conversation documents live.
    pub chat_dir: PathBuf,

    /// The model used for replies and titles.  Fixed to [`DEFAULT_MODEL`].
    pub model: Model,

    /// Maximum tokens per reply.
    pub max_tokens: u32,

    /// Output cap for title requests.
    pub title_max_tokens: u32,

    /// Temperature for title requests.
    pub title_temperature: f32,

    /// The assistant message every new conversation starts with.
    pub seed_message: String,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    ///
    /// Defaults:
    /// - Chat directory: `chats`
    /// - Max tokens: 1024
    /// - Title: 20 tokens at temperature 0.2
    /// - Color: enabled
    pub fn new() -> Self {
        Self {
            chat_dir: PathBuf::from(DEFAULT_CHAT_DIR),
            model: DEFAULT_MODEL,
            max_tokens: DEFAULT_MAX_TOKENS,
            title_max_tokens: TITLE_MAX_TOKENS,
            title_temperature: TITLE_TEMPERATURE,
            seed_message: DEFAULT_SEED_MESSAGE.to_string(),
            use_color: true,
        }
    }

    /// Sets the conversation directory.
    pub fn with_chat_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.chat_dir = dir.into();
        self
    }

    /// Sets the maximum tokens per reply.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Sets the seed message for new conversations.
    pub fn with_seed_message(mut self, seed: impl Into<String>) -> Self {
        self.seed_message = seed.into();
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl From<ChatArgs> for ChatConfig {
    fn from(args: ChatArgs) -> Self {
        ChatConfig {
            chat_dir: args
                .chat_dir
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CHAT_DIR)),
            max_tokens: args.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            use_color: !args.no_color,
            ..ChatConfig::new()
        }
    }
}
