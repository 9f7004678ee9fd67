//! palaver: a single-user chat-session core.
//!
//! Conversations are stored one JSON document per conversation by a [`ChatStore`]; a
//! [`ChatSession`] streams replies from the model through a [`ReplyStreamer`], names each new
//! conversation once through a [`TitleGenerator`], and stores the result.

// Public modules
pub mod client;
pub mod commands;
pub mod config;
pub mod error;
pub mod registry;
pub mod render;
pub mod reply;
pub mod session;
pub mod sse;
pub mod storage;
pub mod title;
pub mod types;

mod observability;

// Re-exports
pub use client::{API_KEY_ENV, ModelClient};
pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{ChatArgs, ChatConfig};
pub use error::{Error, Result};
pub use observability::register_biometrics;
pub use registry::{ChatRegistry, DefaultChat};
pub use render::{CollectingRenderer, PlainTextRenderer, Renderer};
pub use reply::{ClientReplyStreamer, ReplyStream, ReplyStreamer};
pub use session::{ChatSession, SessionState, TurnOutcome};
pub use storage::{ChatStore, FileStore};
pub use title::{ClientTitleGenerator, TitleGenerator};
pub use types::*;
