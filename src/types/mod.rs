// Public modules
pub mod chat_message;
pub mod content_block_delta;
pub mod conversation;
pub mod message;
pub mod message_create_params;
pub mod message_stream_event;
pub mod model;
pub mod stop_reason;
pub mod usage;

// Re-exports
pub use chat_message::{ChatMessage, MessageRole};
pub use content_block_delta::{ContentBlockDelta, TextDelta};
pub use conversation::{
    ChatSummary, Conversation, ERROR_TITLE, FALLBACK_TITLE, SENTINEL_TITLE, UNTITLED_TITLE,
    fallback_title,
};
pub use message::{ContentBlock, Message, TextBlock};
pub use message_create_params::MessageCreateParams;
pub use message_stream_event::{
    ContentBlockDeltaEvent, ContentBlockStartEvent, ContentBlockStopEvent, MessageDelta,
    MessageDeltaEvent, MessageStartEvent, MessageStopEvent, MessageStreamEvent,
};
pub use model::{DEFAULT_MODEL, KnownModel, Model};
pub use stop_reason::StopReason;
pub use usage::Usage;
