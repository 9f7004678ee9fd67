use serde::{Deserialize, Serialize};

use crate::types::{ContentBlock, ContentBlockDelta, Message, StopReason, Usage};

/// Indicates the start of a new message in the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageStartEvent {
    /// Initial message metadata.
    pub message: Message,
}

/// Top-level changes to the message, sent near the end of a stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageDelta {
    /// The reason generation stopped.
    #[serde(default)]
    pub stop_reason: Option<StopReason>,
}

/// Carries the final stop reason and cumulative usage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageDeltaEvent {
    /// The delta to apply to the message.
    #[serde(default)]
    pub delta: MessageDelta,

    /// Cumulative usage for the message.
    #[serde(default)]
    pub usage: Usage,
}

/// Marks the beginning of a content block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlockStartEvent {
    /// The (usually empty) initial block.
    pub content_block: ContentBlock,

    /// Index of the block within the message.
    pub index: usize,
}

/// An incremental update to a content block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlockDeltaEvent {
    /// The delta update to the content block.
    pub delta: ContentBlockDelta,

    /// Index of the block being updated.
    pub index: usize,
}

/// Marks the end of a content block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlockStopEvent {
    /// Index of the block that finished.
    pub index: usize,
}

/// Marks the end of the message stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageStopEvent {}

/// An event in a message stream.
///
/// Events arrive in order: `message_start`, then for each content block a
/// `content_block_start`, any number of `content_block_delta`s and a `content_block_stop`,
/// then `message_delta` and finally `message_stop`.  Pings may appear anywhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MessageStreamEvent {
    /// A keep-alive with no payload.
    #[serde(rename = "ping")]
    Ping,

    /// Start of the message.
    #[serde(rename = "message_start")]
    MessageStart(MessageStartEvent),

    /// Stop reason and usage updates.
    #[serde(rename = "message_delta")]
    MessageDelta(MessageDeltaEvent),

    /// Start of a content block.
    #[serde(rename = "content_block_start")]
    ContentBlockStart(ContentBlockStartEvent),

    /// Incremental content.
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta(ContentBlockDeltaEvent),

    /// End of a content block.
    #[serde(rename = "content_block_stop")]
    ContentBlockStop(ContentBlockStopEvent),

    /// End of the stream.
    #[serde(rename = "message_stop")]
    MessageStop(MessageStopEvent),
}

impl MessageStreamEvent {
    /// Create a text delta event for block `index`.
    pub fn text_delta(index: usize, text: impl Into<String>) -> Self {
        MessageStreamEvent::ContentBlockDelta(ContentBlockDeltaEvent {
            delta: ContentBlockDelta::text(text),
            index,
        })
    }

    /// The text this event contributes to the reply, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            MessageStreamEvent::ContentBlockDelta(event) => event.delta.as_text(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{from_value, json};

    #[test]
    fn content_block_delta_event_yields_text() {
        let event: MessageStreamEvent = from_value(json!({
            "type": "content_block_delta",
            "index": 0,
            "delta": {"type": "text_delta", "text": ", here's"}
        }))
        .unwrap();
        assert_eq!(event.text(), Some(", here's"));
    }

    #[test]
    fn message_delta_event_carries_stop_reason() {
        let event: MessageStreamEvent = from_value(json!({
            "type": "message_delta",
            "delta": {"stop_reason": "end_turn", "stop_sequence": null},
            "usage": {"output_tokens": 15}
        }))
        .unwrap();
        match event {
            MessageStreamEvent::MessageDelta(delta) => {
                assert_eq!(delta.delta.stop_reason, Some(StopReason::EndTurn));
                assert_eq!(delta.usage.output_tokens, 15);
            }
            other => panic!("expected MessageDelta, got {other:?}"),
        }
    }

    #[test]
    fn message_start_event_parses() {
        let event: MessageStreamEvent = from_value(json!({
            "type": "message_start",
            "message": {
                "id": "msg_012345",
                "type": "message",
                "role": "assistant",
                "content": [],
                "model": "claude-haiku-4-5",
                "stop_reason": null,
                "usage": {"input_tokens": 25, "output_tokens": 1}
            }
        }))
        .unwrap();
        assert!(matches!(event, MessageStreamEvent::MessageStart(_)));
        assert_eq!(event.text(), None);
    }

    #[test]
    fn message_stop_event_parses() {
        let event: MessageStreamEvent = from_value(json!({"type": "message_stop"})).unwrap();
        assert_eq!(event, MessageStreamEvent::MessageStop(MessageStopEvent {}));
    }
}
