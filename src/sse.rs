//! Server-Sent Events (SSE) processing for streaming responses.
//!
//! This module turns the raw byte stream of a streaming Messages API response into
//! `MessageStreamEvent`s.  Events are delimited by a blank line; bytes are buffered until a
//! full event is available so that multi-byte characters split across network reads decode
//! correctly.

use std::time::Duration;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};

use crate::observability::{STREAM_BYTES, STREAM_EVENTS};
use crate::{Error, MessageStreamEvent, Result};

/// Process a stream of bytes into a stream of server-sent events.
///
/// The stream fails with a timeout error when no bytes arrive for `idle`; a reply that keeps
/// producing data may take as long as it needs.
pub fn process_sse<S>(
    byte_stream: S,
    idle: Duration,
) -> impl Stream<Item = Result<MessageStreamEvent>> + Send
where
    S: Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send + Unpin + 'static,
{
    let stream = byte_stream.map(|result| {
        result
            .map_err(|e| Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e))))
    });
    decode_events(idle_timeout(stream, idle))
}

/// End `stream` with a timeout error once it has been silent for `idle`.
pub(crate) fn idle_timeout<S>(
    stream: S,
    idle: Duration,
) -> impl Stream<Item = Result<Bytes>> + Send + Unpin + 'static
where
    S: Stream<Item = Result<Bytes>> + Send + Unpin + 'static,
{
    Box::pin(stream::unfold(
        (stream, false),
        move |(mut stream, done)| async move {
            if done {
                return None;
            }
            match tokio::time::timeout(idle, stream.next()).await {
                Ok(Some(item)) => Some((item, (stream, false))),
                Ok(None) => None,
                Err(_) => {
                    let secs = idle.as_secs_f64();
                    let err = Error::timeout(
                        format!("no data received from the stream for {secs:.1}s"),
                        Some(secs),
                    );
                    Some((Err(err), (stream, true)))
                }
            }
        },
    ))
}

/// Decode already-converted byte chunks into events.
///
/// Split from [`process_sse`] so that the framing logic does not depend on reqwest.
pub(crate) fn decode_events<S>(stream: S) -> impl Stream<Item = Result<MessageStreamEvent>> + Send
where
    S: Stream<Item = Result<Bytes>> + Send + Unpin + 'static,
{
    let buffer: Vec<u8> = Vec::new();

    stream::unfold(
        (stream, buffer, false),
        move |(mut stream, mut buffer, done)| async move {
            if done {
                return None;
            }
            loop {
                if let Some((raw, remaining)) = split_event(&buffer) {
                    buffer = remaining;
                    match parse_event(&raw) {
                        Some(event) => return Some((event, (stream, buffer, false))),
                        None => continue,
                    }
                }

                match stream.next().await {
                    Some(Ok(bytes)) => {
                        STREAM_BYTES.count(bytes.len() as u64);
                        buffer.extend_from_slice(&bytes);
                    }
                    Some(Err(e)) => {
                        return Some((Err(e), (stream, buffer, true)));
                    }
                    None => {
                        // A trailing event without its blank line still counts.
                        if !buffer.iter().all(u8::is_ascii_whitespace) {
                            let raw = std::mem::take(&mut buffer);
                            if let Some(event) = parse_event(&raw) {
                                return Some((event, (stream, buffer, true)));
                            }
                        }
                        return None;
                    }
                }
            }
        },
    )
}

/// Split the first complete event off the front of `buffer`.
fn split_event(buffer: &[u8]) -> Option<(Vec<u8>, Vec<u8>)> {
    let mut idx = 0;
    while idx < buffer.len() {
        if buffer[idx..].starts_with(b"\n\n") {
            return Some((buffer[..idx].to_vec(), buffer[idx + 2..].to_vec()));
        }
        if buffer[idx..].starts_with(b"\r\n\r\n") {
            return Some((buffer[..idx].to_vec(), buffer[idx + 4..].to_vec()));
        }
        idx += 1;
    }
    None
}

/// Parse one event block.  Returns `None` for blocks that carry nothing (comments, blank
/// keep-alives).
fn parse_event(raw: &[u8]) -> Option<Result<MessageStreamEvent>> {
    let text = match std::str::from_utf8(raw) {
        Ok(text) => text,
        Err(e) => return Some(Err(e.into())),
    };

    let mut event_type = None;
    let mut data = String::new();
    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        if let Some(value) = line.strip_prefix("event:") {
            event_type = Some(value.trim());
        } else if let Some(value) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(value.strip_prefix(' ').unwrap_or(value));
        }
    }

    if event_type.is_none() && data.is_empty() {
        return None;
    }
    STREAM_EVENTS.click();
    Some(parse_event_type(event_type, &data))
}

/// Parse a specific SSE event type and its data.
fn parse_event_type(event_type: Option<&str>, event_data: &str) -> Result<MessageStreamEvent> {
    match event_type {
        Some("ping") => Ok(MessageStreamEvent::Ping),
        Some("error") => {
            #[derive(serde::Deserialize)]
            struct ErrorEvent {
                error: ErrorDetail,
            }
            #[derive(serde::Deserialize)]
            struct ErrorDetail {
                #[serde(rename = "type")]
                error_type: Option<String>,
                message: Option<String>,
            }
            let (error_type, message) = match serde_json::from_str::<ErrorEvent>(event_data) {
                Ok(event) => (
                    event.error.error_type,
                    event
                        .error
                        .message
                        .unwrap_or_else(|| event_data.to_string()),
                ),
                Err(_) => (None, event_data.to_string()),
            };
            Err(Error::api(
                500,
                Some(error_type.unwrap_or_else(|| "stream_error".to_string())),
                message,
                None,
            ))
        }
        Some(
            "message_start" | "message_delta" | "message_stop" | "content_block_start"
            | "content_block_delta" | "content_block_stop",
        )
        | None => serde_json::from_str::<MessageStreamEvent>(event_data).map_err(|e| {
            Error::serialization(
                format!("Failed to parse event JSON: {e}"),
                Some(Box::new(e)),
            )
        }),
        Some(other) => Err(Error::serialization(
            format!("Unknown SSE event type: {other}"),
            None,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn chunks(parts: &[&'static [u8]]) -> impl Stream<Item = Result<Bytes>> + Send + Unpin {
        stream::iter(
            parts
                .iter()
                .map(|part| Ok(Bytes::from_static(part)))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn parse_ping_event() {
        let mut events = Box::pin(decode_events(chunks(&[b"event: ping\ndata: {}\n\n"])));
        let event = events.next().await.unwrap();
        assert!(matches!(event, Ok(MessageStreamEvent::Ping)));
        assert!(events.next().await.is_none());
    }

    #[tokio::test]
    async fn parse_text_delta_split_across_chunks() {
        let mut events = Box::pin(decode_events(chunks(&[
            b"event: content_block_delta\ndata: {\"type\":\"content_block_delta\",",
            b"\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Sure\"}}\n",
            b"\n",
        ])));
        let event = events.next().await.unwrap().unwrap();
        assert_eq!(event.text(), Some("Sure"));
    }

    #[tokio::test]
    async fn multibyte_character_split_across_chunks() {
        // "é" is 0xC3 0xA9; split it between two reads.
        let mut events = Box::pin(decode_events(chunks(&[
            b"event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"caf\xC3",
            b"\xA9\"}}\n\n",
        ])));
        let event = events.next().await.unwrap().unwrap();
        assert_eq!(event.text(), Some("café"));
    }

    #[tokio::test]
    async fn crlf_delimited_events() {
        let mut events = Box::pin(decode_events(chunks(&[
            b"event: ping\r\ndata: {}\r\n\r\nevent: message_stop\r\ndata: {\"type\":\"message_stop\"}\r\n\r\n",
        ])));
        assert!(matches!(
            events.next().await,
            Some(Ok(MessageStreamEvent::Ping))
        ));
        assert!(matches!(
            events.next().await,
            Some(Ok(MessageStreamEvent::MessageStop(_)))
        ));
        assert!(events.next().await.is_none());
    }

    #[tokio::test]
    async fn comments_are_skipped() {
        let mut events = Box::pin(decode_events(chunks(&[
            b": keep-alive\n\nevent: ping\ndata: {}\n\n",
        ])));
        assert!(matches!(
            events.next().await,
            Some(Ok(MessageStreamEvent::Ping))
        ));
    }

    #[tokio::test]
    async fn error_event_becomes_api_error() {
        let mut events = Box::pin(decode_events(chunks(&[
            b"event: error\ndata: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n\n",
        ])));
        let err = events.next().await.unwrap().unwrap_err();
        assert!(err.to_string().contains("overloaded_error"));
        assert!(err.to_string().contains("Overloaded"));
    }

    #[tokio::test]
    async fn handle_unknown_event_type() {
        let mut events = Box::pin(decode_events(chunks(&[
            b"event: unknown_event\ndata: {}\n\n",
        ])));
        let err = events.next().await.unwrap().unwrap_err();
        assert!(err.to_string().contains("Unknown SSE event type"));
    }

    #[tokio::test]
    async fn transport_error_ends_stream() {
        let parts: Vec<Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"event: ping\ndata: {}\n\n")),
            Err(Error::streaming("connection reset", None)),
            Ok(Bytes::from_static(b"event: ping\ndata: {}\n\n")),
        ];
        let mut events = Box::pin(decode_events(stream::iter(parts)));
        assert!(matches!(
            events.next().await,
            Some(Ok(MessageStreamEvent::Ping))
        ));
        assert!(events.next().await.unwrap().is_err());
        assert!(events.next().await.is_none());
    }

    #[tokio::test]
    async fn silent_stream_times_out() {
        let silent = chunks(&[b"event: ping\ndata: {}\n\n"]).chain(stream::pending());
        let mut events = Box::pin(decode_events(idle_timeout(
            silent,
            Duration::from_millis(50),
        )));
        assert!(matches!(
            events.next().await,
            Some(Ok(MessageStreamEvent::Ping))
        ));
        assert!(events.next().await.unwrap().unwrap_err().is_timeout());
        assert!(events.next().await.is_none());
    }

    #[tokio::test]
    async fn slow_but_steady_stream_is_not_cut_off() {
        let parts = chunks(&[
            b"event: ping\ndata: {}\n\n",
            b"event: ping\ndata: {}\n\n",
            b"event: ping\ndata: {}\n\n",
        ])
        .then(|chunk| async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            chunk
        });
        let mut events = Box::pin(decode_events(idle_timeout(
            Box::pin(parts),
            Duration::from_millis(50),
        )));
        for _ in 0..3 {
            assert!(matches!(
                events.next().await,
                Some(Ok(MessageStreamEvent::Ping))
            ));
        }
        assert!(events.next().await.is_none());
    }

    #[tokio::test]
    async fn trailing_event_without_blank_line() {
        let mut events = Box::pin(decode_events(chunks(&[
            b"event: message_stop\ndata: {\"type\":\"message_stop\"}\n",
        ])));
        assert!(matches!(
            events.next().await,
            Some(Ok(MessageStreamEvent::MessageStop(_)))
        ));
        assert!(events.next().await.is_none());
    }
}
