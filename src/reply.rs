//! Streaming replies from the model.
//!
//! [`ReplyStreamer::stream_reply`] issues one streaming request for a conversation history
//! and returns a [`ReplyStream`]: a finite, non-restartable sequence of text fragments whose
//! concatenation is the assistant reply.  Dropping the stream abandons the request.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use futures::stream::{self, Stream, StreamExt};
use tracing::debug;

use crate::client::ModelClient;
use crate::error::{Error, Result};
use crate::observability::{STREAM_ERRORS, STREAM_FRAGMENTS, STREAM_TTFB};
use crate::types::{ChatMessage, MessageCreateParams, MessageStreamEvent, Model};

type FragmentSource = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A lazy sequence of reply fragments.
///
/// Fragments are yielded in arrival order and never repeated.  The stream remembers the text
/// yielded so far; if the underlying source fails, the error is reported once as
/// [`Error::Streaming`] carrying that partial text, and the stream then ends.
pub struct ReplyStream {
    inner: FragmentSource,
    partial: String,
    finished: bool,
}

impl ReplyStream {
    /// Wrap a stream of raw fragments.
    pub fn new<S>(fragments: S) -> Self
    where
        S: Stream<Item = Result<String>> + Send + 'static,
    {
        Self {
            inner: Box::pin(fragments),
            partial: String::new(),
            finished: false,
        }
    }

    /// A stream that yields exactly `fragments`, then ends.
    pub fn from_fragments<I, T>(fragments: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let fragments: Vec<Result<String>> = fragments.into_iter().map(|f| Ok(f.into())).collect();
        Self::new(stream::iter(fragments))
    }

    /// Text yielded so far.
    pub fn partial(&self) -> &str {
        &self.partial
    }

    /// Consume the stream, returning the text yielded so far.
    pub fn into_partial(self) -> String {
        self.partial
    }

    /// Returns true once the stream has ended, successfully or not.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Stream for ReplyStream {
    type Item = Result<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        match self.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(fragment))) => {
                self.partial.push_str(&fragment);
                Poll::Ready(Some(Ok(fragment)))
            }
            Poll::Ready(Some(Err(err))) => {
                STREAM_ERRORS.click();
                self.finished = true;
                let err = Error::stream_interrupted(err, self.partial.clone());
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                self.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Something that can stream an assistant reply for a conversation history.
#[async_trait::async_trait]
pub trait ReplyStreamer: Send + Sync {
    /// Start streaming a reply to `history`, which ends with the newest user message.
    ///
    /// Every call performs a fresh exchange; nothing is cached or retried.
    async fn stream_reply(&self, history: &[ChatMessage]) -> Result<ReplyStream>;
}

/// Streams replies from the Messages API.
#[derive(Debug, Clone)]
pub struct ClientReplyStreamer {
    client: ModelClient,
    model: Model,
    max_tokens: u32,
}

impl ClientReplyStreamer {
    /// Create a streamer issuing requests for `model` through `client`.
    pub fn new(client: ModelClient, model: Model, max_tokens: u32) -> Self {
        Self {
            client,
            model,
            max_tokens,
        }
    }
}

#[async_trait::async_trait]
impl ReplyStreamer for ClientReplyStreamer {
    async fn stream_reply(&self, history: &[ChatMessage]) -> Result<ReplyStream> {
        let messages = request_messages(history);
        if messages.is_empty() {
            return Err(Error::validation(
                "history contains no user message",
                Some("history".to_string()),
            ));
        }
        debug!(
            messages = messages.len(),
            model = %self.model,
            "starting reply stream"
        );
        let params = MessageCreateParams::new_streaming(self.max_tokens, messages, self.model.clone());
        let events = self.client.stream(params).await?;
        Ok(ReplyStream::new(text_fragments(events)))
    }
}

/// The messages sent to the model for `history`.
///
/// The API requires the first message to come from the user, so assistant messages that
/// precede the first user message (the seed greeting) are left out.
pub fn request_messages(history: &[ChatMessage]) -> Vec<ChatMessage> {
    history
        .iter()
        .skip_while(|message| !message.is_user())
        .cloned()
        .collect()
}

/// Reduce a stream of message events to the text fragments they carry.
///
/// Events without text are skipped, as are empty text deltas.  A stream that ends without a
/// `message_stop` event was cut off and is reported as a streaming error.
pub fn text_fragments<S>(events: S) -> impl Stream<Item = Result<String>> + Send + 'static
where
    S: Stream<Item = Result<MessageStreamEvent>> + Send + 'static,
{
    let events = Box::pin(events);
    let started = Instant::now();
    stream::unfold(
        (events, false, false),
        move |(mut events, mut first, done)| async move {
            if done {
                return None;
            }
            loop {
                match events.next().await {
                    Some(Ok(MessageStreamEvent::MessageStop(_))) => return None,
                    Some(Ok(event)) => {
                        let Some(text) = event.text() else {
                            continue;
                        };
                        if text.is_empty() {
                            continue;
                        }
                        if !first {
                            STREAM_TTFB.add(started.elapsed().as_secs_f64());
                            first = true;
                        }
                        STREAM_FRAGMENTS.click();
                        let text = text.to_string();
                        return Some((Ok(text), (events, first, false)));
                    }
                    Some(Err(err)) => return Some((Err(err), (events, first, true))),
                    None => {
                        let err = Error::streaming("stream ended before message_stop", None);
                        return Some((Err(err), (events, first, true)));
                    }
                }
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessageStopEvent;

    fn stop() -> Result<MessageStreamEvent> {
        Ok(MessageStreamEvent::MessageStop(MessageStopEvent {}))
    }

    #[tokio::test]
    async fn fragments_concatenate_in_order() {
        let events = stream::iter(vec![
            Ok(MessageStreamEvent::Ping),
            Ok(MessageStreamEvent::text_delta(0, "Sure")),
            Ok(MessageStreamEvent::text_delta(0, ", here's")),
            Ok(MessageStreamEvent::text_delta(0, "")),
            Ok(MessageStreamEvent::text_delta(0, " a plan...")),
            stop(),
        ]);
        let mut reply = ReplyStream::new(text_fragments(events));
        let mut fragments = Vec::new();
        while let Some(fragment) = reply.next().await {
            fragments.push(fragment.unwrap());
        }
        assert_eq!(fragments, vec!["Sure", ", here's", " a plan..."]);
        assert_eq!(reply.partial(), "Sure, here's a plan...");
        assert!(reply.is_finished());
    }

    #[tokio::test]
    async fn events_after_stop_are_ignored() {
        let events = stream::iter(vec![
            Ok(MessageStreamEvent::text_delta(0, "done")),
            stop(),
            Ok(MessageStreamEvent::text_delta(0, "extra")),
        ]);
        let collected: Vec<_> = text_fragments(events).collect().await;
        assert_eq!(collected.len(), 1);
    }

    #[tokio::test]
    async fn failure_mid_stream_carries_partial_text() {
        let events = stream::iter(vec![
            Ok(MessageStreamEvent::text_delta(0, "Sure")),
            Ok(MessageStreamEvent::text_delta(0, ", here's")),
            Err(Error::streaming("connection reset", None)),
            Ok(MessageStreamEvent::text_delta(0, "never")),
        ]);
        let mut reply = ReplyStream::new(text_fragments(events));
        assert_eq!(reply.next().await.unwrap().unwrap(), "Sure");
        assert_eq!(reply.next().await.unwrap().unwrap(), ", here's");
        let err = reply.next().await.unwrap().unwrap_err();
        assert!(err.is_streaming());
        assert_eq!(err.partial_reply(), Some("Sure, here's"));
        assert!(reply.next().await.is_none());
    }

    #[tokio::test]
    async fn truncated_stream_is_an_error() {
        let events = stream::iter(vec![Ok(MessageStreamEvent::text_delta(0, "Sure"))]);
        let mut reply = ReplyStream::new(text_fragments(events));
        assert_eq!(reply.next().await.unwrap().unwrap(), "Sure");
        let err = reply.next().await.unwrap().unwrap_err();
        assert_eq!(err.partial_reply(), Some("Sure"));
    }

    #[tokio::test]
    async fn from_fragments_yields_each_fragment() {
        let reply = ReplyStream::from_fragments(["a", "b", "c"]);
        let collected: Vec<String> = reply.map(|f| f.unwrap()).collect().await;
        assert_eq!(collected, vec!["a", "b", "c"]);
    }

    #[test]
    fn request_messages_drops_leading_seed() {
        let history = vec![
            ChatMessage::assistant("Hello!"),
            ChatMessage::user("Plan a trip to Kyoto"),
            ChatMessage::assistant("Sure"),
            ChatMessage::user("Thanks"),
        ];
        assert_eq!(request_messages(&history), history[1..].to_vec());
        assert!(request_messages(&history[..1]).is_empty());
    }
}
