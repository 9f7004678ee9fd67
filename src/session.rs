//! Chat session management.
//!
//! A [`ChatSession`] owns the single active conversation of one user session and moves it
//! through the states in [`SessionState`]:
//!
//! ```text
//! NoActive --new/select--> Clean --send--> Dirty --first fragment--> Streaming
//!                            ^                ^                          |
//!                            |                +-- stream or save fails --+
//!                            +--------------- save succeeds ------------+
//! ```
//!
//! Persistence always happens after the reply stream has finished, and at most one stream is
//! in flight because every mutating operation takes `&mut self`.  A conversation whose stored
//! document could not be read is shown but never written, so its file keeps its messages.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::observability::{SESSION_TURN_DURATION, SESSION_TURN_FAILURES, SESSION_TURNS};
use crate::registry::{ChatRegistry, DefaultChat};
use crate::render::Renderer;
use crate::reply::ReplyStreamer;
use crate::storage::{ChatStore, validate_id};
use crate::title::TitleGenerator;
use crate::types::{ChatMessage, ChatSummary, Conversation, FALLBACK_TITLE, SENTINEL_TITLE};

/// How often the renderer is asked whether to interrupt while waiting on the model.
const INTERRUPT_POLL: Duration = Duration::from_millis(100);

/// Where the active conversation stands relative to its persisted copy.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No conversation is selected.
    NoActive,
    /// The in-memory conversation matches what is stored.
    Clean,
    /// A reply is being streamed into the conversation.
    Streaming,
    /// The in-memory conversation has changes that are not stored.
    Dirty,
}

/// The result of one completed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    /// The full assistant reply.
    pub reply: String,
    /// How many fragments the reply arrived in.
    pub fragment_count: usize,
    /// The title generated by this turn, if it was the conversation's first exchange.
    pub generated_title: Option<String>,
}

/// Orchestrates storage, reply streaming and title generation for one user.
pub struct ChatSession {
    store: Arc<dyn ChatStore>,
    registry: ChatRegistry,
    replier: Arc<dyn ReplyStreamer>,
    titler: Arc<dyn TitleGenerator>,
    active: Option<Conversation>,
    state: SessionState,
    unsaved_title: Option<String>,
}

impl ChatSession {
    /// Creates a session with no active conversation.
    pub fn new(
        store: Arc<dyn ChatStore>,
        replier: Arc<dyn ReplyStreamer>,
        titler: Arc<dyn TitleGenerator>,
    ) -> Self {
        let registry = ChatRegistry::new(store.clone());
        Self {
            store,
            registry,
            replier,
            titler,
            active: None,
            state: SessionState::NoActive,
            unsaved_title: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn registry(&self) -> &ChatRegistry {
        &self.registry
    }

    /// The active conversation, if any.
    pub fn active(&self) -> Option<&Conversation> {
        self.active.as_ref()
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active.as_ref().map(|c| c.id.as_str())
    }

    pub fn title(&self) -> Option<&str> {
        self.active.as_ref().map(|c| c.title.as_str())
    }

    /// Messages of the active conversation; empty when there is none.
    pub fn messages(&self) -> &[ChatMessage] {
        self.active
            .as_ref()
            .map(|c| c.messages.as_slice())
            .unwrap_or_default()
    }

    /// Stored conversations, newest first.
    pub fn list(&self) -> Result<Vec<ChatSummary>> {
        self.registry.list()
    }

    /// Create a conversation and make it active.
    pub fn new_chat(&mut self) -> Result<String> {
        let id = self.store.create(SENTINEL_TITLE)?;
        info!(chat_id = %id, "created conversation");
        let conversation = self.store.load(&id);
        self.activate(conversation);
        Ok(id)
    }

    /// Make `id` the active conversation.  Re-selecting the active id does nothing.
    pub fn select_chat(&mut self, id: &str) -> Result<()> {
        if self.active_id() == Some(id) {
            return Ok(());
        }
        validate_id(id)?;
        let conversation = self.store.load(id);
        self.activate(conversation);
        Ok(())
    }

    /// Delete a stored conversation, clearing the session if it was active.
    pub fn delete_chat(&mut self, id: &str) -> Result<()> {
        self.store.delete(id)?;
        if self.active_id() == Some(id) {
            self.active = None;
            self.unsaved_title = None;
            self.state = SessionState::NoActive;
        }
        info!(chat_id = %id, "deleted conversation");
        Ok(())
    }

    /// Ensure a conversation is active: the current one, else the newest stored one, else a
    /// new one.  Returns its id.
    pub fn open_default(&mut self) -> Result<String> {
        if let Some(id) = self.active_id() {
            return Ok(id.to_string());
        }
        match self.registry.default_chat()? {
            DefaultChat::Existing(id) => {
                self.select_chat(&id)?;
                Ok(id)
            }
            DefaultChat::CreateNew => self.new_chat(),
        }
    }

    /// Send `text` as the next user message and stream the reply into `renderer`.
    ///
    /// On success the conversation, including a title generated on its first exchange, is
    /// stored and the session is clean.  When the stream fails or is interrupted the user
    /// message stays in the conversation, the error carries any partial reply, and
    /// [`ChatSession::retry_reply`] can ask again.  When storing fails the reply stays in memory
    /// and [`ChatSession::retry_save`] can store it without asking the model again.
    pub async fn send_message(
        &mut self,
        text: &str,
        renderer: &mut dyn Renderer,
    ) -> Result<TurnOutcome> {
        if text.trim().is_empty() {
            return Err(Error::validation(
                "message is empty",
                Some("text".to_string()),
            ));
        }
        let conversation = self.writable_mut()?;
        conversation.messages.push(ChatMessage::user(text));
        self.state = SessionState::Dirty;
        self.run_turn(renderer).await
    }

    /// Stream a new reply for a conversation whose last user message went unanswered.
    pub async fn retry_reply(&mut self, renderer: &mut dyn Renderer) -> Result<TurnOutcome> {
        let conversation = self.writable_mut()?;
        if !conversation.last_message().is_some_and(ChatMessage::is_user) {
            return Err(Error::validation(
                "the last message already has a reply",
                None,
            ));
        }
        self.run_turn(renderer).await
    }

    /// Store the active conversation as it is in memory.
    pub fn retry_save(&mut self) -> Result<()> {
        let (id, messages, title) = self.save_request()?;
        let result = self.store.save(&id, &messages, title.as_deref());
        self.finish_save(result)
    }

    /// Returns true when the last message of the active conversation has no reply yet, so
    /// [`ChatSession::retry_reply`] can ask for one.
    pub fn awaiting_reply(&self) -> bool {
        self.active
            .as_ref()
            .and_then(Conversation::last_message)
            .is_some_and(ChatMessage::is_user)
    }

    fn active_mut(&mut self) -> Result<&mut Conversation> {
        self.active
            .as_mut()
            .ok_or_else(|| Error::validation("no active conversation", None))
    }

    /// The active conversation, unless its stored document could not be read.
    fn writable_mut(&mut self) -> Result<&mut Conversation> {
        let conversation = self.active_mut()?;
        if conversation.unreadable {
            return Err(Error::validation(
                format!(
                    "conversation {} could not be loaded and is left untouched",
                    conversation.id
                ),
                None,
            ));
        }
        Ok(conversation)
    }

    fn activate(&mut self, conversation: Conversation) {
        if self.state == SessionState::Dirty {
            warn!(
                chat_id = self.active_id().unwrap_or_default(),
                "discarding unsaved changes"
            );
        }
        debug!(chat_id = %conversation.id, title = %conversation.title, "activated conversation");
        self.active = Some(conversation);
        self.unsaved_title = None;
        self.state = SessionState::Clean;
    }

    async fn run_turn(&mut self, renderer: &mut dyn Renderer) -> Result<TurnOutcome> {
        SESSION_TURNS.click();
        let started = Instant::now();
        let result = self.stream_and_store(renderer).await;
        SESSION_TURN_DURATION.add(started.elapsed().as_secs_f64());
        if let Err(err) = &result {
            SESSION_TURN_FAILURES.click();
            self.state = SessionState::Dirty;
            warn!(
                chat_id = self.active_id().unwrap_or_default(),
                error = %err,
                "turn failed"
            );
        }
        result
    }

    async fn stream_and_store(&mut self, renderer: &mut dyn Renderer) -> Result<TurnOutcome> {
        let (history, prompt) = {
            let conversation = self.active_mut()?;
            let prompt = conversation
                .messages
                .iter()
                .rev()
                .find(|m| m.is_user())
                .map(|m| m.content.clone())
                .unwrap_or_default();
            (conversation.messages.clone(), prompt)
        };

        let opened = until_interrupted(renderer, self.replier.stream_reply(&history)).await;
        let Some(opened) = opened else {
            renderer.print_interrupted();
            return Err(Error::abort("reply interrupted", String::new()));
        };
        let mut stream = opened?;
        self.state = SessionState::Streaming;
        let mut fragment_count = 0;
        loop {
            match until_interrupted(renderer, stream.next()).await {
                None => {
                    renderer.print_interrupted();
                    return Err(Error::abort("reply interrupted", stream.into_partial()));
                }
                Some(Some(Ok(fragment))) => {
                    renderer.print_text(&fragment);
                    fragment_count += 1;
                }
                Some(Some(Err(err))) => return Err(err),
                Some(None) => break,
            }
        }
        renderer.finish_response();
        let reply = stream.into_partial();
        if reply.is_empty() {
            return Err(Error::streaming("reply contained no text", None));
        }

        let generated_title = {
            let needs_title = self.active_mut()?.has_sentinel_title();
            let title = if needs_title {
                let generated =
                    until_interrupted(renderer, self.titler.generate_title(&prompt)).await;
                Some(generated.unwrap_or_else(|| {
                    debug!("title request interrupted");
                    FALLBACK_TITLE.to_string()
                }))
            } else {
                None
            };
            let conversation = self.active_mut()?;
            conversation.messages.push(ChatMessage::assistant(reply.as_str()));
            if let Some(title) = &title {
                conversation.title = title.clone();
                renderer.print_title(title);
            }
            title
        };
        if let Some(title) = &generated_title {
            self.unsaved_title = Some(title.clone());
        }
        self.state = SessionState::Dirty;
        self.persist().await?;

        Ok(TurnOutcome {
            reply,
            fragment_count,
            generated_title,
        })
    }

    /// Store the active conversation off the async worker threads.
    async fn persist(&mut self) -> Result<()> {
        let (id, messages, title) = self.save_request()?;
        let store = self.store.clone();
        let result = tokio::task::spawn_blocking(move || {
            store.save(&id, &messages, title.as_deref())
        })
        .await
        .unwrap_or_else(|err| {
            Err(Error::storage(
                format!("save task failed: {err}"),
                None,
                None,
            ))
        });
        self.finish_save(result)
    }

    fn save_request(&mut self) -> Result<(String, Vec<ChatMessage>, Option<String>)> {
        let title = self.unsaved_title.clone();
        let conversation = self.writable_mut()?;
        Ok((conversation.id.clone(), conversation.messages.clone(), title))
    }

    fn finish_save(&mut self, result: Result<String>) -> Result<()> {
        let stored_title = match result {
            Ok(title) => title,
            Err(err) => {
                self.state = SessionState::Dirty;
                return Err(err);
            }
        };
        let conversation = self.active_mut()?;
        debug!(
            chat_id = %conversation.id,
            messages = conversation.messages.len(),
            title = %stored_title,
            "stored conversation"
        );
        conversation.title = stored_title;
        self.unsaved_title = None;
        self.state = SessionState::Clean;
        Ok(())
    }
}

/// Await `future`, giving up as soon as the renderer asks for an interrupt.
async fn until_interrupted<F: Future>(
    renderer: &mut dyn Renderer,
    future: F,
) -> Option<F::Output> {
    tokio::pin!(future);
    loop {
        if renderer.should_interrupt() {
            return None;
        }
        if let Ok(output) = tokio::time::timeout(INTERRUPT_POLL, &mut future).await {
            return Some(output);
        }
    }
}
