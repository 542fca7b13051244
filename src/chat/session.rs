//! Conversation session manager.
//!
//! [`ChatSession`] owns the message log for one conversation and
//! mediates exactly one streaming completion request at a time. A send
//! appends the user message, slices the bounded context window, opens a
//! stream, fills a model placeholder chunk by chunk, and reconciles
//! delivery statuses; every log mutation triggers a best-effort history
//! write that never blocks the caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use tracing::{error, warn};

use super::log::ChatLog;
use super::message::{ChatMessage, Role};
use super::ChatProfile;
use crate::config::ChatConfig;
use crate::llm::{ChatBackend, ContextPart, RequestMode};
use crate::storage::HistoryStore;

/// Fixed apology left in place of a response when an exchange fails
/// before any text arrives.
pub const STREAM_FAILURE_MESSAGE: &str =
    "Sorry, the AI service is not available. Please try again later.";

/// Streaming state of one conversation.
///
/// `send_message` is accepted only in `Idle`; the session moves to
/// `AwaitingStream` when a request opens, to `Streaming` on the first
/// chunk, and back to `Idle` when the stream ends regardless of outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    /// No exchange in flight.
    Idle,
    /// Request opened, no chunk received yet.
    AwaitingStream,
    /// Response chunks arriving.
    Streaming,
}

/// Callback invoked with each applied response chunk, so a front end can
/// repaint as text arrives.
pub type DeltaListener = Box<dyn Fn(&str) + Send + Sync>;

struct SessionInner {
    log: ChatLog,
    phase: StreamPhase,
}

/// Manages one conversation log and its streaming exchanges.
///
/// Methods take `&self`; a session handle can be shared across UI tasks.
/// The busy-guard is the [`StreamPhase`] state machine, not the borrow
/// checker: a `send_message` while another is in flight is a silent
/// no-op.
pub struct ChatSession {
    profile: ChatProfile,
    context_window: usize,
    thinking: AtomicBool,
    backend: Arc<dyn ChatBackend>,
    store: Arc<dyn HistoryStore>,
    inner: Mutex<SessionInner>,
    delta_listener: Option<DeltaListener>,
}

impl ChatSession {
    /// Restore a session from storage, seeding a greeting on first run.
    ///
    /// A missing or corrupt stored history yields a fresh log with the
    /// profile's greeting; corruption is logged and discarded, never
    /// surfaced.
    pub async fn restore(
        profile: ChatProfile,
        config: &ChatConfig,
        backend: Arc<dyn ChatBackend>,
        store: Arc<dyn HistoryStore>,
    ) -> Self {
        let stored = match store.load(profile.storage_key()).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "discarding unreadable chat history");
                None
            }
        };
        let log = ChatLog::restore_or_seed(stored, profile.greeting());

        Self {
            profile,
            context_window: config.context_window,
            thinking: AtomicBool::new(false),
            backend,
            store,
            inner: Mutex::new(SessionInner {
                log,
                phase: StreamPhase::Idle,
            }),
            delta_listener: None,
        }
    }

    /// Attach a per-chunk listener. Builder-style; call before sharing
    /// the session.
    pub fn with_delta_listener(mut self, listener: DeltaListener) -> Self {
        self.delta_listener = Some(listener);
        self
    }

    /// The profile this session serves.
    pub fn profile(&self) -> ChatProfile {
        self.profile
    }

    /// Snapshot of the current log, oldest first.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.lock_inner().log.messages().to_vec()
    }

    /// Current streaming phase.
    pub fn phase(&self) -> StreamPhase {
        self.lock_inner().phase
    }

    /// Whether a new `send_message` would be accepted.
    pub fn is_idle(&self) -> bool {
        self.phase() == StreamPhase::Idle
    }

    /// Toggle thinking mode for subsequent sends.
    pub fn set_thinking_mode(&self, thinking: bool) {
        self.thinking.store(thinking, Ordering::Relaxed);
    }

    /// Whether thinking mode is on.
    pub fn thinking_mode(&self) -> bool {
        self.thinking.load(Ordering::Relaxed)
    }

    /// Send a user message and stream the model's reply into the log.
    ///
    /// Returns `false` without touching the log when `text` trims to
    /// empty or an exchange is already in flight; the caller is expected
    /// to disable its trigger while busy. Stream failures are absorbed
    /// into the log (fixed apology, or preserved partial content), never
    /// returned: the future resolves `true` once the exchange settles,
    /// successfully or not.
    pub async fn send_message(&self, text: &str) -> bool {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return false;
        }

        // Claim the state machine and build the context window in one
        // critical section, so two callers cannot both pass the guard.
        let context = {
            let mut inner = self.lock_inner();
            if inner.phase != StreamPhase::Idle {
                return false;
            }
            inner.phase = StreamPhase::AwaitingStream;

            let mut context: Vec<ContextPart> = inner
                .log
                .context_slice(self.context_window)
                .into_iter()
                .map(ContextPart::from_message)
                .collect();
            context.push(ContextPart::text(Role::User, trimmed));

            inner.log.append(ChatMessage::user(trimmed));
            inner.log.append(ChatMessage::model_placeholder());
            context
        };
        self.persist_snapshot();

        let mode = RequestMode {
            profile: self.profile.request_profile(),
            thinking: self.thinking_mode(),
        };

        match self.backend.stream_chat(&context, mode).await {
            Ok(stream) => self.consume_stream(stream).await,
            Err(e) => {
                error!(error = %e, "failed to open completion stream");
                self.absorb_failure();
            }
        }

        // Stream over, one way or the other: both sides of the exchange
        // settle to read, even when the first-chunk heuristic never fired.
        {
            let mut inner = self.lock_inner();
            inner.log.mark_preceding_user_read();
            inner.log.mark_last_read();
            inner.phase = StreamPhase::Idle;
        }
        self.persist_snapshot();
        true
    }

    /// Apply stream chunks to the trailing placeholder in arrival order.
    async fn consume_stream(&self, mut stream: crate::llm::ChunkStream) {
        let mut first_chunk = true;
        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => {
                    if chunk.is_empty() {
                        continue;
                    }
                    {
                        let mut inner = self.lock_inner();
                        if first_chunk {
                            // The model has started replying; treat the
                            // user's input as seen.
                            inner.log.mark_preceding_user_read();
                            inner.phase = StreamPhase::Streaming;
                            first_chunk = false;
                        }
                        inner.log.append_to_last_content(&chunk);
                    }
                    if let Some(listener) = &self.delta_listener {
                        listener(&chunk);
                    }
                    self.persist_snapshot();
                }
                Err(e) => {
                    error!(error = %e, "completion stream failed");
                    self.absorb_failure();
                    return;
                }
            }
        }
    }

    /// Surface a failed exchange in the log.
    ///
    /// An empty placeholder becomes the fixed apology; partial content
    /// is preserved as-is (no rollback).
    fn absorb_failure(&self) {
        let mut inner = self.lock_inner();
        if inner.log.has_open_placeholder() {
            inner.log.set_last_content(STREAM_FAILURE_MESSAGE);
        }
    }

    /// Write the full log to storage without blocking the caller.
    ///
    /// Best-effort: failures are logged and dropped, and a later write
    /// supersedes an earlier one (last-write-wins).
    fn persist_snapshot(&self) {
        let snapshot = self.lock_inner().log.messages().to_vec();
        let store = Arc::clone(&self.store);
        let key = self.profile.storage_key().to_string();
        tokio::spawn(async move {
            if let Err(e) = store.save(&key, &snapshot).await {
                warn!(error = %e, key, "history write failed");
            }
        });
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
