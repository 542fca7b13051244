//! Single-flight playback coordinator for synthesized speech.
//!
//! [`SpeechPlayer`] converts a message's text to speech and plays at most
//! one audio stream at a time process-wide. Observers subscribe for every
//! state transition and receive the current state immediately on
//! subscription. A new `play` always tears down the previous request;
//! superseded requests are suppressed with a generation token even when
//! their underlying I/O resolves later.
//!
//! The player is an explicitly constructed instance shared by handle
//! (`Arc`), not ambient global state; tests build a fresh one each time.

use std::sync::{Arc, Mutex};

use tracing::warn;

use super::decode;
use super::sink::AudioSink;
use crate::chat::message::MessageId;
use crate::llm::SpeechSynthesizer;

/// Fixed error text attached to a failed playback request.
pub const PLAYBACK_FAILURE_MESSAGE: &str = "Could not play audio.";

/// Playback status of the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    /// Nothing playing or pending.
    Idle,
    /// Synthesis or decoding in progress.
    Loading,
    /// Audio playing.
    Playing,
    /// The most recent request failed.
    Error,
}

/// Broadcast state of the playback coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackState {
    /// Current status.
    pub status: PlaybackStatus,
    /// The message the state refers to, when loading/playing/errored.
    pub message_id: Option<MessageId>,
    /// Error text, when `status` is [`PlaybackStatus::Error`].
    pub error: Option<String>,
}

impl PlaybackState {
    /// The idle state: no message, no error.
    pub fn idle() -> Self {
        Self {
            status: PlaybackStatus::Idle,
            message_id: None,
            error: None,
        }
    }

    fn loading(message_id: &str) -> Self {
        Self {
            status: PlaybackStatus::Loading,
            message_id: Some(message_id.to_string()),
            error: None,
        }
    }

    fn playing(message_id: &str) -> Self {
        Self {
            status: PlaybackStatus::Playing,
            message_id: Some(message_id.to_string()),
            error: None,
        }
    }

    fn error(message_id: &str) -> Self {
        Self {
            status: PlaybackStatus::Error,
            message_id: Some(message_id.to_string()),
            error: Some(PLAYBACK_FAILURE_MESSAGE.to_string()),
        }
    }
}

/// Callback receiving every playback state transition.
pub type PlaybackListener = Box<dyn Fn(PlaybackState) + Send + Sync>;

/// Handle returned by [`SpeechPlayer::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type StoredListener = Arc<dyn Fn(PlaybackState) + Send + Sync>;

struct PlayerInner {
    state: PlaybackState,
    listeners: Vec<(SubscriptionId, StoredListener)>,
    next_subscription: u64,
    /// Incremented on every new request or stop; side effects of older
    /// requests compare against it and go silent when stale.
    generation: u64,
}

/// Single-flight speech playback coordinator.
pub struct SpeechPlayer {
    synth: Arc<dyn SpeechSynthesizer>,
    sink: Arc<dyn AudioSink>,
    inner: Arc<Mutex<PlayerInner>>,
}

impl SpeechPlayer {
    /// Create a coordinator over the given synthesizer and sink.
    pub fn new(synth: Arc<dyn SpeechSynthesizer>, sink: Arc<dyn AudioSink>) -> Self {
        Self {
            synth,
            sink,
            inner: Arc::new(Mutex::new(PlayerInner {
                state: PlaybackState::idle(),
                listeners: Vec::new(),
                next_subscription: 0,
                generation: 0,
            })),
        }
    }

    /// Register an observer for every subsequent state change.
    ///
    /// The observer is immediately invoked with the current state, so a
    /// late subscriber cannot miss the initial state.
    pub fn subscribe(&self, listener: PlaybackListener) -> SubscriptionId {
        let listener: StoredListener = Arc::from(listener);
        let (id, state) = {
            let mut inner = lock_inner(&self.inner);
            let id = SubscriptionId(inner.next_subscription);
            inner.next_subscription += 1;
            inner.listeners.push((id, Arc::clone(&listener)));
            (id, inner.state.clone())
        };
        listener(state);
        id
    }

    /// Remove an observer. Safe to call repeatedly.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut inner = lock_inner(&self.inner);
        inner.listeners.retain(|(sub, _)| *sub != id);
    }

    /// Current broadcast state.
    pub fn state(&self) -> PlaybackState {
        lock_inner(&self.inner).state.clone()
    }

    /// Request playback of `text` on behalf of `message_id`.
    ///
    /// A second `play` for the message currently playing stops it
    /// (toggle). Any other in-progress request is unconditionally torn
    /// down first. Empty text is silently ignored.
    pub async fn play(&self, message_id: &str, text: &str) {
        if text.trim().is_empty() {
            return;
        }

        // Preempt whatever is active. For the toggle case that is the
        // whole request; otherwise claim a fresh generation.
        let (generation, toggled) = mutate(&self.inner, |inner| {
            let same_playing = inner.state.status == PlaybackStatus::Playing
                && inner.state.message_id.as_deref() == Some(message_id);
            inner.generation += 1;
            self.sink.stop();
            inner.state = PlaybackState::idle();
            ((inner.generation, same_playing), true)
        });
        if toggled {
            return;
        }

        let claimed = mutate(&self.inner, |inner| {
            if inner.generation != generation {
                return (false, false);
            }
            inner.state = PlaybackState::loading(message_id);
            (true, true)
        });
        if !claimed {
            return;
        }

        let samples = match self.synth.synthesize(text).await {
            Ok(payload) => decode::pcm16_to_f32(&payload),
            Err(e) => Err(e),
        };

        let samples = match samples {
            Ok(samples) => samples,
            Err(e) => {
                warn!(error = %e, message_id, "speech playback failed");
                mutate(&self.inner, |inner| {
                    if inner.generation != generation {
                        return ((), false);
                    }
                    inner.state = PlaybackState::error(message_id);
                    ((), true)
                });
                return;
            }
        };

        // Start the sink and publish `playing` in one critical section so
        // a preempting request cannot interleave between them. The sink
        // must invoke `on_end` asynchronously, never from within `start`.
        let inner_handle = Arc::clone(&self.inner);
        let on_end = Box::new(move || {
            mutate(&inner_handle, |inner| {
                if inner.generation != generation {
                    return ((), false);
                }
                inner.state = PlaybackState::idle();
                ((), true)
            });
        });

        mutate(&self.inner, |inner| {
            if inner.generation != generation {
                return ((), false);
            }
            match self.sink.start(samples, on_end) {
                Ok(()) => {
                    inner.state = PlaybackState::playing(message_id);
                }
                Err(e) => {
                    warn!(error = %e, message_id, "output stream failed");
                    inner.state = PlaybackState::error(message_id);
                }
            }
            ((), true)
        });
    }

    /// Unconditionally halt playback and reset to idle.
    ///
    /// The halted request's completion callback is suppressed even if its
    /// audio or I/O resolves later.
    pub fn stop(&self) {
        mutate(&self.inner, |inner| {
            inner.generation += 1;
            self.sink.stop();
            inner.state = PlaybackState::idle();
            ((), true)
        });
    }
}

fn lock_inner(inner: &Arc<Mutex<PlayerInner>>) -> std::sync::MutexGuard<'_, PlayerInner> {
    inner.lock().unwrap_or_else(|e| e.into_inner())
}

/// Apply a mutation under the lock, then broadcast the resulting state to
/// all listeners outside it when the mutation asks for a notification.
fn mutate<R>(
    inner: &Arc<Mutex<PlayerInner>>,
    f: impl FnOnce(&mut PlayerInner) -> (R, bool),
) -> R {
    let (result, notify, state, listeners) = {
        let mut guard = lock_inner(inner);
        let (result, notify) = f(&mut guard);
        let listeners: Vec<StoredListener> = guard
            .listeners
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        (result, notify, guard.state.clone(), listeners)
    };
    if notify {
        for listener in listeners {
            listener(state.clone());
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::sink::EndCallback;
    use crate::error::{AssistError, Result};
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    /// Synthesizer returning a fixed PCM payload, optionally failing the
    /// first N calls or holding the first call until released.
    struct MockSynth {
        failures_left: StdMutex<u32>,
        gate: StdMutex<Option<tokio::sync::oneshot::Receiver<()>>>,
    }

    impl MockSynth {
        fn ok() -> Arc<Self> {
            Arc::new(Self {
                failures_left: StdMutex::new(0),
                gate: StdMutex::new(None),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                failures_left: StdMutex::new(u32::MAX),
                gate: StdMutex::new(None),
            })
        }

        fn failing_once() -> Arc<Self> {
            Arc::new(Self {
                failures_left: StdMutex::new(1),
                gate: StdMutex::new(None),
            })
        }

        fn gated() -> (Arc<Self>, tokio::sync::oneshot::Sender<()>) {
            let (tx, rx) = tokio::sync::oneshot::channel();
            let synth = Arc::new(Self {
                failures_left: StdMutex::new(0),
                gate: StdMutex::new(Some(rx)),
            });
            (synth, tx)
        }
    }

    #[async_trait]
    impl SpeechSynthesizer for MockSynth {
        async fn synthesize(&self, _text: &str) -> Result<Vec<u8>> {
            let gate = self.gate.lock().unwrap_or_else(|e| e.into_inner()).take();
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            {
                let mut failures = self.failures_left.lock().unwrap_or_else(|e| e.into_inner());
                if *failures > 0 {
                    *failures = failures.saturating_sub(1);
                    return Err(AssistError::Tts("no audio data".into()));
                }
            }
            // Two s16le samples.
            Ok(vec![0x00, 0x10, 0x00, 0xF0])
        }
    }

    /// Sink that records starts/stops and lets tests fire completion.
    #[derive(Default)]
    struct MockSink {
        pending_ends: StdMutex<Vec<EndCallback>>,
        starts: StdMutex<u32>,
        stops: StdMutex<u32>,
    }

    impl MockSink {
        fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn fire_end(&self) {
            let callback = self
                .pending_ends
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .pop();
            if let Some(callback) = callback {
                callback();
            }
        }

        fn start_count(&self) -> u32 {
            *self.starts.lock().unwrap_or_else(|e| e.into_inner())
        }

        fn stop_count(&self) -> u32 {
            *self.stops.lock().unwrap_or_else(|e| e.into_inner())
        }
    }

    impl AudioSink for MockSink {
        fn start(&self, _samples: Vec<f32>, on_end: EndCallback) -> Result<()> {
            *self.starts.lock().unwrap_or_else(|e| e.into_inner()) += 1;
            self.pending_ends
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(on_end);
            Ok(())
        }

        fn stop(&self) {
            *self.stops.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        }
    }

    /// Collects every broadcast state for later assertions.
    fn recording_subscriber(player: &SpeechPlayer) -> Arc<StdMutex<Vec<PlaybackState>>> {
        let states: Arc<StdMutex<Vec<PlaybackState>>> = Arc::new(StdMutex::new(Vec::new()));
        let states_clone = Arc::clone(&states);
        player.subscribe(Box::new(move |state| {
            let Ok(mut guard) = states_clone.lock() else {
                return;
            };
            guard.push(state);
        }));
        states
    }

    fn statuses(states: &Arc<StdMutex<Vec<PlaybackState>>>) -> Vec<PlaybackStatus> {
        states
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|s| s.status)
            .collect()
    }

    // ── Subscription ──────────────────────────────────────────

    #[tokio::test]
    async fn subscriber_immediately_receives_current_state() {
        let player = SpeechPlayer::new(MockSynth::ok(), MockSink::new());
        let states = recording_subscriber(&player);

        let recorded = statuses(&states);
        assert_eq!(recorded, vec![PlaybackStatus::Idle]);
    }

    #[tokio::test]
    async fn late_subscriber_sees_playing_state() {
        let sink = MockSink::new();
        let player = SpeechPlayer::new(MockSynth::ok(), Arc::clone(&sink) as Arc<dyn AudioSink>);
        player.play("msg-a", "hello").await;

        let states = recording_subscriber(&player);
        let recorded = states.lock().unwrap_or_else(|e| e.into_inner());
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].status, PlaybackStatus::Playing);
        assert_eq!(recorded[0].message_id.as_deref(), Some("msg-a"));
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent_and_stops_delivery() {
        let player = SpeechPlayer::new(MockSynth::ok(), MockSink::new());
        let states: Arc<StdMutex<Vec<PlaybackState>>> = Arc::new(StdMutex::new(Vec::new()));
        let states_clone = Arc::clone(&states);
        let id = player.subscribe(Box::new(move |state| {
            let Ok(mut guard) = states_clone.lock() else {
                return;
            };
            guard.push(state);
        }));

        player.unsubscribe(id);
        player.unsubscribe(id);
        player.play("msg-a", "hello").await;

        // Only the immediate replay was delivered.
        assert_eq!(states.lock().unwrap_or_else(|e| e.into_inner()).len(), 1);
    }

    // ── Happy path ────────────────────────────────────────────

    #[tokio::test]
    async fn play_transitions_loading_then_playing() {
        let sink = MockSink::new();
        let player = SpeechPlayer::new(MockSynth::ok(), Arc::clone(&sink) as Arc<dyn AudioSink>);
        let states = recording_subscriber(&player);

        player.play("msg-a", "hello").await;

        let recorded = statuses(&states);
        // Initial replay, preemptive idle, loading, playing.
        assert_eq!(
            recorded,
            vec![
                PlaybackStatus::Idle,
                PlaybackStatus::Idle,
                PlaybackStatus::Loading,
                PlaybackStatus::Playing,
            ]
        );
        assert_eq!(player.state().message_id.as_deref(), Some("msg-a"));
        assert_eq!(sink.start_count(), 1);
    }

    #[tokio::test]
    async fn natural_completion_resets_to_idle_without_message() {
        let sink = MockSink::new();
        let player = SpeechPlayer::new(MockSynth::ok(), Arc::clone(&sink) as Arc<dyn AudioSink>);

        player.play("msg-a", "hello").await;
        assert_eq!(player.state().status, PlaybackStatus::Playing);

        sink.fire_end();
        let state = player.state();
        assert_eq!(state.status, PlaybackStatus::Idle);
        assert!(state.message_id.is_none());
    }

    // ── Toggle semantics ──────────────────────────────────────

    #[tokio::test]
    async fn replaying_same_message_stops_instead_of_restarting() {
        let sink = MockSink::new();
        let player = SpeechPlayer::new(MockSynth::ok(), Arc::clone(&sink) as Arc<dyn AudioSink>);

        player.play("msg-a", "hello").await;
        assert_eq!(player.state().status, PlaybackStatus::Playing);

        player.play("msg-a", "hello").await;
        let state = player.state();
        assert_eq!(state.status, PlaybackStatus::Idle);
        assert!(state.message_id.is_none());
        // No second synthesis/playback was started.
        assert_eq!(sink.start_count(), 1);
    }

    #[tokio::test]
    async fn toggled_playback_suppresses_stale_completion() {
        let sink = MockSink::new();
        let player = SpeechPlayer::new(MockSynth::ok(), Arc::clone(&sink) as Arc<dyn AudioSink>);

        player.play("msg-a", "hello").await;
        player.play("msg-a", "hello").await;
        assert_eq!(player.state().status, PlaybackStatus::Idle);

        // The torn-down playback's completion must not change state.
        player.play("msg-b", "next").await;
        sink.fire_end(); // msg-b's own completion is fine...
        assert_eq!(player.state().status, PlaybackStatus::Idle);
        sink.fire_end(); // ...and msg-a's stale one is silent.
        assert_eq!(player.state().status, PlaybackStatus::Idle);
    }

    // ── Mutual exclusion ──────────────────────────────────────

    #[tokio::test]
    async fn new_play_preempts_in_flight_request() {
        let (gated_synth, release) = MockSynth::gated();
        let sink = MockSink::new();
        let player = Arc::new(SpeechPlayer::new(
            gated_synth,
            Arc::clone(&sink) as Arc<dyn AudioSink>,
        ));
        let states = recording_subscriber(&player);

        // First request parks in synthesis.
        let first = {
            let player = Arc::clone(&player);
            tokio::spawn(async move { player.play("msg-a", "first").await })
        };
        while player.state().status != PlaybackStatus::Loading {
            tokio::task::yield_now().await;
        }

        // Second request supersedes it and completes.
        player.play("msg-b", "second").await;
        assert_eq!(player.state().status, PlaybackStatus::Playing);
        assert_eq!(player.state().message_id.as_deref(), Some("msg-b"));

        // Release the first request; its completion must be invisible.
        let _ = release.send(());
        assert!(first.await.is_ok());
        assert_eq!(player.state().status, PlaybackStatus::Playing);
        assert_eq!(player.state().message_id.as_deref(), Some("msg-b"));

        // Only msg-b ever reached the sink.
        assert_eq!(sink.start_count(), 1);
        let recorded = states.lock().unwrap_or_else(|e| e.into_inner());
        let playing_ids: Vec<_> = recorded
            .iter()
            .filter(|s| s.status == PlaybackStatus::Playing)
            .filter_map(|s| s.message_id.as_deref())
            .collect();
        assert_eq!(playing_ids, vec!["msg-b"]);
    }

    #[tokio::test]
    async fn stop_halts_playback_and_suppresses_completion() {
        let sink = MockSink::new();
        let player = SpeechPlayer::new(MockSynth::ok(), Arc::clone(&sink) as Arc<dyn AudioSink>);

        player.play("msg-a", "hello").await;
        player.stop();

        let state = player.state();
        assert_eq!(state.status, PlaybackStatus::Idle);
        assert!(state.message_id.is_none());
        assert!(sink.stop_count() >= 1);

        // The stopped playback's completion callback is stale.
        sink.fire_end();
        assert_eq!(player.state().status, PlaybackStatus::Idle);
    }

    // ── Failure semantics ─────────────────────────────────────

    #[tokio::test]
    async fn synthesis_failure_sets_error_for_that_message() {
        let player = SpeechPlayer::new(MockSynth::failing(), MockSink::new());

        player.play("msg-c", "unlucky").await;

        let state = player.state();
        assert_eq!(state.status, PlaybackStatus::Error);
        assert_eq!(state.message_id.as_deref(), Some("msg-c"));
        assert_eq!(state.error.as_deref(), Some(PLAYBACK_FAILURE_MESSAGE));
    }

    #[tokio::test]
    async fn error_clears_on_next_successful_play() {
        let sink = MockSink::new();
        let player = SpeechPlayer::new(
            MockSynth::failing_once(),
            Arc::clone(&sink) as Arc<dyn AudioSink>,
        );

        player.play("msg-c", "unlucky").await;
        assert_eq!(player.state().status, PlaybackStatus::Error);
        assert_eq!(player.state().message_id.as_deref(), Some("msg-c"));

        // The coordinator stays usable after a failed request.
        let states = recording_subscriber(&player);
        player.play("msg-d", "better").await;
        let recorded = statuses(&states);
        assert_eq!(
            recorded,
            vec![
                PlaybackStatus::Error,
                PlaybackStatus::Idle,
                PlaybackStatus::Loading,
                PlaybackStatus::Playing,
            ]
        );
        let state = player.state();
        assert_eq!(state.status, PlaybackStatus::Playing);
        assert_eq!(state.message_id.as_deref(), Some("msg-d"));
        assert!(state.error.is_none());
    }

    // ── Input validation ──────────────────────────────────────

    #[tokio::test]
    async fn empty_text_is_ignored() {
        let sink = MockSink::new();
        let player = SpeechPlayer::new(MockSynth::ok(), Arc::clone(&sink) as Arc<dyn AudioSink>);
        let states = recording_subscriber(&player);

        player.play("msg-a", "").await;
        player.play("msg-a", "   ").await;

        assert_eq!(statuses(&states), vec![PlaybackStatus::Idle]);
        assert_eq!(sink.start_count(), 0);
    }
}
