//! Kinesia: conversation and speech-playback core for an AI
//! physiotherapy assistant.
//!
//! # Architecture
//!
//! Two cooperating components sit at the center:
//! - **Conversation session manager** ([`chat::session::ChatSession`]):
//!   owns one conversation log, builds the bounded context window sent to
//!   the completion API, streams the reply into a placeholder message,
//!   and reconciles delivery statuses.
//! - **Playback coordinator** ([`audio::player::SpeechPlayer`]): converts
//!   a message's text to synthesized speech and plays at most one audio
//!   stream at a time process-wide, broadcasting state to observers.
//!
//! Both talk to collaborators through traits: streaming completion and
//! speech synthesis ([`llm`]), audio output ([`audio::sink`]), and
//! durable history storage ([`storage`]).

pub mod audio;
pub mod chat;
pub mod config;
pub mod error;
pub mod llm;
pub mod storage;

pub use audio::player::{PlaybackState, PlaybackStatus, SpeechPlayer};
pub use chat::session::{ChatSession, StreamPhase};
pub use chat::ChatProfile;
pub use config::AssistConfig;
pub use error::{AssistError, Result};
pub use llm::gemini::GeminiClient;
