//! Collaborator seams for streaming completion and speech synthesis.
//!
//! The session manager and playback coordinator talk to these traits, not
//! to a concrete provider. [`GeminiClient`](gemini::GeminiClient)
//! implements both against the Gemini REST API; tests substitute scripted
//! mocks.

pub mod gemini;
pub mod sse;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use crate::chat::message::{Attachment, ChatMessage, Role};
use crate::error::Result;

/// An asynchronous sequence of incremental response text chunks.
///
/// Chunk granularity is arbitrary: a chunk may be any substring of the
/// final response, and consumers must apply chunks in arrival order.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// One role-tagged part of the bounded context sent per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextPart {
    /// Who authored this part.
    pub role: Role,
    /// Part text.
    pub text: String,
    /// Inline images (posture photos, range-of-motion frames).
    pub images: Vec<Attachment>,
}

impl ContextPart {
    /// Create a text-only part.
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            images: Vec::new(),
        }
    }

    /// Create a part carrying inline images alongside text.
    pub fn with_images(role: Role, text: impl Into<String>, images: Vec<Attachment>) -> Self {
        Self {
            role,
            text: text.into(),
            images,
        }
    }

    /// Map a log entry to a context part.
    pub fn from_message(message: &ChatMessage) -> Self {
        Self {
            role: message.role,
            text: message.content.clone(),
            images: message.attachments.clone(),
        }
    }
}

/// Which system-instruction profile a request runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestProfile {
    /// Patient-facing symptom assistant.
    Patient,
    /// Clinician-facing clinical assistant.
    Clinician,
    /// Postural image analysis.
    Posture,
    /// Range-of-motion image analysis.
    RangeOfMotion,
}

/// Caller-supplied mode flag for a completion request.
///
/// `thinking` trades latency for reasoning depth; the backend maps it to
/// a different model and attaches a thinking budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestMode {
    /// Instruction profile.
    pub profile: RequestProfile,
    /// Whether thinking mode is on.
    pub thinking: bool,
}

impl RequestMode {
    /// Plain (non-thinking) request under the given profile.
    pub fn plain(profile: RequestProfile) -> Self {
        Self {
            profile,
            thinking: false,
        }
    }

    /// Thinking-mode request under the given profile.
    pub fn thinking(profile: RequestProfile) -> Self {
        Self {
            profile,
            thinking: true,
        }
    }
}

/// Streaming text-completion capability.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Open a streaming completion request seeded with the given context.
    ///
    /// Resolves once response headers arrive; chunks follow on the
    /// returned stream until natural end-of-stream or an error item.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be opened.
    async fn stream_chat(&self, context: &[ContextPart], mode: RequestMode)
        -> Result<ChunkStream>;
}

/// Speech synthesis capability.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize speech for `text`.
    ///
    /// Returns a single complete payload of 24 kHz mono s16le PCM (not
    /// streamed).
    ///
    /// # Errors
    ///
    /// Returns an error if synthesis fails or yields no audio.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}
