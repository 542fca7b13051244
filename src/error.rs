//! Error types for the assistant core.

/// Top-level error type for the conversation and playback subsystems.
#[derive(Debug, thiserror::Error)]
pub enum AssistError {
    /// Streaming completion request or response error.
    #[error("LLM error: {0}")]
    Llm(String),

    /// Speech synthesis error.
    #[error("TTS error: {0}")]
    Tts(String),

    /// Audio device, decode, or output-stream error.
    #[error("audio error: {0}")]
    Audio(String),

    /// Conversation history storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, AssistError>;
