//! Error types for the speech front end.

/// Top-level error type for the streaming speech pipeline.
#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    /// Synthesis backend request or stream error.
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Audio device, decode, or playback buffer error.
    #[error("audio error: {0}")]
    Audio(String),

    /// Pipeline coordination error.
    #[error("pipeline error: {0}")]
    Pipeline(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, VoiceError>;
