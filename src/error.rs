//! Error types for the voice bridge.

/// Top-level error type for the job tracking bridge.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Audio device or stream error (microphone acquisition, playback setup).
    #[error("audio error: {0}")]
    Audio(String),

    /// Realtime session lifecycle error (bad state, setup rejected).
    #[error("session error: {0}")]
    Session(String),

    /// Transport-level error on the realtime connection.
    #[error("transport error: {0}")]
    Transport(String),

    /// Task repository error (create/update/delete rejected).
    #[error("repository error: {0}")]
    Repository(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, BridgeError>;
