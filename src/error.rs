//! Error types for the audio-to-intent runtime.
//!
//! The hot path (VAD/UAP) never propagates errors: per the error handling
//! design, frame-level failures are recovered locally and surfaced only as
//! metrics counters. This type exists for the boundary operations that do
//! have a caller worth reporting to: provider dispatch, registry
//! persistence, the scheduler, and notifications.

/// Top-level error type for the runtime.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Audio frame failed a structural invariant (length/format mismatch).
    #[error("audio error: {0}")]
    Audio(String),

    /// Voice activity detection error.
    #[error("VAD error: {0}")]
    Vad(String),

    /// ASR/wake-word/TTS provider error.
    #[error("provider error: {0}")]
    Provider(String),

    /// Pipeline/dispatcher coordination error.
    #[error("pipeline error: {0}")]
    Pipeline(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Client registry or persistence error.
    #[error("registry error: {0}")]
    Registry(String),

    /// Entity resolution error.
    #[error("resolver error: {0}")]
    Resolver(String),

    /// Scheduler error (timer registration, callback execution).
    #[error("scheduler error: {0}")]
    Scheduler(String),

    /// Notification delivery error.
    #[error("notification error: {0}")]
    Notification(String),

    /// I/O error (persistence, logging).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error (registry persistence).
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, RuntimeError>;
