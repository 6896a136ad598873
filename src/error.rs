//! Error types for the biostream pipeline

use thiserror::Error;

/// Errors surfaced by the library.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid sample: {0}")]
    InvalidSample(String),

    #[error("Invalid session length: {0} minutes (expected 3, 5, 10 or 15)")]
    InvalidSessionLength(u64),

    #[error("A session is already active")]
    SessionActive,

    #[error("No session is active")]
    NoActiveSession,

    #[error("Device is not connected")]
    NotConnected,

    #[error("Failed to spawn worker '{0}': {1}")]
    WorkerSpawn(String, std::io::Error),

    #[error("Worker '{0}' has shut down")]
    WorkerDisconnected(String),

    #[error("Collector is already running")]
    CollectorRunning,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
