//! ICE engine error types

use thiserror::Error;

/// Errors surfaced by a peer connection implementation
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid session description: {0}")]
    InvalidDescription(String),

    #[error("Invalid ICE candidate: {0}")]
    InvalidCandidate(String),

    #[error("Connection closed")]
    Closed,

    #[error("Statistics unavailable: {0}")]
    Stats(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Engine error: {0}")]
    Backend(String),
}
