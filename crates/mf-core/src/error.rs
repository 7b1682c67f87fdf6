//! # FeedError
//!
//! Centralized error handling for the minifeed engine.
//! Adapters report opaque `anyhow` failures; the engine maps them here.

use thiserror::Error;

/// The primary error type for all engine operations.
#[derive(Error, Debug)]
pub enum FeedError {
    /// Resource not found in durable storage (e.g., Post)
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// A cache-store or durable-store call failed; the caller may retry.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Malformed cursor, non-positive limit, self-follow.
    /// Feed endpoints clamp instead of surfacing this.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A cache-layer failure absorbed by falling back to a slower path.
    #[error("degraded: {0}")]
    Degraded(String),
}

impl FeedError {
    pub fn post_not_found(id: u64) -> Self {
        FeedError::NotFound("Post".to_string(), id.to_string())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, FeedError::Transient(_))
    }
}

impl From<anyhow::Error> for FeedError {
    fn from(err: anyhow::Error) -> Self {
        FeedError::Transient(format!("{err:#}"))
    }
}

/// A specialized Result type for minifeed logic.
pub type Result<T> = std::result::Result<T, FeedError>;
