//! Error types for fastimage_core.

use thiserror::Error;

/// Error types for load-and-cache operations.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("network unavailable")]
    NetworkUnavailable,

    #[error("fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("failed to decode image: {0}")]
    Decode(String),

    #[error("corrupt source removed: {0}")]
    CorruptSource(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for load-and-cache operations.
pub type LoadResult<T> = Result<T, LoadError>;
