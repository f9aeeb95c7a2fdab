//! Error types for mfo-resolve
//!
//! Nothing in a resolution session is globally fatal. These errors are
//! returned to callers of the clients and controller operations, and the
//! controller also surfaces them as error lines in the session buffer.

use thiserror::Error;

/// Resolution error type
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Backend process channel failure (open, input, terminate)
    #[error("Backend error: {0}")]
    Backend(String),

    /// Metadata lookup service failure
    #[error("Metadata lookup failed: {0}")]
    Metadata(String),

    /// Item not found (404 from a service)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Response body could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Request rejected before anything was sent
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// mfo-common error
    #[error("Common error: {0}")]
    Common(#[from] mfo_common::Error),
}

/// Result type for resolution operations
pub type ResolveResult<T> = Result<T, ResolveError>;
