//! Error types shared across the router.
//!
//! # Design Decisions
//! - Setup-time failures (`RouterError`) are returned to the caller, never panics
//! - Request-time failures (`ContextError`) are local to one request
//! - `ServerError` is what `listen` hands back when the serving loop ends

use thiserror::Error;

/// Errors raised while building the route tree.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouterError {
    /// Group prefix was empty or did not start with `/`.
    #[error("group pattern {0:?} is invalid: it can't be empty and has to start with / (slash)")]
    InvalidGroupPattern(String),

    /// Route pattern was empty or did not start with `/`.
    #[error("route pattern {0:?} is invalid: it has to start with / (slash)")]
    InvalidPattern(String),

    /// The multiplexer already holds a handler for this pattern.
    #[error("multiple registrations for {0}")]
    DuplicatePattern(String),
}

/// Errors raised by per-request context operations.
#[derive(Debug, Error)]
pub enum ContextError {
    /// No cookie with this name was sent by the client.
    #[error("session cookie {0:?} not found")]
    SessionNotFound(String),

    /// Cookie names must be RFC 6265 tokens.
    #[error("invalid cookie name {0:?}")]
    InvalidCookieName(String),

    /// A context value exists under `key` but holds another type.
    #[error("context value {key:?} is not a {expected}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
    },

    /// Response value could not be serialized.
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    /// A header name or value was rejected.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// File could not be read while serving it.
    #[error("file error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that end the serving loop.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind the listen address.
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// The listener failed while serving.
    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}
