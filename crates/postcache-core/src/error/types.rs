//! Core error types and traits for postcache

use thiserror::Error;

/// Result type alias for postcache operations
pub type PostcacheResult<T> = Result<T, PostcacheError>;

/// Unified error trait that all postcache errors implement.
pub trait UnifiedError: std::error::Error + Send + Sync {
    /// Get the error code for programmatic handling
    fn error_code(&self) -> &str;

    /// Get the human-readable error message
    fn message(&self) -> &str;

    /// Get optional context about the error
    fn context(&self) -> Option<&str> {
        None
    }

    /// Check if this error is retryable
    fn is_retryable(&self) -> bool {
        false
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context<C: std::fmt::Display>(self, context: C) -> PostcacheResult<T>;

    /// Add context lazily (only evaluated on error)
    fn with_context<C: std::fmt::Display, F: FnOnce() -> C>(self, f: F) -> PostcacheResult<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn context<C: std::fmt::Display>(self, context: C) -> PostcacheResult<T> {
        self.map_err(|e| PostcacheError::other(format!("{}: {}", context, e)))
    }

    fn with_context<C: std::fmt::Display, F: FnOnce() -> C>(self, f: F) -> PostcacheResult<T> {
        self.map_err(|e| PostcacheError::other(format!("{}: {}", f(), e)))
    }
}

/// Main error type for postcache
#[derive(Error, Debug, Clone)]
pub enum PostcacheError {
    /// Configuration related errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        context: Option<String>,
    },

    /// A request URL could not be parsed or rewritten
    #[error("Invalid URL '{url}': {message}")]
    UrlParse {
        url: String,
        message: String,
        context: Option<String>,
    },

    /// A persisted cache record is not valid JSON or not a cache entry
    #[error("Corrupt cache record '{key}': {message}")]
    CacheDeserialization {
        key: String,
        message: String,
        context: Option<String>,
    },

    /// The persistent tier refused a write because it is full
    #[error("Storage quota exceeded for '{key}': need {required} bytes, {available} available")]
    StorageQuota {
        key: String,
        required: u64,
        available: u64,
        context: Option<String>,
    },

    /// A cached payload could not be turned into a consistent response
    #[error("Response synthesis failed for '{key}': {message}")]
    Synthesis {
        key: String,
        message: String,
        context: Option<String>,
    },

    /// The real request behind a background refresh failed
    #[error("Background refresh failed for '{key}': {message}")]
    RefreshNetwork {
        key: String,
        message: String,
        context: Option<String>,
    },

    /// IO errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        path: Option<String>,
        context: Option<String>,
    },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        context: Option<String>,
    },

    /// HTTP request errors
    #[error("HTTP error: {message}")]
    Http {
        message: String,
        url: Option<String>,
        status_code: Option<u16>,
        context: Option<String>,
    },

    /// Invalid input errors
    #[error("Invalid input: {message}")]
    InvalidInput {
        message: String,
        field: Option<String>,
        context: Option<String>,
    },

    /// Operation timeout
    #[error("Operation timed out after {millis} ms")]
    Timeout {
        millis: u64,
        context: Option<String>,
    },

    /// Storage/persistence errors
    #[error("Storage error: {message}")]
    Storage {
        message: String,
        context: Option<String>,
    },

    /// Resource not found
    #[error("Not found: {message}")]
    NotFound {
        message: String,
        context: Option<String>,
    },

    /// Generic error with context
    #[error("Error: {message}")]
    Other {
        message: String,
        context: Option<String>,
    },
}
