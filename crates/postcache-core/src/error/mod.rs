//! Error types for postcache
//!
//! All errors implement the `UnifiedError` trait which provides consistent fields:
//! - error_code: A unique identifier for programmatic error handling
//! - message: Human-readable error message
//! - context: Optional additional context about where/why the error occurred
//!
//! Most variants describe failures the interception layer recovers from locally
//! (a malformed URL, a corrupt persisted record, a storage quota rejection, a
//! failed synthesis or background refresh). None of them is allowed to reach the
//! caller of an intercepted request.

mod constructors;
mod context;
mod conversions;
mod types;
mod unified_error;

pub use types::{PostcacheError, PostcacheResult, ResultExt, UnifiedError};
