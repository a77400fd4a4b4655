//! Constructor methods for PostcacheError

use super::types::PostcacheError;

impl PostcacheError {
    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            context: None,
        }
    }

    /// Create a URL parse error for the given input
    pub fn url_parse(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UrlParse {
            url: url.into(),
            message: message.into(),
            context: None,
        }
    }

    /// Create a corrupt-record error for a persisted cache key
    pub fn cache_deserialization(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CacheDeserialization {
            key: key.into(),
            message: message.into(),
            context: None,
        }
    }

    /// Create a storage quota error
    pub fn storage_quota(key: impl Into<String>, required: u64, available: u64) -> Self {
        Self::StorageQuota {
            key: key.into(),
            required,
            available,
            context: None,
        }
    }

    /// Create a response synthesis error
    pub fn synthesis(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Synthesis {
            key: key.into(),
            message: message.into(),
            context: None,
        }
    }

    /// Create a background refresh error
    pub fn refresh_network(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RefreshNetwork {
            key: key.into(),
            message: message.into(),
            context: None,
        }
    }

    /// Create a new IO error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
            path: None,
            context: None,
        }
    }

    /// Create an IO error with path
    pub fn io_with_path(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
            path: Some(path.into()),
            context: None,
        }
    }

    /// Create a new JSON error
    pub fn json(message: impl Into<String>) -> Self {
        Self::Json {
            message: message.into(),
            context: None,
        }
    }

    /// Create a new HTTP error
    pub fn http(message: impl Into<String>) -> Self {
        Self::Http {
            message: message.into(),
            url: None,
            status_code: None,
            context: None,
        }
    }

    /// Create an HTTP error with status code
    pub fn http_with_status(message: impl Into<String>, status_code: u16) -> Self {
        Self::Http {
            message: message.into(),
            url: None,
            status_code: Some(status_code),
            context: None,
        }
    }

    /// Create a new invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            field: None,
            context: None,
        }
    }

    /// Create an invalid input error for a named field
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            field: Some(field.into()),
            context: None,
        }
    }

    /// Create a timeout error
    pub fn timeout(millis: u64) -> Self {
        Self::Timeout {
            millis,
            context: None,
        }
    }

    /// Create a new storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            context: None,
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            context: None,
        }
    }

    /// Create a generic error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
            context: None,
        }
    }
}
