//! UnifiedError trait implementation for PostcacheError

use super::types::{PostcacheError, UnifiedError};

impl UnifiedError for PostcacheError {
    fn error_code(&self) -> &str {
        match self {
            Self::Config { .. } => "POSTCACHE_CONFIG",
            Self::UrlParse { .. } => "POSTCACHE_URL_PARSE",
            Self::CacheDeserialization { .. } => "POSTCACHE_CACHE_DESERIALIZATION",
            Self::StorageQuota { .. } => "POSTCACHE_STORAGE_QUOTA",
            Self::Synthesis { .. } => "POSTCACHE_SYNTHESIS",
            Self::RefreshNetwork { .. } => "POSTCACHE_REFRESH_NETWORK",
            Self::Io { .. } => "POSTCACHE_IO",
            Self::Json { .. } => "POSTCACHE_JSON",
            Self::Http { .. } => "POSTCACHE_HTTP",
            Self::InvalidInput { .. } => "POSTCACHE_INVALID_INPUT",
            Self::Timeout { .. } => "POSTCACHE_TIMEOUT",
            Self::Storage { .. } => "POSTCACHE_STORAGE",
            Self::NotFound { .. } => "POSTCACHE_NOT_FOUND",
            Self::Other { .. } => "POSTCACHE_OTHER",
        }
    }

    fn message(&self) -> &str {
        match self {
            Self::Config { message, .. } => message,
            Self::UrlParse { message, .. } => message,
            Self::CacheDeserialization { message, .. } => message,
            Self::StorageQuota { .. } => "Storage quota exceeded",
            Self::Synthesis { message, .. } => message,
            Self::RefreshNetwork { message, .. } => message,
            Self::Io { message, .. } => message,
            Self::Json { message, .. } => message,
            Self::Http { message, .. } => message,
            Self::InvalidInput { message, .. } => message,
            Self::Timeout { .. } => "Operation timed out",
            Self::Storage { message, .. } => message,
            Self::NotFound { message, .. } => message,
            Self::Other { message, .. } => message,
        }
    }

    fn context(&self) -> Option<&str> {
        match self {
            Self::Config { context, .. } => context.as_deref(),
            Self::UrlParse { context, .. } => context.as_deref(),
            Self::CacheDeserialization { context, .. } => context.as_deref(),
            Self::StorageQuota { context, .. } => context.as_deref(),
            Self::Synthesis { context, .. } => context.as_deref(),
            Self::RefreshNetwork { context, .. } => context.as_deref(),
            Self::Io { context, .. } => context.as_deref(),
            Self::Json { context, .. } => context.as_deref(),
            Self::Http { context, .. } => context.as_deref(),
            Self::InvalidInput { context, .. } => context.as_deref(),
            Self::Timeout { context, .. } => context.as_deref(),
            Self::Storage { context, .. } => context.as_deref(),
            Self::NotFound { context, .. } => context.as_deref(),
            Self::Other { context, .. } => context.as_deref(),
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Http { .. } | Self::Timeout { .. } | Self::RefreshNetwork { .. }
        )
    }
}
