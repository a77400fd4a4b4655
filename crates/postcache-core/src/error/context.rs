//! Context management for PostcacheError

use super::types::PostcacheError;

impl PostcacheError {
    /// Add context to any error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        let ctx = Some(context.into());
        match &mut self {
            Self::Config { context: c, .. } => *c = ctx,
            Self::UrlParse { context: c, .. } => *c = ctx,
            Self::CacheDeserialization { context: c, .. } => *c = ctx,
            Self::StorageQuota { context: c, .. } => *c = ctx,
            Self::Synthesis { context: c, .. } => *c = ctx,
            Self::RefreshNetwork { context: c, .. } => *c = ctx,
            Self::Io { context: c, .. } => *c = ctx,
            Self::Json { context: c, .. } => *c = ctx,
            Self::Http { context: c, .. } => *c = ctx,
            Self::InvalidInput { context: c, .. } => *c = ctx,
            Self::Timeout { context: c, .. } => *c = ctx,
            Self::Storage { context: c, .. } => *c = ctx,
            Self::NotFound { context: c, .. } => *c = ctx,
            Self::Other { context: c, .. } => *c = ctx,
        }
        self
    }
}
