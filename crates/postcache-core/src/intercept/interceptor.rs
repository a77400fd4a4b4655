//! The interception seam

use crate::cache::{CacheEntry, CacheKey};
use crate::error::PostcacheError;
use crate::http::{HttpRequest, NetworkResponse};
use async_trait::async_trait;

/// What the adapter should do with an outgoing request
#[derive(Debug, Clone, PartialEq)]
pub enum InterceptDecision {
    /// Send the original request untouched
    PassThrough,
    /// Send the original request and report its status for invalidation
    ObserveWrite { resource_id: String },
    /// Send the rewritten request and cache a successful response under `key`.
    /// `write_epoch` is the resource's write count when the decision was made;
    /// the response is not cached if a write lands before it arrives.
    Rewrite {
        request: HttpRequest,
        key: CacheKey,
        write_epoch: u64,
    },
    /// Answer from `entry` without waiting for the network
    ServeFromCache {
        request: HttpRequest,
        key: CacheKey,
        entry: CacheEntry,
        write_epoch: u64,
    },
}

impl InterceptDecision {
    /// The request that goes to the network if one is sent
    pub fn outgoing(&self, original: &HttpRequest) -> HttpRequest {
        match self {
            Self::Rewrite { request, .. } | Self::ServeFromCache { request, .. } => {
                request.clone()
            }
            Self::PassThrough | Self::ObserveWrite { .. } => original.clone(),
        }
    }

    /// Short name for logging
    pub fn label(&self) -> &'static str {
        match self {
            Self::PassThrough => "pass-through",
            Self::ObserveWrite { .. } => "observe-write",
            Self::Rewrite { .. } => "rewrite",
            Self::ServeFromCache { .. } => "serve-from-cache",
        }
    }
}

/// Hook between callers and the network.
///
/// `intercept` runs before every request. The remaining hooks report what
/// happened afterwards so the implementation can cache, refresh or
/// invalidate.
#[async_trait]
pub trait NetworkInterceptor: Send + Sync {
    async fn intercept(&self, request: &HttpRequest) -> InterceptDecision;

    /// A real response arrived for a request that went to the network
    async fn on_response(&self, _decision: &InterceptDecision, _response: &NetworkResponse) {}

    /// A cached answer was delivered for `request`
    async fn on_served_from_cache(&self, _key: &CacheKey, _request: &HttpRequest) {}

    /// A cached answer could not be synthesized; the real request follows
    fn on_synthesis_failed(&self, _key: &CacheKey, _error: &PostcacheError) {}
}
