//! Postcache Core Library
//!
//! This crate provides a cache-then-network layer for paginated helpdesk list
//! endpoints, including request classification, page-size rewriting,
//! two-tier caching, response synthesis and background refresh.

pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod http;
pub mod intercept;
pub mod invalidation;
pub mod preload;
pub mod refresh;
pub mod service;

// Re-export commonly used types
pub use cache::{CacheEntry, CacheKey, CacheStatistics, CacheStore, DiskStorage, PutOutcome};
pub use config::{ConfigHandle, ConfigPersistence, ConfigStore, Configuration, LoggingConfig};
pub use error::{PostcacheError, PostcacheResult};
pub use events::{Event, EventBus, SharedEventBus};
pub use http::{HttpRequest, NetworkResponse, ReqwestTransport, ResponseView, Transport};
pub use intercept::{InterceptDecision, InterceptingClient, NetworkInterceptor};
pub use invalidation::{Invalidator, WriteEpochs};
pub use preload::{PreloadSummary, Preloader};
pub use refresh::BackgroundRefresher;
pub use service::{CacheService, CacheServiceBuilder};
