//! Caching system for paginated list responses
//!
//! - **Memory tier**: LRU map of decoded entries, authoritative within a session
//! - **Persistent tier**: raw records behind [`PersistentTier`], surviving restarts
//!
//! Lifetime hit, miss and saved-time totals persist through [`PerfLog`].
//!
//! Entries are keyed by [`CacheKey`] and expire after the configured TTL.

pub mod perf;
pub mod storage;
pub mod store;
pub mod types;


pub use perf::{PERF_RECORD_NAME, PerfLog, PerfTotals};
pub use storage::{DiskStorage, InMemoryTier, PersistentTier};
pub use store::{CacheStore, DEFAULT_MEMORY_CAPACITY, InitReport};
pub use types::{
    CacheEntry, CacheKey, CacheStatistics, PutOutcome, current_time_ms, format_bytes, list_items,
};
