//! Two-tier cache store
//!
//! The memory tier is an LRU map and is authoritative within a session. The
//! persistent tier outlives the session; every read from it is validated, and
//! a record that does not decode to a [`CacheEntry`] for the requested key is
//! deleted. A ledger of persisted sizes and write times drives eviction.

use super::perf::PerfLog;
use super::storage::PersistentTier;
use super::types::{
    CacheEntry, CacheKey, CacheStatistics, PERSISTENT_PREFIX, PutOutcome, current_time_ms,
};
use crate::config::ConfigHandle;
use crate::error::{PostcacheError, PostcacheResult};
use crate::events::{Event, SharedEventBus};
use lru::LruCache;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default number of entries held by the memory tier
pub const DEFAULT_MEMORY_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Copy)]
struct LedgerEntry {
    size: u64,
    stored_at: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: u64,
    misses: u64,
    stores: u64,
    evictions: u64,
    quota_failures: u64,
    saved_ms_total: u64,
}

/// Result of scanning the persistent tier at startup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InitReport {
    pub loaded: usize,
    pub removed_corrupt: usize,
    pub removed_expired: usize,
}

/// Cache store over a memory tier and a persistent tier
pub struct CacheStore {
    memory: Mutex<LruCache<String, CacheEntry>>,
    persistent: Arc<dyn PersistentTier>,
    ledger: Mutex<HashMap<String, LedgerEntry>>,
    counters: Mutex<Counters>,
    perf: Option<Arc<PerfLog>>,
    config: ConfigHandle,
    events: SharedEventBus,
}

impl CacheStore {
    pub fn new(
        persistent: Arc<dyn PersistentTier>,
        config: ConfigHandle,
        events: SharedEventBus,
    ) -> Self {
        Self::with_memory_capacity(persistent, config, events, DEFAULT_MEMORY_CAPACITY)
    }

    pub fn with_memory_capacity(
        persistent: Arc<dyn PersistentTier>,
        config: ConfigHandle,
        events: SharedEventBus,
        capacity: usize,
    ) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            memory: Mutex::new(LruCache::new(capacity)),
            persistent,
            ledger: Mutex::new(HashMap::new()),
            counters: Mutex::new(Counters::default()),
            perf: None,
            config,
            events,
        }
    }

    /// Also accumulate hits and misses into a persisted [`PerfLog`]
    pub fn with_perf_log(mut self, perf: Arc<PerfLog>) -> Self {
        self.perf = Some(perf);
        self
    }

    /// Scan the persistent tier, build the ledger and drop corrupt or expired records
    pub async fn initialize(&self) -> PostcacheResult<InitReport> {
        self.initialize_at(current_time_ms()).await
    }

    pub async fn initialize_at(&self, now: u64) -> PostcacheResult<InitReport> {
        let ttl_ms = self.config.current().ttl_ms;
        let mut report = InitReport::default();
        let mut ledger = HashMap::new();

        for stored_key in self.persistent.keys().await? {
            let Some(key) = CacheKey::from_persistent_key(&stored_key) else {
                continue;
            };
            let Some(raw) = self.persistent.read(&stored_key).await? else {
                continue;
            };
            match decode_record(&key, &raw) {
                Ok(entry) if entry.is_valid_at(now, ttl_ms) => {
                    ledger.insert(
                        key.to_string(),
                        LedgerEntry {
                            size: raw.len() as u64,
                            stored_at: entry.stored_at,
                        },
                    );
                    report.loaded += 1;
                }
                Ok(_) => {
                    self.remove_persistent(&stored_key).await;
                    report.removed_expired += 1;
                }
                Err(e) => {
                    warn!("{}", e);
                    self.remove_persistent(&stored_key).await;
                    report.removed_corrupt += 1;
                }
            }
        }

        *self.ledger.lock() = ledger;
        info!(
            "Cache initialized: {} entries, {} expired and {} corrupt records removed",
            report.loaded, report.removed_expired, report.removed_corrupt
        );
        Ok(report)
    }

    /// Look up a valid entry
    pub async fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.get_at(key, current_time_ms()).await
    }

    pub async fn get_at(&self, key: &CacheKey, now: u64) -> Option<CacheEntry> {
        let ttl_ms = self.config.current().ttl_ms;
        let rendered = key.to_string();

        let in_memory = self.memory.lock().get(rendered.as_str()).cloned();
        if let Some(entry) = in_memory {
            if entry.is_valid_at(now, ttl_ms) {
                self.record_hit(&entry);
                return Some(entry);
            }
            debug!("Cache entry {} expired", rendered);
            self.remove_key(key).await;
            self.record_miss();
            return None;
        }

        let stored_key = key.persistent_key();
        let raw = match self.persistent.read(&stored_key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                self.record_miss();
                return None;
            }
            Err(e) => {
                warn!("Persistent cache read failed for {}: {}", rendered, e);
                self.record_miss();
                return None;
            }
        };

        match decode_record(key, &raw) {
            Ok(entry) if entry.is_valid_at(now, ttl_ms) => {
                self.memory.lock().put(rendered.clone(), entry.clone());
                self.ledger.lock().entry(rendered).or_insert(LedgerEntry {
                    size: raw.len() as u64,
                    stored_at: entry.stored_at,
                });
                self.record_hit(&entry);
                Some(entry)
            }
            Ok(_) => {
                debug!("Persisted cache entry {} expired", rendered);
                self.remove_key(key).await;
                self.record_miss();
                None
            }
            Err(e) => {
                warn!("{}", e);
                self.remove_key(key).await;
                self.record_miss();
                None
            }
        }
    }

    /// Store a payload under `key`, replacing any previous entry
    pub async fn put(
        &self,
        key: &CacheKey,
        payload: Value,
        source_url: &str,
        fetch_ms: Option<u64>,
    ) -> PutOutcome {
        self.put_at(key, payload, source_url, fetch_ms, current_time_ms())
            .await
    }

    pub async fn put_at(
        &self,
        key: &CacheKey,
        payload: Value,
        source_url: &str,
        fetch_ms: Option<u64>,
        now: u64,
    ) -> PutOutcome {
        let entry = CacheEntry::new(key, payload, now, source_url, fetch_ms);
        let rendered = entry.key.clone();
        self.memory.lock().put(rendered.clone(), entry.clone());
        self.counters.lock().stores += 1;

        let raw = match serde_json::to_string(&entry) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Cache entry {} not serializable: {}", rendered, e);
                return PutOutcome::MemoryOnly;
            }
        };

        match self.persistent.write(&key.persistent_key(), &raw).await {
            Ok(()) => {
                self.ledger.lock().insert(
                    rendered,
                    LedgerEntry {
                        size: raw.len() as u64,
                        stored_at: now,
                    },
                );
                self.enforce_budget_at(now).await;
                PutOutcome::Persisted
            }
            Err(e @ PostcacheError::StorageQuota { .. }) => {
                warn!("{}; keeping {} in memory only", e, rendered);
                self.counters.lock().quota_failures += 1;
                PutOutcome::MemoryOnly
            }
            Err(e) => {
                warn!("Persistent cache write failed for {}: {}", rendered, e);
                PutOutcome::MemoryOnly
            }
        }
    }

    /// Remove every entry whose key satisfies `predicate`; returns the number removed
    pub async fn invalidate<F>(&self, predicate: F) -> usize
    where
        F: Fn(&CacheKey) -> bool,
    {
        let victims: Vec<CacheKey> = self
            .all_keys()
            .await
            .into_iter()
            .filter(|key| predicate(key))
            .collect();

        for key in &victims {
            self.remove_key(key).await;
        }
        if !victims.is_empty() {
            debug!("Invalidated {} cache entries", victims.len());
        }
        victims.len()
    }

    /// Remove one entry from both tiers
    pub async fn remove(&self, key: &CacheKey) {
        self.remove_key(key).await;
    }

    /// Remove all entries and reset the session counters; returns the number removed.
    /// Lifetime totals in the [`PerfLog`] are kept.
    pub async fn clear(&self) -> usize {
        let keys = self.all_keys().await;
        self.memory.lock().clear();
        self.ledger.lock().clear();
        for key in &keys {
            self.remove_persistent(&key.persistent_key()).await;
        }
        *self.counters.lock() = Counters::default();
        info!("Cache cleared ({} entries)", keys.len());
        keys.len()
    }

    /// Purge all expired entries; returns the number removed
    pub async fn cleanup_expired(&self) -> usize {
        self.cleanup_expired_at(current_time_ms()).await
    }

    pub async fn cleanup_expired_at(&self, now: u64) -> usize {
        let ttl_ms = self.config.current().ttl_ms;
        let mut expired: HashSet<String> = self
            .memory
            .lock()
            .iter()
            .filter(|(_, entry)| !entry.is_valid_at(now, ttl_ms))
            .map(|(k, _)| k.clone())
            .collect();

        let stored_keys = match self.persistent.keys().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Failed to list persistent cache keys: {}", e);
                Vec::new()
            }
        };
        for stored_key in stored_keys {
            let Some(key) = CacheKey::from_persistent_key(&stored_key) else {
                continue;
            };
            let stale = match self.persistent.read(&stored_key).await {
                Ok(Some(raw)) => match decode_record(&key, &raw) {
                    Ok(entry) => !entry.is_valid_at(now, ttl_ms),
                    Err(_) => true,
                },
                Ok(None) => false,
                Err(_) => false,
            };
            if stale {
                expired.insert(key.to_string());
            }
        }

        for rendered in &expired {
            match CacheKey::parse(rendered) {
                Some(key) => self.remove_key(&key).await,
                None => {
                    self.memory.lock().pop(rendered.as_str());
                }
            }
        }
        if !expired.is_empty() {
            info!("Cleaned up {} expired cache entries", expired.len());
        }
        expired.len()
    }

    /// Run `cleanup_expired` every `interval` until the returned task is aborted
    pub fn spawn_cleanup_task(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                store.cleanup_expired().await;
            }
        })
    }

    pub fn statistics(&self) -> CacheStatistics {
        let max_bytes = self.config.current().max_cache_bytes;
        let (memory_entries, mut stamps) = {
            let memory = self.memory.lock();
            let stamps: Vec<u64> = memory.iter().map(|(_, entry)| entry.stored_at).collect();
            (memory.len(), stamps)
        };

        let (persistent_entries, persistent_bytes) = {
            let ledger = self.ledger.lock();
            stamps.extend(ledger.values().map(|e| e.stored_at));
            (ledger.len(), ledger.values().map(|e| e.size).sum())
        };

        let counters = self.counters.lock();
        CacheStatistics {
            memory_entries,
            persistent_entries,
            persistent_bytes,
            max_bytes,
            hits: counters.hits,
            misses: counters.misses,
            stores: counters.stores,
            evictions: counters.evictions,
            quota_failures: counters.quota_failures,
            saved_ms_total: counters.saved_ms_total,
            oldest_stored_at: stamps.iter().min().copied(),
            newest_stored_at: stamps.iter().max().copied(),
            lifetime: self.perf.as_ref().map(|perf| perf.totals()),
        }
    }

    fn record_hit(&self, entry: &CacheEntry) {
        let saved_ms = entry.fetch_ms.unwrap_or(0);
        {
            let mut counters = self.counters.lock();
            counters.hits += 1;
            counters.saved_ms_total += saved_ms;
        }
        if let Some(perf) = &self.perf {
            perf.record_hit(saved_ms);
        }
    }

    fn record_miss(&self) {
        self.counters.lock().misses += 1;
        if let Some(perf) = &self.perf {
            perf.record_miss();
        }
    }

    /// Keys known to either tier
    async fn all_keys(&self) -> Vec<CacheKey> {
        let mut rendered: HashSet<String> =
            self.memory.lock().iter().map(|(k, _)| k.clone()).collect();
        rendered.extend(self.ledger.lock().keys().cloned());

        match self.persistent.keys().await {
            Ok(keys) => rendered.extend(
                keys.iter()
                    .filter_map(|k| k.strip_prefix(PERSISTENT_PREFIX))
                    .map(String::from),
            ),
            Err(e) => warn!("Failed to list persistent cache keys: {}", e),
        }

        rendered.iter().filter_map(|k| CacheKey::parse(k)).collect()
    }

    async fn remove_key(&self, key: &CacheKey) {
        let rendered = key.to_string();
        self.memory.lock().pop(rendered.as_str());
        self.ledger.lock().remove(&rendered);
        self.remove_persistent(&key.persistent_key()).await;
    }

    async fn remove_persistent(&self, stored_key: &str) {
        if let Err(e) = self.persistent.remove(stored_key).await {
            warn!("Failed to remove persisted cache record {}: {}", stored_key, e);
        }
    }

    /// Evict until the persistent tier is back within its size budget.
    ///
    /// Entries written before the recent window go first, oldest first.
    /// Recent entries are only evicted while usage is above the overage
    /// ceiling.
    async fn enforce_budget_at(&self, now: u64) {
        let config = self.config.current();
        let budget = config.max_cache_bytes;
        let ceiling = config.overage_ceiling_bytes();

        let (victims, freed) = {
            let mut ledger = self.ledger.lock();
            let mut total: u64 = ledger.values().map(|e| e.size).sum();
            if total <= budget {
                return;
            }

            let mut by_age: Vec<(String, LedgerEntry)> =
                ledger.iter().map(|(k, e)| (k.clone(), *e)).collect();
            by_age.sort_by_key(|(_, e)| e.stored_at);
            let (old, recent): (Vec<_>, Vec<_>) = by_age
                .into_iter()
                .partition(|(_, e)| now.saturating_sub(e.stored_at) >= config.recent_window_ms);

            let mut victims = Vec::new();
            let mut freed = 0;
            for (key, entry) in old {
                if total <= budget {
                    break;
                }
                total -= entry.size;
                freed += entry.size;
                victims.push(key);
            }
            for (key, entry) in recent {
                if total <= ceiling {
                    break;
                }
                total -= entry.size;
                freed += entry.size;
                victims.push(key);
            }
            for key in &victims {
                ledger.remove(key);
            }
            (victims, freed)
        };

        if victims.is_empty() {
            return;
        }
        for rendered in &victims {
            self.memory.lock().pop(rendered.as_str());
            self.remove_persistent(&format!("{}{}", PERSISTENT_PREFIX, rendered))
                .await;
        }
        self.counters.lock().evictions += victims.len() as u64;
        info!(
            "Evicted {} cache entries ({} bytes) to stay within budget",
            victims.len(),
            freed
        );
        self.events.publish(Event::Evicted {
            keys: victims,
            freed_bytes: freed,
        });
    }
}

/// Decode a persisted record and check that it belongs to `key`
fn decode_record(key: &CacheKey, raw: &str) -> PostcacheResult<CacheEntry> {
    let rendered = key.to_string();
    let entry: CacheEntry = serde_json::from_str(raw)
        .map_err(|e| PostcacheError::cache_deserialization(&rendered, e.to_string()))?;
    if entry.key != rendered {
        return Err(PostcacheError::cache_deserialization(
            &rendered,
            format!("record holds entry for '{}'", entry.key),
        ));
    }
    Ok(entry)
}
