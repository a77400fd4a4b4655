//! Invalidation of cached pages after writes

use crate::cache::{CacheStore, current_time_ms};
use crate::config::ConfigHandle;
use crate::events::{Event, SharedEventBus};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Per-resource write counters.
///
/// A fetch started at epoch `n` for a resource must not be cached once the
/// resource's epoch has moved past `n`.
#[derive(Debug, Clone, Default)]
pub struct WriteEpochs {
    counters: Arc<DashMap<String, u64>>,
}

impl WriteEpochs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self, resource_id: &str) -> u64 {
        self.counters.get(resource_id).map_or(0, |e| *e)
    }

    /// Whether a write to `resource_id` completed since `epoch` was read
    pub fn changed_since(&self, resource_id: &str, epoch: u64) -> bool {
        self.current(resource_id) != epoch
    }

    pub(crate) fn bump(&self, resource_id: &str) -> u64 {
        let mut counter = self.counters.entry(resource_id.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }
}

/// Purges a resource's cached pages after a successful write and keeps it
/// uncached for a short cooldown.
pub struct Invalidator {
    store: Arc<CacheStore>,
    config: ConfigHandle,
    events: SharedEventBus,
    /// Resource id to end of its cooldown, in ms since the epoch
    cooldowns: DashMap<String, u64>,
    epochs: WriteEpochs,
}

impl Invalidator {
    pub fn new(store: Arc<CacheStore>, config: ConfigHandle, events: SharedEventBus) -> Self {
        Self {
            store,
            config,
            events,
            cooldowns: DashMap::new(),
            epochs: WriteEpochs::new(),
        }
    }

    /// Write counters shared with everything that caches fetched pages
    pub fn epochs(&self) -> WriteEpochs {
        self.epochs.clone()
    }

    pub fn epoch(&self, resource_id: &str) -> u64 {
        self.epochs.current(resource_id)
    }

    /// Record the completion of a write to `resource_id`.
    ///
    /// Only 2xx statuses invalidate. Returns the number of entries removed.
    pub async fn record_write(&self, resource_id: &str, status: u16) -> usize {
        self.record_write_at(resource_id, status, current_time_ms())
            .await
    }

    pub async fn record_write_at(&self, resource_id: &str, status: u16, now: u64) -> usize {
        if !(200..300).contains(&status) {
            debug!(
                "Write to {} returned {}; cache left untouched",
                resource_id, status
            );
            return 0;
        }

        // Bumped before purging so in-flight fetches drop their result
        self.epochs.bump(resource_id);
        let cooldown_ms = self.config.current().invalidation_cooldown_ms;
        self.cooldowns
            .insert(resource_id.to_string(), now.saturating_add(cooldown_ms));

        let removed = self
            .store
            .invalidate(|key| key.resource_id == resource_id)
            .await;
        info!(
            "Invalidated {} cached pages of {} after write",
            removed, resource_id
        );
        self.events.publish(Event::Invalidated {
            resource_id: resource_id.to_string(),
            removed,
        });
        removed
    }

    /// Whether `resource_id` must currently be fetched from the network
    pub fn in_cooldown(&self, resource_id: &str) -> bool {
        self.in_cooldown_at(resource_id, current_time_ms())
    }

    pub fn in_cooldown_at(&self, resource_id: &str, now: u64) -> bool {
        self.cooldowns.remove_if(resource_id, |_, until| *until <= now);
        self.cooldowns.contains_key(resource_id)
    }
}
