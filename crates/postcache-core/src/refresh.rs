//! Background refresh of entries served from cache
//!
//! After a cached answer is delivered, the real request is replayed in the
//! background and the entry replaced with the fresh payload. At most one
//! refresh per key runs at a time.

use crate::cache::{CacheKey, CacheStore, list_items};
use crate::config::ConfigHandle;
use crate::error::{PostcacheError, PostcacheResult, UnifiedError};
use crate::events::{Event, SharedEventBus};
use crate::http::{HttpRequest, NetworkResponse, ResponseView, SharedTransport};
use crate::invalidation::WriteEpochs;
use dashmap::DashSet;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Removes the in-flight mark when dropped, whatever the outcome
struct InFlightGuard {
    set: Arc<DashSet<String>>,
    key: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.remove(&self.key);
    }
}

/// Replays requests in the background and replaces cache entries
#[derive(Clone)]
pub struct BackgroundRefresher {
    store: Arc<CacheStore>,
    primary: SharedTransport,
    fallback: Option<SharedTransport>,
    config: ConfigHandle,
    events: SharedEventBus,
    in_flight: Arc<DashSet<String>>,
    epochs: WriteEpochs,
}

impl BackgroundRefresher {
    pub fn new(
        store: Arc<CacheStore>,
        primary: SharedTransport,
        fallback: Option<SharedTransport>,
        config: ConfigHandle,
        events: SharedEventBus,
    ) -> Self {
        Self {
            store,
            primary,
            fallback,
            config,
            events,
            in_flight: Arc::new(DashSet::new()),
            epochs: WriteEpochs::new(),
        }
    }

    /// Discard refreshed pages of resources written while the refresh ran
    pub fn with_epochs(mut self, epochs: WriteEpochs) -> Self {
        self.epochs = epochs;
        self
    }

    /// Start a refresh of `key` using `request`.
    ///
    /// Returns `false` without doing anything when a refresh of the same key
    /// is already running.
    pub fn refresh(&self, key: &CacheKey, request: HttpRequest) -> bool {
        let rendered = key.to_string();
        if !self.in_flight.insert(rendered.clone()) {
            debug!("Refresh of {} already in flight", rendered);
            return false;
        }
        let guard = InFlightGuard {
            set: Arc::clone(&self.in_flight),
            key: rendered,
        };

        let epoch = self.epochs.current(&key.resource_id);
        let this = self.clone();
        let key = key.clone();
        tokio::spawn(async move {
            let outcome = this.run(&key, &request, epoch).await;
            drop(guard);
            match outcome {
                Ok(None) => {
                    debug!("{} was written during its refresh; result discarded", key);
                }
                Ok(Some(item_count)) => {
                    info!("Refreshed {} ({} items)", key, item_count);
                    this.events.publish(Event::DataRefreshed {
                        key: key.to_string(),
                        item_count,
                    });
                }
                Err(e) => {
                    warn!("{}; keeping the cached entry", e);
                    this.events
                        .publish(Event::refresh_failed(key.to_string(), e.to_string()));
                }
            }
        });
        true
    }

    /// Whether a refresh of `key` is running
    pub fn is_refreshing(&self, key: &CacheKey) -> bool {
        self.in_flight.contains(&key.to_string())
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Fetch and store the fresh page. `None` when a write made it stale.
    async fn run(
        &self,
        key: &CacheKey,
        request: &HttpRequest,
        epoch: u64,
    ) -> PostcacheResult<Option<usize>> {
        let response = self.fetch(key, request).await?;
        if !response.is_success() {
            return Err(PostcacheError::refresh_network(
                key.to_string(),
                format!("HTTP {} {}", response.status, response.status_text),
            ));
        }

        let payload: Value = serde_json::from_str(&response.body).map_err(|e| {
            PostcacheError::refresh_network(key.to_string(), format!("response is not JSON: {}", e))
        })?;
        if self.epochs.changed_since(&key.resource_id, epoch) {
            return Ok(None);
        }
        let item_count = list_items(&payload).map_or(0, Vec::len);
        if item_count == 0 {
            // Empty pages are never cached; the next read goes to the network
            self.store.remove(key).await;
            return Ok(Some(0));
        }

        let source = response.url.clone();
        self.store
            .put(key, payload, &source, Some(response.elapsed_ms))
            .await;
        // A write may have purged the resource while the put was in progress
        if self.epochs.changed_since(&key.resource_id, epoch) {
            self.store.remove(key).await;
            return Ok(None);
        }
        Ok(Some(item_count))
    }

    /// Primary transport under the refresh timeout, then the fallback
    async fn fetch(
        &self,
        key: &CacheKey,
        request: &HttpRequest,
    ) -> PostcacheResult<NetworkResponse> {
        let timeout = self.config.current().refresh_timeout();

        let primary = tokio::time::timeout(timeout, self.primary.execute(request)).await;
        let primary_error = match primary {
            Ok(Ok(response)) => return Ok(response),
            Ok(Err(e)) if !e.is_retryable() => {
                return Err(PostcacheError::refresh_network(key.to_string(), e.to_string()));
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("timed out after {} ms", timeout.as_millis()),
        };

        let Some(fallback) = &self.fallback else {
            return Err(PostcacheError::refresh_network(key.to_string(), primary_error));
        };
        debug!("Primary refresh of {} failed ({}), trying fallback", key, primary_error);

        match tokio::time::timeout(timeout, fallback.execute(request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(PostcacheError::refresh_network(
                key.to_string(),
                format!("{}; fallback: {}", primary_error, e),
            )),
            Err(_) => Err(PostcacheError::refresh_network(
                key.to_string(),
                format!(
                    "{}; fallback timed out after {} ms",
                    primary_error,
                    timeout.as_millis()
                ),
            )),
        }
    }
}
