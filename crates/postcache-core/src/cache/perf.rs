//! Lifetime performance totals
//!
//! Hit and miss counters on [`CacheStore`](super::CacheStore) only cover the
//! running process. [`PerfLog`] accumulates the same figures into a named
//! record next to the configuration so they survive across invocations.

use crate::config::ConfigPersistence;
use crate::error::PostcacheResult;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Record name inside the configuration file
pub const PERF_RECORD_NAME: &str = "postcache_perf";

/// Totals accumulated over every session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PerfTotals {
    pub hits: u64,
    pub misses: u64,
    /// Sum of the original fetch durations of every page served from cache
    pub saved_ms_total: u64,
}

/// Persisted accumulator for [`PerfTotals`]
#[derive(Debug)]
pub struct PerfLog {
    persistence: Option<ConfigPersistence>,
    totals: Mutex<PerfTotals>,
}

impl PerfLog {
    /// Load the totals from `persistence`; a missing or unreadable record starts at zero
    pub fn open(persistence: ConfigPersistence) -> Self {
        let totals = match persistence.load_record(PERF_RECORD_NAME) {
            Ok(Some(value)) => serde_json::from_value(value).unwrap_or_else(|e| {
                warn!("Ignoring malformed performance record: {}", e);
                PerfTotals::default()
            }),
            Ok(None) => PerfTotals::default(),
            Err(e) => {
                warn!("Failed to read performance record: {}", e);
                PerfTotals::default()
            }
        };
        Self {
            persistence: Some(persistence),
            totals: Mutex::new(totals),
        }
    }

    /// Totals that are never written anywhere
    pub fn in_memory() -> Self {
        Self {
            persistence: None,
            totals: Mutex::new(PerfTotals::default()),
        }
    }

    pub fn totals(&self) -> PerfTotals {
        *self.totals.lock()
    }

    pub fn record_hit(&self, saved_ms: u64) {
        self.update(|totals| {
            totals.hits += 1;
            totals.saved_ms_total += saved_ms;
        });
    }

    pub fn record_miss(&self) {
        self.update(|totals| totals.misses += 1);
    }

    fn update<F>(&self, mutate: F)
    where
        F: FnOnce(&mut PerfTotals),
    {
        let mut totals = self.totals.lock();
        mutate(&mut totals);
        if let Err(e) = self.save(&totals) {
            warn!("Failed to persist performance totals: {}", e);
        }
    }

    fn save(&self, totals: &PerfTotals) -> PostcacheResult<()> {
        let Some(persistence) = &self.persistence else {
            return Ok(());
        };
        persistence.save_record(PERF_RECORD_NAME, serde_json::to_value(totals)?)
    }
}
