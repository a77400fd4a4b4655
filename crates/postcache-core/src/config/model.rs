//! Configuration record and validation

use crate::error::{PostcacheError, PostcacheResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Name of the persisted configuration record
pub const CONFIG_RECORD_NAME: &str = "postcache_config";

/// Largest page size the rewriter will ask for
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Cache configuration.
///
/// Field names are camelCase on disk. Fields missing from a stored record take
/// their defaults; fields this crate does not know about are kept in `extra`
/// and written back untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Configuration {
    /// Master switch; when off every request passes through untouched
    pub enabled: bool,
    /// Page size the rewriter asks the server for
    pub page_size: u32,
    /// Cache entry time-to-live in milliseconds
    pub ttl_ms: u64,
    /// Size budget of the persistent tier in bytes
    pub max_cache_bytes: u64,
    /// Requested page sizes at or below this value are enlarged
    pub rewrite_threshold: u32,
    /// Entries younger than this are only evicted as a last resort
    pub recent_window_ms: u64,
    /// How far above `max_cache_bytes` recent entries may keep the tier
    pub recent_overage_ratio: f64,
    /// How long a resource is served from the network after a write
    pub invalidation_cooldown_ms: u64,
    /// Bound on each background refresh attempt
    pub refresh_timeout_ms: u64,
    /// Walk and cache every page of a resource after its first page is fetched
    pub preload_all: bool,
    /// Surface diagnostic notifications to the user
    pub notifications: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            enabled: true,
            page_size: 100,
            ttl_ms: 30 * 60 * 1000,
            max_cache_bytes: 50 * 1024 * 1024,
            rewrite_threshold: 30,
            recent_window_ms: 60 * 60 * 1000,
            recent_overage_ratio: 0.25,
            invalidation_cooldown_ms: 10_000,
            refresh_timeout_ms: super::timeouts::network::REFRESH_MS,
            preload_all: false,
            notifications: true,
            extra: Map::new(),
        }
    }
}

impl Configuration {
    /// Check the record for values the cache cannot work with
    pub fn validate(&self) -> PostcacheResult<()> {
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(PostcacheError::invalid_field(
                "pageSize",
                format!(
                    "page size must be between 1 and {}, got {}",
                    MAX_PAGE_SIZE, self.page_size
                ),
            ));
        }
        if self.ttl_ms == 0 {
            return Err(PostcacheError::invalid_field(
                "ttlMs",
                "time-to-live must be positive",
            ));
        }
        if self.max_cache_bytes == 0 {
            return Err(PostcacheError::invalid_field(
                "maxCacheBytes",
                "cache size budget must be positive",
            ));
        }
        if !self.recent_overage_ratio.is_finite() || self.recent_overage_ratio < 0.0 {
            return Err(PostcacheError::invalid_field(
                "recentOverageRatio",
                "overage ratio must be a non-negative number",
            ));
        }
        Ok(())
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_millis(self.refresh_timeout_ms)
    }

    /// Hard ceiling the persistent tier may reach while holding recent entries
    pub fn overage_ceiling_bytes(&self) -> u64 {
        (self.max_cache_bytes as f64 * (1.0 + self.recent_overage_ratio)) as u64
    }

    /// Set a single known field from its textual form.
    ///
    /// `field` is the camelCase name used on disk.
    pub fn set_field(&mut self, field: &str, raw: &str) -> PostcacheResult<()> {
        match field {
            "enabled" => self.enabled = parse_field(field, raw)?,
            "pageSize" => self.page_size = parse_field(field, raw)?,
            "ttlMs" => self.ttl_ms = parse_field(field, raw)?,
            "maxCacheBytes" => self.max_cache_bytes = parse_field(field, raw)?,
            "rewriteThreshold" => self.rewrite_threshold = parse_field(field, raw)?,
            "recentWindowMs" => self.recent_window_ms = parse_field(field, raw)?,
            "recentOverageRatio" => self.recent_overage_ratio = parse_field(field, raw)?,
            "invalidationCooldownMs" => self.invalidation_cooldown_ms = parse_field(field, raw)?,
            "refreshTimeoutMs" => self.refresh_timeout_ms = parse_field(field, raw)?,
            "preloadAll" => self.preload_all = parse_field(field, raw)?,
            "notifications" => self.notifications = parse_field(field, raw)?,
            other => {
                return Err(PostcacheError::invalid_field(
                    other,
                    format!("unknown configuration field '{}'", other),
                ));
            }
        }
        Ok(())
    }
}

fn parse_field<T: std::str::FromStr>(field: &str, raw: &str) -> PostcacheResult<T> {
    raw.trim().parse().map_err(|_| {
        PostcacheError::invalid_field(field, format!("invalid value '{}' for {}", raw, field))
    })
}
