//! Environment variable overrides
//!
//! Overrides use the `POSTCACHE_` prefix. They are applied on top of the
//! persisted record but never written back to it.

use crate::config::model::Configuration;
use crate::error::{PostcacheError, PostcacheResult};
use std::env;
use std::path::PathBuf;

/// Environment variable naming the data directory
pub const DATA_DIR_VAR: &str = "POSTCACHE_DATA_DIR";

/// Overrides read from the environment
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvOverrides {
    pub enabled: Option<bool>,
    pub page_size: Option<u32>,
    pub ttl_ms: Option<u64>,
    pub max_cache_bytes: Option<u64>,
}

impl EnvOverrides {
    /// Read overrides from the process environment
    pub fn from_env() -> PostcacheResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Read overrides through an arbitrary lookup function
    pub fn from_lookup<F>(lookup: F) -> PostcacheResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            enabled: parse_var(&lookup, "POSTCACHE_ENABLED")?,
            page_size: parse_var(&lookup, "POSTCACHE_PAGE_SIZE")?,
            ttl_ms: parse_var(&lookup, "POSTCACHE_TTL_MS")?,
            max_cache_bytes: parse_var(&lookup, "POSTCACHE_MAX_CACHE_BYTES")?,
        })
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply the overrides to a configuration snapshot
    pub fn apply(&self, config: &mut Configuration) {
        if let Some(enabled) = self.enabled {
            config.enabled = enabled;
        }
        if let Some(page_size) = self.page_size {
            config.page_size = page_size;
        }
        if let Some(ttl_ms) = self.ttl_ms {
            config.ttl_ms = ttl_ms;
        }
        if let Some(max_cache_bytes) = self.max_cache_bytes {
            config.max_cache_bytes = max_cache_bytes;
        }
    }
}

fn parse_var<F, T>(lookup: &F, name: &str) -> PostcacheResult<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|_| {
            PostcacheError::config(format!("Invalid {} value", name))
                .with_context(format!("Parsing environment value '{}'", raw))
        }),
    }
}

/// Data directory from `POSTCACHE_DATA_DIR`, if set
pub fn data_dir_from_env() -> Option<PathBuf> {
    env::var(DATA_DIR_VAR)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
}
