//! Configuration store and broadcast
//!
//! [`ConfigStore`] owns the persisted record. Every change is validated,
//! written back as a whole record and then broadcast: cache services hold a
//! [`ConfigHandle`] and pick up the new snapshot on their next call, and an
//! [`Event::ConfigUpdated`] is published on the event bus.

use super::env_loader::EnvOverrides;
use super::model::{CONFIG_RECORD_NAME, Configuration};
use super::persistence::ConfigPersistence;
use crate::error::{PostcacheError, PostcacheResult};
use crate::events::{Event, SharedEventBus};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Read side of the configuration broadcast
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    receiver: watch::Receiver<Arc<Configuration>>,
}

impl ConfigHandle {
    /// A handle that always yields the given configuration
    pub fn fixed(config: Configuration) -> Self {
        let (_sender, receiver) = watch::channel(Arc::new(config));
        Self { receiver }
    }

    /// The latest configuration snapshot
    pub fn current(&self) -> Arc<Configuration> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next configuration change.
    ///
    /// Returns `None` once the owning store is gone.
    pub async fn changed(&mut self) -> Option<Arc<Configuration>> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }
}

/// Owner of the persisted configuration record
pub struct ConfigStore {
    persistence: Option<ConfigPersistence>,
    overrides: EnvOverrides,
    /// Record as persisted, without environment overrides
    stored: Mutex<Configuration>,
    sender: watch::Sender<Arc<Configuration>>,
    events: SharedEventBus,
}

impl ConfigStore {
    /// Load the record, merging stored values over defaults.
    ///
    /// A record that cannot be read or fails validation is replaced by the
    /// defaults; the broken file is left for the next successful write.
    pub fn load(
        persistence: ConfigPersistence,
        overrides: EnvOverrides,
        events: SharedEventBus,
    ) -> PostcacheResult<Self> {
        let stored = match persistence.load_record(CONFIG_RECORD_NAME) {
            Ok(Some(value)) => match serde_json::from_value::<Configuration>(value) {
                Ok(config) => match config.validate() {
                    Ok(()) => config,
                    Err(e) => {
                        warn!("Stored configuration rejected, using defaults: {}", e);
                        Configuration::default()
                    }
                },
                Err(e) => {
                    warn!("Stored configuration unreadable, using defaults: {}", e);
                    Configuration::default()
                }
            },
            Ok(None) => Configuration::default(),
            Err(e) => {
                warn!("Configuration file unreadable, using defaults: {}", e);
                Configuration::default()
            }
        };

        let effective = effective_config(&stored, &overrides)?;
        let (sender, _) = watch::channel(Arc::new(effective));
        Ok(Self {
            persistence: Some(persistence),
            overrides,
            stored: Mutex::new(stored),
            sender,
            events,
        })
    }

    /// A store that keeps its record in memory only
    pub fn in_memory(config: Configuration, events: SharedEventBus) -> PostcacheResult<Self> {
        config.validate()?;
        let (sender, _) = watch::channel(Arc::new(config.clone()));
        Ok(Self {
            persistence: None,
            overrides: EnvOverrides::default(),
            stored: Mutex::new(config),
            sender,
            events,
        })
    }

    /// Subscribe to configuration snapshots
    pub fn handle(&self) -> ConfigHandle {
        ConfigHandle {
            receiver: self.sender.subscribe(),
        }
    }

    /// The effective configuration (record plus environment overrides)
    pub fn current(&self) -> Arc<Configuration> {
        self.sender.borrow().clone()
    }

    /// The record exactly as persisted
    pub fn stored(&self) -> Configuration {
        self.stored.lock().clone()
    }

    /// Modify the record, then validate, persist and broadcast it
    pub fn update<F>(&self, mutate: F) -> PostcacheResult<Arc<Configuration>>
    where
        F: FnOnce(&mut Configuration),
    {
        let mut next = self.stored();
        mutate(&mut next);
        self.replace(next)
    }

    /// Replace the whole record
    pub fn replace(&self, config: Configuration) -> PostcacheResult<Arc<Configuration>> {
        config.validate()?;
        let effective = Arc::new(effective_config(&config, &self.overrides)?);

        if let Some(persistence) = &self.persistence {
            let value = serde_json::to_value(&config)?;
            persistence
                .save_record(CONFIG_RECORD_NAME, value)
                .map_err(|e| e.with_context("Persisting configuration"))?;
        }

        *self.stored.lock() = config;
        self.sender.send_replace(effective.clone());
        self.events.publish(Event::ConfigUpdated {
            enabled: effective.enabled,
            page_size: effective.page_size,
        });
        info!(
            "Configuration updated (enabled: {}, page size: {})",
            effective.enabled, effective.page_size
        );
        Ok(effective)
    }

    /// Restore the defaults, keeping unrelated fields of the record
    pub fn reset(&self) -> PostcacheResult<Arc<Configuration>> {
        let extra = self.stored.lock().extra.clone();
        self.replace(Configuration {
            extra,
            ..Configuration::default()
        })
    }
}

fn effective_config(
    stored: &Configuration,
    overrides: &EnvOverrides,
) -> PostcacheResult<Configuration> {
    let mut effective = stored.clone();
    overrides.apply(&mut effective);
    effective
        .validate()
        .map_err(|e| PostcacheError::config(format!("Environment override rejected: {}", e)))?;
    Ok(effective)
}
