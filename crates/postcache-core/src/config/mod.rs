//! Configuration management
//!
//! The configuration is a single named record persisted in a JSON file in the
//! data directory. It is loaded once at startup, may be overridden from the
//! environment, and is broadcast to every cache service through a
//! [`ConfigHandle`] whenever it changes.

pub mod env_loader;
pub mod logging_config;
pub mod model;
pub mod persistence;
pub mod store;
pub mod timeouts;

pub use env_loader::{EnvOverrides, data_dir_from_env};
pub use logging_config::LoggingConfig;
pub use model::{CONFIG_RECORD_NAME, Configuration};
pub use persistence::ConfigPersistence;
pub use store::{ConfigHandle, ConfigStore};

use std::path::PathBuf;

/// Default data directory (`<platform data dir>/postcache`)
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_default()
        .join("postcache")
}
