//! Per-invocation application context
//!
//! Opens the configuration record and the persistent cache in the data
//! directory and wires a [`CacheService`] in front of the HTTP transport.

use crate::args::Cli;
use postcache_core::cache::{CacheStore, DiskStorage, PerfLog};
use postcache_core::config::{
    ConfigPersistence, ConfigStore, EnvOverrides, data_dir_from_env, default_data_dir,
};
use postcache_core::error::{PostcacheError, PostcacheResult};
use postcache_core::events::{SharedEventBus, shared_event_bus};
use postcache_core::http::{ReqwestTransport, SharedTransport};
use postcache_core::intercept::InterceptingClient;
use postcache_core::CacheService;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

const EVENT_CAPACITY: usize = 256;
const CACHE_SUBDIR: &str = "cache";

pub struct AppContext {
    pub data_dir: PathBuf,
    pub config: ConfigStore,
    pub events: SharedEventBus,
    pub store: Arc<CacheStore>,
    pub service: Arc<CacheService>,
    pub client: InterceptingClient,
}

impl AppContext {
    /// Open the context described by the global flags
    pub async fn from_cli(cli: &Cli) -> PostcacheResult<Self> {
        let data_dir = cli
            .data_dir
            .clone()
            .or_else(data_dir_from_env)
            .unwrap_or_else(default_data_dir);
        let base_url = cli
            .base_url
            .as_deref()
            .map(|raw| Url::parse(raw).map_err(|e| PostcacheError::url_parse(raw, e.to_string())))
            .transpose()?;
        let transport: SharedTransport = Arc::new(ReqwestTransport::new()?);
        // Background refreshes retry once on a plain client without the primary's timeouts
        let fallback: SharedTransport =
            Arc::new(ReqwestTransport::with_client(reqwest::Client::new()));
        Self::open(&data_dir, base_url, transport, Some(fallback)).await
    }

    pub async fn open(
        data_dir: &Path,
        base_url: Option<Url>,
        transport: SharedTransport,
        fallback: Option<SharedTransport>,
    ) -> PostcacheResult<Self> {
        tokio::fs::create_dir_all(data_dir).await.map_err(|e| {
            PostcacheError::io_with_path(e.to_string(), data_dir.display().to_string())
        })?;
        debug!("Using data directory {}", data_dir.display());

        let events = shared_event_bus(EVENT_CAPACITY);
        let config = ConfigStore::load(
            ConfigPersistence::new(data_dir),
            EnvOverrides::from_env()?,
            events.clone(),
        )?;

        let disk = DiskStorage::open(data_dir.join(CACHE_SUBDIR), None).await?;
        let perf = Arc::new(PerfLog::open(ConfigPersistence::new(data_dir)));
        let store = Arc::new(
            CacheStore::new(Arc::new(disk), config.handle(), events.clone()).with_perf_log(perf),
        );
        let report = store.initialize().await?;
        if report.removed_corrupt + report.removed_expired > 0 {
            info!(
                "Dropped {} corrupt and {} expired cached pages",
                report.removed_corrupt, report.removed_expired
            );
        }

        let mut builder = CacheService::builder(
            config.handle(),
            store.clone(),
            events.clone(),
            transport.clone(),
        );
        if let Some(url) = &base_url {
            builder = builder.base_url(url.clone());
        }
        if let Some(fallback) = fallback {
            builder = builder.fallback_transport(fallback);
        }
        let service = Arc::new(builder.build()?);

        let mut client = InterceptingClient::new(service.clone(), transport);
        if let Some(url) = base_url {
            client = client.with_base_url(url);
        }

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            config,
            events,
            store,
            service,
            client,
        })
    }
}
