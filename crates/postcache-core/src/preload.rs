//! Preloading every page of a resource's list
//!
//! The walk follows the cursor: each page's last item id becomes the next
//! page's `after_id`. Pages are cached as they arrive, so a later scroll
//! through the list is answered entirely from cache.

use crate::cache::{CacheKey, CacheStore, list_items};
use crate::config::{ConfigHandle, timeouts};
use crate::error::{PostcacheError, PostcacheResult};
use crate::events::{Event, SharedEventBus};
use crate::http::{HttpRequest, ResponseView, SharedTransport};
use crate::intercept::EndpointTemplate;
use crate::invalidation::WriteEpochs;
use dashmap::DashSet;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Outcome of a preload walk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreloadSummary {
    pub pages: usize,
    pub items: usize,
}

/// Marks a resource as being walked until dropped
struct ActiveWalk {
    set: Arc<DashSet<String>>,
    resource_id: String,
}

impl Drop for ActiveWalk {
    fn drop(&mut self) {
        self.set.remove(&self.resource_id);
    }
}

/// Walks and caches all pages of a list
pub struct Preloader {
    store: Arc<CacheStore>,
    transport: SharedTransport,
    config: ConfigHandle,
    events: SharedEventBus,
    template: EndpointTemplate,
    base_url: Option<Url>,
    max_items: usize,
    page_delay: Duration,
    active: Arc<DashSet<String>>,
    epochs: WriteEpochs,
}

impl Preloader {
    pub fn new(
        store: Arc<CacheStore>,
        transport: SharedTransport,
        config: ConfigHandle,
        events: SharedEventBus,
        template: EndpointTemplate,
        base_url: Option<Url>,
    ) -> Self {
        Self {
            store,
            transport,
            config,
            events,
            template,
            base_url,
            max_items: timeouts::cache::PRELOAD_MAX_ITEMS,
            page_delay: timeouts::cache::preload_page_delay(),
            active: Arc::new(DashSet::new()),
            epochs: WriteEpochs::new(),
        }
    }

    /// Stop walks of resources written while they run
    pub fn with_epochs(mut self, epochs: WriteEpochs) -> Self {
        self.epochs = epochs;
        self
    }

    /// Override the pacing between page requests
    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items;
        self
    }

    /// Whether a walk of `resource_id` is running
    pub fn is_active(&self, resource_id: &str) -> bool {
        self.active.contains(resource_id)
    }

    /// Number of walks running
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    fn claim(&self, resource_id: &str) -> Option<ActiveWalk> {
        if !self.active.insert(resource_id.to_string()) {
            debug!("Preload of {} already running", resource_id);
            return None;
        }
        Some(ActiveWalk {
            set: Arc::clone(&self.active),
            resource_id: resource_id.to_string(),
        })
    }

    /// Walk every page of `resource_id`, starting from the first
    pub async fn load_all(&self, resource_id: &str) -> PostcacheResult<PreloadSummary> {
        let base = self.base_url.as_ref().ok_or_else(|| {
            PostcacheError::config("A base URL is required to preload a resource")
        })?;
        let path = format!(
            "{}/{}/{}/{}",
            self.template.api_prefix.trim_end_matches('/'),
            self.template.collection,
            resource_id,
            self.template.list_resource
        );
        let mut start = base
            .join(&path)
            .map_err(|e| PostcacheError::url_parse(&path, e.to_string()))?;
        start.set_query(Some("filters=all"));

        let Some(claim) = self.claim(resource_id) else {
            return Ok(PreloadSummary::default());
        };
        self.walk(claim, &start, None, PreloadSummary::default())
            .await
    }

    /// Continue a walk after the first page has already been fetched
    pub async fn continue_after(
        &self,
        resource_id: &str,
        first_page_url: &Url,
        first_page: &Value,
    ) -> PostcacheResult<PreloadSummary> {
        let items = list_items(first_page).map_or(&[][..], Vec::as_slice);
        let summary = PreloadSummary {
            pages: 1,
            items: items.len(),
        };
        let Some(claim) = self.claim(resource_id) else {
            return Ok(summary);
        };
        self.walk_from(claim, first_page_url, first_page, summary)
            .await
    }

    /// Run `continue_after` in the background.
    ///
    /// The resource counts as active as soon as this returns `true`, so
    /// [`active_count`](Self::active_count) covers the walk before its task
    /// is first polled. Returns `false` when a walk of the resource is
    /// already running.
    pub fn spawn_continue_after(
        self: &Arc<Self>,
        resource_id: &str,
        first_page_url: Url,
        first_page: Value,
    ) -> bool {
        let Some(claim) = self.claim(resource_id) else {
            return false;
        };
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let items = list_items(&first_page).map_or(0, Vec::len);
            let summary = PreloadSummary { pages: 1, items };
            let resource_id = claim.resource_id.clone();
            if let Err(e) = this
                .walk_from(claim, &first_page_url, &first_page, summary)
                .await
            {
                warn!("Preload of {} failed: {}", resource_id, e);
            }
        });
        true
    }

    async fn walk_from(
        &self,
        claim: ActiveWalk,
        first_page_url: &Url,
        first_page: &Value,
        summary: PreloadSummary,
    ) -> PostcacheResult<PreloadSummary> {
        let last = list_items(first_page).and_then(|items| items.last().and_then(item_id));
        match last {
            Some(cursor) if summary.items < self.max_items => {
                self.walk(claim, first_page_url, Some(cursor), summary)
                    .await
            }
            _ => Ok(summary),
        }
    }

    async fn walk(
        &self,
        claim: ActiveWalk,
        start: &Url,
        mut cursor: Option<String>,
        mut summary: PreloadSummary,
    ) -> PostcacheResult<PreloadSummary> {
        let resource_id = claim.resource_id.as_str();
        self.walk_pages(resource_id, start, &mut cursor, &mut summary)
            .await?;

        info!(
            "Preloaded {} items in {} pages for {}",
            summary.items, summary.pages, resource_id
        );
        self.events.publish(Event::PreloadCompleted {
            resource_id: resource_id.to_string(),
            pages: summary.pages,
            items: summary.items,
        });
        Ok(summary)
    }

    async fn walk_pages(
        &self,
        resource_id: &str,
        start: &Url,
        cursor: &mut Option<String>,
        summary: &mut PreloadSummary,
    ) -> PostcacheResult<()> {
        let page_size = self.config.current().page_size;
        let epoch = self.epochs.current(resource_id);

        loop {
            if cursor.is_some() {
                tokio::time::sleep(self.page_delay).await;
            }
            let url = self.page_url(start, cursor.as_deref(), page_size);
            let key = CacheKey::new(resource_id, cursor.as_deref(), page_size);

            let response = self.transport.execute(&HttpRequest::get(url.clone())).await?;
            if !response.is_success() {
                return Err(PostcacheError::http_with_status(
                    format!("Preload page {} failed: {}", key, response.status_text),
                    response.status,
                ));
            }
            let payload: Value = serde_json::from_str(&response.body)?;
            let (count, next) = match list_items(&payload) {
                Some(items) => (items.len(), items.last().and_then(item_id)),
                None => (0, None),
            };
            if count == 0 {
                break;
            }
            if self.epochs.changed_since(resource_id, epoch) {
                info!("{} was written during its preload; stopping", resource_id);
                break;
            }

            self.store
                .put(&key, payload, url.as_str(), Some(response.elapsed_ms))
                .await;
            summary.pages += 1;
            summary.items += count;
            debug!("Preloaded page {} ({} items)", key, count);

            match next {
                Some(next) if summary.items < self.max_items => *cursor = Some(next),
                _ => break,
            }
        }
        Ok(())
    }

    /// `start` with its page-size and cursor parameters replaced
    fn page_url(&self, start: &Url, cursor: Option<&str>, page_size: u32) -> Url {
        let kept: Vec<(String, String)> = start
            .query_pairs()
            .filter(|(name, _)| {
                name != self.template.page_size_param.as_str()
                    && name != self.template.cursor_param.as_str()
            })
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let mut url = start.clone();
        {
            let mut query = url.query_pairs_mut();
            query.clear();
            query.extend_pairs(kept);
            query.append_pair(&self.template.page_size_param, &page_size.to_string());
            if let Some(cursor) = cursor {
                query.append_pair(&self.template.cursor_param, cursor);
            }
        }
        url
    }
}

/// The `id` of a list item as a cursor value
fn item_id(item: &Value) -> Option<String> {
    match item.get("id")? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}
