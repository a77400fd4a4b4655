//! The cache service
//!
//! [`CacheService`] is the explicit context object that owns the classifier,
//! refresher, invalidator and preloader for one cache, and implements
//! [`NetworkInterceptor`] on top of them. There is no global state: every
//! context builds its own service over shared store, configuration and
//! event bus handles.

use crate::cache::{CacheKey, CacheStore, PutOutcome, current_time_ms, list_items};
use crate::config::ConfigHandle;
use crate::error::{PostcacheError, PostcacheResult};
use crate::events::{Event, SharedEventBus};
use crate::http::{HttpRequest, NetworkResponse, ResponseView, SharedTransport};
use crate::intercept::{
    Classification, EndpointTemplate, InterceptDecision, NetworkInterceptor, RequestClassifier,
    UrlRewriter,
};
use crate::invalidation::Invalidator;
use crate::preload::Preloader;
use crate::refresh::BackgroundRefresher;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Builder for [`CacheService`]
pub struct CacheServiceBuilder {
    config: ConfigHandle,
    store: Arc<CacheStore>,
    events: SharedEventBus,
    transport: SharedTransport,
    fallback: Option<SharedTransport>,
    template: EndpointTemplate,
    base_url: Option<Url>,
}

impl CacheServiceBuilder {
    /// Transport tried when a background refresh through the primary one fails
    pub fn fallback_transport(mut self, fallback: SharedTransport) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn template(mut self, template: EndpointTemplate) -> Self {
        self.template = template;
        self
    }

    /// Origin used to build preload URLs
    pub fn base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    pub fn build(self) -> PostcacheResult<CacheService> {
        let classifier = RequestClassifier::new(self.template.clone())?;
        let invalidator =
            Invalidator::new(self.store.clone(), self.config.clone(), self.events.clone());
        let refresher = BackgroundRefresher::new(
            self.store.clone(),
            self.transport.clone(),
            self.fallback,
            self.config.clone(),
            self.events.clone(),
        )
        .with_epochs(invalidator.epochs());
        let preloader = Arc::new(Preloader::new(
            self.store.clone(),
            self.transport,
            self.config.clone(),
            self.events.clone(),
            self.template,
            self.base_url,
        )
        .with_epochs(invalidator.epochs()));

        Ok(CacheService {
            config: self.config,
            store: self.store,
            events: self.events,
            classifier,
            refresher,
            invalidator,
            preloader,
        })
    }
}

/// Cache-then-network interceptor for paginated list requests
pub struct CacheService {
    config: ConfigHandle,
    store: Arc<CacheStore>,
    events: SharedEventBus,
    classifier: RequestClassifier,
    refresher: BackgroundRefresher,
    invalidator: Invalidator,
    preloader: Arc<Preloader>,
}

impl CacheService {
    pub fn builder(
        config: ConfigHandle,
        store: Arc<CacheStore>,
        events: SharedEventBus,
        transport: SharedTransport,
    ) -> CacheServiceBuilder {
        CacheServiceBuilder {
            config,
            store,
            events,
            transport,
            fallback: None,
            template: EndpointTemplate::default(),
            base_url: None,
        }
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    pub fn events(&self) -> &SharedEventBus {
        &self.events
    }

    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }

    pub fn classifier(&self) -> &RequestClassifier {
        &self.classifier
    }

    pub fn refresher(&self) -> &BackgroundRefresher {
        &self.refresher
    }

    pub fn invalidator(&self) -> &Invalidator {
        &self.invalidator
    }

    pub fn preloader(&self) -> &Arc<Preloader> {
        &self.preloader
    }

    async fn decide_list_fetch(
        &self,
        request: &HttpRequest,
        resource_id: String,
    ) -> InterceptDecision {
        let config = self.config.current();
        let template = self.classifier.template();

        let rewriter = UrlRewriter::new(&template.page_size_param, config.rewrite_threshold);
        let url = match rewriter.rewrite(&request.url, config.page_size) {
            Ok(url) => url,
            Err(e) => {
                warn!("{}; sending the original request", e);
                return InterceptDecision::PassThrough;
            }
        };
        let Some(key) = CacheKey::from_url(
            &resource_id,
            &url,
            &template.page_size_param,
            &template.cursor_param,
        ) else {
            return InterceptDecision::PassThrough;
        };
        let rewritten = request.with_url(url);
        let write_epoch = self.invalidator.epoch(&resource_id);

        if self.invalidator.in_cooldown(&resource_id) {
            debug!("{} recently written; fetching {} from network", resource_id, key);
            return InterceptDecision::Rewrite {
                request: rewritten,
                key,
                write_epoch,
            };
        }

        match self.store.get(&key).await {
            Some(entry) => {
                let age_ms = entry.age_ms(current_time_ms());
                info!("Cache hit for {} ({} ms old)", key, age_ms);
                self.events
                    .publish(Event::cache_hit(key.to_string(), age_ms, entry.item_count()));
                InterceptDecision::ServeFromCache {
                    request: rewritten,
                    key,
                    entry,
                    write_epoch,
                }
            }
            None => {
                debug!("Cache miss for {}", key);
                self.events.publish(Event::cache_miss(key.to_string()));
                InterceptDecision::Rewrite {
                    request: rewritten,
                    key,
                    write_epoch,
                }
            }
        }
    }

    async fn store_response(
        &self,
        key: &CacheKey,
        request: &HttpRequest,
        response: &NetworkResponse,
        write_epoch: u64,
    ) {
        let epochs = self.invalidator.epochs();
        if epochs.changed_since(&key.resource_id, write_epoch) {
            debug!("{} was written while {} was in flight; not cached", key.resource_id, key);
            return;
        }
        if !response.is_success() {
            debug!("{} answered {}; not cached", key, response.status);
            return;
        }
        let payload: Value = match serde_json::from_str(&response.body) {
            Ok(payload) => payload,
            Err(e) => {
                debug!("{} is not JSON ({}); not cached", key, e);
                return;
            }
        };
        let item_count = list_items(&payload).map_or(0, Vec::len);
        if item_count == 0 {
            debug!("{} is an empty page; not cached", key);
            return;
        }

        let preload_seed = (self.config.current().preload_all && key.is_first_page())
            .then(|| payload.clone());
        let outcome = self
            .store
            .put(key, payload, request.url.as_str(), Some(response.elapsed_ms))
            .await;
        if epochs.changed_since(&key.resource_id, write_epoch) {
            debug!("{} was written while {} was stored; dropped", key.resource_id, key);
            self.store.remove(key).await;
            return;
        }
        self.events.publish(Event::ResponseStored {
            key: key.to_string(),
            item_count,
            persisted: outcome == PutOutcome::Persisted,
        });

        if let Some(first_page) = preload_seed {
            self.preloader
                .spawn_continue_after(&key.resource_id, request.url.clone(), first_page);
        }
    }
}

#[async_trait]
impl NetworkInterceptor for CacheService {
    async fn intercept(&self, request: &HttpRequest) -> InterceptDecision {
        if !self.config.current().enabled {
            return InterceptDecision::PassThrough;
        }

        match self.classifier.classify(&request.method, &request.url) {
            Classification::ListFetch { resource_id } => {
                self.decide_list_fetch(request, resource_id).await
            }
            Classification::Write { resource_id } => {
                InterceptDecision::ObserveWrite { resource_id }
            }
            Classification::Other => InterceptDecision::PassThrough,
        }
    }

    async fn on_response(&self, decision: &InterceptDecision, response: &NetworkResponse) {
        match decision {
            InterceptDecision::ObserveWrite { resource_id } => {
                self.invalidator
                    .record_write(resource_id, response.status)
                    .await;
            }
            InterceptDecision::Rewrite {
                request,
                key,
                write_epoch,
            }
            | InterceptDecision::ServeFromCache {
                request,
                key,
                write_epoch,
                ..
            } => {
                self.store_response(key, request, response, *write_epoch)
                    .await;
            }
            InterceptDecision::PassThrough => {}
        }
    }

    async fn on_served_from_cache(&self, key: &CacheKey, request: &HttpRequest) {
        self.refresher.refresh(key, request.clone());
    }

    fn on_synthesis_failed(&self, key: &CacheKey, error: &PostcacheError) {
        warn!("{}; falling back to the network", error);
        self.events.publish(Event::SynthesisFallback {
            key: key.to_string(),
            message: error.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryTier;
    use crate::config::Configuration;
    use crate::events::shared_event_bus;
    use crate::http::MockTransport;
    use reqwest::Method;

    fn service(config: Configuration) -> CacheService {
        service_over(config, MockTransport::new(), None)
    }

    fn service_over(
        config: Configuration,
        transport: MockTransport,
        fallback: Option<MockTransport>,
    ) -> CacheService {
        let bus = shared_event_bus(32);
        let handle = ConfigHandle::fixed(config);
        let store = Arc::new(CacheStore::new(
            Arc::new(InMemoryTier::new()),
            handle.clone(),
            bus.clone(),
        ));
        let mut builder = CacheService::builder(handle, store, bus, Arc::new(transport))
            .base_url(Url::parse("https://help.example.com").unwrap());
        if let Some(fallback) = fallback {
            builder = builder.fallback_transport(Arc::new(fallback));
        }
        builder.build().unwrap()
    }

    fn page(ids: &[u64]) -> serde_json::Value {
        serde_json::json!({"data": ids.iter().map(|id| serde_json::json!({"id": id})).collect::<Vec<_>>()})
    }

    fn get(path: &str) -> HttpRequest {
        HttpRequest::get(Url::parse(&format!("https://help.example.com{}", path)).unwrap())
    }

    #[tokio::test]
    async fn test_disabled_passes_everything_through() {
        let service = service(Configuration {
            enabled: false,
            ..Default::default()
        });
        let decision = service.intercept(&get("/api/v1/cases/1/posts?limit=30")).await;
        assert_eq!(decision, InterceptDecision::PassThrough);
    }

    #[tokio::test]
    async fn test_list_miss_is_rewritten() {
        let service = service(Configuration::default());
        match service.intercept(&get("/api/v1/cases/1/posts?limit=30&after_id=5")).await {
            InterceptDecision::Rewrite { request, key, .. } => {
                assert_eq!(
                    request.url.as_str(),
                    "https://help.example.com/api/v1/cases/1/posts?limit=100&after_id=5"
                );
                assert_eq!(key.to_string(), "1_5_100");
            }
            other => panic!("unexpected decision {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_numeric_limit_passes_through() {
        let service = service(Configuration::default());
        let decision = service.intercept(&get("/api/v1/cases/1/posts?limit=many")).await;
        assert_eq!(decision, InterceptDecision::PassThrough);
    }

    #[tokio::test]
    async fn test_writes_are_observed() {
        let service = service(Configuration::default());
        let request = HttpRequest::new(
            Method::POST,
            Url::parse("https://help.example.com/api/v1/cases/9/notes").unwrap(),
        );
        assert_eq!(
            service.intercept(&request).await,
            InterceptDecision::ObserveWrite {
                resource_id: "9".into()
            }
        );
    }

    #[tokio::test]
    async fn test_other_requests_pass_through() {
        let service = service(Configuration::default());
        let decision = service.intercept(&get("/api/v1/session")).await;
        assert_eq!(decision, InterceptDecision::PassThrough);
    }

    #[tokio::test]
    async fn test_hit_after_store() {
        let service = service(Configuration::default());
        let first = service.intercept(&get("/api/v1/cases/1/posts?limit=30")).await;
        let response = NetworkResponse::json_ok(
            "https://help.example.com/api/v1/cases/1/posts?limit=100",
            &serde_json::json!({"data": [{"id": 1}]}),
        );
        service.on_response(&first, &response).await;

        let second = service.intercept(&get("/api/v1/cases/1/posts?limit=30")).await;
        assert!(matches!(second, InterceptDecision::ServeFromCache { .. }));
    }

    #[tokio::test]
    async fn test_response_of_written_resource_is_not_stored() {
        let service = service(Configuration::default());
        let decision = service.intercept(&get("/api/v1/cases/1/posts?limit=30")).await;

        // The write completes while the list fetch is still in flight
        service.invalidator().record_write("1", 201).await;
        let response = NetworkResponse::json_ok(
            "https://help.example.com/api/v1/cases/1/posts?limit=100",
            &serde_json::json!({"data": [{"id": 1}]}),
        );
        service.on_response(&decision, &response).await;

        assert_eq!(service.store().statistics().stores, 0);
        let next = service.intercept(&get("/api/v1/cases/1/posts?limit=30")).await;
        assert!(matches!(next, InterceptDecision::Rewrite { .. }));
    }

    #[tokio::test]
    async fn test_empty_and_failed_pages_are_not_stored() {
        let service = service(Configuration::default());
        let decision = service.intercept(&get("/api/v1/cases/1/posts?limit=30")).await;

        let empty = NetworkResponse::json_ok("u", &serde_json::json!({"data": []}));
        service.on_response(&decision, &empty).await;
        let failed = NetworkResponse::with_status("u", 500, r#"{"data":[{"id":1}]}"#);
        service.on_response(&decision, &failed).await;

        assert_eq!(service.store().statistics().stores, 0);
    }

    #[tokio::test]
    async fn test_refresh_falls_back_to_second_transport() {
        let mut primary = MockTransport::new();
        primary
            .expect_execute()
            .returning(|_| Err(PostcacheError::http("connection reset")));
        let mut fallback = MockTransport::new();
        fallback
            .expect_execute()
            .times(1)
            .returning(|req| Ok(NetworkResponse::json_ok(req.url.as_str(), &page(&[1, 2]))));
        let service = service_over(Configuration::default(), primary, Some(fallback));
        let mut events = service.events().subscribe();

        let first = service.intercept(&get("/api/v1/cases/1/posts?limit=30")).await;
        let url = "https://help.example.com/api/v1/cases/1/posts?limit=100";
        service
            .on_response(&first, &NetworkResponse::json_ok(url, &page(&[1])))
            .await;
        let InterceptDecision::ServeFromCache { request, key, .. } =
            service.intercept(&get("/api/v1/cases/1/posts?limit=30")).await
        else {
            panic!("expected a cache hit");
        };
        service.on_served_from_cache(&key, &request).await;

        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            loop {
                if let Ok(Event::DataRefreshed { item_count, .. }) = events.recv().await {
                    return item_count;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(service.store().get(&key).await.unwrap().item_count(), 2);
    }

    #[tokio::test]
    async fn test_preload_after_first_page_is_tracked() {
        let mut transport = MockTransport::new();
        transport
            .expect_execute()
            .returning(|req| Ok(NetworkResponse::json_ok(req.url.as_str(), &page(&[]))));
        let config = Configuration {
            preload_all: true,
            ..Default::default()
        };
        let service = service_over(config, transport, None);

        let decision = service.intercept(&get("/api/v1/cases/1/posts?limit=30")).await;
        let url = "https://help.example.com/api/v1/cases/1/posts?limit=100";
        service
            .on_response(&decision, &NetworkResponse::json_ok(url, &page(&[1, 2, 3])))
            .await;
        assert_eq!(service.preloader().active_count(), 1);

        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while service.preloader().active_count() > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }
}
