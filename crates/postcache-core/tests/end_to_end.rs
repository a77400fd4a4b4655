//! End-to-end tests for the cache service
//!
//! Requests go through an [`InterceptingClient`] backed by a scripted
//! transport, so every test exercises interception, storage, synthesis and
//! refresh together.

use async_trait::async_trait;
use parking_lot::Mutex;
use postcache_core::cache::{CacheKey, CacheStore, InMemoryTier, PersistentTier};
use postcache_core::config::{ConfigHandle, ConfigStore, Configuration};
use postcache_core::events::{Event, SharedEventBus, shared_event_bus};
use postcache_core::http::{HttpRequest, NetworkResponse, ResponseView, Transport};
use postcache_core::intercept::{CallEvent, InterceptingClient};
use postcache_core::{CacheService, PostcacheResult};
use reqwest::Method;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use url::Url;

const ORIGIN: &str = "https://help.example.com";

/// Answers every request with the same page and records what was asked
struct ScriptedTransport {
    page: Value,
    calls: Mutex<Vec<String>>,
    hold: AtomicBool,
    release: Notify,
}

impl ScriptedTransport {
    fn new(page: Value) -> Self {
        Self {
            page,
            calls: Mutex::new(Vec::new()),
            hold: AtomicBool::new(false),
            release: Notify::new(),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, request: &HttpRequest) -> PostcacheResult<NetworkResponse> {
        self.calls
            .lock()
            .push(format!("{} {}", request.method, request.url));
        if self.hold.load(Ordering::SeqCst) {
            self.release.notified().await;
        }
        if request.method == Method::GET {
            Ok(NetworkResponse::json_ok(request.url.as_str(), &self.page))
        } else {
            Ok(NetworkResponse::with_status(
                request.url.as_str(),
                201,
                r#"{"status":201}"#,
            ))
        }
    }
}

struct Harness {
    service: Arc<CacheService>,
    client: InterceptingClient,
    transport: Arc<ScriptedTransport>,
    events: SharedEventBus,
}

fn harness_with(persistent: Arc<dyn PersistentTier>, page: Value) -> Harness {
    let events = shared_event_bus(64);
    let config = ConfigHandle::fixed(Configuration::default());
    harness_over(persistent, config, events, page)
}

fn harness_over(
    persistent: Arc<dyn PersistentTier>,
    config: ConfigHandle,
    events: SharedEventBus,
    page: Value,
) -> Harness {
    let store = Arc::new(CacheStore::new(persistent, config.clone(), events.clone()));
    let transport = Arc::new(ScriptedTransport::new(page));
    let service = Arc::new(
        CacheService::builder(config, store, events.clone(), transport.clone())
            .build()
            .unwrap(),
    );
    let client = InterceptingClient::new(service.clone(), transport.clone())
        .with_base_url(Url::parse(ORIGIN).unwrap());
    Harness {
        service,
        client,
        transport,
        events,
    }
}

fn harness() -> Harness {
    harness_with(Arc::new(InMemoryTier::new()), sample_page())
}

fn sample_page() -> Value {
    json!({
        "status": 200,
        "data": [
            {"id": 11, "contents": "First reply", "creator": {"id": 3, "full_name": "Ana"}},
            {"id": 12, "contents": "Second reply", "is_public": true, "score": 0.5}
        ],
        "total_count": 2
    })
}

fn list_request(query: &str) -> HttpRequest {
    HttpRequest::get(Url::parse(&format!("{}/api/v1/cases/42/posts?{}", ORIGIN, query)).unwrap())
}

fn write_request() -> HttpRequest {
    HttpRequest::new(
        Method::POST,
        Url::parse(&format!("{}/api/v1/cases/42/notes", ORIGIN)).unwrap(),
    )
    .with_body(r#"{"contents":"internal note"}"#)
}

/// Wait until the transport has been asked `count` times
async fn wait_for_calls(transport: &ScriptedTransport, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while transport.calls().len() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("transport was never called");
}

async fn wait_for_refresh(receiver: &mut tokio::sync::broadcast::Receiver<Event>) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match receiver.recv().await {
                Ok(Event::DataRefreshed { .. }) => return,
                Ok(_) => continue,
                Err(e) => panic!("event stream closed: {}", e),
            }
        }
    })
    .await
    .expect("refresh never completed");
}

#[tokio::test]
async fn test_miss_then_hit_serves_synthesized_response() {
    let h = harness();
    let mut receiver = h.events.subscribe();

    let first = h.client.fetch(list_request("limit=30")).await.unwrap();
    assert!(!first.from_cache());
    assert_eq!(h.transport.calls().len(), 1);

    let second = h.client.fetch(list_request("limit=30")).await.unwrap();
    assert!(second.from_cache());
    assert_eq!(second.status(), 200);
    assert_eq!(second.json().unwrap(), sample_page());

    // The cached answer triggers exactly one background replay
    wait_for_refresh(&mut receiver).await;
    assert_eq!(h.transport.calls().len(), 2);

    let stats = h.service.store().statistics();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
}

#[tokio::test]
async fn test_small_page_size_is_rewritten() {
    let h = harness();
    h.client
        .fetch(list_request("include=creator&limit=30&after_id=7"))
        .await
        .unwrap();

    assert_eq!(
        h.transport.calls(),
        vec![format!(
            "GET {}/api/v1/cases/42/posts?include=creator&limit=100&after_id=7",
            ORIGIN
        )]
    );
}

#[tokio::test]
async fn test_large_page_size_is_left_alone() {
    let h = harness();
    h.client.fetch(list_request("limit=50")).await.unwrap();

    assert_eq!(
        h.transport.calls(),
        vec![format!("GET {}/api/v1/cases/42/posts?limit=50", ORIGIN)]
    );
}

#[tokio::test]
async fn test_successful_write_invalidates_resource() {
    let h = harness();
    h.client.fetch(list_request("limit=30")).await.unwrap();

    let response = h.client.fetch(write_request()).await.unwrap();
    assert_eq!(response.status(), 201);
    assert!(h.service.invalidator().in_cooldown("42"));

    let after = h.client.fetch(list_request("limit=30")).await.unwrap();
    assert!(!after.from_cache());
    assert_eq!(h.transport.calls().len(), 3);
}

#[tokio::test]
async fn test_write_to_other_resource_keeps_entries() {
    let h = harness();
    h.client.fetch(list_request("limit=30")).await.unwrap();

    let write = HttpRequest::new(
        Method::POST,
        Url::parse(&format!("{}/api/v1/cases/420/posts", ORIGIN)).unwrap(),
    );
    h.client.fetch(write).await.unwrap();

    let after = h.client.fetch(list_request("limit=30")).await.unwrap();
    assert!(after.from_cache());
}

#[tokio::test]
async fn test_quota_failure_degrades_to_memory() {
    let h = harness_with(Arc::new(InMemoryTier::with_quota(16)), sample_page());
    let mut receiver = h.events.subscribe();

    h.client.fetch(list_request("limit=30")).await.unwrap();
    let stored = loop {
        if let Ok(Event::ResponseStored { persisted, .. }) = receiver.recv().await {
            break persisted;
        }
    };
    assert!(!stored);

    let second = h.client.fetch(list_request("limit=30")).await.unwrap();
    assert!(second.from_cache());
    assert!(h.service.store().statistics().quota_failures >= 1);
}

#[tokio::test]
async fn test_synthesized_response_matches_network_response() {
    let h = harness();

    let real = h.client.fetch(list_request("limit=30")).await.unwrap();
    let cached = h.client.fetch(list_request("limit=30")).await.unwrap();

    assert_eq!(real.status(), cached.status());
    assert_eq!(real.json().unwrap(), cached.json().unwrap());
    assert_eq!(cached.header("Content-Type"), Some("application/json"));
    assert_eq!(real.url(), cached.url());
}

#[tokio::test]
async fn test_refresh_is_not_started_twice_for_one_key() {
    let h = harness();
    let mut receiver = h.events.subscribe();
    h.client.fetch(list_request("limit=30")).await.unwrap();

    h.transport.hold.store(true, Ordering::SeqCst);
    let a = h.client.fetch(list_request("limit=30")).await.unwrap();
    let b = h.client.fetch(list_request("limit=30")).await.unwrap();
    assert!(a.from_cache() && b.from_cache());
    assert_eq!(h.service.refresher().in_flight_count(), 1);

    h.transport.release.notify_one();
    wait_for_refresh(&mut receiver).await;

    assert_eq!(h.transport.calls().len(), 2);
    assert_eq!(h.service.refresher().in_flight_count(), 0);
}

#[tokio::test]
async fn test_parameter_order_does_not_change_key() {
    let h = harness();
    h.client
        .fetch(list_request("limit=30&after_id=5"))
        .await
        .unwrap();

    let reordered = h
        .client
        .fetch(list_request("after_id=5&limit=30"))
        .await
        .unwrap();
    assert!(reordered.from_cache());

    let other_cursor = h
        .client
        .fetch(list_request("limit=30&after_id=6"))
        .await
        .unwrap();
    assert!(!other_cursor.from_cache());
}

#[tokio::test]
async fn test_callback_call_receives_cached_load() {
    let h = harness();
    h.client.fetch(list_request("limit=30")).await.unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut call = h
        .client
        .open(Method::GET, "/api/v1/cases/42/posts?limit=30");
    let sink = Arc::clone(&seen);
    call.on_event(move |event| {
        let label = match event {
            CallEvent::Load(response) => format!("load:{}", response.from_cache()),
            other => other.name().to_string(),
        };
        sink.lock().push(label);
    });

    let response = call.send(None).finished().await.unwrap();
    assert!(response.from_cache());
    let seen = seen.lock().clone();
    assert_eq!(seen.last().map(String::as_str), Some("loadend"));
    assert!(seen.contains(&"load:true".to_string()));
}

#[tokio::test]
async fn test_disabled_service_never_touches_cache() {
    let events = shared_event_bus(16);
    let config = ConfigHandle::fixed(Configuration {
        enabled: false,
        ..Default::default()
    });
    let store = Arc::new(CacheStore::new(
        Arc::new(InMemoryTier::new()),
        config.clone(),
        events.clone(),
    ));
    let transport = Arc::new(ScriptedTransport::new(sample_page()));
    let service = Arc::new(
        CacheService::builder(config, store.clone(), events, transport.clone())
            .build()
            .unwrap(),
    );
    let client = InterceptingClient::new(service, transport.clone());

    client.fetch(list_request("limit=30")).await.unwrap();
    client.fetch(list_request("limit=30")).await.unwrap();

    assert_eq!(transport.calls().len(), 2);
    assert!(transport.calls()[0].ends_with("limit=30"));
    assert_eq!(store.statistics().stores, 0);
}

#[tokio::test]
async fn test_refresh_overlapping_write_does_not_restore_stale_page() {
    let h = harness();
    let key = CacheKey::new("42", None, 100);
    h.client.fetch(list_request("limit=30")).await.unwrap();

    // The cached answer starts a refresh that stalls in the transport
    h.transport.hold.store(true, Ordering::SeqCst);
    let cached = h.client.fetch(list_request("limit=30")).await.unwrap();
    assert!(cached.from_cache());
    wait_for_calls(&h.transport, 2).await;

    h.transport.hold.store(false, Ordering::SeqCst);
    let written = h.client.fetch(write_request()).await.unwrap();
    assert_eq!(written.status(), 201);

    h.transport.release.notify_one();
    tokio::time::timeout(Duration::from_secs(5), async {
        while h.service.refresher().in_flight_count() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("refresh never finished");

    assert!(h.service.store().get(&key).await.is_none());
}

#[tokio::test]
async fn test_miss_overlapping_write_is_not_cached() {
    let h = harness();
    let key = CacheKey::new("42", None, 100);

    h.transport.hold.store(true, Ordering::SeqCst);
    let client = h.client.clone();
    let pending = tokio::spawn(async move { client.fetch(list_request("limit=30")).await });
    wait_for_calls(&h.transport, 1).await;

    h.transport.hold.store(false, Ordering::SeqCst);
    h.client.fetch(write_request()).await.unwrap();
    h.transport.release.notify_one();

    let response = pending.await.unwrap().unwrap();
    assert!(!response.from_cache());
    assert_eq!(response.json().unwrap(), sample_page());
    assert!(h.service.store().get(&key).await.is_none());
}

#[tokio::test]
async fn test_disabling_live_service_passes_next_call_through() {
    let events = shared_event_bus(64);
    let config = ConfigStore::in_memory(Configuration::default(), events.clone()).unwrap();
    let h = harness_over(
        Arc::new(InMemoryTier::new()),
        config.handle(),
        events,
        sample_page(),
    );
    h.client.fetch(list_request("limit=30")).await.unwrap();

    config.update(|c| c.enabled = false).unwrap();
    let after = h.client.fetch(list_request("limit=30")).await.unwrap();

    assert!(!after.from_cache());
    let calls = h.transport.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].ends_with("limit=100"));
    assert_eq!(
        calls[1],
        format!("GET {}/api/v1/cases/42/posts?limit=30", ORIGIN)
    );
    assert_eq!(h.service.store().statistics().stores, 1);
}

#[tokio::test]
async fn test_malformed_persisted_record_is_a_miss() {
    let tier = Arc::new(InMemoryTier::new());
    let key = CacheKey::new("42", None, 100);
    tier.write(&key.persistent_key(), "not json").await.unwrap();
    let h = harness_with(tier.clone(), sample_page());

    let response = h.client.fetch(list_request("limit=30")).await.unwrap();

    assert!(!response.from_cache());
    assert_eq!(h.transport.calls().len(), 1);
    assert_eq!(h.service.store().statistics().misses, 1);
    let replaced = tier.read(&key.persistent_key()).await.unwrap().unwrap();
    assert!(serde_json::from_str::<Value>(&replaced).is_ok());
}
