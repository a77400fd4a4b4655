//! Event system for cache diagnostics and cross-context signaling
//!
//! Every cache service in a process shares one broadcast-based event bus.
//! Configuration changes and invalidations travel over it so that other
//! contexts observe them, and diagnostic events (hits, misses, refreshes)
//! feed the optional user-facing notifications.

use std::sync::Arc;
use tokio::sync::broadcast;

/// Events published by the cache service and its helpers
#[derive(Debug, Clone)]
pub enum Event {
    // ========== Configuration Events ==========
    /// The persisted configuration record was replaced
    ConfigUpdated { enabled: bool, page_size: u32 },

    // ========== Cache Events ==========
    /// A list request was answered from cache
    CacheHit {
        key: String,
        age_ms: u64,
        item_count: usize,
    },

    /// A list request had no usable entry and went to the network
    CacheMiss { key: String },

    /// A fresh response was written to the cache
    ResponseStored {
        key: String,
        item_count: usize,
        persisted: bool,
    },

    /// Entries were evicted to stay inside the size budget
    Evicted { keys: Vec<String>, freed_bytes: u64 },

    /// A cached answer could not be synthesized; the real request was sent
    SynthesisFallback { key: String, message: String },

    // ========== Refresh Events ==========
    /// A background refresh replaced a cached entry
    DataRefreshed { key: String, item_count: usize },

    /// A background refresh failed; the existing entry is kept
    RefreshFailed { key: String, message: String },

    // ========== Invalidation Events ==========
    /// Entries of a resource were purged after a successful write
    Invalidated { resource_id: String, removed: usize },

    // ========== Preload Events ==========
    /// All pages of a resource were walked and cached
    PreloadCompleted {
        resource_id: String,
        pages: usize,
        items: usize,
    },
}

impl Event {
    /// Create a cache hit event
    pub fn cache_hit(key: impl Into<String>, age_ms: u64, item_count: usize) -> Self {
        Self::CacheHit {
            key: key.into(),
            age_ms,
            item_count,
        }
    }

    /// Create a cache miss event
    pub fn cache_miss(key: impl Into<String>) -> Self {
        Self::CacheMiss { key: key.into() }
    }

    /// Create a refresh failure event
    pub fn refresh_failed(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RefreshFailed {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ConfigUpdated { .. } => "config_updated",
            Self::CacheHit { .. } => "cache_hit",
            Self::CacheMiss { .. } => "cache_miss",
            Self::ResponseStored { .. } => "response_stored",
            Self::Evicted { .. } => "evicted",
            Self::SynthesisFallback { .. } => "synthesis_fallback",
            Self::DataRefreshed { .. } => "data_refreshed",
            Self::RefreshFailed { .. } => "refresh_failed",
            Self::Invalidated { .. } => "invalidated",
            Self::PreloadCompleted { .. } => "preload_completed",
        }
    }

    /// Short user-facing text for the optional diagnostic notification.
    ///
    /// Events that are not worth surfacing return `None`.
    pub fn notification(&self) -> Option<String> {
        match self {
            Self::CacheHit {
                item_count, age_ms, ..
            } => Some(format!(
                "Loaded {} posts from cache ({}s old)",
                item_count,
                age_ms / 1000
            )),
            Self::CacheMiss { .. } => Some("Cache miss, loading from server".to_string()),
            Self::DataRefreshed { item_count, .. } => {
                Some(format!("Data refreshed ({} posts)", item_count))
            }
            Self::Invalidated {
                resource_id,
                removed,
            } if *removed > 0 => Some(format!(
                "Cleared {} cached pages for case {}",
                removed, resource_id
            )),
            Self::PreloadCompleted { pages, items, .. } => Some(format!(
                "Preloaded {} posts across {} pages",
                items, pages
            )),
            _ => None,
        }
    }
}

/// Event bus for system-wide event distribution
///
/// The EventBus uses a broadcast channel to distribute events to multiple subscribers.
/// Each subscriber receives a copy of every published event.
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
    capacity: usize,
}

impl EventBus {
    /// Create a new event bus with the specified capacity
    ///
    /// The capacity determines how many events can be buffered before
    /// slow subscribers start losing events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, capacity }
    }

    /// Publish an event to all subscribers
    ///
    /// Returns the number of active receivers. Publishing with no
    /// subscribers is not an error.
    pub fn publish(&self, event: Event) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Get the channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            capacity: self.capacity,
        }
    }
}

/// Thread-safe wrapper around EventBus
pub type SharedEventBus = Arc<EventBus>;

/// Create a new shared event bus
pub fn shared_event_bus(capacity: usize) -> SharedEventBus {
    Arc::new(EventBus::new(capacity))
}

/// Event filter for selective subscription
#[derive(Default)]
pub struct EventFilter {
    types: Option<Vec<&'static str>>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self { types: None }
    }

    /// Filter by event types
    pub fn only_types(mut self, types: Vec<&'static str>) -> Self {
        self.types = Some(types);
        self
    }

    pub fn matches(&self, event: &Event) -> bool {
        match &self.types {
            Some(types) => types.contains(&event.event_type()),
            None => true,
        }
    }
}

/// Filtered event subscriber
pub struct FilteredSubscriber {
    receiver: broadcast::Receiver<Event>,
    filter: EventFilter,
}

impl FilteredSubscriber {
    pub fn new(bus: &EventBus, filter: EventFilter) -> Self {
        Self {
            receiver: bus.subscribe(),
            filter,
        }
    }

    /// Receive the next matching event
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Drain matching events that are already buffered, without waiting
    pub fn drain(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.filter.matches(&event) => events.push(event),
                Ok(_) => {}
                Err(broadcast::error::TryRecvError::Lagged(_)) => {}
                Err(_) => break,
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_bus_basic() {
        let bus = EventBus::new(16);
        let mut subscriber = bus.subscribe();

        let sent = bus.publish(Event::cache_miss("42_initial_100"));
        assert_eq!(sent, 1);

        match subscriber.recv().await.unwrap() {
            Event::CacheMiss { key } => assert_eq!(key, "42_initial_100"),
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_multiple_subscribers_see_config_updates() {
        let bus = EventBus::new(16);
        let mut tab_a = bus.subscribe();
        let mut tab_b = bus.subscribe();

        bus.publish(Event::ConfigUpdated {
            enabled: false,
            page_size: 50,
        });

        assert!(matches!(
            tab_a.recv().await.unwrap(),
            Event::ConfigUpdated { enabled: false, .. }
        ));
        assert!(matches!(
            tab_b.recv().await.unwrap(),
            Event::ConfigUpdated { page_size: 50, .. }
        ));
    }

    #[test]
    fn test_no_subscribers() {
        let bus = EventBus::new(4);
        assert_eq!(bus.publish(Event::cache_miss("k")), 0);
    }

    #[tokio::test]
    async fn test_filtered_subscriber() {
        let bus = EventBus::new(16);
        let mut filtered = FilteredSubscriber::new(
            &bus,
            EventFilter::new().only_types(vec!["refresh_failed"]),
        );

        bus.publish(Event::cache_hit("k", 10, 3));
        bus.publish(Event::refresh_failed("k", "timeout"));

        let event = filtered.recv().await.unwrap();
        assert_eq!(event.event_type(), "refresh_failed");
    }

    #[test]
    fn test_notification_texts() {
        assert_eq!(
            Event::cache_hit("k", 12_500, 100).notification().as_deref(),
            Some("Loaded 100 posts from cache (12s old)")
        );
        assert!(Event::cache_miss("k").notification().is_some());
        assert!(
            Event::Invalidated {
                resource_id: "42".into(),
                removed: 0
            }
            .notification()
            .is_none()
        );
        assert!(Event::refresh_failed("k", "boom").notification().is_none());
    }
}
