//! CLI commands

pub mod cache;
pub mod config;
pub mod fetch;
pub mod preload;

use crate::console::CLIConsole;
use crate::context::AppContext;
use postcache_core::events::{EventFilter, FilteredSubscriber};

/// Event types that carry a user-facing notification
const NOTIFYING_EVENTS: &[&str] = &[
    "cache_hit",
    "cache_miss",
    "data_refreshed",
    "invalidated",
    "preload_completed",
];

/// Buffers notification events until they are printed
pub(crate) struct Notifier {
    subscriber: FilteredSubscriber,
    enabled: bool,
}

impl Notifier {
    pub(crate) fn new(ctx: &AppContext) -> Self {
        Self {
            subscriber: FilteredSubscriber::new(
                &ctx.events,
                EventFilter::new().only_types(NOTIFYING_EVENTS.to_vec()),
            ),
            enabled: ctx.config.current().notifications,
        }
    }

    /// Print the notifications of every event received so far
    pub(crate) fn flush(&mut self, console: &CLIConsole) {
        for event in self.subscriber.drain() {
            if let (true, Some(text)) = (self.enabled, event.notification()) {
                console.notify(&text);
            }
        }
    }
}
