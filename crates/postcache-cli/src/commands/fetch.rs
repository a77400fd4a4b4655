//! Request command

use super::Notifier;
use crate::console::CLIConsole;
use crate::context::AppContext;
use parking_lot::Mutex;
use postcache_core::cache::list_items;
use postcache_core::config::timeouts;
use postcache_core::error::{PostcacheError, PostcacheResult};
use postcache_core::http::ResponseView;
use postcache_core::intercept::CallEvent;
use reqwest::Method;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

const BACKGROUND_POLL: Duration = Duration::from_millis(50);

pub struct FetchArgs {
    pub url: String,
    pub method: String,
    pub data: Option<String>,
    pub repeat: u32,
}

/// Send the request `repeat` times and report each outcome
pub async fn run(ctx: &AppContext, args: FetchArgs) -> PostcacheResult<()> {
    let console = CLIConsole::new(true);
    let method = parse_method(&args.method)?;
    let mut notifier = Notifier::new(ctx);
    let cleanup = ctx
        .store
        .spawn_cleanup_task(timeouts::cache::cleanup_interval());

    console.print_header(&format!("{} {}", method, args.url));

    for attempt in 1..=args.repeat.max(1) {
        let states = Arc::new(Mutex::new(Vec::new()));
        let mut call = ctx.client.open(method.clone(), args.url.clone());
        if args.data.is_some() {
            call.set_header("content-type", "application/json");
        }
        let sink = Arc::clone(&states);
        call.on_event(move |event| {
            if !matches!(event, CallEvent::Load(_)) {
                sink.lock().push(event.name());
            }
        });

        match call.send(args.data.clone()).finished().await {
            Ok(response) => {
                let source = if response.from_cache() { "cache" } else { "network" };
                let items = response
                    .json()
                    .ok()
                    .and_then(|value| list_items(&value).map(Vec::len));
                let summary = match items {
                    Some(n) => format!(
                        "#{} {} {} from {} ({} items)",
                        attempt,
                        response.status(),
                        response.status_text(),
                        source,
                        n
                    ),
                    None => format!(
                        "#{} {} {} from {}",
                        attempt,
                        response.status(),
                        response.status_text(),
                        source
                    ),
                };
                if response.is_success() {
                    console.success(&summary);
                } else {
                    console.warn(&summary);
                }
            }
            Err(e) => console.error(&format!("#{} request failed: {}", attempt, e)),
        }
        console.info(&format!("events: {}", states.lock().join(" -> ")));
        notifier.flush(&console);
    }

    wait_for_background(ctx, &console).await;
    notifier.flush(&console);
    cleanup.abort();
    Ok(())
}

fn parse_method(raw: &str) -> PostcacheResult<Method> {
    Method::from_bytes(raw.to_ascii_uppercase().as_bytes())
        .map_err(|e| PostcacheError::invalid_field("method", e.to_string()))
}

/// Let background refreshes and preloads finish before the process exits
async fn wait_for_background(ctx: &AppContext, console: &CLIConsole) {
    let limit = timeouts::cache::background_drain();
    let pending = || {
        (
            ctx.service.refresher().in_flight_count(),
            ctx.service.preloader().active_count(),
        )
    };
    let drained = tokio::time::timeout(limit, async {
        while pending() != (0, 0) {
            tokio::time::sleep(BACKGROUND_POLL).await;
        }
    })
    .await;

    if drained.is_err() {
        let (refreshes, preloads) = pending();
        warn!(
            "Gave up after {:?} with {} refreshes and {} preloads running",
            limit, refreshes, preloads
        );
        console.warn(&format!(
            "Exiting with {} refreshes and {} preloads unfinished",
            refreshes, preloads
        ));
    }
}
