//! Centralized timeout and pacing defaults
//!
//! Values here seed the configuration defaults; the ones that are part of the
//! configuration record can be overridden there.

use std::time::Duration;

/// Default timeout values for network operations
pub mod network {
    use super::*;

    /// Bound on a background refresh attempt (15 seconds)
    pub const REFRESH_MS: u64 = 15_000;

    /// Default timeout for the fallback HTTP client (30 seconds)
    pub const HTTP_REQUEST_SECS: u64 = 30;

    /// Connection timeout for the HTTP clients (10 seconds)
    pub const CONNECT_SECS: u64 = 10;

    pub fn refresh_timeout() -> Duration {
        Duration::from_millis(REFRESH_MS)
    }

    pub fn http_request_timeout() -> Duration {
        Duration::from_secs(HTTP_REQUEST_SECS)
    }

    pub fn connect_timeout() -> Duration {
        Duration::from_secs(CONNECT_SECS)
    }
}

/// Pacing values for cache maintenance
pub mod cache {
    use super::*;

    /// Delay between consecutive preload page requests (100 ms)
    pub const PRELOAD_PAGE_DELAY_MS: u64 = 100;

    /// Item ceiling for a single preload walk
    pub const PRELOAD_MAX_ITEMS: usize = 10_000;

    /// Interval of the periodic expired-entry sweep (5 minutes)
    pub const CLEANUP_INTERVAL_SECS: u64 = 300;

    /// How long a short-lived process waits for refreshes and preloads to settle
    pub const BACKGROUND_DRAIN_SECS: u64 = 60;

    pub fn preload_page_delay() -> Duration {
        Duration::from_millis(PRELOAD_PAGE_DELAY_MS)
    }

    pub fn cleanup_interval() -> Duration {
        Duration::from_secs(CLEANUP_INTERVAL_SECS)
    }

    pub fn background_drain() -> Duration {
        Duration::from_secs(BACKGROUND_DRAIN_SECS)
    }
}
