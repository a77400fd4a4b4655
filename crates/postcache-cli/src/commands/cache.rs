//! Cache maintenance commands

use crate::console::CLIConsole;
use crate::context::AppContext;
use chrono::{DateTime, Utc};
use postcache_core::cache::{CacheStatistics, format_bytes};
use postcache_core::error::PostcacheResult;

/// Show cache statistics
pub async fn stats(ctx: &AppContext) -> PostcacheResult<()> {
    let console = CLIConsole::new(true);
    let removed = ctx.store.cleanup_expired().await;
    if removed > 0 {
        console.info(&format!("Removed {} expired pages", removed));
    }

    console.print_header("Cache Statistics");
    print_statistics(&console, &ctx.store.statistics());
    console.print_field("Data directory", &ctx.data_dir.display().to_string());
    Ok(())
}

/// Clear both tiers
pub async fn clear(ctx: &AppContext) -> PostcacheResult<()> {
    let console = CLIConsole::new(true);
    let removed = ctx.store.clear().await;
    console.success(&format!("Cleared {} cached pages", removed));
    Ok(())
}

/// Purge expired entries
pub async fn cleanup(ctx: &AppContext) -> PostcacheResult<()> {
    let console = CLIConsole::new(true);
    let removed = ctx.store.cleanup_expired().await;
    if removed == 0 {
        console.success("No expired pages");
    } else {
        console.success(&format!("Removed {} expired pages", removed));
    }
    Ok(())
}

fn print_statistics(console: &CLIConsole, stats: &CacheStatistics) {
    console.print_field("Cached pages", &stats.persistent_entries.to_string());
    console.print_field("In memory", &stats.memory_entries.to_string());
    console.print_field(
        "Size",
        &format!(
            "{} of {} ({:.1}%)",
            stats.formatted_size(),
            format_bytes(stats.max_bytes),
            stats.usage_percent()
        ),
    );
    // Each invocation is its own session; the persisted totals are what matter here
    let (hits, misses, saved_ms) = match stats.lifetime {
        Some(lifetime) => (lifetime.hits, lifetime.misses, lifetime.saved_ms_total),
        None => (stats.hits, stats.misses, stats.saved_ms_total),
    };
    console.print_field("Hits / misses", &lookup_summary(hits, misses));
    console.print_field("Network time saved", &format_saved(saved_ms));
    console.print_field("Oldest", &render_timestamp(stats.oldest_stored_at));
    console.print_field("Newest", &render_timestamp(stats.newest_stored_at));
}

fn lookup_summary(hits: u64, misses: u64) -> String {
    let total = hits + misses;
    let rate = if total == 0 {
        0.0
    } else {
        hits as f64 * 100.0 / total as f64
    };
    format!("{} / {} ({:.0}% hit rate)", hits, misses, rate)
}

fn format_saved(ms: u64) -> String {
    if ms < 1000 {
        format!("{} ms", ms)
    } else {
        format!("{:.1} s", ms as f64 / 1000.0)
    }
}

fn render_timestamp(millis: Option<u64>) -> String {
    millis
        .and_then(|ms| DateTime::<Utc>::from_timestamp_millis(ms as i64))
        .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_summary() {
        assert_eq!(lookup_summary(0, 0), "0 / 0 (0% hit rate)");
        assert_eq!(lookup_summary(3, 1), "3 / 1 (75% hit rate)");
    }

    #[test]
    fn test_format_saved() {
        assert_eq!(format_saved(850), "850 ms");
        assert_eq!(format_saved(12_345), "12.3 s");
    }

    #[test]
    fn test_render_timestamp() {
        assert_eq!(render_timestamp(None), "-");
        assert_eq!(render_timestamp(Some(0)), "1970-01-01 00:00:00 UTC");
    }
}
