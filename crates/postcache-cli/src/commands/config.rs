//! Configuration management commands

use crate::console::CLIConsole;
use crate::context::AppContext;
use postcache_core::config::Configuration;
use postcache_core::error::PostcacheResult;

/// Show the effective configuration
pub fn show(ctx: &AppContext) -> PostcacheResult<()> {
    let console = CLIConsole::new(true);
    console.print_header("Configuration");

    let effective = ctx.config.current();
    print_config(&console, &effective);
    if *effective != ctx.config.stored() {
        console.warn("Some values are overridden from the environment");
    }
    Ok(())
}

/// Change one field of the persisted record
pub fn set(ctx: &AppContext, field: &str, value: &str) -> PostcacheResult<()> {
    let console = CLIConsole::new(true);
    let mut next = ctx.config.stored();
    next.set_field(field, value)?;
    ctx.config.replace(next)?;
    console.success(&format!("Set {} = {}", field, value));
    Ok(())
}

/// Restore the defaults
pub fn reset(ctx: &AppContext) -> PostcacheResult<()> {
    let console = CLIConsole::new(true);
    ctx.config.reset()?;
    console.success("Configuration reset to defaults");
    Ok(())
}

fn print_config(console: &CLIConsole, config: &Configuration) {
    console.print_field("enabled", &config.enabled.to_string());
    console.print_field("pageSize", &config.page_size.to_string());
    console.print_field("rewriteThreshold", &config.rewrite_threshold.to_string());
    console.print_field("ttlMs", &config.ttl_ms.to_string());
    console.print_field("maxCacheBytes", &config.max_cache_bytes.to_string());
    console.print_field("recentWindowMs", &config.recent_window_ms.to_string());
    console.print_field(
        "recentOverageRatio",
        &config.recent_overage_ratio.to_string(),
    );
    console.print_field(
        "invalidationCooldownMs",
        &config.invalidation_cooldown_ms.to_string(),
    );
    console.print_field("refreshTimeoutMs", &config.refresh_timeout_ms.to_string());
    console.print_field("preloadAll", &config.preload_all.to_string());
    console.print_field("notifications", &config.notifications.to_string());
}
