//! Preload command

use super::Notifier;
use crate::console::CLIConsole;
use crate::context::AppContext;
use postcache_core::error::PostcacheResult;

/// Fetch and cache every page of `resource_id`
pub async fn run(ctx: &AppContext, resource_id: &str) -> PostcacheResult<()> {
    let console = CLIConsole::new(true);
    let mut notifier = Notifier::new(ctx);

    console.print_header(&format!("Preloading case {}", resource_id));
    let summary = ctx.service.preloader().load_all(resource_id).await?;
    console.success(&format!(
        "Cached {} items in {} pages",
        summary.items, summary.pages
    ));
    notifier.flush(&console);
    Ok(())
}
