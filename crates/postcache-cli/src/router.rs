//! Command routing logic for CLI

use crate::args::{Cli, Commands, ConfigAction};
use crate::commands;
use crate::context::AppContext;
use postcache_core::error::PostcacheResult;

/// Route CLI commands to their respective handlers
pub async fn route(cli: Cli) -> PostcacheResult<()> {
    let ctx = AppContext::from_cli(&cli).await?;

    match cli.command {
        Commands::Fetch {
            url,
            method,
            data,
            repeat,
        } => {
            commands::fetch::run(
                &ctx,
                commands::fetch::FetchArgs {
                    url,
                    method,
                    data,
                    repeat,
                },
            )
            .await
        }
        Commands::Stats => commands::cache::stats(&ctx).await,
        Commands::Clear => commands::cache::clear(&ctx).await,
        Commands::Cleanup => commands::cache::cleanup(&ctx).await,
        Commands::Config { action } => route_config(&ctx, action),
        Commands::Preload { resource_id } => commands::preload::run(&ctx, &resource_id).await,
    }
}

fn route_config(ctx: &AppContext, action: ConfigAction) -> PostcacheResult<()> {
    match action {
        ConfigAction::Show => commands::config::show(ctx),
        ConfigAction::Set { field, value } => commands::config::set(ctx, &field, &value),
        ConfigAction::Reset => commands::config::reset(ctx),
    }
}
