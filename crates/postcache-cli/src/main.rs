//! Postcache CLI application
//!
//! Issues requests through the cache-then-network interceptor and manages
//! the cache and its configuration from the command line.
//!
//! # Installation
//!
//! ```bash
//! cargo install --path crates/postcache-cli
//! ```
//!
//! # Commands
//!
//! - `postcache fetch <url>`: request a URL through the interceptor
//! - `postcache stats`, `clear`, `cleanup`: inspect and maintain the cache
//! - `postcache config show|set|reset`: edit the persisted configuration
//! - `postcache preload <id>`: cache every page of a resource
//!
//! Set `RUST_LOG=debug` or pass `--verbose` for diagnostic logging.

mod args;
mod commands;
mod console;
mod context;
mod logging;
mod router;

use clap::Parser;
use postcache_core::error::PostcacheResult;

pub use args::{Cli, Commands, ConfigAction};

#[tokio::main]
async fn main() -> PostcacheResult<()> {
    let cli = Cli::parse();
    logging::init(&cli);
    router::route(cli).await
}
