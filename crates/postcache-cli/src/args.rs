//! CLI argument definitions using clap
//!
//! - postcache fetch <url>            # Request through the interceptor
//! - postcache stats|clear|cleanup    # Cache maintenance
//! - postcache config show|set|reset  # Configuration record
//! - postcache preload <id>           # Cache every page of a resource

use clap::{Parser, Subcommand};
use postcache_core::config::env_loader::DATA_DIR_VAR;
use postcache_core::config::logging_config::LogFormat;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "postcache")]
#[command(about = "Cache-then-network layer for paginated helpdesk list endpoints")]
#[command(
    long_about = r#"Cache-then-network layer for paginated helpdesk list endpoints

USAGE:
  postcache --base-url https://help.example.com fetch /api/v1/cases/42/posts?limit=30
  postcache stats                      # Show cache statistics
  postcache clear                      # Drop every cached page
  postcache config set pageSize 200    # Change a setting

For detailed help: postcache --help"#
)]
#[command(version)]
pub struct Cli {
    /// Directory holding the configuration and the persistent cache
    #[arg(long, global = true, env = DATA_DIR_VAR)]
    pub data_dir: Option<PathBuf>,

    /// Origin that relative URLs are resolved against
    #[arg(long, global = true, env = "POSTCACHE_BASE_URL")]
    pub base_url: Option<String>,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Log output format: pretty, compact or json
    #[arg(long, global = true, default_value = "pretty")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Send requests through the interceptor and report where answers came from
    #[command(verbatim_doc_comment)]
    Fetch {
        /// Absolute URL, or a path resolved against --base-url
        url: String,

        /// HTTP method
        #[arg(long, short = 'X', default_value = "GET")]
        method: String,

        /// Request body
        #[arg(long, short)]
        data: Option<String>,

        /// Number of times to send the request
        #[arg(long, default_value_t = 1)]
        repeat: u32,
    },

    /// Show cache statistics
    Stats,

    /// Remove every cached page from both tiers
    Clear,

    /// Remove expired pages
    Cleanup,

    /// Read or change the persisted configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Fetch and cache every page of a resource
    Preload {
        /// Resource (case) identifier
        resource_id: String,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigAction {
    /// Display the effective configuration
    Show,

    /// Change one field, using its camelCase name
    Set { field: String, value: String },

    /// Restore the defaults
    Reset,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_defaults() {
        let cli = Cli::try_parse_from(["postcache", "fetch", "/api/v1/cases/1/posts"]).unwrap();
        match cli.command {
            Commands::Fetch {
                url,
                method,
                data,
                repeat,
            } => {
                assert_eq!(url, "/api/v1/cases/1/posts");
                assert_eq!(method, "GET");
                assert!(data.is_none());
                assert_eq!(repeat, 1);
            }
            _ => panic!("expected fetch"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "postcache",
            "stats",
            "--data-dir",
            "/tmp/pc",
            "--base-url",
            "https://help.example.com",
        ])
        .unwrap();
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/pc")));
        assert_eq!(cli.base_url.as_deref(), Some("https://help.example.com"));
    }

    #[test]
    fn test_config_set() {
        let cli = Cli::try_parse_from(["postcache", "config", "set", "pageSize", "200"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Set { ref field, ref value }
            } if field == "pageSize" && value == "200"
        ));
    }

    #[test]
    fn test_unknown_log_format_rejected() {
        assert!(Cli::try_parse_from(["postcache", "--log-format", "xml", "stats"]).is_err());
    }
}
