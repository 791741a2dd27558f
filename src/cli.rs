use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Catalog sync and windowed pagination for remotely-hosted serialized works.
#[derive(Debug, Parser)]
#[command(name = "tsundoku", version, about)]
pub struct Cli {
    /// Explicit config file (toml, yaml or json).
    #[arg(long, short, global = true, env = "TSUNDOKU_CONFIG")]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sync the catalog against the remote index.
    Sync(OutputArgs),
    /// Show one page of the catalog.
    Page {
        /// 1-indexed page number.
        page: u32,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Search titles in the light index.
    Search {
        query: String,
        /// Only works of exactly this type (manga, manhwa, manhua, ...).
        #[arg(long = "type")]
        work_type: Option<String>,
        #[arg(long, short)]
        limit: Option<usize>,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Print the page a work appears on.
    Find { id: String },
    /// Decode an indirection pointer and show the document it resolves to.
    Decode { url: String },
    /// Inspect or maintain the cache.
    Cache {
        #[command(subcommand)]
        action: CacheCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum CacheCommand {
    /// Report entry counts and sizes of the active tier.
    Stats,
    /// Evict expired and corrupt entries.
    Cleanup,
    /// Remove every tsundoku entry from every tier.
    Clear,
}

#[derive(Debug, Clone, Copy, Args)]
pub struct OutputArgs {
    /// Print JSON instead of a human-readable summary.
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_search() {
        let cli = Cli::parse_from(["tsundoku", "search", "tower", "--type", "manhwa", "-l", "5", "--json"]);
        match cli.command {
            Command::Search { query, work_type, limit, output } => {
                assert_eq!(query, "tower");
                assert_eq!(work_type.as_deref(), Some("manhwa"));
                assert_eq!(limit, Some(5));
                assert!(output.json);
            },
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_cache_action() {
        let cli = Cli::parse_from(["tsundoku", "--config", "/etc/tsundoku.toml", "cache", "clear"]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/tsundoku.toml")));
        assert!(matches!(cli.command, Command::Cache { action: CacheCommand::Clear }));
    }
}
