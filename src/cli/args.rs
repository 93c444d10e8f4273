//! CLI argument definitions using clap derive

use crate::config::CONFIG_ENV;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// plugcache - inspect and maintain a CLI's plugin metadata cache
///
/// Plugin metadata is cached in plugins.json and shared between concurrent
/// invocations through a crash-tolerant reader/writer lock.
#[derive(Parser, Debug)]
#[command(name = "plugcache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = CONFIG_ENV)]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List all available commands
    Commands(CommandsArgs),

    /// List topics, or the subtopics and commands of one topic
    Topics(TopicsArgs),

    /// Show which plugin provides a command
    Which(WhichArgs),

    /// Inspect or clear the plugin cache
    Cache(CacheArgs),

    /// Show holders of the cache lock
    Locks(LocksArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),
}

/// Arguments for the commands command
#[derive(Parser, Debug)]
pub struct CommandsArgs {
    /// Include hidden commands
    #[arg(short, long)]
    pub all: bool,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the topics command
#[derive(Parser, Debug)]
pub struct TopicsArgs {
    /// Topic to describe (lists top-level topics when omitted)
    pub topic: Option<String>,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the which command
#[derive(Parser, Debug)]
pub struct WhichArgs {
    /// Command id or alias (e.g. db:pull)
    pub id: String,
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// Subcommand for cache
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Print the location of plugins.json
    Path,

    /// Print the cached metadata
    Show,

    /// Drop cached metadata (all plugins, or only the given plugin paths)
    Clear {
        /// Plugin directories to forget
        paths: Vec<PathBuf>,
    },
}

/// Arguments for the locks command
#[derive(Parser, Debug)]
pub struct LocksArgs {
    /// Remove entries left behind by dead processes
    #[arg(long)]
    pub clear_stale: bool,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Output format for listing commands
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::ffi::OsStr;

    #[test]
    fn config_flag_reads_env() {
        let cmd = Cli::command();
        let config = cmd
            .get_arguments()
            .find(|arg| arg.get_id() == "config")
            .unwrap();
        assert_eq!(config.get_env(), Some(OsStr::new(CONFIG_ENV)));
    }

    #[test]
    fn cli_parses_commands() {
        let cli = Cli::parse_from(["plugcache", "commands", "--all", "--format", "json"]);
        match cli.command {
            Commands::Commands(args) => {
                assert!(args.all);
                assert!(matches!(args.format, OutputFormat::Json));
            }
            _ => panic!("expected Commands command"),
        }
    }

    #[test]
    fn cli_parses_cache_clear_paths() {
        let cli = Cli::parse_from(["plugcache", "cache", "clear", "/a", "/b"]);
        match cli.command {
            Commands::Cache(CacheArgs {
                action: CacheAction::Clear { paths },
            }) => assert_eq!(paths, vec![PathBuf::from("/a"), PathBuf::from("/b")]),
            _ => panic!("expected cache clear"),
        }
    }

    #[test]
    fn cli_parses_locks() {
        let cli = Cli::parse_from(["plugcache", "-vv", "locks", "--clear-stale"]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Locks(args) => assert!(args.clear_stale),
            _ => panic!("expected Locks command"),
        }
    }

    #[test]
    fn cli_parses_topics_without_topic() {
        let cli = Cli::parse_from(["plugcache", "topics"]);
        match cli.command {
            Commands::Topics(args) => assert!(args.topic.is_none()),
            _ => panic!("expected Topics command"),
        }
    }

    #[test]
    fn cli_parses_config_init() {
        let cli = Cli::parse_from(["plugcache", "config", "init", "--force"]);
        match cli.command {
            Commands::Config(ConfigArgs {
                action: Some(ConfigAction::Init { force }),
            }) => assert!(force),
            _ => panic!("expected config init"),
        }
    }

    #[test]
    fn cli_requires_which_id() {
        assert!(Cli::try_parse_from(["plugcache", "which"]).is_err());
    }
}
