//! plugcache - plugin cache maintenance CLI
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use plugcache::cli::commands::{self, CommandContext};
use plugcache::cli::args::{ConfigAction, ConfigArgs};
use plugcache::cli::{Cli, Commands};
use plugcache::config::{Config, ConfigManager};
use plugcache::error::PlugcacheResult;
use plugcache::session::ExitCleanup;
use std::process::ExitCode;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

/// Exit status after Ctrl-C
const INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> PlugcacheResult<ExitCode> {
    let cli = Cli::parse();

    let config_manager = if let Some(ref path) = cli.config {
        ConfigManager::with_path(path.clone())
    } else {
        ConfigManager::new()
    };
    // Init must work even when the existing file does not parse
    let config = match &cli.command {
        Commands::Config(ConfigArgs {
            action: Some(ConfigAction::Init { .. }),
        }) => Config::default(),
        _ => config_manager.load().await?,
    };

    init_logging(cli.verbose, &config);
    debug!("Using config {}", config_manager.path().display());

    let ctx = CommandContext::new(config, config_manager.path().to_path_buf());

    // Anything still held when run() returns is released here
    let cleanup = ExitCleanup::new(ctx.locks.clone());

    tokio::select! {
        result = dispatch(cli.command, &ctx) => result.map(|()| ExitCode::SUCCESS),
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, releasing cache locks");
            cleanup.locks().dispose_all();
            Ok(ExitCode::from(INTERRUPTED))
        }
    }
}

/// 0 = warn, 1 = info, 2+ = debug; `[general] verbose` counts as one `-v`
fn init_logging(verbose: u8, config: &Config) {
    let level = verbose.max(u8::from(config.general.verbose));
    let filter = match level {
        0 => EnvFilter::new("plugcache=warn"),
        1 => EnvFilter::new("plugcache=info"),
        _ => EnvFilter::new("plugcache=debug"),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if config.general.json_logs() {
        builder.json().init();
    } else {
        builder.without_time().init();
    }
}

async fn dispatch(command: Commands, ctx: &CommandContext) -> PlugcacheResult<()> {
    match command {
        Commands::Commands(args) => commands::commands(args, ctx).await,
        Commands::Topics(args) => commands::topics(args, ctx).await,
        Commands::Which(args) => commands::which(args, ctx).await,
        Commands::Cache(args) => commands::cache(args, ctx).await,
        Commands::Locks(args) => commands::locks(args, ctx).await,
        Commands::Config(args) => commands::config(args, ctx).await,
    }
}
