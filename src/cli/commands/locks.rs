//! Locks command - show who holds the cache lock

use super::CommandContext;
use crate::cli::args::{LocksArgs, OutputFormat};
use crate::error::PlugcacheResult;
use crate::lock::{writer_path, LockStatus};
use chrono::{DateTime, Local};
use console::style;
use serde_json::json;
use std::path::Path;

/// Execute the locks command
///
/// Runs outside a command session: registering as a reader would wait on
/// the very writer this command is meant to report.
pub async fn execute(args: LocksArgs, ctx: &CommandContext) -> PlugcacheResult<()> {
    let lock_path = ctx.cache_settings().lock_path();
    let removed = if args.clear_stale {
        Some(ctx.locks.clear_stale(&lock_path).await?)
    } else {
        None
    };
    let status = ctx.locks.inspect(&lock_path).await?;
    let since = status.writer.and_then(|_| held_since(&writer_path(&lock_path)));

    match args.format {
        OutputFormat::Json => {
            let value = json!({
                "path": lock_path,
                "pid": ctx.locks.pid(),
                "status": status,
                "writer_since": since,
                "removed": removed,
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Plain => {
            if let Some((pid, _)) = status.writer {
                println!("writer {}", pid);
            }
            for (pid, _) in &status.readers {
                println!("reader {}", pid);
            }
        }
        OutputFormat::Table => print_table(&status, since, &lock_path, ctx.locks.pid(), removed),
    }
    Ok(())
}

/// When the writer directory was created, as far as its mtime tells
fn held_since(dir: &Path) -> Option<DateTime<Local>> {
    let modified = std::fs::metadata(dir).and_then(|m| m.modified()).ok()?;
    Some(DateTime::<Local>::from(modified))
}

fn print_table(
    status: &LockStatus,
    since: Option<DateTime<Local>>,
    lock_path: &Path,
    own_pid: u32,
    removed: Option<usize>,
) {
    println!("{} {}", style("Lock:").bold(), lock_path.display());
    if let Some(removed) = removed {
        println!("{} Removed {} stale lock entries", style("✓").green(), removed);
    }
    println!();
    println!(
        "{:<10} {:<10} {:<14} {}",
        style("ROLE").bold(),
        style("PID").bold(),
        style("STATE").bold(),
        style("SINCE").bold()
    );

    let mut rows = vec![];
    if let Some(writer) = status.writer {
        rows.push(("writer", writer));
    }
    rows.extend(status.readers.iter().map(|r| ("reader", *r)));

    for (role, (pid, alive)) in rows {
        let state = if pid == own_pid {
            style("this process").cyan()
        } else if alive {
            style("running").green()
        } else {
            style("stale").red()
        };
        let since = match (role, since) {
            ("writer", Some(at)) => at.format("%Y-%m-%d %H:%M:%S").to_string(),
            _ => "-".to_string(),
        };
        println!("{:<10} {:<10} {:<14} {}", role, pid, state, since);
    }

    if status.stale_entries() > 0 && removed.is_none() {
        println!();
        println!(
            "{} {} stale lock entries; run with --clear-stale to remove them",
            style("Hint:").yellow(),
            status.stale_entries()
        );
    }
}
