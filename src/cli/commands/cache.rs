//! Cache command - inspect or clear plugins.json

use super::CommandContext;
use crate::cli::args::{CacheAction, CacheArgs};
use crate::error::{PlugcacheError, PlugcacheResult};
use crate::session::CommandSession;
use console::style;
use std::path::PathBuf;

/// Execute the cache command
pub async fn execute(args: CacheArgs, ctx: &CommandContext) -> PlugcacheResult<()> {
    let paths = match args.action {
        CacheAction::Path => {
            println!("{}", ctx.cache_settings().cache_file().display());
            return Ok(());
        }
        CacheAction::Show => None,
        CacheAction::Clear { paths } => Some(paths),
    };

    let mut session = ctx.session().await?;
    let outcome = match paths {
        None => show(&mut session).await,
        Some(paths) => clear(&mut session, paths).await,
    };
    session.finish().await?;
    outcome
}

async fn show(session: &mut CommandSession) -> PlugcacheResult<()> {
    let data = session.cache_mut().load().await?;
    println!("{}", serde_json::to_string_pretty(data)?);
    Ok(())
}

async fn clear(session: &mut CommandSession, paths: Vec<PathBuf>) -> PlugcacheResult<()> {
    let cache = session.cache_mut();

    if paths.is_empty() {
        let count = cache.load().await?.plugins.len();
        cache.clear().await?;
        cache.save().await;
        println!(
            "{} Cleared {} cached plugin(s)",
            style("✓").green(),
            count
        );
        return Ok(());
    }

    let paths = paths
        .into_iter()
        .map(|p| {
            std::path::absolute(&p)
                .map_err(|e| PlugcacheError::io(format!("resolving {}", p.display()), e))
        })
        .collect::<PlugcacheResult<Vec<_>>>()?;

    let known = cache.load().await?;
    let missing: Vec<_> = paths
        .iter()
        .filter(|p| !known.plugins.contains_key(*p))
        .collect();
    for path in &missing {
        println!(
            "{} {} is not cached",
            style("!").yellow(),
            path.display()
        );
    }

    cache.delete_plugin(&paths).await?;
    println!(
        "{} Removed {} plugin(s) from the cache",
        style("✓").green(),
        paths.len() - missing.len()
    );
    Ok(())
}
