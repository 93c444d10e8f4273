//! Which command - find the plugin providing a command

use super::CommandContext;
use crate::cli::args::WhichArgs;
use crate::error::{PlugcacheError, PlugcacheResult};
use console::style;

/// Execute the which command
pub async fn execute(args: WhichArgs, ctx: &CommandContext) -> PlugcacheResult<()> {
    let mut session = ctx.session().await?;
    let outcome = match session.plugins().await {
        Ok(plugins) => match plugins.find_command(&args.id) {
            Some((plugin, command)) => {
                println!("{} {}", style("Command:").bold(), command.id);
                if command.id != args.id {
                    println!("{} {}", style("Alias:").bold(), args.id);
                }
                println!(
                    "{} {} {}",
                    style("Plugin:").bold(),
                    plugin.cached.name,
                    style(&plugin.cached.version).dim()
                );
                println!("{} {}", style("Path:").bold(), plugin.source.path().display());
                println!(
                    "{} {} ({})",
                    style("Source:").bold(),
                    plugin.manager,
                    plugin.source.kind()
                );
                Ok(())
            }
            None => Err(PlugcacheError::CommandNotFound(args.id.clone())),
        },
        Err(e) => Err(e),
    };
    session.finish().await?;
    outcome
}
