//! Commands command - list every command of every plugin

use super::CommandContext;
use crate::cli::args::{CommandsArgs, OutputFormat};
use crate::error::PlugcacheResult;
use crate::plugin::{CachedCommand, Plugins};
use console::style;

/// Execute the commands command
pub async fn execute(args: CommandsArgs, ctx: &CommandContext) -> PlugcacheResult<()> {
    let mut session = ctx.session().await?;
    let outcome = match session.plugins().await {
        Ok(plugins) => print(plugins, &args),
        Err(e) => Err(e),
    };
    session.finish().await?;
    outcome
}

fn print(plugins: &Plugins, args: &CommandsArgs) -> PlugcacheResult<()> {
    let rows: Vec<(&str, &CachedCommand)> = plugins
        .loaded()
        .iter()
        .flat_map(|p| p.cached.commands.iter().map(move |c| (p.cached.name.as_str(), c)))
        .filter(|(_, c)| args.all || !c.hidden)
        .collect();

    match args.format {
        OutputFormat::Table => print_table(&rows),
        OutputFormat::Json => {
            let commands: Vec<&CachedCommand> = rows.iter().map(|(_, c)| *c).collect();
            println!("{}", serde_json::to_string_pretty(&commands)?);
        }
        OutputFormat::Plain => {
            for (_, command) in &rows {
                println!("{}", command.id);
            }
        }
    }
    Ok(())
}

fn print_table(rows: &[(&str, &CachedCommand)]) {
    if rows.is_empty() {
        println!("No commands found");
        return;
    }

    println!(
        "{:<28} {:<20} {}",
        style("COMMAND").bold(),
        style("PLUGIN").bold(),
        style("DESCRIPTION").bold()
    );
    println!("{}", "-".repeat(77));

    for (plugin, command) in rows {
        let id = if command.hidden {
            style(command.id.as_str()).dim()
        } else {
            style(command.id.as_str())
        };
        println!(
            "{:<28} {:<20} {}",
            id,
            plugin,
            command.description.as_deref().unwrap_or("")
        );
    }

    println!();
    println!("{} command(s)", rows.len());
}
