//! Topics command - browse the topic tree

use super::CommandContext;
use crate::cli::args::{OutputFormat, TopicsArgs};
use crate::error::{PlugcacheError, PlugcacheResult};
use crate::plugin::{CachedCommand, CachedTopic, Plugins};
use console::style;
use serde_json::json;

/// Execute the topics command
pub async fn execute(args: TopicsArgs, ctx: &CommandContext) -> PlugcacheResult<()> {
    let mut session = ctx.session().await?;
    let outcome = match session.plugins().await {
        Ok(plugins) => match &args.topic {
            Some(topic) => describe(plugins, topic, args.format),
            None => list(plugins, args.format),
        },
        Err(e) => Err(e),
    };
    session.finish().await?;
    outcome
}

fn list(plugins: &Plugins, format: OutputFormat) -> PlugcacheResult<()> {
    let topics = plugins.root_topics();
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&topics)?),
        OutputFormat::Plain => {
            for topic in &topics {
                println!("{}", topic.id);
            }
        }
        OutputFormat::Table => {
            if topics.is_empty() {
                println!("No topics found");
                return Ok(());
            }
            print_topics(&topics);
        }
    }
    Ok(())
}

fn describe(plugins: &Plugins, id: &str, format: OutputFormat) -> PlugcacheResult<()> {
    let topic = plugins
        .find_topic(id)
        .ok_or_else(|| PlugcacheError::TopicNotFound(id.to_string()))?;
    let subtopics = plugins.subtopics_for_topic(id).unwrap_or_default();
    let commands = plugins.commands_for_topic(id);

    match format {
        OutputFormat::Json => {
            let value = json!({
                "topic": topic,
                "subtopics": subtopics,
                "commands": commands,
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Plain => {
            for sub in &subtopics {
                println!("{}", sub.id);
            }
            for command in &commands {
                println!("{}", command.id);
            }
        }
        OutputFormat::Table => {
            println!("{}", style(&topic.id).bold());
            if let Some(description) = &topic.description {
                println!("  {}", style(description).dim());
            }
            if !subtopics.is_empty() {
                println!();
                print_topics(&subtopics);
            }
            if !commands.is_empty() {
                println!();
                print_commands(&commands);
            }
        }
    }
    Ok(())
}

fn print_topics(topics: &[&CachedTopic]) {
    println!("{:<28} {}", style("TOPIC").bold(), style("DESCRIPTION").bold());
    for topic in topics {
        println!(
            "{:<28} {}",
            topic.id,
            topic.description.as_deref().unwrap_or("")
        );
    }
}

fn print_commands(commands: &[&CachedCommand]) {
    println!("{:<28} {}", style("COMMAND").bold(), style("DESCRIPTION").bold());
    for command in commands {
        println!(
            "{:<28} {}",
            command.id,
            command.description.as_deref().unwrap_or("")
        );
    }
}
