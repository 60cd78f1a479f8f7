//! `--list` and `--plan`.

use anyhow::Result;
use owo_colors::OwoColorize;
use pipekit_core::WATCH_PLUGIN;

use crate::formatting::{
    print_plugin_table, print_section_header, print_task_table, SectionStyle, Status,
};

use super::{load_project, ProjectOptions};

pub fn cmd_list(options: &ProjectOptions, json: bool) -> Result<()> {
    let (_, orchestrator) = load_project(options)?;
    let registry = orchestrator.registry();
    let invoker = orchestrator.invoker();

    let tasks: Vec<(String, Vec<String>)> = registry
        .tasks()
        .map(|t| {
            (
                t.name.clone(),
                t.subtasks.iter().map(|s| s.qualified()).collect(),
            )
        })
        .collect();

    let mut plugins: Vec<(String, String, String)> = invoker
        .names()
        .into_iter()
        .filter_map(|name| {
            let handler = invoker.get(&name)?;
            let kind = if handler.multi_target() {
                "per target"
            } else {
                "single"
            };
            Some((name, kind.to_string(), handler.description().to_string()))
        })
        .collect();
    plugins.push((
        WATCH_PLUGIN.to_string(),
        "built-in".to_string(),
        "Run tasks whenever watched files change.".to_string(),
    ));

    if json {
        let value = serde_json::json!({
            "tasks": tasks.iter().map(|(name, runs)| serde_json::json!({"name": name, "runs": runs})).collect::<Vec<_>>(),
            "plugins": plugins.iter().map(|(name, kind, _)| serde_json::json!({"name": name, "kind": kind})).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    print_section_header("Tasks", SectionStyle::Primary);
    if tasks.is_empty() {
        println!("  {} {}", "→".cyan(), "(none)".bright_black());
    } else {
        print_task_table(&tasks);
    }
    println!();
    print_section_header("Plugins", SectionStyle::Primary);
    print_plugin_table(&plugins);
    Ok(())
}

pub fn cmd_plan(options: &ProjectOptions, task: &str, json: bool) -> Result<()> {
    let (_, orchestrator) = load_project(options)?;
    let queue = orchestrator.plan(task)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&queue)?);
        return Ok(());
    }

    print_section_header(&format!("Plan for \"{}\"", task), SectionStyle::Primary);
    for (index, invocation) in queue.iter().enumerate() {
        let target = invocation
            .target
            .clone()
            .unwrap_or_else(|| "(all targets)".to_string());
        println!(
            "  {} {} {}",
            format!("{:>3}.", index + 1).bright_black(),
            Status::Info.format(&invocation.plugin),
            target.bright_black()
        );
    }
    Ok(())
}
