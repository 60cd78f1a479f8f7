//! Running a task, including watch mode.

use std::sync::Arc;

use anyhow::Result;
use pipekit_core::{Invocation, Orchestrator, WATCH_PLUGIN};
use pipekit_reload::ServerConfig;

use crate::formatting::{
    format_duration, print_key_value, print_section_header, print_summary_box,
    print_warning, SectionStyle,
};

use super::run_reporter::CliRunReporter;
use super::{load_project, ProjectOptions};

pub fn cmd_run(options: &ProjectOptions, task: &str) -> Result<()> {
    let (project, orchestrator) = load_project(options)?;
    let queue = orchestrator.plan(task)?;

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| anyhow::anyhow!("Failed to create tokio runtime: {}", e))?;

    let mut orchestrator = orchestrator.with_reporter(Arc::new(CliRunReporter::new()));
    let watch_entries: Vec<&Invocation> =
        queue.iter().filter(|i| i.plugin == WATCH_PLUGIN).collect();

    if !watch_entries.is_empty() {
        ctrlc::set_handler(|| {
            println!();
            print_warning("Stopping watch mode...");
            std::process::exit(0);
        })
        .map_err(|e| anyhow::anyhow!("Failed to set signal handler: {}", e))?;

        if options.livereload && needs_livereload(&orchestrator, &watch_entries)? {
            let config = ServerConfig::new().with_port(project.settings.livereload_port);
            let server = rt.block_on(pipekit_reload::start(&config))?;
            print_key_value("Live reload", &format!("http://{}", server.local_addr));
            orchestrator = orchestrator.with_reload_notifier(Arc::new(server.handle.clone()));
        }
    }

    print_section_header(&format!("Running \"{}\"", task), SectionStyle::Primary);

    match rt.block_on(orchestrator.execute(task)) {
        Ok(summary) => {
            println!();
            print_section_header("Done.", SectionStyle::Success);
            print_summary_box(
                "Done",
                &[
                    ("Task", &summary.task),
                    ("Sub-tasks", &summary.invocations.len().to_string()),
                    ("Duration", &format_duration(summary.duration)),
                ],
            );
            Ok(())
        }
        Err(e) => {
            println!();
            print_section_header("Aborted due to errors.", SectionStyle::Error);
            Err(e.into())
        }
    }
}

fn needs_livereload(orchestrator: &Orchestrator, entries: &[&Invocation]) -> Result<bool> {
    for entry in entries {
        let bindings = orchestrator.watch_bindings(entry.target.as_deref())?;
        if bindings.iter().any(|b| b.livereload) {
            return Ok(true);
        }
    }
    Ok(false)
}
