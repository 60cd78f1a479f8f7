//! Terminal reporter for task runs and watch mode.

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use indicatif::ProgressBar;
use pipekit_core::{Error, Invocation, RunReporter, WatchBinding, WATCH_PLUGIN};

use crate::formatting::{
    create_progress_bar, format_duration, print_binding_table, print_error, print_section_header,
    print_success, print_warning, SectionStyle, Status,
};

/// CLI implementation of RunReporter.
#[derive(Default)]
pub struct CliRunReporter {
    progress: Mutex<Option<ProgressBar>>,
}

impl CliRunReporter {
    pub fn new() -> Self {
        Self::default()
    }

    fn emit(&self, line: String) {
        if let Ok(guard) = self.progress.lock() {
            if let Some(pb) = guard.as_ref() {
                pb.println(format!("  {}", line));
                return;
            }
        }
        println!("  {}", line);
    }

    fn clear_progress(&self) {
        if let Ok(mut guard) = self.progress.lock() {
            if let Some(pb) = guard.take() {
                pb.finish_and_clear();
            }
        }
    }
}

impl RunReporter for CliRunReporter {
    fn task_started(&self, task: &str, queue: &[Invocation]) {
        let runnable = queue.iter().filter(|i| i.plugin != WATCH_PLUGIN).count();
        if runnable == 0 {
            return;
        }
        let pb = create_progress_bar(runnable as u64);
        pb.set_message(task.to_string());
        if let Ok(mut guard) = self.progress.lock() {
            *guard = Some(pb);
        }
    }

    fn invocation_started(&self, invocation: &Invocation) {
        if let Ok(guard) = self.progress.lock() {
            if let Some(pb) = guard.as_ref() {
                pb.set_message(invocation.to_string());
            }
        }
    }

    fn invocation_finished(&self, invocation: &Invocation, elapsed: Duration, error: Option<&Error>) {
        let line = match error {
            None => Status::Success.format(&format!(
                "{} ({})",
                invocation,
                format_duration(elapsed)
            )),
            Some(_) => Status::Error.format(&format!("{} failed", invocation)),
        };
        self.emit(line);

        let finished = match self.progress.lock() {
            Ok(guard) => guard.as_ref().is_some_and(|pb| {
                pb.inc(1);
                error.is_some() || Some(pb.position()) == pb.length()
            }),
            Err(_) => false,
        };
        if finished {
            self.clear_progress();
        }
    }

    fn watch_started(&self, bindings: &[WatchBinding]) {
        self.clear_progress();
        println!();
        print_section_header("Watch Mode", SectionStyle::Primary);

        let rows: Vec<(String, String, String, bool)> = bindings
            .iter()
            .map(|b| {
                (
                    b.name.clone(),
                    b.files.join(", "),
                    b.tasks.join(", "),
                    b.livereload,
                )
            })
            .collect();
        print_binding_table(&rows);
        println!("  Press Ctrl+C to stop");
        println!();
    }

    fn watch_triggered(&self, binding: &WatchBinding, changed: &[PathBuf]) {
        let files: Vec<String> = changed.iter().map(|p| p.display().to_string()).collect();
        print_warning(&format!(
            "{} changed: {}",
            binding.name,
            if files.is_empty() {
                "(unknown)".to_string()
            } else {
                files.join(", ")
            }
        ));
    }

    fn watch_run_failed(&self, error: &Error) {
        print_error(&error.to_string());
        println!();
    }

    fn watch_run_finished(&self, elapsed: Duration) {
        print_success(&format!("Rebuild complete ({})", format_duration(elapsed)));
        println!();
    }
}
