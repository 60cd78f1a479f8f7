//! Command implementations for the CLI.

mod list;
mod run;
mod run_reporter;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use pipekit_core::{Orchestrator, ProjectConfig};
use pipekit_plugins::project_invoker;

pub use list::{cmd_list, cmd_plan};
pub use run::cmd_run;

/// Where the project lives and how watch mode behaves.
pub struct ProjectOptions {
    pub file: PathBuf,
    pub cwd: Option<PathBuf>,
    pub debounce_ms: Option<u64>,
    pub livereload: bool,
}

impl ProjectOptions {
    fn config_path(&self) -> PathBuf {
        match &self.cwd {
            Some(dir) => dir.join(&self.file),
            None => self.file.clone(),
        }
    }
}

fn load_project(options: &ProjectOptions) -> Result<(ProjectConfig, Orchestrator)> {
    let path = options.config_path();
    let project = ProjectConfig::load(&path)?;
    let invoker = project_invoker(&project, &project.root_dir)
        .with_context(|| format!("Failed to register plugins from {}", path.display()))?;

    let mut orchestrator = Orchestrator::from_project(&project, invoker)?;
    if let Some(ms) = options.debounce_ms {
        orchestrator = orchestrator.with_debounce(Duration::from_millis(ms));
    }
    Ok((project, orchestrator))
}
