//! Runs a named task: expand, validate, then invoke entries in order.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info};

use crate::config::ProjectConfig;
use crate::context::ConfigContext;
use crate::error::{Error, Result};
use crate::invoker::PluginInvoker;
use crate::registry::{Invocation, TaskRegistry};
use crate::reporter::{RunReporter, SilentReporter};
use crate::watch::{bindings_from_config, ReloadNotifier, WatchBinding, WatchLoop, WatchRunner};
use crate::watcher::FileWatcher;

/// Plugin name that hands control to the watch loop.
pub const WATCH_PLUGIN: &str = "watch";

const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

#[derive(Debug, Clone)]
pub struct InvocationReport {
    pub invocation: Invocation,
    pub elapsed: Duration,
}

/// Result of a completed one-shot run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub task: String,
    pub invocations: Vec<InvocationReport>,
    pub duration: Duration,
}

pub struct Orchestrator {
    registry: TaskRegistry,
    invoker: PluginInvoker,
    config: ConfigContext,
    debounce: Duration,
    reporter: Arc<dyn RunReporter>,
    notifier: Option<Arc<dyn ReloadNotifier>>,
}

impl Orchestrator {
    /// Every plugin registered with the invoker becomes referenceable from
    /// task lists, as does `watch`.
    pub fn new(
        mut registry: TaskRegistry,
        invoker: PluginInvoker,
        config: ConfigContext,
    ) -> Result<Self> {
        if invoker.contains(WATCH_PLUGIN) {
            return Err(Error::Config(format!(
                "'{}' is reserved and cannot be registered as a plugin",
                WATCH_PLUGIN
            )));
        }
        for name in invoker.names() {
            registry.declare_plugin(name);
        }
        registry.declare_plugin(WATCH_PLUGIN);

        Ok(Self {
            registry,
            invoker,
            config,
            debounce: DEFAULT_DEBOUNCE,
            reporter: Arc::new(SilentReporter),
            notifier: None,
        })
    }

    /// Builds an orchestrator from a parsed `pipekit.toml`.
    pub fn from_project(project: &ProjectConfig, invoker: PluginInvoker) -> Result<Self> {
        let orchestrator = Self::new(project.task_registry(), invoker, project.context()?)?;
        Ok(orchestrator.with_debounce(Duration::from_millis(project.settings.debounce_ms)))
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn RunReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_reload_notifier(mut self, notifier: Arc<dyn ReloadNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn invoker(&self) -> &PluginInvoker {
        &self.invoker
    }

    pub fn config(&self) -> &ConfigContext {
        &self.config
    }

    pub fn work_dir(&self) -> &Path {
        self.invoker.work_dir()
    }

    /// Expands `task` and checks that every entry has a handler.
    pub fn plan(&self, task: &str) -> Result<Vec<Invocation>> {
        let queue = self.registry.expand(task)?;
        if let Some(missing) = queue
            .iter()
            .find(|i| i.plugin != WATCH_PLUGIN && !self.invoker.contains(&i.plugin))
        {
            return Err(Error::UnknownTask {
                name: missing.to_string(),
                available: self.invoker.names().join(", "),
            });
        }
        Ok(queue)
    }

    /// Watch bindings selected by `target` (all when `None`), resolved
    /// against the starting snapshot.
    pub fn watch_bindings(&self, target: Option<&str>) -> Result<Vec<WatchBinding>> {
        resolve_bindings(&self.config, target)
    }

    /// Runs `task` to completion, stopping at the first failure.
    ///
    /// A `watch` entry blocks until the file watcher shuts down; entries
    /// before it run first.
    pub async fn execute(&self, task: &str) -> Result<RunSummary> {
        let start = Instant::now();
        let queue = self.plan(task)?;
        info!(task, entries = queue.len(), "running task");
        self.reporter.task_started(task, &queue);

        let mut config = self.config.clone();
        let mut invocations = Vec::with_capacity(queue.len());

        for invocation in &queue {
            if invocation.plugin == WATCH_PLUGIN {
                self.watch(invocation.target.as_deref(), &config).await?;
                continue;
            }
            let (next, report) = self.invoke(invocation, &config).await?;
            config = next;
            invocations.push(report);
        }

        Ok(RunSummary {
            task: task.to_string(),
            invocations,
            duration: start.elapsed(),
        })
    }

    /// Watches the working directory and re-runs bound tasks on change.
    pub async fn watch(&self, target: Option<&str>, config: &ConfigContext) -> Result<()> {
        let (watcher, mut events) = FileWatcher::start(self.work_dir())?;
        let root = watcher.root().to_path_buf();
        self.watch_events(target, config, root, &mut events).await
    }

    /// Runs the watch loop over an arbitrary event source.
    pub async fn watch_events(
        &self,
        target: Option<&str>,
        config: &ConfigContext,
        root: PathBuf,
        events: &mut UnboundedReceiver<Vec<PathBuf>>,
    ) -> Result<()> {
        let bindings = resolve_bindings(config, target)?;
        self.reporter.watch_started(&bindings);

        let mut watch_loop = WatchLoop::new(bindings, root, self.debounce)
            .with_notifier(self.notifier.clone())
            .with_reporter(Arc::clone(&self.reporter));
        let runner = BindingRunner {
            orchestrator: self,
            config: config.clone(),
        };
        watch_loop.run(events, &runner).await
    }

    /// Runs an already-planned queue. `watch` entries are not allowed here.
    async fn run_queue(&self, queue: &[Invocation], config: &ConfigContext) -> Result<ConfigContext> {
        let mut config = config.clone();
        for invocation in queue {
            if invocation.plugin == WATCH_PLUGIN {
                return Err(Error::Config(
                    "'watch' cannot run from inside a watch binding".to_string(),
                ));
            }
            let (next, _) = self.invoke(invocation, &config).await?;
            config = next;
        }
        Ok(config)
    }

    async fn invoke(
        &self,
        invocation: &Invocation,
        config: &ConfigContext,
    ) -> Result<(ConfigContext, InvocationReport)> {
        self.reporter.invocation_started(invocation);
        let start = Instant::now();

        let result = self
            .invoker
            .run(&invocation.plugin, invocation.target.as_deref(), config)
            .await;

        let elapsed = start.elapsed();
        self.reporter
            .invocation_finished(invocation, elapsed, result.as_ref().err());
        debug!(entry = %invocation, elapsed_ms = elapsed.as_millis() as u64, ok = result.is_ok(), "entry done");

        result.map(|next| {
            (
                next,
                InvocationReport {
                    invocation: invocation.clone(),
                    elapsed,
                },
            )
        })
    }
}

fn resolve_bindings(config: &ConfigContext, target: Option<&str>) -> Result<Vec<WatchBinding>> {
    if !config.contains(WATCH_PLUGIN) {
        return Err(Error::Config(
            "No watch targets configured under [config.watch]".to_string(),
        ));
    }
    let section = config.get_resolved(WATCH_PLUGIN)?;
    bindings_from_config(&section, target)
}

/// Runs a binding's tasks against the snapshot taken when watching began.
struct BindingRunner<'a> {
    orchestrator: &'a Orchestrator,
    config: ConfigContext,
}

#[async_trait]
impl WatchRunner for BindingRunner<'_> {
    async fn run_binding(&self, binding: &WatchBinding, changed: &[PathBuf]) -> Result<()> {
        debug!(binding = %binding.name, changed = changed.len(), "running bound tasks");
        let mut config = self.config.clone();
        for task in &binding.tasks {
            let queue = self.orchestrator.plan(task)?;
            config = self.orchestrator.run_queue(&queue, &config).await?;
        }
        Ok(())
    }
}
