//! Watch loop: re-run bound tasks when matching files change.
//!
//! ```text
//! Idle -> Watching -> Triggered -> Running -> Watching
//!                                     \-> Error (broken task graph only)
//! ```
//!
//! Changes arriving during the settle window or while a run is in progress
//! are merged into one pending batch, so a burst of changes produces a single
//! follow-up run.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use indexmap::IndexSet;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::files::{strings, PatternSet};
use crate::reporter::{RunReporter, SilentReporter};

/// Sends "refresh" notifications to connected clients.
pub trait ReloadNotifier: Send + Sync {
    fn notify(&self, changed: &[PathBuf]);
}

/// Runs the tasks bound to a watch binding.
#[async_trait]
pub trait WatchRunner: Send + Sync {
    async fn run_binding(&self, binding: &WatchBinding, changed: &[PathBuf]) -> Result<()>;
}

/// File patterns mapped to the tasks they re-run.
#[derive(Debug, Clone)]
pub struct WatchBinding {
    pub name: String,
    pub files: Vec<String>,
    pub tasks: Vec<String>,
    pub livereload: bool,
    patterns: PatternSet,
}

impl WatchBinding {
    pub fn new(
        name: impl Into<String>,
        files: Vec<String>,
        tasks: Vec<String>,
        livereload: bool,
    ) -> Result<Self> {
        let patterns = PatternSet::new(&files)?;
        Ok(Self {
            name: name.into(),
            files,
            tasks,
            livereload,
            patterns,
        })
    }

    /// Builds a binding from its resolved configuration table.
    pub fn from_config(name: &str, value: &Value, default_livereload: bool) -> Result<Self> {
        let files = value.get("files").map(strings).unwrap_or_default();
        if files.is_empty() {
            return Err(Error::Config(format!(
                "Watch target '{}' has no files to watch",
                name
            )));
        }
        let tasks = value.get("tasks").map(strings).unwrap_or_default();
        let livereload = value
            .get("options")
            .and_then(|o| o.get("livereload"))
            .map(livereload_enabled)
            .unwrap_or(default_livereload);

        Self::new(name, files, tasks, livereload)
    }

    /// Tests a path relative to the watch root.
    pub fn matches(&self, path: &Path) -> bool {
        self.patterns.matches(path)
    }
}

/// `livereload` may be a flag or a port number.
fn livereload_enabled(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(_) => true,
        _ => false,
    }
}

/// Reads every binding from a resolved `watch` section, or only `only`.
pub fn bindings_from_config(section: &Value, only: Option<&str>) -> Result<Vec<WatchBinding>> {
    let Value::Object(map) = section else {
        return Err(Error::Config("[config.watch] must be a table".to_string()));
    };

    let default_livereload = map
        .get("options")
        .and_then(|o| o.get("livereload"))
        .map(livereload_enabled)
        .unwrap_or(false);

    let mut bindings = Vec::new();
    for (name, value) in map {
        if name == "options" || only.is_some_and(|o| o != name.as_str()) {
            continue;
        }
        bindings.push(WatchBinding::from_config(name, value, default_livereload)?);
    }

    if bindings.is_empty() {
        return Err(Error::Config(match only {
            Some(target) => format!("Watch target '{}' is not configured", target),
            None => "No watch targets configured".to_string(),
        }));
    }
    Ok(bindings)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Idle,
    Watching,
    Triggered,
    Running,
    Error,
}

#[derive(Debug, Default)]
struct PendingBatch {
    bindings: BTreeSet<usize>,
    paths: IndexSet<PathBuf>,
}

impl PendingBatch {
    fn absorb(&mut self, bindings: &[WatchBinding], root: &Path, paths: Vec<PathBuf>) {
        for path in paths {
            let relative = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
            let mut matched = false;
            for (index, binding) in bindings.iter().enumerate() {
                if binding.matches(&relative) {
                    self.bindings.insert(index);
                    matched = true;
                }
            }
            if matched {
                self.paths.insert(relative);
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    fn take(&mut self) -> PendingBatch {
        std::mem::take(self)
    }
}

pub struct WatchLoop {
    bindings: Vec<WatchBinding>,
    root: PathBuf,
    debounce: Duration,
    notifier: Option<Arc<dyn ReloadNotifier>>,
    reporter: Arc<dyn RunReporter>,
    state: WatchState,
}

impl WatchLoop {
    pub fn new(bindings: Vec<WatchBinding>, root: impl Into<PathBuf>, debounce: Duration) -> Self {
        Self {
            bindings,
            root: root.into(),
            debounce,
            notifier: None,
            reporter: Arc::new(SilentReporter),
            state: WatchState::Idle,
        }
    }

    pub fn with_notifier(mut self, notifier: Option<Arc<dyn ReloadNotifier>>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn RunReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    pub fn bindings(&self) -> &[WatchBinding] {
        &self.bindings
    }

    /// Consumes change events until the channel closes.
    ///
    /// # Errors
    ///
    /// Plugin failures are reported and watching continues. Any other error
    /// means the task graph is broken; it moves the loop to
    /// [`WatchState::Error`] and is returned.
    pub async fn run<R>(
        &mut self,
        events: &mut UnboundedReceiver<Vec<PathBuf>>,
        runner: &R,
    ) -> Result<()>
    where
        R: WatchRunner + ?Sized,
    {
        let mut pending = PendingBatch::default();
        let mut closed = false;
        info!(bindings = self.bindings.len(), root = %self.root.display(), "watching");

        loop {
            if pending.is_empty() {
                if closed {
                    self.state = WatchState::Idle;
                    return Ok(());
                }
                self.state = WatchState::Watching;
                match events.recv().await {
                    Some(paths) => pending.absorb(&self.bindings, &self.root, paths),
                    None => closed = true,
                }
                continue;
            }

            self.state = WatchState::Triggered;
            self.settle(events, &mut pending, &mut closed).await;

            let batch = pending.take();
            self.state = WatchState::Running;
            let start = Instant::now();

            let outcome = {
                let run = self.run_batch(&batch, runner);
                tokio::pin!(run);
                loop {
                    tokio::select! {
                        result = &mut run => break result,
                        received = events.recv(), if !closed => match received {
                            Some(paths) => pending.absorb(&self.bindings, &self.root, paths),
                            None => closed = true,
                        },
                    }
                }
            };

            match outcome {
                Ok(0) => self.reporter.watch_run_finished(start.elapsed()),
                Ok(failed) => debug!(failed, "watch run finished with failures"),
                Err(e) => {
                    self.state = WatchState::Error;
                    return Err(e);
                }
            }
        }
    }

    /// Absorbs events until the debounce window passes without any.
    async fn settle(
        &self,
        events: &mut UnboundedReceiver<Vec<PathBuf>>,
        pending: &mut PendingBatch,
        closed: &mut bool,
    ) {
        while !*closed {
            tokio::select! {
                received = events.recv() => match received {
                    Some(paths) => pending.absorb(&self.bindings, &self.root, paths),
                    None => *closed = true,
                },
                _ = tokio::time::sleep(self.debounce) => return,
            }
        }
    }

    /// Runs every triggered binding and returns how many failed.
    ///
    /// A failing binding is reported and skips its own reload only. Fatal
    /// errors abort the batch.
    async fn run_batch<R>(&self, batch: &PendingBatch, runner: &R) -> Result<usize>
    where
        R: WatchRunner + ?Sized,
    {
        let mut failed = 0;
        for &index in &batch.bindings {
            let binding = &self.bindings[index];
            let changed: Vec<PathBuf> = batch
                .paths
                .iter()
                .filter(|p| binding.matches(p))
                .cloned()
                .collect();

            debug!(binding = %binding.name, files = changed.len(), "triggered");
            self.reporter.watch_triggered(binding, &changed);
            match runner.run_binding(binding, &changed).await {
                Ok(()) => {
                    if binding.livereload {
                        if let Some(notifier) = &self.notifier {
                            notifier.notify(&changed);
                        }
                    }
                }
                Err(e) if e.is_fatal_in_watch() => return Err(e),
                Err(e) => {
                    error!(binding = %binding.name, "{}", e);
                    self.reporter.watch_run_failed(&e);
                    failed += 1;
                }
            }
        }
        Ok(failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bindings_from_config() {
        let section = json!({
            "options": {"livereload": true},
            "sass": {"files": ["scss/**/*.scss"], "tasks": ["sass:dev"]},
            "js": {"files": "js/**/*.js", "tasks": "jshint", "options": {"livereload": false}},
            "php": {"files": ["**/*.php"]}
        });

        let bindings = bindings_from_config(&section, None).unwrap();
        let names: Vec<&str> = bindings.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["sass", "js", "php"]);
        assert!(bindings[0].livereload);
        assert!(!bindings[1].livereload);
        assert_eq!(bindings[1].tasks, vec!["jshint".to_string()]);
        assert!(bindings[2].tasks.is_empty());
    }

    #[test]
    fn test_single_binding_selection() {
        let section = json!({
            "sass": {"files": ["scss/**/*.scss"]},
            "js": {"files": ["js/**/*.js"]}
        });
        let bindings = bindings_from_config(&section, Some("js")).unwrap();
        assert_eq!(bindings.len(), 1);
        assert!(bindings_from_config(&section, Some("css")).is_err());
    }

    #[test]
    fn test_binding_requires_files() {
        let section = json!({"sass": {"tasks": ["sass:dev"]}});
        assert!(bindings_from_config(&section, None).is_err());
    }

    #[test]
    fn test_pending_batch_matches_relative_paths() {
        let bindings = vec![
            WatchBinding::new("sass", vec!["scss/**/*.scss".into()], vec![], false).unwrap(),
            WatchBinding::new("js", vec!["js/**/*.js".into()], vec![], false).unwrap(),
        ];
        let mut batch = PendingBatch::default();
        batch.absorb(
            &bindings,
            Path::new("/project"),
            vec![
                PathBuf::from("/project/scss/main.scss"),
                PathBuf::from("/project/README.md"),
            ],
        );

        assert_eq!(batch.bindings.iter().copied().collect::<Vec<_>>(), vec![0]);
        assert_eq!(
            batch.paths.iter().cloned().collect::<Vec<_>>(),
            vec![PathBuf::from("scss/main.scss")]
        );
    }

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::{mpsc, Notify};

    #[derive(Default)]
    struct ScriptedRunner {
        calls: Mutex<Vec<Vec<PathBuf>>>,
        count: AtomicUsize,
        gate: Notify,
        started: Mutex<Option<mpsc::UnboundedSender<()>>>,
        fail_first: Option<fn() -> Error>,
    }

    #[async_trait]
    impl WatchRunner for ScriptedRunner {
        async fn run_binding(&self, _binding: &WatchBinding, changed: &[PathBuf]) -> Result<()> {
            let call = self.count.fetch_add(1, Ordering::SeqCst);
            self.calls.lock().unwrap().push(changed.to_vec());
            if let Some(started) = self.started.lock().unwrap().as_ref() {
                let _ = started.send(());
            }
            if call == 0 {
                if let Some(make) = self.fail_first {
                    return Err(make());
                }
                self.gate.notified().await;
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        notified: Mutex<Vec<Vec<PathBuf>>>,
    }

    impl ReloadNotifier for RecordingNotifier {
        fn notify(&self, changed: &[PathBuf]) {
            self.notified.lock().unwrap().push(changed.to_vec());
        }
    }

    fn sass_loop(livereload: bool) -> WatchLoop {
        let binding = WatchBinding::new(
            "sass",
            vec!["scss/**/*.scss".into()],
            vec!["sass:dev".into()],
            livereload,
        )
        .unwrap();
        WatchLoop::new(vec![binding], "/project", Duration::from_millis(10))
    }

    fn sass_syntax_error() -> Error {
        Error::invocation("sass", Some("dev"), Error::handler("syntax"))
    }

    fn cycle_error() -> Error {
        Error::CyclicTask("a -> a".to_string())
    }

    fn change(name: &str) -> Vec<PathBuf> {
        vec![PathBuf::from(format!("/project/scss/{}", name))]
    }

    #[tokio::test]
    async fn test_changes_during_run_coalesce_into_one_follow_up() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (started_tx, mut started_rx) = mpsc::unbounded_channel();
        let runner = Arc::new(ScriptedRunner {
            started: Mutex::new(Some(started_tx)),
            ..Default::default()
        });

        let task = {
            let runner = Arc::clone(&runner);
            tokio::spawn(async move {
                let mut watch = sass_loop(false);
                let result = watch.run(&mut rx, runner.as_ref()).await;
                (result, watch.state())
            })
        };

        tx.send(change("a.scss")).unwrap();
        started_rx.recv().await.unwrap();

        tx.send(change("b.scss")).unwrap();
        tx.send(change("c.scss")).unwrap();
        tx.send(change("b.scss")).unwrap();
        runner.gate.notify_one();
        drop(tx);

        let (result, state) = task.await.unwrap();
        assert!(result.is_ok());
        assert_eq!(state, WatchState::Idle);

        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], vec![PathBuf::from("scss/a.scss")]);
        assert_eq!(
            calls[1],
            vec![PathBuf::from("scss/b.scss"), PathBuf::from("scss/c.scss")]
        );
    }

    #[tokio::test]
    async fn test_plugin_failure_keeps_watching() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (started_tx, mut started_rx) = mpsc::unbounded_channel();
        let runner = ScriptedRunner {
            started: Mutex::new(Some(started_tx)),
            fail_first: Some(sass_syntax_error),
            ..Default::default()
        };

        let mut watch = sass_loop(false);
        let driver = async {
            tx.send(change("a.scss")).unwrap();
            started_rx.recv().await.unwrap();
            tx.send(change("b.scss")).unwrap();
            drop(tx);
        };
        let (result, ()) = tokio::join!(watch.run(&mut rx, &runner), driver);

        assert!(result.is_ok());
        assert_eq!(runner.calls.lock().unwrap().len(), 2);
    }

    #[derive(Default)]
    struct FailureCounter {
        failed: AtomicUsize,
        finished: AtomicUsize,
    }

    impl RunReporter for FailureCounter {
        fn watch_run_failed(&self, _error: &Error) {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }

        fn watch_run_finished(&self, _elapsed: Duration) {
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_failing_binding_does_not_skip_the_rest_of_the_batch() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let runner = ScriptedRunner {
            fail_first: Some(sass_syntax_error),
            ..Default::default()
        };
        let notifier = Arc::new(RecordingNotifier::default());
        let reporter = Arc::new(FailureCounter::default());

        let bindings = vec![
            WatchBinding::new(
                "sass",
                vec!["scss/**/*.scss".into()],
                vec!["sass:dev".into()],
                true,
            )
            .unwrap(),
            WatchBinding::new("php", vec!["*.php".into()], vec![], true).unwrap(),
        ];
        let mut watch = WatchLoop::new(bindings, "/project", Duration::from_millis(10))
            .with_notifier(Some(notifier.clone()))
            .with_reporter(reporter.clone());

        tx.send(vec![
            PathBuf::from("/project/scss/a.scss"),
            PathBuf::from("/project/index.php"),
        ])
        .unwrap();
        drop(tx);

        assert!(watch.run(&mut rx, &runner).await.is_ok());
        assert_eq!(
            *runner.calls.lock().unwrap(),
            vec![
                vec![PathBuf::from("scss/a.scss")],
                vec![PathBuf::from("index.php")]
            ]
        );
        assert_eq!(
            *notifier.notified.lock().unwrap(),
            vec![vec![PathBuf::from("index.php")]]
        );
        assert_eq!(reporter.failed.load(Ordering::SeqCst), 1);
        assert_eq!(reporter.finished.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_broken_task_graph_stops_watching() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let runner = ScriptedRunner {
            fail_first: Some(cycle_error),
            ..Default::default()
        };

        tx.send(change("a.scss")).unwrap();
        let mut watch = sass_loop(false);
        let result = watch.run(&mut rx, &runner).await;

        assert!(matches!(result, Err(Error::CyclicTask(_))));
        assert_eq!(watch.state(), WatchState::Error);
        drop(tx);
    }

    #[tokio::test]
    async fn test_successful_run_notifies_live_reload() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let runner = ScriptedRunner::default();
        runner.gate.notify_one();
        let notifier = Arc::new(RecordingNotifier::default());

        tx.send(change("main.scss")).unwrap();
        tx.send(vec![PathBuf::from("/project/README.md")]).unwrap();
        drop(tx);

        let mut watch = sass_loop(true).with_notifier(Some(notifier.clone()));
        watch.run(&mut rx, &runner).await.unwrap();

        assert_eq!(
            *notifier.notified.lock().unwrap(),
            vec![vec![PathBuf::from("scss/main.scss")]]
        );
    }

    #[tokio::test]
    async fn test_unmatched_changes_trigger_nothing() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let runner = ScriptedRunner::default();

        tx.send(vec![PathBuf::from("/project/js/app.js")]).unwrap();
        drop(tx);

        let mut watch = sass_loop(false);
        watch.run(&mut rx, &runner).await.unwrap();
        assert!(runner.calls.lock().unwrap().is_empty());
    }
}
