//! Trait for reporting run progress.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::Error;
use crate::registry::Invocation;
use crate::watch::WatchBinding;

/// Receives progress events so the core never writes to stdout/stderr.
///
/// Every method has an empty default; implement only what you display.
pub trait RunReporter: Send + Sync {
    fn task_started(&self, _task: &str, _queue: &[Invocation]) {}

    fn invocation_started(&self, _invocation: &Invocation) {}

    fn invocation_finished(
        &self,
        _invocation: &Invocation,
        _elapsed: Duration,
        _error: Option<&Error>,
    ) {
    }

    fn watch_started(&self, _bindings: &[WatchBinding]) {}

    fn watch_triggered(&self, _binding: &WatchBinding, _changed: &[PathBuf]) {}

    /// A watch-triggered run failed; watching continues.
    fn watch_run_failed(&self, _error: &Error) {}

    fn watch_run_finished(&self, _elapsed: Duration) {}
}

/// Reporter that discards everything.
pub struct SilentReporter;

impl RunReporter for SilentReporter {}
