//! Core library for declarative task pipelines.

pub mod config;
pub mod context;
pub mod error;
pub mod files;
pub mod invoker;
pub mod orchestrator;
pub mod plugin;
pub mod registry;
pub mod reporter;
pub mod template;
pub mod watch;
pub mod watcher;

pub use config::{CommandPluginConfig, ProjectConfig, Settings, TaskValue, CONFIG_FILE_NAME};
pub use context::ConfigContext;
pub use error::{Error, Result};
pub use files::{FileMapping, PatternSet};
pub use invoker::PluginInvoker;
pub use orchestrator::{InvocationReport, Orchestrator, RunSummary, WATCH_PLUGIN};
pub use plugin::{HandlerOutcome, PluginHandler, TargetContext};
pub use registry::{Invocation, SubTaskRef, TaskDefinition, TaskRegistry};
pub use reporter::{RunReporter, SilentReporter};
pub use template::format_date;
pub use watch::{ReloadNotifier, WatchBinding, WatchLoop, WatchRunner, WatchState};
pub use watcher::FileWatcher;
