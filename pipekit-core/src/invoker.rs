//! Dispatch from plugin names to registered handlers.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::context::ConfigContext;
use crate::error::{Error, Result};
use crate::plugin::{HandlerOutcome, PluginHandler, TargetContext};

const OPTIONS_KEY: &str = "options";

/// Registry of plugin handlers, keyed by the name used in task lists.
///
/// Handlers are registered once at startup; the invoker never changes during
/// a run and performs no I/O of its own.
pub struct PluginInvoker {
    handlers: IndexMap<String, Arc<dyn PluginHandler>>,
    work_dir: PathBuf,
}

impl PluginInvoker {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            handlers: IndexMap::new(),
            work_dir: work_dir.into(),
        }
    }

    /// Registers a handler under `name`, replacing any earlier one.
    pub fn register<H>(&mut self, name: &str, handler: H)
    where
        H: PluginHandler + 'static,
    {
        self.handlers.insert(name.to_string(), Arc::new(handler));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn PluginHandler>> {
        self.handlers.get(name)
    }

    /// Registered plugin names, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }

    pub fn work_dir(&self) -> &PathBuf {
        &self.work_dir
    }

    /// Runs a plugin against one target, or against every configured target
    /// when `target` is `None`.
    ///
    /// Returns the configuration snapshot later sub-tasks must use.
    ///
    /// # Errors
    ///
    /// Handler failures, missing targets and unconfigured plugins are reported
    /// as [`Error::PluginInvocation`]. Placeholder failures are returned as
    /// they are.
    pub async fn run(
        &self,
        plugin: &str,
        target: Option<&str>,
        config: &ConfigContext,
    ) -> Result<ConfigContext> {
        let handler = self.handlers.get(plugin).ok_or_else(|| Error::UnknownTask {
            name: plugin.to_string(),
            available: self.names().join(", "),
        })?;

        if !handler.multi_target() {
            let context = self.single_context(plugin, target, config)?;
            return self.invoke(handler.as_ref(), context).await;
        }

        let targets = match target {
            Some(name) => {
                if config.get(&format!("{}.{}", plugin, name)).is_none() {
                    return Err(Error::invocation(
                        plugin,
                        target,
                        Error::Config(format!(
                            "Target '{}' is not configured under [config.{}]",
                            name, plugin
                        )),
                    ));
                }
                vec![name.to_string()]
            }
            None => {
                let names = target_names(config.get(plugin));
                if names.is_empty() {
                    return Err(Error::invocation(
                        plugin,
                        None,
                        Error::Config(format!("No targets configured under [config.{}]", plugin)),
                    ));
                }
                names
            }
        };

        let mut current = config.clone();
        for name in targets {
            let context = self.target_context(plugin, &name, &current)?;
            current = self.invoke(handler.as_ref(), context).await?;
        }
        Ok(current)
    }

    async fn invoke(
        &self,
        handler: &dyn PluginHandler,
        context: TargetContext,
    ) -> Result<ConfigContext> {
        let label = context.label();
        info!("Running \"{}\"", label);
        let start = Instant::now();

        let outcome = handler.run(&context).await.map_err(|e| match e {
            Error::UnresolvedReference { .. }
            | Error::UnknownTask { .. }
            | Error::CyclicTask(_)
            | Error::PluginInvocation { .. } => e,
            other => Error::invocation(&context.plugin, context.target.as_deref(), other),
        })?;

        debug!(task = %label, elapsed_ms = start.elapsed().as_millis() as u64, "finished");

        Ok(match outcome {
            HandlerOutcome::Done => context.config,
            HandlerOutcome::Updated(next) => next,
        })
    }

    fn target_context(
        &self,
        plugin: &str,
        target: &str,
        config: &ConfigContext,
    ) -> Result<TargetContext> {
        let raw = config
            .get(&format!("{}.{}", plugin, target))
            .cloned()
            .unwrap_or(Value::Null);
        let data = config.resolve(&raw)?;

        let mut options = self.plugin_options(plugin, config)?;
        if let Some(Value::Object(own)) = data.get(OPTIONS_KEY) {
            for (key, value) in own {
                options.insert(key.clone(), value.clone());
            }
        }

        Ok(TargetContext {
            plugin: plugin.to_string(),
            target: Some(target.to_string()),
            data,
            options,
            work_dir: self.work_dir.clone(),
            config: config.clone(),
        })
    }

    fn single_context(
        &self,
        plugin: &str,
        argument: Option<&str>,
        config: &ConfigContext,
    ) -> Result<TargetContext> {
        let data = match config.get(plugin) {
            Some(Value::Object(section)) => {
                let mut section = section.clone();
                section.remove(OPTIONS_KEY);
                config.resolve(&Value::Object(section))?
            }
            Some(other) => config.resolve(other)?,
            None => Value::Null,
        };

        Ok(TargetContext {
            plugin: plugin.to_string(),
            target: argument.map(str::to_string),
            data,
            options: self.plugin_options(plugin, config)?,
            work_dir: self.work_dir.clone(),
            config: config.clone(),
        })
    }

    fn plugin_options(&self, plugin: &str, config: &ConfigContext) -> Result<Map<String, Value>> {
        match config.get(&format!("{}.{}", plugin, OPTIONS_KEY)) {
            Some(raw @ Value::Object(_)) => match config.resolve(raw)? {
                Value::Object(map) => Ok(map),
                _ => Ok(Map::new()),
            },
            _ => Ok(Map::new()),
        }
    }
}

/// Declared targets of a plugin section, in order, excluding `options`.
fn target_names(section: Option<&Value>) -> Vec<String> {
    match section {
        Some(Value::Object(map)) => map
            .keys()
            .filter(|key| key.as_str() != OPTIONS_KEY)
            .cloned()
            .collect(),
        _ => Vec::new(),
    }
}
