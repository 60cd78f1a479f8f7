//! Plugin handler trait for external side effects.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::context::ConfigContext;
use crate::error::Result;
use crate::files::{self, FileMapping};

/// What a handler hands back to the orchestrator.
#[derive(Debug, Clone)]
pub enum HandlerOutcome {
    /// The configuration is unchanged.
    Done,
    /// Later sub-tasks must see this snapshot instead.
    Updated(ConfigContext),
}

/// Everything a handler receives for one target.
#[derive(Debug, Clone)]
pub struct TargetContext {
    pub plugin: String,
    pub target: Option<String>,
    /// The target's configuration with placeholders resolved.
    pub data: Value,
    /// Plugin-level options overlaid by the target's own options, resolved.
    pub options: Map<String, Value>,
    pub work_dir: PathBuf,
    pub config: ConfigContext,
}

impl TargetContext {
    pub fn label(&self) -> String {
        match &self.target {
            Some(target) => format!("{}:{}", self.plugin, target),
            None => self.plugin.clone(),
        }
    }

    /// Normalized source/destination mappings declared by the target.
    pub fn files(&self) -> Result<Vec<FileMapping>> {
        files::normalize(&self.data, &self.work_dir)
    }

    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(Value::as_str)
    }

    pub fn option_bool(&self, key: &str, default: bool) -> bool {
        self.options
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(default)
    }

    /// Reads an option that may be a single string or a list of strings.
    pub fn option_strings(&self, key: &str) -> Vec<String> {
        self.options
            .get(key)
            .map(files::strings)
            .unwrap_or_default()
    }
}

/// A named capability: accept a resolved target configuration and perform
/// an external side effect.
#[async_trait]
pub trait PluginHandler: Send + Sync {
    /// Whether a bare reference runs once per configured target. Handlers
    /// returning `false` run once and receive the target as an argument.
    fn multi_target(&self) -> bool {
        true
    }

    fn description(&self) -> &str {
        ""
    }

    async fn run(&self, target: &TargetContext) -> Result<HandlerOutcome>;
}
