//! `pipekit.toml` parsing.
//!
//! The document has five reserved top-level tables:
//!
//! ```toml
//! [settings]          # tool settings (debounce, live-reload port)
//! [imports]           # key = "file.json", parsed and stored under `key`
//! [tasks]             # name = ["plugin:target", "other-task", ...]
//! [plugins.<name>]    # external command plugins
//! [config]            # everything plugins and placeholders read
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::ConfigContext;
use crate::error::{Error, Result};
use crate::registry::TaskRegistry;

pub const CONFIG_FILE_NAME: &str = "pipekit.toml";

fn default_debounce_ms() -> u64 {
    300
}

fn default_livereload_port() -> u16 {
    35729
}

fn default_true() -> bool {
    true
}

/// Tool-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Settle window for coalescing file-change bursts.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Port of the live-reload server started by watch mode.
    #[serde(default = "default_livereload_port")]
    pub livereload_port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            livereload_port: default_livereload_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskValue {
    Single(String),
    List(Vec<String>),
}

impl TaskValue {
    pub fn subtasks(&self) -> Vec<String> {
        match self {
            TaskValue::Single(reference) => vec![reference.clone()],
            TaskValue::List(references) => references.clone(),
        }
    }
}

/// An external tool exposed as a plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandPluginConfig {
    /// Shell command; may contain placeholders, including `this.*`.
    pub command: String,
    /// Run once per configured target (`true`) or once with the target as argument.
    #[serde(default = "default_true")]
    pub per_target: bool,
    /// Working directory relative to the project root.
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub env: IndexMap<String, String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Parsed `pipekit.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub imports: IndexMap<String, String>,
    #[serde(default)]
    pub tasks: IndexMap<String, TaskValue>,
    #[serde(default)]
    pub plugins: IndexMap<String, CommandPluginConfig>,
    #[serde(default)]
    pub config: Map<String, Value>,
    /// Directory containing the config file; imports and globs are relative to it.
    #[serde(skip)]
    pub root_dir: PathBuf,
}

impl ProjectConfig {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ConfigNotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        let root_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        Self::parse(&content, root_dir).map_err(|e| match e {
            Error::Toml { error, .. } => Error::Toml {
                error,
                context: path.display().to_string(),
            },
            other => other,
        })
    }

    pub fn parse(content: &str, root_dir: impl Into<PathBuf>) -> Result<Self> {
        let mut config: ProjectConfig = toml::from_str(content)?;
        config.root_dir = root_dir.into();
        Ok(config)
    }

    /// Builds the initial configuration snapshot.
    ///
    /// Imported JSON documents are stored under their key and take precedence
    /// over a `[config]` entry of the same name.
    pub fn context(&self) -> Result<ConfigContext> {
        let mut root = self.config.clone();

        for (key, file) in &self.imports {
            let path = self.root_dir.join(file);
            let content = fs::read_to_string(&path).map_err(|e| {
                Error::Config(format!("Failed to read import '{}' ({}): {}", key, path.display(), e))
            })?;
            let value: Value = serde_json::from_str(&content).map_err(|error| Error::Json {
                error,
                context: path.display().to_string(),
            })?;
            root.insert(key.clone(), value);
        }

        Ok(ConfigContext::new(root))
    }

    /// Registers every `[tasks]` entry, in declaration order.
    pub fn task_registry(&self) -> TaskRegistry {
        let mut registry = TaskRegistry::new();
        for (name, value) in &self.tasks {
            registry.register(name, value.subtasks());
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
[settings]
debounce_ms = 50

[imports]
pkg = "package.json"

[tasks]
default = "watch"
patch = ["bump:patch", "copy:build", "concat:build"]

[plugins.sass]
command = "sass --style=<%= this.options.style %> scss:css"

[plugins.bower-install]
command = "bower install"
per_target = false

[config.path]
buildDir = "release/<%= pkg.name %>-<%= pkg.version %>/"

[config.concat.build]
src = ["css/*.less"]
dest = "<%= path.buildDir %>css/<%= pkg.name %>.less"
"#;

    #[test]
    fn test_parse_sections() {
        let config = ProjectConfig::parse(SAMPLE, ".").unwrap();
        assert_eq!(config.settings.debounce_ms, 50);
        assert_eq!(config.settings.livereload_port, 35729);
        assert_eq!(config.tasks.len(), 2);
        assert_eq!(config.tasks["default"].subtasks(), vec!["watch".to_string()]);
        assert!(config.plugins["sass"].per_target);
        assert!(!config.plugins["bower-install"].per_target);
    }

    #[test]
    fn test_task_order_is_preserved() {
        let config = ProjectConfig::parse(SAMPLE, ".").unwrap();
        let names: Vec<&str> = config.tasks.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["default", "patch"]);
    }

    #[test]
    fn test_context_includes_imports() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("package.json"),
            r#"{"name": "app", "version": "1.2.0"}"#,
        )
        .unwrap();
        fs::write(temp.path().join(CONFIG_FILE_NAME), SAMPLE).unwrap();

        let config = ProjectConfig::load(&temp.path().join(CONFIG_FILE_NAME)).unwrap();
        let ctx = config.context().unwrap();
        assert_eq!(
            ctx.get_resolved("path.buildDir").unwrap(),
            json!("release/app-1.2.0/")
        );
    }

    #[test]
    fn test_missing_import_fails() {
        let config = ProjectConfig::parse(SAMPLE, "/nonexistent").unwrap();
        assert!(matches!(config.context(), Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_config_file() {
        let err = ProjectConfig::load(Path::new("/nonexistent/pipekit.toml")).unwrap_err();
        assert!(matches!(err, Error::ConfigNotFound(_)));
    }
}
