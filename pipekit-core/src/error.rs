//! Error types and result aliases.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error in {context}: {error}")]
    Toml {
        error: toml::de::Error,
        context: String,
    },

    #[error("JSON error in {context}: {error}")]
    Json {
        error: serde_json::Error,
        context: String,
    },

    #[error("Config file not found: {0}. Expected 'pipekit.toml' in the working directory.")]
    ConfigNotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Unresolved reference '{expr}' in \"{template}\"")]
    UnresolvedReference { expr: String, template: String },

    #[error("Task not found: {name}. Available tasks: {available}")]
    UnknownTask { name: String, available: String },

    #[error("Circular task reference detected: {0}")]
    CyclicTask(String),

    #[error("Task \"{task}\" failed: {source}")]
    PluginInvocation {
        plugin: String,
        target: Option<String>,
        task: String,
        source: Box<Error>,
    },

    #[error("{0}")]
    Handler(String),

    #[error("Invalid version: {0}")]
    Version(String),

    #[error("Watcher error: {0}")]
    Watcher(String),
}

impl Error {
    /// Wraps a handler failure with the identity of the failing sub-task.
    pub fn invocation(plugin: &str, target: Option<&str>, source: Error) -> Self {
        let task = match target {
            Some(target) => format!("{}:{}", plugin, target),
            None => plugin.to_string(),
        };
        Error::PluginInvocation {
            plugin: plugin.to_string(),
            target: target.map(str::to_string),
            task,
            source: Box::new(source),
        }
    }

    pub fn handler(message: impl Into<String>) -> Self {
        Error::Handler(message.into())
    }

    /// Configuration-integrity errors end a watch session; plugin failures
    /// only end the current run.
    pub fn is_fatal_in_watch(&self) -> bool {
        !matches!(self, Error::PluginInvocation { .. })
    }
}

impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Self {
        Error::Toml {
            error,
            context: "pipekit.toml".to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Json {
            error,
            context: "json".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
