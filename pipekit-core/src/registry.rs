//! Named tasks and their expansion into plugin invocations.

use std::fmt;

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// A reference to a task or plugin, as written in a task list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SubTaskRef {
    pub name: String,
    pub target: Option<String>,
}

impl SubTaskRef {
    /// Parses `"name"` or `"name:target"`.
    pub fn parse(reference: &str) -> Self {
        match reference.split_once(':') {
            Some((name, target)) if !target.is_empty() => Self {
                name: name.to_string(),
                target: Some(target.to_string()),
            },
            Some((name, _)) => Self {
                name: name.to_string(),
                target: None,
            },
            None => Self {
                name: reference.to_string(),
                target: None,
            },
        }
    }

    pub fn qualified(&self) -> String {
        match &self.target {
            Some(target) => format!("{}:{}", self.name, target),
            None => self.name.clone(),
        }
    }
}

impl fmt::Display for SubTaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified())
    }
}

/// One queued call into a plugin. A missing target means "all targets".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Invocation {
    pub plugin: String,
    pub target: Option<String>,
}

impl Invocation {
    pub fn new(plugin: impl Into<String>, target: Option<&str>) -> Self {
        Self {
            plugin: plugin.into(),
            target: target.map(str::to_string),
        }
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Some(target) => write!(f, "{}:{}", self.plugin, target),
            None => f.write_str(&self.plugin),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskDefinition {
    pub name: String,
    pub subtasks: Vec<SubTaskRef>,
}

/// Maps task names to ordered sub-task lists.
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    tasks: IndexMap<String, TaskDefinition>,
    plugins: IndexSet<String>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a task. A later registration under the same name replaces
    /// the earlier one.
    pub fn register<I, S>(&mut self, name: impl Into<String>, subtasks: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let name = name.into();
        let definition = TaskDefinition {
            name: name.clone(),
            subtasks: subtasks
                .into_iter()
                .map(|s| SubTaskRef::parse(s.as_ref()))
                .collect(),
        };
        if self.tasks.insert(name.clone(), definition).is_some() {
            warn!(task = %name, "task registered twice, keeping the later definition");
        }
    }

    /// Makes `name` a valid plugin reference in task lists.
    pub fn declare_plugin(&mut self, name: impl Into<String>) {
        self.plugins.insert(name.into());
    }

    pub fn get(&self, name: &str) -> Option<&TaskDefinition> {
        self.tasks.get(name)
    }

    pub fn contains_task(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    pub fn is_plugin(&self, name: &str) -> bool {
        self.plugins.contains(name)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &TaskDefinition> {
        self.tasks.values()
    }

    pub fn plugin_names(&self) -> impl Iterator<Item = &str> {
        self.plugins.iter().map(String::as_str)
    }

    /// Flattens a task into the ordered list of plugin invocations it stands for.
    ///
    /// Nested tasks expand depth-first, left to right. Duplicates are kept.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTask`] for a name that is neither a task nor a
    /// plugin, and [`Error::CyclicTask`] when a task appears in its own ancestry.
    pub fn expand(&self, name: &str) -> Result<Vec<Invocation>> {
        let mut queue = Vec::new();
        let mut ancestry = Vec::new();
        self.expand_into(&SubTaskRef::parse(name), &mut ancestry, &mut queue)?;
        debug!(task = name, entries = queue.len(), "expanded task");
        Ok(queue)
    }

    fn expand_into(
        &self,
        reference: &SubTaskRef,
        ancestry: &mut Vec<String>,
        queue: &mut Vec<Invocation>,
    ) -> Result<()> {
        let qualified = reference.qualified();

        if let Some(task) = self.tasks.get(&qualified) {
            if ancestry.contains(&task.name) {
                let mut chain = ancestry.clone();
                chain.push(task.name.clone());
                return Err(Error::CyclicTask(chain.join(" -> ")));
            }

            ancestry.push(task.name.clone());
            for subtask in &task.subtasks {
                self.expand_into(subtask, ancestry, queue)?;
            }
            ancestry.pop();
            return Ok(());
        }

        if self.plugins.contains(&reference.name) {
            queue.push(Invocation {
                plugin: reference.name.clone(),
                target: reference.target.clone(),
            });
            return Ok(());
        }

        Err(Error::UnknownTask {
            name: qualified,
            available: self.available(),
        })
    }

    fn available(&self) -> String {
        let names: Vec<&str> = self
            .tasks
            .keys()
            .map(String::as_str)
            .chain(self.plugins.iter().map(String::as_str))
            .collect();
        if names.is_empty() {
            "(none)".to_string()
        } else {
            names.join(", ")
        }
    }
}
