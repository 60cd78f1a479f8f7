//! Immutable configuration snapshots.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::template::Resolver;

/// A read-only view of the whole configuration tree.
///
/// Snapshots are cheap to clone. Mutation goes through [`ConfigContext::with_value`],
/// which returns a new snapshot and leaves the original untouched, so a
/// version bump is visible to later sub-tasks of the same run without any
/// shared mutable state.
#[derive(Debug, Clone)]
pub struct ConfigContext {
    root: Arc<Value>,
}

impl ConfigContext {
    pub fn new(root: Map<String, Value>) -> Self {
        Self {
            root: Arc::new(Value::Object(root)),
        }
    }

    pub fn empty() -> Self {
        Self::new(Map::new())
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Looks up a dotted path without resolving placeholders.
    pub fn get(&self, path: &str) -> Option<&Value> {
        lookup(&self.root, path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Looks up a dotted path and resolves every placeholder inside it.
    pub fn get_resolved(&self, path: &str) -> Result<Value> {
        let raw = self.get(path).ok_or_else(|| Error::UnresolvedReference {
            expr: path.to_string(),
            template: path.to_string(),
        })?;
        self.resolve(raw)
    }

    pub fn resolve(&self, value: &Value) -> Result<Value> {
        Resolver::new(&self.root).resolve_value(value)
    }

    pub fn resolve_str(&self, template: &str) -> Result<String> {
        into_string(Resolver::new(&self.root).resolve_string(template)?)
    }

    /// Resolves `template` with `name` bound to an already resolved value.
    ///
    /// Text taken from `local` is inserted verbatim; placeholders inside it
    /// are left alone.
    pub fn resolve_str_with(&self, template: &str, name: &str, local: &Value) -> Result<String> {
        into_string(
            Resolver::new(&self.root)
                .with_local(name, local)
                .resolve_string(template)?,
        )
    }

    /// Returns a new snapshot with `value` stored at the dotted `path`.
    ///
    /// Missing intermediate tables are created; a non-table value in the way
    /// is replaced by a table.
    pub fn with_value(&self, path: &str, value: Value) -> ConfigContext {
        let mut root = (*self.root).clone();
        set_path(&mut root, path, value);
        Self {
            root: Arc::new(root),
        }
    }
}

impl Default for ConfigContext {
    fn default() -> Self {
        Self::empty()
    }
}

fn into_string(value: Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s),
        other => Ok(crate::template::stringify(&other)),
    }
}

pub(crate) fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(root, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn set_path(root: &mut Value, path: &str, value: Value) {
    let mut current = root;
    let mut segments = path.split('.').peekable();

    while let Some(segment) = segments.next() {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Some(map) = current.as_object_mut() else {
            return;
        };
        if segments.peek().is_none() {
            map.insert(segment.to_string(), value);
            return;
        }
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}
