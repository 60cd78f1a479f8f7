//! Source/destination file mappings declared by plugin targets.
//!
//! Three declaration styles are accepted:
//!
//! - compact: `src = [...]`, `dest = "..."`
//! - files table: `files = { "dest" = ["src", ...] }`
//! - files list: `files = [{ src, dest, cwd, expand, ext, flatten, filter }]`
//!
//! Patterns are globs relative to the working directory (or `cwd`), and a
//! leading `!` removes earlier matches.

use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use indexmap::IndexSet;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Sources to read and the optional destination they produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileMapping {
    pub src: Vec<PathBuf>,
    pub dest: Option<PathBuf>,
}

impl FileMapping {
    /// A destination written with a trailing `/` names a directory.
    pub fn dest_is_dir(&self) -> bool {
        self.dest
            .as_ref()
            .map(|d| d.to_string_lossy().ends_with('/'))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Filter {
    Any,
    Files,
    Directories,
}

impl Filter {
    fn parse(value: Option<&str>) -> Result<Self> {
        match value {
            None => Ok(Filter::Any),
            Some("isFile") => Ok(Filter::Files),
            Some("isDirectory") => Ok(Filter::Directories),
            Some(other) => Err(Error::Config(format!(
                "Unsupported file filter '{}'. Expected isFile or isDirectory",
                other
            ))),
        }
    }

    fn accepts(self, path: &Path) -> bool {
        match self {
            Filter::Any => true,
            Filter::Files => path.is_file(),
            Filter::Directories => path.is_dir(),
        }
    }
}

/// Reads a string or list of strings; anything else yields nothing.
pub fn strings(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

/// Normalizes a target's file declarations into mappings.
///
/// Source paths in the result are relative to `base`.
pub fn normalize(data: &Value, base: &Path) -> Result<Vec<FileMapping>> {
    match data {
        Value::Object(map) => match map.get("files") {
            Some(Value::Object(files)) => files
                .iter()
                .map(|(dest, src)| {
                    Ok(FileMapping {
                        src: expand_patterns(base, &strings(src), Filter::Any)?,
                        dest: Some(PathBuf::from(dest)),
                    })
                })
                .collect(),
            Some(Value::Array(entries)) => {
                let mut mappings = Vec::new();
                for entry in entries {
                    match entry {
                        Value::Object(entry) => mappings.extend(entry_mappings(entry, base)?),
                        _ => {
                            return Err(Error::Config(
                                "Entries of a files list must be tables".to_string(),
                            ))
                        }
                    }
                }
                Ok(mappings)
            }
            Some(_) => Err(Error::Config(
                "'files' must be a table or a list of tables".to_string(),
            )),
            None if map.contains_key("src") => entry_mappings(map, base),
            None => Ok(Vec::new()),
        },
        Value::String(_) | Value::Array(_) => Ok(vec![FileMapping {
            src: expand_patterns(base, &strings(data), Filter::Any)?,
            dest: None,
        }]),
        _ => Ok(Vec::new()),
    }
}

fn entry_mappings(entry: &Map<String, Value>, base: &Path) -> Result<Vec<FileMapping>> {
    let patterns = entry.get("src").map(strings).unwrap_or_default();
    let cwd = entry
        .get("cwd")
        .and_then(Value::as_str)
        .map(PathBuf::from)
        .unwrap_or_default();
    let dest = entry.get("dest").and_then(Value::as_str);
    let expand = entry.get("expand").and_then(Value::as_bool).unwrap_or(false);
    let flatten = entry.get("flatten").and_then(Value::as_bool).unwrap_or(false);
    let ext = entry.get("ext").and_then(Value::as_str);
    let filter = Filter::parse(entry.get("filter").and_then(Value::as_str))?;

    let matched = expand_patterns(&base.join(&cwd), &patterns, filter)?;

    if !expand {
        return Ok(vec![FileMapping {
            src: matched.iter().map(|rel| cwd.join(rel)).collect(),
            dest: dest.map(PathBuf::from),
        }]);
    }

    let dest_dir = PathBuf::from(dest.unwrap_or(""));
    Ok(matched
        .iter()
        .map(|rel| {
            let mut target = if flatten {
                rel.file_name().map(PathBuf::from).unwrap_or_default()
            } else {
                rel.clone()
            };
            if let Some(ext) = ext {
                target = replace_extension(&target, ext);
            }
            FileMapping {
                src: vec![cwd.join(rel)],
                dest: Some(dest_dir.join(target)),
            }
        })
        .collect())
}

/// Replaces everything after the first dot of the file name.
fn replace_extension(path: &Path, ext: &str) -> PathBuf {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return path.to_path_buf();
    };
    let stem = name.split('.').next().unwrap_or(name);
    path.with_file_name(format!("{}{}", stem, ext))
}

fn expand_patterns(dir: &Path, patterns: &[String], filter: Filter) -> Result<Vec<PathBuf>> {
    let mut matched: IndexSet<PathBuf> = IndexSet::new();
    let escaped_dir = Pattern::escape(&dir.to_string_lossy());

    for pattern in patterns {
        if let Some(negated) = pattern.strip_prefix('!') {
            let exclude = compile(negated)?;
            matched.retain(|path| !exclude.matches_path_with(path, MATCH_OPTIONS));
            continue;
        }

        let full = format!("{}/{}", escaped_dir.trim_end_matches('/'), pattern);
        let entries = glob::glob_with(&full, MATCH_OPTIONS)
            .map_err(|e| Error::Config(format!("Invalid glob '{}': {}", pattern, e)))?;
        for entry in entries {
            let path = entry.map_err(|e| Error::Io(e.into_error()))?;
            if let Ok(relative) = path.strip_prefix(dir) {
                matched.insert(relative.to_path_buf());
            }
        }
    }

    Ok(matched
        .into_iter()
        .filter(|rel| filter.accepts(&dir.join(rel)))
        .collect())
}

fn compile(pattern: &str) -> Result<Pattern> {
    Pattern::new(pattern).map_err(|e| Error::Config(format!("Invalid glob '{}': {}", pattern, e)))
}

/// Ordered include/exclude globs matched against relative paths.
#[derive(Debug, Clone)]
pub struct PatternSet {
    rules: Vec<(bool, Pattern)>,
}

impl PatternSet {
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rules = patterns
            .into_iter()
            .map(|p| {
                let p = p.as_ref();
                match p.strip_prefix('!') {
                    Some(negated) => Ok((false, compile(negated)?)),
                    None => Ok((true, compile(p)?)),
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// The last rule that matches decides.
    pub fn matches(&self, path: &Path) -> bool {
        self.rules.iter().fold(false, |included, (include, pattern)| {
            if pattern.matches_path_with(path, MATCH_OPTIONS) {
                *include
            } else {
                included
            }
        })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
