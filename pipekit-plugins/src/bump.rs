//! Version bumping for JSON manifests such as `package.json`.

use std::fmt;
use std::fs;
use std::str::FromStr;

use async_trait::async_trait;
use pipekit_core::{ConfigContext, Error, HandlerOutcome, PluginHandler, Result, TargetContext};
use regex::Regex;
use semver::Version;
use serde_json::Value;
use tracing::{info, warn};

const VERSION_PATTERN: &str = r#"("version"\s*:\s*")([^"]+)(")"#;
const UNSUPPORTED_OPTIONS: [&str; 3] = ["commit", "createTag", "push"];

/// Type of semantic version bump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BumpType {
    /// Major version bump (1.0.0 -> 2.0.0).
    Major,
    /// Minor version bump (1.0.0 -> 1.1.0).
    Minor,
    /// Patch version bump (1.0.0 -> 1.0.1).
    Patch,
    /// Set an exact version.
    Exact(Version),
}

impl BumpType {
    pub fn apply(&self, current: &Version) -> Version {
        match self {
            BumpType::Major => Version::new(current.major + 1, 0, 0),
            BumpType::Minor => Version::new(current.major, current.minor + 1, 0),
            BumpType::Patch => Version::new(current.major, current.minor, current.patch + 1),
            BumpType::Exact(version) => version.clone(),
        }
    }
}

impl FromStr for BumpType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "major" => Ok(BumpType::Major),
            "minor" => Ok(BumpType::Minor),
            "patch" => Ok(BumpType::Patch),
            other => Version::parse(other).map(BumpType::Exact).map_err(|_| {
                Error::Version(format!(
                    "'{}' is neither major, minor, patch nor a semantic version",
                    other
                ))
            }),
        }
    }
}

impl fmt::Display for BumpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BumpType::Major => f.write_str("major"),
            BumpType::Minor => f.write_str("minor"),
            BumpType::Patch => f.write_str("patch"),
            BumpType::Exact(version) => write!(f, "{}", version),
        }
    }
}

/// Bumps the `version` field of each file in `options.files`.
///
/// Runs once per reference; the target (`bump:minor`) is the bump type.
/// Keys listed in `options.updateConfigs` get their `version` replaced in
/// the returned snapshot.
pub struct BumpPlugin;

#[async_trait]
impl PluginHandler for BumpPlugin {
    fn multi_target(&self) -> bool {
        false
    }

    fn description(&self) -> &str {
        "Bump the package version."
    }

    async fn run(&self, target: &TargetContext) -> Result<HandlerOutcome> {
        let bump: BumpType = target.target.as_deref().unwrap_or("patch").parse()?;

        for option in UNSUPPORTED_OPTIONS {
            if target.option_bool(option, false) {
                warn!("bump option '{}' is not supported and was ignored", option);
            }
        }

        let mut files = target.option_strings("files");
        if files.is_empty() {
            files.push("package.json".to_string());
        }

        let version_re = Regex::new(VERSION_PATTERN)
            .map_err(|e| Error::handler(format!("Failed to create regex: {}", e)))?;

        let mut bumped = None;
        for file in &files {
            let path = target.work_dir.join(file);
            let content = fs::read_to_string(&path)
                .map_err(|e| Error::handler(format!("Failed to read {}: {}", file, e)))?;

            let current = version_re
                .captures(&content)
                .and_then(|c| c.get(2))
                .ok_or_else(|| Error::Version(format!("No version field in {}", file)))?
                .as_str();
            let current = Version::parse(current)
                .map_err(|e| Error::Version(format!("Invalid version {} in {}: {}", current, file, e)))?;
            let next = bump.apply(&current);

            let updated = version_re.replace(&content, format!("${{1}}{}${{3}}", next));
            fs::write(&path, updated.as_ref())
                .map_err(|e| Error::handler(format!("Failed to write {}: {}", file, e)))?;

            info!("Version bumped to {} ({})", next, file);
            bumped = Some(next);
        }

        let Some(version) = bumped else {
            return Ok(HandlerOutcome::Done);
        };

        let keys = target.option_strings("updateConfigs");
        if keys.is_empty() {
            return Ok(HandlerOutcome::Done);
        }
        Ok(HandlerOutcome::Updated(update_configs(
            &target.config,
            &keys,
            &version,
        )))
    }
}

fn update_configs(config: &ConfigContext, keys: &[String], version: &Version) -> ConfigContext {
    let mut next = config.clone();
    for key in keys {
        if !matches!(config.get(key), Some(Value::Object(_))) {
            warn!("updateConfigs key '{}' is not a table; skipped", key);
            continue;
        }
        next = next.with_value(&format!("{}.version", key), Value::String(version.to_string()));
    }
    next
}
