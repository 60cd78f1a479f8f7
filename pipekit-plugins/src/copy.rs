//! Copies files and directories.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use pipekit_core::{Error, FileMapping, HandlerOutcome, PluginHandler, Result, TargetContext};
use tracing::{debug, info};

pub struct CopyPlugin;

#[async_trait]
impl PluginHandler for CopyPlugin {
    fn description(&self) -> &str {
        "Copy files and folders."
    }

    async fn run(&self, target: &TargetContext) -> Result<HandlerOutcome> {
        let mut dirs = 0usize;
        let mut files = 0usize;

        for mapping in target.files()? {
            let Some(dest) = mapping.dest.as_ref() else {
                return Err(Error::handler(format!(
                    "{} declares sources without a dest",
                    target.label()
                )));
            };

            for src in &mapping.src {
                let from = target.work_dir.join(src);
                let to = target.work_dir.join(destination(&mapping, dest, src));

                if from.is_dir() {
                    fs::create_dir_all(&to)?;
                    dirs += 1;
                } else {
                    if let Some(parent) = to.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    debug!(from = %from.display(), to = %to.display(), "copy");
                    fs::copy(&from, &to)?;
                    files += 1;
                }
            }
        }

        info!("Created {} directories, copied {} files", dirs, files);
        Ok(HandlerOutcome::Done)
    }
}

/// A single source copied to a plain destination keeps that exact name;
/// otherwise the destination is a directory receiving the source path.
fn destination(mapping: &FileMapping, dest: &Path, src: &Path) -> PathBuf {
    if mapping.src.len() == 1 && !mapping.dest_is_dir() {
        dest.to_path_buf()
    } else {
        dest.join(src)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipekit_core::ConfigContext;
    use serde_json::{json, Map, Value};
    use tempfile::TempDir;

    fn target(dir: &TempDir, data: Value) -> TargetContext {
        TargetContext {
            plugin: "copy".to_string(),
            target: Some("build".to_string()),
            data,
            options: Map::new(),
            work_dir: dir.path().to_path_buf(),
            config: ConfigContext::empty(),
        }
    }

    #[tokio::test]
    async fn test_copy_into_release_directory() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("css")).unwrap();
        fs::write(dir.path().join("css/app.css"), "body{}").unwrap();
        fs::write(dir.path().join("index.php"), "<?php").unwrap();

        let ctx = target(
            &dir,
            json!({"files": [{"src": ["**", "!node_modules/**"], "dest": "release/1.0.1/", "filter": "isFile"}]}),
        );
        CopyPlugin.run(&ctx).await.unwrap();

        let release = dir.path().join("release/1.0.1");
        assert_eq!(fs::read_to_string(release.join("css/app.css")).unwrap(), "body{}");
        assert!(release.join("index.php").is_file());
    }

    #[tokio::test]
    async fn test_single_file_to_named_destination() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("style.css"), "x").unwrap();

        let ctx = target(&dir, json!({"src": "style.css", "dest": "dist/theme.css"}));
        CopyPlugin.run(&ctx).await.unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("dist/theme.css")).unwrap(), "x");
    }

    #[tokio::test]
    async fn test_expanded_mappings_use_computed_destinations() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src/img")).unwrap();
        fs::write(dir.path().join("src/img/logo.png"), "png").unwrap();

        let ctx = target(
            &dir,
            json!({"files": [{"expand": true, "cwd": "src", "src": ["**/*.png"], "dest": "dist"}]}),
        );
        CopyPlugin.run(&ctx).await.unwrap();
        assert!(dir.path().join("dist/img/logo.png").is_file());
    }
}
