//! Concatenates source files into a destination.

use std::fs;

use async_trait::async_trait;
use pipekit_core::{Error, HandlerOutcome, PluginHandler, Result, TargetContext};
use tracing::{info, warn};

/// Options: `separator` (default `"\n"`), `banner`, `footer`.
pub struct ConcatPlugin;

#[async_trait]
impl PluginHandler for ConcatPlugin {
    fn description(&self) -> &str {
        "Concatenate files."
    }

    async fn run(&self, target: &TargetContext) -> Result<HandlerOutcome> {
        let separator = target.option_str("separator").unwrap_or("\n");
        let banner = target.option_str("banner").unwrap_or_default();
        let footer = target.option_str("footer").unwrap_or_default();

        for mapping in target.files()? {
            let dest = mapping.dest.as_ref().ok_or_else(|| {
                Error::handler(format!("{} declares sources without a dest", target.label()))
            })?;

            let mut parts = Vec::with_capacity(mapping.src.len());
            for src in &mapping.src {
                let path = target.work_dir.join(src);
                if !path.is_file() {
                    warn!("Source file \"{}\" not found.", src.display());
                    continue;
                }
                parts.push(fs::read_to_string(&path)?);
            }

            let output = target.work_dir.join(dest);
            if let Some(parent) = output.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&output, format!("{}{}{}", banner, parts.join(separator), footer))?;
            info!("File {} created.", dest.display());
        }

        Ok(HandlerOutcome::Done)
    }
}
