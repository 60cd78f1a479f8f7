//! External tools exposed as plugins through `[plugins.<name>]`.
//!
//! The command template is resolved with an extra `this` entry whose values
//! are already resolved and are inserted verbatim:
//!
//! ```text
//! this.plugin   this.target   this.data.*   this.options.*
//! ```
//!
//! The process runs through `sh -c` in the project directory (or `cwd`),
//! receives the same data as JSON on stdin and as `PIPEKIT_*` variables, and
//! fails the invocation on a non-zero exit.

use std::process::Stdio;

use async_trait::async_trait;
use pipekit_core::{
    CommandPluginConfig, Error, HandlerOutcome, PluginHandler, Result, TargetContext,
};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

const STDERR_TAIL: usize = 20;

pub struct CommandPlugin {
    name: String,
    config: CommandPluginConfig,
}

impl CommandPlugin {
    pub fn new(name: &str, config: CommandPluginConfig) -> Result<Self> {
        if config.command.trim().is_empty() {
            return Err(Error::Config(format!(
                "[plugins.{}] command cannot be empty",
                name
            )));
        }
        Ok(Self {
            name: name.to_string(),
            config,
        })
    }

    fn invocation(&self, target: &TargetContext) -> Value {
        json!({
            "plugin": target.plugin,
            "target": target.target,
            "data": target.data,
            "options": target.options,
        })
    }
}

#[async_trait]
impl PluginHandler for CommandPlugin {
    fn multi_target(&self) -> bool {
        self.config.per_target
    }

    fn description(&self) -> &str {
        self.config.description.as_deref().unwrap_or_default()
    }

    async fn run(&self, target: &TargetContext) -> Result<HandlerOutcome> {
        let invocation = self.invocation(target);
        let resolve = |template: &str| {
            target
                .config
                .resolve_str_with(template, "this", &invocation)
        };

        let command = resolve(self.config.command.as_str())?;
        if command.trim().is_empty() {
            return Err(Error::handler(format!(
                "command of plugin '{}' resolved to an empty string",
                self.name
            )));
        }

        let cwd = match &self.config.cwd {
            Some(dir) => target.work_dir.join(resolve(dir.as_str())?),
            None => target.work_dir.clone(),
        };

        let mut process = Command::new("sh");
        process
            .arg("-c")
            .arg(&command)
            .current_dir(&cwd)
            .env("PIPEKIT_PLUGIN", &target.plugin)
            .env("PIPEKIT_TARGET", target.target.as_deref().unwrap_or_default())
            .env("PIPEKIT_WORK_DIR", &target.work_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &self.config.env {
            process.env(key, resolve(value.as_str())?);
        }

        debug!(plugin = %self.name, command = %command, cwd = %cwd.display(), "spawning");
        let mut child = process
            .spawn()
            .map_err(|e| Error::handler(format!("Failed to spawn '{}': {}", command, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            let payload = serde_json::to_vec(&invocation)?;
            // A command that never reads stdin closes the pipe early.
            if let Err(e) = stdin.write_all(&payload).await {
                debug!("stdin not consumed: {}", e);
            }
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::handler("Failed to capture stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::handler("Failed to capture stderr"))?;

        let label = target.label();
        let stdout_task = async {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                if !line.trim().is_empty() {
                    info!(task = %label, "{}", line);
                }
            }
            Ok::<_, std::io::Error>(())
        };
        let stderr_task = async {
            let mut tail = Vec::new();
            let mut lines = BufReader::new(stderr).lines();
            while let Some(line) = lines.next_line().await? {
                if line.trim().is_empty() {
                    continue;
                }
                warn!(task = %label, "{}", line);
                if tail.len() == STDERR_TAIL {
                    tail.remove(0);
                }
                tail.push(line);
            }
            Ok::<_, std::io::Error>(tail)
        };

        let (out, err) = tokio::join!(stdout_task, stderr_task);
        out?;
        let tail = err?;

        let status = child
            .wait()
            .await
            .map_err(|e| Error::handler(format!("Failed to wait for process: {}", e)))?;

        if !status.success() {
            let code = status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            let mut message = format!("'{}' exited with status {}", command, code);
            if !tail.is_empty() {
                message.push_str(": ");
                message.push_str(&tail.join("\n"));
            }
            return Err(Error::handler(message));
        }

        Ok(HandlerOutcome::Done)
    }
}
