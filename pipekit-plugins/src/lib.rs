//! Built-in plugins and external command plugins.

pub mod bump;
pub mod command;
pub mod concat;
pub mod copy;

pub use bump::{BumpPlugin, BumpType};
pub use command::CommandPlugin;
pub use concat::ConcatPlugin;
pub use copy::CopyPlugin;

use std::path::Path;

use indexmap::IndexMap;
use pipekit_core::{CommandPluginConfig, PluginInvoker, ProjectConfig, Result};
use tracing::warn;

/// Registers `concat`, `copy` and `bump`.
pub fn register_builtins(invoker: &mut PluginInvoker) {
    invoker.register("concat", ConcatPlugin);
    invoker.register("copy", CopyPlugin);
    invoker.register("bump", BumpPlugin);
}

/// Registers every `[plugins.<name>]` entry. A command plugin may shadow a
/// built-in of the same name.
pub fn register_commands(
    invoker: &mut PluginInvoker,
    plugins: &IndexMap<String, CommandPluginConfig>,
) -> Result<()> {
    for (name, config) in plugins {
        if invoker.contains(name) {
            warn!(plugin = %name, "command plugin replaces a built-in plugin");
        }
        invoker.register(name, CommandPlugin::new(name, config.clone())?);
    }
    Ok(())
}

/// Invoker with the built-ins and the project's command plugins.
pub fn project_invoker(project: &ProjectConfig, work_dir: &Path) -> Result<PluginInvoker> {
    let mut invoker = PluginInvoker::new(work_dir);
    register_builtins(&mut invoker);
    register_commands(&mut invoker, &project.plugins)?;
    Ok(invoker)
}
