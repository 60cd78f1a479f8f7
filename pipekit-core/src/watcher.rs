//! File system events for watch mode.

use std::path::{Path, PathBuf};

use notify::Config as NotifyConfig;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::{Error, Result};

/// Watches a directory tree and forwards the paths of changed files.
///
/// Dropping the watcher closes the event channel.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    root: PathBuf,
}

impl FileWatcher {
    /// Starts watching `root` recursively.
    pub fn start(root: &Path) -> Result<(Self, mpsc::UnboundedReceiver<Vec<PathBuf>>)> {
        let root = root
            .canonicalize()
            .map_err(|e| Error::Watcher(format!("Invalid watch root {}: {}", root.display(), e)))?;
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if is_change(&event.kind) => {
                    let _ = tx.send(event.paths);
                }
                Ok(_) => {}
                Err(e) => warn!("watcher error: {}", e),
            },
            NotifyConfig::default(),
        )
        .map_err(|e| Error::Watcher(format!("Failed to create watcher: {}", e)))?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| Error::Watcher(format!("Failed to watch directory: {}", e)))?;

        Ok((
            Self {
                _watcher: watcher,
                root,
            },
            rx,
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn is_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) | EventKind::Any
    )
}
