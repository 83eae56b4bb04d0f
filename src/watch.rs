//! Directory watching.
//!
//! A `notify` watcher observes one directory, non-recursively, and forwards
//! creation events into a tokio channel. The channel is the only thing the
//! controller sees, so events are handled strictly one at a time in arrival
//! order.

use anyhow::{bail, Context, Result};
use notify::event::CreateKind;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// A file-creation notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub is_dir: bool,
}

impl WatchEvent {
    /// Event for `path`, classifying it by what is on disk now.
    pub fn created(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let is_dir = path.is_dir();
        Self { path, is_dir }
    }
}

/// Converts a raw `notify` event into creation events. Other kinds yield nothing.
fn creation_events(event: notify::Event) -> Vec<WatchEvent> {
    let EventKind::Create(kind) = event.kind else {
        return Vec::new();
    };
    event
        .paths
        .into_iter()
        .map(|path| {
            let is_dir = matches!(kind, CreateKind::Folder) || path.is_dir();
            WatchEvent { path, is_dir }
        })
        .collect()
}

/// Starts watching `dir`. Events arrive on the returned receiver for as long
/// as the returned watcher is alive.
pub fn watch_directory(
    dir: &Path,
) -> Result<(RecommendedWatcher, mpsc::UnboundedReceiver<WatchEvent>)> {
    if !dir.is_dir() {
        bail!("Watch directory does not exist: {}", dir.display());
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        match res {
            Ok(event) => {
                for created in creation_events(event) {
                    debug!(path = %created.path.display(), "file created");
                    if tx.send(created).is_err() {
                        return;
                    }
                }
            }
            Err(e) => warn!(error = %e, "watch error"),
        }
    })
    .context("Failed to create filesystem watcher")?;

    watcher
        .watch(dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("Failed to watch {}", dir.display()))?;

    Ok((watcher, rx))
}

/// Files already present directly inside `dir`, sorted by name.
pub fn existing_files(dir: &Path) -> Result<Vec<WatchEvent>> {
    let mut events = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry?;
        events.push(WatchEvent {
            path: entry.path().to_path_buf(),
            is_dir: entry.file_type().is_dir(),
        });
    }
    Ok(events)
}
