//! Bridge from `notify` events to the coalescer callbacks.
//!
//! The coalescer only queues files. A directory that is created, moved or
//! removed as a whole is expanded here into events for the files it holds:
//! files on disk for the new location, indexed sources for the old one.

use anyhow::{Context, Result};
use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::coalescer::EventCoalescer;
use crate::index::IndexSet;

/// Owns the OS watch on a directory tree. Dropping it stops event delivery.
pub struct FsWatcher {
    _watcher: RecommendedWatcher,
    root: PathBuf,
}

impl FsWatcher {
    /// Watch `root` recursively. `indexed` is consulted when a directory
    /// leaves the tree, to find the sources that went with it.
    pub fn start(root: &Path, coalescer: EventCoalescer, indexed: IndexSet) -> Result<Self> {
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => forward(&event, &coalescer, &indexed),
                Err(e) => warn!("Watch error: {}", e),
            }
        })?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch {}", root.display()))?;
        info!("Watching {}", root.display());

        Ok(Self {
            _watcher: watcher,
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Translate one `notify` event into coalescer callbacks.
///
/// Metadata-only changes and access events are ignored: they never change
/// what the index would store.
pub fn forward(event: &Event, coalescer: &EventCoalescer, indexed: &IndexSet) {
    match &event.kind {
        EventKind::Create(kind) => {
            for path in &event.paths {
                if matches!(kind, CreateKind::Folder) || path.is_dir() {
                    created_dir(path, coalescer);
                } else {
                    coalescer.on_created(path, false);
                }
            }
        }
        EventKind::Modify(ModifyKind::Name(mode)) => {
            forward_rename(*mode, &event.paths, coalescer, indexed)
        }
        EventKind::Modify(ModifyKind::Metadata(_)) => {}
        EventKind::Modify(_) => {
            for path in &event.paths {
                coalescer.on_modified(path, path.is_dir());
            }
        }
        EventKind::Remove(kind) => {
            for path in &event.paths {
                if matches!(kind, RemoveKind::Folder) {
                    removed_dir(path, coalescer, indexed);
                } else {
                    coalescer.on_deleted(path, false);
                }
            }
        }
        EventKind::Access(_) | EventKind::Any | EventKind::Other => {}
    }
}

fn forward_rename(
    mode: RenameMode,
    paths: &[PathBuf],
    coalescer: &EventCoalescer,
    indexed: &IndexSet,
) {
    match (mode, paths) {
        (RenameMode::Both, [src, dest, ..]) => {
            if dest.is_dir() {
                moved_dir(src, dest, coalescer, indexed);
            } else {
                coalescer.on_moved(src, dest, false);
            }
        }
        (RenameMode::From, _) => {
            for path in paths {
                gone(path, coalescer, indexed);
            }
        }
        (RenameMode::To, _) => {
            for path in paths {
                arrived(path, coalescer);
            }
        }
        // Platforms that cannot pair the halves of a rename
        _ => {
            for path in paths {
                if path.exists() {
                    arrived(path, coalescer);
                } else {
                    gone(path, coalescer, indexed);
                }
            }
        }
    }
}

/// A path that appeared in the tree, file or directory.
fn arrived(path: &Path, coalescer: &EventCoalescer) {
    if path.is_dir() {
        created_dir(path, coalescer);
    } else {
        coalescer.on_created(path, false);
    }
}

/// A path that left the tree. Whether it was a directory is unknowable, so
/// it is treated as a file and as the prefix of indexed sources.
fn gone(path: &Path, coalescer: &EventCoalescer, indexed: &IndexSet) {
    coalescer.on_deleted(path, false);
    for source in indexed.sources_under(path) {
        coalescer.on_deleted(&source, false);
    }
}

fn created_dir(dir: &Path, coalescer: &EventCoalescer) {
    coalescer.on_created(dir, true);
    for file in files_under(dir) {
        coalescer.on_created(&file, false);
    }
}

fn removed_dir(dir: &Path, coalescer: &EventCoalescer, indexed: &IndexSet) {
    coalescer.on_deleted(dir, true);
    for source in indexed.sources_under(dir) {
        coalescer.on_deleted(&source, false);
    }
}

/// Each file now under `dest` moved from the same relative path under `src`.
/// Indexed sources under `src` without a counterpart are deleted.
fn moved_dir(src: &Path, dest: &Path, coalescer: &EventCoalescer, indexed: &IndexSet) {
    coalescer.on_moved(src, dest, true);

    let mut moved = HashSet::new();
    for file in files_under(dest) {
        let Ok(relative) = file.strip_prefix(dest) else {
            continue;
        };
        let old = src.join(relative);
        coalescer.on_moved(&old, &file, false);
        moved.insert(old);
    }

    for source in indexed.sources_under(src) {
        if !moved.contains(&source) {
            coalescer.on_deleted(&source, false);
        }
    }
    debug!(
        "Expanded directory move {} -> {} into {} files",
        src.display(),
        dest.display(),
        moved.len()
    );
}

/// Regular files below `dir`, recursively. Unreadable entries are skipped.
pub fn files_under(dir: &Path) -> Vec<PathBuf> {
    let pattern = format!("{}/**/*", glob::Pattern::escape(&dir.to_string_lossy()));
    let entries = match glob::glob(&pattern) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Cannot walk {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    entries
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|path| path.is_file())
        .collect()
}
