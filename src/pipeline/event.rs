use std::fmt;
use std::path::PathBuf;
use tokio::time::Instant;

/// What happened to a path, collapsed to the two outcomes the index cares about.
///
/// Creation and modification are both `Modification`: either way the index
/// must reflect the current file contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileEventKind {
    Modification,
    Deletion,
}

impl fmt::Display for FileEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileEventKind::Modification => write!(f, "modification"),
            FileEventKind::Deletion => write!(f, "deletion"),
        }
    }
}

/// A single admitted filesystem event with its arrival time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub path: PathBuf,
    pub kind: FileEventKind,
    pub observed_at: Instant,
}

impl FileEvent {
    pub fn new(path: PathBuf, kind: FileEventKind, observed_at: Instant) -> Self {
        Self {
            path,
            kind,
            observed_at,
        }
    }
}
