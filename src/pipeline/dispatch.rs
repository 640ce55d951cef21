//! Applies one effective action for one path against the index.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinError;
use tracing::{debug, info};

use super::event::FileEventKind;
use crate::extract::{ExtractError, ExtractorRegistry};
use crate::index::{ChunkMetadata, Collection, IndexError, IndexSet};

/// What a dispatch did, for logging and stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Old entries (if any) replaced by `chunks` new ones
    Indexed { collection: Collection, chunks: usize },
    /// Entries removed for a deleted path
    Removed { collection: Collection, chunks: usize },
    /// Deleted path had nothing in the index
    AlreadyAbsent,
    /// No extractor for this file type; index untouched
    Unsupported,
    /// File was gone by the time extraction ran
    Vanished,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("extraction failed for {path}: {source}")]
    Extract {
        path: PathBuf,
        #[source]
        source: ExtractError,
    },

    /// The extractor panicked or its blocking task was cancelled.
    #[error("extraction task for {path} did not complete: {source}")]
    Join {
        path: PathBuf,
        #[source]
        source: JoinError,
    },

    #[error("index {collection} failed for {path}: {source}")]
    Index {
        path: PathBuf,
        collection: Collection,
        #[source]
        source: IndexError,
    },
}

/// Routes a path to its extractor and collection and performs the update.
#[derive(Clone)]
pub struct Dispatcher {
    extractors: ExtractorRegistry,
    indexes: IndexSet,
}

impl Dispatcher {
    pub fn new(extractors: ExtractorRegistry, indexes: IndexSet) -> Self {
        Self {
            extractors,
            indexes,
        }
    }

    pub fn indexes(&self) -> &IndexSet {
        &self.indexes
    }

    pub async fn dispatch(
        &self,
        path: &Path,
        kind: FileEventKind,
    ) -> Result<DispatchOutcome, DispatchError> {
        match kind {
            FileEventKind::Modification => self.reindex(path).await,
            FileEventKind::Deletion => self.remove(path).await,
        }
    }

    async fn reindex(&self, path: &Path) -> Result<DispatchOutcome, DispatchError> {
        let Some(extractor) = self.extractors.extractor_for(path) else {
            debug!("No extractor for {}, skipping", path.display());
            return Ok(DispatchOutcome::Unsupported);
        };
        let collection = self.extractors.collection_for(path);

        // Clear stale entries first; a new file has none
        self.delete_tolerant(path, collection).await?;

        // Extractors do blocking file IO and decoding
        let extracted = tokio::task::spawn_blocking({
            let extractor = Arc::clone(&extractor);
            let path = path.to_path_buf();
            move || extractor.extract(&path)
        })
        .await
        .map_err(|source| DispatchError::Join {
            path: path.to_path_buf(),
            source,
        })?;

        let chunks = match extracted {
            Ok(chunks) => chunks,
            Err(ExtractError::NotFound(_)) => {
                info!(
                    "File vanished before extraction, skipping: {}",
                    path.display()
                );
                return Ok(DispatchOutcome::Vanished);
            }
            Err(source) => {
                return Err(DispatchError::Extract {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let metadata = vec![ChunkMetadata::for_source(path); chunks.len()];
        let stored = self
            .indexes
            .get(collection)
            .upsert(chunks, metadata)
            .await
            .map_err(|source| DispatchError::Index {
                path: path.to_path_buf(),
                collection,
                source,
            })?;

        info!(
            "Indexed {} ({} chunks via {} into {})",
            path.display(),
            stored,
            extractor.name(),
            collection
        );
        Ok(DispatchOutcome::Indexed {
            collection,
            chunks: stored,
        })
    }

    async fn remove(&self, path: &Path) -> Result<DispatchOutcome, DispatchError> {
        let collection = self.extractors.collection_for(path);
        match self.delete_tolerant(path, collection).await? {
            Some(chunks) => {
                info!("Removed {} from {}", path.display(), collection);
                Ok(DispatchOutcome::Removed { collection, chunks })
            }
            None => Ok(DispatchOutcome::AlreadyAbsent),
        }
    }

    /// Delete by path, mapping "nothing to delete" to `Ok(None)`.
    async fn delete_tolerant(
        &self,
        path: &Path,
        collection: Collection,
    ) -> Result<Option<usize>, DispatchError> {
        match self.indexes.get(collection).delete(path).await {
            Ok(removed) => Ok(Some(removed)),
            Err(IndexError::NotFound(_)) => {
                info!("No existing {} entries for {}", collection, path.display());
                Ok(None)
            }
            Err(source) => Err(DispatchError::Index {
                path: path.to_path_buf(),
                collection,
                source,
            }),
        }
    }
}
