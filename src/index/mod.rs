//! Vector index: per-collection chunk storage keyed by source path.

pub mod embeddings;
mod sqlite;

pub use embeddings::{EmbeddingProvider, OpenAIEmbeddingProvider};
#[cfg(feature = "local-embeddings")]
pub use embeddings::FastEmbedProvider;
pub use sqlite::{CollectionStats, SqliteVectorStore};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

use crate::extract::TextChunk;

/// Named partition of the index. Each collection is queried independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Documents,
    Images,
}

impl Collection {
    pub const ALL: [Collection; 2] = [Collection::Documents, Collection::Images];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Documents => "documents",
            Collection::Images => "images",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "documents" => Ok(Collection::Documents),
            "images" => Ok(Collection::Images),
            other => anyhow::bail!("Unknown collection: {}", other),
        }
    }
}

/// Metadata stored alongside each chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: PathBuf,
}

impl ChunkMetadata {
    pub fn for_source(source: &Path) -> Self {
        Self {
            source: source.to_path_buf(),
        }
    }
}

/// A retrieved chunk with its similarity score (higher is better).
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub source: String,
    pub content: String,
    pub line_start: i64,
    pub line_end: i64,
    pub score: f32,
}

#[derive(Debug, Error)]
pub enum IndexError {
    /// No entries exist for the source. Expected when a file is new.
    #[error("no index entries for {0}")]
    NotFound(PathBuf),

    #[error("chunk/metadata length mismatch: {chunks} chunks, {metadata} metadata entries")]
    BatchMismatch { chunks: usize, metadata: usize },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("index lock poisoned")]
    Poisoned,
}

/// The index operations the pipeline needs: keyed delete and batch upsert.
#[async_trait]
pub trait DocumentIndex: Send + Sync {
    /// Indexed sources strictly below the directory `prefix`.
    ///
    /// Synchronous so the watcher thread can expand directory moves.
    fn sources_under(&self, prefix: &Path) -> Result<Vec<PathBuf>, IndexError>;

    /// Remove every chunk whose source is `source`, returning how many were
    /// removed. Fails with [`IndexError::NotFound`] if there were none.
    async fn delete(&self, source: &Path) -> Result<usize, IndexError>;

    /// Store `chunks` with their per-chunk `metadata` as one batch.
    async fn upsert(
        &self,
        chunks: Vec<TextChunk>,
        metadata: Vec<ChunkMetadata>,
    ) -> Result<usize, IndexError>;
}

/// The per-collection index handles, constructed once at startup.
#[derive(Clone)]
pub struct IndexSet {
    documents: Arc<dyn DocumentIndex>,
    images: Arc<dyn DocumentIndex>,
}

impl IndexSet {
    pub fn new(documents: Arc<dyn DocumentIndex>, images: Arc<dyn DocumentIndex>) -> Self {
        Self { documents, images }
    }

    pub fn get(&self, collection: Collection) -> &Arc<dyn DocumentIndex> {
        match collection {
            Collection::Documents => &self.documents,
            Collection::Images => &self.images,
        }
    }

    /// Sources below `prefix` in any collection. A failing collection is
    /// logged and contributes nothing.
    pub fn sources_under(&self, prefix: &Path) -> Vec<PathBuf> {
        let mut sources = Vec::new();
        for collection in Collection::ALL {
            match self.get(collection).sources_under(prefix) {
                Ok(found) => sources.extend(found),
                Err(e) => warn!(
                    "Failed to list {} sources under {}: {}",
                    collection,
                    prefix.display(),
                    e
                ),
            }
        }
        sources
    }
}
