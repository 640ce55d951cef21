use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use super::embeddings::{EmbeddingProvider, cache_key, cosine_similarity};
use super::{ChunkMetadata, Collection, DocumentIndex, IndexError, SearchHit};
use crate::extract::TextChunk;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS chunks (
        id INTEGER PRIMARY KEY,
        collection TEXT NOT NULL,
        source TEXT NOT NULL,
        chunk_index INTEGER NOT NULL,
        line_start INTEGER NOT NULL,
        line_end INTEGER NOT NULL,
        content TEXT NOT NULL,
        metadata TEXT NOT NULL,
        embedding TEXT,
        indexed_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(collection, source);

    CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
        content,
        content='chunks',
        content_rowid='id'
    );

    CREATE TRIGGER IF NOT EXISTS chunks_ai AFTER INSERT ON chunks BEGIN
        INSERT INTO chunks_fts(rowid, content) VALUES (new.id, new.content);
    END;

    CREATE TRIGGER IF NOT EXISTS chunks_ad AFTER DELETE ON chunks BEGIN
        INSERT INTO chunks_fts(chunks_fts, rowid, content) VALUES('delete', old.id, old.content);
    END;

    CREATE TABLE IF NOT EXISTS embedding_cache (
        key TEXT PRIMARY KEY,
        embedding TEXT NOT NULL
    );
"#;

/// SQLite-backed chunk store for one collection.
///
/// Handles for different collections can share one connection via
/// [`SqliteVectorStore::with_collection`]. Without an embedding provider the
/// store still indexes text and falls back to FTS5 keyword search.
#[derive(Clone)]
pub struct SqliteVectorStore {
    conn: Arc<Mutex<Connection>>,
    collection: Collection,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionStats {
    pub collection: Collection,
    pub sources: usize,
    pub chunks: usize,
    pub embedded_chunks: usize,
}

impl SqliteVectorStore {
    pub fn open(
        db_path: &Path,
        collection: Collection,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
    ) -> Result<Self, IndexError> {
        if let Some(parent) = db_path.parent() {
            // Connection::open reports the real error if this fails
            let _ = fs::create_dir_all(parent);
        }
        let conn = Connection::open(db_path)?;
        Self::from_connection(conn, collection, embedder)
    }

    pub fn open_in_memory(
        collection: Collection,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
    ) -> Result<Self, IndexError> {
        Self::from_connection(Connection::open_in_memory()?, collection, embedder)
    }

    fn from_connection(
        conn: Connection,
        collection: Collection,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
    ) -> Result<Self, IndexError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            collection,
            embedder,
        })
    }

    /// A handle on another collection in the same database.
    pub fn with_collection(&self, collection: Collection) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
            collection,
            embedder: self.embedder.clone(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, IndexError> {
        self.conn.lock().map_err(|_| IndexError::Poisoned)
    }

    /// Distinct source paths currently indexed in this collection.
    pub fn sources(&self) -> Result<Vec<String>, IndexError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT source FROM chunks WHERE collection = ?1 ORDER BY source",
        )?;
        let rows = stmt.query_map(params![self.collection.as_str()], |row| row.get(0))?;
        Ok(rows.collect::<Result<Vec<String>, _>>()?)
    }

    pub fn stats(&self) -> Result<CollectionStats, IndexError> {
        let conn = self.lock()?;
        let (sources, chunks, embedded): (i64, i64, i64) = conn.query_row(
            "SELECT COUNT(DISTINCT source), COUNT(*), COUNT(embedding)
             FROM chunks WHERE collection = ?1",
            params![self.collection.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        Ok(CollectionStats {
            collection: self.collection,
            sources: sources as usize,
            chunks: chunks as usize,
            embedded_chunks: embedded as usize,
        })
    }

    /// Number of cached embeddings (shared by all collections).
    pub fn cached_embeddings(&self) -> Result<usize, IndexError> {
        let conn = self.lock()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM embedding_cache", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Most similar chunks to `query`; keyword search when no embedder is set.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, IndexError> {
        match &self.embedder {
            Some(embedder) => {
                let query_vec = embedder
                    .embed(query)
                    .await
                    .map_err(|e| IndexError::Embedding(e.to_string()))?;
                self.vector_search(&query_vec, limit)
            }
            None => self.keyword_search(query, limit),
        }
    }

    fn vector_search(&self, query_vec: &[f32], limit: usize) -> Result<Vec<SearchHit>, IndexError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT source, content, line_start, line_end, embedding
             FROM chunks WHERE collection = ?1 AND embedding IS NOT NULL",
        )?;
        let rows = stmt.query_map(params![self.collection.as_str()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut hits = Vec::new();
        for row in rows {
            let (source, content, line_start, line_end, embedding) = row?;
            let embedding: Vec<f32> = serde_json::from_str(&embedding)?;
            hits.push(SearchHit {
                source,
                content,
                line_start,
                line_end,
                score: cosine_similarity(query_vec, &embedding),
            });
        }

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }

    fn keyword_search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, IndexError> {
        let Some(fts_query) = fts_query(query) else {
            return Ok(Vec::new());
        };

        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT c.source, c.content, c.line_start, c.line_end, bm25(chunks_fts) AS rank
             FROM chunks_fts
             JOIN chunks c ON chunks_fts.rowid = c.id
             WHERE chunks_fts MATCH ?1 AND c.collection = ?2
             ORDER BY rank
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(
            params![fts_query, self.collection.as_str(), limit as i64],
            |row| {
                Ok(SearchHit {
                    source: row.get(0)?,
                    content: row.get(1)?,
                    line_start: row.get(2)?,
                    line_end: row.get(3)?,
                    // bm25 is lower-is-better and negative
                    score: -(row.get::<_, f64>(4)? as f32),
                })
            },
        )?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Embed `texts`, reusing cached vectors where the same model has seen
    /// the same text before.
    async fn embed_with_cache(
        &self,
        embedder: &dyn EmbeddingProvider,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>, IndexError> {
        let keys: Vec<String> = texts.iter().map(|t| cache_key(embedder.model(), t)).collect();

        let mut cached: HashMap<String, Vec<f32>> = HashMap::new();
        {
            let conn = self.lock()?;
            let mut stmt = conn.prepare("SELECT embedding FROM embedding_cache WHERE key = ?1")?;
            for key in &keys {
                let hit: Option<String> = stmt
                    .query_row(params![key], |row| row.get(0))
                    .optional()?;
                if let Some(json) = hit {
                    cached.insert(key.clone(), serde_json::from_str(&json)?);
                }
            }
        }

        let missing: Vec<String> = texts
            .iter()
            .zip(&keys)
            .filter(|(_, key)| !cached.contains_key(*key))
            .map(|(text, _)| text.clone())
            .collect();

        debug!(
            "Embedding {} chunks ({} cached) for {}",
            missing.len(),
            texts.len() - missing.len(),
            self.collection
        );

        if !missing.is_empty() {
            let fresh = embedder
                .embed_batch(&missing)
                .await
                .map_err(|e| IndexError::Embedding(e.to_string()))?;
            if fresh.len() != missing.len() {
                return Err(IndexError::Embedding(format!(
                    "expected {} embeddings, got {}",
                    missing.len(),
                    fresh.len()
                )));
            }

            let conn = self.lock()?;
            let mut stmt = conn.prepare(
                "INSERT OR REPLACE INTO embedding_cache (key, embedding) VALUES (?1, ?2)",
            )?;
            for (text, vector) in missing.iter().zip(fresh) {
                let key = cache_key(embedder.model(), text);
                stmt.execute(params![key, serde_json::to_string(&vector)?])?;
                cached.insert(key, vector);
            }
        }

        keys.iter()
            .map(|key| {
                cached
                    .get(key)
                    .cloned()
                    .ok_or_else(|| IndexError::Embedding("embedding missing after batch".into()))
            })
            .collect()
    }
}

#[async_trait]
impl DocumentIndex for SqliteVectorStore {
    fn sources_under(&self, prefix: &Path) -> Result<Vec<PathBuf>, IndexError> {
        // Filtered by path components here rather than with LIKE, so that
        // `/a/doc` never matches `/a/doc.txt`
        Ok(self
            .sources()?
            .into_iter()
            .map(PathBuf::from)
            .filter(|source| source.starts_with(prefix) && source != prefix)
            .collect())
    }

    async fn delete(&self, source: &Path) -> Result<usize, IndexError> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM chunks WHERE collection = ?1 AND source = ?2",
            params![self.collection.as_str(), source.to_string_lossy()],
        )?;

        if removed == 0 {
            return Err(IndexError::NotFound(source.to_path_buf()));
        }
        debug!("Removed {} chunks for {}", removed, source.display());
        Ok(removed)
    }

    async fn upsert(
        &self,
        chunks: Vec<TextChunk>,
        metadata: Vec<ChunkMetadata>,
    ) -> Result<usize, IndexError> {
        if chunks.len() != metadata.len() {
            return Err(IndexError::BatchMismatch {
                chunks: chunks.len(),
                metadata: metadata.len(),
            });
        }
        if chunks.is_empty() {
            return Ok(0);
        }

        let embeddings = match &self.embedder {
            Some(embedder) => {
                let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
                Some(self.embed_with_cache(embedder.as_ref(), &texts).await?)
            }
            None => None,
        };

        let indexed_at = Utc::now().to_rfc3339();
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO chunks
                 (collection, source, chunk_index, line_start, line_end, content, metadata, embedding, indexed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for (i, (chunk, meta)) in chunks.iter().zip(&metadata).enumerate() {
                let embedding = match &embeddings {
                    Some(vectors) => Some(serde_json::to_string(&vectors[i])?),
                    None => None,
                };
                stmt.execute(params![
                    self.collection.as_str(),
                    meta.source.to_string_lossy(),
                    i as i64,
                    chunk.line_start,
                    chunk.line_end,
                    chunk.content,
                    serde_json::to_string(meta)?,
                    embedding,
                    indexed_at,
                ])?;
            }
        }
        tx.commit()?;

        Ok(chunks.len())
    }
}

/// Build an FTS5 query matching any of the words in `query`.
fn fts_query(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split_whitespace()
        .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::KeywordEmbedder;
    use std::path::PathBuf;

    fn chunks(texts: &[&str]) -> Vec<TextChunk> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| TextChunk {
                content: t.to_string(),
                line_start: i as i64 + 1,
                line_end: i as i64 + 1,
            })
            .collect()
    }

    fn meta(source: &str, n: usize) -> Vec<ChunkMetadata> {
        vec![ChunkMetadata::for_source(Path::new(source)); n]
    }

    #[tokio::test]
    async fn test_delete_unknown_source_is_not_found() -> anyhow::Result<()> {
        let store = SqliteVectorStore::open_in_memory(Collection::Documents, None)?;
        let err = store.delete(Path::new("/docs/new.txt")).await.unwrap_err();
        assert!(matches!(err, IndexError::NotFound(p) if p == PathBuf::from("/docs/new.txt")));
        Ok(())
    }

    #[tokio::test]
    async fn test_upsert_then_delete() -> anyhow::Result<()> {
        let store = SqliteVectorStore::open_in_memory(Collection::Documents, None)?;
        let stored = store
            .upsert(chunks(&["alpha", "beta"]), meta("/docs/a.txt", 2))
            .await?;
        assert_eq!(stored, 2);
        assert_eq!(store.sources()?, vec!["/docs/a.txt".to_string()]);

        assert_eq!(store.delete(Path::new("/docs/a.txt")).await?, 2);
        assert!(store.sources()?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_upsert_rejects_mismatched_batch() -> anyhow::Result<()> {
        let store = SqliteVectorStore::open_in_memory(Collection::Documents, None)?;
        let err = store
            .upsert(chunks(&["alpha", "beta"]), meta("/docs/a.txt", 1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            IndexError::BatchMismatch {
                chunks: 2,
                metadata: 1
            }
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_collections_are_isolated() -> anyhow::Result<()> {
        let docs = SqliteVectorStore::open_in_memory(Collection::Documents, None)?;
        let images = docs.with_collection(Collection::Images);

        docs.upsert(chunks(&["quarterly report"]), meta("/docs/q.txt", 1))
            .await?;
        images
            .upsert(chunks(&["Image file cat.png"]), meta("/pics/cat.png", 1))
            .await?;

        assert_eq!(docs.stats()?.sources, 1);
        assert_eq!(images.stats()?.sources, 1);
        assert!(docs.delete(Path::new("/pics/cat.png")).await.is_err());
        assert_eq!(images.delete(Path::new("/pics/cat.png")).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_sources_under_matches_whole_components() -> anyhow::Result<()> {
        let store = SqliteVectorStore::open_in_memory(Collection::Documents, None)?;
        for source in ["/w/notes/a.txt", "/w/notes/deep/b.md", "/w/notes.txt", "/w/other/c.txt"] {
            store.upsert(chunks(&["text"]), meta(source, 1)).await?;
        }

        let mut found = store.sources_under(Path::new("/w/notes"))?;
        found.sort();
        assert_eq!(
            found,
            vec![
                PathBuf::from("/w/notes/a.txt"),
                PathBuf::from("/w/notes/deep/b.md")
            ]
        );
        assert!(store.sources_under(Path::new("/w/notes.txt"))?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_keyword_search_without_embedder() -> anyhow::Result<()> {
        let store = SqliteVectorStore::open_in_memory(Collection::Documents, None)?;
        store
            .upsert(chunks(&["the quarterly budget review"]), meta("/docs/budget.md", 1))
            .await?;
        store
            .upsert(chunks(&["holiday photos from the beach"]), meta("/docs/trip.md", 1))
            .await?;

        let hits = store.search("budget", 10).await?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source, "/docs/budget.md");

        assert!(store.search("   ", 10).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_vector_search_ranks_closest_first() -> anyhow::Result<()> {
        let embedder = Arc::new(KeywordEmbedder::default());
        let store = SqliteVectorStore::open_in_memory(Collection::Documents, Some(embedder))?;
        store
            .upsert(chunks(&["zzzz zzzz"]), meta("/docs/z.txt", 1))
            .await?;
        store
            .upsert(chunks(&["aaaa bbbb"]), meta("/docs/ab.txt", 1))
            .await?;

        let hits = store.search("abab", 2).await?;
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].source, "/docs/ab.txt");
        assert!(hits[0].score > hits[1].score);
        assert_eq!(store.stats()?.embedded_chunks, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_embedding_cache_skips_known_text() -> anyhow::Result<()> {
        let embedder = Arc::new(KeywordEmbedder::default());
        let store =
            SqliteVectorStore::open_in_memory(Collection::Documents, Some(embedder.clone()))?;

        store
            .upsert(chunks(&["same text", "other text"]), meta("/docs/a.txt", 2))
            .await?;
        assert_eq!(embedder.embedded_texts(), 2);

        store.delete(Path::new("/docs/a.txt")).await?;
        store
            .upsert(chunks(&["same text", "new text"]), meta("/docs/a.txt", 2))
            .await?;
        // Only "new text" needed a fresh embedding
        assert_eq!(embedder.embedded_texts(), 3);
        assert_eq!(store.cached_embeddings()?, 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_open_creates_database_file() -> anyhow::Result<()> {
        let dir = tempfile::TempDir::new()?;
        let db = dir.path().join("nested").join("index.sqlite");
        let store = SqliteVectorStore::open(&db, Collection::Documents, None)?;
        store
            .upsert(chunks(&["persisted"]), meta("/docs/p.txt", 1))
            .await?;
        drop(store);

        let reopened = SqliteVectorStore::open(&db, Collection::Documents, None)?;
        assert_eq!(reopened.stats()?.chunks, 1);
        Ok(())
    }

    #[test]
    fn test_fts_query_quotes_terms() {
        assert_eq!(
            fts_query("budget \"q3\""),
            Some("\"budget\" OR \"\"\"q3\"\"\"".to_string())
        );
        assert_eq!(fts_query(""), None);
    }
}
