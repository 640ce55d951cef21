//! Test doubles shared by the unit tests.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use crate::extract::TextChunk;
use crate::index::embeddings::normalize_embedding;
use crate::index::{ChunkMetadata, Collection, DocumentIndex, EmbeddingProvider, IndexError, IndexSet};
use crate::query::LlmProvider;

/// Deterministic embedder: letter frequencies a..z, normalised.
#[derive(Default)]
pub struct KeywordEmbedder {
    embedded: AtomicUsize,
}

impl KeywordEmbedder {
    /// Total number of texts embedded so far.
    pub fn embedded_texts(&self) -> usize {
        self.embedded.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    fn id(&self) -> &str {
        "test"
    }

    fn model(&self) -> &str {
        "letters-26"
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embedded.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|text| {
                let mut v = vec![0.0f32; 26];
                for c in text.chars().filter(|c| c.is_ascii_alphabetic()) {
                    v[(c.to_ascii_lowercase() as u8 - b'a') as usize] += 1.0;
                }
                normalize_embedding(v)
            })
            .collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexCall {
    Delete {
        collection: Collection,
        source: PathBuf,
    },
    Upsert {
        collection: Collection,
        sources: Vec<PathBuf>,
        contents: Vec<String>,
    },
}

#[derive(Default)]
struct RecordingState {
    calls: Vec<IndexCall>,
    stored: HashMap<(Collection, PathBuf), usize>,
    failing: HashSet<PathBuf>,
    gate: Option<UpsertGate>,
}

/// Holds every upsert open until released, so tests can act while an index
/// write is in flight.
#[derive(Clone, Default)]
pub struct UpsertGate {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

impl UpsertGate {
    /// Resolves once an upsert is waiting at the gate.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let the waiting upsert finish.
    pub fn release(&self) {
        self.release.notify_one();
    }
}

/// In-memory index that records every call made against it.
#[derive(Clone, Default)]
pub struct RecordingBackend {
    state: Arc<Mutex<RecordingState>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Both collections, recording into this backend.
    pub fn index_set(&self) -> IndexSet {
        IndexSet::new(
            Arc::new(RecordingIndex {
                collection: Collection::Documents,
                state: Arc::clone(&self.state),
            }),
            Arc::new(RecordingIndex {
                collection: Collection::Images,
                state: Arc::clone(&self.state),
            }),
        )
    }

    pub fn calls(&self) -> Vec<IndexCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn calls_for(&self, path: &Path) -> Vec<IndexCall> {
        self.calls()
            .into_iter()
            .filter(|call| match call {
                IndexCall::Delete { source, .. } => source == path,
                IndexCall::Upsert { sources, .. } => sources.iter().any(|s| s == path),
            })
            .collect()
    }

    /// Pretend `path` already has `chunks` entries in `collection`.
    pub fn seed(&self, collection: Collection, path: &Path, chunks: usize) {
        self.state
            .lock()
            .unwrap()
            .stored
            .insert((collection, path.to_path_buf()), chunks);
    }

    pub fn stored(&self, collection: Collection, path: &Path) -> Option<usize> {
        self.state
            .lock()
            .unwrap()
            .stored
            .get(&(collection, path.to_path_buf()))
            .copied()
    }

    /// From now on, upserts wait at the returned gate before recording.
    pub fn gate_upserts(&self) -> UpsertGate {
        let gate = UpsertGate::default();
        self.state.lock().unwrap().gate = Some(gate.clone());
        gate
    }

    /// Every index call touching `path` fails with a backend error.
    pub fn fail_on(&self, path: &Path) {
        self.state
            .lock()
            .unwrap()
            .failing
            .insert(path.to_path_buf());
    }
}

struct RecordingIndex {
    collection: Collection,
    state: Arc<Mutex<RecordingState>>,
}

#[async_trait]
impl DocumentIndex for RecordingIndex {
    fn sources_under(&self, prefix: &Path) -> Result<Vec<PathBuf>, IndexError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .stored
            .keys()
            .filter(|(collection, source)| {
                *collection == self.collection && source.starts_with(prefix) && source != prefix
            })
            .map(|(_, source)| source.clone())
            .collect())
    }

    async fn delete(&self, source: &Path) -> Result<usize, IndexError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(IndexCall::Delete {
            collection: self.collection,
            source: source.to_path_buf(),
        });
        if state.failing.contains(source) {
            return Err(IndexError::Embedding("backend unavailable".to_string()));
        }
        state
            .stored
            .remove(&(self.collection, source.to_path_buf()))
            .ok_or_else(|| IndexError::NotFound(source.to_path_buf()))
    }

    async fn upsert(
        &self,
        chunks: Vec<TextChunk>,
        metadata: Vec<ChunkMetadata>,
    ) -> Result<usize, IndexError> {
        let gate = self.state.lock().unwrap().gate.clone();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        let mut state = self.state.lock().unwrap();
        let sources: Vec<PathBuf> = metadata.iter().map(|m| m.source.clone()).collect();
        state.calls.push(IndexCall::Upsert {
            collection: self.collection,
            sources: sources.clone(),
            contents: chunks.iter().map(|c| c.content.clone()).collect(),
        });
        if sources.iter().any(|s| state.failing.contains(s)) {
            return Err(IndexError::Embedding("backend unavailable".to_string()));
        }
        for source in sources {
            *state.stored.entry((self.collection, source)).or_default() += 1;
        }
        Ok(chunks.len())
    }
}

/// LLM that answers with a fixed string and remembers the prompts it saw.
pub struct CannedLlm {
    answer: String,
    prompts: Mutex<Vec<String>>,
}

impl CannedLlm {
    pub fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for CannedLlm {
    fn model(&self) -> &str {
        "canned"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.answer.clone())
    }
}
