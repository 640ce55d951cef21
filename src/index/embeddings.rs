//! Embedding providers used by the vector store.
//!
//! The OpenAI embeddings API is always available; local ONNX embeddings via
//! fastembed require the `local-embeddings` feature.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

/// Turns text into fixed-length vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Short provider id, e.g. "openai" or "local"
    fn id(&self) -> &str;

    fn model(&self) -> &str;

    /// Embed a batch, returning one unit-length vector per input, in order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Provider {} returned no embedding", self.id()))
    }
}

pub struct OpenAIEmbeddingProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAIEmbeddingProvider {
    pub fn new(api_key: &str, base_url: &str, model: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    fn id(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Embedding {} texts with {}", texts.len(), self.model);

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI embeddings error {}: {}", status, body);
        }

        let mut body: EmbeddingResponse = response.json().await?;
        if body.data.len() != texts.len() {
            anyhow::bail!(
                "OpenAI returned {} embeddings for {} inputs",
                body.data.len(),
                texts.len()
            );
        }
        body.data.sort_by_key(|d| d.index);

        Ok(body
            .data
            .into_iter()
            .map(|d| normalize_embedding(d.embedding))
            .collect())
    }
}

#[cfg(feature = "local-embeddings")]
pub use local::FastEmbedProvider;

#[cfg(feature = "local-embeddings")]
mod local {
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use tracing::debug;

    use super::{EmbeddingProvider, normalize_embedding};

    /// fastembed-backed provider; models are downloaded into `cache_dir` on first use.
    pub struct FastEmbedProvider {
        model: Arc<Mutex<fastembed::TextEmbedding>>,
        model_name: String,
    }

    impl FastEmbedProvider {
        pub fn new(model_name: &str, cache_dir: &std::path::Path) -> Result<Self> {
            use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

            let model_enum = match model_name {
                "all-MiniLM-L6-v2" => EmbeddingModel::AllMiniLML6V2,
                "bge-small-en-v1.5" => EmbeddingModel::BGESmallENV15,
                "bge-base-en-v1.5" => EmbeddingModel::BGEBaseENV15,
                "multilingual-e5-small" => EmbeddingModel::MultilingualE5Small,
                other => anyhow::bail!(
                    "Unknown local embedding model '{}'. Supported: all-MiniLM-L6-v2, \
                     bge-small-en-v1.5, bge-base-en-v1.5, multilingual-e5-small",
                    other
                ),
            };

            std::fs::create_dir_all(cache_dir)?;
            debug!(
                "Loading local embedding model {} (cache: {})",
                model_name,
                cache_dir.display()
            );
            let model = TextEmbedding::try_new(
                InitOptions::new(model_enum).with_cache_dir(cache_dir.to_path_buf()),
            )?;

            Ok(Self {
                model: Arc::new(Mutex::new(model)),
                model_name: model_name.to_string(),
            })
        }
    }

    #[async_trait]
    impl EmbeddingProvider for FastEmbedProvider {
        fn id(&self) -> &str {
            "local"
        }

        fn model(&self) -> &str {
            &self.model_name
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }

            let texts = texts.to_vec();
            let model = Arc::clone(&self.model);

            // fastembed is synchronous
            let embeddings = tokio::task::spawn_blocking(move || {
                let mut model = model
                    .lock()
                    .map_err(|e| anyhow::anyhow!("Lock poisoned: {}", e))?;
                model.embed(texts, None).map_err(|e| anyhow::anyhow!("{}", e))
            })
            .await??;

            Ok(embeddings.into_iter().map(normalize_embedding).collect())
        }
    }
}

/// Scale a vector to unit length. Near-zero vectors are returned unchanged.
pub fn normalize_embedding(mut vec: Vec<f32>) -> Vec<f32> {
    let norm = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-10 {
        vec.iter_mut().for_each(|x| *x /= norm);
    }
    vec
}

/// Cosine similarity of two unit vectors (their dot product).
/// Vectors of different length score zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Cache key for an embedding: the model and the exact text.
pub fn cache_key(model: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model.as_bytes());
    hasher.update([0u8]);
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
