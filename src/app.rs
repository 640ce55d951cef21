//! Construction of the long-lived services from configuration.
//!
//! Everything the pipeline and the query path share (embedding provider,
//! per-collection stores, dispatcher) is built once here and handed out as
//! cloned handles.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::Config;
use crate::extract::ExtractorRegistry;
use crate::index::{
    Collection, CollectionStats, EmbeddingProvider, IndexSet, OpenAIEmbeddingProvider,
    SqliteVectorStore,
};
use crate::pipeline::{
    AdmissionFilter, DispatchOutcome, Dispatcher, FileEventKind, Pipeline, PipelineTiming,
    files_under,
};
use crate::query::{
    DocumentQueryClient, ImageQueryClient, LlmProvider, OpenAIChatProvider, QueryClient,
    RetrievalQa,
};

#[derive(Clone)]
pub struct Services {
    config: Config,
    documents: SqliteVectorStore,
    images: SqliteVectorStore,
    dispatcher: Dispatcher,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct ReindexStats {
    pub files_seen: usize,
    pub indexed: usize,
    pub unsupported: usize,
    pub removed: usize,
    pub failed: usize,
    #[serde(skip)]
    pub duration: Duration,
}

impl Services {
    /// Open the index at the configured location with the configured
    /// embedding provider.
    pub fn build(config: &Config) -> Result<Self> {
        let embedder = embedding_provider(config)?;
        Self::build_with(config, &config.paths.index_db(), embedder)
    }

    pub fn build_with(
        config: &Config,
        db_path: &Path,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
    ) -> Result<Self> {
        let documents = SqliteVectorStore::open(db_path, Collection::Documents, embedder)
            .with_context(|| format!("Failed to open index at {}", db_path.display()))?;
        let images = documents.with_collection(Collection::Images);

        let dispatcher = Dispatcher::new(
            ExtractorRegistry::from_config(&config.extract),
            IndexSet::new(Arc::new(documents.clone()), Arc::new(images.clone())),
        );

        Ok(Self {
            config: config.clone(),
            documents,
            images,
            dispatcher,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self, collection: Collection) -> &SqliteVectorStore {
        match collection {
            Collection::Documents => &self.documents,
            Collection::Images => &self.images,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Markers from config, plus our own data and cache directories so the
    /// index never indexes itself.
    pub fn admission_filter(&self) -> AdmissionFilter {
        AdmissionFilter::new(self.config.watch.ignore_markers.clone())
            .exclude(self.config.paths.data_dir.clone())
            .exclude(self.config.paths.cache_dir.clone())
    }

    pub fn timing(&self) -> Result<PipelineTiming> {
        Ok(PipelineTiming {
            debounce: self.config.debounce()?,
            scan_interval: self.config.scan_interval()?,
        })
    }

    /// Start watching `root` (or the configured root).
    pub fn start_pipeline(&self, root: Option<&Path>) -> Result<Pipeline> {
        let root = self.resolve_root(root)?;
        Pipeline::start(
            &root,
            self.admission_filter(),
            self.dispatcher.clone(),
            self.timing()?,
        )
    }

    /// Absolute, symlink-free form of the root, so event paths and reindex
    /// paths agree.
    fn resolve_root(&self, root: Option<&Path>) -> Result<PathBuf> {
        let root = root
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.config.watch_root());
        root.canonicalize()
            .with_context(|| format!("Watch root {} is not accessible", root.display()))
    }

    pub fn stats(&self) -> Result<Vec<CollectionStats>> {
        Collection::ALL
            .iter()
            .map(|c| Ok(self.store(*c).stats()?))
            .collect()
    }

    pub fn query_client(
        &self,
        collection: Collection,
        llm: Arc<dyn LlmProvider>,
    ) -> Box<dyn QueryClient> {
        let chain = RetrievalQa::new(
            Arc::new(self.store(collection).clone()),
            llm,
            self.config.query.top_k,
        );
        match collection {
            Collection::Documents => Box::new(DocumentQueryClient::new(chain)),
            Collection::Images => Box::new(ImageQueryClient::new(chain)),
        }
    }

    /// Bring the index in line with the tree under `root`: every admitted
    /// file is re-dispatched as a modification, and indexed sources under
    /// `root` that no longer exist are removed.
    pub async fn reindex(&self, root: Option<&Path>) -> Result<ReindexStats> {
        let start = Instant::now();
        let root = self.resolve_root(root)?;
        let filter = self.admission_filter();
        let mut stats = ReindexStats::default();

        for path in files_under(&root) {
            if !filter.admits(&path, false) {
                continue;
            }

            stats.files_seen += 1;
            match self
                .dispatcher
                .dispatch(&path, FileEventKind::Modification)
                .await
            {
                Ok(DispatchOutcome::Indexed { .. }) => stats.indexed += 1,
                Ok(DispatchOutcome::Unsupported) => stats.unsupported += 1,
                Ok(_) => {}
                Err(e) => {
                    warn!("{}", e);
                    stats.failed += 1;
                }
            }
        }

        for collection in Collection::ALL {
            for source in self.store(collection).sources()? {
                let source = PathBuf::from(source);
                if !source.starts_with(&root) || source.exists() {
                    continue;
                }
                match self
                    .dispatcher
                    .dispatch(&source, FileEventKind::Deletion)
                    .await
                {
                    Ok(DispatchOutcome::Removed { .. }) => stats.removed += 1,
                    Ok(_) => {}
                    Err(e) => {
                        warn!("{}", e);
                        stats.failed += 1;
                    }
                }
            }
        }

        stats.duration = start.elapsed();
        info!("Reindex complete: {:?}", stats);
        Ok(stats)
    }
}


fn openai_key(config: &Config) -> Option<(&str, &str)> {
    config
        .providers
        .openai
        .as_ref()
        // An unexpanded "${VAR}" means the variable was not set
        .filter(|openai| !openai.api_key.is_empty() && !openai.api_key.starts_with('$'))
        .map(|openai| (openai.api_key.as_str(), openai.base_url.as_str()))
}

pub fn embedding_provider(config: &Config) -> Result<Option<Arc<dyn EmbeddingProvider>>> {
    match config.embedding.provider.as_str() {
        "openai" => {
            let (api_key, base_url) = openai_key(config).ok_or_else(|| {
                anyhow::anyhow!(
                    "embedding.provider is \"openai\" but no [providers.openai] api_key is set \
                     (set OPENAI_API_KEY or use embedding.provider = \"none\")"
                )
            })?;
            Ok(Some(Arc::new(OpenAIEmbeddingProvider::new(
                api_key,
                base_url,
                &config.embedding.model,
            ))))
        }
        #[cfg(feature = "local-embeddings")]
        "local" => {
            let provider = crate::index::FastEmbedProvider::new(
                &config.embedding.model,
                &config.embedding_cache_dir(),
            )?;
            Ok(Some(Arc::new(provider)))
        }
        #[cfg(not(feature = "local-embeddings"))]
        "local" => anyhow::bail!(
            "embedding.provider is \"local\" but docwatch was built without the local-embeddings feature"
        ),
        "none" => Ok(None),
        other => anyhow::bail!("Unknown embedding provider: {}", other),
    }
}

pub fn llm_provider(config: &Config) -> Result<Arc<dyn LlmProvider>> {
    let (api_key, base_url) = openai_key(config)
        .ok_or_else(|| anyhow::anyhow!("Answering questions needs [providers.openai] api_key"))?;
    Ok(Arc::new(OpenAIChatProvider::new(
        api_key,
        base_url,
        &config.query.model,
    )))
}
