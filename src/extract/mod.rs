//! Text extraction: turns a file on disk into ordered chunks for indexing.

mod image;
mod pdf;
mod text;

pub use image::ImageExtractor;
pub use pdf::PdfExtractor;
pub use text::{PlainTextExtractor, chunk_text};

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::config::ExtractConfig;
use crate::index::Collection;

/// One piece of extracted content, in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub content: String,
    /// 1-based, inclusive. Zero for content that has no line structure.
    pub line_start: i64,
    pub line_end: i64,
}

impl TextChunk {
    pub fn whole(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            line_start: 0,
            line_end: 0,
        }
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    /// The file disappeared between the event and extraction.
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read PDF {path}: {message}")]
    Pdf { path: PathBuf, message: String },

    #[error("failed to decode image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: ::image::ImageError,
    },
}

impl ExtractError {
    pub fn from_io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            ExtractError::NotFound(path.to_path_buf())
        } else {
            ExtractError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

/// Extracts indexable text from one kind of file.
pub trait TextExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    fn extract(&self, path: &Path) -> Result<Vec<TextChunk>, ExtractError>;
}

/// Extension-keyed lookup of extractors.
///
/// A path with no registered extractor is an unsupported type; callers treat
/// `None` as "nothing to index" rather than an error.
#[derive(Clone, Default)]
pub struct ExtractorRegistry {
    by_extension: HashMap<String, Arc<dyn TextExtractor>>,
    image_extensions: HashSet<String>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &ExtractConfig) -> Self {
        let mut registry = Self::new();

        let text: Arc<dyn TextExtractor> = Arc::new(PlainTextExtractor::new(
            config.chunk_size,
            config.chunk_overlap,
        ));
        for ext in &config.text_extensions {
            registry.register(ext, Arc::clone(&text));
        }

        let pdf: Arc<dyn TextExtractor> = Arc::new(PdfExtractor::new(
            config.chunk_size,
            config.chunk_overlap,
        ));
        for ext in &config.pdf_extensions {
            registry.register(ext, Arc::clone(&pdf));
        }

        let images: Arc<dyn TextExtractor> = Arc::new(ImageExtractor);
        for ext in &config.image_extensions {
            registry.register_image(ext, Arc::clone(&images));
        }

        registry
    }

    pub fn register(&mut self, extension: &str, extractor: Arc<dyn TextExtractor>) {
        self.by_extension
            .insert(normalize_extension(extension), extractor);
    }

    /// Register an extractor whose output belongs in the images collection.
    pub fn register_image(&mut self, extension: &str, extractor: Arc<dyn TextExtractor>) {
        let ext = normalize_extension(extension);
        self.image_extensions.insert(ext.clone());
        self.by_extension.insert(ext, extractor);
    }

    pub fn extractor_for(&self, path: &Path) -> Option<Arc<dyn TextExtractor>> {
        let ext = extension_of(path)?;
        self.by_extension.get(&ext).cloned()
    }

    pub fn is_supported(&self, path: &Path) -> bool {
        self.extractor_for(path).is_some()
    }

    /// Which collection holds (or would hold) the content of `path`.
    pub fn collection_for(&self, path: &Path) -> Collection {
        match extension_of(path) {
            Some(ext) if self.image_extensions.contains(&ext) => Collection::Images,
            _ => Collection::Documents,
        }
    }
}

fn normalize_extension(ext: &str) -> String {
    ext.trim_start_matches('.').to_ascii_lowercase()
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
}
