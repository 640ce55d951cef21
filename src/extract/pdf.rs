use std::path::Path;

use super::{ExtractError, TextChunk, TextExtractor, chunk_text};

/// PDF documents, chunked page by page.
///
/// Chunks never span a page break. Their line range holds the page number
/// rather than a line number, since extracted PDF text has no stable lines.
pub struct PdfExtractor {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl PdfExtractor {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
        }
    }
}

impl TextExtractor for PdfExtractor {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn extract(&self, path: &Path) -> Result<Vec<TextChunk>, ExtractError> {
        if !path.exists() {
            return Err(ExtractError::NotFound(path.to_path_buf()));
        }

        let pages = pdf_extract::extract_text_by_pages(path).map_err(|e| ExtractError::Pdf {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        Ok(chunk_pages(&pages, self.chunk_size, self.chunk_overlap))
    }
}

/// Chunk each page separately, tagging chunks with their 1-based page.
fn chunk_pages(pages: &[String], chunk_size: usize, chunk_overlap: usize) -> Vec<TextChunk> {
    let mut chunks = Vec::new();
    for (i, page) in pages.iter().enumerate() {
        let page_no = (i + 1) as i64;
        chunks.extend(
            chunk_text(page, chunk_size, chunk_overlap)
                .into_iter()
                .map(|chunk| TextChunk {
                    content: chunk.content,
                    line_start: page_no,
                    line_end: page_no,
                }),
        );
    }
    chunks
}
