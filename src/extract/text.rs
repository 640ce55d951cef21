use std::fs;
use std::path::Path;

use super::{ExtractError, TextChunk, TextExtractor};

/// UTF-8 text and source files, split into overlapping line-aligned chunks.
pub struct PlainTextExtractor {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl PlainTextExtractor {
    /// `chunk_size` and `chunk_overlap` are in tokens (roughly 4 chars each).
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
        }
    }
}

impl TextExtractor for PlainTextExtractor {
    fn name(&self) -> &'static str {
        "text"
    }

    fn extract(&self, path: &Path) -> Result<Vec<TextChunk>, ExtractError> {
        let content = fs::read_to_string(path).map_err(|e| ExtractError::from_io(path, e))?;
        Ok(chunk_text(&content, self.chunk_size, self.chunk_overlap))
    }
}

/// Split text into chunks of about `target_tokens`, repeating roughly
/// `overlap_tokens` worth of trailing lines at the start of the next chunk.
///
/// Chunks never split a line. Blank-only input yields no chunks.
pub fn chunk_text(text: &str, target_tokens: usize, overlap_tokens: usize) -> Vec<TextChunk> {
    let lines: Vec<&str> = text.lines().collect();
    if lines.iter().all(|l| l.trim().is_empty()) {
        return Vec::new();
    }

    let target_chars = target_tokens.max(1) * 4;
    let overlap_chars = overlap_tokens * 4;

    let mut chunks = Vec::new();
    // Index of the first line in the current window
    let mut start = 0;
    let mut window_chars = 0;

    for (i, line) in lines.iter().enumerate() {
        window_chars += line.len() + 1;
        let last_line = i + 1 == lines.len();
        if window_chars < target_chars && !last_line {
            continue;
        }

        chunks.push(TextChunk {
            content: lines[start..=i].join("\n"),
            line_start: (start + 1) as i64,
            line_end: (i + 1) as i64,
        });

        if last_line {
            break;
        }

        // Walk back from the end of the window until the overlap budget is met
        let mut next_start = i + 1;
        let mut carried = 0;
        while next_start > start + 1 && carried < overlap_chars {
            next_start -= 1;
            carried += lines[next_start].len() + 1;
        }

        start = next_start;
        window_chars = lines[start..=i].iter().map(|l| l.len() + 1).sum();
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_chunk_text_small_input_is_one_chunk() {
        let chunks = chunk_text("Line 1\nLine 2\nLine 3", 400, 80);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].line_start, 1);
        assert_eq!(chunks[0].line_end, 3);
        assert_eq!(chunks[0].content, "Line 1\nLine 2\nLine 3");
    }

    #[test]
    fn test_chunk_text_splits_and_overlaps() {
        let text = (1..=20)
            .map(|i| format!("line number {:02}", i))
            .collect::<Vec<_>>()
            .join("\n");
        // 15 chars per line, target 40 chars, overlap ~16 chars (one line)
        let chunks = chunk_text(&text, 10, 4);

        assert!(chunks.len() > 1);
        assert_eq!(chunks[0].line_start, 1);
        assert_eq!(chunks.last().unwrap().line_end, 20);
        for pair in chunks.windows(2) {
            // Next chunk starts at or before the previous end (overlap) and makes progress
            assert!(pair[1].line_start <= pair[0].line_end);
            assert!(pair[1].line_start > pair[0].line_start);
        }
    }

    #[test]
    fn test_chunk_text_without_overlap_is_contiguous() {
        let text = (1..=12)
            .map(|i| format!("row {:02} padding", i))
            .collect::<Vec<_>>()
            .join("\n");
        let chunks = chunk_text(&text, 10, 0);

        for pair in chunks.windows(2) {
            assert_eq!(pair[1].line_start, pair[0].line_end + 1);
        }
    }

    #[test]
    fn test_chunk_text_blank_input() {
        assert!(chunk_text("", 400, 80).is_empty());
        assert!(chunk_text("\n  \n\t\n", 400, 80).is_empty());
    }

    #[test]
    fn test_extract_reads_file() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("doc.txt");
        fs::write(&path, "# Title\n\nSome body text.")?;

        let chunks = PlainTextExtractor::new(400, 80).extract(&path)?;
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].content.contains("Some body text."));
        Ok(())
    }

    #[test]
    fn test_extract_missing_file() {
        let dir = TempDir::new().unwrap();
        let result = PlainTextExtractor::new(400, 80).extract(&dir.path().join("missing.txt"));
        assert!(matches!(result, Err(ExtractError::NotFound(_))));
    }
}
