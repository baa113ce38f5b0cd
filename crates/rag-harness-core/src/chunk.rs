//! Sliding-window, boundary-aware text chunker.
//!
//! Splits extracted document text into overlapping [`DocumentChunk`]s of at
//! most `chunk_size` characters. Consecutive chunks share `chunk_overlap`
//! characters so that a sentence straddling a cut is still retrievable from
//! at least one chunk.
//!
//! # Algorithm
//!
//! 1. Open a window of `chunk_size` characters at `start`.
//! 2. Unless the window reaches the end of the text, look for the last `.`
//!    or `\n` inside it. If that boundary sits at or past the middle of the
//!    window, cut just after it; otherwise cut at the raw window edge.
//! 3. Emit the chunk for `[start, cut)` (clamped to the text length) with
//!    trimmed content, its index, offsets, and page number.
//! 4. The next window opens at `cut - chunk_overlap`.
//!
//! Offsets are measured in characters, not bytes, so multi-byte text never
//! splits inside a code point.
//!
//! Chunks whose region is entirely whitespace are still emitted with empty
//! `content`; filtering them is the ingestion layer's decision.
//!
//! # Example
//!
//! ```rust
//! use rag_harness_core::chunk::Chunker;
//! use rag_harness_core::models::DocumentMetadata;
//!
//! let chunker = Chunker::new(1000, 200).unwrap();
//! let chunks = chunker.chunk("Hello world.", &DocumentMetadata::new("hello.txt"));
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].chunk_id, "hello.txt_0");
//! ```

use anyhow::{bail, Result};

use crate::models::{DocumentChunk, DocumentMetadata};

/// Default window size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Default overlap between consecutive windows in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Splits text into overlapping, boundary-aware chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl Chunker {
    /// Create a chunker.
    ///
    /// # Errors
    ///
    /// Both values must be positive and `chunk_overlap < chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            bail!("chunk_size must be > 0");
        }
        if chunk_overlap == 0 {
            bail!("chunk_overlap must be > 0");
        }
        if chunk_overlap >= chunk_size {
            bail!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap,
                chunk_size
            );
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split `text` into chunks tagged with `metadata`.
    ///
    /// # Guarantees
    ///
    /// - Empty text yields no chunks.
    /// - Text no longer than `chunk_size` yields exactly one chunk. Longer
    ///   text always advances by `cut - chunk_overlap`, so the final window
    ///   may lie entirely inside its predecessor.
    /// - Every chunk has `end_offset > start_offset`.
    /// - Chunks are ordered by `start_offset` and together cover the text
    ///   without gaps.
    /// - Indices are contiguous from 0 and `chunk_id` is
    ///   `{filename}_{chunk_index}`.
    pub fn chunk(&self, text: &str, metadata: &DocumentMetadata) -> Vec<DocumentChunk> {
        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < len {
            let cut = self.cut_point(&chars, start);
            let end = cut.min(len);
            let whole_text = start == 0 && end == len;
            let content: String = chars[start..end].iter().collect();
            let chunk_index = chunks.len();

            chunks.push(DocumentChunk {
                chunk_id: format!("{}_{}", metadata.filename, chunk_index),
                content: content.trim().to_string(),
                source_filename: metadata.filename.clone(),
                page_number: metadata.page_at(start),
                chunk_index,
                start_offset: start,
                end_offset: end,
            });

            if whole_text {
                break;
            }

            // A trimmed cut close to `start` combined with a large overlap
            // could otherwise move the window backwards.
            start = cut.saturating_sub(self.chunk_overlap).max(start + 1);
        }

        chunks
    }

    /// Position (exclusive, possibly past the end of the text) at which the
    /// window opened at `start` is cut.
    fn cut_point(&self, chars: &[char], start: usize) -> usize {
        let raw_end = start + self.chunk_size;
        if raw_end >= chars.len() {
            return raw_end;
        }

        let window = &chars[start..raw_end];
        match window.iter().rposition(|&c| c == '.' || c == '\n') {
            Some(boundary) if boundary * 2 >= self.chunk_size => start + boundary + 1,
            _ => raw_end,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> DocumentMetadata {
        DocumentMetadata::new("doc.pdf")
    }

    #[test]
    fn test_rejects_invalid_config() {
        assert!(Chunker::new(0, 0).is_err());
        assert!(Chunker::new(100, 0).is_err());
        assert!(Chunker::new(100, 100).is_err());
        assert!(Chunker::new(100, 150).is_err());
        assert!(Chunker::new(100, 99).is_ok());
    }

    #[test]
    fn test_empty_text() {
        let chunks = Chunker::default().chunk("", &meta());
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let text = "A short document.";
        let chunks = Chunker::default().chunk(text, &meta());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, text);
        assert_eq!(chunks[0].start_offset, 0);
        assert_eq!(chunks[0].end_offset, text.chars().count());
        assert_eq!(chunks[0].chunk_id, "doc.pdf_0");
        assert_eq!(chunks[0].source_filename, "doc.pdf");
        assert_eq!(chunks[0].page_number, None);
    }

    #[test]
    fn test_overlap_offsets_without_boundaries() {
        let text = "x".repeat(2500);
        let chunks = Chunker::new(1000, 200).unwrap().chunk(&text, &meta());
        let starts: Vec<usize> = chunks.iter().map(|c| c.start_offset).collect();
        assert_eq!(starts, vec![0, 800, 1600, 2400]);
        let ends: Vec<usize> = chunks.iter().map(|c| c.end_offset).collect();
        assert_eq!(ends, vec![1000, 1800, 2500, 2500]);
    }

    #[test]
    fn test_cuts_at_period_past_midpoint() {
        // Period at index 69 of a 100-char window.
        let mut text = "a".repeat(69);
        text.push('.');
        text.push_str(&"b".repeat(200));
        let chunks = Chunker::new(100, 20).unwrap().chunk(&text, &meta());
        assert_eq!(chunks[0].end_offset, 70);
        assert!(chunks[0].content.ends_with('.'));
        assert_eq!(chunks[1].start_offset, 50);
    }

    #[test]
    fn test_cuts_at_newline_past_midpoint() {
        let mut text = "a".repeat(80);
        text.push('\n');
        text.push_str(&"b".repeat(200));
        let chunks = Chunker::new(100, 20).unwrap().chunk(&text, &meta());
        assert_eq!(chunks[0].end_offset, 81);
        assert_eq!(chunks[0].content, "a".repeat(80));
    }

    #[test]
    fn test_ignores_boundary_before_midpoint() {
        let mut text = "a".repeat(10);
        text.push('.');
        text.push_str(&"b".repeat(300));
        let chunks = Chunker::new(100, 20).unwrap().chunk(&text, &meta());
        assert_eq!(chunks[0].end_offset, 100);
    }

    #[test]
    fn test_boundary_exactly_at_midpoint_is_used() {
        let mut text = "a".repeat(50);
        text.push('.');
        text.push_str(&"b".repeat(300));
        let chunks = Chunker::new(100, 20).unwrap().chunk(&text, &meta());
        assert_eq!(chunks[0].end_offset, 51);
    }

    #[test]
    fn test_last_window_is_not_trimmed() {
        let mut text = "a".repeat(60);
        text.push('.');
        text.push_str(&"b".repeat(20));
        let chunks = Chunker::new(100, 20).unwrap().chunk(&text, &meta());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].end_offset, 81);
    }

    #[test]
    fn test_coverage_has_no_gaps() {
        let text = (0..120)
            .map(|i| format!("Sentence number {} talks about configuration.", i))
            .collect::<Vec<_>>()
            .join(" ");
        let len = text.chars().count();
        let chunks = Chunker::new(300, 50).unwrap().chunk(&text, &meta());

        assert_eq!(chunks.first().unwrap().start_offset, 0);
        assert_eq!(chunks.last().unwrap().end_offset, len);
        for c in &chunks {
            assert!(c.end_offset > c.start_offset);
        }
        for pair in chunks.windows(2) {
            assert!(pair[1].start_offset > pair[0].start_offset);
            assert!(
                pair[1].start_offset <= pair[0].end_offset,
                "gap between {} and {}",
                pair[0].end_offset,
                pair[1].start_offset
            );
        }
    }

    #[test]
    fn test_indices_and_ids_contiguous() {
        let text = "word ".repeat(1000);
        let chunks = Chunker::new(200, 40).unwrap().chunk(&text, &meta());
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i);
            assert_eq!(c.chunk_id, format!("doc.pdf_{}", i));
        }
    }

    #[test]
    fn test_whitespace_region_emitted_with_empty_content() {
        let text = " ".repeat(50);
        let chunks = Chunker::new(100, 20).unwrap().chunk(&text, &meta());
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].content.is_empty());
        assert_eq!(chunks[0].end_offset, 50);
    }

    #[test]
    fn test_large_overlap_still_progresses() {
        let mut text = String::new();
        for _ in 0..20 {
            text.push_str(&"a".repeat(50));
            text.push('.');
        }
        let chunks = Chunker::new(100, 90).unwrap().chunk(&text, &meta());
        assert!(!chunks.is_empty());
        for pair in chunks.windows(2) {
            assert!(pair[1].start_offset > pair[0].start_offset);
        }
    }

    #[test]
    fn test_multibyte_offsets_are_characters() {
        let text = "é".repeat(250);
        let chunks = Chunker::new(100, 10).unwrap().chunk(&text, &meta());
        assert_eq!(chunks[0].end_offset, 100);
        assert_eq!(chunks[0].content.chars().count(), 100);
        assert_eq!(chunks.last().unwrap().end_offset, 250);
    }

    #[test]
    fn test_page_numbers_follow_start_offset() {
        let text = "p".repeat(300);
        let meta = DocumentMetadata::with_pages("guide.pdf", vec![0, 150]);
        let chunks = Chunker::new(100, 20).unwrap().chunk(&text, &meta);
        assert_eq!(chunks[0].page_number, Some(1));
        assert_eq!(chunks[1].page_number, Some(1)); // starts at 80
        assert_eq!(chunks[2].page_number, Some(2)); // starts at 160
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha. Beta.\nGamma. Delta. ".repeat(100);
        let chunker = Chunker::new(120, 30).unwrap();
        assert_eq!(chunker.chunk(&text, &meta()), chunker.chunk(&text, &meta()));
    }
}
