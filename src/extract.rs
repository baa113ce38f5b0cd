//! Text extraction for knowledge-base documents.
//!
//! PDFs are extracted page by page. Pages are joined as `"\n{page}\n"` and
//! the result trimmed; the character offset at which every page starts in
//! that final text is kept so chunks can be attributed to a page. Plain text
//! and Markdown are read as UTF-8 and carry no page structure.

use std::path::Path;

use thiserror::Error;

use rag_harness_core::models::DocumentMetadata;

/// File extensions accepted for ingestion and upload.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "txt", "md"];

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported file type: {0}")]
    UnsupportedType(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("file is not valid UTF-8 text: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Text and positional metadata of one document.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedDocument {
    pub text: String,
    pub metadata: DocumentMetadata,
    pub num_pages: Option<usize>,
}

/// Lowercase extension of `filename` if it is one we can extract.
pub fn supported_extension(filename: &str) -> Option<String> {
    let ext = Path::new(filename)
        .extension()?
        .to_str()?
        .to_ascii_lowercase();
    SUPPORTED_EXTENSIONS
        .contains(&ext.as_str())
        .then_some(ext)
}

/// Read and extract the file at `path`.
pub fn extract_file(path: &Path) -> Result<ExtractedDocument, ExtractError> {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let bytes = std::fs::read(path).map_err(|source| ExtractError::Io {
        path: path.display().to_string(),
        source,
    })?;
    extract_bytes(&filename, bytes)
}

/// Extract from in-memory content, dispatching on the filename extension.
pub fn extract_bytes(filename: &str, bytes: Vec<u8>) -> Result<ExtractedDocument, ExtractError> {
    match supported_extension(filename).as_deref() {
        Some("pdf") => {
            let pages = pdf_extract::extract_text_from_mem_by_pages(&bytes)
                .map_err(|e| ExtractError::Pdf(e.to_string()))?;
            Ok(join_pages(filename, &pages))
        }
        Some(_) => {
            let text = String::from_utf8(bytes)?;
            Ok(ExtractedDocument {
                text,
                metadata: DocumentMetadata::new(filename),
                num_pages: None,
            })
        }
        None => Err(ExtractError::UnsupportedType(filename.to_string())),
    }
}

/// Join page texts and record where each page starts in the trimmed result.
pub fn join_pages(filename: &str, pages: &[String]) -> ExtractedDocument {
    let mut full = String::new();
    let mut raw_starts = Vec::with_capacity(pages.len());
    let mut chars_so_far = 0usize;

    for page in pages {
        full.push('\n');
        chars_so_far += 1;
        raw_starts.push(chars_so_far);
        full.push_str(page);
        chars_so_far += page.chars().count();
        full.push('\n');
        chars_so_far += 1;
    }

    let trimmed_start = full.chars().count() - full.trim_start().chars().count();
    let text = full.trim().to_string();
    let page_starts = raw_starts
        .into_iter()
        .map(|start| start.saturating_sub(trimmed_start))
        .collect();

    ExtractedDocument {
        text,
        metadata: DocumentMetadata::with_pages(filename, page_starts),
        num_pages: Some(pages.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_pages_offsets_follow_trim() {
        let pages = vec!["  First page.".to_string(), "Second page.".to_string()];
        let doc = join_pages("guide.pdf", &pages);

        assert_eq!(doc.text, "First page.\n\nSecond page.");
        assert_eq!(doc.num_pages, Some(2));
        assert_eq!(doc.metadata.page_starts, vec![0, 13]);
        assert_eq!(doc.metadata.page_at(0), Some(1));
        assert_eq!(doc.metadata.page_at(13), Some(2));
        let second: String = doc.text.chars().skip(13).collect();
        assert_eq!(second, "Second page.");
    }

    #[test]
    fn test_join_pages_empty_pages() {
        let pages = vec![String::new(), "Only content".to_string(), String::new()];
        let doc = join_pages("sparse.pdf", &pages);
        assert_eq!(doc.text, "Only content");
        assert_eq!(doc.metadata.page_at(0), Some(2));
    }

    #[test]
    fn test_plain_text_has_no_pages() {
        let doc = extract_bytes("notes.md", b"# Notes\nSome text".to_vec()).unwrap();
        assert_eq!(doc.text, "# Notes\nSome text");
        assert_eq!(doc.metadata.filename, "notes.md");
        assert!(doc.metadata.page_starts.is_empty());
        assert_eq!(doc.num_pages, None);
    }

    #[test]
    fn test_rejects_unsupported_and_invalid() {
        assert!(matches!(
            extract_bytes("slides.pptx", vec![1, 2, 3]),
            Err(ExtractError::UnsupportedType(_))
        ));
        assert!(matches!(
            extract_bytes("bad.txt", vec![0xff, 0xfe, 0xfd]),
            Err(ExtractError::Encoding(_))
        ));
        assert!(matches!(
            extract_bytes("broken.pdf", b"not a pdf".to_vec()),
            Err(ExtractError::Pdf(_))
        ));
    }

    #[test]
    fn test_supported_extension_is_case_insensitive() {
        assert_eq!(supported_extension("Guide.PDF").as_deref(), Some("pdf"));
        assert_eq!(supported_extension("readme.txt").as_deref(), Some("txt"));
        assert_eq!(supported_extension("archive.zip"), None);
        assert_eq!(supported_extension("no_extension"), None);
    }
}
