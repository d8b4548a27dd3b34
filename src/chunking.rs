use serde::Serialize;

use crate::document::DocumentPage;

/// Maximum chunk length in characters.
pub const CHUNK_SIZE: usize = 1000;
/// Characters shared between adjacent chunks.
pub const CHUNK_OVERLAP: usize = 400;

/// Origin of a chunk, stored alongside it and echoed back as a citation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkMetadata {
    /// Path of the file the chunk came from.
    pub source: String,
    /// Zero-based page number within that file.
    pub page: usize,
}

/// A contiguous slice of one page's text.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChunk {
    pub content: String,
    pub metadata: ChunkMetadata,
}

/// Split text into fixed-size windows that overlap by `CHUNK_OVERLAP`.
/// Whitespace-only windows are dropped. Boundaries are measured in
/// characters, not bytes, so multi-byte text never splits mid-character.
pub fn split_text(text: &str) -> Vec<String> {
    split_with(text, CHUNK_SIZE, CHUNK_OVERLAP)
}

fn split_with(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }

    let step = size - overlap;
    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        let end = (start + size).min(chars.len());
        let chunk: String = chars[start..end].iter().collect();
        if !chunk.trim().is_empty() {
            chunks.push(chunk);
        }
        if end == chars.len() {
            break;
        }
        start += step;
    }

    chunks
}

/// Chunk every page of a document, tagging each chunk with its origin.
/// Chunks never span page boundaries.
pub fn chunk_pages(pages: &[DocumentPage], source: &str) -> Vec<DocumentChunk> {
    let mut chunks = Vec::new();
    for page in pages {
        for content in split_text(&page.text) {
            chunks.push(DocumentChunk {
                content,
                metadata: ChunkMetadata {
                    source: source.to_string(),
                    page: page.number,
                },
            });
        }
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(number: usize, text: &str) -> DocumentPage {
        DocumentPage {
            number,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = split_text("hello world");
        assert_eq!(chunks, vec!["hello world".to_string()]);
    }

    #[test]
    fn test_empty_text_no_chunks() {
        assert!(split_text("").is_empty());
        assert!(split_text("   \n\n  ").is_empty());
    }

    #[test]
    fn test_chunks_respect_size_limit() {
        let text: String = (0..2500).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let chunks = split_text(&text);

        // Windows start at 0, 600, 1200, 1800.
        assert_eq!(chunks.len(), 4);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= CHUNK_SIZE);
        }
        assert_eq!(chunks[3].chars().count(), 700);
    }

    #[test]
    fn test_adjacent_chunks_overlap() {
        let text: String = (0..2500).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let chunks = split_text(&text);

        for pair in chunks.windows(2) {
            let tail: String = pair[0].chars().skip(CHUNK_SIZE - CHUNK_OVERLAP).collect();
            let head: String = pair[1].chars().take(CHUNK_OVERLAP).collect();
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn test_multibyte_text_splits_on_char_boundaries() {
        let text: String = "日本語のテキスト。".chars().cycle().take(1500).collect();
        let chunks = split_text(&text);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chars().count(), CHUNK_SIZE);
        assert_eq!(chunks[1].chars().count(), 900);
    }

    #[test]
    fn test_chunk_pages_tags_origin() {
        let pages = vec![page(0, "first page text"), page(1, "second page text")];
        let chunks = chunk_pages(&pages, "report.pdf");

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content, "first page text");
        assert_eq!(chunks[0].metadata.source, "report.pdf");
        assert_eq!(chunks[0].metadata.page, 0);
        assert_eq!(chunks[1].metadata.page, 1);
    }

    #[test]
    fn test_blank_pages_yield_nothing() {
        let pages = vec![page(0, ""), page(1, "content")];
        let chunks = chunk_pages(&pages, "report.pdf");

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].metadata.page, 1);
    }
}
