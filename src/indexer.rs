use std::sync::Arc;

use log::info;
use thiserror::Error;

use crate::chunking;
use crate::document::{self, DocumentPage};
use crate::providers::EmbeddingProvider;
use crate::vector_store::{EmbeddedChunk, VectorStore};

/// Outcome of a successful indexing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexReport {
    pub pages: usize,
    pub chunks_indexed: usize,
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("document has no extractable pages")]
    EmptyDocument,
    #[error("text extraction failed: {0}")]
    Extraction(anyhow::Error),
    #[error("embedding failed: {0}")]
    Embedding(anyhow::Error),
    #[error("vector store write failed: {0}")]
    VectorStore(anyhow::Error),
}

/// Runs the extract, chunk, embed, store pipeline for one document.
pub struct DocumentIndexer {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
}

impl DocumentIndexer {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: Arc<dyn VectorStore>) -> Self {
        DocumentIndexer { embedder, store }
    }

    /// Index a PDF file into the given collection. Extraction runs on a
    /// blocking thread; nothing is written when any step fails.
    pub async fn index(&self, file_path: &str, collection_id: &str) -> Result<IndexReport, IndexError> {
        let path = file_path.to_string();
        let pages = tokio::task::spawn_blocking(move || document::load_pdf_pages(&path))
            .await
            .map_err(|e| IndexError::Extraction(anyhow::anyhow!(e)))?
            .map_err(IndexError::Extraction)?;

        self.index_pages(&pages, file_path, collection_id).await
    }

    /// Chunk, embed, and store already-extracted pages. A document whose
    /// pages produce no chunks still succeeds, with nothing written.
    pub async fn index_pages(
        &self,
        pages: &[DocumentPage],
        source: &str,
        collection_id: &str,
    ) -> Result<IndexReport, IndexError> {
        if pages.is_empty() {
            return Err(IndexError::EmptyDocument);
        }

        let chunks = chunking::chunk_pages(pages, source);
        info!("Split {} pages into {} chunks", pages.len(), chunks.len());

        if chunks.is_empty() {
            return Ok(IndexReport {
                pages: pages.len(),
                chunks_indexed: 0,
            });
        }

        let mut embedded = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let vector = self
                .embedder
                .embed(&chunk.content)
                .await
                .map_err(IndexError::Embedding)?;
            embedded.push(EmbeddedChunk {
                content: chunk.content,
                vector,
                metadata: chunk.metadata,
            });
        }

        let count = embedded.len();
        self.store
            .upsert(collection_id, embedded)
            .await
            .map_err(IndexError::VectorStore)?;
        info!("Indexed {} chunks into collection {}", count, collection_id);

        Ok(IndexReport {
            pages: pages.len(),
            chunks_indexed: count,
        })
    }
}
