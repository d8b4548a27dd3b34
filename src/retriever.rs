use std::sync::Arc;

use thiserror::Error;

use crate::providers::EmbeddingProvider;
use crate::vector_store::{RetrievedChunk, VectorStore};

#[derive(Debug, Error)]
pub enum RetrieveError {
    #[error("collection {0} does not exist")]
    CollectionMissing(String),
    #[error("query embedding failed: {0}")]
    Embedding(anyhow::Error),
    #[error("vector search failed: {0}")]
    Store(anyhow::Error),
}

/// Embeds a query and finds the closest stored chunks.
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: Arc<dyn VectorStore>) -> Self {
        Retriever { embedder, store }
    }

    /// Return the `top_k` chunks most similar to the query. The collection
    /// is checked before the query is embedded, so a missing collection
    /// never costs an embedding call.
    pub async fn search(
        &self,
        query: &str,
        collection_id: &str,
        top_k: u64,
    ) -> Result<Vec<RetrievedChunk>, RetrieveError> {
        let exists = self
            .store
            .collection_exists(collection_id)
            .await
            .map_err(RetrieveError::Store)?;
        if !exists {
            return Err(RetrieveError::CollectionMissing(collection_id.to_string()));
        }

        let vector = self
            .embedder
            .embed(query)
            .await
            .map_err(RetrieveError::Embedding)?;

        self.store
            .search(collection_id, vector, top_k)
            .await
            .map_err(RetrieveError::Store)
    }
}
