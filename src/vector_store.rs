use std::collections::HashMap;
use std::env;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::info;
use qdrant_client::qdrant::{
    CreateCollectionBuilder, Distance, PointStruct, SearchPointsBuilder, UpsertPointsBuilder,
    Value, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use serde_json::json;
use uuid::Uuid;

use crate::chunking::ChunkMetadata;

/// A chunk ready for storage, with its embedding vector.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub content: String,
    pub vector: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// A chunk returned from a similarity search.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub content: String,
    pub metadata: ChunkMetadata,
}

/// Storage for embedded chunks, one collection per document set.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Store chunks in a collection, creating it on first write.
    async fn upsert(&self, collection: &str, chunks: Vec<EmbeddedChunk>) -> Result<()>;

    /// Return the `limit` chunks most similar to the query vector.
    async fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
    ) -> Result<Vec<RetrievedChunk>>;

    async fn collection_exists(&self, collection: &str) -> Result<bool>;

    async fn delete_collection(&self, collection: &str) -> Result<()>;
}

/// Configuration for the Qdrant connection.
#[derive(Debug, Clone)]
pub struct QdrantConfig {
    pub url: String,
    pub api_key: Option<String>,
}

impl QdrantConfig {
    /// Create a new configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let url = env::var("QDRANT_URL").unwrap_or_else(|_| "http://localhost:6334".to_string());
        let api_key = env::var("QDRANT_API_KEY").ok();
        Ok(QdrantConfig { url, api_key })
    }
}

/// Qdrant-backed store. Collections are created lazily with the
/// dimension of the first vector written to them.
pub struct QdrantStore {
    client: Qdrant,
}

impl QdrantStore {
    pub fn new(config: QdrantConfig) -> Result<Self> {
        let mut builder = Qdrant::from_url(&config.url);
        if let Some(api_key) = config.api_key {
            builder = builder.api_key(api_key);
        }
        let client = builder
            .build()
            .with_context(|| format!("Failed to connect to Qdrant at {}", config.url))?;
        Ok(QdrantStore { client })
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn upsert(&self, collection: &str, chunks: Vec<EmbeddedChunk>) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        if !self.client.collection_exists(collection).await? {
            let vector_size = chunks[0].vector.len() as u64;
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(collection)
                        .vectors_config(VectorParamsBuilder::new(vector_size, Distance::Cosine)),
                )
                .await
                .with_context(|| format!("Failed to create collection: {}", collection))?;
            info!("Created collection {} ({} dimensions)", collection, vector_size);
        }

        let points: Vec<PointStruct> = chunks
            .into_iter()
            .map(|chunk| {
                let payload = point_payload(&chunk);
                PointStruct::new(Uuid::new_v4().to_string(), chunk.vector, payload)
            })
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points))
            .await
            .with_context(|| format!("Failed to upsert points into: {}", collection))?;

        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
    ) -> Result<Vec<RetrievedChunk>> {
        let response = self
            .client
            .search_points(SearchPointsBuilder::new(collection, vector, limit).with_payload(true))
            .await
            .with_context(|| format!("Failed to search collection: {}", collection))?;

        Ok(response
            .result
            .into_iter()
            .filter_map(|point| chunk_from_payload(&point.payload))
            .collect())
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        Ok(self.client.collection_exists(collection).await?)
    }

    async fn delete_collection(&self, collection: &str) -> Result<()> {
        self.client
            .delete_collection(collection)
            .await
            .with_context(|| format!("Failed to delete collection: {}", collection))?;
        info!("Deleted collection {}", collection);
        Ok(())
    }
}

fn point_payload(chunk: &EmbeddedChunk) -> HashMap<String, Value> {
    serde_json::from_value(json!({
        "content": chunk.content,
        "source": chunk.metadata.source,
        "page": chunk.metadata.page,
    }))
    .unwrap()
}

fn chunk_from_payload(payload: &HashMap<String, Value>) -> Option<RetrievedChunk> {
    let content = payload.get("content")?.as_str()?.to_string();
    let source = payload
        .get("source")
        .and_then(|v| v.as_str())
        .map(|s| s.as_str())
        .unwrap_or_default()
        .to_string();
    let page = payload
        .get("page")
        .and_then(|v| v.as_integer())
        .unwrap_or(0) as usize;

    Some(RetrievedChunk {
        content,
        metadata: ChunkMetadata { source, page },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(content: &str, source: &str, page: usize) -> EmbeddedChunk {
        EmbeddedChunk {
            content: content.to_string(),
            vector: vec![0.1, 0.2, 0.3],
            metadata: ChunkMetadata {
                source: source.to_string(),
                page,
            },
        }
    }

    #[test]
    fn test_payload_round_trip() {
        let embedded = chunk("chunk text", "report.pdf", 4);
        let payload = point_payload(&embedded);
        let retrieved = chunk_from_payload(&payload).unwrap();

        assert_eq!(retrieved.content, "chunk text");
        assert_eq!(retrieved.metadata.source, "report.pdf");
        assert_eq!(retrieved.metadata.page, 4);
    }

    #[test]
    fn test_payload_without_content_is_skipped() {
        let payload: HashMap<String, Value> =
            serde_json::from_value(json!({ "source": "report.pdf", "page": 1 })).unwrap();
        assert!(chunk_from_payload(&payload).is_none());
    }

    #[test]
    fn test_payload_missing_metadata_defaults() {
        let payload: HashMap<String, Value> =
            serde_json::from_value(json!({ "content": "text" })).unwrap();
        let retrieved = chunk_from_payload(&payload).unwrap();

        assert_eq!(retrieved.metadata.source, "");
        assert_eq!(retrieved.metadata.page, 0);
    }

    // Requires a Qdrant instance on localhost:6334.
    #[tokio::test]
    #[ignore]
    async fn test_qdrant_round_trip() {
        let store = QdrantStore::new(QdrantConfig {
            url: "http://localhost:6334".to_string(),
            api_key: None,
        })
        .unwrap();

        let collection = format!("test-{}", Uuid::new_v4());
        store
            .upsert(&collection, vec![chunk("hello vectors", "a.pdf", 0)])
            .await
            .unwrap();
        assert!(store.collection_exists(&collection).await.unwrap());

        let results = store
            .search(&collection, vec![0.1, 0.2, 0.3], 1)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "hello vectors");

        store.delete_collection(&collection).await.unwrap();
        assert!(!store.collection_exists(&collection).await.unwrap());
    }
}
