use std::sync::Arc;

use log::{debug, warn};

use crate::providers::{ChatMessage, ChatModel};
use crate::retriever::{RetrieveError, Retriever};
use crate::vector_store::RetrievedChunk;

const RAG_SYSTEM_PROMPT: &str = "You are a helpful assistant that answers questions based on the provided context. \nBe concise and cite the documents when relevant. If context doesn't help, say so.";

const SIMPLE_SYSTEM_PROMPT: &str = "You are a helpful assistant. Be concise.";

const NO_CONTEXT: &str = "No relevant documents found.";

/// Number of prior turns forwarded to the model.
const HISTORY_WINDOW: usize = 10;
/// Chunks retrieved per question.
const RAG_TOP_K: u64 = 4;

/// Assistant reply plus the serialized metadata of the chunks behind it.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub content: String,
    /// JSON array of chunk metadata, `"[]"` when retrieval found nothing.
    pub sources: String,
}

/// Answers questions, grounding them in a document collection when the
/// conversation has one attached.
pub struct ChatEngine {
    model: Arc<dyn ChatModel>,
    retriever: Retriever,
}

impl ChatEngine {
    pub fn new(model: Arc<dyn ChatModel>, retriever: Retriever) -> Self {
        ChatEngine { model, retriever }
    }

    /// Produce a reply for the query. This never fails: retrieval problems
    /// degrade to an answer without context, and model failures come back
    /// as a conversational "Error: ..." reply so the caller can persist
    /// the turn unconditionally.
    pub async fn respond(
        &self,
        query: &str,
        collection_id: Option<&str>,
        history: &[ChatMessage],
    ) -> ChatReply {
        match collection_id {
            Some(collection) => self.respond_with_context(query, collection, history).await,
            None => self.respond_simple(query, history).await,
        }
    }

    async fn respond_with_context(
        &self,
        query: &str,
        collection: &str,
        history: &[ChatMessage],
    ) -> ChatReply {
        let chunks = match self.retriever.search(query, collection, RAG_TOP_K).await {
            Ok(chunks) => chunks,
            Err(RetrieveError::CollectionMissing(name)) => {
                debug!("Collection {} does not exist yet, answering without context", name);
                Vec::new()
            }
            Err(err) => {
                warn!("Retrieval failed: {}", err);
                Vec::new()
            }
        };

        let context = format_context(&chunks);

        let mut messages = vec![ChatMessage::system(RAG_SYSTEM_PROMPT)];
        messages.extend_from_slice(trim_history(history));
        messages.push(ChatMessage::user(format!(
            "Context:\n{}\n\nQuestion: {}",
            context, query
        )));

        match self.model.complete(&messages).await {
            Ok(content) => ChatReply {
                content,
                sources: serialize_sources(&chunks),
            },
            Err(err) => ChatReply {
                content: format!("Error: {}", err),
                sources: "[]".to_string(),
            },
        }
    }

    async fn respond_simple(&self, query: &str, history: &[ChatMessage]) -> ChatReply {
        let mut messages = vec![ChatMessage::system(SIMPLE_SYSTEM_PROMPT)];
        messages.extend_from_slice(trim_history(history));
        messages.push(ChatMessage::user(query));

        match self.model.complete(&messages).await {
            Ok(content) => ChatReply {
                content,
                sources: "[]".to_string(),
            },
            Err(err) => ChatReply {
                content: format!("Error: {}", err),
                sources: "[]".to_string(),
            },
        }
    }
}

/// Number the retrieved chunks so the model can cite them.
fn format_context(chunks: &[RetrievedChunk]) -> String {
    if chunks.is_empty() {
        return NO_CONTEXT.to_string();
    }
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| format!("[{}]: {}", i + 1, chunk.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn trim_history(history: &[ChatMessage]) -> &[ChatMessage] {
    let start = history.len().saturating_sub(HISTORY_WINDOW);
    &history[start..]
}

fn serialize_sources(chunks: &[RetrievedChunk]) -> String {
    if chunks.is_empty() {
        return "[]".to_string();
    }
    let metadata: Vec<_> = chunks.iter().map(|chunk| &chunk.metadata).collect();
    serde_json::to_string(&metadata).unwrap_or_else(|_| "[]".to_string())
}
