//! Knowledge retrieval over the support corpus
//!
//! The agent only depends on [`KnowledgeRetriever`]; the production
//! implementation embeds the query and ranks a prebuilt vector index.

mod corpus;
mod embedding;
mod index;

pub use corpus::load_corpus;
pub use embedding::{Embedder, EmbeddingTask, GeminiEmbedder};
pub use index::KnowledgeIndex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// A reference passage returned by the retriever
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    pub text: String,
    pub category: String,
    pub source: String,
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    /// The backend could not be reached or is not configured
    #[error("Retrieval backend unavailable: {0}")]
    Unavailable(String),
    #[error("Embedding failed: {0}")]
    Embedding(String),
    #[error("Index error: {0}")]
    Index(String),
    #[error("Corpus error: {0}")]
    Corpus(String),
}

/// Semantic search over the knowledge corpus
#[async_trait]
pub trait KnowledgeRetriever: Send + Sync {
    /// Return up to `k` passages, most similar first
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Passage>, RetrievalError>;
}

/// Embeds the query and ranks the in-memory index
pub struct VectorRetriever {
    index: KnowledgeIndex,
    embedder: Arc<dyn Embedder>,
}

impl VectorRetriever {
    pub fn new(index: KnowledgeIndex, embedder: Arc<dyn Embedder>) -> Self {
        Self { index, embedder }
    }
}

#[async_trait]
impl KnowledgeRetriever for VectorRetriever {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Passage>, RetrievalError> {
        let vector = self.embedder.embed(query, EmbeddingTask::Query).await?;
        let hits = self.index.search(&vector, k)?;
        tracing::debug!(hits = hits.len(), k, "Knowledge search complete");
        Ok(hits)
    }
}

/// Stand-in used when no index could be loaded at startup
pub struct UnavailableRetriever {
    reason: String,
}

impl UnavailableRetriever {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl KnowledgeRetriever for UnavailableRetriever {
    async fn search(&self, _query: &str, _k: usize) -> Result<Vec<Passage>, RetrievalError> {
        Err(RetrievalError::Unavailable(self.reason.clone()))
    }
}
