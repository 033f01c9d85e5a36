//! In-memory vector index with brute-force cosine similarity search.
//!
//! The corpus is a few hundred passages, so a linear scan is fine. The index
//! is persisted as JSON next to the corpus so the server never re-embeds on
//! startup.

use super::corpus::Document;
use super::embedding::{Embedder, EmbeddingTask};
use super::{Passage, RetrievalError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// One embedded passage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub content_hash: String,
    pub passage: Passage,
    pub embedding: Vec<f32>,
}

/// Outcome of an index build
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub embedded: usize,
    pub reused: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeIndex {
    /// Embedding model that produced the vectors
    pub model: String,
    entries: Vec<IndexEntry>,
}

impl KnowledgeIndex {
    pub fn from_entries(model: impl Into<String>, entries: Vec<IndexEntry>) -> Self {
        Self {
            model: model.into(),
            entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn load(path: &Path) -> Result<Self, RetrievalError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| RetrievalError::Unavailable(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&json).map_err(|e| RetrievalError::Index(e.to_string()))
    }

    pub fn save(&self, path: &Path) -> Result<(), RetrievalError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RetrievalError::Index(e.to_string()))?;
        }
        let json = serde_json::to_string(self).map_err(|e| RetrievalError::Index(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| RetrievalError::Index(e.to_string()))
    }

    /// Embed `documents` in order. Vectors from `previous` are reused for
    /// unchanged content when it was built with the same model.
    pub async fn build(
        documents: &[Document],
        embedder: &dyn Embedder,
        previous: Option<&KnowledgeIndex>,
    ) -> Result<(Self, BuildStats), RetrievalError> {
        let reusable: HashMap<&str, &IndexEntry> = previous
            .filter(|p| p.model == embedder.model_id())
            .map(|p| {
                p.entries
                    .iter()
                    .map(|e| (e.content_hash.as_str(), e))
                    .collect()
            })
            .unwrap_or_default();

        let mut stats = BuildStats::default();
        let mut entries = Vec::with_capacity(documents.len());
        for doc in documents {
            let embedding = if let Some(existing) = reusable.get(doc.content_hash.as_str()) {
                stats.reused += 1;
                existing.embedding.clone()
            } else {
                stats.embedded += 1;
                embedder
                    .embed(&doc.passage.text, EmbeddingTask::Document)
                    .await?
            };
            entries.push(IndexEntry {
                content_hash: doc.content_hash.clone(),
                passage: doc.passage.clone(),
                embedding,
            });
        }

        Ok((Self::from_entries(embedder.model_id(), entries), stats))
    }

    /// Top-k passages by descending cosine similarity. Ties keep corpus order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Passage>, RetrievalError> {
        if query.is_empty() {
            return Err(RetrievalError::Embedding("empty query vector".to_string()));
        }

        let mut scored: Vec<(f64, &IndexEntry)> = self
            .entries
            .iter()
            .map(|entry| (cosine_similarity(query, &entry.embedding), entry))
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(scored.into_iter().map(|(_, e)| e.passage.clone()).collect())
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 on length mismatch or if either vector has zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| f64::from(*x) * f64::from(*y))
        .sum();

    let mag_a: f64 = a.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}
