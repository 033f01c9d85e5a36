//! Support corpus produced by the FAQ scraper
//!
//! The corpus is a JSON array. Each record is either a question/answer pair
//! from an FAQ page or a titled paragraph from an informational page, and
//! carries a `content_hash` used for deduplication and index versioning.

use super::{Passage, RetrievalError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CorpusRecord {
    Faq {
        category: String,
        question: String,
        answer: String,
        source: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content_hash: Option<String>,
    },
    Article {
        category: String,
        title: String,
        text: String,
        source: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content_hash: Option<String>,
    },
}

impl CorpusRecord {
    /// Text that gets embedded and shown to the model as context
    pub fn passage_text(&self) -> String {
        match self {
            CorpusRecord::Faq {
                question, answer, ..
            } => format!("Question: {question}\nAnswer: {answer}"),
            CorpusRecord::Article { text, .. } => text.clone(),
        }
    }

    pub fn category(&self) -> &str {
        match self {
            CorpusRecord::Faq { category, .. } | CorpusRecord::Article { category, .. } => category,
        }
    }

    pub fn source(&self) -> &str {
        match self {
            CorpusRecord::Faq { source, .. } | CorpusRecord::Article { source, .. } => source,
        }
    }

    /// Stored hash, or SHA-256 of the record without its hash field
    pub fn content_hash(&self) -> String {
        let stored = match self {
            CorpusRecord::Faq { content_hash, .. } | CorpusRecord::Article { content_hash, .. } => {
                content_hash.as_deref()
            }
        };
        if let Some(hash) = stored.filter(|h| !h.is_empty()) {
            return hash.to_string();
        }

        let mut unhashed = self.clone();
        match &mut unhashed {
            CorpusRecord::Faq { content_hash, .. } | CorpusRecord::Article { content_hash, .. } => {
                *content_hash = None;
            }
        }
        let canonical = serde_json::to_string(&unhashed).unwrap_or_default();
        format!("{:x}", Sha256::digest(canonical.as_bytes()))
    }
}

/// A corpus record ready for indexing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub content_hash: String,
    pub passage: Passage,
}

impl From<&CorpusRecord> for Document {
    fn from(record: &CorpusRecord) -> Self {
        Self {
            content_hash: record.content_hash(),
            passage: Passage {
                text: record.passage_text(),
                category: record.category().to_string(),
                source: record.source().to_string(),
            },
        }
    }
}

/// Parse corpus JSON, dropping duplicate records (same content hash)
pub fn parse_corpus(json: &str) -> Result<Vec<Document>, RetrievalError> {
    let records: Vec<CorpusRecord> =
        serde_json::from_str(json).map_err(|e| RetrievalError::Corpus(e.to_string()))?;

    let mut seen = HashSet::new();
    let mut documents = Vec::with_capacity(records.len());
    for record in &records {
        let doc = Document::from(record);
        if seen.insert(doc.content_hash.clone()) {
            documents.push(doc);
        }
    }

    let dropped = records.len() - documents.len();
    if dropped > 0 {
        tracing::info!(dropped, "Dropped duplicate corpus records");
    }
    Ok(documents)
}

/// Load and parse the corpus file
pub fn load_corpus(path: &Path) -> Result<Vec<Document>, RetrievalError> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| RetrievalError::Corpus(format!("{}: {e}", path.display())))?;
    parse_corpus(&json)
}
