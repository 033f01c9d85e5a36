//! Text embedding client

use super::RetrievalError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What the vector will be used for; Gemini tunes embeddings per task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingTask {
    Document,
    Query,
}

impl EmbeddingTask {
    fn api_name(self) -> &'static str {
        match self {
            EmbeddingTask::Document => "RETRIEVAL_DOCUMENT",
            EmbeddingTask::Query => "RETRIEVAL_QUERY",
        }
    }
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str, task: EmbeddingTask) -> Result<Vec<f32>, RetrievalError>;

    /// Identifies the vector space; indexes built with another model are rejected
    fn model_id(&self) -> &str;
}

/// Gemini `embedContent` client
pub struct GeminiEmbedder {
    client: Client,
    api_key: String,
    url: String,
    model: String,
}

impl GeminiEmbedder {
    pub const DEFAULT_MODEL: &'static str = "models/embedding-001";

    pub fn new(api_key: String, gateway: Option<&str>) -> Result<Self, RetrievalError> {
        let model = Self::DEFAULT_MODEL.to_string();
        let url = match gateway {
            Some(gw) => format!(
                "{}/gemini/v1beta/{model}:embedContent",
                gw.trim_end_matches('/')
            ),
            None => format!("https://generativelanguage.googleapis.com/v1beta/{model}:embedContent"),
        };
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| RetrievalError::Embedding(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key,
            url,
            model,
        })
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    async fn embed(&self, text: &str, task: EmbeddingTask) -> Result<Vec<f32>, RetrievalError> {
        let body = EmbedRequest {
            model: &self.model,
            content: EmbedContent {
                parts: vec![EmbedPart { text }],
            },
            task_type: task.api_name(),
        };

        let mut request = self.client.post(&self.url).json(&body);
        if !self.api_key.starts_with("implicit") {
            request = request.query(&[("key", self.api_key.as_str())]);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                RetrievalError::Unavailable(e.to_string())
            } else {
                RetrievalError::Embedding(e.to_string())
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RetrievalError::Unavailable(format!("Failed to read response: {e}")))?;

        if status.is_server_error() {
            return Err(RetrievalError::Unavailable(format!("HTTP {status}: {body}")));
        }
        if !status.is_success() {
            return Err(RetrievalError::Embedding(format!("HTTP {status}: {body}")));
        }

        let parsed: EmbedResponse = serde_json::from_str(&body)
            .map_err(|e| RetrievalError::Embedding(format!("Failed to parse response: {e}")))?;
        Ok(parsed.embedding.values)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    model: &'a str,
    content: EmbedContent<'a>,
    task_type: &'static str,
}

#[derive(Debug, Serialize)]
struct EmbedContent<'a> {
    parts: Vec<EmbedPart<'a>>,
}

#[derive(Debug, Serialize)]
struct EmbedPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbedValues,
}

#[derive(Debug, Deserialize)]
struct EmbedValues {
    values: Vec<f32>,
}
