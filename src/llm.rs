//! LLM provider abstraction
//!
//! Provides a common interface for the language model used by the router
//! and the reply generators.

mod error;
mod gemini;
mod models;
mod registry;
mod types;

pub use error::LlmError;
pub use registry::{LlmConfig, ModelRegistry};
pub use types::*;

use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;

/// Common interface for LLM providers
#[async_trait]
pub trait LlmService: Send + Sync {
    /// Make a single, non-streamed completion request
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError>;

    /// Make a completion request and receive the output incrementally
    async fn stream(&self, request: &LlmRequest) -> Result<TextStream, LlmError>;

    /// Get the model ID
    fn model_id(&self) -> &str;
}

/// Logging wrapper for LLM services
pub struct LoggingService {
    inner: Arc<dyn LlmService>,
    model_id: String,
}

impl LoggingService {
    pub fn new(inner: Arc<dyn LlmService>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

#[async_trait]
impl LlmService for LoggingService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let start = std::time::Instant::now();
        let result = self.inner.complete(request).await;
        let duration = start.elapsed();

        match &result {
            Ok(response) => {
                tracing::info!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    input_tokens = response.usage.input_tokens,
                    output_tokens = response.usage.output_tokens,
                    "LLM request completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    retryable = e.kind.is_retryable(),
                    "LLM request failed"
                );
            }
        }

        result
    }

    async fn stream(&self, request: &LlmRequest) -> Result<TextStream, LlmError> {
        let start = std::time::Instant::now();
        let model_id = self.model_id.clone();

        let inner = match self.inner.stream(request).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(
                    model = %model_id,
                    error = %e.message,
                    retryable = e.kind.is_retryable(),
                    "LLM stream failed to start"
                );
                return Err(e);
            }
        };

        let mut fragments = 0usize;
        let logged = inner
            .inspect(move |item| match item {
                Ok(_) => fragments += 1,
                Err(e) => tracing::error!(
                    model = %model_id,
                    duration_ms = %start.elapsed().as_millis(),
                    fragments,
                    error = %e.message,
                    "LLM stream interrupted"
                ),
            })
            .boxed();

        Ok(logged)
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
