//! Model registry for the configured language model

use super::models::all_models;
use super::{LlmService, LoggingService};
use std::collections::HashMap;
use std::sync::Arc;

const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Configuration for LLM providers
#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    pub google_api_key: Option<String>,
    /// Gateway URL; when set the gateway handles authentication
    pub gateway: Option<String>,
    /// Default model ID
    pub default_model: Option<String>,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self {
            google_api_key: std::env::var("GOOGLE_API_KEY").ok(),
            gateway: std::env::var("LLM_GATEWAY").ok(),
            default_model: std::env::var("GEMINI_MODEL").ok(),
        }
    }

    /// Key used for both generation and embeddings
    pub fn api_key(&self) -> Option<String> {
        if self.gateway.is_some() {
            Some("implicit".to_string())
        } else {
            self.google_api_key.clone().filter(|k| !k.is_empty())
        }
    }
}

/// Registry of available LLM models
pub struct ModelRegistry {
    services: HashMap<String, Arc<dyn LlmService>>,
    default_model: String,
}

impl ModelRegistry {
    pub fn new(config: &LlmConfig) -> Self {
        let mut services: HashMap<String, Arc<dyn LlmService>> = HashMap::new();

        if let Some(api_key) = config.api_key() {
            for model_def in all_models() {
                match (model_def.factory)(&api_key, config.gateway.as_deref()) {
                    Ok(service) => {
                        tracing::debug!(
                            model = model_def.id,
                            description = model_def.description,
                            "Registered model"
                        );
                        services.insert(
                            model_def.id.to_string(),
                            Arc::new(LoggingService::new(service)),
                        );
                    }
                    Err(e) => {
                        tracing::warn!(model = model_def.id, error = %e, "Skipping model");
                    }
                }
            }
        }

        let default_model = config
            .default_model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        Self {
            services,
            default_model,
        }
    }

    /// Get a model by ID
    pub fn get(&self, model_id: &str) -> Option<Arc<dyn LlmService>> {
        self.services.get(model_id).cloned()
    }

    /// Get the default model
    pub fn default(&self) -> Option<Arc<dyn LlmService>> {
        self.get(&self.default_model)
    }

    /// Get the default model ID
    pub fn default_model_id(&self) -> &str {
        &self.default_model
    }

    /// List all available model IDs
    pub fn available_models(&self) -> Vec<String> {
        let mut models: Vec<_> = self.services.keys().cloned().collect();
        models.sort();
        models
    }

    /// Check if any models are available
    pub fn has_models(&self) -> bool {
        !self.services.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_api_keys_no_models() {
        let registry = ModelRegistry::new(&LlmConfig::default());
        assert!(!registry.has_models());
        assert!(registry.default().is_none());
    }

    #[test]
    fn test_api_key_enables_all_models() {
        let config = LlmConfig {
            google_api_key: Some("test-key".to_string()),
            ..Default::default()
        };
        let registry = ModelRegistry::new(&config);
        assert_eq!(
            registry.available_models(),
            vec!["gemini-2.5-flash".to_string(), "gemini-2.5-pro".to_string()]
        );
        assert_eq!(registry.default_model_id(), "gemini-2.5-flash");
        assert!(registry.default().is_some());
    }

    #[test]
    fn test_empty_key_is_ignored() {
        let config = LlmConfig {
            google_api_key: Some(String::new()),
            ..Default::default()
        };
        assert!(!ModelRegistry::new(&config).has_models());
    }

    #[test]
    fn test_gateway_uses_implicit_key() {
        let config = LlmConfig {
            gateway: Some("https://example.com".to_string()),
            ..Default::default()
        };
        assert_eq!(config.api_key().as_deref(), Some("implicit"));
        assert!(ModelRegistry::new(&config).has_models());
    }

    #[test]
    fn test_custom_default_model() {
        let config = LlmConfig {
            google_api_key: Some("test-key".to_string()),
            default_model: Some("gemini-2.5-pro".to_string()),
            ..Default::default()
        };
        let registry = ModelRegistry::new(&config);
        assert_eq!(registry.default_model_id(), "gemini-2.5-pro");
        assert_eq!(registry.default().unwrap().model_id(), "gemini-2.5-pro");
    }
}
