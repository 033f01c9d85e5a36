//! Centralized model definitions
//!
//! All supported models live here so the registry can validate
//! configuration against a single list.

use super::gemini::{GeminiModel, GeminiService};
use super::LlmService;
use std::sync::Arc;

/// Model definition with metadata
#[derive(Debug, Clone)]
pub struct ModelDef {
    /// User-facing model ID (e.g., "gemini-2.5-flash")
    pub id: &'static str,
    /// Human-readable description
    pub description: &'static str,
    /// Factory function to create the service
    pub factory: fn(&str, Option<&str>) -> Result<Arc<dyn LlmService>, String>,
}

/// Get all available model definitions
pub fn all_models() -> &'static [ModelDef] {
    &[
        ModelDef {
            id: "gemini-2.5-flash",
            description: "Gemini 2.5 Flash (fast, used for routing and replies)",
            factory: |api_key, gateway| {
                if api_key.is_empty() {
                    return Err("gemini-2.5-flash requires GOOGLE_API_KEY or gateway".to_string());
                }
                GeminiService::new(api_key.to_string(), GeminiModel::Gemini25Flash, gateway)
                    .map(|s| Arc::new(s) as Arc<dyn LlmService>)
                    .map_err(|e| e.message)
            },
        },
        ModelDef {
            id: "gemini-2.5-pro",
            description: "Gemini 2.5 Pro (more capable, slower)",
            factory: |api_key, gateway| {
                if api_key.is_empty() {
                    return Err("gemini-2.5-pro requires GOOGLE_API_KEY or gateway".to_string());
                }
                GeminiService::new(api_key.to_string(), GeminiModel::Gemini25Pro, gateway)
                    .map(|s| Arc::new(s) as Arc<dyn LlmService>)
                    .map_err(|e| e.message)
            },
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_ids_unique() {
        let models = all_models();
        for (i, a) in models.iter().enumerate() {
            for b in &models[i + 1..] {
                assert_ne!(a.id, b.id);
            }
        }
    }

    #[test]
    fn test_factory_rejects_empty_key() {
        for model in all_models() {
            assert!((model.factory)("", None).is_err());
            assert!((model.factory)("key", None).is_ok());
        }
    }
}
