//! LLM integration for AI Hospital.
//!
//! The consultation only needs plain text completions, so there is a single
//! backend: an OpenAI-compatible chat-completions endpoint (Groq by default).
//! The `LlmProvider` trait is the seam tests stub out.

pub mod openai_compat;
pub mod provider;

pub use openai_compat::OpenAiCompatProvider;
pub use provider::*;

use std::sync::Arc;

use crate::config::ServiceConfig;
use crate::error::LlmError;

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_url: String,
    pub api_key: secrecy::SecretString,
    pub model: String,
}

impl From<&ServiceConfig> for LlmConfig {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        }
    }
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    if !config.api_url.starts_with("http://") && !config.api_url.starts_with("https://") {
        return Err(LlmError::RequestFailed {
            provider: "openai_compat".to_string(),
            reason: format!("API URL must be http(s): {}", config.api_url),
        });
    }

    tracing::info!("Using chat completions at {} (model: {})", config.api_url, config.model);
    Ok(Arc::new(OpenAiCompatProvider::new(
        &config.api_url,
        config.api_key.clone(),
        &config.model,
    )))
}
