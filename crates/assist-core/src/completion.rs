//! Remote completion service interface

use std::time::Duration;

use async_trait::async_trait;

use crate::chat::{CompletionRequest, CompletionResponse};
use crate::config::{Config, ProviderKind};
use crate::error::{AgentError, AgentResult};
use crate::gemini::GeminiClient;
use crate::ollama::OllamaClient;

/// A hosted model that turns a transcript into the next reply.
///
/// Implementations own the wire format, including how tool directives are
/// encoded; callers only see [`CompletionResponse`].
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> AgentResult<CompletionResponse>;
}

/// Build an HTTP client with the configured request timeout
pub(crate) fn http_client(timeout_secs: u64) -> AgentResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| AgentError::Config(format!("Failed to create HTTP client: {}", e)))
}

/// Create the provider selected in the configuration
pub fn build_service(config: &Config, api_key: Option<String>) -> AgentResult<Box<dyn CompletionService>> {
    let settings = &config.provider;

    match settings.kind {
        ProviderKind::Gemini => {
            let key = api_key.ok_or_else(|| {
                AgentError::Config(format!("{} not found", settings.api_key_env))
            })?;
            let client = GeminiClient::new(&settings.gemini_base_url, key, settings.request_timeout_secs)?;
            Ok(Box::new(client))
        }
        ProviderKind::Ollama => {
            let client = OllamaClient::new(&settings.ollama_url, settings.request_timeout_secs)?;
            Ok(Box::new(client))
        }
    }
}
