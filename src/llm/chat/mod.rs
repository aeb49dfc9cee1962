pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use serde::Deserialize;
use std::error::Error as StdError;
use std::sync::Arc;
use super::{ LlmConfig, LlmType };
use self::ollama::OllamaClient;
use self::openai::OpenAIChatClient;
use crate::models::chat::ChatMessage;

#[derive(Deserialize, Debug, Clone)]
pub struct CompletionResponse {
    pub response: String,
}

/// Error body most OpenAI-compatible endpoints return on failure.
#[derive(Deserialize, Debug)]
pub(crate) struct ApiErrorBody {
    pub error: ApiErrorDetail,
}

#[derive(Deserialize, Debug)]
pub(crate) struct ApiErrorDetail {
    pub message: String,
}

/// Turns a non-2xx response into an error carrying the provider's message
/// when one is present.
pub(crate) async fn error_from_response(
    provider: &str,
    resp: reqwest::Response
) -> Box<dyn StdError + Send + Sync> {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    provider_error_message(provider, status, &body).into()
}

pub(crate) fn provider_error_message(provider: &str, status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) => format!("{} API error ({}): {}", provider, status, parsed.error.message),
        Err(_) => format!("{} API request failed with status {}", provider, status),
    }
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Sends the ordered message list and returns the first choice.
    async fn chat(
        &self,
        messages: &[ChatMessage]
    ) -> Result<CompletionResponse, Box<dyn StdError + Send + Sync>>;

    fn get_model(&self) -> String;
    fn get_base_url(&self) -> Option<String>;
}

pub fn new_client(
    config: &LlmConfig
) -> Result<Arc<dyn ChatClient>, Box<dyn StdError + Send + Sync>> {
    let client: Arc<dyn ChatClient> = match config.llm_type {
        LlmType::Ollama => {
            let specific_client = OllamaClient::from_config(config)?;
            Arc::new(specific_client)
        }
        LlmType::OpenAI => {
            let specific_client = OpenAIChatClient::from_config(config)?;
            Arc::new(specific_client)
        }
    };
    Ok(client)
}
