use async_trait::async_trait;
use rllm::{ builder::{ LLMBackend, LLMBuilder }, LLMProvider };
use std::error::Error as StdError;

use super::{ EmbeddingClient, EmbeddingResponse };
use crate::llm::{ LlmConfig, LlmType };

const OPENAI_DEFAULT_MODEL: &str = "text-embedding-ada-002";
const OLLAMA_DEFAULT_MODEL: &str = "nomic-embed-text";
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

/// Embedding adapter over the rllm provider builder; one instance serves
/// both corpus ingestion and per-turn query embedding.
pub struct RllmEmbeddingClient {
    llm: Box<dyn LLMProvider + Send + Sync>,
    provider: &'static str,
}

impl RllmEmbeddingClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let builder = match config.llm_type {
            LlmType::OpenAI => {
                let api_key = config.api_key
                    .clone()
                    .filter(|k| !k.trim().is_empty())
                    .ok_or_else(|| "OpenAI API key is required for embeddings".to_string())?;
                let model = config.embedding_model.as_deref().unwrap_or(OPENAI_DEFAULT_MODEL);
                let mut builder = LLMBuilder::new()
                    .backend(LLMBackend::OpenAI)
                    .api_key(api_key)
                    .model(model);
                if let Some(url) = &config.base_url {
                    builder = builder.base_url(url.clone());
                }
                builder
            }
            LlmType::Ollama => {
                let url = config.base_url.clone().unwrap_or_else(|| OLLAMA_DEFAULT_URL.to_string());
                let model = config.embedding_model.as_deref().unwrap_or(OLLAMA_DEFAULT_MODEL);
                LLMBuilder::new().backend(LLMBackend::Ollama).base_url(url).model(model).stream(false)
            }
        };

        let provider = match config.llm_type {
            LlmType::OpenAI => "OpenAI",
            LlmType::Ollama => "Ollama",
        };

        Ok(Self { llm: builder.build()?, provider })
    }
}

#[async_trait]
impl EmbeddingClient for RllmEmbeddingClient {
    async fn embed(
        &self,
        text: &str
    ) -> Result<EmbeddingResponse, Box<dyn StdError + Send + Sync>> {
        let mut embeddings = self.llm.embed(vec![text.to_string()]).await?;
        let embedding = embeddings
            .pop()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| format!("{} embedding returned no vector", self.provider))?;

        Ok(EmbeddingResponse { embedding })
    }
}
