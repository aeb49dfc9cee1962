pub mod provider;

use async_trait::async_trait;
use std::error::Error as StdError;
use std::sync::Arc;

use super::LlmConfig;
use self::provider::RllmEmbeddingClient;

#[derive(Debug, Clone)]
pub struct EmbeddingResponse {
    pub embedding: Vec<f32>,
}

/// Query text and stored knowledge chunks must go through the same client so
/// their vectors are comparable.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, text: &str) -> Result<EmbeddingResponse, Box<dyn StdError + Send + Sync>>;
}

pub fn new_client(
    config: &LlmConfig
) -> Result<Arc<dyn EmbeddingClient>, Box<dyn StdError + Send + Sync>> {
    let client = RllmEmbeddingClient::from_config(config)?;
    Ok(Arc::new(client))
}
