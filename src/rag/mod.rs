pub mod chunker;
pub mod corpus;
pub mod memory;
pub mod qdrant;
pub mod rag;

use async_trait::async_trait;
use log::info;
use serde::{ Deserialize, Serialize };
use std::error::Error;
use std::sync::Arc;
use thiserror::Error;

use crate::cli::Args;
use crate::llm::{ LlmConfig, LlmType };
use crate::llm::embedding::new_client as new_embedding_client;
use self::chunker::TextSplitter;

pub use self::memory::MemoryIndex;
pub use self::qdrant::QdrantIndex;
pub use self::rag::RagEngine;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    #[serde(rename = "type")]
    pub kind: String,
    pub technique: String,
}

/// A static passage of the therapy knowledge base. Created by ingestion and
/// only ever read at request time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone)]
pub struct IndexedChunk {
    pub chunk: KnowledgeChunk,
    pub vector: Vec<f32>,
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("embedding failed: {0}")]
    Embedding(String),
    #[error("vector index error: {0}")]
    Index(String),
    #[error("retrieval timed out")]
    Timeout,
}

/// Grounding passages for a query, at most `k`, best match first.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<String>, RetrievalError>;
}

/// Nearest-neighbour store for embedded knowledge chunks.
#[async_trait]
pub trait KnowledgeIndex: Send + Sync {
    async fn upsert(&self, entries: Vec<IndexedChunk>) -> Result<(), RetrievalError>;

    async fn query(&self, vector: Vec<f32>, top_k: usize) -> Result<Vec<String>, RetrievalError>;
}

/// Builds the configured index, or `None` when retrieval is disabled.
pub async fn create_index(
    args: &Args
) -> Result<Option<Arc<dyn KnowledgeIndex>>, Box<dyn Error + Send + Sync>> {
    match args.vector_type.to_lowercase().as_str() {
        "qdrant" => {
            info!("Connecting to Qdrant knowledge index at: {}", args.host);
            let secret = Some(args.secret.clone()).filter(|s| !s.is_empty());
            let index = QdrantIndex::connect(
                &args.host,
                secret,
                &args.indexes,
                args.dimension
            ).await?;
            Ok(Some(Arc::new(index)))
        }
        "memory" => {
            info!("Using in-memory knowledge index");
            Ok(Some(Arc::new(MemoryIndex::new())))
        }
        "none" => {
            info!("Knowledge retrieval disabled");
            Ok(None)
        }
        other => Err(format!("Unsupported vector store type: {}", other).into()),
    }
}

/// Wires the embedding client and the configured index into a `RagEngine`.
/// `None` when `VECTOR_TYPE=none`.
pub async fn create_rag_engine(
    args: &Args
) -> Result<Option<RagEngine>, Box<dyn Error + Send + Sync>> {
    let Some(index) = create_index(args).await? else {
        return Ok(None);
    };

    let embedding_config = LlmConfig {
        llm_type: args.embedding_llm_type.parse::<LlmType>()?,
        base_url: args.embedding_base_url.clone(),
        api_key: args.effective_embedding_key(),
        embedding_model: args.embedding_model.clone(),
        completion_model: None,
    };
    let embedding_client = new_embedding_client(&embedding_config)?;
    info!(
        "Embedding client configured: Type={}, Model={}, BaseURL={}",
        args.embedding_llm_type,
        embedding_config.embedding_model.as_deref().unwrap_or("adapter default"),
        embedding_config.base_url.as_deref().unwrap_or("adapter default")
    );

    Ok(Some(RagEngine::new(
        embedding_client,
        index,
        TextSplitter::new(args.chunk_size, args.chunk_overlap)
    )))
}
