use async_trait::async_trait;
use futures::future::try_join_all;
use log::{ debug, info };
use std::sync::Arc;

use super::chunker::TextSplitter;
use super::{ IndexedChunk, KnowledgeChunk, KnowledgeIndex, RetrievalError, Retriever };
use crate::llm::embedding::EmbeddingClient;

/// Embeds queries and searches the knowledge index. Also owns ingestion so
/// that stored chunks and queries share one embedding function.
#[derive(Clone)]
pub struct RagEngine {
    embedding_client: Arc<dyn EmbeddingClient>,
    index: Arc<dyn KnowledgeIndex>,
    splitter: TextSplitter,
}

impl RagEngine {
    pub fn new(
        embedding_client: Arc<dyn EmbeddingClient>,
        index: Arc<dyn KnowledgeIndex>,
        splitter: TextSplitter
    ) -> Self {
        Self { embedding_client, index, splitter }
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        self.embedding_client
            .embed(text).await
            .map(|r| r.embedding)
            .map_err(|e| RetrievalError::Embedding(e.to_string()))
    }

    /// Splits every document, embeds each piece and upserts the result.
    /// Returns the number of chunks written.
    pub async fn ingest(&self, documents: &[KnowledgeChunk]) -> Result<usize, RetrievalError> {
        let pieces = documents
            .iter()
            .flat_map(|doc| {
                self.splitter
                    .split(&doc.text)
                    .into_iter()
                    .map(move |text| KnowledgeChunk { text, metadata: doc.metadata.clone() })
            })
            .collect::<Vec<_>>();

        let entries = try_join_all(
            pieces.into_iter().map(|chunk| async move {
                let vector = self.embed(&chunk.text).await?;
                Ok::<_, RetrievalError>(IndexedChunk { chunk, vector })
            })
        ).await?;

        let written = entries.len();
        self.index.upsert(entries).await?;
        info!("Ingested {} knowledge chunks from {} documents", written, documents.len());
        Ok(written)
    }
}

#[async_trait]
impl Retriever for RagEngine {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<String>, RetrievalError> {
        if k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let vector = self.embed(query).await?;
        let mut passages = self.index.query(vector, k).await?;
        passages.truncate(k);
        debug!("Retrieved {} passages for query", passages.len());
        Ok(passages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::embedding::EmbeddingResponse;
    use crate::rag::corpus::therapy_corpus;
    use crate::rag::MemoryIndex;
    use std::error::Error as StdError;

    /// Bag-of-keywords embedding: one dimension per topic word.
    struct KeywordEmbedder;

    const TOPICS: [&str; 6] = ["anxiety", "depression", "grief", "stress", "relationship", "self"];

    #[async_trait]
    impl EmbeddingClient for KeywordEmbedder {
        async fn embed(&self, text: &str) -> Result<EmbeddingResponse, Box<dyn StdError + Send + Sync>> {
            let lower = text.to_lowercase();
            let mut embedding = TOPICS.iter()
                .map(|t| lower.matches(t).count() as f32)
                .collect::<Vec<_>>();
            embedding.push(0.01);
            Ok(EmbeddingResponse { embedding })
        }
    }

    struct BrokenEmbedder;

    #[async_trait]
    impl EmbeddingClient for BrokenEmbedder {
        async fn embed(&self, _text: &str) -> Result<EmbeddingResponse, Box<dyn StdError + Send + Sync>> {
            Err("connection refused".into())
        }
    }

    #[tokio::test]
    async fn ingested_corpus_is_retrievable() {
        let index = Arc::new(MemoryIndex::new());
        let engine = RagEngine::new(Arc::new(KeywordEmbedder), index.clone(), TextSplitter::default());

        let written = engine.ingest(&therapy_corpus()).await.unwrap();
        assert_eq!(written, therapy_corpus().len());
        assert_eq!(index.len().await, written);

        let hits = engine.retrieve("how do I cope with grief", 3).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert!(hits[..2].iter().all(|h| h.contains("grief")));
    }

    #[tokio::test]
    async fn zero_k_returns_nothing() {
        let engine = RagEngine::new(Arc::new(KeywordEmbedder), Arc::new(MemoryIndex::new()), TextSplitter::default());
        assert!(engine.retrieve("anxiety", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn embedding_failure_is_a_retrieval_error() {
        let engine = RagEngine::new(Arc::new(BrokenEmbedder), Arc::new(MemoryIndex::new()), TextSplitter::default());
        let err = engine.retrieve("anxiety", 3).await.unwrap_err();
        assert!(matches!(err, RetrievalError::Embedding(_)));
    }
}
