use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{ IndexedChunk, KnowledgeIndex, RetrievalError };

/// Brute-force cosine index held in process memory.
#[derive(Default)]
pub struct MemoryIndex {
    entries: RwLock<Vec<IndexedChunk>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl KnowledgeIndex for MemoryIndex {
    async fn upsert(&self, entries: Vec<IndexedChunk>) -> Result<(), RetrievalError> {
        let mut stored = self.entries.write().await;
        for entry in entries {
            match stored.iter_mut().find(|e| e.chunk.text == entry.chunk.text) {
                Some(existing) => {
                    *existing = entry;
                }
                None => stored.push(entry),
            }
        }
        Ok(())
    }

    async fn query(&self, vector: Vec<f32>, top_k: usize) -> Result<Vec<String>, RetrievalError> {
        let stored = self.entries.read().await;
        let mut scored = stored
            .iter()
            .map(|e| (cosine_similarity(&vector, &e.vector), &e.chunk.text))
            .collect::<Vec<_>>();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        Ok(
            scored
                .into_iter()
                .take(top_k)
                .map(|(_, text)| text.clone())
                .collect()
        )
    }
}
