use async_trait::async_trait;
use log::info;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    Distance, CreateCollectionBuilder, PointStruct, SearchPointsBuilder,
    UpsertPointsBuilder, Value, VectorParams, value::Kind, vectors_config::Config as VectorsConfig,
};
use std::collections::HashMap;
use std::error::Error;
use uuid::Uuid;

use super::{ IndexedChunk, KnowledgeIndex, RetrievalError };

const TEXT_FIELD: &str = "text";

fn string_value(s: &str) -> Value {
    Value { kind: Some(Kind::StringValue(s.to_string())) }
}

pub struct QdrantIndex {
    client: Qdrant,
    collection: String,
}

impl QdrantIndex {
    /// Connects and makes sure the collection exists (cosine distance).
    pub async fn connect(
        url: &str,
        api_key: Option<String>,
        collection: &str,
        dimension: usize
    ) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let client = Qdrant::from_url(url).api_key(api_key).build()?;

        if client.collection_info(collection).await.is_err() {
            info!("Knowledge collection '{}' not found. Creating it (dimension {}).", collection, dimension);
            let create = CreateCollectionBuilder::new(collection.to_string())
                .vectors_config(
                    VectorsConfig::Params(VectorParams {
                        size: dimension as u64,
                        distance: Distance::Cosine.into(),
                        ..Default::default()
                    })
                )
                .build();
            client.create_collection(create).await?;
        }

        Ok(Self { client, collection: collection.to_string() })
    }
}

#[async_trait]
impl KnowledgeIndex for QdrantIndex {
    async fn upsert(&self, entries: Vec<IndexedChunk>) -> Result<(), RetrievalError> {
        if entries.is_empty() {
            return Ok(());
        }
        let points = entries
            .into_iter()
            .map(|entry| {
                let mut payload = HashMap::new();
                payload.insert(TEXT_FIELD.to_string(), string_value(&entry.chunk.text));
                payload.insert("type".to_string(), string_value(&entry.chunk.metadata.kind));
                payload.insert("technique".to_string(), string_value(&entry.chunk.metadata.technique));
                PointStruct::new(Uuid::new_v4().to_string(), entry.vector, payload)
            })
            .collect::<Vec<_>>();

        let op = UpsertPointsBuilder::new(&self.collection, points).wait(true).build();
        self.client
            .upsert_points(op).await
            .map_err(|e| RetrievalError::Index(e.to_string()))?;
        Ok(())
    }

    async fn query(&self, vector: Vec<f32>, top_k: usize) -> Result<Vec<String>, RetrievalError> {
        let resp = self.client
            .search_points(
                SearchPointsBuilder::new(&self.collection, vector, top_k as u64)
                    .with_payload(true)
                    .build()
            ).await
            .map_err(|e| RetrievalError::Index(e.to_string()))?;

        Ok(
            resp.result
                .iter()
                .filter_map(|pt| {
                    match pt.payload.get(TEXT_FIELD).and_then(|v| v.kind.as_ref()) {
                        Some(Kind::StringValue(s)) => Some(s.clone()),
                        _ => None,
                    }
                })
                .collect()
        )
    }
}
