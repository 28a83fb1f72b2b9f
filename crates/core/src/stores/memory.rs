use crate::error::VectorStoreError;
use crate::models::{ScoredMatch, VectorRecord};
use crate::traits::VectorIndex;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

/// In-process vector index with cosine scoring. Serves offline runs
/// and is the substrate the pipeline tests run against.
#[derive(Default)]
pub struct MemoryVectorStore {
    namespaces: RwLock<HashMap<String, BTreeMap<String, VectorRecord>>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_count(&self, namespace: &str) -> usize {
        self.namespaces
            .read()
            .await
            .get(namespace)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }
}

fn cosine(left: &[f32], right: &[f32]) -> f64 {
    let dot: f32 = left.iter().zip(right).map(|(a, b)| a * b).sum();
    let left_norm: f32 = left.iter().map(|v| v * v).sum::<f32>().sqrt();
    let right_norm: f32 = right.iter().map(|v| v * v).sum::<f32>().sqrt();
    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }
    f64::from(dot / (left_norm * right_norm))
}

#[async_trait]
impl VectorIndex for MemoryVectorStore {
    async fn upsert(
        &self,
        namespace: &str,
        records: &[VectorRecord],
    ) -> Result<(), VectorStoreError> {
        let mut namespaces = self.namespaces.write().await;
        let index = namespaces.entry(namespace.to_string()).or_default();
        for record in records {
            index.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn delete_all(&self, namespace: &str) -> Result<(), VectorStoreError> {
        self.namespaces.write().await.remove(namespace);
        Ok(())
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredMatch>, VectorStoreError> {
        let namespaces = self.namespaces.read().await;
        let Some(index) = namespaces.get(namespace) else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<ScoredMatch> = index
            .values()
            .map(|record| ScoredMatch {
                id: record.id.clone(),
                score: cosine(&record.values, vector),
                metadata: record.metadata.clone(),
            })
            .collect();

        scored.sort_by(|left, right| right.score.total_cmp(&left.score));
        scored.truncate(top_k);
        Ok(scored)
    }
}
