use crate::error::VectorStoreError;
use crate::models::{RecordMetadata, ScoredMatch, VectorRecord};
use crate::traits::VectorIndex;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::debug;

/// Namespace-scoped index reached over Pinecone's HTTP data-plane API.
pub struct PineconeStore {
    endpoint: String,
    api_key: String,
    client: Client,
    vector_size: usize,
}

impl PineconeStore {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        vector_size: usize,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            client: Client::new(),
            vector_size,
        }
    }

    fn check_dimension(&self, got: usize) -> Result<(), VectorStoreError> {
        if got != self.vector_size {
            return Err(VectorStoreError::DimensionMismatch {
                got,
                want: self.vector_size,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for PineconeStore {
    async fn upsert(
        &self,
        namespace: &str,
        records: &[VectorRecord],
    ) -> Result<(), VectorStoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let vectors = records
            .iter()
            .map(|record| {
                self.check_dimension(record.values.len())?;
                Ok(json!({
                    "id": record.id,
                    "values": record.values,
                    "metadata": {
                        "text": record.metadata.text,
                        "source": record.metadata.source,
                        "page": record.metadata.page,
                    },
                }))
            })
            .collect::<Result<Vec<_>, VectorStoreError>>()?;

        debug!(namespace, count = vectors.len(), "upserting vectors");

        let response = self
            .client
            .post(format!("{}/vectors/upsert", self.endpoint))
            .header("Api-Key", &self.api_key)
            .json(&json!({
                "vectors": vectors,
                "namespace": namespace,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(VectorStoreError::Backend {
                backend: "pinecone".to_string(),
                status: response.status().to_string(),
            });
        }

        Ok(())
    }

    async fn delete_all(&self, namespace: &str) -> Result<(), VectorStoreError> {
        let response = self
            .client
            .post(format!("{}/vectors/delete", self.endpoint))
            .header("Api-Key", &self.api_key)
            .json(&json!({
                "deleteAll": true,
                "namespace": namespace,
            }))
            .send()
            .await?;

        // A namespace that was never written yet reports not-found;
        // first-time ingestion must treat that as already clear.
        if response.status() == StatusCode::NOT_FOUND {
            debug!(namespace, "delete-all on absent namespace");
            return Ok(());
        }

        if !response.status().is_success() {
            return Err(VectorStoreError::Backend {
                backend: "pinecone".to_string(),
                status: response.status().to_string(),
            });
        }

        Ok(())
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredMatch>, VectorStoreError> {
        self.check_dimension(vector.len())?;

        let response = self
            .client
            .post(format!("{}/query", self.endpoint))
            .header("Api-Key", &self.api_key)
            .json(&json!({
                "vector": vector,
                "topK": top_k,
                "namespace": namespace,
                "includeMetadata": true,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(VectorStoreError::Backend {
                backend: "pinecone".to_string(),
                status: response.status().to_string(),
            });
        }

        let parsed: Value = response.json().await?;
        let matches = parsed
            .pointer("/matches")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut result = Vec::new();
        for hit in matches {
            let id = hit
                .pointer("/id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let score = hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0);
            let text = hit
                .pointer("/metadata/text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let source = hit
                .pointer("/metadata/source")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let page = hit
                .pointer("/metadata/page")
                .and_then(Value::as_u64)
                .unwrap_or(0) as u32;

            result.push(ScoredMatch {
                id,
                score,
                metadata: RecordMetadata { text, source, page },
            });
        }

        Ok(result)
    }
}
