use crate::error::EmbeddingError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 256;

/// Maps chunk text to a fixed-dimension vector. Same text and model
/// version must produce the same vector; provider-side drift is out of
/// this crate's control.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Remote embedding provider speaking the OpenAI embeddings API shape.
pub struct OpenAiEmbedder {
    endpoint: Url,
    api_key: String,
    model: String,
    dimensions: usize,
    client: Client,
}

impl OpenAiEmbedder {
    pub fn new(
        endpoint: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimensions: usize,
    ) -> Result<Self, EmbeddingError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|error| EmbeddingError::Response(format!("bad endpoint: {error}")))?;

        Ok(Self {
            endpoint,
            api_key: api_key.into(),
            model: model.into(),
            dimensions,
            client: Client::new(),
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: text,
            })
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(EmbeddingError::RateLimited);
        }
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Rejected(body));
        }
        if !status.is_success() {
            return Err(EmbeddingError::Response(status.to_string()));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|error| EmbeddingError::Response(error.to_string()))?;

        let values = parsed
            .data
            .into_iter()
            .next()
            .map(|item| item.embedding)
            .ok_or_else(|| EmbeddingError::Response("empty data array".to_string()))?;

        if values.len() != self.dimensions {
            return Err(EmbeddingError::DimensionMismatch {
                got: values.len(),
                want: self.dimensions,
            });
        }

        Ok(values)
    }
}

/// Deterministic local embedder: character trigrams hashed into
/// buckets, L2-normalized. No semantic power to speak of, but stable
/// and offline, which is what tests and air-gapped runs need.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
    pub dimensions: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = 0xcbf29ce484222325u64;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let bytes = lowered.as_bytes();

        if bytes.len() < 3 {
            if !bytes.is_empty() {
                let bucket = (fnv1a(bytes) % vector.len() as u64) as usize;
                vector[bucket] = 1.0;
            }
            return Ok(vector);
        }

        for trigram in bytes.windows(3) {
            let bucket = (fnv1a(trigram) % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hashing_embedder_is_deterministic() {
        let embedder = HashingEmbedder::default();
        let first = embedder.embed("per-document vector isolation").await.expect("embed");
        let second = embedder.embed("per-document vector isolation").await.expect("embed");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn hashing_embedder_outputs_configured_length() {
        let embedder = HashingEmbedder { dimensions: 32 };
        let vector = embedder.embed("abcdef").await.expect("embed");
        assert_eq!(vector.len(), 32);
    }

    #[tokio::test]
    async fn hashing_embedder_normalizes_nonempty_input() {
        let embedder = HashingEmbedder { dimensions: 64 };
        let vector = embedder.embed("enough text to fill several buckets").await.expect("embed");
        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn hashing_embedder_handles_empty_input() {
        let embedder = HashingEmbedder { dimensions: 16 };
        let vector = embedder.embed("").await.expect("embed");
        assert_eq!(vector, vec![0f32; 16]);
    }
}
