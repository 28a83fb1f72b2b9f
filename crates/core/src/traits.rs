use crate::error::VectorStoreError;
use crate::models::{ScoredMatch, VectorRecord};
use async_trait::async_trait;

/// Namespace-isolated vector index. One namespace per source document;
/// a query against one namespace only ever sees that document's
/// records.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert-or-replace by record id within `namespace`. Upserting
    /// the same id twice overwrites.
    async fn upsert(
        &self,
        namespace: &str,
        records: &[VectorRecord],
    ) -> Result<(), VectorStoreError>;

    /// Clears a namespace. A namespace that does not exist yet is
    /// treated as already clear, not as an error.
    async fn delete_all(&self, namespace: &str) -> Result<(), VectorStoreError>;

    /// Up to `top_k` nearest records by the store's similarity metric,
    /// descending; ties are broken arbitrarily by the store.
    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredMatch>, VectorStoreError>;
}

/// Issues upserts in bounded batches, sequentially and in increasing
/// id order. A failed batch does not roll back earlier ones; the error
/// reports which batch broke and how many records were already
/// committed.
pub async fn upsert_in_batches<V>(
    index: &V,
    namespace: &str,
    records: &[VectorRecord],
    batch_size: usize,
) -> Result<(), VectorStoreError>
where
    V: VectorIndex + ?Sized,
{
    let batch_size = batch_size.max(1);
    let mut committed = 0usize;

    for (batch, window) in records.chunks(batch_size).enumerate() {
        index
            .upsert(namespace, window)
            .await
            .map_err(|error| VectorStoreError::UpsertBatch {
                batch,
                committed,
                details: error.to_string(),
            })?;
        committed += window.len();
    }

    Ok(())
}
