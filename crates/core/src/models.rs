use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Handle for one source document in the blob store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentRef {
    /// Opaque storage key, e.g. `notebooks/42/docs/a.pdf`.
    pub key: String,
    /// Human-readable name used when tagging query results.
    pub display_name: String,
}

impl DocumentRef {
    pub fn new(key: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            display_name: display_name.into(),
        }
    }

    /// Builds a ref whose display name is the key's file stem.
    pub fn from_key(key: impl Into<String>) -> Self {
        let key = key.into();
        let display_name = key
            .rsplit('/')
            .next()
            .map(|name| name.trim_end_matches(".pdf"))
            .filter(|name| !name.is_empty())
            .unwrap_or(key.as_str())
            .to_string();
        Self { key, display_name }
    }

    pub fn namespace(&self) -> String {
        namespace_for_key(&self.key)
    }
}

/// One bounded window of document text, derived and ephemeral; chunks
/// only persist as the metadata of their vector record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub source_key: String,
    /// Best-effort page attribution; see `approximate_page`.
    pub page: u32,
    pub seq: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordMetadata {
    pub text: String,
    pub source: String,
    pub page: u32,
}

/// The persisted unit: id + vector + chunk metadata, scoped to one
/// namespace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: RecordMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredMatch {
    pub id: String,
    pub score: f64,
    pub metadata: RecordMetadata,
}

/// A retrieved passage tagged with its originating document's display
/// name, ready for prompt construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSnippet {
    pub source_name: String,
    pub text: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionOutcome {
    pub document: DocumentRef,
    pub namespace: String,
    pub chunks: Vec<Chunk>,
    pub ingested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedDocument {
    pub key: String,
    pub reason: String,
}

/// Result of a multi-document ingestion: what went in, what was
/// skipped. A skip is per-document and never aborts the whole run.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CollectionReport {
    pub ingested: Vec<IngestionOutcome>,
    pub skipped: Vec<SkippedDocument>,
}

/// Bundle returned by cross-document context assembly: which
/// namespaces got populated plus the ranked, source-tagged snippets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextBundle {
    pub report: CollectionReport,
    pub snippets: Vec<SourceSnippet>,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub upsert_batch_size: usize,
    pub embed_concurrency: usize,
    pub document_concurrency: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            chunk_size: 1_000,
            chunk_overlap: 200,
            upsert_batch_size: 100,
            embed_concurrency: 8,
            document_concurrency: 4,
        }
    }
}

/// ASCII-safe namespace for a storage key: anything outside
/// `[A-Za-z0-9_-]` becomes `_`. One namespace per document key keeps
/// queries from leaking across documents.
pub fn namespace_for_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Record id: 16 hex chars of the key digest plus the zero-padded
/// sequence. Re-ingesting the same key reproduces the same ids, and
/// lexicographic id order equals sequence order, so batches sorted by
/// id go out in chunk order.
pub fn record_id(key: &str, seq: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("{}#{:05}", &digest[..16], seq)
}
