use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("blob store rejected credentials: {0}")]
    Unauthorized(String),

    #[error("transfer timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("gave up after {attempts} attempts, last error: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

impl FetchError {
    /// Only timeouts and transport-level failures are worth another
    /// attempt; not-found and auth failures never heal on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout(_) => true,
            FetchError::Http(error) => error.is_timeout() || error.is_connect(),
            FetchError::Io(_) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed pdf: {0}")]
    Malformed(String),

    #[error("pdf had no readable page text: {}", .0.display())]
    NoText(PathBuf),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ChunkingError {
    #[error("invalid chunking config: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding provider rate limited the request")]
    RateLimited,

    #[error("embedding provider rejected the input: {0}")]
    Rejected(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid response from embedding provider: {0}")]
    Response(String),

    #[error("embedding dimension {got} does not match configured {want}")]
    DimensionMismatch { got: usize, want: usize },
}

#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid response from {backend}: {details}")]
    Response { backend: String, details: String },

    #[error("{backend} returned {status}")]
    Backend { backend: String, status: String },

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("record dimension {got} does not match index dimension {want}")]
    DimensionMismatch { got: usize, want: usize },

    #[error("upsert batch {batch} failed after {committed} records were committed: {details}")]
    UpsertBatch {
        batch: usize,
        committed: usize,
        details: String,
    },
}

/// Pipeline stages, in execution order. `PipelineError` carries the
/// stage so a failure names where the run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetching,
    Parsing,
    Chunking,
    Embedding,
    Clearing,
    Upserting,
    Querying,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Fetching => "fetching",
            Stage::Parsing => "parsing",
            Stage::Chunking => "chunking",
            Stage::Embedding => "embedding",
            Stage::Clearing => "clearing",
            Stage::Upserting => "upserting",
            Stage::Querying => "querying",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Chunking(#[from] ChunkingError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    VectorStore(#[from] VectorStoreError),
}

#[derive(Debug, Error)]
#[error("{stage} failed for {key}: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    pub key: String,
    #[source]
    pub source: StageError,
}

impl PipelineError {
    pub fn new(stage: Stage, key: impl Into<String>, source: impl Into<StageError>) -> Self {
        Self {
            stage,
            key: key.into(),
            source: source.into(),
        }
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
