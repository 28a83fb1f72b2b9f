pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod fetch;
pub mod models;
pub mod orchestrator;
pub mod stores;
pub mod traits;

pub use chunking::{approximate_page, split_document, split_text, ChunkingConfig};
pub use embeddings::{
    Embedder, HashingEmbedder, OpenAiEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{
    ChunkingError, EmbeddingError, FetchError, ParseError, PipelineError, Stage, StageError,
    VectorStoreError,
};
pub use extractor::{extract_page_texts, LopdfExtractor, PageText, PdfExtractor};
pub use fetch::{BlobStore, FetchOptions, Fetcher, HttpBlobStore, ScratchFile};
pub use models::{
    namespace_for_key, record_id, Chunk, CollectionReport, ContextBundle, DocumentRef,
    IngestionOutcome, PipelineOptions, RecordMetadata, ScoredMatch, SkippedDocument,
    SourceSnippet, VectorRecord,
};
pub use orchestrator::IngestionCoordinator;
pub use stores::{MemoryVectorStore, PineconeStore};
pub use traits::{upsert_in_batches, VectorIndex};
