use crate::chunking::{self, ChunkingConfig};
use crate::embeddings::Embedder;
use crate::error::{EmbeddingError, PipelineError, Result, Stage};
use crate::extractor::extract_page_texts;
use crate::fetch::{BlobStore, FetchOptions, Fetcher};
use crate::models::{
    record_id, Chunk, CollectionReport, ContextBundle, DocumentRef, IngestionOutcome,
    PipelineOptions, RecordMetadata, ScoredMatch, SkippedDocument, SourceSnippet, VectorRecord,
};
use crate::traits::{upsert_in_batches, VectorIndex};
use chrono::Utc;
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{info, warn};

/// Runs the ingestion pipeline over injected service handles:
/// fetch -> parse -> chunk -> embed -> clear namespace -> upsert, plus
/// the per-namespace query side.
///
/// Single-document ingestion fails as a whole on any stage error.
/// Multi-document ingestion isolates failures per document: one bad
/// source is logged and skipped, never fatal to the rest.
pub struct IngestionCoordinator<S, E, V>
where
    S: BlobStore,
    E: Embedder,
    V: VectorIndex,
{
    fetcher: Fetcher<S>,
    embedder: E,
    index: V,
    options: PipelineOptions,
}

impl<S, E, V> IngestionCoordinator<S, E, V>
where
    S: BlobStore + Send + Sync,
    E: Embedder + Send + Sync,
    V: VectorIndex + Send + Sync,
{
    pub fn new(store: S, embedder: E, index: V) -> Self {
        Self::with_options(
            store,
            embedder,
            index,
            PipelineOptions::default(),
            FetchOptions::default(),
        )
    }

    pub fn with_options(
        store: S,
        embedder: E,
        index: V,
        options: PipelineOptions,
        fetch_options: FetchOptions,
    ) -> Self {
        Self {
            fetcher: Fetcher::new(store, fetch_options),
            embedder,
            index,
            options,
        }
    }

    /// Ingests one document into its own namespace. Re-ingesting the
    /// same key clears the namespace first, so no stale records
    /// survive a re-process. The scratch file is released on every
    /// exit path, success or failure.
    pub async fn ingest_document(&self, document: &DocumentRef) -> Result<IngestionOutcome> {
        let key = document.key.as_str();
        let namespace = document.namespace();
        info!(key, %namespace, "ingesting document");

        let scratch = self
            .fetcher
            .fetch(key)
            .await
            .map_err(|error| PipelineError::new(Stage::Fetching, key, error))?;

        let pages = extract_page_texts(scratch.path())
            .map_err(|error| PipelineError::new(Stage::Parsing, key, error))?;

        let chunks = chunking::split_document(key, &pages, ChunkingConfig::from(&self.options))
            .map_err(|error| PipelineError::new(Stage::Chunking, key, error))?;

        let records = self
            .embed_chunks(&chunks)
            .await
            .map_err(|error| PipelineError::new(Stage::Embedding, key, error))?;

        self.index
            .delete_all(&namespace)
            .await
            .map_err(|error| PipelineError::new(Stage::Clearing, key, error))?;

        upsert_in_batches(
            &self.index,
            &namespace,
            &records,
            self.options.upsert_batch_size,
        )
        .await
        .map_err(|error| PipelineError::new(Stage::Upserting, key, error))?;

        info!(key, %namespace, chunks = chunks.len(), "document ingested");

        Ok(IngestionOutcome {
            document: document.clone(),
            namespace,
            chunks,
            ingested_at: Utc::now(),
        })
    }

    /// Embeds chunks with a bounded, order-preserving fan-out. The
    /// first failure aborts the join: a partially embedded document is
    /// worse than a clearly failed one.
    async fn embed_chunks(&self, chunks: &[Chunk]) -> std::result::Result<Vec<VectorRecord>, EmbeddingError> {
        stream::iter(chunks.iter().map(|chunk| async move {
            let values = self.embedder.embed(&chunk.text).await?;
            Ok::<VectorRecord, EmbeddingError>(VectorRecord {
                id: record_id(&chunk.source_key, chunk.seq),
                values,
                metadata: RecordMetadata {
                    text: chunk.text.clone(),
                    source: chunk.source_key.clone(),
                    page: chunk.page,
                },
            })
        }))
        .buffered(self.options.embed_concurrency.max(1))
        .try_collect()
        .await
    }

    /// Ingests a set of documents, fanned out across independent
    /// namespaces. Failed documents are recorded as skipped.
    pub async fn ingest_collection(&self, documents: &[DocumentRef]) -> CollectionReport {
        let results: Vec<_> = stream::iter(documents.iter().map(|document| async move {
            (document, self.ingest_document(document).await)
        }))
        .buffered(self.options.document_concurrency.max(1))
        .collect()
        .await;

        let mut report = CollectionReport::default();
        for (document, result) in results {
            match result {
                Ok(outcome) => report.ingested.push(outcome),
                Err(error) => {
                    warn!(key = %document.key, %error, "skipping document");
                    report.skipped.push(SkippedDocument {
                        key: document.key.clone(),
                        reason: error.to_string(),
                    });
                }
            }
        }
        report
    }

    /// Top-K query against one document's namespace.
    pub async fn query_document(
        &self,
        document: &DocumentRef,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<ScoredMatch>> {
        let key = document.key.as_str();
        let vector = self
            .embedder
            .embed(query)
            .await
            .map_err(|error| PipelineError::new(Stage::Embedding, key, error))?;

        self.index
            .query(&document.namespace(), &vector, top_k)
            .await
            .map_err(|error| PipelineError::new(Stage::Querying, key, error))
    }

    /// Cross-document synthesis input: ingest every document, then
    /// query each populated namespace and merge the hits into one
    /// ranked, source-tagged snippet list.
    pub async fn gather_context(
        &self,
        documents: &[DocumentRef],
        query: &str,
        top_k_per_document: usize,
    ) -> Result<ContextBundle> {
        let report = self.ingest_collection(documents).await;

        let vector = self
            .embedder
            .embed(query)
            .await
            .map_err(|error| PipelineError::new(Stage::Embedding, "query", error))?;

        let mut snippets = Vec::new();
        for outcome in &report.ingested {
            let matches = match self
                .index
                .query(&outcome.namespace, &vector, top_k_per_document)
                .await
            {
                Ok(matches) => matches,
                Err(error) => {
                    warn!(key = %outcome.document.key, %error, "namespace query failed");
                    continue;
                }
            };

            snippets.extend(matches.into_iter().map(|hit| SourceSnippet {
                source_name: outcome.document.display_name.clone(),
                text: hit.metadata.text,
                score: hit.score,
            }));
        }

        snippets.sort_by(|left, right| right.score.total_cmp(&left.score));

        Ok(ContextBundle { report, snippets })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashingEmbedder;
    use crate::error::{EmbeddingError, FetchError};
    use crate::fetch::BlobStore;
    use crate::stores::MemoryVectorStore;
    use async_trait::async_trait;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};
    use std::collections::HashMap;
    use std::path::Path;

    struct MemoryBlobStore {
        objects: HashMap<String, Vec<u8>>,
    }

    impl MemoryBlobStore {
        fn with_objects(objects: Vec<(&str, Vec<u8>)>) -> Self {
            Self {
                objects: objects
                    .into_iter()
                    .map(|(key, bytes)| (key.to_string(), bytes))
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl BlobStore for MemoryBlobStore {
        async fn get(&self, key: &str) -> std::result::Result<Vec<u8>, FetchError> {
            self.objects
                .get(key)
                .cloned()
                .ok_or_else(|| FetchError::NotFound(key.to_string()))
        }
    }

    struct RefusingEmbedder;

    #[async_trait]
    impl Embedder for RefusingEmbedder {
        fn dimensions(&self) -> usize {
            8
        }

        async fn embed(&self, _text: &str) -> std::result::Result<Vec<f32>, EmbeddingError> {
            Err(EmbeddingError::RateLimited)
        }
    }

    /// Serializes a minimal text-only PDF, one content stream per page.
    fn pdf_with_pages(page_texts: &[String]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for text in page_texts {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new("Tj", vec![Object::string_literal(text.as_str())]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(
                dictionary! {},
                content.encode().expect("encode page content"),
            ));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            });
            kids.push(page_id.into());
        }

        let kid_count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => kid_count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("serialize pdf");
        bytes
    }

    fn prose(word: &str, chars: usize) -> String {
        let mut text = format!("{word} ").repeat(chars / (word.len() + 1) + 1);
        text.truncate(chars);
        text
    }

    fn fetch_options_in(dir: &Path) -> FetchOptions {
        FetchOptions {
            scratch_dir: dir.to_path_buf(),
            ..FetchOptions::default()
        }
    }

    fn coordinator_with(
        objects: Vec<(&str, Vec<u8>)>,
        scratch: &Path,
    ) -> IngestionCoordinator<MemoryBlobStore, HashingEmbedder, MemoryVectorStore> {
        IngestionCoordinator::with_options(
            MemoryBlobStore::with_objects(objects),
            HashingEmbedder { dimensions: 64 },
            MemoryVectorStore::new(),
            PipelineOptions::default(),
            fetch_options_in(scratch),
        )
    }

    #[tokio::test]
    async fn three_page_pdf_yields_bounded_chunks() {
        let scratch = tempfile::tempdir().expect("tempdir");
        let pdf = pdf_with_pages(&[
            prose("alpha", 1_200),
            prose("bravo", 50),
            prose("charlie", 900),
        ]);
        let coordinator = coordinator_with(vec![("docs/a.pdf", pdf)], scratch.path());

        let outcome = coordinator
            .ingest_document(&DocumentRef::from_key("docs/a.pdf"))
            .await
            .expect("ingest");

        assert!(outcome.chunks.len() >= 3);
        for chunk in &outcome.chunks {
            assert!(chunk.text.chars().count() <= 1_000);
        }
        assert_eq!(
            coordinator.index.record_count(&outcome.namespace).await,
            outcome.chunks.len()
        );
    }

    #[tokio::test]
    async fn query_sees_only_the_queried_documents_records() {
        let scratch = tempfile::tempdir().expect("tempdir");
        let coordinator = coordinator_with(
            vec![
                ("docs/a.pdf", pdf_with_pages(&[prose("hydraulic", 1_500)])),
                ("docs/b.pdf", pdf_with_pages(&[prose("electrical", 1_500)])),
            ],
            scratch.path(),
        );

        let document_a = DocumentRef::from_key("docs/a.pdf");
        let document_b = DocumentRef::from_key("docs/b.pdf");
        coordinator.ingest_document(&document_a).await.expect("ingest a");
        coordinator.ingest_document(&document_b).await.expect("ingest b");

        let matches = coordinator
            .query_document(&document_a, "hydraulic pressure", 5)
            .await
            .expect("query");

        assert!(matches.len() <= 5);
        assert!(!matches.is_empty());
        for hit in &matches {
            assert_eq!(hit.metadata.source, "docs/a.pdf");
        }
    }

    #[tokio::test]
    async fn collection_skips_a_failed_download_without_raising() {
        let scratch = tempfile::tempdir().expect("tempdir");
        let coordinator = coordinator_with(
            vec![("a.pdf", pdf_with_pages(&[prose("alpha", 800)]))],
            scratch.path(),
        );

        let report = coordinator
            .ingest_collection(&[
                DocumentRef::from_key("a.pdf"),
                DocumentRef::from_key("b.pdf"),
            ])
            .await;

        assert_eq!(report.ingested.len(), 1);
        assert_eq!(report.ingested[0].document.key, "a.pdf");
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].key, "b.pdf");
        assert!(report.skipped[0].reason.contains("fetching"));
    }

    #[tokio::test]
    async fn reingestion_leaves_only_the_second_runs_records() {
        let scratch = tempfile::tempdir().expect("tempdir");
        let first_pdf = pdf_with_pages(&[prose("first", 3_000)]);
        let second_pdf = pdf_with_pages(&[prose("second", 1_200)]);

        let document = DocumentRef::from_key("docs/a.pdf");
        let first = coordinator_with(vec![("docs/a.pdf", first_pdf)], scratch.path());
        let outcome = first.ingest_document(&document).await.expect("first ingest");
        let first_count = outcome.chunks.len();

        // Same index, new content under the same key.
        let second = IngestionCoordinator::with_options(
            MemoryBlobStore::with_objects(vec![("docs/a.pdf", second_pdf)]),
            HashingEmbedder { dimensions: 64 },
            first.index,
            PipelineOptions::default(),
            fetch_options_in(scratch.path()),
        );
        let outcome = second.ingest_document(&document).await.expect("second ingest");

        assert_ne!(first_count, outcome.chunks.len());
        assert_eq!(
            second.index.record_count(&document.namespace()).await,
            outcome.chunks.len()
        );
    }

    #[tokio::test]
    async fn embedding_failure_aborts_the_document() {
        let scratch = tempfile::tempdir().expect("tempdir");
        let coordinator = IngestionCoordinator::with_options(
            MemoryBlobStore::with_objects(vec![(
                "docs/a.pdf",
                pdf_with_pages(&[prose("alpha", 800)]),
            )]),
            RefusingEmbedder,
            MemoryVectorStore::new(),
            PipelineOptions::default(),
            fetch_options_in(scratch.path()),
        );

        let document = DocumentRef::from_key("docs/a.pdf");
        let error = coordinator
            .ingest_document(&document)
            .await
            .expect_err("must fail");

        assert_eq!(error.stage, Stage::Embedding);
        assert_eq!(coordinator.index.record_count(&document.namespace()).await, 0);
    }

    #[tokio::test]
    async fn scratch_is_released_on_success_and_failure() {
        let scratch = tempfile::tempdir().expect("tempdir");
        let coordinator = coordinator_with(
            vec![
                ("good.pdf", pdf_with_pages(&[prose("alpha", 600)])),
                ("bad.pdf", b"%PDF-1.4 not really".to_vec()),
            ],
            scratch.path(),
        );

        coordinator
            .ingest_document(&DocumentRef::from_key("good.pdf"))
            .await
            .expect("ingest");
        let error = coordinator
            .ingest_document(&DocumentRef::from_key("bad.pdf"))
            .await
            .expect_err("parse must fail");
        assert_eq!(error.stage, Stage::Parsing);

        let leftovers: Vec<_> = match std::fs::read_dir(scratch.path()) {
            Ok(entries) => entries.collect(),
            Err(_) => Vec::new(),
        };
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn gathered_context_is_ranked_and_source_tagged() {
        let scratch = tempfile::tempdir().expect("tempdir");
        let coordinator = coordinator_with(
            vec![
                ("a.pdf", pdf_with_pages(&[prose("alpha", 1_500)])),
                ("b.pdf", pdf_with_pages(&[prose("bravo", 1_500)])),
            ],
            scratch.path(),
        );

        let bundle = coordinator
            .gather_context(
                &[DocumentRef::from_key("a.pdf"), DocumentRef::from_key("b.pdf")],
                "alpha bravo overview",
                3,
            )
            .await
            .expect("gather");

        assert_eq!(bundle.report.ingested.len(), 2);
        assert!(!bundle.snippets.is_empty());
        for pair in bundle.snippets.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        for snippet in &bundle.snippets {
            assert!(snippet.source_name == "a" || snippet.source_name == "b");
        }
    }
}
