use chrono::Utc;
use clap::{Parser, Subcommand};
use pdf_rag_core::{
    DocumentRef, FetchOptions, HttpBlobStore, IngestionCoordinator, OpenAiEmbedder,
    PineconeStore, PipelineOptions,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pdf-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Blob store base URL; documents are fetched as GET <url>/<key>.
    #[arg(long, env = "BLOB_STORE_URL", default_value = "http://localhost:9000/documents")]
    blob_url: String,

    /// Bearer token for the blob store, when it requires one.
    #[arg(long, env = "BLOB_STORE_TOKEN")]
    blob_token: Option<String>,

    /// Embedding provider endpoint (OpenAI embeddings API shape).
    #[arg(
        long,
        env = "EMBEDDINGS_URL",
        default_value = "https://api.openai.com/v1/embeddings"
    )]
    embeddings_url: String,

    /// Embedding provider API key.
    #[arg(long, env = "EMBEDDINGS_API_KEY", default_value = "")]
    embeddings_api_key: String,

    /// Embedding model name.
    #[arg(long, env = "EMBEDDINGS_MODEL", default_value = "text-embedding-3-small")]
    embeddings_model: String,

    /// Embedding dimensions; must match the vector index.
    #[arg(long, default_value = "1536")]
    embedding_dimensions: usize,

    /// Vector index data-plane URL.
    #[arg(long, env = "VECTOR_INDEX_URL", default_value = "http://localhost:5080")]
    index_url: String,

    /// Vector index API key.
    #[arg(long, env = "VECTOR_INDEX_API_KEY", default_value = "")]
    index_api_key: String,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest one document key into its own namespace.
    Ingest {
        /// Storage key, e.g. docs/a.pdf
        #[arg(long)]
        key: String,
        /// Display name; defaults to the key's file stem.
        #[arg(long)]
        name: Option<String>,
    },
    /// Ingest several keys; a failing document is skipped, not fatal.
    IngestSet {
        #[arg(long, required = true, num_args = 1..)]
        keys: Vec<String>,
    },
    /// Top-K query against one ingested document's namespace.
    Query {
        #[arg(long)]
        key: String,
        /// Query text to embed and search with.
        #[arg(long)]
        query: String,
        /// Number of matches to return.
        #[arg(long, default_value = "5")]
        top_k: usize,
    },
    /// Ingest several keys and assemble a ranked, source-tagged
    /// context for downstream prompt construction.
    Context {
        #[arg(long, required = true, num_args = 1..)]
        keys: Vec<String>,
        #[arg(long, default_value = "Summarize the key points across these sources.")]
        query: String,
        /// Matches taken from each document's namespace.
        #[arg(long, default_value = "5")]
        top_k_per_document: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut blob_store = HttpBlobStore::new(&cli.blob_url)?;
    if let Some(token) = &cli.blob_token {
        blob_store = blob_store.with_bearer_token(token);
    }
    let embedder = OpenAiEmbedder::new(
        &cli.embeddings_url,
        &cli.embeddings_api_key,
        &cli.embeddings_model,
        cli.embedding_dimensions,
    )?;
    let index = PineconeStore::new(&cli.index_url, &cli.index_api_key, cli.embedding_dimensions);

    let coordinator = IngestionCoordinator::with_options(
        blob_store,
        embedder,
        index,
        PipelineOptions::default(),
        FetchOptions::default(),
    );

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "pdf-rag boot"
    );

    match cli.command {
        Command::Ingest { key, name } => {
            let document = match name {
                Some(name) => DocumentRef::new(&key, name),
                None => DocumentRef::from_key(&key),
            };
            let outcome = coordinator.ingest_document(&document).await?;
            println!(
                "{} chunks ingested into namespace {} at {}",
                outcome.chunks.len(),
                outcome.namespace,
                outcome.ingested_at.to_rfc3339()
            );
        }
        Command::IngestSet { keys } => {
            let documents: Vec<_> = keys
                .iter()
                .map(|key| DocumentRef::from_key(key.as_str()))
                .collect();
            let report = coordinator.ingest_collection(&documents).await;

            for outcome in &report.ingested {
                println!(
                    "ingested key={} namespace={} chunks={}",
                    outcome.document.key,
                    outcome.namespace,
                    outcome.chunks.len()
                );
            }
            for skipped in &report.skipped {
                warn!(key = %skipped.key, reason = %skipped.reason, "skipped document");
                println!("skipped key={} reason={}", skipped.key, skipped.reason);
            }
        }
        Command::Query { key, query, top_k } => {
            let document = DocumentRef::from_key(&key);
            let matches = coordinator.query_document(&document, &query, top_k).await?;

            println!("query: {query}");
            for hit in matches {
                println!(
                    "[{}] score={:.4} page={} source={}",
                    hit.id, hit.score, hit.metadata.page, hit.metadata.source
                );
                println!("  {}", hit.metadata.text);
            }
        }
        Command::Context {
            keys,
            query,
            top_k_per_document,
        } => {
            let documents: Vec<_> = keys
                .iter()
                .map(|key| DocumentRef::from_key(key.as_str()))
                .collect();
            let bundle = coordinator
                .gather_context(&documents, &query, top_k_per_document)
                .await?;

            for skipped in &bundle.report.skipped {
                println!("skipped key={} reason={}", skipped.key, skipped.reason);
            }
            for snippet in &bundle.snippets {
                println!("[{}] score={:.4}", snippet.source_name, snippet.score);
                println!("  {}", snippet.text);
            }
        }
    }

    Ok(())
}
