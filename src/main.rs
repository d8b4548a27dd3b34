use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use log::info;

use contextbase::api::{self, AppState};
use contextbase::chat::ChatEngine;
use contextbase::config::ServerConfig;
use contextbase::db::Database;
use contextbase::indexer::DocumentIndexer;
use contextbase::openai::{OpenAiClient, OpenAiConfig};
use contextbase::providers::{ChatModel, EmbeddingProvider};
use contextbase::retriever::Retriever;
use contextbase::storage::FileStore;
use contextbase::title::TitleGenerator;
use contextbase::vector_store::{QdrantConfig, QdrantStore, VectorStore};

/// RAG chat backend: PDF collections indexed into Qdrant, answered with
/// OpenAI models over a REST API
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:8000")]
    bind: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize environment
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    // Load configuration from environment
    let config = ServerConfig::from_env().context("Failed to load server configuration")?;
    let openai_config = OpenAiConfig::from_env().context("Missing OPENAI_API_KEY")?;
    let qdrant_config = QdrantConfig::from_env().context("Failed to load Qdrant configuration")?;

    let db = Database::open(&config.database_path).context("Failed to open database")?;
    let files = FileStore::new(&config.upload_dir).context("Failed to prepare upload directory")?;

    let openai = Arc::new(OpenAiClient::new(openai_config));
    let store: Arc<dyn VectorStore> =
        Arc::new(QdrantStore::new(qdrant_config).context("Failed to initialize Qdrant client")?);

    let embedder: Arc<dyn EmbeddingProvider> = openai.clone();
    let model: Arc<dyn ChatModel> = openai;

    let indexer = DocumentIndexer::new(embedder.clone(), store.clone());
    let retriever = Retriever::new(embedder, store.clone());
    let chat = ChatEngine::new(model.clone(), retriever);
    let titles = TitleGenerator::new(model);

    let state = Arc::new(AppState {
        config,
        db,
        files,
        indexer,
        chat,
        titles,
        vectors: store,
    });

    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("Failed to bind {}", args.bind))?;
    info!("Listening on http://{}", args.bind);
    axum::serve(listener, app).await?;

    Ok(())
}
