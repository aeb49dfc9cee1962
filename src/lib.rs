pub mod agent;
pub mod cli;
pub mod config;
pub mod llm;
pub mod models;
pub mod policy;
pub mod rag;
pub mod ratelimit;
pub mod sentiment;
pub mod server;
pub mod validation;

use agent::TherapyAgent;
use cli::Args;
use log::info;
use rag::corpus::therapy_corpus;
use rag::create_rag_engine;
use server::Server;
use std::error::Error;
use std::sync::Arc;

/// Seeds the configured knowledge index from the built-in corpus.
pub async fn init_knowledge(args: &Args) -> Result<usize, Box<dyn Error + Send + Sync>> {
    let engine = create_rag_engine(args).await?.ok_or_else(||
        "VECTOR_TYPE=none has no knowledge index to initialize".to_string()
    )?;
    let written = engine.ingest(&therapy_corpus()).await?;
    info!("Knowledge base initialized in '{}' with {} chunks", args.indexes, written);
    Ok(written)
}

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Chat LLM Type: {}", args.chat_llm_type);
    info!("Chat Model: {}", args.chat_model);
    info!("Embedding LLM Type: {}", args.embedding_llm_type);
    info!("Vector Store Type: {}", args.vector_type);
    info!("Vector Store Host: {}", args.host);
    info!("Knowledge Collection: {}", args.indexes);
    info!("RAG Limit: {}", args.rag_default_limit);
    info!("Rate Limit Type: {}", args.rate_limit_type);
    info!("Upstream Timeout: {}s", args.upstream_timeout_secs);
    info!("Prompts Path: {}", args.prompts_path.as_deref().unwrap_or("built-in"));
    info!("TLS Enabled: {}", args.enable_tls);
    info!("-------------------------");

    if args.init_knowledge {
        init_knowledge(&args).await?;
        return Ok(());
    }

    let agent = Arc::new(TherapyAgent::from_args(&args).await?);
    let server = Server::new(args.server_addr.clone(), agent, args);
    server.run().await?;

    Ok(())
}
