use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Chat LLM Provider Args ---
    /// Type of LLM provider for chat completion (openai, ollama)
    #[arg(long, env = "CHAT_LLM_TYPE", default_value = "openai")]
    pub chat_llm_type: String,

    /// Base URL for the Chat LLM provider API (e.g., http://localhost:11434 for Ollama)
    #[arg(long, env = "CHAT_BASE_URL")]
    pub chat_base_url: Option<String>,

    /// API Key for the Chat LLM provider. Required for OpenAI.
    #[arg(long, env = "CHAT_API_KEY", default_value = "")]
    pub chat_api_key: String,

    /// Model name for chat completion
    #[arg(long, env = "CHAT_MODEL", default_value = "gpt-4")]
    pub chat_model: String,

    // --- Embedding LLM Provider Args ---
    /// Type of LLM provider for text embedding (openai, ollama)
    #[arg(long, env = "EMBEDDING_LLM_TYPE", default_value = "openai")]
    pub embedding_llm_type: String,

    #[arg(long, env = "EMBEDDING_BASE_URL")]
    pub embedding_base_url: Option<String>,

    /// API Key for the embedding provider. Falls back to CHAT_API_KEY when empty.
    #[arg(long, env = "EMBEDDING_API_KEY", default_value = "")]
    pub embedding_api_key: String,

    /// Model name for text embedding (e.g., text-embedding-ada-002, nomic-embed-text)
    #[arg(long, env = "EMBEDDING_MODEL")]
    pub embedding_model: Option<String>,

    // --- Knowledge Index Args ---
    /// Knowledge index type (qdrant, memory, none)
    #[arg(short = 't', long, env = "VECTOR_TYPE", default_value = "memory")]
    pub vector_type: String,

    /// Vector database URL (e.g., http://localhost:6334)
    #[arg(long, env = "VECTOR_HOST", default_value = "http://localhost:6334")]
    pub host: String,

    /// API key for the vector database
    #[arg(short = 'k', env = "VECTOR_SECRET", long, default_value = "")]
    pub secret: String,

    /// Collection name holding the therapy knowledge base
    #[arg(long, env = "VECTOR_INDEX_NAME", default_value = "therapy_knowledge")]
    pub indexes: String,

    /// Vector dimension size
    #[arg(long, env = "VECTOR_DIMENSION", default_value = "1536")]
    pub dimension: usize,

    /// Number of knowledge passages to retrieve per turn.
    #[arg(long, env = "RAG_DEFAULT_LIMIT", default_value = "3")]
    pub rag_default_limit: usize,

    /// Upper bound in seconds for the retrieval step. On expiry the turn continues without context.
    #[arg(long, env = "RETRIEVAL_TIMEOUT_SECS", default_value = "5")]
    pub retrieval_timeout_secs: u64,

    /// Ingest the built-in therapy corpus into the knowledge index and exit.
    #[arg(long, default_value = "false")]
    pub init_knowledge: bool,

    #[arg(long, env = "CHUNK_SIZE", default_value = "1000")]
    pub chunk_size: usize,

    #[arg(long, env = "CHUNK_OVERLAP", default_value = "200")]
    pub chunk_overlap: usize,

    // --- Rate Limiting Args ---
    /// Rate limiter backend (memory, redis)
    #[arg(long, env = "RATE_LIMIT_TYPE", default_value = "memory")]
    pub rate_limit_type: String,

    #[arg(long, env = "RATE_LIMIT_REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    pub rate_limit_redis_url: String,

    /// Length of the fixed rate limit window in seconds.
    #[arg(long, env = "RATE_LIMIT_WINDOW_SECS", default_value = "60")]
    pub rate_limit_window_secs: u64,

    /// Requests admitted per client within one window.
    #[arg(long, env = "RATE_LIMIT_MAX_REQUESTS", default_value = "10")]
    pub rate_limit_max_requests: u32,

    // --- General App Args ---
    /// Seconds to wait for the chat completion before failing the turn.
    #[arg(long, env = "UPSTREAM_TIMEOUT_SECS", default_value = "30")]
    pub upstream_timeout_secs: u64,

    /// Optional path to a prompt configuration file. The built-in prompts are used when unset.
    #[arg(long, env = "PROMPTS_PATH")]
    pub prompts_path: Option<String>,

    /// Host address and port for the server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:4000")]
    pub server_addr: String,

    /// Optional path to the TLS certificate file (PEM format). Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format). Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}

impl Args {
    /// Embedding key, falling back to the chat key.
    pub fn effective_embedding_key(&self) -> Option<String> {
        [&self.embedding_api_key, &self.chat_api_key]
            .into_iter()
            .find(|k| !k.is_empty())
            .cloned()
    }
}
