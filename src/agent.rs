use log::{ debug, info, warn };
use serde_json::Value as JsonValue;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::cli::Args;
use crate::config::prompt::{ compose_system_prompt, load_prompts, PromptConfig };
use crate::llm::{ LlmConfig, LlmType };
use crate::llm::chat::{ ChatClient, new_client as new_chat_client };
use crate::models::chat::{ ChatMessage, Role, TurnReply, UserProfile };
use crate::policy::{ DenyListFilter, ResponsePolicy };
use crate::rag::corpus::therapy_corpus;
use crate::rag::{ create_rag_engine, Retriever, RetrievalError };
use crate::ratelimit::{ create_rate_limiter, RateLimitError, RateLimiter };
use crate::sentiment::mood_trend;
use crate::validation::{ validate_conversation, ValidationError };

const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_RETRIEVAL_LIMIT: usize = 3;
const DEFAULT_RETRIEVAL_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum TurnError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Too many requests. Please try again later.")]
    RateLimited {
        retry_after: Duration,
    },
    #[error("Server configuration error: {0}")]
    Configuration(String),
    #[error("The language model did not respond within {}s", .0.as_secs())]
    UpstreamTimeout(Duration),
    #[error("Failed to get a response from the language model: {0}")]
    Upstream(String),
}

impl TurnError {
    pub fn status_code(&self) -> u16 {
        match self {
            TurnError::Validation(_) => 400,
            TurnError::RateLimited { .. } => 429,
            TurnError::Configuration(_) | TurnError::UpstreamTimeout(_) | TurnError::Upstream(_) => 500,
        }
    }
}

/// Runs one conversation turn: validate, admit, retrieve, compose, call the
/// model, filter, score moods. Holds no per-conversation state.
#[derive(Clone)]
pub struct TherapyAgent {
    chat_client: Option<Arc<dyn ChatClient>>,
    retriever: Option<Arc<dyn Retriever>>,
    rate_limiter: Arc<dyn RateLimiter>,
    prompt_config: Arc<PromptConfig>,
    policy: Arc<dyn ResponsePolicy>,
    upstream_timeout: Duration,
    retrieval_limit: usize,
    retrieval_timeout: Duration,
}

impl TherapyAgent {
    /// `chat_client` is `None` when the model credential is missing; every
    /// turn then fails with `TurnError::Configuration`.
    pub fn new(
        chat_client: Option<Arc<dyn ChatClient>>,
        rate_limiter: Arc<dyn RateLimiter>,
        prompt_config: Arc<PromptConfig>
    ) -> Self {
        let policy = Arc::new(DenyListFilter::new(&prompt_config.policy));
        Self {
            chat_client,
            retriever: None,
            rate_limiter,
            prompt_config,
            policy,
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
            retrieval_limit: DEFAULT_RETRIEVAL_LIMIT,
            retrieval_timeout: DEFAULT_RETRIEVAL_TIMEOUT,
        }
    }

    pub fn with_retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn with_policy(mut self, policy: Arc<dyn ResponsePolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_upstream_timeout(mut self, timeout: Duration) -> Self {
        self.upstream_timeout = timeout;
        self
    }

    pub fn with_retrieval_limit(mut self, limit: usize) -> Self {
        self.retrieval_limit = limit;
        self
    }

    pub fn with_retrieval_timeout(mut self, timeout: Duration) -> Self {
        self.retrieval_timeout = timeout;
        self
    }

    fn initialize_chat_client(
        args: &Args
    ) -> Result<Option<Arc<dyn ChatClient>>, Box<dyn Error + Send + Sync>> {
        let llm_type = args.chat_llm_type.parse::<LlmType>()?;
        let api_key = Some(args.chat_api_key.clone()).filter(|k| !k.trim().is_empty());
        if llm_type.requires_api_key() && api_key.is_none() {
            warn!(
                "CHAT_API_KEY is not set for chat provider '{}'. Every turn will fail until it is configured.",
                args.chat_llm_type
            );
            return Ok(None);
        }

        let chat_config = LlmConfig {
            llm_type,
            base_url: args.chat_base_url.clone(),
            api_key,
            completion_model: Some(args.chat_model.clone()),
            embedding_model: None,
        };
        let chat_client = new_chat_client(&chat_config)?;
        info!(
            "Chat client configured: Type={}, Model={}, BaseURL={}",
            args.chat_llm_type,
            chat_client.get_model(),
            chat_client.get_base_url().as_deref().unwrap_or("adapter default")
        );
        Ok(Some(chat_client))
    }

    async fn initialize_retriever(args: &Args) -> Option<Arc<dyn Retriever>> {
        let engine = match create_rag_engine(args).await {
            Ok(Some(engine)) => engine,
            Ok(None) => {
                return None;
            }
            Err(e) => {
                warn!("Knowledge retrieval unavailable, continuing without it: {}", e);
                return None;
            }
        };

        // The in-memory index starts empty on every boot.
        if args.vector_type.eq_ignore_ascii_case("memory") {
            if let Err(e) = engine.ingest(&therapy_corpus()).await {
                warn!("Failed to seed in-memory knowledge index: {}", e);
            }
        }
        Some(Arc::new(engine))
    }

    pub async fn from_args(args: &Args) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let prompt_config = load_prompts(args.prompts_path.as_deref())?;
        let chat_client = Self::initialize_chat_client(args)?;
        let rate_limiter = create_rate_limiter(args).await?;
        let retriever = Self::initialize_retriever(args).await;

        let mut agent = Self::new(chat_client, rate_limiter, prompt_config)
            .with_upstream_timeout(Duration::from_secs(args.upstream_timeout_secs))
            .with_retrieval_limit(args.rag_default_limit)
            .with_retrieval_timeout(Duration::from_secs(args.retrieval_timeout_secs));
        if let Some(retriever) = retriever {
            agent = agent.with_retriever(retriever);
        }
        Ok(agent)
    }

    pub fn is_configured(&self) -> bool {
        self.chat_client.is_some()
    }

    /// Grounding passages for the latest user message. Never fails the turn.
    async fn retrieve_context(&self, conversation: &[ChatMessage]) -> Vec<String> {
        let Some(retriever) = &self.retriever else {
            return Vec::new();
        };
        let Some(query) = conversation
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.trim())
            .filter(|q| !q.is_empty()) else {
            return Vec::new();
        };

        let result = tokio::time
            ::timeout(self.retrieval_timeout, retriever.retrieve(query, self.retrieval_limit)).await
            .unwrap_or(Err(RetrievalError::Timeout));

        match result {
            Ok(passages) => {
                debug!("Retrieved {} context passages", passages.len());
                passages
            }
            Err(e) => {
                warn!("Knowledge retrieval failed, answering without context: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn handle_turn(
        &self,
        client_key: &str,
        messages: &JsonValue,
        problem_type: Option<&str>,
        profile: &UserProfile
    ) -> Result<TurnReply, TurnError> {
        let conversation = validate_conversation(messages)?;

        let chat_client = self.chat_client
            .as_ref()
            .ok_or_else(|| TurnError::Configuration("language model API key is not configured".into()))?;

        match self.rate_limiter.admit(client_key).await {
            Ok(()) => {}
            Err(RateLimitError::Exceeded { retry_after }) => {
                info!("Rate limit exceeded for client {}", client_key);
                return Err(TurnError::RateLimited { retry_after });
            }
            Err(e @ RateLimitError::Backend(_)) => {
                warn!("Admitting request from {} without rate check: {}", client_key, e);
            }
        }

        let context = self.retrieve_context(&conversation).await;
        let system_prompt = compose_system_prompt(
            &self.prompt_config,
            problem_type,
            profile,
            &context
        ).map_err(|e| TurnError::Configuration(e.to_string()))?;

        let mut request = Vec::with_capacity(conversation.len() + 1);
        request.push(ChatMessage::new(Role::System, system_prompt));
        request.extend(conversation.iter().cloned());

        // Dropping the future on expiry cancels the in-flight request.
        let completion = match tokio::time::timeout(self.upstream_timeout, chat_client.chat(&request)).await {
            Ok(Ok(completion)) => completion,
            Ok(Err(e)) => {
                return Err(TurnError::Upstream(e.to_string()));
            }
            Err(_) => {
                warn!("Chat completion exceeded {:?}, cancelled", self.upstream_timeout);
                return Err(TurnError::UpstreamTimeout(self.upstream_timeout));
            }
        };

        let reply_text = self.policy.filter(&completion.response, profile.name.as_deref());
        let (start_mood, end_mood) = mood_trend(&conversation);

        Ok(TurnReply {
            reply: ChatMessage::assistant_now(reply_text),
            start_mood,
            end_mood,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_error_class() {
        assert_eq!(TurnError::Validation(ValidationError::Empty).status_code(), 400);
        assert_eq!(TurnError::RateLimited { retry_after: Duration::from_secs(5) }.status_code(), 429);
        assert_eq!(TurnError::Configuration("x".into()).status_code(), 500);
        assert_eq!(TurnError::UpstreamTimeout(Duration::from_secs(30)).status_code(), 500);
        assert_eq!(TurnError::Upstream("x".into()).status_code(), 500);
    }

    #[test]
    fn validation_message_is_surfaced_verbatim() {
        let err = TurnError::from(ValidationError::NotAnArray);
        assert_eq!(err.to_string(), "Messages must be an array");
    }
}
