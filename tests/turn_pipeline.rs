//! Integration test: one conversation turn through `TherapyAgent` with the
//! chat model, retriever and rate limiter replaced by in-process doubles.
//!
//! ## Scenarios
//! 1. A lonely user gets a compliant reply untouched, and the prompt forbids referral.
//! 2. The model receives exactly one system message followed by the conversation in order.
//! 3. Retrieved passages land in the system prompt; retrieval failure still yields a reply.
//! 4. A model that never answers produces `UpstreamTimeout` and the call is cancelled.
//! 5. A missing credential fails every turn without calling the model or the rate limiter.
//! 6. The 11th request inside one window is rate limited.
//! 7. Malformed conversations are rejected before the rate limiter counts them.
//! 8. Disclaimer replies are swapped for the personalised fallback.
//! 9. A retriever that never answers is abandoned and the turn still replies.
//! 10. A model error surfaces as `Upstream` with its message.

use async_trait::async_trait;
use serde_json::json;
use std::error::Error as StdError;
use std::sync::atomic::{ AtomicBool, AtomicUsize, Ordering };
use std::sync::{ Arc, Mutex };
use std::time::Duration;

use therapy_agent::agent::{ TherapyAgent, TurnError };
use therapy_agent::config::prompt::PromptConfig;
use therapy_agent::llm::chat::{ ChatClient, CompletionResponse };
use therapy_agent::models::chat::{ ChatMessage, Role, UserProfile };
use therapy_agent::rag::{ RetrievalError, Retriever };
use therapy_agent::ratelimit::{ MemoryRateLimiter, RateLimitConfig, RateLimitError, RateLimiter };
use therapy_agent::sentiment::MoodLabel;

// ---------------------------------------------------------------------------
// Doubles
// ---------------------------------------------------------------------------

struct ScriptedChat {
    reply: String,
    failure: Option<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
    cancelled: Arc<AtomicBool>,
}

impl ScriptedChat {
    fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            failure: None,
            delay: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    fn failing(message: &str) -> Self {
        Self { failure: Some(message.to_string()), ..Self::replying("unused") }
    }

    fn hanging(delay: Duration) -> Self {
        Self { delay: Some(delay), ..Self::replying("too late") }
    }

    fn last_request(&self) -> Vec<ChatMessage> {
        self.requests.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

/// Flags the in-flight call as abandoned when its future is dropped early.
struct CancelGuard {
    flag: Arc<AtomicBool>,
    finished: bool,
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.flag.store(true, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl ChatClient for ScriptedChat {
    async fn chat(
        &self,
        messages: &[ChatMessage]
    ) -> Result<CompletionResponse, Box<dyn StdError + Send + Sync>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(messages.to_vec());

        let mut guard = CancelGuard { flag: self.cancelled.clone(), finished: false };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        guard.finished = true;
        if let Some(message) = &self.failure {
            return Err(message.clone().into());
        }
        Ok(CompletionResponse { response: self.reply.clone() })
    }

    fn get_model(&self) -> String {
        "scripted".to_string()
    }

    fn get_base_url(&self) -> Option<String> {
        None
    }
}

struct FixedRetriever(Vec<String>);

#[async_trait]
impl Retriever for FixedRetriever {
    async fn retrieve(&self, _query: &str, k: usize) -> Result<Vec<String>, RetrievalError> {
        Ok(self.0.iter().take(k).cloned().collect())
    }
}

struct StalledRetriever;

#[async_trait]
impl Retriever for StalledRetriever {
    async fn retrieve(&self, _query: &str, _k: usize) -> Result<Vec<String>, RetrievalError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(vec!["never delivered".into()])
    }
}

/// Admits everything and counts how often it was consulted.
#[derive(Default)]
struct CountingLimiter {
    calls: AtomicUsize,
}

#[async_trait]
impl RateLimiter for CountingLimiter {
    async fn admit(&self, _client_key: &str) -> Result<(), RateLimitError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FailingRetriever;

#[async_trait]
impl Retriever for FailingRetriever {
    async fn retrieve(&self, _query: &str, _k: usize) -> Result<Vec<String>, RetrievalError> {
        Err(RetrievalError::Index("collection unavailable".into()))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn prompts() -> Arc<PromptConfig> {
    Arc::new(PromptConfig::builtin().expect("built-in prompts are valid"))
}

fn limiter(max_requests: u32) -> Arc<MemoryRateLimiter> {
    Arc::new(
        MemoryRateLimiter::new(RateLimitConfig {
            window: Duration::from_secs(60),
            max_requests,
        })
    )
}

fn agent_with(chat: Arc<ScriptedChat>) -> TherapyAgent {
    TherapyAgent::new(Some(chat as Arc<dyn ChatClient>), limiter(10), prompts())
}

fn maya() -> UserProfile {
    UserProfile {
        name: Some("Maya".into()),
        age: Some("29".into()),
        ..UserProfile::default()
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn lonely_user_gets_compliant_reply_unchanged() {
    let compliant = "That sounds really heavy, Maya. When does the loneliness feel strongest?";
    let chat = Arc::new(ScriptedChat::replying(compliant));
    let agent = agent_with(chat.clone());

    let reply = agent
        .handle_turn(
            "10.0.0.1",
            &json!([{ "role": "user", "content": "I feel lonely." }]),
            Some("Sadness"),
            &maya()
        ).await
        .unwrap();

    assert_eq!(reply.reply.role, Role::Assistant);
    assert_eq!(reply.reply.content, compliant);
    assert!(reply.reply.timestamp.is_some());
    assert_eq!(reply.start_mood.as_ref().map(|m| m.label), Some(MoodLabel::Negative));

    let system = &chat.last_request()[0];
    assert!(system.content.contains("never with a referral or a disclaimer"));
    assert!(system.content.contains("Maya"));
}

#[tokio::test]
async fn model_sees_one_system_message_then_conversation_in_order() {
    let chat = Arc::new(ScriptedChat::replying("I'm listening."));
    let agent = agent_with(chat.clone());
    let conversation = json!([
        { "role": "user", "content": "Hi" },
        { "role": "assistant", "content": "Hello, how are you today?" },
        { "role": "user", "content": "Work has been stressful." }
    ]);

    agent.handle_turn("10.0.0.2", &conversation, Some("Stress"), &UserProfile::default()).await.unwrap();

    let sent = chat.last_request();
    assert_eq!(sent.len(), 4);
    assert_eq!(sent[0].role, Role::System);
    assert_eq!(sent.iter().filter(|m| m.role == Role::System).count(), 1);
    let tail = sent[1..]
        .iter()
        .map(|m| (m.role, m.content.as_str()))
        .collect::<Vec<_>>();
    assert_eq!(tail, vec![
        (Role::User, "Hi"),
        (Role::Assistant, "Hello, how are you today?"),
        (Role::User, "Work has been stressful.")
    ]);
}

#[tokio::test]
async fn retrieved_passages_are_added_to_system_prompt() {
    let chat = Arc::new(ScriptedChat::replying("Let's try something together."));
    let agent = agent_with(chat.clone()).with_retriever(
        Arc::new(
            FixedRetriever(
                vec![
                    "Grounding techniques can help manage anxiety in the moment.".into(),
                    "Progressive muscle relaxation is an effective anxiety management technique.".into()
                ]
            )
        )
    );

    agent
        .handle_turn(
            "10.0.0.3",
            &json!([{ "role": "user", "content": "My anxiety is spiking" }]),
            Some("Anxiety"),
            &maya()
        ).await
        .unwrap();

    let system = &chat.last_request()[0].content;
    assert!(system.contains("- Grounding techniques can help manage anxiety in the moment."));
    assert!(system.contains("- Progressive muscle relaxation"));
}

#[tokio::test]
async fn retrieval_failure_still_replies_without_context() {
    let chat = Arc::new(ScriptedChat::replying("I'm here with you."));
    let agent = agent_with(chat.clone()).with_retriever(Arc::new(FailingRetriever));

    let reply = agent
        .handle_turn(
            "10.0.0.4",
            &json!([{ "role": "user", "content": "I can't sleep." }]),
            None,
            &maya()
        ).await
        .unwrap();

    assert_eq!(reply.reply.content, "I'm here with you.");
    assert!(!chat.last_request()[0].content.contains("Relevant context"));
}

#[tokio::test]
async fn unresponsive_model_times_out_and_is_cancelled() {
    let chat = Arc::new(ScriptedChat::hanging(Duration::from_secs(10)));
    let agent = agent_with(chat.clone()).with_upstream_timeout(Duration::from_millis(50));

    let err = agent
        .handle_turn(
            "10.0.0.5",
            &json!([{ "role": "user", "content": "Hello?" }]),
            None,
            &maya()
        ).await
        .unwrap_err();

    assert!(matches!(err, TurnError::UpstreamTimeout(_)));
    assert_eq!(err.status_code(), 500);
    assert_eq!(chat.calls.load(Ordering::SeqCst), 1);
    assert!(chat.cancelled.load(Ordering::SeqCst));
}

#[tokio::test]
async fn missing_credential_fails_every_turn_without_io() {
    let counting = Arc::new(CountingLimiter::default());
    let agent = TherapyAgent::new(None, counting.clone(), prompts());
    assert!(!agent.is_configured());

    for _ in 0..15 {
        let err = agent
            .handle_turn(
                "10.0.0.6",
                &json!([{ "role": "user", "content": "Hi" }]),
                None,
                &UserProfile::default()
            ).await
            .unwrap_err();
        assert!(matches!(err, TurnError::Configuration(_)));
        assert_eq!(err.status_code(), 500);
    }
    assert_eq!(counting.calls.load(Ordering::SeqCst), 0);

    // A real limiter is never reached either, so its budget is untouched.
    let agent = TherapyAgent::new(None, limiter(10), prompts());
    for _ in 0..11 {
        let err = agent
            .handle_turn("10.0.0.6", &json!([{ "role": "user", "content": "Hi" }]), None, &maya()).await
            .unwrap_err();
        assert_eq!(err.status_code(), 500);
    }
}

#[tokio::test]
async fn stalled_retrieval_is_abandoned_and_turn_replies() {
    let chat = Arc::new(ScriptedChat::replying("I'm right here."));
    let agent = agent_with(chat.clone())
        .with_retriever(Arc::new(StalledRetriever))
        .with_retrieval_timeout(Duration::from_millis(50));

    let reply = tokio::time
        ::timeout(
            Duration::from_secs(5),
            agent.handle_turn(
                "10.0.0.11",
                &json!([{ "role": "user", "content": "I feel anxious tonight." }]),
                Some("Anxiety"),
                &maya()
            )
        ).await
        .expect("turn finished despite a stalled retriever")
        .unwrap();

    assert_eq!(reply.reply.content, "I'm right here.");
    let system = &chat.last_request()[0].content;
    assert!(!system.contains("never delivered"));
    assert!(!system.contains("Relevant context"));
}

#[tokio::test]
async fn model_error_surfaces_as_upstream_failure() {
    let chat = Arc::new(ScriptedChat::failing("OpenAI API error (401 Unauthorized): Incorrect API key provided"));
    let agent = agent_with(chat.clone());

    let err = agent
        .handle_turn("10.0.0.12", &json!([{ "role": "user", "content": "Hi" }]), None, &maya()).await
        .unwrap_err();

    match &err {
        TurnError::Upstream(message) => assert!(message.contains("Incorrect API key provided")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.status_code(), 500);
    assert_eq!(chat.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn eleventh_request_in_window_is_rate_limited() {
    let chat = Arc::new(ScriptedChat::replying("ok"));
    let agent = agent_with(chat.clone());
    let conversation = json!([{ "role": "user", "content": "Hi" }]);

    for _ in 0..10 {
        agent.handle_turn("10.0.0.7", &conversation, None, &maya()).await.unwrap();
    }
    let err = agent.handle_turn("10.0.0.7", &conversation, None, &maya()).await.unwrap_err();

    assert!(matches!(err, TurnError::RateLimited { .. }));
    assert_eq!(err.status_code(), 429);
    assert_eq!(chat.calls.load(Ordering::SeqCst), 10);

    // Other clients keep their own budget.
    agent.handle_turn("10.0.0.8", &conversation, None, &maya()).await.unwrap();
}

#[tokio::test]
async fn invalid_conversation_is_rejected_before_rate_check() {
    let chat = Arc::new(ScriptedChat::replying("ok"));
    let agent = TherapyAgent::new(Some(chat.clone() as Arc<dyn ChatClient>), limiter(1), prompts());

    let bad = [
        json!({ "role": "user", "content": "not an array" }),
        json!([]),
        json!([{ "role": "moderator", "content": "Hi" }]),
        json!([{ "role": "user", "content": 42 }]),
        json!([{ "content": "no role" }]),
    ];
    for payload in &bad {
        let err = agent.handle_turn("10.0.0.9", payload, None, &maya()).await.unwrap_err();
        assert!(matches!(err, TurnError::Validation(_)), "payload {} was accepted", payload);
        assert_eq!(err.status_code(), 400);
    }

    // The single slot is still available.
    agent
        .handle_turn("10.0.0.9", &json!([{ "role": "user", "content": "Hi" }]), None, &maya()).await
        .unwrap();
    assert_eq!(chat.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn disclaimer_reply_is_replaced_with_personal_fallback() {
    let chat = Arc::new(
        ScriptedChat::replying(
            "I'm really sorry that you're feeling this way, but I'm unable to provide the help that you need."
        )
    );
    let agent = agent_with(chat);

    let reply = agent
        .handle_turn(
            "10.0.0.10",
            &json!([{ "role": "user", "content": "I feel lonely." }]),
            Some("Sadness"),
            &maya()
        ).await
        .unwrap();

    assert!(reply.reply.content.starts_with("Maya, I'm really glad you shared that with me"));
    assert!(!reply.reply.content.contains("unable to provide"));
}
