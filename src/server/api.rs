use crate::agent::{ TherapyAgent, TurnError };
use crate::cli::Args;
use crate::models::chat::TurnRequest;
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use axum::{
    body::Bytes,
    extract::{ ConnectInfo, Request, State },
    http::{ header, HeaderMap, HeaderValue, Method, StatusCode },
    middleware::{ self, Next },
    response::{ IntoResponse, Response },
    routing::{ get, post },
    Extension,
    Json,
    Router,
};
use serde::Serialize;
use serde_json::json;
use tower_http::cors::{ Any, CorsLayer };
use log::{ info, warn, error };

pub const CHAT_PATH: &str = "/api/chat";

#[derive(Clone)]
struct AppState {
    agent: Arc<TherapyAgent>,
}

/// Rate limit key of the caller, resolved once per request.
#[derive(Clone, Debug)]
struct ClientKey(String);

/// Error text carried from a handler to the request log.
#[derive(Clone, Debug)]
struct RequestFailure(String);

/// One NDJSON line per request.
#[derive(Serialize, Debug)]
pub struct RequestLog {
    pub timestamp: String,
    pub ip: String,
    pub method: String,
    pub path: String,
    pub status: u16,
    pub error: Option<String>,
}

/// First `X-Forwarded-For` entry, else the socket peer, else `unknown`.
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

pub fn build_router(agent: Arc<TherapyAgent>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route(
            CHAT_PATH,
            post(chat_handler).options(preflight_handler).fallback(method_not_allowed_handler)
        )
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(middleware::from_fn(log_requests))
        .with_state(AppState { agent })
}

pub async fn start_http_server(
    addr: &str,
    agent: Arc<TherapyAgent>,
    args: Args
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let addr = addr.parse::<SocketAddr>()?;
    let app = build_router(agent);

    match (args.enable_tls, &args.tls_cert_path, &args.tls_key_path) {
        (true, Some(cert_path), Some(key_path)) => {
            let tls_config = axum_server::tls_rustls::RustlsConfig
                ::from_pem_file(cert_path, key_path).await
                .map_err(|e| format!("Failed to load TLS certificate/key: {}", e))?;
            info!("Starting HTTPS server on: https://{}", addr);
            axum_server
                ::bind_rustls(addr, tls_config)
                .serve(app.into_make_service_with_connect_info::<SocketAddr>()).await?;
        }
        (true, _, _) => {
            return Err("ENABLE_TLS requires both TLS_CERT_PATH and TLS_KEY_PATH".into());
        }
        _ => {
            let listener = tokio::net::TcpListener
                ::bind(addr).await
                .map_err(|e| format!("Failed to bind HTTP server to {}: {}", addr, e))?;
            info!("Starting HTTP server on: http://{}", addr);
            axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
        }
    }

    Ok(())
}

fn request_log_entry(ip: String, method: String, path: String, response: &Response) -> RequestLog {
    RequestLog {
        timestamp: chrono::Utc::now().to_rfc3339(),
        ip,
        method,
        path,
        status: response.status().as_u16(),
        error: response
            .extensions()
            .get::<RequestFailure>()
            .map(|RequestFailure(msg)| msg.clone()),
    }
}

async fn log_requests(mut req: Request, next: Next) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = client_key(req.headers(), peer);
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    req.extensions_mut().insert(ClientKey(ip.clone()));

    let response = next.run(req).await;

    let entry = request_log_entry(ip, method, path, &response);
    match serde_json::to_string(&entry) {
        Ok(line) => info!(target: "request", "{}", line),
        Err(e) => error!("Failed to serialize request log: {}", e),
    }

    response
}

fn error_response(status: StatusCode, message: String) -> Response {
    let mut response = (status, Json(json!({ "error": message }))).into_response();
    response.extensions_mut().insert(RequestFailure(message));
    response
}

impl IntoResponse for TurnError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(
            StatusCode::INTERNAL_SERVER_ERROR
        );
        let retry_after = match &self {
            TurnError::RateLimited { retry_after } => Some(retry_after.as_secs().max(1)),
            _ => None,
        };

        let mut response = error_response(status, self.to_string());
        if let Some(secs) = retry_after {
            response.headers_mut().insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

async fn chat_handler(
    State(state): State<AppState>,
    Extension(ClientKey(client)): Extension<ClientKey>,
    body: Bytes
) -> Response {
    let request = match serde_json::from_slice::<TurnRequest>(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!("Rejecting malformed request body from {}: {}", client, e);
            return error_response(StatusCode::BAD_REQUEST, "Invalid JSON body".to_string());
        }
    };

    let profile = request.user_info.unwrap_or_default();
    match
        state.agent.handle_turn(
            &client,
            &request.messages,
            request.problem_type.as_deref(),
            &profile
        ).await
    {
        Ok(reply) => (StatusCode::OK, Json(reply)).into_response(),
        Err(e) => {
            if e.status_code() >= 500 {
                error!("Turn failed for {}: {}", client, e);
            }
            e.into_response()
        }
    }
}

async fn preflight_handler() -> StatusCode {
    StatusCode::OK
}

async fn method_not_allowed_handler() -> Response {
    error_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::prompt::PromptConfig;
    use crate::ratelimit::{ MemoryRateLimiter, RateLimitConfig };
    use std::time::Duration;
    use tower::ServiceExt;

    #[test]
    fn client_key_prefers_first_forwarded_entry() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        let peer = "127.0.0.1:5555".parse().ok();
        assert_eq!(client_key(&headers, peer), "203.0.113.7");
    }

    #[test]
    fn client_key_falls_back_to_peer_then_unknown() {
        let headers = HeaderMap::new();
        assert_eq!(client_key(&headers, "192.0.2.1:4000".parse().ok()), "192.0.2.1");
        assert_eq!(client_key(&headers, None), "unknown");
    }

    #[test]
    fn request_log_serializes_null_error() {
        let entry = RequestLog {
            timestamp: "2024-01-01T00:00:00+00:00".into(),
            ip: "unknown".into(),
            method: "POST".into(),
            path: CHAT_PATH.into(),
            status: 200,
            error: None,
        };
        let line = serde_json::to_value(&entry).unwrap();
        assert_eq!(line["status"], 200);
        assert!(line["error"].is_null());
    }

    fn router_without_model() -> Router {
        let limiter = Arc::new(
            MemoryRateLimiter::new(RateLimitConfig {
                window: Duration::from_secs(60),
                max_requests: 1,
            })
        );
        let prompts = Arc::new(PromptConfig::builtin().unwrap());
        build_router(Arc::new(TherapyAgent::new(None, limiter, prompts)))
    }

    async fn logged(app: Router, method: Method, body: &str) -> RequestLog {
        let request = axum::http::Request
            ::builder()
            .method(method.clone())
            .uri(CHAT_PATH)
            .header(header::CONTENT_TYPE, "application/json")
            .body(axum::body::Body::from(body.to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        request_log_entry("unknown".into(), method.to_string(), CHAT_PATH.into(), &response)
    }

    #[tokio::test]
    async fn error_exits_carry_their_message_into_the_log() {
        let entry = logged(router_without_model(), Method::GET, "").await;
        assert_eq!(entry.status, 405);
        assert_eq!(entry.error.as_deref(), Some("Method not allowed"));

        let entry = logged(router_without_model(), Method::POST, "{oops").await;
        assert_eq!(entry.status, 400);
        assert_eq!(entry.error.as_deref(), Some("Invalid JSON body"));

        let entry = logged(router_without_model(), Method::POST, r#"{"messages": []}"#).await;
        assert_eq!(entry.status, 400);
        assert_eq!(entry.error.as_deref(), Some("Messages array cannot be empty"));

        let body = r#"{"messages": [{"role": "user", "content": "Hi"}]}"#;
        let entry = logged(router_without_model(), Method::POST, body).await;
        assert_eq!(entry.status, 500);
        assert!(entry.error.unwrap().contains("not configured"));
    }

    #[test]
    fn rate_limited_response_is_logged_with_its_error() {
        let response = TurnError::RateLimited { retry_after: Duration::from_secs(12) }.into_response();
        assert_eq!(response.headers()[header::RETRY_AFTER], "12");

        let entry = request_log_entry("203.0.113.9".into(), "POST".into(), CHAT_PATH.into(), &response);
        assert_eq!(entry.status, 429);
        assert_eq!(entry.error.as_deref(), Some("Too many requests. Please try again later."));
    }

    #[tokio::test]
    async fn successful_exit_logs_null_error() {
        let entry = logged(router_without_model(), Method::OPTIONS, "").await;
        assert_eq!(entry.status, 200);
        assert!(entry.error.is_none());
    }
}
