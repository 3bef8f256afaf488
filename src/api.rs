//! REST API server for the restaurant agent
//!
//! Exposes `run_agent` over HTTP for the web front end.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::agent::AgentGraph;
use crate::models::AgentOutput;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecommendRequest {
    pub question: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    pub chat_id: Option<String>,
    pub messages: Vec<ChatMessage>,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub agent: Arc<AgentGraph>,
}

/// Thread id derived from a client-supplied chat id that is not a UUID
fn stable_uuid_from_string(input: &str) -> uuid::Uuid {
    use sha2::{Digest, Sha256};

    let hash = Sha256::digest(input.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);

    // Set UUID version (4) and variant (RFC4122) bits.
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    uuid::Uuid::from_bytes(bytes)
}

fn parse_or_stable_uuid(value: &str) -> uuid::Uuid {
    uuid::Uuid::parse_str(value).unwrap_or_else(|_| stable_uuid_from_string(value))
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Recommendation Endpoint
/// =============================

async fn answer(
    agent: &AgentGraph,
    question: &str,
    thread_id: uuid::Uuid,
) -> (StatusCode, ApiResponse) {
    let question = question.trim();
    if question.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            ApiResponse::error("Question must not be empty".into()),
        );
    }

    match agent.run_agent_in_thread(question, thread_id).await {
        AgentOutput::Error { error } => {
            warn!(%error, "Recommendation failed");
            (StatusCode::INTERNAL_SERVER_ERROR, ApiResponse::error(error))
        }
        output => (StatusCode::OK, ApiResponse::success(output)),
    }
}

async fn recommend(
    State(state): State<ApiState>,
    Json(req): Json<RecommendRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    info!("Received recommendation request: {}", req.question);

    let (status, response) = answer(&state.agent, &req.question, uuid::Uuid::new_v4()).await;
    (status, Json(response))
}

/// =============================
/// Chat Endpoint
/// =============================

async fn chat_handler(
    State(state): State<ApiState>,
    Json(req): Json<ChatRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    let Some(user_msg) = req.messages.iter().rev().find(|m| m.role == "user") else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("No user message found".into())),
        );
    };

    // The run is checkpointed under the chat's thread id; the id is echoed
    // back so the client can correlate turns.
    let thread_id = req
        .chat_id
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .map(parse_or_stable_uuid)
        .unwrap_or_else(uuid::Uuid::new_v4);
    info!("chat_handler thread_id={}", thread_id);

    // Only the latest user turn is answered; each turn is an independent run.
    let (status, mut response) = answer(&state.agent, &user_msg.content, thread_id).await;
    if let Some(data) = response.data.as_mut() {
        data["chat_id"] = serde_json::json!(thread_id.to_string());
    }
    (status, Json(response))
}

/// =============================
/// Router
/// =============================

pub fn create_router(agent: Arc<AgentGraph>) -> Router {
    let state = ApiState { agent };

    Router::new()
        .route("/health", get(health))
        .route("/api/recommend", post(recommend))
        .route("/api/chat", post(chat_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    agent: Arc<AgentGraph>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(agent);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
