//! Travel assistant HTTP REST API
//!
//! Each endpoint is a thin axum handler over an `*_inner` function that
//! returns `(StatusCode, serde_json::Value)`, so the logic is testable without
//! going through the router.
//!
//! Endpoints:
//! - GET  /ping, /health, /version, /agents, /api/ollama/status
//! - POST /travel/chat, /travel/batch
//! - GET|PUT /travel/profile/:user_id
//! - GET  /travel/sessions/:user_id, /travel/session/:user_id/:session_id
//! - POST /perfect_query, /run_graph
//! - POST /set_stm, GET /get_stm/:user_id/:agent_id
//! - POST|GET /memory/ltm/:user_id/:agent_id, GET /memory/search
//! - POST /memory/cleanup

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use travel_core::agents::AGENTS;
use travel_core::config::HttpConfig;
use travel_core::llm::OllamaClient;
use travel_core::TravelError;
use uuid::Uuid;

use crate::subsystems::travel::TravelService;
use crate::subsystems::{memory, profiles, retention, sessions};

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    pub service: TravelService,
    pub ollama: Arc<OllamaClient>,
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/ping", get(ping_handler))
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/agents", get(agents_handler))
        .route("/api/ollama/status", get(ollama_status_handler))
        .route("/travel/chat", post(chat_handler))
        .route("/travel/batch", post(batch_handler))
        .route(
            "/travel/profile/:user_id",
            get(get_profile_handler).put(put_profile_handler),
        )
        .route("/travel/sessions/:user_id", get(list_sessions_handler))
        .route(
            "/travel/session/:user_id/:session_id",
            get(session_detail_handler),
        )
        .route("/perfect_query", post(perfect_query_handler))
        .route("/run_graph", post(run_graph_handler))
        .route("/set_stm", post(set_stm_handler))
        .route("/get_stm/:user_id/:agent_id", get(get_stm_handler))
        .route(
            "/memory/ltm/:user_id/:agent_id",
            get(get_ltm_handler).post(post_ltm_handler),
        )
        .route("/memory/search", get(search_handler))
        .route("/memory/cleanup", post(cleanup_handler))
        .with_state(state)
}

/// Serve until the broadcast shutdown signal fires.
pub async fn start_http_server(
    state: HttpState,
    http: HttpConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", http.host, http.port);
    let app = build_router(Arc::new(state));
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Travel HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub user_id: i64,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub user_id: i64,
    pub transcript: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PerfectQueryRequest {
    #[serde(default)]
    pub user: String,
    pub user_id: i64,
    pub question: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RunGraphRequest {
    #[serde(default)]
    pub user: String,
    pub question: Option<String>,
}

fn default_expiry_hours() -> u64 {
    1
}

/// Longest accepted short-term expiry, one year.
const MAX_EXPIRY_HOURS: u64 = 8760;

#[derive(Debug, Deserialize)]
pub struct SetStmRequest {
    pub user_id: i64,
    pub agent_id: String,
    pub value: String,
    #[serde(default = "default_expiry_hours")]
    pub expiry_hours: u64,
}

#[derive(Debug, Deserialize, Default)]
pub struct SessionsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub user_id: i64,
    pub query: Option<String>,
    pub agent_id: Option<String>,
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

pub fn ping_inner() -> serde_json::Value {
    serde_json::json!({ "pong": true })
}

pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": "travel/1",
    })
}

pub fn agents_inner() -> serde_json::Value {
    let agents: Vec<serde_json::Value> = AGENTS
        .iter()
        .map(|a| {
            serde_json::json!({
                "id": a.id.as_str(),
                "name": a.name,
                "emoji": a.emoji,
                "expertise": a.expertise,
                "description": a.description,
                "keywords": a.keywords,
                "priority": a.priority,
                "routing_key": a.routing_key,
            })
        })
        .collect();
    serde_json::json!({ "agents": agents, "count": agents.len() })
}

/// Database, schema, short-term store and model server status. 503 only when
/// Postgres is unreachable.
pub async fn health_inner(state: &HttpState) -> (StatusCode, serde_json::Value) {
    let stores = &state.service.stores;
    let stm = match stores.stm.ping().await {
        Ok(()) => serde_json::json!({ "backend": stores.stm.name(), "status": "ok" }),
        Err(e) => serde_json::json!({ "backend": stores.stm.name(), "status": "error", "error": e.to_string() }),
    };
    let ollama = state.ollama.status().await;

    let pg_ver = match travel_core::db::health_check(&stores.pool).await {
        Ok(v) => v,
        Err(e) => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                serde_json::json!({
                    "status": "unhealthy",
                    "error": e.to_string(),
                    "stm": stm,
                    "ollama": ollama,
                }),
            );
        }
    };

    let missing = travel_core::db::missing_tables(&stores.pool)
        .await
        .unwrap_or_default();

    let overall = if missing.is_empty() { "healthy" } else { "degraded" };
    (
        StatusCode::OK,
        serde_json::json!({
            "status": overall,
            "version": env!("CARGO_PKG_VERSION"),
            "postgresql": pg_ver,
            "missing_tables": missing,
            "stm": stm,
            "ollama": ollama,
        }),
    )
}

pub async fn ollama_status_inner(ollama: &OllamaClient) -> serde_json::Value {
    serde_json::json!(ollama.status().await)
}

pub async fn chat_inner(
    service: &TravelService,
    req: ChatRequest,
) -> (StatusCode, serde_json::Value) {
    let text = match req.text {
        Some(t) if !t.trim().is_empty() => t,
        _ => return bad_request("text field is required"),
    };
    match service.chat(req.user_id, &text).await {
        Ok(resp) => (StatusCode::OK, serde_json::json!(resp)),
        Err(e) => internal_error("chat", e),
    }
}

pub async fn batch_inner(
    service: &TravelService,
    req: BatchRequest,
) -> (StatusCode, serde_json::Value) {
    let transcript = match req.transcript {
        Some(t) if !t.trim().is_empty() => t,
        _ => return bad_request("transcript field is required"),
    };
    match service.batch(req.user_id, &transcript).await {
        Ok(resp) => (StatusCode::OK, serde_json::json!(resp)),
        Err(e) => internal_error("batch", e),
    }
}

pub async fn get_profile_inner(
    service: &TravelService,
    user_id: i64,
) -> (StatusCode, serde_json::Value) {
    match profiles::get_profile(&service.stores, &service.config.memory, user_id).await {
        Ok(profile) => (
            StatusCode::OK,
            serde_json::json!({ "user_id": user_id, "profile": profile }),
        ),
        Err(e) => internal_error("get profile", e),
    }
}

pub async fn put_profile_inner(
    service: &TravelService,
    user_id: i64,
    patch: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    match profiles::update_profile(&service.stores, &service.config.memory, user_id, &patch).await
    {
        Ok(profile) => (
            StatusCode::OK,
            serde_json::json!({ "message": "Profile updated", "profile": profile }),
        ),
        Err(e) => {
            let invalid = matches!(
                e.downcast_ref::<TravelError>(),
                Some(TravelError::InvalidInput(_) | TravelError::Serialization(_))
            );
            if invalid {
                bad_request(&e.to_string())
            } else {
                internal_error("update profile", e)
            }
        }
    }
}

pub async fn list_sessions_inner(
    service: &TravelService,
    user_id: i64,
    query: SessionsQuery,
) -> (StatusCode, serde_json::Value) {
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    match sessions::list_sessions(&service.stores, user_id, limit).await {
        Ok(list) => (
            StatusCode::OK,
            serde_json::json!({ "user_id": user_id, "count": list.len(), "sessions": list }),
        ),
        Err(e) => internal_error("list sessions", e),
    }
}

pub async fn session_detail_inner(
    service: &TravelService,
    user_id: i64,
    session_id: &str,
) -> (StatusCode, serde_json::Value) {
    let Ok(id) = Uuid::parse_str(session_id) else {
        return bad_request("session_id must be a UUID");
    };
    match sessions::session_detail(&service.stores, user_id, id).await {
        Ok(Some(detail)) => (StatusCode::OK, serde_json::json!(detail)),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            error_json(format!("session {} not found", session_id)),
        ),
        Err(e) => internal_error("session detail", e),
    }
}

pub async fn perfect_query_inner(
    service: &TravelService,
    req: PerfectQueryRequest,
) -> (StatusCode, serde_json::Value) {
    let question = match req.question {
        Some(q) if !q.trim().is_empty() => q,
        _ => return bad_request("question field is required"),
    };
    match service.perfect_query(&req.user, req.user_id, &question).await {
        Ok(outcome) => (StatusCode::OK, serde_json::json!(outcome)),
        Err(e) => internal_error("perfect query", e),
    }
}

pub async fn run_graph_inner(
    service: &TravelService,
    req: RunGraphRequest,
) -> (StatusCode, serde_json::Value) {
    let question = match req.question {
        Some(q) if !q.trim().is_empty() => q,
        _ => return bad_request("question field is required"),
    };
    match service.run_graph(&req.user, &question).await {
        Ok(outcome) => (StatusCode::OK, serde_json::json!(outcome)),
        Err(e) => internal_error("run graph", e),
    }
}

pub async fn set_stm_inner(
    service: &TravelService,
    req: SetStmRequest,
) -> (StatusCode, serde_json::Value) {
    if req.agent_id.trim().is_empty() {
        return bad_request("agent_id field is required");
    }
    let secs = match req.expiry_hours.max(1).checked_mul(3600) {
        Some(secs) if req.expiry_hours <= MAX_EXPIRY_HOURS => secs,
        _ => {
            return bad_request(&format!(
                "expiry_hours must be at most {}",
                MAX_EXPIRY_HOURS
            ))
        }
    };
    let ttl = Duration::from_secs(secs);
    match memory::set_stm(&service.stores, req.user_id, &req.agent_id, &req.value, ttl).await {
        Ok(()) => (
            StatusCode::OK,
            serde_json::json!({
                "status": "stored",
                "user_id": req.user_id,
                "agent_id": req.agent_id,
                "expires_in_secs": ttl.as_secs(),
            }),
        ),
        Err(e) => internal_error("set stm", e),
    }
}

pub async fn get_stm_inner(
    service: &TravelService,
    user_id: i64,
    agent_id: &str,
) -> (StatusCode, serde_json::Value) {
    match memory::get_stm(&service.stores, user_id, agent_id).await {
        Ok(value) => (
            StatusCode::OK,
            serde_json::json!({ "user_id": user_id, "agent_id": agent_id, "value": value }),
        ),
        Err(e) => internal_error("get stm", e),
    }
}

pub async fn post_ltm_inner(
    service: &TravelService,
    user_id: i64,
    agent_id: &str,
    body: String,
) -> (StatusCode, serde_json::Value) {
    if body.trim().is_empty() {
        return bad_request("request body must contain the value to store");
    }
    match memory::set_ltm(&service.stores.pool, user_id, agent_id, &body).await {
        Ok(entry) => (
            StatusCode::OK,
            serde_json::json!({ "status": "stored", "entry": entry }),
        ),
        Err(e) => internal_error("store ltm", e),
    }
}

pub async fn get_ltm_inner(
    service: &TravelService,
    user_id: i64,
    agent_id: &str,
) -> (StatusCode, serde_json::Value) {
    match memory::ltm_by_agent(&service.stores.pool, user_id, agent_id, 100).await {
        Ok(entries) => (
            StatusCode::OK,
            serde_json::json!({ "user_id": user_id, "agent_id": agent_id, "count": entries.len(), "entries": entries }),
        ),
        Err(e) => internal_error("read ltm", e),
    }
}

pub async fn search_inner(
    service: &TravelService,
    query: SearchQuery,
) -> (StatusCode, serde_json::Value) {
    let text = match query.query {
        Some(q) if !q.trim().is_empty() => q,
        _ => return bad_request("query parameter is required"),
    };
    match memory::search(
        &service.stores,
        &service.config.memory,
        query.user_id,
        &text,
        query.agent_id.as_deref(),
    )
    .await
    {
        Ok(results) => (
            StatusCode::OK,
            serde_json::json!({ "query": text, "count": results.len(), "results": results }),
        ),
        Err(e) => internal_error("search", e),
    }
}

pub async fn cleanup_inner(service: &TravelService) -> (StatusCode, serde_json::Value) {
    let stats = retention::memory_statistics(
        &service.stores.pool,
        service.stores.stm.as_ref(),
        &service.config.retention,
    )
    .await;
    let report = retention::run_retention_sweep(
        &service.stores.pool,
        service.stores.stm.as_ref(),
        &service.config.retention,
    )
    .await;
    (
        StatusCode::OK,
        serde_json::json!({
            "total_removed": report.total_removed(),
            "emergency": report.emergency,
            "results": report.results,
            "memory_statistics": stats,
        }),
    )
}

// ============================================================================
// Axum handler wrappers (thin, delegate to inner functions)
// ============================================================================

pub async fn ping_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(ping_inner()))
}

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn agents_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(agents_inner()))
}

pub async fn ollama_status_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    (StatusCode::OK, Json(ollama_status_inner(&state.ollama).await))
}

pub async fn chat_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<ChatRequest>,
) -> impl IntoResponse {
    let (status, body) = chat_inner(&state.service, req).await;
    (status, Json(body))
}

pub async fn batch_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<BatchRequest>,
) -> impl IntoResponse {
    let (status, body) = batch_inner(&state.service, req).await;
    (status, Json(body))
}

pub async fn get_profile_handler(
    State(state): State<Arc<HttpState>>,
    Path(user_id): Path<i64>,
) -> impl IntoResponse {
    let (status, body) = get_profile_inner(&state.service, user_id).await;
    (status, Json(body))
}

pub async fn put_profile_handler(
    State(state): State<Arc<HttpState>>,
    Path(user_id): Path<i64>,
    Json(patch): Json<serde_json::Value>,
) -> impl IntoResponse {
    let (status, body) = put_profile_inner(&state.service, user_id, patch).await;
    (status, Json(body))
}

pub async fn list_sessions_handler(
    State(state): State<Arc<HttpState>>,
    Path(user_id): Path<i64>,
    Query(query): Query<SessionsQuery>,
) -> impl IntoResponse {
    let (status, body) = list_sessions_inner(&state.service, user_id, query).await;
    (status, Json(body))
}

pub async fn session_detail_handler(
    State(state): State<Arc<HttpState>>,
    Path((user_id, session_id)): Path<(i64, String)>,
) -> impl IntoResponse {
    let (status, body) = session_detail_inner(&state.service, user_id, &session_id).await;
    (status, Json(body))
}

pub async fn perfect_query_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<PerfectQueryRequest>,
) -> impl IntoResponse {
    let (status, body) = perfect_query_inner(&state.service, req).await;
    (status, Json(body))
}

pub async fn run_graph_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<RunGraphRequest>,
) -> impl IntoResponse {
    let (status, body) = run_graph_inner(&state.service, req).await;
    (status, Json(body))
}

pub async fn set_stm_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<SetStmRequest>,
) -> impl IntoResponse {
    let (status, body) = set_stm_inner(&state.service, req).await;
    (status, Json(body))
}

pub async fn get_stm_handler(
    State(state): State<Arc<HttpState>>,
    Path((user_id, agent_id)): Path<(i64, String)>,
) -> impl IntoResponse {
    let (status, body) = get_stm_inner(&state.service, user_id, &agent_id).await;
    (status, Json(body))
}

pub async fn post_ltm_handler(
    State(state): State<Arc<HttpState>>,
    Path((user_id, agent_id)): Path<(i64, String)>,
    body: String,
) -> impl IntoResponse {
    let (status, body) = post_ltm_inner(&state.service, user_id, &agent_id, body).await;
    (status, Json(body))
}

pub async fn get_ltm_handler(
    State(state): State<Arc<HttpState>>,
    Path((user_id, agent_id)): Path<(i64, String)>,
) -> impl IntoResponse {
    let (status, body) = get_ltm_inner(&state.service, user_id, &agent_id).await;
    (status, Json(body))
}

pub async fn search_handler(
    State(state): State<Arc<HttpState>>,
    Query(query): Query<SearchQuery>,
) -> impl IntoResponse {
    let (status, body) = search_inner(&state.service, query).await;
    (status, Json(body))
}

pub async fn cleanup_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = cleanup_inner(&state.service).await;
    (status, Json(body))
}

// ============================================================================
// Helpers
// ============================================================================

/// Standard error body.
pub fn error_json(msg: impl Into<String>) -> serde_json::Value {
    serde_json::json!({
        "error": msg.into(),
        "status": "error",
    })
}

fn bad_request(msg: &str) -> (StatusCode, serde_json::Value) {
    (StatusCode::BAD_REQUEST, error_json(msg))
}

fn internal_error(operation: &str, e: anyhow::Error) -> (StatusCode, serde_json::Value) {
    tracing::error!(operation, error = %e, "Request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, error_json(e.to_string()))
}

// ============================================================================
// Unit Tests: call inner functions directly
// ============================================================================
