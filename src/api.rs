//! REST API server for the assistant
//!
//! Serves the chat UI and exposes the assistant over JSON endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Html,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::assistant::{AskRequest, Assistant};
use crate::error::AssistantError;
use crate::models::{AgentKind, AnalysisType};
use crate::ui;

const DEFAULT_HISTORY_LIMIT: usize = 20;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Deserialize, Default)]
pub struct AskBody {
    #[serde(default)]
    pub query: String,
    pub agent: Option<String>,
    pub symbol: Option<String>,
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct AnalysisBody {
    pub analysis_type: Option<AnalysisType>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub session_id: Option<String>,
    pub limit: Option<usize>,
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

type ApiResult = (StatusCode, Json<ApiResponse>);

fn ok<T: Serialize>(data: T) -> ApiResult {
    (StatusCode::OK, Json(ApiResponse::success(data)))
}

fn fail(err: AssistantError) -> ApiResult {
    let status = status_for(&err);
    if status.is_server_error() {
        warn!(status = %status, error = %err, "Request failed");
    }
    (status, Json(ApiResponse::error(err.to_string())))
}

/// HTTP status for an assistant error.
pub fn status_for(err: &AssistantError) -> StatusCode {
    match err {
        e if e.is_client_error() => StatusCode::BAD_REQUEST,
        AssistantError::MissingCredential(_) => StatusCode::UNAUTHORIZED,
        AssistantError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        _ => StatusCode::BAD_GATEWAY,
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub assistant: Arc<Assistant>,
}

/// =============================
/// UI + Health
/// =============================

async fn index() -> Html<&'static str> {
    Html(ui::INDEX_HTML)
}

async fn health(State(state): State<ApiState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "api_key_configured": state.assistant.api_key_configured(),
        "model": state.assistant.model_id(),
    }))
}

async fn catalog(State(state): State<ApiState>) -> ApiResult {
    ok(state.assistant.catalog())
}

/// =============================
/// Ask Endpoint
/// =============================

async fn ask(State(state): State<ApiState>, Json(body): Json<AskBody>) -> ApiResult {
    let agent = match body.agent.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => match raw.parse::<AgentKind>() {
            Ok(kind) => kind,
            Err(e) => return fail(e),
        },
        None => AgentKind::default(),
    };

    info!(agent = ?agent, query_len = body.query.len(), "Received ask request");

    let request = AskRequest {
        query: body.query,
        agent,
        symbol: body.symbol,
        session_id: body.session_id,
    };

    match state.assistant.ask(request).await {
        Ok(response) => ok(response),
        Err(e) => fail(e),
    }
}

/// =============================
/// Stock Endpoints
/// =============================

async fn stock_snapshot(State(state): State<ApiState>, Path(symbol): Path<String>) -> ApiResult {
    match state.assistant.stock_snapshot(&symbol).await {
        Ok(snapshot) => ok(snapshot),
        Err(e) => fail(e),
    }
}

async fn stock_analysis(
    State(state): State<ApiState>,
    Path(symbol): Path<String>,
    body: Option<Json<AnalysisBody>>,
) -> ApiResult {
    let analysis_type = body
        .and_then(|Json(b)| b.analysis_type)
        .unwrap_or_default();

    info!(symbol = %symbol, analysis = analysis_type.label(), "Received stock analysis request");

    match state.assistant.analyze_stock(&symbol, analysis_type).await {
        Ok(analysis) => ok(analysis),
        Err(e) => fail(e),
    }
}

/// =============================
/// History Endpoints
/// =============================

async fn history(State(state): State<ApiState>, Query(params): Query<HistoryParams>) -> ApiResult {
    let history = state.assistant.history();
    let limit = params
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, history.capacity());

    let turns = history.recent(params.session_id.as_deref(), limit).await;
    ok(turns)
}

async fn clear_history(
    State(state): State<ApiState>,
    Query(params): Query<HistoryParams>,
) -> ApiResult {
    let removed = state
        .assistant
        .history()
        .clear(params.session_id.as_deref())
        .await;

    info!(removed, "Cleared chat history");
    ok(serde_json::json!({ "removed": removed }))
}

/// =============================
/// Router
/// =============================

pub fn create_router(assistant: Arc<Assistant>) -> Router {
    let state = ApiState { assistant };

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/catalog", get(catalog))
        .route("/api/ask", post(ask))
        .route("/api/stocks/:symbol", get(stock_snapshot))
        .route("/api/stocks/:symbol/analysis", post(stock_analysis))
        .route("/api/history", get(history).delete(clear_history))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    assistant: Arc<Assistant>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(assistant);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received");
}
