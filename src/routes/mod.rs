//! Router assembly: HTTP endpoints, WebSocket upgrade, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;
pub mod ws;

/// Build the application router with:
/// - WebSocket at `/ws` (one private session per connection)
/// - REST-ish API under `/api/v1/...` (stateless flows + stored sessions)
/// - Static SPA from `static_dir` with index fallback
/// - CORS (allow any origin/method/headers); tighten for production
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>, static_dir: &str) -> Router {
    let static_service = ServeDir::new(static_dir)
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new(format!("{static_dir}/index.html")));

    Router::new()
        // WebSocket
        .route("/ws", get(ws::ws_upgrade))
        // Meta
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/catalog", get(http::http_catalog))
        // Stateless flows
        .route("/api/v1/flows/generate-problem", post(http::http_flow_generate_problem))
        .route("/api/v1/flows/analyze-code", post(http::http_flow_analyze_code))
        .route("/api/v1/flows/chat", post(http::http_flow_chat))
        // Sessions
        .route("/api/v1/sessions", post(http::http_create_session))
        .route(
            "/api/v1/sessions/:id",
            get(http::http_get_session).delete(http::http_delete_session),
        )
        .route("/api/v1/sessions/:id/problem", post(http::http_session_problem))
        .route("/api/v1/sessions/:id/code", put(http::http_session_code))
        .route("/api/v1/sessions/:id/analysis", post(http::http_session_analysis))
        .route("/api/v1/sessions/:id/chat", post(http::http_session_chat))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Frontend fallback
        .fallback_service(static_service)
}
