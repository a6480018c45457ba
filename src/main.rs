//! AlgoAce · Coding Interview Coach Backend
//!
//! - Axum HTTP + WebSocket API
//! - Gemini-backed flows: problem generation, code analysis, tutor chat
//! - Static SPA fallback (STATIC_DIR/index.html)
//!
//! Important env variables:
//!   PORT                : u16 (default 3000)
//!   STATIC_DIR          : frontend bundle directory (default "./static")
//!   GEMINI_API_KEY      : enables the Gemini integration (GOOGLE_API_KEY also accepted)
//!   GEMINI_BASE_URL     : default "https://generativelanguage.googleapis.com"
//!   GEMINI_MODEL        : default "gemini-2.0-flash"
//!   GEMINI_TIMEOUT_SECS : per-request timeout (default 30)
//!   AGENT_CONFIG_PATH   : path to TOML config (prompts + model settings)
//!   SESSION_TTL_SECS    : idle session lifetime (default 3600)
//!   LOG_LEVEL           : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT          : "pretty" (default) or "json"

mod config;
mod domain;
mod error;
mod flows;
mod gemini;
mod llm;
mod logic;
mod protocol;
mod routes;
mod schema;
mod session;
mod state;
mod telemetry;
mod util;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument, warn};

use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Build shared application state (session store, Gemini client, prompts).
  let state = Arc::new(AppState::new());
  let sweeper = state.spawn_session_sweeper();

  let static_dir = std::env::var("STATIC_DIR").unwrap_or_else(|_| "./static".to_string());
  let app = build_router(state, &static_dir);

  // Read port from env or default to 3000.
  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "algoace_backend", %addr, %static_dir, "HTTP server listening");
  axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
  sweeper.abort();
  info!(target: "algoace_backend", "Server stopped");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    warn!(target: "algoace_backend", error = %e, "Failed to listen for Ctrl-C; shutting down");
    return;
  }
  info!(target: "algoace_backend", "Shutdown signal received");
}
