//! Telemetry initialization (tracing/tracing-subscriber).
//!
//! Behavior:
//! - LOG_LEVEL controls the filter (e.g. "debug" or detailed directives like
//!   "info,flow=debug,session=debug,algoace_backend=debug,tower_http=info").
//! - LOG_FORMAT selects "pretty" (default) or "json" structured logs.
//!
//! Targets used across the crate:
//! - `algoace_backend`: server boot, transport, websocket lifecycle
//! - `flow`: model calls (latency, token usage, sizes; never prompt bodies)
//! - `session`: controller transitions and discarded stale responses

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,algoace_backend=debug,flow=debug,session=debug,tower_http=info,axum=info";

pub fn init_tracing() {
  let filter = EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

  let builder = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_target(true)
    .with_file(true)
    .with_line_number(true);

  // Choose JSON vs pretty; the two builders have different types.
  match std::env::var("LOG_FORMAT").as_deref() {
    Ok("json") => builder.json().init(),
    _ => builder.init(),
  }
}
