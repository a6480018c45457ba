//! HTTP endpoint handlers. These are thin wrappers that forward to flows or controller logic.
//! Each handler is instrumented and logs parameters and basic result info.
//!
//! Stateless `/flows/*` endpoints report flow failures as HTTP errors. Session endpoints
//! follow the controller contract instead: a failed flow still answers 200 with the updated
//! session and an error notice.

use std::sync::Arc;

use axum::{
  extract::{Path, State},
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::domain::AnalysisRequest;
use crate::error::{AnalysisError, ChatError, GenerationError, SessionError};
use crate::flows::ChatRequest;
use crate::logic::{finish_chat, run_analysis, run_generate, start_chat};
use crate::protocol::*;
use crate::state::{AppState, SharedSession};

/// Error response with a stable code and a message safe to show to users.
#[derive(Debug)]
pub struct ApiError {
  status: StatusCode,
  code: &'static str,
  message: String,
}

impl ApiError {
  fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
    Self { status, code, message: message.into() }
  }

  fn model_unavailable() -> Self {
    Self::new(StatusCode::SERVICE_UNAVAILABLE, "model_unavailable", Notice::model_unavailable().description)
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let body = ErrorOut { error: ErrorDetail { code: self.code, message: self.message } };
    (self.status, Json(body)).into_response()
  }
}

impl From<SessionError> for ApiError {
  fn from(e: SessionError) -> Self {
    let (status, code) = match e {
      SessionError::NoProblem => (StatusCode::BAD_REQUEST, "no_problem"),
      SessionError::EmptyCode => (StatusCode::BAD_REQUEST, "empty_code"),
      SessionError::EmptyMessage => (StatusCode::BAD_REQUEST, "empty_message"),
      SessionError::Busy(_) => (StatusCode::CONFLICT, "busy"),
      SessionError::NotFound => (StatusCode::NOT_FOUND, "session_not_found"),
    };
    Self::new(status, code, Notice::for_session_error(&e).description)
  }
}

impl From<GenerationError> for ApiError {
  fn from(e: GenerationError) -> Self {
    match e {
      GenerationError::InvalidSpec(detail) => Self::new(StatusCode::BAD_REQUEST, "invalid_spec", detail),
      e if e.is_not_configured() => Self::model_unavailable(),
      e => {
        error!(target: "algoace_backend", error = %e, "Problem generation failed");
        Self::new(StatusCode::BAD_GATEWAY, "generation_failed", Notice::problem_failed().description)
      }
    }
  }
}

impl From<AnalysisError> for ApiError {
  fn from(e: AnalysisError) -> Self {
    if e.is_not_configured() {
      return Self::model_unavailable();
    }
    error!(target: "algoace_backend", error = %e, "Code analysis failed");
    Self::new(StatusCode::BAD_GATEWAY, "analysis_failed", Notice::analysis_failed().description)
  }
}

impl From<ChatError> for ApiError {
  fn from(e: ChatError) -> Self {
    if e.is_not_configured() {
      return Self::model_unavailable();
    }
    error!(target: "algoace_backend", error = %e, "Tutor chat failed");
    Self::new(StatusCode::BAD_GATEWAY, "chat_failed", "The assistant could not respond. Please try again.")
  }
}

async fn load_session(state: &AppState, id: &Uuid) -> Result<SharedSession, ApiError> {
  state.get_session(id).await.ok_or_else(|| SessionError::NotFound.into())
}

async fn session_out(session: &SharedSession, notice: Option<Notice>) -> Json<SessionOut> {
  Json(SessionOut { session: session.lock().await.view(), notice })
}

// --- meta ---

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(HealthOut { ok: true, model: state.flows.model_name().map(str::to_string) })
}

#[instrument(level = "info")]
pub async fn http_catalog() -> impl IntoResponse {
  Json(CatalogOut::build())
}

// --- stateless flows ---

#[instrument(level = "info", skip(state, body))]
pub async fn http_flow_generate_problem(
  State(state): State<Arc<AppState>>,
  Json(body): Json<ProblemSpecIn>,
) -> Result<impl IntoResponse, ApiError> {
  let spec = body.into_spec()?;
  let problem = state.flows.generate_problem(&spec).await?;
  info!(target: "algoace_backend", language = %problem.language, "HTTP problem generated");
  Ok(Json(problem))
}

#[instrument(level = "info", skip(state, body), fields(language = %body.language, code_len = body.code.len()))]
pub async fn http_flow_analyze_code(
  State(state): State<Arc<AppState>>,
  Json(body): Json<AnalysisRequest>,
) -> Result<impl IntoResponse, ApiError> {
  let analysis = state.flows.analyze_code(&body).await?;
  Ok(Json(analysis))
}

#[instrument(level = "info", skip(state, body), fields(message_len = body.user_message.len(), history = body.history.len()))]
pub async fn http_flow_chat(
  State(state): State<Arc<AppState>>,
  Json(body): Json<ChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
  let bot_response = state.flows.chat(&body).await?;
  Ok(Json(ChatFlowOut { bot_response }))
}

// --- sessions ---

#[instrument(level = "info", skip(state))]
pub async fn http_create_session(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let (_, session) = state.create_session().await;
  (StatusCode::CREATED, session_out(&session, None).await)
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_get_session(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
  let session = load_session(&state, &id).await?;
  Ok(session_out(&session, None).await)
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_delete_session(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
  if state.remove_session(&id).await {
    Ok(StatusCode::NO_CONTENT)
  } else {
    Err(SessionError::NotFound.into())
  }
}

#[instrument(level = "info", skip(state, body), fields(%id))]
pub async fn http_session_problem(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
  Json(body): Json<ProblemSpecIn>,
) -> Result<impl IntoResponse, ApiError> {
  let session = load_session(&state, &id).await?;
  // Validation happens before the session is touched or the model is called.
  let spec = body.into_spec()?;
  let notice = run_generate(&state.flows, &session, spec).await?;
  Ok(session_out(&session, notice).await)
}

#[instrument(level = "info", skip(state, body), fields(%id, code_len = body.code.len()))]
pub async fn http_session_code(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
  Json(body): Json<CodeIn>,
) -> Result<impl IntoResponse, ApiError> {
  let session = load_session(&state, &id).await?;
  session.lock().await.set_code(body.code);
  Ok(session_out(&session, None).await)
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_session_analysis(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
  let session = load_session(&state, &id).await?;
  let notice = run_analysis(&state.flows, &session).await?;
  Ok(session_out(&session, notice).await)
}

#[instrument(level = "info", skip(state, body), fields(%id, text_len = body.text.len()))]
pub async fn http_session_chat(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
  Json(body): Json<ChatIn>,
) -> Result<impl IntoResponse, ApiError> {
  let session = load_session(&state, &id).await?;
  let (ticket, request) = start_chat(&session, &body.text).await?;
  let outcome = finish_chat(&state.flows, &session, ticket, request).await;
  info!(target: "algoace_backend", session = %id, applied = ?outcome.applied, "HTTP chat turn settled");
  Ok(session_out(&session, None).await)
}

#[cfg(test)]
mod tests {
  use axum::{body::Body, http::Request, Router};
  use serde_json::{json, Value};
  use tower::ServiceExt;

  use super::*;
  use crate::config::AgentConfig;
  use crate::llm::testing::ScriptedModel;
  use crate::llm::GenerativeModel;
  use crate::routes::build_router;

  fn app(model: Option<ScriptedModel>) -> Router {
    let model = model.map(|m| Arc::new(m) as Arc<dyn GenerativeModel>);
    build_router(Arc::new(AppState::with_model(model, AgentConfig::default())), "./static")
  }

  async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    let body = match body {
      Some(v) => {
        req = req.header("content-type", "application/json");
        Body::from(v.to_string())
      }
      None => Body::empty(),
    };
    let res = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, value)
  }

  fn problem_body() -> String {
    json!({
      "title": "Max Subarray",
      "description": "Find the contiguous subarray with the largest sum.",
      "constraints": "1 <= n <= 10^5",
      "examples": "[-2,1,-3,4] -> 4",
      "language": "python"
    })
    .to_string()
  }

  #[tokio::test]
  async fn health_reports_model_name() {
    let (status, body) = call(&app(Some(ScriptedModel::new())), "GET", "/api/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ok": true, "model": "scripted"}));
  }

  #[tokio::test]
  async fn catalog_lists_vocabularies() {
    let (_, body) = call(&app(None), "GET", "/api/v1/catalog", None).await;
    assert_eq!(body["difficulties"], json!(["easy", "medium", "hard"]));
    assert_eq!(body["languages"].as_array().unwrap().len(), 14);
    assert_eq!(body["topics"][2], json!({"value": "Linked Lists", "label": "Linked Lists"}));
  }

  #[tokio::test]
  async fn stateless_generate_rejects_empty_topics() {
    let spec = json!({"difficulty": "easy", "topics": [], "language": "python"});
    let (status, body) = call(&app(Some(ScriptedModel::new())), "POST", "/api/v1/flows/generate-problem", Some(spec)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_spec");
  }

  #[tokio::test]
  async fn stateless_generate_forces_requested_language() {
    let model = ScriptedModel::new().reply_text(problem_body().replace("\"python\"", "\"java\""));
    let spec = json!({"difficulty": "easy", "topics": ["Arrays"], "language": "python"});
    let (status, body) = call(&app(Some(model)), "POST", "/api/v1/flows/generate-problem", Some(spec)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["language"], "python");
    assert_eq!(body["title"], "Max Subarray");
  }

  #[tokio::test]
  async fn stateless_chat_returns_bot_response() {
    let model = ScriptedModel::new().reply_text("Consider Kadane's idea.");
    let req = json!({
      "userMessage": "hint please",
      "context": {"title": "Max Subarray"},
      "history": [{"role": "user", "text": "hi"}, {"role": "model", "text": "hello"}]
    });
    let (status, body) = call(&app(Some(model)), "POST", "/api/v1/flows/chat", Some(req)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"botResponse": "Consider Kadane's idea."}));
  }

  #[tokio::test]
  async fn missing_model_is_service_unavailable() {
    let req = json!({"code": "x", "language": "go", "problemDescription": "d"});
    let (status, body) = call(&app(None), "POST", "/api/v1/flows/analyze-code", Some(req)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "model_unavailable");
  }

  #[tokio::test]
  async fn upstream_failure_hides_internal_detail() {
    let model = ScriptedModel::new().fail(500, "secret internal detail");
    let req = json!({"code": "x", "language": "go", "problemDescription": "d"});
    let (status, body) = call(&app(Some(model)), "POST", "/api/v1/flows/analyze-code", Some(req)).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(!body.to_string().contains("secret"));
  }

  #[tokio::test]
  async fn session_lifecycle_over_http() {
    let model = ScriptedModel::new()
      .reply_text(problem_body())
      .reply_text(json!({"suggestions": ["Use Kadane"], "overallQuality": "Quadratic."}).to_string())
      .reply_text("Think about the running maximum.");
    let app = app(Some(model));

    let (status, created) = call(&app, "POST", "/api/v1/sessions", None).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["session"]["id"].as_str().unwrap().to_string();
    let base = format!("/api/v1/sessions/{id}");

    // analysis before any problem exists
    let (status, body) = call(&app, "POST", &format!("{base}/analysis"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "no_problem");

    let spec = json!({"difficulty": "medium", "topics": "arrays, dynamic programming", "language": "python"});
    let (status, body) = call(&app, "POST", &format!("{base}/problem"), Some(spec)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["notice"]["level"], "success");
    assert_eq!(body["session"]["problem"]["language"], "python");
    assert_eq!(body["session"]["loading"]["problem"], false);

    let (_, body) = call(&app, "PUT", &format!("{base}/code"), Some(json!({"code": "def f(a): ..."}))).await;
    assert_eq!(body["session"]["code"], "def f(a): ...");

    let (status, body) = call(&app, "POST", &format!("{base}/analysis"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session"]["analysis"]["overallQuality"], "Quadratic.");

    let (status, body) = call(&app, "POST", &format!("{base}/chat"), Some(json!({"text": "stuck"}))).await;
    assert_eq!(status, StatusCode::OK);
    let transcript = body["session"]["transcript"].as_array().unwrap();
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript[0]["role"], "user");
    assert_eq!(transcript[1]["role"], "assistant");
    assert_eq!(transcript[1]["text"], "Think about the running maximum.");
    assert_eq!(transcript[1]["pending"], false);

    let (status, _) = call(&app, "DELETE", &base, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, body) = call(&app, "GET", &base, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "session_not_found");
  }

  #[tokio::test]
  async fn failed_generation_answers_with_error_notice() {
    let app = app(Some(ScriptedModel::new().reply_text("not json at all")));
    let (_, created) = call(&app, "POST", "/api/v1/sessions", None).await;
    let id = created["session"]["id"].as_str().unwrap().to_string();

    let spec = json!({"difficulty": "hard", "topics": ["Graphs"], "language": "rust"});
    let (status, body) = call(&app, "POST", &format!("/api/v1/sessions/{id}/problem"), Some(spec)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["notice"]["title"], "Error Generating Problem");
    assert_eq!(body["session"]["problem"], Value::Null);
    assert_eq!(body["session"]["language"], "javascript");
  }

  #[tokio::test]
  async fn expired_session_is_not_found() {
    let state = AppState::with_model(None, AgentConfig::default()).with_session_ttl(std::time::Duration::from_millis(20));
    let app = build_router(Arc::new(state), "./static");
    let (_, created) = call(&app, "POST", "/api/v1/sessions", None).await;
    let id = created["session"]["id"].as_str().unwrap().to_string();

    tokio::time::sleep(std::time::Duration::from_millis(40)).await;
    let (status, body) = call(&app, "GET", &format!("/api/v1/sessions/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "session_not_found");
  }
}
