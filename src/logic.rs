//! Controller behaviors shared by both HTTP and WebSocket handlers.
//!
//! Each operation follows the same shape: lock the session just long enough to `begin_*`,
//! run the flow with the lock released, then lock again to `complete_*`. Flow errors are
//! logged here with full detail and turned into a generic [`Notice`] for the user.
//!
//! Loading flags are enforced here: while a request of one kind is in flight for a session,
//! another of the same kind is refused with `SessionError::Busy`. A request future dropped
//! mid-call (client gone) still settles its ticket through [`InFlight`].

use tokio::runtime::Handle;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::domain::ProblemSpec;
use crate::error::SessionError;
use crate::flows::{ChatRequest, Flows};
use crate::protocol::Notice;
use crate::session::{Applied, FlowKind, Session, Ticket};
use crate::state::SharedSession;

/// Result of a chat turn once the model call has settled.
#[derive(Debug)]
pub struct ChatOutcome {
  pub id: Uuid,
  pub text: String,
  pub applied: Applied,
}

fn ensure_idle(session: &Session, kind: FlowKind) -> Result<(), SessionError> {
  if session.is_loading(kind) {
    return Err(SessionError::Busy(kind));
  }
  Ok(())
}

/// An issued ticket that has not been completed yet. Dropping it while armed abandons the
/// ticket on the session, so its loading flag cannot stay set forever.
struct InFlight {
  session: SharedSession,
  ticket: Ticket,
  armed: bool,
}

impl InFlight {
  fn new(session: &SharedSession, ticket: Ticket) -> Self {
    Self { session: session.clone(), ticket, armed: true }
  }

  fn disarm(mut self) -> Ticket {
    self.armed = false;
    self.ticket
  }
}

impl Drop for InFlight {
  fn drop(&mut self) {
    if !self.armed {
      return;
    }
    let ticket = self.ticket;
    if let Ok(mut s) = self.session.try_lock() {
      s.abandon(ticket);
      return;
    }
    // Lock is busy; settle as soon as it frees up.
    let session = self.session.clone();
    match Handle::try_current() {
      Ok(handle) => {
        handle.spawn(async move {
          session.lock().await.abandon(ticket);
        });
      }
      Err(_) => error!(target: "session", kind = %ticket.kind, "No runtime to settle an abandoned request"),
    }
  }
}

/// Generate a problem for the session. Returns `None` when a newer request superseded this one.
#[instrument(level = "info", skip(flows, session, spec), fields(difficulty = %spec.difficulty(), language = %spec.language()))]
pub async fn run_generate(flows: &Flows, session: &SharedSession, spec: ProblemSpec) -> Result<Option<Notice>, SessionError> {
  let (in_flight, session_id) = {
    let mut s = session.lock().await;
    ensure_idle(&s, FlowKind::Problem)?;
    (InFlight::new(session, s.begin_generate(&spec)), s.id())
  };

  let result = flows.generate_problem(&spec).await;
  let notice = match &result {
    Ok(p) => Notice::problem_generated(p.language),
    Err(e) => {
      error!(target: "session", session = %session_id, error = %e, "Failed to generate problem");
      if e.is_not_configured() { Notice::model_unavailable() } else { Notice::problem_failed() }
    }
  };

  let mut s = session.lock().await;
  let applied = s.complete_generate(in_flight.disarm(), result);
  info!(target: "session", session = %session_id, ?applied, "Problem request settled");
  Ok((applied != Applied::Stale).then_some(notice))
}

/// Analyze the session's current code against its problem.
#[instrument(level = "info", skip(flows, session))]
pub async fn run_analysis(flows: &Flows, session: &SharedSession) -> Result<Option<Notice>, SessionError> {
  let (in_flight, request, session_id) = {
    let mut s = session.lock().await;
    ensure_idle(&s, FlowKind::Analysis)?;
    let (ticket, request) = s.begin_analysis()?;
    (InFlight::new(session, ticket), request, s.id())
  };

  let result = flows.analyze_code(&request).await;
  let notice = match &result {
    Ok(_) => Notice::analysis_complete(),
    Err(e) => {
      error!(target: "session", session = %session_id, error = %e, "Failed to analyze code");
      if e.is_not_configured() { Notice::model_unavailable() } else { Notice::analysis_failed() }
    }
  };

  let mut s = session.lock().await;
  let applied = s.complete_analysis(in_flight.disarm(), result);
  info!(target: "session", session = %session_id, ?applied, "Analysis request settled");
  Ok((applied != Applied::Stale).then_some(notice))
}

/// Chat phase one: append the user turn and the pending placeholder.
/// Split from [`finish_chat`] so transports can render the placeholder right away.
#[instrument(level = "info", skip(session, text), fields(text_len = text.len()))]
pub async fn start_chat(session: &SharedSession, text: &str) -> Result<(Ticket, ChatRequest), SessionError> {
  let mut s = session.lock().await;
  ensure_idle(&s, FlowKind::Chat)?;
  s.begin_chat(text)
}

/// Chat phase two: call the tutor and replace the placeholder with the outcome.
#[instrument(level = "info", skip(flows, session, request), fields(history = request.history.len()))]
pub async fn finish_chat(flows: &Flows, session: &SharedSession, ticket: Ticket, request: ChatRequest) -> ChatOutcome {
  let in_flight = InFlight::new(session, ticket);
  let result = flows.chat(&request).await;
  if let Err(e) = &result {
    error!(target: "session", error = %e, "Tutor chat failed");
  }

  let mut s = session.lock().await;
  let applied = s.complete_chat(in_flight.disarm(), result);
  let id = ticket.placeholder.unwrap_or_default();
  let text = s
    .transcript()
    .iter()
    .find(|m| m.id == id)
    .map(|m| m.text.clone())
    .unwrap_or_default();
  ChatOutcome { id, text, applied }
}

#[cfg(test)]
mod tests {
  use std::{sync::Arc, time::Duration};

  use serde_json::json;

  use super::*;
  use crate::config::{ModelSettings, Prompts};
  use crate::domain::{CodingLanguage, Difficulty};
  use crate::flows::FALLBACK_REPLY;
  use crate::llm::testing::ScriptedModel;
  use crate::llm::GenerativeModel;
  use crate::protocol::NoticeLevel;
  use crate::session::CHAT_ERROR_REPLY;

  fn flows(model: ScriptedModel) -> (Flows, Arc<ScriptedModel>) {
    let model = Arc::new(model);
    let dyn_model: Arc<dyn GenerativeModel> = model.clone();
    (Flows::new(Some(dyn_model), Prompts::default(), ModelSettings::default()), model)
  }

  fn problem_body() -> String {
    json!({
      "title": "Running Sum",
      "description": "Return the running sum of an array.",
      "constraints": "1 <= n <= 1000",
      "examples": "[1,2,3] -> [1,3,6]",
      "language": "javascript"
    })
    .to_string()
  }

  fn new_session() -> SharedSession {
    Arc::new(tokio::sync::Mutex::new(Session::new()))
  }

  fn easy_arrays_python() -> ProblemSpec {
    ProblemSpec::new(Difficulty::Easy, &["Arrays"], CodingLanguage::Python).unwrap()
  }

  #[tokio::test]
  async fn generate_then_analyze_end_to_end() {
    let (flows, model) = flows(
      ScriptedModel::new()
        .reply_text(problem_body())
        .reply_text(json!({"suggestions": [], "overallQuality": "Fine for a one-liner."}).to_string()),
    );
    let session = new_session();

    let notice = run_generate(&flows, &session, easy_arrays_python()).await.unwrap().unwrap();
    assert_eq!(notice.level, NoticeLevel::Success);
    {
      let s = session.lock().await;
      let p = s.problem().unwrap();
      assert!(!p.title.is_empty() && !p.description.is_empty() && !p.constraints.is_empty() && !p.examples.is_empty());
      assert_eq!(p.language, CodingLanguage::Python);
    }

    session.lock().await.set_code("print(sum([1, 2, 3]))");
    let notice = run_analysis(&flows, &session).await.unwrap().unwrap();
    assert_eq!(notice.level, NoticeLevel::Success);

    let s = session.lock().await;
    assert!(!s.analysis().unwrap().overall_quality.is_empty());
    let analysis_prompt = &model.requests()[1].turns[0].text;
    assert!(analysis_prompt.contains("Return the running sum of an array."));
  }

  #[tokio::test]
  async fn generation_failure_surfaces_generic_notice() {
    let (flows, _) = flows(ScriptedModel::new().fail(500, "internal detail: quota project 1234"));
    let session = new_session();

    let notice = run_generate(&flows, &session, easy_arrays_python()).await.unwrap().unwrap();
    assert_eq!(notice.level, NoticeLevel::Error);
    assert!(!notice.description.contains("1234"));

    let s = session.lock().await;
    assert!(s.problem().is_none());
    assert_eq!(s.language(), CodingLanguage::Javascript);
    assert!(!s.is_loading(FlowKind::Problem));
  }

  #[tokio::test]
  async fn analysis_is_never_invoked_for_empty_code() {
    let (flows, model) = flows(ScriptedModel::new().reply_text(problem_body()));
    let session = new_session();
    run_generate(&flows, &session, easy_arrays_python()).await.unwrap();

    let err = run_analysis(&flows, &session).await.unwrap_err();
    assert_eq!(err, SessionError::EmptyCode);
    assert_eq!(model.requests().len(), 1);
  }

  #[tokio::test]
  async fn busy_flow_kind_is_refused() {
    let (flows, _) = flows(ScriptedModel::new());
    let session = new_session();
    session.lock().await.begin_generate(&easy_arrays_python());

    let err = run_generate(&flows, &session, easy_arrays_python()).await.unwrap_err();
    assert_eq!(err, SessionError::Busy(FlowKind::Problem));
  }

  #[tokio::test]
  async fn chat_round_trip_replaces_placeholder() {
    let (flows, model) = flows(ScriptedModel::new().reply_text(problem_body()).reply_text("Try a prefix sum."));
    let session = new_session();
    run_generate(&flows, &session, easy_arrays_python()).await.unwrap();

    let (ticket, request) = start_chat(&session, "Where do I start?").await.unwrap();
    assert!(session.lock().await.is_loading(FlowKind::Chat));
    assert!(start_chat(&session, "again").await.is_err());

    let outcome = finish_chat(&flows, &session, ticket, request).await;
    assert_eq!(outcome.applied, Applied::Success);
    assert_eq!(outcome.text, "Try a prefix sum.");
    assert_eq!(Some(outcome.id), ticket.placeholder);

    let system = model.requests()[1].system_instruction.clone().unwrap();
    assert!(system.contains("Running Sum"));
  }

  #[tokio::test]
  async fn chat_failure_and_empty_reply_never_leave_blank_turns() {
    let (flows, _) = flows(
      ScriptedModel::new()
        .reply_text(problem_body())
        .fail(500, "down")
        .reply(crate::llm::ModelReply::default()),
    );
    let session = new_session();
    run_generate(&flows, &session, easy_arrays_python()).await.unwrap();

    let (t, r) = start_chat(&session, "one").await.unwrap();
    let outcome = finish_chat(&flows, &session, t, r).await;
    assert_eq!((outcome.applied, outcome.text.as_str()), (Applied::Failure, CHAT_ERROR_REPLY));

    let (t, r) = start_chat(&session, "two").await.unwrap();
    let outcome = finish_chat(&flows, &session, t, r).await;
    assert_eq!((outcome.applied, outcome.text.as_str()), (Applied::Success, FALLBACK_REPLY));
  }

  #[tokio::test]
  async fn dropped_generate_request_frees_the_session() {
    let (flows, _) = flows(ScriptedModel::new().hang().reply_text(problem_body()));
    let session = new_session();

    // The client goes away while the model is still working.
    let cut = tokio::time::timeout(Duration::from_millis(50), run_generate(&flows, &session, easy_arrays_python())).await;
    assert!(cut.is_err());
    {
      let s = session.lock().await;
      assert!(!s.is_loading(FlowKind::Problem));
      assert!(s.problem().is_none());
      assert_eq!(s.language(), CodingLanguage::Javascript);
    }

    let notice = run_generate(&flows, &session, easy_arrays_python()).await.unwrap().unwrap();
    assert_eq!(notice.level, NoticeLevel::Success);
    assert_eq!(session.lock().await.problem().unwrap().language, CodingLanguage::Python);
  }

  #[tokio::test]
  async fn dropped_analysis_request_frees_the_session() {
    let (flows, _) = flows(ScriptedModel::new().reply_text(problem_body()).hang());
    let session = new_session();
    run_generate(&flows, &session, easy_arrays_python()).await.unwrap();
    session.lock().await.set_code("x = 1");

    let cut = tokio::time::timeout(Duration::from_millis(50), run_analysis(&flows, &session)).await;
    assert!(cut.is_err());
    assert!(!session.lock().await.is_loading(FlowKind::Analysis));
  }

  #[tokio::test]
  async fn dropped_chat_request_settles_its_placeholder() {
    let (flows, _) = flows(ScriptedModel::new().reply_text(problem_body()).hang().reply_text("Use a prefix sum."));
    let session = new_session();
    run_generate(&flows, &session, easy_arrays_python()).await.unwrap();

    let (t, r) = start_chat(&session, "hint?").await.unwrap();
    let cut = tokio::time::timeout(Duration::from_millis(50), finish_chat(&flows, &session, t, r)).await;
    assert!(cut.is_err());
    {
      let s = session.lock().await;
      assert!(!s.is_loading(FlowKind::Chat));
      assert_eq!(s.transcript().last().unwrap().text, CHAT_ERROR_REPLY);
    }

    let (t, r) = start_chat(&session, "again").await.unwrap();
    let outcome = finish_chat(&flows, &session, t, r).await;
    assert_eq!(outcome.text, "Use a prefix sum.");
  }
}
