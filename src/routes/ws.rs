//! WebSocket upgrade + message loop. Each connection owns one private session.
//!
//! Client messages are parsed as JSON. Quick operations reply inline; model-backed ones run
//! in their own task and push results through a channel, so a slow model call never blocks
//! the socket and a newer request can overtake an older one.

use std::sync::Arc;

use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, instrument};

use crate::error::GenerationError;
use crate::logic::{finish_chat, run_analysis, run_generate, start_chat};
use crate::protocol::{ClientWsMessage, Notice, ServerWsMessage};
use crate::session::{Applied, Session};
use crate::state::{AppState, SharedSession};

type Outbox = mpsc::UnboundedSender<ServerWsMessage>;

#[instrument(level = "info", skip(ws, state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "algoace_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  let session: SharedSession = Arc::new(Mutex::new(Session::new()));
  let session_id = session.lock().await.id();
  info!(target: "algoace_backend", session = %session_id, "WebSocket connected");

  let (tx, mut rx) = mpsc::unbounded_channel::<ServerWsMessage>();
  let _ = tx.send(ServerWsMessage::Session { session: session.lock().await.view() });

  loop {
    tokio::select! {
      incoming = socket.recv() => {
        let Some(Ok(msg)) = incoming else { break };
        match msg {
          Message::Text(txt) => match serde_json::from_str::<ClientWsMessage>(&txt) {
            Ok(incoming) => {
              debug!(target: "algoace_backend", "WS received: {:?}", &incoming);
              handle_client_ws(incoming, &state, &session, &tx).await;
            }
            Err(e) => {
              let _ = tx.send(ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) });
            }
          },
          Message::Ping(payload) => {
            let _ = socket.send(Message::Pong(payload)).await;
          }
          Message::Close(_) => break,
          _ => {}
        }
      }
      Some(out) = rx.recv() => {
        let out = serde_json::to_string(&out).unwrap_or_else(|e| {
          serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
        });
        if let Err(e) = socket.send(Message::Text(out)).await {
          error!(target: "algoace_backend", error = %e, "WS send error");
          break;
        }
      }
    }
  }
  info!(target: "algoace_backend", session = %session_id, "WebSocket disconnected");
}

fn push_session_and_notice(tx: &Outbox, session: &Session, notice: Option<Notice>) {
  let _ = tx.send(ServerWsMessage::Session { session: session.view() });
  if let Some(notice) = notice {
    let _ = tx.send(ServerWsMessage::Notice { notice });
  }
}

#[instrument(level = "info", skip(state, session, tx))]
async fn handle_client_ws(msg: ClientWsMessage, state: &Arc<AppState>, session: &SharedSession, tx: &Outbox) {
  match msg {
    ClientWsMessage::Ping => {
      let _ = tx.send(ServerWsMessage::Pong);
    }

    ClientWsMessage::GetSession => {
      push_session_and_notice(tx, &*session.lock().await, None);
    }

    ClientWsMessage::GenerateProblem { spec } => {
      let spec = match spec.into_spec() {
        Ok(spec) => spec,
        Err(GenerationError::InvalidSpec(detail)) => {
          let _ = tx.send(ServerWsMessage::Notice { notice: Notice::invalid_spec(&detail) });
          return;
        }
        Err(e) => {
          let _ = tx.send(ServerWsMessage::Error { message: e.to_string() });
          return;
        }
      };
      let (state, session, tx) = (state.clone(), session.clone(), tx.clone());
      tokio::spawn(async move {
        match run_generate(&state.flows, &session, spec).await {
          Ok(Some(notice)) => push_session_and_notice(&tx, &*session.lock().await, Some(notice)),
          Ok(None) => {}
          Err(e) => {
            let _ = tx.send(ServerWsMessage::Notice { notice: Notice::for_session_error(&e) });
          }
        }
      });
    }

    ClientWsMessage::UpdateCode { code } => {
      session.lock().await.set_code(code);
    }

    ClientWsMessage::AnalyzeCode => {
      let (state, session, tx) = (state.clone(), session.clone(), tx.clone());
      tokio::spawn(async move {
        match run_analysis(&state.flows, &session).await {
          Ok(Some(notice)) => push_session_and_notice(&tx, &*session.lock().await, Some(notice)),
          Ok(None) => {}
          Err(e) => {
            let _ = tx.send(ServerWsMessage::Notice { notice: Notice::for_session_error(&e) });
          }
        }
      });
    }

    ClientWsMessage::ChatMessage { text } => {
      let (ticket, request) = match start_chat(session, &text).await {
        Ok(started) => started,
        Err(e) => {
          let _ = tx.send(ServerWsMessage::Notice { notice: Notice::for_session_error(&e) });
          return;
        }
      };
      if let Some(id) = ticket.placeholder {
        let _ = tx.send(ServerWsMessage::ChatPending { id });
      }
      let (state, session, tx) = (state.clone(), session.clone(), tx.clone());
      tokio::spawn(async move {
        let outcome = finish_chat(&state.flows, &session, ticket, request).await;
        if outcome.applied != Applied::Stale {
          let _ = tx.send(ServerWsMessage::ChatReply { id: outcome.id, text: outcome.text });
        }
      });
    }
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;
  use crate::config::AgentConfig;
  use crate::llm::testing::ScriptedModel;
  use crate::llm::GenerativeModel;

  fn fixture(model: ScriptedModel) -> (Arc<AppState>, SharedSession, Outbox, mpsc::UnboundedReceiver<ServerWsMessage>) {
    let model: Arc<dyn GenerativeModel> = Arc::new(model);
    let state = Arc::new(AppState::with_model(Some(model), AgentConfig::default()));
    let (tx, rx) = mpsc::unbounded_channel();
    (state, Arc::new(Mutex::new(Session::new())), tx, rx)
  }

  fn parse(v: serde_json::Value) -> ClientWsMessage {
    serde_json::from_value(v).unwrap()
  }

  async fn next_json(rx: &mut mpsc::UnboundedReceiver<ServerWsMessage>) -> serde_json::Value {
    serde_json::to_value(rx.recv().await.unwrap()).unwrap()
  }

  #[tokio::test]
  async fn ping_and_invalid_spec_reply_inline() {
    let (state, session, tx, mut rx) = fixture(ScriptedModel::new());
    handle_client_ws(ClientWsMessage::Ping, &state, &session, &tx).await;
    assert_eq!(next_json(&mut rx).await["type"], "pong");

    let msg = parse(json!({"type": "generate_problem", "difficulty": "easy", "topics": [], "language": "go"}));
    handle_client_ws(msg, &state, &session, &tx).await;
    let out = next_json(&mut rx).await;
    assert_eq!(out["type"], "notice");
    assert_eq!(out["title"], "Invalid Problem Settings");
  }

  #[tokio::test]
  async fn generate_pushes_session_then_notice() {
    let body = json!({
      "title": "Two Sum",
      "description": "Find two indices whose values add to target.",
      "constraints": "2 <= n <= 10^4",
      "examples": "[2,7,11,15], 9 -> [0,1]",
    });
    let (state, session, tx, mut rx) = fixture(ScriptedModel::new().reply_text(body.to_string()));
    let msg = parse(json!({"type": "generate_problem", "difficulty": "easy", "topics": "arrays", "language": "kotlin"}));
    handle_client_ws(msg, &state, &session, &tx).await;

    let first = next_json(&mut rx).await;
    assert_eq!(first["type"], "session");
    assert_eq!(first["session"]["problem"]["title"], "Two Sum");
    assert_eq!(first["session"]["language"], "kotlin");
    let second = next_json(&mut rx).await;
    assert_eq!(second["type"], "notice");
    assert_eq!(second["level"], "success");
  }

  #[tokio::test]
  async fn chat_without_problem_is_refused() {
    let (state, session, tx, mut rx) = fixture(ScriptedModel::new());
    handle_client_ws(parse(json!({"type": "chat_message", "text": "hi"})), &state, &session, &tx).await;
    let out = next_json(&mut rx).await;
    assert_eq!(out["title"], "No Problem Loaded");
    assert!(session.lock().await.transcript().is_empty());
  }

  #[tokio::test]
  async fn chat_sends_pending_then_reply_for_same_id() {
    let problem = json!({"title": "T", "description": "D", "constraints": "C", "examples": "E"});
    let (state, session, tx, mut rx) =
      fixture(ScriptedModel::new().reply_text(problem.to_string()).reply_text("Try two pointers."));
    let msg = parse(json!({"type": "generate_problem", "difficulty": "easy", "topics": ["Arrays"], "language": "go"}));
    handle_client_ws(msg, &state, &session, &tx).await;
    next_json(&mut rx).await;
    next_json(&mut rx).await;

    handle_client_ws(parse(json!({"type": "chat_message", "text": "hint?"})), &state, &session, &tx).await;
    let pending = next_json(&mut rx).await;
    assert_eq!(pending["type"], "chat_pending");
    let reply = next_json(&mut rx).await;
    assert_eq!(reply["type"], "chat_reply");
    assert_eq!(reply["id"], pending["id"]);
    assert_eq!(reply["text"], "Try two pointers.");
  }
}
