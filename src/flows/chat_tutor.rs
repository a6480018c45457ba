//! Flow: one tutor turn.
//!
//! The system instruction is the fixed tutor persona plus whatever problem context is
//! known. The whole prior transcript is replayed before the new message. An empty or
//! safety-blocked reply becomes [`FALLBACK_REPLY`] so a session never shows a blank turn.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use crate::config::{ModelSettings, Prompts};
use crate::domain::{ChatRole, ChatTurn, ProblemContext};
use crate::error::ChatError;
use crate::llm::{standard_safety, GenerativeModel, ModelRequest, ModelRole, ModelTurn, OutputFormat};
use crate::util::{non_blank, truncate_with_ellipsis};

pub const FALLBACK_REPLY: &str = "I'm sorry, I couldn't generate a response right now. Please try again.";

/// Problem descriptions longer than this many chars are cut before entering the prompt.
pub const DESCRIPTION_PROMPT_LIMIT: usize = 300;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
  pub user_message: String,
  #[serde(default)]
  pub context: ProblemContext,
  #[serde(default)]
  pub history: Vec<ChatTurn>,
}

pub fn build_system_instruction(base: &str, context: &ProblemContext) -> String {
  let mut out = base.to_string();
  if let Some(title) = non_blank(context.title.as_deref()) {
    out.push_str(&format!("\n\nThe user is currently working on the problem titled: \"{title}\"."));
  }
  if let Some(description) = non_blank(context.description.as_deref()) {
    let short = truncate_with_ellipsis(description, DESCRIPTION_PROMPT_LIMIT);
    out.push_str(&format!("\nProblem Description: \"{short}\"."));
  }
  if let Some(code) = non_blank(context.code.as_deref()) {
    out.push_str(&format!("\nUser's current code attempt:\n```\n{code}\n```"));
  }
  out
}

pub fn build_turns(history: &[ChatTurn], user_message: &str) -> Vec<ModelTurn> {
  history
    .iter()
    .map(|t| ModelTurn {
      role: match t.role {
        ChatRole::User => ModelRole::User,
        ChatRole::Assistant => ModelRole::Model,
      },
      text: t.text.clone(),
    })
    .chain(std::iter::once(ModelTurn::user(user_message)))
    .collect()
}

#[instrument(
  level = "info",
  skip(model, prompts, settings, request),
  fields(message_len = request.user_message.len(), history = request.history.len(), has_title = request.context.title.is_some())
)]
pub async fn chat_tutor(
  model: &dyn GenerativeModel,
  prompts: &Prompts,
  settings: &ModelSettings,
  request: &ChatRequest,
) -> Result<String, ChatError> {
  let model_request = ModelRequest {
    system_instruction: Some(build_system_instruction(&prompts.tutor_system, &request.context)),
    turns: build_turns(&request.history, &request.user_message),
    format: OutputFormat::Text,
    safety: standard_safety(settings.safety_threshold),
    temperature: Some(settings.chat_temperature),
  };

  let start = Instant::now();
  let reply = model.generate(model_request).await.map_err(|e| {
    error!(target: "flow", elapsed = ?start.elapsed(), error = %e, "Model call failed during tutor chat");
    ChatError::from(e)
  })?;

  match reply.text {
    Some(text) if !text.trim().is_empty() => {
      info!(target: "flow", elapsed = ?start.elapsed(), reply_len = text.len(), "Tutor reply generated");
      Ok(text)
    }
    _ => {
      warn!(target: "flow", block_reason = ?reply.block_reason, "Tutor produced no text; using fallback reply");
      Ok(FALLBACK_REPLY.to_string())
    }
  }
}
