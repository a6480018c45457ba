//! Error taxonomy.
//!
//! Each flow has its own error type so callers can tell a failed problem generation from a
//! failed analysis or chat turn. A safety-filtered chat reply is not an error at all; the
//! tutor flow substitutes a fallback message instead.

use thiserror::Error;

use crate::session::FlowKind;

/// Failures at the model provider boundary.
#[derive(Debug, Error)]
pub enum LlmError {
  #[error("generative model is not configured")]
  NotConfigured,

  #[error("HTTP request failed: {0}")]
  Http(#[from] reqwest::Error),

  #[error("provider returned HTTP {status}: {message}")]
  Api { status: u16, message: String },

  #[error("failed to decode provider response: {0}")]
  Decode(String),
}

/// Model output that does not match the declared shape.
#[derive(Debug, Error)]
pub enum SchemaError {
  #[error("output is not valid JSON for the declared schema: {0}")]
  Json(#[from] serde_json::Error),

  #[error("output violates the declared schema: {0}")]
  Invalid(String),
}

#[derive(Debug, Error)]
pub enum GenerationError {
  #[error("invalid problem spec: {0}")]
  InvalidSpec(String),

  #[error("model call failed: {0}")]
  Model(#[from] LlmError),

  #[error("model returned no output (block reason: {reason:?})")]
  EmptyOutput { reason: Option<String> },

  #[error("model output rejected: {0}")]
  Schema(#[from] SchemaError),
}

#[derive(Debug, Error)]
pub enum AnalysisError {
  #[error("model call failed: {0}")]
  Model(#[from] LlmError),

  #[error("model returned no output (block reason: {reason:?})")]
  EmptyOutput { reason: Option<String> },

  #[error("model output rejected: {0}")]
  Schema(#[from] SchemaError),
}

#[derive(Debug, Error)]
pub enum ChatError {
  #[error("model call failed: {0}")]
  Model(#[from] LlmError),
}

/// Controller-level precondition failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
  #[error("no problem has been generated yet")]
  NoProblem,

  #[error("there is no code to analyze")]
  EmptyCode,

  #[error("message is empty")]
  EmptyMessage,

  #[error("a {0} request is already in flight")]
  Busy(FlowKind),

  #[error("session not found")]
  NotFound,
}

impl GenerationError {
  pub fn is_not_configured(&self) -> bool {
    matches!(self, GenerationError::Model(LlmError::NotConfigured))
  }
}

impl AnalysisError {
  pub fn is_not_configured(&self) -> bool {
    matches!(self, AnalysisError::Model(LlmError::NotConfigured))
  }
}

impl ChatError {
  pub fn is_not_configured(&self) -> bool {
    matches!(self, ChatError::Model(LlmError::NotConfigured))
  }
}
