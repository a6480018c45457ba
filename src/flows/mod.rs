//! The three model-backed flows.
//!
//! A flow is stateless: typed input → prompt template → one model call → strict decode →
//! typed output. [`Flows`] bundles the model handle with prompts and tuning so handlers and
//! the session controller only pass inputs around.

use std::sync::Arc;

use crate::config::{ModelSettings, Prompts};
use crate::domain::{AnalysisRequest, AnalysisResult, Problem, ProblemSpec};
use crate::error::{AnalysisError, ChatError, GenerationError, LlmError};
use crate::llm::GenerativeModel;

pub mod analyze_code;
pub mod chat_tutor;
pub mod generate_problem;

pub use chat_tutor::{ChatRequest, FALLBACK_REPLY};

#[derive(Clone)]
pub struct Flows {
  model: Option<Arc<dyn GenerativeModel>>,
  pub prompts: Prompts,
  pub settings: ModelSettings,
}

impl Flows {
  pub fn new(model: Option<Arc<dyn GenerativeModel>>, prompts: Prompts, settings: ModelSettings) -> Self {
    Self { model, prompts, settings }
  }

  pub fn model_name(&self) -> Option<&str> {
    self.model.as_deref().map(|m| m.name())
  }

  fn model(&self) -> Result<&dyn GenerativeModel, LlmError> {
    self.model.as_deref().ok_or(LlmError::NotConfigured)
  }

  pub async fn generate_problem(&self, spec: &ProblemSpec) -> Result<Problem, GenerationError> {
    generate_problem::generate_problem(self.model()?, &self.prompts, &self.settings, spec).await
  }

  pub async fn analyze_code(&self, request: &AnalysisRequest) -> Result<AnalysisResult, AnalysisError> {
    analyze_code::analyze_code(self.model()?, &self.prompts, &self.settings, request).await
  }

  pub async fn chat(&self, request: &ChatRequest) -> Result<String, ChatError> {
    chat_tutor::chat_tutor(self.model()?, &self.prompts, &self.settings, request).await
  }
}
