//! Provider-neutral boundary to the generative model.
//!
//! Flows build a [`ModelRequest`] and hand it to whatever implements [`GenerativeModel`]
//! (the Gemini client in production, a scripted fake in tests).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelRole {
  User,
  Model,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelTurn {
  pub role: ModelRole,
  pub text: String,
}

impl ModelTurn {
  pub fn user(text: impl Into<String>) -> Self {
    Self { role: ModelRole::User, text: text.into() }
  }
}

/// Shape the model is asked to answer in.
#[derive(Clone, Debug, PartialEq)]
pub enum OutputFormat {
  Text,
  /// JSON object conforming to the given (OpenAPI-subset) schema.
  Json(serde_json::Value),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HarmCategory {
  #[serde(rename = "HARM_CATEGORY_HATE_SPEECH")]
  HateSpeech,
  #[serde(rename = "HARM_CATEGORY_SEXUALLY_EXPLICIT")]
  SexuallyExplicit,
  #[serde(rename = "HARM_CATEGORY_HARASSMENT")]
  Harassment,
  #[serde(rename = "HARM_CATEGORY_DANGEROUS_CONTENT")]
  DangerousContent,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SafetyThreshold {
  BlockNone,
  BlockLowAndAbove,
  BlockMediumAndAbove,
  BlockOnlyHigh,
}

impl Default for SafetyThreshold {
  fn default() -> Self { SafetyThreshold::BlockMediumAndAbove }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetySetting {
  pub category: HarmCategory,
  pub threshold: SafetyThreshold,
}

/// Hate speech, sexual content, harassment and dangerous content, all at one threshold.
pub fn standard_safety(threshold: SafetyThreshold) -> Vec<SafetySetting> {
  [
    HarmCategory::HateSpeech,
    HarmCategory::SexuallyExplicit,
    HarmCategory::Harassment,
    HarmCategory::DangerousContent,
  ]
  .into_iter()
  .map(|category| SafetySetting { category, threshold })
  .collect()
}

#[derive(Clone, Debug, PartialEq)]
pub struct ModelRequest {
  pub system_instruction: Option<String>,
  pub turns: Vec<ModelTurn>,
  pub format: OutputFormat,
  pub safety: Vec<SafetySetting>,
  pub temperature: Option<f32>,
}

impl ModelRequest {
  /// Single user prompt with no system instruction, answered as plain text.
  pub fn prompt(text: impl Into<String>) -> Self {
    Self {
      system_instruction: None,
      turns: vec![ModelTurn::user(text)],
      format: OutputFormat::Text,
      safety: Vec::new(),
      temperature: None,
    }
  }

  pub fn with_system(mut self, system: impl Into<String>) -> Self {
    self.system_instruction = Some(system.into());
    self
  }

  pub fn with_json_schema(mut self, schema: serde_json::Value) -> Self {
    self.format = OutputFormat::Json(schema);
    self
  }

  pub fn with_temperature(mut self, temperature: f32) -> Self {
    self.temperature = Some(temperature);
    self
  }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Usage {
  pub prompt_tokens: Option<u32>,
  pub completion_tokens: Option<u32>,
  pub total_tokens: Option<u32>,
}

/// What came back. `text` is `None` when the model produced nothing usable,
/// including when safety filtering withheld the answer (`block_reason` says why).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModelReply {
  pub text: Option<String>,
  pub block_reason: Option<String>,
  pub usage: Option<Usage>,
}

#[cfg(test)]
impl ModelReply {
  pub fn text(text: impl Into<String>) -> Self {
    Self { text: Some(text.into()), ..Self::default() }
  }

  pub fn blocked(reason: impl Into<String>) -> Self {
    Self { block_reason: Some(reason.into()), ..Self::default() }
  }
}

#[async_trait]
pub trait GenerativeModel: Send + Sync {
  /// Model identifier, for logs and the health endpoint.
  fn name(&self) -> &str;

  async fn generate(&self, request: ModelRequest) -> Result<ModelReply, LlmError>;
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn safety_settings_use_provider_wire_names() {
    let v = serde_json::to_value(standard_safety(SafetyThreshold::BlockMediumAndAbove)).unwrap();
    assert_eq!(
      v,
      serde_json::json!([
        {"category": "HARM_CATEGORY_HATE_SPEECH", "threshold": "BLOCK_MEDIUM_AND_ABOVE"},
        {"category": "HARM_CATEGORY_SEXUALLY_EXPLICIT", "threshold": "BLOCK_MEDIUM_AND_ABOVE"},
        {"category": "HARM_CATEGORY_HARASSMENT", "threshold": "BLOCK_MEDIUM_AND_ABOVE"},
        {"category": "HARM_CATEGORY_DANGEROUS_CONTENT", "threshold": "BLOCK_MEDIUM_AND_ABOVE"},
      ])
    );
  }
}
