//! Minimal Gemini client for our use-cases.
//!
//! We only call `models/{model}:generateContent` and ask for either plain text or a JSON
//! object constrained by a response schema. Calls are instrumented and log the model name,
//! latency, token usage and response size (not contents).
//!
//! NOTE: the API key travels in the `x-goog-api-key` header so it never appears in a URL
//! that tower/reqwest might log.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use crate::error::LlmError;
use crate::llm::{GenerativeModel, ModelReply, ModelRequest, ModelRole, OutputFormat, SafetySetting, Usage};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Clone)]
pub struct Gemini {
  client: reqwest::Client,
  api_key: String,
  pub base_url: String,
  pub model: String,
}

impl Gemini {
  /// Construct the client if we find GEMINI_API_KEY (or GOOGLE_API_KEY); otherwise None.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("GEMINI_API_KEY")
      .or_else(|_| std::env::var("GOOGLE_API_KEY"))
      .ok()
      .filter(|k| !k.trim().is_empty())?;
    let base_url = std::env::var("GEMINI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());
    let model = std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.into());
    let timeout = std::env::var("GEMINI_TIMEOUT_SECS")
      .ok()
      .and_then(|s| s.parse::<u64>().ok())
      .unwrap_or(DEFAULT_TIMEOUT_SECS);

    match Self::new(api_key, base_url, model, Duration::from_secs(timeout)) {
      Ok(g) => Some(g),
      Err(e) => {
        error!(target: "algoace_backend", error = %e, "Failed to build Gemini HTTP client");
        None
      }
    }
  }

  pub fn new(api_key: String, base_url: String, model: String, timeout: Duration) -> Result<Self, LlmError> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    Ok(Self { client, api_key, base_url: base_url.trim_end_matches('/').to_string(), model })
  }

  fn endpoint(&self) -> String {
    let model = self.model.strip_prefix("models/").unwrap_or(&self.model);
    format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
  }
}

#[async_trait]
impl GenerativeModel for Gemini {
  fn name(&self) -> &str { &self.model }

  #[instrument(
    level = "info",
    skip(self, request),
    fields(model = %self.model, turns = request.turns.len(), json = matches!(request.format, OutputFormat::Json(_)))
  )]
  async fn generate(&self, request: ModelRequest) -> Result<ModelReply, LlmError> {
    let body = GenerateContentRequest::from(request);
    let start = Instant::now();

    let res = self.client.post(self.endpoint())
      .header(USER_AGENT, "algoace-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(API_KEY_HEADER, &self.api_key)
      .json(&body).send().await?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let message = extract_gemini_error(&body).unwrap_or(body);
      error!(target: "flow", status = status.as_u16(), elapsed = ?start.elapsed(), "Gemini returned an error status");
      return Err(LlmError::Api { status: status.as_u16(), message });
    }

    let body: GenerateContentResponse = res.json().await.map_err(|e| LlmError::Decode(e.to_string()))?;
    let reply = body.into_reply();

    if let Some(usage) = &reply.usage {
      info!(target: "flow", prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "Gemini usage");
    }
    match (&reply.text, &reply.block_reason) {
      (Some(t), _) => info!(target: "flow", elapsed = ?start.elapsed(), response_len = t.len(), "Gemini response received"),
      (None, Some(reason)) => warn!(target: "flow", elapsed = ?start.elapsed(), %reason, "Gemini withheld output"),
      (None, None) => warn!(target: "flow", elapsed = ?start.elapsed(), "Gemini returned no text"),
    }
    Ok(reply)
  }
}

// --- generateContent DTOs ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
  #[serde(skip_serializing_if = "Option::is_none")]
  system_instruction: Option<Content>,
  contents: Vec<Content>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  safety_settings: Vec<SafetySetting>,
  generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  role: Option<String>,
  #[serde(default)]
  parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
  #[serde(default)]
  text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
  #[serde(skip_serializing_if = "Option::is_none")]
  temperature: Option<f32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_mime_type: Option<&'static str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_schema: Option<serde_json::Value>,
}

impl From<ModelRequest> for GenerateContentRequest {
  fn from(r: ModelRequest) -> Self {
    let text_content = |role: Option<&str>, text: String| Content {
      role: role.map(str::to_string),
      parts: vec![Part { text: Some(text) }],
    };

    let (response_mime_type, response_schema) = match r.format {
      OutputFormat::Text => (None, None),
      OutputFormat::Json(schema) => (Some("application/json"), Some(schema)),
    };

    Self {
      system_instruction: r.system_instruction.map(|s| text_content(None, s)),
      contents: r
        .turns
        .into_iter()
        .map(|t| {
          let role = match t.role {
            ModelRole::User => "user",
            ModelRole::Model => "model",
          };
          text_content(Some(role), t.text)
        })
        .collect(),
      safety_settings: r.safety,
      generation_config: GenerationConfig { temperature: r.temperature, response_mime_type, response_schema },
    }
  }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
  #[serde(default)]
  candidates: Vec<Candidate>,
  #[serde(default)]
  prompt_feedback: Option<PromptFeedback>,
  #[serde(default)]
  usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
  #[serde(default)]
  content: Option<Content>,
  #[serde(default)]
  finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
  #[serde(default)]
  block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
  #[serde(default)] prompt_token_count: Option<u32>,
  #[serde(default)] candidates_token_count: Option<u32>,
  #[serde(default)] total_token_count: Option<u32>,
}

impl GenerateContentResponse {
  fn into_reply(self) -> ModelReply {
    let usage = self.usage_metadata.map(|u| Usage {
      prompt_tokens: u.prompt_token_count,
      completion_tokens: u.candidates_token_count,
      total_tokens: u.total_token_count,
    });

    let prompt_block = self.prompt_feedback.and_then(|f| f.block_reason);
    let first = self.candidates.into_iter().next();
    let finish_block = first
      .as_ref()
      .and_then(|c| c.finish_reason.as_deref())
      .filter(|r| matches!(*r, "SAFETY" | "PROHIBITED_CONTENT" | "BLOCKLIST"))
      .map(str::to_string);

    let text = first
      .and_then(|c| c.content)
      .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect::<String>())
      .map(|t| t.trim().to_string())
      .filter(|t| !t.is_empty());

    ModelReply { text, block_reason: prompt_block.or(finish_block), usage }
  }
}

/// Try to extract a clean error message from a Google API error body.
fn extract_gemini_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}
