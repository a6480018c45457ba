//! Flow: review a code attempt against the problem it is meant to solve.

use std::time::Instant;

use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, instrument};

use crate::config::{ModelSettings, Prompts};
use crate::domain::{AnalysisRequest, AnalysisResult};
use crate::error::{AnalysisError, SchemaError};
use crate::llm::{GenerativeModel, ModelRequest};
use crate::schema::{decode, require_non_blank, ModelOutput};
use crate::util::fill_template;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Review {
  suggestions: Vec<String>,
  overall_quality: String,
}

impl ModelOutput for Review {
  fn response_schema() -> serde_json::Value {
    json!({
      "type": "OBJECT",
      "properties": {
        "suggestions": { "type": "ARRAY", "items": { "type": "STRING" } },
        "overallQuality": { "type": "STRING" }
      },
      "required": ["suggestions", "overallQuality"]
    })
  }

  fn check(&self) -> Result<(), SchemaError> {
    require_non_blank("overallQuality", &self.overall_quality)
  }
}

pub fn build_prompt(prompts: &Prompts, request: &AnalysisRequest) -> String {
  fill_template(
    &prompts.analysis_user_template,
    &[
      ("language", request.language.as_str()),
      ("problem_description", &request.problem_description),
      ("code", &request.code),
    ],
  )
}

/// Code content is not validated here; callers gate on non-empty code.
#[instrument(
  level = "info",
  skip(model, prompts, settings, request),
  fields(language = %request.language, code_len = request.code.len(), description_len = request.problem_description.len())
)]
pub async fn analyze_code(
  model: &dyn GenerativeModel,
  prompts: &Prompts,
  settings: &ModelSettings,
  request: &AnalysisRequest,
) -> Result<AnalysisResult, AnalysisError> {
  let model_request = ModelRequest::prompt(build_prompt(prompts, request))
    .with_system(prompts.analysis_system.clone())
    .with_json_schema(Review::response_schema())
    .with_temperature(settings.analysis_temperature);

  let start = Instant::now();
  let reply = model.generate(model_request).await.map_err(|e| {
    error!(target: "flow", elapsed = ?start.elapsed(), error = %e, "Model call failed during code analysis");
    AnalysisError::from(e)
  })?;

  let Some(text) = reply.text else {
    return Err(AnalysisError::EmptyOutput { reason: reply.block_reason });
  };
  let review: Review = decode(&text)?;

  info!(target: "flow", elapsed = ?start.elapsed(), suggestions = review.suggestions.len(), "Code analysis complete");
  Ok(AnalysisResult { suggestions: review.suggestions, overall_quality: review.overall_quality })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::CodingLanguage;
  use crate::llm::testing::ScriptedModel;

  fn request(code: &str) -> AnalysisRequest {
    AnalysisRequest {
      code: code.into(),
      language: CodingLanguage::Python,
      problem_description: "Return the sum of a list.".into(),
    }
  }

  #[tokio::test]
  async fn passes_suggestions_through_in_order() {
    let body = json!({
      "suggestions": ["Use sum()", "Add type hints", "Handle empty input"],
      "overallQuality": "Correct but verbose."
    });
    let model = ScriptedModel::new().reply_text(body.to_string());
    let result = analyze_code(&model, &Prompts::default(), &ModelSettings::default(), &request("def f(xs): ..."))
      .await
      .unwrap();
    assert_eq!(result.suggestions, vec!["Use sum()", "Add type hints", "Handle empty input"]);
    assert_eq!(result.overall_quality, "Correct but verbose.");
  }

  #[tokio::test]
  async fn prompt_carries_code_language_and_description() {
    let model = ScriptedModel::new().reply_text(json!({"suggestions": [], "overallQuality": "ok"}).to_string());
    analyze_code(&model, &Prompts::default(), &ModelSettings::default(), &request("print(1)")).await.unwrap();

    let prompt = &model.requests()[0].turns[0].text;
    assert!(prompt.contains("written in python"));
    assert!(prompt.contains("Problem Description: Return the sum of a list."));
    assert!(prompt.contains("Code:\nprint(1)"));
    assert!(prompt.contains("'overallQuality'"));
  }

  #[tokio::test]
  async fn empty_code_is_still_sent() {
    let model = ScriptedModel::new().reply_text(json!({"suggestions": ["Write something"], "overallQuality": "No code."}).to_string());
    let result = analyze_code(&model, &Prompts::default(), &ModelSettings::default(), &request("")).await.unwrap();
    assert_eq!(result.suggestions.len(), 1);
    assert_eq!(model.requests().len(), 1);
  }

  #[tokio::test]
  async fn wrong_types_are_rejected() {
    let model = ScriptedModel::new().reply_text(json!({"suggestions": "just one", "overallQuality": "meh"}).to_string());
    let err = analyze_code(&model, &Prompts::default(), &ModelSettings::default(), &request("x")).await.unwrap_err();
    assert!(matches!(err, AnalysisError::Schema(SchemaError::Json(_))));
  }

  #[tokio::test]
  async fn provider_error_maps_to_analysis_error() {
    let model = ScriptedModel::new().fail(500, "boom");
    let err = analyze_code(&model, &Prompts::default(), &ModelSettings::default(), &request("x")).await.unwrap_err();
    assert!(matches!(err, AnalysisError::Model(_)));
  }
}
