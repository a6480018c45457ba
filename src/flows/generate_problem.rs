//! Flow: generate a LeetCode-style problem for a difficulty, topic set and language.

use std::time::Instant;

use serde::Deserialize;
use tracing::{debug, error, info, instrument};

use crate::config::{ModelSettings, Prompts};
use crate::domain::{Problem, ProblemSpec};
use crate::error::{GenerationError, SchemaError};
use crate::llm::{GenerativeModel, ModelRequest};
use crate::schema::{decode, require_non_blank, string_object, ModelOutput};
use crate::util::fill_template;

/// Problem as the model returns it. The echoed language is informational only.
#[derive(Debug, Deserialize)]
struct GeneratedProblem {
  title: String,
  description: String,
  constraints: String,
  examples: String,
  #[serde(default)]
  language: Option<String>,
}

impl ModelOutput for GeneratedProblem {
  fn response_schema() -> serde_json::Value {
    string_object(&["title", "description", "constraints", "examples", "language"])
  }

  fn check(&self) -> Result<(), SchemaError> {
    require_non_blank("title", &self.title)?;
    require_non_blank("description", &self.description)?;
    require_non_blank("constraints", &self.constraints)?;
    require_non_blank("examples", &self.examples)
  }
}

pub fn build_prompt(prompts: &Prompts, spec: &ProblemSpec) -> String {
  fill_template(
    &prompts.problem_user_template,
    &[
      ("difficulty", spec.difficulty().as_str()),
      ("topics", &spec.topics_joined()),
      ("language", spec.language().as_str()),
    ],
  )
}

#[instrument(
  level = "info",
  skip(model, prompts, settings, spec),
  fields(difficulty = %spec.difficulty(), topics = %spec.topics_joined(), language = %spec.language(), model = %model.name())
)]
pub async fn generate_problem(
  model: &dyn GenerativeModel,
  prompts: &Prompts,
  settings: &ModelSettings,
  spec: &ProblemSpec,
) -> Result<Problem, GenerationError> {
  let request = ModelRequest::prompt(build_prompt(prompts, spec))
    .with_system(prompts.problem_system.clone())
    .with_json_schema(GeneratedProblem::response_schema())
    .with_temperature(settings.problem_temperature);

  let start = Instant::now();
  let reply = match model.generate(request).await {
    Ok(r) => r,
    Err(e) => {
      error!(target: "flow", elapsed = ?start.elapsed(), error = %e, "Model call failed during problem generation");
      return Err(e.into());
    }
  };

  let Some(text) = reply.text else {
    return Err(GenerationError::EmptyOutput { reason: reply.block_reason });
  };
  let generated: GeneratedProblem = decode(&text)?;

  let requested = spec.language();
  if let Some(echoed) = generated.language.as_deref() {
    if !echoed.trim().eq_ignore_ascii_case(requested.as_str()) {
      debug!(target: "flow", %echoed, %requested, "Model echoed a different language; keeping the requested one");
    }
  }

  let problem = Problem {
    title: generated.title,
    description: generated.description,
    constraints: generated.constraints,
    examples: generated.examples,
    language: requested,
  };

  info!(
    target: "flow",
    elapsed = ?start.elapsed(),
    title_preview = %problem.title.chars().take(40).collect::<String>(),
    description_len = problem.description.len(),
    "Problem generated"
  );
  Ok(problem)
}
