//! Loading agent configuration (prompt templates + model tuning) from TOML.
//!
//! Every key is optional; anything missing falls back to the defaults below.
//!
//! ```toml
//! [prompts]
//! tutor_system = "..."
//!
//! [model]
//! chat_temperature = 0.5
//! safety_threshold = "BLOCK_ONLY_HIGH"
//! ```

use serde::Deserialize;
use tracing::{error, info};

use crate::llm::SafetyThreshold;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AgentConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub model: ModelSettings,
}

/// Prompt templates. Placeholders are `{name}` and are filled by `fill_template`.
///
/// - problem: `{difficulty}`, `{topics}`, `{language}`
/// - analysis: `{language}`, `{problem_description}`, `{code}`
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub problem_system: String,
  pub problem_user_template: String,
  pub analysis_system: String,
  pub analysis_user_template: String,
  /// Fixed behavioural instruction for the tutor; problem context is appended to it.
  pub tutor_system: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      problem_system: "You are a coding interview problem generator. Respond ONLY with strict JSON.".into(),
      problem_user_template: "Generate a LeetCode-style coding problem based on the following criteria:\n\nDifficulty: {difficulty}\nTopics: {topics}\nLanguage: {language}\n\nReturn a JSON object with exactly these string fields:\n- title: the problem title\n- description: the detailed problem statement\n- constraints: the input constraints\n- examples: example inputs and expected outputs, with short explanations\n- language: the language above".into(),
      analysis_system: "You are an AI code analysis tool that provides suggestions for improving code quality. Respond ONLY with strict JSON.".into(),
      analysis_user_template: "Analyze the following code, written in {language}, which attempts to solve the problem described below, and provide specific, actionable suggestions for improvement.\n\nProblem Description: {problem_description}\n\nCode:\n{code}\n\nFocus on aspects such as:\n- Code clarity and readability\n- Efficiency and performance\n- Potential bugs and errors\n- Adherence to best practices for the specified language ({language})\n\nProvide an overall assessment of the code quality and a list of suggestions for improvement.\nFormat the output as a JSON object with 'suggestions' (an array of strings) and 'overallQuality' (a string).".into(),
      tutor_system: "You are AlgoAce, a friendly and expert AI coding tutor. Your primary goal is to help users understand and solve coding problems.\nProvide hints, explain concepts, and ask guiding questions to lead the user towards the solution.\nNEVER give away the direct solution or write complete code snippets that solve the core problem.\nBe encouraging, patient, and keep your responses concise and easy to understand.\nIf the user asks for the solution directly, politely decline and offer a hint or a concept explanation instead.\nIf the user provides code, you can comment on it constructively, pointing out potential issues or areas for improvement, but avoid rewriting it for them.\nTailor your explanations to a beginner/intermediate level unless the user's questions suggest a more advanced understanding.".into(),
    }
  }
}

/// Sampling and safety knobs per flow.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
  pub problem_temperature: f32,
  pub analysis_temperature: f32,
  pub chat_temperature: f32,
  pub safety_threshold: SafetyThreshold,
}

impl Default for ModelSettings {
  fn default() -> Self {
    Self {
      problem_temperature: 0.9,
      analysis_temperature: 0.2,
      chat_temperature: 0.7,
      safety_threshold: SafetyThreshold::BlockMediumAndAbove,
    }
  }
}

pub fn parse_agent_config(s: &str) -> Result<AgentConfig, toml::de::Error> {
  toml::from_str::<AgentConfig>(s)
}

/// Attempt to load `AgentConfig` from AGENT_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_agent_config_from_env() -> Option<AgentConfig> {
  let path = std::env::var("AGENT_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match parse_agent_config(&s) {
      Ok(cfg) => {
        info!(target: "algoace_backend", %path, "Loaded agent config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "algoace_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "algoace_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
