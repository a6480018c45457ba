//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{CodingLanguage, Difficulty, ProblemSpec, Topic};
use crate::error::{GenerationError, SessionError};
use crate::session::SessionView;

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    GetSession,
    GenerateProblem {
        #[serde(flatten)]
        spec: ProblemSpecIn,
    },
    UpdateCode {
        code: String,
    },
    AnalyzeCode,
    ChatMessage {
        text: String,
    },
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Session {
        session: SessionView,
    },
    /// Sent before the tutor is called so the client can render a pending bubble.
    ChatPending {
        id: Uuid,
    },
    ChatReply {
        id: Uuid,
        text: String,
    },
    Notice {
        #[serde(flatten)]
        notice: Notice,
    },
    Error {
        message: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Success,
    Error,
}

/// User-facing notification. Never carries internal error detail.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub description: String,
}

impl Notice {
    fn new(level: NoticeLevel, title: &str, description: impl Into<String>) -> Self {
        Self { level, title: title.into(), description: description.into() }
    }

    pub fn problem_generated(language: CodingLanguage) -> Self {
        Self::new(
            NoticeLevel::Success,
            "Problem Generated!",
            format!("A new {} challenge is ready for you.", language.label()),
        )
    }

    pub fn problem_failed() -> Self {
        Self::new(NoticeLevel::Error, "Error Generating Problem", "Could not generate a new problem. Please try again.")
    }

    pub fn analysis_complete() -> Self {
        Self::new(NoticeLevel::Success, "Code Analysis Complete", "Check the suggestions for your solution.")
    }

    pub fn analysis_failed() -> Self {
        Self::new(NoticeLevel::Error, "Error Analyzing Code", "Could not analyze your code. Please try again.")
    }

    pub fn model_unavailable() -> Self {
        Self::new(NoticeLevel::Error, "AI Unavailable", "The AI model is not configured on this server.")
    }

    pub fn invalid_spec(detail: &str) -> Self {
        Self::new(NoticeLevel::Error, "Invalid Problem Settings", detail)
    }

    pub fn for_session_error(e: &SessionError) -> Self {
        match e {
            SessionError::NoProblem => Self::new(
                NoticeLevel::Error,
                "No Problem Loaded",
                "Please generate a problem first.",
            ),
            SessionError::EmptyCode => Self::new(
                NoticeLevel::Error,
                "No Code to Analyze",
                "Write some code before requesting an analysis.",
            ),
            SessionError::EmptyMessage => Self::new(NoticeLevel::Error, "Empty Message", "Type a message first."),
            SessionError::Busy(kind) => Self::new(
                NoticeLevel::Error,
                "Please Wait",
                format!("A {kind} request is already in progress."),
            ),
            SessionError::NotFound => Self::new(NoticeLevel::Error, "Session Expired", "Start a new session."),
        }
    }
}

/// Topics as a list or as the comma-separated text a free-form input produces.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum TopicsIn {
    List(Vec<String>),
    Text(String),
}

impl TopicsIn {
    fn tags(&self) -> Vec<String> {
        match self {
            TopicsIn::List(v) => v.iter().map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect(),
            TopicsIn::Text(s) => s.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ProblemSpecIn {
    pub difficulty: Difficulty,
    pub topics: TopicsIn,
    pub language: CodingLanguage,
}

impl ProblemSpecIn {
    pub fn into_spec(self) -> Result<ProblemSpec, GenerationError> {
        ProblemSpec::new(self.difficulty, &self.topics.tags(), self.language)
    }
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Serialize)]
pub struct SessionOut {
    pub session: SessionView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<Notice>,
}

#[derive(Deserialize)]
pub struct CodeIn {
    pub code: String,
}

#[derive(Deserialize)]
pub struct ChatIn {
    pub text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatFlowOut {
    pub bot_response: String,
}

#[derive(Serialize)]
pub struct CatalogEntry {
    pub value: &'static str,
    pub label: &'static str,
}

#[derive(Serialize)]
pub struct CatalogOut {
    pub difficulties: Vec<&'static str>,
    pub topics: Vec<CatalogEntry>,
    pub languages: Vec<CatalogEntry>,
}

impl CatalogOut {
    pub fn build() -> Self {
        Self {
            difficulties: Difficulty::ALL.iter().map(|d| d.as_str()).collect(),
            topics: Topic::ALL.iter().map(|t| CatalogEntry { value: t.as_str(), label: t.label() }).collect(),
            languages: CodingLanguage::ALL
                .iter()
                .map(|l| CatalogEntry { value: l.as_str(), label: l.label() })
                .collect(),
        }
    }
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
    pub model: Option<String>,
}

#[derive(Serialize)]
pub struct ErrorOut {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}
