//! Per-user practice session: the state a page controller would otherwise keep in hooks.
//!
//! A `Session` exclusively owns the current problem, the code buffer, the working language,
//! the last analysis and the chat transcript. Flows never touch it; callers follow a
//! two-step protocol around every model call:
//!
//!   1. `begin_*` records the request and hands back a [`Ticket`] (plus the flow input);
//!   2. the flow runs with no lock held;
//!   3. `complete_*` applies the result, or discards it when the ticket is stale.
//!      A caller that gives up on the request hands the ticket to `abandon` instead.
//!
//! Staleness rules:
//!   - problem and analysis requests each have a monotonically increasing sequence; only
//!     the latest issued ticket of a kind may apply its result ("latest request wins");
//!   - chat turns are fenced by their placeholder id instead;
//!   - every `begin_generate` starts a new problem epoch, so analysis and chat results
//!     that were requested for an earlier problem are dropped.

use std::fmt;

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{
    AnalysisRequest, AnalysisResult, ChatMessage, ChatRole, CodingLanguage, Problem, ProblemContext, ProblemSpec,
};
use crate::error::{AnalysisError, ChatError, GenerationError, SessionError};
use crate::flows::ChatRequest;

/// Text that replaces a pending assistant turn when the chat call fails outright.
pub const CHAT_ERROR_REPLY: &str = "Sorry, I encountered an error. Please try again.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    Problem,
    Analysis,
    Chat,
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FlowKind::Problem => "problem generation",
            FlowKind::Analysis => "code analysis",
            FlowKind::Chat => "chat",
        })
    }
}

/// Proof of an issued request. Carries everything needed to decide staleness later.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ticket {
    pub kind: FlowKind,
    /// Always 0 for chat.
    pub seq: u64,
    pub epoch: u64,
    /// Chat only: id of the placeholder turn this reply will replace.
    pub placeholder: Option<Uuid>,
}

/// What happened to a completed request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Applied {
    Success,
    Failure,
    /// A newer request superseded this one; state was left untouched.
    Stale,
}

#[derive(Clone, Copy, Debug, Default)]
struct Slot {
    issued: u64,
    settled: u64,
}

impl Slot {
    fn issue(&mut self) -> u64 {
        self.issued += 1;
        self.issued
    }

    fn is_latest(&self, seq: u64) -> bool {
        seq == self.issued
    }

    fn settle(&mut self, seq: u64) {
        self.settled = self.settled.max(seq);
    }

    fn in_flight(&self) -> bool {
        self.issued != self.settled
    }
}

#[derive(Debug)]
pub struct Session {
    id: Uuid,
    problem: Option<Problem>,
    code: String,
    language: CodingLanguage,
    analysis: Option<AnalysisResult>,
    transcript: Vec<ChatMessage>,
    epoch: u64,
    problem_slot: Slot,
    analysis_slot: Slot,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            problem: None,
            code: String::new(),
            language: CodingLanguage::default(),
            analysis: None,
            transcript: Vec::new(),
            epoch: 0,
            problem_slot: Slot::default(),
            analysis_slot: Slot::default(),
        }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn transcript(&self) -> &[ChatMessage] { &self.transcript }

    /// Loading flag for a flow kind: true while its latest request is unanswered.
    pub fn is_loading(&self, kind: FlowKind) -> bool {
        match kind {
            FlowKind::Problem => self.problem_slot.in_flight(),
            FlowKind::Analysis => self.analysis_slot.in_flight(),
            // Several chat turns may be pending at once, each with its own placeholder.
            FlowKind::Chat => self.transcript.iter().any(|m| m.pending),
        }
    }

    /// Starts a new problem session: the previous problem, code, analysis and transcript
    /// are dropped right away and any in-flight analysis/chat becomes stale.
    pub fn begin_generate(&mut self, spec: &ProblemSpec) -> Ticket {
        let seq = self.problem_slot.issue();
        self.epoch += 1;
        self.problem = None;
        self.analysis = None;
        self.code.clear();
        self.transcript.clear();
        // Whatever analysis was running belongs to the old problem.
        self.analysis_slot.settled = self.analysis_slot.issued;
        self.language = spec.language();
        debug!(target: "session", session = %self.id, seq, epoch = self.epoch, "Problem generation started");
        Ticket { kind: FlowKind::Problem, seq, epoch: self.epoch, placeholder: None }
    }

    pub fn complete_generate(&mut self, ticket: Ticket, result: Result<Problem, GenerationError>) -> Applied {
        self.apply_problem(ticket, result.ok())
    }

    fn apply_problem(&mut self, ticket: Ticket, problem: Option<Problem>) -> Applied {
        if !self.problem_slot.is_latest(ticket.seq) {
            warn!(target: "session", session = %self.id, seq = ticket.seq, latest = self.problem_slot.issued, "Discarding stale problem response");
            return Applied::Stale;
        }
        self.problem_slot.settle(ticket.seq);
        match problem {
            Some(problem) => {
                info!(target: "session", session = %self.id, language = %problem.language, "Problem applied");
                self.language = problem.language;
                self.problem = Some(problem);
                Applied::Success
            }
            None => {
                self.problem = None;
                self.language = CodingLanguage::default();
                Applied::Failure
            }
        }
    }

    pub fn set_code(&mut self, code: impl Into<String>) {
        self.code = code.into();
    }

    pub fn begin_analysis(&mut self) -> Result<(Ticket, AnalysisRequest), SessionError> {
        let problem = self.problem.as_ref().ok_or(SessionError::NoProblem)?;
        if self.code.trim().is_empty() {
            return Err(SessionError::EmptyCode);
        }
        let request = AnalysisRequest {
            code: self.code.clone(),
            language: problem.language,
            problem_description: problem.description.clone(),
        };
        let seq = self.analysis_slot.issue();
        self.analysis = None;
        debug!(target: "session", session = %self.id, seq, "Code analysis started");
        Ok((Ticket { kind: FlowKind::Analysis, seq, epoch: self.epoch, placeholder: None }, request))
    }

    pub fn complete_analysis(&mut self, ticket: Ticket, result: Result<AnalysisResult, AnalysisError>) -> Applied {
        self.apply_analysis(ticket, result.ok())
    }

    fn apply_analysis(&mut self, ticket: Ticket, analysis: Option<AnalysisResult>) -> Applied {
        if ticket.epoch != self.epoch {
            warn!(target: "session", session = %self.id, "Discarding analysis for a previous problem");
            return Applied::Stale;
        }
        if !self.analysis_slot.is_latest(ticket.seq) {
            warn!(target: "session", session = %self.id, seq = ticket.seq, latest = self.analysis_slot.issued, "Discarding stale analysis response");
            return Applied::Stale;
        }
        self.analysis_slot.settle(ticket.seq);
        match analysis {
            Some(analysis) => {
                self.analysis = Some(analysis);
                Applied::Success
            }
            None => Applied::Failure,
        }
    }

    /// Two-phase append, phase one: record the user's turn and an empty pending assistant
    /// turn. The returned request replays only settled turns that preceded this message.
    pub fn begin_chat(&mut self, text: &str) -> Result<(Ticket, ChatRequest), SessionError> {
        if text.trim().is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        let problem = self.problem.as_ref().ok_or(SessionError::NoProblem)?;

        let history = self.transcript.iter().filter(|m| !m.pending).map(ChatMessage::turn).collect();
        let request = ChatRequest {
            user_message: text.to_string(),
            context: ProblemContext {
                title: Some(problem.title.clone()),
                description: Some(problem.description.clone()),
                code: Some(self.code.clone()),
            },
            history,
        };

        let placeholder = ChatMessage::placeholder();
        let placeholder_id = placeholder.id;
        self.transcript.push(ChatMessage::settled(ChatRole::User, text));
        self.transcript.push(placeholder);

        debug!(target: "session", session = %self.id, placeholder = %placeholder_id, "Chat turn started");
        let ticket = Ticket { kind: FlowKind::Chat, seq: 0, epoch: self.epoch, placeholder: Some(placeholder_id) };
        Ok((ticket, request))
    }

    /// Two-phase append, phase two: replace the placeholder (found by id, never by
    /// "whichever one is loading") with the reply or the fixed error text.
    pub fn complete_chat(&mut self, ticket: Ticket, result: Result<String, ChatError>) -> Applied {
        self.apply_chat(ticket, result.ok())
    }

    fn apply_chat(&mut self, ticket: Ticket, reply: Option<String>) -> Applied {
        if ticket.epoch != self.epoch {
            warn!(target: "session", session = %self.id, "Discarding chat reply for a previous problem");
            return Applied::Stale;
        }
        let Some(slot) = ticket
            .placeholder
            .and_then(|id| self.transcript.iter_mut().find(|m| m.id == id && m.pending))
        else {
            warn!(target: "session", session = %self.id, "Chat placeholder no longer present");
            return Applied::Stale;
        };

        let (text, applied) = match reply {
            Some(reply) => (reply, Applied::Success),
            None => (CHAT_ERROR_REPLY.to_string(), Applied::Failure),
        };
        slot.text = text;
        slot.pending = false;
        applied
    }

    /// Settles a ticket whose caller went away before the model answered. The request
    /// counts as failed: its loading flag clears and a chat placeholder gets the error text.
    pub fn abandon(&mut self, ticket: Ticket) -> Applied {
        warn!(target: "session", session = %self.id, kind = %ticket.kind, seq = ticket.seq, "Request abandoned before completion");
        match ticket.kind {
            FlowKind::Problem => self.apply_problem(ticket, None),
            FlowKind::Analysis => self.apply_analysis(ticket, None),
            FlowKind::Chat => self.apply_chat(ticket, None),
        }
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            id: self.id,
            problem: self.problem.clone(),
            code: self.code.clone(),
            language: self.language,
            analysis: self.analysis.clone(),
            transcript: self.transcript.clone(),
            loading: LoadingView {
                problem: self.is_loading(FlowKind::Problem),
                analysis: self.is_loading(FlowKind::Analysis),
                chat: self.is_loading(FlowKind::Chat),
            },
        }
    }
}

#[cfg(test)]
impl Session {
    pub fn problem(&self) -> Option<&Problem> { self.problem.as_ref() }
    pub fn code(&self) -> &str { &self.code }
    pub fn language(&self) -> CodingLanguage { self.language }
    pub fn analysis(&self) -> Option<&AnalysisResult> { self.analysis.as_ref() }
}

/// Serializable snapshot for clients.
#[derive(Clone, Debug, Serialize)]
pub struct SessionView {
    pub id: Uuid,
    pub problem: Option<Problem>,
    pub code: String,
    pub language: CodingLanguage,
    pub analysis: Option<AnalysisResult>,
    pub transcript: Vec<ChatMessage>,
    pub loading: LoadingView,
}

#[derive(Clone, Copy, Debug, Serialize)]
pub struct LoadingView {
    pub problem: bool,
    pub analysis: bool,
    pub chat: bool,
}
