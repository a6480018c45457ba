//! Application state: flows (model client + prompts) and the in-memory session store.
//!
//! This module owns:
//!   - the `Flows` bundle (optional Gemini client, prompt templates, model settings)
//!   - the session store (by id); every session is behind its own mutex so one user's
//!     model call never blocks another user
//!
//! Sessions idle for longer than SESSION_TTL_SECS (default 3600) are evicted, lazily on
//! lookup and by a periodic sweep. A session with a request in flight is never evicted.
//!
//! Without GEMINI_API_KEY the service still boots; every flow then fails with a
//! "model not configured" error that handlers turn into a generic notice.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::{
    sync::{Mutex, RwLock},
    task::JoinHandle,
};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::{load_agent_config_from_env, AgentConfig};
use crate::flows::Flows;
use crate::gemini::Gemini;
use crate::llm::GenerativeModel;
use crate::session::{FlowKind, Session};

pub type SharedSession = Arc<Mutex<Session>>;

const DEFAULT_SESSION_TTL_SECS: u64 = 3600;

struct StoredSession {
    session: SharedSession,
    last_seen: Instant,
}

impl StoredSession {
    fn is_expired(&self, ttl: Duration) -> bool {
        if self.last_seen.elapsed() < ttl {
            return false;
        }
        // Held lock means someone is using it right now.
        match self.session.try_lock() {
            Ok(s) => ![FlowKind::Problem, FlowKind::Analysis, FlowKind::Chat]
                .into_iter()
                .any(|k| s.is_loading(k)),
            Err(_) => false,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub flows: Flows,
    sessions: Arc<RwLock<HashMap<Uuid, StoredSession>>>,
    session_ttl: Duration,
}

impl AppState {
    /// Build state from env: load config, init the Gemini client.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let cfg = load_agent_config_from_env().unwrap_or_default();

        let model: Option<Arc<dyn GenerativeModel>> = match Gemini::from_env() {
            Some(g) => {
                info!(target: "algoace_backend", base_url = %g.base_url, model = %g.model, "Gemini enabled.");
                Some(Arc::new(g))
            }
            None => {
                warn!(target: "algoace_backend", "Gemini disabled (no GEMINI_API_KEY). Flows will fail until a key is provided.");
                None
            }
        };

        let ttl = std::env::var("SESSION_TTL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_SESSION_TTL_SECS);

        Self::with_model(model, cfg).with_session_ttl(Duration::from_secs(ttl))
    }

    pub fn with_model(model: Option<Arc<dyn GenerativeModel>>, cfg: AgentConfig) -> Self {
        Self {
            flows: Flows::new(model, cfg.prompts, cfg.model),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
        }
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn create_session(&self) -> (Uuid, SharedSession) {
        let session = Session::new();
        let id = session.id();
        let shared = Arc::new(Mutex::new(session));
        let stored = StoredSession { session: shared.clone(), last_seen: Instant::now() };
        self.sessions.write().await.insert(id, stored);
        info!(target: "session", session = %id, "Session created");
        (id, shared)
    }

    /// Looks a session up and marks it as seen. An expired session is evicted instead.
    #[instrument(level = "debug", skip(self), fields(%id))]
    pub async fn get_session(&self, id: &Uuid) -> Option<SharedSession> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(id)?;
        if entry.is_expired(self.session_ttl) {
            sessions.remove(id);
            info!(target: "session", session = %id, "Session expired");
            return None;
        }
        entry.last_seen = Instant::now();
        Some(entry.session.clone())
    }

    #[instrument(level = "debug", skip(self), fields(%id))]
    pub async fn remove_session(&self, id: &Uuid) -> bool {
        let removed = self.sessions.write().await.remove(id).is_some();
        if removed {
            info!(target: "session", session = %id, "Session removed");
        }
        removed
    }

    /// Drops every idle session past its TTL. Returns how many were evicted.
    pub async fn sweep_idle_sessions(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| !entry.is_expired(self.session_ttl));
        let evicted = before - sessions.len();
        if evicted > 0 {
            info!(target: "session", evicted, remaining = sessions.len(), "Idle sessions evicted");
        }
        evicted
    }

    /// Periodic eviction in the background, a few times per TTL.
    pub fn spawn_session_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let state = Arc::clone(self);
        let period = (self.session_ttl / 4).max(Duration::from_secs(1));
        debug!(target: "session", ?period, ttl = ?self.session_ttl, "Session sweeper started");
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                state.sweep_idle_sessions().await;
            }
        })
    }
}
