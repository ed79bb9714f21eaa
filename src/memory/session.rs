//! Session lifecycle — open/close windows and the session-start bundle.
//!
//! A session is the unit a client attaches observations to. Starting one
//! returns a context bundle: the previous session's summary plus the
//! highest-retention observations of the load-bearing types, compact enough
//! to paste straight into a prompt.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::{MemorixError, Result};
use crate::memory::retention::{self, RetentionParams};
use crate::memory::types::{Observation, ObservationType, Session, SessionStatus};
use crate::storage::DataDir;

/// How many high-retention observations the start bundle carries.
pub const CONTEXT_TOP_N: usize = 5;

/// Types worth resurfacing at session start.
const CONTEXT_TYPES: [ObservationType; 4] = [
    ObservationType::Decision,
    ObservationType::Gotcha,
    ObservationType::ProblemSolution,
    ObservationType::TradeOff,
];

/// Compact highlight entry in the start bundle.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextHighlight {
    pub id: u64,
    #[serde(rename = "type")]
    pub obs_type: ObservationType,
    pub icon: &'static str,
    pub title: String,
    pub tokens: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStartBundle {
    pub session: Session,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_session_summary: Option<String>,
    pub highlights: Vec<ContextHighlight>,
    pub observation_counts: HashMap<String, usize>,
}

pub struct SessionStore {
    dir: DataDir,
    sessions: Vec<Session>,
}

impl SessionStore {
    pub fn load(dir: DataDir) -> Result<Self> {
        let sessions = dir.load_sessions()?;
        Ok(Self { dir, sessions })
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    /// Open a session and build the start bundle from the project's
    /// observations (already alias-expanded by the caller).
    pub fn start(
        &mut self,
        agent: &str,
        project_id: &str,
        project_aliases: &[String],
        observations: &[Observation],
        params: &RetentionParams,
    ) -> Result<SessionStartBundle> {
        let session = Session {
            id: uuid::Uuid::now_v7().to_string(),
            agent: agent.to_string(),
            project_id: project_id.to_string(),
            started_at: chrono::Utc::now().to_rfc3339(),
            ended_at: None,
            status: SessionStatus::Active,
            summary: None,
        };

        let last_session_summary = self
            .sessions
            .iter()
            .rev()
            .find(|s| {
                s.status == SessionStatus::Completed
                    && project_aliases.iter().any(|a| a == &s.project_id)
            })
            .and_then(|s| s.summary.clone());

        let in_project: Vec<&Observation> = observations
            .iter()
            .filter(|o| project_aliases.iter().any(|a| a == &o.project_id))
            .collect();

        let now = chrono::Utc::now();
        let mut candidates: Vec<(&Observation, f64)> = in_project
            .iter()
            .filter(|o| CONTEXT_TYPES.contains(&o.obs_type))
            .map(|o| (*o, retention::score(o, now, params)))
            .collect();
        candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let highlights = candidates
            .iter()
            .take(CONTEXT_TOP_N)
            .map(|(o, _)| ContextHighlight {
                id: o.id,
                obs_type: o.obs_type,
                icon: o.obs_type.icon(),
                title: o.title.clone(),
                tokens: o.tokens,
            })
            .collect();

        let mut observation_counts: HashMap<String, usize> = HashMap::new();
        for obs in &in_project {
            *observation_counts
                .entry(obs.obs_type.as_str().to_string())
                .or_default() += 1;
        }

        self.sessions.push(session.clone());
        self.persist()?;

        Ok(SessionStartBundle {
            session,
            last_session_summary,
            highlights,
            observation_counts,
        })
    }

    /// Complete the current session. Ending twice is a conflict.
    pub fn end(&mut self, project_id: &str, summary: Option<String>) -> Result<Session> {
        let latest = self
            .sessions
            .iter_mut()
            .rev()
            .find(|s| s.project_id == project_id)
            .ok_or_else(|| MemorixError::NotFound(format!("no session for {project_id}")))?;

        if latest.status == SessionStatus::Completed {
            return Err(MemorixError::Conflict(format!(
                "session {} already completed",
                latest.id
            )));
        }

        latest.status = SessionStatus::Completed;
        latest.ended_at = Some(chrono::Utc::now().to_rfc3339());
        latest.summary = summary;
        let ended = latest.clone();

        self.persist()?;
        Ok(ended)
    }

    /// Read-only view of one session.
    pub fn context(&self, id: &str) -> Result<&Session> {
        self.sessions
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| MemorixError::NotFound(format!("session {id}")))
    }

    fn persist(&self) -> Result<()> {
        self.dir
            .clone()
            .with_lock(|| self.dir.save_sessions(&self.sessions))
    }
}
