//! Session and phase state model.
//!
//! A `Session` is one end-to-end run of the fixed 7-phase pipeline. The
//! orchestrator owns the live value behind a per-session lock; everything
//! handed to the API or the event stream is a clone taken under that lock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::SessionError;
use crate::phase::{PHASE_COUNT, PhasePlan};

/// Opaque session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Session lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Running,
    AwaitingFeedback,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    /// Terminal statuses admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Cancelled
        )
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Running => "running",
            SessionStatus::AwaitingFeedback => "awaiting_feedback",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Per-phase lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Pending,
    Processing,
    AwaitingFeedback,
    Completed,
    Errored,
}

/// How a piece of feedback was expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    NaturalLanguage,
    QuickOption,
    Skip,
}

/// Terminal resolution of one feedback entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackOutcome {
    Applied,
    Rejected,
    TimedOut,
}

impl std::fmt::Display for FeedbackOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FeedbackOutcome::Applied => "applied",
            FeedbackOutcome::Rejected => "rejected",
            FeedbackOutcome::TimedOut => "timed_out",
        };
        f.write_str(s)
    }
}

/// One recorded piece of feedback for a phase. Immutable once created; the
/// outcome transitions exactly once from unset to a terminal value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackEntry {
    pub phase_id: u8,
    pub timestamp: DateTime<Utc>,
    pub kind: FeedbackKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<FeedbackOutcome>,
}

impl FeedbackEntry {
    pub fn new(phase_id: u8, kind: FeedbackKind, content: impl Into<String>) -> Self {
        Self {
            phase_id,
            timestamp: Utc::now(),
            kind,
            content: content.into(),
            outcome: None,
        }
    }

    /// Set the terminal outcome. Errors if the entry was already resolved.
    pub fn resolve(&mut self, outcome: FeedbackOutcome) -> Result<(), SessionError> {
        match self.outcome {
            Some(existing) => Err(SessionError::AlreadyResolved(existing)),
            None => {
                self.outcome = Some(outcome);
                Ok(())
            }
        }
    }
}

/// Opaque generated payload plus metadata.
///
/// The orchestrator never interprets `content`; it only threads artifacts
/// from completed phases into later gateway calls and annotates them when
/// feedback is applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub id: Uuid,
    pub content: serde_json::Value,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Feedback annotations appended in arrival order.
    #[serde(default)]
    pub annotations: Vec<String>,
}

impl Artifact {
    pub fn new(content: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            content,
            metadata: serde_json::Map::new(),
            annotations: Vec::new(),
        }
    }
}

/// State of one of the 7 fixed, ordered phases.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseState {
    /// Phase id, 1..=7, fixed ordering.
    pub id: u8,
    pub name: String,
    pub status: PhaseStatus,
    /// 0..=100. Reset to 0 only on Pending → Processing; monotonically
    /// non-decreasing while Processing.
    pub progress: u8,
    /// None iff status is Pending or Processing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Artifact>,
    /// Append-only.
    #[serde(default)]
    pub feedback_history: Vec<FeedbackEntry>,
}

impl PhaseState {
    fn pending(plan: &PhasePlan) -> Self {
        Self {
            id: plan.id,
            name: plan.name.to_string(),
            status: PhaseStatus::Pending,
            progress: 0,
            quality_score: None,
            retry_count: 0,
            start_time: None,
            end_time: None,
            artifact: None,
            feedback_history: Vec::new(),
        }
    }

    /// Raise progress, ignoring values below the current watermark.
    pub fn advance_progress(&mut self, progress: u8) {
        let clamped = progress.min(100);
        if clamped > self.progress {
            self.progress = clamped;
        }
    }
}

/// The caller-supplied request a session is created from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    /// Free-form brief describing what to generate.
    pub brief: String,
}

/// One end-to-end generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    pub status: SessionStatus,
    pub brief: String,
    /// Exactly 7 phases, ordered by id, 1-indexed.
    pub phases: Vec<PhaseState>,
    /// 1-based pointer to the phase currently being driven. Monotonically
    /// non-decreasing except that cancellation ends the session in place.
    pub current_phase_index: u8,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Create a new session with all 7 phases Pending.
    pub fn new(id: SessionId, request: SessionRequest, plans: &[PhasePlan]) -> Self {
        debug_assert_eq!(plans.len(), PHASE_COUNT as usize);
        Self {
            id,
            status: SessionStatus::Idle,
            brief: request.brief,
            phases: plans.iter().map(PhaseState::pending).collect(),
            current_phase_index: 1,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn phase(&self, id: u8) -> Result<&PhaseState, SessionError> {
        if id == 0 || id > PHASE_COUNT {
            return Err(SessionError::UnknownPhase(id));
        }
        Ok(&self.phases[(id - 1) as usize])
    }

    pub fn phase_mut(&mut self, id: u8) -> Result<&mut PhaseState, SessionError> {
        if id == 0 || id > PHASE_COUNT {
            return Err(SessionError::UnknownPhase(id));
        }
        Ok(&mut self.phases[(id - 1) as usize])
    }

    /// Artifacts of phases completed before `phase_id`, in phase order.
    /// Later phases read, never mutate, earlier artifacts.
    pub fn prior_artifacts(&self, phase_id: u8) -> Vec<Artifact> {
        self.phases
            .iter()
            .take_while(|p| p.id < phase_id)
            .filter(|p| p.status == PhaseStatus::Completed)
            .filter_map(|p| p.artifact.clone())
            .collect()
    }

    /// Move to a terminal status, stamping `completed_at`. No-op when the
    /// session is already terminal.
    pub fn mark_terminal(&mut self, status: SessionStatus) {
        if self.status.is_terminal() {
            return;
        }
        debug_assert!(status.is_terminal());
        self.status = status;
        self.completed_at = Some(Utc::now());
    }
}
