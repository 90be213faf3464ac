//! Session orchestrator: registry, driving tasks, and the control surface.
//!
//! Each session is driven by exactly one task that owns all state
//! transitions; the control surface (feedback, skip, cancel) communicates
//! with the driving task through a cancellation token and a per-window
//! signal channel, never by mutating phase state directly. That single
//! writer is what gives the event stream its total order.

mod executor;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::config::AtelierConfig;
use crate::errors::SessionError;
use crate::events::{EventStream, SessionBroadcaster, SessionEvent};
use crate::feedback::FeedbackSignal;
use crate::gates::{NoAdjustment, RetryStrategy};
use crate::gateway::GenerationGateway;
use crate::phase::phase_plans;
use crate::session::{FeedbackKind, Session, SessionId, SessionRequest, SessionStatus};

use executor::{ExecutorContext, FeedbackSlot, PhaseOutcome, run_phase};

/// Per-session registry entry. The driving task and the control surface
/// share these handles; neither ever holds the session lock across an
/// await.
struct SessionHandle {
    state: Arc<Mutex<Session>>,
    broadcaster: SessionBroadcaster,
    cancel: CancellationToken,
    feedback_slot: FeedbackSlot,
}

/// Owns every live and terminal session.
///
/// Terminal sessions stay in the registry so snapshots and event backlogs
/// remain queryable after the run ends.
pub struct Orchestrator {
    config: Arc<AtelierConfig>,
    gateway: Arc<dyn GenerationGateway>,
    strategy: Arc<dyn RetryStrategy>,
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
}

impl Orchestrator {
    pub fn new(config: AtelierConfig, gateway: Arc<dyn GenerationGateway>) -> Self {
        Self::with_strategy(config, gateway, Arc::new(NoAdjustment))
    }

    pub fn with_strategy(
        config: AtelierConfig,
        gateway: Arc<dyn GenerationGateway>,
        strategy: Arc<dyn RetryStrategy>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            gateway,
            strategy,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new session with all phases pending. The session does not
    /// run until [`start`](Self::start) is called, so callers can subscribe
    /// to the event stream without missing the opening events.
    pub async fn create_session(&self, request: SessionRequest) -> Session {
        let id = SessionId::new();
        let session = Session::new(id, request, &phase_plans());
        let handle = SessionHandle {
            state: Arc::new(Mutex::new(session.clone())),
            broadcaster: SessionBroadcaster::new(id, self.config.events.channel_capacity),
            cancel: CancellationToken::new(),
            feedback_slot: Arc::new(Mutex::new(None)),
        };
        self.sessions.write().await.insert(id, handle);
        tracing::info!(session_id = %id, "session created");
        session
    }

    /// Spawn the driving task for a created session.
    pub async fn start(&self, id: SessionId) -> Result<(), SessionError> {
        let ctx = {
            let sessions = self.sessions.read().await;
            let handle = sessions.get(&id).ok_or(SessionError::NotFound(id))?;
            ExecutorContext {
                session: Arc::clone(&handle.state),
                gateway: Arc::clone(&self.gateway),
                strategy: Arc::clone(&self.strategy),
                broadcaster: handle.broadcaster.clone(),
                cancel: handle.cancel.clone(),
                config: Arc::clone(&self.config),
                feedback_slot: Arc::clone(&handle.feedback_slot),
            }
        };
        {
            let mut session = ctx.session.lock().await;
            if session.status.is_terminal() {
                return Err(SessionError::Terminal {
                    status: session.status,
                });
            }
            if session.status != SessionStatus::Idle {
                // Already started; starting twice would fork the single
                // writer.
                return Ok(());
            }
            session.status = SessionStatus::Running;
            session.started_at = Some(Utc::now());
        }
        tokio::spawn(drive(ctx));
        Ok(())
    }

    /// Clone of the session state at this instant.
    pub async fn snapshot(&self, id: SessionId) -> Result<Session, SessionError> {
        let sessions = self.sessions.read().await;
        let handle = sessions.get(&id).ok_or(SessionError::NotFound(id))?;
        Ok(handle.state.lock().await.clone())
    }

    /// Subscribe to the session's event stream from this instant onward.
    pub async fn subscribe(&self, id: SessionId) -> Result<EventStream, SessionError> {
        let sessions = self.sessions.read().await;
        let handle = sessions.get(&id).ok_or(SessionError::NotFound(id))?;
        Ok(handle.broadcaster.subscribe())
    }

    /// Route feedback into the currently open window. When `phase_id` is
    /// given it must name the phase that is actually awaiting feedback.
    pub async fn submit_feedback(
        &self,
        id: SessionId,
        phase_id: Option<u8>,
        kind: FeedbackKind,
        content: String,
    ) -> Result<(), SessionError> {
        self.signal_feedback(id, phase_id, FeedbackSignal { kind, content })
            .await
    }

    /// Skip the currently open window. Recorded as feedback of kind `skip`;
    /// an optional reason is kept in the entry but never annotates the
    /// artifact.
    pub async fn skip_feedback(
        &self,
        id: SessionId,
        phase_id: Option<u8>,
        reason: Option<String>,
    ) -> Result<(), SessionError> {
        self.signal_feedback(id, phase_id, FeedbackSignal::skip(reason))
            .await
    }

    async fn signal_feedback(
        &self,
        id: SessionId,
        phase_id: Option<u8>,
        signal: FeedbackSignal,
    ) -> Result<(), SessionError> {
        let (state, slot) = {
            let sessions = self.sessions.read().await;
            let handle = sessions.get(&id).ok_or(SessionError::NotFound(id))?;
            (Arc::clone(&handle.state), Arc::clone(&handle.feedback_slot))
        };
        let current_phase = {
            let session = state.lock().await;
            if session.status.is_terminal() {
                return Err(SessionError::Terminal {
                    status: session.status,
                });
            }
            if session.status != SessionStatus::AwaitingFeedback {
                return Err(SessionError::NotAwaitingFeedback {
                    phase: session.current_phase_index,
                });
            }
            if let Some(requested) = phase_id {
                // Range check first so 0 or 8 reads as an unknown phase,
                // not a closed window.
                session.phase(requested)?;
                if requested != session.current_phase_index {
                    return Err(SessionError::NotAwaitingFeedback { phase: requested });
                }
            }
            session.current_phase_index
        };
        let tx = slot.lock().await.clone();
        let sent = match tx {
            Some(tx) => tx.send(signal).await.is_ok(),
            None => false,
        };
        if sent {
            Ok(())
        } else {
            // The window resolved between our status check and the send.
            Err(SessionError::NotAwaitingFeedback {
                phase: current_phase,
            })
        }
    }

    /// Cancel a session. Idempotent: cancelling a terminal session is a
    /// no-op.
    pub async fn cancel(&self, id: SessionId) -> Result<(), SessionError> {
        let (state, cancel, broadcaster) = {
            let sessions = self.sessions.read().await;
            let handle = sessions.get(&id).ok_or(SessionError::NotFound(id))?;
            (
                Arc::clone(&handle.state),
                handle.cancel.clone(),
                handle.broadcaster.clone(),
            )
        };
        let mut session = state.lock().await;
        if session.status.is_terminal() {
            return Ok(());
        }
        if session.status == SessionStatus::Idle {
            // No driving task exists yet; finalize here.
            session.mark_terminal(SessionStatus::Cancelled);
            drop(session);
            cancel.cancel();
            tracing::info!(session_id = %id, "session cancelled before start");
            broadcaster.publish(SessionEvent::SessionCancelled { session_id: id });
        } else {
            drop(session);
            // The driving task observes the token and finalizes.
            cancel.cancel();
            tracing::info!(session_id = %id, "session cancellation requested");
        }
        Ok(())
    }

    /// Ids of every registered session, terminal included.
    pub async fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.read().await.keys().copied().collect()
    }
}

/// The single driving task for one session. The Idle → Running transition
/// already happened under the lock in `start`.
async fn drive(ctx: ExecutorContext) {
    let session_id = ctx.broadcaster.session_id();
    tracing::info!(%session_id, "session started");
    ctx.broadcaster
        .publish(SessionEvent::SessionStarted { session_id });

    for plan in phase_plans() {
        {
            let mut session = ctx.session.lock().await;
            session.current_phase_index = plan.id;
        }
        match run_phase(&ctx, &plan).await {
            PhaseOutcome::Completed => {}
            PhaseOutcome::Errored { detail } => {
                {
                    let mut session = ctx.session.lock().await;
                    session.mark_terminal(SessionStatus::Failed);
                }
                tracing::error!(%session_id, phase = plan.id, %detail, "session failed");
                ctx.broadcaster.publish(SessionEvent::SessionFailed {
                    session_id,
                    phase_id: plan.id,
                });
                return;
            }
            PhaseOutcome::Cancelled => {
                {
                    let mut session = ctx.session.lock().await;
                    session.mark_terminal(SessionStatus::Cancelled);
                }
                tracing::info!(%session_id, phase = plan.id, "session cancelled");
                ctx.broadcaster
                    .publish(SessionEvent::SessionCancelled { session_id });
                return;
            }
        }
    }

    {
        let mut session = ctx.session.lock().await;
        session.mark_terminal(SessionStatus::Completed);
    }
    tracing::info!(%session_id, "session completed");
    ctx.broadcaster
        .publish(SessionEvent::SessionCompleted { session_id });
}
