//! Generic phase executor.
//!
//! Every phase runs the same loop: generate, score against the quality
//! gate, retry within budget, then optionally hold a feedback window. The
//! per-phase differences live entirely in the [`PhasePlan`] table.
//!
//! All session mutations happen under the session lock in short critical
//! sections; the lock is never held across an await. Events are published
//! immediately after the mutation they describe, so subscribers observe
//! transitions in the order they occurred.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::config::AtelierConfig;
use crate::events::{SessionBroadcaster, SessionEvent};
use crate::feedback::{FeedbackSignal, WindowOutcome, open_window};
use crate::gates::{GateDecision, RetryCoordinator, RetryDecision, RetryStrategy, evaluate};
use crate::gateway::{GenerateRequest, GenerationGateway, GenerationParams};
use crate::phase::PhasePlan;
use crate::session::{
    FeedbackEntry, FeedbackKind, FeedbackOutcome, PhaseStatus, Session, SessionStatus,
};

/// Where the control surface parks the sending half of an open feedback
/// window. Empty whenever no window is open.
pub(crate) type FeedbackSlot = Arc<Mutex<Option<mpsc::Sender<FeedbackSignal>>>>;

/// Everything the driving task threads through one session's phases.
pub(crate) struct ExecutorContext {
    pub session: Arc<Mutex<Session>>,
    pub gateway: Arc<dyn GenerationGateway>,
    pub strategy: Arc<dyn RetryStrategy>,
    pub broadcaster: SessionBroadcaster,
    pub cancel: CancellationToken,
    pub config: Arc<AtelierConfig>,
    pub feedback_slot: FeedbackSlot,
}

/// How one phase ended, from the driving task's point of view.
pub(crate) enum PhaseOutcome {
    Completed,
    Errored { detail: String },
    Cancelled,
}

/// Drive one phase to an outcome.
pub(crate) async fn run_phase(ctx: &ExecutorContext, plan: &PhasePlan) -> PhaseOutcome {
    if ctx.cancel.is_cancelled() {
        return PhaseOutcome::Cancelled;
    }

    let session_id;
    {
        let mut session = ctx.session.lock().await;
        session_id = session.id;
        let phase = match session.phase_mut(plan.id) {
            Ok(phase) => phase,
            Err(err) => {
                return PhaseOutcome::Errored {
                    detail: err.to_string(),
                };
            }
        };
        phase.status = PhaseStatus::Processing;
        phase.progress = 0;
        phase.start_time = Some(Utc::now());
    }
    tracing::info!(%session_id, phase = plan.name, "phase started");
    ctx.broadcaster.publish(SessionEvent::PhaseStarted {
        session_id,
        phase_id: plan.id,
        phase_name: plan.name.to_string(),
    });

    let threshold = ctx.config.session.quality_threshold;
    let max_retries = ctx.config.session.max_retries;
    let coordinator = RetryCoordinator::new(max_retries, ctx.strategy.as_ref());
    let mut params = plan.params.clone();

    loop {
        let result = match run_attempt(ctx, plan, &params).await {
            AttemptResult::Cancelled => return PhaseOutcome::Cancelled,
            AttemptResult::Finished(result) => result,
        };

        let mut session = ctx.session.lock().await;
        let retry_count = match session.phase(plan.id) {
            Ok(phase) => phase.retry_count,
            Err(err) => {
                return PhaseOutcome::Errored {
                    detail: err.to_string(),
                };
            }
        };
        let attempts = retry_count + 1;

        let (score, failure) = match result {
            Ok((artifact, score)) => {
                if let Ok(phase) = session.phase_mut(plan.id) {
                    phase.quality_score = Some(score);
                    phase.artifact = Some(artifact);
                }
                (score, None)
            }
            Err(detail) => {
                // A failed or panicked gateway call is a zero-quality
                // attempt; it consumes retry budget like any other.
                if let Ok(phase) = session.phase_mut(plan.id) {
                    phase.quality_score = Some(0.0);
                }
                (0.0, Some(detail))
            }
        };

        match evaluate(score, threshold, max_retries - retry_count) {
            GateDecision::Accept => {
                // Transition out of Processing under the same lock that
                // recorded the score, so no snapshot can observe a scored
                // Processing phase.
                let feedback = ctx.config.feedback_enabled(plan.id);
                let artifact_ref = match session.phase_mut(plan.id) {
                    Ok(phase) => {
                        if feedback {
                            phase.status = PhaseStatus::AwaitingFeedback;
                        } else {
                            phase.status = PhaseStatus::Completed;
                            phase.advance_progress(100);
                            phase.end_time = Some(Utc::now());
                        }
                        phase.artifact.as_ref().map(|a| a.id)
                    }
                    Err(err) => {
                        return PhaseOutcome::Errored {
                            detail: err.to_string(),
                        };
                    }
                };
                if feedback {
                    session.status = SessionStatus::AwaitingFeedback;
                }
                drop(session);
                let Some(artifact_ref) = artifact_ref else {
                    return PhaseOutcome::Errored {
                        detail: format!("phase {} accepted without an artifact", plan.id),
                    };
                };
                return accept(ctx, plan, score, artifact_ref, feedback).await;
            }
            GateDecision::Retry | GateDecision::Escalate => {
                let phase = match session.phase_mut(plan.id) {
                    Ok(phase) => phase,
                    Err(err) => {
                        return PhaseOutcome::Errored {
                            detail: err.to_string(),
                        };
                    }
                };
                match coordinator.decide(&mut phase.retry_count, &params) {
                    RetryDecision::Retry(adjusted) => {
                        // Back to in-flight: the score belongs to the
                        // attempt, not the phase.
                        phase.quality_score = None;
                        drop(session);
                        tracing::warn!(
                            %session_id,
                            phase = plan.name,
                            attempt = attempts,
                            score,
                            "attempt below quality bar, retrying"
                        );
                        params = adjusted;
                    }
                    RetryDecision::GiveUp => {
                        phase.status = PhaseStatus::Errored;
                        phase.end_time = Some(Utc::now());
                        drop(session);
                        let detail = failure.unwrap_or_else(|| {
                            format!("quality score {score:.2} below threshold {threshold:.2}")
                        });
                        tracing::error!(
                            %session_id,
                            phase = plan.name,
                            attempts,
                            %detail,
                            "phase errored"
                        );
                        ctx.broadcaster.publish(SessionEvent::PhaseErrored {
                            session_id,
                            phase_id: plan.id,
                            detail: detail.clone(),
                        });
                        return PhaseOutcome::Errored { detail };
                    }
                }
            }
        }
    }
}

enum AttemptResult {
    /// Artifact and score on success, failure detail otherwise.
    Finished(Result<(crate::session::Artifact, f64), String>),
    Cancelled,
}

/// Run one gateway call, forwarding progress ticks and honoring
/// cancellation. The call runs on its own task so a panicking gateway
/// implementation cannot take the session down with it.
async fn run_attempt(
    ctx: &ExecutorContext,
    plan: &PhasePlan,
    params: &GenerationParams,
) -> AttemptResult {
    let request = {
        let session = ctx.session.lock().await;
        let attempt = match session.phase(plan.id) {
            Ok(phase) => phase.retry_count + 1,
            Err(err) => return AttemptResult::Finished(Err(err.to_string())),
        };
        GenerateRequest {
            session_id: session.id,
            phase_id: plan.id,
            attempt,
            brief: session.brief.clone(),
            prior_artifacts: session.prior_artifacts(plan.id),
            params: params.clone(),
        }
    };
    let session_id = request.session_id;

    let (progress_tx, mut progress_rx) = mpsc::channel(16);
    let gateway = Arc::clone(&ctx.gateway);
    let mut call = tokio::spawn(async move { gateway.generate(request, progress_tx).await });

    let mut progress_open = true;
    let joined = loop {
        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => {
                call.abort();
                return AttemptResult::Cancelled;
            }
            tick = progress_rx.recv(), if progress_open => {
                match tick {
                    Some(progress) => {
                        let published = {
                            let mut session = ctx.session.lock().await;
                            match session.phase_mut(plan.id) {
                                Ok(phase) => {
                                    let before = phase.progress;
                                    phase.advance_progress(progress);
                                    phase.progress > before
                                }
                                Err(_) => false,
                            }
                        };
                        if published {
                            ctx.broadcaster.publish(SessionEvent::PhaseProgress {
                                session_id,
                                phase_id: plan.id,
                                progress: progress.min(100),
                            });
                        }
                    }
                    None => progress_open = false,
                }
            }
            joined = &mut call => break joined,
        }
    };

    match joined {
        Ok(Ok(reply)) => AttemptResult::Finished(Ok((reply.artifact, reply.score))),
        Ok(Err(err)) => AttemptResult::Finished(Err(err.to_string())),
        Err(join_err) if join_err.is_panic() => {
            tracing::error!(%session_id, phase = plan.id, "generation task panicked");
            AttemptResult::Finished(Err("generation task panicked".to_string()))
        }
        // Only aborted by the cancel arm above.
        Err(_) => AttemptResult::Cancelled,
    }
}

/// The phase passed the quality gate and has already left Processing:
/// hold the feedback window if one is due, then announce completion.
async fn accept(
    ctx: &ExecutorContext,
    plan: &PhasePlan,
    score: f64,
    artifact_ref: uuid::Uuid,
    feedback: bool,
) -> PhaseOutcome {
    let session_id = ctx.broadcaster.session_id();

    if feedback {
        // validate() guarantees the timeout exists when any phase has
        // feedback enabled.
        let Some(timeout) = ctx.config.feedback_timeout() else {
            return PhaseOutcome::Errored {
                detail: "feedback enabled without a configured timeout".to_string(),
            };
        };

        let (tx, mut rx) = mpsc::channel(1);
        *ctx.feedback_slot.lock().await = Some(tx);
        ctx.broadcaster.publish(SessionEvent::FeedbackWindowOpened {
            session_id,
            phase_id: plan.id,
            timeout_seconds: timeout.as_secs(),
        });

        let outcome = open_window(&mut rx, timeout, &ctx.cancel).await;
        *ctx.feedback_slot.lock().await = None;

        match outcome {
            WindowOutcome::Cancelled => {
                // The phase stays AwaitingFeedback; cancellation ends the
                // session in place.
                return PhaseOutcome::Cancelled;
            }
            WindowOutcome::Received(signal) => {
                let kind = signal.kind;
                {
                    let mut session = ctx.session.lock().await;
                    session.status = SessionStatus::Running;
                    if let Ok(phase) = session.phase_mut(plan.id) {
                        let mut entry = FeedbackEntry::new(plan.id, kind, signal.content.clone());
                        // Freshly created entries are unresolved.
                        let _ = entry.resolve(FeedbackOutcome::Applied);
                        if kind != FeedbackKind::Skip {
                            if let Some(artifact) = phase.artifact.as_mut() {
                                artifact.annotations.push(signal.content);
                            }
                        }
                        phase.feedback_history.push(entry);
                        phase.status = PhaseStatus::Completed;
                        phase.advance_progress(100);
                        phase.end_time = Some(Utc::now());
                    }
                }
                tracing::info!(%session_id, phase = plan.name, ?kind, "feedback applied");
                ctx.broadcaster.publish(SessionEvent::FeedbackApplied {
                    session_id,
                    phase_id: plan.id,
                    kind,
                    outcome: FeedbackOutcome::Applied,
                });
            }
            WindowOutcome::TimedOut => {
                // No entry is recorded for a silent window.
                {
                    let mut session = ctx.session.lock().await;
                    session.status = SessionStatus::Running;
                    if let Ok(phase) = session.phase_mut(plan.id) {
                        phase.status = PhaseStatus::Completed;
                        phase.advance_progress(100);
                        phase.end_time = Some(Utc::now());
                    }
                }
                tracing::info!(%session_id, phase = plan.name, "feedback window timed out");
                ctx.broadcaster.publish(SessionEvent::FeedbackTimedOut {
                    session_id,
                    phase_id: plan.id,
                });
            }
        }
    }

    tracing::info!(%session_id, phase = plan.name, score, "phase completed");
    ctx.broadcaster.publish(SessionEvent::PhaseCompleted {
        session_id,
        phase_id: plan.id,
        quality_score: score,
        artifact_ref,
    });
    PhaseOutcome::Completed
}
