//! One-shot session runner — `atelier run`.
//!
//! Drives a single session from the terminal, printing events as they
//! arrive. Ctrl+C cancels the session rather than killing the process so
//! the cancellation path is exercised the same way it is over HTTP.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use atelier::config::AtelierConfig;
use atelier::events::SessionEvent;
use atelier::gateway::{GenerationGateway, HttpGateway, ScriptedGateway};
use atelier::orchestrator::Orchestrator;
use atelier::session::{SessionRequest, SessionStatus};

pub async fn cmd_run(config_path: &Path, brief: String, dry_run: bool, json: bool) -> Result<()> {
    let config = AtelierConfig::load_or_default(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    let gateway: Arc<dyn GenerationGateway> = if dry_run {
        Arc::new(ScriptedGateway::new(0.85))
    } else {
        Arc::new(HttpGateway::new(
            config.gateway.endpoint.clone(),
            config.request_timeout(),
        ))
    };
    let orchestrator = Arc::new(Orchestrator::new(config, gateway));

    let session = orchestrator.create_session(SessionRequest { brief }).await;
    let id = session.id;
    if !json {
        println!("Session {id}");
    }

    let mut events = orchestrator.subscribe(id).await?;
    orchestrator.start(id).await?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\nCancelling session...");
                orchestrator.cancel(id).await?;
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                if json {
                    println!("{}", serde_json::to_string(&event)?);
                } else {
                    print_event(&event);
                }
                if matches!(
                    event,
                    SessionEvent::SessionCompleted { .. }
                        | SessionEvent::SessionFailed { .. }
                        | SessionEvent::SessionCancelled { .. }
                ) {
                    break;
                }
            }
        }
    }

    let session = orchestrator.snapshot(id).await?;
    match session.status {
        SessionStatus::Completed => Ok(()),
        status => anyhow::bail!("session ended {status}"),
    }
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::SessionStarted { .. } => println!("session started"),
        SessionEvent::PhaseStarted { phase_id, phase_name, .. } => {
            println!("[{phase_id}/7] {phase_name}...");
        }
        SessionEvent::PhaseProgress { phase_id, progress, .. } => {
            println!("[{phase_id}/7] {progress}%");
        }
        SessionEvent::PhaseCompleted { phase_id, quality_score, .. } => {
            println!("[{phase_id}/7] done (score {quality_score:.2})");
        }
        SessionEvent::PhaseErrored { phase_id, detail, .. } => {
            println!("[{phase_id}/7] errored: {detail}");
        }
        SessionEvent::FeedbackWindowOpened { phase_id, timeout_seconds, .. } => {
            println!("[{phase_id}/7] awaiting feedback ({timeout_seconds}s window)");
        }
        SessionEvent::FeedbackApplied { phase_id, kind, .. } => {
            println!("[{phase_id}/7] feedback applied ({kind:?})");
        }
        SessionEvent::FeedbackTimedOut { phase_id, .. } => {
            println!("[{phase_id}/7] feedback window timed out");
        }
        SessionEvent::SessionCompleted { .. } => println!("session completed"),
        SessionEvent::SessionFailed { phase_id, .. } => {
            println!("session failed at phase {phase_id}");
        }
        SessionEvent::SessionCancelled { .. } => println!("session cancelled"),
        SessionEvent::EventGap { missed, .. } => {
            println!("(missed {missed} events)");
        }
    }
}
