//! Typed error hierarchy for the Atelier orchestrator.
//!
//! Three top-level enums cover the three subsystems:
//! - `SessionError` — orchestrator control-surface and lifecycle failures
//! - `GatewayError` — generation gateway transport/contract failures
//! - `ConfigError` — configuration loading and validation failures

use std::time::Duration;
use thiserror::Error;

use crate::session::{FeedbackOutcome, SessionId, SessionStatus};

/// Errors surfaced by the session orchestrator's control operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session {0} not found")]
    NotFound(SessionId),

    #[error("unknown phase id {0}; valid ids are 1..=7")]
    UnknownPhase(u8),

    #[error("phase {phase} is not awaiting feedback")]
    NotAwaitingFeedback { phase: u8 },

    #[error("session is already {status}")]
    Terminal { status: SessionStatus },

    #[error("phase {phase} failed after {attempts} attempts: {detail}")]
    PhaseFailed {
        phase: u8,
        attempts: u32,
        detail: String,
    },

    #[error("feedback entry already resolved as {0}")]
    AlreadyResolved(FeedbackOutcome),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from a single generation gateway call.
///
/// Every variant is absorbed by the retry path: the executor converts a
/// failed call into a zero-quality attempt and defers to the quality gate.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway transport error: {0}")]
    Transport(String),

    #[error("gateway request timed out after {0:?}")]
    Timeout(Duration),

    #[error("gateway returned score {0} outside [0, 1]")]
    InvalidScore(f64),
}

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {source}")]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file at {path}: {source}")]
    Parse {
        path: std::path::PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Validation(String),
}
