//! Deterministic gateway for tests and dry runs.
//!
//! Each phase id can be loaded with a queue of scripted attempts; once a
//! phase's queue is exhausted (or was never set) every further attempt
//! succeeds with the default score. No timers, no I/O — results are fully
//! determined by the script, which keeps orchestrator tests deterministic
//! under paused time.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::errors::GatewayError;
use crate::session::Artifact;

use super::{GenerateReply, GenerateRequest, GenerationGateway};

/// One scripted gateway outcome.
#[derive(Debug, Clone)]
pub enum ScriptedAttempt {
    /// Succeed with this quality score.
    Score(f64),
    /// Fail with a transport error.
    Fail(String),
}

pub struct ScriptedGateway {
    scripts: Mutex<HashMap<u8, VecDeque<ScriptedAttempt>>>,
    default_score: f64,
}

impl ScriptedGateway {
    /// All attempts succeed with `default_score` unless a phase script says
    /// otherwise.
    pub fn new(default_score: f64) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            default_score,
        }
    }

    /// Queue scripted scores for a phase, consumed one per attempt.
    pub fn script_scores(self, phase_id: u8, scores: impl IntoIterator<Item = f64>) -> Self {
        self.script(phase_id, scores.into_iter().map(ScriptedAttempt::Score))
    }

    /// Queue arbitrary scripted attempts for a phase.
    pub fn script(self, phase_id: u8, attempts: impl IntoIterator<Item = ScriptedAttempt>) -> Self {
        {
            let mut scripts = self.scripts.lock().expect("script lock poisoned");
            scripts
                .entry(phase_id)
                .or_default()
                .extend(attempts);
        }
        self
    }

    fn next_attempt(&self, phase_id: u8) -> ScriptedAttempt {
        let mut scripts = self.scripts.lock().expect("script lock poisoned");
        scripts
            .get_mut(&phase_id)
            .and_then(|queue| queue.pop_front())
            .unwrap_or(ScriptedAttempt::Score(self.default_score))
    }
}

#[async_trait]
impl GenerationGateway for ScriptedGateway {
    async fn generate(
        &self,
        request: GenerateRequest,
        progress: mpsc::Sender<u8>,
    ) -> Result<GenerateReply, GatewayError> {
        // Synthetic partial progress so executor progress plumbing is
        // exercised even in scripted runs.
        for step in [30u8, 60, 100] {
            let _ = progress.try_send(step);
        }

        match self.next_attempt(request.phase_id) {
            ScriptedAttempt::Fail(message) => Err(GatewayError::Transport(message)),
            ScriptedAttempt::Score(score) => {
                let artifact = Artifact::new(serde_json::json!({
                    "phase": request.phase_id,
                    "attempt": request.attempt,
                    "brief": request.brief,
                }));
                Ok(GenerateReply { artifact, score })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GenerationParams;
    use crate::session::SessionId;

    fn request(phase_id: u8, attempt: u32) -> GenerateRequest {
        GenerateRequest {
            session_id: SessionId::new(),
            phase_id,
            attempt,
            brief: "test".to_string(),
            prior_artifacts: vec![],
            params: GenerationParams::default(),
        }
    }

    #[tokio::test]
    async fn scripted_scores_are_consumed_in_order() {
        let gw = ScriptedGateway::new(0.95).script_scores(2, [0.5, 0.9]);
        let (tx, _rx) = mpsc::channel(8);

        let first = gw.generate(request(2, 1), tx.clone()).await.unwrap();
        assert_eq!(first.score, 0.5);
        let second = gw.generate(request(2, 2), tx.clone()).await.unwrap();
        assert_eq!(second.score, 0.9);
        // Queue exhausted — falls back to the default.
        let third = gw.generate(request(2, 3), tx).await.unwrap();
        assert_eq!(third.score, 0.95);
    }

    #[tokio::test]
    async fn unscripted_phase_uses_default_score() {
        let gw = ScriptedGateway::new(0.8);
        let (tx, _rx) = mpsc::channel(8);
        let reply = gw.generate(request(5, 1), tx).await.unwrap();
        assert_eq!(reply.score, 0.8);
        assert_eq!(reply.artifact.content["phase"], 5);
    }

    #[tokio::test]
    async fn scripted_failure_returns_transport_error() {
        let gw = ScriptedGateway::new(0.9).script(3, [ScriptedAttempt::Fail("refused".into())]);
        let (tx, _rx) = mpsc::channel(8);
        let err = gw.generate(request(3, 1), tx).await.unwrap_err();
        assert!(matches!(err, GatewayError::Transport(msg) if msg == "refused"));
    }

    #[tokio::test]
    async fn progress_ticks_are_streamed() {
        let gw = ScriptedGateway::new(0.9);
        let (tx, mut rx) = mpsc::channel(8);
        gw.generate(request(1, 1), tx).await.unwrap();
        let mut seen = Vec::new();
        while let Ok(p) = rx.try_recv() {
            seen.push(p);
        }
        assert_eq!(seen, vec![30, 60, 100]);
    }
}
