//! Generation gateway: the external service that produces phase artifacts.
//!
//! The orchestrator treats generation as a black box behind the
//! [`GenerationGateway`] trait. Two implementations ship with the crate:
//! an HTTP client ([`HttpGateway`]) for real deployments, and a
//! deterministic [`ScriptedGateway`] for tests and dry runs.

mod http;
mod scripted;

pub use http::HttpGateway;
pub use scripted::{ScriptedAttempt, ScriptedGateway};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::errors::GatewayError;
use crate::session::{Artifact, SessionId};

/// Opaque generation parameters, adjusted per retry by the configured
/// [`RetryStrategy`](crate::gates::RetryStrategy).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenerationParams(pub serde_json::Map<String, serde_json::Value>);

impl GenerationParams {
    pub fn set(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.as_str())
    }
}

/// One generation request for one phase attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub session_id: SessionId,
    pub phase_id: u8,
    /// 1-based attempt counter (1 = initial attempt).
    pub attempt: u32,
    pub brief: String,
    /// Artifacts of completed earlier phases; read-only context.
    pub prior_artifacts: Vec<Artifact>,
    pub params: GenerationParams,
}

/// Successful gateway response: an artifact and its quality score in [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateReply {
    pub artifact: Artifact,
    pub score: f64,
}

/// Asynchronous artifact generation.
///
/// Implementations may stream partial progress (0..=100) through the
/// `progress` channel; sending is best-effort and implementations must not
/// block on a full channel. The final reply, not the progress stream,
/// carries the authoritative result.
#[async_trait]
pub trait GenerationGateway: Send + Sync {
    async fn generate(
        &self,
        request: GenerateRequest,
        progress: mpsc::Sender<u8>,
    ) -> Result<GenerateReply, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_request_serializes_camel_case() {
        let request = GenerateRequest {
            session_id: SessionId::new(),
            phase_id: 3,
            attempt: 1,
            brief: "spring exhibit poster".to_string(),
            prior_artifacts: vec![],
            params: GenerationParams::default(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("sessionId").is_some());
        assert!(json.get("phaseId").is_some());
        assert!(json.get("priorArtifacts").is_some());
    }

    #[test]
    fn params_are_a_transparent_map() {
        let mut params = GenerationParams::default();
        params.set("medium", "image");
        let json = serde_json::to_string(&params).unwrap();
        assert_eq!(json, r#"{"medium":"image"}"#);
        let parsed: GenerationParams = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.get("medium"), Some("image"));
    }
}
