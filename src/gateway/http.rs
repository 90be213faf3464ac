//! HTTP-backed generation gateway.
//!
//! Posts each [`GenerateRequest`] as JSON to a configured endpoint and
//! expects a [`GenerateReply`] body. Transport failures and timeouts map to
//! [`GatewayError`] variants; the executor folds both into the retry path.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::errors::GatewayError;

use super::{GenerateReply, GenerateRequest, GenerationGateway};

pub struct HttpGateway {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpGateway {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            timeout,
        }
    }
}

#[async_trait]
impl GenerationGateway for HttpGateway {
    async fn generate(
        &self,
        request: GenerateRequest,
        progress: mpsc::Sender<u8>,
    ) -> Result<GenerateReply, GatewayError> {
        let response = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout(self.timeout)
                } else {
                    GatewayError::Transport(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(GatewayError::Transport(format!(
                "gateway returned HTTP {}",
                response.status()
            )));
        }

        let reply: GenerateReply = response
            .json()
            .await
            .map_err(|e| GatewayError::Transport(format!("invalid gateway response: {e}")))?;

        if !(0.0..=1.0).contains(&reply.score) {
            return Err(GatewayError::InvalidScore(reply.score));
        }

        // The plain HTTP gateway has no streaming channel; report completion
        // once the reply is in hand.
        let _ = progress.try_send(100);

        Ok(reply)
    }
}
