//! HTTP server command — `atelier serve`.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use atelier::config::AtelierConfig;
use atelier::gateway::HttpGateway;
use atelier::orchestrator::Orchestrator;
use atelier::server::start_server;

pub async fn cmd_serve(config_path: &Path, port: Option<u16>) -> Result<()> {
    let config = AtelierConfig::load_or_default(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    let port = port.unwrap_or(config.server.port);

    let gateway = Arc::new(HttpGateway::new(
        config.gateway.endpoint.clone(),
        config.request_timeout(),
    ));
    let orchestrator = Arc::new(Orchestrator::new(config, gateway));

    start_server(orchestrator, port).await
}
