//! HTTP server wiring: router construction and startup.

mod api;
mod ws;

pub use api::{ApiError, AppState, api_router};

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use tower_http::cors::CorsLayer;

use crate::orchestrator::Orchestrator;

/// Build the full application router.
pub fn build_router(orchestrator: Arc<Orchestrator>) -> Router {
    let state = Arc::new(AppState { orchestrator });
    api_router()
        .route("/api/sessions/{id}/events", get(ws::session_events_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until Ctrl+C.
pub async fn start_server(orchestrator: Arc<Orchestrator>, port: u16) -> Result<()> {
    let app = build_router(orchestrator);

    let addr = format!("127.0.0.1:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    let local_addr = listener.local_addr()?;
    tracing::info!(%local_addr, "atelier listening");
    println!("Atelier running at http://{local_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::error!("failed to install Ctrl+C handler");
        return;
    }
    println!("\nShutting down...");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AtelierConfig;
    use crate::gateway::ScriptedGateway;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn test_app() -> Router {
        let orchestrator = Arc::new(Orchestrator::new(
            AtelierConfig::default(),
            Arc::new(ScriptedGateway::new(0.9)),
        ));
        build_router(orchestrator)
    }

    #[tokio::test]
    async fn router_serves_health() {
        let response = test_app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn events_route_rejects_unknown_session() {
        let response = test_app()
            .oneshot(
                Request::get(format!(
                    "/api/sessions/{}/events",
                    uuid::Uuid::nil()
                ))
                .body(Body::empty())
                .unwrap(),
            )
            .await
            .unwrap();
        // No upgrade headers and an unknown id; either way, not OK.
        assert_ne!(response.status(), StatusCode::OK);
    }
}
