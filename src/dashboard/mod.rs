//! Dashboard: Axum web server for scan monitoring.
//!
//! Serves a read-only JSON API over the engine's recent activity.
//! CORS enabled for local development.

pub mod routes;

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::engine::notifier::OpportunityNotifier;
use crate::types::Opportunity;
use routes::AppState;

pub use routes::DashboardState;

/// Start the dashboard web server.
///
/// Binds the port up front so a conflict is reported at startup, then
/// serves from a background task.
pub async fn spawn_dashboard(state: AppState, port: u16) -> Result<()> {
    let app = build_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind dashboard port {port}"))?;
    info!(port, "Dashboard server starting on http://localhost:{port}");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "Dashboard server error");
        }
    });

    Ok(())
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("*"))
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/status", get(routes::get_status))
        .route("/api/scans", get(routes::get_scans))
        .route("/api/opportunities", get(routes::get_opportunities))
        .route("/health", get(routes::health))
        .layer(cors)
        .with_state(state)
}

/// Notifier that records opportunities for `/api/opportunities`.
pub struct DashboardNotifier {
    state: AppState,
}

impl DashboardNotifier {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl OpportunityNotifier for DashboardNotifier {
    async fn notify(&self, opp: &Opportunity) -> Result<()> {
        self.state.record_opportunity(opp).await;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
