//! Dashboard API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<DashboardState>`.

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::quotes::breaker::BreakerState;
use crate::quotes::client::QuoteClient;
use crate::types::{Opportunity, ScanReport};

/// Scan reports kept for `/api/scans`.
pub const MAX_RECENT_SCANS: usize = 100;
/// Opportunities kept for `/api/opportunities`.
pub const MAX_RECENT_OPPORTUNITIES: usize = 50;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ScanTotals {
    last_scan_at: Option<DateTime<Utc>>,
    scans_completed: u64,
    total_opportunities: u64,
}

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub engine_name: String,
    pub started_at: DateTime<Utc>,
    client: Arc<QuoteClient>,
    totals: RwLock<ScanTotals>,
    recent_scans: RwLock<Vec<ScanReport>>,
    recent_opportunities: RwLock<Vec<Opportunity>>,
}

impl DashboardState {
    pub fn new(engine_name: impl Into<String>, client: Arc<QuoteClient>) -> Self {
        Self {
            engine_name: engine_name.into(),
            started_at: Utc::now(),
            client,
            totals: RwLock::new(ScanTotals::default()),
            recent_scans: RwLock::new(Vec::new()),
            recent_opportunities: RwLock::new(Vec::new()),
        }
    }

    /// Record a finished scan pass.
    pub async fn record_scan(&self, report: &ScanReport) {
        {
            let mut totals = self.totals.write().await;
            totals.last_scan_at = Some(report.finished_at);
            totals.scans_completed += 1;
            totals.total_opportunities += report.opportunities_found as u64;
        }
        let mut scans = self.recent_scans.write().await;
        scans.push(report.clone());
        trim_front(&mut scans, MAX_RECENT_SCANS);
    }

    /// Record an accepted opportunity.
    pub async fn record_opportunity(&self, opp: &Opportunity) {
        let mut opps = self.recent_opportunities.write().await;
        opps.push(opp.clone());
        trim_front(&mut opps, MAX_RECENT_OPPORTUNITIES);
    }
}

fn trim_front<T>(items: &mut Vec<T>, cap: usize) {
    let excess = items.len().saturating_sub(cap);
    if excess > 0 {
        items.drain(..excess);
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub engine: String,
    pub uptime_secs: i64,
    pub last_scan_at: Option<String>,
    pub scans_completed: u64,
    pub total_opportunities: u64,
    pub negative_cache_size: usize,
    pub breaker_state: BreakerState,
    pub consecutive_failures: u32,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

pub type AppState = Arc<DashboardState>;

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let totals = state.totals.read().await;
    let breaker = state.client.breaker();

    Json(StatusResponse {
        engine: state.engine_name.clone(),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
        last_scan_at: totals.last_scan_at.map(|t| t.to_rfc3339()),
        scans_completed: totals.scans_completed,
        total_opportunities: totals.total_opportunities,
        negative_cache_size: state.client.negative_cache().len(),
        breaker_state: breaker.state(),
        consecutive_failures: breaker.consecutive_failures(),
    })
}

/// GET /api/scans
pub async fn get_scans(State(state): State<AppState>) -> Json<Vec<ScanReport>> {
    let scans = state.recent_scans.read().await;
    Json(scans.clone())
}

/// GET /api/opportunities
pub async fn get_opportunities(State(state): State<AppState>) -> Json<Vec<Opportunity>> {
    let opps = state.recent_opportunities.read().await;
    Json(opps.clone())
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
