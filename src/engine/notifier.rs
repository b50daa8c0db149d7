//! Opportunity notifiers.
//!
//! The engine hands every accepted opportunity to an `OpportunityNotifier`.
//! Delivery is the notifier's concern; errors are returned to the scanner
//! only so they can be logged and counted.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

use crate::types::Opportunity;

#[async_trait]
pub trait OpportunityNotifier: Send + Sync {
    async fn notify(&self, opportunity: &Opportunity) -> Result<()>;
}

/// Writes one structured log line per opportunity.
pub struct LogNotifier;

#[async_trait]
impl OpportunityNotifier for LogNotifier {
    async fn notify(&self, opp: &Opportunity) -> Result<()> {
        info!(
            id = %opp.id,
            cycle = %opp.cycle,
            notional = opp.notional,
            final_amount = opp.final_amount,
            profit = format!("{:.3}%", opp.profit_pct),
            "Arbitrage opportunity"
        );
        Ok(())
    }
}

/// Forwards opportunities into a channel drained by an external delivery task.
pub struct ChannelNotifier {
    tx: mpsc::Sender<Opportunity>,
}

impl ChannelNotifier {
    pub fn new(tx: mpsc::Sender<Opportunity>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl OpportunityNotifier for ChannelNotifier {
    async fn notify(&self, opp: &Opportunity) -> Result<()> {
        self.tx
            .send(opp.clone())
            .await
            .context("Opportunity channel closed")
    }
}

/// Delivers to every inner notifier concurrently; fails if any of them failed.
pub struct FanoutNotifier {
    notifiers: Vec<Arc<dyn OpportunityNotifier>>,
}

impl FanoutNotifier {
    pub fn new(notifiers: Vec<Arc<dyn OpportunityNotifier>>) -> Self {
        Self { notifiers }
    }
}

#[async_trait]
impl OpportunityNotifier for FanoutNotifier {
    async fn notify(&self, opp: &Opportunity) -> Result<()> {
        let results = join_all(self.notifiers.iter().map(|n| n.notify(opp))).await;
        match results.into_iter().find_map(Result::err) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
