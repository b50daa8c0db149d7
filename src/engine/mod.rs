//! Core engine: enumerate cycles, quote every leg, filter and notify.

pub mod cycles;
pub mod evaluator;
pub mod negative_cache;
pub mod notifier;
pub mod scanner;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::quotes::client::QuoteClient;
use crate::quotes::QuoteSource;
use crate::types::AssetUniverse;

use cycles::CycleShapes;
use evaluator::CycleEvaluator;
use negative_cache::NegativeCache;
use notifier::OpportunityNotifier;
use scanner::{ScanOutcome, ScanScheduler};

/// The wired-up component graph for one quote source.
///
/// Owns the negative cache, the quote client (and through it the breaker)
/// and the scheduler, so state survives across passes.
pub struct Engine {
    client: Arc<QuoteClient>,
    scheduler: ScanScheduler,
    shapes: CycleShapes,
}

impl Engine {
    pub fn new(
        config: &AppConfig,
        source: Arc<dyn QuoteSource>,
        notifier: Arc<dyn OpportunityNotifier>,
    ) -> Self {
        Self::with_client(config, Self::quote_client(config, source), notifier)
    }

    /// Build the quote client (with its own negative cache and breaker)
    /// ahead of the engine, for components that observe it.
    pub fn quote_client(config: &AppConfig, source: Arc<dyn QuoteSource>) -> Arc<QuoteClient> {
        let cache = Arc::new(NegativeCache::new(config.negative_cache_ttl()));
        Arc::new(QuoteClient::new(
            source,
            cache,
            config.breaker_config(),
            config.retry_policy(),
            config.quote.slippage_bps,
        ))
    }

    pub fn with_client(
        config: &AppConfig,
        client: Arc<QuoteClient>,
        notifier: Arc<dyn OpportunityNotifier>,
    ) -> Self {
        let evaluator = Arc::new(CycleEvaluator::new(
            client.clone(),
            config.acceptance_policy(),
        ));
        let scheduler = ScanScheduler::new(evaluator, notifier, config.scan_config());

        Self {
            client,
            scheduler,
            shapes: config.cycle_shapes(),
        }
    }

    pub fn client(&self) -> &Arc<QuoteClient> {
        &self.client
    }

    pub fn scheduler(&self) -> &ScanScheduler {
        &self.scheduler
    }

    pub fn shapes(&self) -> &CycleShapes {
        &self.shapes
    }

    /// Run one pass over `universe` with the configured cycle shapes.
    pub async fn scan_once(
        &self,
        universe: &AssetUniverse,
        cancel: CancellationToken,
    ) -> ScanOutcome {
        self.scheduler.run_scan(universe, &self.shapes, cancel).await
    }
}
