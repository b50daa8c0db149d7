//! Shared fixtures for the integration suites.

pub mod mock_source;

use std::sync::Arc;

use arbscan::config::AppConfig;
use arbscan::engine::notifier::{ChannelNotifier, OpportunityNotifier};
use arbscan::engine::Engine;
use arbscan::types::{Asset, AssetUniverse, Opportunity};
use tokio::sync::mpsc;

use mock_source::MockSource;

/// A universe of the hub plus `symbols`, each with mint `<symbol>-mint`.
pub fn universe(symbols: &[&str]) -> AssetUniverse {
    AssetUniverse::new(
        std::iter::once("USDC")
            .chain(symbols.iter().copied())
            .map(|s| Asset::new(mint(s), s)),
    )
}

pub fn mint(symbol: &str) -> String {
    format!("{}-mint", symbol.to_lowercase())
}

/// Config with pacing and the pass deadline switched off.
pub fn quiet_config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.scanner.batch_pacing_ms = 0;
    cfg.scanner.scan_timeout_secs = 0;
    cfg.assets.max_assets = 1_000;
    cfg
}

/// Engine over `source` whose opportunities land in the returned channel.
pub fn engine(
    cfg: &AppConfig,
    source: Arc<MockSource>,
) -> (Engine, mpsc::Receiver<Opportunity>) {
    let (tx, rx) = mpsc::channel(1_024);
    let notifier: Arc<dyn OpportunityNotifier> = Arc::new(ChannelNotifier::new(tx));
    (Engine::new(cfg, source, notifier), rx)
}
