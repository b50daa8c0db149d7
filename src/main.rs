//! ARBSCAN: Quote orchestration and cycle-arbitrage detection engine
//!
//! Entry point. Loads configuration, initialises structured logging,
//! loads (or discovers) the token list, wires the quote source into the
//! engine and runs the scan loop until Ctrl+C.

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use arbscan::config::AppConfig;
use arbscan::dashboard::{self, DashboardNotifier, DashboardState};
use arbscan::engine::notifier::{FanoutNotifier, LogNotifier, OpportunityNotifier};
use arbscan::engine::Engine;
use arbscan::quotes::jupiter::JupiterSource;
use arbscan::storage::{self, discovery};
use arbscan::types::ScanReport;

const BANNER: &str = r#"
    _    ____  ____  ____   ____    _    _   _
   / \  |  _ \| __ )/ ___| / ___|  / \  | \ | |
  / _ \ | |_) |  _ \\___ \| |     / _ \ |  \| |
 / ___ \|  _ <| |_) |___) | |___ / ___ \| |\  |
/_/   \_\_| \_\____/|____/ \____/_/   \_\_| \_|

  Cycle-arbitrage scanner
  v0.1.0 (detection only, no execution)
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = std::env::var("ARBSCAN_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let cfg = AppConfig::load(&config_path)?;

    init_logging();

    println!("{BANNER}");
    info!(
        engine_name = %cfg.engine.name,
        config = %config_path,
        scan_interval_secs = cfg.engine.scan_interval_secs,
        notional = cfg.engine.notional_amount,
        concurrency = cfg.scanner.concurrency,
        "ARBSCAN starting up"
    );

    // -- Asset universe --------------------------------------------------

    let universe = match storage::load_token_list(Some(&cfg.assets.token_file))? {
        Some(u) => u.with_base_tokens(),
        None if cfg.assets.discover_on_missing => {
            info!(
                limit = cfg.assets.discover_limit,
                "Token list not found, discovering tokens"
            );
            let providers = discovery::default_providers(&cfg.discovery_config())?;
            let discovered =
                discovery::discover_with_fallback(&providers, cfg.assets.discover_limit)
                    .await
                    .context("Token discovery failed")?;
            storage::save_token_list(&discovered, Some(&cfg.assets.token_file))?;
            info!(
                path = %cfg.assets.token_file,
                tokens = discovered.len(),
                "Discovered token list saved"
            );
            discovered.with_base_tokens()
        }
        None => bail!("Token list not found: {}", cfg.assets.token_file),
    };
    if universe.get(&cfg.assets.hub_symbol).is_none() {
        bail!(
            "Hub symbol {} is not in the token list {}",
            cfg.assets.hub_symbol,
            cfg.assets.token_file
        );
    }
    info!(tokens = universe.len(), hub = %cfg.assets.hub_symbol, "Asset universe ready");

    // -- Quote source ----------------------------------------------------

    let api_key = match cfg.quote.api_key_env.as_deref() {
        Some(env) => match AppConfig::resolve_env(env) {
            Ok(key) => Some(key),
            Err(e) => {
                warn!(error = %e, "Quote API key not available, sending unauthenticated requests");
                None
            }
        },
        None => None,
    };
    let source = JupiterSource::new(
        &cfg.quote.base_url,
        api_key,
        Duration::from_secs(cfg.quote.request_timeout_secs),
    )
    .context("Failed to build quote source")?;

    // -- Engine and dashboard --------------------------------------------

    let client = Engine::quote_client(&cfg, Arc::new(source));
    let dashboard_state = Arc::new(DashboardState::new(cfg.engine.name.clone(), client.clone()));

    let notifier: Arc<dyn OpportunityNotifier> = Arc::new(FanoutNotifier::new(vec![
        Arc::new(LogNotifier),
        Arc::new(DashboardNotifier::new(dashboard_state.clone())),
    ]));
    let engine = Engine::with_client(&cfg, client, notifier);

    if cfg.dashboard.enabled {
        dashboard::spawn_dashboard(dashboard_state.clone(), cfg.dashboard.port).await?;
    }

    // -- Main loop -------------------------------------------------------

    let shutdown = CancellationToken::new();
    let watcher = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received.");
        }
        watcher.cancel();
    });

    let mut interval = tokio::time::interval(Duration::from_secs(cfg.engine.scan_interval_secs));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        interval_secs = cfg.engine.scan_interval_secs,
        "Entering main loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let outcome = engine.scan_once(&universe, shutdown.child_token()).await;
                log_scan_report(&outcome.report);
                dashboard_state.record_scan(&outcome.report).await;
                if shutdown.is_cancelled() {
                    break;
                }
            }
            _ = shutdown.cancelled() => break,
        }
    }

    info!(
        negative_cache = engine.client().negative_cache().len(),
        breaker = ?engine.client().breaker().state(),
        "ARBSCAN shut down cleanly."
    );

    Ok(())
}

/// Log a human-readable scan summary.
fn log_scan_report(report: &ScanReport) {
    info!(
        scan_id = %report.scan_id,
        enumerated = report.cycles_enumerated,
        attempted = report.cycles_attempted,
        completed = report.cycles_completed,
        leg_failures = report.leg_failures,
        filtered = report.filtered,
        errors = report.evaluation_errors,
        opportunities = report.opportunities_found,
        notify_failures = report.notify_failures,
        elapsed_ms = report.elapsed_ms,
        cancelled = report.cancelled,
        "Scan complete"
    );
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("arbscan=info"));

    let json_logging = std::env::var("ARBSCAN_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
