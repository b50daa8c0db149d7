//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Every section has defaults, so a missing key (or an empty file) falls
//! back to sane values. Secrets (API keys) are referenced by env-var name
//! and resolved at runtime via `std::env::var`.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::engine::cycles::CycleShapes;
use crate::engine::evaluator::AcceptancePolicy;
use crate::engine::scanner::ScanConfig;
use crate::quotes::breaker::BreakerConfig;
use crate::quotes::client::RetryPolicy;
use crate::quotes::jupiter;
use crate::storage::discovery::DiscoveryConfig;
use crate::types::USDC_SYMBOL;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub quote: QuoteConfig,
    pub negative_cache: NegativeCacheConfig,
    pub breaker: BreakerSection,
    pub scanner: ScannerConfig,
    pub filters: FiltersConfig,
    pub assets: AssetsConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EngineConfig {
    pub name: String,
    /// Seconds between the start of consecutive scan passes.
    pub scan_interval_secs: u64,
    /// Notional per cycle in base units of the hub (100 USDC = 100_000_000).
    pub notional_amount: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: "ARBSCAN-001".to_string(),
            scan_interval_secs: 60,
            notional_amount: 100_000_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct QuoteConfig {
    pub base_url: String,
    /// Env var holding an optional API key sent as `x-api-key`.
    pub api_key_env: Option<String>,
    pub slippage_bps: u16,
    pub request_timeout_secs: u64,
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            base_url: jupiter::DEFAULT_BASE_URL.to_string(),
            api_key_env: None,
            slippage_bps: 50,
            request_timeout_secs: 10,
            max_attempts: 5,
            base_backoff_ms: 2_000,
            max_backoff_ms: 30_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NegativeCacheConfig {
    pub ttl_secs: u64,
}

impl Default for NegativeCacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 600 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BreakerSection {
    pub failure_threshold: u32,
    pub cooldown_secs: u64,
}

impl Default for BreakerSection {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_secs: 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScannerConfig {
    pub concurrency: usize,
    /// Defaults to `concurrency` when unset.
    pub batch_size: Option<usize>,
    pub batch_pacing_ms: u64,
    pub evaluation_timeout_secs: u64,
    /// Zero disables the whole-pass deadline.
    pub scan_timeout_secs: u64,
    pub round_trips: bool,
    pub pairwise: bool,
    pub triangles: bool,
    pub max_cycles: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            batch_size: None,
            batch_pacing_ms: 1_000,
            evaluation_timeout_secs: 300,
            scan_timeout_secs: 900,
            round_trips: true,
            pairwise: false,
            triangles: false,
            max_cycles: 1_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FiltersConfig {
    pub min_profit_pct: f64,
    pub max_profit_pct: Option<f64>,
    pub max_inter_leg_slippage_pct: Option<f64>,
    pub max_price_impact_pct: Option<f64>,
    pub min_liquidity: Option<f64>,
}

impl Default for FiltersConfig {
    fn default() -> Self {
        Self {
            min_profit_pct: 0.5,
            max_profit_pct: Some(50.0),
            max_inter_leg_slippage_pct: None,
            max_price_impact_pct: None,
            min_liquidity: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AssetsConfig {
    /// Token list in `{ "SYMBOL": { "address": "..." } }` form.
    pub token_file: String,
    pub hub_symbol: String,
    /// Symbols to scan first; empty scans the whole list.
    pub priority_symbols: Vec<String>,
    pub max_assets: usize,
    /// Build the token list from Raydium/DexScreener when the file is missing.
    pub discover_on_missing: bool,
    pub discover_limit: usize,
    pub min_liquidity_usd: f64,
    pub discovery_timeout_secs: u64,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            token_file: "tokens.json".to_string(),
            hub_symbol: USDC_SYMBOL.to_string(),
            priority_symbols: Vec::new(),
            max_assets: 30,
            discover_on_missing: true,
            discover_limit: 300,
            min_liquidity_usd: 2_000.0,
            discovery_timeout_secs: 15,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8080,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config = Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Parse and validate configuration from TOML text.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.engine.notional_amount == 0 {
            bail!("engine.notional_amount must be greater than zero");
        }
        if self.engine.scan_interval_secs == 0 {
            bail!("engine.scan_interval_secs must be greater than zero");
        }
        if self.scanner.concurrency == 0 {
            bail!("scanner.concurrency must be at least 1");
        }
        if self.scanner.batch_size == Some(0) {
            bail!("scanner.batch_size must be at least 1");
        }
        if self.quote.max_attempts == 0 {
            bail!("quote.max_attempts must be at least 1");
        }
        if self.breaker.failure_threshold == 0 {
            bail!("breaker.failure_threshold must be at least 1");
        }
        if self.quote.slippage_bps > 10_000 {
            bail!("quote.slippage_bps must be at most 10000");
        }
        if !self.filters.min_profit_pct.is_finite() || self.filters.min_profit_pct < 0.0 {
            bail!("filters.min_profit_pct must be a finite, non-negative number");
        }
        if let Some(max) = self.filters.max_profit_pct {
            if max <= self.filters.min_profit_pct {
                bail!(
                    "filters.max_profit_pct ({max}) must exceed filters.min_profit_pct ({})",
                    self.filters.min_profit_pct
                );
            }
        }
        for (name, value) in [
            ("max_inter_leg_slippage_pct", self.filters.max_inter_leg_slippage_pct),
            ("max_price_impact_pct", self.filters.max_price_impact_pct),
            ("min_liquidity", self.filters.min_liquidity),
        ] {
            if matches!(value, Some(v) if v < 0.0) {
                bail!("filters.{name} must not be negative");
            }
        }
        if self.assets.hub_symbol.trim().is_empty() {
            bail!("assets.hub_symbol must not be empty");
        }
        if self.assets.discover_limit == 0 {
            bail!("assets.discover_limit must be at least 1");
        }
        if !self.assets.min_liquidity_usd.is_finite() || self.assets.min_liquidity_usd < 0.0 {
            bail!("assets.min_liquidity_usd must be a finite, non-negative number");
        }
        self.validate_timeouts()
    }

    /// An evaluation must outlive the retries of every leg, otherwise the
    /// scheduler abandons calls the breaker never hears back from.
    fn validate_timeouts(&self) -> Result<()> {
        let evaluation = self.scanner.evaluation_timeout_secs;
        if evaluation == 0 {
            bail!("scanner.evaluation_timeout_secs must be greater than zero");
        }
        let per_call = self
            .retry_policy()
            .budget(Duration::from_secs(self.quote.request_timeout_secs));
        let required = per_call.saturating_mul(self.cycle_shapes().max_legs());
        if Duration::from_secs(evaluation) < required {
            bail!(
                "scanner.evaluation_timeout_secs ({evaluation}) must be at least {}s: \
                 {} legs of {} attempts at quote.request_timeout_secs plus backoff",
                required.as_secs_f64().ceil(),
                self.cycle_shapes().max_legs(),
                self.quote.max_attempts
            );
        }
        let scan = self.scanner.scan_timeout_secs;
        if scan > 0 && scan < evaluation {
            bail!(
                "scanner.scan_timeout_secs ({scan}) must be 0 or at least \
                 scanner.evaluation_timeout_secs ({evaluation})"
            );
        }
        Ok(())
    }

    // -- Component configuration ------------------------------------------

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.quote.max_attempts,
            base_backoff: Duration::from_millis(self.quote.base_backoff_ms),
            max_backoff: Duration::from_millis(self.quote.max_backoff_ms),
        }
    }

    pub fn breaker_config(&self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.breaker.failure_threshold,
            cooldown: Duration::from_secs(self.breaker.cooldown_secs),
        }
    }

    pub fn negative_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.negative_cache.ttl_secs)
    }

    pub fn acceptance_policy(&self) -> AcceptancePolicy {
        AcceptancePolicy {
            min_profit_pct: self.filters.min_profit_pct,
            max_profit_pct: self.filters.max_profit_pct,
            max_inter_leg_slippage_pct: self.filters.max_inter_leg_slippage_pct,
            max_price_impact_pct: self.filters.max_price_impact_pct,
            min_liquidity: self.filters.min_liquidity,
        }
    }

    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            concurrency: self.scanner.concurrency,
            batch_size: self.scanner.batch_size.unwrap_or(self.scanner.concurrency),
            batch_pacing: Duration::from_millis(self.scanner.batch_pacing_ms),
            evaluation_timeout: Duration::from_secs(self.scanner.evaluation_timeout_secs),
            scan_timeout: (self.scanner.scan_timeout_secs > 0)
                .then(|| Duration::from_secs(self.scanner.scan_timeout_secs)),
            notional: self.engine.notional_amount,
        }
    }

    pub fn discovery_config(&self) -> DiscoveryConfig {
        DiscoveryConfig {
            limit: self.assets.discover_limit,
            min_liquidity_usd: self.assets.min_liquidity_usd,
            request_timeout: Duration::from_secs(self.assets.discovery_timeout_secs),
        }
    }

    pub fn cycle_shapes(&self) -> CycleShapes {
        CycleShapes {
            hub_symbol: self.assets.hub_symbol.clone(),
            priority: self.assets.priority_symbols.clone(),
            max_assets: self.assets.max_assets,
            round_trips: self.scanner.round_trips,
            pairwise: self.scanner.pairwise,
            triangles: self.scanner.triangles,
            max_cycles: self.scanner.max_cycles,
        }
    }
}
