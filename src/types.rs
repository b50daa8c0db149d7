//! Shared types for the ARBSCAN engine.
//!
//! These types form the data model used across all modules.
//! They are deliberately plain so that the quote, engine, storage and
//! dashboard modules can depend on them without circular references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Assets
// ---------------------------------------------------------------------------

/// USDC mint on Solana, the default hub asset for every cycle.
pub const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
pub const USDC_SYMBOL: &str = "USDC";

/// A tradable asset: opaque identifier (mint address) plus display symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,
    pub symbol: String,
}

impl Asset {
    pub fn new(id: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            symbol: symbol.into(),
        }
    }

    pub fn usdc() -> Self {
        Self::new(USDC_MINT, USDC_SYMBOL)
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol)
    }
}

/// Read-only symbol → asset mapping supplied by the token list.
///
/// Iteration order is by symbol, which keeps cycle enumeration
/// deterministic across runs.
#[derive(Debug, Clone, Default)]
pub struct AssetUniverse {
    by_symbol: BTreeMap<String, Asset>,
}

impl AssetUniverse {
    /// Build a universe from assets. A repeated symbol keeps the last entry.
    pub fn new(assets: impl IntoIterator<Item = Asset>) -> Self {
        let by_symbol = assets
            .into_iter()
            .map(|a| (a.symbol.clone(), a))
            .collect();
        Self { by_symbol }
    }

    /// Ensure the built-in base tokens (the USDC hub) are present.
    /// Entries already in the list take precedence.
    pub fn with_base_tokens(mut self) -> Self {
        self.by_symbol
            .entry(USDC_SYMBOL.to_string())
            .or_insert_with(Asset::usdc);
        self
    }

    pub fn get(&self, symbol: &str) -> Option<&Asset> {
        self.by_symbol.get(symbol)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Asset> {
        self.by_symbol.values()
    }

    pub fn len(&self) -> usize {
        self.by_symbol.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_symbol.is_empty()
    }
}

/// Directional (input, output) pair of asset identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PairKey {
    pub input: String,
    pub output: String,
}

impl PairKey {
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
        }
    }

    pub fn reversed(&self) -> Self {
        Self::new(self.output.clone(), self.input.clone())
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}→{}", self.input, self.output)
    }
}

// ---------------------------------------------------------------------------
// Quote
// ---------------------------------------------------------------------------

/// Result of asking "if I supply `in_amount` of `input`, how much `output`
/// do I receive". Amounts are integer base units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    /// Name of the upstream that produced this quote, e.g. "jupiter".
    pub source: String,
    pub input: String,
    pub output: String,
    pub in_amount: u64,
    pub out_amount: u64,
    /// Upstream-reported price impact, in percent, when exposed.
    pub price_impact_pct: Option<f64>,
    /// Upstream-reported liquidity signal, when exposed.
    pub liquidity: Option<f64>,
    /// Opaque routing detail, passed through unmodified.
    pub route: serde_json::Value,
    pub fetched_at: DateTime<Utc>,
}

impl Quote {
    pub fn pair(&self) -> PairKey {
        PairKey::new(self.input.clone(), self.output.clone())
    }

    /// A zero output denotes a degenerate quote and never counts as a quote.
    pub fn is_empty(&self) -> bool {
        self.out_amount == 0
    }
}

// ---------------------------------------------------------------------------
// Cycle
// ---------------------------------------------------------------------------

/// Why a cycle could not be constructed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CycleError {
    #[error("cycle needs at least 3 assets, got {0}")]
    TooShort(usize),

    #[error("cycle must start and end at the same asset ({first} != {last})")]
    NotClosed { first: String, last: String },

    #[error("leg {index} is a self-pair on {asset}")]
    SelfPairLeg { index: usize, asset: String },
}

/// Ordered sequence of assets whose first and last entries are the same.
///
/// Only [`Cycle::new`] builds one, so every cycle in the engine is closed
/// and free of self-pair legs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Cycle {
    assets: Vec<Asset>,
}

impl Cycle {
    pub fn new(assets: Vec<Asset>) -> Result<Self, CycleError> {
        if assets.len() < 3 {
            return Err(CycleError::TooShort(assets.len()));
        }
        let first = &assets[0];
        let last = &assets[assets.len() - 1];
        if first.id != last.id {
            return Err(CycleError::NotClosed {
                first: first.symbol.clone(),
                last: last.symbol.clone(),
            });
        }
        if let Some(index) = assets.windows(2).position(|w| w[0].id == w[1].id) {
            return Err(CycleError::SelfPairLeg {
                index,
                asset: assets[index].symbol.clone(),
            });
        }
        Ok(Self { assets })
    }

    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }

    pub fn start(&self) -> &Asset {
        &self.assets[0]
    }

    /// Consecutive (input, output) pairs, one per leg.
    pub fn legs(&self) -> impl Iterator<Item = (&Asset, &Asset)> {
        self.assets.windows(2).map(|w| (&w[0], &w[1]))
    }

    pub fn leg_count(&self) -> usize {
        self.assets.len() - 1
    }
}

impl fmt::Display for Cycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbols: Vec<&str> = self.assets.iter().map(|a| a.symbol.as_str()).collect();
        write!(f, "{}", symbols.join(" → "))
    }
}

// ---------------------------------------------------------------------------
// Opportunity
// ---------------------------------------------------------------------------

/// An accepted, profitable, fully quoted cycle.
#[derive(Debug, Clone, Serialize)]
pub struct Opportunity {
    pub id: Uuid,
    pub cycle: Cycle,
    /// Notional input in base units of the start asset.
    pub notional: u64,
    /// Amount of the start asset received after the final leg.
    pub final_amount: u64,
    pub profit_pct: f64,
    /// One quote per leg, in cycle order.
    pub legs: Vec<Quote>,
    pub discovered_at: DateTime<Utc>,
}

impl fmt::Display for Opportunity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | {} → {} | profit {:.3}%",
            self.cycle, self.notional, self.final_amount, self.profit_pct
        )
    }
}

// ---------------------------------------------------------------------------
// Scan report
// ---------------------------------------------------------------------------

/// Aggregate counters for one scan pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub scan_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub cycles_enumerated: usize,
    /// Evaluations actually dispatched (fewer than enumerated if cancelled).
    pub cycles_attempted: usize,
    /// Evaluations that ran every leg to completion.
    pub cycles_completed: usize,
    /// Evaluations aborted because a leg produced no quote.
    pub leg_failures: usize,
    /// Fully quoted cycles rejected by the acceptance policy.
    pub filtered: usize,
    /// Evaluations that panicked, timed out or were aborted.
    pub evaluation_errors: usize,
    pub opportunities_found: usize,
    pub notify_failures: usize,
    pub cancelled: bool,
}

impl ScanReport {
    pub fn new(cycles_enumerated: usize) -> Self {
        let now = Utc::now();
        Self {
            scan_id: Uuid::new_v4(),
            started_at: now,
            finished_at: now,
            elapsed_ms: 0,
            cycles_enumerated,
            cycles_attempted: 0,
            cycles_completed: 0,
            leg_failures: 0,
            filtered: 0,
            evaluation_errors: 0,
            opportunities_found: 0,
            notify_failures: 0,
            cancelled: false,
        }
    }
}

impl fmt::Display for ScanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Scan {}: enumerated={} attempted={} completed={} leg_failures={} filtered={} errors={} opportunities={} elapsed={}ms{}",
            self.scan_id,
            self.cycles_enumerated,
            self.cycles_attempted,
            self.cycles_completed,
            self.leg_failures,
            self.filtered,
            self.evaluation_errors,
            self.opportunities_found,
            self.elapsed_ms,
            if self.cancelled { " (cancelled)" } else { "" },
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
