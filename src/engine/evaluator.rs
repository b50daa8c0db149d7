//! Cycle evaluator.
//!
//! Walks a cycle leg by leg through the `QuoteClient`, feeding each leg's
//! output amount into the next leg, then computes the round-trip profit
//! and applies the acceptance policy. Any leg without a quote ends the
//! evaluation; partial cycles never become opportunities.

use chrono::Utc;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::quotes::client::QuoteClient;
use crate::quotes::QuoteFailure;
use crate::types::{Cycle, Opportunity, Quote};

// ---------------------------------------------------------------------------
// Acceptance policy
// ---------------------------------------------------------------------------

/// AND-combined filters a fully quoted cycle must pass.
#[derive(Debug, Clone)]
pub struct AcceptancePolicy {
    /// Minimum round-trip profit, in percent.
    pub min_profit_pct: f64,
    /// Profits above this are treated as bad or stale quote data.
    pub max_profit_pct: Option<f64>,
    /// Bound on `|out[i+1] / out[i] - 1|` between consecutive legs, in percent.
    pub max_inter_leg_slippage_pct: Option<f64>,
    /// Bound on the summed upstream price impact across legs, in percent.
    pub max_price_impact_pct: Option<f64>,
    /// Minimum liquidity signal; only applied when every leg exposes one.
    pub min_liquidity: Option<f64>,
}

impl Default for AcceptancePolicy {
    fn default() -> Self {
        Self {
            min_profit_pct: 0.5,
            max_profit_pct: None,
            max_inter_leg_slippage_pct: None,
            max_price_impact_pct: None,
            min_liquidity: None,
        }
    }
}

/// Why a cycle evaluation produced no opportunity.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Rejection {
    #[error("leg {leg} failed: {failure}")]
    LegFailed { leg: usize, failure: QuoteFailure },

    #[error("profit {profit_pct:.4}% below threshold")]
    BelowThreshold { profit_pct: f64 },

    #[error("profit {profit_pct:.4}% exceeds plausibility cap")]
    TooGoodToBeTrue { profit_pct: f64 },

    #[error("inter-leg slippage {slippage_pct:.4}% after leg {leg}")]
    InterLegSlippage { leg: usize, slippage_pct: f64 },

    #[error("total price impact {total_pct:.4}% too high")]
    PriceImpact { total_pct: f64 },

    #[error("liquidity {min_seen} below minimum")]
    Liquidity { min_seen: f64 },
}

impl Rejection {
    pub fn is_leg_failure(&self) -> bool {
        matches!(self, Rejection::LegFailed { .. })
    }
}

impl AcceptancePolicy {
    /// Check a fully quoted cycle. `legs` are in cycle order.
    pub fn check(&self, legs: &[Quote], profit_pct: f64) -> Result<(), Rejection> {
        if profit_pct < self.min_profit_pct {
            return Err(Rejection::BelowThreshold { profit_pct });
        }

        if let Some(max) = self.max_profit_pct {
            if profit_pct > max {
                return Err(Rejection::TooGoodToBeTrue { profit_pct });
            }
        }

        if let Some(max) = self.max_inter_leg_slippage_pct {
            for (i, pair) in legs.windows(2).enumerate() {
                let prev = pair[0].out_amount as f64;
                let next = pair[1].out_amount as f64;
                let slippage_pct = (next / prev - 1.0).abs() * 100.0;
                if slippage_pct > max {
                    return Err(Rejection::InterLegSlippage {
                        leg: i + 1,
                        slippage_pct,
                    });
                }
            }
        }

        if let Some(max) = self.max_price_impact_pct {
            let total_pct: f64 = legs.iter().filter_map(|q| q.price_impact_pct).sum();
            if total_pct > max {
                return Err(Rejection::PriceImpact { total_pct });
            }
        }

        if let Some(min) = self.min_liquidity {
            let signals: Option<Vec<f64>> = legs.iter().map(|q| q.liquidity).collect();
            if let Some(signals) = signals {
                let min_seen = signals.into_iter().fold(f64::INFINITY, f64::min);
                if min_seen < min {
                    return Err(Rejection::Liquidity { min_seen });
                }
            }
        }

        Ok(())
    }
}

/// `(final - initial) / initial × 100`.
pub fn profit_pct(initial: u64, final_amount: u64) -> f64 {
    if initial == 0 {
        return 0.0;
    }
    (final_amount as f64 - initial as f64) / initial as f64 * 100.0
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

pub struct CycleEvaluator {
    client: Arc<QuoteClient>,
    policy: AcceptancePolicy,
}

impl CycleEvaluator {
    pub fn new(client: Arc<QuoteClient>, policy: AcceptancePolicy) -> Self {
        Self { client, policy }
    }

    pub fn client(&self) -> &Arc<QuoteClient> {
        &self.client
    }

    pub fn policy(&self) -> &AcceptancePolicy {
        &self.policy
    }

    /// Evaluate `cycle` at `notional` base units of its start asset.
    pub async fn evaluate(&self, cycle: &Cycle, notional: u64) -> Option<Opportunity> {
        match self.assess(cycle, notional).await {
            Ok(opp) => Some(opp),
            Err(rejection) => {
                debug!(cycle = %cycle, reason = %rejection, "Cycle rejected");
                None
            }
        }
    }

    /// Like [`evaluate`](Self::evaluate) but reports why nothing was found.
    pub async fn assess(&self, cycle: &Cycle, notional: u64) -> Result<Opportunity, Rejection> {
        let mut amount = notional;
        let mut legs = Vec::with_capacity(cycle.leg_count());

        for (leg, (input, output)) in cycle.legs().enumerate() {
            let quote = self
                .client
                .get_quote(input, output, amount)
                .await
                .map_err(|failure| Rejection::LegFailed { leg, failure })?;

            if quote.is_empty() {
                return Err(Rejection::LegFailed {
                    leg,
                    failure: QuoteFailure::EmptyQuote(quote.pair()),
                });
            }

            amount = quote.out_amount;
            legs.push(quote);
        }

        let profit_pct = profit_pct(notional, amount);
        self.policy.check(&legs, profit_pct)?;

        Ok(Opportunity {
            id: Uuid::new_v4(),
            cycle: cycle.clone(),
            notional,
            final_amount: amount,
            profit_pct,
            legs,
            discovered_at: Utc::now(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
