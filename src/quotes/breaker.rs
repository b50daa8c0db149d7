//! Consecutive-failure circuit breaker for an upstream quote source.
//!
//! Closed → Open once `failure_threshold` consecutive calls fail; Open
//! short-circuits every call for `cooldown`; afterwards the breaker is
//! HalfOpen and lets a single trial through. A successful trial closes
//! it, a failed trial opens it again.

use parking_lot::Mutex;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Breaker tuning.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
        }
    }
}

/// Public snapshot of the breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
enum Inner {
    Closed { failures: u32 },
    Open { until: Instant },
    /// `trial_started` is set while a trial call is in flight. A trial that
    /// never reports back (cancelled caller) is superseded after `cooldown`.
    HalfOpen { trial_started: Option<Instant> },
}

pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner::Closed { failures: 0 }),
        }
    }

    /// Ask permission to issue an upstream call.
    /// Returns `false` when the call must short-circuit.
    pub fn try_acquire(&self) -> bool {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        match *inner {
            Inner::Closed { .. } => true,
            Inner::Open { until } => {
                if now >= until {
                    info!("Circuit breaker cool-down elapsed, admitting a trial call");
                    *inner = Inner::HalfOpen {
                        trial_started: Some(now),
                    };
                    true
                } else {
                    false
                }
            }
            Inner::HalfOpen { trial_started } => match trial_started {
                Some(started) if now.duration_since(started) < self.config.cooldown => false,
                _ => {
                    *inner = Inner::HalfOpen {
                        trial_started: Some(now),
                    };
                    true
                }
            },
        }
    }

    /// The upstream answered definitively; reset the failure count.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        if matches!(*inner, Inner::HalfOpen { .. }) {
            info!("Circuit breaker closed after successful trial");
        }
        *inner = Inner::Closed { failures: 0 };
    }

    /// A call failed after exhausting its retries.
    pub fn record_failure(&self) {
        let now = Instant::now();
        let threshold = self.config.failure_threshold.max(1);
        let mut inner = self.inner.lock();
        match *inner {
            Inner::Closed { failures } => {
                let failures = failures + 1;
                if failures >= threshold {
                    warn!(
                        failures,
                        cooldown_secs = self.config.cooldown.as_secs(),
                        "Circuit breaker opened"
                    );
                    *inner = Inner::Open {
                        until: now + self.config.cooldown,
                    };
                } else {
                    *inner = Inner::Closed { failures };
                }
            }
            Inner::HalfOpen { .. } => {
                warn!("Circuit breaker trial failed, re-opening");
                *inner = Inner::Open {
                    until: now + self.config.cooldown,
                };
            }
            // Calls admitted before the breaker opened may still report in.
            Inner::Open { .. } => {}
        }
    }

    pub fn state(&self) -> BreakerState {
        match *self.inner.lock() {
            Inner::Closed { .. } => BreakerState::Closed,
            Inner::Open { until } if Instant::now() >= until => BreakerState::HalfOpen,
            Inner::Open { .. } => BreakerState::Open,
            Inner::HalfOpen { .. } => BreakerState::HalfOpen,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        match *self.inner.lock() {
            Inner::Closed { failures } => failures,
            _ => self.config.failure_threshold,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
