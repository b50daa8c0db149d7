//! Mock quote source for integration testing.
//!
//! Provides a deterministic `QuoteSource` whose answer per directional pair
//! is scripted from test code. Counts calls (overall and per pair) and the
//! peak number of requests in flight, all in-memory.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use arbscan::quotes::{QuoteRequest, QuoteSource, SourceError};
use arbscan::types::{PairKey, Quote};

/// Scripted behaviour for one directional pair.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// `out = amount * num / den`.
    Rate { num: u64, den: u64 },
    /// Definitive "no route" answer.
    NoRoute,
    /// Transient failure on every attempt.
    Timeout,
    /// Zero output amount.
    Empty,
}

pub struct MockSource {
    default: Behavior,
    pairs: Mutex<HashMap<PairKey, Behavior>>,
    latency: Duration,
    calls: AtomicUsize,
    pair_calls: Mutex<HashMap<PairKey, usize>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockSource {
    /// Every unscripted pair quotes 1:1.
    pub fn new() -> Self {
        Self::with_default(Behavior::Rate { num: 1, den: 1 })
    }

    pub fn with_default(default: Behavior) -> Self {
        Self {
            default,
            pairs: Mutex::new(HashMap::new()),
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
            pair_calls: Mutex::new(HashMap::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Delay every response by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn script(self, input: &str, output: &str, behavior: Behavior) -> Self {
        self.pairs
            .lock()
            .unwrap()
            .insert(PairKey::new(input, output), behavior);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, input: &str, output: &str) -> usize {
        self.pair_calls
            .lock()
            .unwrap()
            .get(&PairKey::new(input, output))
            .copied()
            .unwrap_or(0)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn behavior_for(&self, pair: &PairKey) -> Behavior {
        self.pairs
            .lock()
            .unwrap()
            .get(pair)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }
}

/// Decrements the in-flight counter even if the request future is dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl QuoteSource for MockSource {
    async fn quote(&self, request: &QuoteRequest) -> Result<Quote, SourceError> {
        let pair = request.pair();
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.pair_calls.lock().unwrap().entry(pair.clone()).or_insert(0) += 1;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let out_amount = match self.behavior_for(&pair) {
            Behavior::Rate { num, den } => request.amount * num / den,
            Behavior::Empty => 0,
            Behavior::NoRoute => {
                return Err(SourceError::NoRoute("COULD_NOT_FIND_ANY_ROUTE".into()))
            }
            Behavior::Timeout => return Err(SourceError::Timeout),
        };

        Ok(Quote {
            source: "mock".into(),
            input: request.input.clone(),
            output: request.output.clone(),
            in_amount: request.amount,
            out_amount,
            price_impact_pct: None,
            liquidity: None,
            route: serde_json::Value::Null,
            fetched_at: Utc::now(),
        })
    }
}
