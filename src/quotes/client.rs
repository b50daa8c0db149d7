//! Retrying quote client.
//!
//! `QuoteClient` is the only path the engine uses to reach an upstream.
//! Every call is validated, checked against the negative cache and the
//! circuit breaker, then retried with exponential backoff on transient
//! failures. Definitive "no route" answers are cached and never retried.
//! Every call the breaker admits reports back to it exactly once, including
//! calls whose future is dropped mid-flight.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::breaker::{BreakerConfig, CircuitBreaker};
use super::{QuoteFailure, QuoteRequest, QuoteSource, SourceError};
use crate::engine::negative_cache::NegativeCache;
use crate::types::{Asset, PairKey, Quote};

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total upstream attempts per call, including the first.
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based): `base × 2^(retry-1)`,
    /// capped at `max_backoff`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(16);
        self.base_backoff
            .saturating_mul(1u32 << exp)
            .min(self.max_backoff)
    }

    /// Worst-case wall time of one `get_quote` call when every attempt
    /// runs into `per_attempt`: all attempts plus every backoff between
    /// them. Retry-After hints can stretch this further.
    pub fn budget(&self, per_attempt: Duration) -> Duration {
        let attempts = self.max_attempts.max(1);
        (1..attempts).fold(per_attempt.saturating_mul(attempts), |total, retry| {
            total.saturating_add(self.backoff(retry))
        })
    }
}

/// Settles one breaker-admitted call exactly once.
///
/// A call whose future is dropped before it reaches an outcome (evaluation
/// timeout, cancelled pass) is recorded as a failure on drop.
struct CallGuard<'a> {
    breaker: &'a CircuitBreaker,
    settled: bool,
}

impl<'a> CallGuard<'a> {
    fn new(breaker: &'a CircuitBreaker) -> Self {
        Self {
            breaker,
            settled: false,
        }
    }

    fn success(mut self) {
        self.settled = true;
        self.breaker.record_success();
    }

    fn failure(mut self) {
        self.settled = true;
        self.breaker.record_failure();
    }
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            debug!("Quote call abandoned before completion, counting as failure");
            self.breaker.record_failure();
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct QuoteClient {
    source: Arc<dyn QuoteSource>,
    cache: Arc<NegativeCache>,
    breaker: CircuitBreaker,
    retry: RetryPolicy,
    slippage_bps: u16,
}

impl QuoteClient {
    pub fn new(
        source: Arc<dyn QuoteSource>,
        cache: Arc<NegativeCache>,
        breaker: BreakerConfig,
        retry: RetryPolicy,
        slippage_bps: u16,
    ) -> Self {
        Self {
            source,
            cache,
            breaker: CircuitBreaker::new(breaker),
            retry,
            slippage_bps,
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn negative_cache(&self) -> &Arc<NegativeCache> {
        &self.cache
    }

    /// Quote `amount` base units of `input` into `output`.
    pub async fn get_quote(
        &self,
        input: &Asset,
        output: &Asset,
        amount: u64,
    ) -> Result<Quote, QuoteFailure> {
        if input.id == output.id {
            return Err(QuoteFailure::SelfPair);
        }
        if amount == 0 {
            return Err(QuoteFailure::InvalidAmount);
        }

        let pair = PairKey::new(input.id.clone(), output.id.clone());
        if self.cache.is_suppressed(&pair) {
            debug!(pair = %pair, "Skipping negatively cached pair");
            return Err(QuoteFailure::SuppressedPair(pair));
        }
        if !self.breaker.try_acquire() {
            return Err(QuoteFailure::BreakerOpen);
        }
        let guard = CallGuard::new(&self.breaker);

        let request = QuoteRequest {
            input: pair.input.clone(),
            output: pair.output.clone(),
            amount,
            slippage_bps: self.slippage_bps,
        };

        let max_attempts = self.retry.max_attempts.max(1);
        let mut last_error = SourceError::Timeout;

        for attempt in 1..=max_attempts {
            match self.source.quote(&request).await {
                Ok(quote) if quote.is_empty() => {
                    guard.success();
                    debug!(pair = %pair, amount, "Upstream returned an empty quote");
                    return Err(QuoteFailure::EmptyQuote(pair));
                }
                Ok(quote) => {
                    guard.success();
                    debug!(
                        pair = %pair,
                        in_amount = quote.in_amount,
                        out_amount = quote.out_amount,
                        attempt,
                        "Quote received"
                    );
                    return Ok(quote);
                }
                Err(SourceError::NoRoute(reason)) => {
                    guard.success();
                    self.cache.mark_failed(pair.clone());
                    debug!(pair = %pair, reason = %reason, "No route, pair suppressed");
                    return Err(QuoteFailure::NoRoute { pair, reason });
                }
                Err(SourceError::Unauthorized { status }) => {
                    guard.failure();
                    warn!(pair = %pair, status, "Upstream rejected credentials");
                    return Err(QuoteFailure::Unauthorized { status });
                }
                Err(err) => {
                    if attempt < max_attempts {
                        let mut delay = self.retry.backoff(attempt);
                        if let SourceError::RateLimited {
                            retry_after: Some(after),
                        } = &err
                        {
                            delay = delay.max(*after);
                        }
                        debug!(
                            pair = %pair,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "Retrying quote request"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    last_error = err;
                }
            }
        }

        guard.failure();
        warn!(
            pair = %pair,
            attempts = max_attempts,
            error = %last_error,
            "Quote request failed after retries"
        );
        Err(QuoteFailure::Exhausted {
            attempts: max_attempts,
            last: last_error,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quotes::breaker::BreakerState;
    use crate::quotes::{FailureKind, MockQuoteSource};
    use chrono::Utc;
    use tokio::time::Instant;

    fn usdc() -> Asset {
        Asset::new("usdc-mint", "USDC")
    }

    fn bonk() -> Asset {
        Asset::new("bonk-mint", "BONK")
    }

    fn quote_for(req: &QuoteRequest, out_amount: u64) -> Quote {
        Quote {
            source: "mock".into(),
            input: req.input.clone(),
            output: req.output.clone(),
            in_amount: req.amount,
            out_amount,
            price_impact_pct: None,
            liquidity: None,
            route: serde_json::Value::Null,
            fetched_at: Utc::now(),
        }
    }

    fn client_with(source: MockQuoteSource, threshold: u32) -> QuoteClient {
        QuoteClient::new(
            Arc::new(source),
            Arc::new(NegativeCache::default()),
            BreakerConfig {
                failure_threshold: threshold,
                cooldown: Duration::from_secs(60),
            },
            RetryPolicy {
                max_attempts: 3,
                base_backoff: Duration::from_secs(2),
                max_backoff: Duration::from_secs(30),
            },
            50,
        )
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let p = RetryPolicy::default();
        assert_eq!(p.backoff(1), Duration::from_secs(2));
        assert_eq!(p.backoff(2), Duration::from_secs(4));
        assert_eq!(p.backoff(3), Duration::from_secs(8));
        assert_eq!(p.backoff(5), Duration::from_secs(30));
        assert_eq!(p.backoff(40), Duration::from_secs(30));
    }

    #[test]
    fn test_budget_covers_attempts_and_backoff() {
        let p = RetryPolicy::default();
        // 5 × 10s of attempts plus 2 + 4 + 8 + 16s of backoff.
        assert_eq!(p.budget(Duration::from_secs(10)), Duration::from_secs(80));

        let single = RetryPolicy {
            max_attempts: 1,
            ..RetryPolicy::default()
        };
        assert_eq!(single.budget(Duration::from_secs(10)), Duration::from_secs(10));
    }

    /// Upstream that accepts the request and never answers.
    struct HangingSource;

    #[async_trait::async_trait]
    impl QuoteSource for HangingSource {
        async fn quote(&self, _request: &QuoteRequest) -> Result<Quote, SourceError> {
            std::future::pending().await
        }
    }

    fn hanging_client(threshold: u32) -> QuoteClient {
        QuoteClient::new(
            Arc::new(HangingSource),
            Arc::new(NegativeCache::default()),
            BreakerConfig {
                failure_threshold: threshold,
                cooldown: Duration::from_secs(60),
            },
            RetryPolicy::default(),
            50,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_call_counts_as_failure() {
        let client = hanging_client(2);

        let abandoned =
            tokio::time::timeout(Duration::from_secs(1), client.get_quote(&usdc(), &bonk(), 100))
                .await;
        assert!(abandoned.is_err());
        assert_eq!(client.breaker().consecutive_failures(), 1);

        let _ = tokio::time::timeout(Duration::from_secs(1), client.get_quote(&usdc(), &bonk(), 100))
            .await;
        assert_eq!(client.breaker().state(), BreakerState::Open);
        assert!(client.negative_cache().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_half_open_call_reopens_breaker() {
        let client = hanging_client(1);
        let _ = tokio::time::timeout(Duration::from_secs(1), client.get_quote(&usdc(), &bonk(), 100))
            .await;
        assert_eq!(client.breaker().state(), BreakerState::Open);

        tokio::time::advance(Duration::from_secs(61)).await;
        let _ = tokio::time::timeout(Duration::from_secs(1), client.get_quote(&usdc(), &bonk(), 100))
            .await;
        assert_eq!(client.breaker().state(), BreakerState::Open);
        assert_eq!(
            client.get_quote(&usdc(), &bonk(), 100).await.unwrap_err(),
            QuoteFailure::BreakerOpen
        );
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_cached_and_trips_breaker() {
        let mut source = MockQuoteSource::new();
        source
            .expect_quote()
            .times(2)
            .returning(|_| Err(SourceError::Unauthorized { status: 401 }));
        let client = client_with(source, 2);

        let err = client.get_quote(&usdc(), &bonk(), 100).await.unwrap_err();
        assert_eq!(err, QuoteFailure::Unauthorized { status: 401 });
        assert_eq!(client.breaker().consecutive_failures(), 1);
        assert!(client.negative_cache().is_empty());

        // Same pair is asked again, not suppressed.
        let err = client.get_quote(&usdc(), &bonk(), 100).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Unauthorized);
        assert_eq!(client.breaker().state(), BreakerState::Open);
        assert!(client.negative_cache().is_empty());
    }

    #[tokio::test]
    async fn test_self_pair_never_calls_upstream() {
        let mut source = MockQuoteSource::new();
        source.expect_quote().never();
        let client = client_with(source, 5);

        let err = client.get_quote(&usdc(), &usdc(), 100).await.unwrap_err();
        assert_eq!(err, QuoteFailure::SelfPair);
    }

    #[tokio::test]
    async fn test_zero_amount_never_calls_upstream() {
        let mut source = MockQuoteSource::new();
        source.expect_quote().never();
        let client = client_with(source, 5);

        let err = client.get_quote(&usdc(), &bonk(), 0).await.unwrap_err();
        assert_eq!(err, QuoteFailure::InvalidAmount);
    }

    #[tokio::test]
    async fn test_success_passes_quote_through() {
        let mut source = MockQuoteSource::new();
        source
            .expect_quote()
            .withf(|req| req.input == "usdc-mint" && req.amount == 100 && req.slippage_bps == 50)
            .times(1)
            .returning(|req| Ok(quote_for(req, 105)));
        let client = client_with(source, 5);

        let q = client.get_quote(&usdc(), &bonk(), 100).await.unwrap();
        assert_eq!(q.out_amount, 105);
        assert_eq!(q.output, "bonk-mint");
    }

    #[tokio::test]
    async fn test_no_route_is_cached_and_not_retried() {
        let mut source = MockQuoteSource::new();
        source
            .expect_quote()
            .times(1)
            .returning(|_| Err(SourceError::NoRoute("COULD_NOT_FIND_ANY_ROUTE".into())));
        let client = client_with(source, 5);

        let err = client.get_quote(&usdc(), &bonk(), 100).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::NoRoute);

        // Second call is answered from the negative cache.
        let err = client.get_quote(&usdc(), &bonk(), 100).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::SuppressedPair);

        // The reverse direction is unaffected.
        assert!(!client
            .negative_cache()
            .is_suppressed(&PairKey::new("bonk-mint", "usdc-mint")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_retry_with_backoff() {
        let mut source = MockQuoteSource::new();
        let mut calls = 0;
        source.expect_quote().times(3).returning(move |req| {
            calls += 1;
            match calls {
                1 => Err(SourceError::Timeout),
                2 => Err(SourceError::Server { status: 502, body: "bad gateway".into() }),
                _ => Ok(quote_for(req, 99)),
            }
        });
        let client = client_with(source, 5);

        let started = Instant::now();
        let q = client.get_quote(&usdc(), &bonk(), 100).await.unwrap();
        assert_eq!(q.out_amount, 99);
        // 2s + 4s of backoff before the third attempt.
        assert!(started.elapsed() >= Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_honours_retry_after() {
        let mut source = MockQuoteSource::new();
        let mut calls = 0;
        source.expect_quote().times(2).returning(move |req| {
            calls += 1;
            if calls == 1 {
                Err(SourceError::RateLimited {
                    retry_after: Some(Duration::from_secs(10)),
                })
            } else {
                Ok(quote_for(req, 100))
            }
        });
        let client = client_with(source, 5);

        let started = Instant::now();
        client.get_quote(&usdc(), &bonk(), 100).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_exhausts_without_poisoning_cache() {
        let mut source = MockQuoteSource::new();
        source
            .expect_quote()
            .times(3)
            .returning(|_| Err(SourceError::Malformed("missing outAmount".into())));
        let client = client_with(source, 5);

        let err = client.get_quote(&usdc(), &bonk(), 100).await.unwrap_err();
        match err {
            QuoteFailure::Exhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(matches!(last, SourceError::Malformed(_)));
            }
            other => panic!("unexpected failure: {other:?}"),
        }
        assert!(client.negative_cache().is_empty());
    }

    #[tokio::test]
    async fn test_zero_output_is_empty_quote() {
        let mut source = MockQuoteSource::new();
        source
            .expect_quote()
            .times(1)
            .returning(|req| Ok(quote_for(req, 0)));
        let client = client_with(source, 5);

        let err = client.get_quote(&usdc(), &bonk(), 100).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::EmptyQuote);
        assert!(client.negative_cache().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_breaker_opens_then_recovers_after_cooldown() {
        let mut source = MockQuoteSource::new();
        // Two exhausted calls (3 attempts each) trip a threshold of 2;
        // then one trial call after the cool-down succeeds.
        let mut calls = 0;
        source.expect_quote().times(7).returning(move |req| {
            calls += 1;
            if calls <= 6 {
                Err(SourceError::Timeout)
            } else {
                Ok(quote_for(req, 100))
            }
        });
        let client = client_with(source, 2);

        for _ in 0..2 {
            let err = client.get_quote(&usdc(), &bonk(), 100).await.unwrap_err();
            assert_eq!(err.kind(), FailureKind::Exhausted);
        }
        assert_eq!(client.breaker().state(), BreakerState::Open);

        let err = client.get_quote(&usdc(), &bonk(), 100).await.unwrap_err();
        assert_eq!(err, QuoteFailure::BreakerOpen);

        tokio::time::advance(Duration::from_secs(61)).await;
        let q = client.get_quote(&usdc(), &bonk(), 100).await.unwrap();
        assert_eq!(q.out_amount, 100);
        assert_eq!(client.breaker().state(), BreakerState::Closed);
    }
}
