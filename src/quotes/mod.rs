//! Quote sources and the retrying quote client.
//!
//! Defines the `QuoteSource` trait (one upstream pricing service) and the
//! error types that flow out of it. `QuoteClient` wraps any source with
//! pair validation, negative caching, retry/backoff and a circuit breaker,
//! so new price sources never duplicate that logic.

pub mod breaker;
pub mod client;
pub mod jupiter;

use async_trait::async_trait;
use std::time::Duration;

use crate::types::{PairKey, Quote};

/// A single `(input, output, amount)` quote request sent upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    pub input: String,
    pub output: String,
    /// Input amount in base units.
    pub amount: u64,
    /// Maximum acceptable slippage in basis points.
    pub slippage_bps: u16,
}

impl QuoteRequest {
    pub fn pair(&self) -> PairKey {
        PairKey::new(self.input.clone(), self.output.clone())
    }
}

/// Abstraction over upstream quote services.
///
/// Implementors issue exactly one upstream request per call and classify
/// the outcome; retries, caching and breaking live in `QuoteClient`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn quote(&self, request: &QuoteRequest) -> Result<Quote, SourceError>;
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Outcome of a single failed upstream request.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SourceError {
    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("upstream server error {status}: {body}")]
    Server { status: u16, body: String },

    #[error("rate limited by upstream")]
    RateLimited { retry_after: Option<Duration> },

    #[error("credentials rejected by upstream (HTTP {status})")]
    Unauthorized { status: u16 },

    #[error("no route: {0}")]
    NoRoute(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl SourceError {
    /// Whether another attempt at the same request could succeed.
    /// A "no route" answer and rejected credentials are final.
    pub fn is_transient(&self) -> bool {
        !matches!(self, SourceError::NoRoute(_) | SourceError::Unauthorized { .. })
    }
}

/// Why `QuoteClient::get_quote` produced no quote.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QuoteFailure {
    #[error("input and output asset are the same")]
    SelfPair,

    #[error("amount must be greater than zero")]
    InvalidAmount,

    #[error("pair {0} is in the negative cache")]
    SuppressedPair(PairKey),

    #[error("circuit breaker is open")]
    BreakerOpen,

    #[error("no route for {pair}: {reason}")]
    NoRoute { pair: PairKey, reason: String },

    #[error("upstream returned a zero output amount for {0}")]
    EmptyQuote(PairKey),

    #[error("upstream rejected credentials (HTTP {status})")]
    Unauthorized { status: u16 },

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: SourceError },
}

/// Field-less discriminant of [`QuoteFailure`] for counters and matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    SelfPair,
    InvalidAmount,
    SuppressedPair,
    BreakerOpen,
    NoRoute,
    EmptyQuote,
    Unauthorized,
    Exhausted,
}

impl FailureKind {
    /// Whether the same request might succeed on a later call.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            FailureKind::BreakerOpen | FailureKind::EmptyQuote | FailureKind::Exhausted
        )
    }
}

impl QuoteFailure {
    pub fn kind(&self) -> FailureKind {
        match self {
            QuoteFailure::SelfPair => FailureKind::SelfPair,
            QuoteFailure::InvalidAmount => FailureKind::InvalidAmount,
            QuoteFailure::SuppressedPair(_) => FailureKind::SuppressedPair,
            QuoteFailure::BreakerOpen => FailureKind::BreakerOpen,
            QuoteFailure::NoRoute { .. } => FailureKind::NoRoute,
            QuoteFailure::EmptyQuote(_) => FailureKind::EmptyQuote,
            QuoteFailure::Unauthorized { .. } => FailureKind::Unauthorized,
            QuoteFailure::Exhausted { .. } => FailureKind::Exhausted,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_no_route_is_definitive() {
        assert!(SourceError::Timeout.is_transient());
        assert!(SourceError::Transport("reset".into()).is_transient());
        assert!(SourceError::Server { status: 503, body: String::new() }.is_transient());
        assert!(SourceError::RateLimited { retry_after: None }.is_transient());
        assert!(SourceError::Malformed("missing outAmount".into()).is_transient());
        assert!(!SourceError::NoRoute("COULD_NOT_FIND_ANY_ROUTE".into()).is_transient());
        assert!(!SourceError::Unauthorized { status: 401 }.is_transient());
    }

    #[test]
    fn test_failure_kind_mapping() {
        let pair = PairKey::new("a", "b");
        assert_eq!(QuoteFailure::SelfPair.kind(), FailureKind::SelfPair);
        assert_eq!(QuoteFailure::SuppressedPair(pair.clone()).kind(), FailureKind::SuppressedPair);
        assert_eq!(
            QuoteFailure::Exhausted { attempts: 5, last: SourceError::Timeout }.kind(),
            FailureKind::Exhausted
        );
        assert!(!FailureKind::NoRoute.is_retryable());
        assert!(!FailureKind::SuppressedPair.is_retryable());
        assert!(FailureKind::Exhausted.is_retryable());
        assert_eq!(
            QuoteFailure::Unauthorized { status: 403 }.kind(),
            FailureKind::Unauthorized
        );
        assert!(!FailureKind::Unauthorized.is_retryable());
    }

    #[test]
    fn test_failure_display() {
        let f = QuoteFailure::NoRoute {
            pair: PairKey::new("x", "y"),
            reason: "TOKEN_NOT_TRADABLE".into(),
        };
        assert_eq!(f.to_string(), "no route for x→y: TOKEN_NOT_TRADABLE");
    }
}
