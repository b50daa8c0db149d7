//! Jupiter aggregator quote source.
//!
//! API docs: https://station.jup.ag/docs/apis/swap-api
//! Base URL: https://quote-api.jup.ag/v6
//! Endpoint: GET /quote?inputMint&outputMint&amount&slippageBps
//! Auth: none for the public endpoint; paid tiers send `x-api-key`.
//!
//! Status mapping: 200 → quote, 429 → rate limited, 408 → timeout,
//! 401/403 → unauthorized, 5xx → server error, any other 4xx → no route.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{QuoteRequest, QuoteSource, SourceError};
use crate::types::Quote;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

pub const DEFAULT_BASE_URL: &str = "https://quote-api.jup.ag/v6";
const SOURCE_NAME: &str = "jupiter";

/// Longest error body kept in a `SourceError`.
const MAX_ERROR_BODY: usize = 256;

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

/// `/quote` response. Amounts arrive as decimal strings.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JupiterQuoteResponse {
    #[serde(default)]
    in_amount: Option<String>,
    out_amount: String,
    /// Fractional price impact ("0.0012" = 0.12%).
    #[serde(default)]
    price_impact_pct: Option<String>,
    #[serde(default)]
    route_plan: serde_json::Value,
    #[serde(default)]
    context_slot: Option<u64>,
}

/// Error body, e.g. `{"error":"...","errorCode":"COULD_NOT_FIND_ANY_ROUTE"}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JupiterErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct JupiterSource {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl JupiterSource {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("ARBSCAN/0.1.0 (quote-scanner)")
            .build()
            .context("Failed to build HTTP client for Jupiter")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn quote_url(&self, request: &QuoteRequest) -> String {
        format!(
            "{}/quote?inputMint={}&outputMint={}&amount={}&slippageBps={}",
            self.base_url,
            urlencoding::encode(&request.input),
            urlencoding::encode(&request.output),
            request.amount,
            request.slippage_bps,
        )
    }
}

#[async_trait]
impl QuoteSource for JupiterSource {
    async fn quote(&self, request: &QuoteRequest) -> Result<Quote, SourceError> {
        let url = self.quote_url(request);
        debug!(url = %url, "Requesting Jupiter quote");

        let mut req = self.http.get(&url);
        if let Some(key) = &self.api_key {
            req = req.header("x-api-key", key);
        }

        let resp = req.send().await.map_err(transport_error)?;
        let status = resp.status();
        let retry_after = resp
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = resp.text().await.map_err(transport_error)?;

        if !status.is_success() {
            return Err(classify_status(status, retry_after, &body));
        }

        parse_quote(request, &body)
    }
}

fn transport_error(e: reqwest::Error) -> SourceError {
    if e.is_timeout() {
        SourceError::Timeout
    } else {
        SourceError::Transport(e.to_string())
    }
}

/// Map a non-success HTTP status onto the error taxonomy.
fn classify_status(status: StatusCode, retry_after: Option<Duration>, body: &str) -> SourceError {
    match status.as_u16() {
        429 => SourceError::RateLimited { retry_after },
        408 => SourceError::Timeout,
        s @ (401 | 403) => SourceError::Unauthorized { status: s },
        s if s >= 500 => SourceError::Server {
            status: s,
            body: truncate(body),
        },
        _ => {
            let reason = serde_json::from_str::<JupiterErrorResponse>(body)
                .ok()
                .and_then(|e| e.error_code.or(e.error))
                .unwrap_or_else(|| format!("HTTP {status}: {}", truncate(body)));
            SourceError::NoRoute(reason)
        }
    }
}

/// Parse a successful `/quote` body.
fn parse_quote(request: &QuoteRequest, body: &str) -> Result<Quote, SourceError> {
    if body.trim().is_empty() {
        return Err(SourceError::Malformed("empty body".into()));
    }

    let resp: JupiterQuoteResponse =
        serde_json::from_str(body).map_err(|e| SourceError::Malformed(e.to_string()))?;

    let out_amount = resp
        .out_amount
        .parse::<u64>()
        .map_err(|e| SourceError::Malformed(format!("outAmount {:?}: {e}", resp.out_amount)))?;

    let in_amount = match resp.in_amount.as_deref() {
        Some(s) => s
            .parse::<u64>()
            .map_err(|e| SourceError::Malformed(format!("inAmount {s:?}: {e}")))?,
        None => request.amount,
    };

    let price_impact_pct = resp
        .price_impact_pct
        .as_deref()
        .and_then(|s| s.parse::<f64>().ok())
        .map(|fraction| fraction * 100.0);

    debug!(
        out_amount,
        dexes = ?route_labels(&resp.route_plan),
        slot = ?resp.context_slot,
        "Parsed Jupiter quote"
    );

    Ok(Quote {
        source: SOURCE_NAME.to_string(),
        input: request.input.clone(),
        output: request.output.clone(),
        in_amount,
        out_amount,
        price_impact_pct,
        liquidity: None,
        route: resp.route_plan,
        fetched_at: Utc::now(),
    })
}

/// DEX labels along the route plan, e.g. `["Orca", "Raydium"]`.
fn route_labels(route_plan: &serde_json::Value) -> Vec<String> {
    route_plan
        .as_array()
        .map(|steps| {
            steps
                .iter()
                .filter_map(|s| s.pointer("/swapInfo/label").and_then(|l| l.as_str()))
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

fn truncate(body: &str) -> String {
    body.chars().take(MAX_ERROR_BODY).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
