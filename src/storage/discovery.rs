//! Token list discovery from public pool listings.
//!
//! Used at startup when no token list exists yet. Raydium's concentrated
//! liquidity pool listing is asked first (USDC-quoted pools above a
//! liquidity floor); DexScreener search pages are the fallback. Every
//! address must decode as a 32-byte base58 Solana public key.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::types::{Asset, AssetUniverse, USDC_MINT};

pub const RAYDIUM_POOLS_URL: &str = "https://api.raydium.io/v2/ammV3/ammPools";
pub const DEXSCREENER_SEARCH_URL: &str = "https://api.dexscreener.com/latest/dex/search";

/// DexScreener is only a stopgap, so it never yields more than this.
const DEXSCREENER_CAP: usize = 100;
const DEXSCREENER_MAX_PAGES: u32 = 20;

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Number of assets wanted.
    pub limit: usize,
    /// Raydium pools below this USD liquidity are skipped.
    pub min_liquidity_usd: f64,
    pub request_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            limit: 300,
            min_liquidity_usd: 2_000.0,
            request_timeout: Duration::from_secs(15),
        }
    }
}

/// A listing service that can name tradable assets.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AssetProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Up to `limit` distinct assets, best first.
    async fn discover(&self, limit: usize) -> Result<Vec<Asset>>;
}

/// Whether `address` is a base58-encoded 32-byte public key.
pub fn is_valid_mint(address: &str) -> bool {
    bs58::decode(address)
        .into_vec()
        .map(|bytes| bytes.len() == 32)
        .unwrap_or(false)
}

/// Accumulates assets, unique by symbol and by mint.
struct Collected {
    assets: Vec<Asset>,
    symbols: HashSet<String>,
    mints: HashSet<String>,
    limit: usize,
}

impl Collected {
    fn new(limit: usize) -> Self {
        Self {
            assets: Vec::new(),
            symbols: HashSet::new(),
            mints: HashSet::new(),
            limit,
        }
    }

    fn is_full(&self) -> bool {
        self.assets.len() >= self.limit
    }

    fn offer(&mut self, address: &str, symbol: &str) {
        let (address, symbol) = (address.trim(), symbol.trim());
        if self.is_full() || symbol.is_empty() || address == USDC_MINT {
            return;
        }
        if !is_valid_mint(address) {
            debug!(address, symbol, "Skipping invalid mint");
            return;
        }
        if self.symbols.contains(symbol) || self.mints.contains(address) {
            return;
        }
        self.symbols.insert(symbol.to_string());
        self.mints.insert(address.to_string());
        self.assets.push(Asset::new(address, symbol));
    }
}

fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent("ARBSCAN/0.1.0 (token-discovery)")
        .build()
        .context("Failed to build HTTP client for token discovery")
}

// ---------------------------------------------------------------------------
// Raydium
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RaydiumPools {
    #[serde(default)]
    data: Vec<RaydiumPool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RaydiumPool {
    #[serde(default)]
    base_mint: String,
    #[serde(default)]
    quote_mint: String,
    /// Number or decimal string depending on the endpoint version.
    #[serde(default)]
    liquidity: serde_json::Value,
    #[serde(default)]
    symbol: Option<String>,
}

impl RaydiumPool {
    fn liquidity_usd(&self) -> f64 {
        match &self.liquidity {
            serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
            serde_json::Value::String(s) => s.trim().parse().unwrap_or(0.0),
            _ => 0.0,
        }
    }
}

/// USDC-quoted pools with enough liquidity, in listing order.
fn parse_raydium_pools(body: &str, min_liquidity_usd: f64, limit: usize) -> Result<Vec<Asset>> {
    let pools: RaydiumPools =
        serde_json::from_str(body).context("Failed to parse Raydium pool listing")?;

    let mut collected = Collected::new(limit);
    for pool in &pools.data {
        if collected.is_full() {
            break;
        }
        if pool.quote_mint != USDC_MINT || pool.liquidity_usd() < min_liquidity_usd {
            continue;
        }
        collected.offer(&pool.base_mint, pool.symbol.as_deref().unwrap_or("UNKNOWN"));
    }
    Ok(collected.assets)
}

pub struct RaydiumProvider {
    http: Client,
    url: String,
    min_liquidity_usd: f64,
}

impl RaydiumProvider {
    pub fn new(config: &DiscoveryConfig) -> Result<Self> {
        Ok(Self {
            http: http_client(config.request_timeout)?,
            url: RAYDIUM_POOLS_URL.to_string(),
            min_liquidity_usd: config.min_liquidity_usd,
        })
    }
}

#[async_trait]
impl AssetProvider for RaydiumProvider {
    fn name(&self) -> &'static str {
        "raydium"
    }

    async fn discover(&self, limit: usize) -> Result<Vec<Asset>> {
        let resp = self
            .http
            .get(&self.url)
            .send()
            .await
            .context("Raydium pool listing request failed")?;
        let status = resp.status();
        if !status.is_success() {
            bail!("Raydium pool listing returned HTTP {status}");
        }
        let body = resp.text().await.context("Failed to read Raydium response")?;

        let assets = parse_raydium_pools(&body, self.min_liquidity_usd, limit)?;
        info!(
            assets = assets.len(),
            min_liquidity_usd = self.min_liquidity_usd,
            "Loaded Raydium USDC pools"
        );
        Ok(assets)
    }
}

// ---------------------------------------------------------------------------
// DexScreener
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct DexScreenerSearch {
    #[serde(default)]
    pairs: Option<Vec<DexScreenerPair>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DexScreenerPair {
    base_token: DexScreenerToken,
}

#[derive(Debug, Deserialize)]
struct DexScreenerToken {
    #[serde(default)]
    address: String,
    #[serde(default)]
    symbol: String,
}

/// Feed one search page into `collected`. Returns the number of pairs on
/// the page; zero means there are no more pages.
fn parse_dexscreener_page(body: &str, collected: &mut Collected) -> Result<usize> {
    let page: DexScreenerSearch =
        serde_json::from_str(body).context("Failed to parse DexScreener search page")?;
    let pairs = page.pairs.unwrap_or_default();
    for pair in &pairs {
        collected.offer(&pair.base_token.address, &pair.base_token.symbol);
    }
    Ok(pairs.len())
}

pub struct DexScreenerProvider {
    http: Client,
    url: String,
}

impl DexScreenerProvider {
    pub fn new(config: &DiscoveryConfig) -> Result<Self> {
        Ok(Self {
            http: http_client(config.request_timeout)?,
            url: DEXSCREENER_SEARCH_URL.to_string(),
        })
    }

    async fn fetch_page(&self, page: u32) -> Result<String> {
        let url = format!("{}?q=solana&page={page}", self.url);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("DexScreener page {page} request failed"))?;
        let status = resp.status();
        if !status.is_success() {
            bail!("DexScreener page {page} returned HTTP {status}");
        }
        resp.text()
            .await
            .with_context(|| format!("Failed to read DexScreener page {page}"))
    }
}

#[async_trait]
impl AssetProvider for DexScreenerProvider {
    fn name(&self) -> &'static str {
        "dexscreener"
    }

    async fn discover(&self, limit: usize) -> Result<Vec<Asset>> {
        let mut collected = Collected::new(limit.min(DEXSCREENER_CAP));

        for page in 1..=DEXSCREENER_MAX_PAGES {
            if collected.is_full() {
                break;
            }
            let parsed = self
                .fetch_page(page)
                .await
                .and_then(|body| parse_dexscreener_page(&body, &mut collected));
            match parsed {
                Ok(0) => break,
                Ok(pairs) => debug!(
                    page,
                    pairs,
                    collected = collected.assets.len(),
                    "DexScreener page read"
                ),
                Err(e) => {
                    if collected.assets.is_empty() {
                        return Err(e);
                    }
                    warn!(page, error = %e, "DexScreener paging stopped early");
                    break;
                }
            }
        }

        info!(assets = collected.assets.len(), "Fetched Solana mints from DexScreener");
        Ok(collected.assets)
    }
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// Raydium first, DexScreener second.
pub fn default_providers(config: &DiscoveryConfig) -> Result<Vec<Box<dyn AssetProvider>>> {
    Ok(vec![
        Box::new(RaydiumProvider::new(config)?),
        Box::new(DexScreenerProvider::new(config)?),
    ])
}

/// Ask each provider in turn and keep the first non-empty answer.
pub async fn discover_with_fallback(
    providers: &[Box<dyn AssetProvider>],
    limit: usize,
) -> Result<AssetUniverse> {
    for provider in providers {
        match provider.discover(limit).await {
            Ok(assets) if !assets.is_empty() => {
                info!(provider = provider.name(), assets = assets.len(), "Token list discovered");
                return Ok(AssetUniverse::new(assets));
            }
            Ok(_) => warn!(provider = provider.name(), "Provider returned no usable tokens"),
            Err(e) => warn!(provider = provider.name(), error = %e, "Token discovery failed"),
        }
    }
    bail!("No token provider returned any usable tokens")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    const BONK: &str = "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263";
    const WIF: &str = "EKpQGSJtjMFqKZ9KQanSqYXRcF8fBopzLHYxdM65zcjm";
    const JUP: &str = "JUPyiwrYJFskUPiHa7hkeR8VUtAeFoSYbKedZNsDvCN";

    #[test]
    fn test_mint_validation() {
        assert!(is_valid_mint(BONK));
        assert!(is_valid_mint(USDC_MINT));
        assert!(!is_valid_mint("solana"));
        assert!(!is_valid_mint("bonk-mint"));
        assert!(!is_valid_mint(""));
        // Valid base58, wrong length.
        assert!(!is_valid_mint("3yZe7d"));
    }

    #[test]
    fn test_raydium_filters_quote_mint_and_liquidity() {
        let body = format!(
            r#"{{"data": [
                {{"baseMint": "{BONK}", "quoteMint": "{USDC_MINT}", "liquidity": 150000.5, "symbol": "BONK"}},
                {{"baseMint": "{WIF}", "quoteMint": "{USDC_MINT}", "liquidity": "1999.99", "symbol": "WIF"}},
                {{"baseMint": "{JUP}", "quoteMint": "{BONK}", "liquidity": 9000000, "symbol": "JUP"}},
                {{"baseMint": "not-a-mint", "quoteMint": "{USDC_MINT}", "liquidity": 5000, "symbol": "FAKE"}},
                {{"baseMint": "{JUP}", "quoteMint": "{USDC_MINT}", "liquidity": "2500", "symbol": "JUP"}}
            ]}}"#
        );

        let assets = parse_raydium_pools(&body, 2_000.0, 300).unwrap();
        let symbols: Vec<&str> = assets.iter().map(|a| a.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["BONK", "JUP"]);
        assert_eq!(assets[1].id, JUP);
    }

    #[test]
    fn test_raydium_respects_limit_and_dedups() {
        let body = format!(
            r#"{{"data": [
                {{"baseMint": "{BONK}", "quoteMint": "{USDC_MINT}", "liquidity": 5000, "symbol": "BONK"}},
                {{"baseMint": "{BONK}", "quoteMint": "{USDC_MINT}", "liquidity": 7000, "symbol": "BONK"}},
                {{"baseMint": "{WIF}", "quoteMint": "{USDC_MINT}", "liquidity": 5000, "symbol": "WIF"}},
                {{"baseMint": "{JUP}", "quoteMint": "{USDC_MINT}", "liquidity": 5000, "symbol": "JUP"}}
            ]}}"#
        );
        let assets = parse_raydium_pools(&body, 2_000.0, 2).unwrap();
        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].symbol, "BONK");
        assert_eq!(assets[1].symbol, "WIF");
    }

    #[test]
    fn test_raydium_malformed_body_is_error() {
        assert!(parse_raydium_pools("<html>maintenance</html>", 2_000.0, 10).is_err());
    }

    #[test]
    fn test_dexscreener_page_skips_invalid_tokens() {
        let body = format!(
            r#"{{"pairs": [
                {{"baseToken": {{"address": "solana", "symbol": "SOL"}}}},
                {{"baseToken": {{"address": "{WIF}", "symbol": "WIF"}}}},
                {{"baseToken": {{"address": "{USDC_MINT}", "symbol": "USDC"}}}},
                {{"baseToken": {{"address": "{BONK}", "symbol": ""}}}}
            ]}}"#
        );
        let mut collected = Collected::new(100);
        let pairs = parse_dexscreener_page(&body, &mut collected).unwrap();
        assert_eq!(pairs, 4);
        assert_eq!(collected.assets, vec![Asset::new(WIF, "WIF")]);
    }

    #[test]
    fn test_dexscreener_empty_page_ends_paging() {
        let mut collected = Collected::new(100);
        assert_eq!(parse_dexscreener_page(r#"{"pairs": null}"#, &mut collected).unwrap(), 0);
        assert_eq!(parse_dexscreener_page(r#"{"pairs": []}"#, &mut collected).unwrap(), 0);
    }

    fn provider(name: &'static str, answer: Result<Vec<Asset>>) -> Box<dyn AssetProvider> {
        let mut mock = MockAssetProvider::new();
        mock.expect_name().return_const(name);
        let mut answer = Some(answer);
        mock.expect_discover()
            .times(1)
            .returning(move |_| answer.take().unwrap_or_else(|| Ok(Vec::new())));
        Box::new(mock)
    }

    #[tokio::test]
    async fn test_falls_back_when_primary_fails() {
        let providers = vec![
            provider("raydium", Err(anyhow!("HTTP 503"))),
            provider("dexscreener", Ok(vec![Asset::new(WIF, "WIF")])),
        ];
        let universe = discover_with_fallback(&providers, 300).await.unwrap();
        assert_eq!(universe.len(), 1);
        assert_eq!(universe.get("WIF").unwrap().id, WIF);
    }

    #[tokio::test]
    async fn test_falls_back_when_primary_is_empty() {
        let providers = vec![
            provider("raydium", Ok(Vec::new())),
            provider("dexscreener", Ok(vec![Asset::new(BONK, "BONK")])),
        ];
        let universe = discover_with_fallback(&providers, 300).await.unwrap();
        assert!(universe.get("BONK").is_some());
    }

    #[tokio::test]
    async fn test_primary_answer_wins() {
        let mut fallback = MockAssetProvider::new();
        fallback.expect_discover().never();
        let providers: Vec<Box<dyn AssetProvider>> = vec![
            provider("raydium", Ok(vec![Asset::new(BONK, "BONK")])),
            Box::new(fallback),
        ];
        let universe = discover_with_fallback(&providers, 300).await.unwrap();
        assert_eq!(universe.len(), 1);
    }

    #[tokio::test]
    async fn test_all_providers_failing_is_error() {
        let providers = vec![
            provider("raydium", Err(anyhow!("timeout"))),
            provider("dexscreener", Ok(Vec::new())),
        ];
        assert!(discover_with_fallback(&providers, 300).await.is_err());
    }
}
