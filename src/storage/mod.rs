//! Token list persistence.
//!
//! The asset universe lives in a JSON file of the form
//! `{ "SYMBOL": { "address": "<mint>" } }`. It is read at startup; when it
//! is missing, [`discovery`] builds one from public pool listings and it is
//! written back with [`save_token_list`].

pub mod discovery;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::types::{Asset, AssetUniverse};

/// Default token list path.
pub const DEFAULT_TOKEN_FILE: &str = "tokens.json";

#[derive(Debug, Serialize, Deserialize)]
struct TokenEntry {
    address: String,
}

/// Load the asset universe from a token list file.
/// Returns None if the file doesn't exist.
pub fn load_token_list(path: Option<&str>) -> Result<Option<AssetUniverse>> {
    let path = path.unwrap_or(DEFAULT_TOKEN_FILE);

    if !Path::new(path).exists() {
        info!(path, "No token list found");
        return Ok(None);
    }

    let json = std::fs::read_to_string(path)
        .context(format!("Failed to read token list from {path}"))?;

    let entries: BTreeMap<String, TokenEntry> = serde_json::from_str(&json)
        .context(format!("Failed to parse token list from {path}"))?;

    let mut assets = Vec::with_capacity(entries.len());
    for (symbol, entry) in entries {
        let address = entry.address.trim();
        if symbol.trim().is_empty() || address.is_empty() {
            warn!(path, symbol = %symbol, "Skipping token with empty symbol or address");
            continue;
        }
        assets.push(Asset::new(address, symbol));
    }

    if assets.is_empty() {
        bail!("Token list {path} contains no usable tokens");
    }

    let universe = AssetUniverse::new(assets);
    info!(path, tokens = universe.len(), "Token list loaded");
    Ok(Some(universe))
}

/// Save the asset universe in token list format.
pub fn save_token_list(universe: &AssetUniverse, path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_TOKEN_FILE);
    let entries: BTreeMap<&str, TokenEntry> = universe
        .iter()
        .map(|a| {
            (
                a.symbol.as_str(),
                TokenEntry {
                    address: a.id.clone(),
                },
            )
        })
        .collect();

    let json = serde_json::to_string_pretty(&entries)
        .context("Failed to serialise token list")?;

    std::fs::write(path, &json)
        .context(format!("Failed to write token list to {path}"))?;

    debug!(path, tokens = entries.len(), "Token list saved");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
