//! Cycle enumeration.
//!
//! Turns the asset universe into the list of cycles one scan pass tests:
//! hub round trips `[hub, X, hub]`, optional pairwise round trips
//! `[A, B, A]` among priority assets, and optional triangles
//! `[hub, A, B, hub]`. Every cycle is built through `Cycle::new`.

use std::collections::HashSet;
use tracing::{debug, warn};

use crate::types::{Asset, AssetUniverse, Cycle, USDC_SYMBOL};

/// Which cycles a scan pass should generate.
#[derive(Debug, Clone)]
pub struct CycleShapes {
    /// Symbol every round trip and triangle starts and ends at.
    pub hub_symbol: String,
    /// Symbols to scan, in priority order. Empty means the whole universe.
    pub priority: Vec<String>,
    /// Cap on non-hub assets taken from the priority list.
    pub max_assets: usize,
    pub round_trips: bool,
    pub pairwise: bool,
    pub triangles: bool,
    /// Cap on cycles per pass.
    pub max_cycles: usize,
}

impl Default for CycleShapes {
    fn default() -> Self {
        Self {
            hub_symbol: USDC_SYMBOL.to_string(),
            priority: Vec::new(),
            max_assets: 30,
            round_trips: true,
            pairwise: false,
            triangles: false,
            max_cycles: 1_000,
        }
    }
}

impl CycleShapes {
    /// Longest cycle these shapes can produce, in legs.
    pub fn max_legs(&self) -> u32 {
        if self.triangles {
            3
        } else {
            2
        }
    }
}

/// Non-hub assets to scan, in priority order, deduplicated by id.
pub fn priority_assets(universe: &AssetUniverse, shapes: &CycleShapes) -> Vec<Asset> {
    let hub_id = universe.get(&shapes.hub_symbol).map(|a| a.id.clone());

    let candidates: Vec<&Asset> = if shapes.priority.is_empty() {
        universe.iter().collect()
    } else {
        shapes
            .priority
            .iter()
            .filter_map(|sym| {
                let found = universe.get(sym);
                if found.is_none() {
                    warn!(symbol = %sym, "Priority symbol not in token list");
                }
                found
            })
            .collect()
    };

    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|a| Some(&a.id) != hub_id.as_ref())
        .filter(|a| seen.insert(a.id.clone()))
        .take(shapes.max_assets)
        .cloned()
        .collect()
}

/// Build the cycles for one pass.
pub fn enumerate(universe: &AssetUniverse, shapes: &CycleShapes) -> Vec<Cycle> {
    let assets = priority_assets(universe, shapes);
    let hub = universe.get(&shapes.hub_symbol);
    if hub.is_none() && (shapes.round_trips || shapes.triangles) {
        warn!(hub = %shapes.hub_symbol, "Hub asset missing, skipping hub cycles");
    }

    let mut paths: Vec<Vec<Asset>> = Vec::new();

    if let Some(hub) = hub {
        if shapes.round_trips {
            for x in &assets {
                paths.push(vec![hub.clone(), x.clone(), hub.clone()]);
            }
        }
        if shapes.triangles {
            for a in &assets {
                for b in &assets {
                    if a.id != b.id {
                        paths.push(vec![hub.clone(), a.clone(), b.clone(), hub.clone()]);
                    }
                }
            }
        }
    }

    if shapes.pairwise {
        for a in &assets {
            for b in &assets {
                if a.id != b.id {
                    paths.push(vec![a.clone(), b.clone(), a.clone()]);
                }
            }
        }
    }

    let mut seen = HashSet::new();
    let mut cycles = Vec::new();
    for path in paths {
        if cycles.len() >= shapes.max_cycles {
            break;
        }
        match Cycle::new(path) {
            Ok(cycle) => {
                if seen.insert(cycle.clone()) {
                    cycles.push(cycle);
                }
            }
            Err(e) => debug!(error = %e, "Skipping invalid cycle"),
        }
    }

    debug!(
        assets = assets.len(),
        cycles = cycles.len(),
        "Cycles enumerated"
    );
    cycles
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
