//! ARBSCAN: Quote orchestration and cycle-arbitrage detection engine
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod quotes;
pub mod engine;
pub mod storage;
pub mod dashboard;
