//! HASHBENCH — a GPU mining benchmark coordinator.
//!
//! Launches each configured miner in turn, samples its reported
//! hashrate over a stabilized window, compares the median against a
//! community baseline, estimates daily profit, and persists one result
//! entry per coin.

pub mod baseline;
pub mod config;
pub mod engine;
pub mod miner;
pub mod profit;
pub mod storage;
pub mod types;
