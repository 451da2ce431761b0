//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (the hashrate.no API key) are referenced by env-var name in the
//! config and resolved at runtime via `std::env::var`. Unknown fields are
//! ignored; missing required fields fail at load time.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::time::Duration;

use crate::types::MinerKind;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub run: RunConfig,
    pub benchmark: BenchmarkConfig,
    pub probe: ProbeConfig,
    pub baseline: BaselineConfig,
    /// Installed miner binaries, keyed by kind.
    pub miners: HashMap<MinerKind, MinerBinaryConfig>,
    /// Ordered coin list — benchmark order is config order.
    pub coins: Vec<CoinConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RunConfig {
    pub name: String,
    /// Path of the final JSON result document.
    pub results_path: String,
    /// Worker name appended to the wallet for pool-side identification.
    pub worker: String,
    /// Electricity price in USD per kWh.
    pub power_cost_usd_kwh: f64,
    /// Assumed rig power draw in watts. Hardware telemetry is a
    /// collaborator boundary, so this is a run-level constant.
    pub power_draw_watts: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BenchmarkConfig {
    /// Settle time after launch before the first sample.
    pub warmup_secs: u64,
    pub sample_interval_secs: u64,
    pub samples_per_coin: u32,
    /// Breather between coins so pool connections tear down cleanly.
    #[serde(default = "default_pause_secs")]
    pub pause_between_coins_secs: u64,
    /// Grace period before a stubborn miner is force-killed.
    #[serde(default = "default_stop_grace_secs")]
    pub stop_grace_secs: u64,
}

fn default_pause_secs() -> u64 {
    3
}

fn default_stop_grace_secs() -> u64 {
    5
}

/// Explicit retry policy for the hashrate probe, so tests can inject
/// deterministic timing.
#[derive(Debug, Deserialize, Clone)]
pub struct ProbeConfig {
    pub timeout_secs: u64,
    pub max_attempts: u32,
    #[serde(default)]
    pub backoff: BackoffStrategy,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

fn default_backoff_base_ms() -> u64 {
    500
}

impl ProbeConfig {
    /// Delay before the given retry attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = Duration::from_millis(self.backoff_base_ms);
        match self.backoff {
            BackoffStrategy::Fixed => base,
            BackoffStrategy::Exponential => base * 2u32.saturating_pow(attempt.saturating_sub(1)),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    #[default]
    Fixed,
    Exponential,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BaselineConfig {
    pub enabled: bool,
    /// GPU model the baseline lookup is matched against, e.g. "RTX 3080".
    pub gpu: String,
    /// Env-var name holding the hashrate.no API key (optional endpoint tier).
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_cache_path")]
    pub cache_path: String,
    #[serde(default = "default_cache_max_age_secs")]
    pub cache_max_age_secs: u64,
}

fn default_cache_path() -> String {
    "baseline_cache.json".to_string()
}

fn default_cache_max_age_secs() -> u64 {
    86_400
}

#[derive(Debug, Deserialize, Clone)]
pub struct MinerBinaryConfig {
    /// Path to the miner executable.
    pub binary: String,
    /// Local port the miner's status API is bound to.
    pub api_port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CoinConfig {
    pub symbol: String,
    pub algorithm: String,
    pub miner: MinerKind,
    pub pool: String,
    pub port: u16,
    pub wallet: String,
}

impl CoinConfig {
    /// Convert into the immutable run-loop target.
    pub fn to_target(&self) -> crate::types::CoinTarget {
        crate::types::CoinTarget {
            symbol: self.symbol.clone(),
            algorithm: self.algorithm.clone(),
            miner: self.miner,
            pool: self.pool.clone(),
            port: self.port,
            wallet: self.wallet.clone(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Fail fast on configurations the run loop cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.coins.is_empty() {
            bail!("config: coin list is empty");
        }
        if self.benchmark.samples_per_coin == 0 {
            bail!("config: samples_per_coin must be at least 1");
        }
        if self.benchmark.sample_interval_secs == 0 {
            bail!("config: sample_interval_secs must be at least 1");
        }
        if self.probe.max_attempts == 0 {
            bail!("config: probe.max_attempts must be at least 1");
        }
        for coin in &self.coins {
            if coin.wallet.trim().is_empty() {
                bail!("config: coin {} has no wallet configured", coin.symbol);
            }
            if !self.miners.contains_key(&coin.miner) {
                bail!(
                    "config: coin {} references unconfigured miner {}",
                    coin.symbol,
                    coin.miner
                );
            }
        }
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
