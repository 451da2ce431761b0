//! Shared types for the HASHBENCH coordinator.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that miner, baseline, and engine
//! modules can depend on them without circular references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Coin target
// ---------------------------------------------------------------------------

/// A coin scheduled for benchmarking, loaded from configuration.
/// Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinTarget {
    /// Coin symbol, e.g. "RVN"
    pub symbol: String,
    /// Algorithm name as passed to the miner, e.g. "kawpow"
    pub algorithm: String,
    /// Which external miner binary handles this coin.
    pub miner: MinerKind,
    /// Pool host, e.g. "stratum+tcp://rvn.2miners.com"
    pub pool: String,
    /// Pool port.
    pub port: u16,
    /// Payout wallet address, passed to the miner as the user argument.
    pub wallet: String,
}

impl fmt::Display for CoinTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} via {} @ {}:{})",
            self.symbol, self.algorithm, self.miner, self.pool, self.port,
        )
    }
}

impl CoinTarget {
    /// Full pool endpoint ("host:port") as handed to the miner.
    pub fn pool_endpoint(&self) -> String {
        format!("{}:{}", self.pool, self.port)
    }

    /// Helper to build a test target with sensible defaults.
    #[cfg(test)]
    pub fn sample() -> Self {
        CoinTarget {
            symbol: "RVN".to_string(),
            algorithm: "kawpow".to_string(),
            miner: MinerKind::Trex,
            pool: "stratum+tcp://rvn.2miners.com".to_string(),
            port: 6060,
            wallet: "RTestWalletAddress".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Miner kinds
// ---------------------------------------------------------------------------

/// Supported external miner binaries.
///
/// The kind determines the command-line flag shape and the local status
/// endpoint the miner exposes (path and JSON layout differ per miner).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MinerKind {
    Trex,
    Lolminer,
    Gminer,
    Nbminer,
    Xmrig,
}

impl MinerKind {
    /// All known miner kinds (useful for iteration).
    pub const ALL: &'static [MinerKind] = &[
        MinerKind::Trex,
        MinerKind::Lolminer,
        MinerKind::Gminer,
        MinerKind::Nbminer,
        MinerKind::Xmrig,
    ];

    /// Path component of the local status endpoint.
    pub fn status_path(&self) -> &'static str {
        match self {
            MinerKind::Trex => "/summary",
            MinerKind::Lolminer => "/",
            MinerKind::Gminer => "/stat",
            MinerKind::Nbminer => "/api/v1/status",
            MinerKind::Xmrig => "/1/summary",
        }
    }
}

impl fmt::Display for MinerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MinerKind::Trex => write!(f, "t-rex"),
            MinerKind::Lolminer => write!(f, "lolminer"),
            MinerKind::Gminer => write!(f, "gminer"),
            MinerKind::Nbminer => write!(f, "nbminer"),
            MinerKind::Xmrig => write!(f, "xmrig"),
        }
    }
}

impl std::str::FromStr for MinerKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trex" | "t-rex" => Ok(MinerKind::Trex),
            "lolminer" => Ok(MinerKind::Lolminer),
            "gminer" => Ok(MinerKind::Gminer),
            "nbminer" => Ok(MinerKind::Nbminer),
            "xmrig" => Ok(MinerKind::Xmrig),
            _ => Err(anyhow::anyhow!("Unknown miner kind: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Samples & measurements
// ---------------------------------------------------------------------------

/// A single hashrate reading from a running miner's status endpoint.
/// Ephemeral: consumed by the run loop, never persisted individually.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashrateSample {
    pub coin: String,
    pub taken_at: DateTime<Utc>,
    /// Hashrate reading in the coin's native unit (MH/s for most algos).
    pub hashrate: f64,
}

impl fmt::Display for HashrateSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:.2} @ {}", self.coin, self.hashrate, self.taken_at)
    }
}

/// Aggregate statistics over the successful samples of one window.
///
/// The median is the primary statistic — robust against outlier spikes
/// during the warm-up tail. A `Measurement` only exists when at least one
/// sample succeeded; "zero usable samples" is a distinct failure state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Measurement {
    pub median: f64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub samples: u32,
    /// Stability in percent: 100 − (stddev / mean · 100), clamped at 0.
    pub stability: f64,
}

impl Measurement {
    /// Aggregate a sampling window. Returns `None` for an empty window —
    /// the caller must treat that as a measurement failure, not zero.
    pub fn from_samples(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

        let stability = if values.len() > 1 && mean > 0.0 {
            let variance = values
                .iter()
                .map(|v| (v - mean).powi(2))
                .sum::<f64>()
                / (values.len() - 1) as f64;
            (100.0 - variance.sqrt() / mean * 100.0).max(0.0)
        } else {
            100.0
        };

        Some(Measurement {
            median: median(values),
            mean,
            min,
            max,
            samples: values.len() as u32,
            stability,
        })
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "median={:.2} mean={:.2} range=[{:.2}, {:.2}] n={} stability={:.0}%",
            self.median, self.mean, self.min, self.max, self.samples, self.stability,
        )
    }
}

/// Median of a slice. Even-length inputs average the two central values.
pub fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

// ---------------------------------------------------------------------------
// Benchmark results
// ---------------------------------------------------------------------------

/// Outcome classification for a single coin benchmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Success,
    LaunchFailed,
    MeasurementFailed,
    Skipped,
    Cancelled,
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultStatus::Success => write!(f, "success"),
            ResultStatus::LaunchFailed => write!(f, "launch_failed"),
            ResultStatus::MeasurementFailed => write!(f, "measurement_failed"),
            ResultStatus::Skipped => write!(f, "skipped"),
            ResultStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// The per-coin record appended to the run's result collection.
///
/// `measured_hashrate = None` means "could not measure" — never a zero.
/// A genuine zero reading is `Some(0.0)` with status `Success`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub coin: String,
    pub algorithm: String,
    pub measured_hashrate: Option<f64>,
    pub expected_hashrate: Option<f64>,
    /// Net profit estimate in USD/day; `None` when undefined.
    pub profit: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub status: ResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    // Supplemental window statistics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_hashrate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_hashrate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stability: Option<f64>,
    #[serde(default)]
    pub samples: u32,
}

impl BenchmarkResult {
    /// A failure record with no measurement attached.
    pub fn failure(
        target: &CoinTarget,
        status: ResultStatus,
        error: impl Into<String>,
    ) -> Self {
        BenchmarkResult {
            coin: target.symbol.clone(),
            algorithm: target.algorithm.clone(),
            measured_hashrate: None,
            expected_hashrate: None,
            profit: None,
            timestamp: Utc::now(),
            status,
            error: Some(error.into()),
            min_hashrate: None,
            max_hashrate: None,
            stability: None,
            samples: 0,
        }
    }

    /// A successful record built from an aggregated measurement window.
    pub fn measured(target: &CoinTarget, measurement: &Measurement) -> Self {
        BenchmarkResult {
            coin: target.symbol.clone(),
            algorithm: target.algorithm.clone(),
            measured_hashrate: Some(measurement.median),
            expected_hashrate: None,
            profit: None,
            timestamp: Utc::now(),
            status: ResultStatus::Success,
            error: None,
            min_hashrate: Some(measurement.min),
            max_hashrate: Some(measurement.max),
            stability: Some(measurement.stability),
            samples: measurement.samples,
        }
    }
}

impl fmt::Display for BenchmarkResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.measured_hashrate {
            Some(h) => write!(
                f,
                "{} [{}]: {:.2} measured (expected {}), profit {}",
                self.coin,
                self.status,
                h,
                self.expected_hashrate
                    .map(|e| format!("{e:.2}"))
                    .unwrap_or_else(|| "n/a".to_string()),
                self.profit
                    .map(|p| format!("${p:.2}/day"))
                    .unwrap_or_else(|| "n/a".to_string()),
            ),
            None => write!(
                f,
                "{} [{}]: no measurement ({})",
                self.coin,
                self.status,
                self.error.as_deref().unwrap_or("unknown"),
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Benchmark session
// ---------------------------------------------------------------------------

/// One full benchmark run over the configured coin list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkSession {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Exactly one entry per input coin, in input order.
    pub results: Vec<BenchmarkResult>,
    pub successful: u32,
    pub failed: u32,
    pub skipped: u32,
    pub best_coin: Option<String>,
    pub best_profit: Option<f64>,
}

impl BenchmarkSession {
    pub fn new(session_id: impl Into<String>) -> Self {
        BenchmarkSession {
            session_id: session_id.into(),
            started_at: Utc::now(),
            finished_at: None,
            results: Vec::new(),
            successful: 0,
            failed: 0,
            skipped: 0,
            best_coin: None,
            best_profit: None,
        }
    }

    /// Append a result and update the per-status counters.
    pub fn record(&mut self, result: BenchmarkResult) {
        match result.status {
            ResultStatus::Success => self.successful += 1,
            ResultStatus::LaunchFailed | ResultStatus::MeasurementFailed => self.failed += 1,
            ResultStatus::Skipped | ResultStatus::Cancelled => self.skipped += 1,
        }
        self.results.push(result);
    }

    /// Close the session: set the end timestamp and pick the most
    /// profitable coin among the successful results.
    pub fn finalize(&mut self) {
        self.finished_at = Some(Utc::now());

        let best = self
            .results
            .iter()
            .filter(|r| r.status == ResultStatus::Success)
            .filter_map(|r| r.profit.map(|p| (r, p)))
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        if let Some((result, profit)) = best {
            self.best_coin = Some(result.coin.clone());
            self.best_profit = Some(profit);
        }
    }
}

impl fmt::Display for BenchmarkSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "session {} | coins={} ok={} failed={} skipped={} | best={}",
            self.session_id,
            self.results.len(),
            self.successful,
            self.failed,
            self.skipped,
            self.best_coin.as_deref().unwrap_or("n/a"),
        )
    }
}

// ---------------------------------------------------------------------------
// Per-coin state machine
// ---------------------------------------------------------------------------

/// Lifecycle phase of a single coin benchmark. Any phase can take the
/// error edge straight to `Recorded`; Stopping still runs when a process
/// was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoinPhase {
    Pending,
    Launching,
    WarmingUp,
    Sampling,
    Stopping,
    Recorded,
}

impl fmt::Display for CoinPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoinPhase::Pending => write!(f, "pending"),
            CoinPhase::Launching => write!(f, "launching"),
            CoinPhase::WarmingUp => write!(f, "warming_up"),
            CoinPhase::Sampling => write!(f, "sampling"),
            CoinPhase::Stopping => write!(f, "stopping"),
            CoinPhase::Recorded => write!(f, "recorded"),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error taxonomy for HASHBENCH.
#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    #[error("launch failed for {coin}: {message}")]
    Launch { coin: String, message: String },

    /// Transient: the miner's status endpoint is not reachable yet.
    /// Retried with backoff before escalating to `ProbeTimeout`.
    #[error("probe unavailable: {0}")]
    ProbeUnavailable(String),

    #[error("probe timed out after {attempts} attempts: {message}")]
    ProbeTimeout { attempts: u32, message: String },

    #[error("network error ({source_name}): {message}")]
    Network { source_name: String, message: String },

    #[error("parse error ({source_name}): {message}")]
    Parse { source_name: String, message: String },

    /// Zero usable samples in the window — distinct from a zero hashrate.
    #[error("no usable samples for {0}")]
    MeasurementFailure(String),

    #[error("configuration error: {0}")]
    Config(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
