//! Hashrate probing over each miner's local status API.
//!
//! Every supported miner exposes an HTTP endpoint with a different JSON
//! shape and unit. The probe normalises all of them to MH/s (H/s for
//! xmrig, whose CPU rates are already small) and retries transient
//! failures with a configurable backoff before giving up on a sample.

use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;
use tracing::{debug, trace, warn};

use crate::config::ProbeConfig;
use crate::miner::MinerProcess;
use crate::types::{BenchError, HashrateSample, MinerKind};

/// Abstraction over hashrate sampling, mocked in run-loop tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Probe: Send + Sync {
    /// Take one hashrate sample from a running miner. Retries internally;
    /// an `Err` means the attempt budget is exhausted.
    async fn sample(&self, process: &MinerProcess) -> Result<HashrateSample, BenchError>;
}

/// Polls the miner's local status endpoint.
pub struct HttpProbe {
    http: reqwest::Client,
    policy: ProbeConfig,
}

impl HttpProbe {
    pub fn new(policy: ProbeConfig) -> Result<Self, BenchError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(policy.timeout_secs))
            .build()
            .map_err(|e| BenchError::Config(format!("probe HTTP client: {e}")))?;
        Ok(Self { http, policy })
    }

    /// One poll attempt. Any transport, HTTP-status, or parse problem is
    /// transient from the caller's point of view.
    async fn poll_once(&self, process: &MinerProcess) -> Result<f64, BenchError> {
        let url = process.status_url();
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| BenchError::ProbeUnavailable(format!("{url}: {e}")))?;

        if !response.status().is_success() {
            return Err(BenchError::ProbeUnavailable(format!(
                "{url}: HTTP {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| BenchError::ProbeUnavailable(format!("{url}: invalid JSON: {e}")))?;

        parse_hashrate(process.kind, &body).ok_or_else(|| {
            BenchError::ProbeUnavailable(format!(
                "{url}: no hashrate field in {} response",
                process.kind
            ))
        })
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn sample(&self, process: &MinerProcess) -> Result<HashrateSample, BenchError> {
        let mut last_err = String::new();

        for attempt in 1..=self.policy.max_attempts {
            match self.poll_once(process).await {
                Ok(hashrate) => {
                    trace!(coin = %process.coin, attempt, hashrate, "Probe sample");
                    return Ok(HashrateSample {
                        coin: process.coin.clone(),
                        taken_at: Utc::now(),
                        hashrate,
                    });
                }
                Err(e) => {
                    last_err = e.to_string();
                    if attempt < self.policy.max_attempts {
                        let delay = self.policy.delay_for(attempt);
                        debug!(
                            coin = %process.coin,
                            attempt,
                            max = self.policy.max_attempts,
                            delay_ms = delay.as_millis() as u64,
                            error = %last_err,
                            "Probe attempt failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        warn!(coin = %process.coin, error = %last_err, "Probe attempts exhausted");
        Err(BenchError::ProbeTimeout {
            attempts: self.policy.max_attempts,
            message: last_err,
        })
    }
}

/// Extract the current hashrate in MH/s from a miner status document.
///
/// Returns `None` when the expected field is missing or not numeric —
/// a zero value is a valid reading (miner up, GPU idle), not an error.
pub fn parse_hashrate(kind: MinerKind, body: &serde_json::Value) -> Option<f64> {
    match kind {
        // t-rex /summary: { "hashrate": 31540000, ... } in H/s
        MinerKind::Trex => body.get("hashrate")?.as_f64().map(|h| h / 1e6),
        // lolminer /: { "Session": { "Performance_Summary": 62.1, ... } } in MH/s
        MinerKind::Lolminer => body
            .get("Session")?
            .get("Performance_Summary")?
            .as_f64(),
        // gminer /stat: { "devices": [ { "speed": 31540000, ... } ] } in H/s
        MinerKind::Gminer => body
            .get("devices")?
            .get(0)?
            .get("speed")?
            .as_f64()
            .map(|h| h / 1e6),
        // nbminer /api/v1/status: { "miner": { "devices": [ { "hashrate_raw": 31540000.0 } ] } } in H/s
        MinerKind::Nbminer => body
            .get("miner")?
            .get("devices")?
            .get(0)?
            .get("hashrate_raw")?
            .as_f64()
            .map(|h| h / 1e6),
        // xmrig /1/summary: { "hashrate": { "total": [ 11230.5, ... ] } } in H/s,
        // reported as-is (CPU algos run in kH/s territory, MH/s would lose
        // all precision).
        MinerKind::Xmrig => body.get("hashrate")?.get("total")?.get(0)?.as_f64(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
