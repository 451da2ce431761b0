//! hashrate.no benchmark aggregator client (API v2).
//!
//! One endpoint matters here: `/benchmarks?coin=X` returns community
//! benchmark entries per GPU model and algorithm. We pick the entry for
//! our configured GPU and read its hashrate and daily revenue.

use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;
use tracing::debug;

use crate::baseline::{BaselineSource, CoinBaseline};
use crate::types::BenchError;

const BASE_URL: &str = "https://hashrate.no/api/v2";
const SOURCE_NAME: &str = "hashrate.no";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct HashrateNoClient {
    http: reqwest::Client,
    api_key: String,
    /// GPU model string to match against benchmark entries, e.g.
    /// "RTX 3070".
    gpu: String,
}

impl HashrateNoClient {
    pub fn new(api_key: impl Into<String>, gpu: impl Into<String>) -> Result<Self, BenchError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BenchError::Config(format!("baseline HTTP client: {e}")))?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            gpu: gpu.into(),
        })
    }

    fn network_err(message: impl Into<String>) -> BenchError {
        BenchError::Network {
            source_name: SOURCE_NAME.to_string(),
            message: message.into(),
        }
    }

    fn parse_err(message: impl Into<String>) -> BenchError {
        BenchError::Parse {
            source_name: SOURCE_NAME.to_string(),
            message: message.into(),
        }
    }
}

/// Pick the benchmark entry for our GPU and algorithm out of an API
/// response and turn it into a baseline.
///
/// GPU matching is a case-insensitive substring match: the API reports
/// "NVIDIA GeForce RTX 3070" where the config says "RTX 3070".
pub fn select_benchmark(
    entries: &serde_json::Value,
    gpu: &str,
    coin: &str,
    algorithm: &str,
) -> Option<CoinBaseline> {
    let gpu_lower = gpu.to_lowercase();
    let algo_lower = algorithm.to_lowercase();

    for entry in entries.as_array()? {
        let entry_gpu = entry.get("gpu").and_then(|v| v.as_str()).unwrap_or("");
        let entry_algo = entry
            .get("algorithm")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        if !entry_gpu.to_lowercase().contains(&gpu_lower)
            && !gpu_lower.contains(&entry_gpu.to_lowercase())
        {
            continue;
        }
        if !entry_algo.to_lowercase().contains(&algo_lower) {
            continue;
        }

        let expected_hashrate = entry.get("hashrate").and_then(|v| v.as_f64())?;
        let revenue_usd_day = entry
            .get("revenue24")
            .or_else(|| entry.get("revenue"))
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0);

        return Some(CoinBaseline {
            coin: coin.to_string(),
            expected_hashrate,
            revenue_usd_day,
            source: SOURCE_NAME.to_string(),
            fetched_at: Utc::now(),
        });
    }

    None
}

#[async_trait]
impl BaselineSource for HashrateNoClient {
    async fn fetch_baseline(
        &self,
        coin: &str,
        algorithm: &str,
    ) -> Result<CoinBaseline, BenchError> {
        let url = format!(
            "{BASE_URL}/benchmarks?apiKey={}&coin={}",
            urlencoding::encode(&self.api_key),
            urlencoding::encode(coin)
        );

        debug!(coin, gpu = %self.gpu, "Fetching baseline from hashrate.no");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Self::network_err(format!("request failed: {e}")))?;

        let status = response.status();
        if status.as_u16() == 401 {
            return Err(Self::network_err("invalid API key"));
        }
        if status.as_u16() == 429 {
            return Err(Self::network_err("rate limit reached"));
        }
        if !status.is_success() {
            return Err(Self::network_err(format!("HTTP {status}")));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Self::parse_err(format!("invalid JSON: {e}")))?;

        select_benchmark(&body, &self.gpu, coin, algorithm).ok_or_else(|| {
            Self::parse_err(format!(
                "no benchmark entry for gpu '{}' and algorithm '{algorithm}'",
                self.gpu
            ))
        })
    }

    fn name(&self) -> &str {
        SOURCE_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entries() -> serde_json::Value {
        json!([
            {
                "gpu": "NVIDIA GeForce RTX 3060",
                "algorithm": "kawpow",
                "hashrate": 22.5,
                "revenue24": 0.31
            },
            {
                "gpu": "NVIDIA GeForce RTX 3070",
                "algorithm": "kawpow",
                "hashrate": 31.5,
                "revenue24": 0.42
            },
            {
                "gpu": "NVIDIA GeForce RTX 3070",
                "algorithm": "autolykos2",
                "hashrate": 172.0,
                "revenue24": 0.38
            }
        ])
    }

    #[test]
    fn test_select_matches_gpu_substring_and_algorithm() {
        let baseline = select_benchmark(&entries(), "RTX 3070", "RVN", "kawpow").unwrap();
        assert_eq!(baseline.expected_hashrate, 31.5);
        assert_eq!(baseline.revenue_usd_day, 0.42);
        assert_eq!(baseline.coin, "RVN");
        assert_eq!(baseline.source, "hashrate.no");
    }

    #[test]
    fn test_select_is_case_insensitive() {
        let baseline = select_benchmark(&entries(), "rtx 3070", "ERG", "AUTOLYKOS2").unwrap();
        assert_eq!(baseline.expected_hashrate, 172.0);
    }

    #[test]
    fn test_select_unknown_gpu_is_none() {
        assert!(select_benchmark(&entries(), "RX 6800", "RVN", "kawpow").is_none());
    }

    #[test]
    fn test_select_unknown_algorithm_is_none() {
        assert!(select_benchmark(&entries(), "RTX 3070", "FLUX", "zelhash").is_none());
    }

    #[test]
    fn test_select_missing_revenue_defaults_to_zero() {
        let body = json!([
            { "gpu": "RTX 3070", "algorithm": "kawpow", "hashrate": 31.5 }
        ]);
        let baseline = select_benchmark(&body, "RTX 3070", "RVN", "kawpow").unwrap();
        assert_eq!(baseline.revenue_usd_day, 0.0);
    }

    #[test]
    fn test_select_non_array_body_is_none() {
        let body = json!({ "error": "unexpected" });
        assert!(select_benchmark(&body, "RTX 3070", "RVN", "kawpow").is_none());
    }
}
