//! Reference (baseline) hashrate and revenue data.
//!
//! Baselines tell us what a healthy GPU of our model is expected to earn
//! per coin. The run loop treats them as optional: a benchmark without a
//! baseline still measures hashrate, it just cannot compute profit or
//! deviation. `CachedBaseline` keeps the last good fetch on disk so a
//! flaky aggregator does not blank out a whole run.

pub mod hashrateno;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::types::BenchError;

/// Expected performance of the configured GPU on one coin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoinBaseline {
    pub coin: String,
    /// Expected hashrate in the same unit the probe reports (MH/s, or
    /// H/s for CPU algorithms).
    pub expected_hashrate: f64,
    /// Gross revenue in USD per day at the expected hashrate.
    pub revenue_usd_day: f64,
    pub source: String,
    pub fetched_at: DateTime<Utc>,
}

/// A provider of baseline data, mocked in run-loop tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BaselineSource: Send + Sync {
    async fn fetch_baseline(&self, coin: &str, algorithm: &str)
        -> Result<CoinBaseline, BenchError>;

    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Disk-cached wrapper
// ---------------------------------------------------------------------------

/// Wraps a `BaselineSource` with a JSON cache file keyed by coin symbol.
///
/// Fresh cache entries are served without touching the remote. On a
/// remote failure, a stale-but-present entry is served with a warning;
/// only when both the remote and the cache come up empty does the error
/// propagate.
pub struct CachedBaseline<S> {
    inner: S,
    cache_path: PathBuf,
    max_age: chrono::Duration,
    entries: Mutex<HashMap<String, CoinBaseline>>,
}

impl<S: BaselineSource> CachedBaseline<S> {
    pub fn new(inner: S, cache_path: impl Into<PathBuf>, max_age_secs: u64) -> Self {
        let cache_path = cache_path.into();
        let entries = Self::load_cache(&cache_path);
        Self {
            inner,
            cache_path,
            max_age: chrono::Duration::seconds(max_age_secs as i64),
            entries: Mutex::new(entries),
        }
    }

    fn load_cache(path: &PathBuf) -> HashMap<String, CoinBaseline> {
        match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Ignoring corrupt baseline cache");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        }
    }

    fn persist(&self, entries: &HashMap<String, CoinBaseline>) {
        // Cache persistence is best-effort: an unwritable cache only costs
        // us a refetch next run.
        match serde_json::to_string_pretty(entries) {
            Ok(raw) => {
                if let Err(e) = std::fs::write(&self.cache_path, raw) {
                    warn!(path = %self.cache_path.display(), error = %e, "Failed to write baseline cache");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize baseline cache"),
        }
    }

    fn is_fresh(&self, entry: &CoinBaseline) -> bool {
        Utc::now() - entry.fetched_at < self.max_age
    }
}

#[async_trait]
impl<S: BaselineSource> BaselineSource for CachedBaseline<S> {
    async fn fetch_baseline(
        &self,
        coin: &str,
        algorithm: &str,
    ) -> Result<CoinBaseline, BenchError> {
        {
            let entries = self.entries.lock().await;
            if let Some(entry) = entries.get(coin) {
                if self.is_fresh(entry) {
                    debug!(coin, "Baseline served from cache");
                    return Ok(entry.clone());
                }
            }
        }

        match self.inner.fetch_baseline(coin, algorithm).await {
            Ok(baseline) => {
                let mut entries = self.entries.lock().await;
                entries.insert(coin.to_string(), baseline.clone());
                self.persist(&entries);
                Ok(baseline)
            }
            Err(e) => {
                let entries = self.entries.lock().await;
                if let Some(stale) = entries.get(coin) {
                    warn!(
                        coin,
                        error = %e,
                        age_hours = (Utc::now() - stale.fetched_at).num_hours(),
                        "Baseline fetch failed, serving stale cache entry"
                    );
                    Ok(stale.clone())
                } else {
                    Err(e)
                }
            }
        }
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    fn temp_cache_path() -> PathBuf {
        std::env::temp_dir().join(format!("baseline_cache_{}.json", uuid::Uuid::new_v4()))
    }

    fn baseline(coin: &str, fetched_at: DateTime<Utc>) -> CoinBaseline {
        CoinBaseline {
            coin: coin.to_string(),
            expected_hashrate: 31.5,
            revenue_usd_day: 0.42,
            source: "stub".to_string(),
            fetched_at,
        }
    }

    /// Hand-rolled source with failure injection and a call counter.
    struct StubSource {
        calls: AtomicU32,
        fail: AtomicBool,
    }

    impl StubSource {
        fn new() -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl BaselineSource for StubSource {
        async fn fetch_baseline(
            &self,
            coin: &str,
            _algorithm: &str,
        ) -> Result<CoinBaseline, BenchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                Err(BenchError::Network {
                    source_name: "stub".to_string(),
                    message: "injected failure".to_string(),
                })
            } else {
                Ok(baseline(coin, Utc::now()))
            }
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    #[tokio::test]
    async fn test_fresh_cache_skips_remote() {
        let path = temp_cache_path();
        let cached = CachedBaseline::new(StubSource::new(), &path, 3600);

        let first = cached.fetch_baseline("RVN", "kawpow").await.unwrap();
        let second = cached.fetch_baseline("RVN", "kawpow").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(cached.inner.calls.load(Ordering::SeqCst), 1);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_stale_entry_served_on_remote_failure() {
        let path = temp_cache_path();
        let cached = CachedBaseline::new(StubSource::new(), &path, 3600);

        // Seed an expired entry directly.
        {
            let mut entries = cached.entries.lock().await;
            entries.insert(
                "RVN".to_string(),
                baseline("RVN", Utc::now() - chrono::Duration::hours(5)),
            );
        }
        cached.inner.fail.store(true, Ordering::SeqCst);

        let served = cached.fetch_baseline("RVN", "kawpow").await.unwrap();
        assert_eq!(served.coin, "RVN");
        assert_eq!(cached.inner.calls.load(Ordering::SeqCst), 1);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_failure_with_empty_cache_propagates() {
        let path = temp_cache_path();
        let cached = CachedBaseline::new(StubSource::new(), &path, 3600);
        cached.inner.fail.store(true, Ordering::SeqCst);

        let err = cached.fetch_baseline("FLUX", "zelhash").await.unwrap_err();
        assert!(matches!(err, BenchError::Network { .. }));

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_cache_survives_restart() {
        let path = temp_cache_path();
        {
            let cached = CachedBaseline::new(StubSource::new(), &path, 3600);
            cached.fetch_baseline("RVN", "kawpow").await.unwrap();
        }

        // New instance, same file: the entry should load and the remote
        // should not be called again.
        let cached = CachedBaseline::new(StubSource::new(), &path, 3600);
        cached.fetch_baseline("RVN", "kawpow").await.unwrap();
        assert_eq!(cached.inner.calls.load(Ordering::SeqCst), 0);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_corrupt_cache_file_is_ignored() {
        let path = temp_cache_path();
        std::fs::write(&path, "{ not json").unwrap();
        let entries = CachedBaseline::<StubSource>::load_cache(&path);
        assert!(entries.is_empty());
        let _ = std::fs::remove_file(&path);
    }
}
