//! Result persistence.
//!
//! Results land in a single JSON file as an ordered array, written
//! atomically: serialize to a sibling `.tmp` file, then rename over the
//! target. A crash mid-write leaves the previous file intact.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

use crate::types::BenchmarkResult;

/// Write the full result set for a run, replacing any previous file.
pub fn save_results(results: &[BenchmarkResult], path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let raw = serde_json::to_string_pretty(results).context("serializing benchmark results")?;

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &raw)
        .with_context(|| format!("writing temporary result file {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("moving results into place at {}", path.display()))?;

    info!(path = %path.display(), results = results.len(), "Results saved");
    Ok(())
}

/// Load a previously saved result set. `Ok(None)` when no file exists.
pub fn load_results(path: impl AsRef<Path>) -> Result<Option<Vec<BenchmarkResult>>> {
    let path = path.as_ref();
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("reading result file {}", path.display()))
        }
    };
    let results = serde_json::from_str(&raw)
        .with_context(|| format!("parsing result file {}", path.display()))?;
    Ok(Some(results))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CoinTarget, ResultStatus};
    use std::path::PathBuf;

    fn temp_path() -> PathBuf {
        std::env::temp_dir().join(format!("bench_results_{}.json", uuid::Uuid::new_v4()))
    }

    fn result_for(symbol: &str, status: ResultStatus) -> BenchmarkResult {
        let target = CoinTarget {
            symbol: symbol.to_string(),
            ..CoinTarget::sample()
        };
        BenchmarkResult::failure(&target, status, "test entry")
    }

    #[test]
    fn test_roundtrip_preserves_order() {
        let path = temp_path();
        let results = vec![
            result_for("RVN", ResultStatus::MeasurementFailed),
            result_for("ERG", ResultStatus::LaunchFailed),
            result_for("FLUX", ResultStatus::Skipped),
        ];

        save_results(&results, &path).unwrap();
        let loaded = load_results(&path).unwrap().unwrap();
        let order: Vec<&str> = loaded.iter().map(|r| r.coin.as_str()).collect();
        assert_eq!(order, vec!["RVN", "ERG", "FLUX"]);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_missing_file_is_none() {
        assert!(load_results(temp_path()).unwrap().is_none());
    }

    #[test]
    fn test_save_replaces_previous_file() {
        let path = temp_path();
        save_results(&[result_for("RVN", ResultStatus::LaunchFailed)], &path).unwrap();
        save_results(&[result_for("ERG", ResultStatus::LaunchFailed)], &path).unwrap();

        let loaded = load_results(&path).unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].coin, "ERG");

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_stray_tmp_file_does_not_shadow_results() {
        // Simulates a crash between the tmp write and the rename: the
        // previous result file must still load cleanly.
        let path = temp_path();
        save_results(&[result_for("RVN", ResultStatus::LaunchFailed)], &path).unwrap();
        std::fs::write(path.with_extension("json.tmp"), "{ half-written").unwrap();

        let loaded = load_results(&path).unwrap().unwrap();
        assert_eq!(loaded[0].coin, "RVN");

        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(path.with_extension("json.tmp"));
    }

    #[test]
    fn test_no_tmp_file_left_after_save() {
        let path = temp_path();
        save_results(&[result_for("RVN", ResultStatus::LaunchFailed)], &path).unwrap();
        assert!(!path.with_extension("json.tmp").exists());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_corrupt_file_is_an_error_not_none() {
        let path = temp_path();
        std::fs::write(&path, "not json at all").unwrap();
        assert!(load_results(&path).is_err());
        let _ = std::fs::remove_file(&path);
    }
}
