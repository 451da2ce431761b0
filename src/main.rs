//! HASHBENCH — GPU Mining Benchmark Coordinator
//!
//! Entry point. Loads configuration, initialises structured logging,
//! wires up the miner launcher, probe, and baseline source, then runs
//! the sequential per-coin benchmark loop with graceful shutdown.

use anyhow::Result;
use std::time::Duration;
use tracing::{info, warn};

use hashbench::baseline::hashrateno::HashrateNoClient;
use hashbench::baseline::CachedBaseline;
use hashbench::config::AppConfig;
use hashbench::engine::{BenchmarkRunner, RunContext};
use hashbench::miner::probe::HttpProbe;
use hashbench::miner::MinerLauncher;
use hashbench::profit::ProfitModel;
use hashbench::storage;
use hashbench::types::CoinTarget;

const BANNER: &str = r#"
 _   _    _    ____  _   _ ____  _____ _   _  ____ _   _
| | | |  / \  / ___|| | | | __ )| ____| \ | |/ ___| | | |
| |_| | / _ \ \___ \| |_| |  _ \|  _| |  \| | |   | |_| |
|  _  |/ ___ \ ___) |  _  | |_) | |___| |\  | |___|  _  |
|_| |_/_/   \_\____/|_| |_|____/|_____|_| \_|\____|_| |_|

  GPU Mining Benchmark Coordinator
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = AppConfig::load("config.toml")?;

    init_logging();

    println!("{BANNER}");
    info!(
        run_name = %cfg.run.name,
        coins = cfg.coins.len(),
        warmup_secs = cfg.benchmark.warmup_secs,
        samples_per_coin = cfg.benchmark.samples_per_coin,
        "HASHBENCH starting up"
    );

    // -- Initialise components -------------------------------------------

    let launcher = MinerLauncher::new(
        cfg.miners.clone(),
        cfg.run.worker.clone(),
        Duration::from_secs(cfg.benchmark.stop_grace_secs),
    );

    let probe = HttpProbe::new(cfg.probe.clone())?;

    let baseline = if cfg.baseline.enabled {
        let api_key = match cfg.baseline.api_key_env.as_deref() {
            Some(env_name) => AppConfig::resolve_env(env_name)?,
            None => {
                warn!("No baseline API key configured — lookups may be rejected");
                String::new()
            }
        };
        let client = HashrateNoClient::new(api_key, cfg.baseline.gpu.clone())?;
        Some(CachedBaseline::new(
            client,
            cfg.baseline.cache_path.clone(),
            cfg.baseline.cache_max_age_secs,
        ))
    } else {
        info!("Baseline lookups disabled — results will carry no profit figures");
        None
    };

    let profit = ProfitModel::new(cfg.run.power_draw_watts, cfg.run.power_cost_usd_kwh);

    let runner = BenchmarkRunner::new(launcher, probe, baseline, cfg.benchmark.clone(), profit);

    // -- Cancellation wiring ----------------------------------------------

    let session_id = uuid::Uuid::new_v4().to_string();
    let (cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received — finishing current step, then stopping");
            let _ = cancel_tx.send(true);
        }
    });

    // -- Run ---------------------------------------------------------------

    let coins: Vec<CoinTarget> = cfg.coins.iter().map(|c| c.to_target()).collect();
    let session = runner
        .run(&coins, RunContext::new(session_id, cancel_rx))
        .await;

    for result in &session.results {
        info!(
            coin = %result.coin,
            status = %result.status,
            hashrate = ?result.measured_hashrate,
            expected = ?result.expected_hashrate,
            profit_usd_day = ?result.profit,
            "Result"
        );
    }

    storage::save_results(&session.results, &cfg.run.results_path)?;

    info!(
        session = %session.session_id,
        successful = session.successful,
        failed = session.failed,
        skipped = session.skipped,
        best_coin = ?session.best_coin,
        best_profit = ?session.best_profit,
        results_path = %cfg.run.results_path,
        "HASHBENCH finished."
    );

    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("hashbench=info"));

    let json_logging = std::env::var("HASHBENCH_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
