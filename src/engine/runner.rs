//! The per-coin benchmark loop.
//!
//! For each coin, in input order: launch the miner, let it warm up,
//! collect hashrate samples, stop the miner, then attach baseline and
//! profit figures before recording. Coins are strictly sequential — the
//! GPU cannot serve two miners — and one coin's failure never stops the
//! run: it becomes a failed entry and the loop moves on.

use std::time::Duration;
use tracing::{error, info, warn};

use crate::baseline::{BaselineSource, CoinBaseline};
use crate::config::BenchmarkConfig;
use crate::engine::RunContext;
use crate::miner::probe::Probe;
use crate::miner::{MinerControl, MinerProcess};
use crate::profit::{deviation_percent, ProfitModel};
use crate::types::{
    BenchError, BenchmarkResult, BenchmarkSession, CoinPhase, CoinTarget, Measurement,
    ResultStatus,
};

/// Outcome of the launch-warmup-sample-stop sequence for a single coin,
/// before baseline and profit enrichment.
enum CoinOutcome {
    Measured(Measurement),
    LaunchFailed(String),
    MeasurementFailed(String),
    Cancelled,
}

pub struct BenchmarkRunner<M, P, B> {
    launcher: M,
    probe: P,
    baseline: Option<B>,
    bench: BenchmarkConfig,
    profit: ProfitModel,
}

impl<M, P, B> BenchmarkRunner<M, P, B>
where
    M: MinerControl,
    P: Probe,
    B: BaselineSource,
{
    pub fn new(
        launcher: M,
        probe: P,
        baseline: Option<B>,
        bench: BenchmarkConfig,
        profit: ProfitModel,
    ) -> Self {
        Self {
            launcher,
            probe,
            baseline,
            bench,
            profit,
        }
    }

    /// Benchmark every coin in order and return the closed session.
    /// Cancellation turns all not-yet-benchmarked coins into `Cancelled`
    /// entries; the session always holds one entry per input coin.
    pub async fn run(&self, coins: &[CoinTarget], mut ctx: RunContext) -> BenchmarkSession {
        let mut session = BenchmarkSession::new(ctx.session_id.clone());

        info!(
            session = %session.session_id,
            coins = coins.len(),
            warmup_secs = self.bench.warmup_secs,
            samples = self.bench.samples_per_coin,
            "Benchmark run starting"
        );

        for (index, target) in coins.iter().enumerate() {
            if ctx.is_cancelled() {
                info!(coin = %target.symbol, "Skipping coin, run cancelled");
                session.record(BenchmarkResult::failure(
                    target,
                    ResultStatus::Cancelled,
                    "run cancelled before benchmark",
                ));
                continue;
            }

            let result = self.bench_coin(target, &mut ctx).await;
            info!(
                coin = %result.coin,
                status = %result.status,
                hashrate = ?result.measured_hashrate,
                profit = ?result.profit,
                "Coin benchmark finished"
            );
            session.record(result);

            // Give the GPU a moment to cool down and release driver state
            // before the next miner grabs it.
            if index + 1 < coins.len() && !ctx.is_cancelled() {
                self.wait_or_cancel(
                    Duration::from_secs(self.bench.pause_between_coins_secs),
                    &mut ctx,
                )
                .await;
            }
        }

        session.finalize();
        info!(
            session = %session.session_id,
            successful = session.successful,
            failed = session.failed,
            skipped = session.skipped,
            best_coin = ?session.best_coin,
            "Benchmark run finished"
        );
        session
    }

    /// One full coin benchmark. The miner is stopped exactly once for
    /// every successful launch, whatever happens afterwards.
    async fn bench_coin(&self, target: &CoinTarget, ctx: &mut RunContext) -> BenchmarkResult {
        info!(coin = %target.symbol, miner = %target.miner, phase = %CoinPhase::Launching, "Benchmarking coin");

        let process = match self.launcher.start(target).await {
            Ok(process) => process,
            Err(e) => {
                error!(coin = %target.symbol, error = %e, "Miner launch failed");
                return self.enrich(target, CoinOutcome::LaunchFailed(e.to_string())).await;
            }
        };

        let outcome = self.measure(target, &process, ctx).await;

        info!(coin = %target.symbol, phase = %CoinPhase::Stopping, "Stopping miner");
        if let Err(e) = self.launcher.stop(&process).await {
            // The measurement already happened; a noisy shutdown does not
            // invalidate it.
            warn!(coin = %target.symbol, error = %e, "Miner stop reported an error");
        }

        self.enrich(target, outcome).await
    }

    /// Warmup and sampling against a running miner. Never returns without
    /// the caller still owning the stop responsibility.
    async fn measure(
        &self,
        target: &CoinTarget,
        process: &MinerProcess,
        ctx: &mut RunContext,
    ) -> CoinOutcome {
        info!(
            coin = %target.symbol,
            phase = %CoinPhase::WarmingUp,
            secs = self.bench.warmup_secs,
            "Waiting for hashrate to stabilize"
        );
        if !self
            .wait_or_cancel(Duration::from_secs(self.bench.warmup_secs), ctx)
            .await
        {
            return CoinOutcome::Cancelled;
        }

        info!(
            coin = %target.symbol,
            phase = %CoinPhase::Sampling,
            count = self.bench.samples_per_coin,
            interval_secs = self.bench.sample_interval_secs,
            "Collecting samples"
        );

        let mut readings = Vec::with_capacity(self.bench.samples_per_coin as usize);
        let mut last_probe_error = String::new();

        for n in 1..=self.bench.samples_per_coin {
            match self.probe.sample(process).await {
                Ok(sample) => {
                    info!(
                        coin = %target.symbol,
                        sample = n,
                        of = self.bench.samples_per_coin,
                        hashrate = sample.hashrate,
                        "Sample collected"
                    );
                    readings.push(sample.hashrate);
                }
                Err(e) => {
                    // A dropped sample shrinks the window; the remaining
                    // readings still make a measurement.
                    warn!(coin = %target.symbol, sample = n, error = %e, "Sample failed");
                    last_probe_error = e.to_string();
                }
            }

            if n < self.bench.samples_per_coin
                && !self
                    .wait_or_cancel(
                        Duration::from_secs(self.bench.sample_interval_secs),
                        ctx,
                    )
                    .await
            {
                return CoinOutcome::Cancelled;
            }
        }

        match Measurement::from_samples(&readings) {
            Some(measurement) => CoinOutcome::Measured(measurement),
            None => {
                let err = BenchError::MeasurementFailure(format!(
                    "{} ({} attempts: {last_probe_error})",
                    target.symbol, self.bench.samples_per_coin
                ));
                CoinOutcome::MeasurementFailed(err.to_string())
            }
        }
    }

    /// Attach baseline and profit data to an outcome and build the final
    /// result entry. Baseline trouble degrades the entry, never fails it.
    async fn enrich(&self, target: &CoinTarget, outcome: CoinOutcome) -> BenchmarkResult {
        let mut result = match outcome {
            CoinOutcome::Measured(measurement) => BenchmarkResult::measured(target, &measurement),
            CoinOutcome::LaunchFailed(message) => {
                return BenchmarkResult::failure(target, ResultStatus::LaunchFailed, message)
            }
            CoinOutcome::MeasurementFailed(message) => {
                return BenchmarkResult::failure(target, ResultStatus::MeasurementFailed, message)
            }
            CoinOutcome::Cancelled => {
                return BenchmarkResult::failure(
                    target,
                    ResultStatus::Cancelled,
                    "run cancelled during benchmark",
                )
            }
        };

        let baseline = match &self.baseline {
            Some(source) => match source
                .fetch_baseline(&target.symbol, &target.algorithm)
                .await
            {
                Ok(baseline) => Some(baseline),
                Err(e) => {
                    warn!(
                        coin = %target.symbol,
                        error = %e,
                        "Baseline unavailable, result will carry no profit figure"
                    );
                    None
                }
            },
            None => None,
        };

        self.apply_baseline(&mut result, baseline.as_ref());
        result
    }

    fn apply_baseline(&self, result: &mut BenchmarkResult, baseline: Option<&CoinBaseline>) {
        if let Some(baseline) = baseline {
            result.expected_hashrate = Some(baseline.expected_hashrate);
            if let Some(measured) = result.measured_hashrate {
                if let Some(deviation) = deviation_percent(measured, baseline.expected_hashrate) {
                    info!(
                        coin = %result.coin,
                        measured,
                        expected = baseline.expected_hashrate,
                        deviation_percent = format!("{deviation:+.1}"),
                        "Measured against baseline"
                    );
                }
            }
        }
        result.profit = self.profit.net_usd_day(result.measured_hashrate, baseline);
    }

    /// Sleep unless cancellation arrives first. Returns `false` on cancel.
    async fn wait_or_cancel(&self, duration: Duration, ctx: &mut RunContext) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = ctx.cancelled() => {
                info!("Cancellation requested");
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
