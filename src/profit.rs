//! Profit estimation from a measured hashrate and a baseline.
//!
//! The baseline gives expected revenue at the expected hashrate; we
//! scale that linearly by the hashrate this rig actually achieved and
//! subtract electricity. Everything here is `Option`-shaped: no
//! measurement or no baseline means no number, never a fake zero.

use crate::baseline::CoinBaseline;

const HOURS_PER_DAY: f64 = 24.0;

#[derive(Debug, Clone, Copy)]
pub struct ProfitModel {
    pub power_draw_watts: f64,
    pub power_cost_usd_kwh: f64,
}

impl ProfitModel {
    pub fn new(power_draw_watts: f64, power_cost_usd_kwh: f64) -> Self {
        Self {
            power_draw_watts,
            power_cost_usd_kwh,
        }
    }

    /// Daily electricity cost in USD for running the rig around the clock.
    pub fn electricity_cost_usd_day(&self) -> f64 {
        self.power_draw_watts / 1000.0 * HOURS_PER_DAY * self.power_cost_usd_kwh
    }

    /// Gross daily revenue: baseline revenue scaled by the ratio of
    /// measured to expected hashrate. `None` when there is nothing to
    /// scale from.
    pub fn gross_usd_day(&self, measured: f64, baseline: &CoinBaseline) -> Option<f64> {
        if baseline.expected_hashrate <= 0.0 {
            return None;
        }
        Some(baseline.revenue_usd_day * (measured / baseline.expected_hashrate))
    }

    /// Net daily profit in USD, which can go negative when electricity
    /// outruns revenue.
    pub fn net_usd_day(
        &self,
        measured: Option<f64>,
        baseline: Option<&CoinBaseline>,
    ) -> Option<f64> {
        let measured = measured?;
        let baseline = baseline?;
        let gross = self.gross_usd_day(measured, baseline)?;
        Some(gross - self.electricity_cost_usd_day())
    }
}

/// Percentage deviation of the measured hashrate from the expected one.
/// Positive means the rig beat the baseline.
pub fn deviation_percent(measured: f64, expected: f64) -> Option<f64> {
    if expected <= 0.0 {
        return None;
    }
    Some((measured - expected) / expected * 100.0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
