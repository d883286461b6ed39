use rand::Rng;
use serde::Serialize;
use tracing::{debug, info};

use super::error::SimError;
use super::simulator::FundSimulator;
use super::types::ScenarioParameters;

/// Most withdrawal amounts a single sweep axis may expand to.
pub const MAX_WITHDRAWAL_STEPS: usize = 10_000;

/// Inclusive arithmetic range of withdrawal amounts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WithdrawalSteps {
    pub start: f64,
    pub end: f64,
    pub step: f64,
}

impl WithdrawalSteps {
    pub fn expand(&self) -> Result<Vec<f64>, SimError> {
        if !self.start.is_finite() || !self.end.is_finite() || !self.step.is_finite() {
            return Err(SimError::invalid("withdrawal steps must be finite"));
        }
        if self.step <= 0.0 {
            return Err(SimError::invalid("withdrawal step must be > 0"));
        }
        if self.end < self.start {
            return Err(SimError::invalid("withdrawal end must be >= start"));
        }
        // Small slack so an end that lands on a step boundary is kept.
        let intervals = ((self.end - self.start) / self.step + 1e-9).floor();
        if !intervals.is_finite() || intervals >= MAX_WITHDRAWAL_STEPS as f64 {
            return Err(SimError::invalid(format!(
                "withdrawal range expands to more than {MAX_WITHDRAWAL_STEPS} steps"
            )));
        }
        let count = intervals as usize + 1;
        Ok((0..count)
            .map(|i| self.start + self.step * i as f64)
            .collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepGrid {
    pub withdrawals: Vec<f64>,
    pub crash_counts: Vec<u32>,
    pub crash_percents: Vec<f64>,
}

impl SweepGrid {
    pub fn validate(&self) -> Result<(), SimError> {
        if self.withdrawals.is_empty() {
            return Err(SimError::invalid("sweep needs at least one withdrawal"));
        }
        if self.crash_counts.is_empty() {
            return Err(SimError::invalid("sweep needs at least one crash count"));
        }
        if self.crash_percents.is_empty() {
            return Err(SimError::invalid("sweep needs at least one crash percent"));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.withdrawals.len() * self.crash_counts.len() * self.crash_percents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepRow {
    pub withdrawal: f64,
    pub num_crashes: u32,
    pub crash_percent: f64,
    pub probability: f64,
}

/// Runs one simulation per grid cell, withdrawal outermost, then crash count,
/// then crash percent. `base` supplies the ranges, trial count and recovery
/// flag; its withdrawal and crash fields are replaced per cell.
///
/// Every cell draws fresh samples from `rng`.
pub fn run_sweep<R: Rng + ?Sized>(
    simulator: &FundSimulator,
    base: &ScenarioParameters,
    grid: &SweepGrid,
    rng: &mut R,
) -> Result<Vec<SweepRow>, SimError> {
    grid.validate()?;
    info!(cells = grid.len(), simulations = base.simulations, "starting sweep");

    let mut rows = Vec::with_capacity(grid.len());
    for &withdrawal in &grid.withdrawals {
        for &num_crashes in &grid.crash_counts {
            for &crash_percent in &grid.crash_percents {
                let params = base
                    .with_withdrawal(withdrawal)
                    .with_crashes(num_crashes, crash_percent);
                let probability = simulator.simulate(&params, rng)?;
                rows.push(SweepRow {
                    withdrawal,
                    num_crashes,
                    crash_percent,
                    probability,
                });
            }
        }
    }

    debug!(rows = rows.len(), "sweep finished");
    Ok(rows)
}

pub fn format_row(row: &SweepRow) -> String {
    format!(
        "Withdrawal: ${}, Crashes: {}, Crash: {}%, Depletion Probability: {:.2}%",
        row.withdrawal,
        row.num_crashes,
        row.crash_percent,
        row.probability * 100.0
    )
}
