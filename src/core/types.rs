use serde::Serialize;

use super::error::SimError;

pub const DEFAULT_SIMULATIONS: u32 = 1_000;
pub const DEFAULT_CRASH_PERCENT: f64 = -20.0;

/// Fixed configuration a [`FundSimulator`](super::FundSimulator) is bound to.
///
/// Means and standard deviations are on the percentage scale (`7.0` is 7%).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationConfig {
    pub years: u32,
    pub initial_fund: f64,
    pub growth_mean: f64,
    pub growth_std: f64,
    pub inflation_mean: f64,
    pub inflation_std: f64,
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), SimError> {
        if self.years == 0 {
            return Err(SimError::invalid("years must be >= 1"));
        }
        if !self.initial_fund.is_finite() || self.initial_fund <= 0.0 {
            return Err(SimError::invalid("initial_fund must be > 0"));
        }
        if !self.growth_mean.is_finite() || !self.inflation_mean.is_finite() {
            return Err(SimError::invalid("distribution means must be finite"));
        }
        for (name, std) in [
            ("growth_std", self.growth_std),
            ("inflation_std", self.inflation_std),
        ] {
            if !std.is_finite() || std <= 0.0 {
                return Err(SimError::invalid(format!("{name} must be > 0")));
            }
        }
        Ok(())
    }
}

/// Inclusive `[min, max]` bound on a sampled rate, in percent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateRange {
    pub min: f64,
    pub max: f64,
}

impl RateRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn validate(&self, name: &str) -> Result<(), SimError> {
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(SimError::invalid(format!("{name} bounds must be finite")));
        }
        if self.min > self.max {
            return Err(SimError::invalid(format!(
                "{name} lower bound {} exceeds upper bound {}",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

impl From<(f64, f64)> for RateRange {
    fn from((min, max): (f64, f64)) -> Self {
        Self { min, max }
    }
}

/// Per-invocation scenario. Build with [`ScenarioParameters::new`] to pick up
/// the documented defaults, then override with the `with_*` setters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScenarioParameters {
    pub initial_withdrawal: f64,
    pub growth_range: RateRange,
    pub inflation_range: RateRange,
    pub simulations: u32,
    pub num_crashes: u32,
    pub crash_percent: f64,
    pub enforce_recovery: bool,
}

impl ScenarioParameters {
    pub fn new(
        initial_withdrawal: f64,
        growth_range: impl Into<RateRange>,
        inflation_range: impl Into<RateRange>,
    ) -> Self {
        Self {
            initial_withdrawal,
            growth_range: growth_range.into(),
            inflation_range: inflation_range.into(),
            simulations: DEFAULT_SIMULATIONS,
            num_crashes: 0,
            crash_percent: DEFAULT_CRASH_PERCENT,
            enforce_recovery: true,
        }
    }

    pub fn with_simulations(mut self, simulations: u32) -> Self {
        self.simulations = simulations;
        self
    }

    pub fn with_crashes(mut self, num_crashes: u32, crash_percent: f64) -> Self {
        self.num_crashes = num_crashes;
        self.crash_percent = crash_percent;
        self
    }

    pub fn with_recovery(mut self, enforce_recovery: bool) -> Self {
        self.enforce_recovery = enforce_recovery;
        self
    }

    pub fn with_withdrawal(mut self, initial_withdrawal: f64) -> Self {
        self.initial_withdrawal = initial_withdrawal;
        self
    }

    pub fn validate(&self) -> Result<(), SimError> {
        if !self.initial_withdrawal.is_finite() || self.initial_withdrawal < 0.0 {
            return Err(SimError::invalid("initial_withdrawal must be >= 0"));
        }
        self.growth_range.validate("growth_range")?;
        self.inflation_range.validate("inflation_range")?;
        if self.simulations == 0 {
            return Err(SimError::invalid("simulations must be >= 1"));
        }
        if !self.crash_percent.is_finite() {
            return Err(SimError::invalid("crash_percent must be finite"));
        }
        Ok(())
    }
}

/// Dense row-major `rows x cols` matrix of fractional annual rates.
/// Rows are trajectories, columns are years.
#[derive(Debug, Clone, PartialEq)]
pub struct RatePath {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl RatePath {
    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> f64) -> Self {
        let mut data = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                data.push(f(r, c));
            }
        }
        Self { rows, cols, data }
    }

    pub fn filled(rows: usize, cols: usize, value: f64) -> Self {
        Self {
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    pub fn row(&self, row: usize) -> &[f64] {
        let start = row * self.cols;
        &self.data[start..start + self.cols]
    }

    pub fn row_mut(&mut self, row: usize) -> &mut [f64] {
        let start = row * self.cols;
        &mut self.data[start..start + self.cols]
    }

    pub fn values(&self) -> &[f64] {
        &self.data
    }
}

/// What happened to one trajectory over the horizon.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectoryOutcome {
    pub depleted: bool,
    /// First year index whose closing balance was `<= 0`.
    pub depletion_year: Option<u32>,
    pub terminal_fund: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioSummary {
    pub probability: f64,
    pub depleted_count: u32,
    pub simulations: u32,
    pub ci_half_width: f64,
    pub median_terminal_fund: f64,
    pub p10_terminal_fund: f64,
    pub median_depletion_year: Option<f64>,
}
