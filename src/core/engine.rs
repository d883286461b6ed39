use rayon::prelude::*;

use super::types::{RatePath, ScenarioSummary, TrajectoryOutcome};

#[derive(Debug, Clone, Copy)]
struct TrajectoryState {
    fund: f64,
    withdrawal: f64,
    depleted: bool,
    depletion_year: Option<u32>,
}

impl TrajectoryState {
    fn new(initial_fund: f64, initial_withdrawal: f64) -> Self {
        Self {
            fund: initial_fund,
            withdrawal: initial_withdrawal,
            depleted: false,
            depletion_year: None,
        }
    }

    /// Growth, then withdrawal, then the depletion check, then inflation for
    /// next year. Balances are never clamped at zero.
    fn advance(&mut self, year: usize, growth: f64, inflation: f64) {
        self.fund *= 1.0 + growth;
        self.fund -= self.withdrawal;
        if self.fund <= 0.0 && !self.depleted {
            self.depleted = true;
            self.depletion_year = Some(year as u32);
        }
        self.withdrawal *= 1.0 + inflation;
    }

    fn outcome(self) -> TrajectoryOutcome {
        TrajectoryOutcome {
            depleted: self.depleted,
            depletion_year: self.depletion_year,
            terminal_fund: self.fund,
        }
    }
}

fn run_trajectory(
    growth: &[f64],
    inflation: &[f64],
    initial_fund: f64,
    initial_withdrawal: f64,
) -> TrajectoryOutcome {
    let mut state = TrajectoryState::new(initial_fund, initial_withdrawal);
    for (year, (&g, &i)) in growth.iter().zip(inflation).enumerate() {
        state.advance(year, g, i);
    }
    state.outcome()
}

/// Propagates every trajectory through the horizon and reports how each one
/// ended. Trajectories run in parallel; results keep row order.
///
/// `growth` and `inflation` must share the same shape.
pub fn run_outcomes(
    growth: &RatePath,
    inflation: &RatePath,
    initial_fund: f64,
    initial_withdrawal: f64,
) -> Vec<TrajectoryOutcome> {
    debug_assert_eq!(growth.rows(), inflation.rows());
    debug_assert_eq!(growth.cols(), inflation.cols());

    (0..growth.rows())
        .into_par_iter()
        .map(|sim| {
            run_trajectory(
                growth.row(sim),
                inflation.row(sim),
                initial_fund,
                initial_withdrawal,
            )
        })
        .collect()
}

/// "Ever depleted" flag per trajectory.
pub fn run_depletion(
    growth: &RatePath,
    inflation: &RatePath,
    initial_fund: f64,
    initial_withdrawal: f64,
) -> Vec<bool> {
    run_outcomes(growth, inflation, initial_fund, initial_withdrawal)
        .into_iter()
        .map(|o| o.depleted)
        .collect()
}

pub fn depletion_probability(depleted: &[bool]) -> f64 {
    if depleted.is_empty() {
        return 0.0;
    }
    depleted.iter().filter(|&&d| d).count() as f64 / depleted.len() as f64
}

pub(crate) fn summarize_outcomes(outcomes: &[TrajectoryOutcome]) -> ScenarioSummary {
    let simulations = outcomes.len() as u32;
    let depleted_count = outcomes.iter().filter(|o| o.depleted).count() as u32;
    let probability = if simulations == 0 {
        0.0
    } else {
        depleted_count as f64 / simulations as f64
    };

    let mut terminal = outcomes.iter().map(|o| o.terminal_fund).collect::<Vec<_>>();
    let mut depletion_years = outcomes
        .iter()
        .filter_map(|o| o.depletion_year.map(f64::from))
        .collect::<Vec<_>>();

    ScenarioSummary {
        probability,
        depleted_count,
        simulations,
        ci_half_width: binomial_ci_half_width(probability, simulations),
        median_terminal_fund: percentile(&mut terminal, 50.0),
        p10_terminal_fund: percentile(&mut terminal, 10.0),
        median_depletion_year: if depletion_years.is_empty() {
            None
        } else {
            Some(percentile(&mut depletion_years, 50.0))
        },
    }
}

/// 95% half-width under the normal approximation to the binomial.
pub fn binomial_ci_half_width(p: f64, n: u32) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let p = p.clamp(0.0, 1.0);
    1.96 * (p * (1.0 - p) / n as f64).sqrt()
}

fn percentile(values: &mut [f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    values.sort_by(|a, b| a.total_cmp(b));

    let n = values.len();
    if n == 1 {
        return values[0];
    }

    let rank = (p / 100.0) * (n as f64 - 1.0);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;

    if lower == upper {
        values[lower]
    } else {
        let w = rank - lower as f64;
        values[lower] * (1.0 - w) + values[upper] * w
    }
}
