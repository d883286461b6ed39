use serde::Serialize;
use tracing::{debug, info};

use super::engine::binomial_ci_half_width;
use super::error::SimError;
use super::simulator::FundSimulator;
use super::types::ScenarioParameters;

#[derive(Debug, Clone, Copy)]
pub struct WithdrawalSolveConfig {
    /// Highest acceptable depletion probability, in `[0, 1]`.
    pub target_probability: f64,
    pub search_min: f64,
    pub search_max: f64,
    pub tolerance: f64,
    pub max_iterations: u32,
    pub simulations_per_iteration: u32,
    pub final_simulations: u32,
    pub seed: u64,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalSolveIteration {
    pub iteration: u32,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub candidate_value: f64,
    pub probability: f64,
    pub probability_ci_half_width: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalSolveResult {
    pub target_probability: f64,
    pub search_min: f64,
    pub search_max: f64,
    pub solved_withdrawal: Option<f64>,
    pub achieved_probability: Option<f64>,
    pub achieved_probability_ci_half_width: Option<f64>,
    pub iterations: Vec<WithdrawalSolveIteration>,
    pub converged: bool,
    pub feasible: bool,
    pub message: String,
}

#[derive(Debug, Clone, Copy)]
struct CandidateEval {
    probability: f64,
    probability_ci_half_width: f64,
}

/// Bisects for the largest initial withdrawal whose depletion probability
/// stays at or below the target.
///
/// Every candidate is evaluated with the same seed, so all candidates see the
/// same rate paths and the probability is monotone in the withdrawal.
pub fn solve_max_withdrawal(
    simulator: &FundSimulator,
    base: &ScenarioParameters,
    config: WithdrawalSolveConfig,
) -> Result<WithdrawalSolveResult, SimError> {
    validate_config(config)?;
    base.validate()?;

    let meets = |eval: CandidateEval| eval.probability <= config.target_probability + 1e-12;

    let mut iterations = Vec::with_capacity(config.max_iterations as usize);
    let low_eval = evaluate_candidate(simulator, base, config, config.search_min)?;
    let high_eval = evaluate_candidate(simulator, base, config, config.search_max)?;

    let mut solved_withdrawal = None;
    let mut converged = false;
    let feasible;
    let message;

    if !meets(low_eval) {
        feasible = false;
        message = "No withdrawal within the search bounds meets the target.".to_string();
    } else if meets(high_eval) {
        solved_withdrawal = Some(config.search_max);
        converged = true;
        feasible = true;
        message = "Upper withdrawal bound still meets the target; increase search max."
            .to_string();
    } else {
        let mut lo = config.search_min;
        let mut hi = config.search_max;
        let mut it = 0;
        while it < config.max_iterations {
            it += 1;
            let mid = (lo + hi) * 0.5;
            let eval = evaluate_candidate(simulator, base, config, mid)?;
            iterations.push(WithdrawalSolveIteration {
                iteration: it,
                lower_bound: lo,
                upper_bound: hi,
                candidate_value: mid,
                probability: eval.probability,
                probability_ci_half_width: eval.probability_ci_half_width,
            });
            debug!(iteration = it, candidate = mid, probability = eval.probability);

            if meets(eval) {
                lo = mid;
            } else {
                hi = mid;
            }

            if (hi - lo).abs() <= config.tolerance {
                converged = true;
                break;
            }
        }
        solved_withdrawal = Some(lo);
        feasible = true;
        message = if converged {
            "Solved maximum sustainable withdrawal.".to_string()
        } else {
            "Reached max iterations before tolerance was met; returning best estimate."
                .to_string()
        };
    }

    let mut achieved_probability = None;
    let mut achieved_probability_ci_half_width = None;
    if let Some(value) = solved_withdrawal {
        let final_eval = evaluate_candidate(
            simulator,
            base,
            WithdrawalSolveConfig {
                simulations_per_iteration: config.final_simulations,
                ..config
            },
            value,
        )?;
        achieved_probability = Some(final_eval.probability);
        achieved_probability_ci_half_width = Some(final_eval.probability_ci_half_width);
    }

    info!(
        feasible,
        converged,
        withdrawal = solved_withdrawal,
        iterations = iterations.len(),
        "withdrawal solve finished"
    );

    Ok(WithdrawalSolveResult {
        target_probability: config.target_probability,
        search_min: config.search_min,
        search_max: config.search_max,
        solved_withdrawal,
        achieved_probability,
        achieved_probability_ci_half_width,
        iterations,
        converged,
        feasible,
        message,
    })
}

fn evaluate_candidate(
    simulator: &FundSimulator,
    base: &ScenarioParameters,
    config: WithdrawalSolveConfig,
    withdrawal: f64,
) -> Result<CandidateEval, SimError> {
    let simulations = config.simulations_per_iteration.max(1);
    let params = base
        .with_withdrawal(withdrawal.max(0.0))
        .with_simulations(simulations);
    let probability = simulator.simulate_seeded(&params, config.seed)?;
    Ok(CandidateEval {
        probability,
        probability_ci_half_width: binomial_ci_half_width(probability, simulations),
    })
}

fn validate_config(config: WithdrawalSolveConfig) -> Result<(), SimError> {
    if !(0.0..=1.0).contains(&config.target_probability) {
        return Err(SimError::invalid("target_probability must be between 0 and 1"));
    }
    if !config.search_min.is_finite() || !config.search_max.is_finite() {
        return Err(SimError::invalid("search bounds must be finite"));
    }
    if config.search_min < 0.0 {
        return Err(SimError::invalid("search_min must be >= 0"));
    }
    if config.search_max <= config.search_min {
        return Err(SimError::invalid("search_max must be greater than search_min"));
    }
    if !config.tolerance.is_finite() || config.tolerance <= 0.0 {
        return Err(SimError::invalid("tolerance must be > 0"));
    }
    if config.max_iterations == 0 {
        return Err(SimError::invalid("max_iterations must be > 0"));
    }
    if config.simulations_per_iteration == 0 {
        return Err(SimError::invalid("simulations_per_iteration must be > 0"));
    }
    if config.final_simulations == 0 {
        return Err(SimError::invalid("final_simulations must be > 0"));
    }
    Ok(())
}
