mod crash;
mod engine;
mod error;
mod sampler;
mod simulator;
mod solver;
mod sweep;
mod tax;
mod types;

pub use crash::{CrashScenario, RECOVERY_WINDOW_YEARS, inject_crashes};
pub use engine::{binomial_ci_half_width, depletion_probability, run_depletion, run_outcomes};
pub use error::SimError;
pub use sampler::{
    TruncatedNormal, sample_rate_path, standard_normal_cdf, standard_normal_quantile,
};
pub use simulator::FundSimulator;
pub use solver::{
    WithdrawalSolveConfig, WithdrawalSolveIteration, WithdrawalSolveResult, solve_max_withdrawal,
};
pub use sweep::{
    MAX_WITHDRAWAL_STEPS, SweepGrid, SweepRow, WithdrawalSteps, format_row, run_sweep,
};
pub use tax::{TaxBreakdown, UkTaxBands, uk_income_tax};
pub use types::{
    DEFAULT_CRASH_PERCENT, DEFAULT_SIMULATIONS, RatePath, RateRange, ScenarioParameters,
    ScenarioSummary, SimulationConfig, TrajectoryOutcome,
};
