use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use super::crash::{CrashScenario, inject_crashes};
use super::engine::{depletion_probability, run_depletion, run_outcomes, summarize_outcomes};
use super::error::SimError;
use super::sampler::sample_rate_path;
use super::types::{RatePath, ScenarioParameters, ScenarioSummary, SimulationConfig};

/// Monte Carlo estimator of the chance a fund runs dry before the horizon.
///
/// Holds only its configuration; every call samples a fresh batch of rate
/// paths from the supplied random source.
#[derive(Debug, Clone)]
pub struct FundSimulator {
    config: SimulationConfig,
}

impl FundSimulator {
    pub fn new(config: SimulationConfig) -> Result<Self, SimError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Fraction of trajectories that were depleted at any point.
    pub fn simulate<R: Rng + ?Sized>(
        &self,
        params: &ScenarioParameters,
        rng: &mut R,
    ) -> Result<f64, SimError> {
        let (growth, inflation) = self.scenario_paths(params, rng)?;
        let depleted = run_depletion(
            &growth,
            &inflation,
            self.config.initial_fund,
            params.initial_withdrawal,
        );
        let probability = depletion_probability(&depleted);
        debug!(
            withdrawal = params.initial_withdrawal,
            simulations = params.simulations,
            crashes = params.num_crashes,
            probability,
            "scenario simulated"
        );
        Ok(probability)
    }

    pub fn simulate_seeded(&self, params: &ScenarioParameters, seed: u64) -> Result<f64, SimError> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        self.simulate(params, &mut rng)
    }

    /// Same pipeline as [`simulate`](Self::simulate), reduced to a summary
    /// with terminal balances and depletion timing.
    pub fn summarize<R: Rng + ?Sized>(
        &self,
        params: &ScenarioParameters,
        rng: &mut R,
    ) -> Result<ScenarioSummary, SimError> {
        let (growth, inflation) = self.scenario_paths(params, rng)?;
        let outcomes = run_outcomes(
            &growth,
            &inflation,
            self.config.initial_fund,
            params.initial_withdrawal,
        );
        Ok(summarize_outcomes(&outcomes))
    }

    pub fn summarize_seeded(
        &self,
        params: &ScenarioParameters,
        seed: u64,
    ) -> Result<ScenarioSummary, SimError> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        self.summarize(params, &mut rng)
    }

    /// Growth is drawn before inflation, then crashes go into growth only.
    fn scenario_paths<R: Rng + ?Sized>(
        &self,
        params: &ScenarioParameters,
        rng: &mut R,
    ) -> Result<(RatePath, RatePath), SimError> {
        params.validate()?;

        let rows = params.simulations as usize;
        let cols = self.config.years as usize;
        let mut growth = sample_rate_path(
            rng,
            params.growth_range,
            self.config.growth_mean,
            self.config.growth_std,
            rows,
            cols,
        )?;
        let inflation = sample_rate_path(
            rng,
            params.inflation_range,
            self.config.inflation_mean,
            self.config.inflation_std,
            rows,
            cols,
        )?;

        let crashes = CrashScenario {
            num_crashes: params.num_crashes,
            crash_percent: params.crash_percent,
            enforce_recovery: params.enforce_recovery,
        };
        if params.num_crashes > self.config.years {
            debug!(
                requested = params.num_crashes,
                years = self.config.years,
                "crash count capped at horizon"
            );
        }
        inject_crashes(&mut growth, crashes, rng);

        Ok((growth, inflation))
    }
}
