use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::{Parser, ValueEnum};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

use crate::core::{
    FundSimulator, RateRange, ScenarioParameters, ScenarioSummary, SimulationConfig, SweepGrid,
    SweepRow, TaxBreakdown, UkTaxBands, WithdrawalSolveConfig, WithdrawalSolveResult,
    WithdrawalSteps, format_row, run_sweep, solve_max_withdrawal,
};

/// Upper bound on `simulations * years` for one scenario; each rate path is
/// a dense matrix of that many cells.
const MAX_PATH_CELLS: u64 = 20_000_000;
/// Upper bound on withdrawal x crash-count x crash-percent cells in a sweep.
const MAX_SWEEP_CELLS: usize = 10_000;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliMode {
    /// Probability for every withdrawal x crash-count x crash-percent cell
    Sweep,
    /// One scenario with summary statistics
    Simulate,
    /// Largest withdrawal meeting the target depletion probability
    Solve,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ScenarioPayload {
    years: Option<u32>,
    initial_fund: Option<f64>,
    growth_mean: Option<f64>,
    growth_std: Option<f64>,
    inflation_mean: Option<f64>,
    inflation_std: Option<f64>,

    growth_min: Option<f64>,
    growth_max: Option<f64>,
    inflation_min: Option<f64>,
    inflation_max: Option<f64>,
    simulations: Option<u32>,
    seed: Option<u64>,

    withdrawal: Option<f64>,
    num_crashes: Option<u32>,
    crash_percent: Option<f64>,
    enforce_recovery: Option<bool>,

    withdrawal_start: Option<f64>,
    withdrawal_end: Option<f64>,
    withdrawal_step: Option<f64>,
    crash_counts: Option<Vec<u32>>,
    crash_percents: Option<Vec<f64>>,

    target_probability: Option<f64>,
    search_max: Option<f64>,
    tolerance: Option<f64>,
    max_iterations: Option<u32>,
    solve_simulations: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct TaxQuery {
    income: f64,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "fundsim",
    about = "Monte Carlo estimate of retirement fund depletion under crashes and inflation"
)]
pub struct Cli {
    #[arg(long, value_enum, default_value_t = CliMode::Sweep)]
    mode: CliMode,
    #[arg(long, default_value_t = 30, help = "Withdrawal horizon in years")]
    years: u32,
    #[arg(long, default_value_t = 100000.0)]
    initial_fund: f64,
    #[arg(long, default_value_t = 7.0, help = "Mean annual growth in percent")]
    growth_mean: f64,
    #[arg(long, default_value_t = 10.0, help = "Growth standard deviation in percent")]
    growth_std: f64,
    #[arg(long, default_value_t = 2.5, help = "Mean annual inflation in percent")]
    inflation_mean: f64,
    #[arg(
        long,
        default_value_t = 3.0,
        help = "Inflation standard deviation in percent"
    )]
    inflation_std: f64,
    #[arg(long, default_value_t = -20.0, allow_negative_numbers = true)]
    growth_min: f64,
    #[arg(long, default_value_t = 20.0, allow_negative_numbers = true)]
    growth_max: f64,
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    inflation_min: f64,
    #[arg(long, default_value_t = 10.0, allow_negative_numbers = true)]
    inflation_max: f64,
    #[arg(
        long,
        default_value_t = 1000,
        help = "Trajectories per scenario; 100000 gives smooth curves at much higher cost"
    )]
    simulations: u32,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    #[arg(long, help = "Disable the forced recovery years after each crash")]
    no_recovery: bool,

    #[arg(long, default_value_t = 4000.0, help = "First-year withdrawal (simulate mode)")]
    withdrawal: f64,
    #[arg(long, default_value_t = 0, help = "Crashes per trajectory (simulate and solve modes)")]
    num_crashes: u32,
    #[arg(long, default_value_t = -20.0, allow_negative_numbers = true)]
    crash_percent: f64,

    #[arg(long, default_value_t = 2000.0)]
    withdrawal_start: f64,
    #[arg(long, default_value_t = 5000.0)]
    withdrawal_end: f64,
    #[arg(long, default_value_t = 100.0)]
    withdrawal_step: f64,
    #[arg(long, value_delimiter = ',', default_values_t = [2_u32, 3, 4])]
    crash_counts: Vec<u32>,
    #[arg(
        long,
        value_delimiter = ',',
        allow_negative_numbers = true,
        default_values_t = [-5.0, -10.0, -15.0]
    )]
    crash_percents: Vec<f64>,

    #[arg(
        long,
        default_value_t = 10.0,
        help = "Highest acceptable depletion probability in percent (solve mode)"
    )]
    target_probability: f64,
    #[arg(long, default_value_t = 20000.0)]
    search_max: f64,
    #[arg(long, default_value_t = 10.0, help = "Solver stops when the bracket is this narrow")]
    tolerance: f64,
    #[arg(long, default_value_t = 40)]
    max_iterations: u32,
    #[arg(long, default_value_t = 2000, help = "Trajectories per solver iteration")]
    solve_simulations: u32,
}

#[derive(Debug, Clone)]
struct RunConfig {
    simulator: FundSimulator,
    scenario: ScenarioParameters,
    withdrawal_steps: WithdrawalSteps,
    crash_counts: Vec<u32>,
    crash_percents: Vec<f64>,
    solve: WithdrawalSolveConfig,
    seed: u64,
}

impl RunConfig {
    /// Expands and checks the sweep axes. Only sweep runs call this.
    fn sweep_grid(&self) -> Result<SweepGrid, String> {
        let grid = SweepGrid {
            withdrawals: self.withdrawal_steps.expand().map_err(|e| e.to_string())?,
            crash_counts: self.crash_counts.clone(),
            crash_percents: self.crash_percents.clone(),
        };
        grid.validate().map_err(|e| e.to_string())?;
        if grid.len() > MAX_SWEEP_CELLS {
            return Err(format!(
                "sweep has {} cells; at most {MAX_SWEEP_CELLS} are allowed",
                grid.len()
            ));
        }
        Ok(grid)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateResponse {
    seed: u64,
    withdrawal: f64,
    num_crashes: u32,
    crash_percent: f64,
    enforce_recovery: bool,
    #[serde(flatten)]
    summary: ScenarioSummary,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SweepResponse {
    seed: u64,
    simulations: u32,
    enforce_recovery: bool,
    rows: Vec<SweepRow>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TaxResponse {
    income: f64,
    bands: UkTaxBands,
    #[serde(flatten)]
    breakdown: TaxBreakdown,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn build_run_config(cli: &Cli) -> Result<RunConfig, String> {
    if cli.years == 0 {
        return Err("--years must be > 0".to_string());
    }
    if cli.simulations == 0 {
        return Err("--simulations must be > 0".to_string());
    }
    if cli.growth_min > cli.growth_max {
        return Err("--growth-min cannot exceed --growth-max".to_string());
    }
    if cli.inflation_min > cli.inflation_max {
        return Err("--inflation-min cannot exceed --inflation-max".to_string());
    }
    if !cli.withdrawal.is_finite() || cli.withdrawal < 0.0 {
        return Err("--withdrawal must be >= 0".to_string());
    }
    if !(0.0..=100.0).contains(&cli.target_probability) {
        return Err("--target-probability must be between 0 and 100".to_string());
    }
    if cli.solve_simulations == 0 {
        return Err("--solve-simulations must be > 0".to_string());
    }
    let trials = u64::from(cli.simulations.max(cli.solve_simulations));
    if trials * u64::from(cli.years) > MAX_PATH_CELLS {
        return Err(format!("simulations x years must not exceed {MAX_PATH_CELLS}"));
    }

    let simulator = FundSimulator::new(SimulationConfig {
        years: cli.years,
        initial_fund: cli.initial_fund,
        growth_mean: cli.growth_mean,
        growth_std: cli.growth_std,
        inflation_mean: cli.inflation_mean,
        inflation_std: cli.inflation_std,
    })
    .map_err(|e| e.to_string())?;

    let scenario = ScenarioParameters::new(
        cli.withdrawal,
        RateRange::new(cli.growth_min, cli.growth_max),
        RateRange::new(cli.inflation_min, cli.inflation_max),
    )
    .with_simulations(cli.simulations)
    .with_crashes(cli.num_crashes, cli.crash_percent)
    .with_recovery(!cli.no_recovery);
    scenario.validate().map_err(|e| e.to_string())?;

    let solve = WithdrawalSolveConfig {
        target_probability: cli.target_probability / 100.0,
        search_min: 0.0,
        search_max: cli.search_max,
        tolerance: cli.tolerance,
        max_iterations: cli.max_iterations,
        simulations_per_iteration: cli.solve_simulations,
        final_simulations: cli.solve_simulations,
        seed: cli.seed,
    };

    Ok(RunConfig {
        simulator,
        scenario,
        withdrawal_steps: WithdrawalSteps {
            start: cli.withdrawal_start,
            end: cli.withdrawal_end,
            step: cli.withdrawal_step,
        },
        crash_counts: cli.crash_counts.clone(),
        crash_percents: cli.crash_percents.clone(),
        solve,
        seed: cli.seed,
    })
}

/// Parses `args` and runs the selected mode, printing results to stdout.
pub fn run_cli<I, T>(args: I) -> Result<(), String>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    let run = build_run_config(&cli)?;

    match cli.mode {
        CliMode::Sweep => {
            let grid = run.sweep_grid()?;
            let rows = sweep_rows(&run, &grid)?;
            for row in &rows {
                println!("{}", format_row(row));
            }
        }
        CliMode::Simulate => {
            let summary = run
                .simulator
                .summarize_seeded(&run.scenario, run.seed)
                .map_err(|e| e.to_string())?;
            println!(
                "Withdrawal: ${}, Crashes: {}, Crash: {}%, Depletion Probability: {:.2}% (+/- {:.2}%)",
                run.scenario.initial_withdrawal,
                run.scenario.num_crashes,
                run.scenario.crash_percent,
                summary.probability * 100.0,
                summary.ci_half_width * 100.0
            );
            println!(
                "Median terminal fund: {:.0}, P10 terminal fund: {:.0}",
                summary.median_terminal_fund, summary.p10_terminal_fund
            );
            if let Some(year) = summary.median_depletion_year {
                println!("Median depletion year (depleted runs): {year:.1}");
            }
        }
        CliMode::Solve => {
            let result = solve_max_withdrawal(&run.simulator, &run.scenario, run.solve)
                .map_err(|e| e.to_string())?;
            println!("{}", result.message);
            if let (Some(withdrawal), Some(p)) =
                (result.solved_withdrawal, result.achieved_probability)
            {
                println!(
                    "Max withdrawal: ${withdrawal:.0}, Depletion Probability: {:.2}%",
                    p * 100.0
                );
            }
        }
    }
    Ok(())
}

fn sweep_rows(run: &RunConfig, grid: &SweepGrid) -> Result<Vec<SweepRow>, String> {
    let mut rng = ChaCha8Rng::seed_from_u64(run.seed);
    run_sweep(&run.simulator, &run.scenario, grid, &mut rng).map_err(|e| e.to_string())
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = router();

    let listener = TcpListener::bind(addr).await?;
    info!("fundsim HTTP API listening on http://{addr}");
    info!("Local access: http://127.0.0.1:{port}/api/simulate");

    axum::serve(listener, app).await
}

fn router() -> Router {
    Router::new()
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .route("/api/sweep", post(sweep_handler))
        .route("/api/solve", post(solve_handler))
        .route("/api/tax", get(tax_handler))
        .fallback(not_found_handler)
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn simulate_get_handler(Query(payload): Query<ScenarioPayload>) -> Response {
    simulate_handler_impl(payload).await
}

async fn simulate_post_handler(Json(payload): Json<ScenarioPayload>) -> Response {
    simulate_handler_impl(payload).await
}

async fn simulate_handler_impl(payload: ScenarioPayload) -> Response {
    let run = match run_config_from_payload(payload) {
        Ok(run) => run,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    let result = blocking(move || {
        let summary = run
            .simulator
            .summarize_seeded(&run.scenario, run.seed)
            .map_err(|e| e.to_string())?;
        Ok(SimulateResponse {
            seed: run.seed,
            withdrawal: run.scenario.initial_withdrawal,
            num_crashes: run.scenario.num_crashes,
            crash_percent: run.scenario.crash_percent,
            enforce_recovery: run.scenario.enforce_recovery,
            summary,
        })
    })
    .await;
    respond(result)
}

async fn sweep_handler(Json(payload): Json<ScenarioPayload>) -> Response {
    let (run, grid) = match run_config_from_payload(payload)
        .and_then(|run| run.sweep_grid().map(|grid| (run, grid)))
    {
        Ok(parts) => parts,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    let result = blocking(move || {
        let rows = sweep_rows(&run, &grid)?;
        Ok(SweepResponse {
            seed: run.seed,
            simulations: run.scenario.simulations,
            enforce_recovery: run.scenario.enforce_recovery,
            rows,
        })
    })
    .await;
    respond(result)
}

async fn solve_handler(Json(payload): Json<ScenarioPayload>) -> Response {
    let run = match run_config_from_payload(payload) {
        Ok(run) => run,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    let result: Result<WithdrawalSolveResult, String> = blocking(move || {
        solve_max_withdrawal(&run.simulator, &run.scenario, run.solve).map_err(|e| e.to_string())
    })
    .await;
    respond(result)
}

async fn tax_handler(Query(query): Query<TaxQuery>) -> Response {
    if !query.income.is_finite() {
        return error_response(StatusCode::BAD_REQUEST, "income must be finite");
    }
    let bands = UkTaxBands::default();
    json_response(
        StatusCode::OK,
        TaxResponse {
            income: query.income,
            bands,
            breakdown: bands.breakdown(query.income),
        },
    )
}

/// Simulations are CPU-bound; keep them off the async workers.
async fn blocking<T, F>(f: F) -> Result<T, String>
where
    F: FnOnce() -> Result<T, String> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| format!("simulation task failed: {e}"))?
}

fn respond<T: Serialize>(result: Result<T, String>) -> Response {
    match result {
        Ok(body) => json_response(StatusCode::OK, body),
        Err(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

fn default_cli() -> Result<Cli, String> {
    Cli::try_parse_from(["fundsim"]).map_err(|e| e.to_string())
}

#[cfg(test)]
fn run_config_from_json(json: &str) -> Result<RunConfig, String> {
    let payload = serde_json::from_str::<ScenarioPayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    run_config_from_payload(payload)
}

fn run_config_from_payload(payload: ScenarioPayload) -> Result<RunConfig, String> {
    let mut cli = default_cli()?;

    if let Some(v) = payload.years {
        cli.years = v;
    }
    if let Some(v) = payload.initial_fund {
        cli.initial_fund = v;
    }
    if let Some(v) = payload.growth_mean {
        cli.growth_mean = v;
    }
    if let Some(v) = payload.growth_std {
        cli.growth_std = v;
    }
    if let Some(v) = payload.inflation_mean {
        cli.inflation_mean = v;
    }
    if let Some(v) = payload.inflation_std {
        cli.inflation_std = v;
    }
    if let Some(v) = payload.growth_min {
        cli.growth_min = v;
    }
    if let Some(v) = payload.growth_max {
        cli.growth_max = v;
    }
    if let Some(v) = payload.inflation_min {
        cli.inflation_min = v;
    }
    if let Some(v) = payload.inflation_max {
        cli.inflation_max = v;
    }
    if let Some(v) = payload.simulations {
        cli.simulations = v;
    }
    if let Some(v) = payload.seed {
        cli.seed = v;
    }
    if let Some(v) = payload.withdrawal {
        cli.withdrawal = v;
    }
    if let Some(v) = payload.num_crashes {
        cli.num_crashes = v;
    }
    if let Some(v) = payload.crash_percent {
        cli.crash_percent = v;
    }
    if let Some(v) = payload.enforce_recovery {
        cli.no_recovery = !v;
    }
    if let Some(v) = payload.withdrawal_start {
        cli.withdrawal_start = v;
    }
    if let Some(v) = payload.withdrawal_end {
        cli.withdrawal_end = v;
    }
    if let Some(v) = payload.withdrawal_step {
        cli.withdrawal_step = v;
    }
    if let Some(v) = payload.crash_counts {
        cli.crash_counts = v;
    }
    if let Some(v) = payload.crash_percents {
        cli.crash_percents = v;
    }
    if let Some(v) = payload.target_probability {
        cli.target_probability = v;
    }
    if let Some(v) = payload.search_max {
        cli.search_max = v;
    }
    if let Some(v) = payload.tolerance {
        cli.tolerance = v;
    }
    if let Some(v) = payload.max_iterations {
        cli.max_iterations = v;
    }
    if let Some(v) = payload.solve_simulations {
        cli.solve_simulations = v;
    }

    build_run_config(&cli)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn sample_cli() -> Cli {
        default_cli().expect("defaults parse")
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body readable");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[test]
    fn defaults_mirror_reference_driver() {
        let run = build_run_config(&sample_cli()).expect("valid defaults");
        let config = run.simulator.config();
        assert_eq!(config.years, 30);
        assert_approx(config.initial_fund, 100_000.0);
        assert_approx(config.growth_mean, 7.0);
        assert_approx(config.inflation_std, 3.0);
        assert_eq!(run.scenario.growth_range, RateRange::new(-20.0, 20.0));
        assert_eq!(run.scenario.inflation_range, RateRange::new(0.0, 10.0));
        assert_eq!(run.scenario.simulations, 1_000);
        assert!(run.scenario.enforce_recovery);
        let grid = run.sweep_grid().expect("default grid");
        assert_eq!(grid.withdrawals.len(), 31);
        assert_eq!(grid.crash_counts, vec![2, 3, 4]);
        assert_eq!(grid.crash_percents, vec![-5.0, -10.0, -15.0]);
        assert_approx(run.solve.target_probability, 0.10);
    }

    #[test]
    fn negative_flags_parse() {
        let cli = Cli::try_parse_from([
            "fundsim",
            "--growth-min",
            "-30",
            "--crash-percent",
            "-25",
            "--crash-percents=-1,-2",
            "--no-recovery",
            "--mode",
            "simulate",
        ])
        .expect("parses");
        let run = build_run_config(&cli).expect("valid");
        assert_eq!(run.scenario.growth_range.min, -30.0);
        assert_eq!(run.scenario.crash_percent, -25.0);
        assert_eq!(run.crash_percents, vec![-1.0, -2.0]);
        assert!(!run.scenario.enforce_recovery);
        assert_eq!(cli.mode, CliMode::Simulate);
    }

    #[test]
    fn build_run_config_rejects_inverted_growth_range() {
        let mut cli = sample_cli();
        cli.growth_min = 25.0;
        let err = build_run_config(&cli).expect_err("must reject inverted range");
        assert!(err.contains("--growth-min"));
    }

    #[test]
    fn build_run_config_rejects_zero_simulations() {
        let mut cli = sample_cli();
        cli.simulations = 0;
        let err = build_run_config(&cli).expect_err("must reject zero simulations");
        assert!(err.contains("--simulations"));
    }

    #[test]
    fn build_run_config_surfaces_core_validation() {
        let mut cli = sample_cli();
        cli.growth_std = 0.0;
        let err = build_run_config(&cli).expect_err("std must be positive");
        assert!(err.contains("growth_std"));
    }

    #[test]
    fn build_run_config_rejects_oversized_paths() {
        let mut cli = sample_cli();
        cli.simulations = u32::MAX;
        let err = build_run_config(&cli).expect_err("path matrix too large");
        assert!(err.contains("simulations x years"));

        let mut cli = sample_cli();
        cli.solve_simulations = 1_000_000;
        assert!(build_run_config(&cli).is_err());
    }

    #[test]
    fn bad_sweep_axis_only_rejects_sweeps() {
        let mut cli = sample_cli();
        cli.withdrawal_step = 1e-12;
        let run = build_run_config(&cli).expect("simulate and solve ignore the grid");
        let err = run.sweep_grid().expect_err("axis too long");
        assert!(err.contains("steps"));

        cli.withdrawal_step = 0.0;
        let run = build_run_config(&cli).expect("still valid outside sweep mode");
        assert!(run.sweep_grid().is_err());
    }

    #[test]
    fn sweep_grid_rejects_too_many_cells() {
        let mut cli = sample_cli();
        cli.withdrawal_start = 0.0;
        cli.withdrawal_end = 5_000.0;
        cli.withdrawal_step = 1.0;
        cli.crash_counts = vec![1, 2, 3];
        let run = build_run_config(&cli).expect("valid run");
        let err = run.sweep_grid().expect_err("5001 x 3 x 3 cells");
        assert!(err.contains("cells"));
    }

    #[test]
    fn run_config_from_json_overlays_defaults() {
        let json = r#"{
          "years": 25,
          "initialFund": 250000,
          "withdrawal": 9000,
          "numCrashes": 2,
          "crashPercent": -30,
          "enforceRecovery": false,
          "simulations": 200,
          "seed": 9,
          "crashCounts": [1, 5],
          "targetProbability": 5
        }"#;
        let run = run_config_from_json(json).expect("valid payload");
        assert_eq!(run.simulator.config().years, 25);
        assert_approx(run.simulator.config().initial_fund, 250_000.0);
        assert_approx(run.scenario.initial_withdrawal, 9_000.0);
        assert_eq!(run.scenario.num_crashes, 2);
        assert_approx(run.scenario.crash_percent, -30.0);
        assert!(!run.scenario.enforce_recovery);
        assert_eq!(run.scenario.simulations, 200);
        assert_eq!(run.seed, 9);
        assert_eq!(run.crash_counts, vec![1, 5]);
        assert_approx(run.solve.target_probability, 0.05);
        // Untouched fields keep CLI defaults.
        assert_approx(run.simulator.config().growth_mean, 7.0);
    }

    #[test]
    fn run_config_from_json_rejects_bad_types() {
        let err = run_config_from_json(r#"{"years": "thirty"}"#).expect_err("bad json");
        assert!(err.contains("Invalid API JSON payload"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn simulate_endpoint_returns_probability() {
        let payload = ScenarioPayload {
            simulations: Some(200),
            num_crashes: Some(3),
            crash_percent: Some(-15.0),
            ..Default::default()
        };
        let response = simulate_handler_impl(payload).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).map(|v| v.as_bytes()),
            Some(&b"no-store"[..])
        );
        let body = body_json(response).await;
        let p = body["probability"].as_f64().expect("probability");
        assert!((0.0..=1.0).contains(&p));
        assert_eq!(body["simulations"].as_u64(), Some(200));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn simulate_endpoint_rejects_invalid_range() {
        let payload = ScenarioPayload {
            inflation_min: Some(12.0),
            ..Default::default()
        };
        let response = simulate_handler_impl(payload).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(
            body["error"]
                .as_str()
                .expect("error message")
                .contains("--inflation-min")
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sweep_endpoint_returns_grid_rows() {
        let payload = ScenarioPayload {
            simulations: Some(50),
            withdrawal_start: Some(3_000.0),
            withdrawal_end: Some(4_000.0),
            withdrawal_step: Some(500.0),
            crash_counts: Some(vec![1]),
            crash_percents: Some(vec![-10.0, -20.0]),
            ..Default::default()
        };
        let response = sweep_handler(Json(payload)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let rows = body["rows"].as_array().expect("rows");
        assert_eq!(rows.len(), 6);
        assert_approx(rows[0]["withdrawal"].as_f64().expect("withdrawal"), 3_000.0);
        assert_approx(rows[1]["crashPercent"].as_f64().expect("percent"), -20.0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sweep_endpoint_rejects_huge_withdrawal_axis() {
        let payload = ScenarioPayload {
            withdrawal_step: Some(1e-12),
            ..Default::default()
        };
        let response = sweep_handler(Json(payload)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().expect("error message").contains("steps"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn simulate_endpoint_rejects_huge_path_matrix() {
        let payload = ScenarioPayload {
            simulations: Some(u32::MAX),
            ..Default::default()
        };
        let response = simulate_handler_impl(payload).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn tax_endpoint_reports_breakdown() {
        let response = tax_handler(Query(TaxQuery { income: 60_000.0 })).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let expected = 37_700.0 * 0.20 + (60_000.0 - 12_570.0 - 37_700.0) * 0.40;
        assert_approx(body["total"].as_f64().expect("total"), expected);
        assert_approx(
            body["bands"]["personalAllowance"].as_f64().expect("allowance"),
            12_570.0,
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unknown_route_is_json_404() {
        let response = not_found_handler().await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Not found");
    }
}
