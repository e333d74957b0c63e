//! Experiment Runner for the Scalability Analysis.
//!
//! This executable measures how the pivoted Cholesky factorization of a
//! squared-exponential kernel matrix scales with the number of points, at a fixed
//! rank cap. The kernel matrix is never materialized; rows are evaluated on demand,
//! so memory should grow as O(n · rank) rather than O(n²).
//!
//! The primary process, the "orchestrator," iterates over the problem sizes and
//! spawns an isolated "worker" child process for each one. Every worker runs a
//! single factorization and prints one CSV row to standard output. Running each size
//! in its own process keeps the peak RSS measurements independent of each other.

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use faer::Mat;
use pivoted_cholesky::{
    PivotedCholeskyParams, pivoted_cholesky_operator,
    operator::{KernelMatrix, SquaredExponential},
    utils::perf::get_peak_rss_kb,
};
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use std::{
    process::{Command, Stdio},
    time::Instant,
};

/// Environment variable used to hand the problem size to a worker process.
/// If this is set, the process runs in worker mode.
const WORKER_ENV_VAR: &str = "PIVOTED_CHOLESKY_SCALABILITY_N";

/// Command-line arguments, shared by the orchestrator and its workers.
#[derive(Parser, Debug)]
#[clap(
    name = "scalability-runner",
    about = "Runs the scalability analysis of pivoted Cholesky on kernel matrices."
)]
struct ScalabilityArgs {
    /// The smallest number of points.
    #[clap(long, default_value_t = 1000)]
    n_start: usize,
    /// The largest number of points.
    #[clap(long, default_value_t = 10000)]
    n_end: usize,
    /// The step size for increasing the number of points.
    #[clap(long, default_value_t = 1000)]
    n_step: usize,
    /// Dimension of the random points.
    #[clap(long, default_value_t = 3)]
    features: usize,
    /// Lengthscale of the squared-exponential kernel.
    #[clap(long, default_value_t = 1.0)]
    lengthscale: f64,
    /// The fixed rank cap used for all runs.
    #[clap(long, default_value_t = 100)]
    max_rank: usize,
    /// Tolerance on the residual trace.
    #[clap(long, default_value_t = pivoted_cholesky::DEFAULT_ERR_TOL)]
    err_tol: f64,
    /// Seed for the random point sets.
    #[clap(long, default_value_t = 42)]
    seed: u64,
    /// Path to the output CSV file for storing aggregated results.
    #[clap(long, value_name = "PATH")]
    output: std::path::PathBuf,
}

/// Represents a single row of data in the final output CSV.
#[derive(Debug, Serialize, Deserialize)]
struct ScalabilityResult {
    n: usize,
    rank: usize,
    termination: String,
    trace_error: f64,
    time_s: f64,
    rss_kb: u64,
    /// Size the dense kernel matrix would have taken.
    dense_kb: u64,
    /// Size of the returned factor.
    factor_kb: u64,
}

/// Main entry point.
///
/// Dispatches to either the orchestrator or a worker based on the presence of
/// the worker environment variable.
fn main() -> Result<()> {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logger: {}", e))?;

    if let Ok(n_str) = std::env::var(WORKER_ENV_VAR) {
        let n = n_str
            .parse::<usize>()
            .map_err(|_| anyhow!("Invalid problem size in env var: {}", n_str))?;
        run_worker(n)
    } else {
        run_orchestrator()
    }
}

/// Orchestrator logic.
///
/// Spawns one worker per problem size and appends its CSV row to the output file.
/// Results are flushed after every size so that partial runs are not lost.
fn run_orchestrator() -> Result<()> {
    let args = ScalabilityArgs::parse();
    log::info!("Orchestrator starting scalability experiment: {:?}", &args);

    let mut writer = csv::Writer::from_path(&args.output)
        .with_context(|| format!("Failed to create output file: {:?}", &args.output))?;

    for n in (args.n_start..=args.n_end).step_by(args.n_step.max(1)) {
        log::info!("Spawning worker for n = {n}");
        let current_exe = std::env::current_exe()?;
        let output = Command::new(current_exe)
            .args(std::env::args_os().skip(1))
            .env(WORKER_ENV_VAR, n.to_string())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .output()
            .with_context(|| format!("Failed to run worker for n = {n}"))?;

        if !output.status.success() {
            return Err(anyhow!(
                "Worker process for n = {} failed with status: {}",
                n,
                output.status
            ));
        }

        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(output.stdout.as_slice());
        for result in rdr.deserialize() {
            let record: ScalabilityResult = result?;
            writer.serialize(record)?;
        }
        writer.flush()?;
    }

    log::info!("Experiment complete. Results written to {:?}", &args.output);
    Ok(())
}

/// Worker logic: one factorization of an `n`-point kernel matrix, reported as CSV on stdout.
fn run_worker(n: usize) -> Result<()> {
    let args = ScalabilityArgs::parse();
    log::info!("Worker for n = {n} started.");

    let mut rng = StdRng::seed_from_u64(args.seed);
    let points = Mat::from_fn(n, args.features, |_, _| rng.random_range(0.0..10.0));
    let operator = KernelMatrix::new(points, SquaredExponential::new(args.lengthscale, 1.0));

    let params = PivotedCholeskyParams::new(args.max_rank.min(n)).with_err_tol(args.err_tol);

    let start_time = Instant::now();
    let output = pivoted_cholesky_operator(&operator, &params)?;
    let time_s = start_time.elapsed().as_secs_f64();
    let rss_kb = get_peak_rss_kb();

    let bytes_per_entry = std::mem::size_of::<f64>() as u64;
    let result = ScalabilityResult {
        n,
        rank: output.rank,
        termination: format!("{:?}", output.termination),
        trace_error: output.trace_error,
        time_s,
        rss_kb,
        dense_kb: (n as u64 * n as u64 * bytes_per_entry) / 1024,
        factor_kb: (output.rank as u64 * n as u64 * bytes_per_entry) / 1024,
    };

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(std::io::stdout());
    writer.serialize(result)?;
    writer.flush()?;

    log::info!("Worker for n = {n} finished in {time_s:.3}s.");
    Ok(())
}
