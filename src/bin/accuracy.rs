//! Experiment Runner for the Rank vs. Accuracy Analysis.
//!
//! This executable factorizes a symmetric PSD test operator for a sweep of rank caps
//! and records how the residual trace and the relative Frobenius error of `RᵀR`
//! decay with the rank. Three operator sources are available:
//!
//! - `gram`: `A = SᵀS` for a random `features × n` matrix `S` (exact rank `features`);
//! - `rbf`: a squared-exponential kernel matrix over random points, evaluated row by
//!   row on demand and never stored by the factorization;
//! - `file`: a dense symmetric matrix loaded from a headerless CSV file.
//!
//! The dense matrix is only materialized by this runner to measure the error.

use anyhow::{Context, Result, anyhow};
use clap::{Parser, ValueEnum};
use faer::Mat;
use pivoted_cholesky::{
    PivotedCholeskyParams, pivoted_cholesky_operator,
    operator::{DiagonalSource, KernelMatrix, RowSource, SquaredExponential},
    utils::data_loader::load_symmetric_matrix,
};
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::Serialize;
use std::{path::PathBuf, time::Instant};

/// Where the test operator comes from.
#[derive(ValueEnum, Clone, Debug, Copy)]
enum OperatorSource {
    /// Gram matrix of a random factor, with known exact rank.
    Gram,
    /// Squared-exponential kernel matrix over random points.
    Rbf,
    /// Dense symmetric matrix read from `--input`.
    File,
}

/// Command-line arguments for the accuracy experiment.
#[derive(Parser, Debug)]
#[clap(
    name = "accuracy-runner",
    about = "Runs a rank vs. accuracy sweep of the pivoted Cholesky approximation."
)]
struct AccuracyArgs {
    /// The test operator.
    #[clap(long, value_enum, default_value_t = OperatorSource::Gram)]
    source: OperatorSource,

    /// Dimension of the generated operator (ignored for `file`).
    #[clap(long, default_value_t = 200)]
    n: usize,

    /// Rows of the random factor (`gram`) or point dimension (`rbf`).
    #[clap(long, default_value_t = 50)]
    features: usize,

    /// Lengthscale of the squared-exponential kernel.
    #[clap(long, default_value_t = 1.0)]
    lengthscale: f64,

    /// Diagonal nugget added to the kernel matrix.
    #[clap(long, default_value_t = 0.0)]
    jitter: f64,

    /// Path to the CSV matrix for the `file` source.
    #[clap(long, value_name = "PATH")]
    input: Option<PathBuf>,

    /// Seed for the random test problems.
    #[clap(long, default_value_t = 42)]
    seed: u64,

    /// Smallest rank cap to test.
    #[clap(long, default_value_t = 5)]
    rank_min: usize,

    /// Largest rank cap to test (clamped to the operator dimension).
    #[clap(long, default_value_t = 100)]
    rank_max: usize,

    /// Step size for iterating the rank cap.
    #[clap(long, default_value_t = 5)]
    rank_step: usize,

    /// Tolerance on the residual trace.
    #[clap(long, default_value_t = pivoted_cholesky::DEFAULT_ERR_TOL)]
    err_tol: f64,

    /// Path to the output CSV file where results will be written.
    #[clap(long, value_name = "PATH")]
    output: PathBuf,
}

/// Represents a single row of data for the accuracy analysis CSV.
#[derive(Debug, Serialize)]
struct AccuracyResult {
    /// The rank cap passed to the factorization.
    max_rank: usize,
    /// The number of rows of the returned factor.
    rank: usize,
    /// Why the run stopped.
    termination: String,
    /// Trace of the residual `A - RᵀR` as tracked by the algorithm.
    trace_error: f64,
    /// `‖A - RᵀR‖_F / ‖A‖_F`, computed against the dense matrix.
    relative_frobenius_error: f64,
    /// Wall-clock time of the factorization.
    time_s: f64,
}

fn main() -> Result<()> {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logger: {}", e))?;

    let args = AccuracyArgs::parse();
    log::info!("Starting accuracy sweep with parameters: {:?}", &args);

    let results = match args.source {
        OperatorSource::Gram => {
            let a = random_gram_matrix(args.n, args.features, args.seed);
            run_sweep(&a, &a, &args)?
        }
        OperatorSource::Rbf => {
            let mut rng = StdRng::seed_from_u64(args.seed);
            let points = Mat::from_fn(args.n, args.features, |_, _| rng.random_range(0.0..10.0));
            let operator = KernelMatrix::new(
                points,
                SquaredExponential::new(args.lengthscale, 1.0),
            )
            .with_jitter(args.jitter);
            let a = operator.to_dense();
            run_sweep(&operator, &a, &args)?
        }
        OperatorSource::File => {
            let path = args
                .input
                .as_ref()
                .ok_or_else(|| anyhow!("--input is required for the `file` source"))?;
            let a = load_symmetric_matrix(path, 1e-12)
                .with_context(|| format!("Failed to load matrix from {path:?}"))?;
            run_sweep(&a, &a, &args)?
        }
    };

    let mut writer = csv::Writer::from_path(&args.output)
        .with_context(|| format!("Failed to create output file: {:?}", &args.output))?;
    for record in results {
        writer.serialize(record)?;
    }
    writer.flush()?;

    log::info!("Results written to {:?}", &args.output);
    Ok(())
}

/// Builds `A = SᵀS` for a `features × n` matrix `S` with uniform entries in `[-1, 1)`.
fn random_gram_matrix(n: usize, features: usize, seed: u64) -> Mat<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let s = Mat::from_fn(features, n, |_, _| rng.random_range(-1.0..1.0));
    s.as_ref().transpose() * s.as_ref()
}

/// Factorizes `operator` for every rank cap in the sweep and compares against the dense `a`.
fn run_sweep<O>(operator: &O, a: &Mat<f64>, args: &AccuracyArgs) -> Result<Vec<AccuracyResult>>
where
    O: DiagonalSource + RowSource,
{
    let n = a.nrows();
    let a_norm = a.norm_l2();
    let rank_max = args.rank_max.min(n);
    let mut results = Vec::new();

    for max_rank in (args.rank_min.max(1)..=rank_max).step_by(args.rank_step.max(1)) {
        let params = PivotedCholeskyParams::new(max_rank).with_err_tol(args.err_tol);

        let start_time = Instant::now();
        let output = pivoted_cholesky_operator(operator, &params)?;
        let time_s = start_time.elapsed().as_secs_f64();

        let residual = a - &output.reconstruct();
        let relative_frobenius_error = if a_norm > 0.0 {
            residual.norm_l2() / a_norm
        } else {
            residual.norm_l2()
        };

        log::info!(
            "max_rank = {max_rank}: rank {}, trace error {:e}, relative error {:e}",
            output.rank,
            output.trace_error,
            relative_frobenius_error
        );

        results.push(AccuracyResult {
            max_rank,
            rank: output.rank,
            termination: format!("{:?}", output.termination),
            trace_error: output.trace_error,
            relative_frobenius_error,
            time_s,
        });
    }

    Ok(results)
}
