//! Integration test suite to verify the mathematical correctness of the pivoted Cholesky factorization.
//!
//! # Test Methodology
//!
//! The factor `R` is validated against operators whose dense representation is
//! available, so that `RᵀR` can be compared with `A` directly:
//! 1.  **Construct a Test Operator `A`:** Gram matrices `SᵀS` of random factors (with
//!     full or known low rank), squared-exponential kernel matrices and simple banded
//!     matrices. All random problems use a fixed seed.
//! 2.  **Factorize:** Run the algorithm through the closure API or the operator API.
//! 3.  **Verify:** Check the reconstruction error, the structural invariants of the
//!     output (permutation, diagonal bound, monotone trace error) and the accessor
//!     contract (one diagonal fetch, one row fetch per pivot).
//!
//! Error handling is validated with malformed accessors and non-PSD operators.

use anyhow::{Result, ensure};
use faer::{Mat, mat};
use pivoted_cholesky::{
    DEFAULT_ERR_TOL, PivotedCholeskyErrorKind, PivotedCholeskyParams, Termination,
    algorithms::{PivotStepView, pivoted_cholesky::pivoted_cholesky_standard},
    error::Accessor,
    operator::{DiagonalSource, KernelMatrix, RowSource, SquaredExponential},
    pivoted_cholesky, pivoted_cholesky_operator,
};
use rand::{Rng, SeedableRng, rngs::StdRng};
use std::cell::{Cell, RefCell};

/// Tolerance on `‖A - RᵀR‖_F / ‖A‖_F` for complete decompositions.
///
/// Cholesky is backward stable, so the reconstruction error of a full decomposition
/// is a small multiple of machine precision times the dimension.
const RECONSTRUCTION_TOLERANCE: f64 = 1e-10;

/// Builds `A = SᵀS` for a random `rank × n` factor `S`.
fn random_gram(n: usize, rank: usize, seed: u64) -> Mat<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let s = Mat::from_fn(rank, n, |_, _| rng.random_range(-1.0..1.0));
    s.as_ref().transpose() * s.as_ref()
}

/// Builds a squared-exponential kernel operator over random points in `[0, 5)^features`.
fn random_kernel(n: usize, features: usize, jitter: f64, seed: u64) -> KernelMatrix<SquaredExponential> {
    let mut rng = StdRng::seed_from_u64(seed);
    let points = Mat::from_fn(n, features, |_, _| rng.random_range(0.0..5.0));
    KernelMatrix::new(points, SquaredExponential::new(1.0, 1.0)).with_jitter(jitter)
}

fn relative_error(a: &Mat<f64>, r: &Mat<f64>) -> f64 {
    let reconstructed = r.as_ref().transpose() * r.as_ref();
    (&reconstructed - a).norm_l2() / a.norm_l2()
}

fn is_permutation(perm: &[usize], n: usize) -> bool {
    let mut seen = vec![false; n];
    perm.len() == n
        && perm.iter().all(|&p| {
            if p >= n || seen[p] {
                return false;
            }
            seen[p] = true;
            true
        })
}

/// Wraps a dense matrix and records every accessor call.
struct CountingOperator {
    inner: Mat<f64>,
    diagonal_calls: Cell<usize>,
    fetched_rows: RefCell<Vec<usize>>,
}

impl CountingOperator {
    fn new(inner: Mat<f64>) -> Self {
        Self {
            inner,
            diagonal_calls: Cell::new(0),
            fetched_rows: RefCell::new(Vec::new()),
        }
    }
}

impl DiagonalSource for CountingOperator {
    fn fetch_diagonal(&self) -> Result<Vec<f64>> {
        self.diagonal_calls.set(self.diagonal_calls.get() + 1);
        self.inner.fetch_diagonal()
    }
}

impl RowSource for CountingOperator {
    fn fetch_row(&self, i: usize) -> Result<Vec<f64>> {
        self.fetched_rows.borrow_mut().push(i);
        self.inner.fetch_row(i)
    }
}

/// A macro to generate the boilerplate for each full-decomposition test.
///
/// The rank cap is set to the dimension and the trace tolerance to zero, so a
/// full-rank operator must go through all `N` pivots and `RᵀR` must reproduce `A`.
macro_rules! generate_reconstruction_test {
    ($test_name:ident, $operator:expr, $error_msg_prefix:expr) => {
        #[test]
        fn $test_name() -> Result<()> {
            let a: Mat<f64> = $operator;
            let n = a.nrows();
            let params = PivotedCholeskyParams::new(n).with_err_tol(0.0);

            let output = pivoted_cholesky_operator(&a, &params)?;

            ensure!(output.rank == n, "{} stopped at rank {}", $error_msg_prefix, output.rank);
            ensure!(
                is_permutation(&output.permutation, n),
                "{} permutation is not a bijection",
                $error_msg_prefix
            );
            let rel_err = relative_error(&a, &output.factor);
            ensure!(
                rel_err < RECONSTRUCTION_TOLERANCE,
                "{} reconstruction error too high: {}",
                $error_msg_prefix,
                rel_err
            );
            Ok(())
        }
    };
}

// --- Round-trip: a full decomposition reproduces the operator ---

generate_reconstruction_test!(
    test_full_rank_gram,
    {
        let n = 40;
        let mut a = random_gram(n, n, 7);
        // Shift the spectrum away from zero so the full decomposition is well conditioned.
        for i in 0..n {
            a[(i, i)] += 1.0;
        }
        a
    },
    "Full-rank Gram matrix"
);

generate_reconstruction_test!(
    test_kernel_with_jitter,
    random_kernel(30, 2, 1e-2, 11).to_dense(),
    "Kernel matrix with jitter"
);

generate_reconstruction_test!(
    test_tridiagonal,
    Mat::from_fn(50, 50, |i, j| {
        if i == j {
            2.0
        } else if i.abs_diff(j) == 1 {
            -1.0
        } else {
            0.0
        }
    }),
    "Tridiagonal matrix"
);

// --- Scenarios ---

#[test]
fn test_identity_takes_one_pivot_per_unit_direction() -> Result<()> {
    let a: Mat<f64> = Mat::identity(3, 3);
    let params = PivotedCholeskyParams::new(3);
    let output = pivoted_cholesky_operator(&a, &params)?;

    // All diagonal entries tie, so the pivots come in index order. Every pivot
    // leaves the other unit directions untouched, hence three steps.
    ensure!(output.pivots() == [0, 1, 2], "unexpected pivots {:?}", output.pivots());
    ensure!(output.rank == 3);
    ensure!(output.trace_error_history == vec![2.0, 1.0, 0.0]);
    ensure!((&output.factor - &a).norm_l2() == 0.0, "R must equal the identity");
    Ok(())
}

#[test]
fn test_rank_two_operator_stops_before_cap() -> Result<()> {
    let b: Mat<f64> = mat![[1.0, 0.0, 1.0, 2.0, 1.0], [0.0, 1.0, 1.0, -1.0, 2.0]];
    let a = b.as_ref().transpose() * b.as_ref();

    let r = pivoted_cholesky(
        || a.fetch_diagonal(),
        |i| a.fetch_row(i),
        5,
        DEFAULT_ERR_TOL,
    )?;

    ensure!(r.nrows() == 2, "expected rank 2, got {}", r.nrows());
    ensure!(r.ncols() == 5);
    let rel_err = relative_error(&a, &r);
    ensure!(rel_err < RECONSTRUCTION_TOLERANCE, "reconstruction error too high: {}", rel_err);
    Ok(())
}

#[test]
fn test_low_rank_gram_recovers_exact_rank() -> Result<()> {
    let a = random_gram(60, 7, 3);
    let output = pivoted_cholesky_operator(&a, &PivotedCholeskyParams::new(60))?;

    ensure!(output.rank == 7, "expected rank 7, got {}", output.rank);
    ensure!(output.termination == Termination::ToleranceReached);
    ensure!(relative_error(&a, &output.factor) < 1e-9);
    Ok(())
}

/// Builds `A = SᵀS` for a random `rank × n` factor whose columns span six orders of magnitude.
fn badly_scaled_gram(n: usize, rank: usize, seed: u64) -> Mat<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let s = Mat::from_fn(rank, n, |_, j| {
        rng.random_range(-1.0..1.0) * 10f64.powi((j % 7) as i32 - 3)
    });
    s.as_ref().transpose() * s.as_ref()
}

#[test]
fn test_rank_deficient_gram_stops_at_exact_rank_with_zero_tolerance() -> Result<()> {
    let cases = (0..20)
        .chain([38])
        .map(|seed| (30, 3, seed))
        .chain((0..5).map(|seed| (60, 7, seed)));

    for (n, rank, seed) in cases {
        let op = CountingOperator::new(badly_scaled_gram(n, rank, seed));
        let params = PivotedCholeskyParams::new(n).with_err_tol(0.0);
        let output = pivoted_cholesky_operator(&op, &params)?;

        ensure!(
            output.rank == rank,
            "seed {} n {}: expected rank {}, got {}",
            seed,
            n,
            rank,
            output.rank
        );
        ensure!(output.termination == Termination::ToleranceReached);
        ensure!(
            op.fetched_rows.borrow().len() == rank,
            "rows were fetched past the numerical rank"
        );
        let rel_err = relative_error(&op.inner, &output.factor);
        ensure!(rel_err < 1e-8, "seed {}: reconstruction error {}", seed, rel_err);
    }
    Ok(())
}

#[test]
fn test_zero_operator_returns_empty_factor() -> Result<()> {
    let op = CountingOperator::new(Mat::zeros(4, 4));
    let output = pivoted_cholesky_operator(&op, &PivotedCholeskyParams::new(4))?;

    ensure!(output.rank == 0);
    ensure!(output.factor.nrows() == 0 && output.factor.ncols() == 4);
    ensure!(output.termination == Termination::ToleranceReached);
    ensure!(op.fetched_rows.borrow().is_empty(), "no row may be fetched");
    Ok(())
}

// --- Invariants ---

#[test]
fn test_factor_diagonal_is_bounded_at_every_step() -> Result<()> {
    let op = random_kernel(80, 2, 0.0, 5);
    let a = op.to_dense();
    let params = PivotedCholeskyParams::new(40).with_err_tol(0.0);

    let mut violations = Vec::new();
    let mut cb = |view: &PivotStepView<'_>| {
        for j in 0..view.factor.ncols() {
            let mut diag = 0.0;
            for k in 0..view.factor.nrows() {
                diag += view.factor[(k, j)] * view.factor[(k, j)];
            }
            if diag > a[(j, j)] * (1.0 + 1e-12) {
                violations.push((view.step, j, diag - a[(j, j)]));
            }
        }
        true
    };
    pivoted_cholesky_standard(&op, &params, Some(&mut cb))?;

    ensure!(violations.is_empty(), "diag(RᵀR) exceeds diag(A): {:?}", violations);
    Ok(())
}

#[test]
fn test_trace_error_is_non_increasing_and_exact() -> Result<()> {
    let op = random_kernel(120, 3, 1e-6, 17);
    let a = op.to_dense();
    let params = PivotedCholeskyParams::new(60).with_err_tol(1e-4);
    let output = pivoted_cholesky_operator(&op, &params)?;

    let history = &output.trace_error_history;
    ensure!(history.len() == output.rank);
    for pair in history.windows(2) {
        ensure!(pair[1] <= pair[0] + 1e-12, "trace error increased: {:?}", pair);
    }

    // The tracked error is the trace of the residual operator.
    let reconstructed = output.reconstruct();
    let residual_trace: f64 = (0..a.nrows()).map(|i| a[(i, i)] - reconstructed[(i, i)]).sum();
    ensure!(
        (residual_trace - output.trace_error).abs() < 1e-8,
        "tracked {:e} vs actual {:e}",
        output.trace_error,
        residual_trace
    );
    Ok(())
}

#[test]
fn test_rank_bounds_and_early_stop_rule() -> Result<()> {
    let op = random_kernel(100, 1, 0.0, 23);
    for (max_rank, err_tol) in [(1, 1e-6), (5, 1e-6), (50, 1e-2), (100, 1e-8)] {
        let params = PivotedCholeskyParams::new(max_rank).with_err_tol(err_tol);
        let output = pivoted_cholesky_operator(&op, &params)?;

        ensure!(output.rank >= 1 && output.rank <= max_rank);
        if output.rank < max_rank {
            ensure!(
                output.trace_error <= err_tol,
                "stopped at rank {} < {} with trace error {:e}",
                output.rank,
                max_rank,
                output.trace_error
            );
        }
        ensure!(is_permutation(&output.permutation, 100));
    }
    Ok(())
}

#[test]
fn test_one_diagonal_and_one_row_per_pivot() -> Result<()> {
    let op = CountingOperator::new(random_gram(30, 30, 9));
    let params = PivotedCholeskyParams::new(12).with_err_tol(0.0);
    let output = pivoted_cholesky_operator(&op, &params)?;

    ensure!(op.diagonal_calls.get() == 1);
    ensure!(
        op.fetched_rows.borrow().as_slice() == output.pivots(),
        "rows fetched {:?} differ from pivots {:?}",
        op.fetched_rows.borrow(),
        output.pivots()
    );
    ensure!(output.termination == Termination::MaxRank);
    Ok(())
}

#[test]
fn test_pivots_follow_largest_residual() -> Result<()> {
    let a: Mat<f64> = Mat::from_fn(6, 6, |i, j| if i == j { [3.0, 1.0, 4.0, 1.0, 5.0, 2.0][i] } else { 0.0 });
    let output = pivoted_cholesky_operator(&a, &PivotedCholeskyParams::new(6))?;

    // Diagonal operator: residuals never change, ties go to the first index in scan order.
    ensure!(output.pivots() == [4, 2, 0, 5, 1, 3], "unexpected pivots {:?}", output.pivots());
    for (k, &p) in output.pivots().iter().enumerate() {
        ensure!(output.factor[(k, p)] == a[(p, p)].sqrt());
    }
    Ok(())
}

#[test]
fn test_factor_is_upper_triangular_in_pivot_order() -> Result<()> {
    let a = random_gram(25, 25, 31);
    let output = pivoted_cholesky_operator(&a, &PivotedCholeskyParams::new(10).with_err_tol(0.0))?;

    for k in 0..output.rank {
        for j in 0..k {
            let earlier_pivot = output.permutation[j];
            ensure!(output.factor[(k, earlier_pivot)] == 0.0);
        }
        ensure!(output.factor[(k, output.permutation[k])] > 0.0);
    }
    Ok(())
}

// --- Error handling ---

#[test]
fn test_wrong_row_length_is_invalid_dimension() {
    let result = pivoted_cholesky(
        || Ok(vec![2.0, 1.0, 1.0]),
        |_| Ok(vec![2.0, 0.0]),
        3,
        DEFAULT_ERR_TOL,
    );

    let err = result.expect_err("a short row must be rejected");
    assert!(err.is_invalid_dimension());
    assert!(matches!(
        err.kind(),
        PivotedCholeskyErrorKind::InvalidDimension {
            accessor: Accessor::Row(0),
            expected: 3,
            actual: 2
        }
    ));
}

#[test]
fn test_rank_cap_outside_range_is_invalid_dimension() {
    let a: Mat<f64> = Mat::identity(3, 3);
    for max_rank in [0, 4] {
        let err = pivoted_cholesky_operator(&a, &PivotedCholeskyParams::new(max_rank))
            .expect_err("rank cap must lie in [1, N]");
        assert!(err.is_invalid_dimension());
        assert!(matches!(
            err.kind(),
            PivotedCholeskyErrorKind::InvalidRank { dim: 3, .. }
        ));
    }
}

#[test]
fn test_negative_tolerance_is_input_error() {
    let a: Mat<f64> = Mat::identity(2, 2);
    let err = pivoted_cholesky_operator(&a, &PivotedCholeskyParams::new(2).with_err_tol(-1.0))
        .expect_err("negative err_tol must be rejected");
    assert!(matches!(err.kind(), PivotedCholeskyErrorKind::InputError(_)));
}

#[derive(Debug, thiserror::Error)]
#[error("kernel evaluation timed out for row {0}")]
struct KernelTimeout(usize);

#[test]
fn test_accessor_failure_is_propagated_unchanged() {
    let err = pivoted_cholesky(
        || Ok(vec![1.0, 4.0]),
        |i| Err(KernelTimeout(i).into()),
        2,
        DEFAULT_ERR_TOL,
    )
    .expect_err("row failures must abort the run");

    assert!(err.is_accessor_failure());
    match err.into_kind() {
        PivotedCholeskyErrorKind::AccessorFailure { accessor, source } => {
            assert_eq!(accessor, Accessor::Row(1));
            let timeout = source
                .downcast_ref::<KernelTimeout>()
                .expect("original error must be preserved");
            assert_eq!(timeout.0, 1);
        }
        other => panic!("unexpected error kind: {other:?}"),
    }
}

#[test]
fn test_diagonal_failure_is_propagated() {
    let err = pivoted_cholesky(
        || Err(anyhow::anyhow!("storage offline")),
        |_| Ok(vec![]),
        1,
        DEFAULT_ERR_TOL,
    )
    .expect_err("diagonal failures must abort the run");
    assert!(matches!(
        err.kind(),
        PivotedCholeskyErrorKind::AccessorFailure {
            accessor: Accessor::Diagonal,
            ..
        }
    ));
}

#[test]
fn test_indefinite_operator_is_numerical_breakdown() {
    let a: Mat<f64> = mat![[1.0, 2.0], [2.0, 1.0]];
    let err = pivoted_cholesky_operator(&a, &PivotedCholeskyParams::new(2))
        .expect_err("an indefinite operator must be rejected");
    assert!(err.is_numerical_breakdown());
    assert!(matches!(
        err.kind(),
        PivotedCholeskyErrorKind::NumericalBreakdown { step: 0, index: 1, .. }
    ));
}

#[test]
fn test_negative_diagonal_is_numerical_breakdown() {
    let a: Mat<f64> = mat![[1.0, 0.0], [0.0, -0.5]];
    let err = pivoted_cholesky_operator(&a, &PivotedCholeskyParams::new(1))
        .expect_err("a negative diagonal entry must be rejected");
    assert!(err.is_numerical_breakdown());
}

#[test]
fn test_rounding_noise_is_clamped() -> Result<()> {
    // Slightly indefinite: the Schur complement of the second entry is -1e-12.
    let a: Mat<f64> = mat![[1.0, 1.0], [1.0, 1.0 - 1e-12]];

    let output = pivoted_cholesky_operator(&a, &PivotedCholeskyParams::new(2))?;
    ensure!(output.rank == 1);
    ensure!(output.residual_diagonal[1] == 0.0);
    ensure!(output.trace_error == 0.0);

    // With a zero noise threshold the same input is a breakdown.
    let strict = PivotedCholeskyParams::new(2).with_negative_tolerance(0.0);
    let err = pivoted_cholesky_operator(&a, &strict).expect_err("strict threshold must fail");
    ensure!(err.is_numerical_breakdown());
    Ok(())
}

#[test]
fn test_non_finite_row_is_numerical_breakdown() {
    let err = pivoted_cholesky(
        || Ok(vec![1.0, 1.0]),
        |_| Ok(vec![1.0, f64::NAN]),
        2,
        DEFAULT_ERR_TOL,
    )
    .expect_err("NaN entries must be rejected");
    assert!(err.is_numerical_breakdown());
}
