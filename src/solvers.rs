//! This module provides a high-level, user-friendly API for computing a low-rank
//! pivoted Cholesky approximation `A ≈ RᵀR` of a symmetric PSD operator.

use crate::{
    algorithms::{
        PivotedCholeskyOutput, PivotedCholeskyParams, pivoted_cholesky::pivoted_cholesky_standard,
    },
    error::PivotedCholeskyError,
    operator::{DiagonalSource, FnOperator, RowSource},
};
use faer::Mat;

/// Computes a pivoted Cholesky factor from a pair of accessor closures.
///
/// The operator dimension `N` is the length of the vector returned by `get_diag`.
/// `get_diag` is called once; `get_row` is called once per accepted pivot with the
/// pivot's zero-based index and must return the full row of length `N`.
///
/// # Arguments
/// * `get_diag`: Returns the diagonal of the operator.
/// * `get_row`: Returns row `i` of the operator.
/// * `max_rank`: Maximum number of rows of the factor, in `[1, N]`.
/// * `err_tol`: Tolerance on the trace of the residual, usually
///   [`crate::algorithms::DEFAULT_ERR_TOL`].
///
/// # Returns
/// The `m×N` factor `R` with `m ≤ max_rank`, or a [`PivotedCholeskyError`].
/// Errors raised by the closures are returned as accessor failures with the
/// original error as their source.
pub fn pivoted_cholesky<D, R>(
    get_diag: D,
    get_row: R,
    max_rank: usize,
    err_tol: f64,
) -> Result<Mat<f64>, PivotedCholeskyError>
where
    D: Fn() -> anyhow::Result<Vec<f64>>,
    R: Fn(usize) -> anyhow::Result<Vec<f64>>,
{
    let operator = FnOperator::new(get_diag, get_row);
    let params = PivotedCholeskyParams::new(max_rank).with_err_tol(err_tol);
    let output = pivoted_cholesky_standard(&operator, &params, None)?;
    Ok(output.factor)
}

/// Computes a pivoted Cholesky factorization of any operator implementing the accessor traits.
///
/// Unlike [`pivoted_cholesky`], the full [`PivotedCholeskyOutput`] is returned, including
/// the pivot order, the final residual diagonal and the termination reason.
pub fn pivoted_cholesky_operator<O>(
    operator: &O,
    params: &PivotedCholeskyParams,
) -> Result<PivotedCholeskyOutput, PivotedCholeskyError>
where
    O: DiagonalSource + RowSource + ?Sized,
{
    pivoted_cholesky_standard(operator, params, None)
}
