//! Core building blocks of the pivoted Cholesky factorization.
//!
//! ** NOTE: We recommend using the high-level functions in [`crate::solvers`] instead.
//! This module exposes the stateful iteration for callers that need to observe or
//! drive the factorization one pivot at a time.
//!
//! Given a symmetric PSD operator `A` of dimension `N`, the factorization builds
//! an `m×N` matrix `R` with `RᵀR ≈ A`, one row per iteration. Each iteration
//!
//! 1. picks the unprocessed index with the largest residual diagonal (the pivot),
//! 2. fetches the corresponding row of `A`,
//! 3. writes the next row of `R` and subtracts its contribution from the residual
//!    diagonal (the diagonal of the Schur complement),
//! 4. stops once the rank cap is reached or the residual trace is within tolerance.
//!
//! The whole state of one run is owned by a [`PivotedCholeskyIteration`]; nothing
//! is shared between runs.

pub mod pivoted_cholesky;

use crate::{
    error::{Accessor, PivotedCholeskyError, PivotedCholeskyErrorKind},
    operator::{DiagonalSource, RowSource},
};
use faer::{Mat, MatRef};

/// Default tolerance on the trace of the residual operator.
pub const DEFAULT_ERR_TOL: f64 = 1e-6;

/// Parameters of a pivoted Cholesky run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PivotedCholeskyParams {
    /// Maximum number of rows of the factor. Must lie in `[1, N]`.
    pub max_rank: usize,
    /// The run stops once the residual trace is at or below this value.
    pub err_tol: f64,
    /// Absolute threshold below which a negative residual is treated as a breakdown
    /// rather than rounding noise. `None` selects [`default_negative_tolerance`].
    pub negative_tolerance: Option<f64>,
}

impl PivotedCholeskyParams {
    pub fn new(max_rank: usize) -> Self {
        Self {
            max_rank,
            err_tol: DEFAULT_ERR_TOL,
            negative_tolerance: None,
        }
    }

    pub fn with_err_tol(mut self, err_tol: f64) -> Self {
        self.err_tol = err_tol;
        self
    }

    pub fn with_negative_tolerance(mut self, tolerance: f64) -> Self {
        self.negative_tolerance = Some(tolerance);
        self
    }

    /// Checks the scalar parameters. The rank cap is checked once `N` is known.
    fn validate(&self) -> Result<(), PivotedCholeskyError> {
        if !self.err_tol.is_finite() || self.err_tol < 0.0 {
            return Err(PivotedCholeskyErrorKind::InputError(format!(
                "err_tol must be finite and non-negative, got {}",
                self.err_tol
            ))
            .into());
        }
        if let Some(tolerance) = self.negative_tolerance {
            if !tolerance.is_finite() || tolerance < 0.0 {
                return Err(PivotedCholeskyErrorKind::InputError(format!(
                    "negative_tolerance must be finite and non-negative, got {tolerance}"
                ))
                .into());
            }
        }
        Ok(())
    }
}

/// Noise threshold for negative residuals, relative to the largest diagonal entry.
///
/// Cancellation in `d[j] - R[m, j]²` loses roughly half of the significant digits
/// in the worst case, so `sqrt(ε)` of the diagonal scale is used.
#[inline]
pub fn default_negative_tolerance(diagonal_scale: f64) -> f64 {
    f64::EPSILON.sqrt() * diagonal_scale
}

/// Residual level below which a pivot is indistinguishable from rounding noise.
///
/// Residuals of an exhausted rank-deficient operator are of order `ε` times the
/// diagonal scale, accumulated over at most `n` updates.
#[inline]
pub fn default_pivot_tolerance(dim: usize, diagonal_scale: f64) -> f64 {
    dim as f64 * f64::EPSILON * diagonal_scale
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The factor reached `max_rank` rows.
    MaxRank,
    /// The residual trace dropped to `err_tol` or below, or the remaining
    /// residual is rounding noise.
    ToleranceReached,
    /// The monitoring callback asked to stop. Reported even when a stopping
    /// rule holds on the same step.
    Callback,
}

/// Summary of one accepted pivot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PivotStep {
    /// Zero-based iteration index, i.e. the row of `R` that was written.
    pub step: usize,
    /// Original index of the selected pivot.
    pub pivot: usize,
    /// Residual diagonal value at the pivot before it was accepted.
    pub pivot_value: f64,
    /// Residual trace over the indices still unprocessed after this step.
    pub trace_error: f64,
}

/// State handed to a [`PivotedCholeskyCallback`] after each accepted pivot.
pub struct PivotStepView<'a> {
    pub step: usize,
    pub pivot: usize,
    pub pivot_value: f64,
    pub trace_error: f64,
    /// The rows of `R` computed so far (`step + 1` rows, `N` columns).
    pub factor: MatRef<'a, f64>,
}

/// A monitoring hook invoked after each pivot. Returning `false` stops the run.
pub type PivotedCholeskyCallback<'a> = dyn FnMut(&PivotStepView<'_>) -> bool + 'a;

/// The result of a pivoted Cholesky run.
#[derive(Debug, Clone)]
pub struct PivotedCholeskyOutput {
    /// The `rank×N` factor `R`, in the original column order.
    pub factor: Mat<f64>,
    /// A permutation of `0..N` whose first `rank` entries are the pivots in selection order.
    pub permutation: Vec<usize>,
    /// The residual diagonal at termination. Zero at the pivots.
    pub residual_diagonal: Vec<f64>,
    /// Residual trace at termination.
    pub trace_error: f64,
    /// Residual trace after each accepted pivot.
    pub trace_error_history: Vec<f64>,
    pub rank: usize,
    pub termination: Termination,
}

impl PivotedCholeskyOutput {
    /// The selected pivots, in selection order.
    pub fn pivots(&self) -> &[usize] {
        &self.permutation[..self.rank]
    }

    /// Forms the low-rank approximation `RᵀR` as a dense `N×N` matrix.
    pub fn reconstruct(&self) -> Mat<f64> {
        self.factor.as_ref().transpose() * self.factor.as_ref()
    }
}

/// The iterative state of one pivoted Cholesky run.
///
/// The iteration borrows the operator and exclusively owns the residual diagonal,
/// the permutation and the factor. Call [`PivotedCholeskyIteration::next_step`]
/// until it returns `Ok(None)`.
pub struct PivotedCholeskyIteration<'a, O: ?Sized> {
    operator: &'a O,
    residual: Vec<f64>,
    permutation: Vec<usize>,
    factor: Mat<f64>,
    rank: usize,
    max_rank: usize,
    err_tol: f64,
    negative_tolerance: f64,
    pivot_tolerance: f64,
    trace_error: f64,
}

impl<'a, O> PivotedCholeskyIteration<'a, O>
where
    O: DiagonalSource + RowSource + ?Sized,
{
    /// Fetches the diagonal, validates the parameters and sets up the state.
    ///
    /// No row is fetched here.
    pub fn new(operator: &'a O, params: &PivotedCholeskyParams) -> Result<Self, PivotedCholeskyError> {
        params.validate()?;

        let mut residual = operator.fetch_diagonal().map_err(|source| {
            PivotedCholeskyErrorKind::AccessorFailure {
                accessor: Accessor::Diagonal,
                source,
            }
        })?;
        let n = residual.len();

        if params.max_rank == 0 || params.max_rank > n {
            return Err(PivotedCholeskyErrorKind::InvalidRank {
                max_rank: params.max_rank,
                dim: n,
            }
            .into());
        }

        let scale = residual.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
        let negative_tolerance = params
            .negative_tolerance
            .unwrap_or_else(|| default_negative_tolerance(scale));

        for (index, value) in residual.iter_mut().enumerate() {
            *value = clamp_residual(*value, 0, index, negative_tolerance)?;
        }
        let trace_error = residual.iter().sum();

        Ok(Self {
            operator,
            residual,
            permutation: (0..n).collect(),
            factor: Mat::zeros(params.max_rank, n),
            rank: 0,
            max_rank: params.max_rank,
            err_tol: params.err_tol,
            negative_tolerance,
            pivot_tolerance: default_pivot_tolerance(n, scale),
            trace_error,
        })
    }

    /// Accepts the next pivot, or returns `Ok(None)` once a stopping rule holds.
    pub fn next_step(&mut self) -> Result<Option<PivotStep>, PivotedCholeskyError> {
        if self.is_finished() {
            return Ok(None);
        }

        let m = self.rank;
        let n = self.dim();

        let offset = select_pivot(&self.residual, &self.permutation[m..]);
        self.permutation.swap(m, m + offset);
        let pivot = self.permutation[m];

        let pivot_value = self.residual[pivot];
        if !pivot_value.is_finite() || pivot_value < 0.0 {
            return Err(PivotedCholeskyErrorKind::NumericalBreakdown {
                step: m,
                index: pivot,
                value: pivot_value,
                tolerance: self.negative_tolerance,
            }
            .into());
        }
        // The largest residual is noise, so the operator is exhausted. Pivoting on
        // it would divide noise by noise.
        if pivot_value <= self.pivot_tolerance {
            for &j in &self.permutation[m..] {
                self.residual[j] = 0.0;
            }
            log::debug!(
                "residual exhausted at rank {}: largest residual {:e} below {:e}, dropping trace error {:e}",
                m,
                pivot_value,
                self.pivot_tolerance,
                self.trace_error
            );
            self.trace_error = 0.0;
            return Ok(None);
        }
        let pivot_sqrt = pivot_value.sqrt();
        self.factor[(m, pivot)] = pivot_sqrt;
        self.residual[pivot] = 0.0;

        let row = self.operator.fetch_row(pivot).map_err(|source| {
            PivotedCholeskyErrorKind::AccessorFailure {
                accessor: Accessor::Row(pivot),
                source,
            }
        })?;
        if row.len() != n {
            return Err(PivotedCholeskyErrorKind::InvalidDimension {
                accessor: Accessor::Row(pivot),
                expected: n,
                actual: row.len(),
            }
            .into());
        }

        // Schur complement update of row m over the unprocessed columns.
        for i in m + 1..n {
            let j = self.permutation[i];
            let mut inner = 0.0;
            for k in 0..m {
                inner += self.factor[(k, pivot)] * self.factor[(k, j)];
            }
            let coeff = (row[j] - inner) / pivot_sqrt;
            self.factor[(m, j)] = coeff;
            self.residual[j] = clamp_residual(
                self.residual[j] - coeff * coeff,
                m,
                j,
                self.negative_tolerance,
            )?;
        }

        self.trace_error = self.permutation[m + 1..]
            .iter()
            .map(|&j| self.residual[j])
            .sum();
        self.rank += 1;

        log::debug!(
            "pivot step {}: index {} (residual {:e}), trace error {:e}",
            m,
            pivot,
            pivot_value,
            self.trace_error
        );

        Ok(Some(PivotStep {
            step: m,
            pivot,
            pivot_value,
            trace_error: self.trace_error,
        }))
    }

    /// `true` once the rank cap is reached or the residual trace is within tolerance.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.rank >= self.max_rank || self.trace_error <= self.err_tol
    }

    /// The stopping rule that holds, if any. Tolerance takes precedence.
    pub fn termination(&self) -> Option<Termination> {
        if self.trace_error <= self.err_tol {
            Some(Termination::ToleranceReached)
        } else if self.rank >= self.max_rank {
            Some(Termination::MaxRank)
        } else {
            None
        }
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.residual.len()
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }

    #[inline]
    pub fn trace_error(&self) -> f64 {
        self.trace_error
    }

    pub fn residual_diagonal(&self) -> &[f64] {
        &self.residual
    }

    pub fn permutation(&self) -> &[usize] {
        &self.permutation
    }

    pub fn pivots(&self) -> &[usize] {
        &self.permutation[..self.rank]
    }

    /// The rows of `R` computed so far.
    pub fn factor(&self) -> MatRef<'_, f64> {
        self.factor.as_ref().get(0..self.rank, ..)
    }

    /// Consumes the state and returns the trimmed factor with its metadata.
    pub(crate) fn into_output(
        self,
        termination: Termination,
        trace_error_history: Vec<f64>,
    ) -> PivotedCholeskyOutput {
        // Only copy when the run stopped before filling the pre-allocated rows.
        let factor = if self.rank == self.factor.nrows() {
            self.factor
        } else {
            self.factor.as_ref().get(0..self.rank, ..).to_owned()
        };

        PivotedCholeskyOutput {
            factor,
            permutation: self.permutation,
            residual_diagonal: self.residual,
            trace_error: self.trace_error,
            trace_error_history,
            rank: self.rank,
            termination,
        }
    }
}

/// Returns the offset within `candidates` of the largest residual.
///
/// Ties go to the first candidate in scan order, which keeps runs reproducible.
fn select_pivot(residual: &[f64], candidates: &[usize]) -> usize {
    let mut best = 0;
    let mut best_value = residual[candidates[0]];
    for (offset, &j) in candidates.iter().enumerate().skip(1) {
        if residual[j] > best_value {
            best = offset;
            best_value = residual[j];
        }
    }
    best
}

/// Maps rounding noise in `[-tolerance, 0)` to zero and rejects anything below.
fn clamp_residual(
    value: f64,
    step: usize,
    index: usize,
    tolerance: f64,
) -> Result<f64, PivotedCholeskyError> {
    if !value.is_finite() || value < -tolerance {
        return Err(PivotedCholeskyErrorKind::NumericalBreakdown {
            step,
            index,
            value,
            tolerance,
        }
        .into());
    }
    if value < 0.0 {
        log::trace!("clamping residual {value:e} at index {index} to zero");
        return Ok(0.0);
    }
    Ok(value)
}
