//! Driver for the pivoted Cholesky iteration.
//!
//! ** NOTE: We recommend using the high-level functions in [`crate::solvers`] instead.
//! This module is intended for use cases that need per-step monitoring.
//!
//! [`pivoted_cholesky_standard`] runs a [`PivotedCholeskyIteration`] to completion,
//! records the residual trace after every pivot and hands each step to an optional
//! callback. The factor is allocated once with `max_rank` rows; if the run stops
//! early the unused rows are dropped from the returned matrix.

use super::{
    PivotStepView, PivotedCholeskyCallback, PivotedCholeskyIteration, PivotedCholeskyOutput,
    PivotedCholeskyParams, Termination,
};
use crate::{
    error::PivotedCholeskyError,
    operator::{DiagonalSource, RowSource},
};

/// Computes a pivoted Cholesky factor `R` with `RᵀR ≈ A`.
///
/// The diagonal of `operator` is fetched once and one row is fetched per accepted
/// pivot. The run stops when the factor has `params.max_rank` rows or when the
/// trace of the residual drops to `params.err_tol` or below, whichever comes first.
///
/// An optional callback is invoked after every pivot with a view of the factor
/// computed so far. Returning `false` from it ends the run gracefully, and the
/// run is then reported as [`Termination::Callback`] even if a stopping rule
/// holds on the same step.
///
/// # Arguments
/// * `operator`: The symmetric PSD operator, through its diagonal and row accessors.
/// * `params`: Rank cap and tolerances.
/// * `callback`: An optional mutable reference to a monitoring callback.
///
/// # Returns
/// A [`Result`] containing the [`PivotedCholeskyOutput`] on success. On failure no
/// partial factor is returned.
pub fn pivoted_cholesky_standard<O>(
    operator: &O,
    params: &PivotedCholeskyParams,
    mut callback: Option<&mut PivotedCholeskyCallback<'_>>,
) -> Result<PivotedCholeskyOutput, PivotedCholeskyError>
where
    O: DiagonalSource + RowSource + ?Sized,
{
    let mut iteration = PivotedCholeskyIteration::new(operator, params)?;
    let mut trace_error_history = Vec::with_capacity(params.max_rank);
    let mut stopped_by_callback = false;

    while let Some(step) = iteration.next_step()? {
        trace_error_history.push(step.trace_error);

        if let Some(ref mut cb) = callback {
            let view = PivotStepView {
                step: step.step,
                pivot: step.pivot,
                pivot_value: step.pivot_value,
                trace_error: step.trace_error,
                factor: iteration.factor(),
            };
            if !cb(&view) {
                stopped_by_callback = true;
                break;
            }
        }
    }

    let termination = match iteration.termination() {
        Some(rule) if !stopped_by_callback => rule,
        _ => Termination::Callback,
    };
    log::debug!(
        "pivoted Cholesky finished with rank {} of {} ({:?}), trace error {:e}",
        iteration.rank(),
        iteration.dim(),
        termination,
        iteration.trace_error()
    );

    Ok(iteration.into_output(termination, trace_error_history))
}
