//! This module defines the custom error types for the library.
//!
//! All failure conditions of a pivoted Cholesky run are collected into a single
//! enum, [`PivotedCholeskyErrorKind`], wrapped by the public [`PivotedCholeskyError`].
//!
//! The kinds fall into three families that callers usually want to tell apart:
//! misuse of the API (dimension or parameter errors), numerical-modeling errors
//! (the operator is not PSD within tolerance), and failures raised by the
//! caller-supplied accessors. Accessor errors are kept intact as the
//! [`std::error::Error::source`] of the returned error.
use std::fmt;
use thiserror::Error;

/// Represents all possible errors that can occur during a pivoted Cholesky run.
#[derive(Error, Debug)]
#[error(transparent)]
pub struct PivotedCholeskyError(#[from] PivotedCholeskyErrorKind);

impl PivotedCholeskyError {
    /// Returns the kind of failure that aborted the run.
    ///
    /// Dimension errors come in two kinds: [`PivotedCholeskyErrorKind::InvalidDimension`]
    /// for accessor results of the wrong length and [`PivotedCholeskyErrorKind::InvalidRank`]
    /// for a rank cap outside `[1, N]`. Use [`Self::is_invalid_dimension`] to match both.
    pub fn kind(&self) -> &PivotedCholeskyErrorKind {
        &self.0
    }

    /// Consumes the error and returns its kind.
    pub fn into_kind(self) -> PivotedCholeskyErrorKind {
        self.0
    }

    /// `true` for length mismatches and rank caps outside `[1, N]`.
    pub fn is_invalid_dimension(&self) -> bool {
        matches!(
            self.0,
            PivotedCholeskyErrorKind::InvalidDimension { .. }
                | PivotedCholeskyErrorKind::InvalidRank { .. }
        )
    }

    /// `true` if the operator turned out not to be PSD within tolerance.
    pub fn is_numerical_breakdown(&self) -> bool {
        matches!(self.0, PivotedCholeskyErrorKind::NumericalBreakdown { .. })
    }

    /// `true` if one of the caller-supplied accessors failed.
    pub fn is_accessor_failure(&self) -> bool {
        matches!(self.0, PivotedCholeskyErrorKind::AccessorFailure { .. })
    }
}

/// Identifies which accessor produced an invalid or failed result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accessor {
    /// The diagonal lookup, called once at initialization.
    Diagonal,
    /// The row lookup for the given original row index.
    Row(usize),
}

impl fmt::Display for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Accessor::Diagonal => write!(f, "diagonal source"),
            Accessor::Row(i) => write!(f, "row source (row {i})"),
        }
    }
}

/// The distinct kinds of errors.
#[derive(Error, Debug)]
pub enum PivotedCholeskyErrorKind {
    /// An accessor returned a sequence whose length disagrees with the operator dimension.
    #[error("Dimension mismatch: {accessor} returned {actual} entries, expected {expected}.")]
    InvalidDimension {
        accessor: Accessor,
        expected: usize,
        actual: usize,
    },

    /// The rank cap lies outside `[1, N]`. Counted as a dimension error by
    /// [`PivotedCholeskyError::is_invalid_dimension`].
    #[error("Invalid rank cap: max_rank must lie in [1, {dim}], got {max_rank}.")]
    InvalidRank { max_rank: usize, dim: usize },

    /// Indicates that an invalid input parameter was provided to a function.
    #[error("Invalid input parameter: {0}")]
    InputError(String),

    /// A residual diagonal entry is negative beyond the noise tolerance, or not finite.
    #[error(
        "Numerical breakdown at step {step}: residual diagonal at index {index} is {value:e} (noise tolerance {tolerance:e}). The operator is not positive semi-definite."
    )]
    NumericalBreakdown {
        step: usize,
        index: usize,
        value: f64,
        tolerance: f64,
    },

    /// Wraps an error raised by a caller-supplied accessor.
    #[error("Accessor failure in {accessor}: {source}")]
    AccessorFailure {
        accessor: Accessor,
        #[source]
        source: anyhow::Error,
    },
}
