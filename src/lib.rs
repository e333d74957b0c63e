//! Low-rank pivoted Cholesky approximation of positive semi-definite operators.
//!
//! This crate computes a factor `R` of shape `m×N` such that `RᵀR ≈ A` for a symmetric
//! positive semi-definite operator `A`. The operator is never materialized: the
//! algorithm reads its diagonal once and one row per selected pivot. This makes it
//! suitable for large kernel matrices (Gaussian processes, kernel methods) where rows
//! can be computed on demand but the full N×N matrix cannot be stored.
//!
//! ## Algorithm
//!
//! At every step the index with the largest residual diagonal is selected as pivot
//! (ties go to the first index in scan order), its row is fetched, and the residual
//! diagonal is updated with the new Schur complement. The run stops at whichever
//! comes first:
//! - the factor has `max_rank` rows;
//! - the trace of the residual `A - RᵀR` is at most `err_tol`.
//!
//! The cost is O(N m²) arithmetic plus `m` row evaluations, with O(N m) memory.
//!
//! ## Example Usage
//!
//! ```rust
//! use faer::Mat;
//! use pivoted_cholesky::{DEFAULT_ERR_TOL, pivoted_cholesky};
//!
//! // A rank-2 operator A = BᵀB.
//! let b = Mat::from_fn(2, 5, |i, j| ((i + 1) * (j + 2)) as f64 + if i == j { 1.0 } else { 0.0 });
//! let a = b.as_ref().transpose() * b.as_ref();
//!
//! let r = pivoted_cholesky(
//!     || Ok((0..5).map(|i| a[(i, i)]).collect()),
//!     |i| Ok((0..5).map(|j| a[(i, j)]).collect()),
//!     5,
//!     DEFAULT_ERR_TOL,
//! )
//! .unwrap();
//!
//! // The trace tolerance stops the run once the rank is exhausted.
//! assert_eq!(r.nrows(), 2);
//! let reconstructed = r.as_ref().transpose() * r.as_ref();
//! assert!((&reconstructed - &a).norm_l2() < 1e-9);
//! ```
//!
//! Operators can also implement [`operator::DiagonalSource`] and
//! [`operator::RowSource`] directly; dense [`faer::Mat`] and on-demand
//! [`operator::KernelMatrix`] implementations are provided.

pub mod algorithms;
pub mod error;
pub mod operator;
pub mod solvers;
pub mod utils;

// Re-export the main API for convenient access.
pub use algorithms::{DEFAULT_ERR_TOL, PivotedCholeskyOutput, PivotedCholeskyParams, Termination};
pub use error::{PivotedCholeskyError, PivotedCholeskyErrorKind};
pub use solvers::{pivoted_cholesky, pivoted_cholesky_operator};
