//! This module defines how the factorization reaches the operator it approximates.
//!
//! Pivoted Cholesky never needs the full matrix. It reads the diagonal once and
//! then one row per accepted pivot, so the algorithm is written against two
//! small capability traits instead of a concrete matrix type:
//!
//! - [`DiagonalSource`]: returns the full diagonal.
//! - [`RowSource`]: returns one row, given its zero-based index.
//!
//! Anything that can answer these two questions can be factorized: a dense
//! [`faer::Mat`], a pair of closures ([`FnOperator`]), or a kernel Gram matrix
//! whose entries are evaluated on demand from a point set ([`KernelMatrix`]).
//! The latter is the typical Gaussian-process setting, where materializing the
//! N×N kernel matrix is what we want to avoid.
//!
//! Both accessors return [`anyhow::Result`] so that implementations backed by
//! fallible storage (files, remote services) can report failures. Such errors are
//! passed through to the caller of the factorization unchanged.

use anyhow::{Result, ensure};
use faer::{Mat, MatMut, MatRef, RowRef, prelude::Reborrow};

/// Provides the full diagonal of a symmetric operator.
pub trait DiagonalSource {
    /// Returns the `N` diagonal entries of the operator.
    fn fetch_diagonal(&self) -> Result<Vec<f64>>;
}

/// Provides single rows of a symmetric operator.
pub trait RowSource {
    /// Returns row `i` (zero-based) of the operator, `N` entries long.
    ///
    /// Repeated calls with the same index must return the same values.
    fn fetch_row(&self, i: usize) -> Result<Vec<f64>>;
}

impl<T: DiagonalSource + ?Sized> DiagonalSource for &T {
    #[inline]
    fn fetch_diagonal(&self) -> Result<Vec<f64>> {
        (**self).fetch_diagonal()
    }
}

impl<T: RowSource + ?Sized> RowSource for &T {
    #[inline]
    fn fetch_row(&self, i: usize) -> Result<Vec<f64>> {
        (**self).fetch_row(i)
    }
}

/// Dense matrix views are the reference implementation the algorithm is tested against.
impl DiagonalSource for MatRef<'_, f64> {
    fn fetch_diagonal(&self) -> Result<Vec<f64>> {
        ensure!(
            self.nrows() == self.ncols(),
            "dense operator must be square, got {}x{}",
            self.nrows(),
            self.ncols()
        );
        Ok((0..self.nrows()).map(|i| self[(i, i)]).collect())
    }
}

impl RowSource for MatRef<'_, f64> {
    fn fetch_row(&self, i: usize) -> Result<Vec<f64>> {
        ensure!(
            i < self.nrows(),
            "row index {} out of bounds for a matrix with {} rows",
            i,
            self.nrows()
        );
        Ok((0..self.ncols()).map(|j| self[(i, j)]).collect())
    }
}

impl DiagonalSource for MatMut<'_, f64> {
    #[inline]
    fn fetch_diagonal(&self) -> Result<Vec<f64>> {
        self.rb().fetch_diagonal()
    }
}

impl RowSource for MatMut<'_, f64> {
    #[inline]
    fn fetch_row(&self, i: usize) -> Result<Vec<f64>> {
        self.rb().fetch_row(i)
    }
}

impl DiagonalSource for Mat<f64> {
    #[inline]
    fn fetch_diagonal(&self) -> Result<Vec<f64>> {
        self.as_ref().fetch_diagonal()
    }
}

impl RowSource for Mat<f64> {
    #[inline]
    fn fetch_row(&self, i: usize) -> Result<Vec<f64>> {
        self.as_ref().fetch_row(i)
    }
}

/// An operator defined by a pair of closures.
///
/// ```
/// use pivoted_cholesky::operator::{DiagonalSource, FnOperator, RowSource};
///
/// let op = FnOperator::new(
///     || Ok(vec![2.0, 2.0]),
///     |i: usize| Ok(if i == 0 { vec![2.0, 1.0] } else { vec![1.0, 2.0] }),
/// );
/// assert_eq!(op.fetch_diagonal().unwrap(), vec![2.0, 2.0]);
/// assert_eq!(op.fetch_row(1).unwrap(), vec![1.0, 2.0]);
/// ```
pub struct FnOperator<D, R> {
    diagonal: D,
    row: R,
}

impl<D, R> FnOperator<D, R>
where
    D: Fn() -> Result<Vec<f64>>,
    R: Fn(usize) -> Result<Vec<f64>>,
{
    pub fn new(diagonal: D, row: R) -> Self {
        Self { diagonal, row }
    }
}

impl<D, R> DiagonalSource for FnOperator<D, R>
where
    D: Fn() -> Result<Vec<f64>>,
{
    #[inline]
    fn fetch_diagonal(&self) -> Result<Vec<f64>> {
        (self.diagonal)()
    }
}

impl<D, R> RowSource for FnOperator<D, R>
where
    R: Fn(usize) -> Result<Vec<f64>>,
{
    #[inline]
    fn fetch_row(&self, i: usize) -> Result<Vec<f64>> {
        (self.row)(i)
    }
}

/// A positive semi-definite kernel `k(x, y)` evaluated between two points.
pub trait Kernel {
    fn evaluate(&self, x: RowRef<'_, f64>, y: RowRef<'_, f64>) -> f64;
}

/// The squared-exponential (RBF) kernel `σ² exp(-‖x - y‖² / (2ℓ²))`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SquaredExponential {
    pub lengthscale: f64,
    pub variance: f64,
}

impl SquaredExponential {
    pub fn new(lengthscale: f64, variance: f64) -> Self {
        Self {
            lengthscale,
            variance,
        }
    }
}

impl Kernel for SquaredExponential {
    #[inline]
    fn evaluate(&self, x: RowRef<'_, f64>, y: RowRef<'_, f64>) -> f64 {
        let mut sq_dist = 0.0;
        for k in 0..x.ncols() {
            let diff = x[k] - y[k];
            sq_dist += diff * diff;
        }
        self.variance * (-0.5 * sq_dist / (self.lengthscale * self.lengthscale)).exp()
    }
}

/// The Gram matrix `K[i, j] = k(x_i, x_j) + jitter * δ_ij` of a kernel over a point set.
///
/// Entries are computed when a row is requested; the matrix itself is never stored.
/// Points are the rows of `points` (one point per row, one feature per column).
pub struct KernelMatrix<K> {
    points: Mat<f64>,
    kernel: K,
    jitter: f64,
}

impl<K: Kernel> KernelMatrix<K> {
    pub fn new(points: Mat<f64>, kernel: K) -> Self {
        Self {
            points,
            kernel,
            jitter: 0.0,
        }
    }

    /// Adds `jitter` to every diagonal entry, the usual nugget term of a GP prior.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    /// The operator dimension, i.e. the number of points.
    pub fn dim(&self) -> usize {
        self.points.nrows()
    }

    /// Evaluates a single entry of the Gram matrix.
    #[inline]
    pub fn entry(&self, i: usize, j: usize) -> f64 {
        let value = self
            .kernel
            .evaluate(self.points.as_ref().row(i), self.points.as_ref().row(j));
        if i == j { value + self.jitter } else { value }
    }

    /// Materializes the full Gram matrix. Only meant for small problems and verification.
    pub fn to_dense(&self) -> Mat<f64> {
        let n = self.dim();
        Mat::from_fn(n, n, |i, j| self.entry(i, j))
    }
}

impl<K: Kernel> DiagonalSource for KernelMatrix<K> {
    fn fetch_diagonal(&self) -> Result<Vec<f64>> {
        Ok((0..self.dim()).map(|i| self.entry(i, i)).collect())
    }
}

impl<K: Kernel> RowSource for KernelMatrix<K> {
    fn fetch_row(&self, i: usize) -> Result<Vec<f64>> {
        ensure!(
            i < self.dim(),
            "row index {} out of bounds for a kernel matrix over {} points",
            i,
            self.dim()
        );
        Ok((0..self.dim()).map(|j| self.entry(i, j)).collect())
    }
}
