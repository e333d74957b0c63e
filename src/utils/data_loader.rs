//! This module provides utilities for loading test operators from files.
//!
//! Matrices are stored as headerless CSV, one matrix row per line, values separated
//! by commas. The loader checks that the matrix is square and, optionally, symmetric
//! before handing it to the factorization.

use csv::ReaderBuilder;
use faer::Mat;
use std::path::Path;
use thiserror::Error;

/// Represents all possible errors that can occur during data loading and parsing.
#[derive(Error, Debug)]
pub enum DataLoaderError {
    /// Wraps an error from the CSV reader, including I/O failures.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    /// Occurs when a field cannot be parsed into a float.
    #[error("Parse error: Failed to parse float from '{value}' at row {row}, column {col}")]
    ParseFloat { value: String, row: usize, col: usize },
    /// Occurs when the file holds no rows.
    #[error("Format error: The matrix file is empty.")]
    Empty,
    /// Occurs when a row has a different number of entries than the first row.
    #[error("Format error: Row {row} has {actual} entries, expected {expected}.")]
    RaggedRow {
        row: usize,
        expected: usize,
        actual: usize,
    },
    /// Occurs when the number of rows and columns differ.
    #[error("Dimension mismatch: matrix is {nrows}x{ncols}, expected a square matrix.")]
    NotSquare { nrows: usize, ncols: usize },
    /// Occurs when `A[i, j]` and `A[j, i]` differ by more than the tolerance.
    #[error("Symmetry error: entries ({i}, {j}) and ({j}, {i}) differ by {difference:e}.")]
    NotSymmetric { i: usize, j: usize, difference: f64 },
}

/// Loads a dense square matrix from a headerless CSV file.
///
/// # Arguments
/// * `path`: The path to the `.csv` file.
///
/// # Returns
/// The matrix as a [`faer::Mat`], or a [`DataLoaderError`] if the file cannot be
/// read, holds a non-numeric field, has ragged rows or is not square.
pub fn load_dense_matrix(path: impl AsRef<Path>) -> Result<Mat<f64>, DataLoaderError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut rows: Vec<Vec<f64>> = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let values = record
            .iter()
            .enumerate()
            .map(|(col, field)| {
                field.parse::<f64>().map_err(|_| DataLoaderError::ParseFloat {
                    value: field.to_string(),
                    row,
                    col,
                })
            })
            .collect::<Result<Vec<f64>, _>>()?;
        rows.push(values);
    }

    let nrows = rows.len();
    let ncols = rows.first().map(Vec::len).ok_or(DataLoaderError::Empty)?;
    if let Some((row, values)) = rows.iter().enumerate().find(|(_, r)| r.len() != ncols) {
        return Err(DataLoaderError::RaggedRow {
            row,
            expected: ncols,
            actual: values.len(),
        });
    }
    if nrows != ncols {
        return Err(DataLoaderError::NotSquare { nrows, ncols });
    }

    Ok(Mat::from_fn(nrows, ncols, |i, j| rows[i][j]))
}

/// Loads a dense matrix and checks that it is symmetric up to `tolerance`.
pub fn load_symmetric_matrix(
    path: impl AsRef<Path>,
    tolerance: f64,
) -> Result<Mat<f64>, DataLoaderError> {
    let a = load_dense_matrix(path)?;
    let n = a.nrows();
    for j in 0..n {
        for i in j + 1..n {
            let difference = (a[(i, j)] - a[(j, i)]).abs();
            if difference > tolerance {
                return Err(DataLoaderError::NotSymmetric { i, j, difference });
            }
        }
    }
    Ok(a)
}
