//! Utilities for loading operators from disk and measuring memory.
//!
//! - **`data_loader`**: Reads dense symmetric matrices stored as headerless CSV.
//!   Used by the experiment binaries and the data-driven fixture tests.
//!
//! - **`perf`**: Reads the peak resident set size of the process on Linux.

pub mod data_loader;
pub mod perf;
