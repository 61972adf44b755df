//! Common test utilities
#![allow(dead_code)]

use nnmatrix::matrix::{DenseMatrix, Matrix};
#[cfg(feature = "sparse")]
use nnmatrix::matrix::SparseMatrix;

/// Assert two f64 slices are close within tolerance
///
/// Uses the formula: |a - b| <= atol + rtol * |b|
pub fn assert_allclose(a: &[f64], b: &[f64], rtol: f64, atol: f64, msg: &str) {
    assert_eq!(a.len(), b.len(), "{}: length mismatch", msg);
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        let diff = (x - y).abs();
        let tol = atol + rtol * y.abs();
        assert!(
            diff <= tol,
            "{}: element {} differs: {} vs {} (diff={}, tol={})",
            msg,
            i,
            x,
            y,
            diff,
            tol
        );
    }
}

/// Dense matrix from row-major data
pub fn dense(rows: usize, columns: usize, data: &[f64]) -> Matrix {
    DenseMatrix::from_vec(rows, columns, data.to_vec())
        .expect("data length matches shape")
        .into()
}

/// Sparse matrix holding the same values as [`dense`]
#[cfg(feature = "sparse")]
pub fn sparse(rows: usize, columns: usize, data: &[f64]) -> Matrix {
    SparseMatrix::from_vec(rows, columns, data)
        .expect("data length matches shape")
        .into()
}

/// Route tracing output to the test harness, filtered by `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
