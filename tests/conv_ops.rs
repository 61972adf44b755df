//! Integration tests for convolution and pooling operations

mod common;

use common::{assert_allclose, dense};
use nnmatrix::ops::compute_output_size;
use nnmatrix::prelude::*;
use proptest::prelude::*;

/// Filter rotated by 180 degrees
fn flipped(filter: &Matrix) -> Matrix {
    let [rows, columns] = filter.shape();
    let mut result = Matrix::dense(rows, columns);
    for r in 0..rows {
        for c in 0..columns {
            result.set(rows - 1 - r, columns - 1 - c, filter.get(r, c).unwrap()).unwrap();
        }
    }
    result
}

// =============================================================================
// Convolution
// =============================================================================

#[test]
fn test_edge_filter_on_constant_input() {
    let input = dense(3, 5, &[5.0; 15]);
    let edge = dense(1, 3, &[-1.0, 0.0, 1.0]);
    let out = input.crosscorrelate(&edge, ConvolutionParams::default()).unwrap();
    assert_eq!(out.shape(), [3, 3]);
    assert!(out.to_vec().iter().all(|v| v.abs() < 1e-12));
}

#[test]
fn test_moving_sum() {
    let input = dense(1, 5, &[1.0, 2.0, 3.0, 4.0, 5.0]);
    let window = dense(1, 3, &[1.0, 1.0, 1.0]);
    let out = input.convolve(&window, ConvolutionParams::default()).unwrap();
    assert_eq!(out.to_vec(), vec![6.0, 9.0, 12.0]);
}

#[test]
fn test_output_size() {
    assert_eq!(compute_output_size(5, 3, 1), Some(3));
    assert_eq!(compute_output_size(5, 3, 2), Some(2));
    assert_eq!(compute_output_size(6, 3, 2), Some(2));
    assert_eq!(compute_output_size(2, 3, 1), None);
    assert!(ConvolutionParams::new(0, 1).is_err());
    assert!(ConvolutionParams::new(1, 0).is_err());
}

#[test]
fn test_masked_input_cells_dropped() {
    let mut input = dense(2, 2, &[1.0, 2.0, 3.0, 4.0]);
    input.set_mask_at(0, 1, true);
    let ones = dense(2, 2, &[1.0; 4]);
    let out = input.crosscorrelate(&ones, ConvolutionParams::default()).unwrap();
    assert_eq!(out.to_vec(), vec![8.0]);
}

#[test]
fn test_gradients_have_input_and_filter_shapes() {
    let input = dense(4, 4, &(0..16).map(f64::from).collect::<Vec<_>>());
    let filter = dense(2, 2, &[1.0, -1.0, 0.5, 2.0]);
    let params = ConvolutionParams::new(2, 1).unwrap();
    let out = input.convolve(&filter, params).unwrap();
    assert_eq!(out.shape(), [2, 2]);

    let upstream = dense(2, 2, &[1.0; 4]);
    assert_eq!(upstream.convolve_input_gradient(&filter, params).unwrap().shape(), [4, 4]);
    let fg = upstream.convolve_filter_gradient(&input, 2, 2, params).unwrap();
    assert_eq!(fg.shape(), [2, 2]);
}

fn conv_case() -> impl Strategy<Value = (usize, usize, Vec<f64>, usize, Vec<f64>, usize, usize)> {
    (3usize..7, 3usize..7, 1usize..4, 1usize..3, 1usize..3).prop_flat_map(
        |(rows, columns, size, stride, dilation)| {
            (
                Just(rows),
                Just(columns),
                prop::collection::vec(-5.0f64..5.0, rows * columns),
                Just(size),
                prop::collection::vec(-2.0f64..2.0, size * size),
                Just(stride),
                Just(dilation),
            )
        },
    )
}

proptest! {
    #[test]
    fn prop_convolution_is_flipped_crosscorrelation(
        (rows, columns, data, size, weights, stride, dilation) in conv_case()
    ) {
        let input = dense(rows, columns, &data);
        let filter = dense(size, size, &weights);
        let params = ConvolutionParams::new(stride, dilation).unwrap();
        let convolved = input.convolve(&filter, params).unwrap();
        let correlated = input.crosscorrelate(&flipped(&filter), params).unwrap();
        prop_assert_eq!(convolved.shape(), correlated.shape());
        assert_allclose(&convolved.to_vec(), &correlated.to_vec(), 1e-12, 1e-12, "convolve");
    }

    #[test]
    fn prop_filter_gradient_matches_forward_linearity(
        (rows, columns, data, size, weights, stride, dilation) in conv_case()
    ) {
        // with an all-ones upstream gradient, <filter, dL/dfilter> equals the sum of the output
        let input = dense(rows, columns, &data);
        let filter = dense(size, size, &weights);
        let params = ConvolutionParams::new(stride, dilation).unwrap();
        let out = input.crosscorrelate(&filter, params).unwrap();
        let [out_rows, out_columns] = out.shape();
        let ones = dense(out_rows, out_columns, &vec![1.0; out_rows * out_columns]);
        let fg = ones.crosscorrelate_filter_gradient(&input, size, size, params).unwrap();
        let dot: f64 = fg.to_vec().iter().zip(&weights).map(|(g, w)| g * w).sum();
        prop_assert!((dot - out.sum()).abs() < 1e-9);
    }
}

// =============================================================================
// Pooling
// =============================================================================

#[test]
fn test_max_pool_scenario() {
    let input = dense(
        4,
        4,
        &[
            1.0, 3.0, 2.0, 4.0, //
            5.0, 7.0, 6.0, 8.0, //
            9.0, 11.0, 10.0, 12.0, //
            13.0, 15.0, 14.0, 16.0,
        ],
    );
    let params = PoolParams::new(2, 2).unwrap();
    let (pooled, indices) = input.max_pool(params).unwrap();
    assert_eq!(pooled.to_vec(), vec![7.0, 8.0, 15.0, 16.0]);
    assert_eq!(indices.get(0, 0), Some((1, 1)));
    assert_eq!(indices.get(0, 1), Some((1, 3)));

    let upstream = dense(2, 2, &[1.0, 2.0, 3.0, 4.0]);
    let gradient = upstream.max_pool_gradient(&indices).unwrap();
    assert_eq!(gradient.get(1, 1).unwrap(), 1.0);
    assert_eq!(gradient.get(3, 3).unwrap(), 4.0);
    assert_eq!(gradient.sum(), 10.0);
}

#[test]
fn test_average_pool_overlapping_windows() {
    let input = dense(3, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
    let params = PoolParams::new(2, 1).unwrap();
    let pooled = input.average_pool(params).unwrap();
    assert_eq!(pooled.to_vec(), vec![3.0, 4.0, 6.0, 7.0]);

    let gradient = dense(2, 2, &[1.0; 4]).average_pool_gradient(params, 3, 3).unwrap();
    // the centre cell belongs to all four windows
    assert_eq!(gradient.get(1, 1).unwrap(), 1.0);
    assert_eq!(gradient.get(0, 0).unwrap(), 0.25);
}

#[test]
fn test_pool_window_larger_than_input() {
    let params = PoolParams::new(3, 1).unwrap();
    assert!(matches!(
        Matrix::dense(2, 2).max_pool(params),
        Err(Error::IncompatibleDimensions { .. })
    ));
}
