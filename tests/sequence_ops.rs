//! Integration tests for matrix sequences

mod common;

use common::{assert_allclose, dense};
use nnmatrix::prelude::*;
use proptest::prelude::*;

fn batch() -> MatrixSequence {
    MatrixSequence::from_matrices([
        dense(2, 1, &[1.0, 4.0]),
        dense(2, 1, &[2.0, 6.0]),
        dense(2, 1, &[3.0, 8.0]),
    ])
    .unwrap()
}

#[test]
fn test_statistics_across_entries() {
    let s = batch();
    assert_eq!(s.depth(), 3);
    assert_eq!(s.sum().unwrap().to_vec(), vec![6.0, 18.0]);
    assert_eq!(s.mean().unwrap().to_vec(), vec![2.0, 6.0]);
    assert_allclose(
        &s.variance(None).unwrap().to_vec(),
        &[2.0 / 3.0, 8.0 / 3.0],
        1e-12,
        0.0,
        "variance",
    );
    // sample standard deviation of (1, 2, 3) and (4, 6, 8)
    assert_allclose(
        &s.standard_deviation(None).unwrap().to_vec(),
        &[1.0, 2.0],
        1e-12,
        0.0,
        "standard deviation",
    );
}

#[test]
fn test_masked_cells_excluded_from_sum() {
    let mut s = batch();
    s.get_mut(1).unwrap().set_mask_at(1, 0, true);
    assert_eq!(s.sum().unwrap().to_vec(), vec![6.0, 12.0]);
}

#[test]
fn test_batch_ops_pair_by_key() {
    let s = batch();
    let doubled = s.add(&s).unwrap();
    assert_eq!(doubled.get(2).unwrap().to_vec(), vec![6.0, 16.0]);

    let weights = dense(1, 2, &[1.0, 1.0]);
    let projected = MatrixSequence::from_matrices([weights.reference(), weights.reference(), weights])
        .unwrap()
        .dot(&s)
        .unwrap();
    assert_eq!(projected.get(0).unwrap().to_vec(), vec![5.0]);
    assert_eq!(projected.get(2).unwrap().to_vec(), vec![11.0]);
}

#[test]
fn test_single_matrix_operand_applies_to_every_entry() {
    let s = batch();
    let scaled = s.multiply(&Matrix::scalar(10.0)).unwrap();
    assert!(scaled.iter().all(|(k, m)| m.equals(&s.get(k).unwrap().multiply_by(10.0).unwrap(), 0.0)));
}

#[test]
fn test_softmax_per_entry() {
    let s = batch().softmax().unwrap();
    for (_, entry) in s.iter() {
        let total: f64 = entry.to_vec().iter().sum();
        assert!((total - 1.0).abs() < 1e-12);
    }
}

#[test]
fn test_capacity_enforced() {
    let mut s = MatrixSequence::with_capacity(2).unwrap();
    s.push(Matrix::dense(1, 1)).unwrap();
    s.push(Matrix::dense(1, 1)).unwrap();
    assert!(matches!(
        s.push(Matrix::dense(1, 1)),
        Err(Error::CapacityExceeded { capacity: 2 })
    ));
    assert_eq!(s.capacity(), Some(2));
}

fn sequence_case() -> impl Strategy<Value = (usize, usize, Vec<Vec<f64>>)> {
    (1usize..4, 1usize..4, 1usize..5).prop_flat_map(|(rows, columns, depth)| {
        (
            Just(rows),
            Just(columns),
            prop::collection::vec(prop::collection::vec(-10.0f64..10.0, rows * columns), depth),
        )
    })
}

proptest! {
    #[test]
    fn prop_flatten_then_unflatten_restores_entries((rows, columns, entries) in sequence_case()) {
        let depth = entries.len();
        let s = MatrixSequence::from_matrices(entries.iter().map(|data| dense(rows, columns, data))).unwrap();
        let flat = s.flatten().unwrap();
        prop_assert_eq!(flat.depth(), 1);
        prop_assert_eq!(flat.shape(), Some([rows * columns * depth, 1]));
        let restored = flat.unflatten(rows, columns, depth).unwrap();
        prop_assert!(restored.equals(&s, 0.0));
    }

    #[test]
    fn prop_mean_times_depth_is_sum((rows, columns, entries) in sequence_case()) {
        let depth = entries.len() as f64;
        let s = MatrixSequence::from_matrices(entries.iter().map(|data| dense(rows, columns, data))).unwrap();
        let scaled = s.mean().unwrap().multiply_by(depth).unwrap();
        assert_allclose(&scaled.to_vec(), &s.sum().unwrap().to_vec(), 1e-9, 1e-9, "mean");
    }
}
