//! Integration tests for softmax, Gumbel softmax and the softmax Jacobian

mod common;

use common::assert_allclose;
use nnmatrix::prelude::*;
use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;

#[test]
fn test_softmax_scenario() {
    let s = Matrix::column(&[1.0, 2.0, 3.0]).softmax().unwrap();
    assert_allclose(
        &s.to_vec(),
        &[0.09003057317038046, 0.24472847105479767, 0.6652409557748219],
        1e-12,
        0.0,
        "softmax",
    );
}

#[test]
fn test_large_logits_do_not_overflow() {
    let s = Matrix::column(&[1000.0, 1000.0]).softmax().unwrap();
    assert_allclose(&s.to_vec(), &[0.5, 0.5], 0.0, 1e-12, "stable softmax");
}

#[test]
fn test_softmax_function_through_apply() {
    let softmax = UnaryFunction::new(UnaryFunctionType::Softmax).unwrap();
    let input = Matrix::column(&[0.0, 0.0, 0.0, 0.0]);
    let s = softmax.apply_function(&input).unwrap();
    assert_allclose(&s.to_vec(), &[0.25; 4], 0.0, 1e-12, "uniform");
}

#[test]
fn test_gumbel_softmax_seeded_draws_repeat() {
    let m = Matrix::column(&[0.2, 0.4, -0.1]);
    let a = m.gumbel_softmax_with_rng(0.5, &mut StdRng::seed_from_u64(3)).unwrap();
    let b = m.gumbel_softmax_with_rng(0.5, &mut StdRng::seed_from_u64(3)).unwrap();
    assert_eq!(a.to_vec(), b.to_vec());
    assert!(matches!(
        m.gumbel_softmax(f64::NAN),
        Err(Error::InvalidArgument { arg: "tau", .. })
    ));
}

#[test]
fn test_jacobian_times_gradient() {
    let s = Matrix::column(&[0.2, 0.8]);
    let j = s.softmax_grad().unwrap();
    assert_eq!(j.shape(), [2, 2]);
    let upstream = Matrix::column(&[1.0, 0.0]);
    let g = j.dot(&upstream).unwrap();
    assert_allclose(&g.to_vec(), &[0.8, -0.8], 0.0, 1e-12, "jacobian product");
}

proptest! {
    #[test]
    fn prop_softmax_is_a_distribution(values in prop::collection::vec(-50.0f64..50.0, 1..12)) {
        let s = Matrix::column(&values).softmax().unwrap();
        let total: f64 = s.to_vec().iter().sum();
        prop_assert!((total - 1.0).abs() < 1e-9);
        prop_assert!(s.to_vec().iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn prop_softmax_ignores_constant_shift(
        values in prop::collection::vec(-20.0f64..20.0, 1..8),
        shift in -100.0f64..100.0,
    ) {
        let m = Matrix::column(&values);
        let shifted = m.add_constant(shift).unwrap();
        assert_allclose(
            &shifted.softmax().unwrap().to_vec(),
            &m.softmax().unwrap().to_vec(),
            1e-9,
            1e-12,
            "shift",
        );
    }

    #[test]
    fn prop_gumbel_softmax_is_a_distribution(
        values in prop::collection::vec(-5.0f64..5.0, 1..8),
        tau in 0.1f64..5.0,
        seed in any::<u64>(),
    ) {
        let mut rng = StdRng::seed_from_u64(seed);
        let g = Matrix::column(&values).gumbel_softmax_with_rng(tau, &mut rng).unwrap();
        let total: f64 = g.to_vec().iter().sum();
        prop_assert!((total - 1.0).abs() < 1e-9);
    }
}
