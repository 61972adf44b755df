//! Integration tests applying activation and loss functions to matrices

mod common;

use common::{assert_allclose, dense};
use nnmatrix::prelude::*;

#[test]
fn test_every_named_unary_kind_builds() {
    for kind in UnaryFunctionType::ALL {
        let built = UnaryFunction::new(kind);
        if kind == UnaryFunctionType::Custom {
            assert!(built.is_err());
        } else {
            let f = built.unwrap();
            assert_eq!(f.function_type(), kind);
            assert_eq!(kind.name().parse::<UnaryFunctionType>().unwrap(), kind);
        }
    }
}

#[test]
fn test_every_named_binary_kind_builds() {
    for kind in BinaryFunctionType::ALL {
        let built = BinaryFunction::new(kind);
        assert_eq!(built.is_err(), kind == BinaryFunctionType::Custom);
    }
}

#[test]
fn test_activation_gradient_over_matrix() {
    let sigmoid = UnaryFunction::new(UnaryFunctionType::Sigmoid).unwrap();
    let x = dense(1, 3, &[-1.0, 0.0, 1.0]);
    let out_grad = dense(1, 3, &[2.0, 2.0, 2.0]);
    let grad = sigmoid.apply_gradient(&x, &out_grad).unwrap();
    let expected: Vec<f64> = [-1.0f64, 0.0, 1.0]
        .iter()
        .map(|&v| {
            let s = 1.0 / (1.0 + (-v).exp());
            2.0 * s * (1.0 - s)
        })
        .collect();
    assert_allclose(&grad.to_vec(), &expected, 1e-12, 0.0, "sigmoid gradient");
}

#[test]
fn test_loss_against_target_matrix() {
    let mse = BinaryFunction::new(BinaryFunctionType::MeanSquaredError).unwrap();
    let prediction = dense(2, 2, &[1.0, 2.0, 3.0, 4.0]);
    let target = dense(2, 2, &[1.0, 0.0, 3.0, 0.0]);
    let loss = mse.apply_function(&prediction, &target).unwrap();
    assert_eq!(loss.to_vec(), vec![0.0, 2.0, 0.0, 8.0]);
    let gradient = prediction.apply_bi_derivative(&target, &mse).unwrap();
    assert_eq!(gradient.to_vec(), vec![0.0, 2.0, 0.0, 4.0]);
}

#[test]
fn test_loss_against_scalar_constant() {
    let hinge = BinaryFunction::new(BinaryFunctionType::Hinge).unwrap();
    let scores = dense(1, 3, &[-1.0, 0.5, 2.0]);
    let loss = scores.apply_bi(&Matrix::scalar(1.0), &hinge).unwrap();
    assert_eq!(loss.to_vec(), vec![2.0, 0.5, 0.0]);
}

#[test]
fn test_custom_function_on_matrix() {
    let cube = UnaryFunction::custom(|x| x * x * x, |x| 3.0 * x * x);
    let m = dense(1, 2, &[2.0, -1.0]);
    assert_eq!(m.apply(&cube).unwrap().to_vec(), vec![8.0, -1.0]);
    assert_eq!(m.apply_derivative(&cube).unwrap().to_vec(), vec![12.0, 3.0]);
}

#[test]
fn test_parameters_flow_into_matrix_results() {
    let params = FunctionParams::new().with("alpha", 0.5);
    let leaky = UnaryFunction::with_params(UnaryFunctionType::Relu, &params).unwrap();
    let m = dense(1, 2, &[-4.0, 4.0]);
    assert_eq!(m.apply(&leaky).unwrap().to_vec(), vec![-2.0, 4.0]);
    assert!(matches!(
        UnaryFunction::with_params(UnaryFunctionType::Relu, &FunctionParams::new().with("beta", 1.0)),
        Err(Error::InvalidParameter { .. })
    ));
}
