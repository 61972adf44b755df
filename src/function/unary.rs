//! Unary functions: activations and elementary math with analytic derivatives

use std::f64::consts::{FRAC_PI_2, LN_10, PI};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::params::{FunctionParams, declaration};
use crate::error::{Error, Result};
use crate::matrix::Matrix;
use crate::ops::{ElementwiseOps, LinalgOps, SoftmaxOps};

/// Scalar closure held by custom functions
pub type ScalarFn = Arc<dyn Fn(f64) -> f64 + Send + Sync>;

/// Named unary function kinds
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum UnaryFunctionType {
    Abs,
    Cos,
    Cosh,
    Exp,
    Log,
    Log10,
    Sgn,
    Sin,
    Sinh,
    Sqrt,
    Cbrt,
    Mulinv,
    Tan,
    Tanh,
    Linear,
    Sigmoid,
    Swish,
    HardSigmoid,
    BipolarSigmoid,
    TanhSig,
    TanhAppr,
    HardTanh,
    SoftPlus,
    SoftSign,
    Relu,
    ReluCos,
    ReluSin,
    Elu,
    Selu,
    Gelu,
    Softmax,
    GumbelSoftmax,
    Gaussian,
    SinAct,
    Logit,
    Custom,
}

impl UnaryFunctionType {
    /// Every kind, in declaration order
    pub const ALL: [UnaryFunctionType; 36] = [
        Self::Abs,
        Self::Cos,
        Self::Cosh,
        Self::Exp,
        Self::Log,
        Self::Log10,
        Self::Sgn,
        Self::Sin,
        Self::Sinh,
        Self::Sqrt,
        Self::Cbrt,
        Self::Mulinv,
        Self::Tan,
        Self::Tanh,
        Self::Linear,
        Self::Sigmoid,
        Self::Swish,
        Self::HardSigmoid,
        Self::BipolarSigmoid,
        Self::TanhSig,
        Self::TanhAppr,
        Self::HardTanh,
        Self::SoftPlus,
        Self::SoftSign,
        Self::Relu,
        Self::ReluCos,
        Self::ReluSin,
        Self::Elu,
        Self::Selu,
        Self::Gelu,
        Self::Softmax,
        Self::GumbelSoftmax,
        Self::Gaussian,
        Self::SinAct,
        Self::Logit,
        Self::Custom,
    ];

    /// Canonical upper-case name
    pub fn name(self) -> &'static str {
        match self {
            Self::Abs => "ABS",
            Self::Cos => "COS",
            Self::Cosh => "COSH",
            Self::Exp => "EXP",
            Self::Log => "LOG",
            Self::Log10 => "LOG10",
            Self::Sgn => "SGN",
            Self::Sin => "SIN",
            Self::Sinh => "SINH",
            Self::Sqrt => "SQRT",
            Self::Cbrt => "CBRT",
            Self::Mulinv => "MULINV",
            Self::Tan => "TAN",
            Self::Tanh => "TANH",
            Self::Linear => "LINEAR",
            Self::Sigmoid => "SIGMOID",
            Self::Swish => "SWISH",
            Self::HardSigmoid => "HARDSIGMOID",
            Self::BipolarSigmoid => "BIPOLARSIGMOID",
            Self::TanhSig => "TANHSIG",
            Self::TanhAppr => "TANHAPPR",
            Self::HardTanh => "HARDTANH",
            Self::SoftPlus => "SOFTPLUS",
            Self::SoftSign => "SOFTSIGN",
            Self::Relu => "RELU",
            Self::ReluCos => "RELU_COS",
            Self::ReluSin => "RELU_SIN",
            Self::Elu => "ELU",
            Self::Selu => "SELU",
            Self::Gelu => "GELU",
            Self::Softmax => "SOFTMAX",
            Self::GumbelSoftmax => "GUMBEL_SOFTMAX",
            Self::Gaussian => "GAUSSIAN",
            Self::SinAct => "SINACT",
            Self::Logit => "LOGIT",
            Self::Custom => "CUSTOM",
        }
    }

    /// Names of the tunable constants this kind accepts
    pub fn parameter_names(self) -> &'static [&'static str] {
        match self {
            Self::Relu | Self::Elu => &["threshold", "alpha"],
            Self::Selu => &["threshold", "alpha", "lambda"],
            Self::GumbelSoftmax => &["tau"],
            _ => &[],
        }
    }

    /// Parameter declaration string, or `None` for kinds without constants
    pub fn parameter_definition(self) -> Option<String> {
        let names = self.parameter_names();
        (!names.is_empty()).then(|| declaration(names))
    }

    /// True for kinds computed over the whole vector rather than per element
    pub fn is_softmax(self) -> bool {
        matches!(self, Self::Softmax | Self::GumbelSoftmax)
    }
}

impl fmt::Display for UnaryFunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for UnaryFunctionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::unsupported_function(s, "Unknown unary function"))
    }
}

/// Tunable constants resolved at construction
#[derive(Copy, Clone, Debug, PartialEq)]
struct UnaryConstants {
    threshold: f64,
    alpha: f64,
    lambda: f64,
    tau: f64,
}

impl UnaryConstants {
    fn defaults(kind: UnaryFunctionType) -> Self {
        let (alpha, lambda) = match kind {
            UnaryFunctionType::Elu => (1.0, 1.0),
            UnaryFunctionType::Selu => (1.6732, 1.0507),
            _ => (0.0, 1.0),
        };
        Self {
            threshold: 0.0,
            alpha,
            lambda,
            tau: 2.75,
        }
    }

    fn resolve(kind: UnaryFunctionType, params: &FunctionParams) -> Self {
        let defaults = Self::defaults(kind);
        Self {
            threshold: params.get_or("threshold", defaults.threshold),
            alpha: params.get_or("alpha", defaults.alpha),
            lambda: params.get_or("lambda", defaults.lambda),
            tau: params.get_or("tau", defaults.tau),
        }
    }
}

#[derive(Clone)]
struct CustomUnary {
    function: ScalarFn,
    derivative: ScalarFn,
}

/// A unary function paired with its derivative
///
/// Immutable after construction. Named kinds are reconstructed from their tag
/// and constants (see [`UnaryFunction::params`]); only [`UnaryFunctionType::Custom`]
/// holds closures.
///
/// ```
/// use nnmatrix::function::{UnaryFunction, UnaryFunctionType};
///
/// let relu = UnaryFunction::new(UnaryFunctionType::Relu).unwrap();
/// assert_eq!(relu.function(-1.0), 0.0);
/// assert_eq!(relu.derivative(0.0), 1.0);
/// ```
#[derive(Clone)]
pub struct UnaryFunction {
    function_type: UnaryFunctionType,
    constants: UnaryConstants,
    custom: Option<CustomUnary>,
}

impl UnaryFunction {
    /// Build a named function with default constants
    pub fn new(function_type: UnaryFunctionType) -> Result<Self> {
        Self::with_params(function_type, &FunctionParams::new())
    }

    /// Build a named function, overriding constants from `params`
    pub fn with_params(function_type: UnaryFunctionType, params: &FunctionParams) -> Result<Self> {
        if function_type == UnaryFunctionType::Custom {
            return Err(Error::unsupported_function(
                function_type.name(),
                "Custom function cannot be defined with this constructor",
            ));
        }
        params.validate(function_type.name(), function_type.parameter_names())?;
        Ok(Self {
            function_type,
            constants: UnaryConstants::resolve(function_type, params),
            custom: None,
        })
    }

    /// Build a custom function from a forward closure and its derivative
    pub fn custom<F, D>(function: F, derivative: D) -> Self
    where
        F: Fn(f64) -> f64 + Send + Sync + 'static,
        D: Fn(f64) -> f64 + Send + Sync + 'static,
    {
        Self {
            function_type: UnaryFunctionType::Custom,
            constants: UnaryConstants::defaults(UnaryFunctionType::Custom),
            custom: Some(CustomUnary {
                function: Arc::new(function),
                derivative: Arc::new(derivative),
            }),
        }
    }

    /// Function kind
    pub fn function_type(&self) -> UnaryFunctionType {
        self.function_type
    }

    /// Constants this function was built with, keyed by declared name
    pub fn params(&self) -> FunctionParams {
        let c = &self.constants;
        self.function_type
            .parameter_names()
            .iter()
            .map(|&name| {
                let value = match name {
                    "threshold" => c.threshold,
                    "alpha" => c.alpha,
                    "lambda" => c.lambda,
                    _ => c.tau,
                };
                (name, value)
            })
            .collect()
    }

    /// Temperature used by Gumbel softmax
    pub fn tau(&self) -> f64 {
        self.constants.tau
    }

    /// Forward value at `x`
    pub fn function(&self, x: f64) -> f64 {
        let UnaryConstants {
            threshold,
            alpha,
            lambda,
            ..
        } = self.constants;
        match self.function_type {
            UnaryFunctionType::Abs => x.abs(),
            UnaryFunctionType::Cos => x.cos(),
            UnaryFunctionType::Cosh => x.cosh(),
            UnaryFunctionType::Exp => x.exp(),
            UnaryFunctionType::Log => x.ln(),
            UnaryFunctionType::Log10 => x.log10(),
            UnaryFunctionType::Sgn => signum(x),
            UnaryFunctionType::Sin => x.sin(),
            UnaryFunctionType::Sinh => x.sinh(),
            UnaryFunctionType::Sqrt => x.sqrt(),
            UnaryFunctionType::Cbrt => x.cbrt(),
            UnaryFunctionType::Mulinv => 1.0 / x,
            UnaryFunctionType::Tan => x.tan(),
            UnaryFunctionType::Tanh => x.tanh(),
            UnaryFunctionType::Linear => x,
            UnaryFunctionType::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            UnaryFunctionType::Swish => x / (1.0 + (-x).exp()),
            UnaryFunctionType::HardSigmoid => (0.125 * x + 0.5).clamp(0.0, 1.0),
            UnaryFunctionType::BipolarSigmoid => 2.0 / (1.0 + (-x).exp()) - 1.0,
            UnaryFunctionType::TanhSig => 2.0 / ((-2.0 * x).exp() + 1.0) - 1.0,
            UnaryFunctionType::TanhAppr => {
                let e = (2.0 * x).exp();
                (e - 1.0) / (e + 1.0)
            }
            UnaryFunctionType::HardTanh => (0.5 * x).clamp(-1.0, 1.0),
            UnaryFunctionType::SoftPlus => (1.0 + x.exp()).ln(),
            UnaryFunctionType::SoftSign => x / (x.abs() + 1.0),
            UnaryFunctionType::Relu => {
                if x < threshold {
                    alpha * x
                } else {
                    x
                }
            }
            UnaryFunctionType::ReluCos => x.max(0.0) + x.cos(),
            UnaryFunctionType::ReluSin => x.max(0.0) + x.sin(),
            UnaryFunctionType::Elu => {
                if x < threshold {
                    alpha * (x.exp() - 1.0)
                } else {
                    x
                }
            }
            UnaryFunctionType::Selu => {
                if x < threshold {
                    lambda * alpha * (x.exp() - 1.0)
                } else {
                    lambda * x
                }
            }
            UnaryFunctionType::Gelu => 0.5 * x * (1.0 + gelu_inner(x).tanh()),
            // Whole-vector kinds; the element closure is a placeholder
            UnaryFunctionType::Softmax | UnaryFunctionType::GumbelSoftmax => 1.0,
            UnaryFunctionType::Gaussian => (-x * x / 2.0).exp(),
            UnaryFunctionType::SinAct => {
                if x < -FRAC_PI_2 {
                    -1.0
                } else if x > FRAC_PI_2 {
                    1.0
                } else {
                    x.sin()
                }
            }
            UnaryFunctionType::Logit => (x / (1.0 - x)).ln(),
            UnaryFunctionType::Custom => self.custom.as_ref().map_or(f64::NAN, |c| (c.function)(x)),
        }
    }

    /// Derivative at `x`
    pub fn derivative(&self, x: f64) -> f64 {
        let UnaryConstants {
            threshold,
            alpha,
            lambda,
            ..
        } = self.constants;
        match self.function_type {
            UnaryFunctionType::Abs => x / x.abs(),
            UnaryFunctionType::Cos => -x.sin(),
            UnaryFunctionType::Cosh => x.sinh(),
            UnaryFunctionType::Exp => x.exp(),
            UnaryFunctionType::Log => 1.0 / x,
            UnaryFunctionType::Log10 => 1.0 / (LN_10 * x),
            UnaryFunctionType::Sgn => 0.0,
            UnaryFunctionType::Sin => x.cos(),
            UnaryFunctionType::Sinh => x.cosh(),
            UnaryFunctionType::Sqrt => 1.0 / (2.0 * x.sqrt()),
            UnaryFunctionType::Cbrt => 1.0 / (3.0 * (x * x).cbrt()),
            UnaryFunctionType::Mulinv => -1.0 / (x * x),
            UnaryFunctionType::Tan => 1.0 + x.tan().powi(2),
            UnaryFunctionType::Tanh => 1.0 - x.tanh().powi(2),
            UnaryFunctionType::Linear => 1.0,
            UnaryFunctionType::Sigmoid => {
                let e = x.exp();
                e / (1.0 + e).powi(2)
            }
            UnaryFunctionType::Swish => {
                let e = x.exp();
                e * (e + x + 1.0) / (1.0 + e).powi(2)
            }
            UnaryFunctionType::HardSigmoid => {
                if !(-4.0..=4.0).contains(&x) {
                    0.0
                } else {
                    0.125
                }
            }
            UnaryFunctionType::BipolarSigmoid => {
                let e = x.exp();
                2.0 * e / (e + 1.0).powi(2)
            }
            UnaryFunctionType::TanhSig | UnaryFunctionType::TanhAppr => {
                let e = (2.0 * x).exp();
                4.0 * e / (e + 1.0).powi(2)
            }
            UnaryFunctionType::HardTanh => {
                if !(-2.0..=2.0).contains(&x) {
                    0.0
                } else {
                    0.5
                }
            }
            UnaryFunctionType::SoftPlus => 1.0 / (1.0 + (-x).exp()),
            UnaryFunctionType::SoftSign => 1.0 / (x.abs() + 1.0).powi(2),
            UnaryFunctionType::Relu => {
                if x < threshold {
                    alpha
                } else {
                    1.0
                }
            }
            UnaryFunctionType::ReluCos => step(x) - x.sin(),
            UnaryFunctionType::ReluSin => step(x) + x.cos(),
            UnaryFunctionType::Elu => {
                if x < threshold {
                    alpha * x.exp()
                } else {
                    1.0
                }
            }
            UnaryFunctionType::Selu => {
                if x < threshold {
                    lambda * alpha * x.exp()
                } else {
                    lambda
                }
            }
            UnaryFunctionType::Gelu => {
                let sech = 1.0 / gelu_inner(x).cosh();
                0.5 * (1.0 + gelu_inner(x).tanh())
                    + x * (0.134145 * x * x + 1.0) * sech * sech / (2.0 * PI).sqrt()
            }
            UnaryFunctionType::Softmax | UnaryFunctionType::GumbelSoftmax => 1.0,
            UnaryFunctionType::Gaussian => -2.0 * x * (-x * x / 2.0).exp(),
            UnaryFunctionType::SinAct => {
                if !(-FRAC_PI_2..=FRAC_PI_2).contains(&x) {
                    0.0
                } else {
                    x.cos()
                }
            }
            UnaryFunctionType::Logit => -1.0 / ((x - 1.0) * x),
            UnaryFunctionType::Custom => self
                .custom
                .as_ref()
                .map_or(f64::NAN, |c| (c.derivative)(x)),
        }
    }

    /// Apply to a whole matrix
    ///
    /// Softmax kinds run the column-vector softmax instead of the element closure.
    pub fn apply_function(&self, input: &Matrix) -> Result<Matrix> {
        match self.function_type {
            UnaryFunctionType::Softmax => input.softmax(),
            UnaryFunctionType::GumbelSoftmax => input.gumbel_softmax(self.constants.tau),
            _ => input.apply(self),
        }
    }

    /// Back-propagate `out_grad` through this function
    ///
    /// For softmax kinds `value` must hold the forward output and the Jacobian
    /// is applied; otherwise `value` is the forward input and the derivative is
    /// multiplied element-wise.
    pub fn apply_gradient(&self, value: &Matrix, out_grad: &Matrix) -> Result<Matrix> {
        if self.function_type.is_softmax() {
            value.softmax_grad()?.dot(out_grad)
        } else {
            out_grad.multiply(&value.apply_derivative(self)?)
        }
    }
}

impl fmt::Debug for UnaryFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnaryFunction")
            .field("function_type", &self.function_type)
            .field("params", &self.params())
            .finish()
    }
}

#[inline]
fn signum(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

#[inline]
fn step(x: f64) -> f64 {
    if x < 0.0 { 0.0 } else { 1.0 }
}

#[inline]
fn gelu_inner(x: f64) -> f64 {
    (2.0 / PI).sqrt() * (x + 0.044715 * x.powi(3))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric_derivative(f: &UnaryFunction, x: f64) -> f64 {
        let h = 1e-6;
        (f.function(x + h) - f.function(x - h)) / (2.0 * h)
    }

    #[test]
    fn test_relu_defaults() {
        let relu = UnaryFunction::new(UnaryFunctionType::Relu).unwrap();
        let inputs = [-2.0, -1.0, 0.0, 1.0, 2.0];
        let values: Vec<f64> = inputs.iter().map(|&x| relu.function(x)).collect();
        let grads: Vec<f64> = inputs.iter().map(|&x| relu.derivative(x)).collect();
        assert_eq!(values, vec![0.0, 0.0, 0.0, 1.0, 2.0]);
        assert_eq!(grads, vec![0.0, 0.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_leaky_relu_params() {
        let params = FunctionParams::new().with("alpha", 0.1);
        let relu = UnaryFunction::with_params(UnaryFunctionType::Relu, &params).unwrap();
        assert!((relu.function(-2.0) + 0.2).abs() < 1e-12);
        assert!((relu.derivative(-2.0) - 0.1).abs() < 1e-12);
        assert_eq!(relu.params().get("threshold"), Some(0.0));
    }

    #[test]
    fn test_derivatives_match_finite_differences() {
        let kinds = [
            UnaryFunctionType::Cos,
            UnaryFunctionType::Cosh,
            UnaryFunctionType::Exp,
            UnaryFunctionType::Log,
            UnaryFunctionType::Log10,
            UnaryFunctionType::Sin,
            UnaryFunctionType::Sinh,
            UnaryFunctionType::Sqrt,
            UnaryFunctionType::Cbrt,
            UnaryFunctionType::Mulinv,
            UnaryFunctionType::Tan,
            UnaryFunctionType::Tanh,
            UnaryFunctionType::Sigmoid,
            UnaryFunctionType::Swish,
            UnaryFunctionType::BipolarSigmoid,
            UnaryFunctionType::TanhSig,
            UnaryFunctionType::TanhAppr,
            UnaryFunctionType::SoftPlus,
            UnaryFunctionType::SoftSign,
            UnaryFunctionType::Elu,
            UnaryFunctionType::Selu,
            UnaryFunctionType::Gelu,
            UnaryFunctionType::SinAct,
            UnaryFunctionType::Logit,
        ];
        for kind in kinds {
            let f = UnaryFunction::new(kind).unwrap();
            for x in [0.3, 0.7] {
                let analytic = f.derivative(x);
                let numeric = numeric_derivative(&f, x);
                assert!(
                    (analytic - numeric).abs() < 1e-4,
                    "{kind} at {x}: analytic {analytic}, numeric {numeric}"
                );
            }
        }
    }

    #[test]
    fn test_clamped_kinds() {
        let hs = UnaryFunction::new(UnaryFunctionType::HardSigmoid).unwrap();
        assert_eq!(hs.function(10.0), 1.0);
        assert_eq!(hs.function(-10.0), 0.0);
        assert_eq!(hs.derivative(5.0), 0.0);
        assert_eq!(hs.derivative(1.0), 0.125);

        let ht = UnaryFunction::new(UnaryFunctionType::HardTanh).unwrap();
        assert_eq!(ht.function(4.0), 1.0);
        assert_eq!(ht.derivative(-3.0), 0.0);
        assert_eq!(ht.derivative(1.0), 0.5);
    }

    #[test]
    fn test_softmax_stubs_and_tau() {
        let sm = UnaryFunction::new(UnaryFunctionType::Softmax).unwrap();
        assert_eq!(sm.function(3.0), 1.0);
        assert_eq!(sm.derivative(3.0), 1.0);

        let gumbel = UnaryFunction::new(UnaryFunctionType::GumbelSoftmax).unwrap();
        assert_eq!(gumbel.tau(), 2.75);
    }

    #[test]
    fn test_custom_rejected_by_named_constructor() {
        let err = UnaryFunction::new(UnaryFunctionType::Custom).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFunction { .. }));
    }

    #[test]
    fn test_custom_closures() {
        let square = UnaryFunction::custom(|x| x * x, |x| 2.0 * x);
        assert_eq!(square.function_type(), UnaryFunctionType::Custom);
        assert_eq!(square.function(3.0), 9.0);
        assert_eq!(square.derivative(3.0), 6.0);
        assert!(square.params().is_empty());
    }

    #[test]
    fn test_unknown_parameter() {
        let params = FunctionParams::new().with("margin", 1.0);
        let err = UnaryFunction::with_params(UnaryFunctionType::Elu, &params).unwrap_err();
        assert_eq!(err, Error::invalid_parameter("ELU", "margin"));
    }

    #[test]
    fn test_from_str() {
        assert_eq!(
            "relu_cos".parse::<UnaryFunctionType>().unwrap(),
            UnaryFunctionType::ReluCos
        );
        assert!(matches!(
            "NOPE".parse::<UnaryFunctionType>(),
            Err(Error::UnsupportedFunction { .. })
        ));
        assert_eq!(
            UnaryFunctionType::Selu.parameter_definition().as_deref(),
            Some("(threshold:DOUBLE), (alpha:DOUBLE), (lambda:DOUBLE)")
        );
        assert_eq!(UnaryFunctionType::Tanh.parameter_definition(), None);
    }
}
