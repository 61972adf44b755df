//! Binary functions of (value, constant): losses and element-wise combinators

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::params::{FunctionParams, declaration};
use crate::error::{Error, Result};
use crate::matrix::Matrix;
use crate::ops::ElementwiseOps;

/// Two-argument closure held by custom functions
pub type PairFn = Arc<dyn Fn(f64, f64) -> f64 + Send + Sync>;

/// Named binary function kinds
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BinaryFunctionType {
    /// `0.5 * (v - c)^2`
    MeanSquaredError,
    /// `(ln(c + 1) - ln(v + 1))^2`
    MeanSquaredLogarithmicError,
    /// `|v - c|`
    MeanAbsoluteError,
    /// `100 * |(v - c) / c|`
    MeanAbsolutePercentageError,
    /// `-(c * ln v)`
    CrossEntropy,
    /// `c * ln c - c * ln v`
    KullbackLeibler,
    /// `-ln v`
    NegativeLogLikelihood,
    /// `v - c * ln v`
    Poisson,
    /// `max(0, margin - c * v)`
    Hinge,
    /// `max(0, 1 - c * v)^2`
    SquaredHinge,
    /// Quadratic within `delta`, linear outside
    Huber,
    /// Zero forward, passes `c` as gradient
    DirectGradient,
    /// Zero forward, gradient `-ln(v) * c`
    PolicyGradient,
    /// `v^c`
    Pow,
    /// `max(v, c)`
    Max,
    /// `min(v, c)`
    Min,
    /// Caller supplied closures
    Custom,
}

impl BinaryFunctionType {
    /// Every kind, in declaration order
    pub const ALL: [BinaryFunctionType; 17] = [
        Self::MeanSquaredError,
        Self::MeanSquaredLogarithmicError,
        Self::MeanAbsoluteError,
        Self::MeanAbsolutePercentageError,
        Self::CrossEntropy,
        Self::KullbackLeibler,
        Self::NegativeLogLikelihood,
        Self::Poisson,
        Self::Hinge,
        Self::SquaredHinge,
        Self::Huber,
        Self::DirectGradient,
        Self::PolicyGradient,
        Self::Pow,
        Self::Max,
        Self::Min,
        Self::Custom,
    ];

    /// Canonical upper-case name
    pub fn name(self) -> &'static str {
        match self {
            Self::MeanSquaredError => "MEAN_SQUARED_ERROR",
            Self::MeanSquaredLogarithmicError => "MEAN_SQUARED_LOGARITHMIC_ERROR",
            Self::MeanAbsoluteError => "MEAN_ABSOLUTE_ERROR",
            Self::MeanAbsolutePercentageError => "MEAN_ABSOLUTE_PERCENTAGE_ERROR",
            Self::CrossEntropy => "CROSS_ENTROPY",
            Self::KullbackLeibler => "KULLBACK_LEIBLER",
            Self::NegativeLogLikelihood => "NEGATIVE_LOG_LIKELIHOOD",
            Self::Poisson => "POISSON",
            Self::Hinge => "HINGE",
            Self::SquaredHinge => "SQUARED_HINGE",
            Self::Huber => "HUBER",
            Self::DirectGradient => "DIRECT_GRADIENT",
            Self::PolicyGradient => "POLICY_GRADIENT",
            Self::Pow => "POW",
            Self::Max => "MAX",
            Self::Min => "MIN",
            Self::Custom => "CUSTOM",
        }
    }

    /// Names of the tunable constants this kind accepts
    pub fn parameter_names(self) -> &'static [&'static str] {
        match self {
            Self::Hinge => &["margin"],
            Self::Huber => &["delta"],
            _ => &[],
        }
    }

    /// Parameter declaration string, or `None` for kinds without constants
    pub fn parameter_definition(self) -> Option<String> {
        let names = self.parameter_names();
        (!names.is_empty()).then(|| declaration(names))
    }
}

impl fmt::Display for BinaryFunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BinaryFunctionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::unsupported_function(s, "Unknown binary function"))
    }
}

#[derive(Clone)]
struct CustomBinary {
    function: PairFn,
    derivative: PairFn,
}

/// A binary function `f(value, constant)` paired with its derivative in `value`
#[derive(Clone)]
pub struct BinaryFunction {
    function_type: BinaryFunctionType,
    margin: f64,
    delta: f64,
    custom: Option<CustomBinary>,
}

impl BinaryFunction {
    /// Build a named function with default constants
    pub fn new(function_type: BinaryFunctionType) -> Result<Self> {
        Self::with_params(function_type, &FunctionParams::new())
    }

    /// Build a named function, overriding constants from `params`
    pub fn with_params(function_type: BinaryFunctionType, params: &FunctionParams) -> Result<Self> {
        if function_type == BinaryFunctionType::Custom {
            return Err(Error::unsupported_function(
                function_type.name(),
                "Custom function cannot be defined with this constructor",
            ));
        }
        params.validate(function_type.name(), function_type.parameter_names())?;
        Ok(Self {
            function_type,
            margin: params.get_or("margin", 1.0),
            delta: params.get_or("delta", 1.0),
            custom: None,
        })
    }

    /// Build a custom function from closures of `(value, constant)`
    pub fn custom<F, D>(function: F, derivative: D) -> Self
    where
        F: Fn(f64, f64) -> f64 + Send + Sync + 'static,
        D: Fn(f64, f64) -> f64 + Send + Sync + 'static,
    {
        Self {
            function_type: BinaryFunctionType::Custom,
            margin: 1.0,
            delta: 1.0,
            custom: Some(CustomBinary {
                function: Arc::new(function),
                derivative: Arc::new(derivative),
            }),
        }
    }

    /// Function kind
    pub fn function_type(&self) -> BinaryFunctionType {
        self.function_type
    }

    /// Constants this function was built with, keyed by declared name
    pub fn params(&self) -> FunctionParams {
        match self.function_type {
            BinaryFunctionType::Hinge => FunctionParams::new().with("margin", self.margin),
            BinaryFunctionType::Huber => FunctionParams::new().with("delta", self.delta),
            _ => FunctionParams::new(),
        }
    }

    /// Forward value
    pub fn function(&self, value: f64, constant: f64) -> f64 {
        let (v, c) = (value, constant);
        match self.function_type {
            BinaryFunctionType::MeanSquaredError => 0.5 * (v - c).powi(2),
            BinaryFunctionType::MeanSquaredLogarithmicError => {
                ((c + 1.0).ln() - (v + 1.0).ln()).powi(2)
            }
            BinaryFunctionType::MeanAbsoluteError => (v - c).abs(),
            BinaryFunctionType::MeanAbsolutePercentageError => 100.0 * ((v - c) / c).abs(),
            BinaryFunctionType::CrossEntropy => -(c * v.ln()),
            BinaryFunctionType::KullbackLeibler => c * c.ln() - c * v.ln(),
            BinaryFunctionType::NegativeLogLikelihood => -v.ln(),
            BinaryFunctionType::Poisson => v - c * v.ln(),
            BinaryFunctionType::Hinge => {
                let m = self.margin - c * v;
                if m <= 0.0 { 0.0 } else { m }
            }
            BinaryFunctionType::SquaredHinge => {
                let m = 1.0 - c * v;
                if m <= 0.0 { 0.0 } else { m * m }
            }
            BinaryFunctionType::Huber => {
                let diff = (v - c).abs();
                if diff <= self.delta {
                    0.5 * diff * diff
                } else {
                    self.delta * diff - 0.5 * self.delta * self.delta
                }
            }
            BinaryFunctionType::DirectGradient | BinaryFunctionType::PolicyGradient => 0.0,
            BinaryFunctionType::Pow => v.powf(c),
            BinaryFunctionType::Max => v.max(c),
            BinaryFunctionType::Min => v.min(c),
            BinaryFunctionType::Custom => self
                .custom
                .as_ref()
                .map_or(f64::NAN, |f| (f.function)(v, c)),
        }
    }

    /// Derivative with respect to `value`
    ///
    /// Formulas are not guarded against singular points; MAPE at `value ==
    /// constant` yields NaN.
    pub fn derivative(&self, value: f64, constant: f64) -> f64 {
        let (v, c) = (value, constant);
        match self.function_type {
            BinaryFunctionType::MeanSquaredError => v - c,
            BinaryFunctionType::MeanSquaredLogarithmicError => {
                -2.0 * ((c + 1.0).ln() - (v + 1.0).ln()) / (v + 1.0)
            }
            BinaryFunctionType::MeanAbsoluteError => sign(v - c),
            BinaryFunctionType::MeanAbsolutePercentageError => {
                100.0 * (v - c) / (c.abs() * (v - c).abs())
            }
            BinaryFunctionType::CrossEntropy | BinaryFunctionType::KullbackLeibler => -(c / v),
            BinaryFunctionType::NegativeLogLikelihood => -1.0 / v,
            BinaryFunctionType::Poisson => 1.0 - c / v,
            BinaryFunctionType::Hinge => {
                if self.margin - c * v <= 0.0 {
                    0.0
                } else {
                    -c
                }
            }
            BinaryFunctionType::SquaredHinge => {
                let m = 1.0 - c * v;
                if m <= 0.0 { 0.0 } else { -2.0 * c * m }
            }
            BinaryFunctionType::Huber => {
                if (v - c).abs() <= self.delta {
                    v - c
                } else {
                    self.delta * sign(v - c)
                }
            }
            BinaryFunctionType::DirectGradient => c,
            BinaryFunctionType::PolicyGradient => -v.ln() * c,
            BinaryFunctionType::Pow => c * v.powf(c - 1.0),
            BinaryFunctionType::Max | BinaryFunctionType::Min => 1.0,
            BinaryFunctionType::Custom => self
                .custom
                .as_ref()
                .map_or(f64::NAN, |f| (f.derivative)(v, c)),
        }
    }

    /// Apply element-wise between `first` (values) and `second` (constants)
    pub fn apply_function(&self, first: &Matrix, second: &Matrix) -> Result<Matrix> {
        first.apply_bi(second, self)
    }

    /// Back-propagate `out_grad` through this function with respect to `first`
    pub fn apply_gradient(&self, first: &Matrix, second: &Matrix, out_grad: &Matrix) -> Result<Matrix> {
        out_grad.multiply(&first.apply_bi_derivative(second, self)?)
    }
}

impl fmt::Debug for BinaryFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinaryFunction")
            .field("function_type", &self.function_type)
            .field("params", &self.params())
            .finish()
    }
}

#[inline]
fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_squared_error() {
        let mse = BinaryFunction::new(BinaryFunctionType::MeanSquaredError).unwrap();
        assert_eq!(mse.function(3.0, 1.0), 2.0);
        assert_eq!(mse.derivative(3.0, 1.0), 2.0);
    }

    #[test]
    fn test_hinge_margin() {
        let hinge = BinaryFunction::new(BinaryFunctionType::Hinge).unwrap();
        assert_eq!(hinge.function(2.0, 1.0), 0.0);
        assert_eq!(hinge.function(0.25, 1.0), 0.75);
        assert_eq!(hinge.derivative(0.25, 1.0), -1.0);

        let params = FunctionParams::new().with("margin", 3.0);
        let wide = BinaryFunction::with_params(BinaryFunctionType::Hinge, &params).unwrap();
        assert_eq!(wide.function(2.0, 1.0), 1.0);
        assert_eq!(wide.params().get("margin"), Some(3.0));
    }

    #[test]
    fn test_huber_branches() {
        let huber = BinaryFunction::new(BinaryFunctionType::Huber).unwrap();
        assert_eq!(huber.function(1.5, 1.0), 0.125);
        assert_eq!(huber.derivative(1.5, 1.0), 0.5);
        assert_eq!(huber.function(4.0, 1.0), 2.5);
        assert_eq!(huber.derivative(-4.0, 1.0), -1.0);
    }

    #[test]
    fn test_mape_unguarded_at_equality() {
        let mape = BinaryFunction::new(BinaryFunctionType::MeanAbsolutePercentageError).unwrap();
        assert!((mape.function(3.0, 2.0) - 50.0).abs() < 1e-12);
        assert!(mape.derivative(2.0, 2.0).is_nan());
    }

    #[test]
    fn test_derivatives_match_finite_differences() {
        let kinds = [
            BinaryFunctionType::MeanSquaredError,
            BinaryFunctionType::MeanSquaredLogarithmicError,
            BinaryFunctionType::MeanAbsoluteError,
            BinaryFunctionType::CrossEntropy,
            BinaryFunctionType::KullbackLeibler,
            BinaryFunctionType::NegativeLogLikelihood,
            BinaryFunctionType::Poisson,
            BinaryFunctionType::SquaredHinge,
            BinaryFunctionType::Pow,
        ];
        let h = 1e-6;
        for kind in kinds {
            let f = BinaryFunction::new(kind).unwrap();
            let (v, c) = (0.4, 0.9);
            let numeric = (f.function(v + h, c) - f.function(v - h, c)) / (2.0 * h);
            assert!(
                (f.derivative(v, c) - numeric).abs() < 1e-4,
                "{kind}: analytic {}, numeric {numeric}",
                f.derivative(v, c)
            );
        }
    }

    #[test]
    fn test_custom_and_errors() {
        let err = BinaryFunction::new(BinaryFunctionType::Custom).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFunction { .. }));

        let params = FunctionParams::new().with("margin", 1.0);
        let err = BinaryFunction::with_params(BinaryFunctionType::Huber, &params).unwrap_err();
        assert_eq!(err, Error::invalid_parameter("HUBER", "margin"));

        let diff = BinaryFunction::custom(|v, c| v - c, |_, _| 1.0);
        assert_eq!(diff.function(5.0, 2.0), 3.0);
        assert_eq!(diff.derivative(5.0, 2.0), 1.0);
    }

    #[test]
    fn test_from_str() {
        assert_eq!(
            "huber".parse::<BinaryFunctionType>().unwrap(),
            BinaryFunctionType::Huber
        );
        assert!("LOSS".parse::<BinaryFunctionType>().is_err());
    }
}
