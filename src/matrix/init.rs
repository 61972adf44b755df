//! Weight initialization
//!
//! Fan-based initializers draw from a zero-centred normal or uniform
//! distribution whose spread depends on the layer size:
//!
//! | Kind   | Normal standard deviation | Uniform bound          |
//! |--------|---------------------------|------------------------|
//! | Xavier | `sqrt(2 / (in + out))`    | `sqrt(6 / (in + out))` |
//! | He     | `sqrt(2 / in)`            | `sqrt(6 / in)`         |
//! | LeCun  | `sqrt(1 / in)`            | `sqrt(3 / in)`         |
//!
//! Plain kinds take `in` from the rows and `out` from the columns of the
//! matrix. Convolutional kinds take both from [`ConvolutionFans`] and use
//! `outputs` where plain He and LeCun use the rows.

use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use super::{Matrix, MatrixStorage};
use crate::error::{Error, Result};

/// Fan sizes of a convolutional layer
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ConvolutionFans {
    /// Channels times filter area
    pub inputs: usize,
    /// Filters times filter area
    pub outputs: usize,
}

impl ConvolutionFans {
    /// Fans of `channels` input channels and `filters` filters of side `filter_size`
    pub fn new(channels: usize, filters: usize, filter_size: usize) -> Self {
        let area = filter_size * filter_size;
        Self {
            inputs: channels * area,
            outputs: filters * area,
        }
    }
}

/// How [`Matrix::initialize`] fills a matrix
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Initialization {
    Zero,
    One,
    /// Uniform in `[0, 1)`
    Random,
    /// Ones on the diagonal
    Identity,
    NormalXavier,
    UniformXavier,
    NormalHe,
    UniformHe,
    NormalLecun,
    UniformLecun,
    NormalXavierConv(ConvolutionFans),
    UniformXavierConv(ConvolutionFans),
    NormalHeConv(ConvolutionFans),
    UniformHeConv(ConvolutionFans),
    NormalLecunConv(ConvolutionFans),
    UniformLecunConv(ConvolutionFans),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Spread {
    Normal,
    Uniform,
}

impl Initialization {
    /// Distribution, numerator and fan of the fan-based kinds
    fn fan_rule(self, rows: usize, columns: usize) -> Option<(Spread, f64, usize)> {
        use Initialization::*;
        let rule = match self {
            Zero | One | Random | Identity => return None,
            NormalXavier => (Spread::Normal, 2.0, rows + columns),
            UniformXavier => (Spread::Uniform, 6.0, rows + columns),
            NormalHe => (Spread::Normal, 2.0, rows),
            UniformHe => (Spread::Uniform, 6.0, rows),
            NormalLecun => (Spread::Normal, 1.0, rows),
            UniformLecun => (Spread::Uniform, 3.0, rows),
            NormalXavierConv(f) => (Spread::Normal, 2.0, f.inputs + f.outputs),
            UniformXavierConv(f) => (Spread::Uniform, 6.0, f.inputs + f.outputs),
            NormalHeConv(f) => (Spread::Normal, 2.0, f.outputs),
            UniformHeConv(f) => (Spread::Uniform, 6.0, f.outputs),
            NormalLecunConv(f) => (Spread::Normal, 1.0, f.outputs),
            UniformLecunConv(f) => (Spread::Uniform, 3.0, f.outputs),
        };
        Some(rule)
    }

    /// Standard deviation or uniform bound for a `rows x columns` matrix
    ///
    /// `None` for the non-random kinds and for a zero fan.
    pub fn scale(self, rows: usize, columns: usize) -> Option<f64> {
        let (_, numerator, fan) = self.fan_rule(rows, columns)?;
        (fan > 0).then(|| (numerator / fan as f64).sqrt())
    }
}

impl Matrix {
    /// Fill every cell from `initialization` using the thread-local generator
    pub fn initialize(&mut self, initialization: Initialization) -> Result<()> {
        self.initialize_with_rng(initialization, &mut rand::rng())
    }

    /// [`Matrix::initialize`] with a caller supplied generator
    ///
    /// A fan-based kind with a zero fan is [`Error::InvalidArgument`] unless
    /// the matrix is empty.
    pub fn initialize_with_rng<R: Rng + ?Sized>(
        &mut self,
        initialization: Initialization,
        rng: &mut R,
    ) -> Result<()> {
        let [rows, columns] = self.shape();
        match initialization {
            Initialization::Zero => self.initialize_to_value(0.0),
            Initialization::One => self.initialize_to_value(1.0),
            Initialization::Random => self.initialize_with(|_, _| rng.random::<f64>()),
            Initialization::Identity => self.initialize_with(|r, c| if r == c { 1.0 } else { 0.0 }),
            fan_based => {
                if self.size() == 0 {
                    return Ok(());
                }
                let Some((spread, _, _)) = fan_based.fan_rule(rows, columns) else {
                    return Ok(());
                };
                let Some(scale) = fan_based.scale(rows, columns) else {
                    tracing::debug!(?fan_based, rows, columns, "initialization fan is zero");
                    return Err(Error::invalid_argument(
                        "initialization",
                        format!("{fan_based:?} requires a positive fan"),
                    ));
                };
                match spread {
                    Spread::Normal => self.initialize_with(|_, _| {
                        let z: f64 = StandardNormal.sample(&mut *rng);
                        z * scale
                    }),
                    Spread::Uniform => {
                        self.initialize_with(|_, _| (2.0 * rng.random::<f64>() - 1.0) * scale)
                    }
                }
            }
        }
        Ok(())
    }

    /// Write `f(row, column)` into every cell in row-major order
    pub fn initialize_with<F: FnMut(usize, usize) -> f64>(&mut self, mut f: F) {
        let [rows, columns] = self.shape();
        for r in 0..rows {
            for c in 0..columns {
                self.set_value(r, c, f(r, c));
            }
        }
    }

    /// Write `value` into every cell
    pub fn initialize_to_value(&mut self, value: f64) {
        self.initialize_with(|_, _| value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::ReduceOps;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_constant_kinds() {
        let mut m = Matrix::dense(2, 3);
        m.initialize(Initialization::One).unwrap();
        assert!(m.to_vec().iter().all(|&v| v == 1.0));
        m.initialize(Initialization::Identity).unwrap();
        assert_eq!(m.to_vec(), vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
        m.initialize_to_value(-0.5);
        assert_eq!(m.sum(), -3.0);
        m.initialize(Initialization::Zero).unwrap();
        assert_eq!(m.sum(), 0.0);
    }

    #[test]
    fn test_uniform_xavier_stays_within_bound() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut m = Matrix::dense(20, 30);
        m.initialize_with_rng(Initialization::UniformXavier, &mut rng).unwrap();
        let bound = (6.0f64 / 50.0).sqrt();
        assert_eq!(Initialization::UniformXavier.scale(20, 30), Some(bound));
        assert!(m.to_vec().iter().all(|v| v.abs() <= bound));
        assert!(ReduceOps::max(&m) > bound / 2.0);
        assert!(m.mean().abs() < 0.05);
    }

    #[test]
    fn test_normal_he_spread() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut m = Matrix::dense(200, 100);
        m.initialize_with_rng(Initialization::NormalHe, &mut rng).unwrap();
        let expected = (2.0f64 / 200.0).sqrt();
        let spread = m.standard_deviation();
        assert!((spread - expected).abs() < expected * 0.05, "{spread} vs {expected}");
    }

    #[test]
    fn test_convolution_fans() {
        let fans = ConvolutionFans::new(3, 8, 3);
        assert_eq!(fans, ConvolutionFans { inputs: 27, outputs: 72 });
        let kind = Initialization::UniformLecunConv(fans);
        assert_eq!(kind.scale(1, 1), Some((3.0f64 / 72.0).sqrt()));

        let mut m = Matrix::dense(3, 3);
        let empty = ConvolutionFans { inputs: 0, outputs: 0 };
        assert!(matches!(
            m.initialize(Initialization::NormalXavierConv(empty)),
            Err(Error::InvalidArgument { arg: "initialization", .. })
        ));
    }

    #[test]
    fn test_seeded_draws_repeat() {
        let mut a = Matrix::dense(4, 4);
        let mut b = Matrix::dense(4, 4);
        a.initialize_with_rng(Initialization::NormalLecun, &mut StdRng::seed_from_u64(9)).unwrap();
        b.initialize_with_rng(Initialization::NormalLecun, &mut StdRng::seed_from_u64(9)).unwrap();
        assert_eq!(a, b);
        assert!(a.to_vec().iter().any(|&v| v != 0.0));
    }

    #[cfg(feature = "sparse")]
    #[test]
    fn test_sparse_keeps_kind() {
        let mut m = Matrix::sparse(3, 3);
        m.initialize(Initialization::Identity).unwrap();
        assert_eq!(m.kind(), crate::matrix::MatrixKind::Sparse);
        assert_eq!(m.sum(), 3.0);
    }
}
