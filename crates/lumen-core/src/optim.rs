use serde::{Deserialize, Serialize};

use crate::conv::{Convolution, WeightedQuadraticCost};
use crate::error::{LumenError, Result};
use crate::regul::HyperbolicTotalVariation;
use crate::vector::{Real, ShapedVector, VectorSpace};

/// A mapping between two vector spaces.
///
/// `apply` validates that `src` belongs to the input space and `dst`
/// to the output space and fails with `IncorrectSpace` otherwise.
pub trait Mapping<T: Real> {
    fn input_space(&self) -> &VectorSpace<T>;
    fn output_space(&self) -> &VectorSpace<T>;
    fn apply(&mut self, dst: &mut ShapedVector<T>, src: &ShapedVector<T>) -> Result<()>;
}

/// A mapping with a Jacobian-transpose: `apply_jacobian` pulls an
/// output-space perturbation `v` at the point `x` back to the input
/// space.
pub trait DifferentiableMapping<T: Real>: Mapping<T> {
    fn apply_jacobian(
        &mut self,
        dst: &mut ShapedVector<T>,
        x: &ShapedVector<T>,
        v: &ShapedVector<T>,
    ) -> Result<()>;
}

/// A differentiable cost `x -> alpha * f(x)` over one vector space,
/// the contract an external iterative minimizer consumes.
pub trait DifferentiableCost<T: Real> {
    fn cost(&mut self, alpha: f64, x: &ShapedVector<T>) -> Result<f64>;

    /// Evaluate cost and gradient; the gradient is stored into `gx`
    /// when `clear`, accumulated otherwise.
    fn cost_and_gradient(
        &mut self,
        alpha: f64,
        x: &ShapedVector<T>,
        gx: &mut ShapedVector<T>,
        clear: bool,
    ) -> Result<f64>;
}

impl<T: Real> Mapping<T> for Convolution<T> {
    fn input_space(&self) -> &VectorSpace<T> {
        Convolution::input_space(self)
    }

    fn output_space(&self) -> &VectorSpace<T> {
        Convolution::output_space(self)
    }

    fn apply(&mut self, dst: &mut ShapedVector<T>, src: &ShapedVector<T>) -> Result<()> {
        Convolution::apply(self, dst, src, false)
    }
}

impl<T: Real> DifferentiableMapping<T> for Convolution<T> {
    /// The operator is linear: the Jacobian-transpose is the adjoint
    /// convolution, independent of the point `x`.
    fn apply_jacobian(
        &mut self,
        dst: &mut ShapedVector<T>,
        _x: &ShapedVector<T>,
        v: &ShapedVector<T>,
    ) -> Result<()> {
        Convolution::apply(self, dst, v, true)
    }
}

impl<T: Real> DifferentiableCost<T> for WeightedQuadraticCost<T> {
    fn cost(&mut self, alpha: f64, x: &ShapedVector<T>) -> Result<f64> {
        WeightedQuadraticCost::cost(self, alpha, x)
    }

    fn cost_and_gradient(
        &mut self,
        alpha: f64,
        x: &ShapedVector<T>,
        gx: &mut ShapedVector<T>,
        clear: bool,
    ) -> Result<f64> {
        WeightedQuadraticCost::cost_and_gradient(self, alpha, x, gx, clear)
    }
}

impl<T: Real> DifferentiableCost<T> for HyperbolicTotalVariation {
    fn cost(&mut self, alpha: f64, x: &ShapedVector<T>) -> Result<f64> {
        HyperbolicTotalVariation::cost(self, alpha, x)
    }

    fn cost_and_gradient(
        &mut self,
        alpha: f64,
        x: &ShapedVector<T>,
        gx: &mut ShapedVector<T>,
        clear: bool,
    ) -> Result<f64> {
        if clear {
            gx.zero();
        }
        HyperbolicTotalVariation::cost_and_gradient(self, alpha, x, gx)
    }
}

/// Task requested from the caller by a reverse-communication
/// minimizer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptimTask {
    /// Evaluate f and g at the current iterate.
    ComputeFg,
    /// A new acceptable iterate is available.
    NewX,
    /// The final iterate is available.
    FinalX,
    /// The minimization failed.
    Error,
}

/// Stopping rules of the outer minimizer.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct StopCriteria {
    /// Absolute gradient-norm tolerance.
    pub gatol: f64,
    /// Gradient-norm tolerance relative to the initial gradient norm.
    pub grtol: f64,
    /// Maximum number of iterations (None = unbounded).
    pub max_iterations: Option<usize>,
    /// Maximum number of cost evaluations (None = unbounded).
    pub max_evaluations: Option<usize>,
}

impl Default for StopCriteria {
    fn default() -> Self {
        Self {
            gatol: 0.0,
            grtol: 1e-3,
            max_iterations: None,
            max_evaluations: None,
        }
    }
}

impl StopCriteria {
    pub fn new(gatol: f64, grtol: f64) -> Result<Self> {
        if !gatol.is_finite() || gatol < 0.0 || !grtol.is_finite() || grtol < 0.0 {
            return Err(LumenError::InvalidArgument(
                "gradient tolerances must be finite and nonnegative".into(),
            ));
        }
        Ok(Self {
            gatol,
            grtol,
            ..Self::default()
        })
    }

    /// Gradient-norm convergence test against the initial norm.
    pub fn gradient_converged(&self, gnorm: f64, initial_gnorm: f64) -> bool {
        gnorm <= self.gatol.max(self.grtol * initial_gnorm)
    }

    pub fn iterations_exhausted(&self, iterations: usize) -> bool {
        self.max_iterations.is_some_and(|max| iterations >= max)
    }

    pub fn evaluations_exhausted(&self, evaluations: usize) -> bool {
        self.max_evaluations.is_some_and(|max| evaluations >= max)
    }
}

/// Optional box constraints applied to each new iterate.
#[derive(Clone, Debug)]
pub struct BoxProjection<T: Real> {
    lower: Option<ShapedVector<T>>,
    upper: Option<ShapedVector<T>>,
}

impl<T: Real> BoxProjection<T> {
    /// Unconstrained projection (identity).
    pub fn unbounded() -> Self {
        Self {
            lower: None,
            upper: None,
        }
    }

    pub fn new(
        lower: Option<ShapedVector<T>>,
        upper: Option<ShapedVector<T>>,
    ) -> Result<Self> {
        if let (Some(lo), Some(hi)) = (&lower, &upper) {
            lo.check_same_space(hi)?;
            for (l, h) in lo.as_slice().iter().zip(hi.as_slice()) {
                if l > h {
                    return Err(LumenError::InvalidArgument(
                        "lower bound exceeds upper bound".into(),
                    ));
                }
            }
        }
        Ok(Self { lower, upper })
    }

    /// Uniform scalar bounds over a space; non-finite bounds are
    /// treated as absent.
    pub fn uniform(space: &VectorSpace<T>, lower: T, upper: T) -> Result<Self> {
        let lo = if lower.is_finite() {
            let mut v = space.create();
            v.fill(lower);
            Some(v)
        } else {
            None
        };
        let hi = if upper.is_finite() {
            let mut v = space.create();
            v.fill(upper);
            Some(v)
        } else {
            None
        };
        Self::new(lo, hi)
    }

    pub fn is_unbounded(&self) -> bool {
        self.lower.is_none() && self.upper.is_none()
    }

    /// Clamp `x` onto the box, component-wise.
    pub fn project(&self, x: &mut ShapedVector<T>) -> Result<()> {
        if let Some(lo) = &self.lower {
            x.check_same_space(lo)?;
            for (v, &l) in x.as_mut_slice().iter_mut().zip(lo.as_slice()) {
                if *v < l {
                    *v = l;
                }
            }
        }
        if let Some(hi) = &self.upper {
            x.check_same_space(hi)?;
            for (v, &h) in x.as_mut_slice().iter_mut().zip(hi.as_slice()) {
                if *v > h {
                    *v = h;
                }
            }
        }
        Ok(())
    }
}
