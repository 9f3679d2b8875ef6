use crate::array::for_each_index;
use crate::error::{LumenError, Result};
use crate::vector::{Real, ShapedVector};

use super::Convolution;

/// Weighted quadratic data-fidelity cost
/// `f(x) = (alpha/2) * sum w * (cnvl(x) - dat)^2` with gradient
/// `alpha * cnvl^T(w * (cnvl(x) - dat))`.
///
/// The gradient pass reuses the convolution work buffer: after the
/// forward pass the weighted residuals are written into the real parts
/// of the output region, the rest of the buffer is zeroed, and one
/// adjoint convolution pulls the gradient back to object space.
pub struct WeightedQuadraticCost<T: Real> {
    conv: Convolution<T>,
    data: Option<ShapedVector<T>>,
    weights: Option<ShapedVector<T>>,
}

impl<T: Real> WeightedQuadraticCost<T> {
    pub fn new(conv: Convolution<T>) -> Self {
        Self {
            conv,
            data: None,
            weights: None,
        }
    }

    pub fn convolution(&self) -> &Convolution<T> {
        &self.conv
    }

    pub fn convolution_mut(&mut self) -> &mut Convolution<T> {
        &mut self.conv
    }

    /// Cache the target data vector (a member of the output space).
    pub fn set_data(&mut self, data: &ShapedVector<T>) -> Result<()> {
        if !data.belongs_to(self.conv.output_space()) {
            return Err(LumenError::IncorrectSpace(format!(
                "data of shape {} does not belong to the output space {}",
                data.shape(),
                self.conv.output_space().shape()
            )));
        }
        self.data = Some(data.clone());
        Ok(())
    }

    /// Cache the statistical weights (nonnegative and finite, same
    /// space as the data). Absent weights count as one everywhere.
    pub fn set_weights(&mut self, weights: &ShapedVector<T>) -> Result<()> {
        if !weights.belongs_to(self.conv.output_space()) {
            return Err(LumenError::IncorrectSpace(format!(
                "weights of shape {} do not belong to the output space {}",
                weights.shape(),
                self.conv.output_space().shape()
            )));
        }
        for &w in weights.as_slice() {
            let w = w.to_f64_lossy();
            if !w.is_finite() || w < 0.0 {
                return Err(LumenError::InvalidArgument(
                    "weights must be nonnegative and finite".into(),
                ));
            }
        }
        self.weights = Some(weights.clone());
        Ok(())
    }

    /// `f(x)` alone.
    pub fn cost(&mut self, alpha: f64, x: &ShapedVector<T>) -> Result<f64> {
        let fsum = self.residual_pass(x, false)?;
        Ok(0.5 * alpha * fsum)
    }

    /// `f(x)` plus its gradient, stored into `gx` (or accumulated when
    /// `clear` is false).
    pub fn cost_and_gradient(
        &mut self,
        alpha: f64,
        x: &ShapedVector<T>,
        gx: &mut ShapedVector<T>,
        clear: bool,
    ) -> Result<f64> {
        if !gx.belongs_to(self.conv.input_space()) {
            return Err(LumenError::IncorrectSpace(format!(
                "gradient of shape {} does not belong to the input space {}",
                gx.shape(),
                self.conv.input_space().shape()
            )));
        }
        let fsum = self.residual_pass(x, true)?;

        // One adjoint convolution propagates the weighted residuals
        // back to object space.
        self.conv.convolve(true)?;

        let (dims, offsets, wstrides) = self.conv.input_geometry();
        let work = self.conv.work_slice();
        let values = gx.as_mut_slice();
        let mut next = 0usize;
        for_each_index(&dims, |idx| {
            let mut at = 0usize;
            for k in 0..idx.len() {
                at += (offsets[k] + idx[k]) * wstrides[k];
            }
            let g = T::from_f64_lossy(alpha * work[2 * at].to_f64_lossy());
            if clear {
                values[next] = g;
            } else {
                values[next] = values[next] + g;
            }
            next += 1;
        });
        Ok(0.5 * alpha * fsum)
    }

    /// Forward pass: convolve `x`, accumulate the weighted squared
    /// residual over the output region, and (for the gradient) leave
    /// `w*(y - dat)` in the real parts of that region with everything
    /// outside it zeroed.
    fn residual_pass(&mut self, x: &ShapedVector<T>, with_gradient: bool) -> Result<f64> {
        let data = self.data.as_ref().ok_or_else(|| {
            LumenError::InvalidState("cost evaluated before set_data".into())
        })?;

        self.conv.push(x, false)?;
        self.conv.convolve(false)?;

        let (dims, offsets, wstrides) = self.conv.output_geometry();
        let work_dims = self.conv.work_dims();
        let dat = data.as_slice();
        let wgt = self.weights.as_ref().map(|w| w.as_slice());
        let work = self.conv.work_slice();

        let mut fsum = 0.0f64;
        let mut next = 0usize;
        for_each_index(&dims, |idx| {
            let mut at = 0usize;
            for k in 0..idx.len() {
                at += (offsets[k] + idx[k]) * wstrides[k];
            }
            let y = work[2 * at].to_f64_lossy();
            let r = y - dat[next].to_f64_lossy();
            let w = match wgt {
                Some(values) => values[next].to_f64_lossy(),
                None => 1.0,
            };
            fsum += w * r * r;
            if with_gradient {
                work[2 * at] = T::from_f64_lossy(w * r);
                work[2 * at + 1] = T::zero();
            }
            next += 1;
        });

        if with_gradient {
            zero_outside_region(work, &work_dims, &offsets, &dims);
        }
        Ok(fsum)
    }
}

/// Zero every complex cell of the work buffer outside the given user
/// region.
fn zero_outside_region<T: Real>(
    work: &mut [T],
    work_dims: &[usize],
    offsets: &[usize],
    region_dims: &[usize],
) {
    let mut at = 0usize;
    for_each_index(work_dims, |idx| {
        let inside = idx.iter().enumerate().all(|(k, &i)| {
            i >= offsets[k] && i < offsets[k] + region_dims[k]
        });
        if !inside {
            work[2 * at] = T::zero();
            work[2 * at + 1] = T::zero();
        }
        at += 1;
    });
}
