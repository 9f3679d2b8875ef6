use std::sync::Arc;

use num_complex::Complex;
use rayon::prelude::*;
use rustfft::{Fft, FftPlanner};

use crate::consts::PARALLEL_FFT_THRESHOLD;
use crate::error::{LumenError, Result};
use crate::vector::Real;

/// Adapter around the complex FFT primitive for 1-D, 2-D and 3-D
/// transforms over an interleaved real buffer `[re0, im0, re1, im1, ...]`
/// laid out in column-major order (first dimension fastest).
///
/// Neither direction normalizes; callers apply their own scaling. One
/// plan set per engine instance, created at construction and reused
/// for every transform.
pub struct FftEngine<T: Real> {
    dims: Vec<usize>,
    forward: Vec<Arc<dyn Fft<T>>>,
    backward: Vec<Arc<dyn Fft<T>>>,
}

impl<T: Real> std::fmt::Debug for FftEngine<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FftEngine").field("dims", &self.dims).finish()
    }
}

impl<T: Real> FftEngine<T> {
    pub fn new(dims: &[usize]) -> Result<Self> {
        if dims.is_empty() || dims.len() > 3 {
            return Err(LumenError::Unsupported(format!(
                "FFT rank must be 1, 2 or 3, got {}",
                dims.len()
            )));
        }
        for &dim in dims {
            if dim == 0 {
                return Err(LumenError::InvalidArgument(
                    "FFT dimension must be positive".into(),
                ));
            }
        }
        let mut planner = FftPlanner::new();
        let forward = dims.iter().map(|&d| planner.plan_fft_forward(d)).collect();
        let backward = dims.iter().map(|&d| planner.plan_fft_inverse(d)).collect();
        Ok(Self {
            dims: dims.to_vec(),
            forward,
            backward,
        })
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Number of complex elements.
    pub fn number(&self) -> usize {
        self.dims.iter().product()
    }

    /// Required interleaved buffer length: `2 * prod(dims)`.
    pub fn interleaved_len(&self) -> usize {
        2 * self.number()
    }

    /// In-place unnormalized forward transform.
    pub fn forward(&self, buf: &mut [T]) -> Result<()> {
        self.transform(buf, &self.forward)
    }

    /// In-place unnormalized backward transform.
    pub fn backward(&self, buf: &mut [T]) -> Result<()> {
        self.transform(buf, &self.backward)
    }

    fn transform(&self, buf: &mut [T], plans: &[Arc<dyn Fft<T>>]) -> Result<()> {
        if buf.len() != self.interleaved_len() {
            return Err(LumenError::InvalidArgument(format!(
                "FFT buffer length {} does not match 2 * {} elements",
                buf.len(),
                self.number()
            )));
        }
        for (axis, plan) in plans.iter().enumerate() {
            self.process_axis(buf, axis, plan);
        }
        Ok(())
    }

    /// Transform every line along one axis: gather into a complex
    /// scratch line, run the plan, scatter back.
    fn process_axis(&self, buf: &mut [T], axis: usize, plan: &Arc<dyn Fft<T>>) {
        let n = self.number();
        let dim = self.dims[axis];
        if dim == 1 {
            return;
        }
        let stride: usize = self.dims[..axis].iter().product();
        let bases: Vec<usize> = (0..n).filter(|i| (i / stride) % dim == 0).collect();

        if n >= PARALLEL_FFT_THRESHOLD {
            let src: &[T] = buf;
            let processed: Vec<(usize, Vec<Complex<T>>)> = bases
                .par_iter()
                .map(|&base| {
                    let mut line = gather_line(src, base, dim, stride);
                    plan.process(&mut line);
                    (base, line)
                })
                .collect();
            for (base, line) in processed {
                scatter_line(buf, base, stride, &line);
            }
        } else {
            let mut line = vec![Complex::new(T::zero(), T::zero()); dim];
            for &base in &bases {
                for (j, slot) in line.iter_mut().enumerate() {
                    let at = 2 * (base + j * stride);
                    *slot = Complex::new(buf[at], buf[at + 1]);
                }
                plan.process(&mut line);
                scatter_line(buf, base, stride, &line);
            }
        }
    }
}

fn gather_line<T: Real>(buf: &[T], base: usize, dim: usize, stride: usize) -> Vec<Complex<T>> {
    (0..dim)
        .map(|j| {
            let at = 2 * (base + j * stride);
            Complex::new(buf[at], buf[at + 1])
        })
        .collect()
}

fn scatter_line<T: Real>(buf: &mut [T], base: usize, stride: usize, line: &[Complex<T>]) {
    for (j, value) in line.iter().enumerate() {
        let at = 2 * (base + j * stride);
        buf[at] = value.re;
        buf[at + 1] = value.im;
    }
}
