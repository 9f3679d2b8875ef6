use crate::error::{LumenError, Result};
use crate::vector::{Real, ShapedVector};

/// Edge-preserving hyperbolic approximation of total variation over
/// 1-D, 2-D and 3-D fields.
///
/// Each elementary block of 2^r neighboring samples contributes
/// `sqrt(sum_k w_k * (axis-k differences)^2 + eps^2)` with
/// `w_k = 1 / (2^(r-1) * delta_k^2)`, so a flat field contributes
/// exactly `eps` per block. The accumulated flat-field bias
/// `(prod (d_k - 1)) * eps` is subtracted afterwards and the result is
/// clipped at zero to guard against rounding.
#[derive(Debug)]
pub struct HyperbolicTotalVariation {
    epsilon: f64,
    delta: Vec<f64>,
}

impl HyperbolicTotalVariation {
    /// `epsilon` is the hyperbolic threshold, `delta` one positive
    /// scale per axis (1 to 3 axes).
    pub fn new(epsilon: f64, delta: &[f64]) -> Result<Self> {
        if !epsilon.is_finite() || epsilon <= 0.0 {
            return Err(LumenError::InvalidArgument(format!(
                "threshold must be finite and positive, got {epsilon}"
            )));
        }
        if delta.is_empty() || delta.len() > 3 {
            return Err(LumenError::InvalidArgument(format!(
                "one scale per axis expected (1 to 3), got {}",
                delta.len()
            )));
        }
        for &d in delta {
            if !d.is_finite() || d <= 0.0 {
                return Err(LumenError::InvalidArgument(format!(
                    "axis scale must be finite and positive, got {d}"
                )));
            }
        }
        Ok(Self {
            epsilon,
            delta: delta.to_vec(),
        })
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn delta(&self) -> &[f64] {
        &self.delta
    }

    /// `alpha * max(sum_blocks r - bias, 0)`.
    pub fn cost<T: Real>(&self, alpha: f64, x: &ShapedVector<T>) -> Result<f64> {
        self.evaluate(alpha, x, None)
    }

    /// Cost plus gradient, accumulated into `gx` (not cleared).
    pub fn cost_and_gradient<T: Real>(
        &self,
        alpha: f64,
        x: &ShapedVector<T>,
        gx: &mut ShapedVector<T>,
    ) -> Result<f64> {
        x.check_same_space(gx)?;
        self.evaluate(alpha, x, Some(gx))
    }

    fn evaluate<T: Real>(
        &self,
        alpha: f64,
        x: &ShapedVector<T>,
        gx: Option<&mut ShapedVector<T>>,
    ) -> Result<f64> {
        let rank = x.shape().rank();
        if rank == 0 || rank > 3 {
            return Err(LumenError::Unsupported(format!(
                "hyperbolic total variation supports ranks 1 to 3, got {rank}"
            )));
        }
        if self.delta.len() != rank {
            return Err(LumenError::InvalidArgument(format!(
                "{} axis scales given for rank {rank}",
                self.delta.len()
            )));
        }
        let dims = x.shape().copy_dimensions();
        match rank {
            1 => self.evaluate_1d(alpha, x, gx, dims[0]),
            2 => self.evaluate_2d(alpha, x, gx, dims[0], dims[1]),
            _ => self.evaluate_3d(alpha, x, gx, dims[0], dims[1], dims[2]),
        }
    }

    fn evaluate_1d<T: Real>(
        &self,
        alpha: f64,
        x: &ShapedVector<T>,
        gx: Option<&mut ShapedVector<T>>,
        n: usize,
    ) -> Result<f64> {
        let eps2 = self.epsilon * self.epsilon;
        let w = 1.0 / (self.delta[0] * self.delta[0]);
        let values = x.as_slice();

        let mut fsum = 0.0f64;
        match gx {
            None => {
                for i in 1..n {
                    let d = values[i].to_f64_lossy() - values[i - 1].to_f64_lossy();
                    fsum += (w * d * d + eps2).sqrt();
                }
            }
            Some(gx) => {
                let grad = gx.as_mut_slice();
                for i in 1..n {
                    let d = values[i].to_f64_lossy() - values[i - 1].to_f64_lossy();
                    let r = (w * d * d + eps2).sqrt();
                    fsum += r;
                    let p = alpha * w * d / r;
                    grad[i] = grad[i] + T::from_f64_lossy(p);
                    grad[i - 1] = grad[i - 1] - T::from_f64_lossy(p);
                }
            }
        }
        let bias = (n - 1) as f64 * self.epsilon;
        Ok(alpha * (fsum - bias).max(0.0))
    }

    fn evaluate_2d<T: Real>(
        &self,
        alpha: f64,
        x: &ShapedVector<T>,
        gx: Option<&mut ShapedVector<T>>,
        n1: usize,
        n2: usize,
    ) -> Result<f64> {
        let eps2 = self.epsilon * self.epsilon;
        let w1 = 1.0 / (2.0 * self.delta[0] * self.delta[0]);
        let w2 = 1.0 / (2.0 * self.delta[1] * self.delta[1]);
        let values = x.as_slice();
        let mut grad = gx.map(|g| g.as_mut_slice());

        let mut fsum = 0.0f64;
        for i2 in 1..n2 {
            for i1 in 1..n1 {
                // 2x2 block corners, column-major flat layout
                let at1 = (i1 - 1) + n1 * (i2 - 1);
                let at2 = i1 + n1 * (i2 - 1);
                let at3 = (i1 - 1) + n1 * i2;
                let at4 = i1 + n1 * i2;
                let x1 = values[at1].to_f64_lossy();
                let x2 = values[at2].to_f64_lossy();
                let x3 = values[at3].to_f64_lossy();
                let x4 = values[at4].to_f64_lossy();

                let r = (w1 * ((x2 - x1) * (x2 - x1) + (x4 - x3) * (x4 - x3))
                    + w2 * ((x3 - x1) * (x3 - x1) + (x4 - x2) * (x4 - x2))
                    + eps2)
                    .sqrt();
                fsum += r;

                if let Some(grad) = grad.as_mut() {
                    let q = alpha / r;
                    let g1 = (w1 * (x1 - x2) + w2 * (x1 - x3)) * q;
                    let g2 = (w1 * (x2 - x1) + w2 * (x2 - x4)) * q;
                    let g3 = (w1 * (x3 - x4) + w2 * (x3 - x1)) * q;
                    let g4 = (w1 * (x4 - x3) + w2 * (x4 - x2)) * q;
                    grad[at1] = grad[at1] + T::from_f64_lossy(g1);
                    grad[at2] = grad[at2] + T::from_f64_lossy(g2);
                    grad[at3] = grad[at3] + T::from_f64_lossy(g3);
                    grad[at4] = grad[at4] + T::from_f64_lossy(g4);
                }
            }
        }
        let bias = ((n1 - 1) * (n2 - 1)) as f64 * self.epsilon;
        Ok(alpha * (fsum - bias).max(0.0))
    }

    fn evaluate_3d<T: Real>(
        &self,
        alpha: f64,
        x: &ShapedVector<T>,
        gx: Option<&mut ShapedVector<T>>,
        n1: usize,
        n2: usize,
        n3: usize,
    ) -> Result<f64> {
        let eps2 = self.epsilon * self.epsilon;
        let w = [
            1.0 / (4.0 * self.delta[0] * self.delta[0]),
            1.0 / (4.0 * self.delta[1] * self.delta[1]),
            1.0 / (4.0 * self.delta[2] * self.delta[2]),
        ];
        // Corners are numbered by axis bits (bit 0 = axis 1); four
        // difference pairs (low corner, high corner) per axis.
        const PAIRS: [[(usize, usize); 4]; 3] = [
            [(0, 1), (2, 3), (4, 5), (6, 7)],
            [(0, 2), (1, 3), (4, 6), (5, 7)],
            [(0, 4), (1, 5), (2, 6), (3, 7)],
        ];
        let values = x.as_slice();
        let mut grad = gx.map(|g| g.as_mut_slice());

        let mut fsum = 0.0f64;
        let mut at = [0usize; 8];
        let mut corner = [0.0f64; 8];
        for i3 in 1..n3 {
            for i2 in 1..n2 {
                for i1 in 1..n1 {
                    for (c, slot) in at.iter_mut().enumerate() {
                        let a = i1 - 1 + (c & 1);
                        let b = i2 - 1 + ((c >> 1) & 1);
                        let d = i3 - 1 + ((c >> 2) & 1);
                        *slot = a + n1 * (b + n2 * d);
                    }
                    for c in 0..8 {
                        corner[c] = values[at[c]].to_f64_lossy();
                    }

                    let mut sq = eps2;
                    for axis in 0..3 {
                        for &(lo, hi) in &PAIRS[axis] {
                            let d = corner[hi] - corner[lo];
                            sq += w[axis] * d * d;
                        }
                    }
                    let r = sq.sqrt();
                    fsum += r;

                    if let Some(grad) = grad.as_mut() {
                        let q = alpha / r;
                        for axis in 0..3 {
                            for &(lo, hi) in &PAIRS[axis] {
                                let p = w[axis] * (corner[hi] - corner[lo]) * q;
                                grad[at[hi]] = grad[at[hi]] + T::from_f64_lossy(p);
                                grad[at[lo]] = grad[at[lo]] - T::from_f64_lossy(p);
                            }
                        }
                    }
                }
            }
        }
        let bias = ((n1 - 1) * (n2 - 1) * (n3 - 1)) as f64 * self.epsilon;
        Ok(alpha * (fsum - bias).max(0.0))
    }
}
