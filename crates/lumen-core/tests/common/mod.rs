#![allow(dead_code)]

use lumen_core::shape::Shape;
use lumen_core::vector::{ShapedVector, VectorSpace};

/// Deterministic pseudo-random values in [0, 1) for reproducible
/// adjoint and finite-difference checks.
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed.wrapping_mul(6364136223846793005).wrapping_add(1))
    }

    pub fn next_f64(&mut self) -> f64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }

    pub fn fill(&mut self, n: usize) -> Vec<f64> {
        (0..n).map(|_| self.next_f64()).collect()
    }
}

pub fn space(dims: &[usize]) -> VectorSpace<f64> {
    VectorSpace::new(Shape::new(dims).unwrap()).unwrap()
}

pub fn random_vector(space: &VectorSpace<f64>, seed: u64) -> ShapedVector<f64> {
    let mut rng = Lcg::new(seed);
    space.wrap(rng.fill(space.len())).unwrap()
}
