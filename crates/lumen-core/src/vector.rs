use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

use num_traits::{Float, FloatConst, NumAssign};
use rustfft::FftNum;

use crate::array::{Array, Element};
use crate::error::{LumenError, Result};
use crate::shape::Shape;

/// Floating-point element types usable as vector scalars (f32, f64).
pub trait Real: Element + Float + FloatConst + NumAssign + FftNum {}

impl Real for f32 {}
impl Real for f64 {}

/// A vector space: a shape and a scalar type.
///
/// Two spaces are the same iff their shapes are equal; every binary
/// vector operation requires both operands to belong to one space.
#[derive(Clone, Debug, PartialEq)]
pub struct VectorSpace<T: Real> {
    shape: Shape,
    _marker: PhantomData<T>,
}

impl<T: Real> VectorSpace<T> {
    pub fn new(shape: Shape) -> Result<Self> {
        shape.checked_number_for_arrays()?;
        Ok(Self {
            shape,
            _marker: PhantomData,
        })
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    /// Number of components of a member vector.
    pub fn len(&self) -> usize {
        self.shape.number()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// A zero-filled member vector.
    pub fn create(&self) -> ShapedVector<T> {
        ShapedVector {
            data: vec![T::zero(); self.len()],
            space: self.clone(),
        }
    }

    /// Adopt a value list as a member vector.
    pub fn wrap(&self, values: Vec<T>) -> Result<ShapedVector<T>> {
        if values.len() != self.len() {
            return Err(LumenError::IncorrectSpace(format!(
                "value count {} does not match space of shape {}",
                values.len(),
                self.shape
            )));
        }
        Ok(ShapedVector {
            data: values,
            space: self.clone(),
        })
    }

    /// Member vector from a shaped array of the same shape, flattened
    /// in column-major order and converted to the scalar type.
    pub fn vector_from_array<U: Element>(&self, array: &Array<U>) -> Result<ShapedVector<T>> {
        if *array.shape() != self.shape {
            return Err(LumenError::ShapeMismatch {
                expected: self.shape.clone(),
                got: array.shape().clone(),
            });
        }
        let converted = array.convert::<T>();
        Ok(ShapedVector {
            data: converted.buffer().to_vec(),
            space: self.clone(),
        })
    }
}

/// A shape-aware flat numeric vector, the currency of the optimizer.
#[derive(Clone, Debug)]
pub struct ShapedVector<T: Real> {
    space: VectorSpace<T>,
    data: Vec<T>,
}

impl<T: Real> ShapedVector<T> {
    pub fn space(&self) -> &VectorSpace<T> {
        &self.space
    }

    pub fn shape(&self) -> &Shape {
        self.space.shape()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn belongs_to(&self, space: &VectorSpace<T>) -> bool {
        self.space == *space
    }

    pub(crate) fn check_same_space(&self, other: &ShapedVector<T>) -> Result<()> {
        if self.space != other.space {
            return Err(LumenError::IncorrectSpace(format!(
                "operand of shape {} does not belong to space of shape {}",
                other.shape(),
                self.shape()
            )));
        }
        Ok(())
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    // -- component-wise operations ------------------------------------------

    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    pub fn zero(&mut self) {
        self.fill(T::zero());
    }

    pub fn scale(&mut self, alpha: T) {
        for v in &mut self.data {
            *v = *v * alpha;
        }
    }

    /// Component-wise product: `self *= other`.
    pub fn multiply(&mut self, other: &ShapedVector<T>) -> Result<()> {
        self.check_same_space(other)?;
        for (v, &w) in self.data.iter_mut().zip(&other.data) {
            *v = *v * w;
        }
        Ok(())
    }

    /// Linear combination `self = a*x + b*y`.
    pub fn combine(&mut self, a: T, x: &ShapedVector<T>, b: T, y: &ShapedVector<T>) -> Result<()> {
        self.check_same_space(x)?;
        self.check_same_space(y)?;
        for (i, v) in self.data.iter_mut().enumerate() {
            *v = a * x.data[i] + b * y.data[i];
        }
        Ok(())
    }

    /// `self += a*x`.
    pub fn add_scaled(&mut self, a: T, x: &ShapedVector<T>) -> Result<()> {
        self.check_same_space(x)?;
        for (v, &xv) in self.data.iter_mut().zip(&x.data) {
            *v = *v + a * xv;
        }
        Ok(())
    }

    pub fn copy_from(&mut self, other: &ShapedVector<T>) -> Result<()> {
        self.check_same_space(other)?;
        self.data.copy_from_slice(&other.data);
        Ok(())
    }

    // -- reductions (f64 accumulation) --------------------------------------

    pub fn dot(&self, other: &ShapedVector<T>) -> Result<f64> {
        self.check_same_space(other)?;
        let mut acc = 0.0f64;
        for (&v, &w) in self.data.iter().zip(&other.data) {
            acc += v.to_f64_lossy() * w.to_f64_lossy();
        }
        Ok(acc)
    }

    pub fn norm1(&self) -> f64 {
        self.data.iter().map(|v| v.to_f64_lossy().abs()).sum()
    }

    pub fn norm2(&self) -> f64 {
        self.data
            .iter()
            .map(|v| {
                let x = v.to_f64_lossy();
                x * x
            })
            .sum::<f64>()
            .sqrt()
    }

    pub fn norm_inf(&self) -> f64 {
        self.data
            .iter()
            .fold(0.0f64, |m, v| m.max(v.to_f64_lossy().abs()))
    }

    // -- array interchange --------------------------------------------------

    /// A flat column-major shaped array holding a copy of the
    /// components.
    pub fn to_array(&self) -> Result<Array<T>> {
        Array::from_vec(self.shape().clone(), self.data.clone())
    }
}

impl<T: Real> Index<usize> for ShapedVector<T> {
    type Output = T;

    fn index(&self, i: usize) -> &T {
        &self.data[i]
    }
}

impl<T: Real> IndexMut<usize> for ShapedVector<T> {
    fn index_mut(&mut self, i: usize) -> &mut T {
        &mut self.data[i]
    }
}
