use std::fmt;

use crate::error::{LumenError, Result};

/// Maximum rank supported by the array subsystem.
pub const MAX_RANK: usize = 9;

/// An immutable list of positive dimensions with a cached element count.
///
/// The scalar shape (rank 0) has exactly one element. Equality is
/// element-wise: two shapes with the same dimensions in the same order
/// are equal regardless of how they were built.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Shape {
    dims: Vec<usize>,
    number: usize,
}

impl Shape {
    /// Build a shape from a dimension list.
    ///
    /// Fails with `InvalidArgument` when any dimension is zero or
    /// exceeds `i32::MAX`, with `Unsupported` when the rank exceeds
    /// [`MAX_RANK`], and with `Overflow` when the element count does
    /// not fit a signed 64-bit integer.
    pub fn new(dims: &[usize]) -> Result<Self> {
        if dims.len() > MAX_RANK {
            return Err(LumenError::Unsupported(format!(
                "rank {} exceeds the maximum of {}",
                dims.len(),
                MAX_RANK
            )));
        }
        let mut number: u64 = 1;
        for &dim in dims {
            if dim == 0 || dim > i32::MAX as usize {
                return Err(LumenError::InvalidArgument(format!(
                    "invalid dimension {dim}"
                )));
            }
            number = number.checked_mul(dim as u64).ok_or_else(|| {
                LumenError::Overflow("element count exceeds 2^63 - 1".into())
            })?;
            if number > i64::MAX as u64 {
                return Err(LumenError::Overflow(
                    "element count exceeds 2^63 - 1".into(),
                ));
            }
        }
        Ok(Self {
            dims: dims.to_vec(),
            number: number as usize,
        })
    }

    /// The scalar shape: rank 0, one element.
    pub fn scalar() -> Self {
        Self {
            dims: Vec::new(),
            number: 1,
        }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Total number of elements.
    pub fn number(&self) -> usize {
        self.number
    }

    /// Length of the k-th dimension (0-based).
    pub fn dimension(&self, k: usize) -> Result<usize> {
        self.dims.get(k).copied().ok_or(LumenError::OutOfBounds {
            index: k as isize,
            extent: self.dims.len(),
        })
    }

    pub fn dimensions(&self) -> &[usize] {
        &self.dims
    }

    /// A fresh copy of the dimension list.
    pub fn copy_dimensions(&self) -> Vec<usize> {
        self.dims.clone()
    }

    /// Check that the element count also fits a positive 32-bit
    /// integer, the requirement for indexing flat buffers.
    pub fn checked_number_for_arrays(&self) -> Result<usize> {
        if self.number > i32::MAX as usize {
            return Err(LumenError::Overflow(
                "element count exceeds 2^31 - 1, too large for a flat buffer".into(),
            ));
        }
        Ok(self.number)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (k, dim) in self.dims.iter().enumerate() {
            if k > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{dim}")?;
        }
        write!(f, ")")
    }
}
