use crate::error::{LumenError, Result};
use crate::shape::Shape;

use super::range::absolute_index;
use super::{for_each_index, Array, Buffer, Element, Layout, Range};

impl<T: Element> Array<T> {
    // -- flattening ---------------------------------------------------------

    /// The elements as one flat column-major buffer.
    ///
    /// When the array is already flat and `force_copy` is false the
    /// backing buffer itself is returned (shared); otherwise a fresh
    /// contiguous buffer is allocated.
    pub fn flatten(&self, force_copy: bool) -> Buffer<T> {
        if !force_copy && self.is_flat() {
            return self.buffer.clone();
        }
        let mut values = Vec::with_capacity(self.number());
        for_each_index(self.shape.dimensions(), |idx| {
            values.push(self.buffer.read(self.offset_at(idx)));
        });
        Buffer::from_vec(values)
    }

    /// Rank-1 representation: a view when flat, a flattened copy
    /// otherwise.
    pub fn as_1d(&self) -> Result<Array<T>> {
        let shape = Shape::new(&[self.number()])?;
        Ok(Array {
            buffer: self.flatten(false),
            shape,
            layout: Layout::Flat,
        })
    }

    /// Total-count-preserving reshape. Lazy (shares the buffer) when
    /// the array is flat; copies otherwise.
    pub fn reshape(&self, shape: Shape) -> Result<Array<T>> {
        if shape.number() != self.number() {
            return Err(LumenError::ShapeMismatch {
                expected: self.shape.clone(),
                got: shape,
            });
        }
        shape.checked_number_for_arrays()?;
        Ok(Array {
            buffer: self.flatten(false),
            shape,
            layout: Layout::Flat,
        })
    }

    /// Move the dimension at `src` to position `dst`, cyclically
    /// shifting the dimensions in between. The result is a fresh
    /// contiguous array, not a view.
    pub fn movedims(&self, src: isize, dst: isize) -> Result<Array<T>> {
        let rank = self.rank();
        if rank == 0 {
            return Ok(self.copy());
        }
        let dims = self.shape.dimensions();
        let from = absolute_index(src, rank)?;
        let to = absolute_index(dst, rank)?;

        // order[j] = source axis landing at result position j
        let mut order: Vec<usize> = (0..rank).collect();
        let moved = order.remove(from);
        order.insert(to, moved);

        let new_dims: Vec<usize> = order.iter().map(|&axis| dims[axis]).collect();
        let result = Array::zeros(Shape::new(&new_dims)?)?;

        let mut src_idx = vec![0usize; rank];
        let mut next = 0usize;
        for_each_index(&new_dims, |idx| {
            for (j, &axis) in order.iter().enumerate() {
                src_idx[axis] = idx[j];
            }
            result
                .buffer
                .write(next, self.buffer.read(self.offset_at(&src_idx)));
            next += 1;
        });
        Ok(result)
    }

    // -- padding, cropping, extraction --------------------------------------

    /// Zero-pad to a larger shape with central placement.
    pub fn pad(&self, shape: Shape) -> Result<Array<T>> {
        self.pad_with(shape, None, T::zero())
    }

    /// Pad to a larger shape, placing this array at `offset` (central
    /// placement when `None`) and filling the rest with `value`.
    pub fn pad_with(
        &self,
        shape: Shape,
        offset: Option<&[usize]>,
        value: T,
    ) -> Result<Array<T>> {
        let rank = self.rank();
        if shape.rank() != rank {
            return Err(LumenError::ShapeMismatch {
                expected: self.shape.clone(),
                got: shape,
            });
        }
        let inner = self.shape.dimensions();
        let outer = shape.dimensions();
        let offsets = placement_offsets(inner, outer, offset)?;

        let result = Array::filled(shape.clone(), value)?;
        let ranges: Vec<Range> = offsets
            .iter()
            .zip(inner)
            .map(|(&off, &dim)| Range::new(off as isize, (off + dim - 1) as isize, 1))
            .collect();
        result.view(&ranges)?.assign(self)?;
        Ok(result)
    }

    /// Centrally-cropped view of a smaller shape. Shares storage.
    pub fn crop(&self, shape: Shape) -> Result<Array<T>> {
        self.crop_at(shape, None)
    }

    /// Cropped view at an explicit placement offset. Shares storage.
    pub fn crop_at(&self, shape: Shape, offset: Option<&[usize]>) -> Result<Array<T>> {
        let rank = self.rank();
        if shape.rank() != rank {
            return Err(LumenError::ShapeMismatch {
                expected: self.shape.clone(),
                got: shape,
            });
        }
        let outer = self.shape.dimensions();
        let inner = shape.dimensions();
        let offsets = placement_offsets(inner, outer, offset)?;

        let ranges: Vec<Range> = offsets
            .iter()
            .zip(inner)
            .map(|(&off, &dim)| Range::new(off as isize, (off + dim - 1) as isize, 1))
            .collect();
        self.view(&ranges)
    }

    /// Combined pad-and-crop: a fresh array of the requested shape
    /// whose element at index i is `self[offset + i]` when that lies
    /// inside this array and `value` elsewhere.
    pub fn extract(&self, shape: Shape, offset: &[isize], value: T) -> Result<Array<T>> {
        let rank = self.rank();
        if shape.rank() != rank {
            return Err(LumenError::ShapeMismatch {
                expected: self.shape.clone(),
                got: shape,
            });
        }
        if offset.len() != rank {
            return Err(LumenError::InvalidArgument(format!(
                "{} offsets given for rank {rank}",
                offset.len()
            )));
        }
        let src_dims = self.shape.dimensions();
        let dst_dims = shape.dimensions();

        let result = Array::filled(shape.clone(), value)?;
        let mut src_ranges = Vec::with_capacity(rank);
        let mut dst_ranges = Vec::with_capacity(rank);
        for k in 0..rank {
            let src_lo = offset[k].max(0);
            let src_hi = (offset[k] + dst_dims[k] as isize).min(src_dims[k] as isize);
            if src_lo >= src_hi {
                return Ok(result);
            }
            let dst_lo = src_lo - offset[k];
            let count = src_hi - src_lo;
            src_ranges.push(Range::new(src_lo, src_hi - 1, 1));
            dst_ranges.push(Range::new(dst_lo, dst_lo + count - 1, 1));
        }
        result.view(&dst_ranges)?.assign(&self.view(&src_ranges)?)?;
        Ok(result)
    }
}

/// Per-axis placement of an inner shape inside an outer one; central
/// placement `(outer/2) - (inner/2)` when no offset is given.
fn placement_offsets(
    inner: &[usize],
    outer: &[usize],
    offset: Option<&[usize]>,
) -> Result<Vec<usize>> {
    let rank = inner.len();
    for k in 0..rank {
        if inner[k] > outer[k] {
            return Err(LumenError::InvalidArgument(format!(
                "inner dimension {} exceeds outer dimension {}",
                inner[k], outer[k]
            )));
        }
    }
    match offset {
        None => Ok((0..rank)
            .map(|k| outer[k] / 2 - inner[k] / 2)
            .collect()),
        Some(offsets) => {
            if offsets.len() != rank {
                return Err(LumenError::InvalidArgument(format!(
                    "{} offsets given for rank {rank}",
                    offsets.len()
                )));
            }
            for k in 0..rank {
                if offsets[k] + inner[k] > outer[k] {
                    return Err(LumenError::OutOfBounds {
                        index: offsets[k] as isize,
                        extent: outer[k] - inner[k] + 1,
                    });
                }
            }
            Ok(offsets.to_vec())
        }
    }
}
