use num_traits::Zero;

use crate::error::{LumenError, Result};
use crate::shape::Shape;

use super::{for_each_index, Array, Element};

/// Contract the last axis of `a` against a rank-1 `v`, widening to the
/// accumulator type: `r[i...] = sum_j a[i..., j] * v[j]`.
pub fn dot<T: Element>(a: &Array<T>, v: &Array<T>) -> Result<Array<T::Acc>> {
    if v.rank() != 1 {
        return Err(LumenError::InvalidArgument(
            "dot expects a rank-1 vector operand".into(),
        ));
    }
    let rank = a.rank();
    if rank == 0 {
        return Err(LumenError::InvalidArgument(
            "dot expects a matrix operand of rank >= 1".into(),
        ));
    }
    let dims = a.shape().dimensions();
    let n = dims[rank - 1];
    if v.number() != n {
        return Err(LumenError::ShapeMismatch {
            expected: Shape::new(&[n])?,
            got: v.shape().clone(),
        });
    }

    let lead = &dims[..rank - 1];
    let result = Array::<T::Acc>::zeros(Shape::new(lead)?)?;
    let values: Vec<T> = (0..n)
        .map(|j| v.buffer().read(v.offset_at(&[j])))
        .collect();

    let mut full_idx = vec![0usize; rank];
    let mut next = 0usize;
    for_each_index(lead, |idx| {
        full_idx[..rank - 1].copy_from_slice(idx);
        let mut acc = <T::Acc>::zero();
        for (j, &vj) in values.iter().enumerate() {
            full_idx[rank - 1] = j;
            acc = acc + a.buffer().read(a.offset_at(&full_idx)).to_acc() * vj.to_acc();
        }
        result.buffer().write(next, acc);
        next += 1;
    });
    Ok(result)
}

/// Outer product appending one dimension: `r[i..., j] = a[i...] * v[j]`.
pub fn outer<T: Element>(a: &Array<T>, v: &Array<T>) -> Result<Array<T>> {
    if v.rank() != 1 {
        return Err(LumenError::InvalidArgument(
            "outer expects a rank-1 vector operand".into(),
        ));
    }
    let m = v.number();
    let mut new_dims = a.shape().copy_dimensions();
    new_dims.push(m);
    let result = Array::zeros(Shape::new(&new_dims)?)?;

    let values: Vec<T> = (0..m)
        .map(|j| v.buffer().read(v.offset_at(&[j])))
        .collect();

    let mut next = 0usize;
    for &vj in &values {
        for_each_index(a.shape().dimensions(), |idx| {
            result
                .buffer()
                .write(next, a.buffer().read(a.offset_at(idx)) * vj);
            next += 1;
        });
    }
    Ok(result)
}
