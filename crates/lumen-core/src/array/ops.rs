use num_traits::Zero;

use crate::error::{LumenError, Result};

use super::{for_each_index, Array, Buffer, Element, Layout};

impl<T: Element> Array<T> {
    // -- component-wise mutation --------------------------------------------

    /// Set every element to `value`.
    pub fn fill(&self, value: T) {
        self.visit_offsets(|off| self.buffer.write(off, value));
    }

    /// Fill in iteration order from a generator.
    pub fn fill_with(&self, mut generator: impl FnMut() -> T) {
        self.visit_offsets(|off| self.buffer.write(off, generator()));
    }

    pub fn increment(&self, value: T) {
        self.map(|v| v + value);
    }

    pub fn decrement(&self, value: T) {
        self.map(|v| v - value);
    }

    pub fn scale(&self, value: T) {
        self.map(|v| v * value);
    }

    /// Replace every element by `f(element)`, in iteration order.
    pub fn map(&self, mut f: impl FnMut(T) -> T) {
        self.visit_offsets(|off| {
            let v = self.buffer.read(off);
            self.buffer.write(off, f(v));
        });
    }

    /// Visit every element in iteration order without mutating.
    pub fn scan(&self, mut f: impl FnMut(T)) {
        self.visit_offsets(|off| f(self.buffer.read(off)));
    }

    // -- reductions ---------------------------------------------------------

    pub fn min(&self) -> T {
        let mut min: Option<T> = None;
        self.scan(|v| match min {
            Some(m) if !(v < m) => {}
            _ => min = Some(v),
        });
        min.unwrap_or_else(T::zero)
    }

    pub fn max(&self) -> T {
        let mut max: Option<T> = None;
        self.scan(|v| match max {
            Some(m) if !(v > m) => {}
            _ => max = Some(v),
        });
        max.unwrap_or_else(T::zero)
    }

    /// Both extrema in one traversal.
    pub fn min_max(&self) -> (T, T) {
        let mut extrema: Option<(T, T)> = None;
        self.scan(|v| match &mut extrema {
            None => extrema = Some((v, v)),
            Some((min, max)) => {
                if v < *min {
                    *min = v;
                }
                if v > *max {
                    *max = v;
                }
            }
        });
        extrema.unwrap_or_else(|| (T::zero(), T::zero()))
    }

    /// Sum over all elements in the widened accumulator type.
    pub fn sum(&self) -> T::Acc {
        let mut acc = <T::Acc>::zero();
        self.scan(|v| acc = acc + v.to_acc());
        acc
    }

    pub fn average(&self) -> f64 {
        self.sum().to_f64_lossy() / self.number() as f64
    }

    // -- copying and conversion ---------------------------------------------

    /// Owning flat column-major copy; never aliases the source.
    pub fn copy(&self) -> Array<T> {
        if matches!(self.layout, Layout::Flat) {
            return Array {
                shape: self.shape.clone(),
                buffer: Buffer::from_vec(self.buffer.to_vec()),
                layout: Layout::Flat,
            };
        }
        let mut values = Vec::with_capacity(self.number());
        for_each_index(self.shape.dimensions(), |idx| {
            values.push(self.buffer.read(self.offset_at(idx)));
        });
        Array {
            shape: self.shape.clone(),
            buffer: Buffer::from_vec(values),
            layout: Layout::Flat,
        }
    }

    /// Element-wise copy from `src`, converting element types.
    ///
    /// The source is snapshotted first, so assigning between views of
    /// one buffer is well defined.
    pub fn assign<U: Element>(&self, src: &Array<U>) -> Result<()> {
        if self.shape != *src.shape() {
            return Err(LumenError::ShapeMismatch {
                expected: self.shape.clone(),
                got: src.shape().clone(),
            });
        }
        let mut values = Vec::with_capacity(self.number());
        for_each_index(src.shape().dimensions(), |idx| {
            values.push(src.buffer().read(src.offset_at(idx)));
        });
        let mut next = 0usize;
        for_each_index(self.shape.dimensions(), |idx| {
            self.buffer
                .write(self.offset_at(idx), T::from_elem(values[next]));
            next += 1;
        });
        Ok(())
    }

    /// Flat column-major copy converted to another element type.
    pub fn convert<U: Element>(&self) -> Array<U> {
        let mut values = Vec::with_capacity(self.number());
        for_each_index(self.shape.dimensions(), |idx| {
            values.push(U::from_elem(self.buffer.read(self.offset_at(idx))));
        });
        Array {
            shape: self.shape.clone(),
            buffer: Buffer::from_vec(values),
            layout: Layout::Flat,
        }
    }
}
