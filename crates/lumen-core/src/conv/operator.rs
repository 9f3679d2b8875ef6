use tracing::debug;

use crate::array::{colmajor_strides, for_each_index, Array, Element};
use crate::error::{LumenError, Result};
use crate::fft::FftEngine;
use crate::shape::Shape;
use crate::vector::{Real, ShapedVector, VectorSpace};

/// FFT-based convolution `R . F* . diag(mtf) . F . S` and its adjoint.
///
/// `S` zero-pads a user-space buffer into the (possibly larger) work
/// space at the input offsets, `F` is the forward DFT over the work
/// shape, `mtf` is the transfer function of the current PSF (with the
/// overall 1/N folded in), and `R` crops the work space back to the
/// output user space. The adjoint swaps the roles of the two user
/// regions and conjugates the MTF.
#[derive(Debug)]
pub struct Convolution<T: Real> {
    input_space: VectorSpace<T>,
    output_space: VectorSpace<T>,
    work_shape: Shape,
    input_offsets: Vec<usize>,
    output_offsets: Vec<usize>,
    fft: FftEngine<T>,
    /// Interleaved complex scratch, length `2 * prod(work dims)`.
    work: Vec<T>,
    mtf: Option<Vec<T>>,
}

impl<T: Real> Convolution<T> {
    /// Operator whose input, output and work spaces coincide.
    pub fn new(space: &VectorSpace<T>) -> Result<Self> {
        Self::with_work_shape(space, space, space.shape().clone(), None, None)
    }

    /// Operator with a work space at least as large as both user
    /// spaces along every axis. Offsets default to central placement.
    pub fn with_work_shape(
        input_space: &VectorSpace<T>,
        output_space: &VectorSpace<T>,
        work_shape: Shape,
        input_offset: Option<&[usize]>,
        output_offset: Option<&[usize]>,
    ) -> Result<Self> {
        let rank = work_shape.rank();
        if rank == 0 || rank > 3 {
            return Err(LumenError::Unsupported(format!(
                "convolution rank must be 1, 2 or 3, got {rank}"
            )));
        }
        if input_space.rank() != rank {
            return Err(LumenError::ShapeMismatch {
                expected: work_shape,
                got: input_space.shape().clone(),
            });
        }
        if output_space.rank() != rank {
            return Err(LumenError::ShapeMismatch {
                expected: work_shape,
                got: output_space.shape().clone(),
            });
        }
        let work_dims = work_shape.dimensions();
        for k in 0..rank {
            let need = input_space.shape().dimension(k)?.max(output_space.shape().dimension(k)?);
            if work_dims[k] < need {
                return Err(LumenError::InvalidArgument(format!(
                    "work dimension {} smaller than user dimension {need}",
                    work_dims[k]
                )));
            }
        }
        let input_offsets =
            region_offsets(input_space.shape().dimensions(), work_dims, input_offset)?;
        let output_offsets =
            region_offsets(output_space.shape().dimensions(), work_dims, output_offset)?;

        let fft = FftEngine::new(work_dims)?;
        let work = vec![T::zero(); fft.interleaved_len()];
        debug!(work = %work_shape, "convolution operator ready");
        Ok(Self {
            input_space: input_space.clone(),
            output_space: output_space.clone(),
            work_shape,
            input_offsets,
            output_offsets,
            fft,
            work,
            mtf: None,
        })
    }

    pub fn input_space(&self) -> &VectorSpace<T> {
        &self.input_space
    }

    pub fn output_space(&self) -> &VectorSpace<T> {
        &self.output_space
    }

    pub fn work_shape(&self) -> &Shape {
        &self.work_shape
    }

    pub fn input_offsets(&self) -> &[usize] {
        &self.input_offsets
    }

    pub fn output_offsets(&self) -> &[usize] {
        &self.output_offsets
    }

    /// Number of complex elements in the work space.
    fn work_number(&self) -> usize {
        self.work_shape.number()
    }

    // -- PSF ----------------------------------------------------------------

    /// Install a PSF given as a shaped array of any numeric element
    /// type and dimensions no larger than the work shape.
    ///
    /// `offset` is the index of the PSF center in the array; the PSF is
    /// placed into the work buffer cyclically shifted so that this
    /// center lands on the origin. With `normalize` the PSF is scaled
    /// to unit sum first. The MTF is the forward transform scaled by
    /// 1/N, so later convolutions need no further scaling.
    pub fn set_psf<U: Element>(
        &mut self,
        psf: &Array<U>,
        offset: &[isize],
        normalize: bool,
    ) -> Result<()> {
        let rank = self.work_shape.rank();
        let work_dims = self.work_shape.dimensions();
        if psf.rank() != rank {
            return Err(LumenError::ShapeMismatch {
                expected: self.work_shape.clone(),
                got: psf.shape().clone(),
            });
        }
        for k in 0..rank {
            if psf.shape().dimension(k)? > work_dims[k] {
                return Err(LumenError::ShapeMismatch {
                    expected: self.work_shape.clone(),
                    got: psf.shape().clone(),
                });
            }
        }
        if offset.len() != rank {
            return Err(LumenError::InvalidArgument(format!(
                "{} PSF offsets given for rank {rank}",
                offset.len()
            )));
        }

        let values = psf.convert::<T>();
        let flat = values.buffer().to_vec();
        self.install_psf(&flat, psf.shape().dimensions(), offset, normalize)
    }

    /// Install a PSF already sampled on the work shape, centered at the
    /// origin.
    pub fn set_psf_workspace(&mut self, psf: &ShapedVector<T>, normalize: bool) -> Result<()> {
        if *psf.shape() != self.work_shape {
            return Err(LumenError::ShapeMismatch {
                expected: self.work_shape.clone(),
                got: psf.shape().clone(),
            });
        }
        let dims = self.work_shape.copy_dimensions();
        let offset = vec![0isize; dims.len()];
        let flat = psf.as_slice().to_vec();
        self.install_psf(&flat, &dims, &offset, normalize)
    }

    fn install_psf(
        &mut self,
        values: &[T],
        psf_dims: &[usize],
        offset: &[isize],
        normalize: bool,
    ) -> Result<()> {
        let sum: f64 = values.iter().map(|v| v.to_f64_lossy()).sum();
        let scale = if normalize {
            if !sum.is_finite() || sum == 0.0 {
                return Err(LumenError::InvalidArgument(
                    "cannot normalize a PSF with zero or non-finite sum".into(),
                ));
            }
            1.0 / sum
        } else {
            1.0
        };
        debug!(sum, normalize, "installing PSF");

        let work_dims = self.work_shape.copy_dimensions();
        let wstrides = colmajor_strides(&work_dims);
        self.work.fill(T::zero());
        let mut next = 0usize;
        for_each_index(psf_dims, |idx| {
            let mut at = 0usize;
            for k in 0..idx.len() {
                let shifted = (idx[k] as isize - offset[k])
                    .rem_euclid(work_dims[k] as isize) as usize;
                at += shifted * wstrides[k] as usize;
            }
            self.work[2 * at] = T::from_f64_lossy(values[next].to_f64_lossy() * scale);
            self.work[2 * at + 1] = T::zero();
            next += 1;
        });

        self.fft.forward(&mut self.work)?;
        let norm = T::from_f64_lossy(1.0 / self.work_number() as f64);
        let mtf: Vec<T> = self.work.iter().map(|&v| v * norm).collect();
        self.mtf = Some(mtf);
        Ok(())
    }

    // -- work-space transfer ------------------------------------------------

    /// Copy a user-space vector into the complex work buffer, zeroing
    /// everything outside the user region and all imaginary parts.
    ///
    /// With `adjoint` the vector comes from the output space and is
    /// placed at the output offsets (the transpose of `R`); otherwise
    /// it comes from the input space (`S`).
    pub fn push(&mut self, src: &ShapedVector<T>, adjoint: bool) -> Result<()> {
        let (space, offsets) = if adjoint {
            (&self.output_space, &self.output_offsets)
        } else {
            (&self.input_space, &self.input_offsets)
        };
        if !src.belongs_to(space) {
            return Err(LumenError::IncorrectSpace(format!(
                "push operand of shape {} does not match user space {}",
                src.shape(),
                space.shape()
            )));
        }
        let dims = space.shape().copy_dimensions();
        let wstrides = colmajor_strides(self.work_shape.dimensions());
        let offsets = offsets.clone();
        let values = src.as_slice();

        self.work.fill(T::zero());
        let work = &mut self.work;
        let mut next = 0usize;
        for_each_index(&dims, |idx| {
            let mut at = 0usize;
            for k in 0..idx.len() {
                at += (offsets[k] + idx[k]) * wstrides[k] as usize;
            }
            work[2 * at] = values[next];
            next += 1;
        });
        Ok(())
    }

    /// Extract the real part of the work buffer at a user region, the
    /// inverse transfer of [`push`](Convolution::push): the output
    /// region normally, the input region under `adjoint`.
    pub fn pull(&self, dst: &mut ShapedVector<T>, adjoint: bool) -> Result<()> {
        let (space, offsets) = if adjoint {
            (&self.input_space, &self.input_offsets)
        } else {
            (&self.output_space, &self.output_offsets)
        };
        if !dst.belongs_to(space) {
            return Err(LumenError::IncorrectSpace(format!(
                "pull operand of shape {} does not match user space {}",
                dst.shape(),
                space.shape()
            )));
        }
        let dims = space.shape().copy_dimensions();
        let wstrides = colmajor_strides(self.work_shape.dimensions());
        let work = &self.work;
        let values = dst.as_mut_slice();
        let mut next = 0usize;
        for_each_index(&dims, |idx| {
            let mut at = 0usize;
            for k in 0..idx.len() {
                at += (offsets[k] + idx[k]) * wstrides[k] as usize;
            }
            values[next] = work[2 * at];
            next += 1;
        });
        Ok(())
    }

    // -- transforms ---------------------------------------------------------

    pub fn forward_fft(&mut self) -> Result<()> {
        self.fft.forward(&mut self.work)
    }

    pub fn backward_fft(&mut self) -> Result<()> {
        self.fft.backward(&mut self.work)
    }

    /// Forward FFT, multiply by the MTF (conjugated under `conj`),
    /// backward FFT, all in place on the work buffer.
    pub fn convolve(&mut self, conj: bool) -> Result<()> {
        if self.mtf.is_none() {
            return Err(LumenError::InvalidState(
                "convolve called before a PSF was set".into(),
            ));
        }
        self.fft.forward(&mut self.work)?;
        if let Some(mtf) = &self.mtf {
            for j in 0..self.work_shape.number() {
                let mr = mtf[2 * j];
                let mi = if conj { -mtf[2 * j + 1] } else { mtf[2 * j + 1] };
                let wr = self.work[2 * j];
                let wi = self.work[2 * j + 1];
                self.work[2 * j] = wr * mr - wi * mi;
                self.work[2 * j + 1] = wr * mi + wi * mr;
            }
        }
        self.fft.backward(&mut self.work)
    }

    /// Full application: `dst = cnvl(src)`, or `dst = cnvl^T(src)`
    /// under `adjoint`.
    pub fn apply(
        &mut self,
        dst: &mut ShapedVector<T>,
        src: &ShapedVector<T>,
        adjoint: bool,
    ) -> Result<()> {
        self.push(src, adjoint)?;
        self.convolve(adjoint)?;
        self.pull(dst, adjoint)
    }

    // -- geometry for the cost layer ----------------------------------------

    pub(crate) fn work_slice(&mut self) -> &mut [T] {
        &mut self.work
    }

    pub(crate) fn work_dims(&self) -> Vec<usize> {
        self.work_shape.copy_dimensions()
    }

    /// (user dims, work offsets, work strides) of the output region.
    pub(crate) fn output_geometry(&self) -> (Vec<usize>, Vec<usize>, Vec<usize>) {
        (
            self.output_space.shape().copy_dimensions(),
            self.output_offsets.clone(),
            colmajor_strides(self.work_shape.dimensions())
                .iter()
                .map(|&s| s as usize)
                .collect(),
        )
    }

    /// (user dims, work offsets, work strides) of the input region.
    pub(crate) fn input_geometry(&self) -> (Vec<usize>, Vec<usize>, Vec<usize>) {
        (
            self.input_space.shape().copy_dimensions(),
            self.input_offsets.clone(),
            colmajor_strides(self.work_shape.dimensions())
                .iter()
                .map(|&s| s as usize)
                .collect(),
        )
    }
}

/// Resolve per-axis placement of a user region inside the work shape;
/// central placement when no offset is given.
fn region_offsets(
    user_dims: &[usize],
    work_dims: &[usize],
    offset: Option<&[usize]>,
) -> Result<Vec<usize>> {
    let rank = user_dims.len();
    match offset {
        None => Ok((0..rank)
            .map(|k| work_dims[k] / 2 - user_dims[k] / 2)
            .collect()),
        Some(offsets) => {
            if offsets.len() != rank {
                return Err(LumenError::InvalidArgument(format!(
                    "{} region offsets given for rank {rank}",
                    offsets.len()
                )));
            }
            for k in 0..rank {
                if offsets[k] + user_dims[k] > work_dims[k] {
                    return Err(LumenError::OutOfBounds {
                        index: offsets[k] as isize,
                        extent: work_dims[k] - user_dims[k] + 1,
                    });
                }
            }
            Ok(offsets.to_vec())
        }
    }
}
