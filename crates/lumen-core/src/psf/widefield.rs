use std::f64::consts::TAU;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::array::Array;
use crate::consts::PARALLEL_PLANE_THRESHOLD;
use crate::error::{LumenError, Result};
use crate::fft::FftEngine;
use crate::shape::Shape;

use super::zernike::{fft_coordinate, gram_schmidt, zernike_array};

/// Physical parameters of a wide-field fluorescence microscope.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WideFieldParams {
    /// Numerical aperture of the objective.
    pub na: f64,
    /// Emission wavelength (meters).
    pub lambda: f64,
    /// Refractive index of the immersion medium.
    pub ni: f64,
    /// Refractive index of the sample medium (0 = unused).
    #[serde(default)]
    pub ns: f64,
    /// Imaging depth into the sample (meters, 0 = none).
    #[serde(default)]
    pub zdepth: f64,
    /// Lateral pixel size (meters).
    pub dxy: f64,
    /// Axial step between planes (meters).
    pub dz: f64,
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
}

impl Default for WideFieldParams {
    fn default() -> Self {
        Self {
            na: 1.4,
            lambda: 542e-9,
            ni: 1.518,
            ns: 0.0,
            zdepth: 0.0,
            dxy: 64.5e-9,
            dz: 160e-9,
            nx: 256,
            ny: 256,
            nz: 64,
        }
    }
}

impl WideFieldParams {
    fn validate(&self) -> Result<()> {
        let positives = [
            ("na", self.na),
            ("lambda", self.lambda),
            ("ni", self.ni),
            ("dxy", self.dxy),
            ("dz", self.dz),
        ];
        for (name, value) in positives {
            if !value.is_finite() || value <= 0.0 {
                return Err(LumenError::InvalidArgument(format!(
                    "{name} must be finite and positive, got {value}"
                )));
            }
        }
        if !self.ns.is_finite() || self.ns < 0.0 || !self.zdepth.is_finite() {
            return Err(LumenError::InvalidArgument(
                "sample index and depth must be finite and nonnegative".into(),
            ));
        }
        if self.nx == 0 || self.ny == 0 || self.nz == 0 {
            return Err(LumenError::InvalidArgument(
                "grid dimensions must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Parametric pupil-function PSF model.
///
/// The pupil modulus rho is a normalized Zernike expansion of the
/// beta coefficients, the phase phi a Zernike expansion of the alpha
/// coefficients, and the defocus function psi derives from the
/// immersion wavenumber and the lateral pupil shift. Each z-plane
/// forms the complex pupil `rho * exp(i(phi + s*psi))`, transforms it,
/// and accumulates its squared modulus into the 3-D PSF. Every setter
/// marks the model dirty; accessors of derived fields recompute on
/// demand.
#[derive(Debug)]
pub struct WideFieldModel {
    params: WideFieldParams,
    /// Restrict the basis to the radially symmetric modes.
    radial: bool,
    /// Leading basis modes excluded from the fitted phase: piston,
    /// tip and tilt for the full basis (they only translate the PSF),
    /// piston alone for the radial basis.
    k0: usize,
    nzern: usize,
    /// Orthonormalized modes, `nzern * nx * ny`, FFT layout.
    basis: Vec<f64>,
    /// 0/1 pupil mask over the frequency grid.
    mask: Vec<f64>,
    /// Square root of the pupil pixel count.
    area: f64,

    beta: Vec<f64>,
    alpha: Vec<f64>,
    /// Immersion wavenumber (defocus center), cycles per meter.
    nu_i: f64,
    /// Sample wavenumber (depth aberration), 0 when unused.
    nu_s: f64,
    delta_x: f64,
    delta_y: f64,

    rho: Vec<f64>,
    phi: Vec<f64>,
    psi: Vec<f64>,
    gamma: Vec<f64>,

    /// Conjugated pupil spectra, `nz` interleaved planes of
    /// `2 * nx * ny` values.
    pupil: Vec<f64>,
    /// 3-D PSF, `nz` planes of `nx * ny` values.
    psf: Vec<f64>,

    fft: FftEngine<f64>,
    dirty: bool,
}

impl WideFieldModel {
    /// Model over the full Zernike basis; the phase expansion starts
    /// at the defocus mode (piston, tip and tilt excluded).
    pub fn new(params: WideFieldParams) -> Result<Self> {
        Self::with_radial_modes(params, false)
    }

    /// Model optionally restricted to the radially symmetric modes.
    /// The restricted basis carries no tip/tilt, so only piston is
    /// excluded from the fitted phase.
    pub fn with_radial_modes(params: WideFieldParams, radial_only: bool) -> Result<Self> {
        params.validate()?;
        let npix = params.nx * params.ny;
        let fft = FftEngine::new(&[params.nx, params.ny])?;
        let nu_i = params.ni / params.lambda;
        let nu_s = if params.ns > 0.0 {
            params.ns / params.lambda
        } else {
            0.0
        };
        let mut model = Self {
            radial: radial_only,
            k0: if radial_only { 1 } else { 3 },
            nzern: 0,
            basis: Vec::new(),
            mask: vec![0.0; npix],
            area: 0.0,
            beta: vec![1.0],
            alpha: Vec::new(),
            nu_i,
            nu_s,
            delta_x: 0.0,
            delta_y: 0.0,
            rho: vec![0.0; npix],
            phi: vec![0.0; npix],
            psi: vec![0.0; npix],
            gamma: vec![0.0; npix],
            pupil: vec![0.0; 2 * npix * params.nz],
            psf: vec![0.0; npix * params.nz],
            fft,
            dirty: true,
            params,
        };
        model.rebuild_mask_and_defocus();
        model.ensure_basis(model.k0.max(1))?;
        model.update_rho()?;
        model.update_phi();
        Ok(model)
    }

    pub fn params(&self) -> &WideFieldParams {
        &self.params
    }

    pub fn nzern(&self) -> usize {
        self.nzern
    }

    /// Pupil radius in frequency units, `NA / lambda`.
    pub fn pupil_radius(&self) -> f64 {
        self.params.na / self.params.lambda
    }

    /// Pupil radius in grid pixels.
    fn pupil_radius_pixels(&self) -> f64 {
        self.pupil_radius() * self.params.nx as f64 * self.params.dxy
    }

    fn npix(&self) -> usize {
        self.params.nx * self.params.ny
    }

    /// `2 * pi * zdepth` when the depth aberration is active, else 0.
    fn depth_scale(&self) -> f64 {
        if self.params.zdepth != 0.0 && self.nu_s > 0.0 {
            TAU * self.params.zdepth
        } else {
            0.0
        }
    }

    pub fn mask(&self) -> &[f64] {
        &self.mask
    }

    /// Square root of the pupil pixel count.
    pub fn area(&self) -> f64 {
        self.area
    }

    pub fn rho(&self) -> &[f64] {
        &self.rho
    }

    pub fn phi(&self) -> &[f64] {
        &self.phi
    }

    pub fn psi(&self) -> &[f64] {
        &self.psi
    }

    pub fn beta(&self) -> &[f64] {
        &self.beta
    }

    pub fn alpha(&self) -> &[f64] {
        &self.alpha
    }

    /// Current defocus parameter vector `(nu_i, delta_x, delta_y)`,
    /// with the sample wavenumber appended when the depth aberration
    /// is active.
    pub fn defocus(&self) -> Vec<f64> {
        if self.depth_scale() != 0.0 {
            vec![self.nu_i, self.delta_x, self.delta_y, self.nu_s]
        } else {
            vec![self.nu_i, self.delta_x, self.delta_y]
        }
    }

    /// The orthonormalized basis, `nzern` planes of `nx * ny` values.
    pub fn basis(&self) -> &[f64] {
        &self.basis
    }

    // -- parameter setters --------------------------------------------------

    /// Replace the modulus coefficients, widening the basis if needed.
    pub fn set_rho(&mut self, beta: &[f64]) -> Result<()> {
        if beta.is_empty() {
            return Err(LumenError::InvalidArgument(
                "at least one modulus coefficient is required".into(),
            ));
        }
        self.ensure_basis(beta.len().max(self.k0 + self.alpha.len()))?;
        self.beta = beta.to_vec();
        self.update_rho()?;
        self.dirty = true;
        Ok(())
    }

    /// Replace the phase coefficients (coefficient k drives basis
    /// mode `k + k0`), widening the basis if needed.
    pub fn set_phi(&mut self, alpha: &[f64]) -> Result<()> {
        self.ensure_basis((self.k0 + alpha.len()).max(self.beta.len()))?;
        self.alpha = alpha.to_vec();
        self.update_phi();
        self.dirty = true;
        Ok(())
    }

    /// Update the defocus parameters. The vector is interpreted by
    /// length: 1 = `(nu_i)`, 2 = `(nu_i, nu_s)`, 3 = `(nu_i, delta_x,
    /// delta_y)`, 4 = `(nu_i, delta_x, delta_y, nu_s)`; the last form
    /// requires a nonzero imaging depth.
    pub fn set_defocus(&mut self, vec: &[f64]) -> Result<()> {
        if let Some(&nu) = vec.first() {
            if !nu.is_finite() || nu <= 0.0 {
                return Err(LumenError::InvalidArgument(format!(
                    "immersion wavenumber must be finite and positive, got {nu}"
                )));
            }
        }
        match vec.len() {
            1 => {
                self.nu_i = vec[0];
            }
            2 => {
                self.nu_i = vec[0];
                self.nu_s = vec[1];
            }
            3 => {
                self.nu_i = vec[0];
                self.delta_x = vec[1];
                self.delta_y = vec[2];
            }
            4 => {
                if self.params.zdepth == 0.0 {
                    return Err(LumenError::InvalidState(
                        "defocus with a sample wavenumber requires a nonzero imaging depth"
                            .into(),
                    ));
                }
                self.nu_i = vec[0];
                self.delta_x = vec[1];
                self.delta_y = vec[2];
                self.nu_s = vec[3];
            }
            n => {
                return Err(LumenError::InvalidArgument(format!(
                    "defocus vector length must be 1, 2, 3 or 4, got {n}"
                )));
            }
        }
        self.rebuild_mask_and_defocus();
        self.update_rho()?;
        self.update_phi();
        self.dirty = true;
        Ok(())
    }

    // -- derived-field maintenance ------------------------------------------

    /// Grow the basis to at least `nzern` modes. Existing modes keep
    /// their values: the Gram-Schmidt pass is order-preserving.
    fn ensure_basis(&mut self, nzern: usize) -> Result<()> {
        if nzern <= self.nzern {
            return Ok(());
        }
        let (nx, ny) = (self.params.nx, self.params.ny);
        let mut basis = zernike_array(
            nzern,
            nx,
            ny,
            self.pupil_radius_pixels(),
            true,
            self.radial,
        )?;
        gram_schmidt(&mut basis, nzern, nx * ny);
        debug!(nzern, "Zernike basis rebuilt");
        self.basis = basis;
        self.nzern = nzern;
        Ok(())
    }

    /// Frequency-space coordinates of a grid pixel, shifted by the
    /// lateral defocus center.
    fn shifted_frequencies(&self, ix: usize, iy: usize) -> (f64, f64) {
        let dkx = 1.0 / (self.params.nx as f64 * self.params.dxy);
        let dky = 1.0 / (self.params.ny as f64 * self.params.dxy);
        let kx = fft_coordinate(ix, self.params.nx) * dkx;
        let ky = fft_coordinate(iy, self.params.ny) * dky;
        (kx - self.delta_x, ky - self.delta_y)
    }

    /// Rebuild the pupil mask, area, and the defocus and depth fields.
    fn rebuild_mask_and_defocus(&mut self) {
        let (nx, ny) = (self.params.nx, self.params.ny);
        let dkx = 1.0 / (nx as f64 * self.params.dxy);
        let dky = 1.0 / (ny as f64 * self.params.dxy);
        let r2 = self.pupil_radius() * self.pupil_radius();
        let depth = self.depth_scale() != 0.0;

        let mut count = 0usize;
        for iy in 0..ny {
            let ky = fft_coordinate(iy, ny) * dky;
            for ix in 0..nx {
                let kx = fft_coordinate(ix, nx) * dkx;
                let at = ix + nx * iy;
                let ux = kx - self.delta_x;
                let uy = ky - self.delta_y;
                let qi = self.nu_i * self.nu_i - ux * ux - uy * uy;
                let qs = self.nu_s * self.nu_s - ux * ux - uy * uy;
                let inside =
                    kx * kx + ky * ky < r2 && qi >= 0.0 && (!depth || qs >= 0.0);
                if inside {
                    count += 1;
                    self.mask[at] = 1.0;
                    self.psi[at] = qi.sqrt();
                    self.gamma[at] = if depth { qs.sqrt() } else { 0.0 };
                } else {
                    self.mask[at] = 0.0;
                    self.psi[at] = 0.0;
                    self.gamma[at] = 0.0;
                }
            }
        }
        self.area = (count as f64).sqrt();
    }

    /// `rho = (sum beta_n Z_n) / |beta|` on the mask, zero elsewhere.
    fn update_rho(&mut self) -> Result<()> {
        let norm = self.beta.iter().map(|b| b * b).sum::<f64>().sqrt();
        if !norm.is_finite() || norm == 0.0 {
            return Err(LumenError::InvalidArgument(
                "modulus coefficients must not all vanish".into(),
            ));
        }
        let npix = self.npix();
        for i in 0..npix {
            if self.mask[i] == 0.0 {
                self.rho[i] = 0.0;
                continue;
            }
            let mut acc = 0.0f64;
            for (n, &b) in self.beta.iter().enumerate() {
                acc += b * self.basis[n * npix + i];
            }
            self.rho[i] = acc / norm;
        }
        Ok(())
    }

    /// `phi = sum alpha_n Z_(n + k0)` on the mask, zero elsewhere.
    fn update_phi(&mut self) {
        let npix = self.npix();
        for i in 0..npix {
            if self.mask[i] == 0.0 {
                self.phi[i] = 0.0;
                continue;
            }
            let mut acc = 0.0f64;
            for (n, &a) in self.alpha.iter().enumerate() {
                acc += a * self.basis[(n + self.k0) * npix + i];
            }
            self.phi[i] = acc;
        }
    }

    // -- PSF synthesis ------------------------------------------------------

    /// Defocus phase scale of plane z: the second half of the axis
    /// carries negative frequencies.
    fn defocus_factor(&self, z: usize) -> f64 {
        let nz = self.params.nz;
        let zz = if z <= nz / 2 {
            z as f64
        } else {
            z as f64 - nz as f64
        };
        TAU * zz * self.params.dz
    }

    /// Pupil phase at one pixel of one plane.
    fn phase_at(&self, i: usize, s: f64) -> f64 {
        self.phi[i] + s * self.psi[i] + self.depth_scale() * (self.gamma[i] - self.psi[i])
    }

    /// Interleaved complex pupil plane `rho * exp(i * phase)` before
    /// the transform.
    fn build_plane(&self, z: usize) -> Vec<f64> {
        let npix = self.npix();
        let s = self.defocus_factor(z);
        let mut plane = vec![0.0f64; 2 * npix];
        for i in 0..npix {
            if self.mask[i] == 0.0 {
                continue;
            }
            let theta = self.phase_at(i, s);
            plane[2 * i] = self.rho[i] * theta.cos();
            plane[2 * i + 1] = self.rho[i] * theta.sin();
        }
        plane
    }

    /// Rebuild the complex pupil planes and the PSF if any parameter
    /// changed since the last rebuild.
    pub fn compute_psf(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let (nx, ny, nz) = (self.params.nx, self.params.ny, self.params.nz);
        let npix = nx * ny;
        let scale = 1.0 / (nx * ny * nz) as f64;

        let transform = |z: usize| -> Result<Vec<f64>> {
            let mut plane = self.build_plane(z);
            self.fft.forward(&mut plane)?;
            Ok(plane)
        };
        let planes: Vec<Vec<f64>> = if nz >= PARALLEL_PLANE_THRESHOLD {
            (0..nz)
                .into_par_iter()
                .map(transform)
                .collect::<Result<Vec<_>>>()?
        } else {
            (0..nz).map(transform).collect::<Result<Vec<_>>>()?
        };

        for (z, plane) in planes.iter().enumerate() {
            for i in 0..npix {
                let re = plane[2 * i];
                let im = plane[2 * i + 1];
                self.pupil[2 * npix * z + 2 * i] = re;
                self.pupil[2 * npix * z + 2 * i + 1] = -im;
                self.psf[npix * z + i] = (re * re + im * im) * scale;
            }
        }
        self.dirty = false;
        debug!(nz, "PSF rebuilt");
        Ok(())
    }

    /// The 3-D PSF, `nz` planes of `nx * ny` values in FFT layout.
    /// Recomputes when dirty.
    pub fn psf(&mut self) -> Result<&[f64]> {
        self.compute_psf()?;
        Ok(&self.psf)
    }

    /// The conjugated pupil spectra. Recomputes when dirty.
    pub fn pupil(&mut self) -> Result<&[f64]> {
        self.compute_psf()?;
        Ok(&self.pupil)
    }

    /// The PSF as a shaped array of dimensions `(nx, ny, nz)`.
    pub fn psf_array(&mut self) -> Result<Array<f64>> {
        self.compute_psf()?;
        let shape = Shape::new(&[self.params.nx, self.params.ny, self.params.nz])?;
        Array::from_vec(shape, self.psf.clone())
    }

    // -- Jacobian-transpose operations --------------------------------------

    /// Per-pixel back-propagated fields shared by the three adjoints:
    /// the modulus field, the phase field, and the phase field scaled
    /// by the per-plane defocus factor.
    ///
    /// For each plane the spectrum-domain product `a[z] * q[z]` is
    /// transformed back to the pupil plane (the DFT matrix is its own
    /// transpose), then combined with the pupil phase.
    fn jacobian_fields(&self, q: &[f64]) -> Result<(Vec<f64>, Vec<f64>, Vec<f64>)> {
        let (nx, ny, nz) = (self.params.nx, self.params.ny, self.params.nz);
        let npix = nx * ny;
        if q.len() != npix * nz {
            return Err(LumenError::InvalidArgument(format!(
                "adjoint operand length {} does not match {} PSF samples",
                q.len(),
                npix * nz
            )));
        }
        let scale = 2.0 / (nx * ny * nz) as f64;

        let back = |z: usize| -> Result<(Vec<f64>, f64)> {
            let mut prod = vec![0.0f64; 2 * npix];
            for i in 0..npix {
                let qv = q[npix * z + i];
                prod[2 * i] = self.pupil[2 * npix * z + 2 * i] * qv;
                prod[2 * i + 1] = self.pupil[2 * npix * z + 2 * i + 1] * qv;
            }
            self.fft.forward(&mut prod)?;
            Ok((prod, self.defocus_factor(z)))
        };
        let planes: Vec<(Vec<f64>, f64)> = if nz >= PARALLEL_PLANE_THRESHOLD {
            (0..nz)
                .into_par_iter()
                .map(back)
                .collect::<Result<Vec<_>>>()?
        } else {
            (0..nz).map(back).collect::<Result<Vec<_>>>()?
        };

        let mut modulus = vec![0.0f64; npix];
        let mut phase = vec![0.0f64; npix];
        let mut phase_defocus = vec![0.0f64; npix];
        for (w, s) in &planes {
            for i in 0..npix {
                if self.mask[i] == 0.0 {
                    continue;
                }
                let theta = self.phase_at(i, *s);
                let (sin, cos) = theta.sin_cos();
                let wr = w[2 * i];
                let wi = w[2 * i + 1];
                let re = scale * (wr * cos - wi * sin);
                let im = scale * (wr * sin + wi * cos);
                modulus[i] += re;
                phase[i] -= self.rho[i] * im;
                phase_defocus[i] -= *s * self.rho[i] * im;
            }
        }
        Ok((modulus, phase, phase_defocus))
    }

    /// Gradient of a PSF-space functional with respect to the modulus
    /// coefficients beta: contraction of the back-propagated modulus
    /// field against the basis, with the beta-normalization
    /// correction.
    pub fn apply_jacobian_rho(&mut self, q: &[f64]) -> Result<Vec<f64>> {
        self.compute_psf()?;
        let (modulus, _, _) = self.jacobian_fields(q)?;
        let npix = self.npix();
        let norm = self.beta.iter().map(|b| b * b).sum::<f64>().sqrt();
        let mut grad = Vec::with_capacity(self.beta.len());
        for (k, &b) in self.beta.iter().enumerate() {
            let mut acc = 0.0f64;
            for i in 0..npix {
                if self.mask[i] != 0.0 {
                    acc += modulus[i] * self.basis[k * npix + i];
                }
            }
            grad.push(acc * (1.0 - (b * b) / (norm * norm)) / norm);
        }
        Ok(grad)
    }

    /// Gradient with respect to the phase coefficients alpha.
    pub fn apply_jacobian_phi(&mut self, q: &[f64]) -> Result<Vec<f64>> {
        self.compute_psf()?;
        let (_, phase, _) = self.jacobian_fields(q)?;
        let npix = self.npix();
        let mut grad = Vec::with_capacity(self.alpha.len());
        for k in 0..self.alpha.len() {
            let mut acc = 0.0f64;
            for i in 0..npix {
                if self.mask[i] != 0.0 {
                    acc += phase[i] * self.basis[(k + self.k0) * npix + i];
                }
            }
            grad.push(acc);
        }
        Ok(grad)
    }

    /// Gradient with respect to the defocus parameters
    /// `(nu_i, delta_x, delta_y)`, differentiating through the
    /// defocus function (and the depth field when active).
    pub fn apply_jacobian_defocus(&mut self, q: &[f64]) -> Result<Vec<f64>> {
        self.compute_psf()?;
        let (_, phase, phase_defocus) = self.jacobian_fields(q)?;
        let (nx, ny) = (self.params.nx, self.params.ny);
        let depth = self.depth_scale();

        let mut g_nu = 0.0f64;
        let mut g_dx = 0.0f64;
        let mut g_dy = 0.0f64;
        for iy in 0..ny {
            for ix in 0..nx {
                let at = ix + nx * iy;
                if self.mask[at] == 0.0 || self.psi[at] <= 0.0 {
                    continue;
                }
                let (ux, uy) = self.shifted_frequencies(ix, iy);
                // coefficient of a change of psi at this pixel
                let c_psi = phase_defocus[at] - depth * phase[at];
                g_nu += c_psi * self.nu_i / self.psi[at];
                let mut cx = c_psi * ux / self.psi[at];
                let mut cy = c_psi * uy / self.psi[at];
                if depth != 0.0 && self.gamma[at] > 0.0 {
                    cx += depth * phase[at] * ux / self.gamma[at];
                    cy += depth * phase[at] * uy / self.gamma[at];
                }
                g_dx += cx;
                g_dy += cy;
            }
        }
        Ok(vec![g_nu, g_dx, g_dy])
    }
}
