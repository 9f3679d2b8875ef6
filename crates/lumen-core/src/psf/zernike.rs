use rayon::prelude::*;

use crate::consts::PARALLEL_PLANE_THRESHOLD;
use crate::error::{LumenError, Result};

/// Solve a 1-based Noll index for the radial and azimuthal orders
/// `(n, m)` with `m >= 0`; the sign convention (cosine for even Noll
/// indices, sine for odd ones) is applied at evaluation.
pub fn noll_to_nm(j: usize) -> Result<(usize, usize)> {
    if j == 0 {
        return Err(LumenError::InvalidArgument(
            "Noll indices start at 1".into(),
        ));
    }
    let mut n = 0usize;
    while j > (n + 1) * (n + 2) / 2 {
        n += 1;
    }
    // 1-based position inside the radial-order row
    let k = j - n * (n + 1) / 2;
    let m = if n % 2 == 0 {
        2 * (k / 2)
    } else {
        2 * ((k - 1) / 2) + 1
    };
    Ok((n, m))
}

/// Cumulative sums of `ln i`: entry k holds `ln(k!)`.
fn log_factorials(max: usize) -> Vec<f64> {
    let mut lf = Vec::with_capacity(max + 1);
    lf.push(0.0);
    let mut acc = 0.0f64;
    for i in 1..=max {
        acc += (i as f64).ln();
        lf.push(acc);
    }
    lf
}

/// Coefficients of the radial polynomial `R_n^m`: entry s multiplies
/// `r^(n - 2s)`. Computed in log-space with alternating signs so that
/// large radial orders never overflow the intermediate factorials.
pub fn radial_coefficients(n: usize, m: usize) -> Vec<f64> {
    let lf = log_factorials(n);
    (0..=(n - m) / 2)
        .map(|s| {
            let ln = lf[n - s] - lf[s] - lf[(n + m) / 2 - s] - lf[(n - m) / 2 - s];
            if s % 2 == 0 {
                ln.exp()
            } else {
                -ln.exp()
            }
        })
        .collect()
}

/// Grid coordinate in FFT layout: the origin sits at index 0 and the
/// upper half of the axis carries negative positions.
pub(crate) fn fft_coordinate(index: usize, dim: usize) -> f64 {
    if index <= dim / 2 {
        index as f64
    } else {
        index as f64 - dim as f64
    }
}

fn evaluate_mode(j: usize, width: usize, height: usize, radius: f64) -> Result<Vec<f64>> {
    let (n, m) = noll_to_nm(j)?;
    let coefs = radial_coefficients(n, m);
    let mut mode = vec![0.0f64; width * height];
    for iy in 0..height {
        let y = fft_coordinate(iy, height);
        for ix in 0..width {
            let x = fft_coordinate(ix, width);
            let rr = (x * x + y * y).sqrt() / radius;
            if rr >= 1.0 {
                continue;
            }
            let mut radial = 0.0f64;
            for (s, &c) in coefs.iter().enumerate() {
                radial += c * rr.powi((n - 2 * s) as i32);
            }
            let value = if m == 0 {
                radial
            } else {
                let azimuth = m as f64 * y.atan2(x);
                if j % 2 == 0 {
                    radial * azimuth.cos()
                } else {
                    radial * azimuth.sin()
                }
            };
            mode[ix + width * iy] = value;
        }
    }
    Ok(mode)
}

/// Noll index of the k-th radially symmetric mode (m = 0): piston,
/// defocus, primary spherical, and so on.
pub fn radial_noll_index(k: usize) -> usize {
    // row n = 2k; the m = 0 mode comes first in an even row
    k * (2 * k + 1) + 1
}

/// Evaluate the first `nzern` Zernike modes on a `width x height`
/// grid in FFT layout, zero outside `radius` pixels.
///
/// Mode k is Noll mode k + 1, or the k-th radially symmetric mode
/// (piston, defocus, spherical, ...) with `radial_only`. Returns one
/// flat buffer of length `nzern * width * height`, mode k starting at
/// offset `k * width * height`. With `normalized` every mode is
/// scaled to unit squared sum over the pupil.
pub fn zernike_array(
    nzern: usize,
    width: usize,
    height: usize,
    radius: f64,
    normalized: bool,
    radial_only: bool,
) -> Result<Vec<f64>> {
    if nzern == 0 {
        return Err(LumenError::InvalidArgument(
            "at least one Zernike mode is required".into(),
        ));
    }
    if width == 0 || height == 0 {
        return Err(LumenError::InvalidArgument(
            "Zernike grid dimensions must be positive".into(),
        ));
    }
    if !radius.is_finite() || radius <= 0.0 {
        return Err(LumenError::InvalidArgument(format!(
            "pupil radius must be finite and positive, got {radius}"
        )));
    }

    let build = |k: usize| -> Result<Vec<f64>> {
        let j = if radial_only {
            radial_noll_index(k - 1)
        } else {
            k
        };
        let mut mode = evaluate_mode(j, width, height, radius)?;
        if normalized {
            let sq: f64 = mode.iter().map(|v| v * v).sum();
            if sq > 0.0 {
                let scale = 1.0 / sq.sqrt();
                for v in &mut mode {
                    *v *= scale;
                }
            }
        }
        Ok(mode)
    };

    let modes: Vec<Vec<f64>> = if nzern >= PARALLEL_PLANE_THRESHOLD {
        (1..=nzern)
            .into_par_iter()
            .map(build)
            .collect::<Result<Vec<_>>>()?
    } else {
        (1..=nzern).map(build).collect::<Result<Vec<_>>>()?
    };

    let npix = width * height;
    let mut basis = Vec::with_capacity(nzern * npix);
    for mode in modes {
        basis.extend_from_slice(&mode);
    }
    Ok(basis)
}

/// In-place Gram-Schmidt pass over a flat mode basis, in storage
/// order, leaving every mode unit-norm and orthogonal to its
/// predecessors. Decorrelates the discretization bias of the sampled
/// polynomials.
pub fn gram_schmidt(basis: &mut [f64], nzern: usize, npix: usize) {
    for k in 0..nzern {
        for l in 0..k {
            let mut dot = 0.0f64;
            for i in 0..npix {
                dot += basis[k * npix + i] * basis[l * npix + i];
            }
            for i in 0..npix {
                basis[k * npix + i] -= dot * basis[l * npix + i];
            }
        }
        let mut sq = 0.0f64;
        for i in 0..npix {
            sq += basis[k * npix + i] * basis[k * npix + i];
        }
        if sq > 0.0 {
            let scale = 1.0 / sq.sqrt();
            for i in 0..npix {
                basis[k * npix + i] *= scale;
            }
        }
    }
}
