mod common;

use common::Lcg;
use lumen_core::error::LumenError;
use lumen_core::psf::{WideFieldModel, WideFieldParams};

/// Small grid keeping the FD tests fast.
fn small_params() -> WideFieldParams {
    WideFieldParams {
        na: 1.4,
        lambda: 542e-9,
        ni: 1.518,
        ns: 0.0,
        zdepth: 0.0,
        dxy: 64.5e-9,
        dz: 160e-9,
        nx: 16,
        ny: 16,
        nz: 4,
    }
}

fn scenario_params() -> WideFieldParams {
    WideFieldParams {
        nx: 64,
        ny: 64,
        nz: 16,
        ..small_params()
    }
}

fn psf_inner(model: &mut WideFieldModel, q: &[f64]) -> f64 {
    model
        .psf()
        .unwrap()
        .iter()
        .zip(q)
        .map(|(&h, &w)| h * w)
        .sum()
}

#[test]
fn default_psf_is_nonnegative_and_sums_to_one() {
    let mut model = WideFieldModel::new(scenario_params()).unwrap();
    model.set_rho(&[1.0]).unwrap();
    model.set_phi(&[0.0]).unwrap();
    let ni = 1.518f64;
    let lambda = 542e-9f64;
    model.set_defocus(&[ni / lambda, 0.0, 0.0]).unwrap();

    let psf = model.psf().unwrap();
    let mut sum = 0.0f64;
    for &h in psf {
        assert!(h >= 0.0, "PSF must be nonnegative, got {h}");
        sum += h;
    }
    // rho is the unit-norm piston, so Parseval gives a unit total
    assert!((sum - 1.0).abs() < 1e-8, "PSF sum is {sum}");
}

#[test]
fn psf_is_symmetric_under_point_reflection() {
    let mut model = WideFieldModel::new(scenario_params()).unwrap();
    let (nx, ny, nz) = (64usize, 64usize, 16usize);
    let psf = model.psf().unwrap().to_vec();
    for z in 0..nz {
        let plane = &psf[nx * ny * z..nx * ny * (z + 1)];
        for iy in 0..ny {
            for ix in 0..nx {
                let mx = (nx - ix) % nx;
                let my = (ny - iy) % ny;
                let a = plane[ix + nx * iy];
                let b = plane[mx + nx * my];
                assert!(
                    (a - b).abs() < 1e-10 * (1.0 + a.abs()),
                    "PSF asymmetric at z={z} ({ix}, {iy}): {a} vs {b}"
                );
            }
        }
    }
}

#[test]
fn pupil_mask_matches_the_aperture() {
    let model = WideFieldModel::new(small_params()).unwrap();
    let count: f64 = model.mask().iter().sum();
    assert!(count > 0.0, "empty pupil mask");
    assert!(
        (model.area() - count.sqrt()).abs() < 1e-12,
        "area {} vs pixel count {count}",
        model.area()
    );
    // rho is supported exactly on the mask
    for (i, (&m, &r)) in model.mask().iter().zip(model.rho()).enumerate() {
        if m == 0.0 {
            assert_eq!(r, 0.0, "rho leaks outside the mask at {i}");
        }
    }
}

#[test]
fn setters_mark_the_model_dirty() {
    let mut model = WideFieldModel::new(small_params()).unwrap();
    let before = model.psf().unwrap().to_vec();
    // a pure phase aberration changes defocused planes
    model.set_phi(&[0.5]).unwrap();
    let after = model.psf().unwrap().to_vec();
    let diff: f64 = before
        .iter()
        .zip(&after)
        .map(|(a, b)| (a - b).abs())
        .sum();
    assert!(diff > 1e-8, "phase change left the PSF untouched");

    // recomputation is idempotent
    let again = model.psf().unwrap().to_vec();
    assert_eq!(after, again);
}

#[test]
fn basis_widens_with_the_coefficients() {
    let mut model = WideFieldModel::new(small_params()).unwrap();
    let initial = model.nzern();
    model.set_phi(&[0.0, 0.0, 0.0, 0.0, 0.0]).unwrap();
    assert!(model.nzern() >= initial.max(8), "nzern is {}", model.nzern());
    assert_eq!(model.basis().len(), model.nzern() * 16 * 16);
}

#[test]
fn defocus_vector_lengths_are_interpreted_by_size() {
    let mut model = WideFieldModel::new(small_params()).unwrap();
    let nu = 1.518 / 542e-9;
    model.set_defocus(&[nu]).unwrap();
    model.set_defocus(&[nu, nu * 1.1]).unwrap();
    model.set_defocus(&[nu, 1.0, -2.0]).unwrap();
    let d = model.defocus();
    assert!((d[1] - 1.0).abs() < 1e-12 && (d[2] + 2.0).abs() < 1e-12);

    assert!(matches!(
        model.set_defocus(&[nu, 1.0, 2.0, nu]).unwrap_err(),
        LumenError::InvalidState(_)
    ));
    assert!(matches!(
        model.set_defocus(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap_err(),
        LumenError::InvalidArgument(_)
    ));

    let mut with_depth = WideFieldModel::new(WideFieldParams {
        ns: 1.33,
        zdepth: 2e-6,
        ..small_params()
    })
    .unwrap();
    with_depth.set_defocus(&[nu, 0.0, 0.0, 1.33 / 542e-9]).unwrap();
    assert_eq!(with_depth.defocus().len(), 4);
}

#[test]
fn modulus_jacobian_matches_finite_differences() {
    let mut model = WideFieldModel::new(small_params()).unwrap();
    model.set_rho(&[1.0, 0.0]).unwrap();

    let n = 16 * 16 * 4;
    let q = Lcg::new(99).fill(n);
    let grad = model.apply_jacobian_rho(&q).unwrap();
    assert_eq!(grad.len(), 2);

    let eps = 1e-5;
    for k in 0..2 {
        let mut plus = vec![1.0, 0.0];
        plus[k] += eps;
        let mut minus = vec![1.0, 0.0];
        minus[k] -= eps;

        model.set_rho(&plus).unwrap();
        let fp = psf_inner(&mut model, &q);
        model.set_rho(&minus).unwrap();
        let fm = psf_inner(&mut model, &q);
        let fd = (fp - fm) / (2.0 * eps);

        assert!(
            (fd - grad[k]).abs() < 1e-6 * (1.0 + fd.abs()),
            "beta[{k}]: fd {fd} vs analytic {}",
            grad[k]
        );
        model.set_rho(&[1.0, 0.0]).unwrap();
    }
}

#[test]
fn phase_jacobian_matches_finite_differences() {
    let mut model = WideFieldModel::new(small_params()).unwrap();
    model.set_phi(&[0.3, -0.2]).unwrap();

    let n = 16 * 16 * 4;
    let q = Lcg::new(123).fill(n);
    let grad = model.apply_jacobian_phi(&q).unwrap();
    assert_eq!(grad.len(), 2);

    let eps = 1e-5;
    for k in 0..2 {
        let mut plus = vec![0.3, -0.2];
        plus[k] += eps;
        let mut minus = vec![0.3, -0.2];
        minus[k] -= eps;

        model.set_phi(&plus).unwrap();
        let fp = psf_inner(&mut model, &q);
        model.set_phi(&minus).unwrap();
        let fm = psf_inner(&mut model, &q);
        let fd = (fp - fm) / (2.0 * eps);

        assert!(
            (fd - grad[k]).abs() < 1e-6 * (1.0 + fd.abs()),
            "alpha[{k}]: fd {fd} vs analytic {}",
            grad[k]
        );
        model.set_phi(&[0.3, -0.2]).unwrap();
    }
}

#[test]
fn defocus_jacobian_matches_finite_differences() {
    let mut model = WideFieldModel::new(small_params()).unwrap();
    let nu = 1.518 / 542e-9;
    model.set_defocus(&[nu, 0.0, 0.0]).unwrap();
    model.set_phi(&[0.4]).unwrap();

    let n = 16 * 16 * 4;
    let q = Lcg::new(7).fill(n);
    let grad = model.apply_jacobian_defocus(&q).unwrap();
    assert_eq!(grad.len(), 3);

    // absolute steps, tiny against the wavenumber scale (~2.8e6)
    let eps = 1.0;
    let base = [nu, 0.0, 0.0];
    for k in 0..3 {
        let mut plus = base;
        plus[k] += eps;
        let mut minus = base;
        minus[k] -= eps;

        model.set_defocus(&plus).unwrap();
        let fp = psf_inner(&mut model, &q);
        model.set_defocus(&minus).unwrap();
        let fm = psf_inner(&mut model, &q);
        let fd = (fp - fm) / (2.0 * eps);

        let scale = fd.abs().max(grad[k].abs());
        assert!(
            (fd - grad[k]).abs() < 1e-4 * scale + 1e-12,
            "defocus[{k}]: fd {fd} vs analytic {}",
            grad[k]
        );
        model.set_defocus(&base).unwrap();
    }
}

#[test]
fn radial_model_fits_phase_with_symmetric_modes() {
    let mut model = WideFieldModel::with_radial_modes(small_params(), true).unwrap();
    let flat = model.psf().unwrap().to_vec();

    // one phase coefficient drives the defocus mode (piston alone is
    // excluded from the radial expansion)
    model.set_phi(&[0.4]).unwrap();
    assert_eq!(model.nzern(), 2);
    let defocused = model.psf().unwrap().to_vec();
    let diff: f64 = flat
        .iter()
        .zip(&defocused)
        .map(|(a, b)| (a - b).abs())
        .sum();
    assert!(diff > 1e-8, "radial phase mode left the PSF untouched");

    // every plane stays symmetric under point reflection
    let (nx, ny, nz) = (16usize, 16usize, 4usize);
    for z in 0..nz {
        let plane = &defocused[nx * ny * z..nx * ny * (z + 1)];
        for iy in 0..ny {
            for ix in 0..nx {
                let mirrored = plane[(nx - ix) % nx + nx * ((ny - iy) % ny)];
                let value = plane[ix + nx * iy];
                assert!(
                    (value - mirrored).abs() < 1e-10 * (1.0 + value.abs()),
                    "radial PSF asymmetric at z={z} ({ix}, {iy})"
                );
            }
        }
    }

    // the modulus is still the unit-norm piston
    let sum: f64 = defocused.iter().sum();
    assert!((sum - 1.0).abs() < 1e-8, "radial PSF sum is {sum}");
}

#[test]
fn radial_phase_jacobian_matches_finite_differences() {
    let mut model = WideFieldModel::with_radial_modes(small_params(), true).unwrap();
    model.set_phi(&[0.25]).unwrap();

    let n = 16 * 16 * 4;
    let q = Lcg::new(55).fill(n);
    let grad = model.apply_jacobian_phi(&q).unwrap();
    assert_eq!(grad.len(), 1);

    let eps = 1e-5;
    model.set_phi(&[0.25 + eps]).unwrap();
    let fp = psf_inner(&mut model, &q);
    model.set_phi(&[0.25 - eps]).unwrap();
    let fm = psf_inner(&mut model, &q);
    let fd = (fp - fm) / (2.0 * eps);
    assert!(
        (fd - grad[0]).abs() < 1e-6 * (1.0 + fd.abs()),
        "radial alpha: fd {fd} vs analytic {}",
        grad[0]
    );
}

#[test]
fn jacobian_operand_length_is_validated() {
    let mut model = WideFieldModel::new(small_params()).unwrap();
    let err = model.apply_jacobian_rho(&[0.0; 3]).unwrap_err();
    assert!(matches!(err, LumenError::InvalidArgument(_)));
}

#[test]
fn params_serialize_round_trip() {
    let params = scenario_params();
    let text = serde_json::to_string(&params).unwrap();
    let back: WideFieldParams = serde_json::from_str(&text).unwrap();
    assert_eq!(back.nx, params.nx);
    assert!((back.na - params.na).abs() < 1e-15);
    assert!((back.dz - params.dz).abs() < 1e-24);
}

#[test]
fn invalid_parameters_are_rejected() {
    let err = WideFieldModel::new(WideFieldParams {
        na: -1.0,
        ..small_params()
    })
    .unwrap_err();
    assert!(matches!(err, LumenError::InvalidArgument(_)));

    let err = WideFieldModel::new(WideFieldParams {
        nx: 0,
        ..small_params()
    })
    .unwrap_err();
    assert!(matches!(err, LumenError::InvalidArgument(_)));
}
