mod common;

use common::Lcg;
use lumen_core::error::LumenError;
use lumen_core::fft::FftEngine;

#[test]
fn impulse_transforms_to_flat_spectrum() {
    let engine = FftEngine::<f64>::new(&[8]).unwrap();
    let mut buf = vec![0.0f64; engine.interleaved_len()];
    buf[0] = 1.0;
    engine.forward(&mut buf).unwrap();
    for j in 0..8 {
        assert!((buf[2 * j] - 1.0).abs() < 1e-12, "re[{j}] = {}", buf[2 * j]);
        assert!(buf[2 * j + 1].abs() < 1e-12, "im[{j}] = {}", buf[2 * j + 1]);
    }
}

#[test]
fn forward_backward_scales_by_element_count() {
    let mut rng = Lcg::new(7);
    let engine = FftEngine::<f64>::new(&[4, 6]).unwrap();
    let original = rng.fill(engine.interleaved_len());
    let mut buf = original.clone();
    engine.forward(&mut buf).unwrap();
    engine.backward(&mut buf).unwrap();
    let n = 24.0;
    for (got, want) in buf.iter().zip(&original) {
        assert!(
            (got / n - want).abs() < 1e-10,
            "round trip mismatch: {got} vs {want}"
        );
    }
}

#[test]
fn forward_is_linear() {
    let mut rng = Lcg::new(13);
    let engine = FftEngine::<f64>::new(&[5, 3, 2]).unwrap();
    let x = rng.fill(engine.interleaved_len());
    let y = rng.fill(engine.interleaved_len());

    let mut fx = x.clone();
    engine.forward(&mut fx).unwrap();
    let mut fy = y.clone();
    engine.forward(&mut fy).unwrap();

    let mut combined: Vec<f64> = x
        .iter()
        .zip(&y)
        .map(|(&a, &b)| 2.0 * a - 0.5 * b)
        .collect();
    engine.forward(&mut combined).unwrap();

    for j in 0..combined.len() {
        let want = 2.0 * fx[j] - 0.5 * fy[j];
        assert!(
            (combined[j] - want).abs() < 1e-9,
            "linearity broken at {j}: {} vs {want}",
            combined[j]
        );
    }
}

#[test]
fn single_precision_transform_round_trips() {
    let engine = FftEngine::<f32>::new(&[16]).unwrap();
    let original: Vec<f32> = (0..engine.interleaved_len())
        .map(|i| (i as f32 * 0.37).sin())
        .collect();
    let mut buf = original.clone();
    engine.forward(&mut buf).unwrap();
    engine.backward(&mut buf).unwrap();
    for (got, want) in buf.iter().zip(&original) {
        assert!(
            (got / 16.0 - want).abs() < 1e-4,
            "f32 round trip mismatch: {got} vs {want}"
        );
    }
}

#[test]
fn buffer_length_is_validated_before_the_transform() {
    let engine = FftEngine::<f64>::new(&[4, 4]).unwrap();
    let mut short = vec![0.0f64; 16];
    assert!(matches!(
        engine.forward(&mut short).unwrap_err(),
        LumenError::InvalidArgument(_)
    ));
}

#[test]
fn rank_must_be_between_one_and_three() {
    assert!(matches!(
        FftEngine::<f64>::new(&[]).unwrap_err(),
        LumenError::Unsupported(_)
    ));
    assert!(matches!(
        FftEngine::<f64>::new(&[2, 2, 2, 2]).unwrap_err(),
        LumenError::Unsupported(_)
    ));
}
