use super::*;
use crate::foundation::rng::{RngStream, stream_rng};
use candle_core::Device;

fn params(overview: usize, innercut: usize, ic_gray_p: f64) -> CutoutParams {
    CutoutParams {
        overview,
        innercut,
        ic_gray_p,
    }
}

fn color_image(h: usize, w: usize) -> Tensor {
    let plane = h * w;
    let mut data = vec![0.9f32; plane];
    data.extend(vec![0.2f32; plane]);
    data.extend(vec![0.1f32; plane]);
    Tensor::from_vec(data, (1, 3, h, w), &Device::Cpu).unwrap()
}

fn is_gray(view: &Tensor) -> bool {
    let v: Vec<f32> = view.flatten_all().unwrap().to_vec1().unwrap();
    let plane = v.len() / 3;
    (0..plane).all(|i| (v[i] - v[plane + i]).abs() < 1e-5 && (v[i] - v[2 * plane + i]).abs() < 1e-5)
}

#[test]
fn count_is_overview_plus_innercut() {
    let mut rng = stream_rng(0, RngStream::Cutouts);
    for (o, ic) in [(4, 0), (0, 3), (6, 2), (2, 5)] {
        let cutter = OverviewInnerCutouts::new(16, params(o, ic, 0.2), 1.0, false).unwrap();
        let out = cutter.cut(&color_image(24, 40), &mut rng).unwrap();
        assert_eq!(out.dims(), &[o + ic, 3, 16, 16]);
        assert_eq!(cutter.count(), o + ic);
    }
}

#[test]
fn overview_variants_follow_fixed_order() {
    let cutter = OverviewInnerCutouts::new(8, params(4, 0, 0.0), 1.0, true).unwrap();
    let mut rng = stream_rng(0, RngStream::Cutouts);
    let out = cutter.cut(&color_image(16, 16), &mut rng).unwrap();
    let view = |i| out.narrow(0, i, 1).unwrap();
    assert!(!is_gray(&view(0)));
    assert!(is_gray(&view(1)));
    assert!(!is_gray(&view(2)));
    assert!(is_gray(&view(3)));
}

#[test]
fn leading_inner_crops_are_gray() {
    let cutter = OverviewInnerCutouts::new(8, params(0, 5, 0.4), 1.0, true).unwrap();
    assert_eq!(cutter.gray_count(), 2);
    let mut rng = stream_rng(2, RngStream::Cutouts);
    let out = cutter.cut(&color_image(20, 20), &mut rng).unwrap();
    let gray: Vec<bool> = (0..5).map(|i| is_gray(&out.narrow(0, i, 1).unwrap())).collect();
    assert_eq!(gray, vec![true, true, false, false, false]);
}

#[test]
fn skip_augs_returns_unaugmented_views() {
    let cutter = OverviewInnerCutouts::new(16, params(1, 0, 0.0), 1.0, true).unwrap();
    let x = color_image(16, 16);
    let mut rng = stream_rng(0, RngStream::Cutouts);
    let out = cutter.cut(&x, &mut rng).unwrap();
    let a: Vec<f32> = out.flatten_all().unwrap().to_vec1().unwrap();
    let b: Vec<f32> = x.flatten_all().unwrap().to_vec1().unwrap();
    for (p, q) in a.iter().zip(&b) {
        assert!((p - q).abs() < 1e-5);
    }
}

#[test]
fn rejects_zero_views() {
    assert!(OverviewInnerCutouts::new(16, params(0, 0, 0.0), 1.0, false).is_err());
}
