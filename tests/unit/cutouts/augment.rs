use super::*;
use crate::foundation::rng::{RngStream, stream_rng};
use candle_core::{Device, Var};

fn flat_image(value: f32, h: usize, w: usize) -> Tensor {
    Tensor::full(value, (1, 3, h, w), &Device::Cpu).unwrap()
}

fn values(t: &Tensor) -> Vec<f32> {
    t.flatten_all().unwrap().to_vec1().unwrap()
}

#[test]
fn probability_zero_and_one_are_respected() {
    let x = Tensor::arange(0f32, 12f32, &Device::Cpu)
        .unwrap()
        .reshape((1, 3, 2, 2))
        .unwrap();
    let mut rng = stream_rng(3, RngStream::Cutouts);
    assert_eq!(values(&random_hflip(&x, 0.0, &mut rng).unwrap()), values(&x));
    assert_eq!(
        values(&random_hflip(&x, 1.0, &mut rng).unwrap()),
        values(&hflip(&x).unwrap())
    );
    assert_eq!(values(&random_grayscale(&x, 0.0, &mut rng).unwrap()), values(&x));
    assert_eq!(values(&random_perspective(&x, 0.4, 0.0, &mut rng).unwrap()), values(&x));
}

#[test]
fn zero_rotation_and_translation_is_identity() {
    let x = flat_image(0.25, 8, 8);
    let mut rng = stream_rng(1, RngStream::Cutouts);
    let y = random_affine(&x, 0.0, 0.0, Interpolation::Bilinear, &mut rng).unwrap();
    assert_eq!(values(&y), values(&x));
}

#[test]
fn perspective_keeps_shape() {
    let x = flat_image(0.5, 16, 12);
    let mut rng = stream_rng(5, RngStream::Cutouts);
    let y = random_perspective(&x, 0.4, 1.0, &mut rng).unwrap();
    assert_eq!(y.dims(), &[1, 3, 16, 12]);
}

#[test]
fn hue_rotation_leaves_gray_pixels_nearly_gray() {
    let x = flat_image(0.5, 4, 4);
    let y = rotate_hue(&x, 0.1).unwrap();
    for v in values(&y) {
        assert!((v - 0.5).abs() < 0.01, "{v}");
    }
}

#[test]
fn color_jitter_stays_in_unit_range() {
    let x = Tensor::arange(0f32, 48f32, &Device::Cpu)
        .unwrap()
        .affine(1.0 / 47.0, 0.0)
        .unwrap()
        .reshape((1, 3, 4, 4))
        .unwrap();
    let mut rng = stream_rng(11, RngStream::Cutouts);
    let jitter = ColorJitter {
        brightness: 0.5,
        contrast: 0.5,
        saturation: 0.5,
        hue: 0.5,
    };
    let y = color_jitter(&x, jitter, &mut rng).unwrap();
    for v in values(&y) {
        assert!((0.0..=1.0).contains(&v));
    }
}

#[test]
fn pipelines_are_seed_deterministic() {
    let x = flat_image(0.3, 16, 16);
    let a = view_pipeline(&x, &mut stream_rng(9, RngStream::Cutouts)).unwrap();
    let b = view_pipeline(&x, &mut stream_rng(9, RngStream::Cutouts)).unwrap();
    assert_eq!(values(&a), values(&b));

    let c = crop_pipeline(&x, &mut stream_rng(9, RngStream::Cutouts)).unwrap();
    let d = crop_pipeline(&x, &mut stream_rng(9, RngStream::Cutouts)).unwrap();
    assert_eq!(values(&c), values(&d));
    assert_eq!(c.dims(), x.dims());
}

#[test]
fn view_pipeline_passes_gradients() {
    let x = Var::from_tensor(&flat_image(0.4, 8, 8)).unwrap();
    let mut rng = stream_rng(2, RngStream::Cutouts);
    let y = view_pipeline(x.as_tensor(), &mut rng).unwrap();
    let grads = y.sum_all().unwrap().backward().unwrap();
    assert!(grads.get(x.as_tensor()).is_some());
}
