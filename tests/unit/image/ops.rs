use super::*;
use crate::foundation::rng::{RngStream, stream_rng};

fn ramp_image(h: usize, w: usize) -> Tensor {
    Tensor::arange(0f32, (3 * h * w) as f32, &Device::Cpu)
        .unwrap()
        .reshape((1, 3, h, w))
        .unwrap()
}

#[test]
fn hflip_reverses_columns_and_is_an_involution() {
    let x = ramp_image(2, 3);
    let y = hflip(&x).unwrap();
    let row: Vec<f32> = y
        .narrow(1, 0, 1)
        .unwrap()
        .narrow(2, 0, 1)
        .unwrap()
        .flatten_all()
        .unwrap()
        .to_vec1()
        .unwrap();
    assert_eq!(row, vec![2.0, 1.0, 0.0]);
    let back = hflip(&y).unwrap();
    let a: Vec<f32> = back.flatten_all().unwrap().to_vec1().unwrap();
    let b: Vec<f32> = x.flatten_all().unwrap().to_vec1().unwrap();
    assert_eq!(a, b);
}

#[test]
fn grayscale_replicates_luma() {
    let x = Tensor::from_vec(vec![1f32, 0.0, 0.0], (1, 3, 1, 1), &Device::Cpu).unwrap();
    let g: Vec<f32> = grayscale(&x).unwrap().flatten_all().unwrap().to_vec1().unwrap();
    for v in g {
        assert!((v - LUMA[0]).abs() < 1e-6);
    }
}

#[test]
fn grayscale_rejects_non_rgb() {
    let x = Tensor::zeros((1, 1, 2, 2), DType::F32, &Device::Cpu).unwrap();
    assert!(grayscale(&x).is_err());
}

#[test]
fn padding_shapes() {
    let x = ramp_image(4, 8);
    assert_eq!(pad_uniform(&x, 2).unwrap().dims(), &[1, 3, 8, 12]);
    assert_eq!(pad_to_square(&x).unwrap().dims(), &[1, 3, 8, 8]);
    let tall = ramp_image(9, 4);
    assert_eq!(pad_to_square(&tall).unwrap().dims(), &[1, 3, 9, 8]);
}

#[test]
fn crop_square_takes_the_requested_window() {
    let x = ramp_image(4, 4);
    let c = crop_square(&x, 1, 2, 2).unwrap();
    assert_eq!(c.dims(), &[1, 3, 2, 2]);
    let first: Vec<f32> = c.flatten_all().unwrap().to_vec1().unwrap();
    assert_eq!(&first[..4], &[6.0, 7.0, 10.0, 11.0]);
}

#[test]
fn cropped_window_can_be_flipped() {
    let x = ramp_image(4, 4);
    let c = crop_square(&x, 1, 1, 2).unwrap();
    assert!(c.is_contiguous());
    let flipped: Vec<f32> = hflip(&c).unwrap().flatten_all().unwrap().to_vec1().unwrap();
    assert_eq!(&flipped[..4], &[6.0, 5.0, 10.0, 9.0]);

    let view = x.narrow(3, 1, 2).unwrap();
    assert_eq!(hflip(&view).unwrap().dims(), &[1, 3, 4, 2]);
}

#[test]
fn noise_is_seeded() {
    let x = Tensor::zeros((1, 3, 4, 4), DType::F32, &Device::Cpu).unwrap();
    let mut a = stream_rng(3, RngStream::Cutouts);
    let mut b = stream_rng(3, RngStream::Cutouts);
    let na: Vec<f32> = add_noise(&x, 0.01, &mut a).unwrap().flatten_all().unwrap().to_vec1().unwrap();
    let nb: Vec<f32> = add_noise(&x, 0.01, &mut b).unwrap().flatten_all().unwrap().to_vec1().unwrap();
    assert_eq!(na, nb);
    assert!(na.iter().all(|v| v.abs() < 0.1));
    assert!(na.iter().any(|v| *v != 0.0));
}

#[test]
fn normalization_matches_formula() {
    let x = Tensor::ones((1, 3, 1, 1), DType::F32, &Device::Cpu).unwrap();
    let y: Vec<f32> = normalize_channels(&x, [0.5, 0.0, 1.0], [0.5, 2.0, 1.0])
        .unwrap()
        .flatten_all()
        .unwrap()
        .to_vec1()
        .unwrap();
    assert_eq!(y, vec![1.0, 0.5, 0.0]);
}

#[test]
fn rgb8_conversion_maps_unit_range() {
    let img = Tensor::from_vec(vec![-1f32, 1.0, 0.0], (3, 1, 1), &Device::Cpu).unwrap();
    let rgb = to_rgb8(&img).unwrap();
    assert_eq!(rgb.get_pixel(0, 0).0, [0, 255, 128]);

    let back = from_rgb8(&rgb, &Device::Cpu).unwrap();
    assert_eq!(back.dims(), &[1, 3, 1, 1]);
    let v: Vec<f32> = back.flatten_all().unwrap().to_vec1().unwrap();
    assert_eq!(v[1], 1.0);
}
