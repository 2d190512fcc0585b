use super::*;
use crate::foundation::rng::{RngStream, stream_rng};
use candle_core::Device;

fn image(h: usize, w: usize) -> Tensor {
    Tensor::full(0.5f32, (1, 3, h, w), &Device::Cpu).unwrap()
}

#[test]
fn produces_cutn_views_of_cut_size() {
    let cutter = RandomCropCutouts::new(16, 8, false).unwrap();
    let mut rng = stream_rng(0, RngStream::Cutouts);
    let out = cutter.cut(&image(32, 48), &mut rng).unwrap();
    assert_eq!(out.dims(), &[8, 3, 16, 16]);
    assert_eq!(cutter.count(), 8);
    assert_eq!(cutter.cut_size(), 16);
}

#[test]
fn augmented_crops_succeed_across_seeds() {
    let cutter = RandomCropCutouts::new(16, 4, false).unwrap();
    let x = Tensor::arange(0f32, 3.0 * 64.0 * 64.0, &Device::Cpu)
        .unwrap()
        .affine(1.0 / 12288.0, 0.0)
        .unwrap()
        .reshape((1, 3, 64, 64))
        .unwrap();
    for seed in 0..20 {
        let out = cutter
            .cut(&x, &mut stream_rng(seed, RngStream::Cutouts))
            .unwrap_or_else(|e| panic!("seed {seed}: {e}"));
        assert_eq!(out.dims(), &[4, 3, 16, 16]);
    }
}

#[test]
fn final_quarter_uses_full_frame() {
    let cutter = RandomCropCutouts::new(8, 8, true).unwrap();
    let full: Vec<bool> = (0..8).map(|ch| cutter.is_full_frame(ch)).collect();
    assert_eq!(full, vec![false, false, false, false, false, false, true, true]);

    let small = RandomCropCutouts::new(8, 3, true).unwrap();
    assert!((0..3).all(|ch| !small.is_full_frame(ch)));
}

#[test]
fn cut_size_larger_than_image_still_works() {
    let cutter = RandomCropCutouts::new(64, 4, true).unwrap();
    let mut rng = stream_rng(1, RngStream::Cutouts);
    let out = cutter.cut(&image(16, 16), &mut rng).unwrap();
    assert_eq!(out.dims(), &[4, 3, 64, 64]);
}

#[test]
fn same_seed_same_cutouts() {
    let cutter = RandomCropCutouts::new(12, 5, false).unwrap();
    let x = Tensor::arange(0f32, 3.0 * 24.0 * 24.0, &Device::Cpu)
        .unwrap()
        .affine(1.0 / 1728.0, 0.0)
        .unwrap()
        .reshape((1, 3, 24, 24))
        .unwrap();
    let a = cutter.cut(&x, &mut stream_rng(4, RngStream::Cutouts)).unwrap();
    let b = cutter.cut(&x, &mut stream_rng(4, RngStream::Cutouts)).unwrap();
    let a: Vec<f32> = a.flatten_all().unwrap().to_vec1().unwrap();
    let b: Vec<f32> = b.flatten_all().unwrap().to_vec1().unwrap();
    assert_eq!(a, b);
}

#[test]
fn rejects_empty_configuration() {
    assert!(RandomCropCutouts::new(0, 4, false).is_err());
    assert!(RandomCropCutouts::new(16, 0, false).is_err());
}
