use super::*;
use candle_core::Var;

#[test]
fn denoiser_scales_with_timestep() {
    let d = ReferenceDenoiser::new(0.5);
    let x = Tensor::full(2f32, (1, 3, 2, 2), &Device::Cpu).unwrap();
    let eps: Vec<f32> = d.forward(&x, 500.0, None).unwrap().flatten_all().unwrap().to_vec1().unwrap();
    assert!(eps.iter().all(|&v| (v - 0.5).abs() < 1e-6));
    assert_eq!(d.num_classes(), None);
    assert_eq!(d.with_classes(7).num_classes(), Some(7));
}

#[test]
fn embeddings_have_expected_shapes_and_are_deterministic() {
    let m = PatchEmbedder::new("ViTB32", 16, 4, 8, &Device::Cpu).unwrap();
    let t1 = m.encode_text("a lighthouse").unwrap();
    let t2 = m.encode_text("a lighthouse").unwrap();
    let t3 = m.encode_text("a forest").unwrap();
    assert_eq!(t1.dims(), &[1, 8]);
    let v = |t: &Tensor| -> Vec<f32> { t.flatten_all().unwrap().to_vec1().unwrap() };
    assert_eq!(v(&t1), v(&t2));
    assert_ne!(v(&t1), v(&t3));

    let imgs = Tensor::full(0.5f32, (5, 3, 16, 16), &Device::Cpu).unwrap();
    assert_eq!(m.encode_image(&imgs).unwrap().dims(), &[5, 8]);
    let wrong = Tensor::full(0.5f32, (1, 3, 8, 8), &Device::Cpu).unwrap();
    assert!(m.encode_image(&wrong).is_err());
}

#[test]
fn image_encoding_is_differentiable() {
    let m = PatchEmbedder::new("RN50", 8, 2, 4, &Device::Cpu).unwrap();
    let x = Var::from_tensor(&Tensor::full(0.2f32, (2, 3, 8, 8), &Device::Cpu).unwrap()).unwrap();
    let e = m.encode_image(x.as_tensor()).unwrap();
    let grads = e.sum_all().unwrap().backward().unwrap();
    assert!(grads.get(x.as_tensor()).is_some());
}

#[test]
fn resolution_must_divide_into_grid() {
    assert!(PatchEmbedder::new("bad", 10, 3, 4, &Device::Cpu).is_err());
}

#[test]
fn pixel_distance_is_per_image() {
    let a = Tensor::zeros((2, 3, 2, 2), DType::F32, &Device::Cpu).unwrap();
    let b = Tensor::ones((2, 3, 2, 2), DType::F32, &Device::Cpu).unwrap();
    let d: Vec<f32> = PixelDistance.distance(&a, &b).unwrap().to_vec1().unwrap();
    assert_eq!(d, vec![1.0, 1.0]);
}
