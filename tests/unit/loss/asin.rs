use super::*;
use candle_core::{DType, Var};

#[test]
fn forward_matches_scalar_asin() {
    let x = Tensor::new(&[-1f32, -0.5, 0.0, 0.5, 1.0], &Device::Cpu).unwrap();
    let y: Vec<f32> = asin(&x).unwrap().to_vec1().unwrap();
    for (got, v) in y.iter().zip([-1f32, -0.5, 0.0, 0.5, 1.0]) {
        assert!((got - v.asin()).abs() < 1e-6);
    }
}

#[test]
fn strided_input_is_accepted() {
    let x = Tensor::new(&[[0f64, 0.5], [0.25, -0.5]], &Device::Cpu).unwrap();
    let y: Vec<Vec<f64>> = asin(&x.t().unwrap()).unwrap().to_vec2().unwrap();
    assert!((y[1][0] - 0.5f64.asin()).abs() < 1e-12);
    assert!((y[0][1] - 0.25f64.asin()).abs() < 1e-12);
}

#[test]
fn backward_is_inverse_sqrt() {
    let x = Var::new(&[0f32, 0.6], &Device::Cpu).unwrap();
    let y = asin(x.as_tensor()).unwrap().sum_all().unwrap();
    let grads = y.backward().unwrap();
    let g: Vec<f32> = grads.get(x.as_tensor()).unwrap().to_vec1().unwrap();
    assert!((g[0] - 1.0).abs() < 1e-6);
    assert!((g[1] - 1.25).abs() < 1e-5);
}

#[test]
fn integer_input_is_rejected() {
    let x = Tensor::new(&[1u32, 0], &Device::Cpu).unwrap();
    assert_eq!(x.dtype(), DType::U32);
    assert!(asin(&x).is_err());
}
