use super::*;
use candle_core::Var;

fn checker_columns(h: usize, w: usize) -> Tensor {
    let data: Vec<f32> = (0..3 * h * w)
        .map(|i| if (i % w) % 2 == 0 { 0.0 } else { 1.0 })
        .collect();
    Tensor::from_vec(data, (1, 3, h, w), &Device::Cpu).unwrap()
}

#[test]
fn operator_rows_sum_to_one() {
    for (src, dst) in [(64usize, 16usize), (17, 5), (8, 8), (8, 20), (448, 224)] {
        for op in [
            resample_operator(src, dst, true),
            resample_operator(src, dst, false),
            resize_operator(src, dst),
        ] {
            for j in 0..dst {
                let s: f64 = op.row(j).iter().sum();
                assert!((s - 1.0).abs() < 1e-9, "{src}->{dst} row {j} sums to {s}");
            }
        }
    }
}

#[test]
fn same_size_bicubic_with_aligned_corners_is_identity() {
    let x = Tensor::arange(0f32, 48., &Device::Cpu)
        .unwrap()
        .reshape((1, 3, 4, 4))
        .unwrap();
    let y = resample(&x, (4, 4), true).unwrap();
    let diff = (x - y).unwrap().abs().unwrap().max_all().unwrap();
    assert!(diff.to_scalar::<f32>().unwrap() < 1e-4);
}

#[test]
fn output_has_target_shape() {
    let x = Tensor::zeros((2, 3, 40, 30), DType::F32, &Device::Cpu).unwrap();
    assert_eq!(resample(&x, (16, 16), true).unwrap().dims(), &[2, 3, 16, 16]);
    assert_eq!(resample(&x, (64, 12), false).unwrap().dims(), &[2, 3, 64, 12]);
    assert_eq!(resize(&x, (7, 9)).unwrap().dims(), &[2, 3, 7, 9]);
}

#[test]
fn downsampling_suppresses_aliasing() {
    let x = checker_columns(8, 64);
    let y = resample(&x, (8, 16), true).unwrap();
    let vals: Vec<f32> = y.flatten_all().unwrap().to_vec1().unwrap();
    for v in vals {
        assert!((v - 0.5).abs() < 0.15, "aliased value {v}");
    }
}

#[test]
fn resample_is_deterministic() {
    let x = checker_columns(12, 20);
    let a: Vec<f32> = resample(&x, (5, 7), true)
        .unwrap()
        .flatten_all()
        .unwrap()
        .to_vec1()
        .unwrap();
    let b: Vec<f32> = resample(&x, (5, 7), true)
        .unwrap()
        .flatten_all()
        .unwrap()
        .to_vec1()
        .unwrap();
    assert_eq!(a, b);
}

#[test]
fn gradients_flow_back_to_the_input() {
    let x = Var::from_tensor(&checker_columns(16, 16)).unwrap();
    let y = resize(x.as_tensor(), (8, 8)).unwrap();
    let grads = y.sum_all().unwrap().backward().unwrap();
    let g = grads.get(x.as_tensor()).unwrap();
    assert_eq!(g.dims(), &[1, 3, 16, 16]);
    // Rows of the operator sum to one, so the total gradient mass equals the output count.
    let total = g.sum_all().unwrap().to_scalar::<f32>().unwrap();
    assert!((total - 3.0 * 64.0).abs() < 1e-2);
}

#[test]
fn empty_targets_are_rejected() {
    let x = Tensor::zeros((1, 3, 4, 4), DType::F32, &Device::Cpu).unwrap();
    assert!(resample(&x, (0, 4), true).is_err());
}
