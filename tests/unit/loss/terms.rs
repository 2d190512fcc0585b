use super::*;
use candle_core::{Device, Var};

fn t2(rows: &[&[f32]]) -> Tensor {
    let d = rows[0].len();
    let data: Vec<f32> = rows.iter().flat_map(|r| r.iter().copied()).collect();
    Tensor::from_vec(data, (rows.len(), d), &Device::Cpu).unwrap()
}

fn matrix(t: &Tensor) -> Vec<Vec<f32>> {
    t.to_vec2().unwrap()
}

#[test]
fn identical_embeddings_have_zero_distance() {
    let a = t2(&[&[1.0, 2.0, 3.0]]);
    let b = t2(&[&[2.0, 4.0, 6.0]]);
    let d = matrix(&spherical_dist_loss(&a, &b).unwrap());
    assert!(d[0][0].abs() < 1e-6, "{}", d[0][0]);
}

#[test]
fn distance_grows_with_angle_and_is_bounded() {
    let target = t2(&[&[1.0, 0.0]]);
    let mut prev = -1.0f32;
    for deg in [10.0f32, 45.0, 90.0, 135.0, 180.0] {
        let r = deg.to_radians();
        let cand = t2(&[&[r.cos(), r.sin()]]);
        let d = matrix(&spherical_dist_loss(&cand, &target).unwrap())[0][0];
        assert!(d > prev);
        prev = d;
    }
    let bound = std::f32::consts::PI.powi(2) / 2.0;
    assert!((prev - bound).abs() < 1e-3, "{prev}");
}

#[test]
fn orthogonal_distance_matches_closed_form() {
    // chord sqrt(2), half-chord sqrt(2)/2, asin = pi/4.
    let d = matrix(&spherical_dist_loss(&t2(&[&[0.0, 3.0]]), &t2(&[&[5.0, 0.0]])).unwrap());
    let expected = 2.0 * (std::f32::consts::FRAC_PI_4).powi(2);
    assert!((d[0][0] - expected).abs() < 1e-5);
}

#[test]
fn pairwise_shape_and_width_check() {
    let a = t2(&[&[1.0, 0.0], &[0.0, 1.0], &[1.0, 1.0]]);
    let b = t2(&[&[1.0, 0.0], &[0.0, 1.0]]);
    assert_eq!(spherical_dist_loss(&a, &b).unwrap().dims(), &[3, 2]);
    assert!(spherical_dist_loss(&a, &t2(&[&[1.0, 0.0, 0.0]])).is_err());
}

#[test]
fn semantic_gradient_is_finite_even_at_zero_distance() {
    let a = Var::from_tensor(&t2(&[&[1.0, 0.5]])).unwrap();
    let b = t2(&[&[1.0, 0.5]]);
    let loss = spherical_dist_loss(a.as_tensor(), &b).unwrap().sum_all().unwrap();
    let grads = loss.backward().unwrap();
    let g: Vec<f32> = grads
        .get(a.as_tensor())
        .unwrap()
        .flatten_all()
        .unwrap()
        .to_vec1()
        .unwrap();
    assert!(g.iter().all(|v| v.is_finite()));
}

#[test]
fn tv_is_zero_for_flat_images_and_positive_otherwise() {
    let flat = Tensor::full(0.3f32, (2, 3, 4, 4), &Device::Cpu).unwrap();
    let tv: Vec<f32> = tv_loss(&flat).unwrap().to_vec1().unwrap();
    assert_eq!(tv, vec![0.0, 0.0]);

    // Single step edge: one column differs by 1.
    let mut data = vec![0f32; 16];
    for row in 0..4 {
        data[row * 4 + 3] = 1.0;
    }
    let edge = Tensor::from_vec(data, (1, 1, 4, 4), &Device::Cpu).unwrap();
    let tv: Vec<f32> = tv_loss(&edge).unwrap().to_vec1().unwrap();
    assert!((tv[0] - 4.0 / 16.0).abs() < 1e-6);
}

#[test]
fn range_and_saturation_ignore_in_range_values() {
    let x = Tensor::from_vec(vec![-1.0f32, 0.0, 0.5, 1.0], (1, 1, 2, 2), &Device::Cpu).unwrap();
    assert_eq!(range_loss(&x).unwrap().to_vec1::<f32>().unwrap(), vec![0.0]);
    assert_eq!(sat_loss(&x).unwrap().to_vec1::<f32>().unwrap(), vec![0.0]);

    let y = Tensor::from_vec(vec![-3.0f32, 0.0, 2.0, 1.0], (1, 1, 2, 2), &Device::Cpu).unwrap();
    assert_eq!(range_loss(&y).unwrap().to_vec1::<f32>().unwrap(), vec![5.0 / 4.0]);
    assert_eq!(sat_loss(&y).unwrap().to_vec1::<f32>().unwrap(), vec![3.0 / 4.0]);
}

#[test]
fn aux_loss_combines_weighted_terms() {
    let x_in = Tensor::from_vec(vec![2.0f32, 0.0, 0.0, 0.0], (1, 1, 2, 2), &Device::Cpu).unwrap();
    let pred = Tensor::from_vec(vec![0.0f32, 0.0, 0.0, -2.0], (1, 1, 2, 2), &Device::Cpu).unwrap();

    let none = LossWeights {
        clip_guidance_scale: 1.0,
        tv_scale: 0.0,
        range_scale: 0.0,
        sat_scale: 0.0,
    };
    assert!(aux_loss(&x_in, &pred, &none).unwrap().is_none());

    let w = LossWeights {
        clip_guidance_scale: 1.0,
        tv_scale: 0.0,
        range_scale: 2.0,
        sat_scale: 4.0,
    };
    let total = scalar(&aux_loss(&x_in, &pred, &w).unwrap().unwrap()).unwrap();
    // range(pred) = 1/4, sat(x_in) = 1/4.
    assert!((total - (2.0 * 0.25 + 4.0 * 0.25)).abs() < 1e-6);
}
