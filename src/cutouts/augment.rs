//! Random view augmentations for cutouts.
//!
//! Every transform draws its parameters from the caller's generator in a fixed order, so a seeded
//! run augments identically every time.

use candle_core::Tensor;
use rand::Rng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

use crate::foundation::error::DiscoResult;
use crate::image::ops::{add_noise, grayscale, hflip};
use crate::image::warp::{AffineParams, Corner, Interpolation, affine, perspective};

const NOISE_STD: f64 = 0.01;

/// Flip left to right with probability `p`.
pub(crate) fn random_hflip(x: &Tensor, p: f64, rng: &mut ChaCha8Rng) -> DiscoResult<Tensor> {
    if rng.r#gen::<f64>() < p {
        hflip(x)
    } else {
        Ok(x.clone())
    }
}

/// Replace with three-channel luma with probability `p`.
pub(crate) fn random_grayscale(x: &Tensor, p: f64, rng: &mut ChaCha8Rng) -> DiscoResult<Tensor> {
    if rng.r#gen::<f64>() < p {
        grayscale(x)
    } else {
        Ok(x.clone())
    }
}

/// Rotation in `[-degrees, degrees]` and a whole-pixel translation of at most `translate` times
/// each side.
pub(crate) fn random_affine(
    x: &Tensor,
    degrees: f64,
    translate: f64,
    interp: Interpolation,
    rng: &mut ChaCha8Rng,
) -> DiscoResult<Tensor> {
    let (_, _, h, w) = x.dims4()?;
    let angle_deg = rng.gen_range(-degrees..=degrees);
    let max_dx = translate * w as f64;
    let max_dy = translate * h as f64;
    let tx = rng.gen_range(-max_dx..=max_dx).round();
    let ty = rng.gen_range(-max_dy..=max_dy).round();
    affine(x, AffineParams { angle_deg, tx, ty }, interp)
}

/// With probability `p`, pull each corner inwards by up to `distortion` of the half side.
pub(crate) fn random_perspective(
    x: &Tensor,
    distortion: f64,
    p: f64,
    rng: &mut ChaCha8Rng,
) -> DiscoResult<Tensor> {
    if rng.r#gen::<f64>() >= p {
        return Ok(x.clone());
    }
    let (_, _, h, w) = x.dims4()?;
    let dx = (distortion * (w / 2) as f64) as i64;
    let dy = (distortion * (h / 2) as f64) as i64;
    let mut near = |limit: i64| rng.gen_range(0..=limit) as f64;
    let (wf, hf) = ((w - 1) as f64, (h - 1) as f64);
    let tl = [near(dx), near(dy)];
    let tr = [wf - near(dx), near(dy)];
    let br = [wf - near(dx), hf - near(dy)];
    let bl = [near(dx), hf - near(dy)];

    let start: [Corner; 4] = [[0.0, 0.0], [wf, 0.0], [wf, hf], [0.0, hf]];
    let end: [Corner; 4] = [tl, tr, br, bl];
    perspective(x, &start, &end, Interpolation::Bilinear)
}

/// Strength of each color-jitter component.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct ColorJitter {
    pub(crate) brightness: f64,
    pub(crate) contrast: f64,
    pub(crate) saturation: f64,
    pub(crate) hue: f64,
}

fn blend(a: &Tensor, b: &Tensor, factor: f64) -> DiscoResult<Tensor> {
    let mixed = (a.affine(factor, 0.0)? + b.affine(1.0 - factor, 0.0)?)?;
    Ok(mixed.clamp(0f32, 1f32)?)
}

/// Rotate chroma in YIQ space by `turns` of a full circle.
fn rotate_hue(x: &Tensor, turns: f64) -> DiscoResult<Tensor> {
    const TO_YIQ: [[f64; 3]; 3] = [
        [0.299, 0.587, 0.114],
        [0.596, -0.274, -0.322],
        [0.211, -0.523, 0.312],
    ];
    const FROM_YIQ: [[f64; 3]; 3] = [
        [1.0, 0.956, 0.621],
        [1.0, -0.272, -0.647],
        [1.0, -1.106, 1.703],
    ];
    let (sin, cos) = (turns * std::f64::consts::TAU).sin_cos();
    let rot = [[1.0, 0.0, 0.0], [0.0, cos, -sin], [0.0, sin, cos]];

    let mul = |a: &[[f64; 3]; 3], b: &[[f64; 3]; 3]| {
        let mut out = [[0f64; 3]; 3];
        for (i, row) in out.iter_mut().enumerate() {
            for (j, v) in row.iter_mut().enumerate() {
                *v = (0..3).map(|k| a[i][k] * b[k][j]).sum();
            }
        }
        out
    };
    let m = mul(&FROM_YIQ, &mul(&rot, &TO_YIQ));
    let data: Vec<f32> = m.iter().flatten().map(|&v| v as f32).collect();

    let (n, c, h, w) = x.dims4()?;
    let m = Tensor::from_vec(data, (1, 3, 3), x.device())?.to_dtype(x.dtype())?;
    let out = m
        .broadcast_as((n, 3, 3))?
        .contiguous()?
        .matmul(&x.reshape((n, c, h * w))?)?;
    Ok(out.reshape((n, c, h, w))?.clamp(0f32, 1f32)?)
}

/// Brightness, contrast, saturation and hue jitter applied in a random order.
pub(crate) fn color_jitter(
    x: &Tensor,
    jitter: ColorJitter,
    rng: &mut ChaCha8Rng,
) -> DiscoResult<Tensor> {
    let mut order = [0usize, 1, 2, 3];
    order.shuffle(rng);
    let brightness = rng.gen_range(1.0 - jitter.brightness..=1.0 + jitter.brightness);
    let contrast = rng.gen_range(1.0 - jitter.contrast..=1.0 + jitter.contrast);
    let saturation = rng.gen_range(1.0 - jitter.saturation..=1.0 + jitter.saturation);
    let hue = rng.gen_range(-jitter.hue..=jitter.hue);

    let mut out = x.clone();
    for op in order {
        out = match op {
            0 => out.affine(brightness, 0.0)?.clamp(0f32, 1f32)?,
            1 => {
                let mean = grayscale(&out)?.mean_keepdim(3)?.mean_keepdim(2)?;
                blend(&out, &mean.broadcast_as(out.dims())?, contrast)?
            }
            2 => blend(&out, &grayscale(&out)?, saturation)?,
            _ => rotate_hue(&out, hue)?,
        };
    }
    Ok(out)
}

/// Augmentations for random-crop cutouts.
pub(crate) fn crop_pipeline(x: &Tensor, rng: &mut ChaCha8Rng) -> DiscoResult<Tensor> {
    let x = random_hflip(x, 0.5, rng)?;
    let x = add_noise(&x, NOISE_STD, rng)?;
    let x = random_affine(&x, 15.0, 0.1, Interpolation::Nearest, rng)?;
    let x = add_noise(&x, NOISE_STD, rng)?;
    let x = random_perspective(&x, 0.4, 0.7, rng)?;
    let x = add_noise(&x, NOISE_STD, rng)?;
    let x = random_grayscale(&x, 0.15, rng)?;
    add_noise(&x, NOISE_STD, rng)
}

/// Augmentations for overview and inner-crop views.
pub(crate) fn view_pipeline(x: &Tensor, rng: &mut ChaCha8Rng) -> DiscoResult<Tensor> {
    let x = random_hflip(x, 0.5, rng)?;
    let x = add_noise(&x, NOISE_STD, rng)?;
    let x = random_affine(&x, 10.0, 0.05, Interpolation::Bilinear, rng)?;
    let x = add_noise(&x, NOISE_STD, rng)?;
    let x = random_grayscale(&x, 0.1, rng)?;
    let x = add_noise(&x, NOISE_STD, rng)?;
    color_jitter(
        &x,
        ColorJitter {
            brightness: 0.1,
            contrast: 0.1,
            saturation: 0.1,
            hue: 0.1,
        },
        rng,
    )
}

#[cfg(test)]
#[path = "../../tests/unit/cutouts/augment.rs"]
mod tests;
