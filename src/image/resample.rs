//! Band-limited and antialiased resizing.
//!
//! Both resizers are linear and separable, so each axis is reduced to a dense `(dst, src)`
//! operator matrix built on the CPU. Applying the operators is two matmuls, which keeps the
//! whole resize differentiable with respect to the input tensor.

use candle_core::{DType, Device, Tensor};

use crate::foundation::error::{DiscoError, DiscoResult};

const LANCZOS_LOBES: f64 = 2.0;
const BICUBIC_A: f64 = -0.75;

/// Dense 1-D resampling operator mapping `src` samples to `dst` samples.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct AxisOperator {
    dst: usize,
    src: usize,
    weights: Vec<f64>,
}

impl AxisOperator {
    fn zeros(dst: usize, src: usize) -> Self {
        Self {
            dst,
            src,
            weights: vec![0.0; dst * src],
        }
    }

    fn add(&mut self, row: usize, col: usize, w: f64) {
        self.weights[row * self.src + col] += w;
    }

    #[cfg(test)]
    pub(crate) fn row(&self, row: usize) -> &[f64] {
        &self.weights[row * self.src..(row + 1) * self.src]
    }

    /// `self ∘ inner`: apply `inner` first.
    fn then_after(&self, inner: &AxisOperator) -> Self {
        debug_assert_eq!(self.src, inner.dst);
        let mut out = Self::zeros(self.dst, inner.src);
        for i in 0..self.dst {
            for k in 0..self.src {
                let a = self.weights[i * self.src + k];
                if a == 0.0 {
                    continue;
                }
                for j in 0..inner.src {
                    out.weights[i * inner.src + j] += a * inner.weights[k * inner.src + j];
                }
            }
        }
        out
    }

    fn to_tensor(&self, dtype: DType, device: &Device) -> DiscoResult<Tensor> {
        let data: Vec<f32> = self.weights.iter().map(|&w| w as f32).collect();
        Ok(Tensor::from_vec(data, (self.dst, self.src), device)?.to_dtype(dtype)?)
    }
}

fn sinc(x: f64) -> f64 {
    if x == 0.0 {
        1.0
    } else {
        let px = std::f64::consts::PI * x;
        px.sin() / px
    }
}

fn lanczos(xs: &[f64], a: f64) -> Vec<f64> {
    let raw: Vec<f64> = xs
        .iter()
        .map(|&x| {
            if -a < x && x < a {
                sinc(x) * sinc(x / a)
            } else {
                0.0
            }
        })
        .collect();
    let sum: f64 = raw.iter().sum();
    raw.into_iter().map(|v| v / sum).collect()
}

/// Symmetric tap positions `k * ratio` covering `(-width, width)`.
fn ramp(ratio: f64, width: f64) -> Vec<f64> {
    let n = (width / ratio + 1.0).ceil() as usize;
    let half: Vec<f64> = (0..n).map(|i| i as f64 * ratio).collect();
    let mut full: Vec<f64> = half[1..].iter().rev().map(|v| -v).collect();
    full.extend_from_slice(&half);
    full[1..full.len() - 1].to_vec()
}

/// Mirror an out-of-range index without repeating the edge sample (`-1 -> 1`).
fn reflect(i: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let period = 2 * (n as isize - 1);
    let m = i.rem_euclid(period);
    if m < n as isize {
        m as usize
    } else {
        (period - m) as usize
    }
}

/// Mirror an out-of-range index repeating the edge sample (`-1 -> 0`).
fn symmetric(i: isize, n: usize) -> usize {
    let period = 2 * n as isize;
    let m = i.rem_euclid(period);
    if m < n as isize {
        m as usize
    } else {
        (period - 1 - m) as usize
    }
}

/// Lanczos prefilter for downsampling `n` samples by `ratio`, reflect-padded, same length.
fn lanczos_prefilter(n: usize, ratio: f64) -> AxisOperator {
    let kernel = lanczos(&ramp(ratio, LANCZOS_LOBES), LANCZOS_LOBES);
    let pad = (kernel.len() as isize - 1) / 2;
    let mut op = AxisOperator::zeros(n, n);
    for i in 0..n {
        for (k, &w) in kernel.iter().enumerate() {
            let src = reflect(i as isize + k as isize - pad, n);
            op.add(i, src, w);
        }
    }
    op
}

fn cubic_near(x: f64, a: f64) -> f64 {
    ((a + 2.0) * x - (a + 3.0)) * x * x + 1.0
}

fn cubic_far(x: f64, a: f64) -> f64 {
    ((a * x - 5.0 * a) * x + 8.0 * a) * x - 4.0 * a
}

/// Bicubic interpolation from `src` to `dst` samples with edge-clamped taps.
fn bicubic(src: usize, dst: usize, align_corners: bool) -> AxisOperator {
    let mut op = AxisOperator::zeros(dst, src);
    for j in 0..dst {
        let real = if align_corners {
            if dst > 1 {
                j as f64 * (src as f64 - 1.0) / (dst as f64 - 1.0)
            } else {
                0.0
            }
        } else {
            (j as f64 + 0.5) * src as f64 / dst as f64 - 0.5
        };
        let base = real.floor();
        let t = real - base;
        let coeffs = [
            cubic_far(t + 1.0, BICUBIC_A),
            cubic_near(t, BICUBIC_A),
            cubic_near(1.0 - t, BICUBIC_A),
            cubic_far(2.0 - t, BICUBIC_A),
        ];
        for (k, &w) in coeffs.iter().enumerate() {
            let idx = (base as isize - 1 + k as isize).clamp(0, src as isize - 1) as usize;
            op.add(j, idx, w);
        }
    }
    op
}

/// Keys cubic kernel (a = -0.5), support 2.
fn keys_cubic(x: f64) -> f64 {
    let ax = x.abs();
    if ax <= 1.0 {
        1.5 * ax.powi(3) - 2.5 * ax.powi(2) + 1.0
    } else if ax <= 2.0 {
        -0.5 * ax.powi(3) + 2.5 * ax.powi(2) - 4.0 * ax + 2.0
    } else {
        0.0
    }
}

/// Cubic resize whose kernel is stretched by the downscale factor so every output sample
/// integrates over the source area it covers.
fn antialiased_cubic(src: usize, dst: usize) -> AxisOperator {
    let scale = dst as f64 / src as f64;
    let stretch = scale.min(1.0);
    let support = 2.0 / stretch;
    let mut op = AxisOperator::zeros(dst, src);
    for j in 0..dst {
        let center = (j as f64 + 0.5) / scale - 0.5;
        let lo = (center - support).ceil() as isize;
        let hi = (center + support).floor() as isize;
        let taps: Vec<(usize, f64)> = (lo..=hi)
            .map(|i| (symmetric(i, src), keys_cubic((i as f64 - center) * stretch)))
            .collect();
        let sum: f64 = taps.iter().map(|(_, w)| w).sum();
        for (idx, w) in taps {
            op.add(j, idx, w / sum);
        }
    }
    op
}

pub(crate) fn resample_operator(src: usize, dst: usize, align_corners: bool) -> AxisOperator {
    let interp = bicubic(src, dst, align_corners);
    if dst < src {
        interp.then_after(&lanczos_prefilter(src, dst as f64 / src as f64))
    } else {
        interp
    }
}

pub(crate) fn resize_operator(src: usize, dst: usize) -> AxisOperator {
    antialiased_cubic(src, dst)
}

fn check_target(input: &Tensor, size: (usize, usize)) -> DiscoResult<(usize, usize, usize, usize)> {
    let dims = input.dims4()?;
    if size.0 == 0 || size.1 == 0 {
        return Err(DiscoError::numerical("resize target must be non-empty"));
    }
    if dims.2 == 0 || dims.3 == 0 {
        return Err(DiscoError::numerical("cannot resize an empty image"));
    }
    Ok(dims)
}

/// Apply per-axis operators to an `(n, c, h, w)` tensor: height pass, then width pass.
fn apply_separable(
    input: &Tensor,
    op_h: &AxisOperator,
    op_w: &AxisOperator,
) -> DiscoResult<Tensor> {
    let (n, c, h, w) = input.dims4()?;
    let nc = n * c;
    let dtype = input.dtype();
    let device = input.device();

    let mh = op_h.to_tensor(dtype, device)?;
    let x = input
        .reshape((nc, h, w))?
        .transpose(0, 1)?
        .contiguous()?
        .reshape((h, nc * w))?;
    let x = mh
        .matmul(&x)?
        .reshape((op_h.dst, nc, w))?
        .transpose(0, 1)?
        .contiguous()?
        .reshape((nc * op_h.dst, w))?;

    let mw = op_w.to_tensor(dtype, device)?.t()?.contiguous()?;
    let x = x.matmul(&mw)?;
    Ok(x.reshape((n, c, op_h.dst, op_w.dst))?)
}

/// Resize with a Lanczos prefilter on every downsampled axis followed by bicubic interpolation.
pub fn resample(input: &Tensor, size: (usize, usize), align_corners: bool) -> DiscoResult<Tensor> {
    let (_, _, h, w) = check_target(input, size)?;
    let op_h = resample_operator(h, size.0, align_corners);
    let op_w = resample_operator(w, size.1, align_corners);
    apply_separable(input, &op_h, &op_w)
}

/// Antialiased cubic resize preserving local averages when shrinking.
pub fn resize(input: &Tensor, size: (usize, usize)) -> DiscoResult<Tensor> {
    let (_, _, h, w) = check_target(input, size)?;
    let op_h = resize_operator(h, size.0);
    let op_w = resize_operator(w, size.1);
    apply_separable(input, &op_h, &op_w)
}

#[cfg(test)]
#[path = "../../tests/unit/image/resample.rs"]
mod tests;
