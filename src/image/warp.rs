//! Geometric warps by inverse mapping.
//!
//! Each warp computes, for every output pixel, where to read in the source image. The reads are
//! expressed as `index_select` gathers with fixed weights, so the result stays differentiable
//! with respect to pixel values. Samples falling outside the source read as zero.

use candle_core::{Device, Tensor};

use crate::foundation::error::{DiscoError, DiscoResult};

/// How source samples between pixel centers are read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interpolation {
    /// Nearest pixel.
    Nearest,
    /// Weighted mean of the four surrounding pixels.
    Bilinear,
}

/// 2-D affine map in pixel units around the image center.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AffineParams {
    /// Rotation in degrees.
    pub angle_deg: f64,
    /// Horizontal translation in pixels.
    pub tx: f64,
    /// Vertical translation in pixels.
    pub ty: f64,
}

/// A `[x, y]` pixel corner.
pub type Corner = [f64; 2];

struct Gather {
    taps: Vec<(Vec<u32>, Vec<f32>)>,
}

impl Gather {
    fn new(len: usize, taps: usize) -> Self {
        Self {
            taps: (0..taps)
                .map(|_| (vec![0u32; len], vec![0f32; len]))
                .collect(),
        }
    }

    fn set(&mut self, tap: usize, pixel: usize, src: usize, weight: f64) {
        let (idx, wt) = &mut self.taps[tap];
        idx[pixel] = src as u32;
        wt[pixel] = weight as f32;
    }

    fn apply(self, x: &Tensor) -> DiscoResult<Tensor> {
        let (n, c, h, w) = x.dims4()?;
        let flat = x.reshape((n, c, h * w))?;
        let device: &Device = x.device();
        let mut acc: Option<Tensor> = None;
        for (idx, wt) in self.taps {
            let idx = Tensor::from_vec(idx, h * w, device)?;
            let wt = Tensor::from_vec(wt, (1, 1, h * w), device)?.to_dtype(x.dtype())?;
            let term = flat.index_select(&idx, 2)?.broadcast_mul(&wt)?;
            acc = Some(match acc {
                Some(a) => (a + term)?,
                None => term,
            });
        }
        let out = acc.ok_or_else(|| DiscoError::numerical("warp without taps"))?;
        Ok(out.reshape((n, c, h, w))?)
    }
}

/// Warp `x` by reading, for output pixel center `(x + 0.5, y + 0.5)`, the source position
/// returned by `inverse` (also in pixel-center units).
fn warp_with(
    x: &Tensor,
    interp: Interpolation,
    inverse: impl Fn(f64, f64) -> (f64, f64),
) -> DiscoResult<Tensor> {
    let (_, _, h, w) = x.dims4()?;
    let taps = match interp {
        Interpolation::Nearest => 1,
        Interpolation::Bilinear => 4,
    };
    let mut gather = Gather::new(h * w, taps);
    let inside = |ix: f64, iy: f64| ix >= 0.0 && iy >= 0.0 && ix < w as f64 && iy < h as f64;

    for oy in 0..h {
        for ox in 0..w {
            let pixel = oy * w + ox;
            let (sx, sy) = inverse(ox as f64 + 0.5, oy as f64 + 0.5);
            let (sx, sy) = (sx - 0.5, sy - 0.5);
            match interp {
                Interpolation::Nearest => {
                    let (ix, iy) = (sx.round(), sy.round());
                    if inside(ix, iy) {
                        gather.set(0, pixel, iy as usize * w + ix as usize, 1.0);
                    }
                }
                Interpolation::Bilinear => {
                    let (x0, y0) = (sx.floor(), sy.floor());
                    let (fx, fy) = (sx - x0, sy - y0);
                    let corners = [
                        (x0, y0, (1.0 - fx) * (1.0 - fy)),
                        (x0 + 1.0, y0, fx * (1.0 - fy)),
                        (x0, y0 + 1.0, (1.0 - fx) * fy),
                        (x0 + 1.0, y0 + 1.0, fx * fy),
                    ];
                    for (tap, (ix, iy, wt)) in corners.into_iter().enumerate() {
                        if inside(ix, iy) {
                            gather.set(tap, pixel, iy as usize * w + ix as usize, wt);
                        }
                    }
                }
            }
        }
    }
    gather.apply(x)
}

/// Rotate and translate around the image center, zero-filling uncovered pixels.
pub fn affine(x: &Tensor, params: AffineParams, interp: Interpolation) -> DiscoResult<Tensor> {
    let (_, _, h, w) = x.dims4()?;
    let (cx, cy) = (w as f64 * 0.5, h as f64 * 0.5);
    let (sin, cos) = params.angle_deg.to_radians().sin_cos();
    warp_with(x, interp, |px, py| {
        let u = px - cx - params.tx;
        let v = py - cy - params.ty;
        (cos * u + sin * v + cx, -sin * u + cos * v + cy)
    })
}

/// Solve the projective map sending each `from` corner onto the matching `to` corner.
fn homography(from: &[Corner; 4], to: &[Corner; 4]) -> Option<[f64; 8]> {
    let mut a = [[0f64; 9]; 8];
    for (i, (f, t)) in from.iter().zip(to).enumerate() {
        let (x, y) = (f[0], f[1]);
        let (tx, ty) = (t[0], t[1]);
        a[2 * i] = [x, y, 1.0, 0.0, 0.0, 0.0, -tx * x, -tx * y, tx];
        a[2 * i + 1] = [0.0, 0.0, 0.0, x, y, 1.0, -ty * x, -ty * y, ty];
    }

    for col in 0..8 {
        let pivot = (col..8).max_by(|&r1, &r2| a[r1][col].abs().total_cmp(&a[r2][col].abs()))?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        for row in 0..8 {
            if row == col {
                continue;
            }
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..9 {
                a[row][k] -= factor * a[col][k];
            }
        }
    }

    let mut out = [0f64; 8];
    for (i, v) in out.iter_mut().enumerate() {
        *v = a[i][8] / a[i][i];
    }
    Some(out)
}

/// Warp so the image corners `start` land on `end`. Degenerate corner sets leave the input
/// unchanged.
pub fn perspective(
    x: &Tensor,
    start: &[Corner; 4],
    end: &[Corner; 4],
    interp: Interpolation,
) -> DiscoResult<Tensor> {
    // Inverse mapping: output (end) coordinates back to source (start) coordinates.
    let Some(c) = homography(end, start) else {
        return Ok(x.clone());
    };
    warp_with(x, interp, |px, py| {
        let denom = c[6] * px + c[7] * py + 1.0;
        (
            (c[0] * px + c[1] * py + c[2]) / denom,
            (c[3] * px + c[4] * py + c[5]) / denom,
        )
    })
}

#[cfg(test)]
#[path = "../../tests/unit/image/warp.rs"]
mod tests;
