//! Multi-octave Perlin noise starting images.
//!
//! Two independent fields are synthesized: a coarse one over a 1x1 base grid with 12 octaves
//! and a finer one over a 4x4 base grid with 8 octaves, octave `i` weighted `0.5 * 1.5^-i`.
//! Each is resized to the output resolution, quantized to 8 bits, contrast-stretched per channel,
//! and the two are averaged into [-1, 1].
//!
//! A field's native side is `base * 2^octaves` pixels. Fields are rendered at that side or at the
//! smallest power of two covering the output, whichever is smaller; octaves whose cells would be
//! smaller than one rendered pixel are above the band limit of the final resize and are skipped.

use candle_core::{Device, Tensor};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::config::run::PerlinMode;
use crate::foundation::core::Resolution;
use crate::foundation::error::{DiscoError, DiscoResult};
use crate::foundation::rng::randn_vec;
use crate::image::resample::resize;

const COARSE_BASE: usize = 1;
const COARSE_OCTAVES: usize = 12;
const FINE_BASE: usize = 4;
const FINE_OCTAVES: usize = 8;

/// Amplitude of each octave, coarsest first.
pub fn octave_amplitudes(octaves: usize) -> Vec<f64> {
    (0..octaves).map(|i| 0.5 * 1.5f64.powi(-(i as i32))).collect()
}

fn fade(t: f64) -> f64 {
    3.0 * t * t - 2.0 * t * t * t
}

/// Random gradient lattice for one octave: `(cells + 1)^2` corner gradients.
struct Lattice {
    cells: usize,
    gx: Vec<f32>,
    gy: Vec<f32>,
}

impl Lattice {
    fn random(cells: usize, rng: &mut ChaCha8Rng) -> Self {
        let n = (cells + 1) * (cells + 1);
        let gx = randn_vec(rng, n);
        let gy = randn_vec(rng, n);
        Self { cells, gx, gy }
    }

    fn grad(&self, cx: usize, cy: usize) -> (f64, f64) {
        let i = cx * (self.cells + 1) + cy;
        (f64::from(self.gx[i]), f64::from(self.gy[i]))
    }

    /// Noise at lattice coordinates `(u, v)`, both in `[0, cells)`.
    fn sample(&self, u: f64, v: f64) -> f64 {
        let cx = (u.floor() as usize).min(self.cells - 1);
        let cy = (v.floor() as usize).min(self.cells - 1);
        let xs = u - cx as f64;
        let ys = v - cy as f64;
        let wx = 1.0 - fade(xs);
        let wy = 1.0 - fade(ys);

        let (g00x, g00y) = self.grad(cx, cy);
        let (g10x, g10y) = self.grad(cx + 1, cy);
        let (g01x, g01y) = self.grad(cx, cy + 1);
        let (g11x, g11y) = self.grad(cx + 1, cy + 1);

        wx * wy * (g00x * xs + g00y * ys)
            + (1.0 - wx) * wy * (-g10x * (1.0 - xs) + g10y * ys)
            + wx * (1.0 - wy) * (g01x * xs - g01y * (1.0 - ys))
            + (1.0 - wx) * (1.0 - wy) * (-g11x * (1.0 - xs) - g11y * (1.0 - ys))
    }
}

/// One channel of multi-octave noise on a `side x side` grid, offset by 0.5.
fn render_channel(base: usize, octaves: usize, side: usize, rng: &mut ChaCha8Rng) -> Vec<f32> {
    let layers: Vec<(Lattice, f64)> = octave_amplitudes(octaves)
        .into_iter()
        .enumerate()
        .map(|(k, amp)| (Lattice::random(base << k, rng), amp))
        .filter(|(lattice, _)| lattice.cells <= side)
        .collect();

    let mut out = vec![0f32; side * side];
    out.par_chunks_mut(side).enumerate().for_each(|(row, chunk)| {
        for (col, px) in chunk.iter_mut().enumerate() {
            let mut acc = 0.5;
            for (lattice, amp) in &layers {
                let per_px = lattice.cells as f64 / side as f64;
                acc += amp * lattice.sample(row as f64 * per_px, col as f64 * per_px);
            }
            *px = acc as f32;
        }
    });
    out
}

fn render_side(base: usize, octaves: usize, resolution: Resolution) -> usize {
    let native = base << octaves;
    let cover = resolution.width.max(resolution.height) as usize;
    native.min(cover.next_power_of_two())
}

/// Stretch each channel of an 8-bit `(channels, pixels)` buffer to the full 0..=255 range.
pub(crate) fn autocontrast(data: &mut [u8], channels: usize) {
    let plane = data.len() / channels.max(1);
    for band in data.chunks_mut(plane.max(1)) {
        let lo = band.iter().copied().min().unwrap_or(0);
        let hi = band.iter().copied().max().unwrap_or(255);
        if hi <= lo {
            continue;
        }
        let scale = 255.0 / f64::from(hi - lo);
        for v in band.iter_mut() {
            *v = ((f64::from(*v - lo)) * scale).clamp(0.0, 255.0) as u8;
        }
    }
}

/// Render, resize, quantize and stretch one field; returns `(3, h, w)` values in [0, 1].
fn field(
    base: usize,
    octaves: usize,
    gray: bool,
    resolution: Resolution,
    rng: &mut ChaCha8Rng,
    device: &Device,
) -> DiscoResult<Tensor> {
    let side = render_side(base, octaves, resolution);
    let channels = if gray { 1 } else { 3 };
    let mut data = Vec::with_capacity(channels * side * side);
    for _ in 0..channels {
        data.extend(render_channel(base, octaves, side, rng));
    }

    let (h, w) = (resolution.height as usize, resolution.width as usize);
    let raw = Tensor::from_vec(data, (1, channels, side, side), device)?;
    let resized = resize(&raw, (h, w))?.clamp(0f32, 1f32)?;
    let mut bytes: Vec<u8> = resized
        .flatten_all()?
        .to_vec1::<f32>()?
        .into_iter()
        .map(|v| (v * 255.0) as u8)
        .collect();
    autocontrast(&mut bytes, channels);

    let values: Vec<f32> = bytes.into_iter().map(|b| f32::from(b) / 255.0).collect();
    let t = Tensor::from_vec(values, (channels, h, w), device)?;
    if gray {
        Ok(t.broadcast_as((3, h, w))?.contiguous()?)
    } else {
        Ok(t)
    }
}

/// Perlin starting image of shape `(batch, 3, height, width)` in [-1, 1]; every batch row is the
/// same image.
#[tracing::instrument(skip(rng, device))]
pub fn perlin_init(
    mode: PerlinMode,
    resolution: Resolution,
    batch: usize,
    rng: &mut ChaCha8Rng,
    device: &Device,
) -> DiscoResult<Tensor> {
    if batch == 0 {
        return Err(DiscoError::config("perlin batch must be > 0"));
    }
    let (coarse_gray, fine_gray) = match mode {
        PerlinMode::Color => (false, false),
        PerlinMode::Gray => (true, true),
        PerlinMode::Mixed => (false, true),
    };
    let coarse = field(COARSE_BASE, COARSE_OCTAVES, coarse_gray, resolution, rng, device)?;
    let fine = field(FINE_BASE, FINE_OCTAVES, fine_gray, resolution, rng, device)?;

    let init = ((coarse + fine)? - 1.0)?.unsqueeze(0)?;
    let (h, w) = (resolution.height as usize, resolution.width as usize);
    Ok(init.broadcast_as((batch, 3, h, w))?.contiguous()?)
}

#[cfg(test)]
#[path = "../../tests/unit/init/perlin.rs"]
mod tests;
