use candle_core::Tensor;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

use crate::cutouts::Cutouts;
use crate::cutouts::augment::crop_pipeline;
use crate::foundation::error::{DiscoError, DiscoResult};
use crate::image::ops::{crop_square, pad_uniform};
use crate::image::resample::resample;

const SIZE_MEAN: f64 = 0.8;
const SIZE_STD: f64 = 0.3;

/// Random square crops of a zero-padded image, the final quarter taken as the whole padded frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RandomCropCutouts {
    cut_size: usize,
    cutn: usize,
    skip_augs: bool,
}

impl RandomCropCutouts {
    /// Create a generator of `cutn` views of side `cut_size`.
    pub fn new(cut_size: usize, cutn: usize, skip_augs: bool) -> DiscoResult<Self> {
        if cut_size == 0 || cutn == 0 {
            return Err(DiscoError::config("cut_size and cutn must be > 0"));
        }
        Ok(Self {
            cut_size,
            cutn,
            skip_augs,
        })
    }

    fn is_full_frame(&self, ch: usize) -> bool {
        ch >= self.cutn - self.cutn / 4
    }
}

impl Cutouts for RandomCropCutouts {
    fn cut_size(&self) -> usize {
        self.cut_size
    }

    fn count(&self) -> usize {
        self.cutn
    }

    fn cut(&self, input: &Tensor, rng: &mut ChaCha8Rng) -> DiscoResult<Tensor> {
        let (_, _, h, _) = input.dims4()?;
        let padded = pad_uniform(input, h / 4)?;
        let (_, _, side_y, side_x) = padded.dims4()?;
        let max_size = side_x.min(side_y);
        let lo = (self.cut_size as f64 / max_size as f64).min(1.0);

        let mut views = Vec::with_capacity(self.cutn);
        for ch in 0..self.cutn {
            let cutout = if self.is_full_frame(ch) {
                padded.clone()
            } else {
                let z: f64 = rng.sample(StandardNormal);
                let frac = (SIZE_MEAN + SIZE_STD * z).clamp(lo, 1.0);
                let size = ((max_size as f64 * frac) as usize).clamp(1, max_size);
                let left = rng.gen_range(0..=side_x - size);
                let top = rng.gen_range(0..=side_y - size);
                crop_square(&padded, top, left, size)?
            };
            let cutout = if self.skip_augs {
                cutout
            } else {
                crop_pipeline(&cutout, rng)?
            };
            views.push(resample(&cutout, (self.cut_size, self.cut_size), true)?);
        }
        Ok(Tensor::cat(&views, 0)?)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/cutouts/random_crop.rs"]
mod tests;
