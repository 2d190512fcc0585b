use candle_core::Tensor;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::config::schedule::CutoutParams;
use crate::cutouts::Cutouts;
use crate::cutouts::augment::view_pipeline;
use crate::foundation::error::{DiscoError, DiscoResult};
use crate::image::ops::{crop_square, grayscale, hflip, pad_to_square};
use crate::image::resample::resize;

/// Whole-image overviews plus random inner crops, counts taken from the step's schedule entry.
///
/// Up to four overviews cycle through identity, grayscale, flipped and flipped grayscale; more
/// than four are plain copies. Inner crop sides are `min + rand()^ic_pow * (max - min)`, so
/// `ic_pow > 1` favours small crops. The leading `floor(ic_gray_p * innercut)` inner crops are
/// grayscale.
#[derive(Clone, Debug, PartialEq)]
pub struct OverviewInnerCutouts {
    cut_size: usize,
    params: CutoutParams,
    ic_pow: f64,
    skip_augs: bool,
}

impl OverviewInnerCutouts {
    /// Create a generator for one step's cutout parameters.
    pub fn new(
        cut_size: usize,
        params: CutoutParams,
        ic_pow: f64,
        skip_augs: bool,
    ) -> DiscoResult<Self> {
        if cut_size == 0 {
            return Err(DiscoError::config("cut_size must be > 0"));
        }
        if params.total() == 0 {
            return Err(DiscoError::config("cutout parameters yield no views"));
        }
        Ok(Self {
            cut_size,
            params,
            ic_pow,
            skip_augs,
        })
    }

    fn gray_count(&self) -> usize {
        (self.params.ic_gray_p * self.params.innercut as f64).floor() as usize
    }

    fn overviews(&self, input: &Tensor, out: &mut Vec<Tensor>) -> DiscoResult<()> {
        let count = self.params.overview;
        if count == 0 {
            return Ok(());
        }
        let base = resize(&pad_to_square(input)?, (self.cut_size, self.cut_size))?;
        if count > 4 {
            out.extend(std::iter::repeat_n(base, count));
            return Ok(());
        }
        out.push(base.clone());
        if count >= 2 {
            out.push(grayscale(&base)?);
        }
        if count >= 3 {
            out.push(hflip(&base)?);
        }
        if count == 4 {
            out.push(grayscale(&hflip(&base)?)?);
        }
        Ok(())
    }

    fn inner_crops(
        &self,
        input: &Tensor,
        rng: &mut ChaCha8Rng,
        out: &mut Vec<Tensor>,
    ) -> DiscoResult<()> {
        let (_, _, side_y, side_x) = input.dims4()?;
        let max_size = side_x.min(side_y);
        let min_size = max_size.min(self.cut_size);
        let gray_count = self.gray_count();

        for i in 0..self.params.innercut {
            let r = rng.r#gen::<f64>().powf(self.ic_pow);
            let size = ((r * (max_size - min_size) as f64) as usize + min_size).clamp(1, max_size);
            let left = rng.gen_range(0..=side_x - size);
            let top = rng.gen_range(0..=side_y - size);
            let crop = crop_square(input, top, left, size)?;
            let crop = if i < gray_count {
                grayscale(&crop)?
            } else {
                crop
            };
            out.push(resize(&crop, (self.cut_size, self.cut_size))?);
        }
        Ok(())
    }
}

impl Cutouts for OverviewInnerCutouts {
    fn cut_size(&self) -> usize {
        self.cut_size
    }

    fn count(&self) -> usize {
        self.params.total()
    }

    fn cut(&self, input: &Tensor, rng: &mut ChaCha8Rng) -> DiscoResult<Tensor> {
        let mut views = Vec::with_capacity(self.count());
        self.overviews(input, &mut views)?;
        self.inner_crops(input, rng, &mut views)?;
        let cutouts = Tensor::cat(&views, 0)?;
        if self.skip_augs {
            return Ok(cutouts);
        }

        let rows = cutouts.dim(0)?;
        let augmented = (0..rows)
            .map(|i| view_pipeline(&cutouts.narrow(0, i, 1)?, rng))
            .collect::<DiscoResult<Vec<_>>>()?;
        Ok(Tensor::cat(&augmented, 0)?)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/cutouts/overview.rs"]
mod tests;
