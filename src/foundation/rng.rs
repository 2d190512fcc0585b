use candle_core::{Device, Shape, Tensor};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::foundation::error::DiscoResult;

/// Independent random streams derived from one seed.
///
/// Every consumer draws from its own stream so that, e.g., changing the number of cutouts never
/// perturbs the sampler's noise.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RngStream {
    Sampler,
    Cutouts,
    Perlin,
}

impl RngStream {
    fn id(self) -> u64 {
        match self {
            Self::Sampler => 0,
            Self::Cutouts => 1,
            Self::Perlin => 2,
        }
    }
}

pub(crate) fn stream_rng(seed: u64, stream: RngStream) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(stream.id());
    rng
}

pub(crate) fn randn_vec(rng: &mut ChaCha8Rng, n: usize) -> Vec<f32> {
    (0..n).map(|_| StandardNormal.sample(rng)).collect()
}

/// Standard-normal tensor drawn from `rng`. Candle's CPU backend cannot be seeded, so every
/// random tensor in the crate goes through here.
pub(crate) fn randn_tensor(
    rng: &mut ChaCha8Rng,
    shape: impl Into<Shape>,
    device: &Device,
) -> DiscoResult<Tensor> {
    let shape = shape.into();
    let data = randn_vec(rng, shape.elem_count());
    Ok(Tensor::from_vec(data, shape, device)?)
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/rng.rs"]
mod tests;
