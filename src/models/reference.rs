//! Deterministic, untrained stand-ins for the pretrained collaborators.
//!
//! They have the right shapes and are differentiable, which is all the sampling loop needs for
//! dry runs and tests. Their outputs carry no meaning.

use candle_core::{DType, Device, Tensor};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use sha2::Digest as _;

use crate::diffusion::model::{Denoiser, EmbeddingModel, PerceptualModel};
use crate::foundation::error::{DiscoError, DiscoResult};
use crate::foundation::rng::{randn_tensor, randn_vec};

fn seed_from(label: &str) -> u64 {
    let digest = sha2::Sha256::digest(label.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

/// Predicts noise as the input scaled by the normalized timestep.
#[derive(Clone, Debug, PartialEq)]
pub struct ReferenceDenoiser {
    strength: f64,
    classes: Option<usize>,
}

impl ReferenceDenoiser {
    /// Denoiser predicting `strength * timestep / 1000 * x`.
    pub fn new(strength: f64) -> Self {
        Self {
            strength,
            classes: None,
        }
    }

    /// Make the denoiser class-conditional (labels are accepted and ignored).
    pub fn with_classes(mut self, classes: usize) -> Self {
        self.classes = Some(classes);
        self
    }
}

impl Denoiser for ReferenceDenoiser {
    fn forward(&self, x: &Tensor, timestep: f64, _class_label: Option<&Tensor>) -> DiscoResult<Tensor> {
        Ok(x.affine(self.strength * timestep / 1000.0, 0.0)?)
    }

    fn num_classes(&self) -> Option<usize> {
        self.classes
    }
}

/// Embeds images by average-pooling a `grid x grid` patch layout and projecting it with a fixed
/// random matrix; text embeddings are random vectors seeded by the text.
#[derive(Clone, Debug)]
pub struct PatchEmbedder {
    id: String,
    resolution: usize,
    grid: usize,
    dim: usize,
    projection: Tensor,
}

impl PatchEmbedder {
    /// Create an embedder named `id` taking `resolution`-sided inputs.
    pub fn new(
        id: impl Into<String>,
        resolution: usize,
        grid: usize,
        dim: usize,
        device: &Device,
    ) -> DiscoResult<Self> {
        let id = id.into();
        if grid == 0 || dim == 0 || resolution == 0 || resolution % grid != 0 {
            return Err(DiscoError::config(format!(
                "embedder '{id}': resolution {resolution} must be a positive multiple of grid {grid}"
            )));
        }
        let mut rng = ChaCha8Rng::seed_from_u64(seed_from(&id));
        let features = 3 * grid * grid;
        let projection = randn_tensor(&mut rng, (features, dim), device)?
            .affine(1.0 / (features as f64).sqrt(), 0.0)?;
        Ok(Self {
            id,
            resolution,
            grid,
            dim,
            projection,
        })
    }

    /// Width of the produced embeddings.
    pub fn dim(&self) -> usize {
        self.dim
    }
}

impl EmbeddingModel for PatchEmbedder {
    fn id(&self) -> &str {
        &self.id
    }

    fn input_resolution(&self) -> usize {
        self.resolution
    }

    fn encode_text(&self, text: &str) -> DiscoResult<Tensor> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed_from(&format!("{}/{text}", self.id)));
        let v = randn_vec(&mut rng, self.dim);
        Ok(Tensor::from_vec(v, (1, self.dim), self.projection.device())?)
    }

    fn encode_image(&self, images: &Tensor) -> DiscoResult<Tensor> {
        let (n, c, h, w) = images.dims4()?;
        if (c, h, w) != (3, self.resolution, self.resolution) {
            return Err(DiscoError::model(format!(
                "{}: expected (n, 3, {r}, {r}) images, got {:?}",
                self.id,
                images.dims(),
                r = self.resolution
            )));
        }
        let (g, cell) = (self.grid, self.resolution / self.grid);
        let pooled = images
            .to_dtype(DType::F32)?
            .reshape(vec![n, c, g, cell, g, cell])?
            .mean(5)?
            .mean(3)?
            .reshape((n, c * g * g))?;
        Ok(pooled.matmul(&self.projection)?)
    }
}

/// Mean squared pixel difference per image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PixelDistance;

impl PerceptualModel for PixelDistance {
    fn distance(&self, a: &Tensor, b: &Tensor) -> DiscoResult<Tensor> {
        Ok((a - b)?.sqr()?.flatten_from(1)?.mean(1)?)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/models/reference.rs"]
mod tests;
