use candle_core::Tensor;

use crate::foundation::error::DiscoResult;

/// Pretrained noise-prediction network.
///
/// `forward` receives the noisy batch `(n, 3, h, w)` and the timestep already rescaled to the
/// training range [0, 1000), and returns the predicted noise with the same shape.
pub trait Denoiser: Send + Sync {
    /// Predict the noise in `x` at `timestep`.
    fn forward(&self, x: &Tensor, timestep: f64, class_label: Option<&Tensor>)
    -> DiscoResult<Tensor>;

    /// Number of class labels for class-conditional models.
    fn num_classes(&self) -> Option<usize> {
        None
    }
}

/// Vision-language embedding model scoring images against text.
pub trait EmbeddingModel: Send + Sync {
    /// Stable identifier used to enable the model from a configuration (e.g. `ViTB32`).
    fn id(&self) -> &str;

    /// Square input side expected by `encode_image`.
    fn input_resolution(&self) -> usize;

    /// Embed one prompt as a `(1, d)` tensor.
    fn encode_text(&self, text: &str) -> DiscoResult<Tensor>;

    /// Embed a normalized image batch `(n, 3, r, r)` as `(n, d)`. Must be differentiable with
    /// respect to `images`.
    fn encode_image(&self, images: &Tensor) -> DiscoResult<Tensor>;
}

/// Learned perceptual image distance. Loaded alongside the ensemble but not used by guidance.
pub trait PerceptualModel: Send + Sync {
    /// Per-image distance between two batches, `(n,)`.
    fn distance(&self, a: &Tensor, b: &Tensor) -> DiscoResult<Tensor>;
}
