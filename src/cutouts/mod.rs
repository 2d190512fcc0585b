//! Multi-view cutout generators.
//!
//! A generator turns an `(n, 3, h, w)` image batch in [0, 1] into `count * n` fixed-size square
//! views. Views are stacked cutout-major: rows `[k * n, (k + 1) * n)` hold cutout `k` of every
//! image.

use candle_core::Tensor;
use rand_chacha::ChaCha8Rng;

use crate::foundation::error::DiscoResult;

pub(crate) mod augment;
/// Scheduled overview plus inner-crop views.
pub mod overview;
/// Random crops with geometric augmentation.
pub mod random_crop;

/// Strategy producing fixed-size views of an image batch for an embedding model.
pub trait Cutouts {
    /// Side of every produced view.
    fn cut_size(&self) -> usize;

    /// Views produced per input image.
    fn count(&self) -> usize;

    /// Produce `(count * n, 3, cut_size, cut_size)` views of `input`.
    fn cut(&self, input: &Tensor, rng: &mut ChaCha8Rng) -> DiscoResult<Tensor>;
}
