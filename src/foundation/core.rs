use crate::foundation::error::{DiscoError, DiscoResult};

/// Output sizes are snapped down to a multiple of this value (the denoiser's downsampling factor).
pub const SIDE_MULTIPLE: u32 = 64;

/// Output image size in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Resolution {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Resolution {
    /// Build a resolution, rejecting empty sizes.
    pub fn new(width: u32, height: u32) -> DiscoResult<Self> {
        if width == 0 || height == 0 {
            return Err(DiscoError::config("resolution must be non-empty"));
        }
        Ok(Self { width, height })
    }

    /// Snap both sides down to a multiple of [`SIDE_MULTIPLE`].
    pub fn snapped(self) -> DiscoResult<Self> {
        let width = (self.width / SIDE_MULTIPLE) * SIDE_MULTIPLE;
        let height = (self.height / SIDE_MULTIPLE) * SIDE_MULTIPLE;
        if width == 0 || height == 0 {
            return Err(DiscoError::config(format!(
                "resolution {}x{} is smaller than {SIDE_MULTIPLE}px on one side",
                self.width, self.height
            )));
        }
        Ok(Self { width, height })
    }

    /// Tensor shape `(batch, 3, height, width)` for this resolution.
    pub fn batch_shape(self, batch: usize) -> (usize, usize, usize, usize) {
        (batch, 3, self.height as usize, self.width as usize)
    }
}

/// Identifies one output image of a run.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct BatchIndex(pub usize);

/// Countdown index of a reverse-diffusion step: `steps - 1` on the first step, `0` on the last.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct StepsRemaining(pub usize);

impl StepsRemaining {
    /// `true` on the final reverse step.
    pub fn is_last(self) -> bool {
        self.0 == 0
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
