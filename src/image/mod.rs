//! Differentiable image operations on `(n, c, h, w)` tensors.

/// Pixel-wise helpers and 8-bit conversion.
pub mod ops;
/// Lanczos/bicubic resampling and antialiased resizing.
pub mod resample;
/// Affine and perspective warps.
pub mod warp;
