//! Guidance loss terms.
//!
//! The semantic term compares image and text embeddings; the auxiliary terms regularize the
//! denoised estimate directly. Every term is differentiable through candle's autograd.

mod asin;
/// Loss functions and their weighted combination.
pub mod terms;
