//! Starting images for the sampler.

/// Perlin noise initialization.
pub mod perlin;
