//! Reverse diffusion: the noise process, the collaborator traits and the samplers.

/// Respaced Gaussian diffusion process.
pub mod gaussian;
/// Traits for the pretrained collaborators.
pub mod model;
/// DDIM and PLMS reverse loops.
pub mod sampler;
