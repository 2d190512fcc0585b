//! Shared types, errors and seeded randomness.

pub(crate) mod core;
pub(crate) mod error;
pub(crate) mod rng;
