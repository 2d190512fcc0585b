//! Collaborator implementations shipped with the crate.

/// Untrained reference models for dry runs and tests.
pub mod reference;
