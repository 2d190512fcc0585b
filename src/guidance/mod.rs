//! Embedding-guided correction of the reverse process.

/// Per-model prompt targets.
pub mod context;
/// The per-step guidance gradient.
pub mod function;
