//! Run orchestration: batches of guided sampling runs, previews and cancellation.

/// Cooperative cancellation between reverse steps.
pub mod cancel;
/// Batch orchestration of guided sampling.
pub mod orchestrator;
/// Preview frame consumers.
pub mod sink;
