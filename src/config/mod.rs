//! Run configuration: prompts, step schedules and the run parameter set.

/// Weighted prompt parsing and weight normalization.
pub mod prompt;
/// JSON run configuration.
pub mod run;
/// Piecewise step schedules and cutout schedules.
pub mod schedule;
