//! discoart generates images from text by steering reverse diffusion with an ensemble of
//! image/text embedding models.
//!
//! At every reverse step the current clean-image estimate is cut into many augmented views,
//! embedded, and compared with the prompt embeddings; the gradient of that distance (plus
//! smoothness and range regularizers) corrects the denoiser's noise prediction.
//!
//! - Describe a run with a [`RunConfig`] (JSON, serde defaults)
//! - Supply a [`Denoiser`] and one or more [`EmbeddingModel`]s
//! - Drive it with an [`Orchestrator`], collecting previews in a [`PreviewSink`]
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;

/// Model checkpoint integrity checks.
pub mod checkpoint;
/// Run configuration, prompts and step schedules.
pub mod config;
/// Multi-view cutout generators.
pub mod cutouts;
/// Diffusion process, collaborator traits and samplers.
pub mod diffusion;
/// Prompt targets and the per-step guidance gradient.
pub mod guidance;
/// Differentiable image resampling and geometry.
pub mod image;
/// Initial images.
pub mod init;
/// Guidance loss terms.
pub mod loss;
/// Bundled collaborator implementations.
pub mod models;
/// Batch orchestration, previews and cancellation.
pub mod run;

pub use crate::foundation::core::{BatchIndex, Resolution, SIDE_MULTIPLE, StepsRemaining};
pub use crate::foundation::error::{DiscoError, DiscoResult};

pub use crate::config::prompt::{WeightedPrompt, parse_prompt};
pub use crate::config::run::{CutoutMode, LossWeights, PerlinMode, RunConfig, SamplerKind};
pub use crate::config::schedule::{CutoutParams, CutoutSchedule, StepSchedule};
pub use crate::cutouts::Cutouts;
pub use crate::cutouts::overview::OverviewInnerCutouts;
pub use crate::cutouts::random_crop::RandomCropCutouts;
pub use crate::diffusion::gaussian::GaussianDiffusion;
pub use crate::diffusion::model::{Denoiser, EmbeddingModel, PerceptualModel};
pub use crate::diffusion::sampler::{CorrectionHook, SampleLoop, SampleOptions, SampleStep};
pub use crate::guidance::context::GuidanceContext;
pub use crate::guidance::function::{GuidanceFn, GuidanceParams};
pub use crate::init::perlin::perlin_init;
pub use crate::run::cancel::CancelToken;
pub use crate::run::orchestrator::{Collaborators, ImageResult, Orchestrator, RunOutcome};
pub use crate::run::sink::{InMemorySink, PngFrameSink, PreviewConfig, PreviewSink, SpriteSheetSink};
