//! Sequential generation of a batch of images.
//!
//! Every image is an independent guided sampling run seeded with `base_seed + index`. Previews
//! of the clean-image estimate go to a [`PreviewSink`] every `display_rate` steps and on the
//! final step.

use std::sync::Arc;
use std::time::Instant;

use candle_core::{Device, IndexOp as _};
use image::RgbImage;

use crate::config::run::RunConfig;
use crate::diffusion::gaussian::GaussianDiffusion;
use crate::diffusion::model::{Denoiser, EmbeddingModel, PerceptualModel};
use crate::diffusion::sampler::{CorrectionHook, SampleOptions};
use crate::foundation::core::{BatchIndex, Resolution};
use crate::foundation::error::{DiscoError, DiscoResult};
use crate::foundation::rng::{RngStream, stream_rng};
use crate::guidance::context::GuidanceContext;
use crate::guidance::function::{GuidanceFn, GuidanceParams};
use crate::image::ops::to_rgb8;
use crate::init::perlin::perlin_init;
use crate::run::cancel::CancelToken;
use crate::run::sink::{PreviewConfig, PreviewSink};

/// The pretrained models a run is driven by.
#[derive(Clone, Copy)]
pub struct Collaborators<'m> {
    /// Noise-predicting network.
    pub denoiser: &'m dyn Denoiser,
    /// Embedding-model ensemble; the run's `clip_models` select from it.
    pub embedders: &'m [Arc<dyn EmbeddingModel>],
    /// Perceptual-similarity model. Loaded for parity with full runs; guidance does not use it.
    pub perceptual: Option<&'m dyn PerceptualModel>,
}

/// Result for one image of the batch.
#[derive(Clone, Debug)]
pub struct ImageResult {
    /// Position in the batch.
    pub index: BatchIndex,
    /// Seed the image was generated with.
    pub seed: u64,
    /// Last clean-image estimate.
    pub image: RgbImage,
    /// `false` when the run was cancelled before the final step.
    pub completed: bool,
    /// Semantic loss values in evaluation order.
    pub losses: Vec<f32>,
    /// Steps whose guidance gradient was non-finite and skipped.
    pub zeroed_steps: usize,
}

/// What a run produced.
#[derive(Clone, Debug)]
pub struct RunOutcome {
    /// Seed of image 0.
    pub base_seed: u64,
    /// One entry per image that ran at least one step.
    pub images: Vec<ImageResult>,
    /// `true` when the run stopped on its [`CancelToken`].
    pub cancelled: bool,
}

/// Drives guided sampling for every image of a [`RunConfig`].
pub struct Orchestrator<'m> {
    cfg: RunConfig,
    resolution: Resolution,
    denoiser: &'m dyn Denoiser,
    perceptual: Option<&'m dyn PerceptualModel>,
    ctx: GuidanceContext,
    params: GuidanceParams,
    device: Device,
    cancel: CancelToken,
}

impl<'m> Orchestrator<'m> {
    /// Validate `cfg` and encode its prompts with every enabled embedding model. All
    /// configuration and collaborator errors surface here, before any sampling.
    #[tracing::instrument(skip_all, fields(models = cfg.clip_models.len()))]
    pub fn new(cfg: RunConfig, models: Collaborators<'m>, device: &Device) -> DiscoResult<Self> {
        cfg.validate()?;
        let resolution = cfg.resolution()?;
        let params = GuidanceParams::from_config(&cfg)?;
        let ctx = GuidanceContext::build(models.embedders, &cfg.clip_models, &cfg.prompts()?, device)?;
        if let Some(classes) = models.denoiser.num_classes()
            && classes == 0
        {
            return Err(DiscoError::model("class-conditional denoiser reports 0 classes"));
        }
        tracing::info!(
            width = resolution.width,
            height = resolution.height,
            steps = cfg.steps,
            sampler = ?cfg.diffusion_sampling_mode,
            perceptual = models.perceptual.is_some(),
            "run prepared"
        );
        Ok(Self {
            cfg,
            resolution,
            denoiser: models.denoiser,
            perceptual: models.perceptual,
            ctx,
            params,
            device: device.clone(),
            cancel: CancelToken::new(),
        })
    }

    /// Use `token` for cooperative cancellation instead of the orchestrator's own.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Handle that stops the run after the step in progress.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Validated configuration.
    pub fn config(&self) -> &RunConfig {
        &self.cfg
    }

    /// Output resolution after snapping.
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Encoded guidance targets.
    pub fn context(&self) -> &GuidanceContext {
        &self.ctx
    }

    /// The perceptual model, if one was supplied.
    pub fn perceptual(&self) -> Option<&'m dyn PerceptualModel> {
        self.perceptual
    }

    /// Generate every image of the batch in order. `sink.end` is called even when the run is
    /// cancelled or fails.
    #[tracing::instrument(skip_all, fields(batch_size = self.cfg.batch_size, steps = self.cfg.steps))]
    pub fn run(&self, sink: &mut dyn PreviewSink) -> DiscoResult<RunOutcome> {
        let base_seed = match self.cfg.seed {
            Some(seed) => seed,
            None => {
                let seed = u64::from(rand::random::<u32>());
                tracing::info!(seed, "no seed configured, drew a random one");
                seed
            }
        };
        sink.begin(PreviewConfig {
            resolution: self.resolution,
            batch_size: self.cfg.batch_size,
            steps: self.cfg.steps,
            batch_name: self.cfg.batch_name.clone(),
        })?;
        let outcome = self.run_batch(base_seed, sink);
        let ended = sink.end();
        let outcome = outcome?;
        ended?;
        Ok(outcome)
    }

    fn run_batch(&self, base_seed: u64, sink: &mut dyn PreviewSink) -> DiscoResult<RunOutcome> {
        let mut outcome = RunOutcome {
            base_seed,
            images: Vec::with_capacity(self.cfg.batch_size),
            cancelled: false,
        };
        for i in 0..self.cfg.batch_size {
            if self.cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }
            let index = BatchIndex(i);
            let seed = base_seed.wrapping_add(i as u64);
            if let Some(result) = self.run_image(index, seed, sink)? {
                let completed = result.completed;
                outcome.images.push(result);
                if !completed {
                    outcome.cancelled = true;
                    break;
                }
            } else {
                outcome.cancelled = true;
                break;
            }
        }
        Ok(outcome)
    }

    /// One guided sampling run. `None` when no step ran.
    #[tracing::instrument(skip(self, sink), fields(index = index.0))]
    fn run_image(
        &self,
        index: BatchIndex,
        seed: u64,
        sink: &mut dyn PreviewSink,
    ) -> DiscoResult<Option<ImageResult>> {
        let started = Instant::now();
        let cfg = &self.cfg;
        let init = if cfg.perlin_init {
            let mut rng = stream_rng(seed, RngStream::Perlin);
            Some(perlin_init(cfg.perlin_mode, self.resolution, 1, &mut rng, &self.device)?)
        } else {
            None
        };
        let options = SampleOptions {
            kind: cfg.diffusion_sampling_mode,
            eta: cfg.eta,
            skip_steps: cfg.skip_steps,
            clip_denoised: cfg.clip_denoised,
            randomize_class: cfg.randomize_class,
            shape: self.resolution.batch_shape(1),
            init,
        };

        let diffusion = GaussianDiffusion::new(cfg.steps)?;
        let mut guidance = GuidanceFn::new(
            &self.ctx,
            self.params.clone(),
            stream_rng(seed, RngStream::Cutouts),
        );
        let hook: &mut dyn CorrectionHook = &mut guidance;
        let steps = diffusion.sample_loop(
            self.denoiser,
            Some(hook),
            options,
            stream_rng(seed, RngStream::Sampler),
            &self.device,
        )?;

        let mut last: Option<RgbImage> = None;
        let mut completed = false;
        for (j, step) in steps.enumerate() {
            let step = step?;
            let is_last = step.steps_remaining.is_last();
            if j % cfg.display_rate == 0 || is_last {
                let frame = to_rgb8(&step.pred_xstart.i(0)?)?;
                sink.push_frame(index, step.steps_remaining, &frame)?;
                tracing::debug!(t = step.t, "preview captured");
                last = Some(frame);
            } else if self.cancel.is_cancelled() {
                last = Some(to_rgb8(&step.pred_xstart.i(0)?)?);
            }
            if is_last {
                completed = true;
                break;
            }
            if self.cancel.is_cancelled() {
                tracing::info!(t = step.t, "run cancelled");
                break;
            }
        }

        let Some(image) = last else {
            return Ok(None);
        };
        tracing::info!(
            seed,
            completed,
            zeroed_steps = guidance.zeroed_steps(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "image finished"
        );
        Ok(Some(ImageResult {
            index,
            seed,
            image,
            completed,
            losses: guidance.losses().to_vec(),
            zeroed_steps: guidance.zeroed_steps(),
        }))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/run/orchestrator.rs"]
mod tests;
