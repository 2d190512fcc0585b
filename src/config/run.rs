use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::config::prompt::{WeightedPrompt, parse_prompt};
use crate::config::schedule::{CutoutSchedule, ResolvedCutoutSchedule};
use crate::foundation::core::Resolution;
use crate::foundation::error::{DiscoError, DiscoResult};

/// Reverse-diffusion sampler variant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplerKind {
    /// Deterministic-to-stochastic DDIM, controlled by `eta`.
    #[default]
    Ddim,
    /// Second-order pseudo linear multistep.
    Plms,
}

/// Channel layout of the two Perlin fields used for initialization.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerlinMode {
    /// Both fields in color.
    Color,
    /// Both fields grayscale.
    Gray,
    /// Coarse field in color, fine field grayscale.
    #[default]
    Mixed,
}

/// Cutout generator used by semantic guidance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CutoutMode {
    /// Scheduled overview views plus inner crops.
    #[default]
    OverviewInner,
    /// Augmented random crops; the step's `cut_overview + cut_innercut` sets how many.
    RandomCrop,
}

/// Per-term loss weights. A zero weight disables its term.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LossWeights {
    /// Scale of the semantic (embedding distance) term.
    pub clip_guidance_scale: f32,
    /// Scale of the total-variation smoothness term.
    pub tv_scale: f32,
    /// Scale of the out-of-range term on the raw prediction.
    pub range_scale: f32,
    /// Scale of the saturation term.
    pub sat_scale: f32,
}

impl Default for LossWeights {
    fn default() -> Self {
        Self {
            clip_guidance_scale: 5000.0,
            tv_scale: 0.0,
            range_scale: 150.0,
            sat_scale: 0.0,
        }
    }
}

/// Immutable parameter set for one generation run.
///
/// JSON field names follow the established parameter names (`text_prompts`, `cut_overview`,
/// `clamp_max`, ...). Every field has a default, so `{}` is a valid configuration.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Prompts, each optionally suffixed `:weight`.
    pub text_prompts: Vec<String>,
    /// Requested output size; snapped down to multiples of 64.
    pub width_height: [u32; 2],
    /// Total reverse-diffusion steps.
    pub steps: usize,
    /// Leading steps skipped (partial denoising from the init image).
    pub skip_steps: usize,
    /// Loss term weights.
    #[serde(flatten)]
    pub weights: LossWeights,
    /// Exponent shaping inner-crop sizes (`rand()^pow`).
    pub cut_ic_pow: f64,
    /// Cutout schedules.
    #[serde(flatten)]
    pub cutouts: CutoutSchedule,
    /// Cutout generator.
    pub cutout_mode: CutoutMode,
    /// Repetitions of the cutout/embed pass per model and step; gradients are averaged.
    pub cutn_batches: usize,
    /// Sampler variant.
    pub diffusion_sampling_mode: SamplerKind,
    /// DDIM stochasticity.
    pub eta: f64,
    /// Start from a Perlin noise image.
    pub perlin_init: bool,
    /// Perlin channel layout.
    pub perlin_mode: PerlinMode,
    /// Base seed; a random one is drawn (and logged) when absent.
    pub seed: Option<u64>,
    /// Rescale gradients whose RMS exceeds `clamp_max`.
    pub clamp_grad: bool,
    /// RMS ceiling for guidance gradients.
    pub clamp_max: f32,
    /// Draw a random class label per step for class-conditional denoisers.
    pub randomize_class: bool,
    /// Clamp the sampler's `pred_xstart` to [-1, 1].
    pub clip_denoised: bool,
    /// Capture a preview every `display_rate` steps.
    pub display_rate: usize,
    /// Number of images generated sequentially.
    pub batch_size: usize,
    /// Name prefix for exported previews.
    pub batch_name: String,
    /// Enabled embedding-model ids.
    pub clip_models: Vec<String>,
    /// Disable cutout augmentations.
    pub skip_augs: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            text_prompts: vec![
                "A beautiful painting of a singular lighthouse, Trending on artstation.".to_owned(),
            ],
            width_height: [1280, 768],
            steps: 250,
            skip_steps: 10,
            weights: LossWeights::default(),
            cut_ic_pow: 1.0,
            cutouts: CutoutSchedule::default(),
            cutout_mode: CutoutMode::OverviewInner,
            cutn_batches: 4,
            diffusion_sampling_mode: SamplerKind::Ddim,
            eta: 0.8,
            perlin_init: false,
            perlin_mode: PerlinMode::Mixed,
            seed: None,
            clamp_grad: true,
            clamp_max: 0.05,
            randomize_class: true,
            clip_denoised: false,
            display_rate: 10,
            batch_size: 1,
            batch_name: String::new(),
            clip_models: vec!["ViTB32".to_owned(), "ViTB16".to_owned(), "RN50".to_owned()],
            skip_augs: false,
        }
    }
}

impl RunConfig {
    /// Parse a configuration from a JSON reader.
    pub fn from_reader<R: std::io::Read>(r: R) -> DiscoResult<Self> {
        serde_json::from_reader(r)
            .map_err(|e| DiscoError::serde(format!("parse run config JSON: {e}")))
    }

    /// Parse a configuration from a JSON file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> DiscoResult<Self> {
        let path = path.as_ref();
        let f = File::open(path)
            .map_err(|e| DiscoError::io(format!("open run config '{}': {e}", path.display())))?;
        Self::from_reader(BufReader::new(f))
    }

    /// Output resolution after snapping to multiples of 64.
    pub fn resolution(&self) -> DiscoResult<Resolution> {
        Resolution::new(self.width_height[0], self.width_height[1])?.snapped()
    }

    /// Parse every prompt's weight suffix.
    pub fn prompts(&self) -> DiscoResult<Vec<WeightedPrompt>> {
        if self.text_prompts.is_empty() {
            return Err(DiscoError::config("at least one text prompt is required"));
        }
        self.text_prompts.iter().map(|p| parse_prompt(p)).collect()
    }

    /// Cutout schedule expanded to exactly `steps` entries.
    pub fn cutout_schedule(&self) -> DiscoResult<ResolvedCutoutSchedule> {
        self.cutouts.resolve(self.steps)
    }

    /// Check every invariant that can be checked without models.
    pub fn validate(&self) -> DiscoResult<()> {
        if self.steps == 0 {
            return Err(DiscoError::config("steps must be > 0"));
        }
        if self.skip_steps >= self.steps {
            return Err(DiscoError::config(format!(
                "skip_steps ({}) must be < steps ({})",
                self.skip_steps, self.steps
            )));
        }
        if self.cutn_batches == 0 {
            return Err(DiscoError::config("cutn_batches must be > 0"));
        }
        if self.batch_size == 0 {
            return Err(DiscoError::config("batch_size must be > 0"));
        }
        if self.display_rate == 0 {
            return Err(DiscoError::config("display_rate must be > 0"));
        }
        if !self.clamp_max.is_finite() || self.clamp_max <= 0.0 {
            return Err(DiscoError::config("clamp_max must be finite and > 0"));
        }
        if !self.eta.is_finite() || self.eta < 0.0 {
            return Err(DiscoError::config("eta must be finite and >= 0"));
        }
        if !self.cut_ic_pow.is_finite() || self.cut_ic_pow < 0.0 {
            return Err(DiscoError::config("cut_ic_pow must be finite and >= 0"));
        }
        let w = self.weights;
        for (name, v) in [
            ("clip_guidance_scale", w.clip_guidance_scale),
            ("tv_scale", w.tv_scale),
            ("range_scale", w.range_scale),
            ("sat_scale", w.sat_scale),
        ] {
            if !v.is_finite() {
                return Err(DiscoError::config(format!("{name} must be finite")));
            }
        }
        if self.clip_models.is_empty() {
            return Err(DiscoError::config("at least one embedding model must be enabled"));
        }
        self.resolution()?;
        self.prompts()?;
        self.cutout_schedule()?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/config/run.rs"]
mod tests;
