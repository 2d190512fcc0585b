use candle_core::{DType, Tensor, Var};
use rand_chacha::ChaCha8Rng;

use crate::config::run::{CutoutMode, LossWeights, RunConfig};
use crate::config::schedule::ResolvedCutoutSchedule;
use crate::cutouts::Cutouts;
use crate::cutouts::overview::OverviewInnerCutouts;
use crate::cutouts::random_crop::RandomCropCutouts;
use crate::diffusion::sampler::{CorrectionHook, StepInput};
use crate::foundation::core::StepsRemaining;
use crate::foundation::error::{DiscoError, DiscoResult};
use crate::guidance::context::{GuidanceContext, ModelGuidanceState};
use crate::image::ops::normalize_channels;
use crate::loss::terms::{aux_loss, scalar, spherical_dist_loss};

/// Per-channel mean of the embedding models' training images.
pub const CLIP_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];
/// Per-channel standard deviation of the embedding models' training images.
pub const CLIP_STD: [f32; 3] = [0.268_629_54, 0.261_302_58, 0.275_777_11];

/// Guidance settings taken from a [`RunConfig`].
#[derive(Clone, Debug, PartialEq)]
pub struct GuidanceParams {
    /// Loss term weights.
    pub weights: LossWeights,
    /// Cutout passes per model and step.
    pub cutn_batches: usize,
    /// Inner-crop size exponent.
    pub cut_ic_pow: f64,
    /// Rescale gradients above `clamp_max` RMS.
    pub clamp_grad: bool,
    /// RMS ceiling.
    pub clamp_max: f32,
    /// Disable cutout augmentation.
    pub skip_augs: bool,
    /// Cutout generator.
    pub cutout_mode: CutoutMode,
    /// Cutout counts per step.
    pub schedule: ResolvedCutoutSchedule,
}

impl GuidanceParams {
    /// Extract and validate guidance settings.
    pub fn from_config(cfg: &RunConfig) -> DiscoResult<Self> {
        if cfg.cutn_batches == 0 {
            return Err(DiscoError::config("cutn_batches must be > 0"));
        }
        Ok(Self {
            weights: cfg.weights,
            cutn_batches: cfg.cutn_batches,
            cut_ic_pow: cfg.cut_ic_pow,
            clamp_grad: cfg.clamp_grad,
            clamp_max: cfg.clamp_max,
            skip_augs: cfg.skip_augs,
            cutout_mode: cfg.cutout_mode,
            schedule: cfg.cutout_schedule()?,
        })
    }
}

/// Scale `grad` so its RMS does not exceed `max`, keeping its direction. Zero gradients pass
/// through unchanged.
pub fn clamp_gradient(grad: &Tensor, max: f32) -> DiscoResult<Tensor> {
    let magnitude = f64::from(scalar(&grad.sqr()?.mean_all()?.sqrt()?)?);
    if magnitude == 0.0 || !magnitude.is_finite() {
        return Ok(grad.clone());
    }
    let factor = magnitude.min(f64::from(max)) / magnitude;
    Ok(grad.affine(factor, 0.0)?)
}

fn all_finite(t: &Tensor) -> DiscoResult<bool> {
    let v = t.flatten_all()?.to_dtype(DType::F32)?.to_vec1::<f32>()?;
    Ok(v.iter().all(|x| x.is_finite()))
}

/// Steering gradient for one sampling run.
///
/// Scores cutouts of the blended clean estimate against every model's prompts, adds the
/// auxiliary regularizers and differentiates through the denoiser back to the noisy sample.
/// Semantic loss values are appended to [`GuidanceFn::losses`].
pub struct GuidanceFn<'c> {
    ctx: &'c GuidanceContext,
    params: GuidanceParams,
    rng: ChaCha8Rng,
    losses: Vec<f32>,
    zeroed_steps: usize,
}

impl<'c> GuidanceFn<'c> {
    /// Create a guidance function drawing cutouts from `rng`.
    pub fn new(ctx: &'c GuidanceContext, params: GuidanceParams, rng: ChaCha8Rng) -> Self {
        Self {
            ctx,
            params,
            rng,
            losses: Vec::new(),
            zeroed_steps: 0,
        }
    }

    /// Semantic loss of every model and cutout batch so far, in evaluation order.
    pub fn losses(&self) -> &[f32] {
        &self.losses
    }

    /// Steps whose gradient was non-finite and replaced by zeros.
    pub fn zeroed_steps(&self) -> usize {
        self.zeroed_steps
    }

    /// Gradient of the scaled semantic loss with respect to `x_in`, one model at a time.
    fn semantic_gradient(
        &mut self,
        state: &ModelGuidanceState,
        x_in: &Var,
        remaining: StepsRemaining,
    ) -> DiscoResult<Option<Tensor>> {
        let params = self.params.schedule.at(remaining);
        let cut_size = state.model().input_resolution();
        let cutter: Box<dyn Cutouts> = match self.params.cutout_mode {
            CutoutMode::OverviewInner => Box::new(OverviewInnerCutouts::new(
                cut_size,
                params,
                self.params.cut_ic_pow,
                self.params.skip_augs,
            )?),
            CutoutMode::RandomCrop => Box::new(RandomCropCutouts::new(
                cut_size,
                params.total(),
                self.params.skip_augs,
            )?),
        };
        let n = x_in.as_tensor().dim(0)?;
        let prompts = state.weights().dim(0)?;
        let scale = f64::from(self.params.weights.clip_guidance_scale)
            / self.params.cutn_batches as f64;

        let mut acc: Option<Tensor> = None;
        for _ in 0..self.params.cutn_batches {
            let unit = x_in.as_tensor().affine(0.5, 0.5)?;
            let cuts = cutter.cut(&unit, &mut self.rng)?;
            let clip_in = normalize_channels(&cuts, CLIP_MEAN, CLIP_STD)?;
            let image_embeds = state
                .model()
                .encode_image(&clip_in)
                .map_err(|e| DiscoError::model(format!("{}: encode image: {e}", state.model().id())))?
                .to_dtype(DType::F32)?;
            let dists = spherical_dist_loss(&image_embeds, state.target_embeds())?
                .reshape((cutter.count(), n, prompts))?;
            let losses = dists
                .broadcast_mul(state.weights())?
                .sum(2)?
                .mean(0)?;
            let total = losses.sum_all()?;
            self.losses.push(scalar(&total)?);

            let grads = total.affine(scale, 0.0)?.backward()?;
            let g = grads
                .get(x_in.as_tensor())
                .ok_or_else(|| DiscoError::model("embedding model is not differentiable"))?
                .detach();
            acc = Some(match acc {
                Some(a) => (a + g)?,
                None => g,
            });
        }
        Ok(acc)
    }
}

impl CorrectionHook for GuidanceFn<'_> {
    #[tracing::instrument(skip_all, fields(t = input.t))]
    fn gradient(&mut self, input: StepInput<'_>) -> DiscoResult<Tensor> {
        let StepInput {
            diffusion,
            model,
            x,
            t,
            class_label,
        } = input;
        let x_var = Var::from_tensor(&x.detach())?;
        let pred = diffusion.predict(model, x_var.as_tensor(), t, class_label)?;
        let fac = diffusion.sqrt_one_minus_alpha_bar(t);
        let x_in = (pred.pred_xstart.affine(fac, 0.0)? + x_var.as_tensor().affine(1.0 - fac, 0.0)?)?;

        // Semantic gradient with respect to the blended estimate.
        let x_in_leaf = Var::from_tensor(&x_in.detach())?;
        let ctx = self.ctx;
        let mut x_in_grad: Option<Tensor> = None;
        for state in ctx.states() {
            if let Some(g) = self.semantic_gradient(state, &x_in_leaf, StepsRemaining(t))? {
                x_in_grad = Some(match x_in_grad {
                    Some(a) => (a + g)?,
                    None => g,
                });
            }
        }
        if let Some(g) = &x_in_grad
            && !all_finite(g)?
        {
            tracing::warn!(t, "non-finite semantic gradient, skipping guidance for this step");
            self.zeroed_steps += 1;
            return Ok(x.zeros_like()?);
        }

        // Chain the semantic gradient through the blend and the denoiser, together with the
        // auxiliary terms.
        let mut objective = aux_loss(&x_in, &pred.pred_xstart, &self.params.weights)?;
        if let Some(g) = &x_in_grad {
            let surrogate = (&x_in * g)?.sum_all()?;
            objective = Some(match objective {
                Some(o) => (o + surrogate)?,
                None => surrogate,
            });
        }
        let Some(objective) = objective else {
            return Ok(x.zeros_like()?);
        };
        let grads = objective.backward()?;
        let grad = grads
            .get(x_var.as_tensor())
            .ok_or_else(|| DiscoError::numerical("guidance objective does not depend on the sample"))?
            .neg()?
            .detach();

        if !all_finite(&grad)? {
            tracing::warn!(t, "non-finite guidance gradient, skipping guidance for this step");
            self.zeroed_steps += 1;
            return Ok(x.zeros_like()?);
        }
        if let Some(last) = self.losses.last() {
            tracing::debug!(t, loss = last, "guidance step");
        }
        if self.params.clamp_grad {
            clamp_gradient(&grad, self.params.clamp_max)
        } else {
            Ok(grad)
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/guidance/function.rs"]
mod tests;
