//! Step-by-step reverse diffusion.
//!
//! [`SampleLoop`] is a pull-based iterator: each `next` performs exactly one reverse update and
//! yields the new sample with its clean-image estimate. Dropping the iterator abandons the run.

use candle_core::{DType, Tensor};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::config::run::SamplerKind;
use crate::diffusion::gaussian::{GaussianDiffusion, Prediction};
use crate::diffusion::model::Denoiser;
use crate::foundation::core::StepsRemaining;
use crate::foundation::error::{DiscoError, DiscoResult};
use crate::foundation::rng::randn_tensor;

/// PLMS history length.
const PLMS_ORDER: usize = 2;

/// What a [`CorrectionHook`] sees at one reverse step.
pub struct StepInput<'a> {
    /// Process being sampled.
    pub diffusion: &'a GaussianDiffusion,
    /// Denoiser driving the process.
    pub model: &'a dyn Denoiser,
    /// Current noisy batch.
    pub x: &'a Tensor,
    /// Timestep index.
    pub t: usize,
    /// Class label in effect for this step.
    pub class_label: Option<&'a Tensor>,
}

/// External correction applied to the score at every reverse step.
///
/// The returned tensor has the shape of `input.x` and points towards samples the hook prefers.
pub trait CorrectionHook {
    /// Gradient for one step.
    fn gradient(&mut self, input: StepInput<'_>) -> DiscoResult<Tensor>;
}

/// How a sampling run starts and proceeds.
#[derive(Clone, Debug)]
pub struct SampleOptions {
    /// Sampler variant.
    pub kind: SamplerKind,
    /// DDIM stochasticity (ignored by PLMS).
    pub eta: f64,
    /// Leading timesteps skipped.
    pub skip_steps: usize,
    /// Clamp clean-image estimates to [-1, 1].
    pub clip_denoised: bool,
    /// Draw a fresh class label every step for class-conditional denoisers.
    pub randomize_class: bool,
    /// `(n, 3, h, w)` batch shape.
    pub shape: (usize, usize, usize, usize),
    /// Image the run partially denoises from.
    pub init: Option<Tensor>,
}

/// One completed reverse step.
#[derive(Clone, Debug)]
pub struct SampleStep {
    /// Timestep index just processed.
    pub t: usize,
    /// Steps still to run after this one.
    pub steps_remaining: StepsRemaining,
    /// New, less noisy sample.
    pub sample: Tensor,
    /// Clean-image estimate at this step.
    pub pred_xstart: Tensor,
}

struct ModelOutput {
    eps: Tensor,
    pred_xstart: Tensor,
    orig_pred_xstart: Tensor,
}

/// Iterator over the reverse steps of one sampling run.
pub struct SampleLoop<'a> {
    diffusion: &'a GaussianDiffusion,
    model: &'a dyn Denoiser,
    hook: Option<&'a mut dyn CorrectionHook>,
    options: SampleOptions,
    rng: ChaCha8Rng,
    x: Tensor,
    next_t: Option<usize>,
    old_eps: Vec<Tensor>,
    failed: bool,
}

impl GaussianDiffusion {
    /// Start a reverse run from pure noise, or from `options.init` (zeros when skipping without
    /// one) diffused to the first retained timestep.
    pub fn sample_loop<'a>(
        &'a self,
        model: &'a dyn Denoiser,
        hook: Option<&'a mut dyn CorrectionHook>,
        options: SampleOptions,
        mut rng: ChaCha8Rng,
        device: &candle_core::Device,
    ) -> DiscoResult<SampleLoop<'a>> {
        let steps = self.num_timesteps();
        if options.skip_steps >= steps {
            return Err(DiscoError::config(format!(
                "skip_steps ({}) must be < steps ({steps})",
                options.skip_steps
            )));
        }
        let t0 = steps - options.skip_steps - 1;
        let noise = randn_tensor(&mut rng, options.shape, device)?;

        let init = match &options.init {
            Some(init) => {
                if init.dims4()? != options.shape {
                    return Err(DiscoError::config(format!(
                        "init image shape {:?} does not match {:?}",
                        init.dims(),
                        options.shape
                    )));
                }
                Some(init.to_dtype(DType::F32)?)
            }
            None if options.skip_steps > 0 => Some(noise.zeros_like()?),
            None => None,
        };
        let x = match init {
            Some(init) => self.q_sample(&init, t0, &noise)?,
            None => noise,
        };

        Ok(SampleLoop {
            diffusion: self,
            model,
            hook,
            options,
            rng,
            x,
            next_t: Some(t0),
            old_eps: Vec::new(),
            failed: false,
        })
    }
}

impl SampleLoop<'_> {
    /// Current noisy sample.
    pub fn current(&self) -> &Tensor {
        &self.x
    }

    fn class_label(&mut self) -> DiscoResult<Option<Tensor>> {
        if !self.options.randomize_class {
            return Ok(None);
        }
        let Some(classes) = self.model.num_classes() else {
            return Ok(None);
        };
        let n = self.options.shape.0;
        let labels: Vec<u32> = (0..n)
            .map(|_| self.rng.gen_range(0..classes as u32))
            .collect();
        Ok(Some(Tensor::from_vec(labels, n, self.x.device())?))
    }

    /// Denoiser output at `t`, corrected by the hook when one is installed.
    fn model_output(
        &mut self,
        x: &Tensor,
        t: usize,
        class_label: Option<&Tensor>,
    ) -> DiscoResult<ModelOutput> {
        let d = self.diffusion;
        let Prediction { pred_xstart, .. } = d.predict(self.model, x, t, class_label)?;
        let pred_xstart = if self.options.clip_denoised {
            pred_xstart.clamp(-1f32, 1f32)?
        } else {
            pred_xstart
        };
        let eps = d.eps_from_xstart(x, t, &pred_xstart)?;

        let Some(hook) = self.hook.as_deref_mut() else {
            return Ok(ModelOutput {
                eps,
                pred_xstart: pred_xstart.clone(),
                orig_pred_xstart: pred_xstart,
            });
        };
        let grad = hook
            .gradient(StepInput {
                diffusion: d,
                model: self.model,
                x,
                t,
                class_label,
            })?
            .detach();
        let eps = (eps - grad.affine(d.sqrt_one_minus_alpha_bar(t), 0.0)?)?;
        Ok(ModelOutput {
            pred_xstart: d.xstart_from_eps(x, t, &eps)?,
            eps,
            orig_pred_xstart: pred_xstart,
        })
    }

    fn mean_from(&self, pred_xstart: &Tensor, eps: &Tensor, t: usize) -> DiscoResult<Tensor> {
        let ab_prev = self.diffusion.alpha_bar_prev(t);
        Ok((pred_xstart.affine(ab_prev.sqrt(), 0.0)? + eps.affine((1.0 - ab_prev).sqrt(), 0.0)?)?)
    }

    fn ddim_step(&mut self, t: usize) -> DiscoResult<(Tensor, Tensor)> {
        let x = self.x.clone();
        let class_label = self.class_label()?;
        let out = self.model_output(&x, t, class_label.as_ref())?;

        let d = self.diffusion;
        let (ab, ab_prev) = (d.alpha_bar(t), d.alpha_bar_prev(t));
        let sigma = self.options.eta * ((1.0 - ab_prev) / (1.0 - ab)).sqrt() * (1.0 - ab / ab_prev).sqrt();
        let noise = randn_tensor(&mut self.rng, self.options.shape, x.device())?;
        let dir = (1.0 - ab_prev - sigma * sigma).max(0.0).sqrt();
        let mean = (out.pred_xstart.affine(ab_prev.sqrt(), 0.0)? + out.eps.affine(dir, 0.0)?)?;
        let sample = if t != 0 {
            (mean + noise.affine(sigma, 0.0)?)?
        } else {
            mean
        };
        Ok((sample, out.pred_xstart))
    }

    fn plms_step(&mut self, t: usize) -> DiscoResult<(Tensor, Tensor)> {
        let x = self.x.clone();
        let class_label = self.class_label()?;
        let out = self.model_output(&x, t, class_label.as_ref())?;
        let d = self.diffusion;

        let eps_prime = if self.old_eps.is_empty() && t > 0 {
            // Pseudo improved Euler: average with the slope at the predicted next point.
            let mean = self.mean_from(&out.pred_xstart, &out.eps, t)?;
            let ahead = self.model_output(&mean, t - 1, class_label.as_ref())?;
            self.old_eps.push(out.eps.clone());
            ((&out.eps + &ahead.eps)? * 0.5)?
        } else {
            self.old_eps.push(out.eps.clone());
            let e = &self.old_eps;
            let n = e.len();
            let eps_prime = match n.min(PLMS_ORDER) {
                1 => e[n - 1].clone(),
                _ => ((e[n - 1].affine(3.0, 0.0)? - &e[n - 2])? * 0.5)?,
            };
            if n >= PLMS_ORDER {
                self.old_eps.remove(0);
            }
            eps_prime
        };

        let pred_prime = d.xstart_from_eps(&x, t, &eps_prime)?;
        let sample = if t != 0 {
            self.mean_from(&pred_prime, &eps_prime, t)?
        } else {
            out.pred_xstart.clone()
        };
        Ok((sample, out.orig_pred_xstart))
    }
}

impl Iterator for SampleLoop<'_> {
    type Item = DiscoResult<SampleStep>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let t = self.next_t?;
        let result = match self.options.kind {
            SamplerKind::Ddim => self.ddim_step(t),
            SamplerKind::Plms => self.plms_step(t),
        };
        match result {
            Ok((sample, pred_xstart)) => {
                self.x = sample.clone();
                self.next_t = t.checked_sub(1);
                Some(Ok(SampleStep {
                    t,
                    steps_remaining: StepsRemaining(t),
                    sample,
                    pred_xstart,
                }))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/diffusion/sampler.rs"]
mod tests;
