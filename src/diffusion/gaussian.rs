//! Discrete Gaussian diffusion with a linear beta schedule, respaced to the run's step count.

use candle_core::Tensor;

use crate::diffusion::model::Denoiser;
use crate::foundation::error::{DiscoError, DiscoResult};

/// Number of steps the denoisers were trained with.
pub const TRAINING_STEPS: usize = 1000;

const BETA_START: f64 = 0.0001;
const BETA_END: f64 = 0.02;

/// Output of one denoiser query.
#[derive(Clone, Debug)]
pub struct Prediction {
    /// Predicted noise.
    pub eps: Tensor,
    /// Implied clean image.
    pub pred_xstart: Tensor,
}

/// Respaced diffusion process.
///
/// The base process has `(1000 / steps) * steps` linearly spaced betas (or `steps` when
/// `steps >= 1000`) and keeps every stride-th timestep, so indices `0..steps` address the
/// retained timesteps in increasing noise order.
#[derive(Clone, Debug, PartialEq)]
pub struct GaussianDiffusion {
    alphas_cumprod: Vec<f64>,
    timestep_map: Vec<usize>,
    base_steps: usize,
}

fn linear_betas(n: usize) -> Vec<f64> {
    let scale = TRAINING_STEPS as f64 / n as f64;
    let (start, end) = (scale * BETA_START, scale * BETA_END);
    if n == 1 {
        return vec![start];
    }
    (0..n)
        .map(|i| start + (end - start) * i as f64 / (n - 1) as f64)
        .collect()
}

impl GaussianDiffusion {
    /// Build the process for a run of `steps` reverse steps.
    pub fn new(steps: usize) -> DiscoResult<Self> {
        if steps == 0 {
            return Err(DiscoError::config("diffusion steps must be > 0"));
        }
        let base_steps = if steps < TRAINING_STEPS {
            (TRAINING_STEPS / steps) * steps
        } else {
            steps
        };
        let stride = base_steps / steps;

        let mut cumprod = 1.0;
        let mut alphas_cumprod = Vec::with_capacity(steps);
        let mut timestep_map = Vec::with_capacity(steps);
        for (i, beta) in linear_betas(base_steps).into_iter().enumerate() {
            cumprod *= 1.0 - beta;
            if i % stride == 0 {
                alphas_cumprod.push(cumprod);
                timestep_map.push(i);
            }
        }
        Ok(Self {
            alphas_cumprod,
            timestep_map,
            base_steps,
        })
    }

    /// Number of retained timesteps.
    pub fn num_timesteps(&self) -> usize {
        self.alphas_cumprod.len()
    }

    /// Cumulative signal fraction at index `t`.
    pub fn alpha_bar(&self, t: usize) -> f64 {
        self.alphas_cumprod[t]
    }

    /// Cumulative signal fraction one step less noisy than `t` (1 before the first step).
    pub fn alpha_bar_prev(&self, t: usize) -> f64 {
        if t == 0 {
            1.0
        } else {
            self.alphas_cumprod[t - 1]
        }
    }

    /// Noise scale `sqrt(1 - alpha_bar)` at index `t`.
    pub fn sqrt_one_minus_alpha_bar(&self, t: usize) -> f64 {
        (1.0 - self.alpha_bar(t)).sqrt()
    }

    /// Timestep passed to the denoiser for index `t`, scaled to the training range.
    pub fn model_timestep(&self, t: usize) -> f64 {
        self.timestep_map[t] as f64 * TRAINING_STEPS as f64 / self.base_steps as f64
    }

    fn check_index(&self, t: usize) -> DiscoResult<()> {
        if t >= self.num_timesteps() {
            return Err(DiscoError::numerical(format!(
                "timestep {t} out of range 0..{}",
                self.num_timesteps()
            )));
        }
        Ok(())
    }

    /// `x0 = sqrt(1/ab) x - sqrt(1/ab - 1) eps`.
    pub fn xstart_from_eps(&self, x: &Tensor, t: usize, eps: &Tensor) -> DiscoResult<Tensor> {
        let ab = self.alpha_bar(t);
        Ok((x.affine((1.0 / ab).sqrt(), 0.0)? - eps.affine((1.0 / ab - 1.0).sqrt(), 0.0)?)?)
    }

    /// Inverse of [`Self::xstart_from_eps`].
    pub fn eps_from_xstart(&self, x: &Tensor, t: usize, xstart: &Tensor) -> DiscoResult<Tensor> {
        let ab = self.alpha_bar(t);
        let scaled = (x.affine((1.0 / ab).sqrt(), 0.0)? - xstart)?;
        Ok(scaled.affine(1.0 / (1.0 / ab - 1.0).sqrt(), 0.0)?)
    }

    /// Query the denoiser at index `t` and derive the clean-image estimate. Differentiable with
    /// respect to `x` when the denoiser is.
    pub fn predict(
        &self,
        model: &dyn Denoiser,
        x: &Tensor,
        t: usize,
        class_label: Option<&Tensor>,
    ) -> DiscoResult<Prediction> {
        self.check_index(t)?;
        let eps = model.forward(x, self.model_timestep(t), class_label)?;
        if eps.dims() != x.dims() {
            return Err(DiscoError::model(format!(
                "denoiser returned shape {:?} for input {:?}",
                eps.dims(),
                x.dims()
            )));
        }
        let pred_xstart = self.xstart_from_eps(x, t, &eps)?;
        Ok(Prediction { eps, pred_xstart })
    }

    /// Diffuse `x_start` forward to index `t` with the given noise.
    pub fn q_sample(&self, x_start: &Tensor, t: usize, noise: &Tensor) -> DiscoResult<Tensor> {
        self.check_index(t)?;
        let ab = self.alpha_bar(t);
        Ok((x_start.affine(ab.sqrt(), 0.0)? + noise.affine((1.0 - ab).sqrt(), 0.0)?)?)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/diffusion/gaussian.rs"]
mod tests;
