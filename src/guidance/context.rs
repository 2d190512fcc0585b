use std::sync::Arc;

use candle_core::{DType, Device, Tensor};

use crate::config::prompt::{WeightedPrompt, normalize_weights};
use crate::diffusion::model::EmbeddingModel;
use crate::foundation::error::{DiscoError, DiscoResult};

/// One embedding model with its encoded prompts.
#[derive(Clone)]
pub struct ModelGuidanceState {
    model: Arc<dyn EmbeddingModel>,
    target_embeds: Tensor,
    weights: Tensor,
}

impl std::fmt::Debug for ModelGuidanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelGuidanceState")
            .field("model", &self.model.id())
            .field("target_embeds", &self.target_embeds.dims())
            .field("weights", &self.weights.dims())
            .finish()
    }
}

impl ModelGuidanceState {
    /// Encode every prompt with `model` and normalize the weights.
    pub fn new(
        model: Arc<dyn EmbeddingModel>,
        prompts: &[WeightedPrompt],
        device: &Device,
    ) -> DiscoResult<Self> {
        let raw: Vec<f32> = prompts.iter().map(|p| p.weight).collect();
        let weights = normalize_weights(&raw)?;

        let mut embeds = Vec::with_capacity(prompts.len());
        for prompt in prompts {
            let e = model.encode_text(&prompt.text).map_err(|e| {
                DiscoError::model(format!(
                    "{}: encode prompt '{}': {e}",
                    model.id(),
                    prompt.text
                ))
            })?;
            embeds.push(e.flatten_all()?.to_dtype(DType::F32)?.unsqueeze(0)?);
        }
        let target_embeds = Tensor::cat(&embeds, 0)?.detach();
        let weights = Tensor::from_vec(weights, prompts.len(), device)?;
        Ok(Self {
            model,
            target_embeds,
            weights,
        })
    }

    /// The embedding model.
    pub fn model(&self) -> &dyn EmbeddingModel {
        self.model.as_ref()
    }

    /// `(prompts, d)` target embeddings.
    pub fn target_embeds(&self) -> &Tensor {
        &self.target_embeds
    }

    /// `(prompts,)` weights with unit absolute sum.
    pub fn weights(&self) -> &Tensor {
        &self.weights
    }
}

/// Guidance states for every enabled model, built once per run and shared by all steps and
/// batch elements.
#[derive(Clone, Debug)]
pub struct GuidanceContext {
    states: Vec<ModelGuidanceState>,
}

impl GuidanceContext {
    /// Select the `enabled` models (by id, in that order) from `available` and encode `prompts`
    /// with each. Unknown ids are a configuration error.
    #[tracing::instrument(skip_all, fields(models = enabled.len(), prompts = prompts.len()))]
    pub fn build(
        available: &[Arc<dyn EmbeddingModel>],
        enabled: &[String],
        prompts: &[WeightedPrompt],
        device: &Device,
    ) -> DiscoResult<Self> {
        if enabled.is_empty() {
            return Err(DiscoError::config("no embedding model enabled"));
        }
        let states = enabled
            .iter()
            .map(|id| {
                let model = available.iter().find(|m| m.id() == id).ok_or_else(|| {
                    let known: Vec<&str> = available.iter().map(|m| m.id()).collect();
                    DiscoError::config(format!(
                        "unknown embedding model '{id}' (available: {})",
                        known.join(", ")
                    ))
                })?;
                tracing::debug!(model = %id, "encoding prompts");
                ModelGuidanceState::new(Arc::clone(model), prompts, device)
            })
            .collect::<DiscoResult<Vec<_>>>()?;
        Ok(Self { states })
    }

    /// Per-model states in configuration order.
    pub fn states(&self) -> &[ModelGuidanceState] {
        &self.states
    }
}

#[cfg(test)]
#[path = "../../tests/unit/guidance/context.rs"]
mod tests;
