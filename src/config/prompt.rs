use crate::foundation::error::{DiscoError, DiscoResult};

/// Weight sums with an absolute value below this are rejected by [`normalize_weights`].
pub const MIN_WEIGHT_SUM: f32 = 1e-3;

/// A text prompt with its guidance weight, as written by the user (`"text:weight"`).
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WeightedPrompt {
    /// Prompt text with the weight suffix removed.
    pub text: String,
    /// Signed weight; negative weights push away from the prompt.
    pub weight: f32,
}

impl std::str::FromStr for WeightedPrompt {
    type Err = DiscoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_prompt(s)
    }
}

/// Split an optional `:weight` suffix off a prompt.
///
/// Only the last colon-delimited segment can be a weight. For `http://` and `https://` prompts the
/// scheme separator is never treated as one, so `"http://x.com/a:b.png:3"` keeps the whole URL.
pub fn parse_prompt(prompt: &str) -> DiscoResult<WeightedPrompt> {
    let is_url = prompt.starts_with("http://") || prompt.starts_with("https://");
    let split = if is_url {
        // The scheme's colon is the first one; any weight must come after at least one more.
        let scheme_end = prompt.find(':').unwrap_or(0) + 1;
        prompt[scheme_end..]
            .rfind(':')
            .map(|i| (&prompt[..scheme_end + i], &prompt[scheme_end + i + 1..]))
    } else {
        prompt.rsplit_once(':')
    };

    let Some((text, weight)) = split else {
        return Ok(WeightedPrompt {
            text: prompt.to_owned(),
            weight: 1.0,
        });
    };

    let weight = weight.trim().parse::<f32>().map_err(|e| {
        DiscoError::config(format!("prompt '{prompt}': weight '{weight}' is not a number: {e}"))
    })?;
    if !weight.is_finite() {
        return Err(DiscoError::config(format!(
            "prompt '{prompt}': weight must be finite"
        )));
    }
    Ok(WeightedPrompt {
        text: text.to_owned(),
        weight,
    })
}

/// Scale weights so their signed sum has absolute value 1.
pub fn normalize_weights(weights: &[f32]) -> DiscoResult<Vec<f32>> {
    if weights.is_empty() {
        return Err(DiscoError::config("at least one prompt is required"));
    }
    let sum: f32 = weights.iter().sum();
    if sum.abs() < MIN_WEIGHT_SUM {
        return Err(DiscoError::config(format!(
            "prompt weights must not sum to 0 (got {sum})"
        )));
    }
    let denom = sum.abs();
    Ok(weights.iter().map(|w| w / denom).collect())
}

#[cfg(test)]
#[path = "../../tests/unit/config/prompt.rs"]
mod tests;
