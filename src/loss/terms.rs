use candle_core::{D, DType, Tensor};

use crate::config::run::LossWeights;
use crate::foundation::error::{DiscoError, DiscoResult};
use crate::loss::asin::asin;

const NORM_EPS: f64 = 1e-12;

fn l2_normalize(x: &Tensor) -> DiscoResult<Tensor> {
    let norm = x.sqr()?.sum_keepdim(D::Minus1)?.sqrt()?.maximum(NORM_EPS)?;
    Ok(x.broadcast_div(&norm)?)
}

/// Pairwise spherical distance `2 * asin(|a - b| / 2)^2` between unit-normalized rows.
///
/// `candidates` is `(a, d)` and `targets` is `(b, d)`; the result is `(a, b)`. Distances are 0
/// for parallel vectors and grow with the angle up to `pi^2 / 2` for opposite ones.
pub fn spherical_dist_loss(candidates: &Tensor, targets: &Tensor) -> DiscoResult<Tensor> {
    let (_, d) = candidates.dims2()?;
    let (_, dt) = targets.dims2()?;
    if d != dt {
        return Err(DiscoError::numerical(format!(
            "embedding width mismatch: {d} vs {dt}"
        )));
    }
    let a = l2_normalize(candidates)?.unsqueeze(1)?;
    let b = l2_normalize(targets)?.unsqueeze(0)?;
    let chord = a
        .broadcast_sub(&b)?
        .sqr()?
        .sum(D::Minus1)?
        .affine(1.0, NORM_EPS)?
        .sqrt()?;
    let half = chord.affine(0.5, 0.0)?.clamp(0.0, 1.0)?;
    Ok(asin(&half)?.sqr()?.affine(2.0, 0.0)?)
}

fn per_image_mean(x: &Tensor) -> DiscoResult<Tensor> {
    Ok(x.flatten_from(1)?.mean(1)?)
}

/// Squared right and below differences with replicated edges, averaged per image: `(n,)`.
pub fn tv_loss(x: &Tensor) -> DiscoResult<Tensor> {
    let (_, _, h, w) = x.dims4()?;
    let p = x.pad_with_same(3, 0, 1)?.pad_with_same(2, 0, 1)?;
    let base = p.narrow(2, 0, h)?.narrow(3, 0, w)?;
    let dx = (p.narrow(2, 0, h)?.narrow(3, 1, w)? - &base)?;
    let dy = (p.narrow(2, 1, h)?.narrow(3, 0, w)? - &base)?;
    per_image_mean(&(dx.sqr()? + dy.sqr()?)?)
}

fn excess(x: &Tensor) -> DiscoResult<Tensor> {
    Ok((x - x.clamp(-1.0, 1.0)?)?)
}

/// Mean squared excess outside [-1, 1] per image: `(n,)`.
pub fn range_loss(x: &Tensor) -> DiscoResult<Tensor> {
    per_image_mean(&excess(x)?.sqr()?)
}

/// Mean absolute excess outside [-1, 1] per image: `(n,)`.
pub fn sat_loss(x: &Tensor) -> DiscoResult<Tensor> {
    per_image_mean(&excess(x)?.abs()?)
}

/// Weighted auxiliary objective: smoothness and saturation on the blended estimate `x_in`, range
/// on the raw prediction `pred`. `None` when every auxiliary weight is zero.
pub fn aux_loss(x_in: &Tensor, pred: &Tensor, weights: &LossWeights) -> DiscoResult<Option<Tensor>> {
    let mut total: Option<Tensor> = None;
    let mut add = |term: Tensor| -> DiscoResult<()> {
        total = Some(match total.take() {
            Some(t) => (t + term)?,
            None => term,
        });
        Ok(())
    };
    if weights.tv_scale != 0.0 {
        add(tv_loss(x_in)?.sum_all()?.affine(f64::from(weights.tv_scale), 0.0)?)?;
    }
    if weights.range_scale != 0.0 {
        add(range_loss(pred)?.sum_all()?.affine(f64::from(weights.range_scale), 0.0)?)?;
    }
    if weights.sat_scale != 0.0 {
        add(sat_loss(x_in)?.mean_all()?.affine(f64::from(weights.sat_scale), 0.0)?)?;
    }
    Ok(total)
}

/// Read a scalar tensor as `f32`.
pub(crate) fn scalar(t: &Tensor) -> DiscoResult<f32> {
    Ok(t.to_dtype(DType::F32)?.to_scalar::<f32>()?)
}

#[cfg(test)]
#[path = "../../tests/unit/loss/terms.rs"]
mod tests;
