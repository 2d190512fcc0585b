use candle_core::{DType, Device, Tensor};
use rand_chacha::ChaCha8Rng;

use crate::foundation::error::{DiscoError, DiscoResult};
use crate::foundation::rng::randn_tensor;

/// ITU-R 601 luma weights used for every grayscale conversion.
pub const LUMA: [f32; 3] = [0.2989, 0.587, 0.114];

fn channel_vector(values: [f32; 3], like: &Tensor) -> DiscoResult<Tensor> {
    Ok(Tensor::from_vec(values.to_vec(), (1, 3, 1, 1), like.device())?.to_dtype(like.dtype())?)
}

fn expect_rgb(x: &Tensor) -> DiscoResult<(usize, usize, usize, usize)> {
    let dims = x.dims4()?;
    if dims.1 != 3 {
        return Err(DiscoError::numerical(format!(
            "expected 3 channels, got {}",
            dims.1
        )));
    }
    Ok(dims)
}

/// Mirror an `(n, c, h, w)` batch left to right.
pub fn hflip(x: &Tensor) -> DiscoResult<Tensor> {
    let w = x.dim(3)?;
    let idx: Vec<u32> = (0..w as u32).rev().collect();
    let idx = Tensor::from_vec(idx, w, x.device())?;
    Ok(x.contiguous()?.index_select(&idx, 3)?)
}

/// Luma of an RGB batch replicated to three channels.
pub fn grayscale(x: &Tensor) -> DiscoResult<Tensor> {
    let dims = expect_rgb(x)?;
    let luma = x
        .broadcast_mul(&channel_vector(LUMA, x)?)?
        .sum_keepdim(1)?;
    Ok(luma.broadcast_as(dims)?.contiguous()?)
}

/// Zero-pad every side by `amount` pixels.
pub fn pad_uniform(x: &Tensor, amount: usize) -> DiscoResult<Tensor> {
    if amount == 0 {
        return Ok(x.clone());
    }
    Ok(x
        .pad_with_zeros(2, amount, amount)?
        .pad_with_zeros(3, amount, amount)?)
}

/// Zero-pad the shorter spatial side so the image becomes (nearly) square; odd differences leave
/// the far side one pixel short, which later resizing absorbs.
pub fn pad_to_square(x: &Tensor) -> DiscoResult<Tensor> {
    let (_, _, h, w) = x.dims4()?;
    let half = h.abs_diff(w) / 2;
    if h < w {
        Ok(x.pad_with_zeros(2, half, half)?)
    } else {
        Ok(x.pad_with_zeros(3, half, half)?)
    }
}

/// Square crop of side `size` with top-left corner at (`top`, `left`), copied into contiguous
/// storage so gathers downstream accept it.
pub fn crop_square(x: &Tensor, top: usize, left: usize, size: usize) -> DiscoResult<Tensor> {
    Ok(x.narrow(2, top, size)?.narrow(3, left, size)?.contiguous()?)
}

/// Add zero-mean Gaussian noise with standard deviation `std`.
pub fn add_noise(x: &Tensor, std: f64, rng: &mut ChaCha8Rng) -> DiscoResult<Tensor> {
    let noise = randn_tensor(rng, x.shape().clone(), x.device())?.to_dtype(x.dtype())?;
    Ok((x + noise.affine(std, 0.0)?)?)
}

/// Per-channel `(x - mean) / std` normalization.
pub fn normalize_channels(x: &Tensor, mean: [f32; 3], std: [f32; 3]) -> DiscoResult<Tensor> {
    expect_rgb(x)?;
    Ok(x
        .broadcast_sub(&channel_vector(mean, x)?)?
        .broadcast_div(&channel_vector(std, x)?)?)
}

/// Convert one `(3, h, w)` image in [-1, 1] to 8-bit RGB.
pub fn to_rgb8(img: &Tensor) -> DiscoResult<image::RgbImage> {
    let (c, h, w) = img.dims3()?;
    if c != 3 {
        return Err(DiscoError::numerical("to_rgb8 expects a (3, h, w) image"));
    }
    let planes = img
        .to_dtype(DType::F32)?
        .affine(0.5, 0.5)?
        .clamp(0f32, 1f32)?
        .flatten_all()?
        .to_vec1::<f32>()?;
    let plane = h * w;
    let mut out = image::RgbImage::new(w as u32, h as u32);
    for (i, px) in out.pixels_mut().enumerate() {
        for ch in 0..3 {
            px.0[ch] = (planes[ch * plane + i] * 255.0).round() as u8;
        }
    }
    Ok(out)
}

/// Convert an 8-bit RGB image to a `(1, 3, h, w)` tensor in [0, 1].
pub fn from_rgb8(img: &image::RgbImage, device: &Device) -> DiscoResult<Tensor> {
    let (w, h) = (img.width() as usize, img.height() as usize);
    let plane = h * w;
    let mut data = vec![0f32; 3 * plane];
    for (i, px) in img.pixels().enumerate() {
        for ch in 0..3 {
            data[ch * plane + i] = f32::from(px.0[ch]) / 255.0;
        }
    }
    Ok(Tensor::from_vec(data, (1, 3, h, w), device)?)
}

#[cfg(test)]
#[path = "../../tests/unit/image/ops.rs"]
mod tests;
