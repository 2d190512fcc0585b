use candle_core::backend::BackendStorage;
use candle_core::{CpuStorage, CustomOp1, Device, Layout, Shape, Tensor};

/// Element-wise arcsine with a backward pass, inputs expected in [-1, 1].
struct Asin;

impl CustomOp1 for Asin {
    fn name(&self) -> &'static str {
        "asin"
    }

    fn cpu_fwd(
        &self,
        storage: &CpuStorage,
        layout: &Layout,
    ) -> candle_core::Result<(CpuStorage, Shape)> {
        let Some((start, end)) = layout.contiguous_offsets() else {
            candle_core::bail!("asin expects a contiguous input");
        };
        let out = match storage {
            CpuStorage::F32(v) => CpuStorage::F32(v[start..end].iter().map(|x| x.asin()).collect()),
            CpuStorage::F64(v) => CpuStorage::F64(v[start..end].iter().map(|x| x.asin()).collect()),
            other => {
                return Err(candle_core::Error::UnsupportedDTypeForOp(
                    other.dtype(),
                    "asin",
                ));
            }
        };
        Ok((out, layout.shape().clone()))
    }

    fn bwd(
        &self,
        arg: &Tensor,
        _res: &Tensor,
        grad_res: &Tensor,
    ) -> candle_core::Result<Option<Tensor>> {
        let denom = arg.sqr()?.affine(-1.0, 1.0)?.sqrt()?;
        Ok(Some(grad_res.div(&denom)?))
    }
}

/// Differentiable `asin(x)`. Only a CPU kernel exists; other devices round-trip through host
/// memory.
pub(crate) fn asin(x: &Tensor) -> candle_core::Result<Tensor> {
    if x.device().is_cpu() {
        return x.contiguous()?.apply_op1(Asin);
    }
    let device = x.device().clone();
    asin(&x.to_device(&Device::Cpu)?)?.to_device(&device)
}

#[cfg(test)]
#[path = "../../tests/unit/loss/asin.rs"]
mod tests;
