use anyhow::Result;
use candle_core::Tensor;

/// Added to the norm so an all-zero vector stays finite.
pub const NORM_EPS: f64 = 1e-10;

/// Classification token of a `[B, T, H]` hidden state, divided by `‖v‖ + 1e-10`. Returns `[B, H]`.
pub fn cls_l2(hidden: &Tensor) -> Result<Tensor> {
    let dims = hidden.dims();
    anyhow::ensure!(dims.len() == 3, "hidden shape must be [B,T,H], got {:?}", dims);
    let cls = hidden.narrow(1, 0, 1)?.squeeze(1)?;
    let norm = (cls.sqr()?.sum_keepdim(1)?.sqrt()? + NORM_EPS)?;
    Ok(cls.broadcast_div(&norm)?)
}
