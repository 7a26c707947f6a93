use crate::error::Result;
use candle_core::Tensor;

/// Scaled cosine error between reconstruction and target rows
///
/// loss = mean_i (1 - cos(xhat(i,:), x(i,:)))^alpha
///
/// Invariant to positive rescaling of either argument; 0 when the rows
/// agree, 2^alpha when they are exactly opposite. `alpha >= 1` sharpens
/// the penalty on badly reconstructed rows.
///
/// * `recon_md` - reconstructed rows (m x d)
/// * `target_md` - original rows (m x d)
pub fn sce_loss(recon_md: &Tensor, target_md: &Tensor, alpha: f64) -> Result<Tensor> {
    let recon_norm = l2_normalize_rows(recon_md)?;
    let target_norm = l2_normalize_rows(target_md)?;

    let cos_m = recon_norm.mul(&target_norm)?.sum(1)?;
    Ok(cos_m.affine(-1.0, 1.0)?.powf(alpha)?.mean_all()?)
}

/// Mean squared error between reconstruction and target rows
pub fn mse_loss(recon_md: &Tensor, target_md: &Tensor) -> Result<Tensor> {
    Ok(recon_md.sub(target_md)?.powf(2.)?.mean_all()?)
}

/// Select the rows named by `node_ids` (u32 indices on the same device)
pub fn take_rows(x_nd: &Tensor, node_ids: &[usize]) -> Result<Tensor> {
    let ids: Vec<u32> = node_ids.iter().map(|&i| i as u32).collect();
    let ids = Tensor::from_vec(ids, (node_ids.len(),), x_nd.device())?;
    Ok(x_nd.index_select(&ids, 0)?)
}

fn l2_normalize_rows(x_md: &Tensor) -> Result<Tensor> {
    let norm_m1 = x_md
        .sqr()?
        .sum_keepdim(1)?
        .sqrt()?
        .clamp(1e-12, f64::INFINITY)?;
    Ok(x_md.broadcast_div(&norm_m1)?)
}
