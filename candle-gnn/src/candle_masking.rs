use crate::error::Result;
use candle_core::Tensor;
use rand::rngs::StdRng;
use rand::Rng;

/// Which nodes were corrupted in one training step, and how.
///
/// Ephemeral: re-drawn every step, consumed by the reconstruction loss.
#[derive(Debug, Default, Clone)]
pub struct MaskRecord {
    /// all corrupted node ids (token-masked ++ replaced)
    pub masked: Vec<usize>,
    /// ids zeroed and offset by the mask token
    pub token_masked: Vec<usize>,
    /// ids whose features were swapped with another random node's
    pub replaced: Vec<usize>,
}

impl MaskRecord {
    pub fn is_empty(&self) -> bool {
        self.masked.is_empty()
    }

    pub fn len(&self) -> usize {
        self.masked.len()
    }
}

/// Corrupt a feature matrix for one training step.
///
/// Draws `round(mask_rate * n)` node ids without replacement. Of those,
/// `round(replace_rate * k)` receive another random node's feature row;
/// the rest are zeroed and offset by the trainable `mask_token` row, so
/// gradients flow into the token. Pure given the `rng` state; the input
/// matrix is untouched.
///
/// * `x_nd` - original features (n x d)
/// * `mask_token` - trainable token (1 x d)
///
/// Returns `(corrupted features, mask record)`.
pub fn corrupt_features(
    x_nd: &Tensor,
    mask_token: &Tensor,
    mask_rate: f32,
    replace_rate: f32,
    rng: &mut StdRng,
) -> Result<(Tensor, MaskRecord)> {
    let (nn, _dd) = x_nd.dims2()?;
    let num_mask = (mask_rate * nn as f32).round() as usize;

    if num_mask == 0 {
        return Ok((x_nd.clone(), MaskRecord::default()));
    }

    let drawn = rand::seq::index::sample(rng, nn, num_mask).into_vec();
    let num_replace = (replace_rate * num_mask as f32).round() as usize;
    let split = num_mask - num_replace;
    let token_masked = drawn[..split].to_vec();
    let replaced = drawn[split..].to_vec();

    let mut src_map: Vec<u32> = (0..nn as u32).collect();
    for &i in replaced.iter() {
        src_map[i] = rng.random_range(0..nn) as u32;
    }

    let device = x_nd.device();
    let src_map = Tensor::from_vec(src_map, (nn,), device)?;
    let x_base = x_nd.index_select(&src_map, 0)?;

    let mut token_ind = vec![0_f32; nn];
    for &i in token_masked.iter() {
        token_ind[i] = 1.0;
    }
    let ind_n1 = Tensor::from_vec(token_ind, (nn, 1), device)?;
    let keep_n1 = ind_n1.affine(-1.0, 1.0)?;

    let x_corrupt = x_base
        .broadcast_mul(&keep_n1)?
        .broadcast_add(&ind_n1.broadcast_mul(mask_token)?)?;

    Ok((
        x_corrupt,
        MaskRecord {
            masked: drawn,
            token_masked,
            replaced,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;
    use rand::SeedableRng;

    fn features(nn: usize, dd: usize) -> Tensor {
        let data: Vec<f32> = (0..nn * dd).map(|x| x as f32 + 1.0).collect();
        Tensor::from_vec(data, (nn, dd), &Device::Cpu).unwrap()
    }

    #[test]
    fn mask_count_matches_rate() -> Result<()> {
        let x = features(100, 8);
        let token = Tensor::zeros((1, 8), candle_core::DType::F32, &Device::Cpu)?;
        let mut rng = StdRng::seed_from_u64(0);

        let (_, record) = corrupt_features(&x, &token, 0.3, 0.1, &mut rng)?;
        assert_eq!(record.len(), 30);
        assert_eq!(record.replaced.len(), 3);
        assert_eq!(record.token_masked.len(), 27);
        Ok(())
    }

    #[test]
    fn masks_are_redrawn_each_step() -> Result<()> {
        let x = features(500, 4);
        let token = Tensor::zeros((1, 4), candle_core::DType::F32, &Device::Cpu)?;
        let mut rng = StdRng::seed_from_u64(1);

        let (_, first) = corrupt_features(&x, &token, 0.5, 0.0, &mut rng)?;
        let (_, second) = corrupt_features(&x, &token, 0.5, 0.0, &mut rng)?;

        let mut a = first.masked.clone();
        let mut b = second.masked.clone();
        a.sort();
        b.sort();
        assert_ne!(a, b);
        Ok(())
    }

    #[test]
    fn token_masked_rows_are_zeroed_plus_token() -> Result<()> {
        let x = features(10, 3);
        let token_vals = vec![0.5_f32, -1.0, 2.0];
        let token = Tensor::from_vec(token_vals.clone(), (1, 3), &Device::Cpu)?;
        let mut rng = StdRng::seed_from_u64(2);

        let (x_corrupt, record) = corrupt_features(&x, &token, 0.4, 0.0, &mut rng)?;
        let rows: Vec<Vec<f32>> = x_corrupt.to_vec2()?;
        for &i in record.token_masked.iter() {
            assert_eq!(rows[i], token_vals);
        }
        // untouched rows keep their original values
        let orig: Vec<Vec<f32>> = x.to_vec2()?;
        for i in 0..10 {
            if !record.masked.contains(&i) {
                assert_eq!(rows[i], orig[i]);
            }
        }
        Ok(())
    }

    #[test]
    fn zero_mask_rate_is_a_no_op() -> Result<()> {
        let x = features(20, 2);
        let token = Tensor::zeros((1, 2), candle_core::DType::F32, &Device::Cpu)?;
        let mut rng = StdRng::seed_from_u64(3);

        let (x_corrupt, record) = corrupt_features(&x, &token, 0.0, 0.5, &mut rng)?;
        assert!(record.is_empty());
        assert_eq!(x.to_vec2::<f32>()?, x_corrupt.to_vec2::<f32>()?);
        Ok(())
    }
}
