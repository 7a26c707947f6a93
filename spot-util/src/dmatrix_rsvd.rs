use crate::traits::{MatOps, SampleOps};
use candle_gnn::error::Error;
use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::SeedableRng;

type Mat = DMatrix<f32>;
type DVec = DVector<f32>;

const POWER_ITER: usize = 3;
const OVERSAMPLE: usize = 5;

/// fixed sketch stream so that a given matrix always reduces to the
/// same scores, independently of the per-run training seeds
const SKETCH_SEED: u64 = 13;

pub trait RandomizedSvd {
    /// Truncated SVD via a randomized range finder (Halko et al. 2011)
    ///
    /// * `rank` - number of components
    /// * `rng` - random source for the Gaussian sketch
    ///
    /// Returns `(u, singular_values, v)` with `u`: nrows x rank and
    /// `v`: ncols x rank.
    fn rsvd(&self, rank: usize, rng: &mut StdRng) -> anyhow::Result<(Mat, DVec, Mat)>;
}

pub trait Pca {
    /// Principal-component scores of the rows
    ///
    /// Columns are centred, then a rank-`num_features` randomized SVD
    /// yields scores `U * diag(S)` (nrows x num_features).
    fn pca(&self, num_features: usize) -> anyhow::Result<Mat>;
}

impl RandomizedSvd for Mat {
    fn rsvd(&self, rank: usize, rng: &mut StdRng) -> anyhow::Result<(Mat, DVec, Mat)> {
        let nr = self.nrows();
        let nc = self.ncols();

        if rank == 0 || nr == 0 || nc == 0 {
            return Err(Error::Dimension(format!(
                "cannot take rank-{} svd of a {} x {} matrix",
                rank, nr, nc
            ))
            .into());
        }

        let rank = rank.min(nr).min(nc);
        let sketch = (rank + OVERSAMPLE).min(nr).min(nc);

        // range finder with QR re-orthogonalization at every pass
        let omega = Mat::rnorm_with(nc, sketch, rng);
        let mut qq = (self * omega).qr().q();
        for _ in 0..POWER_ITER {
            let ww = (self.transpose() * &qq).qr().q();
            qq = (self * ww).qr().q();
        }

        let bb = qq.transpose() * self;
        let svd = bb.svd(true, true);

        let (svd_u, svd_vt) = match (svd.u, svd.v_t) {
            (Some(u), Some(vt)) => (u, vt),
            _ => anyhow::bail!("svd failed on the projected matrix"),
        };

        let rank = rank.min(svd.singular_values.len());
        let u_vectors = &qq * svd_u.columns(0, rank).into_owned();
        let v_vectors = svd_vt.transpose().columns(0, rank).into_owned();
        let singular_values = svd.singular_values.rows(0, rank).into_owned();

        Ok((u_vectors, singular_values, v_vectors))
    }
}

impl Pca for Mat {
    fn pca(&self, num_features: usize) -> anyhow::Result<Mat> {
        if num_features == 0 {
            return Err(
                Error::Configuration("num_features must be positive".into()).into(),
            );
        }
        if num_features > self.ncols() {
            return Err(Error::Dimension(format!(
                "num_features {} exceeds the {} measured features",
                num_features,
                self.ncols()
            ))
            .into());
        }

        let centred = self.centre_columns();
        let mut rng = StdRng::seed_from_u64(SKETCH_SEED);
        let (uu, ss, _vv) = centred.rsvd(num_features, &mut rng)?;

        Ok(&uu * Mat::from_diagonal(&ss))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn low_rank_matrix(nr: usize, nc: usize, rank: usize) -> Mat {
        let mut rng = StdRng::seed_from_u64(99);
        let left = Mat::rnorm_with(nr, rank, &mut rng);
        let right = Mat::rnorm_with(rank, nc, &mut rng);
        left * right
    }

    #[test]
    fn rsvd_recovers_a_low_rank_matrix() -> anyhow::Result<()> {
        let xx = low_rank_matrix(40, 30, 5);
        let mut rng = StdRng::seed_from_u64(0);

        let (uu, ss, vv) = xx.rsvd(5, &mut rng)?;
        let approx_xx = &uu * Mat::from_diagonal(&ss) * vv.transpose();

        assert_relative_eq!(xx, approx_xx, epsilon = 1e-2);
        Ok(())
    }

    #[test]
    fn singular_values_are_sorted() -> anyhow::Result<()> {
        let xx = low_rank_matrix(30, 30, 8);
        let mut rng = StdRng::seed_from_u64(1);

        let (_, ss, _) = xx.rsvd(6, &mut rng)?;
        for i in 1..ss.len() {
            assert!(ss[i - 1] >= ss[i]);
        }
        Ok(())
    }

    #[test]
    fn pca_has_requested_width_and_centred_scores() -> anyhow::Result<()> {
        let xx = low_rank_matrix(50, 20, 6);
        let scores = xx.pca(4)?;

        assert_eq!(scores.nrows(), 50);
        assert_eq!(scores.ncols(), 4);
        for column in scores.column_iter() {
            assert_relative_eq!(column.sum(), 0.0, epsilon = 1e-2);
        }
        Ok(())
    }

    #[test]
    fn pca_is_deterministic_for_a_fixed_input() -> anyhow::Result<()> {
        let xx = low_rank_matrix(30, 10, 3);
        assert_eq!(xx.pca(3)?, xx.pca(3)?);
        Ok(())
    }

    #[test]
    fn pca_rejects_excess_rank_with_a_dimension_error() {
        let xx = low_rank_matrix(10, 5, 2);
        let err = xx.pca(6).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::Dimension(_))
        ));
    }
}
