use crate::common_io::{open_buf_reader, write_lines};
use crate::traits::*;

use candle_gnn::candle_core::{Device, Tensor};
use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use std::io::BufRead;

type Mat = DMatrix<f32>;

impl IoOps for Mat {
    type Mat = Self;

    fn read_file_delim(file: &str) -> anyhow::Result<Self::Mat> {
        let reader = open_buf_reader(file)?;
        let mut rows: Vec<Vec<f32>> = vec![];

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let row = line
                .split(|c| c == '\t' || c == ',' || c == ' ')
                .filter(|w| !w.is_empty())
                .map(|w| {
                    w.parse::<f32>()
                        .map_err(|_| anyhow::anyhow!("non-numeric field `{}` in {}", w, file))
                })
                .collect::<anyhow::Result<Vec<f32>>>()?;
            rows.push(row);
        }

        if rows.is_empty() {
            return Err(anyhow::anyhow!("no data in file {}", file));
        }

        let ncols = rows[0].len();
        if rows.iter().any(|r| r.len() != ncols) {
            return Err(anyhow::anyhow!("ragged rows in file {}", file));
        }

        let nrows = rows.len();
        let data = rows.into_iter().flatten();
        Ok(Mat::from_row_iterator(nrows, ncols, data))
    }

    fn write_file_delim(&self, file: &str, delim: &str) -> anyhow::Result<()> {
        let lines = self
            .row_iter()
            .map(|row| {
                row.iter()
                    .map(|x| format!("{}", *x))
                    .collect::<Vec<String>>()
                    .join(delim)
                    .into_boxed_str()
            })
            .collect::<Vec<_>>();
        write_lines(&lines, file)
    }
}

impl MatOps for Mat {
    type Mat = Self;

    fn centre_columns_inplace(&mut self) {
        let nrows = self.nrows();
        if nrows == 0 {
            return;
        }
        for mut column in self.column_iter_mut() {
            let mean = column.sum() / nrows as f32;
            column.add_scalar_mut(-mean);
        }
    }

    fn centre_columns(&self) -> Self::Mat {
        let mut ret = self.clone();
        ret.centre_columns_inplace();
        ret
    }
}

impl SampleOps for Mat {
    type Mat = Self;

    fn runif(nrows: usize, ncols: usize) -> Self::Mat {
        let mut rng = rand::rng();
        Mat::from_fn(nrows, ncols, |_, _| rng.random::<f32>())
    }

    fn rnorm_with(nrows: usize, ncols: usize, rng: &mut StdRng) -> Self::Mat {
        let data: Vec<f32> = (0..nrows * ncols)
            .map(|_| StandardNormal.sample(rng))
            .collect();
        Mat::from_vec(nrows, ncols, data)
    }
}

impl ConvertMatOps for Mat {
    type Mat = Self;

    fn from_tensor(tensor: &Tensor) -> anyhow::Result<Self::Mat> {
        let (nrows, ncols) = tensor.dims2()?;
        let rows: Vec<Vec<f32>> = tensor.to_vec2()?;
        Ok(Mat::from_row_iterator(
            nrows,
            ncols,
            rows.into_iter().flatten(),
        ))
    }

    fn to_tensor(&self, device: &Device) -> anyhow::Result<Tensor> {
        let (nrows, ncols) = (self.nrows(), self.ncols());
        let data: Vec<f32> = self
            .row_iter()
            .flat_map(|row| row.iter().copied().collect::<Vec<_>>())
            .collect();
        Ok(Tensor::from_vec(data, (nrows, ncols), device)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn delimited_io_round_trip() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let file = dir.path().join("m.tsv.gz");
        let file = file.to_str().unwrap();

        let mat = Mat::from_row_slice(2, 3, &[1.0, 2.5, -3.0, 0.0, 4.0, 5.5]);
        mat.to_tsv(file)?;

        let back = Mat::from_tsv(file)?;
        assert_relative_eq!(mat, back, epsilon = 1e-6);
        Ok(())
    }

    #[test]
    fn reads_comma_separated_fields() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let file = dir.path().join("m.csv");
        std::fs::write(&file, "1,2\n3,4\n")?;

        let mat = Mat::read_file_delim(file.to_str().unwrap())?;
        assert_eq!(mat, Mat::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]));
        Ok(())
    }

    #[test]
    fn centred_columns_have_zero_mean() {
        let mat = Mat::from_row_slice(3, 2, &[1.0, 10.0, 2.0, 20.0, 3.0, 30.0]);
        let centred = mat.centre_columns();
        for column in centred.column_iter() {
            assert_relative_eq!(column.sum(), 0.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn tensor_round_trip_preserves_layout() -> anyhow::Result<()> {
        let mat = Mat::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let tensor = mat.to_tensor(&Device::Cpu)?;
        assert_eq!(tensor.dims2()?, (2, 3));
        assert_eq!(
            tensor.to_vec2::<f32>()?,
            vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]
        );

        let back = Mat::from_tensor(&tensor)?;
        assert_eq!(mat, back);
        Ok(())
    }

    #[test]
    fn seeded_normal_draws_are_reproducible() {
        use rand::SeedableRng;
        let mut a = StdRng::seed_from_u64(9);
        let mut b = StdRng::seed_from_u64(9);
        assert_eq!(Mat::rnorm_with(4, 3, &mut a), Mat::rnorm_with(4, 3, &mut b));
    }
}
