use candle_gnn::candle_core::{Device, Tensor};
use rand::rngs::StdRng;

/// Read and write matrices from and to delimited text files
pub trait IoOps {
    type Mat;

    /// Read a dense numeric matrix; fields split on tabs, commas, or
    /// spaces, one row per line
    fn read_file_delim(file: &str) -> anyhow::Result<Self::Mat>;

    /// Write a dense matrix with the given field delimiter
    fn write_file_delim(&self, file: &str, delim: &str) -> anyhow::Result<()>;

    fn from_tsv(tsv_file: &str) -> anyhow::Result<Self::Mat> {
        Self::read_file_delim(tsv_file)
    }

    fn to_tsv(&self, tsv_file: &str) -> anyhow::Result<()> {
        self.write_file_delim(tsv_file, "\t")
    }
}

/// Column-wise location adjustments
pub trait MatOps {
    type Mat;

    fn centre_columns_inplace(&mut self);

    fn centre_columns(&self) -> Self::Mat;
}

/// Sample random matrices
pub trait SampleOps {
    type Mat;

    /// uniform `U(0,1)` entries
    fn runif(nrows: usize, ncols: usize) -> Self::Mat;

    /// standard normal entries from an explicit random source
    fn rnorm_with(nrows: usize, ncols: usize, rng: &mut StdRng) -> Self::Mat;
}

/// Conversion to and from `candle` tensors
pub trait ConvertMatOps {
    type Mat;

    fn from_tensor(tensor: &Tensor) -> anyhow::Result<Self::Mat>;

    fn to_tensor(&self, device: &Device) -> anyhow::Result<Tensor>;
}
