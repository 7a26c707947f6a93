use thiserror::Error;

/// Errors raised by the masked graph autoencoder stack.
///
/// Configuration and data errors are fatal and surface before any
/// optimizer step; a numerical error aborts only the seed run that
/// produced it.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid hyperparameter or unknown architecture/loss/optimizer name.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Malformed or inconsistent input data.
    #[error("data error: {0}")]
    Data(String),
    /// Loss became non-finite during training.
    #[error("numerical error: {0}")]
    Numerical(String),
    /// Incompatible tensor or layer widths.
    #[error("dimension error: {0}")]
    Dimension(String),
    /// Tensor backend error.
    #[error("tensor error: {0}")]
    Candle(#[from] candle_core::Error),
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
