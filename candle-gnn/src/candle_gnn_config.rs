use crate::error::{Error, Result};
use std::str::FromStr;

/// Graph convolution family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GnnArch {
    /// sum neighbour aggregation with a learnable self weight
    Gin,
    /// multi-head attention over neighbours
    Gat,
}

impl FromStr for GnnArch {
    type Err = Error;
    fn from_str(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "gin" => Ok(GnnArch::Gin),
            "gat" => Ok(GnnArch::Gat),
            _ => Err(Error::Configuration(format!(
                "unknown architecture `{}` (expected `gin` or `gat`)",
                name
            ))),
        }
    }
}

/// Per-layer normalization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormKind {
    BatchNorm,
    LayerNorm,
    None,
}

impl FromStr for NormKind {
    type Err = Error;
    fn from_str(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "batchnorm" => Ok(NormKind::BatchNorm),
            "layernorm" => Ok(NormKind::LayerNorm),
            "none" => Ok(NormKind::None),
            _ => Err(Error::Configuration(format!(
                "unknown norm `{}` (expected `batchnorm`, `layernorm`, or `none`)",
                name
            ))),
        }
    }
}

/// Per-layer nonlinearity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActKind {
    Relu,
    Gelu,
    Elu,
}

impl FromStr for ActKind {
    type Err = Error;
    fn from_str(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "relu" => Ok(ActKind::Relu),
            "gelu" => Ok(ActKind::Gelu),
            "elu" => Ok(ActKind::Elu),
            _ => Err(Error::Configuration(format!(
                "unknown activation `{}` (expected `relu`, `gelu`, or `elu`)",
                name
            ))),
        }
    }
}

impl ActKind {
    pub fn resolve(&self) -> candle_nn::Activation {
        match self {
            ActKind::Relu => candle_nn::Activation::Relu,
            ActKind::Gelu => candle_nn::Activation::Gelu,
            ActKind::Elu => candle_nn::Activation::Elu(1.0),
        }
    }
}

/// Reconstruction objective
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossKind {
    /// scaled cosine error `(1 - cos)^alpha`
    Sce,
    /// mean squared error
    Mse,
}

impl FromStr for LossKind {
    type Err = Error;
    fn from_str(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "sce" => Ok(LossKind::Sce),
            "mse" => Ok(LossKind::Mse),
            _ => Err(Error::Configuration(format!(
                "unknown loss_fn `{}` (expected `sce` or `mse`)",
                name
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizerKind {
    /// adaptive-moment with decoupled weight decay
    AdamW,
    /// plain stochastic gradient descent
    Sgd,
}

impl FromStr for OptimizerKind {
    type Err = Error;
    fn from_str(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "adam" | "adamw" => Ok(OptimizerKind::AdamW),
            "sgd" => Ok(OptimizerKind::Sgd),
            _ => Err(Error::Configuration(format!(
                "unknown optimizer `{}` (expected `adam`, `adamw`, or `sgd`)",
                name
            ))),
        }
    }
}

/// Hyperparameters of the masked graph autoencoder
///
/// * `in_dim` - width of the reduced feature vectors
/// * `num_hidden` - latent width (total across attention heads)
/// * `num_layers` - encoder depth; the decoder is a single layer
#[derive(Debug, Clone)]
pub struct MgaeConfig {
    pub in_dim: usize,
    pub num_hidden: usize,
    pub num_layers: usize,
    pub num_heads: usize,
    pub num_out_heads: usize,
    pub encoder: GnnArch,
    pub decoder: GnnArch,
    pub activation: ActKind,
    pub norm: NormKind,
    pub residual: bool,
    pub concat_hidden: bool,
    pub in_drop: f32,
    pub attn_drop: f32,
    pub negative_slope: f64,
    pub mask_rate: f32,
    pub replace_rate: f32,
    pub loss_fn: LossKind,
    pub alpha_l: f64,
}

impl Default for MgaeConfig {
    fn default() -> Self {
        Self {
            in_dim: 600,
            num_hidden: 128,
            num_layers: 3,
            num_heads: 4,
            num_out_heads: 1,
            encoder: GnnArch::Gin,
            decoder: GnnArch::Gin,
            activation: ActKind::Elu,
            norm: NormKind::BatchNorm,
            residual: false,
            concat_hidden: false,
            in_drop: 0.2,
            attn_drop: 0.1,
            negative_slope: 0.2,
            mask_rate: 0.8,
            replace_rate: 0.05,
            loss_fn: LossKind::Sce,
            alpha_l: 4.0,
        }
    }
}

impl MgaeConfig {
    /// Reject invalid hyperparameter combinations before any parameter
    /// is allocated.
    pub fn validate(&self) -> Result<()> {
        if self.in_dim == 0 {
            return Err(Error::Configuration("in_dim must be positive".into()));
        }
        if self.num_hidden == 0 {
            return Err(Error::Configuration("num_hidden must be positive".into()));
        }
        if self.num_layers == 0 {
            return Err(Error::Configuration("num_layers must be positive".into()));
        }
        if !(0.0..1.0).contains(&self.mask_rate) {
            return Err(Error::Configuration(format!(
                "mask_rate {} outside [0, 1)",
                self.mask_rate
            )));
        }
        if !(0.0..=1.0).contains(&self.replace_rate) {
            return Err(Error::Configuration(format!(
                "replace_rate {} outside [0, 1]",
                self.replace_rate
            )));
        }
        for (name, rate) in [("in_drop", self.in_drop), ("attn_drop", self.attn_drop)] {
            if !(0.0..1.0).contains(&rate) {
                return Err(Error::Configuration(format!(
                    "{} {} outside [0, 1)",
                    name, rate
                )));
            }
        }
        if self.alpha_l < 1.0 {
            return Err(Error::Configuration(format!(
                "alpha_l {} must be >= 1",
                self.alpha_l
            )));
        }
        if self.negative_slope <= 0.0 {
            return Err(Error::Configuration(format!(
                "negative_slope {} must be positive",
                self.negative_slope
            )));
        }
        if self.encoder == GnnArch::Gat || self.decoder == GnnArch::Gat {
            if self.num_heads == 0 || self.num_out_heads == 0 {
                return Err(Error::Configuration(
                    "attention heads must be positive".into(),
                ));
            }
            if self.num_hidden % self.num_heads != 0 {
                return Err(Error::Configuration(format!(
                    "num_hidden {} not divisible by num_heads {}",
                    self.num_hidden, self.num_heads
                )));
            }
            if self.num_hidden % self.num_out_heads != 0 {
                return Err(Error::Configuration(format!(
                    "num_hidden {} not divisible by num_out_heads {}",
                    self.num_hidden, self.num_out_heads
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_names() -> Result<()> {
        assert_eq!("gin".parse::<GnnArch>()?, GnnArch::Gin);
        assert_eq!("GAT".parse::<GnnArch>()?, GnnArch::Gat);
        assert_eq!("sce".parse::<LossKind>()?, LossKind::Sce);
        assert_eq!("adam".parse::<OptimizerKind>()?, OptimizerKind::AdamW);
        assert_eq!("layernorm".parse::<NormKind>()?, NormKind::LayerNorm);
        Ok(())
    }

    #[test]
    fn unknown_names_are_configuration_errors() {
        assert!(matches!(
            "gcn".parse::<GnnArch>(),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            "huber".parse::<LossKind>(),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            "rmsprop".parse::<OptimizerKind>(),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn validate_rejects_bad_rates() {
        let mut cfg = MgaeConfig::default();
        cfg.mask_rate = 1.0;
        assert!(cfg.validate().is_err());

        let mut cfg = MgaeConfig::default();
        cfg.alpha_l = 0.5;
        assert!(cfg.validate().is_err());

        let mut cfg = MgaeConfig::default();
        cfg.encoder = GnnArch::Gat;
        cfg.num_hidden = 130;
        cfg.num_heads = 4;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_accepts_defaults() {
        assert!(MgaeConfig::default().validate().is_ok());
    }
}
