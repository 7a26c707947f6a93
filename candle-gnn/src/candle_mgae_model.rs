use crate::candle_gnn_config::{LossKind, MgaeConfig};
use crate::candle_gnn_layers::{gnn_stack, GnnStack, HeadMode, StackArgs};
use crate::candle_graph_edges::GraphEdges;
use crate::candle_loss_functions::{mse_loss, sce_loss, take_rows};
use crate::candle_masking::{corrupt_features, MaskRecord};
use crate::candle_model_traits::{GraphDecoderModuleT, GraphEncoderModuleT};
use crate::error::{Error, Result};

use candle_core::Tensor;
use candle_nn::{linear_no_bias, Linear, Module, VarBuilder};
use rand::rngs::StdRng;

impl GraphEncoderModuleT for GnnStack {
    fn forward_t(&self, x_nd: &Tensor, edges: &GraphEdges, train: bool) -> Result<Tensor> {
        GnnStack::forward_t(self, x_nd, edges, train)
    }

    fn dim_obs(&self) -> usize {
        self.dim_input()
    }

    fn dim_latent(&self) -> usize {
        self.dim_output()
    }
}

impl GraphDecoderModuleT for GnnStack {
    fn forward_t(&self, z_nk: &Tensor, edges: &GraphEdges, train: bool) -> Result<Tensor> {
        GnnStack::forward_t(self, z_nk, edges, train)
    }

    fn dim_latent(&self) -> usize {
        self.dim_input()
    }

    fn dim_obs(&self) -> usize {
        self.dim_output()
    }
}

/// Masked graph autoencoder
///
/// The encoder sees corrupted features; the decoder sees re-masked
/// latents and reconstructs the original rows at the masked positions
/// only.
pub struct MaskedGraphAutoencoder<Enc, Dec>
where
    Enc: GraphEncoderModuleT,
    Dec: GraphDecoderModuleT,
{
    pub encoder: Enc,
    pub decoder: Dec,
    enc2dec: Linear,
    mask_token: Tensor,
    mask_rate: f32,
    replace_rate: f32,
    loss_fn: LossKind,
    alpha_l: f64,
}

impl<Enc, Dec> MaskedGraphAutoencoder<Enc, Dec>
where
    Enc: GraphEncoderModuleT,
    Dec: GraphDecoderModuleT,
{
    /// Wire an encoder and a decoder together with the
    /// encoder-to-decoder bridge and the trainable mask token.
    pub fn new(
        encoder: Enc,
        decoder: Dec,
        cfg: &MgaeConfig,
        vb: VarBuilder,
    ) -> Result<Self> {
        if encoder.dim_obs() != cfg.in_dim {
            return Err(Error::Dimension(format!(
                "encoder input width {} != feature width {}",
                encoder.dim_obs(),
                cfg.in_dim
            )));
        }
        if decoder.dim_obs() != cfg.in_dim {
            return Err(Error::Dimension(format!(
                "decoder output width {} != feature width {}",
                decoder.dim_obs(),
                cfg.in_dim
            )));
        }

        let enc2dec = linear_no_bias(
            encoder.dim_latent(),
            decoder.dim_latent(),
            vb.pp("enc2dec"),
        )?;
        let mask_token = vb.get_with_hints((1, cfg.in_dim), "mask_token", candle_nn::init::ZERO)?;

        Ok(Self {
            encoder,
            decoder,
            enc2dec,
            mask_token,
            mask_rate: cfg.mask_rate,
            replace_rate: cfg.replace_rate,
            loss_fn: cfg.loss_fn,
            alpha_l: cfg.alpha_l,
        })
    }

    /// One self-supervised step: corrupt, encode, re-mask, decode, and
    /// score reconstruction at the masked rows.
    ///
    /// Returns `None` for the loss when the mask draw is empty
    /// (`mask_rate` rounds to zero nodes) since there is nothing to
    /// reconstruct.
    pub fn forward_step(
        &self,
        x_nd: &Tensor,
        edges: &GraphEdges,
        rng: &mut StdRng,
    ) -> Result<(Option<Tensor>, MaskRecord)> {
        let (x_corrupt, record) = corrupt_features(
            x_nd,
            &self.mask_token,
            self.mask_rate,
            self.replace_rate,
            rng,
        )?;

        if record.is_empty() {
            return Ok((None, record));
        }

        let z_nk = self.encoder.forward_t(&x_corrupt, edges, true)?;
        let rep_nk = self.enc2dec.forward(&z_nk)?;

        // the decoder must not see latent content at masked positions
        let nn = x_nd.dim(0)?;
        let mut masked_ind = vec![0_f32; nn];
        for &i in record.masked.iter() {
            masked_ind[i] = 1.0;
        }
        let ind_n1 = Tensor::from_vec(masked_ind, (nn, 1), x_nd.device())?;
        let rep_nk = rep_nk.broadcast_mul(&ind_n1.affine(-1.0, 1.0)?)?;

        let recon_nd = self.decoder.forward_t(&rep_nk, edges, true)?;

        let recon_md = take_rows(&recon_nd, &record.masked)?;
        let target_md = take_rows(x_nd, &record.masked)?;

        let loss = match self.loss_fn {
            LossKind::Sce => sce_loss(&recon_md, &target_md, self.alpha_l)?,
            LossKind::Mse => mse_loss(&recon_md, &target_md)?,
        };

        Ok((Some(loss), record))
    }

    /// Inference pass: uncorrupted features, no dropout, original graph.
    /// Pure function of (parameters, features, edges).
    pub fn embed(&self, x_nd: &Tensor, edges: &GraphEdges) -> Result<Tensor> {
        self.encoder.forward_t(x_nd, edges, false)
    }

    pub fn dim_embedding(&self) -> usize {
        self.encoder.dim_latent()
    }
}

/// Resolve a configuration into a concrete encoder/decoder pair.
///
/// The encoder follows `num_layers`; the decoder is a single layer of
/// the independently selected family mapping the latent width back to
/// the feature width (attention heads averaged rather than
/// concatenated).
pub fn build_mgae(
    cfg: &MgaeConfig,
    vb: VarBuilder,
) -> Result<MaskedGraphAutoencoder<GnnStack, GnnStack>> {
    cfg.validate()?;

    let encoder = gnn_stack(
        &StackArgs {
            arch: cfg.encoder,
            in_dim: cfg.in_dim,
            hidden_dim: cfg.num_hidden,
            out_dim: cfg.num_hidden,
            num_layers: cfg.num_layers,
            num_heads: cfg.num_heads,
            num_out_heads: cfg.num_out_heads,
            activation: cfg.activation,
            norm: cfg.norm,
            residual: cfg.residual,
            in_drop: cfg.in_drop,
            attn_drop: cfg.attn_drop,
            negative_slope: cfg.negative_slope,
            concat_hidden: cfg.concat_hidden,
            activate_last: true,
            final_head_mode: HeadMode::Concat,
        },
        vb.pp("encoder"),
    )?;

    let decoder = gnn_stack(
        &StackArgs {
            arch: cfg.decoder,
            in_dim: cfg.num_hidden,
            hidden_dim: cfg.num_hidden,
            out_dim: cfg.in_dim,
            num_layers: 1,
            num_heads: cfg.num_heads,
            num_out_heads: cfg.num_out_heads,
            activation: cfg.activation,
            norm: cfg.norm,
            residual: false,
            in_drop: cfg.in_drop,
            attn_drop: cfg.attn_drop,
            negative_slope: cfg.negative_slope,
            concat_hidden: false,
            activate_last: false,
            final_head_mode: HeadMode::Mean,
        },
        vb.pp("decoder"),
    )?;

    MaskedGraphAutoencoder::new(encoder, decoder, cfg, vb)
}
