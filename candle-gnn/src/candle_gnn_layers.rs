use crate::candle_gnn_config::{ActKind, GnnArch, NormKind};
use crate::candle_graph_edges::GraphEdges;
use crate::error::Result;

use candle_core::Tensor;
use candle_nn::{
    batch_norm, layer_norm, linear, linear_no_bias, Activation, BatchNorm, BatchNormConfig,
    LayerNorm, LayerNormConfig, Linear, Module, ModuleT, VarBuilder,
};

/// How a multi-head layer combines its heads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadMode {
    /// concatenate heads; output width = heads * head_dim
    Concat,
    /// average heads; output width = head_dim
    Mean,
}

/////////////////////////////////
// normalization and residuals //
/////////////////////////////////

pub enum NormLayer {
    Batch(BatchNorm),
    Layer(LayerNorm),
    Identity,
}

impl NormLayer {
    pub fn new(kind: NormKind, dim: usize, vb: VarBuilder) -> Result<NormLayer> {
        match kind {
            NormKind::BatchNorm => Ok(NormLayer::Batch(batch_norm(
                dim,
                BatchNormConfig::default(),
                vb.pp("bn"),
            )?)),
            NormKind::LayerNorm => Ok(NormLayer::Layer(layer_norm(
                dim,
                LayerNormConfig::default(),
                vb.pp("ln"),
            )?)),
            NormKind::None => Ok(NormLayer::Identity),
        }
    }

    pub fn forward_t(&self, x_nd: &Tensor, train: bool) -> Result<Tensor> {
        match self {
            NormLayer::Batch(bn) => Ok(bn.forward_t(x_nd, train)?),
            NormLayer::Layer(ln) => Ok(ln.forward(x_nd)?),
            NormLayer::Identity => Ok(x_nd.clone()),
        }
    }
}

pub enum Residual {
    None,
    Identity,
    Proj(Linear),
}

impl Residual {
    fn new(enabled: bool, in_dim: usize, out_dim: usize, vb: VarBuilder) -> Result<Residual> {
        if !enabled {
            Ok(Residual::None)
        } else if in_dim == out_dim {
            Ok(Residual::Identity)
        } else {
            Ok(Residual::Proj(linear_no_bias(in_dim, out_dim, vb.pp("res_fc"))?))
        }
    }

    fn apply(&self, out_nd: &Tensor, input_nd: &Tensor) -> Result<Tensor> {
        match self {
            Residual::None => Ok(out_nd.clone()),
            Residual::Identity => Ok((out_nd + input_nd)?),
            Residual::Proj(fc) => Ok((out_nd + fc.forward(input_nd)?)?),
        }
    }
}

///////////////////////////////////////
// isomorphism-aggregation (GIN) conv //
///////////////////////////////////////

/// Sum neighbour aggregation with a learnable self weight:
///
/// h'(i) = act(norm(W [ sum_{j in N(i) ∪ {i}} h(j) + eps * h(i) ]))
///
/// The self term comes through the self-edge in `GraphEdges`, so a
/// degree-zero node reduces to a plain linear transform of its own
/// features.
pub struct GinConv {
    fc: Linear,
    eps: Tensor,
    norm: NormLayer,
    act: Option<Activation>,
    residual: Residual,
    in_drop: f32,
}

pub struct ConvArgs {
    pub in_dim: usize,
    pub out_dim: usize,
    pub norm: NormKind,
    pub activation: Option<ActKind>,
    pub residual: bool,
    pub in_drop: f32,
}

pub fn gin_conv(args: &ConvArgs, vb: VarBuilder) -> Result<GinConv> {
    Ok(GinConv {
        fc: linear(args.in_dim, args.out_dim, vb.pp("fc"))?,
        eps: vb.get_with_hints((1, 1), "eps", candle_nn::init::ZERO)?,
        norm: NormLayer::new(args.norm, args.out_dim, vb.clone())?,
        act: args.activation.map(|a| a.resolve()),
        residual: Residual::new(args.residual, args.in_dim, args.out_dim, vb)?,
        in_drop: args.in_drop,
    })
}

impl GinConv {
    pub fn forward(&self, x_nd: &Tensor, edges: &GraphEdges, train: bool) -> Result<Tensor> {
        let x_nd = if train && self.in_drop > 0.0 {
            candle_nn::ops::dropout(x_nd, self.in_drop)?
        } else {
            x_nd.clone()
        };

        let msg_ed = x_nd.index_select(&edges.src, 0)?;
        let agg_nd = Tensor::zeros(x_nd.shape(), x_nd.dtype(), x_nd.device())?
            .index_add(&edges.dst, &msg_ed, 0)?;

        let h_nd = (agg_nd + x_nd.broadcast_mul(&self.eps)?)?;
        let mut out = self.fc.forward(&h_nd)?;
        out = self.residual.apply(&out, &x_nd)?;
        out = self.norm.forward_t(&out, train)?;
        if let Some(act) = &self.act {
            out = act.forward(&out)?;
        }
        Ok(out)
    }
}

//////////////////////////////
// attention (GAT-like) conv //
//////////////////////////////

/// Multi-head attention over incoming edges.
///
/// Attention logits use a leaky rectifier on a per-head score of source
/// and destination features; coefficients are normalized per destination
/// with scatter sums over the edge list. Self-edges guarantee every node
/// has at least one incoming edge.
pub struct GatConv {
    fc: Linear,
    attn_l: Tensor,
    attn_r: Tensor,
    bias: Tensor,
    num_heads: usize,
    head_dim: usize,
    head_mode: HeadMode,
    leaky: Activation,
    attn_drop: f32,
    norm: NormLayer,
    act: Option<Activation>,
    residual: Residual,
    in_drop: f32,
}

pub struct GatArgs {
    pub conv: ConvArgs,
    pub num_heads: usize,
    pub head_mode: HeadMode,
    pub negative_slope: f64,
    pub attn_drop: f32,
}

pub fn gat_conv(args: &GatArgs, vb: VarBuilder) -> Result<GatConv> {
    let (num_heads, head_dim) = match args.head_mode {
        HeadMode::Concat => (args.num_heads, args.conv.out_dim / args.num_heads),
        HeadMode::Mean => (args.num_heads, args.conv.out_dim),
    };
    let init_ws = candle_nn::init::DEFAULT_KAIMING_NORMAL;

    Ok(GatConv {
        fc: linear_no_bias(args.conv.in_dim, num_heads * head_dim, vb.pp("fc"))?,
        attn_l: vb.get_with_hints((1, num_heads, head_dim), "attn_l", init_ws)?,
        attn_r: vb.get_with_hints((1, num_heads, head_dim), "attn_r", init_ws)?,
        bias: vb.get_with_hints(args.conv.out_dim, "bias", candle_nn::init::ZERO)?,
        num_heads,
        head_dim,
        head_mode: args.head_mode,
        leaky: Activation::LeakyRelu(args.negative_slope),
        attn_drop: args.attn_drop,
        norm: NormLayer::new(args.conv.norm, args.conv.out_dim, vb.clone())?,
        act: args.conv.activation.map(|a| a.resolve()),
        residual: Residual::new(
            args.conv.residual,
            args.conv.in_dim,
            args.conv.out_dim,
            vb,
        )?,
        in_drop: args.conv.in_drop,
    })
}

impl GatConv {
    pub fn forward(&self, x_nd: &Tensor, edges: &GraphEdges, train: bool) -> Result<Tensor> {
        let x_nd = if train && self.in_drop > 0.0 {
            candle_nn::ops::dropout(x_nd, self.in_drop)?
        } else {
            x_nd.clone()
        };

        let nn = x_nd.dim(0)?;
        let z_nho = self
            .fc
            .forward(&x_nd)?
            .reshape((nn, self.num_heads, self.head_dim))?;

        let el_nh = z_nho.broadcast_mul(&self.attn_l)?.sum(2)?;
        let er_nh = z_nho.broadcast_mul(&self.attn_r)?.sum(2)?;

        let logits_eh = (el_nh.index_select(&edges.src, 0)?
            + er_nh.index_select(&edges.dst, 0)?)?;
        let logits_eh = self.leaky.forward(&logits_eh)?;

        // shift by the global max before exponentiating
        let shift = logits_eh.detach().max(0)?.max(0)?;
        let weights_eh = logits_eh.broadcast_sub(&shift)?.exp()?;

        let denom_nh = Tensor::zeros(
            (edges.num_nodes, self.num_heads),
            weights_eh.dtype(),
            weights_eh.device(),
        )?
        .index_add(&edges.dst, &weights_eh, 0)?;

        let attn_eh = (weights_eh / denom_nh.index_select(&edges.dst, 0)?)?;
        let attn_eh = if train && self.attn_drop > 0.0 {
            candle_nn::ops::dropout(&attn_eh, self.attn_drop)?
        } else {
            attn_eh
        };

        let msg_eho = z_nho
            .index_select(&edges.src, 0)?
            .broadcast_mul(&attn_eh.unsqueeze(2)?)?;
        let agg_nho = Tensor::zeros(
            (edges.num_nodes, self.num_heads, self.head_dim),
            msg_eho.dtype(),
            msg_eho.device(),
        )?
        .index_add(&edges.dst, &msg_eho, 0)?;

        let mut out = match self.head_mode {
            HeadMode::Concat => agg_nho.reshape((nn, self.num_heads * self.head_dim))?,
            HeadMode::Mean => agg_nho.mean(1)?,
        };
        out = out.broadcast_add(&self.bias)?;
        out = self.residual.apply(&out, &x_nd)?;
        out = self.norm.forward_t(&out, train)?;
        if let Some(act) = &self.act {
            out = act.forward(&out)?;
        }
        Ok(out)
    }
}

///////////////////////////
// stacks of conv layers //
///////////////////////////

pub enum GnnLayer {
    Gin(GinConv),
    Gat(GatConv),
}

impl GnnLayer {
    pub fn forward(&self, x_nd: &Tensor, edges: &GraphEdges, train: bool) -> Result<Tensor> {
        match self {
            GnnLayer::Gin(conv) => conv.forward(x_nd, edges, train),
            GnnLayer::Gat(conv) => conv.forward(x_nd, edges, train),
        }
    }
}

/// A stack of graph convolutions over a fixed edge structure.
pub struct GnnStack {
    layers: Vec<GnnLayer>,
    in_dim: usize,
    out_dim: usize,
    concat_hidden: bool,
}

pub struct StackArgs {
    pub arch: GnnArch,
    pub in_dim: usize,
    pub hidden_dim: usize,
    pub out_dim: usize,
    pub num_layers: usize,
    pub num_heads: usize,
    pub num_out_heads: usize,
    pub activation: ActKind,
    pub norm: NormKind,
    pub residual: bool,
    pub in_drop: f32,
    pub attn_drop: f32,
    pub negative_slope: f64,
    pub concat_hidden: bool,
    /// apply normalization + nonlinearity to the final layer; off for
    /// reconstruction heads
    pub activate_last: bool,
    pub final_head_mode: HeadMode,
}

pub fn gnn_stack(args: &StackArgs, vb: VarBuilder) -> Result<GnnStack> {
    let mut layers = Vec::with_capacity(args.num_layers);

    for ll in 0..args.num_layers {
        let last = ll + 1 == args.num_layers;
        let in_dim = if ll == 0 { args.in_dim } else { args.hidden_dim };
        let out_dim = if last { args.out_dim } else { args.hidden_dim };
        let conv = ConvArgs {
            in_dim,
            out_dim,
            norm: if last && !args.activate_last {
                NormKind::None
            } else {
                args.norm
            },
            activation: if last && !args.activate_last {
                None
            } else {
                Some(args.activation)
            },
            residual: args.residual,
            in_drop: args.in_drop,
        };
        let vb_l = vb.pp(format!("layer{}", ll));

        let layer = match args.arch {
            GnnArch::Gin => GnnLayer::Gin(gin_conv(&conv, vb_l)?),
            GnnArch::Gat => {
                let (num_heads, head_mode) = if last {
                    (args.num_out_heads, args.final_head_mode)
                } else {
                    (args.num_heads, HeadMode::Concat)
                };
                GnnLayer::Gat(gat_conv(
                    &GatArgs {
                        conv,
                        num_heads,
                        head_mode,
                        negative_slope: args.negative_slope,
                        attn_drop: args.attn_drop,
                    },
                    vb_l,
                )?)
            }
        };
        layers.push(layer);
    }

    Ok(GnnStack {
        layers,
        in_dim: args.in_dim,
        out_dim: args.out_dim,
        concat_hidden: args.concat_hidden,
    })
}

impl GnnStack {
    /// Run every layer; returns the last layer's output, or the
    /// concatenation of all layer outputs when `concat_hidden` is set.
    pub fn forward_t(&self, x_nd: &Tensor, edges: &GraphEdges, train: bool) -> Result<Tensor> {
        let mut hidden = Vec::with_capacity(self.layers.len());
        let mut h_nd = x_nd.clone();
        for layer in self.layers.iter() {
            h_nd = layer.forward(&h_nd, edges, train)?;
            if self.concat_hidden {
                hidden.push(h_nd.clone());
            }
        }
        if self.concat_hidden {
            Ok(Tensor::cat(&hidden, 1)?)
        } else {
            Ok(h_nd)
        }
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn dim_input(&self) -> usize {
        self.in_dim
    }

    /// width of `forward_t` output
    pub fn dim_output(&self) -> usize {
        if self.concat_hidden {
            self.out_dim * self.layers.len()
        } else {
            self.out_dim
        }
    }
}
