use crate::vetch_common::*;
use crate::vetch_input::{read_sample_folder, SampleData};

use candle_gnn::candle_core::{DType, Device, Tensor};
use candle_gnn::candle_gnn_config::{
    ActKind, GnnArch, LossKind, MgaeConfig, NormKind, OptimizerKind,
};
use candle_gnn::candle_graph_edges::GraphEdges;
use candle_gnn::candle_mgae_inference::{reseed_parameters, MgaeTrainer, TrainConfig};
use candle_gnn::candle_mgae_model::build_mgae;
use candle_gnn::candle_nn::{VarBuilder, VarMap};
use candle_gnn::error::Error;

use clap::{Args, ValueEnum};
use rand::rngs::StdRng;
use rand::SeedableRng;

use spot_util::clustering::{Kmeans, KmeansArgs};
use spot_util::dmatrix_rsvd::Pca;
use spot_util::radius_graph::SpatialGraph;

/// How raw expression becomes the model input
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq)]
#[clap(rename_all = "lowercase")]
pub enum FeatureDimMethod {
    /// principal-component scores of the expression matrix
    #[default]
    Pca,
    /// one-hot encoding of spatial-graph node degree
    Degree,
}

#[derive(Args, Debug, Clone)]
pub struct EmbedArgs {
    /// Sample folder with `features.tsv[.gz]` (spot x gene),
    /// `coordinates.tsv[.gz]` (spot x 2), and optional
    /// `labels.tsv[.gz]`; `.csv[.gz]` variants also accepted
    #[arg(long, short = 'd', required = true)]
    pub data_dir: Box<str>,

    /// Output header
    #[arg(long, short, required = true)]
    pub out: Box<str>,

    /// Fraction of spots corrupted each epoch
    #[arg(long, default_value_t = 0.8)]
    pub mask_rate: f32,

    /// Fraction of masked spots that receive another spot's features
    /// instead of the mask token
    #[arg(long, default_value_t = 0.05)]
    pub replace_rate: f32,

    /// Encoder architecture (`gin` or `gat`)
    #[arg(long, default_value = "gin")]
    pub encoder: GnnArch,

    /// Decoder architecture (`gin` or `gat`)
    #[arg(long, default_value = "gin")]
    pub decoder: GnnArch,

    /// Latent width
    #[arg(long, default_value_t = 128)]
    pub num_hidden: usize,

    /// Encoder depth
    #[arg(long, default_value_t = 3)]
    pub num_layers: usize,

    /// Hidden attention heads (`gat` only)
    #[arg(long, default_value_t = 4)]
    pub num_heads: usize,

    /// Output attention heads (`gat` only)
    #[arg(long, default_value_t = 1)]
    pub num_out_heads: usize,

    /// Layer nonlinearity (`elu`, `relu`, or `gelu`)
    #[arg(long, default_value = "elu")]
    pub activation: ActKind,

    /// Layer normalization (`batchnorm`, `layernorm`, or `none`)
    #[arg(long, default_value = "batchnorm")]
    pub norm: NormKind,

    /// Skip-add each layer's input to its output
    #[arg(long)]
    pub residual: bool,

    /// Concatenate all encoder layer outputs for the embedding
    #[arg(long)]
    pub concat_hidden: bool,

    /// Input feature dropout
    #[arg(long, default_value_t = 0.2)]
    pub in_drop: f32,

    /// Attention coefficient dropout (`gat` only)
    #[arg(long, default_value_t = 0.1)]
    pub attn_drop: f32,

    /// Negative slope of the leaky rectifier on attention logits
    #[arg(long, default_value_t = 0.2)]
    pub negative_slope: f64,

    /// Fraction of graph edges dropped per epoch
    #[arg(long, default_value_t = 0.0)]
    pub drop_edge_rate: f32,

    /// Reconstruction loss (`sce` or `mse`)
    #[arg(long, default_value = "sce")]
    pub loss_fn: LossKind,

    /// Exponent of the scaled cosine error
    #[arg(long, default_value_t = 4.0)]
    pub alpha_l: f64,

    /// Optimizer (`adam`, `adamw`, or `sgd`)
    #[arg(long, default_value = "adam")]
    pub optimizer: OptimizerKind,

    /// Learning rate
    #[arg(long, default_value_t = 1e-3)]
    pub lr: f32,

    /// L2 weight decay
    #[arg(long, default_value_t = 2e-4)]
    pub weight_decay: f32,

    /// Advance a warmup-then-cosine learning-rate schedule
    #[arg(long, action = clap::ArgAction::Set, default_value_t = true)]
    pub scheduler: bool,

    /// Linear warmup epochs; non-positive disables warmup
    #[arg(long, default_value_t = -1)]
    pub warmup_steps: i64,

    /// Training epochs
    #[arg(long, default_value_t = 500)]
    pub max_epoch: usize,

    /// One independent run per seed (comma-separated)
    #[arg(long, value_delimiter(','), default_values_t = vec![0])]
    pub seeds: Vec<u64>,

    /// Connect spots within this Euclidean distance
    #[arg(long, default_value_t = 25.0)]
    pub threshold_radius: f32,

    /// Width of the reduced feature vectors
    #[arg(long, default_value_t = 600)]
    pub num_features: usize,

    /// Feature reduction method
    #[arg(long, value_enum, default_value_t = FeatureDimMethod::Pca)]
    pub feature_dim_method: FeatureDimMethod,

    /// K-means cluster count; overridden by the distinct labels in
    /// `labels.tsv[.gz]` when that file is present
    #[arg(long, default_value_t = 7)]
    pub num_classes: usize,

    /// Save trained parameters as safetensors
    #[arg(long)]
    pub save_model: bool,

    /// Maximum k-means iterations
    #[arg(long, default_value_t = 100)]
    pub max_kmeans_iter: usize,

    /// Verbosity
    #[arg(long, short)]
    pub verbose: bool,
}

impl EmbedArgs {
    fn mgae_config(&self) -> MgaeConfig {
        MgaeConfig {
            in_dim: self.num_features,
            num_hidden: self.num_hidden,
            num_layers: self.num_layers,
            num_heads: self.num_heads,
            num_out_heads: self.num_out_heads,
            encoder: self.encoder,
            decoder: self.decoder,
            activation: self.activation,
            norm: self.norm,
            residual: self.residual,
            concat_hidden: self.concat_hidden,
            in_drop: self.in_drop,
            attn_drop: self.attn_drop,
            negative_slope: self.negative_slope,
            mask_rate: self.mask_rate,
            replace_rate: self.replace_rate,
            loss_fn: self.loss_fn,
            alpha_l: self.alpha_l,
        }
    }

    fn train_config(&self, device: &Device) -> TrainConfig {
        TrainConfig {
            optimizer: self.optimizer,
            learning_rate: self.lr,
            weight_decay: self.weight_decay,
            max_epoch: self.max_epoch,
            drop_edge_rate: self.drop_edge_rate,
            scheduler: self.scheduler,
            warmup_steps: self.warmup_steps,
            device: device.clone(),
            verbose: self.verbose,
            show_progress: !self.verbose,
        }
    }
}

/// Embed one sample: reduce features, build the spatial graph, train one
/// masked autoencoder per seed, extract embeddings, and cluster them.
pub fn run_embed(args: &EmbedArgs) -> anyhow::Result<()> {
    let sample = read_sample_folder(&args.data_dir)?;

    // fail fast on bad hyperparameters, before any training
    args.mgae_config().validate()?;

    info!(
        "spatial graph over {} spots, radius {}",
        sample.num_spots(),
        args.threshold_radius
    );
    let graph = SpatialGraph::from_coordinates(&sample.coordinates_n2, args.threshold_radius)?;
    info!(
        "{} edges, {} isolated spots",
        graph.num_edges(),
        graph.num_isolated()
    );

    let features_nd = reduce_features(args, &sample, &graph)?;

    let num_classes = match sample.num_label_classes() {
        Some(kk) => {
            info!("{} classes from the label file", kk);
            kk
        }
        None => args.num_classes,
    };

    mkdir(args.out.as_ref())?;

    let device = Device::Cpu;
    let x_nd = features_nd.to_tensor(&device)?;

    let mut aborted = vec![];
    for &seed in args.seeds.iter() {
        info!("training with seed {}", seed);
        if let Err(err) = run_one_seed(args, &x_nd, &graph, num_classes, seed, &device) {
            match err.downcast_ref::<Error>() {
                Some(Error::Numerical(what)) => {
                    log::error!("seed {} aborted: {}", seed, what);
                    aborted.push(seed);
                }
                _ => return Err(err),
            }
        }
    }

    if !aborted.is_empty() {
        anyhow::bail!(
            "{} of {} seed runs aborted on numerical errors: {:?}",
            aborted.len(),
            args.seeds.len(),
            aborted
        );
    }
    Ok(())
}

fn reduce_features(
    args: &EmbedArgs,
    sample: &SampleData,
    graph: &SpatialGraph,
) -> anyhow::Result<Mat> {
    match args.feature_dim_method {
        FeatureDimMethod::Pca => {
            info!(
                "PCA: {} genes -> {} features",
                sample.num_genes(),
                args.num_features
            );
            sample.features_ng.pca(args.num_features)
        }
        FeatureDimMethod::Degree => {
            info!("degree one-hot with {} bins", args.num_features);
            Ok(graph.degree_one_hot(args.num_features))
        }
    }
}

fn run_one_seed(
    args: &EmbedArgs,
    x_nd: &Tensor,
    graph: &SpatialGraph,
    num_classes: usize,
    seed: u64,
    device: &Device,
) -> anyhow::Result<()> {
    let variable_map = VarMap::new();
    let param_builder = VarBuilder::from_varmap(&variable_map, DType::F32, device);

    let model = build_mgae(&args.mgae_config(), param_builder)?;
    reseed_parameters(&variable_map, seed)?;

    let mut rng = StdRng::seed_from_u64(seed);
    let mut trainer = MgaeTrainer::build(&model, &variable_map);

    let loss_trace = trainer.train(
        x_nd,
        &graph.edges,
        graph.num_nodes(),
        &args.train_config(device),
        &mut rng,
    )?;

    let full_edges = GraphEdges::from_undirected(&graph.edges, graph.num_nodes(), device)?;
    let z_nk = model.embed(x_nd, &full_edges)?;

    let header = format!("{}.seed_{}", args.out, seed);

    let embedding_nk = Mat::from_tensor(&z_nk)?;
    embedding_nk.to_tsv(&(header.clone() + ".embedding.tsv.gz"))?;

    let clusters = embedding_nk.kmeans_rows(KmeansArgs {
        num_clusters: num_classes,
        max_iter: args.max_kmeans_iter,
    });
    let lines: Vec<Box<str>> = clusters
        .iter()
        .enumerate()
        .map(|(spot, label)| format!("{}\t{}", spot, label).into_boxed_str())
        .collect();
    write_lines(&lines, &(header.clone() + ".clusters.tsv.gz"))?;

    let lines: Vec<Box<str>> = loss_trace
        .iter()
        .enumerate()
        .map(|(epoch, loss)| format!("{}\t{}", epoch + 1, loss).into_boxed_str())
        .collect();
    write_lines(&lines, &(header.clone() + ".loss_trace.tsv.gz"))?;

    if args.save_model {
        variable_map.save(header + ".model.safetensors")?;
    }

    info!("finished seed {}", seed);
    Ok(())
}
