use crate::candle_gnn_config::OptimizerKind;
use crate::candle_graph_edges::{drop_edges, GraphEdges};
use crate::candle_mgae_model::MaskedGraphAutoencoder;
use crate::candle_model_traits::{GraphDecoderModuleT, GraphEncoderModuleT};
use crate::error::{Error, Result};

use candle_core::{Device, Tensor, Var};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarMap, SGD};
use indicatif::{ProgressBar, ProgressDrawTarget};
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

pub struct TrainConfig {
    pub optimizer: OptimizerKind,
    pub learning_rate: f32,
    pub weight_decay: f32,
    pub max_epoch: usize,
    pub drop_edge_rate: f32,
    pub scheduler: bool,
    /// linear warmup epochs before cosine decay; `<= 0` disables warmup
    pub warmup_steps: i64,
    pub device: Device,
    pub verbose: bool,
    pub show_progress: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            optimizer: OptimizerKind::AdamW,
            learning_rate: 1e-3,
            weight_decay: 2e-4,
            max_epoch: 500,
            drop_edge_rate: 0.0,
            scheduler: true,
            warmup_steps: -1,
            device: Device::Cpu,
            verbose: false,
            show_progress: true,
        }
    }
}

/// Warmup-then-cosine learning rate
///
/// Linear ramp over the first `warmup_steps` epochs, then cosine decay
/// to zero over the remaining epochs.
pub fn scheduled_lr(base_lr: f64, epoch: usize, max_epoch: usize, warmup_steps: i64) -> f64 {
    let warmup = warmup_steps.max(0) as usize;
    if warmup > 0 && epoch < warmup {
        return base_lr * (epoch + 1) as f64 / warmup as f64;
    }
    let span = max_epoch.saturating_sub(warmup).max(1) as f64;
    let tt = (epoch - warmup) as f64 / span;
    0.5 * base_lr * (1.0 + (std::f64::consts::PI * tt).cos())
}

enum Optim {
    AdamW(AdamW),
    Sgd(SGD),
}

impl Optim {
    fn new(kind: OptimizerKind, vars: Vec<Var>, lr: f64, weight_decay: f64) -> Result<Optim> {
        match kind {
            OptimizerKind::AdamW => Ok(Optim::AdamW(AdamW::new(
                vars,
                ParamsAdamW {
                    lr,
                    weight_decay,
                    ..Default::default()
                },
            )?)),
            OptimizerKind::Sgd => Ok(Optim::Sgd(SGD::new(vars, lr)?)),
        }
    }

    fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        match self {
            Optim::AdamW(opt) => Ok(opt.backward_step(loss)?),
            Optim::Sgd(opt) => Ok(opt.backward_step(loss)?),
        }
    }

    fn set_learning_rate(&mut self, lr: f64) {
        match self {
            Optim::AdamW(opt) => opt.set_learning_rate(lr),
            Optim::Sgd(opt) => opt.set_learning_rate(lr),
        }
    }
}

/// Re-draw every randomly initialized parameter from a seeded stream.
///
/// The CPU tensor backend cannot be seeded, so per-seed reproducibility
/// of the initial state is recovered by overwriting the
/// Kaiming-initialized weights (linear and attention parameters) in
/// name order. Deterministically initialized parameters (biases, the
/// mask token, norm scales, running statistics) are left alone.
pub fn reseed_parameters(variable_map: &VarMap, seed: u64) -> Result<()> {
    let data = variable_map.data().lock().expect("variable map lock");
    let mut names: Vec<String> = data.keys().cloned().collect();
    names.sort();

    let mut rng = StdRng::seed_from_u64(seed);

    for name in names {
        if !random_init_parameter(&name) {
            continue;
        }
        let var = &data[&name];
        let dims = var.dims().to_vec();
        let fan_in = dims.last().copied().unwrap_or(1).max(1) as f32;
        let stdev = (2.0 / fan_in).sqrt();
        let normal =
            Normal::new(0.0, stdev).map_err(|err| Error::Numerical(err.to_string()))?;

        let count: usize = dims.iter().product();
        let values: Vec<f32> = (0..count).map(|_| normal.sample(&mut rng)).collect();
        let fresh = Tensor::from_vec(values, dims, var.device())?;
        var.set(&fresh)?;
    }
    Ok(())
}

fn random_init_parameter(name: &str) -> bool {
    let weight = name.ends_with(".weight") && !name.contains(".bn.") && !name.contains(".ln.");
    weight || name.ends_with(".attn_l") || name.ends_with(".attn_r")
}

/// Drives self-supervised training of a masked graph autoencoder.
pub struct MgaeTrainer<'a, Enc, Dec>
where
    Enc: GraphEncoderModuleT,
    Dec: GraphDecoderModuleT,
{
    pub model: &'a MaskedGraphAutoencoder<Enc, Dec>,
    pub variable_map: &'a VarMap,
}

impl<'a, Enc, Dec> MgaeTrainer<'a, Enc, Dec>
where
    Enc: GraphEncoderModuleT,
    Dec: GraphDecoderModuleT,
{
    pub fn build(
        model: &'a MaskedGraphAutoencoder<Enc, Dec>,
        variable_map: &'a VarMap,
    ) -> Self {
        Self {
            model,
            variable_map,
        }
    }

    /// Train for `config.max_epoch` epochs on one graph.
    ///
    /// * `x_nd` - uncorrupted reduced features (n x d), already on the
    ///   target device
    /// * `edges` - undirected canonical edge list of the spatial graph
    /// * `num_nodes` - n (isolated nodes included)
    ///
    /// Returns the per-epoch loss trace. A non-finite loss aborts the
    /// run with a numerical error.
    pub fn train(
        &mut self,
        x_nd: &Tensor,
        edges: &[(usize, usize)],
        num_nodes: usize,
        config: &TrainConfig,
        rng: &mut StdRng,
    ) -> Result<Vec<f32>> {
        let device = &config.device;
        let base_lr = config.learning_rate as f64;

        let mut opt = Optim::new(
            config.optimizer,
            self.variable_map.all_vars(),
            base_lr,
            config.weight_decay as f64,
        )?;

        let pb = ProgressBar::new(config.max_epoch as u64);
        if !config.show_progress || config.verbose {
            pb.set_draw_target(ProgressDrawTarget::hidden());
        }

        let full_edges = GraphEdges::from_undirected(edges, num_nodes, device)?;
        let mut loss_trace = Vec::with_capacity(config.max_epoch);

        for epoch in 0..config.max_epoch {
            if config.scheduler {
                opt.set_learning_rate(scheduled_lr(
                    base_lr,
                    epoch,
                    config.max_epoch,
                    config.warmup_steps,
                ));
            }

            let dropped;
            let epoch_edges = if config.drop_edge_rate > 0.0 {
                let kept = drop_edges(edges, config.drop_edge_rate, rng);
                dropped = GraphEdges::from_undirected(&kept, num_nodes, device)?;
                &dropped
            } else {
                &full_edges
            };

            let (loss, record) = self.model.forward_step(x_nd, epoch_edges, rng)?;

            let loss = match loss {
                Some(loss) => loss,
                None => {
                    // empty mask draw: nothing to reconstruct this epoch
                    loss_trace.push(0.0);
                    pb.inc(1);
                    continue;
                }
            };

            let loss_val = loss.to_scalar::<f32>()?;
            if !loss_val.is_finite() {
                return Err(Error::Numerical(format!(
                    "loss became {} at epoch {} ({} masked nodes)",
                    loss_val,
                    epoch + 1,
                    record.len()
                )));
            }

            opt.backward_step(&loss)?;
            loss_trace.push(loss_val);
            pb.inc(1);

            if config.verbose {
                info!("[{}] loss: {}", epoch + 1, loss_val);
            }
        }

        pb.finish_and_clear();
        Ok(loss_trace)
    }
}
