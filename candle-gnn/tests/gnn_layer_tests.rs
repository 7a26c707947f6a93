use candle_core::{DType, Device, Tensor};
use candle_gnn::candle_gnn_config::{ActKind, GnnArch, LossKind, MgaeConfig, NormKind};
use candle_gnn::candle_graph_edges::GraphEdges;
use candle_gnn::candle_mgae_inference::{reseed_parameters, MgaeTrainer, TrainConfig};
use candle_gnn::candle_mgae_model::build_mgae;
use candle_gnn::error::{Error, Result};
use candle_nn::{VarBuilder, VarMap};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn small_config(in_dim: usize, num_hidden: usize) -> MgaeConfig {
    MgaeConfig {
        in_dim,
        num_hidden,
        num_layers: 2,
        num_heads: 2,
        num_out_heads: 1,
        encoder: GnnArch::Gin,
        decoder: GnnArch::Gin,
        activation: ActKind::Elu,
        norm: NormKind::LayerNorm,
        residual: false,
        concat_hidden: false,
        in_drop: 0.0,
        attn_drop: 0.0,
        negative_slope: 0.2,
        mask_rate: 0.5,
        replace_rate: 0.1,
        loss_fn: LossKind::Sce,
        alpha_l: 2.0,
    }
}

fn random_features(nn: usize, dd: usize, seed: u64) -> Tensor {
    use rand::Rng;
    let mut rng = StdRng::seed_from_u64(seed);
    let data: Vec<f32> = (0..nn * dd).map(|_| rng.random::<f32>()).collect();
    Tensor::from_vec(data, (nn, dd), &Device::Cpu).unwrap()
}

/// Undirected axis-adjacency edges of a `rows x cols` grid
fn grid_edges(rows: usize, cols: usize) -> Vec<(usize, usize)> {
    let mut edges = vec![];
    for r in 0..rows {
        for c in 0..cols {
            let i = r * cols + c;
            if c + 1 < cols {
                edges.push((i, i + 1));
            }
            if r + 1 < rows {
                edges.push((i, i + cols));
            }
        }
    }
    edges
}

fn all_finite(t: &Tensor) -> bool {
    t.to_vec2::<f32>()
        .unwrap()
        .iter()
        .all(|row| row.iter().all(|x| x.is_finite()))
}

#[test]
fn embedding_has_expected_shape_for_both_families() -> Result<()> {
    let (nn, dd, kk) = (30, 8, 16);
    let x = random_features(nn, dd, 0);
    let edges = GraphEdges::from_undirected(&grid_edges(5, 6), nn, &Device::Cpu)?;

    for arch in [GnnArch::Gin, GnnArch::Gat] {
        let mut cfg = small_config(dd, kk);
        cfg.encoder = arch;
        cfg.decoder = arch;

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let model = build_mgae(&cfg, vb)?;

        let z = model.embed(&x, &edges)?;
        assert_eq!(z.dims2()?, (nn, kk));
        assert!(all_finite(&z));
    }
    Ok(())
}

#[test]
fn concat_hidden_widens_the_embedding() -> Result<()> {
    let (nn, dd, kk) = (20, 6, 12);
    let x = random_features(nn, dd, 1);
    let edges = GraphEdges::from_undirected(&grid_edges(4, 5), nn, &Device::Cpu)?;

    let mut cfg = small_config(dd, kk);
    cfg.concat_hidden = true;

    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let model = build_mgae(&cfg, vb)?;

    let z = model.embed(&x, &edges)?;
    assert_eq!(z.dims2()?, (nn, kk * cfg.num_layers));
    Ok(())
}

#[test]
fn isolated_nodes_get_finite_embeddings() -> Result<()> {
    let (nn, dd, kk) = (10, 4, 8);
    let x = random_features(nn, dd, 2);
    // nodes 8 and 9 have no neighbours at all
    let edges = GraphEdges::from_undirected(&grid_edges(2, 4), nn, &Device::Cpu)?;

    for arch in [GnnArch::Gin, GnnArch::Gat] {
        let mut cfg = small_config(dd, kk);
        cfg.encoder = arch;
        cfg.decoder = arch;

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let model = build_mgae(&cfg, vb)?;

        let z = model.embed(&x, &edges)?;
        assert_eq!(z.dim(0)?, nn);
        assert!(all_finite(&z), "{:?} produced non-finite rows", arch);
    }
    Ok(())
}

#[test]
fn embedding_extraction_is_pure() -> Result<()> {
    let (nn, dd, kk) = (25, 8, 16);
    let x = random_features(nn, dd, 3);
    let edges = GraphEdges::from_undirected(&grid_edges(5, 5), nn, &Device::Cpu)?;

    let mut cfg = small_config(dd, kk);
    cfg.encoder = GnnArch::Gat;
    cfg.in_drop = 0.2;
    cfg.attn_drop = 0.1;

    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let model = build_mgae(&cfg, vb)?;

    let first = model.embed(&x, &edges)?.to_vec2::<f32>()?;
    let second = model.embed(&x, &edges)?.to_vec2::<f32>()?;
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn reseeded_parameters_are_reproducible() -> Result<()> {
    let (nn, dd, kk) = (12, 6, 8);
    let x = random_features(nn, dd, 4);
    let edges = GraphEdges::from_undirected(&grid_edges(3, 4), nn, &Device::Cpu)?;
    let cfg = small_config(dd, kk);

    let mut outputs = vec![];
    for _ in 0..2 {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let model = build_mgae(&cfg, vb)?;
        reseed_parameters(&varmap, 42)?;
        outputs.push(model.embed(&x, &edges)?.to_vec2::<f32>()?);
    }
    assert_eq!(outputs[0], outputs[1]);
    Ok(())
}

#[test]
fn zero_epoch_training_still_embeds() -> Result<()> {
    let (nn, dd, kk) = (16, 5, 8);
    let x = random_features(nn, dd, 5);
    let edges = grid_edges(4, 4);
    let cfg = small_config(dd, kk);

    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let model = build_mgae(&cfg, vb)?;

    let mut trainer = MgaeTrainer::build(&model, &varmap);
    let mut rng = StdRng::seed_from_u64(0);
    let train_cfg = TrainConfig {
        max_epoch: 0,
        show_progress: false,
        ..Default::default()
    };

    let trace = trainer.train(&x, &edges, nn, &train_cfg, &mut rng)?;
    assert!(trace.is_empty());

    let full = GraphEdges::from_undirected(&edges, nn, &Device::Cpu)?;
    let z = model.embed(&x, &full)?;
    assert!(all_finite(&z));
    Ok(())
}

#[test]
fn grid_training_produces_finite_embeddings() -> Result<()> {
    // the 500-spot grid scenario, at the tensor level
    let (rows, cols) = (25, 20);
    let nn = rows * cols;
    let dd = 16;
    let x = random_features(nn, dd, 6);
    let edges = grid_edges(rows, cols);

    let mut cfg = small_config(dd, 32);
    cfg.mask_rate = 0.5;
    cfg.in_drop = 0.1;

    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let model = build_mgae(&cfg, vb)?;
    reseed_parameters(&varmap, 0)?;

    let mut trainer = MgaeTrainer::build(&model, &varmap);
    let mut rng = StdRng::seed_from_u64(0);
    let train_cfg = TrainConfig {
        max_epoch: 5,
        drop_edge_rate: 0.1,
        show_progress: false,
        ..Default::default()
    };

    let trace = trainer.train(&x, &edges, nn, &train_cfg, &mut rng)?;
    assert_eq!(trace.len(), 5);
    assert!(trace.iter().all(|l| l.is_finite()));

    let full = GraphEdges::from_undirected(&edges, nn, &Device::Cpu)?;
    let z = model.embed(&x, &full)?;
    assert_eq!(z.dims2()?, (nn, 32));
    assert!(all_finite(&z));
    Ok(())
}

#[test]
fn training_reduces_reconstruction_loss() -> Result<()> {
    let (rows, cols) = (10, 10);
    let nn = rows * cols;
    let dd = 8;
    let x = random_features(nn, dd, 7);
    let edges = grid_edges(rows, cols);

    let mut cfg = small_config(dd, 16);
    cfg.mask_rate = 0.3;
    cfg.replace_rate = 0.0;

    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let model = build_mgae(&cfg, vb)?;
    reseed_parameters(&varmap, 1)?;

    let mut trainer = MgaeTrainer::build(&model, &varmap);
    let mut rng = StdRng::seed_from_u64(1);
    let train_cfg = TrainConfig {
        max_epoch: 60,
        learning_rate: 5e-3,
        scheduler: false,
        show_progress: false,
        ..Default::default()
    };

    let trace = trainer.train(&x, &edges, nn, &train_cfg, &mut rng)?;
    let head: f32 = trace[..10].iter().sum::<f32>() / 10.0;
    let tail: f32 = trace[trace.len() - 10..].iter().sum::<f32>() / 10.0;
    assert!(
        tail < head,
        "loss did not decrease: head {} tail {}",
        head,
        tail
    );
    Ok(())
}

#[test]
fn mismatched_feature_width_is_a_dimension_error() -> Result<()> {
    use candle_gnn::candle_gnn_layers::{gnn_stack, HeadMode, StackArgs};
    use candle_gnn::candle_mgae_model::MaskedGraphAutoencoder;

    let cfg = small_config(8, 16);
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);

    let stack_args = |in_dim, out_dim, activate_last| StackArgs {
        arch: GnnArch::Gin,
        in_dim,
        hidden_dim: 16,
        out_dim,
        num_layers: 1,
        num_heads: 2,
        num_out_heads: 1,
        activation: ActKind::Elu,
        norm: NormKind::None,
        residual: false,
        in_drop: 0.0,
        attn_drop: 0.0,
        negative_slope: 0.2,
        concat_hidden: false,
        activate_last,
        final_head_mode: HeadMode::Mean,
    };

    let encoder = gnn_stack(&stack_args(8, 16, true), vb.pp("encoder"))?;
    // decoder reconstructs the wrong width (12 != 8)
    let decoder = gnn_stack(&stack_args(16, 12, false), vb.pp("decoder"))?;

    let out = MaskedGraphAutoencoder::new(encoder, decoder, &cfg, vb);
    assert!(matches!(out, Err(Error::Dimension(_))));
    Ok(())
}
