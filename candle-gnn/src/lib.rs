pub mod candle_gnn_config;
pub mod candle_gnn_layers;
pub mod candle_graph_edges;
pub mod candle_loss_functions;
pub mod candle_masking;
pub mod candle_mgae_inference;
pub mod candle_mgae_model;
pub mod candle_model_traits;
pub mod error;

pub use candle_core;
pub use candle_nn;
