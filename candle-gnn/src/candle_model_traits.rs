use crate::candle_graph_edges::GraphEdges;
use crate::error::Result;
use candle_core::Tensor;

pub trait GraphEncoderModuleT {
    /// Map node features and graph structure to latent node states
    ///
    /// # Arguments
    /// * `x_nd` - input features (n x d)
    /// * `edges` - directed message-passing edges
    /// * `train` - whether to use dropout/batchnorm statistics
    ///
    /// # Returns `z_nk` - latent states (n x k)
    fn forward_t(&self, x_nd: &Tensor, edges: &GraphEdges, train: bool) -> Result<Tensor>;

    fn dim_obs(&self) -> usize;

    fn dim_latent(&self) -> usize;
}

pub trait GraphDecoderModuleT {
    /// Map latent node states back to the observed feature space
    fn forward_t(&self, z_nk: &Tensor, edges: &GraphEdges, train: bool) -> Result<Tensor>;

    fn dim_obs(&self) -> usize;

    fn dim_latent(&self) -> usize;
}
