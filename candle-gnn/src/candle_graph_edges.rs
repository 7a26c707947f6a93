use crate::error::Result;
use candle_core::{Device, Tensor};
use rand::rngs::StdRng;
use rand::Rng;

/// Directed edge index tensors for message passing.
///
/// Built from an undirected canonical edge list: every `(i, j)` becomes
/// both `i -> j` and `j -> i`, and one self-edge `v -> v` is appended per
/// node so that degree-zero nodes still pass their own features through
/// every layer. The adjacency structure upstream stays loop-free; the
/// self-edges exist only in this tensorized view.
pub struct GraphEdges {
    /// message source node per directed edge
    pub src: Tensor,
    /// message destination node per directed edge
    pub dst: Tensor,
    pub num_nodes: usize,
    pub num_edges: usize,
}

impl GraphEdges {
    /// * `edges` - undirected `(i, j)` pairs, no self-loops
    /// * `num_nodes` - total node count (isolated nodes included)
    pub fn from_undirected(
        edges: &[(usize, usize)],
        num_nodes: usize,
        device: &Device,
    ) -> Result<GraphEdges> {
        let num_directed = edges.len() * 2 + num_nodes;
        let mut src = Vec::with_capacity(num_directed);
        let mut dst = Vec::with_capacity(num_directed);

        for &(i, j) in edges {
            src.push(i as u32);
            dst.push(j as u32);
            src.push(j as u32);
            dst.push(i as u32);
        }
        for v in 0..num_nodes {
            src.push(v as u32);
            dst.push(v as u32);
        }

        Ok(GraphEdges {
            src: Tensor::from_vec(src, (num_directed,), device)?,
            dst: Tensor::from_vec(dst, (num_directed,), device)?,
            num_nodes,
            num_edges: num_directed,
        })
    }
}

/// Uniformly subsample an undirected edge list, keeping each edge with
/// probability `1 - drop_rate`. Used once per epoch to derive the
/// transient augmented graph; the input list is untouched and self-edges
/// (added later by `GraphEdges::from_undirected`) are never dropped.
pub fn drop_edges(
    edges: &[(usize, usize)],
    drop_rate: f32,
    rng: &mut StdRng,
) -> Vec<(usize, usize)> {
    if drop_rate <= 0.0 {
        return edges.to_vec();
    }
    edges
        .iter()
        .copied()
        .filter(|_| rng.random::<f32>() >= drop_rate)
        .collect()
}
