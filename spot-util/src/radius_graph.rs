use candle_gnn::error::Error;
use dashmap::DashMap;
use indicatif::ParallelProgressIterator;
use log::info;
use nalgebra::DMatrix;
use nalgebra_sparse::{CooMatrix, CscMatrix};
use rayon::prelude::*;

type Mat = DMatrix<f32>;

/// brute-force all-pairs scan is fine up to this many spots
const BRUTE_FORCE_LIMIT: usize = 2048;
const DEFAULT_BLOCK_SIZE: usize = 1000;

/// Spatial neighbour graph over spot coordinates.
///
/// Spots `u`, `v` are connected iff their Euclidean distance is at most
/// the threshold radius. Symmetric, loop-free, deterministic for a
/// fixed input; isolated spots are allowed. Immutable for the duration
/// of a training run.
#[derive(Debug)]
pub struct SpatialGraph {
    /// symmetric CSC adjacency (n x n), values are distances
    pub adjacency: CscMatrix<f32>,
    /// sorted canonical edge list (i < j)
    pub edges: Vec<(usize, usize)>,
    /// Euclidean distances, parallel to `edges`
    pub distances: Vec<f32>,
    pub n_nodes: usize,
}

impl SpatialGraph {
    /// Build the graph from row-wise coordinates.
    ///
    /// * `coordinates` - n x d matrix, one spot per row
    /// * `threshold_radius` - connect spots within this distance
    pub fn from_coordinates(
        coordinates: &Mat,
        threshold_radius: f32,
    ) -> anyhow::Result<SpatialGraph> {
        if !(threshold_radius > 0.0) {
            return Err(Error::Configuration(format!(
                "threshold_radius {} must be positive",
                threshold_radius
            ))
            .into());
        }
        let nn = coordinates.nrows();
        if nn == 0 {
            return Err(Error::Data("no coordinates given".into()).into());
        }

        let mut triplets = if nn <= BRUTE_FORCE_LIMIT {
            Self::all_pairs_within(coordinates, threshold_radius)
        } else {
            Self::grid_pairs_within(coordinates, threshold_radius)
        };

        triplets.par_sort_by_key(|&(i, j, _)| (i, j));

        info!(
            "{} edges within radius {} over {} spots",
            triplets.len(),
            threshold_radius,
            nn
        );

        let mut coo = CooMatrix::new(nn, nn);
        for &(i, j, d) in triplets.iter() {
            coo.push(i, j, d);
            coo.push(j, i, d);
        }
        let adjacency = CscMatrix::from(&coo);

        let edges = triplets.iter().map(|&(i, j, _)| (i, j)).collect();
        let distances = triplets.iter().map(|&(_, _, d)| d).collect();

        Ok(SpatialGraph {
            adjacency,
            edges,
            distances,
            n_nodes: nn,
        })
    }

    /// every (i < j) pair, checked directly
    fn all_pairs_within(coordinates: &Mat, radius: f32) -> Vec<(usize, usize, f32)> {
        let nn = coordinates.nrows();
        let radius_sq = radius * radius;

        (0..nn)
            .into_par_iter()
            .flat_map_iter(|i| {
                let row_i = coordinates.row(i);
                (i + 1..nn).filter_map(move |j| {
                    let diff = row_i - coordinates.row(j);
                    let dist_sq = diff.norm_squared();
                    (dist_sq <= radius_sq).then(|| (i, j, dist_sq.sqrt()))
                })
            })
            .collect()
    }

    /// bucket spots into a uniform grid with cell size = radius, then
    /// scan only the 3 x 3 neighbourhood of each spot's cell
    fn grid_pairs_within(coordinates: &Mat, radius: f32) -> Vec<(usize, usize, f32)> {
        let nn = coordinates.nrows();
        let radius_sq = radius * radius;

        let grid: DashMap<(i64, i64), Vec<usize>> = DashMap::new();
        (0..nn).into_par_iter().for_each(|i| {
            grid.entry(cell_key(coordinates, radius, i))
                .or_default()
                .push(i);
        });
        let grid = &grid;

        let jobs = create_jobs(nn, DEFAULT_BLOCK_SIZE);
        let njobs = jobs.len() as u64;

        jobs.into_par_iter()
            .progress_count(njobs)
            .flat_map_iter(move |(lb, ub)| {
                (lb..ub).flat_map(move |i| {
                    let (cx, cy) = cell_key(coordinates, radius, i);
                    let row_i = coordinates.row(i);
                    let mut found = vec![];
                    for dx in -1..=1_i64 {
                        for dy in -1..=1_i64 {
                            if let Some(bucket) = grid.get(&(cx + dx, cy + dy)) {
                                for &j in bucket.iter() {
                                    if j <= i {
                                        continue;
                                    }
                                    let diff = row_i - coordinates.row(j);
                                    let dist_sq = diff.norm_squared();
                                    if dist_sq <= radius_sq {
                                        found.push((i, j, dist_sq.sqrt()));
                                    }
                                }
                            }
                        }
                    }
                    found
                })
            })
            .collect()
    }

    /// neighbours of `node` from the CSC adjacency
    pub fn neighbors(&self, node: usize) -> &[usize] {
        let offsets = self.adjacency.col_offsets();
        let start = offsets[node];
        let end = offsets[node + 1];
        &self.adjacency.row_indices()[start..end]
    }

    pub fn degree(&self, node: usize) -> usize {
        self.neighbors(node).len()
    }

    pub fn degrees(&self) -> Vec<usize> {
        (0..self.n_nodes).map(|v| self.degree(v)).collect()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn num_nodes(&self) -> usize {
        self.n_nodes
    }

    pub fn num_isolated(&self) -> usize {
        (0..self.n_nodes).filter(|&v| self.degree(v) == 0).count()
    }

    /// One-hot encoding of node degrees, the structural alternative to
    /// expression-based features. Degrees at or above `num_bins - 1`
    /// share the last bin.
    pub fn degree_one_hot(&self, num_bins: usize) -> Mat {
        let mut ret = Mat::zeros(self.n_nodes, num_bins);
        for (v, &deg) in self.degrees().iter().enumerate() {
            let bin = deg.min(num_bins - 1);
            ret[(v, bin)] = 1.0;
        }
        ret
    }
}

fn cell_key(coordinates: &Mat, radius: f32, i: usize) -> (i64, i64) {
    let x = coordinates[(i, 0)];
    let y = if coordinates.ncols() > 1 {
        coordinates[(i, 1)]
    } else {
        0.0
    };
    ((x / radius).floor() as i64, (y / radius).floor() as i64)
}

fn create_jobs(ntot: usize, block_size: usize) -> Vec<(usize, usize)> {
    let block_size = block_size.max(1);
    let nblock = ntot.div_ceil(block_size);
    (0..nblock)
        .map(|block| {
            let lb = block * block_size;
            let ub = ((block + 1) * block_size).min(ntot);
            (lb, ub)
        })
        .collect()
}
