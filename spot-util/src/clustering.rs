//! K-means assignment of embedding rows to spatial domains
//!
//! Thin orchestration over the `clustering` crate; the algorithm itself
//! is off the shelf.

use nalgebra::DMatrix;

/// Arguments for k-means clustering
#[derive(Debug, Clone)]
pub struct KmeansArgs {
    /// Number of clusters
    pub num_clusters: usize,
    /// Maximum number of iterations
    pub max_iter: usize,
}

impl Default for KmeansArgs {
    fn default() -> Self {
        Self {
            num_clusters: 1,
            max_iter: 100,
        }
    }
}

impl KmeansArgs {
    pub fn with_clusters(num_clusters: usize) -> Self {
        Self {
            num_clusters,
            ..Default::default()
        }
    }
}

pub trait Kmeans {
    /// Cluster rows and return one label per row
    fn kmeans_rows(&self, args: KmeansArgs) -> Vec<usize>;
}

impl Kmeans for DMatrix<f32> {
    fn kmeans_rows(&self, args: KmeansArgs) -> Vec<usize> {
        if args.num_clusters <= 1 || self.nrows() == 0 {
            return vec![0; self.nrows()];
        }

        let data: Vec<Vec<f32>> = self
            .row_iter()
            .map(|row| row.iter().cloned().collect())
            .collect();

        let clust = clustering::kmeans(args.num_clusters, &data, args.max_iter);
        clust.membership
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_well_separated_blobs_split_cleanly() {
        let mat = DMatrix::from_row_slice(
            6,
            2,
            &[
                0.0, 0.0, //
                0.1, 0.1, //
                0.2, 0.0, //
                10.0, 10.0, //
                10.1, 10.1, //
                10.2, 10.0, //
            ],
        );

        let labels = mat.kmeans_rows(KmeansArgs::with_clusters(2));
        assert_eq!(labels.len(), 6);
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[1], labels[2]);
        assert_eq!(labels[3], labels[4]);
        assert_eq!(labels[4], labels[5]);
        assert_ne!(labels[0], labels[3]);
    }

    #[test]
    fn single_cluster_is_trivial() {
        let mat = DMatrix::from_row_slice(3, 2, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let labels = mat.kmeans_rows(KmeansArgs::with_clusters(1));
        assert_eq!(labels, vec![0, 0, 0]);
    }

    #[test]
    fn empty_matrix_yields_no_labels() {
        let mat: DMatrix<f32> = DMatrix::zeros(0, 0);
        assert!(mat.kmeans_rows(KmeansArgs::with_clusters(3)).is_empty());
    }
}
