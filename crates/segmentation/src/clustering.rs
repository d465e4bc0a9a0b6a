//! k-means and DBSCAN over the prepared training points.

use crate::preprocessing::model_error;
use linfa::prelude::*;
use linfa_clustering::{Dbscan, KMeans};
use linfa_nn::distance::L2Dist;
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shopper_core::{AnalyticsError, AnalyticsResult};
use tracing::debug;

pub type KMeansModel = KMeans<f64, L2Dist>;

#[derive(Debug, Clone, Copy)]
pub struct KMeansParams {
    pub n_clusters: usize,
    pub n_init: usize,
    pub max_iter: usize,
    pub tolerance: f64,
    pub seed: u64,
}

impl KMeansParams {
    pub fn new(n_clusters: usize, seed: u64) -> Self {
        Self {
            n_clusters,
            n_init: 10,
            max_iter: 300,
            tolerance: 1e-4,
            seed,
        }
    }
}

/// Fits with several seeded restarts and keeps the lowest-inertia run.
/// Returns the model and the label of every point.
pub fn fit_kmeans(
    points: &Array2<f64>,
    params: &KMeansParams,
) -> AnalyticsResult<(KMeansModel, Vec<usize>)> {
    if params.n_clusters == 0 || params.n_clusters > points.nrows() {
        return Err(AnalyticsError::InvalidInput(format!(
            "n_clusters must be between 1 and {}, got {}",
            points.nrows(),
            params.n_clusters
        )));
    }
    let dataset = DatasetBase::from(points.clone());
    let model = KMeans::params_with_rng(params.n_clusters, StdRng::seed_from_u64(params.seed))
        .n_runs(params.n_init.max(1))
        .max_n_iterations(params.max_iter as u64)
        .tolerance(params.tolerance)
        .fit(&dataset)
        .map_err(model_error)?;
    let labels: Array1<usize> = model.predict(points);
    debug!(clusters = params.n_clusters, rows = points.nrows(), "k-means fitted");
    Ok((model, labels.to_vec()))
}

/// Nearest-centroid label for one point.
pub fn predict_one(model: &KMeansModel, point: &[f64]) -> AnalyticsResult<usize> {
    let row = Array2::from_shape_vec((1, point.len()), point.to_vec()).map_err(model_error)?;
    let labels: Array1<usize> = model.predict(&row);
    labels
        .first()
        .copied()
        .ok_or_else(|| AnalyticsError::Model("k-means produced no label".into()))
}

/// `min_samples` counts the point itself. Points that are not
/// density-reachable from a core point are noise (`None`).
pub fn dbscan(
    points: &Array2<f64>,
    eps: f64,
    min_samples: usize,
) -> AnalyticsResult<Vec<Option<usize>>> {
    let labels: Array1<Option<usize>> = Dbscan::params(min_samples)
        .tolerance(eps)
        .check()
        .map_err(model_error)?
        .transform(points);
    Ok(labels.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::collections::HashSet;

    fn blobs() -> Array2<f64> {
        array![
            [0.0, 0.0],
            [0.1, 0.0],
            [0.0, 0.1],
            [10.0, 10.0],
            [10.1, 10.0],
            [10.0, 10.1],
        ]
    }

    #[test]
    fn test_kmeans_separates_blobs_and_predicts() {
        let points = blobs();
        let (model, labels) = fit_kmeans(&points, &KMeansParams::new(2, 42)).expect("fit");
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[1], labels[2]);
        assert_eq!(labels[3], labels[4]);
        assert_ne!(labels[0], labels[3]);
        assert_eq!(predict_one(&model, &[9.0, 9.5]).expect("predict"), labels[3]);
        assert_eq!(predict_one(&model, &[0.5, -0.2]).expect("predict"), labels[0]);
    }

    #[test]
    fn test_kmeans_is_deterministic_for_a_seed() {
        let points = blobs();
        let (_, a) = fit_kmeans(&points, &KMeansParams::new(3, 7)).expect("fit");
        let (_, b) = fit_kmeans(&points, &KMeansParams::new(3, 7)).expect("fit");
        assert_eq!(a, b);
    }

    #[test]
    fn test_kmeans_labels_are_distinct_with_duplicate_points() {
        let points = array![[1.0, 1.0], [1.0, 1.0], [1.0, 1.0], [5.0, 5.0], [9.0, 9.0]];
        let (_, labels) = fit_kmeans(&points, &KMeansParams::new(3, 42)).expect("fit");
        let distinct: HashSet<usize> = labels.iter().copied().collect();
        assert_eq!(distinct.len(), 3);
        assert_eq!(labels[0], labels[2]);
    }

    #[test]
    fn test_kmeans_rejects_more_clusters_than_points() {
        let points = array![[0.0], [1.0]];
        assert!(matches!(
            fit_kmeans(&points, &KMeansParams::new(3, 42)),
            Err(AnalyticsError::InvalidInput(_))
        ));
        assert!(fit_kmeans(&points, &KMeansParams::new(0, 42)).is_err());
    }

    #[test]
    fn test_dbscan_marks_outliers_as_noise() {
        let points = array![
            [0.0, 0.0],
            [0.1, 0.0],
            [0.0, 0.1],
            [10.0, 10.0],
            [10.1, 10.0],
            [10.0, 10.1],
            [50.0, -50.0],
        ];
        let labels = dbscan(&points, 0.5, 3).expect("dbscan");
        assert_eq!(labels[6], None);
        assert!(labels[..3].iter().all(|l| l.is_some() && *l == labels[0]));
        assert!(labels[3..6].iter().all(|l| l.is_some() && *l == labels[3]));
        assert_ne!(labels[0], labels[3]);
    }

    #[test]
    fn test_dbscan_rejects_invalid_parameters() {
        assert!(matches!(
            dbscan(&blobs(), 0.5, 1),
            Err(AnalyticsError::Model(_))
        ));
    }
}
