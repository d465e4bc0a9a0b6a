//! Persisted training artifacts and the in-memory model cache.

use crate::clustering::{self, KMeansModel};
use crate::preprocessing::{Projection, Standardizer};
use chrono::{DateTime, Utc};
use ndarray::Array2;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use shopper_core::config::ClusteringAlgorithm;
use shopper_core::{AnalyticsError, AnalyticsResult};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Clusterer {
    Kmeans { model: KMeansModel },
    /// DBSCAN keeps no centroids and cannot label unseen users.
    Dbscan { n_clusters: usize },
}

/// Everything needed to place a new user: the fitted scaler, the optional
/// projection, the clusterer, and the cluster → segment id mapping.
#[derive(Serialize, Deserialize)]
pub struct ModelSnapshot {
    pub algorithm: ClusteringAlgorithm,
    pub scaler: Standardizer,
    pub pca: Option<Projection>,
    pub clusterer: Clusterer,
    pub segment_ids: BTreeMap<usize, String>,
    pub silhouette_score: f64,
    pub trained_at: DateTime<Utc>,
}

impl ModelSnapshot {
    /// Scales with the fitted scaler, then projects when PCA was used.
    pub fn project(&self, row: &[f64]) -> AnalyticsResult<Vec<f64>> {
        let data = Array2::from_shape_vec((1, row.len()), row.to_vec())
            .map_err(|e| AnalyticsError::InvalidInput(e.to_string()))?;
        let scaled = self.scaler.transform(&data)?;
        let projected = match &self.pca {
            Some(pca) => pca.transform(&scaled),
            None => scaled,
        };
        Ok(projected.iter().copied().collect())
    }

    pub fn predict_label(&self, row: &[f64]) -> AnalyticsResult<usize> {
        match &self.clusterer {
            Clusterer::Kmeans { model } => clustering::predict_one(model, &self.project(row)?),
            Clusterer::Dbscan { .. } => Err(AnalyticsError::Model(
                "DBSCAN models cannot assign unseen users".into(),
            )),
        }
    }

    pub fn segment_for(&self, row: &[f64]) -> AnalyticsResult<Option<&str>> {
        let label = self.predict_label(row)?;
        Ok(self.segment_ids.get(&label).map(String::as_str))
    }

    pub async fn save(&self, path: &Path) -> AnalyticsResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, serde_json::to_vec_pretty(self)?).await?;
        info!(path = %path.display(), "Saved segmentation model");
        Ok(())
    }

    pub async fn load(path: &Path) -> AnalyticsResult<Self> {
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AnalyticsError::ModelNotReady(format!(
                    "no trained model at {}",
                    path.display()
                )))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&raw)?)
    }
}

/// Lazily loads the persisted snapshot and keeps it until replaced.
pub struct ModelCache {
    path: PathBuf,
    current: RwLock<Option<Arc<ModelSnapshot>>>,
}

impl ModelCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            current: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn get(&self) -> AnalyticsResult<Arc<ModelSnapshot>> {
        let cached = self.current.read().clone();
        if let Some(snapshot) = cached {
            metrics::counter!("segmentation.model_cache.hit").increment(1);
            return Ok(snapshot);
        }
        metrics::counter!("segmentation.model_cache.miss").increment(1);
        let loaded = Arc::new(ModelSnapshot::load(&self.path).await?);
        info!(path = %self.path.display(), "Loaded segmentation model");
        *self.current.write() = Some(loaded.clone());
        Ok(loaded)
    }

    /// Persists a freshly trained snapshot and makes it current.
    pub async fn replace(&self, snapshot: ModelSnapshot) -> AnalyticsResult<Arc<ModelSnapshot>> {
        snapshot.save(&self.path).await?;
        let snapshot = Arc::new(snapshot);
        *self.current.write() = Some(snapshot.clone());
        Ok(snapshot)
    }

    pub fn invalidate(&self) {
        *self.current.write() = None;
    }

    pub fn is_loaded(&self) -> bool {
        self.current.read().is_some()
    }
}
