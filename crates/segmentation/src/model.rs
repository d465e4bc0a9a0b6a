//! Segmentation model: batch training over all users and single-user
//! prediction against the persisted snapshot.

use crate::clustering::{self, KMeansParams};
use crate::naming::{self, UNKNOWN_SEGMENT};
use crate::preprocessing::{Projection, Standardizer};
use crate::silhouette::silhouette_score;
use crate::snapshot::{Clusterer, ModelCache, ModelSnapshot};
use chrono::{DateTime, Utc};
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use shopper_core::config::{ClusteringAlgorithm, SegmentationConfig};
use shopper_core::types::{Segment, SegmentCharacteristics, User};
use shopper_core::{AnalyticsError, AnalyticsResult, AnalyticsStore};
use shopper_features::vectors::to_model_feature_vector;
use shopper_features::FeaturePipeline;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// PCA only applies when the model vector is wider than this.
const PCA_MIN_FEATURES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingParams {
    pub algorithm: ClusteringAlgorithm,
    pub n_clusters: usize,
    pub use_pca: bool,
}

impl TrainingParams {
    pub fn from_config(config: &SegmentationConfig) -> Self {
        Self {
            algorithm: config.algorithm,
            n_clusters: config.n_clusters,
            use_pca: config.use_pca,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub algorithm: ClusteringAlgorithm,
    /// Distinct non-noise cluster labels.
    pub n_clusters: usize,
    pub silhouette_score: f64,
    pub segments_created: usize,
    pub users_segmented: usize,
    pub noise_users: usize,
    pub users_without_features: usize,
    pub pca_components: Option<usize>,
    pub segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrainingOutcome {
    Success(TrainingSummary),
    Error { message: String },
}

impl TrainingOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn summary(&self) -> Option<&TrainingSummary> {
        match self {
            Self::Success(summary) => Some(summary),
            Self::Error { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentReport {
    pub assigned: usize,
    pub unassigned: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentStat {
    pub segment_id: String,
    pub segment_name: String,
    pub user_count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentStatistics {
    pub total_segments: usize,
    pub total_users: usize,
    pub segments: Vec<SegmentStat>,
}

pub struct SegmentationModel {
    store: Arc<dyn AnalyticsStore>,
    pipeline: FeaturePipeline,
    config: SegmentationConfig,
    cache: Arc<ModelCache>,
}

impl SegmentationModel {
    pub fn new(
        store: Arc<dyn AnalyticsStore>,
        pipeline: FeaturePipeline,
        config: SegmentationConfig,
    ) -> Self {
        let cache = Arc::new(ModelCache::new(&config.model_path));
        Self {
            store,
            pipeline,
            config,
            cache,
        }
    }

    pub fn cache(&self) -> &Arc<ModelCache> {
        &self.cache
    }

    pub fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    /// Never fails; problems are reported in the outcome.
    pub async fn train(&self, params: TrainingParams) -> TrainingOutcome {
        let start = Instant::now();
        match self.try_train(params).await {
            Ok(summary) => {
                metrics::counter!("segmentation.training.succeeded").increment(1);
                info!(
                    algorithm = params.algorithm.as_str(),
                    clusters = summary.n_clusters,
                    silhouette = summary.silhouette_score,
                    users = summary.users_segmented,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Segmentation training complete"
                );
                TrainingOutcome::Success(summary)
            }
            Err(e) => {
                metrics::counter!("segmentation.training.failed").increment(1);
                warn!(algorithm = params.algorithm.as_str(), error = %e, "Segmentation training failed");
                TrainingOutcome::Error {
                    message: e.to_string(),
                }
            }
        }
    }

    async fn try_train(&self, params: TrainingParams) -> AnalyticsResult<TrainingSummary> {
        let users = self.store.list_users().await?;
        if users.len() < self.config.min_users {
            return Err(AnalyticsError::InsufficientData(format!(
                "Need at least {} users for segmentation",
                self.config.min_users
            )));
        }
        let user_ids: Vec<String> = users.iter().map(|u| u.user_id.clone()).collect();
        let matrix = self.pipeline.feature_matrix(&user_ids).await?;
        if matrix.rows() == 0 {
            return Err(AnalyticsError::InsufficientData(
                "No user features available; refresh features first".into(),
            ));
        }
        if !matrix.missing.is_empty() {
            warn!(
                missing = matrix.missing.len(),
                "Users without feature records are excluded from training"
            );
        }

        let scaler = Standardizer::fit(&matrix.data)?;
        let scaled = scaler.transform(&matrix.data)?;
        let pca = if params.use_pca && scaled.ncols() > PCA_MIN_FEATURES {
            Projection::fit(&scaled, self.config.pca_variance)
        } else {
            None
        };
        let points = match &pca {
            Some(p) => p.transform(&scaled),
            None => scaled.clone(),
        };
        debug!(
            rows = points.nrows(),
            dims = points.ncols(),
            explained_variance = pca.as_ref().map(Projection::explained_variance),
            "Prepared training matrix"
        );

        let (clusterer, labels) = match params.algorithm {
            ClusteringAlgorithm::Kmeans => {
                let kparams = KMeansParams {
                    n_clusters: params.n_clusters,
                    n_init: self.config.kmeans_n_init,
                    max_iter: self.config.kmeans_max_iter,
                    tolerance: 1e-4,
                    seed: self.config.random_seed,
                };
                let (model, labels) = clustering::fit_kmeans(&points, &kparams)?;
                let labels: Vec<Option<usize>> = labels.into_iter().map(Some).collect();
                (Clusterer::Kmeans { model }, labels)
            }
            ClusteringAlgorithm::Dbscan => {
                let labels = clustering::dbscan(
                    &points,
                    self.config.dbscan_eps,
                    self.config.dbscan_min_samples,
                )?;
                let n_clusters = labels.iter().flatten().collect::<BTreeSet<_>>().len();
                (Clusterer::Dbscan { n_clusters }, labels)
            }
        };
        let silhouette = match params.algorithm {
            ClusteringAlgorithm::Kmeans => silhouette_score(&points, &labels),
            ClusteringAlgorithm::Dbscan => 0.0,
        };

        let mut members: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (row, label) in labels.iter().enumerate() {
            if let Some(label) = label {
                members.entry(*label).or_default().push(row);
            }
        }

        let users_by_id: HashMap<&str, &User> =
            users.iter().map(|u| (u.user_id.as_str(), u)).collect();
        let now = Utc::now();
        let mut segments = Vec::with_capacity(members.len());
        let mut segment_ids = BTreeMap::new();
        for (label, rows) in &members {
            let segment = self
                .profile_cluster(*label, rows, &matrix.user_ids, &scaled, &users_by_id, now)
                .await?;
            segment_ids.insert(*label, segment.segment_id.clone());
            segments.push(segment);
        }

        let users_segmented = labels.iter().filter(|l| l.is_some()).count();
        let pca_components = pca.as_ref().map(Projection::n_components);

        // Nothing reaches the store until the snapshot is on disk.
        self.cache
            .replace(ModelSnapshot {
                algorithm: params.algorithm,
                scaler,
                pca,
                clusterer,
                segment_ids: segment_ids.clone(),
                silhouette_score: silhouette,
                trained_at: now,
            })
            .await?;

        for segment in &segments {
            self.store.put_segment(segment.clone()).await?;
        }
        for (row, user_id) in matrix.user_ids.iter().enumerate() {
            let segment_id = labels[row]
                .and_then(|l| segment_ids.get(&l))
                .map(String::as_str);
            self.store.set_user_segment(user_id, segment_id).await?;
        }
        for user_id in &matrix.missing {
            self.store.set_user_segment(user_id, None).await?;
        }
        if self.config.prune_stale_segments {
            self.prune_segments(&segment_ids).await?;
        }

        Ok(TrainingSummary {
            algorithm: params.algorithm,
            n_clusters: members.len(),
            silhouette_score: silhouette,
            segments_created: segments.len(),
            users_segmented,
            noise_users: labels.len() - users_segmented,
            users_without_features: matrix.missing.len(),
            pca_components,
            segments,
        })
    }

    async fn profile_cluster(
        &self,
        label: usize,
        rows: &[usize],
        user_ids: &[String],
        scaled: &Array2<f64>,
        users_by_id: &HashMap<&str, &User>,
        now: DateTime<Utc>,
    ) -> AnalyticsResult<Segment> {
        let member_rows = scaled.select(Axis(0), rows);
        let (name, characteristics) = match naming::characteristics(&member_rows) {
            Some(c) => (naming::segment_name(&c), c),
            None => (UNKNOWN_SEGMENT, SegmentCharacteristics::default()),
        };

        let mut sampled_features = Vec::new();
        let mut transactions = Vec::new();
        let mut ltv_sum = 0.0;
        let mut ltv_count = 0usize;
        for row in rows.iter().take(self.config.sample_size) {
            let user_id = &user_ids[*row];
            if let Some(features) = self.pipeline.get_features(user_id).await {
                sampled_features.push(features);
            }
            transactions.extend(self.store.transactions_for_user(user_id).await?);
            if let Some(user) = users_by_id.get(user_id.as_str()) {
                ltv_sum += user.lifetime_value;
                ltv_count += 1;
            }
        }

        Ok(Segment {
            segment_id: format!("segment_{label}"),
            segment_name: name.to_string(),
            description: Some(format!("Auto-generated segment: {name}")),
            characteristics,
            top_categories: naming::top_categories(&sampled_features),
            price_sensitivity: naming::price_sensitivity(&transactions),
            avg_lifetime_value: if ltv_count > 0 {
                ltv_sum / ltv_count as f64
            } else {
                0.0
            },
            size: rows.len(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Drops segments this run did not produce and clears users that
    /// still point at them.
    async fn prune_segments(&self, current: &BTreeMap<usize, String>) -> AnalyticsResult<()> {
        let keep: HashSet<&str> = current.values().map(String::as_str).collect();
        let mut pruned = 0;
        for segment in self.store.list_segments().await? {
            if !keep.contains(segment.segment_id.as_str())
                && self.store.delete_segment(&segment.segment_id).await?
            {
                pruned += 1;
            }
        }
        for user in self.store.list_users().await? {
            if let Some(segment_id) = &user.segment_id {
                if !keep.contains(segment_id.as_str()) {
                    self.store.set_user_segment(&user.user_id, None).await?;
                }
            }
        }
        if pruned > 0 {
            info!(pruned, "Pruned stale segments");
        }
        Ok(())
    }

    /// Segment for one user from the persisted model, or `None` when the
    /// user, their features or the model are unavailable.
    pub async fn predict_segment(&self, user_id: &str) -> Option<String> {
        let snapshot = match self.cache.get().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                debug!(user_id = %user_id, error = %e, "Segment prediction unavailable");
                return None;
            }
        };
        match self.predict_with(&snapshot, user_id).await {
            Ok(segment) => segment,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Segment prediction failed");
                None
            }
        }
    }

    pub async fn predict_with(
        &self,
        snapshot: &ModelSnapshot,
        user_id: &str,
    ) -> AnalyticsResult<Option<String>> {
        let Some(features) = self.pipeline.get_features(user_id).await else {
            return Ok(None);
        };
        let vector = to_model_feature_vector(&features);
        let Some(segment_id) = snapshot.segment_for(&vector)? else {
            return Ok(None);
        };
        Ok(self
            .store
            .get_segment(segment_id)
            .await?
            .map(|s| s.segment_id))
    }

    /// Predicts and stores a segment for every user with features.
    pub async fn assign_all(&self) -> AnalyticsResult<AssignmentReport> {
        let snapshot = self.cache.get().await?;
        if let Clusterer::Dbscan { .. } = snapshot.clusterer {
            return Err(AnalyticsError::Model(
                "DBSCAN models cannot assign unseen users; retrain to refresh assignments".into(),
            ));
        }
        let mut report = AssignmentReport {
            assigned: 0,
            unassigned: 0,
        };
        for user in self.store.list_users().await? {
            match self.predict_with(&snapshot, &user.user_id).await? {
                Some(segment_id) => {
                    self.store
                        .set_user_segment(&user.user_id, Some(&segment_id))
                        .await?;
                    report.assigned += 1;
                }
                None => report.unassigned += 1,
            }
        }
        metrics::counter!("segmentation.assignments").increment(report.assigned as u64);
        info!(
            assigned = report.assigned,
            unassigned = report.unassigned,
            "Segment assignment complete"
        );
        Ok(report)
    }

    pub async fn segment_statistics(&self) -> AnalyticsResult<SegmentStatistics> {
        let segments = self.store.list_segments().await?;
        let users = self.store.list_users().await?;
        let total_users = users.len();
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for user in &users {
            if let Some(segment_id) = &user.segment_id {
                *counts.entry(segment_id.as_str()).or_insert(0) += 1;
            }
        }
        let stats = segments
            .iter()
            .map(|s| {
                let user_count = counts.get(s.segment_id.as_str()).copied().unwrap_or(0);
                SegmentStat {
                    segment_id: s.segment_id.clone(),
                    segment_name: s.segment_name.clone(),
                    user_count,
                    percentage: if total_users > 0 {
                        user_count as f64 / total_users as f64 * 100.0
                    } else {
                        0.0
                    },
                }
            })
            .collect();
        Ok(SegmentStatistics {
            total_segments: segments.len(),
            total_users,
            segments: stats,
        })
    }
}
