//! Feature pipeline: runs the extractors, assembles and persists one
//! feature record per user, and serves matrices to the model layer.

use crate::affinity::CategoryAffinityExtractor;
use crate::browsing::BrowsingExtractor;
use crate::rfm::RfmExtractor;
use crate::vectors::{to_embedding_vector, to_model_feature_vector, MODEL_VECTOR_WIDTH};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use shopper_core::config::FeatureConfig;
use shopper_core::types::{BrowsingFeatures, EventType, UserFeatures};
use shopper_core::{AnalyticsError, AnalyticsResult, AnalyticsStore};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Model vectors for the users that have a feature record, in request
/// order. Users without a record are listed in `missing`.
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    pub user_ids: Vec<String>,
    pub data: Array2<f64>,
    pub missing: Vec<String>,
}

impl FeatureMatrix {
    pub fn rows(&self) -> usize {
        self.data.nrows()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RealtimeUpdate {
    /// No record existed; a full computation ran.
    Created,
    Recomputed,
    /// Event type does not affect stored features.
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureQualityReport {
    pub total_users: usize,
    pub users_with_features: usize,
    pub missing_features: usize,
    pub missing_feature_rate: f64,
    pub cold_start_rfm: usize,
    pub zero_session_browsing: usize,
    pub empty_affinity: usize,
    pub generated_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct FeaturePipeline {
    store: Arc<dyn AnalyticsStore>,
    rfm: RfmExtractor,
    browsing: BrowsingExtractor,
    affinity: CategoryAffinityExtractor,
    config: FeatureConfig,
    user_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl FeaturePipeline {
    pub fn new(store: Arc<dyn AnalyticsStore>, config: FeatureConfig) -> Self {
        Self {
            rfm: RfmExtractor::with_window(store.clone(), config.rfm_window_days),
            browsing: BrowsingExtractor::new(store.clone()),
            affinity: CategoryAffinityExtractor::new(store.clone()),
            store,
            config,
            user_locks: Arc::new(DashMap::new()),
        }
    }

    pub fn rfm(&self) -> &RfmExtractor {
        &self.rfm
    }

    pub fn browsing(&self) -> &BrowsingExtractor {
        &self.browsing
    }

    pub fn affinity(&self) -> &CategoryAffinityExtractor {
        &self.affinity
    }

    fn lock_for(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.user_locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Runs `work` while holding the user's lock. The entry is evicted
    /// once no other task holds or waits on it.
    async fn with_user_lock<T>(&self, user_id: &str, work: impl Future<Output = T>) -> T {
        let lock = self.lock_for(user_id);
        let output = {
            let _guard = lock.lock().await;
            work.await
        };
        drop(lock);
        self.user_locks.remove_if(user_id, |_, lock| Arc::strong_count(lock) == 1);
        output
    }

    async fn compute_and_store(&self, user_id: &str) -> AnalyticsResult<UserFeatures> {
        let categories = self.store.categories().await?;
        let rfm_features = self.rfm.calculate_for_user(user_id).await;
        let browsing_features = self.browsing.calculate_for_user(user_id).await;
        let category_affinity_vector = self.affinity.calculate_for_user(user_id).await;
        let embedding_vector = to_embedding_vector(
            &rfm_features,
            &browsing_features,
            &category_affinity_vector,
            &categories,
        );

        let features = UserFeatures {
            user_id: user_id.to_string(),
            rfm_features,
            browsing_features,
            category_affinity_vector,
            embedding_vector,
            last_updated: Utc::now(),
        };
        self.store.put_features(features.clone()).await?;
        metrics::counter!("features.pipeline.processed").increment(1);
        debug!(user_id = %user_id, "Processed user features");
        Ok(features)
    }

    /// Computes, persists and returns the full feature record for a user.
    pub async fn process_user_features(&self, user_id: &str) -> AnalyticsResult<UserFeatures> {
        self.with_user_lock(user_id, self.compute_and_store(user_id)).await
    }

    /// Refreshes every user in fixed-size concurrent batches. Per-user
    /// failures are logged and skipped.
    pub async fn process_all_users(&self) -> BTreeMap<String, UserFeatures> {
        let users = match self.store.list_users().await {
            Ok(users) => users,
            Err(e) => {
                warn!(error = %e, "Failed to list users for feature refresh");
                return BTreeMap::new();
            }
        };
        let total = users.len();
        let batch_size = self.config.batch_size.max(1);
        let mut results = BTreeMap::new();

        for batch in users.chunks(batch_size) {
            let mut set = JoinSet::new();
            for user in batch {
                let pipeline = self.clone();
                let user_id = user.user_id.clone();
                set.spawn(async move {
                    let outcome = pipeline.process_user_features(&user_id).await;
                    (user_id, outcome)
                });
            }
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok((user_id, Ok(features))) => {
                        results.insert(user_id, features);
                    }
                    Ok((user_id, Err(e))) => {
                        metrics::counter!("features.pipeline.failed").increment(1);
                        warn!(user_id = %user_id, error = %e, "Feature processing failed");
                    }
                    Err(e) => {
                        metrics::counter!("features.pipeline.failed").increment(1);
                        warn!(error = %e, "Feature task aborted");
                    }
                }
            }
            info!(processed = results.len(), total, "Feature batch complete");
        }
        results
    }

    /// Reacts to a single behavioral event. A user without a record gets
    /// a full computation; otherwise purchase, view and cart events
    /// trigger a recompute.
    pub async fn update_realtime(
        &self,
        user_id: &str,
        event_type: EventType,
    ) -> AnalyticsResult<RealtimeUpdate> {
        self.with_user_lock(user_id, self.apply_event(user_id, event_type)).await
    }

    async fn apply_event(
        &self,
        user_id: &str,
        event_type: EventType,
    ) -> AnalyticsResult<RealtimeUpdate> {
        if self.store.get_features(user_id).await?.is_none() {
            self.compute_and_store(user_id).await?;
            return Ok(RealtimeUpdate::Created);
        }
        match event_type {
            EventType::Purchase | EventType::View | EventType::AddToCart => {
                self.compute_and_store(user_id).await?;
                Ok(RealtimeUpdate::Recomputed)
            }
            EventType::Search | EventType::Filter => Ok(RealtimeUpdate::Ignored),
        }
    }

    /// Stored record, or `None` when absent or unreadable.
    pub async fn get_features(&self, user_id: &str) -> Option<UserFeatures> {
        match self.store.get_features(user_id).await {
            Ok(features) => features,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Failed to read user features");
                None
            }
        }
    }

    pub async fn feature_matrix(&self, user_ids: &[String]) -> AnalyticsResult<FeatureMatrix> {
        let mut present = Vec::with_capacity(user_ids.len());
        let mut missing = Vec::new();
        let mut flat = Vec::with_capacity(user_ids.len() * MODEL_VECTOR_WIDTH);
        for user_id in user_ids {
            match self.store.get_features(user_id).await? {
                Some(features) => {
                    flat.extend(to_model_feature_vector(&features));
                    present.push(user_id.clone());
                }
                None => missing.push(user_id.clone()),
            }
        }
        let data = Array2::from_shape_vec((present.len(), MODEL_VECTOR_WIDTH), flat)
            .map_err(|e| AnalyticsError::Model(e.to_string()))?;
        Ok(FeatureMatrix {
            user_ids: present,
            data,
            missing,
        })
    }

    /// Deletes records older than the staleness window for users with no
    /// session inside it. Returns the number deleted.
    pub async fn cleanup_stale_features(&self) -> AnalyticsResult<usize> {
        let cutoff = Utc::now() - Duration::days(self.config.stale_after_days);
        let active = self.store.users_active_since(cutoff).await?;
        let mut deleted = 0;
        for features in self.store.list_features().await? {
            if features.last_updated < cutoff
                && !active.contains(&features.user_id)
                && self.store.delete_features(&features.user_id).await?
            {
                deleted += 1;
            }
        }
        metrics::counter!("features.pipeline.stale_deleted").increment(deleted as u64);
        info!(deleted, "Cleaned up stale feature records");
        Ok(deleted)
    }

    pub async fn quality_report(&self) -> AnalyticsResult<FeatureQualityReport> {
        let users = self.store.list_users().await?;
        let features = self.store.list_features().await?;
        let idle = BrowsingFeatures::default();

        let total_users = users.len();
        let users_with_features = users
            .iter()
            .filter(|u| features.iter().any(|f| f.user_id == u.user_id))
            .count();
        let missing_features = total_users - users_with_features;
        let missing_feature_rate = if total_users > 0 {
            missing_features as f64 / total_users as f64
        } else {
            0.0
        };

        Ok(FeatureQualityReport {
            total_users,
            users_with_features,
            missing_features,
            missing_feature_rate,
            cold_start_rfm: features
                .iter()
                .filter(|f| !f.rfm_features.has_purchased())
                .count(),
            zero_session_browsing: features
                .iter()
                .filter(|f| f.browsing_features == idle)
                .count(),
            empty_affinity: features
                .iter()
                .filter(|f| f.category_affinity_vector.is_empty())
                .count(),
            generated_at: Utc::now(),
        })
    }
}
