//! Category affinity from purchases and browsing events.

use crate::lookup::CategoryLookup;
use chrono::{Duration, Utc};
use shopper_core::types::{CategoryAffinity, EventType};
use shopper_core::{AnalyticsResult, AnalyticsStore};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::warn;

pub const PURCHASE_WEIGHT: f64 = 5.0;
pub const CART_WEIGHT: f64 = 3.0;
pub const VIEW_WEIGHT: f64 = 1.0;

/// Lift denominator for categories absent from the population baseline.
const DEFAULT_BASELINE: f64 = 0.01;

/// Normalizes weighted counts into shares sorted by descending score,
/// ties broken by category name.
pub fn normalize_counts(counts: HashMap<String, f64>) -> Vec<CategoryAffinity> {
    let total: f64 = counts.values().sum();
    if total <= 0.0 {
        return Vec::new();
    }
    let mut affinities: Vec<CategoryAffinity> = counts
        .into_iter()
        .map(|(category, count)| CategoryAffinity {
            category,
            affinity_score: count / total,
        })
        .collect();
    affinities.sort_by(|a, b| {
        b.affinity_score
            .partial_cmp(&a.affinity_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.category.cmp(&b.category))
    });
    affinities
}

#[derive(Clone)]
pub struct CategoryAffinityExtractor {
    store: Arc<dyn AnalyticsStore>,
}

impl CategoryAffinityExtractor {
    pub fn new(store: Arc<dyn AnalyticsStore>) -> Self {
        Self { store }
    }

    async fn weighted_counts(&self, user_id: &str) -> AnalyticsResult<HashMap<String, f64>> {
        let mut lookup = CategoryLookup::new(self.store.as_ref());
        let mut counts: HashMap<String, f64> = HashMap::new();

        for tx in self.store.transactions_for_user(user_id).await? {
            for item in &tx.items {
                if let Some(category) = lookup.category_of(&item.product_id).await? {
                    *counts.entry(category).or_insert(0.0) += PURCHASE_WEIGHT;
                }
            }
        }

        for session in self.store.sessions_for_user(user_id).await? {
            for event in &session.events {
                let weight = match event.event_type {
                    EventType::View => VIEW_WEIGHT,
                    EventType::AddToCart => CART_WEIGHT,
                    _ => continue,
                };
                let Some(product_id) = event.product_id.as_deref() else {
                    continue;
                };
                if let Some(category) = lookup.category_of(product_id).await? {
                    *counts.entry(category).or_insert(0.0) += weight;
                }
            }
        }
        Ok(counts)
    }

    /// Never fails; a store error yields an empty affinity list.
    pub async fn calculate_for_user(&self, user_id: &str) -> Vec<CategoryAffinity> {
        match self.weighted_counts(user_id).await {
            Ok(counts) => {
                metrics::counter!("features.affinity.computed").increment(1);
                normalize_counts(counts)
            }
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Category affinity failed");
                Vec::new()
            }
        }
    }

    /// Every category in the catalog, sorted.
    pub async fn all_categories(&self) -> Vec<String> {
        self.store.categories().await.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to list categories");
            Vec::new()
        })
    }

    /// Dense affinity scores aligned to `categories`.
    pub async fn affinity_vector(&self, user_id: &str, categories: &[String]) -> Vec<f64> {
        let scores: HashMap<String, f64> = self
            .calculate_for_user(user_id)
            .await
            .into_iter()
            .map(|a| (a.category, a.affinity_score))
            .collect();
        categories
            .iter()
            .map(|c| scores.get(c).copied().unwrap_or(0.0))
            .collect()
    }

    /// Row-normalized co-occurrence of categories within the user's orders.
    pub async fn cross_category_affinity(
        &self,
        user_id: &str,
    ) -> BTreeMap<String, BTreeMap<String, f64>> {
        match self.cross_category_counts(user_id).await {
            Ok(mut matrix) => {
                for row in matrix.values_mut() {
                    let total: f64 = row.values().sum();
                    if total > 0.0 {
                        row.values_mut().for_each(|v| *v /= total);
                    }
                }
                matrix
            }
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Cross-category affinity failed");
                BTreeMap::new()
            }
        }
    }

    async fn cross_category_counts(
        &self,
        user_id: &str,
    ) -> AnalyticsResult<BTreeMap<String, BTreeMap<String, f64>>> {
        let mut lookup = CategoryLookup::new(self.store.as_ref());
        let mut matrix: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();
        for tx in self.store.transactions_for_user(user_id).await? {
            let mut categories = BTreeSet::new();
            for item in &tx.items {
                if let Some(category) = lookup.category_of(&item.product_id).await? {
                    categories.insert(category);
                }
            }
            for a in &categories {
                for b in &categories {
                    if a != b {
                        *matrix
                            .entry(a.clone())
                            .or_default()
                            .entry(b.clone())
                            .or_insert(0.0) += 1.0;
                    }
                }
            }
        }
        Ok(matrix)
    }

    /// Share of all purchased line items per category.
    pub async fn baseline_affinities(&self) -> AnalyticsResult<HashMap<String, f64>> {
        let mut lookup = CategoryLookup::new(self.store.as_ref());
        let mut counts: HashMap<String, f64> = HashMap::new();
        let mut total = 0.0;
        for tx in self.store.all_transactions().await? {
            for item in &tx.items {
                if let Some(category) = lookup.category_of(&item.product_id).await? {
                    *counts.entry(category).or_insert(0.0) += 1.0;
                    total += 1.0;
                }
            }
        }
        if total > 0.0 {
            counts.values_mut().for_each(|c| *c /= total);
        }
        Ok(counts)
    }

    /// User affinity divided by the population baseline per category.
    pub async fn category_lift(&self, user_id: &str) -> BTreeMap<String, f64> {
        let baseline = match self.baseline_affinities().await {
            Ok(b) => b,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Baseline affinities failed");
                return BTreeMap::new();
            }
        };
        self.calculate_for_user(user_id)
            .await
            .into_iter()
            .map(|a| {
                let base = baseline
                    .get(&a.category)
                    .copied()
                    .filter(|b| *b > 0.0)
                    .unwrap_or(DEFAULT_BASELINE);
                (a.category, a.affinity_score / base)
            })
            .collect()
    }

    /// Weekly purchase share per category over the trailing `days`. Every
    /// series has one entry per week, oldest first, zero-filled.
    pub async fn category_evolution(&self, user_id: &str, days: i64) -> BTreeMap<String, Vec<f64>> {
        match self.weekly_counts(user_id, days).await {
            Ok(weeks) => {
                let categories: BTreeSet<&String> = weeks.iter().flat_map(|w| w.keys()).collect();
                let mut series: BTreeMap<String, Vec<f64>> = categories
                    .into_iter()
                    .map(|c| (c.clone(), Vec::with_capacity(weeks.len())))
                    .collect();
                for week in &weeks {
                    let total: f64 = week.values().sum();
                    for (category, points) in series.iter_mut() {
                        let count = week.get(category).copied().unwrap_or(0.0);
                        points.push(if total > 0.0 { count / total } else { 0.0 });
                    }
                }
                series
            }
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Category evolution failed");
                BTreeMap::new()
            }
        }
    }

    async fn weekly_counts(
        &self,
        user_id: &str,
        days: i64,
    ) -> AnalyticsResult<Vec<HashMap<String, f64>>> {
        let days = days.max(1);
        let n_weeks = ((days + 6) / 7) as usize;
        let now = Utc::now();
        let start = now - Duration::days(days);
        let mut weeks: Vec<HashMap<String, f64>> = vec![HashMap::new(); n_weeks];
        let mut lookup = CategoryLookup::new(self.store.as_ref());

        for tx in self.store.transactions_since(start).await? {
            if tx.user_id != user_id || tx.timestamp > now {
                continue;
            }
            let index = ((tx.timestamp - start).num_days() / 7) as usize;
            let Some(week) = weeks.get_mut(index) else {
                continue;
            };
            for item in &tx.items {
                if let Some(category) = lookup.category_of(&item.product_id).await? {
                    *week.entry(category).or_insert(0.0) += 1.0;
                }
            }
        }
        Ok(weeks)
    }
}
