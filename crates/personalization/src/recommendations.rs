//! Hybrid product recommendation engine: collaborative filtering over
//! similar users, category-affinity content scoring and segment
//! popularity, blended with fixed weights.

use crate::filters::ProductFilter;
use crate::similarity::{cosine_similarity, product_similarity};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use shopper_core::config::RecommendationConfig;
use shopper_core::types::{FeedbackKind, UserFeatures};
use shopper_core::{AnalyticsResult, AnalyticsStore};
use shopper_features::lookup::CategoryLookup;
use shopper_features::to_model_feature_vector;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Categories of the user's affinity list consulted for content scoring.
const CONTENT_CATEGORIES: usize = 5;
/// Segment categories consulted for segment-level recommendations.
const SEGMENT_CATEGORIES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationSource {
    Collaborative,
    Content,
    Segment,
    Popular,
    Similar,
    CoPurchase,
    Trending,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationItem {
    pub product_id: String,
    pub score: f64,
    pub reason: String,
}

impl RecommendationItem {
    fn new(product_id: impl Into<String>, score: f64, reason: impl Into<String>) -> Self {
        Self {
            product_id: product_id.into(),
            score,
            reason: reason.into(),
        }
    }
}

/// Descending score; ties broken by product id so output is stable.
pub(crate) fn rank(items: &mut [RecommendationItem]) {
    items.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.product_id.cmp(&b.product_id))
    });
}

struct Blended {
    score: f64,
    strongest: f64,
    reason: String,
}

/// Weighted sum per product. The reason is taken from the list that
/// contributed the most to the final score.
fn blend(lists: Vec<(Vec<RecommendationItem>, f64)>) -> Vec<RecommendationItem> {
    let mut combined: HashMap<String, Blended> = HashMap::new();
    for (items, weight) in lists {
        for item in items {
            let contribution = item.score * weight;
            let entry = combined.entry(item.product_id).or_insert(Blended {
                score: 0.0,
                strongest: f64::NEG_INFINITY,
                reason: String::new(),
            });
            entry.score += contribution;
            if contribution > entry.strongest {
                entry.strongest = contribution;
                entry.reason = item.reason;
            }
        }
    }
    combined
        .into_iter()
        .map(|(product_id, b)| RecommendationItem::new(product_id, b.score, b.reason))
        .collect()
}

fn or_empty<T>(result: AnalyticsResult<Vec<T>>, source: RecommendationSource) -> Vec<T> {
    result.unwrap_or_else(|e| {
        warn!(source = ?source, error = %e, "Recommendation source failed; treating as empty");
        metrics::counter!("recommendations.source_failures").increment(1);
        Vec::new()
    })
}

#[derive(Clone)]
pub struct RecommendationEngine {
    pub(crate) store: Arc<dyn AnalyticsStore>,
    pub(crate) config: RecommendationConfig,
}

impl RecommendationEngine {
    pub fn new(store: Arc<dyn AnalyticsStore>, config: RecommendationConfig) -> Self {
        Self { store, config }
    }

    /// Personalized list for one user. Users without a feature record get
    /// the popular-products fallback; store failures degrade the same way.
    pub async fn recommend(
        &self,
        user_id: &str,
        limit: usize,
        category: Option<&str>,
        price_range: Option<&str>,
    ) -> Vec<RecommendationItem> {
        let filter = ProductFilter::new(category, price_range);
        match self.try_recommend(user_id, limit, &filter).await {
            Ok(items) => {
                metrics::counter!("recommendations.served").increment(1);
                items
            }
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Recommendation failed; serving popular products");
                metrics::counter!("recommendations.fallback").increment(1);
                self.popular_products(limit, category).await
            }
        }
    }

    async fn try_recommend(
        &self,
        user_id: &str,
        limit: usize,
        filter: &ProductFilter,
    ) -> AnalyticsResult<Vec<RecommendationItem>> {
        let Some(features) = self.store.get_features(user_id).await? else {
            debug!(user_id = %user_id, "No features; serving popular products");
            metrics::counter!("recommendations.fallback").increment(1);
            return Ok(self
                .popular_products(limit, filter.category.as_deref())
                .await);
        };
        let candidates = limit.saturating_mul(2);
        let segment_id = self.store.get_user(user_id).await?.and_then(|u| u.segment_id);

        let collaborative = or_empty(
            self.collaborative_candidates(&features, candidates).await,
            RecommendationSource::Collaborative,
        );
        let content = or_empty(
            self.content_candidates(&features, candidates).await,
            RecommendationSource::Content,
        );
        let segment = match segment_id {
            Some(id) => or_empty(
                self.segment_candidates(&id, candidates).await,
                RecommendationSource::Segment,
            ),
            None => Vec::new(),
        };

        let mut items = blend(vec![
            (collaborative, self.config.collaborative_weight),
            (content, self.config.content_weight),
            (segment, self.config.segment_weight),
        ]);
        if !filter.is_empty() {
            items = self.apply_filter(items, filter).await?;
        }
        rank(&mut items);
        items.truncate(limit);
        Ok(items)
    }

    async fn apply_filter(
        &self,
        items: Vec<RecommendationItem>,
        filter: &ProductFilter,
    ) -> AnalyticsResult<Vec<RecommendationItem>> {
        let mut kept = Vec::with_capacity(items.len());
        for item in items {
            if let Some(product) = self.store.get_product(&item.product_id).await? {
                if filter.accepts(&product) {
                    kept.push(item);
                }
            }
        }
        Ok(kept)
    }

    /// First `limit` catalog products (optionally of one category) at the
    /// flat fallback score.
    pub async fn popular_products(
        &self,
        limit: usize,
        category: Option<&str>,
    ) -> Vec<RecommendationItem> {
        let products = match category {
            Some(c) => self.store.products_in_category(c, Some(limit)).await,
            None => self.store.list_products(Some(limit)).await,
        };
        or_empty(products, RecommendationSource::Popular)
            .into_iter()
            .map(|p| RecommendationItem::new(p.product_id, self.config.popular_score, "Popular product"))
            .collect()
    }

    async fn popular_in_category(
        &self,
        category: &str,
        limit: usize,
    ) -> AnalyticsResult<Vec<RecommendationItem>> {
        Ok(self
            .store
            .products_in_category(category, Some(limit))
            .await?
            .into_iter()
            .map(|p| {
                RecommendationItem::new(
                    p.product_id,
                    self.config.segment_score,
                    format!("Popular in {category}"),
                )
            })
            .collect())
    }

    /// Up to `limit` users most similar to `features` by cosine similarity of
    /// their model vectors. Only the first `neighbor_scan_cap` other users
    /// are compared.
    pub(crate) async fn similar_users(
        &self,
        features: &UserFeatures,
        limit: usize,
    ) -> AnalyticsResult<Vec<(String, f64)>> {
        let target = to_model_feature_vector(features);
        let mut scored = Vec::new();
        let others = self
            .store
            .list_users()
            .await?
            .into_iter()
            .filter(|u| u.user_id != features.user_id)
            .take(self.config.neighbor_scan_cap);
        for user in others {
            if let Some(other) = self.store.get_features(&user.user_id).await? {
                let similarity = cosine_similarity(&target, &to_model_feature_vector(&other));
                scored.push((user.user_id, similarity));
            }
        }
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(limit);
        Ok(scored)
    }

    async fn collaborative_candidates(
        &self,
        features: &UserFeatures,
        limit: usize,
    ) -> AnalyticsResult<Vec<RecommendationItem>> {
        let neighbors = self
            .similar_users(features, self.config.neighbor_count)
            .await?;
        let mut scores: HashMap<String, f64> = HashMap::new();
        for (neighbor, similarity) in &neighbors {
            for tx in self.store.transactions_for_user(neighbor).await? {
                for item in tx.items {
                    *scores.entry(item.product_id).or_insert(0.0) += similarity;
                }
            }
        }
        let mut items: Vec<RecommendationItem> = scores
            .into_iter()
            .map(|(pid, score)| RecommendationItem::new(pid, score, "Users like you also bought this"))
            .collect();
        rank(&mut items);
        items.truncate(limit);
        Ok(items)
    }

    async fn content_candidates(
        &self,
        features: &UserFeatures,
        limit: usize,
    ) -> AnalyticsResult<Vec<RecommendationItem>> {
        let mut items = Vec::new();
        for affinity in features
            .category_affinity_vector
            .iter()
            .take(CONTENT_CATEGORIES)
        {
            for product in self
                .store
                .products_in_category(&affinity.category, None)
                .await?
            {
                items.push(RecommendationItem::new(
                    product.product_id,
                    affinity.affinity_score,
                    format!("Based on your interest in {}", affinity.category),
                ));
            }
        }
        rank(&mut items);
        items.truncate(limit);
        Ok(items)
    }

    async fn segment_candidates(
        &self,
        segment_id: &str,
        limit: usize,
    ) -> AnalyticsResult<Vec<RecommendationItem>> {
        let Some(segment) = self.store.get_segment(segment_id).await? else {
            return Ok(Vec::new());
        };
        if segment.top_categories.is_empty() {
            return Ok(Vec::new());
        }
        let per_category = (limit / segment.top_categories.len()).max(1);
        let mut items = Vec::new();
        for category in &segment.top_categories {
            items.extend(self.popular_in_category(category, per_category).await?);
        }
        items.truncate(limit);
        Ok(items)
    }

    /// Popular products from a segment's top three categories, restricted to
    /// `category` when given.
    pub async fn segment_recommendations(
        &self,
        segment_id: &str,
        limit: usize,
        category: Option<&str>,
    ) -> Vec<RecommendationItem> {
        or_empty(
            self.try_segment_recommendations(segment_id, limit, category)
                .await,
            RecommendationSource::Segment,
        )
    }

    async fn try_segment_recommendations(
        &self,
        segment_id: &str,
        limit: usize,
        category: Option<&str>,
    ) -> AnalyticsResult<Vec<RecommendationItem>> {
        let Some(segment) = self.store.get_segment(segment_id).await? else {
            return Ok(Vec::new());
        };
        let per_category = (limit / SEGMENT_CATEGORIES).max(1);
        let mut seen = HashSet::new();
        let mut items = Vec::new();
        for cat in segment
            .top_categories
            .iter()
            .take(SEGMENT_CATEGORIES)
            .filter(|c| category.map_or(true, |wanted| wanted == c.as_str()))
        {
            for item in self.popular_in_category(cat, per_category).await? {
                if seen.insert(item.product_id.clone()) {
                    items.push(item);
                }
            }
        }
        rank(&mut items);
        items.truncate(limit);
        Ok(items)
    }

    /// Attribute similarity against every catalog product.
    pub async fn similar_products(&self, product_id: &str, limit: usize) -> Vec<RecommendationItem> {
        or_empty(
            self.try_similar_products(product_id, limit).await,
            RecommendationSource::Similar,
        )
    }

    async fn try_similar_products(
        &self,
        product_id: &str,
        limit: usize,
    ) -> AnalyticsResult<Vec<RecommendationItem>> {
        let Some(target) = self.store.get_product(product_id).await? else {
            return Ok(Vec::new());
        };
        let reason = format!("Similar to {}", target.display_name());
        let mut items: Vec<RecommendationItem> = self
            .store
            .list_products(None)
            .await?
            .iter()
            .filter(|p| p.product_id != product_id)
            .map(|p| {
                RecommendationItem::new(
                    p.product_id.clone(),
                    product_similarity(&target, p),
                    reason.clone(),
                )
            })
            .collect();
        rank(&mut items);
        items.truncate(limit);
        Ok(items)
    }

    /// Confidence that a co-product appears given the target was bought:
    /// transactions containing both / transactions containing the target.
    pub async fn frequently_bought_together(
        &self,
        product_id: &str,
        limit: usize,
    ) -> Vec<RecommendationItem> {
        or_empty(
            self.try_frequently_bought_together(product_id, limit)
                .await,
            RecommendationSource::CoPurchase,
        )
    }

    async fn try_frequently_bought_together(
        &self,
        product_id: &str,
        limit: usize,
    ) -> AnalyticsResult<Vec<RecommendationItem>> {
        let transactions = self.store.transactions_containing(product_id).await?;
        if transactions.is_empty() {
            return Ok(Vec::new());
        }
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for tx in &transactions {
            let others: HashSet<&str> = tx
                .items
                .iter()
                .map(|i| i.product_id.as_str())
                .filter(|pid| *pid != product_id)
                .collect();
            for pid in others {
                *counts.entry(pid).or_insert(0) += 1;
            }
        }
        let total = transactions.len() as f64;
        let reason = format!("Frequently bought together with {product_id}");
        let mut items: Vec<RecommendationItem> = counts
            .into_iter()
            .map(|(pid, n)| RecommendationItem::new(pid, n as f64 / total, reason.clone()))
            .collect();
        rank(&mut items);
        items.truncate(limit);
        Ok(items)
    }

    /// Share of recent line items per product. With a category, only that
    /// category's products are counted and shares are relative to them.
    pub async fn trending_products(
        &self,
        limit: usize,
        category: Option<&str>,
    ) -> Vec<RecommendationItem> {
        or_empty(
            self.try_trending_products(limit, category).await,
            RecommendationSource::Trending,
        )
    }

    async fn try_trending_products(
        &self,
        limit: usize,
        category: Option<&str>,
    ) -> AnalyticsResult<Vec<RecommendationItem>> {
        let since = Utc::now() - Duration::days(self.config.trending_window_days);
        let transactions = self.store.transactions_since(since).await?;
        let mut lookup = CategoryLookup::new(self.store.as_ref());
        let mut counts: HashMap<String, usize> = HashMap::new();
        for tx in transactions {
            for item in tx.items {
                if let Some(wanted) = category {
                    if lookup.category_of(&item.product_id).await?.as_deref() != Some(wanted) {
                        continue;
                    }
                }
                *counts.entry(item.product_id).or_insert(0) += 1;
            }
        }
        let total: usize = counts.values().sum();
        let mut items: Vec<RecommendationItem> = counts
            .into_iter()
            .map(|(pid, n)| RecommendationItem::new(pid, n as f64 / total as f64, "Trending product"))
            .collect();
        rank(&mut items);
        items.truncate(limit);
        Ok(items)
    }

    /// Appends to the feedback log; returns the record id, or `None` when
    /// the log could not be written.
    pub async fn record_feedback(
        &self,
        user_id: &str,
        product_id: &str,
        feedback: FeedbackKind,
        position: u32,
    ) -> Option<u64> {
        match self
            .store
            .append_feedback(user_id, product_id, feedback, position)
            .await
        {
            Ok(id) => {
                metrics::counter!("recommendations.feedback").increment(1);
                Some(id)
            }
            Err(e) => {
                warn!(user_id = %user_id, product_id = %product_id, error = %e, "Failed to record feedback");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopper_core::store::{FeedbackLog, SegmentStore, UserStore};
    use shopper_core::config::FeatureConfig;
    use shopper_core::testing::Fixture;
    use shopper_core::types::{PriceSensitivity, Segment, SegmentCharacteristics};
    use shopper_core::MemoryStore;
    use shopper_features::FeaturePipeline;

    fn engine(store: Arc<MemoryStore>) -> RecommendationEngine {
        RecommendationEngine::new(store, RecommendationConfig::default())
    }

    async fn refresh(fx: &Fixture) {
        FeaturePipeline::new(fx.store(), FeatureConfig::default())
            .process_all_users()
            .await;
    }

    fn segment(id: &str, top_categories: &[&str]) -> Segment {
        let now = Utc::now();
        Segment {
            segment_id: id.into(),
            segment_name: "Average Customers".into(),
            description: None,
            characteristics: SegmentCharacteristics::default(),
            top_categories: top_categories.iter().map(|c| c.to_string()).collect(),
            price_sensitivity: PriceSensitivity::Medium,
            avg_lifetime_value: 0.0,
            size: 1,
            created_at: now,
            updated_at: now,
        }
    }

    fn catalog() -> Fixture {
        let fx = Fixture::new();
        fx.product("e1", "electronics", 100.0)
            .product("e2", "electronics", 200.0)
            .product("b1", "books", 15.0)
            .product("b2", "books", 25.0)
            .product("t1", "toys", 30.0);
        fx
    }

    #[tokio::test]
    async fn test_unknown_user_gets_popular_fallback() {
        let fx = catalog();
        let engine = engine(fx.store());
        let items = engine.recommend("unknown_user", 3, None, None).await;
        assert_eq!(items.len(), 3);
        assert!(items
            .iter()
            .all(|i| i.score == 0.5 && i.reason == "Popular product"));

        let books = engine.recommend("unknown_user", 5, Some("books"), None).await;
        let ids: Vec<&str> = books.iter().map(|i| i.product_id.as_str()).collect();
        assert_eq!(ids, vec!["b1", "b2"]);
    }

    #[tokio::test]
    async fn test_content_scores_follow_affinity() {
        let fx = catalog();
        fx.user("u1").purchase("u1", 2, &["e1"]);
        refresh(&fx).await;
        let engine = engine(fx.store());

        let items = engine.recommend("u1", 5, None, None).await;
        let ids: Vec<&str> = items.iter().map(|i| i.product_id.as_str()).collect();
        assert_eq!(ids, vec!["e1", "e2"]);
        for item in &items {
            assert!((item.score - 0.4).abs() < 1e-9);
            assert_eq!(item.reason, "Based on your interest in electronics");
        }

        let pricey = engine.recommend("u1", 5, None, Some("150+")).await;
        assert_eq!(pricey.len(), 1);
        assert_eq!(pricey[0].product_id, "e2");

        assert!(engine.recommend("u1", 5, Some("books"), None).await.is_empty());
        // An unparsable range does not filter.
        assert_eq!(engine.recommend("u1", 5, None, Some("any")).await.len(), 2);
    }

    #[tokio::test]
    async fn test_unbounded_limit_returns_every_candidate() {
        let fx = catalog();
        fx.user("u1").purchase("u1", 2, &["e1"]);
        refresh(&fx).await;
        let engine = engine(fx.store());

        let items = engine.recommend("u1", usize::MAX, None, None).await;
        let ids: Vec<&str> = items.iter().map(|i| i.product_id.as_str()).collect();
        assert_eq!(ids, vec!["e1", "e2"]);
        assert_eq!(engine.recommend("unknown_user", usize::MAX, None, None).await.len(), 5);
    }

    #[tokio::test]
    async fn test_collaborative_candidates_from_similar_user() {
        let fx = catalog();
        fx.user("u1").purchase("u1", 2, &["e1"]);
        fx.user("u2").purchase("u2", 3, &["e1", "b1"]);
        refresh(&fx).await;
        let engine = engine(fx.store());

        let items = engine.recommend("u1", 10, None, None).await;
        let score_of = |pid: &str| {
            items
                .iter()
                .find(|i| i.product_id == pid)
                .map(|i| i.score)
                .expect("recommended")
        };
        let b1 = items
            .iter()
            .find(|i| i.product_id == "b1")
            .expect("collaborative candidate");
        assert_eq!(b1.reason, "Users like you also bought this");
        assert!(b1.score > 0.0);
        // e1 gets both content and collaborative credit
        assert!(score_of("e1") > score_of("e2"));
        assert_eq!(items[0].product_id, "e1");
    }

    #[tokio::test]
    async fn test_segment_candidates_are_weighted() {
        let fx = catalog();
        fx.user("u3");
        refresh(&fx).await;
        let store = fx.store();
        store.put_segment(segment("segment_0", &["books"])).await.expect("put");
        store.set_user_segment("u3", Some("segment_0")).await.expect("assign");
        let engine = engine(store);

        let items = engine.recommend("u3", 2, None, None).await;
        assert_eq!(items.len(), 2);
        for item in &items {
            assert!((item.score - 0.2 * 0.6).abs() < 1e-9);
            assert_eq!(item.reason, "Popular in books");
        }
    }

    #[tokio::test]
    async fn test_segment_recommendations_dedupe_and_filter() {
        let fx = catalog();
        let store = fx.store();
        store
            .put_segment(segment("segment_1", &["electronics", "books", "books", "toys"]))
            .await
            .expect("put");
        let engine = engine(store);

        let items = engine.segment_recommendations("segment_1", 6, None).await;
        let ids: Vec<&str> = items.iter().map(|i| i.product_id.as_str()).collect();
        assert_eq!(ids, vec!["b1", "b2", "e1", "e2"]);
        assert!(items.iter().all(|i| (i.score - 0.6).abs() < 1e-12));

        let only_books = engine
            .segment_recommendations("segment_1", 6, Some("books"))
            .await;
        assert!(only_books.iter().all(|i| i.product_id.starts_with('b')));
        assert!(engine.segment_recommendations("missing", 6, None).await.is_empty());
    }

    #[tokio::test]
    async fn test_similar_products_ranked_by_attributes() {
        let fx = Fixture::new();
        fx.product_with_brand("a", "audio", "Sonic", 100.0)
            .product_with_brand("b", "audio", "Sonic", 95.0)
            .product_with_brand("c", "audio", "Other", 300.0)
            .product_with_brand("d", "video", "Other", 500.0);
        let engine = engine(fx.store());
        let items = engine.similar_products("a", 2).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].product_id, "b");
        assert!((items[0].score - 1.0).abs() < 1e-9);
        assert_eq!(items[1].product_id, "c");
        assert!(engine.similar_products("nope", 5).await.is_empty());
    }

    #[tokio::test]
    async fn test_frequently_bought_together_confidence() {
        let fx = catalog();
        fx.user("u1");
        for day in 0..10 {
            if day < 6 {
                fx.purchase("u1", day, &["e1", "b1", "b1"]);
            } else {
                fx.purchase("u1", day, &["e1"]);
            }
        }
        fx.purchase("u1", 1, &["b1", "t1"]);
        let engine = engine(fx.store());
        let items = engine.frequently_bought_together("e1", 5).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].product_id, "b1");
        assert!((items[0].score - 0.6).abs() < 1e-9);
        assert_eq!(items[0].reason, "Frequently bought together with e1");
    }

    #[tokio::test]
    async fn test_trending_respects_window_and_category() {
        let fx = catalog();
        fx.user("u1")
            .purchase("u1", 1, &["e1", "e1", "b1"])
            .purchase("u1", 2, &["b2"])
            .purchase("u1", 30, &["t1", "t1", "t1"]);
        let engine = engine(fx.store());

        let all = engine.trending_products(10, None).await;
        assert_eq!(all[0].product_id, "e1");
        assert!((all[0].score - 0.5).abs() < 1e-9);
        assert!(all.iter().all(|i| i.product_id != "t1"));

        let books = engine.trending_products(10, Some("books")).await;
        let ids: Vec<&str> = books.iter().map(|i| i.product_id.as_str()).collect();
        assert_eq!(ids, vec!["b1", "b2"]);
        assert!(books.iter().all(|i| (i.score - 0.5).abs() < 1e-9));
    }

    #[tokio::test]
    async fn test_feedback_is_appended() {
        let fx = catalog();
        let store = fx.store();
        let engine = engine(store.clone());
        let first = engine
            .record_feedback("u1", "e1", FeedbackKind::Click, 0)
            .await
            .expect("recorded");
        let second = engine
            .record_feedback("u1", "e2", FeedbackKind::Ignore, 1)
            .await
            .expect("recorded");
        assert!(second > first);
        let log = store
            .feedback_since(Utc::now() - Duration::minutes(1))
            .await
            .expect("log");
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].feedback, FeedbackKind::Ignore);
    }

    #[tokio::test]
    async fn test_unavailable_store_never_errors() {
        let fx = catalog();
        fx.user("u1").purchase("u1", 2, &["e1"]);
        refresh(&fx).await;
        let store = fx.store();
        store.set_available(false);
        let engine = engine(store);
        assert!(engine.recommend("u1", 5, None, None).await.is_empty());
        assert!(engine.trending_products(5, None).await.is_empty());
        assert!(engine
            .record_feedback("u1", "e1", FeedbackKind::Purchase, 0)
            .await
            .is_none());
    }

    #[test]
    fn test_blend_sums_weighted_scores() {
        let collaborative = vec![RecommendationItem::new("p1", 1.0, "collab")];
        let content = vec![
            RecommendationItem::new("p1", 0.5, "content"),
            RecommendationItem::new("p2", 0.25, "content"),
        ];
        let mut items = blend(vec![(collaborative, 0.4), (content, 0.4), (vec![], 0.2)]);
        rank(&mut items);
        assert_eq!(items[0].product_id, "p1");
        assert!((items[0].score - 0.6).abs() < 1e-12);
        assert_eq!(items[0].reason, "collab");
        assert!((items[1].score - 0.1).abs() < 1e-12);
    }
}
