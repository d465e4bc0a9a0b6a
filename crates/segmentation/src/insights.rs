//! Per-segment behavioral report built from member features, sessions,
//! transactions and review sentiment.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use shopper_core::types::{CategoryAffinity, EventType, PriceSensitivity, Segment, UserFeatures};
use shopper_core::{AnalyticsResult, AnalyticsStore};
use shopper_features::lookup::CategoryLookup;
use shopper_features::FeaturePipeline;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

const BEHAVIOR_SAMPLE: usize = 20;
const PREFERENCE_SAMPLE: usize = 50;
const MAX_BEHAVIORS: usize = 5;
const MAX_PREFERENCES: usize = 10;
const MAX_PAIN_POINTS: usize = 3;
const MAX_RECOMMENDATIONS: usize = 5;
const NEGATIVE_SENTIMENT: f64 = -0.05;
const ACTIVE_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChurnRisk {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentInsight {
    pub segment_id: String,
    pub segment_name: String,
    pub key_behaviors: Vec<String>,
    /// Category shares across sampled members, summing to 1.
    pub preferences: Vec<CategoryAffinity>,
    pub pain_points: Vec<String>,
    pub recommendations: Vec<String>,
    /// Percentage of member sessions containing a purchase event.
    pub conversion_rate: f64,
    pub avg_order_value: f64,
    pub churn_risk: ChurnRisk,
}

pub struct SegmentInsights {
    store: Arc<dyn AnalyticsStore>,
    pipeline: FeaturePipeline,
}

impl SegmentInsights {
    pub fn new(store: Arc<dyn AnalyticsStore>, pipeline: FeaturePipeline) -> Self {
        Self { store, pipeline }
    }

    /// `None` when the segment does not exist.
    pub async fn for_segment(&self, segment_id: &str) -> AnalyticsResult<Option<SegmentInsight>> {
        let Some(segment) = self.store.get_segment(segment_id).await? else {
            return Ok(None);
        };
        let members: Vec<String> = self
            .store
            .list_users()
            .await?
            .into_iter()
            .filter(|u| u.segment_id.as_deref() == Some(segment_id))
            .map(|u| u.user_id)
            .collect();
        if members.is_empty() {
            return Ok(Some(SegmentInsight {
                segment_id: segment.segment_id,
                segment_name: segment.segment_name,
                key_behaviors: vec![],
                preferences: vec![],
                pain_points: vec![],
                recommendations: vec![],
                conversion_rate: 0.0,
                avg_order_value: 0.0,
                churn_risk: ChurnRisk::Low,
            }));
        }

        let mut features = Vec::new();
        for user_id in members.iter().take(PREFERENCE_SAMPLE) {
            if let Some(f) = self.pipeline.get_features(user_id).await {
                features.push(f);
            }
        }
        let behavior_sample: Vec<&UserFeatures> = features
            .iter()
            .filter(|f| members.iter().take(BEHAVIOR_SAMPLE).any(|m| *m == f.user_id))
            .collect();

        let activity = self.member_activity(&members).await?;
        let mut key_behaviors = feature_behaviors(&behavior_sample);
        key_behaviors.extend(self.purchase_behaviors(&members).await?);
        key_behaviors.truncate(MAX_BEHAVIORS);

        let insight = SegmentInsight {
            key_behaviors,
            preferences: preferences(&features),
            pain_points: self.pain_points(&members, &activity).await?,
            recommendations: recommendations(&segment),
            conversion_rate: activity.conversion_rate(),
            avg_order_value: self.avg_order_value(&members).await?,
            churn_risk: self.churn_risk(&members).await?,
            segment_id: segment.segment_id,
            segment_name: segment.segment_name,
        };
        debug!(segment_id = %segment_id, members = members.len(), "Built segment insight");
        Ok(Some(insight))
    }

    async fn member_activity(&self, members: &[String]) -> AnalyticsResult<SessionActivity> {
        let mut activity = SessionActivity::default();
        for user_id in members {
            for session in self.store.sessions_for_user(user_id).await? {
                activity.sessions += 1;
                let purchases = session.count(EventType::Purchase);
                if purchases > 0 {
                    activity.purchase_sessions += 1;
                }
                activity.purchases += purchases;
                activity.cart_additions += session.count(EventType::AddToCart);
            }
        }
        Ok(activity)
    }

    async fn purchase_behaviors(&self, members: &[String]) -> AnalyticsResult<Vec<String>> {
        let mut behaviors = Vec::new();
        let mut transactions = Vec::new();
        for user_id in members {
            transactions.extend(self.store.transactions_for_user(user_id).await?);
        }
        if transactions.is_empty() {
            return Ok(behaviors);
        }

        let mut lookup = CategoryLookup::new(self.store.as_ref());
        let mut categories = HashSet::new();
        for tx in &transactions {
            for item in &tx.items {
                if let Some(category) = lookup.category_of(&item.product_id).await? {
                    categories.insert(category);
                }
            }
        }
        if categories.len() > 5 {
            behaviors.push("Diverse category purchasers".to_string());
        } else if categories.len() < 2 {
            behaviors.push("Category-focused purchasers".to_string());
        }

        let discounted = transactions.iter().filter(|t| t.discount_amount > 0.0).count();
        if discounted as f64 / transactions.len() as f64 * 100.0 > 50.0 {
            behaviors.push("Discount-driven purchasers".to_string());
        }
        Ok(behaviors)
    }

    async fn pain_points(
        &self,
        members: &[String],
        activity: &SessionActivity,
    ) -> AnalyticsResult<Vec<String>> {
        let mut points: Vec<String> = Vec::new();
        let reviews = self.store.reviews_by_users(members).await?;
        for review in reviews.iter().filter(|r| r.sentiment_score <= NEGATIVE_SENTIMENT) {
            let mut aspects: Vec<(&String, f64)> = review
                .aspect_sentiments
                .iter()
                .filter(|(_, score)| **score < 0.0)
                .map(|(aspect, score)| (aspect, *score))
                .collect();
            aspects.sort_by(|a, b| {
                a.1.partial_cmp(&b.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.0.cmp(b.0))
            });
            let found: Vec<String> = if aspects.is_empty() {
                vec!["Negative product reviews".to_string()]
            } else {
                aspects
                    .into_iter()
                    .map(|(aspect, _)| format!("Negative sentiment about {aspect}"))
                    .collect()
            };
            for point in found {
                if !points.contains(&point) {
                    points.push(point);
                }
            }
        }
        // Abandonment is reserved a slot when it applies.
        let abandonment = activity.cart_abandonment_rate() > 70.0;
        let review_slots = if abandonment {
            MAX_PAIN_POINTS - 1
        } else {
            MAX_PAIN_POINTS
        };
        points.truncate(review_slots);
        if abandonment {
            points.push("High cart abandonment rate".to_string());
        }
        Ok(points)
    }

    async fn avg_order_value(&self, members: &[String]) -> AnalyticsResult<f64> {
        let mut total = 0.0;
        let mut count = 0usize;
        for user_id in members {
            for tx in self.store.transactions_for_user(user_id).await? {
                total += tx.total_amount;
                count += 1;
            }
        }
        Ok(if count == 0 { 0.0 } else { total / count as f64 })
    }

    async fn churn_risk(&self, members: &[String]) -> AnalyticsResult<ChurnRisk> {
        let since = Utc::now() - Duration::days(ACTIVE_WINDOW_DAYS);
        let active = self.store.users_active_since(since).await?;
        let active_members = members.iter().filter(|m| active.contains(*m)).count();
        Ok(churn_risk_for(active_members, members.len()))
    }
}

#[derive(Debug, Default)]
struct SessionActivity {
    sessions: usize,
    purchase_sessions: usize,
    cart_additions: usize,
    purchases: usize,
}

impl SessionActivity {
    fn conversion_rate(&self) -> f64 {
        if self.sessions == 0 {
            return 0.0;
        }
        self.purchase_sessions as f64 / self.sessions as f64 * 100.0
    }

    fn cart_abandonment_rate(&self) -> f64 {
        if self.cart_additions == 0 {
            return 0.0;
        }
        (self.cart_additions as f64 - self.purchases as f64) / self.cart_additions as f64 * 100.0
    }
}

fn feature_behaviors(sample: &[&UserFeatures]) -> Vec<String> {
    if sample.is_empty() {
        return Vec::new();
    }
    let mut behaviors: Vec<&str> = Vec::new();
    let n = sample.len() as f64;
    let avg = |f: &dyn Fn(&UserFeatures) -> f64| sample.iter().map(|u| f(u)).sum::<f64>() / n;

    if avg(&|u| u.rfm_features.recency) < 30.0 {
        behaviors.push("Recent purchasers");
    }
    if avg(&|u| u.rfm_features.frequency) > 5.0 {
        behaviors.push("Frequent buyers");
    }
    if avg(&|u| u.rfm_features.monetary) > 500.0 {
        behaviors.push("High spenders");
    }
    if avg(&|u| u.browsing_features.avg_session_duration) > 15.0 {
        behaviors.push("Long browsing sessions");
    }
    if avg(&|u| u.browsing_features.bounce_rate) < 0.3 {
        behaviors.push("Low bounce rate");
    }
    if avg(&|u| u.browsing_features.search_frequency) > 2.0 {
        behaviors.push("Frequent searchers");
    }
    behaviors.into_iter().map(str::to_string).collect()
}

fn preferences(features: &[UserFeatures]) -> Vec<CategoryAffinity> {
    let mut totals: HashMap<&str, f64> = HashMap::new();
    for f in features {
        for affinity in &f.category_affinity_vector {
            *totals.entry(affinity.category.as_str()).or_insert(0.0) += affinity.affinity_score;
        }
    }
    let sum: f64 = totals.values().sum();
    if sum <= 0.0 {
        return vec![];
    }
    let mut ranked: Vec<CategoryAffinity> = totals
        .into_iter()
        .map(|(category, score)| CategoryAffinity {
            category: category.to_string(),
            affinity_score: score / sum,
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.affinity_score
            .partial_cmp(&a.affinity_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.category.cmp(&b.category))
    });
    ranked.truncate(MAX_PREFERENCES);
    ranked
}

fn recommendations(segment: &Segment) -> Vec<String> {
    let mut recs: Vec<String> = Vec::new();
    match segment.price_sensitivity {
        PriceSensitivity::High => {
            recs.push("Offer discounts and promotions".into());
            recs.push("Highlight value-for-money products".into());
        }
        PriceSensitivity::Low => {
            recs.push("Focus on premium products".into());
            recs.push("Emphasize quality and features".into());
        }
        PriceSensitivity::Medium => {}
    }
    let top = &segment.top_categories[..segment.top_categories.len().min(3)];
    if !top.is_empty() {
        recs.push(format!("Promote products in {}", top.join(", ")));
    }
    let name = segment.segment_name.to_lowercase();
    if name.contains("champions") {
        recs.push("Create loyalty programs".into());
        recs.push("Offer early access to new products".into());
    } else if name.contains("at risk") {
        recs.push("Send re-engagement campaigns".into());
        recs.push("Offer special incentives".into());
    }
    recs.truncate(MAX_RECOMMENDATIONS);
    recs
}

fn churn_risk_for(active_members: usize, members: usize) -> ChurnRisk {
    if members == 0 {
        return ChurnRisk::Low;
    }
    let active_pct = active_members as f64 / members as f64 * 100.0;
    if active_pct > 70.0 {
        ChurnRisk::Low
    } else if active_pct > 40.0 {
        ChurnRisk::Medium
    } else {
        ChurnRisk::High
    }
}
