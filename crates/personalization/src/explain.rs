//! Advisory explanation of why a product suits a user. Not used for ranking.

use crate::recommendations::RecommendationEngine;
use serde::{Deserialize, Serialize};
use shopper_core::AnalyticsResult;
use tracing::warn;

const AFFINITY_THRESHOLD: f64 = 0.1;
const EXPLAIN_NEIGHBORS: usize = 5;
const COLLABORATIVE_WEIGHT: f64 = 0.3;
const SEGMENT_WEIGHT: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorKind {
    CategoryAffinity,
    Collaborative,
    SegmentPreference,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplanationFactor {
    #[serde(rename = "type")]
    pub kind: FactorKind,
    pub description: String,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub user_id: String,
    pub product_id: String,
    pub factors: Vec<ExplanationFactor>,
}

impl RecommendationEngine {
    /// At most one factor of each kind. Users without features, and any
    /// store failure, yield an empty factor list.
    pub async fn explain(&self, user_id: &str, product_id: &str) -> Explanation {
        let factors = match self.explanation_factors(user_id, product_id).await {
            Ok(factors) => factors,
            Err(e) => {
                warn!(user_id = %user_id, product_id = %product_id, error = %e, "Failed to explain recommendation");
                Vec::new()
            }
        };
        Explanation {
            user_id: user_id.to_string(),
            product_id: product_id.to_string(),
            factors,
        }
    }

    async fn explanation_factors(
        &self,
        user_id: &str,
        product_id: &str,
    ) -> AnalyticsResult<Vec<ExplanationFactor>> {
        let mut factors = Vec::new();
        let Some(features) = self.store.get_features(user_id).await? else {
            return Ok(factors);
        };
        let category = self
            .store
            .get_product(product_id)
            .await?
            .map(|p| p.category);

        if let Some(category) = &category {
            if let Some(affinity) = features
                .category_affinity_vector
                .iter()
                .find(|a| a.category == *category && a.affinity_score > AFFINITY_THRESHOLD)
            {
                factors.push(ExplanationFactor {
                    kind: FactorKind::CategoryAffinity,
                    description: format!("You frequently purchase from {category}"),
                    weight: affinity.affinity_score,
                });
            }
        }

        if !self
            .similar_users(&features, EXPLAIN_NEIGHBORS)
            .await?
            .is_empty()
        {
            factors.push(ExplanationFactor {
                kind: FactorKind::Collaborative,
                description: "Users similar to you also bought this product".to_string(),
                weight: COLLABORATIVE_WEIGHT,
            });
        }

        let segment_id = self.store.get_user(user_id).await?.and_then(|u| u.segment_id);
        if let (Some(segment_id), Some(category)) = (segment_id, &category) {
            if let Some(segment) = self.store.get_segment(&segment_id).await? {
                if segment.top_categories.contains(category) {
                    factors.push(ExplanationFactor {
                        kind: FactorKind::SegmentPreference,
                        description: format!("Popular in your segment: {}", segment.segment_name),
                        weight: SEGMENT_WEIGHT,
                    });
                }
            }
        }
        Ok(factors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopper_core::store::{SegmentStore, UserStore};
    use chrono::Utc;
    use shopper_core::config::{FeatureConfig, RecommendationConfig};
    use shopper_core::testing::Fixture;
    use shopper_core::types::{PriceSensitivity, Segment, SegmentCharacteristics};
    use shopper_features::FeaturePipeline;

    #[tokio::test]
    async fn test_explanation_collects_all_factors() {
        let fx = Fixture::new();
        fx.product("e1", "electronics", 100.0)
            .user("u1")
            .purchase("u1", 2, &["e1"])
            .user("u2")
            .purchase("u2", 4, &["e1"]);
        FeaturePipeline::new(fx.store(), FeatureConfig::default())
            .process_all_users()
            .await;
        let store = fx.store();
        let now = Utc::now();
        store
            .put_segment(Segment {
                segment_id: "segment_0".into(),
                segment_name: "Active Regulars".into(),
                description: None,
                characteristics: SegmentCharacteristics::default(),
                top_categories: vec!["electronics".into()],
                price_sensitivity: PriceSensitivity::Medium,
                avg_lifetime_value: 0.0,
                size: 2,
                created_at: now,
                updated_at: now,
            })
            .await
            .expect("put");
        store
            .set_user_segment("u1", Some("segment_0"))
            .await
            .expect("assign");

        let engine = RecommendationEngine::new(store, RecommendationConfig::default());
        let explanation = engine.explain("u1", "e1").await;
        let kinds: Vec<FactorKind> = explanation.factors.iter().map(|f| f.kind).collect();
        assert_eq!(
            kinds,
            vec![
                FactorKind::CategoryAffinity,
                FactorKind::Collaborative,
                FactorKind::SegmentPreference
            ]
        );
        assert!((explanation.factors[0].weight - 1.0).abs() < 1e-9);
        assert_eq!(
            explanation.factors[2].description,
            "Popular in your segment: Active Regulars"
        );
    }

    #[tokio::test]
    async fn test_user_without_features_has_no_factors() {
        let fx = Fixture::new();
        fx.product("e1", "electronics", 100.0);
        let engine = RecommendationEngine::new(fx.store(), RecommendationConfig::default());
        let explanation = engine.explain("ghost", "e1").await;
        assert_eq!(explanation.user_id, "ghost");
        assert!(explanation.factors.is_empty());

        let json = serde_json::to_value(&explanation).expect("serialize");
        assert_eq!(json["factors"], serde_json::json!([]));
    }
}
