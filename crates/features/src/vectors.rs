//! The two numeric views of a user.
//!
//! [`to_embedding_vector`] is the normalized, catalog-aligned vector stored
//! on every feature record. [`to_model_feature_vector`] is the fixed-width
//! raw layout consumed by clustering and neighbor search. They are not
//! interchangeable.

use shopper_core::types::{BrowsingFeatures, CategoryAffinity, RfmFeatures, UserFeatures};
use std::collections::HashMap;

/// Three RFM values plus seven browsing values.
pub const BASE_FEATURE_COUNT: usize = 10;
pub const TOP_AFFINITY_SLOTS: usize = 10;
pub const MODEL_VECTOR_WIDTH: usize = BASE_FEATURE_COUNT + TOP_AFFINITY_SLOTS;

/// Column of `bounce_rate` in the model vector.
pub const BOUNCE_RATE_COLUMN: usize = 5;
/// Column of `avg_session_duration` in the model vector.
pub const SESSION_DURATION_COLUMN: usize = 3;

/// Recency a never-purchased user is placed at. Finite recencies saturate
/// here too, so a cold user is never more recent than any buyer.
pub const COLD_RECENCY_DAYS: f64 = 365.0;

/// Infinite recency maps to [`COLD_RECENCY_DAYS`]; NaN becomes zero.
pub fn saturated_recency(recency: f64) -> f64 {
    if recency.is_nan() {
        0.0
    } else {
        recency.clamp(0.0, COLD_RECENCY_DAYS)
    }
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

/// Normalized base features followed by one raw affinity score per entry
/// of `categories`. Length is `BASE_FEATURE_COUNT + categories.len()`.
pub fn to_embedding_vector(
    rfm: &RfmFeatures,
    browsing: &BrowsingFeatures,
    affinities: &[CategoryAffinity],
    categories: &[String],
) -> Vec<f64> {
    let mut vector = Vec::with_capacity(BASE_FEATURE_COUNT + categories.len());
    vector.extend([
        saturated_recency(rfm.recency) / COLD_RECENCY_DAYS,
        rfm.frequency / 50.0,
        rfm.monetary / 10_000.0,
        browsing.avg_session_duration / 60.0,
        browsing.pages_per_session / 20.0,
        browsing.bounce_rate,
        browsing.cart_abandonment_rate,
        browsing.search_frequency / 10.0,
        browsing.preferred_hour as f64 / 24.0,
        browsing.weekend_vs_weekday_ratio.ln_1p() / 5.0,
    ]);
    let scores: HashMap<&str, f64> = affinities
        .iter()
        .map(|a| (a.category.as_str(), a.affinity_score))
        .collect();
    vector.extend(
        categories
            .iter()
            .map(|c| scores.get(c.as_str()).copied().unwrap_or(0.0)),
    );
    vector.into_iter().map(finite_or_zero).collect()
}

/// Raw base features followed by the user's own top affinity scores in
/// descending order, zero-padded. Recency saturates at
/// [`COLD_RECENCY_DAYS`]; other non-finite values become zero.
pub fn to_model_feature_vector(features: &UserFeatures) -> [f64; MODEL_VECTOR_WIDTH] {
    let rfm = &features.rfm_features;
    let b = &features.browsing_features;
    let mut vector = [0.0; MODEL_VECTOR_WIDTH];
    let base = [
        saturated_recency(rfm.recency),
        rfm.frequency,
        rfm.monetary,
        b.avg_session_duration,
        b.pages_per_session,
        b.bounce_rate,
        b.cart_abandonment_rate,
        b.search_frequency,
        b.preferred_hour as f64,
        b.weekend_vs_weekday_ratio,
    ];
    for (slot, value) in vector.iter_mut().zip(base) {
        *slot = finite_or_zero(value);
    }
    for (slot, affinity) in vector[BASE_FEATURE_COUNT..]
        .iter_mut()
        .zip(&features.category_affinity_vector)
    {
        *slot = finite_or_zero(affinity.affinity_score);
    }
    vector
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn affinity(category: &str, score: f64) -> CategoryAffinity {
        CategoryAffinity {
            category: category.to_string(),
            affinity_score: score,
        }
    }

    #[test]
    fn test_embedding_follows_global_category_order() {
        let rfm = RfmFeatures {
            recency: 36.5,
            frequency: 5.0,
            monetary: 1_000.0,
        };
        let browsing = BrowsingFeatures::default();
        let affinities = vec![affinity("Toys", 0.7), affinity("Books", 0.3)];
        let categories = vec!["Books".to_string(), "Garden".to_string(), "Toys".to_string()];

        let v = to_embedding_vector(&rfm, &browsing, &affinities, &categories);
        assert_eq!(v.len(), BASE_FEATURE_COUNT + 3);
        assert!((v[0] - 0.1).abs() < 1e-12);
        assert!((v[1] - 0.1).abs() < 1e-12);
        assert!((v[2] - 0.1).abs() < 1e-12);
        assert_eq!(v[5], 1.0);
        assert_eq!(&v[10..], &[0.3, 0.0, 0.7]);
    }

    #[test]
    fn test_embedding_of_cold_user_is_finite() {
        let v = to_embedding_vector(
            &RfmFeatures::cold(),
            &BrowsingFeatures::default(),
            &[],
            &[],
        );
        assert_eq!(v.len(), BASE_FEATURE_COUNT);
        assert!(v.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn test_model_vector_uses_own_affinity_order() {
        let features = UserFeatures {
            user_id: "u1".into(),
            rfm_features: RfmFeatures::cold(),
            browsing_features: BrowsingFeatures::default(),
            category_affinity_vector: vec![affinity("Toys", 0.7), affinity("Books", 0.3)],
            embedding_vector: vec![],
            last_updated: Utc::now(),
        };
        let v = to_model_feature_vector(&features);
        assert_eq!(v.len(), MODEL_VECTOR_WIDTH);
        assert_eq!(v[0], COLD_RECENCY_DAYS);
        assert_eq!(v[BOUNCE_RATE_COLUMN], 1.0);
        assert_eq!(v[10], 0.7);
        assert_eq!(v[11], 0.3);
        assert!(v[12..].iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_cold_user_ranks_least_recent() {
        let user = |rfm: RfmFeatures| UserFeatures {
            user_id: "u".into(),
            rfm_features: rfm,
            browsing_features: BrowsingFeatures::default(),
            category_affinity_vector: vec![],
            embedding_vector: vec![],
            last_updated: Utc::now(),
        };
        let cold = user(RfmFeatures::cold());
        let today = user(RfmFeatures {
            recency: 0.0,
            frequency: 1.0,
            monetary: 10.0,
        });
        let lapsed = user(RfmFeatures {
            recency: 900.0,
            frequency: 1.0,
            monetary: 10.0,
        });

        let cold_v = to_model_feature_vector(&cold);
        assert!(cold_v[0] > to_model_feature_vector(&today)[0]);
        assert_eq!(cold_v[0], to_model_feature_vector(&lapsed)[0]);

        let embed = |f: &UserFeatures| {
            to_embedding_vector(&f.rfm_features, &f.browsing_features, &[], &[])[0]
        };
        assert_eq!(embed(&cold), 1.0);
        assert_eq!(embed(&today), 0.0);
        assert_eq!(saturated_recency(f64::NAN), 0.0);
    }
}
