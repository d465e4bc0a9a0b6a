//! Cluster profiling: characteristics, naming, preferred categories and
//! price sensitivity.

use ndarray::{Array2, Axis};
use shopper_core::types::{PriceSensitivity, SegmentCharacteristics, Transaction, UserFeatures};
use shopper_features::vectors::{BOUNCE_RATE_COLUMN, SESSION_DURATION_COLUMN};
use std::collections::HashMap;

pub const UNKNOWN_SEGMENT: &str = "Unknown Segment";

const TOP_CATEGORIES: usize = 5;
const AFFINITIES_PER_USER: usize = 5;

/// Column means of the member rows in standardized model-vector space.
/// `None` when there are no rows or the rows are too narrow.
pub fn characteristics(rows: &Array2<f64>) -> Option<SegmentCharacteristics> {
    if rows.ncols() <= BOUNCE_RATE_COLUMN {
        return None;
    }
    let mean = rows.mean_axis(Axis(0))?;
    Some(SegmentCharacteristics {
        avg_recency: mean[0],
        avg_frequency: mean[1],
        avg_monetary: mean[2],
        avg_session_duration: mean[SESSION_DURATION_COLUMN],
        bounce_rate: mean[BOUNCE_RATE_COLUMN],
    })
}

/// First matching rule wins.
pub fn segment_name(c: &SegmentCharacteristics) -> &'static str {
    let (recency, frequency, monetary) = (c.avg_recency, c.avg_frequency, c.avg_monetary);
    if frequency > 0.7 && monetary > 0.7 {
        "High Value Champions"
    } else if frequency > 0.5 && recency < 0.3 {
        "Active Regulars"
    } else if monetary > 0.6 {
        "Big Spenders"
    } else if recency < 0.3 {
        "New Customers"
    } else if frequency < 0.3 && recency > 0.7 {
        "At Risk"
    } else {
        "Average Customers"
    }
}

/// Categories with the highest summed affinity across members, taking
/// each member's top five.
pub fn top_categories(members: &[UserFeatures]) -> Vec<String> {
    let mut totals: HashMap<&str, f64> = HashMap::new();
    for features in members {
        for affinity in features.category_affinity_vector.iter().take(AFFINITIES_PER_USER) {
            *totals.entry(affinity.category.as_str()).or_insert(0.0) += affinity.affinity_score;
        }
    }
    let mut ranked: Vec<(&str, f64)> = totals.into_iter().collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });
    ranked
        .into_iter()
        .take(TOP_CATEGORIES)
        .map(|(c, _)| c.to_string())
        .collect()
}

/// Mean discount relative to mean order total.
pub fn price_sensitivity(transactions: &[Transaction]) -> PriceSensitivity {
    if transactions.is_empty() {
        return PriceSensitivity::Medium;
    }
    let n = transactions.len() as f64;
    let avg_discount = transactions.iter().map(|t| t.discount_amount).sum::<f64>() / n;
    let avg_total = transactions.iter().map(|t| t.total_amount).sum::<f64>() / n;
    if avg_total <= 0.0 {
        return PriceSensitivity::Medium;
    }
    let usage = avg_discount / avg_total;
    if usage > 0.2 {
        PriceSensitivity::High
    } else if usage < 0.05 {
        PriceSensitivity::Low
    } else {
        PriceSensitivity::Medium
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shopper_core::types::{CategoryAffinity, TransactionStatus};

    fn c(recency: f64, frequency: f64, monetary: f64) -> SegmentCharacteristics {
        SegmentCharacteristics {
            avg_recency: recency,
            avg_frequency: frequency,
            avg_monetary: monetary,
            ..SegmentCharacteristics::default()
        }
    }

    #[test]
    fn test_naming_priority() {
        assert_eq!(segment_name(&c(-1.0, 1.0, 1.0)), "High Value Champions");
        assert_eq!(segment_name(&c(-1.0, 0.6, 0.0)), "Active Regulars");
        assert_eq!(segment_name(&c(0.5, 0.0, 0.8)), "Big Spenders");
        assert_eq!(segment_name(&c(0.0, 0.0, 0.0)), "New Customers");
        assert_eq!(segment_name(&c(1.2, -0.5, -0.5)), "At Risk");
        assert_eq!(segment_name(&c(0.5, 0.5, 0.5)), "Average Customers");
    }

    #[test]
    fn test_characteristics_means() {
        let mut rows = Array2::from_elem((2, 20), 1.0);
        rows.row_mut(1).fill(3.0);
        let profile = characteristics(&rows).expect("profile");
        assert_eq!(profile.avg_recency, 2.0);
        assert_eq!(profile.bounce_rate, 2.0);
        assert!(characteristics(&Array2::zeros((0, 20))).is_none());
        assert!(characteristics(&Array2::zeros((2, 3))).is_none());
    }

    fn tx(total: f64, discount: f64) -> Transaction {
        Transaction {
            transaction_id: "t".into(),
            user_id: "u".into(),
            items: vec![],
            total_amount: total,
            discount_amount: discount,
            payment_method: None,
            timestamp: Utc::now(),
            status: TransactionStatus::Completed,
        }
    }

    #[test]
    fn test_price_sensitivity_bands() {
        assert_eq!(price_sensitivity(&[]), PriceSensitivity::Medium);
        assert_eq!(price_sensitivity(&[tx(100.0, 30.0)]), PriceSensitivity::High);
        assert_eq!(price_sensitivity(&[tx(100.0, 1.0)]), PriceSensitivity::Low);
        assert_eq!(price_sensitivity(&[tx(100.0, 10.0)]), PriceSensitivity::Medium);
    }

    #[test]
    fn test_top_categories_ranked_by_sum() {
        let member = |pairs: &[(&str, f64)]| UserFeatures {
            user_id: "u".into(),
            rfm_features: Default::default(),
            browsing_features: Default::default(),
            category_affinity_vector: pairs
                .iter()
                .map(|(c, s)| CategoryAffinity {
                    category: c.to_string(),
                    affinity_score: *s,
                })
                .collect(),
            embedding_vector: vec![],
            last_updated: Utc::now(),
        };
        let members = vec![
            member(&[("Books", 0.6), ("Toys", 0.4)]),
            member(&[("Toys", 0.9), ("Garden", 0.1)]),
        ];
        assert_eq!(top_categories(&members), vec!["Toys", "Books", "Garden"]);
    }
}
