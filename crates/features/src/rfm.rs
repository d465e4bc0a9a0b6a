//! Recency / frequency / monetary features and quintile scoring.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use shopper_core::types::{RfmFeatures, Transaction};
use shopper_core::{AnalyticsResult, AnalyticsStore};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_WINDOW_DAYS: i64 = 90;

/// Quintile scores, each in 1..=5; `rfm_score` is their sum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RfmScores {
    pub recency_score: u8,
    pub frequency_score: u8,
    pub monetary_score: u8,
    pub rfm_score: u8,
}

impl RfmScores {
    pub fn new(recency_score: u8, frequency_score: u8, monetary_score: u8) -> Self {
        Self {
            recency_score,
            frequency_score,
            monetary_score,
            rfm_score: recency_score + frequency_score + monetary_score,
        }
    }

    /// Returned when scoring fails.
    pub fn lowest() -> Self {
        Self::new(1, 1, 1)
    }

    pub fn segment(&self) -> RfmSegment {
        RfmSegment::classify(self.recency_score, self.frequency_score, self.monetary_score)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RfmSegment {
    Champions,
    LoyalCustomers,
    PotentialLoyalists,
    NewCustomers,
    AtRisk,
    CannotLose,
    Hibernating,
    Lost,
}

impl RfmSegment {
    pub const ALL: [RfmSegment; 8] = [
        Self::Champions,
        Self::LoyalCustomers,
        Self::PotentialLoyalists,
        Self::NewCustomers,
        Self::AtRisk,
        Self::CannotLose,
        Self::Hibernating,
        Self::Lost,
    ];

    /// First matching rule wins.
    pub fn classify(r: u8, f: u8, m: u8) -> Self {
        if r >= 4 && f >= 4 && m >= 4 {
            Self::Champions
        } else if f >= 4 && m >= 4 {
            Self::LoyalCustomers
        } else if r >= 4 && f >= 3 {
            Self::PotentialLoyalists
        } else if r >= 4 && f <= 2 {
            Self::NewCustomers
        } else if r <= 2 && f >= 4 {
            Self::AtRisk
        } else if r <= 2 && m >= 4 {
            Self::CannotLose
        } else if r <= 2 && f <= 2 && m <= 2 {
            Self::Hibernating
        } else {
            Self::Lost
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Champions => "champions",
            Self::LoyalCustomers => "loyal_customers",
            Self::PotentialLoyalists => "potential_loyalists",
            Self::NewCustomers => "new_customers",
            Self::AtRisk => "at_risk",
            Self::CannotLose => "cannot_lose",
            Self::Hibernating => "hibernating",
            Self::Lost => "lost",
        }
    }
}

/// Raw RFM from a user's transactions. Recency uses whole days since the
/// latest purchase; frequency and monetary only count the trailing window.
pub fn rfm_from_transactions(
    transactions: &[Transaction],
    now: DateTime<Utc>,
    window_days: i64,
) -> RfmFeatures {
    let Some(last) = transactions.iter().map(|t| t.timestamp).max() else {
        return RfmFeatures::cold();
    };
    let window_start = now - Duration::days(window_days);
    let recent = transactions.iter().filter(|t| t.timestamp >= window_start);
    let (frequency, monetary) =
        recent.fold((0.0, 0.0), |(n, sum), t| (n + 1.0, sum + t.total_amount));

    RfmFeatures {
        recency: (now - last).num_days().max(0) as f64,
        frequency,
        monetary,
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    HigherIsBetter,
    LowerIsBetter,
}

/// Quintile bucket of `value` within `values`. For lower-is-better metrics
/// the rank counts values at or above `value`, so the smallest value lands
/// in bucket 5.
fn percentile_score(values: &[f64], value: f64, direction: Direction) -> u8 {
    if values.is_empty() {
        return 1;
    }
    let rank = match direction {
        Direction::HigherIsBetter => values.iter().filter(|v| **v <= value).count(),
        Direction::LowerIsBetter => values.iter().filter(|v| **v >= value).count(),
    };
    let percentile = rank as f64 / values.len() as f64;
    if percentile <= 0.2 {
        1
    } else if percentile <= 0.4 {
        2
    } else if percentile <= 0.6 {
        3
    } else if percentile <= 0.8 {
        4
    } else {
        5
    }
}

/// RFM of every user, computed once and reused for scoring.
#[derive(Debug, Clone, Default)]
pub struct RfmPopulation {
    by_user: BTreeMap<String, RfmFeatures>,
    recency: Vec<f64>,
    frequency: Vec<f64>,
    monetary: Vec<f64>,
}

impl RfmPopulation {
    pub fn from_features(by_user: BTreeMap<String, RfmFeatures>) -> Self {
        let recency = by_user
            .values()
            .map(|r| r.recency)
            .filter(|r| r.is_finite())
            .collect();
        let frequency = by_user.values().map(|r| r.frequency).collect();
        let monetary = by_user.values().map(|r| r.monetary).collect();
        Self {
            by_user,
            recency,
            frequency,
            monetary,
        }
    }

    pub fn get(&self, user_id: &str) -> Option<&RfmFeatures> {
        self.by_user.get(user_id)
    }

    pub fn len(&self) -> usize {
        self.by_user.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_user.is_empty()
    }

    pub fn scores(&self, rfm: &RfmFeatures) -> RfmScores {
        RfmScores::new(
            percentile_score(&self.recency, rfm.recency, Direction::LowerIsBetter),
            percentile_score(&self.frequency, rfm.frequency, Direction::HigherIsBetter),
            percentile_score(&self.monetary, rfm.monetary, Direction::HigherIsBetter),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RfmFeatures)> {
        self.by_user.iter()
    }
}

#[derive(Clone)]
pub struct RfmExtractor {
    store: Arc<dyn AnalyticsStore>,
    window_days: i64,
}

impl RfmExtractor {
    pub fn new(store: Arc<dyn AnalyticsStore>) -> Self {
        Self::with_window(store, DEFAULT_WINDOW_DAYS)
    }

    pub fn with_window(store: Arc<dyn AnalyticsStore>, window_days: i64) -> Self {
        Self { store, window_days }
    }

    /// Never fails; a store error yields the no-purchase profile.
    pub async fn calculate_for_user(&self, user_id: &str) -> RfmFeatures {
        match self.store.transactions_for_user(user_id).await {
            Ok(txs) => {
                metrics::counter!("features.rfm.computed").increment(1);
                rfm_from_transactions(&txs, Utc::now(), self.window_days)
            }
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "RFM calculation failed");
                RfmFeatures::cold()
            }
        }
    }

    /// RFM for every known user from a single pass over all transactions.
    pub async fn population(&self) -> AnalyticsResult<RfmPopulation> {
        let now = Utc::now();
        let users = self.store.list_users().await?;
        let mut grouped: HashMap<String, Vec<Transaction>> = HashMap::new();
        for tx in self.store.all_transactions().await? {
            grouped.entry(tx.user_id.clone()).or_default().push(tx);
        }
        let by_user = users
            .into_iter()
            .map(|u| {
                let txs = grouped.remove(&u.user_id).unwrap_or_default();
                let rfm = rfm_from_transactions(&txs, now, self.window_days);
                (u.user_id, rfm)
            })
            .collect();
        let population = RfmPopulation::from_features(by_user);
        debug!(users = population.len(), "Computed RFM population");
        Ok(population)
    }

    pub async fn scores_for_user(&self, user_id: &str) -> RfmScores {
        let population = match self.population().await {
            Ok(p) => p,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "RFM scoring failed");
                return RfmScores::lowest();
            }
        };
        let rfm = match population.get(user_id) {
            Some(rfm) => *rfm,
            None => self.calculate_for_user(user_id).await,
        };
        population.scores(&rfm)
    }

    /// Every user bucketed into one of the eight RFM segments. All keys are
    /// present even when empty.
    pub async fn segments_by_rfm(&self) -> AnalyticsResult<BTreeMap<RfmSegment, Vec<String>>> {
        let population = self.population().await?;
        let mut segments: BTreeMap<RfmSegment, Vec<String>> =
            RfmSegment::ALL.iter().map(|s| (*s, Vec::new())).collect();
        for (user_id, rfm) in population.iter() {
            let segment = population.scores(rfm).segment();
            segments.entry(segment).or_default().push(user_id.clone());
        }
        Ok(segments)
    }
}
