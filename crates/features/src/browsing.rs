//! Session-derived behavioral features.

use chrono::{Datelike, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use shopper_core::types::{BrowsingFeatures, EventType, Session};
use shopper_core::AnalyticsStore;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

const DAY_NAMES: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimePatterns {
    pub most_active_hour: u32,
    pub most_active_day: String,
    /// Session starts per hour of day.
    pub activity_distribution: Vec<u32>,
    /// Share of sessions starting on Saturday or Sunday.
    pub weekend_preference: f64,
}

impl Default for TimePatterns {
    fn default() -> Self {
        Self {
            most_active_hour: 12,
            most_active_day: DAY_NAMES[0].to_string(),
            activity_distribution: vec![0; 24],
            weekend_preference: 0.5,
        }
    }
}

fn is_weekend(session: &Session) -> bool {
    matches!(session.start_time.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Index of the first maximum.
fn argmax(counts: &[u32]) -> usize {
    let mut best = 0;
    for (i, c) in counts.iter().enumerate() {
        if *c > counts[best] {
            best = i;
        }
    }
    best
}

pub fn browsing_from_sessions(sessions: &[Session]) -> BrowsingFeatures {
    if sessions.is_empty() {
        return BrowsingFeatures::default();
    }
    let n = sessions.len() as f64;

    let total_duration: f64 = sessions.iter().map(Session::duration_minutes).sum();
    let page_views: Vec<usize> = sessions.iter().map(|s| s.count(EventType::View)).collect();
    let bounces = page_views.iter().filter(|v| **v <= 1).count();
    let cart_adds: usize = sessions.iter().map(|s| s.count(EventType::AddToCart)).sum();
    let purchases: usize = sessions.iter().map(|s| s.count(EventType::Purchase)).sum();
    let searches: usize = sessions.iter().map(|s| s.count(EventType::Search)).sum();

    let cart_activity = cart_adds + purchases;
    let cart_abandonment_rate = if cart_activity > 0 {
        (cart_adds as f64 - purchases as f64) / cart_activity as f64
    } else {
        0.0
    };

    let mut hours = [0u32; 24];
    for s in sessions {
        hours[s.start_time.hour() as usize] += 1;
    }

    let weekend = sessions.iter().filter(|s| is_weekend(s)).count();
    let weekday = sessions.len() - weekend;
    let weekend_vs_weekday_ratio = if weekday > 0 {
        weekend as f64 / weekday as f64
    } else {
        1.0
    };

    BrowsingFeatures {
        avg_session_duration: total_duration / n,
        pages_per_session: page_views.iter().sum::<usize>() as f64 / n,
        bounce_rate: bounces as f64 / n,
        cart_abandonment_rate,
        search_frequency: searches as f64 / n,
        preferred_hour: argmax(&hours) as u32,
        weekend_vs_weekday_ratio,
    }
}

/// Weighted blend of duration, depth, bounce and search activity in [0, 1].
pub fn engagement_from(features: &BrowsingFeatures) -> f64 {
    let duration = (features.avg_session_duration / 30.0).min(1.0);
    let pages = (features.pages_per_session / 10.0).min(1.0);
    let stickiness = 1.0 - features.bounce_rate;
    let searches = (features.search_frequency / 5.0).min(1.0);
    (0.3 * duration + 0.3 * pages + 0.2 * stickiness + 0.2 * searches).clamp(0.0, 1.0)
}

pub fn time_patterns_from(sessions: &[Session]) -> TimePatterns {
    if sessions.is_empty() {
        return TimePatterns::default();
    }
    let mut hours = [0u32; 24];
    let mut days = [0u32; 7];
    for s in sessions {
        hours[s.start_time.hour() as usize] += 1;
        days[s.start_time.weekday().num_days_from_monday() as usize] += 1;
    }
    let weekend = sessions.iter().filter(|s| is_weekend(s)).count();
    TimePatterns {
        most_active_hour: argmax(&hours) as u32,
        most_active_day: DAY_NAMES[argmax(&days)].to_string(),
        activity_distribution: hours.to_vec(),
        weekend_preference: weekend as f64 / sessions.len() as f64,
    }
}

#[derive(Clone)]
pub struct BrowsingExtractor {
    store: Arc<dyn AnalyticsStore>,
}

impl BrowsingExtractor {
    pub fn new(store: Arc<dyn AnalyticsStore>) -> Self {
        Self { store }
    }

    async fn sessions(&self, user_id: &str) -> Option<Vec<Session>> {
        match self.store.sessions_for_user(user_id).await {
            Ok(sessions) => Some(sessions),
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Failed to load sessions");
                None
            }
        }
    }

    /// Never fails; a store error yields the zero-session profile.
    pub async fn calculate_for_user(&self, user_id: &str) -> BrowsingFeatures {
        let sessions = self.sessions(user_id).await.unwrap_or_default();
        metrics::counter!("features.browsing.computed").increment(1);
        browsing_from_sessions(&sessions)
    }

    pub async fn engagement_score(&self, user_id: &str) -> f64 {
        engagement_from(&self.calculate_for_user(user_id).await)
    }

    pub async fn device_preference(&self, user_id: &str) -> BTreeMap<String, f64> {
        let sessions = self.sessions(user_id).await.unwrap_or_default();
        if sessions.is_empty() {
            return BTreeMap::from([
                ("desktop".to_string(), 0.33),
                ("mobile".to_string(), 0.33),
                ("tablet".to_string(), 0.34),
            ]);
        }
        let mut counts: BTreeMap<String, f64> = BTreeMap::new();
        for s in &sessions {
            let device = s.device_type.as_deref().unwrap_or("unknown");
            *counts.entry(device.to_string()).or_insert(0.0) += 1.0;
        }
        let total = sessions.len() as f64;
        counts.values_mut().for_each(|c| *c /= total);
        counts
    }

    pub async fn time_patterns(&self, user_id: &str) -> TimePatterns {
        let sessions = self.sessions(user_id).await.unwrap_or_default();
        time_patterns_from(&sessions)
    }
}
