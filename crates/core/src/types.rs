use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ─── Source records ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct User {
    pub user_id: String,
    #[serde(default)]
    pub demographics: HashMap<String, serde_json::Value>,
    pub signup_date: DateTime<Utc>,
    #[serde(default = "default_channel")]
    pub acquisition_channel: String,
    #[serde(default)]
    pub lifetime_value: f64,
    /// Last segment assignment; `None` when unassigned or classified as noise.
    #[serde(default)]
    pub segment_id: Option<String>,
}

fn default_channel() -> String {
    "organic".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TransactionItem {
    pub product_id: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    pub price: f64,
    #[serde(default)]
    pub discount: f64,
}

fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    #[default]
    Completed,
    Cancelled,
    Refunded,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Transaction {
    pub transaction_id: String,
    pub user_id: String,
    pub items: Vec<TransactionItem>,
    pub total_amount: f64,
    #[serde(default)]
    pub discount_amount: f64,
    #[serde(default)]
    pub payment_method: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub status: TransactionStatus,
}

impl Transaction {
    pub fn contains(&self, product_id: &str) -> bool {
        self.items.iter().any(|i| i.product_id == product_id)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    View,
    AddToCart,
    Purchase,
    Search,
    Filter,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SessionEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default)]
    pub product_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Session {
    pub session_id: String,
    pub user_id: String,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub events: Vec<SessionEvent>,
    #[serde(default)]
    pub device_type: Option<String>,
    #[serde(default)]
    pub browser: Option<String>,
}

impl Session {
    pub fn count(&self, event_type: EventType) -> usize {
        self.events
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }

    /// Session length in minutes; zero while the session is still open.
    pub fn duration_minutes(&self) -> f64 {
        match self.end_time {
            Some(end) => (end - self.start_time).num_milliseconds() as f64 / 60_000.0,
            None => 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PricePoint {
    pub price: f64,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Product {
    pub product_id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub category: String,
    #[serde(default)]
    pub sub_category: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub price_history: Vec<PricePoint>,
}

impl Product {
    /// Latest entry of the price history.
    pub fn current_price(&self) -> Option<f64> {
        self.price_history.last().map(|p| p.price)
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.product_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Review {
    pub review_id: String,
    pub user_id: String,
    pub product_id: String,
    pub rating: u8,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub sentiment_score: f64,
    #[serde(default)]
    pub aspect_sentiments: HashMap<String, f64>,
    pub timestamp: DateTime<Utc>,
}

// ─── Derived features ───────────────────────────────────────────────────────

/// Recency / frequency / monetary triple. `recency` is `f64::INFINITY` for
/// users who have never purchased and is stored as `null`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RfmFeatures {
    #[serde(with = "infinite_as_null")]
    pub recency: f64,
    pub frequency: f64,
    pub monetary: f64,
}

impl RfmFeatures {
    pub fn cold() -> Self {
        Self {
            recency: f64::INFINITY,
            frequency: 0.0,
            monetary: 0.0,
        }
    }

    pub fn has_purchased(&self) -> bool {
        self.recency.is_finite()
    }
}

impl Default for RfmFeatures {
    fn default() -> Self {
        Self::cold()
    }
}

mod infinite_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::INFINITY))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BrowsingFeatures {
    pub avg_session_duration: f64,
    pub pages_per_session: f64,
    pub bounce_rate: f64,
    pub cart_abandonment_rate: f64,
    pub search_frequency: f64,
    pub preferred_hour: u32,
    pub weekend_vs_weekday_ratio: f64,
}

impl Default for BrowsingFeatures {
    /// Profile of a user with no sessions.
    fn default() -> Self {
        Self {
            avg_session_duration: 0.0,
            pages_per_session: 0.0,
            bounce_rate: 1.0,
            cart_abandonment_rate: 0.0,
            search_frequency: 0.0,
            preferred_hour: 12,
            weekend_vs_weekday_ratio: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CategoryAffinity {
    pub category: String,
    pub affinity_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct UserFeatures {
    pub user_id: String,
    pub rfm_features: RfmFeatures,
    pub browsing_features: BrowsingFeatures,
    /// Sorted by descending affinity.
    pub category_affinity_vector: Vec<CategoryAffinity>,
    pub embedding_vector: Vec<f64>,
    pub last_updated: DateTime<Utc>,
}

// ─── Segments ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PriceSensitivity {
    Low,
    Medium,
    High,
}

impl PriceSensitivity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Mean feature values of a cluster in standardized units.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SegmentCharacteristics {
    pub avg_recency: f64,
    pub avg_frequency: f64,
    pub avg_monetary: f64,
    pub avg_session_duration: f64,
    pub bounce_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Segment {
    pub segment_id: String,
    pub segment_name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub characteristics: SegmentCharacteristics,
    #[serde(default)]
    pub top_categories: Vec<String>,
    pub price_sensitivity: PriceSensitivity,
    #[serde(default)]
    pub avg_lifetime_value: f64,
    pub size: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ─── Feedback ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    Click,
    Purchase,
    Ignore,
}

impl std::str::FromStr for FeedbackKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "click" => Ok(Self::Click),
            "purchase" => Ok(Self::Purchase),
            "ignore" => Ok(Self::Ignore),
            other => Err(format!("Unknown feedback kind: {other}")),
        }
    }
}

/// Append-only record of a user reacting to a served recommendation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FeedbackRecord {
    pub id: u64,
    pub user_id: String,
    pub product_id: String,
    pub feedback: FeedbackKind,
    pub position: u32,
    pub timestamp: DateTime<Utc>,
}
