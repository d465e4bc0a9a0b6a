//! Builders for seeding a [`MemoryStore`] in tests.

use crate::memory::MemoryStore;
use crate::types::{
    BrowsingFeatures, EventType, PricePoint, Product, Review, RfmFeatures, Session, SessionEvent,
    Transaction, TransactionItem, TransactionStatus, User, UserFeatures,
};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub struct Fixture {
    store: Arc<MemoryStore>,
    now: DateTime<Utc>,
    seq: AtomicU64,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            now: Utc::now(),
            seq: AtomicU64::new(1),
        }
    }

    pub fn store(&self) -> Arc<MemoryStore> {
        self.store.clone()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn days_ago(&self, days: i64) -> DateTime<Utc> {
        self.now - Duration::days(days)
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.seq.fetch_add(1, Ordering::SeqCst))
    }

    pub fn user(&self, user_id: &str) -> &Self {
        self.user_with_ltv(user_id, 0.0)
    }

    pub fn user_with_ltv(&self, user_id: &str, lifetime_value: f64) -> &Self {
        self.store.insert_user(User {
            user_id: user_id.to_string(),
            demographics: HashMap::new(),
            signup_date: self.days_ago(365),
            acquisition_channel: "organic".to_string(),
            lifetime_value,
            segment_id: None,
        });
        self
    }

    pub fn product(&self, product_id: &str, category: &str, price: f64) -> &Self {
        self.product_with_brand(product_id, category, "Acme", price)
    }

    pub fn product_with_brand(
        &self,
        product_id: &str,
        category: &str,
        brand: &str,
        price: f64,
    ) -> &Self {
        self.store.insert_product(Product {
            product_id: product_id.to_string(),
            name: Some(format!("Product {product_id}")),
            category: category.to_string(),
            sub_category: None,
            brand: Some(brand.to_string()),
            attributes: HashMap::new(),
            price_history: vec![PricePoint {
                price,
                timestamp: Some(self.days_ago(30)),
            }],
        });
        self
    }

    /// Completed purchase of one unit of each product at its current price.
    pub fn purchase(&self, user_id: &str, days_ago: i64, product_ids: &[&str]) -> &Self {
        self.purchase_with_discount(user_id, days_ago, product_ids, 0.0)
    }

    pub fn purchase_with_discount(
        &self,
        user_id: &str,
        days_ago: i64,
        product_ids: &[&str],
        discount_amount: f64,
    ) -> &Self {
        let items: Vec<TransactionItem> = product_ids
            .iter()
            .map(|pid| TransactionItem {
                product_id: pid.to_string(),
                quantity: 1,
                price: self.price_of(pid),
                discount: 0.0,
            })
            .collect();
        let total_amount = items.iter().map(|i| i.price).sum();
        self.store.insert_transaction(Transaction {
            transaction_id: self.next_id("tx"),
            user_id: user_id.to_string(),
            items,
            total_amount,
            discount_amount,
            payment_method: Some("card".to_string()),
            timestamp: self.days_ago(days_ago),
            status: TransactionStatus::Completed,
        });
        self
    }

    fn price_of(&self, product_id: &str) -> f64 {
        self.store
            .snapshot()
            .products
            .iter()
            .find(|p| p.product_id == product_id)
            .and_then(Product::current_price)
            .unwrap_or(10.0)
    }

    /// Session starting `days_ago` days back; events are one minute apart.
    pub fn session(
        &self,
        user_id: &str,
        days_ago: i64,
        minutes: i64,
        events: &[(EventType, Option<&str>)],
    ) -> &Self {
        self.session_at(user_id, self.days_ago(days_ago), minutes, events, None)
    }

    pub fn session_at(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        minutes: i64,
        events: &[(EventType, Option<&str>)],
        device_type: Option<&str>,
    ) -> &Self {
        let events = events
            .iter()
            .enumerate()
            .map(|(i, (event_type, product_id))| SessionEvent {
                event_type: *event_type,
                product_id: product_id.map(str::to_string),
                timestamp: start + Duration::minutes(i as i64),
                metadata: HashMap::new(),
            })
            .collect();
        self.store.insert_session(Session {
            session_id: self.next_id("sess"),
            user_id: user_id.to_string(),
            start_time: start,
            end_time: Some(start + Duration::minutes(minutes)),
            events,
            device_type: device_type.map(str::to_string),
            browser: None,
        });
        self
    }

    pub fn review(&self, user_id: &str, product_id: &str, sentiment_score: f64) -> &Self {
        self.review_with_aspects(user_id, product_id, sentiment_score, &[])
    }

    pub fn review_with_aspects(
        &self,
        user_id: &str,
        product_id: &str,
        sentiment_score: f64,
        aspects: &[(&str, f64)],
    ) -> &Self {
        self.store.insert_review(Review {
            review_id: self.next_id("rev"),
            user_id: user_id.to_string(),
            product_id: product_id.to_string(),
            rating: if sentiment_score < 0.0 { 2 } else { 4 },
            text: String::new(),
            sentiment_score,
            aspect_sentiments: aspects
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
            timestamp: self.now,
        });
        self
    }

    /// Blank feature record for a user with no history.
    pub fn features(&self, user_id: &str) -> UserFeatures {
        UserFeatures {
            user_id: user_id.to_string(),
            rfm_features: RfmFeatures::cold(),
            browsing_features: BrowsingFeatures::default(),
            category_affinity_vector: Vec::new(),
            embedding_vector: Vec::new(),
            last_updated: self.now,
        }
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}
