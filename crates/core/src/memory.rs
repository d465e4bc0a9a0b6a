//! DashMap-backed in-process store, seeded from and dumped to a JSON
//! snapshot file.

use crate::error::{AnalyticsError, AnalyticsResult};
use crate::store::{
    FeatureStore, FeedbackLog, ProductCatalog, ReviewStore, SegmentStore, SessionStore,
    TransactionStore, UserStore,
};
use crate::types::{
    FeedbackKind, FeedbackRecord, Product, Review, Segment, Session, Transaction, User,
    UserFeatures,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::info;

/// Serialized form of every collection held by [`MemoryStore`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DataSnapshot {
    pub users: Vec<User>,
    pub products: Vec<Product>,
    pub transactions: Vec<Transaction>,
    pub sessions: Vec<Session>,
    pub reviews: Vec<Review>,
    pub user_features: Vec<UserFeatures>,
    pub segments: Vec<Segment>,
    pub feedback: Vec<FeedbackRecord>,
}

pub struct MemoryStore {
    users: DashMap<String, User>,
    transactions: DashMap<String, Transaction>,
    sessions: DashMap<String, Session>,
    products: DashMap<String, Product>,
    reviews: DashMap<String, Review>,
    features: DashMap<String, UserFeatures>,
    segments: DashMap<String, Segment>,
    feedback: RwLock<Vec<FeedbackRecord>>,
    next_feedback_id: AtomicU64,
    available: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            transactions: DashMap::new(),
            sessions: DashMap::new(),
            products: DashMap::new(),
            reviews: DashMap::new(),
            features: DashMap::new(),
            segments: DashMap::new(),
            feedback: RwLock::new(Vec::new()),
            next_feedback_id: AtomicU64::new(1),
            available: AtomicBool::new(true),
        }
    }

    pub fn from_snapshot(snapshot: DataSnapshot) -> Self {
        let store = Self::new();
        for user in snapshot.users {
            store.insert_user(user);
        }
        for product in snapshot.products {
            store.insert_product(product);
        }
        for tx in snapshot.transactions {
            store.insert_transaction(tx);
        }
        for session in snapshot.sessions {
            store.insert_session(session);
        }
        for review in snapshot.reviews {
            store.insert_review(review);
        }
        for features in snapshot.user_features {
            store.features.insert(features.user_id.clone(), features);
        }
        for segment in snapshot.segments {
            store.segments.insert(segment.segment_id.clone(), segment);
        }
        let next_id = snapshot.feedback.iter().map(|f| f.id).max().unwrap_or(0) + 1;
        store.next_feedback_id.store(next_id, Ordering::SeqCst);
        *store.feedback.write() = snapshot.feedback;
        store
    }

    pub fn snapshot(&self) -> DataSnapshot {
        let mut transactions: Vec<Transaction> = values(&self.transactions);
        transactions.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.transaction_id.cmp(&b.transaction_id))
        });
        let mut sessions: Vec<Session> = values(&self.sessions);
        sessions.sort_by(|a, b| {
            a.start_time
                .cmp(&b.start_time)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        DataSnapshot {
            users: values(&self.users),
            products: values(&self.products),
            transactions,
            sessions,
            reviews: values(&self.reviews),
            user_features: values(&self.features),
            segments: values(&self.segments),
            feedback: self.feedback.read().clone(),
        }
    }

    pub async fn load_json(path: impl AsRef<Path>) -> AnalyticsResult<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await?;
        let snapshot: DataSnapshot = serde_json::from_str(&raw)?;
        info!(
            path = %path.display(),
            users = snapshot.users.len(),
            products = snapshot.products.len(),
            transactions = snapshot.transactions.len(),
            "Loaded data snapshot"
        );
        Ok(Self::from_snapshot(snapshot))
    }

    pub async fn save_json(&self, path: impl AsRef<Path>) -> AnalyticsResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let raw = serde_json::to_string_pretty(&self.snapshot())?;
        tokio::fs::write(path, raw).await?;
        info!(path = %path.display(), "Saved data snapshot");
        Ok(())
    }

    pub fn insert_user(&self, user: User) {
        self.users.insert(user.user_id.clone(), user);
    }

    pub fn insert_product(&self, product: Product) {
        self.products.insert(product.product_id.clone(), product);
    }

    pub fn insert_transaction(&self, tx: Transaction) {
        self.transactions.insert(tx.transaction_id.clone(), tx);
    }

    pub fn insert_session(&self, session: Session) {
        self.sessions.insert(session.session_id.clone(), session);
    }

    pub fn insert_review(&self, review: Review) {
        self.reviews.insert(review.review_id.clone(), review);
    }

    /// Toggles simulated unavailability; every trait call fails while unset.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check(&self) -> AnalyticsResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AnalyticsError::Store("store unavailable".to_string()))
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Values ordered by map key.
fn values<T: Clone>(map: &DashMap<String, T>) -> Vec<T> {
    let mut entries: Vec<(String, T)> = map
        .iter()
        .map(|e| (e.key().clone(), e.value().clone()))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries.into_iter().map(|(_, v)| v).collect()
}

fn by_time(mut txs: Vec<Transaction>) -> Vec<Transaction> {
    txs.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.transaction_id.cmp(&b.transaction_id))
    });
    txs
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn list_users(&self) -> AnalyticsResult<Vec<User>> {
        self.check()?;
        Ok(values(&self.users))
    }

    async fn get_user(&self, user_id: &str) -> AnalyticsResult<Option<User>> {
        self.check()?;
        Ok(self.users.get(user_id).map(|u| u.value().clone()))
    }

    async fn set_user_segment(
        &self,
        user_id: &str,
        segment_id: Option<&str>,
    ) -> AnalyticsResult<bool> {
        self.check()?;
        match self.users.get_mut(user_id) {
            Some(mut user) => {
                user.segment_id = segment_id.map(str::to_string);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl TransactionStore for MemoryStore {
    async fn transactions_for_user(&self, user_id: &str) -> AnalyticsResult<Vec<Transaction>> {
        self.check()?;
        Ok(by_time(
            self.transactions
                .iter()
                .filter(|t| t.user_id == user_id)
                .map(|t| t.value().clone())
                .collect(),
        ))
    }

    async fn transactions_since(&self, since: DateTime<Utc>) -> AnalyticsResult<Vec<Transaction>> {
        self.check()?;
        Ok(by_time(
            self.transactions
                .iter()
                .filter(|t| t.timestamp >= since)
                .map(|t| t.value().clone())
                .collect(),
        ))
    }

    async fn transactions_containing(
        &self,
        product_id: &str,
    ) -> AnalyticsResult<Vec<Transaction>> {
        self.check()?;
        Ok(by_time(
            self.transactions
                .iter()
                .filter(|t| t.contains(product_id))
                .map(|t| t.value().clone())
                .collect(),
        ))
    }

    async fn all_transactions(&self) -> AnalyticsResult<Vec<Transaction>> {
        self.check()?;
        Ok(by_time(values(&self.transactions)))
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn sessions_for_user(&self, user_id: &str) -> AnalyticsResult<Vec<Session>> {
        self.check()?;
        let mut sessions: Vec<Session> = self
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id)
            .map(|s| s.value().clone())
            .collect();
        sessions.sort_by(|a, b| {
            a.start_time
                .cmp(&b.start_time)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        Ok(sessions)
    }

    async fn users_active_since(&self, since: DateTime<Utc>) -> AnalyticsResult<HashSet<String>> {
        self.check()?;
        Ok(self
            .sessions
            .iter()
            .filter(|s| s.start_time >= since)
            .map(|s| s.user_id.clone())
            .collect())
    }
}

#[async_trait]
impl ProductCatalog for MemoryStore {
    async fn get_product(&self, product_id: &str) -> AnalyticsResult<Option<Product>> {
        self.check()?;
        Ok(self.products.get(product_id).map(|p| p.value().clone()))
    }

    async fn products_in_category(
        &self,
        category: &str,
        limit: Option<usize>,
    ) -> AnalyticsResult<Vec<Product>> {
        self.check()?;
        let mut products: Vec<Product> = values(&self.products)
            .into_iter()
            .filter(|p| p.category == category)
            .collect();
        if let Some(limit) = limit {
            products.truncate(limit);
        }
        Ok(products)
    }

    async fn list_products(&self, limit: Option<usize>) -> AnalyticsResult<Vec<Product>> {
        self.check()?;
        let mut products = values(&self.products);
        if let Some(limit) = limit {
            products.truncate(limit);
        }
        Ok(products)
    }

    async fn categories(&self) -> AnalyticsResult<Vec<String>> {
        self.check()?;
        let categories: BTreeSet<String> =
            self.products.iter().map(|p| p.category.clone()).collect();
        Ok(categories.into_iter().collect())
    }
}

#[async_trait]
impl ReviewStore for MemoryStore {
    async fn reviews_by_users(&self, user_ids: &[String]) -> AnalyticsResult<Vec<Review>> {
        self.check()?;
        let wanted: HashSet<&str> = user_ids.iter().map(String::as_str).collect();
        Ok(values(&self.reviews)
            .into_iter()
            .filter(|r| wanted.contains(r.user_id.as_str()))
            .collect())
    }
}

#[async_trait]
impl FeatureStore for MemoryStore {
    async fn get_features(&self, user_id: &str) -> AnalyticsResult<Option<UserFeatures>> {
        self.check()?;
        Ok(self.features.get(user_id).map(|f| f.value().clone()))
    }

    async fn put_features(&self, features: UserFeatures) -> AnalyticsResult<()> {
        self.check()?;
        self.features.insert(features.user_id.clone(), features);
        Ok(())
    }

    async fn delete_features(&self, user_id: &str) -> AnalyticsResult<bool> {
        self.check()?;
        Ok(self.features.remove(user_id).is_some())
    }

    async fn list_features(&self) -> AnalyticsResult<Vec<UserFeatures>> {
        self.check()?;
        Ok(values(&self.features))
    }
}

#[async_trait]
impl SegmentStore for MemoryStore {
    async fn get_segment(&self, segment_id: &str) -> AnalyticsResult<Option<Segment>> {
        self.check()?;
        Ok(self.segments.get(segment_id).map(|s| s.value().clone()))
    }

    async fn put_segment(&self, segment: Segment) -> AnalyticsResult<()> {
        self.check()?;
        self.segments.insert(segment.segment_id.clone(), segment);
        Ok(())
    }

    async fn list_segments(&self) -> AnalyticsResult<Vec<Segment>> {
        self.check()?;
        Ok(values(&self.segments))
    }

    async fn delete_segment(&self, segment_id: &str) -> AnalyticsResult<bool> {
        self.check()?;
        Ok(self.segments.remove(segment_id).is_some())
    }
}

#[async_trait]
impl FeedbackLog for MemoryStore {
    async fn append_feedback(
        &self,
        user_id: &str,
        product_id: &str,
        feedback: FeedbackKind,
        position: u32,
    ) -> AnalyticsResult<u64> {
        self.check()?;
        let id = self.next_feedback_id.fetch_add(1, Ordering::SeqCst);
        self.feedback.write().push(FeedbackRecord {
            id,
            user_id: user_id.to_string(),
            product_id: product_id.to_string(),
            feedback,
            position,
            timestamp: Utc::now(),
        });
        Ok(id)
    }

    async fn feedback_since(&self, since: DateTime<Utc>) -> AnalyticsResult<Vec<FeedbackRecord>> {
        self.check()?;
        Ok(self
            .feedback
            .read()
            .iter()
            .filter(|f| f.timestamp >= since)
            .cloned()
            .collect())
    }
}
