//! Async storage boundary. Components hold an `Arc<dyn AnalyticsStore>` and
//! only ever see typed records.

use crate::error::AnalyticsResult;
use crate::types::{
    FeedbackKind, FeedbackRecord, Product, Review, Segment, Session, Transaction, User,
    UserFeatures,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// All users ordered by `user_id`.
    async fn list_users(&self) -> AnalyticsResult<Vec<User>>;
    async fn get_user(&self, user_id: &str) -> AnalyticsResult<Option<User>>;
    /// Returns `false` when the user does not exist.
    async fn set_user_segment(
        &self,
        user_id: &str,
        segment_id: Option<&str>,
    ) -> AnalyticsResult<bool>;
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn transactions_for_user(&self, user_id: &str) -> AnalyticsResult<Vec<Transaction>>;
    async fn transactions_since(&self, since: DateTime<Utc>) -> AnalyticsResult<Vec<Transaction>>;
    async fn transactions_containing(&self, product_id: &str)
        -> AnalyticsResult<Vec<Transaction>>;
    async fn all_transactions(&self) -> AnalyticsResult<Vec<Transaction>>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn sessions_for_user(&self, user_id: &str) -> AnalyticsResult<Vec<Session>>;
    async fn users_active_since(&self, since: DateTime<Utc>) -> AnalyticsResult<HashSet<String>>;
}

#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn get_product(&self, product_id: &str) -> AnalyticsResult<Option<Product>>;
    /// Products of one category ordered by `product_id`, optionally capped.
    async fn products_in_category(
        &self,
        category: &str,
        limit: Option<usize>,
    ) -> AnalyticsResult<Vec<Product>>;
    async fn list_products(&self, limit: Option<usize>) -> AnalyticsResult<Vec<Product>>;
    /// Distinct categories, sorted.
    async fn categories(&self) -> AnalyticsResult<Vec<String>>;
}

#[async_trait]
pub trait ReviewStore: Send + Sync {
    async fn reviews_by_users(&self, user_ids: &[String]) -> AnalyticsResult<Vec<Review>>;
}

#[async_trait]
pub trait FeatureStore: Send + Sync {
    async fn get_features(&self, user_id: &str) -> AnalyticsResult<Option<UserFeatures>>;
    /// Replaces any existing record for the same user.
    async fn put_features(&self, features: UserFeatures) -> AnalyticsResult<()>;
    async fn delete_features(&self, user_id: &str) -> AnalyticsResult<bool>;
    async fn list_features(&self) -> AnalyticsResult<Vec<UserFeatures>>;
}

#[async_trait]
pub trait SegmentStore: Send + Sync {
    async fn get_segment(&self, segment_id: &str) -> AnalyticsResult<Option<Segment>>;
    /// Replaces any existing record with the same id.
    async fn put_segment(&self, segment: Segment) -> AnalyticsResult<()>;
    async fn list_segments(&self) -> AnalyticsResult<Vec<Segment>>;
    async fn delete_segment(&self, segment_id: &str) -> AnalyticsResult<bool>;
}

#[async_trait]
pub trait FeedbackLog: Send + Sync {
    /// Appends a record and returns its id.
    async fn append_feedback(
        &self,
        user_id: &str,
        product_id: &str,
        feedback: FeedbackKind,
        position: u32,
    ) -> AnalyticsResult<u64>;
    async fn feedback_since(&self, since: DateTime<Utc>) -> AnalyticsResult<Vec<FeedbackRecord>>;
}

/// Everything the analytics core reads and writes.
pub trait AnalyticsStore:
    UserStore
    + TransactionStore
    + SessionStore
    + ProductCatalog
    + ReviewStore
    + FeatureStore
    + SegmentStore
    + FeedbackLog
{
}

impl<T> AnalyticsStore for T where
    T: UserStore
        + TransactionStore
        + SessionStore
        + ProductCatalog
        + ReviewStore
        + FeatureStore
        + SegmentStore
        + FeedbackLog
{
}
