//! Shared records, configuration, errors and the storage boundary for the
//! shopper analytics workspace.

#![warn(clippy::unwrap_used)]

pub mod config;
pub mod error;
pub mod memory;
pub mod store;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::AppConfig;
pub use error::{AnalyticsError, AnalyticsResult};
pub use memory::{DataSnapshot, MemoryStore};
pub use store::AnalyticsStore;
