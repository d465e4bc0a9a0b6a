//! Bounded-time background jobs: feature refresh, segmentation retraining,
//! segment assignment and maintenance.

#![warn(clippy::unwrap_used)]

pub mod catalog;
pub mod runner;

pub use catalog::{Job, JobContext};
pub use runner::{JobReport, JobRunner, JobStatus};
