//! Behavioral segmentation: standardization, PCA, k-means / DBSCAN
//! clustering, segment profiling and single-user prediction.

#![warn(clippy::unwrap_used)]

pub mod clustering;
pub mod insights;
pub mod model;
pub mod naming;
pub mod preprocessing;
pub mod silhouette;
pub mod snapshot;

pub use insights::{ChurnRisk, SegmentInsight, SegmentInsights};
pub use model::{
    AssignmentReport, SegmentStat, SegmentStatistics, SegmentationModel, TrainingOutcome,
    TrainingParams, TrainingSummary,
};
pub use snapshot::{Clusterer, ModelCache, ModelSnapshot};
