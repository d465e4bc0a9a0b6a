//! Behavioral feature engineering: RFM, browsing behavior and category
//! affinity, assembled into per-user feature records by the pipeline.

#![warn(clippy::unwrap_used)]

pub mod affinity;
pub mod browsing;
pub mod lookup;
pub mod pipeline;
pub mod rfm;
pub mod vectors;

pub use affinity::CategoryAffinityExtractor;
pub use browsing::BrowsingExtractor;
pub use pipeline::{FeatureMatrix, FeaturePipeline, FeatureQualityReport, RealtimeUpdate};
pub use rfm::{RfmExtractor, RfmScores, RfmSegment};
pub use vectors::{
    saturated_recency, to_embedding_vector, to_model_feature_vector, COLD_RECENCY_DAYS,
    MODEL_VECTOR_WIDTH,
};
