//! Product recommendations: the hybrid per-user engine plus similarity,
//! co-purchase, trending, explanation and feedback queries.

#![warn(clippy::unwrap_used)]

pub mod explain;
pub mod filters;
pub mod recommendations;
pub mod similarity;

pub use explain::{Explanation, ExplanationFactor, FactorKind};
pub use filters::{PriceRange, ProductFilter};
pub use recommendations::{RecommendationEngine, RecommendationItem, RecommendationSource};
