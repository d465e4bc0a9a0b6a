//! Wiring shared by the cross-crate scenario tests.

use shopper_core::config::{FeatureConfig, RecommendationConfig, SegmentationConfig};
use shopper_core::testing::Fixture;
use shopper_core::AnalyticsStore;
use shopper_features::FeaturePipeline;
use shopper_personalization::RecommendationEngine;
use shopper_segmentation::SegmentationModel;
use std::path::PathBuf;
use std::sync::Arc;

pub struct Harness {
    pub store: Arc<dyn AnalyticsStore>,
    pub pipeline: FeaturePipeline,
    pub model_path: PathBuf,
}

impl Harness {
    /// `tag` keeps model files of concurrently running tests apart.
    pub fn new(fx: &Fixture, tag: &str) -> Self {
        let store: Arc<dyn AnalyticsStore> = fx.store();
        let pipeline = FeaturePipeline::new(store.clone(), FeatureConfig::default());
        let model_path = std::env::temp_dir().join(format!(
            "shopper-it-{tag}-{}/segmentation_model.json",
            std::process::id()
        ));
        Self {
            store,
            pipeline,
            model_path,
        }
    }

    pub fn segmentation(&self, config: SegmentationConfig) -> SegmentationModel {
        let config = SegmentationConfig {
            model_path: self.model_path.display().to_string(),
            ..config
        };
        SegmentationModel::new(self.store.clone(), self.pipeline.clone(), config)
    }

    pub fn recommendations(&self) -> RecommendationEngine {
        RecommendationEngine::new(self.store.clone(), RecommendationConfig::default())
    }

    pub fn cleanup(&self) {
        if let Some(dir) = self.model_path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }
}
