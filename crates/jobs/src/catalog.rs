//! The jobs the scheduler can run and what each one does.

use crate::runner::{JobReport, JobRunner};
use serde::{Deserialize, Serialize};
use shopper_features::FeaturePipeline;
use shopper_segmentation::{SegmentationModel, TrainingOutcome, TrainingParams};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "job", rename_all = "snake_case")]
pub enum Job {
    RefreshFeatures,
    RetrainSegmentation(TrainingParams),
    AssignSegments,
    CleanupStaleFeatures,
    FeatureQuality,
}

impl Job {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RefreshFeatures => "refresh_features",
            Self::RetrainSegmentation(_) => "retrain_segmentation",
            Self::AssignSegments => "assign_segments",
            Self::CleanupStaleFeatures => "cleanup_stale_features",
            Self::FeatureQuality => "feature_quality",
        }
    }
}

/// Components the jobs operate on.
#[derive(Clone)]
pub struct JobContext {
    pipeline: FeaturePipeline,
    segmentation: Arc<SegmentationModel>,
}

impl JobContext {
    pub fn new(pipeline: FeaturePipeline, segmentation: Arc<SegmentationModel>) -> Self {
        Self {
            pipeline,
            segmentation,
        }
    }

    pub async fn execute(&self, job: &Job) -> anyhow::Result<serde_json::Value> {
        let detail = match job {
            Job::RefreshFeatures => {
                let processed = self.pipeline.process_all_users().await;
                serde_json::json!({ "users_processed": processed.len() })
            }
            Job::RetrainSegmentation(params) => {
                match self.segmentation.train(*params).await {
                    TrainingOutcome::Error { message } => anyhow::bail!(message),
                    outcome => serde_json::to_value(outcome)?,
                }
            }
            Job::AssignSegments => serde_json::to_value(self.segmentation.assign_all().await?)?,
            Job::CleanupStaleFeatures => {
                let removed = self.pipeline.cleanup_stale_features().await?;
                serde_json::json!({ "removed": removed })
            }
            Job::FeatureQuality => serde_json::to_value(self.pipeline.quality_report().await?)?,
        };
        Ok(detail)
    }

    pub async fn run(&self, runner: &JobRunner, job: Job) -> JobReport {
        runner.run(job.name(), self.execute(&job)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::JobStatus;
    use shopper_core::config::{ClusteringAlgorithm, FeatureConfig, SegmentationConfig};
    use shopper_core::testing::Fixture;
    use shopper_core::AnalyticsStore;
    use std::time::Duration;

    fn context(fx: &Fixture, model_path: &std::path::Path) -> JobContext {
        let store: Arc<dyn AnalyticsStore> = fx.store();
        let pipeline = FeaturePipeline::new(store.clone(), FeatureConfig::default());
        let config = SegmentationConfig {
            model_path: model_path.display().to_string(),
            ..SegmentationConfig::default()
        };
        let model = SegmentationModel::new(store, pipeline.clone(), config);
        JobContext::new(pipeline, Arc::new(model))
    }

    fn runner() -> JobRunner {
        JobRunner::new(Duration::from_secs(5), Duration::from_secs(30))
    }

    fn kmeans(k: usize) -> Job {
        Job::RetrainSegmentation(TrainingParams {
            algorithm: ClusteringAlgorithm::Kmeans,
            n_clusters: k,
            use_pca: false,
        })
    }

    #[tokio::test]
    async fn test_refresh_then_retrain_then_assign() {
        let fx = Fixture::new();
        fx.product("p1", "books", 20.0);
        for i in 0..12 {
            let id = format!("u{i}");
            fx.user(&id);
            if i % 2 == 0 {
                fx.purchase(&id, 3, &["p1"]);
            }
        }
        let path = std::env::temp_dir().join(format!("shopper-jobs-{}.json", std::process::id()));
        let ctx = context(&fx, &path);
        let runner = runner();

        let refresh = ctx.run(&runner, Job::RefreshFeatures).await;
        assert!(refresh.succeeded());
        assert_eq!(refresh.detail["users_processed"], 12);

        let train = ctx.run(&runner, kmeans(2)).await;
        assert!(train.succeeded(), "{:?}", train.detail);
        assert_eq!(train.detail["status"], "success");
        assert_eq!(train.detail["segments_created"], 2);

        let assign = ctx.run(&runner, Job::AssignSegments).await;
        assert!(assign.succeeded());
        assert_eq!(assign.detail["assigned"], 12);

        let quality = ctx.run(&runner, Job::FeatureQuality).await;
        assert_eq!(quality.detail["users_with_features"], 12);
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_training_error_marks_job_failed() {
        let fx = Fixture::new();
        fx.user("only");
        let path = std::env::temp_dir().join(format!("shopper-jobs-fail-{}.json", std::process::id()));
        let ctx = context(&fx, &path);
        let report = ctx.run(&runner(), kmeans(2)).await;
        assert_eq!(report.status, JobStatus::Failed);
        assert!(report.detail["error"]
            .as_str()
            .unwrap_or_default()
            .contains("Need at least 10 users"));
    }

    #[test]
    fn test_job_names() {
        assert_eq!(Job::RefreshFeatures.name(), "refresh_features");
        assert_eq!(kmeans(3).name(), "retrain_segmentation");
        let json = serde_json::to_value(kmeans(3)).expect("serialize");
        assert_eq!(json["job"], "retrain_segmentation");
        assert_eq!(json["n_clusters"], 3);
    }
}
