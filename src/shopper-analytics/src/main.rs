//! Shopper Analytics: behavioral features, segmentation and
//! recommendations over an e-commerce data snapshot.
//!
//! Loads a JSON snapshot into the in-memory store, runs one command and
//! prints its result as JSON.

use clap::{Parser, Subcommand};
use serde::Serialize;
use shopper_core::config::{AppConfig, ClusteringAlgorithm};
use shopper_core::types::FeedbackKind;
use shopper_core::{AnalyticsStore, MemoryStore};
use shopper_features::FeaturePipeline;
use shopper_jobs::{Job, JobContext, JobReport, JobRunner};
use shopper_personalization::RecommendationEngine;
use shopper_segmentation::{SegmentInsights, SegmentationModel, TrainingParams};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "shopper-analytics")]
#[command(about = "Behavioral analytics: features, segments and recommendations")]
#[command(version)]
struct Cli {
    /// JSON data snapshot to load (empty store when omitted)
    #[arg(long, env = "SHOPPER_ANALYTICS__DATA")]
    data: Option<PathBuf>,

    /// Write the store back to this path after the command
    #[arg(long)]
    save: Option<PathBuf>,

    /// Node identifier (overrides config)
    #[arg(long, env = "SHOPPER_ANALYTICS__NODE_ID")]
    node_id: Option<String>,

    /// Segmentation model file (overrides config)
    #[arg(long, env = "SHOPPER_ANALYTICS__SEGMENTATION__MODEL_PATH")]
    model_path: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Recompute features for every user
    RefreshFeatures,
    /// Show the stored feature record of one user
    Features { user_id: String },
    /// Train the segmentation model and assign users
    Train {
        #[arg(long)]
        algorithm: Option<ClusteringAlgorithm>,
        #[arg(long)]
        clusters: Option<usize>,
        #[arg(long, default_value_t = false)]
        no_pca: bool,
    },
    /// Predict and store a segment for every user from the saved model
    AssignSegments,
    /// Predict the segment of one user
    Predict { user_id: String },
    /// Member counts per segment
    Segments,
    /// Behavioral report for one segment
    Insights { segment_id: String },
    /// Personalized recommendations
    Recommend {
        user_id: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long)]
        category: Option<String>,
        /// e.g. "0-50" or "100+"
        #[arg(long)]
        price_range: Option<String>,
    },
    /// Why a product suits a user
    Explain { user_id: String, product_id: String },
    /// Record feedback on a served recommendation
    Feedback {
        user_id: String,
        product_id: String,
        /// click, purchase or ignore
        kind: FeedbackKind,
        #[arg(long, default_value_t = 0)]
        position: u32,
    },
    /// Products with similar attributes
    Similar {
        product_id: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Products co-purchased with a product
    BoughtTogether {
        product_id: String,
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
    /// Products trending over the recent window
    Trending {
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long)]
        category: Option<String>,
    },
    /// Users grouped by RFM segment
    RfmSegments,
    /// Delete stale feature records
    Cleanup,
    /// Feature coverage report
    Quality,
}

struct App {
    store: Arc<dyn AnalyticsStore>,
    pipeline: FeaturePipeline,
    segmentation: Arc<SegmentationModel>,
    recommendations: RecommendationEngine,
    runner: JobRunner,
    jobs: JobContext,
}

impl App {
    fn new(config: &AppConfig, store: Arc<dyn AnalyticsStore>) -> Self {
        let pipeline = FeaturePipeline::new(store.clone(), config.features.clone());
        let segmentation = Arc::new(SegmentationModel::new(
            store.clone(),
            pipeline.clone(),
            config.segmentation.clone(),
        ));
        Self {
            recommendations: RecommendationEngine::new(
                store.clone(),
                config.recommendations.clone(),
            ),
            runner: JobRunner::from_config(&config.jobs),
            jobs: JobContext::new(pipeline.clone(), segmentation.clone()),
            store,
            pipeline,
            segmentation,
        }
    }

    async fn job(&self, job: Job) -> anyhow::Result<JobReport> {
        let report = self.jobs.run(&self.runner, job).await;
        if !report.succeeded() {
            print_json(&report)?;
            anyhow::bail!("job {} did not succeed", report.job);
        }
        Ok(report)
    }

    async fn dispatch(&self, command: Command) -> anyhow::Result<()> {
        match command {
            Command::RefreshFeatures => print_json(&self.job(Job::RefreshFeatures).await?),
            Command::Features { user_id } => print_json(&self.pipeline.get_features(&user_id).await),
            Command::Train {
                algorithm,
                clusters,
                no_pca,
            } => {
                let defaults = TrainingParams::from_config(self.segmentation.config());
                let params = TrainingParams {
                    algorithm: algorithm.unwrap_or(defaults.algorithm),
                    n_clusters: clusters.unwrap_or(defaults.n_clusters),
                    use_pca: defaults.use_pca && !no_pca,
                };
                print_json(&self.job(Job::RetrainSegmentation(params)).await?)
            }
            Command::AssignSegments => print_json(&self.job(Job::AssignSegments).await?),
            Command::Predict { user_id } => {
                print_json(&self.segmentation.predict_segment(&user_id).await)
            }
            Command::Segments => print_json(&self.segmentation.segment_statistics().await?),
            Command::Insights { segment_id } => {
                let insights = SegmentInsights::new(self.store.clone(), self.pipeline.clone());
                match insights.for_segment(&segment_id).await? {
                    Some(insight) => print_json(&insight),
                    None => anyhow::bail!("segment {segment_id} not found"),
                }
            }
            Command::Recommend {
                user_id,
                limit,
                category,
                price_range,
            } => print_json(
                &self
                    .recommendations
                    .recommend(&user_id, limit, category.as_deref(), price_range.as_deref())
                    .await,
            ),
            Command::Explain {
                user_id,
                product_id,
            } => print_json(&self.recommendations.explain(&user_id, &product_id).await),
            Command::Feedback {
                user_id,
                product_id,
                kind,
                position,
            } => {
                let id = self
                    .recommendations
                    .record_feedback(&user_id, &product_id, kind, position)
                    .await;
                print_json(&serde_json::json!({ "feedback_id": id }))
            }
            Command::Similar { product_id, limit } => print_json(
                &self
                    .recommendations
                    .similar_products(&product_id, limit)
                    .await,
            ),
            Command::BoughtTogether { product_id, limit } => print_json(
                &self
                    .recommendations
                    .frequently_bought_together(&product_id, limit)
                    .await,
            ),
            Command::Trending { limit, category } => print_json(
                &self
                    .recommendations
                    .trending_products(limit, category.as_deref())
                    .await,
            ),
            Command::RfmSegments => print_json(&self.pipeline.rfm().segments_by_rfm().await?),
            Command::Cleanup => print_json(&self.job(Job::CleanupStaleFeatures).await?),
            Command::Quality => print_json(&self.job(Job::FeatureQuality).await?),
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays valid JSON.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "shopper_analytics=info,shopper_features=info,shopper_segmentation=info,\
                 shopper_personalization=info,shopper_jobs=info"
                    .into()
            }),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });
    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(path) = cli.model_path {
        config.segmentation.model_path = path;
    }
    info!(
        node_id = %config.node_id,
        model_path = %config.segmentation.model_path,
        "Configuration loaded"
    );

    let store = Arc::new(match &cli.data {
        Some(path) => MemoryStore::load_json(path).await?,
        None => MemoryStore::new(),
    });
    let app = App::new(&config, store.clone());
    app.dispatch(cli.command).await?;

    if let Some(path) = &cli.save {
        store.save_json(path).await?;
    }
    Ok(())
}
