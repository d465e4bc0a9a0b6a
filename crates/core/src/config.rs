use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `SHOPPER_ANALYTICS__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub segmentation: SegmentationConfig,
    #[serde(default)]
    pub recommendations: RecommendationConfig,
    #[serde(default)]
    pub jobs: JobConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeatureConfig {
    /// Users processed concurrently per batch during a full refresh.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_rfm_window_days")]
    pub rfm_window_days: i64,
    #[serde(default = "default_stale_after_days")]
    pub stale_after_days: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusteringAlgorithm {
    Kmeans,
    Dbscan,
}

impl ClusteringAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kmeans => "kmeans",
            Self::Dbscan => "dbscan",
        }
    }
}

impl std::str::FromStr for ClusteringAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "kmeans" => Ok(Self::Kmeans),
            "dbscan" => Ok(Self::Dbscan),
            other => Err(format!("Unknown algorithm: {other}")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SegmentationConfig {
    #[serde(default = "default_algorithm")]
    pub algorithm: ClusteringAlgorithm,
    #[serde(default = "default_n_clusters")]
    pub n_clusters: usize,
    #[serde(default = "default_use_pca")]
    pub use_pca: bool,
    #[serde(default = "default_pca_variance")]
    pub pca_variance: f64,
    #[serde(default = "default_min_users")]
    pub min_users: usize,
    #[serde(default = "default_kmeans_n_init")]
    pub kmeans_n_init: usize,
    #[serde(default = "default_kmeans_max_iter")]
    pub kmeans_max_iter: usize,
    #[serde(default = "default_random_seed")]
    pub random_seed: u64,
    #[serde(default = "default_dbscan_eps")]
    pub dbscan_eps: f64,
    #[serde(default = "default_dbscan_min_samples")]
    pub dbscan_min_samples: usize,
    /// Members sampled per segment for category, price and LTV profiling.
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
    #[serde(default = "default_model_path")]
    pub model_path: String,
    #[serde(default = "default_prune_stale_segments")]
    pub prune_stale_segments: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecommendationConfig {
    #[serde(default = "default_collaborative_weight")]
    pub collaborative_weight: f64,
    #[serde(default = "default_content_weight")]
    pub content_weight: f64,
    #[serde(default = "default_segment_weight")]
    pub segment_weight: f64,
    #[serde(default = "default_neighbor_count")]
    pub neighbor_count: usize,
    #[serde(default = "default_neighbor_scan_cap")]
    pub neighbor_scan_cap: usize,
    #[serde(default = "default_popular_score")]
    pub popular_score: f64,
    #[serde(default = "default_segment_score")]
    pub segment_score: f64,
    #[serde(default = "default_trending_window_days")]
    pub trending_window_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    #[serde(default = "default_soft_limit_secs")]
    pub soft_limit_secs: u64,
    #[serde(default = "default_hard_limit_secs")]
    pub hard_limit_secs: u64,
}

// Default functions
fn default_node_id() -> String {
    "analytics-01".to_string()
}
fn default_batch_size() -> usize {
    100
}
fn default_rfm_window_days() -> i64 {
    90
}
fn default_stale_after_days() -> i64 {
    90
}
fn default_algorithm() -> ClusteringAlgorithm {
    ClusteringAlgorithm::Kmeans
}
fn default_n_clusters() -> usize {
    5
}
fn default_use_pca() -> bool {
    true
}
fn default_pca_variance() -> f64 {
    0.95
}
fn default_min_users() -> usize {
    10
}
fn default_kmeans_n_init() -> usize {
    10
}
fn default_kmeans_max_iter() -> usize {
    300
}
fn default_random_seed() -> u64 {
    42
}
fn default_dbscan_eps() -> f64 {
    0.5
}
fn default_dbscan_min_samples() -> usize {
    5
}
fn default_sample_size() -> usize {
    50
}
fn default_model_path() -> String {
    "models/segmentation/segmentation_model.json".to_string()
}
fn default_prune_stale_segments() -> bool {
    true
}
fn default_collaborative_weight() -> f64 {
    0.4
}
fn default_content_weight() -> f64 {
    0.4
}
fn default_segment_weight() -> f64 {
    0.2
}
fn default_neighbor_count() -> usize {
    10
}
fn default_neighbor_scan_cap() -> usize {
    100
}
fn default_popular_score() -> f64 {
    0.5
}
fn default_segment_score() -> f64 {
    0.6
}
fn default_trending_window_days() -> i64 {
    7
}
fn default_soft_limit_secs() -> u64 {
    25 * 60
}
fn default_hard_limit_secs() -> u64 {
    30 * 60
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            rfm_window_days: default_rfm_window_days(),
            stale_after_days: default_stale_after_days(),
        }
    }
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            algorithm: default_algorithm(),
            n_clusters: default_n_clusters(),
            use_pca: default_use_pca(),
            pca_variance: default_pca_variance(),
            min_users: default_min_users(),
            kmeans_n_init: default_kmeans_n_init(),
            kmeans_max_iter: default_kmeans_max_iter(),
            random_seed: default_random_seed(),
            dbscan_eps: default_dbscan_eps(),
            dbscan_min_samples: default_dbscan_min_samples(),
            sample_size: default_sample_size(),
            model_path: default_model_path(),
            prune_stale_segments: default_prune_stale_segments(),
        }
    }
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            collaborative_weight: default_collaborative_weight(),
            content_weight: default_content_weight(),
            segment_weight: default_segment_weight(),
            neighbor_count: default_neighbor_count(),
            neighbor_scan_cap: default_neighbor_scan_cap(),
            popular_score: default_popular_score(),
            segment_score: default_segment_score(),
            trending_window_days: default_trending_window_days(),
        }
    }
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            soft_limit_secs: default_soft_limit_secs(),
            hard_limit_secs: default_hard_limit_secs(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            features: FeatureConfig::default(),
            segmentation: SegmentationConfig::default(),
            recommendations: RecommendationConfig::default(),
            jobs: JobConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("SHOPPER_ANALYTICS")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
