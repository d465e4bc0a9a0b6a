//! Training, assignment and insight scenarios over a refreshed population.

use shopper_core::config::{ClusteringAlgorithm, SegmentationConfig};
use shopper_core::testing::Fixture;
use shopper_core::types::EventType;
use shopper_core::AnalyticsError;
use shopper_integration_tests::Harness;
use shopper_jobs::{Job, JobContext, JobRunner};
use shopper_segmentation::{SegmentInsights, TrainingParams};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Three groups of ten users; members of a group share identical history.
fn three_groups() -> Fixture {
    let fx = Fixture::new();
    fx.product("a", "audio", 50.0)
        .product("c", "cameras", 400.0)
        .product("b", "books", 12.0);
    for i in 0..10 {
        let id = format!("recent-{i}");
        fx.user(&id).purchase(&id, 2, &["a"]).purchase(&id, 4, &["a"]);
    }
    for i in 0..10 {
        let id = format!("lapsed-{i}");
        fx.user(&id).purchase(&id, 70, &["c"]);
    }
    for i in 0..10 {
        let id = format!("browser-{i}");
        fx.user(&id).session(
            &id,
            5,
            15,
            &[(EventType::View, Some("b")), (EventType::AddToCart, Some("b"))],
        );
    }
    fx
}

fn kmeans_params(n_clusters: usize) -> TrainingParams {
    TrainingParams {
        algorithm: ClusteringAlgorithm::Kmeans,
        n_clusters,
        use_pca: true,
    }
}

#[tokio::test]
async fn kmeans_recovers_identical_groups() {
    let fx = three_groups();
    let h = Harness::new(&fx, "kmeans-groups");
    h.pipeline.process_all_users().await;
    let model = h.segmentation(SegmentationConfig::default());

    let outcome = model.train(kmeans_params(3)).await;
    let summary = outcome.summary().expect("training succeeded").clone();
    assert_eq!(summary.segments_created, 3);
    assert_eq!(summary.users_segmented, 30);
    assert!(summary.silhouette_score > 0.5);
    assert!(summary.pca_components.is_some());

    let users = h.store.list_users().await.expect("users");
    assert!(users.iter().all(|u| u.segment_id.is_some()));
    for prefix in ["recent-", "lapsed-", "browser-"] {
        let ids: HashSet<_> = users
            .iter()
            .filter(|u| u.user_id.starts_with(prefix))
            .map(|u| u.segment_id.clone())
            .collect();
        assert_eq!(ids.len(), 1, "group {prefix} split across segments");
    }

    let report = model.assign_all().await.expect("assign");
    assert_eq!(report.assigned, 30);
    assert_eq!(report.unassigned, 0);

    let predicted = model.predict_segment("recent-3").await;
    let stored = h
        .store
        .get_user("recent-3")
        .await
        .expect("user")
        .and_then(|u| u.segment_id);
    assert_eq!(predicted, stored);

    let stats = model.segment_statistics().await.expect("stats");
    assert_eq!(stats.total_segments, 3);
    let total: f64 = stats.segments.iter().map(|s| s.percentage).sum();
    assert!((total - 100.0).abs() < 1e-9);
    h.cleanup();
}

#[tokio::test]
async fn dbscan_leaves_outliers_unsegmented() {
    let fx = Fixture::new();
    fx.product("a", "audio", 50.0)
        .product("c", "cameras", 400.0)
        .product("b", "books", 12.0);
    for i in 0..12 {
        fx.user(&format!("quiet-{i}"));
    }
    fx.user("whale");
    for days in [1, 3, 5, 7, 9] {
        fx.purchase("whale", days, &["c", "c"]);
    }
    fx.user("reader").purchase("reader", 80, &["b"]);
    fx.user("window-shopper").session(
        "window-shopper",
        2,
        40,
        &[
            (EventType::Search, None),
            (EventType::View, Some("a")),
            (EventType::View, Some("c")),
            (EventType::AddToCart, Some("a")),
        ],
    );

    let h = Harness::new(&fx, "dbscan-outliers");
    h.pipeline.process_all_users().await;
    let model = h.segmentation(SegmentationConfig::default());
    let outcome = model
        .train(TrainingParams {
            algorithm: ClusteringAlgorithm::Dbscan,
            n_clusters: 0,
            use_pca: false,
        })
        .await;
    let summary = outcome.summary().expect("training succeeded").clone();
    assert_eq!(summary.segments_created, 1);
    assert_eq!(summary.noise_users, 3);
    assert_eq!(summary.silhouette_score, 0.0);
    assert_eq!(summary.segments[0].size, 12);

    for outlier in ["whale", "reader", "window-shopper"] {
        let user = h.store.get_user(outlier).await.expect("user").expect("exists");
        assert_eq!(user.segment_id, None);
    }
    let quiet = h.store.get_user("quiet-0").await.expect("user").expect("exists");
    assert_eq!(quiet.segment_id.as_deref(), Some(summary.segments[0].segment_id.as_str()));

    assert!(matches!(model.assign_all().await, Err(AnalyticsError::Model(_))));
    assert_eq!(model.predict_segment("quiet-0").await, None);
    h.cleanup();
}

#[tokio::test]
async fn insights_describe_a_trained_segment() {
    let fx = three_groups();
    fx.review_with_aspects("lapsed-0", "c", -0.6, &[("battery", -0.8), ("price", -0.2)]);
    let h = Harness::new(&fx, "insights");
    h.pipeline.process_all_users().await;
    let model = h.segmentation(SegmentationConfig::default());
    assert!(model.train(kmeans_params(3)).await.is_success());

    let lapsed_segment = h
        .store
        .get_user("lapsed-0")
        .await
        .expect("user")
        .and_then(|u| u.segment_id)
        .expect("segmented");
    let insights = SegmentInsights::new(h.store.clone(), h.pipeline.clone());
    let insight = insights
        .for_segment(&lapsed_segment)
        .await
        .expect("insights")
        .expect("segment exists");
    assert_eq!(insight.segment_id, lapsed_segment);
    assert_eq!(
        insight.pain_points.first().map(String::as_str),
        Some("Negative sentiment about battery")
    );
    assert_eq!(insight.preferences[0].category, "cameras");
    assert!((insight.avg_order_value - 400.0).abs() < 1e-9);

    let missing = insights.for_segment("segment_99").await.expect("insights");
    assert!(missing.is_none());
    h.cleanup();
}

#[tokio::test]
async fn job_chain_refreshes_trains_and_assigns() {
    let fx = three_groups();
    let h = Harness::new(&fx, "jobs");
    let model = Arc::new(h.segmentation(SegmentationConfig::default()));
    let ctx = JobContext::new(h.pipeline.clone(), model.clone());
    let runner = JobRunner::new(Duration::from_secs(30), Duration::from_secs(60));

    let refresh = ctx.run(&runner, Job::RefreshFeatures).await;
    assert!(refresh.succeeded());
    let train = ctx
        .run(&runner, Job::RetrainSegmentation(kmeans_params(3)))
        .await;
    assert!(train.succeeded(), "{:?}", train.detail);
    let assign = ctx.run(&runner, Job::AssignSegments).await;
    assert!(assign.succeeded());
    assert_eq!(assign.detail["assigned"], 30);

    let segments = h.store.list_segments().await.expect("segments");
    assert_eq!(segments.len(), 3);
    h.cleanup();
}
