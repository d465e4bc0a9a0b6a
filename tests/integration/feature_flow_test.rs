//! Feature extraction scenarios across the store, extractors and pipeline.

use shopper_core::testing::Fixture;
use shopper_core::types::EventType;
use shopper_features::MODEL_VECTOR_WIDTH;
use shopper_integration_tests::Harness;

#[tokio::test]
async fn rfm_over_four_recent_purchases() {
    let fx = Fixture::new();
    fx.product("p1", "home", 75.0).user("u1");
    for days in [10, 20, 30, 40] {
        fx.purchase("u1", days, &["p1"]);
    }
    let h = Harness::new(&fx, "rfm");
    let features = h.pipeline.process_user_features("u1").await.expect("features");
    assert_eq!(features.rfm_features.recency, 10.0);
    assert_eq!(features.rfm_features.frequency, 4.0);
    assert!((features.rfm_features.monetary - 300.0).abs() < 1e-9);
}

#[tokio::test]
async fn purchase_outside_window_keeps_only_recency() {
    let fx = Fixture::new();
    fx.product("p1", "home", 40.0).user("u1").purchase("u1", 91, &["p1"]);
    let h = Harness::new(&fx, "rfm-window");
    let features = h.pipeline.process_user_features("u1").await.expect("features");
    assert_eq!(features.rfm_features.frequency, 0.0);
    assert_eq!(features.rfm_features.monetary, 0.0);
    assert_eq!(features.rfm_features.recency, 91.0);
}

#[tokio::test]
async fn population_invariants_hold_after_refresh() {
    let fx = Fixture::new();
    fx.product("a", "audio", 50.0)
        .product("b", "books", 12.0)
        .product("c", "cameras", 400.0);
    fx.user("idle");
    fx.user("browser").session(
        "browser",
        1,
        12,
        &[
            (EventType::View, Some("a")),
            (EventType::View, Some("b")),
            (EventType::AddToCart, Some("b")),
        ],
    );
    fx.user("buyer")
        .purchase("buyer", 2, &["a", "b", "c"])
        .purchase("buyer", 8, &["c"]);

    let h = Harness::new(&fx, "invariants");
    let processed = h.pipeline.process_all_users().await;
    assert_eq!(processed.len(), 3);

    let idle = &processed["idle"];
    assert_eq!(idle.browsing_features.bounce_rate, 1.0);
    assert_eq!(idle.browsing_features.weekend_vs_weekday_ratio, 1.0);
    assert!(idle.category_affinity_vector.is_empty());
    assert!(idle.rfm_features.recency.is_infinite());

    for features in processed.values() {
        // 10 base features plus one slot per catalog category
        assert_eq!(features.embedding_vector.len(), 10 + 3);
        if !features.category_affinity_vector.is_empty() {
            let total: f64 = features
                .category_affinity_vector
                .iter()
                .map(|a| a.affinity_score)
                .sum();
            assert!((total - 1.0).abs() < 1e-9);
        }
    }

    let users: Vec<String> = h
        .store
        .list_users()
        .await
        .expect("users")
        .into_iter()
        .map(|u| u.user_id)
        .collect();
    let matrix = h.pipeline.feature_matrix(&users).await.expect("matrix");
    assert_eq!(matrix.data.ncols(), MODEL_VECTOR_WIDTH);
    assert_eq!(matrix.user_ids, users);
    assert!(matrix.data.iter().all(|v| v.is_finite()));
}

#[tokio::test]
async fn reprocessing_is_deterministic() {
    let fx = Fixture::new();
    fx.product("a", "audio", 50.0)
        .user("u1")
        .purchase("u1", 3, &["a"])
        .session("u1", 3, 20, &[(EventType::Search, None), (EventType::View, Some("a"))]);
    let h = Harness::new(&fx, "deterministic");
    let first = h.pipeline.process_user_features("u1").await.expect("first");
    let second = h.pipeline.process_user_features("u1").await.expect("second");
    assert_eq!(first.rfm_features, second.rfm_features);
    assert_eq!(first.browsing_features, second.browsing_features);
    assert_eq!(first.category_affinity_vector, second.category_affinity_vector);
    assert_eq!(first.embedding_vector, second.embedding_vector);

    let stored = h.pipeline.get_features("u1").await.expect("stored");
    assert_eq!(stored.user_id, "u1");
}
