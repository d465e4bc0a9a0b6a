//! Recommendation scenarios driven through the feature pipeline.

use shopper_core::testing::Fixture;
use shopper_core::types::FeedbackKind;
use shopper_integration_tests::Harness;
use shopper_personalization::FactorKind;

fn catalog(fx: &Fixture) {
    fx.product("a1", "audio", 50.0)
        .product("a2", "audio", 80.0)
        .product("b1", "books", 12.0)
        .product("b2", "books", 15.0)
        .product("c1", "cameras", 400.0)
        .product("c2", "cameras", 650.0);
}

#[tokio::test]
async fn unknown_user_gets_popular_products() {
    let fx = Fixture::new();
    catalog(&fx);
    let h = Harness::new(&fx, "popular");
    let engine = h.recommendations();

    let items = engine.recommend("nobody", 5, None, None).await;
    assert_eq!(items.len(), 5);
    assert!(items
        .iter()
        .all(|i| i.score == 0.5 && i.reason == "Popular product"));

    let books = engine.recommend("nobody", 5, Some("books"), None).await;
    assert_eq!(books.len(), 2);
}

#[tokio::test]
async fn bought_together_confidence() {
    let fx = Fixture::new();
    catalog(&fx);
    fx.user("u1").user("u2");
    for days in 1..=3 {
        fx.purchase("u1", days, &["c1", "a1"]);
    }
    fx.purchase("u2", 1, &["c1", "b1"]).purchase("u2", 2, &["c1"]);

    let h = Harness::new(&fx, "bought-together");
    let items = h.recommendations().frequently_bought_together("c1", 5).await;
    assert_eq!(items[0].product_id, "a1");
    assert!((items[0].score - 0.6).abs() < 1e-9);
    assert_eq!(items[1].product_id, "b1");
    assert!((items[1].score - 0.2).abs() < 1e-9);
    assert!(items.iter().all(|i| i.product_id != "c1"));
}

#[tokio::test]
async fn buyer_is_steered_to_preferred_category() {
    let fx = Fixture::new();
    catalog(&fx);
    fx.user("fan")
        .purchase("fan", 3, &["a1"])
        .purchase("fan", 9, &["a1"]);
    let h = Harness::new(&fx, "content");
    h.pipeline.process_all_users().await;
    let engine = h.recommendations();

    let items = engine.recommend("fan", 4, None, None).await;
    assert!(!items.is_empty());
    assert!(items
        .iter()
        .all(|i| i.product_id.starts_with('a') && i.reason == "Based on your interest in audio"));

    let cheap = engine.recommend("fan", 4, None, Some("0-60")).await;
    assert_eq!(
        cheap.iter().map(|i| i.product_id.as_str()).collect::<Vec<_>>(),
        vec!["a1"]
    );

    let explanation = engine.explain("fan", "a2").await;
    assert_eq!(explanation.factors[0].kind, FactorKind::CategoryAffinity);
    assert!((explanation.factors[0].weight - 1.0).abs() < 1e-9);
    assert!(engine.explain("nobody", "a2").await.factors.is_empty());
}

#[tokio::test]
async fn feedback_is_logged() {
    let fx = Fixture::new();
    catalog(&fx);
    let h = Harness::new(&fx, "feedback");
    let engine = h.recommendations();
    let first = engine.record_feedback("u1", "a1", FeedbackKind::Click, 0).await;
    let second = engine.record_feedback("u1", "a2", FeedbackKind::Purchase, 1).await;
    assert!(first.is_some());
    assert!(second > first);
}
