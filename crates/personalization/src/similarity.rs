//! Similarity measures shared by the recommendation strategies.

use shopper_core::types::Product;

const CATEGORY_MATCH: f64 = 0.4;
const BRAND_MATCH: f64 = 0.3;
const PRICE_MATCH: f64 = 0.3;
/// Relative price gap under which two products count as similarly priced.
const PRICE_TOLERANCE: f64 = 0.2;

/// Cosine similarity of two dense vectors; zero when either has no magnitude.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Attribute overlap in `[0, 1]`: category, brand and price proximity.
/// Brands only match when both products declare one.
pub fn product_similarity(a: &Product, b: &Product) -> f64 {
    let mut score = 0.0;
    if a.category == b.category {
        score += CATEGORY_MATCH;
    }
    if let (Some(brand_a), Some(brand_b)) = (&a.brand, &b.brand) {
        if brand_a == brand_b {
            score += BRAND_MATCH;
        }
    }
    if let (Some(pa), Some(pb)) = (a.current_price(), b.current_price()) {
        if pa > 0.0 && pb > 0.0 && (pa - pb).abs() / pa.max(pb) < PRICE_TOLERANCE {
            score += PRICE_MATCH;
        }
    }
    score
}
