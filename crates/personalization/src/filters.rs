//! Post-blend filters for recommendation lists.

use serde::{Deserialize, Serialize};
use shopper_core::types::Product;

/// Inclusive price bounds; `max` of `None` means open-ended (`"100+"`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: f64,
    pub max: Option<f64>,
}

impl PriceRange {
    /// Accepts `"a-b"` and `"a+"`. Anything else yields `None`, which
    /// callers treat as "no price filter".
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if let Some(min) = raw.strip_suffix('+') {
            let min = min.trim().parse::<f64>().ok()?;
            return Some(Self { min, max: None });
        }
        let (lo, hi) = raw.split_once('-')?;
        let min = lo.trim().parse::<f64>().ok()?;
        let max = hi.trim().parse::<f64>().ok()?;
        Some(Self {
            min,
            max: Some(max),
        })
    }

    pub fn contains(&self, price: f64) -> bool {
        price >= self.min && self.max.map_or(true, |max| price <= max)
    }
}

/// Category and price constraints applied after blending.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductFilter {
    pub category: Option<String>,
    pub price_range: Option<PriceRange>,
}

impl ProductFilter {
    pub fn new(category: Option<&str>, price_range: Option<&str>) -> Self {
        Self {
            category: category.map(str::to_string),
            price_range: price_range.and_then(PriceRange::parse),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.category.is_none() && self.price_range.is_none()
    }

    /// Products without a price history never pass a price filter.
    pub fn accepts(&self, product: &Product) -> bool {
        if let Some(category) = &self.category {
            if product.category != *category {
                return false;
            }
        }
        match (&self.price_range, product.current_price()) {
            (Some(range), Some(price)) => range.contains(price),
            (Some(_), None) => false,
            (None, _) => true,
        }
    }
}
