use shopper_core::{AnalyticsResult, AnalyticsStore};
use std::collections::HashMap;

/// Product → category memo scoped to one computation.
pub struct CategoryLookup<'a> {
    store: &'a dyn AnalyticsStore,
    memo: HashMap<String, Option<String>>,
}

impl<'a> CategoryLookup<'a> {
    pub fn new(store: &'a dyn AnalyticsStore) -> Self {
        Self {
            store,
            memo: HashMap::new(),
        }
    }

    /// `None` for products missing from the catalog.
    pub async fn category_of(&mut self, product_id: &str) -> AnalyticsResult<Option<String>> {
        if let Some(hit) = self.memo.get(product_id) {
            return Ok(hit.clone());
        }
        let category = self
            .store
            .get_product(product_id)
            .await?
            .map(|p| p.category);
        self.memo.insert(product_id.to_string(), category.clone());
        Ok(category)
    }
}
