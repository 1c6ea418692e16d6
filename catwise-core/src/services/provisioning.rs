//! Category provisioning - creates categories chosen during review

use std::sync::Arc;

use tracing::{info, warn};

use super::ranking::RankingClient;
use crate::domain::result::{Error, Result};
use crate::domain::{Category, CategoryType, Direction};
use crate::ports::ClassificationStore;

/// Creates a category exactly once, with a description and inferred type
#[derive(Clone)]
pub struct CategoryProvisioner {
    store: Arc<dyn ClassificationStore>,
    ranking: RankingClient,
}

impl CategoryProvisioner {
    pub fn new(store: Arc<dyn ClassificationStore>, ranking: RankingClient) -> Self {
        Self { store, ranking }
    }

    /// Return the category named `name`, creating it when the store has none
    ///
    /// The live store is consulted, not the run's snapshot, so a category
    /// created earlier in the same run is reused. Without a description one
    /// is generated; a generation failure leaves the description empty.
    pub async fn ensure(&self, name: &str, description: Option<&str>, direction: Direction) -> Result<Category> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::validation("Category name cannot be empty"));
        }

        if let Some(existing) = self.store.find_category(name).await? {
            return Ok(existing);
        }

        let description = match description.map(str::trim).filter(|d| !d.is_empty()) {
            Some(d) => d.to_string(),
            None => match self.ranking.describe_category(name).await {
                Ok(generated) => generated,
                Err(e) => {
                    warn!(category = name, error = %e, "Could not generate category description");
                    String::new()
                }
            },
        };

        let category = Category::new(name, CategoryType::for_direction(direction)).with_description(description);
        self.store.create_category(&category).await?;
        info!(category = %category.name, category_type = %category.category_type, "Created category");
        Ok(category)
    }
}
