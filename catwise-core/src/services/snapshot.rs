//! Category snapshot - the category list frozen at the start of a run
//!
//! Every merchant in a run sees the same snapshot. Categories created while
//! the run reviews results become visible starting with the next run.

use std::collections::HashSet;
use std::sync::Arc;

use crate::domain::result::{Error, Result};
use crate::domain::{filter_categories_for_direction, Category, Direction};
use crate::ports::ClassificationStore;

/// Immutable, cheaply cloned view of the categories known at run start
#[derive(Debug, Clone)]
pub struct CategorySnapshot {
    categories: Arc<[Category]>,
    names: Arc<HashSet<String>>,
}

impl CategorySnapshot {
    /// Load the snapshot from the store
    ///
    /// An empty category list is fatal: nothing can be classified.
    pub async fn load(store: &dyn ClassificationStore) -> Result<Self> {
        let categories = store.get_categories().await?;
        if categories.is_empty() {
            return Err(Error::NoCategories);
        }
        Ok(Self::new(categories))
    }

    pub fn new(categories: Vec<Category>) -> Self {
        let names = categories
            .iter()
            .map(|c| normalize(&c.name))
            .collect::<HashSet<_>>();
        Self {
            categories: categories.into(),
            names: Arc::new(names),
        }
    }

    /// Whether a category with this name (ignoring case) existed at run start
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(&normalize(name))
    }

    pub fn get(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.has_name(name))
    }

    /// Categories offered to the ranking oracle for a direction
    pub fn for_direction(&self, direction: Direction) -> Vec<Category> {
        filter_categories_for_direction(&self.categories, direction)
    }

    pub fn all(&self) -> &[Category] {
        &self.categories
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}
