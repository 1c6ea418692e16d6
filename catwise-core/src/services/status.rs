//! Status service - classification coverage summary

use std::sync::Arc;

use serde::Serialize;

use crate::domain::result::Result;
use crate::domain::{ClassificationProgress, ClassificationStatus};
use crate::ports::ClassificationStore;

/// Status service for classification summaries
pub struct StatusService {
    store: Arc<dyn ClassificationStore>,
}

impl StatusService {
    pub fn new(store: Arc<dyn ClassificationStore>) -> Self {
        Self { store }
    }

    /// Get overall status summary
    pub async fn get_status(&self, confidence_threshold: f64) -> Result<StatusSummary> {
        let unclassified = self.store.get_unclassified_transactions(None).await?;
        let classifications = self.store.get_classifications().await?;
        let categories = self.store.get_categories().await?;
        let vendors = self.store.get_vendors().await?;
        let patterns = self.store.get_check_patterns().await?;
        let checkpoint = self.store.get_progress().await?;

        let count = |status: ClassificationStatus| classifications.iter().filter(|c| c.status == status).count() as i64;

        Ok(StatusSummary {
            unclassified_transactions: unclassified.len() as i64,
            classified_transactions: classifications.len() as i64,
            by_status: StatusCounts {
                rule: count(ClassificationStatus::Rule),
                ai: count(ClassificationStatus::Ai),
                user_modified: count(ClassificationStatus::UserModified),
            },
            low_confidence: classifications
                .iter()
                .filter(|c| c.confidence < confidence_threshold)
                .count() as i64,
            total_categories: categories.len() as i64,
            total_vendors: vendors.len() as i64,
            active_check_patterns: patterns.iter().filter(|p| p.active).count() as i64,
            checkpoint,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct StatusSummary {
    pub unclassified_transactions: i64,
    pub classified_transactions: i64,
    pub by_status: StatusCounts,
    /// Classifications a rerank would revisit
    pub low_confidence: i64,
    pub total_categories: i64,
    pub total_vendors: i64,
    pub active_check_patterns: i64,
    pub checkpoint: Option<ClassificationProgress>,
}

#[derive(Debug, Serialize)]
pub struct StatusCounts {
    pub rule: i64,
    pub ai: i64,
    pub user_modified: i64,
}
