//! Review prompter port - interactive confirmation of uncertain results

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::result::Result;
use crate::domain::{Category, CategoryRankings, CheckPattern, ReviewDecision, Transaction};

/// A suggestion waiting for a person to confirm or correct it
#[derive(Debug, Clone, Serialize)]
pub struct PendingClassification {
    /// Transactions the decision applies to; the first one is shown as the example
    pub transactions: Vec<Transaction>,
    pub suggested_category: Option<String>,
    pub confidence: f64,
    /// The suggestion names a category that does not exist yet
    pub is_new_category: bool,
    pub rankings: CategoryRankings,
    pub check_patterns: Vec<CheckPattern>,
    /// Every category known at the start of the run
    pub categories: Vec<Category>,
    /// Number of other transactions from the same merchant
    pub similar_count: usize,
}

impl PendingClassification {
    pub fn representative(&self) -> Option<&Transaction> {
        self.transactions.first()
    }
}

/// Interactive reviewer
///
/// Returning [`crate::Error::Cancelled`] stops the whole run; any other error
/// only skips the merchant under review.
#[async_trait]
pub trait ReviewPrompter: Send + Sync {
    async fn review(&self, pending: &PendingClassification) -> Result<ReviewDecision>;
}
