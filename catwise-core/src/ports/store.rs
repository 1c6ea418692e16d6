//! Store port - persistence abstraction for the classification pipeline

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::domain::result::Result;
use crate::domain::{
    Category, CheckPattern, Classification, ClassificationProgress, ClassifiedTransaction,
    Direction, Transaction, Vendor,
};

/// Storage of transactions, categories, rules and classifications
///
/// Implementations must tolerate concurrent single-row writes from several
/// pipeline workers; the pipeline does not add locking of its own.
#[async_trait]
pub trait ClassificationStore: Send + Sync {
    // === Transactions ===

    /// Transactions without a classification, optionally on or after `from_date`
    async fn get_unclassified_transactions(
        &self,
        from_date: Option<NaiveDate>,
    ) -> Result<Vec<Transaction>>;

    /// Record the direction resolved for a transaction
    async fn update_transaction_direction(&self, id: Uuid, direction: Direction) -> Result<()>;

    // === Categories ===

    /// All categories
    async fn get_categories(&self) -> Result<Vec<Category>>;

    /// Case-insensitive lookup by name; `None` when absent
    async fn find_category(&self, name: &str) -> Result<Option<Category>>;

    /// Insert a new category
    async fn create_category(&self, category: &Category) -> Result<()>;

    // === Vendors ===

    /// Lookup by normalized merchant name
    async fn get_vendor(&self, name: &str) -> Result<Option<Vendor>>;

    /// Insert or replace a vendor rule
    async fn save_vendor(&self, vendor: &Vendor) -> Result<()>;

    /// All vendor rules
    async fn get_vendors(&self) -> Result<Vec<Vendor>>;

    async fn increment_vendor_use(&self, name: &str) -> Result<()>;

    // === Check patterns ===

    /// Active patterns matching `tx`, highest priority first
    async fn get_matching_check_patterns(&self, tx: &Transaction) -> Result<Vec<CheckPattern>>;

    /// All check patterns
    async fn get_check_patterns(&self) -> Result<Vec<CheckPattern>>;

    async fn increment_pattern_use(&self, id: Uuid) -> Result<()>;

    // === Classifications ===

    /// Store the current classification of a transaction, replacing any previous one
    async fn save_classification(&self, classification: &Classification) -> Result<()>;

    /// Classified transactions whose confidence is strictly below `threshold`
    async fn get_classifications_below_confidence(
        &self,
        threshold: f64,
    ) -> Result<Vec<ClassifiedTransaction>>;

    /// All classifications
    async fn get_classifications(&self) -> Result<Vec<Classification>>;

    // === Progress ===

    async fn get_progress(&self) -> Result<Option<ClassificationProgress>>;

    async fn save_progress(&self, progress: &ClassificationProgress) -> Result<()>;

    /// Remove the checkpoint after a completed run
    async fn clear_progress(&self) -> Result<()>;
}
