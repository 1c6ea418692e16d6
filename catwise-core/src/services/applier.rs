//! Applier - persists decided results and drives interactive review
//!
//! Persistence failures are isolated to the transaction being written.
//! Review failures skip the merchant, except cancellation, which is returned.

use std::ops::AddAssign;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::gate::Suggestion;
use super::provisioning::CategoryProvisioner;
use super::resolution::RuleMatch;
use super::snapshot::CategorySnapshot;
use crate::domain::result::Result;
use crate::domain::{
    CategoryChoice, CategoryRankings, CheckPattern, Classification, ClassificationStatus, Direction,
    ReviewDecision, Transaction, Vendor,
};
use crate::ports::{ClassificationStore, PendingClassification, ReviewPrompter};

/// Transaction counts by what happened to them
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ApplyCounts {
    pub rule: usize,
    pub auto: usize,
    pub reviewed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub pending: usize,
}

impl ApplyCounts {
    /// Transactions that ended up with a stored classification
    pub fn persisted(&self) -> usize {
        self.rule + self.auto + self.reviewed
    }
}

impl AddAssign for ApplyCounts {
    fn add_assign(&mut self, other: Self) {
        self.rule += other.rule;
        self.auto += other.auto;
        self.reviewed += other.reviewed;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.pending += other.pending;
    }
}

/// One suggestion awaiting a review decision
#[derive(Debug, Clone, Copy)]
pub struct ReviewItem<'a> {
    pub merchant: &'a str,
    pub direction: Direction,
    pub transactions: &'a [Transaction],
    pub suggestion: &'a Suggestion,
    pub rankings: &'a CategoryRankings,
    pub patterns: &'a [CheckPattern],
}

/// Writes classifications and updates rule use counts
#[derive(Clone)]
pub struct ClassificationApplier {
    store: Arc<dyn ClassificationStore>,
    provisioner: CategoryProvisioner,
    prompter: Option<Arc<dyn ReviewPrompter>>,
    skip_manual_review: bool,
    vendor_rule_min_confidence: f64,
}

impl ClassificationApplier {
    pub fn new(
        store: Arc<dyn ClassificationStore>,
        provisioner: CategoryProvisioner,
        skip_manual_review: bool,
        vendor_rule_min_confidence: f64,
    ) -> Self {
        Self {
            store,
            provisioner,
            prompter: None,
            skip_manual_review,
            vendor_rule_min_confidence,
        }
    }

    pub fn with_prompter(mut self, prompter: Arc<dyn ReviewPrompter>) -> Self {
        self.prompter = Some(prompter);
        self
    }

    /// Persist a rule decision at full confidence
    ///
    /// Use counts grow once per persisted transaction.
    pub async fn persist_rule(&self, transactions: &[Transaction], rule: &RuleMatch) -> ApplyCounts {
        let mut counts = ApplyCounts::default();
        for tx in transactions {
            let classification = Classification::new(tx.id, rule.category(), ClassificationStatus::Rule, 1.0);
            if !self.save(&classification).await {
                counts.failed += 1;
                continue;
            }
            counts.rule += 1;

            let bumped = match rule {
                RuleMatch::Vendor(v) => self.store.increment_vendor_use(&v.name).await,
                RuleMatch::CheckPattern(p) => self.store.increment_pattern_use(p.id).await,
            };
            if let Err(e) = bumped {
                warn!(transaction = %tx.id, error = %e, "Failed to update rule use count");
            }
        }
        counts
    }

    /// Persist a ranking suggestion unreviewed, at the suggestion's score
    pub async fn persist_suggestion(
        &self,
        transactions: &[Transaction],
        suggestion: &Suggestion,
        snapshot: &CategorySnapshot,
    ) -> ApplyCounts {
        let category = snapshot
            .get(&suggestion.category)
            .map(|c| c.name.as_str())
            .unwrap_or(&suggestion.category);

        let mut counts = ApplyCounts::default();
        for tx in transactions {
            let classification = Classification::new(tx.id, category, ClassificationStatus::Ai, suggestion.score);
            if self.save(&classification).await {
                counts.auto += 1;
            } else {
                counts.failed += 1;
            }
        }
        counts
    }

    /// Resolve a suggestion that did not pass the confidence gate
    ///
    /// With review skipped, suggestions for known categories are stored
    /// unreviewed and the rest stay unclassified. Without a prompter they are
    /// reported as pending.
    pub async fn review(&self, item: ReviewItem<'_>, snapshot: &CategorySnapshot) -> Result<ApplyCounts> {
        let n = item.transactions.len();

        if self.skip_manual_review {
            if item.suggestion.is_new {
                debug!(merchant = item.merchant, category = %item.suggestion.category, "Not creating category without review");
                return Ok(ApplyCounts { pending: n, ..Default::default() });
            }
            return Ok(self.persist_suggestion(item.transactions, item.suggestion, snapshot).await);
        }

        let Some(prompter) = &self.prompter else {
            return Ok(ApplyCounts { pending: n, ..Default::default() });
        };

        let pending = PendingClassification {
            transactions: item.transactions.to_vec(),
            suggested_category: Some(item.suggestion.category.clone()),
            confidence: item.suggestion.score,
            is_new_category: item.suggestion.is_new,
            rankings: item.rankings.clone(),
            check_patterns: item.patterns.to_vec(),
            categories: snapshot.all().to_vec(),
            similar_count: n.saturating_sub(1),
        };

        match prompter.review(&pending).await {
            Ok(ReviewDecision::Accept { choice, notes }) => Ok(self.accept(item, choice, notes, snapshot).await),
            Ok(ReviewDecision::Skip) => {
                debug!(merchant = item.merchant, "Review skipped");
                Ok(ApplyCounts { skipped: n, ..Default::default() })
            }
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => {
                warn!(merchant = item.merchant, error = %e, "Review failed, skipping merchant");
                Ok(ApplyCounts { skipped: n, ..Default::default() })
            }
        }
    }

    async fn accept(
        &self,
        item: ReviewItem<'_>,
        choice: CategoryChoice,
        notes: Option<String>,
        snapshot: &CategorySnapshot,
    ) -> ApplyCounts {
        let n = item.transactions.len();
        let suggestion = item.suggestion;

        // Older prompters signal creation through the notes field
        let (choice, notes) = match choice {
            CategoryChoice::Existing(name) => CategoryChoice::from_notes(&name, notes.as_deref()),
            create => (create, notes),
        };

        let chosen = choice.name().trim().to_string();
        let same_as_suggestion = chosen.eq_ignore_ascii_case(suggestion.category.trim());

        let category = match (&choice, snapshot.get(&chosen)) {
            (CategoryChoice::Existing(_), Some(known)) => known.name.clone(),
            (choice, _) => {
                let description = match choice {
                    CategoryChoice::CreateNew { description, .. } => description.clone(),
                    CategoryChoice::Existing(_) if same_as_suggestion => {
                        Some(suggestion.description.clone()).filter(|d| !d.trim().is_empty())
                    }
                    CategoryChoice::Existing(_) => None,
                };
                match self
                    .provisioner
                    .ensure(&chosen, description.as_deref(), item.direction)
                    .await
                {
                    Ok(created) => created.name,
                    Err(e) => {
                        error!(merchant = item.merchant, category = %chosen, error = %e, "Category creation failed, skipping merchant");
                        return ApplyCounts { failed: n, ..Default::default() };
                    }
                }
            }
        };

        let (status, confidence) = if same_as_suggestion {
            (ClassificationStatus::Ai, suggestion.score)
        } else {
            (ClassificationStatus::UserModified, 1.0)
        };

        let mut counts = ApplyCounts::default();
        for tx in item.transactions {
            let classification =
                Classification::new(tx.id, &category, status, confidence).with_notes(notes.clone());
            if self.save(&classification).await {
                counts.reviewed += 1;
            } else {
                counts.failed += 1;
            }
        }

        if status == ClassificationStatus::UserModified
            && suggestion.score >= self.vendor_rule_min_confidence
            && counts.reviewed > 0
        {
            self.learn_vendor(item.merchant, &category).await;
        }

        counts
    }

    async fn learn_vendor(&self, merchant: &str, category: &str) {
        let vendor = Vendor::new(merchant, category);
        if vendor.name.is_empty() {
            return;
        }
        match self.store.save_vendor(&vendor).await {
            Ok(()) => info!(vendor = %vendor.name, category, "Learned vendor rule from correction"),
            Err(e) => warn!(vendor = %vendor.name, error = %e, "Failed to save vendor rule"),
        }
    }

    async fn save(&self, classification: &Classification) -> bool {
        match self.store.save_classification(classification).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    transaction = %classification.transaction_id,
                    category = %classification.category,
                    error = %e,
                    "Failed to save classification"
                );
                false
            }
        }
    }
}
