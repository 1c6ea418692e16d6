//! Classification service - the batch pipeline and the single-transaction pipeline
//!
//! A run loads one category snapshot, groups unclassified transactions by
//! merchant, fans the groups out to the batch scheduler, persists rule and
//! auto-accepted results, then walks the remaining merchants through review
//! in volume order. Cancellation is honoured between merchants.

use std::collections::HashMap;
use std::slice;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::applier::{ApplyCounts, ClassificationApplier, ReviewItem};
use super::checkpoint::ProgressTracker;
use super::gate::{ConfidenceGate, GateDecision, Suggestion};
use super::grouping::{group_by_merchant, MerchantGroup};
use super::provisioning::CategoryProvisioner;
use super::ranking::RankingClient;
use super::resolution::{ResolutionPolicy, RuleMatch};
use super::scheduler::{drain, BatchResult, BatchScheduler, MerchantOutcome};
use super::snapshot::CategorySnapshot;
use crate::config::ClassificationConfig;
use crate::domain::result::{Error, Result};
use crate::domain::{CategoryRankings, CheckPattern, Transaction};
use crate::ports::{ClassificationStore, ReviewPrompter};

/// Totals for one classification run, in transactions unless noted
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClassificationSummary {
    pub transactions: usize,
    /// Number of merchant groups
    pub merchants: usize,
    pub rule_classified: usize,
    pub auto_classified: usize,
    pub reviewed: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Left unclassified, waiting for a review
    pub pending: usize,
    pub resumed_from: Option<NaiveDate>,
}

impl ClassificationSummary {
    fn add(&mut self, counts: ApplyCounts) {
        self.rule_classified += counts.rule;
        self.auto_classified += counts.auto;
        self.reviewed += counts.reviewed;
        self.skipped += counts.skipped;
        self.failed += counts.failed;
        self.pending += counts.pending;
    }

    pub fn classified(&self) -> usize {
        self.rule_classified + self.auto_classified + self.reviewed
    }
}

/// Result of the single-transaction pipeline
#[derive(Debug, Clone)]
pub enum TransactionOutcome {
    /// Vendor rule, or a check pattern boost reaching full confidence
    Rule(RuleMatch),
    /// Passed the confidence gate
    Auto(Suggestion),
    NeedsReview {
        suggestion: Suggestion,
        rankings: CategoryRankings,
        patterns: Vec<CheckPattern>,
    },
}

/// Turns unclassified transactions into classifications
#[derive(Clone)]
pub struct ClassificationService {
    store: Arc<dyn ClassificationStore>,
    ranking: RankingClient,
    resolution: ResolutionPolicy,
    gate: ConfidenceGate,
    applier: ClassificationApplier,
    config: ClassificationConfig,
}

impl ClassificationService {
    pub fn new(store: Arc<dyn ClassificationStore>, ranking: RankingClient, config: ClassificationConfig) -> Self {
        let provisioner = CategoryProvisioner::new(store.clone(), ranking.clone());
        let applier = ClassificationApplier::new(
            store.clone(),
            provisioner,
            config.skip_manual_review,
            config.vendor_rule_min_confidence,
        );
        Self {
            resolution: ResolutionPolicy::new(store.clone()),
            gate: ConfidenceGate::new(config.auto_accept_threshold),
            store,
            ranking,
            applier,
            config,
        }
    }

    /// Attach an interactive reviewer; without one, uncertain results stay pending
    pub fn with_prompter(mut self, prompter: Arc<dyn ReviewPrompter>) -> Self {
        self.applier = self.applier.with_prompter(prompter);
        self
    }

    pub fn config(&self) -> &ClassificationConfig {
        &self.config
    }

    pub(crate) fn store(&self) -> &Arc<dyn ClassificationStore> {
        &self.store
    }

    pub(crate) fn scheduler(&self, batch_size: usize) -> BatchScheduler {
        BatchScheduler::new(
            self.resolution.clone(),
            self.ranking.clone(),
            self.gate,
            self.config.parallel_workers,
            batch_size,
        )
    }

    /// Classify every unclassified transaction on or after `from_date`
    ///
    /// A saved checkpoint overrides `from_date`. Returns [`Error::Cancelled`]
    /// after saving the checkpoint when `cancel` fires or a reviewer cancels,
    /// and [`Error::NoCategories`] when there is nothing to classify into.
    pub async fn run(&self, from_date: Option<NaiveDate>, cancel: &CancellationToken) -> Result<ClassificationSummary> {
        let mut tracker = ProgressTracker::resume(self.store.clone()).await?;
        let from_date = tracker.resumed_from().or(from_date);

        let snapshot = CategorySnapshot::load(self.store.as_ref()).await?;

        let mut transactions = self.store.get_unclassified_transactions(from_date).await?;
        self.resolve_directions(&mut transactions).await;

        let groups = group_by_merchant(transactions);
        let mut summary = ClassificationSummary {
            transactions: groups.transaction_count(),
            merchants: groups.len(),
            resumed_from: tracker.resumed_from(),
            ..Default::default()
        };
        info!(
            transactions = summary.transactions,
            merchants = summary.merchants,
            categories = snapshot.len(),
            from_date = ?from_date,
            "Starting classification"
        );

        if groups.is_empty() {
            tracker.complete().await;
            return Ok(summary);
        }

        let order = groups.keys();
        tracker.track(groups.iter());
        let receiver = self
            .scheduler(self.config.batch_size)
            .dispatch(groups, snapshot.clone(), cancel.clone());
        let mut results: HashMap<String, BatchResult> = drain(receiver)
            .await
            .into_iter()
            .map(|r| (r.group.key.clone(), r))
            .collect();

        // Decided results first, in volume order
        let mut needs_review = Vec::new();
        for key in &order {
            let Some(result) = results.remove(key) else {
                continue;
            };
            if result.auto_accepted() || result.error().is_some() {
                let counts = self.apply_result(&result, &snapshot, cancel).await?;
                summary.add(counts);
                tracker.record(&result.group, &counts).await;
            } else {
                needs_review.push(result);
            }
        }

        for result in needs_review {
            if cancel.is_cancelled() {
                tracker.save_on_cancel().await;
                return Err(Error::Cancelled);
            }
            let counts = match self.apply_result(&result, &snapshot, cancel).await {
                Ok(counts) => counts,
                Err(e) => {
                    if e.is_cancelled() {
                        tracker.save_on_cancel().await;
                    }
                    return Err(e);
                }
            };
            summary.add(counts);
            tracker.record(&result.group, &counts).await;
        }

        if cancel.is_cancelled() {
            tracker.save_on_cancel().await;
            return Err(Error::Cancelled);
        }

        tracker.complete().await;
        info!(
            classified = summary.classified(),
            rule = summary.rule_classified,
            auto = summary.auto_classified,
            reviewed = summary.reviewed,
            failed = summary.failed,
            pending = summary.pending,
            "Classification finished"
        );
        Ok(summary)
    }

    /// Classify one transaction against a snapshot
    ///
    /// Vendor rules win outright. Otherwise the transaction is ranked and the
    /// boost of every matching check pattern is added to its category; a
    /// boosted top score of 1.0 for a known category counts as a rule match.
    /// Oracle failures are returned after retries.
    pub async fn classify_transaction(&self, tx: &Transaction, snapshot: &CategorySnapshot) -> Result<TransactionOutcome> {
        if let Some(vendor) = self.resolution.vendor_for(tx.display_merchant()).await {
            return Ok(TransactionOutcome::Rule(RuleMatch::Vendor(vendor)));
        }

        let categories = snapshot.for_direction(tx.direction);
        let mut rankings = self.ranking.rank_one(tx, &categories).await?;

        let patterns = self.resolution.matching_patterns(tx).await;
        for pattern in &patterns {
            rankings.apply_boost(&pattern.category, pattern.confidence_boost);
        }

        let top = rankings.top().ok_or_else(|| Error::oracle("Empty ranking"))?;
        let suggestion = Suggestion::from_ranking(top, snapshot);

        if !suggestion.is_new && suggestion.score >= 1.0 {
            if let Some(pattern) = patterns
                .iter()
                .find(|p| p.category.trim().eq_ignore_ascii_case(suggestion.category.trim()))
            {
                return Ok(TransactionOutcome::Rule(RuleMatch::CheckPattern(pattern.clone())));
            }
        }

        if self.gate.accepts(&suggestion) {
            return Ok(TransactionOutcome::Auto(suggestion));
        }

        Ok(TransactionOutcome::NeedsReview {
            suggestion,
            rankings,
            patterns,
        })
    }

    /// Persist or review one merchant's result
    ///
    /// The only error returned is cancellation.
    pub(crate) async fn apply_result(
        &self,
        result: &BatchResult,
        snapshot: &CategorySnapshot,
        cancel: &CancellationToken,
    ) -> Result<ApplyCounts> {
        let group = &result.group;
        match &result.outcome {
            MerchantOutcome::Rule(rule) => Ok(self.applier.persist_rule(&group.transactions, rule).await),
            MerchantOutcome::Failed(e) => {
                warn!(merchant = %group.merchant, transactions = group.len(), error = %e, "Merchant failed");
                Ok(ApplyCounts {
                    failed: group.len(),
                    ..Default::default()
                })
            }
            MerchantOutcome::Ranked {
                rankings,
                suggestion,
                decision,
            } => match decision {
                GateDecision::AutoAccept => Ok(self
                    .applier
                    .persist_suggestion(&group.transactions, suggestion, snapshot)
                    .await),
                GateDecision::BatchReview => {
                    let item = ReviewItem {
                        merchant: &group.merchant,
                        direction: group.direction,
                        transactions: &group.transactions,
                        suggestion,
                        rankings,
                        patterns: &[],
                    };
                    self.applier.review(item, snapshot).await
                }
                GateDecision::IndividualReview => self.review_individually(group, snapshot, cancel).await,
            },
        }
    }

    async fn review_individually(
        &self,
        group: &MerchantGroup,
        snapshot: &CategorySnapshot,
        cancel: &CancellationToken,
    ) -> Result<ApplyCounts> {
        info!(merchant = %group.merchant, transactions = group.len(), "High amount variance, reviewing individually");

        let mut counts = ApplyCounts::default();
        for tx in &group.transactions {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let one = slice::from_ref(tx);
            match self.classify_transaction(tx, snapshot).await {
                Ok(TransactionOutcome::Rule(rule)) => counts += self.applier.persist_rule(one, &rule).await,
                Ok(TransactionOutcome::Auto(suggestion)) => {
                    counts += self.applier.persist_suggestion(one, &suggestion, snapshot).await
                }
                Ok(TransactionOutcome::NeedsReview {
                    suggestion,
                    rankings,
                    patterns,
                }) => {
                    let item = ReviewItem {
                        merchant: &group.merchant,
                        direction: group.direction,
                        transactions: one,
                        suggestion: &suggestion,
                        rankings: &rankings,
                        patterns: &patterns,
                    };
                    counts += self.applier.review(item, snapshot).await?;
                }
                Err(e) => {
                    warn!(transaction = %tx.id, error = %e, "Ranking failed for transaction");
                    counts.failed += 1;
                }
            }
        }
        Ok(counts)
    }

    /// Fill unset directions from the amount sign and write them back
    pub(crate) async fn resolve_directions(&self, transactions: &mut [Transaction]) {
        for tx in transactions.iter_mut().filter(|t| !t.direction.is_set()) {
            let direction = tx.inferred_direction();
            if !direction.is_set() {
                continue;
            }
            tx.direction = direction;
            if let Err(e) = self.store.update_transaction_direction(tx.id, direction).await {
                warn!(transaction = %tx.id, error = %e, "Failed to store inferred direction");
            }
        }
    }
}
