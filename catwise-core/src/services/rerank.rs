//! Rerank service - re-runs low-confidence classifications through the pipeline

use std::collections::HashMap;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::classify::ClassificationService;
use super::grouping::group_by_merchant;
use super::scheduler::{drain, BatchResult, MerchantOutcome};
use super::snapshot::CategorySnapshot;
use crate::config::RerankConfig;
use crate::domain::result::{Error, Result};
use crate::domain::Transaction;

/// Totals for one rerank pass, counted in transactions
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RerankSummary {
    pub evaluated: usize,
    /// Scored higher and stored with the new result
    pub improved: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub auto_applied: usize,
    pub reviewed: usize,
    /// Mean of (new score - prior confidence) over improved transactions;
    /// a partially stored merchant contributes its mean gain per stored row
    pub mean_confidence_delta: f64,
}

/// Re-ranks classifications below a confidence threshold
pub struct RerankService {
    classifier: ClassificationService,
    config: RerankConfig,
}

impl RerankService {
    pub fn new(classifier: ClassificationService, config: RerankConfig) -> Self {
        Self { classifier, config }
    }

    /// Re-rank every classification below the configured threshold
    ///
    /// Merchants whose new top score does not beat the best prior confidence
    /// among their transactions are left untouched.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<RerankSummary> {
        let store = self.classifier.store().clone();
        let low = store
            .get_classifications_below_confidence(self.config.confidence_threshold)
            .await?;

        let mut summary = RerankSummary {
            evaluated: low.len(),
            ..Default::default()
        };
        if low.is_empty() {
            info!(threshold = self.config.confidence_threshold, "Nothing to rerank");
            return Ok(summary);
        }

        let snapshot = CategorySnapshot::load(store.as_ref()).await?;

        let prior: HashMap<Uuid, f64> = low
            .iter()
            .map(|c| (c.transaction.id, c.classification.confidence))
            .collect();
        let mut transactions: Vec<Transaction> = low.into_iter().map(|c| c.transaction).collect();
        self.classifier.resolve_directions(&mut transactions).await;

        let groups = group_by_merchant(transactions);
        info!(
            transactions = summary.evaluated,
            merchants = groups.len(),
            threshold = self.config.confidence_threshold,
            "Starting rerank"
        );

        let order = groups.keys();
        let receiver = self
            .classifier
            .scheduler(self.config.batch_size)
            .dispatch(groups, snapshot.clone(), cancel.clone());
        let mut results: HashMap<String, BatchResult> = drain(receiver)
            .await
            .into_iter()
            .map(|r| (r.group.key.clone(), r))
            .collect();

        let mut delta_sum = 0.0;
        for key in &order {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let Some(result) = results.remove(key) else {
                continue;
            };
            let n = result.group.len();

            let new_score = match &result.outcome {
                MerchantOutcome::Rule(_) => 1.0,
                MerchantOutcome::Ranked { suggestion, .. } => suggestion.score,
                MerchantOutcome::Failed(e) => {
                    warn!(merchant = %result.group.merchant, error = %e, "Rerank failed for merchant");
                    summary.failed += n;
                    continue;
                }
            };

            let prior_of = |t: &Transaction| prior.get(&t.id).copied().unwrap_or(0.0);
            let prior_max = result.group.transactions.iter().map(prior_of).fold(0.0, f64::max);
            if new_score <= prior_max {
                debug!(merchant = %result.group.merchant, new_score, prior_max, "No improvement");
                summary.unchanged += n;
                continue;
            }

            let counts = self.classifier.apply_result(&result, &snapshot, cancel).await?;
            let persisted = counts.persisted();
            summary.auto_applied += counts.rule + counts.auto;
            summary.reviewed += counts.reviewed;
            summary.failed += counts.failed;
            // Skipped or left pending: the prior classification stands
            summary.unchanged += n.saturating_sub(persisted + counts.failed);
            summary.improved += persisted;

            if persisted > 0 {
                let group_delta: f64 = result
                    .group
                    .transactions
                    .iter()
                    .map(|t| new_score - prior_of(t))
                    .sum();
                delta_sum += group_delta / n as f64 * persisted as f64;
            }
        }

        if summary.improved > 0 {
            summary.mean_confidence_delta = delta_sum / summary.improved as f64;
        }

        info!(
            evaluated = summary.evaluated,
            improved = summary.improved,
            unchanged = summary.unchanged,
            mean_delta = summary.mean_confidence_delta,
            "Rerank finished"
        );
        Ok(summary)
    }
}
