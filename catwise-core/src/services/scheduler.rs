//! Batch scheduler - bounded worker pool over merchant groups
//!
//! Merchant groups are pre-loaded onto a closed work queue in volume order.
//! Each worker takes groups until it holds a full batch (or the queue is
//! drained), resolves rules, ranks the rest with one oracle call per
//! direction, and sends one [`BatchResult`] per merchant. The results channel
//! closes once every worker has exited.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::gate::{ConfidenceGate, GateDecision, Suggestion};
use super::grouping::{MerchantGroup, MerchantGroups};
use super::ranking::RankingClient;
use super::resolution::{Resolution, ResolutionPolicy, RuleMatch};
use super::snapshot::CategorySnapshot;
use crate::domain::result::Error;
use crate::domain::{CategoryRankings, CheckPattern, Direction};
use crate::ports::RankingRequest;

/// Outcome for one merchant group
#[derive(Debug)]
pub enum MerchantOutcome {
    /// Decided by a vendor rule or check pattern
    Rule(RuleMatch),
    /// Ranked by the oracle and routed by the confidence gate
    Ranked {
        rankings: CategoryRankings,
        suggestion: Suggestion,
        decision: GateDecision,
    },
    /// The oracle failed for this merchant after every retry
    Failed(Error),
}

/// Per-merchant result emitted by a worker
#[derive(Debug)]
pub struct BatchResult {
    pub group: MerchantGroup,
    pub outcome: MerchantOutcome,
}

impl BatchResult {
    pub fn merchant(&self) -> &str {
        &self.group.merchant
    }

    /// Rule matches and rankings above the threshold
    pub fn auto_accepted(&self) -> bool {
        match &self.outcome {
            MerchantOutcome::Rule(_) => true,
            MerchantOutcome::Ranked { decision, .. } => !decision.needs_review(),
            MerchantOutcome::Failed(_) => false,
        }
    }

    pub fn used_patterns(&self) -> Vec<CheckPattern> {
        match &self.outcome {
            MerchantOutcome::Rule(rule) => rule.used_patterns(),
            _ => Vec::new(),
        }
    }

    pub fn error(&self) -> Option<&Error> {
        match &self.outcome {
            MerchantOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Fan-out/fan-in over merchant groups
#[derive(Clone)]
pub struct BatchScheduler {
    resolution: ResolutionPolicy,
    ranking: RankingClient,
    gate: ConfidenceGate,
    workers: usize,
    batch_size: usize,
}

type WorkQueue = Arc<Mutex<mpsc::Receiver<MerchantGroup>>>;

impl BatchScheduler {
    pub fn new(
        resolution: ResolutionPolicy,
        ranking: RankingClient,
        gate: ConfidenceGate,
        workers: usize,
        batch_size: usize,
    ) -> Self {
        Self {
            resolution,
            ranking,
            gate,
            workers: workers.max(1),
            batch_size: batch_size.max(1),
        }
    }

    /// Start the workers and return the results channel
    ///
    /// Workers stop taking new merchants once `cancel` fires; merchants
    /// already taken are still flushed. Results arrive in completion order.
    pub fn dispatch(
        &self,
        groups: MerchantGroups,
        snapshot: CategorySnapshot,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<BatchResult> {
        let merchants = groups.len();
        let capacity = merchants.max(1);
        let (work_tx, work_rx) = mpsc::channel(capacity);
        let (results_tx, results_rx) = mpsc::channel(capacity);

        for group in groups {
            // Capacity covers every group, so this never fails
            if work_tx.try_send(group).is_err() {
                warn!("Work queue rejected a merchant group");
            }
        }
        drop(work_tx);

        let workers = self.workers.min(capacity);
        info!(merchants, workers, batch_size = self.batch_size, "Dispatching merchants");

        let queue: WorkQueue = Arc::new(Mutex::new(work_rx));
        for worker_id in 0..workers {
            let scheduler = self.clone();
            let queue = queue.clone();
            let results = results_tx.clone();
            let snapshot = snapshot.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                scheduler.run_worker(worker_id, queue, results, snapshot, cancel).await;
            });
        }

        // Channel closes when the last worker drops its sender
        drop(results_tx);
        results_rx
    }

    async fn run_worker(
        &self,
        worker_id: usize,
        queue: WorkQueue,
        results: mpsc::Sender<BatchResult>,
        snapshot: CategorySnapshot,
        cancel: CancellationToken,
    ) {
        let mut finished = false;
        while !finished {
            let mut batch = Vec::with_capacity(self.batch_size);
            while batch.len() < self.batch_size {
                if cancel.is_cancelled() {
                    debug!(worker_id, "Cancelled, not taking more merchants");
                    finished = true;
                    break;
                }
                let next = queue.lock().await.recv().await;
                match next {
                    Some(group) => batch.push(group),
                    None => {
                        finished = true;
                        break;
                    }
                }
            }

            if batch.is_empty() {
                break;
            }
            if !self.flush(batch, &snapshot, &results).await {
                debug!(worker_id, "Results receiver dropped, stopping");
                break;
            }
        }
        debug!(worker_id, "Worker finished");
    }

    /// Process one batch; returns false when results can no longer be delivered
    async fn flush(
        &self,
        batch: Vec<MerchantGroup>,
        snapshot: &CategorySnapshot,
        results: &mpsc::Sender<BatchResult>,
    ) -> bool {
        let mut pending: Vec<(Direction, Vec<(MerchantGroup, RankingRequest)>)> = Vec::new();

        for group in batch {
            match self.resolution.resolve(&group).await {
                Resolution::Rule(rule) => {
                    let result = BatchResult {
                        group,
                        outcome: MerchantOutcome::Rule(rule),
                    };
                    if results.send(result).await.is_err() {
                        return false;
                    }
                }
                Resolution::Empty => {
                    debug!(merchant = %group.merchant, "Skipping empty merchant group");
                }
                Resolution::NeedsRanking(request) => {
                    let direction = group.direction;
                    match pending.iter_mut().find(|(d, _)| *d == direction) {
                        Some((_, items)) => items.push((group, request)),
                        None => pending.push((direction, vec![(group, request)])),
                    }
                }
            }
        }

        for (direction, items) in pending {
            let categories = snapshot.for_direction(direction);
            let requests: Vec<RankingRequest> = items.iter().map(|(_, r)| r.clone()).collect();

            match self.ranking.rank_batch(&requests, &categories).await {
                Ok(mut ranked) => {
                    for (group, request) in items {
                        let outcome = match ranked.remove(&request.merchant_id) {
                            Some(Ok(rankings)) => self.route(rankings, &group, snapshot),
                            Some(Err(e)) => MerchantOutcome::Failed(e),
                            None => MerchantOutcome::Failed(Error::oracle("No ranking returned")),
                        };
                        if results.send(BatchResult { group, outcome }).await.is_err() {
                            return false;
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        merchants = items.len(),
                        direction = %direction,
                        error = %e,
                        "Ranking failed for batch"
                    );
                    let message = e.to_string();
                    for (group, _) in items {
                        let outcome = MerchantOutcome::Failed(Error::oracle(message.clone()));
                        if results.send(BatchResult { group, outcome }).await.is_err() {
                            return false;
                        }
                    }
                }
            }
        }

        true
    }

    fn route(&self, rankings: CategoryRankings, group: &MerchantGroup, snapshot: &CategorySnapshot) -> MerchantOutcome {
        let Some(top) = rankings.top() else {
            return MerchantOutcome::Failed(Error::oracle("Empty ranking"));
        };
        let suggestion = Suggestion::from_ranking(top, snapshot);
        let decision = self.gate.decide(&suggestion, &group.transactions);
        MerchantOutcome::Ranked {
            rankings,
            suggestion,
            decision,
        }
    }
}

/// Collect every result once the workers have finished
pub async fn drain(mut results: mpsc::Receiver<BatchResult>) -> Vec<BatchResult> {
    let mut collected = Vec::new();
    while let Some(result) = results.recv().await {
        collected.push(result);
    }
    collected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryStore;
    use crate::domain::result::Result;
    use crate::domain::{Category, CategoryRanking, CategoryType, Transaction, Vendor};
    use crate::ports::{ClassificationStore, RankingOracle};
    use crate::services::grouping::group_by_merchant;
    use crate::services::retry::RetryPolicy;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use uuid::Uuid;

    /// Ranks every merchant as Groceries and records each call's batch
    #[derive(Default)]
    struct RecordingOracle {
        batches: StdMutex<Vec<(usize, usize)>>,
    }

    #[async_trait]
    impl RankingOracle for RecordingOracle {
        async fn rank_batch(
            &self,
            requests: &[RankingRequest],
            categories: &[Category],
        ) -> Result<HashMap<String, CategoryRankings>> {
            self.batches.lock().unwrap().push((requests.len(), categories.len()));
            Ok(requests
                .iter()
                .map(|r| {
                    (
                        r.merchant_id.clone(),
                        CategoryRankings::new(vec![CategoryRanking::new("Groceries", 0.97)]),
                    )
                })
                .collect())
        }

        async fn generate_description(&self, _name: &str) -> Result<(String, f64)> {
            Ok((String::new(), 0.0))
        }
    }

    fn tx(merchant: &str, cents: i64, direction: Direction) -> Transaction {
        Transaction::new(
            Uuid::new_v4(),
            merchant,
            Decimal::new(cents, 2),
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
        )
        .with_direction(direction)
    }

    fn snapshot() -> CategorySnapshot {
        CategorySnapshot::new(vec![
            Category::new("Groceries", CategoryType::Expense),
            Category::new("Salary", CategoryType::Income),
            Category::new("Streaming", CategoryType::Expense),
        ])
    }

    fn scheduler(store: Arc<InMemoryStore>, oracle: Arc<RecordingOracle>, workers: usize, batch_size: usize) -> BatchScheduler {
        let retry = RetryPolicy {
            max_attempts: 1,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(1),
        };
        BatchScheduler::new(
            ResolutionPolicy::new(store),
            RankingClient::new(oracle, retry),
            ConfidenceGate::new(0.95),
            workers,
            batch_size,
        )
    }

    fn expenses(n: usize) -> Vec<Transaction> {
        (0..n)
            .map(|i| tx(&format!("Market {}", i), 1000, Direction::Expense))
            .collect()
    }

    #[tokio::test]
    async fn test_one_result_per_merchant_in_batches() {
        let store = Arc::new(InMemoryStore::new());
        let oracle = Arc::new(RecordingOracle::default());
        let groups = group_by_merchant(expenses(5));

        let results = drain(scheduler(store, oracle.clone(), 1, 2).dispatch(
            groups,
            snapshot(),
            CancellationToken::new(),
        ))
        .await;

        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|r| r.auto_accepted()));
        let sizes: Vec<usize> = oracle.batches.lock().unwrap().iter().map(|(n, _)| *n).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn test_vendor_rules_bypass_the_oracle() {
        let store = Arc::new(InMemoryStore::new());
        store.save_vendor(&Vendor::new("Netflix", "Streaming")).await.unwrap();
        let oracle = Arc::new(RecordingOracle::default());
        let groups = group_by_merchant(vec![tx("Netflix", 1599, Direction::Expense)]);

        let results = drain(scheduler(store, oracle.clone(), 2, 5).dispatch(
            groups,
            snapshot(),
            CancellationToken::new(),
        ))
        .await;

        assert_eq!(results.len(), 1);
        assert!(matches!(results[0].outcome, MerchantOutcome::Rule(RuleMatch::Vendor(_))));
        assert!(results[0].used_patterns().is_empty());
        assert!(oracle.batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_flush_splits_by_direction() {
        let store = Arc::new(InMemoryStore::new());
        let oracle = Arc::new(RecordingOracle::default());
        let groups = group_by_merchant(vec![
            tx("Safeway", 8800, Direction::Expense),
            tx("Acme Payroll", -300000, Direction::Income),
        ]);

        let results = drain(scheduler(store, oracle.clone(), 1, 10).dispatch(
            groups,
            snapshot(),
            CancellationToken::new(),
        ))
        .await;
        assert_eq!(results.len(), 2);

        let mut batches = oracle.batches.lock().unwrap().clone();
        batches.sort();
        // Income sees Salary only; expense sees both expense categories
        assert_eq!(batches, vec![(1, 1), (1, 2)]);
    }

    #[tokio::test]
    async fn test_cancelled_before_dispatch_takes_no_merchants() {
        let store = Arc::new(InMemoryStore::new());
        let oracle = Arc::new(RecordingOracle::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let results = drain(scheduler(store, oracle.clone(), 3, 2).dispatch(
            group_by_merchant(expenses(6)),
            snapshot(),
            cancel,
        ))
        .await;

        assert!(results.is_empty());
        assert!(oracle.batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_input_closes_results() {
        let store = Arc::new(InMemoryStore::new());
        let oracle = Arc::new(RecordingOracle::default());
        let results = drain(scheduler(store, oracle, 4, 5).dispatch(
            MerchantGroups::default(),
            snapshot(),
            CancellationToken::new(),
        ))
        .await;
        assert!(results.is_empty());
    }
}
