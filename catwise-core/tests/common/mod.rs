//! Shared doubles for the pipeline integration tests
//!
//! The oracle and the prompter are scripted at the trait level; stores are
//! real (in-memory or DuckDB).

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use uuid::Uuid;

use catwise_core::adapters::InMemoryStore;
use catwise_core::config::ClassificationConfig;
use catwise_core::ports::{PendingClassification, RankingOracle, RankingRequest, ReviewPrompter};
use catwise_core::services::{ClassificationService, RankingClient, RetryPolicy};
use catwise_core::{
    Category, CategoryChoice, CategoryRanking, CategoryRankings, CategoryType, Error, Result, ReviewDecision,
    Transaction,
};

// ============================================================================
// Scripted oracle
// ============================================================================

/// Oracle answering from a per-merchant script
///
/// Rankings are keyed by the lowercased display merchant of the request's
/// sample transaction, so batch and single-transaction calls see the same
/// answer.
#[derive(Default)]
pub struct ScriptedOracle {
    rankings: Mutex<HashMap<String, Vec<CategoryRanking>>>,
    failing: Mutex<HashSet<String>>,
    batch_calls: AtomicUsize,
    description_calls: AtomicUsize,
    /// Merchants named in each call, in call order
    requested: Mutex<Vec<Vec<String>>>,
    /// Category names offered in each call, in call order
    offered: Mutex<Vec<Vec<String>>>,
}

impl ScriptedOracle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn rank(&self, merchant: &str, category: &str, score: f64) -> &Self {
        self.push(merchant, CategoryRanking::new(category, score))
    }

    pub fn rank_new(&self, merchant: &str, category: &str, score: f64) -> &Self {
        self.push(
            merchant,
            CategoryRanking::new_category(category, score, format!("{} expenses", category)),
        )
    }

    /// Replace the script for a merchant
    pub fn reset(&self, merchant: &str) {
        self.rankings.lock().unwrap().remove(&merchant.to_lowercase());
    }

    /// Every call that includes this merchant fails
    pub fn fail(&self, merchant: &str) {
        self.failing.lock().unwrap().insert(merchant.to_lowercase());
    }

    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    pub fn description_calls(&self) -> usize {
        self.description_calls.load(Ordering::SeqCst)
    }

    /// Number of calls that named `merchant`
    pub fn calls_for(&self, merchant: &str) -> usize {
        let merchant = merchant.to_lowercase();
        self.requested
            .lock()
            .unwrap()
            .iter()
            .filter(|names| names.contains(&merchant))
            .count()
    }

    pub fn offered(&self) -> Vec<Vec<String>> {
        self.offered.lock().unwrap().clone()
    }

    fn push(&self, merchant: &str, ranking: CategoryRanking) -> &Self {
        self.rankings
            .lock()
            .unwrap()
            .entry(merchant.to_lowercase())
            .or_default()
            .push(ranking);
        self
    }
}

#[async_trait]
impl RankingOracle for ScriptedOracle {
    async fn rank_batch(
        &self,
        requests: &[RankingRequest],
        categories: &[Category],
    ) -> Result<HashMap<String, CategoryRankings>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        let names: Vec<String> = requests
            .iter()
            .map(|r| r.sample.display_merchant().to_lowercase())
            .collect();
        self.requested.lock().unwrap().push(names.clone());
        self.offered
            .lock()
            .unwrap()
            .push(categories.iter().map(|c| c.name.clone()).collect());

        let failing = self.failing.lock().unwrap();
        if let Some(name) = names.iter().find(|n| failing.contains(*n)) {
            return Err(Error::oracle(format!("scripted failure for {}", name)));
        }

        let script = self.rankings.lock().unwrap();
        Ok(requests
            .iter()
            .zip(&names)
            .filter_map(|(request, name)| {
                script
                    .get(name)
                    .map(|r| (request.merchant_id.clone(), CategoryRankings::new(r.clone())))
            })
            .collect())
    }

    async fn generate_description(&self, category_name: &str) -> Result<(String, f64)> {
        self.description_calls.fetch_add(1, Ordering::SeqCst);
        Ok((format!("Spending on {}", category_name.to_lowercase()), 0.8))
    }
}

// ============================================================================
// Scripted prompter
// ============================================================================

/// Reviewer replaying queued answers; skips once the queue runs dry
#[derive(Default)]
pub struct ScriptedPrompter {
    answers: Mutex<VecDeque<Result<ReviewDecision>>>,
    seen: Mutex<Vec<PendingClassification>>,
}

impl ScriptedPrompter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn accept(&self, category: &str) -> &Self {
        self.answer(Ok(ReviewDecision::Accept {
            choice: CategoryChoice::Existing(category.to_string()),
            notes: None,
        }))
    }

    pub fn accept_with_notes(&self, category: &str, notes: &str) -> &Self {
        self.answer(Ok(ReviewDecision::Accept {
            choice: CategoryChoice::Existing(category.to_string()),
            notes: Some(notes.to_string()),
        }))
    }

    pub fn create(&self, category: &str) -> &Self {
        self.answer(Ok(ReviewDecision::Accept {
            choice: CategoryChoice::CreateNew {
                name: category.to_string(),
                description: None,
            },
            notes: None,
        }))
    }

    pub fn skip(&self) -> &Self {
        self.answer(Ok(ReviewDecision::Skip))
    }

    pub fn cancel(&self) -> &Self {
        self.answer(Err(Error::Cancelled))
    }

    pub fn seen(&self) -> Vec<PendingClassification> {
        self.seen.lock().unwrap().clone()
    }

    fn answer(&self, answer: Result<ReviewDecision>) -> &Self {
        self.answers.lock().unwrap().push_back(answer);
        self
    }
}

#[async_trait]
impl ReviewPrompter for ScriptedPrompter {
    async fn review(&self, pending: &PendingClassification) -> Result<ReviewDecision> {
        self.seen.lock().unwrap().push(pending.clone());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(ReviewDecision::Skip))
    }
}

// ============================================================================
// Builders
// ============================================================================

pub fn date(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, month, day).unwrap()
}

/// Transaction with the amount in cents; positive amounts are spending
pub fn tx(merchant: &str, cents: i64, when: NaiveDate) -> Transaction {
    Transaction::new(Uuid::new_v4(), merchant, Decimal::new(cents, 2), when)
}

pub fn check(cents: i64, when: NaiveDate) -> Transaction {
    tx("", cents, when).with_raw_name("CHECK 1042").with_type("CHECK")
}

pub fn store_with(categories: &[(&str, CategoryType)]) -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    for (name, category_type) in categories {
        store.insert_category(Category::new(*name, *category_type)).unwrap();
    }
    store
}

pub fn seed(store: &InMemoryStore, transactions: &[Transaction]) {
    for tx in transactions {
        store.insert_transaction(tx.clone()).unwrap();
    }
}

/// Retries that finish in milliseconds
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(2),
    }
}

pub fn config() -> ClassificationConfig {
    ClassificationConfig {
        parallel_workers: 2,
        batch_size: 3,
        ..Default::default()
    }
}

pub fn service(store: Arc<InMemoryStore>, oracle: Arc<ScriptedOracle>, config: ClassificationConfig) -> ClassificationService {
    ClassificationService::new(store, RankingClient::new(oracle, fast_retry()), config)
}
