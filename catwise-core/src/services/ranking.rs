//! Ranking client - the oracle wrapped with retry and result checks

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use super::retry::{retry_with_backoff, RetryPolicy};
use crate::domain::result::{Error, Result};
use crate::domain::{Category, CategoryRankings, Transaction};
use crate::ports::{RankingOracle, RankingRequest};

/// Retrying front for a [`RankingOracle`]
#[derive(Clone)]
pub struct RankingClient {
    oracle: Arc<dyn RankingOracle>,
    retry: RetryPolicy,
}

impl RankingClient {
    pub fn new(oracle: Arc<dyn RankingOracle>, retry: RetryPolicy) -> Self {
        Self { oracle, retry }
    }

    /// Rank several merchants in one oracle round-trip
    ///
    /// The outer error means the call itself failed after every retry. Inner
    /// errors mark merchants the oracle returned no usable ranking for.
    pub async fn rank_batch(
        &self,
        requests: &[RankingRequest],
        categories: &[Category],
    ) -> Result<HashMap<String, Result<CategoryRankings>>> {
        if requests.is_empty() {
            return Ok(HashMap::new());
        }

        debug!(merchants = requests.len(), categories = categories.len(), "Ranking batch");
        let mut ranked = retry_with_backoff("rank_batch", &self.retry, || {
            self.oracle.rank_batch(requests, categories)
        })
        .await?;

        let results = requests
            .iter()
            .map(|req| {
                let outcome = match ranked.remove(&req.merchant_id) {
                    Some(rankings) if !rankings.is_empty() => Ok(rankings),
                    Some(_) => Err(Error::oracle(format!(
                        "Empty ranking for merchant {}",
                        req.merchant_id
                    ))),
                    None => Err(Error::oracle(format!(
                        "No ranking returned for merchant {}",
                        req.merchant_id
                    ))),
                };
                (req.merchant_id.clone(), outcome)
            })
            .collect();

        Ok(results)
    }

    /// Rank a single transaction
    pub async fn rank_one(&self, tx: &Transaction, categories: &[Category]) -> Result<CategoryRankings> {
        let request = RankingRequest {
            merchant_id: tx.id.to_string(),
            sample: tx.clone(),
            transaction_count: 1,
        };
        let mut results = self.rank_batch(std::slice::from_ref(&request), categories).await?;
        results
            .remove(&request.merchant_id)
            .unwrap_or_else(|| Err(Error::oracle("No ranking returned")))
    }

    /// Generate a category description; the confidence is logged, not returned
    pub async fn describe_category(&self, name: &str) -> Result<String> {
        let (description, confidence) = retry_with_backoff("generate_description", &self.retry, || {
            self.oracle.generate_description(name)
        })
        .await?;
        info!(category = name, confidence, "Generated category description");
        Ok(description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CategoryRanking, CategoryType};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use uuid::Uuid;

    struct PartialOracle {
        calls: AtomicU32,
    }

    #[async_trait]
    impl RankingOracle for PartialOracle {
        async fn rank_batch(
            &self,
            requests: &[RankingRequest],
            _categories: &[Category],
        ) -> Result<HashMap<String, CategoryRankings>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut out = HashMap::new();
            // Rank only the first merchant; leave the second empty
            if let Some(first) = requests.first() {
                out.insert(
                    first.merchant_id.clone(),
                    CategoryRankings::new(vec![CategoryRanking::new("Coffee", 0.8)]),
                );
            }
            if let Some(second) = requests.get(1) {
                out.insert(second.merchant_id.clone(), CategoryRankings::default());
            }
            Ok(out)
        }

        async fn generate_description(&self, _name: &str) -> Result<(String, f64)> {
            Err(Error::oracle("unavailable"))
        }
    }

    fn request(id: &str) -> RankingRequest {
        RankingRequest {
            merchant_id: id.to_string(),
            sample: Transaction::new(
                Uuid::new_v4(),
                id,
                Decimal::new(450, 2),
                NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(),
            ),
            transaction_count: 1,
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn test_missing_and_empty_rankings_become_per_merchant_errors() {
        let oracle = Arc::new(PartialOracle { calls: AtomicU32::new(0) });
        let client = RankingClient::new(oracle.clone(), policy());
        let categories = vec![Category::new("Coffee", CategoryType::Expense)];

        let results = client
            .rank_batch(&[request("a"), request("b"), request("c")], &categories)
            .await
            .unwrap();

        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
        assert_eq!(results["a"].as_ref().unwrap().top().unwrap().category, "Coffee");
        assert!(results["b"].is_err());
        assert!(results["c"].is_err());
    }

    #[tokio::test]
    async fn test_empty_request_skips_oracle() {
        let oracle = Arc::new(PartialOracle { calls: AtomicU32::new(0) });
        let client = RankingClient::new(oracle.clone(), policy());
        assert!(client.rank_batch(&[], &[]).await.unwrap().is_empty());
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_describe_failure_surfaces_after_retries() {
        let oracle = Arc::new(PartialOracle { calls: AtomicU32::new(0) });
        let client = RankingClient::new(oracle, policy());
        assert!(client.describe_category("Pets").await.is_err());
    }
}
