//! Ranking oracle port
//!
//! The oracle is an external (LLM-backed) service that ranks candidate
//! categories for merchants. It is treated as opaque and unreliable; retries
//! live in the service layer, not in implementations.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::result::Result;
use crate::domain::{Category, CategoryRankings, Transaction};

/// One merchant to rank
#[derive(Debug, Clone, Serialize)]
pub struct RankingRequest {
    /// Merchant group key, echoed back as the key of the result map
    pub merchant_id: String,
    /// Representative transaction of the group
    pub sample: Transaction,
    /// Number of transactions in the group
    pub transaction_count: usize,
}

/// External category ranking service
#[async_trait]
pub trait RankingOracle: Send + Sync {
    /// Rank `categories` for every request in one round-trip
    ///
    /// Returns rankings keyed by `merchant_id`. Merchants the oracle could
    /// not rank may be missing from the map.
    async fn rank_batch(
        &self,
        requests: &[RankingRequest],
        categories: &[Category],
    ) -> Result<HashMap<String, CategoryRankings>>;

    /// Write a short description for a category name
    ///
    /// Returns the description and the oracle's confidence in it.
    async fn generate_description(&self, category_name: &str) -> Result<(String, f64)>;
}
