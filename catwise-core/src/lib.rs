//! Catwise Core - transaction classification pipeline
//!
//! This crate implements the core domain logic following hexagonal architecture:
//!
//! - **domain**: Core entities (Transaction, Category, Vendor, CheckPattern, Classification)
//! - **ports**: Trait definitions for collaborators (store, ranking oracle, review prompter)
//! - **services**: The classification pipeline and its drivers
//! - **adapters**: Concrete implementations (DuckDB, HTTP oracle, in-memory store)

pub mod adapters;
pub mod config;
pub mod domain;
pub mod migrations;
pub mod ports;
pub mod services;

use std::path::Path;
use std::sync::Arc;

use adapters::{DuckDbStore, HttpRankingOracle};
use config::Config;
use ports::{ClassificationStore, RankingOracle};
use services::{ClassificationService, RankingClient, RerankService, RetryPolicy, StatusService};

// Re-export commonly used types at crate root
pub use domain::result::{Error, Result};
pub use domain::{
    Category, CategoryChoice, CategoryRanking, CategoryRankings, CategoryType, CheckPattern, Classification,
    ClassificationStatus, Direction, ReviewDecision, Transaction, Vendor,
};
pub use services::{ClassificationSummary, RerankSummary};

/// Database file inside the catwise directory
pub const DB_FILENAME: &str = "catwise.duckdb";

/// Main context for Catwise operations
///
/// Holds the configuration and the store. Pipeline services are built on
/// demand so that per-invocation config overrides take effect.
pub struct CatwiseContext {
    pub config: Config,
    pub store: Arc<DuckDbStore>,
    pub status_service: StatusService,
    oracle: Option<Arc<dyn RankingOracle>>,
}

impl CatwiseContext {
    /// Create a new Catwise context rooted at `catwise_dir`
    pub fn new(catwise_dir: &Path) -> Result<Self> {
        let config = Config::load(catwise_dir)?;
        std::fs::create_dir_all(catwise_dir)?;

        let store = Arc::new(DuckDbStore::new(&catwise_dir.join(DB_FILENAME))?);
        Ok(Self::with_store(config, store))
    }

    pub fn with_store(config: Config, store: Arc<DuckDbStore>) -> Self {
        let status_service = StatusService::new(store.clone());
        Self {
            config,
            store,
            status_service,
            oracle: None,
        }
    }

    /// Use this oracle instead of the configured HTTP endpoint
    pub fn with_oracle(mut self, oracle: Arc<dyn RankingOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Ranking client with the configured retry policy
    pub fn ranking_client(&self) -> Result<RankingClient> {
        let oracle: Arc<dyn RankingOracle> = match &self.oracle {
            Some(oracle) => oracle.clone(),
            None => Arc::new(HttpRankingOracle::from_config(&self.config.oracle)?),
        };
        Ok(RankingClient::new(oracle, RetryPolicy::from(&self.config.retry)))
    }

    /// Classification pipeline for the current config
    pub fn classification_service(&self) -> Result<ClassificationService> {
        self.config.validate()?;
        let store: Arc<dyn ClassificationStore> = self.store.clone();
        Ok(ClassificationService::new(
            store,
            self.ranking_client()?,
            self.config.classification.clone(),
        ))
    }

    /// Rerank driver sharing the classification pipeline
    pub fn rerank_service(&self) -> Result<RerankService> {
        Ok(RerankService::new(self.classification_service()?, self.config.rerank.clone()))
    }
}
