//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - DuckDB for the ClassificationStore port
//! - In-memory ClassificationStore for tests and dry runs
//! - OpenAI-compatible HTTP client for the RankingOracle port

pub mod duckdb;
pub mod http_oracle;
pub mod memory;

pub use self::duckdb::DuckDbStore;
pub use http_oracle::HttpRankingOracle;
pub use memory::InMemoryStore;
