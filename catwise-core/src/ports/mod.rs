//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external collaborators. The pipeline
//! depends only on these traits, not on concrete implementations.

mod oracle;
mod prompter;
mod store;

pub use oracle::{RankingOracle, RankingRequest};
pub use prompter::{PendingClassification, ReviewPrompter};
pub use store::ClassificationStore;
