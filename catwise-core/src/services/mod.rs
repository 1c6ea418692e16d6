//! Service layer - the classification pipeline
//!
//! Services coordinate domain logic and port interactions. The pipeline is
//! built bottom-up: grouping, rule resolution, ranking with retry, the
//! confidence gate, the batch scheduler, and the run drivers on top.

mod applier;
mod checkpoint;
mod classify;
mod gate;
mod grouping;
pub mod migration;
mod provisioning;
mod ranking;
mod rerank;
mod resolution;
mod retry;
mod scheduler;
mod snapshot;
mod status;

pub use applier::{ApplyCounts, ClassificationApplier, ReviewItem};
pub use checkpoint::ProgressTracker;
pub use classify::{ClassificationService, ClassificationSummary, TransactionOutcome};
pub use gate::{is_high_variance, ConfidenceGate, GateDecision, Suggestion};
pub use grouping::{group_by_merchant, merchant_key, MerchantGroup, MerchantGroups};
pub use migration::{MigrationResult, MigrationService};
pub use provisioning::CategoryProvisioner;
pub use ranking::RankingClient;
pub use rerank::{RerankService, RerankSummary};
pub use resolution::{Resolution, ResolutionPolicy, RuleMatch};
pub use retry::{retry_with_backoff, RetryPolicy};
pub use scheduler::{drain, BatchResult, BatchScheduler, MerchantOutcome};
pub use snapshot::CategorySnapshot;
pub use status::{StatusCounts, StatusService, StatusSummary};
