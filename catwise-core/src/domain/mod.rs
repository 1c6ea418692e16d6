//! Core domain entities
//!
//! All business entities are defined here. These are pure data structures
//! with validation logic - no I/O or external dependencies.

mod category;
mod classification;
pub mod result;
mod rule;
mod transaction;

pub use category::{
    filter_categories_for_direction, Category, CategoryRanking, CategoryRankings, CategoryType,
};
pub use classification::{
    CategoryChoice, Classification, ClassificationProgress, ClassificationStatus,
    ClassifiedTransaction, ReviewDecision, NEW_CATEGORY_MARKER,
};
pub use rule::{sort_by_priority, CheckPattern, Vendor};
pub use transaction::{Direction, Transaction, CHECK_TRANSACTION_TYPE};
