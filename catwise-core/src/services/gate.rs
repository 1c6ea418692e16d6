//! Confidence gate - routes ranking results to auto-accept or review

use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;

use super::snapshot::CategorySnapshot;
use crate::domain::{CategoryRanking, Transaction};

/// Minimum group size before amount variance is considered
pub const HIGH_VARIANCE_MIN_TRANSACTIONS: usize = 5;
/// max/min amount ratio above which a group is high variance
pub const HIGH_VARIANCE_RATIO: f64 = 10.0;
/// With a zero minimum, a maximum above this counts as high variance
pub const HIGH_VARIANCE_ZERO_MIN_CEILING: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateDecision {
    /// Persist without confirmation
    AutoAccept,
    /// Rank and review each transaction on its own
    IndividualReview,
    /// One shared confirmation for the whole group
    BatchReview,
}

impl GateDecision {
    pub fn needs_review(&self) -> bool {
        !matches!(self, GateDecision::AutoAccept)
    }
}

/// Top ranking as judged against the run's category snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub category: String,
    pub score: f64,
    /// True when the oracle proposed a new category or the name is not in the snapshot
    pub is_new: bool,
    pub description: String,
}

impl Suggestion {
    pub fn from_ranking(top: &CategoryRanking, snapshot: &CategorySnapshot) -> Self {
        Self {
            category: top.category.clone(),
            score: top.score,
            is_new: top.is_new || !snapshot.contains(&top.category),
            description: top.description.clone(),
        }
    }
}

/// Threshold policy deciding whether a ranking may skip review
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceGate {
    threshold: f64,
}

impl ConfidenceGate {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Whether a suggestion may be persisted without review
    pub fn accepts(&self, suggestion: &Suggestion) -> bool {
        suggestion.score >= self.threshold && !suggestion.is_new
    }

    /// Route a merchant group's suggestion
    pub fn decide(&self, suggestion: &Suggestion, transactions: &[Transaction]) -> GateDecision {
        if self.accepts(suggestion) {
            GateDecision::AutoAccept
        } else if is_high_variance(transactions) {
            GateDecision::IndividualReview
        } else {
            GateDecision::BatchReview
        }
    }
}

/// Whether the amounts in a group spread too widely for one shared decision
pub fn is_high_variance(transactions: &[Transaction]) -> bool {
    if transactions.len() < HIGH_VARIANCE_MIN_TRANSACTIONS {
        return false;
    }

    let amounts = transactions
        .iter()
        .filter_map(|t| t.amount.abs().to_f64());
    let (min, max) = amounts.fold((f64::MAX, 0.0_f64), |(min, max), a| (min.min(a), max.max(a)));

    if min > 0.0 {
        max / min > HIGH_VARIANCE_RATIO
    } else {
        max > HIGH_VARIANCE_ZERO_MIN_CEILING
    }
}
