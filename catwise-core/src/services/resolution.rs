//! Resolution policy - vendor rules, then check patterns, then ranking

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use super::grouping::MerchantGroup;
use crate::domain::{CheckPattern, Transaction, Vendor};
use crate::ports::{ClassificationStore, RankingRequest};

/// A persisted rule that decides a merchant's category outright
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleMatch {
    Vendor(Vendor),
    CheckPattern(CheckPattern),
}

impl RuleMatch {
    pub fn category(&self) -> &str {
        match self {
            RuleMatch::Vendor(v) => &v.category,
            RuleMatch::CheckPattern(p) => &p.category,
        }
    }

    /// Patterns that contributed to the match
    pub fn used_patterns(&self) -> Vec<CheckPattern> {
        match self {
            RuleMatch::CheckPattern(p) => vec![p.clone()],
            RuleMatch::Vendor(_) => Vec::new(),
        }
    }
}

/// How a merchant group will be classified
#[derive(Debug, Clone)]
pub enum Resolution {
    Rule(RuleMatch),
    NeedsRanking(RankingRequest),
    /// Group without transactions; nothing to classify
    Empty,
}

/// Tries the rule sources for a merchant before the oracle is consulted
#[derive(Clone)]
pub struct ResolutionPolicy {
    store: Arc<dyn ClassificationStore>,
}

impl ResolutionPolicy {
    pub fn new(store: Arc<dyn ClassificationStore>) -> Self {
        Self { store }
    }

    /// Resolve one merchant group
    ///
    /// Lookup failures are logged and the merchant falls through to ranking.
    pub async fn resolve(&self, group: &MerchantGroup) -> Resolution {
        let Some(representative) = group.representative() else {
            return Resolution::Empty;
        };

        if let Some(vendor) = self.vendor_for(&group.merchant).await {
            debug!(merchant = %group.merchant, category = %vendor.category, "Vendor rule match");
            return Resolution::Rule(RuleMatch::Vendor(vendor));
        }

        if let Some(pattern) = self.check_pattern_for(representative).await {
            debug!(merchant = %group.merchant, pattern = %pattern.name, "Check pattern match");
            return Resolution::Rule(RuleMatch::CheckPattern(pattern));
        }

        Resolution::NeedsRanking(RankingRequest {
            merchant_id: group.key.clone(),
            sample: representative.clone(),
            transaction_count: group.len(),
        })
    }

    /// Vendor rule for a merchant name, if any
    pub async fn vendor_for(&self, merchant: &str) -> Option<Vendor> {
        let name = Vendor::normalize_name(merchant);
        if name.is_empty() {
            return None;
        }
        match self.store.get_vendor(&name).await {
            Ok(vendor) => vendor,
            Err(e) => {
                warn!(merchant, error = %e, "Vendor lookup failed");
                None
            }
        }
    }

    /// Highest-priority check pattern for a check transaction
    pub async fn check_pattern_for(&self, tx: &Transaction) -> Option<CheckPattern> {
        self.matching_patterns(tx).await.into_iter().next()
    }

    /// Every active pattern matching a check transaction, highest priority first
    pub async fn matching_patterns(&self, tx: &Transaction) -> Vec<CheckPattern> {
        if !tx.is_check() {
            return Vec::new();
        }
        match self.store.get_matching_check_patterns(tx).await {
            Ok(patterns) => patterns,
            Err(e) => {
                warn!(transaction = %tx.id, error = %e, "Check pattern lookup failed");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryStore;
    use crate::domain::Direction;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn group(merchant: &str, count: usize) -> MerchantGroup {
        let transactions = (0..count)
            .map(|i| {
                Transaction::new(
                    Uuid::new_v4(),
                    merchant,
                    Decimal::new(1599, 2),
                    NaiveDate::from_ymd_opt(2025, 3, 1 + i as u32).unwrap(),
                )
                .with_direction(Direction::Expense)
            })
            .collect();
        MerchantGroup {
            key: format!("{}|expense", merchant),
            merchant: merchant.to_string(),
            direction: Direction::Expense,
            transactions,
        }
    }

    #[tokio::test]
    async fn test_empty_group_resolves_without_sample() {
        let store = Arc::new(InMemoryStore::new());
        store.save_vendor(&Vendor::new("Netflix", "Subscriptions")).await.unwrap();
        let policy = ResolutionPolicy::new(store);

        let resolution = policy.resolve(&group("Netflix", 0)).await;
        assert!(matches!(resolution, Resolution::Empty));
    }

    #[tokio::test]
    async fn test_vendor_rule_before_ranking() {
        let store = Arc::new(InMemoryStore::new());
        store.save_vendor(&Vendor::new("Netflix", "Subscriptions")).await.unwrap();
        let policy = ResolutionPolicy::new(store);

        match policy.resolve(&group("Netflix", 2)).await {
            Resolution::Rule(rule) => assert_eq!(rule.category(), "Subscriptions"),
            other => panic!("expected vendor rule, got {:?}", other),
        }

        match policy.resolve(&group("Hulu", 3)).await {
            Resolution::NeedsRanking(request) => {
                assert_eq!(request.merchant_id, "Hulu|expense");
                assert_eq!(request.transaction_count, 3);
                assert_eq!(request.sample.date, NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
            }
            other => panic!("expected ranking request, got {:?}", other),
        }
    }
}
