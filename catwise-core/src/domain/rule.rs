//! Rule domain entities: vendor rules and check patterns

use chrono::{DateTime, Datelike, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use uuid::Uuid;

use super::transaction::Transaction;

/// A 100%-confidence mapping from merchant name to category
///
/// Once a vendor exists, transactions from that merchant skip ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vendor {
    /// Normalized merchant name (see [`Vendor::normalize_name`])
    pub name: String,
    pub category: String,
    pub use_count: i64,
    pub last_updated: DateTime<Utc>,
}

impl Vendor {
    pub fn new(name: &str, category: impl Into<String>) -> Self {
        Self {
            name: Self::normalize_name(name),
            category: category.into(),
            use_count: 0,
            last_updated: Utc::now(),
        }
    }

    /// Lowercase, trim and collapse inner whitespace
    pub fn normalize_name(name: &str) -> String {
        static WHITESPACE: OnceLock<Regex> = OnceLock::new();
        let re = WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("static regex"));
        re.replace_all(name.trim(), " ").to_lowercase()
    }
}

/// A rule that recognizes recurring paper checks (rent, tuition, ...)
///
/// Matches check transactions by absolute amount and day of month. All
/// bounds are inclusive; a missing bound is open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckPattern {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    pub amount_min: Option<Decimal>,
    pub amount_max: Option<Decimal>,
    pub day_of_month_min: Option<u32>,
    pub day_of_month_max: Option<u32>,
    /// Added to the ranking score of `category`, result clamped to 1.0
    pub confidence_boost: f64,
    pub active: bool,
    pub use_count: i64,
}

impl CheckPattern {
    pub fn new(name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            category: category.into(),
            amount_min: None,
            amount_max: None,
            day_of_month_min: None,
            day_of_month_max: None,
            confidence_boost: 0.0,
            active: true,
            use_count: 0,
        }
    }

    pub fn with_amount_range(mut self, min: Decimal, max: Decimal) -> Self {
        self.amount_min = Some(min);
        self.amount_max = Some(max);
        self
    }

    pub fn with_day_range(mut self, min: u32, max: u32) -> Self {
        self.day_of_month_min = Some(min);
        self.day_of_month_max = Some(max);
        self
    }

    pub fn with_boost(mut self, boost: f64) -> Self {
        self.confidence_boost = boost;
        self
    }

    /// Whether this pattern applies to `tx`
    pub fn matches(&self, tx: &Transaction) -> bool {
        if !self.active || !tx.is_check() {
            return false;
        }

        let amount = tx.amount.abs();
        if self.amount_min.is_some_and(|min| amount < min) {
            return false;
        }
        if self.amount_max.is_some_and(|max| amount > max) {
            return false;
        }

        let day = tx.date.day();
        if self.day_of_month_min.is_some_and(|min| day < min) {
            return false;
        }
        if self.day_of_month_max.is_some_and(|max| day > max) {
            return false;
        }

        true
    }

    /// Score after adding this pattern's boost to `base`
    pub fn boosted(&self, base: f64) -> f64 {
        (base + self.confidence_boost.max(0.0)).min(1.0)
    }
}

/// Order patterns so the highest priority comes first
pub fn sort_by_priority(patterns: &mut [CheckPattern]) {
    patterns.sort_by(|a, b| {
        b.confidence_boost
            .partial_cmp(&a.confidence_boost)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn check(cents: i64, day: u32) -> Transaction {
        Transaction::new(
            Uuid::new_v4(),
            "",
            Decimal::new(cents, 2),
            NaiveDate::from_ymd_opt(2025, 6, day).unwrap(),
        )
        .with_raw_name("CHECK 1042")
        .with_type("CHECK")
    }

    fn rent_pattern() -> CheckPattern {
        CheckPattern::new("Monthly rent", "Rent")
            .with_amount_range(Decimal::new(190000, 2), Decimal::new(210000, 2))
            .with_day_range(1, 5)
            .with_boost(0.5)
    }

    #[test]
    fn test_vendor_name_normalization() {
        assert_eq!(Vendor::normalize_name("  Blue   Bottle\tCoffee "), "blue bottle coffee");
        assert_eq!(Vendor::new("STARBUCKS", "Coffee").name, "starbucks");
    }

    #[test]
    fn test_pattern_matches_amount_and_day() {
        let pattern = rent_pattern();
        assert!(pattern.matches(&check(200000, 1)));
        assert!(pattern.matches(&check(210000, 5)));
        assert!(!pattern.matches(&check(250000, 1)));
        assert!(!pattern.matches(&check(200000, 15)));
    }

    #[test]
    fn test_pattern_requires_active_check() {
        let pattern = rent_pattern();
        let debit = check(200000, 1).with_type("DEBIT");
        assert!(!pattern.matches(&debit));

        let mut inactive = rent_pattern();
        inactive.active = false;
        assert!(!inactive.matches(&check(200000, 1)));
    }

    #[test]
    fn test_pattern_uses_absolute_amount() {
        assert!(rent_pattern().matches(&check(-200000, 2)));
    }

    #[test]
    fn test_boosted_is_clamped() {
        let pattern = rent_pattern();
        assert_eq!(pattern.boosted(0.7), 1.0);
        assert!((pattern.boosted(0.3) - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_priority_order() {
        let mut patterns = vec![
            CheckPattern::new("b", "X").with_boost(0.2),
            CheckPattern::new("a", "Y").with_boost(0.5),
            CheckPattern::new("c", "Z").with_boost(0.2),
        ];
        sort_by_priority(&mut patterns);
        let names: Vec<&str> = patterns.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
