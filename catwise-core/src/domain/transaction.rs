//! Transaction domain model

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::result::Error;

/// Transaction type string used by banks for paper checks
pub const CHECK_TRANSACTION_TYPE: &str = "CHECK";

/// Money direction of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Income,
    Expense,
    Transfer,
    #[default]
    Unset,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Income => "income",
            Direction::Expense => "expense",
            Direction::Transfer => "transfer",
            Direction::Unset => "",
        }
    }

    pub fn is_set(&self) -> bool {
        !matches!(self, Direction::Unset)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Unset => f.write_str("unset"),
            other => f.write_str(other.as_str()),
        }
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "income" => Ok(Direction::Income),
            "expense" => Ok(Direction::Expense),
            "transfer" => Ok(Direction::Transfer),
            "" | "unset" => Ok(Direction::Unset),
            other => Err(Error::validation(format!("Unknown direction: {}", other))),
        }
    }
}

/// A single financial transaction awaiting (or holding) a classification
///
/// Amounts are signed: positive is money leaving the account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    /// Cleaned merchant name (may be empty when the bank gave none)
    pub merchant_name: String,
    /// Raw statement description
    pub raw_name: String,
    pub amount: Decimal,
    pub date: NaiveDate,
    /// Bank transaction type, e.g. "CHECK", "DEBIT", "ACH"
    pub transaction_type: String,
    pub direction: Direction,
}

impl Transaction {
    /// Create a new transaction with required fields
    pub fn new(id: Uuid, merchant_name: impl Into<String>, amount: Decimal, date: NaiveDate) -> Self {
        let merchant_name = merchant_name.into();
        Self {
            id,
            raw_name: merchant_name.clone(),
            merchant_name,
            amount,
            date,
            transaction_type: "DEBIT".to_string(),
            direction: Direction::Unset,
        }
    }

    pub fn with_type(mut self, transaction_type: impl Into<String>) -> Self {
        self.transaction_type = transaction_type.into();
        self
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_raw_name(mut self, raw_name: impl Into<String>) -> Self {
        self.raw_name = raw_name.into();
        self
    }

    /// Name used to group this transaction with others from the same merchant
    ///
    /// Falls back to the raw statement name when the merchant name is blank.
    pub fn display_merchant(&self) -> &str {
        let merchant = self.merchant_name.trim();
        if merchant.is_empty() {
            self.raw_name.trim()
        } else {
            merchant
        }
    }

    pub fn is_check(&self) -> bool {
        self.transaction_type
            .trim()
            .eq_ignore_ascii_case(CHECK_TRANSACTION_TYPE)
    }

    /// Direction implied by the amount sign when none was recorded
    pub fn inferred_direction(&self) -> Direction {
        if self.direction.is_set() {
            return self.direction;
        }
        if self.amount > Decimal::ZERO {
            Direction::Expense
        } else if self.amount < Decimal::ZERO {
            Direction::Income
        } else {
            Direction::Unset
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(merchant: &str, raw: &str, cents: i64) -> Transaction {
        Transaction::new(
            Uuid::new_v4(),
            merchant,
            Decimal::new(cents, 2),
            NaiveDate::from_ymd_opt(2025, 3, 14).unwrap(),
        )
        .with_raw_name(raw)
    }

    #[test]
    fn test_display_merchant_falls_back_to_raw_name() {
        assert_eq!(tx("  Starbucks ", "SBUX #123", 450).display_merchant(), "Starbucks");
        assert_eq!(tx("   ", " SBUX #123 ", 450).display_merchant(), "SBUX #123");
    }

    #[test]
    fn test_check_detection_ignores_case() {
        assert!(tx("", "CHECK 1042", 200000).with_type("check").is_check());
        assert!(!tx("", "ACH", 200000).with_type("ACH").is_check());
    }

    #[test]
    fn test_inferred_direction() {
        assert_eq!(tx("Rent", "", 200000).inferred_direction(), Direction::Expense);
        assert_eq!(tx("Payroll", "", -300000).inferred_direction(), Direction::Income);
        assert_eq!(tx("Zero", "", 0).inferred_direction(), Direction::Unset);
        assert_eq!(
            tx("Savings", "", 5000)
                .with_direction(Direction::Transfer)
                .inferred_direction(),
            Direction::Transfer
        );
    }

    #[test]
    fn test_direction_parsing() {
        assert_eq!("Income".parse::<Direction>().unwrap(), Direction::Income);
        assert_eq!("".parse::<Direction>().unwrap(), Direction::Unset);
        assert!("sideways".parse::<Direction>().is_err());
    }
}
