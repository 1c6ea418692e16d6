//! Merchant grouping - partitions transactions into classification units

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::domain::{Direction, Transaction};

/// Transactions sharing one merchant identity and direction
#[derive(Debug, Clone, PartialEq)]
pub struct MerchantGroup {
    pub key: String,
    /// Display name of the merchant (trimmed, raw name as fallback)
    pub merchant: String,
    pub direction: Direction,
    pub transactions: Vec<Transaction>,
}

impl MerchantGroup {
    /// First transaction of the group, used as the ranking sample
    pub fn representative(&self) -> Option<&Transaction> {
        self.transactions.first()
    }

    /// Date of the group's oldest transaction
    pub fn earliest_date(&self) -> Option<NaiveDate> {
        self.transactions.iter().map(|t| t.date).min()
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

/// Group key for a transaction: merchant display name joined with direction
pub fn merchant_key(tx: &Transaction) -> String {
    format!("{}|{}", tx.display_merchant(), tx.direction.as_str())
}

/// Merchant groups in volume-descending order
#[derive(Debug, Clone, Default)]
pub struct MerchantGroups {
    groups: Vec<MerchantGroup>,
}

impl MerchantGroups {
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MerchantGroup> {
        self.groups.iter()
    }

    /// Keys in processing order
    pub fn keys(&self) -> Vec<String> {
        self.groups.iter().map(|g| g.key.clone()).collect()
    }

    pub fn get(&self, key: &str) -> Option<&MerchantGroup> {
        self.groups.iter().find(|g| g.key == key)
    }

    pub fn transaction_count(&self) -> usize {
        self.groups.iter().map(|g| g.len()).sum()
    }

    pub fn into_vec(self) -> Vec<MerchantGroup> {
        self.groups
    }
}

impl IntoIterator for MerchantGroups {
    type Item = MerchantGroup;
    type IntoIter = std::vec::IntoIter<MerchantGroup>;

    fn into_iter(self) -> Self::IntoIter {
        self.groups.into_iter()
    }
}

/// Partition transactions by merchant key
///
/// Larger groups come first; groups of equal size keep the order in which
/// their first transaction appeared.
pub fn group_by_merchant(transactions: Vec<Transaction>) -> MerchantGroups {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<MerchantGroup> = Vec::new();

    for tx in transactions {
        let key = merchant_key(&tx);
        match index.get(&key) {
            Some(&i) => groups[i].transactions.push(tx),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push(MerchantGroup {
                    key,
                    merchant: tx.display_merchant().to_string(),
                    direction: tx.direction,
                    transactions: vec![tx],
                });
            }
        }
    }

    // Stable sort keeps insertion order among ties
    groups.sort_by(|a, b| b.len().cmp(&a.len()));

    MerchantGroups { groups }
}
