//! In-memory store, for tests and dry runs

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{
    sort_by_priority, Category, CheckPattern, Classification, ClassificationProgress, ClassifiedTransaction,
    Direction, Transaction, Vendor,
};
use crate::ports::ClassificationStore;

#[derive(Default)]
struct State {
    transactions: Vec<Transaction>,
    categories: Vec<Category>,
    vendors: HashMap<String, Vendor>,
    patterns: Vec<CheckPattern>,
    classifications: HashMap<Uuid, Classification>,
    progress: Option<ClassificationProgress>,
}

/// Store kept entirely in memory behind a mutex
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| Error::database("In-memory store lock poisoned"))
    }

    pub fn insert_transaction(&self, tx: Transaction) -> Result<()> {
        let mut state = self.state()?;
        state.transactions.retain(|t| t.id != tx.id);
        state.transactions.push(tx);
        Ok(())
    }

    pub fn insert_category(&self, category: Category) -> Result<()> {
        let mut state = self.state()?;
        if state.categories.iter().any(|c| c.has_name(&category.name)) {
            return Err(Error::validation(format!("Category already exists: {}", category.name)));
        }
        state.categories.push(category);
        Ok(())
    }

    pub fn insert_check_pattern(&self, pattern: CheckPattern) -> Result<()> {
        self.state()?.patterns.push(pattern);
        Ok(())
    }

    pub fn transaction(&self, id: Uuid) -> Result<Option<Transaction>> {
        Ok(self.state()?.transactions.iter().find(|t| t.id == id).cloned())
    }

    pub fn classification(&self, transaction_id: Uuid) -> Result<Option<Classification>> {
        Ok(self.state()?.classifications.get(&transaction_id).cloned())
    }

    /// Forget every classification, making all transactions eligible again
    pub fn clear_classifications(&self) -> Result<()> {
        self.state()?.classifications.clear();
        Ok(())
    }
}

#[async_trait]
impl ClassificationStore for InMemoryStore {
    async fn get_unclassified_transactions(&self, from_date: Option<NaiveDate>) -> Result<Vec<Transaction>> {
        let state = self.state()?;
        let mut transactions: Vec<Transaction> = state
            .transactions
            .iter()
            .filter(|t| !state.classifications.contains_key(&t.id))
            .filter(|t| from_date.map_or(true, |from| t.date >= from))
            .cloned()
            .collect();
        transactions.sort_by_key(|t| t.date);
        Ok(transactions)
    }

    async fn update_transaction_direction(&self, id: Uuid, direction: Direction) -> Result<()> {
        let mut state = self.state()?;
        let tx = state
            .transactions
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| Error::not_found(format!("Transaction {}", id)))?;
        tx.direction = direction;
        Ok(())
    }

    async fn get_categories(&self) -> Result<Vec<Category>> {
        Ok(self.state()?.categories.clone())
    }

    async fn find_category(&self, name: &str) -> Result<Option<Category>> {
        Ok(self.state()?.categories.iter().find(|c| c.has_name(name)).cloned())
    }

    async fn create_category(&self, category: &Category) -> Result<()> {
        self.insert_category(category.clone())
    }

    async fn get_vendor(&self, name: &str) -> Result<Option<Vendor>> {
        Ok(self.state()?.vendors.get(&Vendor::normalize_name(name)).cloned())
    }

    async fn save_vendor(&self, vendor: &Vendor) -> Result<()> {
        let mut vendor = vendor.clone();
        vendor.name = Vendor::normalize_name(&vendor.name);
        self.state()?.vendors.insert(vendor.name.clone(), vendor);
        Ok(())
    }

    async fn get_vendors(&self) -> Result<Vec<Vendor>> {
        let mut vendors: Vec<Vendor> = self.state()?.vendors.values().cloned().collect();
        vendors.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(vendors)
    }

    async fn increment_vendor_use(&self, name: &str) -> Result<()> {
        let mut state = self.state()?;
        let vendor = state
            .vendors
            .get_mut(&Vendor::normalize_name(name))
            .ok_or_else(|| Error::not_found(format!("Vendor {}", name)))?;
        vendor.use_count += 1;
        vendor.last_updated = Utc::now();
        Ok(())
    }

    async fn get_matching_check_patterns(&self, tx: &Transaction) -> Result<Vec<CheckPattern>> {
        let mut matching: Vec<CheckPattern> = self
            .state()?
            .patterns
            .iter()
            .filter(|p| p.matches(tx))
            .cloned()
            .collect();
        sort_by_priority(&mut matching);
        Ok(matching)
    }

    async fn get_check_patterns(&self) -> Result<Vec<CheckPattern>> {
        let mut patterns = self.state()?.patterns.clone();
        sort_by_priority(&mut patterns);
        Ok(patterns)
    }

    async fn increment_pattern_use(&self, id: Uuid) -> Result<()> {
        let mut state = self.state()?;
        let pattern = state
            .patterns
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| Error::not_found(format!("Check pattern {}", id)))?;
        pattern.use_count += 1;
        Ok(())
    }

    async fn save_classification(&self, classification: &Classification) -> Result<()> {
        self.state()?
            .classifications
            .insert(classification.transaction_id, classification.clone());
        Ok(())
    }

    async fn get_classifications_below_confidence(&self, threshold: f64) -> Result<Vec<ClassifiedTransaction>> {
        let state = self.state()?;
        Ok(state
            .transactions
            .iter()
            .filter_map(|t| {
                state
                    .classifications
                    .get(&t.id)
                    .filter(|c| c.confidence < threshold)
                    .map(|c| ClassifiedTransaction {
                        transaction: t.clone(),
                        classification: c.clone(),
                    })
            })
            .collect())
    }

    async fn get_classifications(&self) -> Result<Vec<Classification>> {
        Ok(self.state()?.classifications.values().cloned().collect())
    }

    async fn get_progress(&self) -> Result<Option<ClassificationProgress>> {
        Ok(self.state()?.progress.clone())
    }

    async fn save_progress(&self, progress: &ClassificationProgress) -> Result<()> {
        self.state()?.progress = Some(progress.clone());
        Ok(())
    }

    async fn clear_progress(&self) -> Result<()> {
        self.state()?.progress = None;
        Ok(())
    }
}
