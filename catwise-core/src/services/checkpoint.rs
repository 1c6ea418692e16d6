//! Progress checkpoint - lets a cancelled run resume where it stopped
//!
//! Groups are processed in volume order, so the saved date is the oldest
//! transaction among groups this run has not fully persisted. Resuming from it
//! never skips unfinished work; already classified transactions are filtered
//! out at the source.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use super::applier::ApplyCounts;
use super::grouping::MerchantGroup;
use crate::domain::result::Result;
use crate::domain::ClassificationProgress;
use crate::ports::ClassificationStore;

/// Tracks and persists progress of one classification run
pub struct ProgressTracker {
    store: Arc<dyn ClassificationStore>,
    progress: ClassificationProgress,
    resumed_from: Option<NaiveDate>,
    /// Oldest transaction date per group key still waiting to be persisted
    outstanding: HashMap<String, NaiveDate>,
}

impl ProgressTracker {
    /// Load the saved checkpoint, or start fresh
    pub async fn resume(store: Arc<dyn ClassificationStore>) -> Result<Self> {
        let (progress, resumed_from) = match store.get_progress().await? {
            Some(saved) => {
                info!(
                    last_processed_date = ?saved.last_processed_date,
                    total_processed = saved.total_processed,
                    "Resuming from checkpoint"
                );
                let from = saved.last_processed_date;
                (saved, from)
            }
            None => (ClassificationProgress::start(), None),
        };
        Ok(Self {
            store,
            progress,
            resumed_from,
            outstanding: HashMap::new(),
        })
    }

    /// Date the run resumes from; overrides any caller-supplied start date
    pub fn resumed_from(&self) -> Option<NaiveDate> {
        self.resumed_from
    }

    pub fn total_processed(&self) -> u64 {
        self.progress.total_processed
    }

    /// Register the groups this run is about to process
    pub fn track<'a>(&mut self, groups: impl IntoIterator<Item = &'a MerchantGroup>) {
        for group in groups {
            if let Some(date) = group.earliest_date() {
                self.outstanding.insert(group.key.clone(), date);
            }
        }
        self.progress.last_processed_date = self.resume_date();
    }

    /// Record what was persisted for a group and save the checkpoint
    ///
    /// The group stays outstanding unless every transaction was persisted.
    pub async fn record(&mut self, group: &MerchantGroup, counts: &ApplyCounts) {
        let persisted = counts.persisted();
        self.progress.total_processed += persisted as u64;
        if persisted >= group.len() {
            self.outstanding.remove(&group.key);
            if let Some(last) = group.transactions.last() {
                self.progress.last_processed_id = Some(last.id);
            }
        }
        self.progress.last_processed_date = self.resume_date();
        self.persist().await;
    }

    /// Best-effort save before returning a cancellation
    pub async fn save_on_cancel(&self) {
        info!(
            total_processed = self.progress.total_processed,
            resume_date = ?self.progress.last_processed_date,
            "Saving checkpoint before cancel"
        );
        self.persist().await;
    }

    /// Clear the checkpoint after a completed run
    pub async fn complete(&self) {
        if let Err(e) = self.store.clear_progress().await {
            warn!(error = %e, "Failed to clear classification checkpoint");
        }
    }

    fn resume_date(&self) -> Option<NaiveDate> {
        self.outstanding.values().min().copied()
    }

    async fn persist(&self) {
        match self.store.save_progress(&self.progress).await {
            Ok(()) => debug!(total_processed = self.progress.total_processed, "Checkpoint saved"),
            Err(e) => warn!(error = %e, "Failed to save classification checkpoint"),
        }
    }
}
