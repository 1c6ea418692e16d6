//! Integration tests for the DuckDB store
//!
//! All database operations are real; the ranking oracle is scripted.
//!
//! Run with: cargo test --test duckdb_store_test -- --nocapture

mod common;

use std::sync::Arc;

use rust_decimal::Decimal;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use catwise_core::adapters::DuckDbStore;
use catwise_core::ports::ClassificationStore;
use catwise_core::services::{ClassificationService, RankingClient};
use catwise_core::{
    Category, CategoryType, CheckPattern, Classification, ClassificationStatus, Direction, Vendor,
};
use catwise_core::domain::ClassificationProgress;

use common::*;

// ============================================================================
// Test Helpers
// ============================================================================

/// Create a store in a temp directory with migrations applied
fn create_test_store(temp_dir: &TempDir) -> Arc<DuckDbStore> {
    let db_path = temp_dir.path().join("test.duckdb");
    Arc::new(DuckDbStore::new(&db_path).expect("Failed to create store"))
}

// ============================================================================
// Transactions and classifications
// ============================================================================

#[tokio::test]
async fn test_transaction_round_trip_and_unclassified_filter() {
    let temp_dir = TempDir::new().unwrap();
    let store = create_test_store(&temp_dir);

    let latte = tx("Starbucks", 550, date(3, 1)).with_raw_name("SQ *STARBUCKS 1234");
    let rent = check(200000, date(3, 3)).with_direction(Direction::Expense);
    store.insert_transaction(&latte).unwrap();
    store.insert_transaction(&rent).unwrap();

    let all = store.get_unclassified_transactions(None).await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].id, latte.id);
    assert_eq!(all[0].raw_name, "SQ *STARBUCKS 1234");
    assert_eq!(all[0].amount, Decimal::new(550, 2));
    assert_eq!(all[0].direction, Direction::Unset);
    assert!(all[1].is_check());
    assert_eq!(all[1].direction, Direction::Expense);

    let later = store.get_unclassified_transactions(Some(date(3, 2))).await.unwrap();
    assert_eq!(later.len(), 1);
    assert_eq!(later[0].id, rent.id);

    store
        .save_classification(&Classification::new(latte.id, "Coffee", ClassificationStatus::Ai, 0.7))
        .await
        .unwrap();
    let remaining = store.get_unclassified_transactions(None).await.unwrap();
    assert_eq!(remaining.len(), 1);

    store.update_transaction_direction(latte.id, Direction::Expense).await.unwrap();
    assert!(store
        .update_transaction_direction(Uuid::new_v4(), Direction::Income)
        .await
        .is_err());
}

#[tokio::test]
async fn test_save_classification_replaces_previous() {
    let temp_dir = TempDir::new().unwrap();
    let store = create_test_store(&temp_dir);

    let fill_up = tx("Shell", 4210, date(3, 1));
    store.insert_transaction(&fill_up).unwrap();

    store
        .save_classification(&Classification::new(fill_up.id, "Groceries", ClassificationStatus::Ai, 0.6))
        .await
        .unwrap();
    store
        .save_classification(
            &Classification::new(fill_up.id, "Fuel", ClassificationStatus::UserModified, 1.0)
                .with_notes(Some("corrected".to_string())),
        )
        .await
        .unwrap();

    let classifications = store.get_classifications().await.unwrap();
    assert_eq!(classifications.len(), 1);
    assert_eq!(classifications[0].category, "Fuel");
    assert_eq!(classifications[0].status, ClassificationStatus::UserModified);
    assert_eq!(classifications[0].notes.as_deref(), Some("corrected"));
}

#[tokio::test]
async fn test_classifications_below_confidence() {
    let temp_dir = TempDir::new().unwrap();
    let store = create_test_store(&temp_dir);

    let unsure = tx("Shell", 4210, date(3, 1));
    let sure = tx("Chevron", 5100, date(3, 2));
    store.insert_transaction(&unsure).unwrap();
    store.insert_transaction(&sure).unwrap();
    store
        .save_classification(&Classification::new(unsure.id, "Fuel", ClassificationStatus::Ai, 0.5))
        .await
        .unwrap();
    store
        .save_classification(&Classification::new(sure.id, "Fuel", ClassificationStatus::Rule, 1.0))
        .await
        .unwrap();

    let low = store.get_classifications_below_confidence(0.9).await.unwrap();
    assert_eq!(low.len(), 1);
    assert_eq!(low[0].transaction.id, unsure.id);
    assert_eq!(low[0].transaction.merchant_name, "Shell");
    assert_eq!(low[0].classification.confidence, 0.5);
    assert_eq!(low[0].classification.category, "Fuel");
}

// ============================================================================
// Categories, vendors, patterns
// ============================================================================

#[tokio::test]
async fn test_category_names_unique_ignoring_case() {
    let temp_dir = TempDir::new().unwrap();
    let store = create_test_store(&temp_dir);

    let pets = Category::new("Pet Care", CategoryType::Expense).with_description("Vet and food");
    store.create_category(&pets).await.unwrap();
    assert!(store
        .create_category(&Category::new("pet care", CategoryType::Expense))
        .await
        .is_err());

    let found = store.find_category("  PET CARE ").await.unwrap().unwrap();
    assert_eq!(found.id, pets.id);
    assert_eq!(found.description, "Vet and food");
    assert_eq!(found.category_type, CategoryType::Expense);
    assert_eq!(store.get_categories().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_vendor_upsert_keeps_use_count() {
    let temp_dir = TempDir::new().unwrap();
    let store = create_test_store(&temp_dir);

    store.save_vendor(&Vendor::new("Shell", "Groceries")).await.unwrap();
    store.increment_vendor_use("SHELL").await.unwrap();
    store.increment_vendor_use("shell").await.unwrap();

    // A corrected rule replaces the category, not the history
    store.save_vendor(&Vendor::new("Shell", "Fuel")).await.unwrap();
    let vendor = store.get_vendor("  Shell ").await.unwrap().unwrap();
    assert_eq!(vendor.category, "Fuel");
    assert_eq!(vendor.use_count, 2);

    assert!(store.increment_vendor_use("Chevron").await.is_err());
    assert!(store.delete_vendor("shell").unwrap());
    assert!(!store.delete_vendor("shell").unwrap());
    assert!(store.get_vendors().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_matching_check_patterns_by_priority() {
    let temp_dir = TempDir::new().unwrap();
    let store = create_test_store(&temp_dir);

    let rent = CheckPattern::new("Rent", "Rent")
        .with_amount_range(Decimal::new(190000, 2), Decimal::new(210000, 2))
        .with_day_range(1, 5)
        .with_boost(0.5);
    let large = CheckPattern::new("Large check", "Big Purchases")
        .with_amount_range(Decimal::new(100000, 2), Decimal::new(500000, 2))
        .with_boost(0.2);
    let mut retired = CheckPattern::new("Old rent", "Rent").with_boost(0.9);
    retired.active = false;
    for pattern in [&rent, &large, &retired] {
        store.insert_check_pattern(pattern).unwrap();
    }

    let matching = store
        .get_matching_check_patterns(&check(200000, date(3, 2)))
        .await
        .unwrap();
    let names: Vec<_> = matching.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Rent", "Large check"]);
    assert_eq!(matching[0].amount_min, Some(Decimal::new(190000, 2)));
    assert_eq!(matching[0].day_of_month_max, Some(5));

    // Outside the day window
    let late = store
        .get_matching_check_patterns(&check(200000, date(3, 20)))
        .await
        .unwrap();
    assert_eq!(late.len(), 1);

    // Not a check
    let card = tx("Landlord LLC", 200000, date(3, 2));
    assert!(store.get_matching_check_patterns(&card).await.unwrap().is_empty());

    store.increment_pattern_use(rent.id).await.unwrap();
    let all = store.get_check_patterns().await.unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all.iter().find(|p| p.id == rent.id).unwrap().use_count, 1);
}

// ============================================================================
// Progress
// ============================================================================

#[tokio::test]
async fn test_progress_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let store = create_test_store(&temp_dir);
    assert!(store.get_progress().await.unwrap().is_none());

    let mut progress = ClassificationProgress::start();
    progress.last_processed_id = Some(Uuid::new_v4());
    progress.last_processed_date = Some(date(3, 2));
    progress.total_processed = 12;
    store.save_progress(&progress).await.unwrap();

    progress.total_processed = 20;
    store.save_progress(&progress).await.unwrap();

    let saved = store.get_progress().await.unwrap().unwrap();
    assert_eq!(saved.last_processed_id, progress.last_processed_id);
    assert_eq!(saved.last_processed_date, Some(date(3, 2)));
    assert_eq!(saved.total_processed, 20);
    assert_eq!(saved.started_at.timestamp_micros(), progress.started_at.timestamp_micros());

    store.clear_progress().await.unwrap();
    assert!(store.get_progress().await.unwrap().is_none());
}

#[tokio::test]
async fn test_data_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    {
        let store = create_test_store(&temp_dir);
        store
            .create_category(&Category::new("Fuel", CategoryType::Expense))
            .await
            .unwrap();
        store.save_vendor(&Vendor::new("Shell", "Fuel")).await.unwrap();
    }

    // Reopening runs no migrations twice and keeps the data
    let store = create_test_store(&temp_dir);
    assert!(store.run_migrations().unwrap().applied.is_empty());
    assert_eq!(store.get_categories().await.unwrap().len(), 1);
    assert!(store.get_vendor("shell").await.unwrap().is_some());
}

// ============================================================================
// End to end
// ============================================================================

#[tokio::test]
async fn test_pipeline_over_duckdb() {
    let temp_dir = TempDir::new().unwrap();
    let store = create_test_store(&temp_dir);

    for (name, category_type) in [("Subscriptions", CategoryType::Expense), ("Groceries", CategoryType::Expense)] {
        store.create_category(&Category::new(name, category_type)).await.unwrap();
    }
    store.save_vendor(&Vendor::new("Netflix", "Subscriptions")).await.unwrap();

    let bill = tx("Netflix", 1599, date(3, 1));
    let groceries = tx("Safeway", 8800, date(3, 2));
    let unsure = tx("Corner Store", 1200, date(3, 3));
    for t in [&bill, &groceries, &unsure] {
        store.insert_transaction(t).unwrap();
    }

    let oracle = ScriptedOracle::new();
    oracle.rank("Safeway", "Groceries", 0.98);
    oracle.rank("Corner Store", "Groceries", 0.6);

    let service = ClassificationService::new(store.clone(), RankingClient::new(oracle.clone(), fast_retry()), config());
    let summary = service.run(None, &CancellationToken::new()).await.unwrap();

    assert_eq!(summary.rule_classified, 1);
    assert_eq!(summary.auto_classified, 1);
    assert_eq!(summary.pending, 1);
    assert_eq!(oracle.calls_for("Netflix"), 0);

    let classifications = store.get_classifications().await.unwrap();
    assert_eq!(classifications.len(), 2);
    assert_eq!(store.get_vendor("netflix").await.unwrap().unwrap().use_count, 1);

    let remaining = store.get_unclassified_transactions(None).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, unsure.id);
    // Inferred direction was written back
    assert_eq!(remaining[0].direction, Direction::Expense);
    assert!(store.get_progress().await.unwrap().is_none());
}
