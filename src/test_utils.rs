//! Shared test utilities for the ledger store.
//!
//! This module provides helpers for opening throwaway in-memory ledgers and
//! building categories and transactions with sensible defaults.

use crate::{
    core::{CategoryRepository, Ledger, TransactionRepository},
    entities::{TransactionType, category, transaction},
    errors::Result,
};

/// 2023-11-14T22:13:20Z, a fixed reference timestamp in milliseconds
pub const DAY_ZERO: i64 = 1_700_000_000_000;

/// Opens a private in-memory ledger with all tables initialized.
/// This is the standard setup for all async tests.
pub async fn setup_test_ledger() -> Result<Ledger> {
    Ledger::open_in_memory().await
}

/// Sets up a ledger and a category repository bound to it.
pub async fn setup_category_repo() -> Result<(Ledger, CategoryRepository)> {
    let ledger = setup_test_ledger().await?;
    let repo = CategoryRepository::new(ledger.clone());
    Ok((ledger, repo))
}

/// Sets up a ledger and a transaction repository bound to it.
pub async fn setup_transaction_repo() -> Result<(Ledger, TransactionRepository)> {
    let ledger = setup_test_ledger().await?;
    let repo = TransactionRepository::new(ledger.clone());
    Ok((ledger, repo))
}

/// Builds a top-level category that has not been stored yet.
///
/// # Defaults
/// * `id`: 0 (assigned on insert)
/// * `icon`: `"ic_test"`
/// * `color`: `"#FFFFFF"`
/// * `sort_order`: 0
/// * `is_system`: false
/// * `is_active`: true
pub fn sample_category(name: &str, kind: TransactionType) -> category::Model {
    category::Model {
        id: 0,
        name: name.to_string(),
        icon: "ic_test".to_string(),
        color: "#FFFFFF".to_string(),
        kind,
        parent_id: None,
        sort_order: 0,
        is_system: false,
        is_active: true,
    }
}

/// Builds a subcategory of `parent_id`.
pub fn sample_child(name: &str, kind: TransactionType, parent_id: i64) -> category::Model {
    category::Model {
        parent_id: Some(parent_id),
        ..sample_category(name, kind)
    }
}

/// Builds a top-level category with an explicit position.
pub fn sample_ordered(name: &str, kind: TransactionType, sort_order: i32) -> category::Model {
    category::Model {
        sort_order,
        ..sample_category(name, kind)
    }
}

/// Builds a transaction that has not been stored yet.
///
/// # Defaults
/// * `id`: 0 (assigned on insert)
/// * `category`: `"Other"` with no category ids
/// * `description`: `"Test transaction"`
/// * `note`: empty
/// * `ai_parsed`: false
/// * `image_path`: None
pub fn sample_transaction(amount: f64, kind: TransactionType, date: i64) -> transaction::Model {
    transaction::Model {
        id: 0,
        amount,
        kind,
        category: "Other".to_string(),
        category_id: None,
        sub_category_id: None,
        description: "Test transaction".to_string(),
        date,
        note: String::new(),
        ai_parsed: false,
        image_path: None,
    }
}
