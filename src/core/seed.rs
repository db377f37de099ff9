//! Populates an empty ledger with the default category taxonomy.

use crate::{
    config::categories::{CategorySeed, SeedConfig},
    core::category::{CategoryRepository, insert_on},
    core::live::Table,
    entities::{Category, TransactionType, category},
    errors::Result,
};
use sea_orm::{ConnectionTrait, prelude::*};
use tracing::{info, instrument};

fn system_category(
    seed: &CategorySeed,
    name: &str,
    kind: TransactionType,
    sort_order: i32,
) -> category::Model {
    category::Model {
        id: 0,
        name: name.to_string(),
        icon: seed.icon.clone(),
        color: seed.color.clone(),
        kind,
        parent_id: None,
        sort_order,
        is_system: true,
        is_active: true,
    }
}

async fn insert_tree<C>(db: &C, seeds: &[CategorySeed], kind: TransactionType) -> Result<usize>
where
    C: ConnectionTrait,
{
    let mut inserted = 0;
    for seed in seeds {
        let parent = system_category(seed, &seed.name, kind, seed.sort_order);
        let parent_id = insert_on(db, parent).await?;
        inserted += 1;

        for (index, child) in (1..).zip(&seed.children) {
            let mut model = system_category(seed, child, kind, index);
            model.parent_id = Some(parent_id);
            insert_on(db, model).await?;
            inserted += 1;
        }
    }
    Ok(inserted)
}

/// Inserts `seed` when the category table is empty and returns the number of rows
/// written.
///
/// Returns 0 without writing anything when any category, active or not, already
/// exists. The whole taxonomy commits together or not at all.
#[instrument(skip(repo, seed), fields(rows = seed.row_count()))]
pub async fn seed_default_categories(
    repo: &CategoryRepository,
    seed: &SeedConfig,
) -> Result<usize> {
    let txn = repo.store().begin_write(Table::Categories).await?;
    if Category::find().count(txn.conn()).await? > 0 {
        info!("Categories already present, skipping seed.");
        return Ok(0);
    }

    let mut inserted = insert_tree(txn.conn(), &seed.expense, TransactionType::Expense).await?;
    inserted += insert_tree(txn.conn(), &seed.income, TransactionType::Income).await?;
    txn.commit().await?;

    info!(inserted, "Seeded default categories.");
    Ok(inserted)
}
