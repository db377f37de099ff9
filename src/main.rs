use dotenvy::dotenv;
use ledger_store::{
    config::{categories::load_default_seed, database::LedgerOptions},
    core::{AggregationEngine, CategoryRepository, Ledger, TransactionRepository, seed},
    entities::TransactionType,
    errors::Result,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();
    info!("Attempted to load .env file.");

    // 3. Open the ledger and make sure the schema exists
    let options = LedgerOptions::from_env()?;
    let ledger = Ledger::open(&options)
        .await
        .inspect_err(|e| error!("Failed to open ledger: {}", e))?;

    // 4. Seed default categories into an empty store
    let categories = CategoryRepository::new(ledger.clone());
    let taxonomy = load_default_seed()?;
    seed::seed_default_categories(&categories, &taxonomy)
        .await
        .inspect_err(|e| error!("Failed to seed categories: {}", e))?;

    // 5. Report what the store holds
    let transactions = TransactionRepository::new(ledger.clone());
    let engine = AggregationEngine::new(ledger);
    let income = engine.total_by_type(TransactionType::Income).await?;
    let expense = engine.total_by_type(TransactionType::Expense).await?;
    info!(
        categories = categories.count().await?,
        transactions = transactions.list_all().await?.len(),
        income = income.unwrap_or_default(),
        expense = expense.unwrap_or_default(),
        "Ledger ready."
    );

    Ok(())
}
