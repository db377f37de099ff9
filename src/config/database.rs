//! Database configuration module for the ledger store.
//!
//! This module handles `SQLite` connection setup and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with
//! `Schema::create_table_from_entity`, so the stored layout always matches the Rust
//! structs. The secondary indexes backing the type, parent, date and category
//! lookups are created alongside the tables.

use crate::entities::{Category, CategoryColumn, Transaction, TransactionColumn};
use crate::errors::{Error, Result};
use sea_orm::sea_query::{Index, IndexCreateStatement};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Schema};
use std::time::Duration;
use tracing::{debug, info, instrument};

const DEFAULT_DATABASE_URL: &str = "sqlite://data/ledger.sqlite?mode=rwc";
const DEFAULT_MAX_CONNECTIONS: u32 = 4;
const DEFAULT_LIVE_BUFFER: usize = 16;
/// Roughly a century; in-memory connections must outlive the ledger
const MEMORY_CONNECTION_LIFETIME: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Settings for opening a ledger store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerOptions {
    /// `SeaORM` connection URL
    pub database_url: String,
    /// Upper bound on pooled connections (forced to 1 for in-memory databases)
    pub max_connections: u32,
    /// Number of undelivered results buffered per live query
    pub live_buffer: usize,
}

impl Default for LedgerOptions {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            live_buffer: DEFAULT_LIVE_BUFFER,
        }
    }
}

impl LedgerOptions {
    /// Options for a private in-memory database, used by tests and tools.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            max_connections: 1,
            ..Self::default()
        }
    }

    /// Reads `DATABASE_URL`, `LEDGER_MAX_CONNECTIONS` and `LEDGER_LIVE_BUFFER`
    /// from the environment, falling back to defaults for unset variables.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let database_url =
            std::env::var("DATABASE_URL").unwrap_or(defaults.database_url);
        let max_connections = parse_env("LEDGER_MAX_CONNECTIONS")?
            .unwrap_or(defaults.max_connections);
        let live_buffer = parse_env("LEDGER_LIVE_BUFFER")?.unwrap_or(defaults.live_buffer);

        Ok(Self {
            database_url,
            max_connections,
            live_buffer,
        })
    }

    /// Whether the URL points at a private in-memory database
    #[must_use]
    pub fn is_memory(&self) -> bool {
        self.database_url.contains(":memory:") || self.database_url.contains("mode=memory")
    }

    /// Filesystem path of a file-backed `sqlite://` URL, without query parameters
    #[must_use]
    pub fn file_path(&self) -> Option<&std::path::Path> {
        if self.is_memory() {
            return None;
        }
        let rest = self.database_url.strip_prefix("sqlite://")?;
        let path = rest.split('?').next().unwrap_or(rest);
        (!path.is_empty()).then(|| std::path::Path::new(path))
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map(Some).map_err(|e| Error::Config {
            message: format!("Invalid value for {key}: {e}"),
        }),
        Err(_) => Ok(None),
    }
}

/// Opens a connection pool for the given options.
///
/// Every pooled connection to `sqlite::memory:` would get its own empty database,
/// so in-memory URLs always use a single connection that is never retired.
#[instrument(skip(options), fields(url = %options.database_url))]
pub async fn create_connection(options: &LedgerOptions) -> Result<DatabaseConnection> {
    if let Some(parent) = options.file_path().and_then(|path| path.parent()) {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    Database::connect(connect_options(options))
        .await
        .map_err(Into::into)
}

fn connect_options(options: &LedgerOptions) -> ConnectOptions {
    let mut connect = ConnectOptions::new(options.database_url.clone());
    if options.is_memory() {
        // The pool's idle reaper would replace the connection with a fresh, empty
        // database.
        connect
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(MEMORY_CONNECTION_LIFETIME)
            .max_lifetime(MEMORY_CONNECTION_LIFETIME);
    } else {
        connect
            .max_connections(options.max_connections.max(1))
            .min_connections(1);
    }
    debug!(
        max_connections = connect.get_max_connections(),
        "Opening ledger database"
    );
    connect
}

/// Creates both ledger tables and their secondary indexes if they do not exist.
#[instrument(skip(db))]
pub async fn create_tables<C>(db: &C) -> Result<()>
where
    C: ConnectionTrait,
{
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut category_table = schema.create_table_from_entity(Category);
    category_table.if_not_exists();
    let mut transaction_table = schema.create_table_from_entity(Transaction);
    transaction_table.if_not_exists();

    db.execute(builder.build(&category_table)).await?;
    db.execute(builder.build(&transaction_table)).await?;

    for index in secondary_indexes() {
        db.execute(builder.build(&index)).await?;
    }

    info!("Ledger tables ensured.");
    Ok(())
}

fn secondary_indexes() -> Vec<IndexCreateStatement> {
    vec![
        Index::create()
            .name("idx_categories_type")
            .table(Category)
            .col(CategoryColumn::Kind)
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name("idx_categories_parent_id")
            .table(Category)
            .col(CategoryColumn::ParentId)
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name("idx_transactions_type")
            .table(Transaction)
            .col(TransactionColumn::Kind)
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name("idx_transactions_date")
            .table(Transaction)
            .col(TransactionColumn::Date)
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name("idx_transactions_category_id")
            .table(Transaction)
            .col(TransactionColumn::CategoryId)
            .if_not_exists()
            .to_owned(),
    ]
}
