//! The ledger store handle.
//!
//! [`Ledger`] bundles the database connection, the single-writer lock and the
//! invalidation tracker. It is cheap to clone and is injected into every
//! repository and the aggregation engine; there is no global state.

use crate::config::database::{LedgerOptions, create_connection, create_tables};
use crate::core::live::{
    InvalidationTracker, LiveQuery, ReadOutcome, Table, read_cancellable,
};
use crate::errors::Result;
use sea_orm::{DatabaseConnection, DatabaseTransaction, TransactionTrait};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, trace};

#[derive(Debug)]
struct Inner {
    db: DatabaseConnection,
    writer: Mutex<()>,
    invalidation: InvalidationTracker,
    live_buffer: usize,
}

/// Shared handle to one ledger database
#[derive(Debug, Clone)]
pub struct Ledger {
    inner: Arc<Inner>,
}

impl Ledger {
    /// Opens the database described by `options` and ensures the schema exists.
    #[instrument(skip(options), fields(url = %options.database_url))]
    pub async fn open(options: &LedgerOptions) -> Result<Self> {
        let db = create_connection(options).await?;
        create_tables(&db).await?;
        info!("Ledger store opened.");
        Ok(Self::from_connection(db, options.live_buffer))
    }

    /// Opens a private in-memory ledger
    pub async fn open_in_memory() -> Result<Self> {
        Self::open(&LedgerOptions::in_memory()).await
    }

    /// Wraps an existing connection whose schema is already in place
    #[must_use]
    pub fn from_connection(db: DatabaseConnection, live_buffer: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                db,
                writer: Mutex::new(()),
                invalidation: InvalidationTracker::new(),
                live_buffer,
            }),
        }
    }

    /// Connection used for reads
    #[must_use]
    pub fn db(&self) -> &DatabaseConnection {
        &self.inner.db
    }

    /// The tracker that live queries listen on
    #[must_use]
    pub fn invalidation(&self) -> &InvalidationTracker {
        &self.inner.invalidation
    }

    /// Starts the exclusive write transaction for a mutation of `table`.
    ///
    /// Waits for any other writer to finish first. Dropping the returned
    /// [`WriteTxn`] without calling [`WriteTxn::commit`] rolls everything back.
    pub async fn begin_write(&self, table: Table) -> Result<WriteTxn<'_>> {
        let permit = self.inner.writer.lock().await;
        let txn = self.inner.db.begin().await?;
        trace!(table = table.name(), "write transaction started");
        Ok(WriteTxn {
            txn,
            table,
            ledger: self,
            _permit: permit,
        })
    }

    /// Registers a live query that re-runs whenever one of `tables` is written.
    pub fn observe<T, F, Fut>(&self, tables: &[Table], query: F) -> LiveQuery<T>
    where
        T: Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.inner
            .invalidation
            .observe(tables, self.inner.live_buffer, query)
    }

    /// Runs a one-shot read that stops early if `token` is cancelled.
    pub async fn read_cancellable<T, Fut>(
        &self,
        token: &CancellationToken,
        read: Fut,
    ) -> Result<ReadOutcome<T>>
    where
        Fut: Future<Output = Result<T>>,
    {
        read_cancellable(token, read).await
    }
}

/// An open write transaction holding the ledger's writer lock.
pub struct WriteTxn<'a> {
    txn: DatabaseTransaction,
    table: Table,
    ledger: &'a Ledger,
    _permit: MutexGuard<'a, ()>,
}

impl WriteTxn<'_> {
    /// Connection to run the mutation's statements on
    #[must_use]
    pub const fn conn(&self) -> &DatabaseTransaction {
        &self.txn
    }

    /// Commits, releases the writer lock and then invalidates live queries on the
    /// written table.
    pub async fn commit(self) -> Result<()> {
        let Self {
            txn,
            table,
            ledger,
            _permit: permit,
        } = self;
        txn.commit().await?;
        drop(permit);
        ledger.invalidation().mark_dirty(table);
        Ok(())
    }
}
