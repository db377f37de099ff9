//! Reactive query layer.
//!
//! Every committed mutation bumps a per-table version counter held by the
//! [`InvalidationTracker`]. A [`LiveQuery`] runs on its own task: it snapshots the
//! versions, computes its result, delivers it, and then sleeps until one of its
//! dependency tables has a version newer than the snapshot. Several mutations
//! landing during one computation collapse into a single recomputation, and a
//! mutation is never missed because the snapshot is taken before the read starts.

use crate::errors::Result;
use std::future::Future;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Tables a live query can depend on
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Table {
    /// The `categories` table
    Categories,
    /// The `transactions` table
    Transactions,
}

impl Table {
    /// All tables, in index order
    pub const ALL: [Self; 2] = [Self::Categories, Self::Transactions];

    /// Stored table name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Categories => "categories",
            Self::Transactions => "transactions",
        }
    }

    const fn index(self) -> usize {
        match self {
            Self::Categories => 0,
            Self::Transactions => 1,
        }
    }
}

/// Commit counters, one per table
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TableVersions([u64; Table::ALL.len()]);

impl TableVersions {
    /// Number of committed mutations seen on `table`
    #[must_use]
    pub const fn get(&self, table: Table) -> u64 {
        self.0[table.index()]
    }

    fn bump(&mut self, table: Table) {
        let slot = &mut self.0[table.index()];
        *slot = slot.wrapping_add(1);
    }

    fn touched_since(&self, seen: &Self, tables: &[Table]) -> bool {
        tables.iter().any(|t| self.get(*t) != seen.get(*t))
    }
}

/// Publishes table-level dirty marks to every live query.
#[derive(Debug)]
pub struct InvalidationTracker {
    versions: watch::Sender<TableVersions>,
}

impl Default for InvalidationTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl InvalidationTracker {
    /// Creates a tracker with every table at version 0
    #[must_use]
    pub fn new() -> Self {
        let (versions, _) = watch::channel(TableVersions::default());
        Self { versions }
    }

    /// Marks `table` as changed. Called after the mutation has committed.
    pub fn mark_dirty(&self, table: Table) {
        self.versions.send_modify(|v| v.bump(table));
        trace!(table = table.name(), "table marked dirty");
    }

    /// Current version counters
    #[must_use]
    pub fn versions(&self) -> TableVersions {
        *self.versions.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<TableVersions> {
        self.versions.subscribe()
    }

    /// Registers a live query over `tables`.
    ///
    /// `query` is invoked once immediately and again after every invalidation of
    /// one of `tables`. Results, including failures, are delivered in the order the
    /// computations complete. Must be called from within a tokio runtime.
    pub fn observe<T, F, Fut>(&self, tables: &[Table], buffer: usize, query: F) -> LiveQuery<T>
    where
        T: Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let (results, rx) = mpsc::channel(buffer.max(1));
        let (state_tx, state) = watch::channel(LiveQueryState::Registered);
        let token = CancellationToken::new();
        let deps = tables.to_vec();
        let mut versions = self.subscribe();
        let stop = token.clone();

        tokio::spawn(async move {
            loop {
                let seen = *versions.borrow_and_update();
                state_tx.send_replace(LiveQueryState::Computing);

                let result = tokio::select! {
                    biased;
                    () = stop.cancelled() => break,
                    result = query() => result,
                };

                tokio::select! {
                    biased;
                    () = stop.cancelled() => break,
                    sent = results.send(result) => if sent.is_err() { break },
                }
                state_tx.send_replace(LiveQueryState::Delivered);

                let tracker_alive = tokio::select! {
                    biased;
                    () = stop.cancelled() => break,
                    () = results.closed() => break,
                    changed = versions.wait_for(|v| v.touched_since(&seen, &deps)) => changed.is_ok(),
                };
                if !tracker_alive {
                    break;
                }
                debug!(tables = ?deps, "live query invalidated");
            }
            state_tx.send_replace(LiveQueryState::Cancelled);
        });

        LiveQuery {
            results: rx,
            state,
            token,
            tables: tables.to_vec(),
        }
    }
}

/// Lifecycle of a live query
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LiveQueryState {
    /// Created, first computation not started yet
    Registered,
    /// A computation is in flight
    Computing,
    /// The latest result has been handed to the delivery buffer
    Delivered,
    /// Stopped; no further results will be produced
    Cancelled,
}

/// Subscriber side of a live query.
///
/// Dropping the handle cancels the query.
#[derive(Debug)]
pub struct LiveQuery<T> {
    results: mpsc::Receiver<Result<T>>,
    state: watch::Receiver<LiveQueryState>,
    token: CancellationToken,
    tables: Vec<Table>,
}

impl<T> LiveQuery<T> {
    /// Waits for the next result. Returns `None` once the query is cancelled and
    /// every buffered result has been consumed.
    pub async fn next(&mut self) -> Option<Result<T>> {
        self.results.recv().await
    }

    /// Returns a buffered result without waiting
    pub fn try_next(&mut self) -> Option<Result<T>> {
        self.results.try_recv().ok()
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> LiveQueryState {
        *self.state.borrow()
    }

    /// Tables whose mutations re-run this query
    #[must_use]
    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    /// Stops the query. Idempotent.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether [`cancel`](Self::cancel) has been called
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl<T> Drop for LiveQuery<T> {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Result of a one-shot read that may be cancelled
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome<T> {
    /// The read ran to completion
    Completed(T),
    /// The read was cancelled before it completed; nothing was produced
    Cancelled,
}

impl<T> ReadOutcome<T> {
    /// The completed value, if any
    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Cancelled => None,
        }
    }

    /// Whether the read was cancelled
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Runs `read` unless `token` fires first.
///
/// The token is checked before the read starts and then raced against it at every
/// await point. A cancelled read future is dropped, which returns any connection it
/// had checked out to the pool.
pub async fn read_cancellable<T, Fut>(token: &CancellationToken, read: Fut) -> Result<ReadOutcome<T>>
where
    Fut: Future<Output = Result<T>>,
{
    if token.is_cancelled() {
        return Ok(ReadOutcome::Cancelled);
    }

    tokio::select! {
        biased;
        () = token.cancelled() => Ok(ReadOutcome::Cancelled),
        result = read => result.map(ReadOutcome::Completed),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::errors::Error;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::timeout;

    fn counting_query(
        tracker: &InvalidationTracker,
        tables: &[Table],
    ) -> (LiveQuery<usize>, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let live = tracker.observe(tables, 8, move || {
            let counter = Arc::clone(&counter);
            async move { Ok(counter.fetch_add(1, Ordering::SeqCst) + 1) }
        });
        (live, runs)
    }

    #[tokio::test]
    async fn test_initial_delivery_then_one_per_invalidation() -> Result<()> {
        let tracker = InvalidationTracker::new();
        let (mut live, _) = counting_query(&tracker, &[Table::Categories]);

        assert_eq!(live.next().await.unwrap()?, 1);
        tracker.mark_dirty(Table::Categories);
        assert_eq!(live.next().await.unwrap()?, 2);

        let quiet = timeout(Duration::from_millis(50), live.next()).await;
        assert!(quiet.is_err(), "no delivery without a mutation");
        Ok(())
    }

    #[tokio::test]
    async fn test_unrelated_table_does_not_invalidate() -> Result<()> {
        let tracker = InvalidationTracker::new();
        let (mut live, runs) = counting_query(&tracker, &[Table::Categories]);

        assert_eq!(live.next().await.unwrap()?, 1);
        tracker.mark_dirty(Table::Transactions);

        let quiet = timeout(Duration::from_millis(50), live.next()).await;
        assert!(quiet.is_err());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_mutation_during_computation_triggers_recompute() -> Result<()> {
        let tracker = Arc::new(InvalidationTracker::new());
        let gate = Arc::new(tokio::sync::Notify::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let (q_gate, q_runs, q_tracker) =
            (Arc::clone(&gate), Arc::clone(&runs), Arc::clone(&tracker));
        let mut live = tracker.observe(&[Table::Transactions], 8, move || {
            let gate = Arc::clone(&q_gate);
            let runs = Arc::clone(&q_runs);
            let tracker = Arc::clone(&q_tracker);
            async move {
                let run = runs.fetch_add(1, Ordering::SeqCst) + 1;
                if run == 1 {
                    // A write commits while the first read is still running.
                    tracker.mark_dirty(Table::Transactions);
                    tracker.mark_dirty(Table::Transactions);
                    gate.notify_one();
                }
                Ok(run)
            }
        });

        assert_eq!(live.next().await.unwrap()?, 1);
        gate.notified().await;
        assert_eq!(live.next().await.unwrap()?, 2);
        let quiet = timeout(Duration::from_millis(50), live.next()).await;
        assert!(quiet.is_err(), "coalesced invalidations recompute once");
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_computation_is_delivered_and_query_survives() -> Result<()> {
        let tracker = InvalidationTracker::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let mut live = tracker.observe(&[Table::Categories], 4, move || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(Error::Config {
                        message: "boom".to_string(),
                    })
                } else {
                    Ok(())
                }
            }
        });

        assert!(live.next().await.unwrap().is_err());
        tracker.mark_dirty(Table::Categories);
        assert!(live.next().await.unwrap().is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn test_cancel_stops_delivery() -> Result<()> {
        let tracker = InvalidationTracker::new();
        let (mut live, runs) = counting_query(&tracker, &[Table::Categories]);
        assert_eq!(live.next().await.unwrap()?, 1);
        assert_eq!(live.state(), LiveQueryState::Delivered);

        live.cancel();
        assert!(live.next().await.is_none());
        assert_eq!(live.state(), LiveQueryState::Cancelled);

        tracker.mark_dirty(Table::Categories);
        tokio::task::yield_now().await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_read_cancellable_outcomes() -> Result<()> {
        let token = CancellationToken::new();
        let done = read_cancellable(&token, async { Ok(7) }).await?;
        assert_eq!(done, ReadOutcome::Completed(7));

        // Cancelling after completion changes nothing.
        token.cancel();
        assert_eq!(done.completed(), Some(7));

        let skipped = read_cancellable(&token, async { Ok(8) }).await?;
        assert!(skipped.is_cancelled());
        Ok(())
    }

    #[tokio::test]
    async fn test_read_cancelled_while_blocked() -> Result<()> {
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let outcome: ReadOutcome<()> =
            read_cancellable(&token, std::future::pending::<Result<()>>()).await?;
        assert!(outcome.is_cancelled());
        Ok(())
    }
}
