//! Transaction business logic - CRUD and listing over income/expense records.
//!
//! Mutations run in the ledger's exclusive write transaction and invalidate live
//! queries on `transactions` after commit. Amounts are validated before anything
//! is written; category references are stored as given, since the denormalized
//! `category` name is the durable link.

use crate::{
    core::live::{LiveQuery, Table},
    core::store::Ledger,
    entities::{Transaction, TransactionType, transaction},
    errors::{Error, Result},
};
use sea_orm::{ActiveValue::NotSet, QueryOrder, QuerySelect, Set, prelude::*};
use std::future::Future;
use tracing::{debug, instrument};

/// Transaction operations bound to one ledger
#[derive(Debug, Clone)]
pub struct TransactionRepository {
    store: Ledger,
}

fn validate_amount(amount: f64) -> Result<()> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(Error::InvalidAmount { amount });
    }
    Ok(())
}

fn insert_form(model: transaction::Model) -> transaction::ActiveModel {
    transaction::ActiveModel {
        id: if model.id == 0 { NotSet } else { Set(model.id) },
        amount: Set(model.amount),
        kind: Set(model.kind),
        category: Set(model.category),
        category_id: Set(model.category_id),
        sub_category_id: Set(model.sub_category_id),
        description: Set(model.description),
        date: Set(model.date),
        note: Set(model.note),
        ai_parsed: Set(model.ai_parsed),
        image_path: Set(model.image_path),
    }
}

impl TransactionRepository {
    /// Creates a repository writing to `store`
    #[must_use]
    pub const fn new(store: Ledger) -> Self {
        Self { store }
    }

    /// The ledger this repository writes to
    #[must_use]
    pub const fn store(&self) -> &Ledger {
        &self.store
    }

    /// Inserts a transaction and returns its id.
    ///
    /// An id of 0 asks the store to assign one. The amount must be finite and
    /// non-negative; the direction of money is carried by `kind`.
    #[instrument(skip(self, transaction), fields(kind = %transaction.kind, date = transaction.date))]
    pub async fn insert(&self, transaction: transaction::Model) -> Result<i64> {
        validate_amount(transaction.amount)?;

        let txn = self.store.begin_write(Table::Transactions).await?;
        let result = Transaction::insert(insert_form(transaction))
            .exec(txn.conn())
            .await?;
        txn.commit().await?;
        debug!(id = result.last_insert_id, "transaction inserted");
        Ok(result.last_insert_id)
    }

    /// Replaces every column of the row with `transaction.id`.
    ///
    /// Returns the number of rows affected, 0 when the id does not exist.
    #[instrument(skip(self, transaction), fields(id = transaction.id))]
    pub async fn update(&self, transaction: transaction::Model) -> Result<u64> {
        validate_amount(transaction.amount)?;
        let id = transaction.id;

        let mut form = insert_form(transaction);
        form.id = NotSet;
        let txn = self.store.begin_write(Table::Transactions).await?;
        let result = Transaction::update_many()
            .set(form)
            .filter(transaction::Column::Id.eq(id))
            .exec(txn.conn())
            .await?;
        txn.commit().await?;
        Ok(result.rows_affected)
    }

    /// Deletes `transaction` by id.
    pub async fn delete(&self, transaction: &transaction::Model) -> Result<u64> {
        self.delete_by_id(transaction.id).await
    }

    /// Deletes the transaction with `id`.
    #[instrument(skip(self))]
    pub async fn delete_by_id(&self, id: i64) -> Result<u64> {
        let txn = self.store.begin_write(Table::Transactions).await?;
        let result = Transaction::delete_by_id(id).exec(txn.conn()).await?;
        txn.commit().await?;
        Ok(result.rows_affected)
    }

    /// Deletes every transaction whose id is in `ids`, in one transaction.
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn delete_by_ids(&self, ids: &[i64]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let txn = self.store.begin_write(Table::Transactions).await?;
        let result = Transaction::delete_many()
            .filter(transaction::Column::Id.is_in(ids.iter().copied()))
            .exec(txn.conn())
            .await?;
        txn.commit().await?;
        Ok(result.rows_affected)
    }

    /// Finds a transaction by id.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<transaction::Model>> {
        Transaction::find_by_id(id)
            .one(self.store.db())
            .await
            .map_err(Into::into)
    }

    /// Every transaction, newest first.
    pub async fn list_all(&self) -> Result<Vec<transaction::Model>> {
        Transaction::find()
            .order_by_desc(transaction::Column::Date)
            .order_by_desc(transaction::Column::Id)
            .all(self.store.db())
            .await
            .map_err(Into::into)
    }

    /// Transactions of one type, newest first.
    pub async fn list_by_type(&self, kind: TransactionType) -> Result<Vec<transaction::Model>> {
        Transaction::find()
            .filter(transaction::Column::Kind.eq(kind))
            .order_by_desc(transaction::Column::Date)
            .order_by_desc(transaction::Column::Id)
            .all(self.store.db())
            .await
            .map_err(Into::into)
    }

    /// Transactions dated within `[start, end]`, newest first.
    pub async fn list_by_date_range(&self, start: i64, end: i64) -> Result<Vec<transaction::Model>> {
        Transaction::find()
            .filter(transaction::Column::Date.between(start, end))
            .order_by_desc(transaction::Column::Date)
            .order_by_desc(transaction::Column::Id)
            .all(self.store.db())
            .await
            .map_err(Into::into)
    }

    /// Transactions of one type dated within `[start, end]`, newest first.
    pub async fn list_by_type_and_date_range(
        &self,
        kind: TransactionType,
        start: i64,
        end: i64,
    ) -> Result<Vec<transaction::Model>> {
        Transaction::find()
            .filter(transaction::Column::Kind.eq(kind))
            .filter(transaction::Column::Date.between(start, end))
            .order_by_desc(transaction::Column::Date)
            .order_by_desc(transaction::Column::Id)
            .all(self.store.db())
            .await
            .map_err(Into::into)
    }

    /// Number of transactions dated within `[start, end]`.
    pub async fn count_by_date_range(&self, start: i64, end: i64) -> Result<u64> {
        Transaction::find()
            .filter(transaction::Column::Date.between(start, end))
            .count(self.store.db())
            .await
            .map_err(Into::into)
    }

    /// Up to `limit` distinct non-empty notes, most recently dated first.
    pub async fn recent_notes(&self, limit: usize) -> Result<Vec<String>> {
        self.distinct_notes(Transaction::find(), limit).await
    }

    /// Like [`recent_notes`](Self::recent_notes), restricted to one category name.
    pub async fn recent_notes_by_category(
        &self,
        category: &str,
        limit: usize,
    ) -> Result<Vec<String>> {
        let select = Transaction::find().filter(transaction::Column::Category.eq(category));
        self.distinct_notes(select, limit).await
    }

    /// Groups `select` by note and keeps the `limit` notes with the latest dates.
    async fn distinct_notes(
        &self,
        select: Select<Transaction>,
        limit: usize,
    ) -> Result<Vec<String>> {
        select
            .select_only()
            .column(transaction::Column::Note)
            .filter(transaction::Column::Note.ne(""))
            .group_by(transaction::Column::Note)
            .order_by_desc(transaction::Column::Date.max())
            .order_by_desc(transaction::Column::Id.max())
            .limit(u64::try_from(limit).unwrap_or(u64::MAX))
            .into_tuple()
            .all(self.store.db())
            .await
            .map_err(Into::into)
    }

    fn observe<T, F, Fut>(&self, query: F) -> LiveQuery<T>
    where
        T: Send + 'static,
        F: Fn(Self) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let repo = self.clone();
        self.store
            .observe(&[Table::Transactions], move || query(repo.clone()))
    }

    /// Live form of [`get_by_id`](Self::get_by_id)
    pub fn observe_by_id(&self, id: i64) -> LiveQuery<Option<transaction::Model>> {
        self.observe(move |repo| async move { repo.get_by_id(id).await })
    }

    /// Live form of [`list_all`](Self::list_all)
    pub fn observe_all(&self) -> LiveQuery<Vec<transaction::Model>> {
        self.observe(|repo| async move { repo.list_all().await })
    }

    /// Live form of [`list_by_type`](Self::list_by_type)
    pub fn observe_by_type(&self, kind: TransactionType) -> LiveQuery<Vec<transaction::Model>> {
        self.observe(move |repo| async move { repo.list_by_type(kind).await })
    }

    /// Live form of [`list_by_date_range`](Self::list_by_date_range)
    pub fn observe_by_date_range(
        &self,
        start: i64,
        end: i64,
    ) -> LiveQuery<Vec<transaction::Model>> {
        self.observe(move |repo| async move { repo.list_by_date_range(start, end).await })
    }

    /// Live form of [`list_by_type_and_date_range`](Self::list_by_type_and_date_range)
    pub fn observe_by_type_and_date_range(
        &self,
        kind: TransactionType,
        start: i64,
        end: i64,
    ) -> LiveQuery<Vec<transaction::Model>> {
        self.observe(move |repo| async move {
            repo.list_by_type_and_date_range(kind, start, end).await
        })
    }

    /// Live form of [`count_by_date_range`](Self::count_by_date_range)
    pub fn observe_count_by_date_range(&self, start: i64, end: i64) -> LiveQuery<u64> {
        self.observe(move |repo| async move { repo.count_by_date_range(start, end).await })
    }

    /// Live form of [`recent_notes`](Self::recent_notes)
    pub fn observe_recent_notes(&self, limit: usize) -> LiveQuery<Vec<String>> {
        self.observe(move |repo| async move { repo.recent_notes(limit).await })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::core::category::CategoryRepository;
    use crate::core::live::ReadOutcome;
    use crate::core::aggregate::DAY_MILLIS;
    use crate::test_utils::*;
    use std::collections::HashSet;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_insert_round_trip() -> Result<()> {
        let (_, repo) = setup_transaction_repo().await?;

        let mut original = sample_transaction(12.5, TransactionType::Expense, DAY_ZERO);
        original.category_id = Some(3);
        original.sub_category_id = Some(4);
        original.note = "with friends".to_string();
        original.ai_parsed = true;
        original.image_path = Some("receipts/2024/01.jpg".to_string());

        let id = repo.insert(original.clone()).await?;
        assert!(id > 0);

        let stored = repo.get_by_id(id).await?.unwrap();
        assert_eq!(stored, transaction::Model { id, ..original });
        Ok(())
    }

    #[tokio::test]
    async fn test_insert_assigns_unique_ids() -> Result<()> {
        let (_, repo) = setup_transaction_repo().await?;
        let mut ids = HashSet::new();
        for i in 0..5 {
            let id = repo
                .insert(sample_transaction(1.0, TransactionType::Expense, DAY_ZERO + i))
                .await?;
            assert!(id > 0);
            assert!(ids.insert(id));
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_insert_rejects_invalid_amounts() -> Result<()> {
        let (_, repo) = setup_transaction_repo().await?;

        for amount in [-1.0, f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let result = repo
                .insert(sample_transaction(amount, TransactionType::Expense, DAY_ZERO))
                .await;
            assert!(matches!(result, Err(Error::InvalidAmount { .. })));
        }
        assert!(repo.list_all().await?.is_empty());

        // Zero is a valid amount.
        repo.insert(sample_transaction(0.0, TransactionType::Income, DAY_ZERO))
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_explicit_id_is_constraint_violation() -> Result<()> {
        let (_, repo) = setup_transaction_repo().await?;
        let mut tx = sample_transaction(5.0, TransactionType::Expense, DAY_ZERO);
        tx.id = 9;
        repo.insert(tx.clone()).await?;

        let result = repo.insert(tx).await;
        assert!(matches!(result, Err(Error::ConstraintViolation { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_update_and_delete_report_rows_affected() -> Result<()> {
        let (_, repo) = setup_transaction_repo().await?;
        let id = repo
            .insert(sample_transaction(20.0, TransactionType::Expense, DAY_ZERO))
            .await?;

        let mut changed = repo.get_by_id(id).await?.unwrap();
        changed.amount = 25.0;
        changed.description = "corrected".to_string();
        assert_eq!(repo.update(changed.clone()).await?, 1);
        assert_eq!(repo.get_by_id(id).await?, Some(changed.clone()));

        let mut missing = changed.clone();
        missing.id = 777;
        assert_eq!(repo.update(missing.clone()).await?, 0);
        assert_eq!(repo.delete(&missing).await?, 0);

        assert_eq!(repo.delete(&changed).await?, 1);
        assert!(repo.get_by_id(id).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_by_ids() -> Result<()> {
        let (_, repo) = setup_transaction_repo().await?;
        let a = repo
            .insert(sample_transaction(1.0, TransactionType::Expense, DAY_ZERO))
            .await?;
        let b = repo
            .insert(sample_transaction(2.0, TransactionType::Expense, DAY_ZERO))
            .await?;
        let c = repo
            .insert(sample_transaction(3.0, TransactionType::Expense, DAY_ZERO))
            .await?;

        assert_eq!(repo.delete_by_ids(&[]).await?, 0);
        assert_eq!(repo.delete_by_ids(&[a, c, 999]).await?, 2);
        let remaining: Vec<_> = repo.list_all().await?.into_iter().map(|t| t.id).collect();
        assert_eq!(remaining, vec![b]);
        Ok(())
    }

    #[tokio::test]
    async fn test_listing_order_and_filters() -> Result<()> {
        let (_, repo) = setup_transaction_repo().await?;
        repo.insert(sample_transaction(1.0, TransactionType::Expense, DAY_ZERO))
            .await?;
        repo.insert(sample_transaction(2.0, TransactionType::Income, DAY_ZERO + DAY_MILLIS))
            .await?;
        repo.insert(sample_transaction(3.0, TransactionType::Expense, DAY_ZERO + 2 * DAY_MILLIS))
            .await?;

        let dates: Vec<_> = repo.list_all().await?.iter().map(|t| t.date).collect();
        assert_eq!(dates, vec![DAY_ZERO + 2 * DAY_MILLIS, DAY_ZERO + DAY_MILLIS, DAY_ZERO]);

        let expenses = repo.list_by_type(TransactionType::Expense).await?;
        assert_eq!(expenses.len(), 2);
        assert!(expenses.iter().all(|t| t.kind == TransactionType::Expense));

        // Both bounds are inclusive.
        let ranged = repo
            .list_by_date_range(DAY_ZERO, DAY_ZERO + DAY_MILLIS)
            .await?;
        let amounts: Vec<_> = ranged.iter().map(|t| t.amount).collect();
        assert_eq!(amounts, vec![2.0, 1.0]);

        let typed = repo
            .list_by_type_and_date_range(TransactionType::Expense, DAY_ZERO, DAY_ZERO + DAY_MILLIS)
            .await?;
        assert_eq!(typed.len(), 1);
        assert_eq!(typed[0].amount, 1.0);

        assert_eq!(repo.count_by_date_range(DAY_ZERO, DAY_ZERO + DAY_MILLIS).await?, 2);
        assert_eq!(repo.count_by_date_range(DAY_ZERO + DAY_MILLIS, DAY_ZERO).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_recent_notes_are_distinct_and_newest_first() -> Result<()> {
        let (_, repo) = setup_transaction_repo().await?;
        for (i, (note, category)) in [
            ("coffee", "Food"),
            ("", "Food"),
            ("bus", "Transport"),
            ("coffee", "Food"),
            ("lunch", "Food"),
        ]
        .into_iter()
        .enumerate()
        {
            let mut tx = sample_transaction(1.0, TransactionType::Expense, DAY_ZERO + i as i64);
            tx.note = note.to_string();
            tx.category = category.to_string();
            repo.insert(tx).await?;
        }

        assert_eq!(repo.recent_notes(10).await?, vec!["lunch", "coffee", "bus"]);
        assert_eq!(repo.recent_notes(2).await?, vec!["lunch", "coffee"]);
        assert_eq!(
            repo.recent_notes_by_category("Food", 10).await?,
            vec!["lunch", "coffee"]
        );
        assert!(repo.recent_notes(0).await?.is_empty());

        // A repeated note moves up to its latest use.
        let mut again = sample_transaction(1.0, TransactionType::Expense, DAY_ZERO + 10);
        again.note = "bus".to_string();
        again.category = "Transport".to_string();
        repo.insert(again).await?;
        assert_eq!(repo.recent_notes(10).await?, vec!["bus", "lunch", "coffee"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_category_removal_keeps_history() -> Result<()> {
        let ledger = setup_test_ledger().await?;
        let categories = CategoryRepository::new(ledger.clone());
        let repo = TransactionRepository::new(ledger);

        let food = categories
            .insert(sample_category("Food", TransactionType::Expense))
            .await?;
        let mut tx = sample_transaction(8.0, TransactionType::Expense, DAY_ZERO);
        tx.category = "Food".to_string();
        tx.category_id = Some(food);
        let id = repo.insert(tx).await?;

        categories.delete_by_id(food).await?;
        let stored = repo.get_by_id(id).await?.unwrap();
        assert_eq!(stored.category, "Food");
        assert_eq!(stored.category_id, Some(food));
        Ok(())
    }

    #[tokio::test]
    async fn test_live_list_follows_mutations() -> Result<()> {
        let (_, repo) = setup_transaction_repo().await?;
        let mut live = repo.observe_by_type(TransactionType::Income);
        assert_eq!(live.tables(), &[Table::Transactions]);
        assert!(live.next().await.unwrap()?.is_empty());
        assert!(live.try_next().is_none());

        let id = repo
            .insert(sample_transaction(100.0, TransactionType::Income, DAY_ZERO))
            .await?;
        assert_eq!(live.next().await.unwrap()?.len(), 1);

        repo.delete_by_id(id).await?;
        assert!(live.next().await.unwrap()?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_category_writes_do_not_wake_transaction_queries() -> Result<()> {
        let ledger = setup_test_ledger().await?;
        let categories = CategoryRepository::new(ledger.clone());
        let repo = TransactionRepository::new(ledger);

        let mut live = repo.observe_all();
        assert!(live.next().await.unwrap()?.is_empty());

        categories
            .insert(sample_category("Food", TransactionType::Expense))
            .await?;
        let quiet =
            tokio::time::timeout(std::time::Duration::from_millis(50), live.next()).await;
        assert!(quiet.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_cancellable_read() -> Result<()> {
        let (ledger, repo) = setup_transaction_repo().await?;
        repo.insert(sample_transaction(4.0, TransactionType::Expense, DAY_ZERO))
            .await?;

        let token = CancellationToken::new();
        let outcome = ledger.read_cancellable(&token, repo.list_all()).await?;
        assert!(matches!(outcome, ReadOutcome::Completed(ref rows) if rows.len() == 1));

        token.cancel();
        let outcome = ledger.read_cancellable(&token, repo.list_all()).await?;
        assert!(outcome.is_cancelled());

        // The store is still usable after a cancelled read.
        assert_eq!(repo.list_all().await?.len(), 1);
        Ok(())
    }
}
