//! Aggregation over transactions - totals, category breakdowns and time buckets.
//!
//! Plain sums run in SQL. Day and month bucketing happens here over rows scanned
//! in ascending date order, so bucket keys and labels do not depend on SQLite's
//! date functions.

use crate::{
    core::live::{LiveQuery, Table},
    core::store::Ledger,
    entities::{Transaction, TransactionType, transaction},
    errors::{Error, Result},
};
use chrono::DateTime;
use sea_orm::{QueryOrder, QuerySelect, prelude::*};
use std::collections::BTreeMap;
use std::future::Future;

/// Milliseconds in one UTC day
pub const DAY_MILLIS: i64 = 86_400_000;

/// Sum of amounts for one denormalized category name
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryTotal {
    /// Category name as stored on the transactions
    pub category: String,
    /// Sum of the matching amounts
    pub total: f64,
}

/// Sum of amounts for one UTC day.
///
/// `date` is the earliest transaction timestamp that fell into the day, not
/// midnight.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyTotal {
    /// First timestamp seen in the day, epoch milliseconds
    pub date: i64,
    /// Sum of the day's amounts
    pub total: f64,
}

/// Sum of amounts for one UTC calendar month, labelled `YYYY-MM`
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyTotal {
    /// `YYYY-MM`
    pub month: String,
    /// Sum of the month's amounts
    pub total: f64,
}

/// Read-only reporting over the `transactions` table
#[derive(Debug, Clone)]
pub struct AggregationEngine {
    store: Ledger,
}

/// `YYYY-MM` label of a millisecond timestamp read as UTC.
pub fn month_label(millis: i64) -> Result<String> {
    DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.format("%Y-%m").to_string())
        .ok_or(Error::InvalidDate { millis })
}

/// Buckets ascending `(date, amount)` rows by `date / DAY_MILLIS`.
fn bucket_days(rows: Vec<(i64, f64)>) -> Vec<DailyTotal> {
    let mut days: Vec<(i64, DailyTotal)> = Vec::new();
    for (date, amount) in rows {
        let bucket = date / DAY_MILLIS;
        match days.last_mut() {
            Some((last, total)) if *last == bucket => total.total += amount,
            _ => days.push((bucket, DailyTotal { date, total: amount })),
        }
    }
    days.into_iter().map(|(_, total)| total).collect()
}

fn bucket_months(rows: Vec<(i64, f64)>) -> Result<Vec<MonthlyTotal>> {
    let mut months: BTreeMap<String, f64> = BTreeMap::new();
    for (date, amount) in rows {
        *months.entry(month_label(date)?).or_default() += amount;
    }
    Ok(months
        .into_iter()
        .map(|(month, total)| MonthlyTotal { month, total })
        .collect())
}

impl AggregationEngine {
    /// Creates an engine reading from `store`
    #[must_use]
    pub const fn new(store: Ledger) -> Self {
        Self { store }
    }

    /// Sum of every amount of `kind`, or None when there are no such transactions.
    pub async fn total_by_type(&self, kind: TransactionType) -> Result<Option<f64>> {
        let total: Option<Option<f64>> = Transaction::find()
            .select_only()
            .column_as(transaction::Column::Amount.sum(), "total")
            .filter(transaction::Column::Kind.eq(kind))
            .into_tuple()
            .one(self.store.db())
            .await?;
        Ok(total.flatten())
    }

    /// Sum of amounts of `kind` dated within `[start, end]`, or None when empty.
    pub async fn total_by_type_and_date_range(
        &self,
        kind: TransactionType,
        start: i64,
        end: i64,
    ) -> Result<Option<f64>> {
        let total: Option<Option<f64>> = Transaction::find()
            .select_only()
            .column_as(transaction::Column::Amount.sum(), "total")
            .filter(transaction::Column::Kind.eq(kind))
            .filter(transaction::Column::Date.between(start, end))
            .into_tuple()
            .one(self.store.db())
            .await?;
        Ok(total.flatten())
    }

    /// One total per category name within `[start, end]`, in no particular order.
    pub async fn category_totals(
        &self,
        kind: TransactionType,
        start: i64,
        end: i64,
    ) -> Result<Vec<CategoryTotal>> {
        let rows: Vec<(String, f64)> = Transaction::find()
            .select_only()
            .column(transaction::Column::Category)
            .column_as(transaction::Column::Amount.sum(), "total")
            .filter(transaction::Column::Kind.eq(kind))
            .filter(transaction::Column::Date.between(start, end))
            .group_by(transaction::Column::Category)
            .into_tuple()
            .all(self.store.db())
            .await?;
        Ok(rows
            .into_iter()
            .map(|(category, total)| CategoryTotal { category, total })
            .collect())
    }

    /// [`category_totals`](Self::category_totals) largest first, ties by name.
    pub async fn category_ranking(
        &self,
        kind: TransactionType,
        start: i64,
        end: i64,
    ) -> Result<Vec<CategoryTotal>> {
        let mut totals = self.category_totals(kind, start, end).await?;
        totals.sort_by(|a, b| {
            b.total
                .total_cmp(&a.total)
                .then_with(|| a.category.cmp(&b.category))
        });
        Ok(totals)
    }

    async fn dated_amounts(
        &self,
        kind: TransactionType,
        start: i64,
        end: i64,
    ) -> Result<Vec<(i64, f64)>> {
        Transaction::find()
            .select_only()
            .column(transaction::Column::Date)
            .column(transaction::Column::Amount)
            .filter(transaction::Column::Kind.eq(kind))
            .filter(transaction::Column::Date.between(start, end))
            .order_by_asc(transaction::Column::Date)
            .order_by_asc(transaction::Column::Id)
            .into_tuple()
            .all(self.store.db())
            .await
            .map_err(Into::into)
    }

    /// Per-day totals within `[start, end]`, oldest day first.
    pub async fn daily_totals(
        &self,
        kind: TransactionType,
        start: i64,
        end: i64,
    ) -> Result<Vec<DailyTotal>> {
        Ok(bucket_days(self.dated_amounts(kind, start, end).await?))
    }

    /// Per-month totals within `[start, end]`, ascending by label.
    pub async fn monthly_totals(
        &self,
        kind: TransactionType,
        start: i64,
        end: i64,
    ) -> Result<Vec<MonthlyTotal>> {
        bucket_months(self.dated_amounts(kind, start, end).await?)
    }

    fn observe<T, F, Fut>(&self, query: F) -> LiveQuery<T>
    where
        T: Send + 'static,
        F: Fn(Self) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let engine = self.clone();
        self.store
            .observe(&[Table::Transactions], move || query(engine.clone()))
    }

    /// Live form of [`total_by_type`](Self::total_by_type)
    pub fn observe_total_by_type(&self, kind: TransactionType) -> LiveQuery<Option<f64>> {
        self.observe(move |engine| async move { engine.total_by_type(kind).await })
    }

    /// Live form of [`total_by_type_and_date_range`](Self::total_by_type_and_date_range)
    pub fn observe_total_by_type_and_date_range(
        &self,
        kind: TransactionType,
        start: i64,
        end: i64,
    ) -> LiveQuery<Option<f64>> {
        self.observe(move |engine| async move {
            engine.total_by_type_and_date_range(kind, start, end).await
        })
    }

    /// Live form of [`category_totals`](Self::category_totals)
    pub fn observe_category_totals(
        &self,
        kind: TransactionType,
        start: i64,
        end: i64,
    ) -> LiveQuery<Vec<CategoryTotal>> {
        self.observe(move |engine| async move { engine.category_totals(kind, start, end).await })
    }

    /// Live form of [`category_ranking`](Self::category_ranking)
    pub fn observe_category_ranking(
        &self,
        kind: TransactionType,
        start: i64,
        end: i64,
    ) -> LiveQuery<Vec<CategoryTotal>> {
        self.observe(move |engine| async move { engine.category_ranking(kind, start, end).await })
    }

    /// Live form of [`daily_totals`](Self::daily_totals)
    pub fn observe_daily_totals(
        &self,
        kind: TransactionType,
        start: i64,
        end: i64,
    ) -> LiveQuery<Vec<DailyTotal>> {
        self.observe(move |engine| async move { engine.daily_totals(kind, start, end).await })
    }

    /// Live form of [`monthly_totals`](Self::monthly_totals)
    pub fn observe_monthly_totals(
        &self,
        kind: TransactionType,
        start: i64,
        end: i64,
    ) -> LiveQuery<Vec<MonthlyTotal>> {
        self.observe(move |engine| async move { engine.monthly_totals(kind, start, end).await })
    }
}
