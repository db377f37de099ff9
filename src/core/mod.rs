//! Core ledger logic - storage handle, repositories, aggregation and live queries.
//! Nothing here knows about a presentation layer; callers hold a [`Ledger`] and
//! build repositories from it.

pub mod aggregate;
pub mod category;
pub mod live;
pub mod seed;
pub mod store;
pub mod transaction;

pub use aggregate::{AggregationEngine, CategoryTotal, DailyTotal, MonthlyTotal};
pub use category::CategoryRepository;
pub use live::{LiveQuery, LiveQueryState, ReadOutcome, Table};
pub use store::Ledger;
pub use transaction::TransactionRepository;
