//! Unified error type for the ledger store.
//!
//! Database failures are classified on conversion: constraint failures reported by
//! `SQLite` become [`Error::ConstraintViolation`], everything else stays a
//! [`Error::Database`]. Missing rows on update/delete are not errors; those
//! operations report the number of rows affected instead.

use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

/// Every failure the ledger store can report
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid settings or seed file
    #[error("Configuration error: {message}")]
    Config {
        /// What was wrong
        message: String,
    },

    /// Any other database failure
    #[error("Database error: {0}")]
    Database(DbErr),

    /// Unique or foreign-key constraint rejected the write; nothing was committed
    #[error("Constraint violation: {message}")]
    ConstraintViolation {
        /// Database message naming the constraint
        message: String,
    },

    /// A category parent link that would break the hierarchy
    #[error("Invalid reference to category {id}: {reason}")]
    InvalidReference {
        /// Offending category id
        id: i64,
        /// Which rule was broken
        reason: String,
    },

    /// Negative or non-finite amount
    #[error("Invalid amount: {amount}")]
    InvalidAmount {
        /// Rejected value
        amount: f64,
    },

    /// Timestamp outside the calendar range
    #[error("Timestamp {millis} is outside the representable date range")]
    InvalidDate {
        /// Rejected epoch milliseconds
        millis: i64,
    },

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<DbErr> for Error {
    fn from(err: DbErr) -> Self {
        match err.sql_err() {
            Some(
                SqlErr::UniqueConstraintViolation(message)
                | SqlErr::ForeignKeyConstraintViolation(message),
            ) => Self::ConstraintViolation { message },
            _ => Self::Database(err),
        }
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
