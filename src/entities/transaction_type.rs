//! Income/expense discriminator shared by categories and transactions.
//!
//! Stored as the text values `INCOME` / `EXPENSE` so existing rows stay readable
//! by other tools.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Whether a row records money coming in or going out
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    /// Money received
    #[sea_orm(string_value = "INCOME")]
    Income,
    /// Money spent
    #[sea_orm(string_value = "EXPENSE")]
    Expense,
}

impl TransactionType {
    /// Stored text value
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Income => "INCOME",
            Self::Expense => "EXPENSE",
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
