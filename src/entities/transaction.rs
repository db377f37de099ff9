//! Transaction entity - Represents one income or expense record.
//!
//! `category` is a denormalized copy of the category name taken when the row is
//! written; it survives renames and deletions of the category itself. There is
//! no foreign key to `categories`.
use super::TransactionType;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Transaction database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    /// Unique identifier; 0 on a new model means "assign on insert"
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Non-negative amount; direction is carried by `kind`
    pub amount: f64,
    /// Income or expense
    #[sea_orm(column_name = "type")]
    pub kind: TransactionType,
    /// Category display name at the time of writing
    pub category: String,
    /// Optional reference to `categories.id`
    pub category_id: Option<i64>,
    /// Optional reference to a child of `category_id`
    pub sub_category_id: Option<i64>,
    /// Human-readable description of the transaction
    pub description: String,
    /// Logical date of the transaction in epoch milliseconds
    pub date: i64,
    /// Free-form note
    pub note: String,
    /// Whether the row was produced by the AI parser
    pub ai_parsed: bool,
    /// Receipt image location owned by the image store
    pub image_path: Option<String>,
}

/// Transactions reference categories only by value
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
