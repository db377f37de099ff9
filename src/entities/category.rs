//! Category entity - Represents one node of the income/expense taxonomy.
//!
//! Categories form a two-level hierarchy through `parent_id`. A parent and its
//! children always share the same `kind`. Deactivated categories (`is_active =
//! false`) are hidden from listings but keep their row, so historical
//! transactions that point at them remain valid.

use super::TransactionType;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Category database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "categories")]
pub struct Model {
    /// Unique identifier; 0 on a new model means "assign on insert"
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Display name (e.g., "Food", "Salary")
    pub name: String,
    /// Icon token resolved by the presentation layer
    pub icon: String,
    /// Display color, usually a hex code such as `#FF6B6B`
    pub color: String,
    /// Income or expense
    #[sea_orm(column_name = "type")]
    pub kind: TransactionType,
    /// Parent category, None for a top-level category
    pub parent_id: Option<i64>,
    /// Display position among siblings of the same type
    pub sort_order: i32,
    /// Built-in category that normal flows should deactivate rather than delete
    pub is_system: bool,
    /// Soft delete flag - if false, category is hidden but data is preserved
    pub is_active: bool,
}

/// Defines relationships between Category and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each subcategory belongs to one parent category
    #[sea_orm(
        belongs_to = "Entity",
        from = "Column::ParentId",
        to = "Column::Id",
        on_delete = "Cascade"
    )]
    Parent,
}

impl ActiveModelBehavior for ActiveModel {}
