//! Category business logic - CRUD, hierarchy and ordering over the taxonomy.
//!
//! Every mutation runs in the ledger's exclusive write transaction and
//! invalidates live queries on `categories` once committed. Updates and deletes
//! report the number of rows affected; a missing id is 0, not an error.

use crate::{
    core::live::{LiveQuery, Table},
    core::store::Ledger,
    entities::{Category, TransactionType, category},
    errors::{Error, Result},
};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveValue::NotSet, ConnectionTrait, QueryOrder, QuerySelect, Set, prelude::*,
};
use std::future::Future;
use tracing::{debug, instrument};

/// Category operations bound to one ledger
#[derive(Debug, Clone)]
pub struct CategoryRepository {
    store: Ledger,
}

/// Builds the insert form of `model`, leaving the id unset when it is 0.
fn insert_form(model: category::Model) -> category::ActiveModel {
    category::ActiveModel {
        id: if model.id == 0 { NotSet } else { Set(model.id) },
        name: Set(model.name),
        icon: Set(model.icon),
        color: Set(model.color),
        kind: Set(model.kind),
        parent_id: Set(model.parent_id),
        sort_order: Set(model.sort_order),
        is_system: Set(model.is_system),
        is_active: Set(model.is_active),
    }
}

/// Checks that `parent_id` names an existing category of the same kind.
async fn validate_parent<C>(db: &C, model: &category::Model) -> Result<()>
where
    C: ConnectionTrait,
{
    let Some(parent_id) = model.parent_id else {
        return Ok(());
    };

    if model.id != 0 && parent_id == model.id {
        return Err(Error::InvalidReference {
            id: parent_id,
            reason: "a category cannot be its own parent".to_string(),
        });
    }

    let parent = Category::find_by_id(parent_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::InvalidReference {
            id: parent_id,
            reason: "parent category does not exist".to_string(),
        })?;

    if parent.kind != model.kind {
        return Err(Error::InvalidReference {
            id: parent_id,
            reason: format!("parent is {} but child is {}", parent.kind, model.kind),
        });
    }

    if parent.parent_id.is_some() {
        return Err(Error::InvalidReference {
            id: parent_id,
            reason: "parent is itself a subcategory".to_string(),
        });
    }
    Ok(())
}

/// Checks that rewriting an existing row keeps its subcategories valid: they must
/// share its kind, and a row with subcategories must stay top-level.
async fn validate_children<C>(db: &C, model: &category::Model) -> Result<()>
where
    C: ConnectionTrait,
{
    let children = Category::find().filter(category::Column::ParentId.eq(model.id));

    if model.parent_id.is_some() && children.clone().count(db).await? > 0 {
        return Err(Error::InvalidReference {
            id: model.id,
            reason: "a category with subcategories cannot become a subcategory".to_string(),
        });
    }

    let mismatched = children
        .filter(category::Column::Kind.ne(model.kind))
        .count(db)
        .await?;
    if mismatched > 0 {
        return Err(Error::InvalidReference {
            id: model.id,
            reason: format!("{mismatched} subcategories are not {}", model.kind),
        });
    }
    Ok(())
}

/// Inserts one category on an open connection or transaction.
pub(crate) async fn insert_on<C>(db: &C, model: category::Model) -> Result<i64>
where
    C: ConnectionTrait,
{
    validate_parent(db, &model).await?;
    let result = Category::insert(insert_form(model)).exec(db).await?;
    Ok(result.last_insert_id)
}

impl CategoryRepository {
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

    /// Inserts a category and returns its id.
    ///
    /// An id of 0 asks the store to assign one. An explicit id that already exists
    /// fails with [`Error::ConstraintViolation`] and nothing is written.
    #[instrument(skip(self, category), fields(name = %category.name))]
    pub async fn insert(&self, category: category::Model) -> Result<i64> {
        let txn = self.store.begin_write(Table::Categories).await?;
        let id = insert_on(txn.conn(), category).await?;
        txn.commit().await?;
        debug!(id, "category inserted");
        Ok(id)
    }

    /// Inserts every category in one transaction; either all rows are written or
    /// none are. Later entries may use earlier entries as parents.
    #[instrument(skip(self, categories), fields(count = categories.len()))]
    pub async fn insert_all(&self, categories: Vec<category::Model>) -> Result<Vec<i64>> {
        let txn = self.store.begin_write(Table::Categories).await?;
        let mut ids = Vec::with_capacity(categories.len());
        for category in categories {
            ids.push(insert_on(txn.conn(), category).await?);
        }
        txn.commit().await?;
        Ok(ids)
    }

    /// Replaces every column of the row with `category.id`.
    ///
    /// Returns the number of rows affected, 0 when the id does not exist.
    #[instrument(skip(self, category), fields(id = category.id))]
    pub async fn update(&self, category: category::Model) -> Result<u64> {
        let id = category.id;
        let txn = self.store.begin_write(Table::Categories).await?;
        validate_parent(txn.conn(), &category).await?;
        validate_children(txn.conn(), &category).await?;

        let mut form = insert_form(category);
        form.id = NotSet;
        let result = Category::update_many()
            .set(form)
            .filter(category::Column::Id.eq(id))
            .exec(txn.conn())
            .await?;
        txn.commit().await?;
        Ok(result.rows_affected)
    }

    /// Hard-deletes `category`. Its subcategories are removed with it.
    pub async fn delete(&self, category: &category::Model) -> Result<u64> {
        self.delete_by_id(category.id).await
    }

    /// Hard-deletes the category with `id`. Its subcategories are removed with it;
    /// transactions that reference it are left untouched.
    #[instrument(skip(self))]
    pub async fn delete_by_id(&self, id: i64) -> Result<u64> {
        let txn = self.store.begin_write(Table::Categories).await?;
        let result = Category::delete_by_id(id).exec(txn.conn()).await?;
        txn.commit().await?;
        Ok(result.rows_affected)
    }

    /// Soft-deletes a category by clearing `is_active`. No other column changes and
    /// repeating the call is harmless.
    #[instrument(skip(self))]
    pub async fn deactivate_category(&self, id: i64) -> Result<u64> {
        let txn = self.store.begin_write(Table::Categories).await?;
        let result = Category::update_many()
            .col_expr(category::Column::IsActive, Expr::value(false))
            .filter(category::Column::Id.eq(id))
            .exec(txn.conn())
            .await?;
        txn.commit().await?;
        Ok(result.rows_affected)
    }

    /// Finds a category by id, active or not.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<category::Model>> {
        Category::find_by_id(id)
            .one(self.store.db())
            .await
            .map_err(Into::into)
    }

    /// Finds a top-level category by name and type.
    ///
    /// When several rows match, the one with the lowest id wins.
    pub async fn get_by_name(
        &self,
        name: &str,
        kind: TransactionType,
    ) -> Result<Option<category::Model>> {
        Category::find()
            .filter(category::Column::Name.eq(name))
            .filter(category::Column::Kind.eq(kind))
            .filter(category::Column::ParentId.is_null())
            .order_by_asc(category::Column::Id)
            .one(self.store.db())
            .await
            .map_err(Into::into)
    }

    /// All active categories ordered by `sort_order`.
    pub async fn list_all(&self) -> Result<Vec<category::Model>> {
        Category::find()
            .filter(category::Column::IsActive.eq(true))
            .order_by_asc(category::Column::SortOrder)
            .order_by_asc(category::Column::Id)
            .all(self.store.db())
            .await
            .map_err(Into::into)
    }

    /// Active top-level categories of one type, ordered by `sort_order`.
    pub async fn list_parents(&self, kind: TransactionType) -> Result<Vec<category::Model>> {
        Category::find()
            .filter(category::Column::Kind.eq(kind))
            .filter(category::Column::ParentId.is_null())
            .filter(category::Column::IsActive.eq(true))
            .order_by_asc(category::Column::SortOrder)
            .order_by_asc(category::Column::Id)
            .all(self.store.db())
            .await
            .map_err(Into::into)
    }

    /// Active subcategories of `parent_id`, ordered by `sort_order`.
    pub async fn list_children(&self, parent_id: i64) -> Result<Vec<category::Model>> {
        Category::find()
            .filter(category::Column::ParentId.eq(parent_id))
            .filter(category::Column::IsActive.eq(true))
            .order_by_asc(category::Column::SortOrder)
            .order_by_asc(category::Column::Id)
            .all(self.store.db())
            .await
            .map_err(Into::into)
    }

    /// Active categories of one type at any level, ordered by `sort_order`.
    pub async fn list_by_type(&self, kind: TransactionType) -> Result<Vec<category::Model>> {
        Category::find()
            .filter(category::Column::Kind.eq(kind))
            .filter(category::Column::IsActive.eq(true))
            .order_by_asc(category::Column::SortOrder)
            .order_by_asc(category::Column::Id)
            .all(self.store.db())
            .await
            .map_err(Into::into)
    }

    /// Number of stored categories, inactive ones included.
    pub async fn count(&self) -> Result<u64> {
        Category::find()
            .count(self.store.db())
            .await
            .map_err(Into::into)
    }

    /// Largest `sort_order` among categories of `kind`, or None when there are none.
    pub async fn max_sort_order(&self, kind: TransactionType) -> Result<Option<i32>> {
        let max: Option<Option<i32>> = Category::find()
            .select_only()
            .column_as(category::Column::SortOrder.max(), "max_sort_order")
            .filter(category::Column::Kind.eq(kind))
            .into_tuple()
            .one(self.store.db())
            .await?;
        Ok(max.flatten())
    }

    /// Position for a category appended after every existing one of `kind`.
    pub async fn next_sort_order(&self, kind: TransactionType) -> Result<i32> {
        Ok(self
            .max_sort_order(kind)
            .await?
            .map_or(0, |max| max.saturating_add(1)))
    }

    fn observe<T, F, Fut>(&self, query: F) -> LiveQuery<T>
    where
        T: Send + 'static,
        F: Fn(Self) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let repo = self.clone();
        self.store
            .observe(&[Table::Categories], move || query(repo.clone()))
    }

    /// Live form of [`get_by_id`](Self::get_by_id)
    pub fn observe_by_id(&self, id: i64) -> LiveQuery<Option<category::Model>> {
        self.observe(move |repo| async move { repo.get_by_id(id).await })
    }

    /// Live form of [`get_by_name`](Self::get_by_name)
    pub fn observe_by_name(
        &self,
        name: impl Into<String>,
        kind: TransactionType,
    ) -> LiveQuery<Option<category::Model>> {
        let name = name.into();
        self.observe(move |repo| {
            let name = name.clone();
            async move { repo.get_by_name(&name, kind).await }
        })
    }

    /// Live form of [`list_all`](Self::list_all)
    pub fn observe_all(&self) -> LiveQuery<Vec<category::Model>> {
        self.observe(|repo| async move { repo.list_all().await })
    }

    /// Live form of [`list_parents`](Self::list_parents)
    pub fn observe_parents(&self, kind: TransactionType) -> LiveQuery<Vec<category::Model>> {
        self.observe(move |repo| async move { repo.list_parents(kind).await })
    }

    /// Live form of [`list_children`](Self::list_children)
    pub fn observe_children(&self, parent_id: i64) -> LiveQuery<Vec<category::Model>> {
        self.observe(move |repo| async move { repo.list_children(parent_id).await })
    }

    /// Live form of [`list_by_type`](Self::list_by_type)
    pub fn observe_by_type(&self, kind: TransactionType) -> LiveQuery<Vec<category::Model>> {
        self.observe(move |repo| async move { repo.list_by_type(kind).await })
    }
}
