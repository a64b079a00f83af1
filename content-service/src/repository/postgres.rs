//! PostgreSQL repositories
//!
//! [`PgRepository`] executes the statements rendered by [`super::sql`] on
//! the connection owned by a [`sqlx::Transaction`]. Every repository call
//! goes through the transaction it is handed, so work sharing one
//! transaction commits or rolls back as a unit.
//!
//! # Example
//!
//! ```rust,no_run
//! use content_service::domain::{CreatePostType, PostType};
//! use content_service::repository::postgres::{PgRepository, PgTransactionManager};
//! use content_service::repository::{Repository, TransactionManager};
//!
//! # async fn example(pool: sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
//! let transactions = PgTransactionManager::new(pool);
//! let repo: PgRepository<PostType, CreatePostType> = PgRepository::new();
//!
//! let mut tx = transactions.begin().await?;
//! let blog = repo
//!     .insert(&mut tx, CreatePostType { code: "blog".into(), name: "Blog".into() })
//!     .await?;
//! transactions.commit(tx).await?;
//! assert_eq!(blog.meta.version, 0);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::marker::PhantomData;

use chrono::Utc;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::{Arguments, FromRow, PgPool, Postgres, Transaction};
use tracing::{debug, warn};
use uuid::Uuid;

use super::error::{RepositoryError, RepositoryOperation};
use super::filter::Filter;
use super::sort::Sort;
use super::sql::{self, SqlParam, Statement};
use super::traits::{Repository, RepositoryResult, TransactionManager};
use super::types::{ScalarType, ScalarValue, TypeMap};
use crate::model::{CreateFor, Entity, EntityMeta};

/// Unit-of-work handle for PostgreSQL repositories
pub type PgTx = Transaction<'static, Postgres>;

/// Begins database transactions on a pool
#[derive(Debug, Clone)]
pub struct PgTransactionManager {
    pool: PgPool,
}

impl PgTransactionManager {
    /// Wrap a connection pool
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl TransactionManager for PgTransactionManager {
    type Tx = PgTx;

    async fn begin(&self) -> RepositoryResult<PgTx> {
        self.pool
            .begin()
            .await
            .map_err(|e| RepositoryError::from(e).with_operation(RepositoryOperation::Transaction))
    }

    async fn commit(&self, tx: PgTx) -> RepositoryResult<()> {
        tx.commit()
            .await
            .map_err(|e| RepositoryError::from(e).with_operation(RepositoryOperation::Transaction))
    }

    async fn rollback(&self, tx: PgTx) -> RepositoryResult<()> {
        tx.rollback()
            .await
            .map_err(|e| RepositoryError::from(e).with_operation(RepositoryOperation::Transaction))
    }
}

/// Repository for one entity kind stored in PostgreSQL
pub struct PgRepository<E, C> {
    _marker: PhantomData<fn() -> (E, C)>,
}

impl<E, C> PgRepository<E, C> {
    /// Create a repository; connections come from the transactions it is given
    #[must_use]
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<E, C> Default for PgRepository<E, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E, C> Clone for PgRepository<E, C> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<E: Entity, C> fmt::Debug for PgRepository<E, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgRepository")
            .field("table", &E::TABLE)
            .finish()
    }
}

fn arguments(params: Vec<SqlParam>, op: RepositoryOperation) -> RepositoryResult<PgArguments> {
    let mut args = PgArguments::default();
    for param in params {
        let added = match param {
            SqlParam::Value(ScalarValue::String(v)) => args.add(v),
            SqlParam::Value(ScalarValue::Int(v)) => args.add(v),
            SqlParam::Value(ScalarValue::Float(v)) => args.add(v),
            SqlParam::Value(ScalarValue::Bool(v)) => args.add(v),
            SqlParam::Value(ScalarValue::Date(v)) => args.add(v),
            SqlParam::Value(ScalarValue::DateTime(v)) => args.add(v),
            SqlParam::Value(ScalarValue::Time(v)) => args.add(v),
            SqlParam::Null => args.add(None::<String>),
            SqlParam::Uuid(v) => args.add(v),
            SqlParam::Ids(v) => args.add(v),
            SqlParam::Uids(v) => args.add(v),
        };
        added.map_err(|e| RepositoryError::serialization_error(op, e.to_string()))?;
    }
    Ok(args)
}

fn query_failed(op: RepositoryOperation) -> impl Fn(sqlx::Error) -> RepositoryError {
    move |e| RepositoryError::from(e).with_operation(op)
}

impl<E, C> PgRepository<E, C>
where
    E: Entity + for<'r> FromRow<'r, PgRow> + Unpin,
    C: CreateFor<E>,
{
    async fn fetch_all(
        &self,
        tx: &mut PgTx,
        statement: Statement,
        op: RepositoryOperation,
    ) -> RepositoryResult<Vec<E>> {
        debug!(sql = %statement.sql, "fetch_all");
        let args = arguments(statement.params, op)?;
        sqlx::query_as_with::<_, E, _>(&statement.sql, args)
            .fetch_all(&mut **tx)
            .await
            .map_err(query_failed(op))
    }

    async fn fetch_optional(
        &self,
        tx: &mut PgTx,
        statement: Statement,
        op: RepositoryOperation,
    ) -> RepositoryResult<Option<E>> {
        debug!(sql = %statement.sql, "fetch_optional");
        let args = arguments(statement.params, op)?;
        sqlx::query_as_with::<_, E, _>(&statement.sql, args)
            .fetch_optional(&mut **tx)
            .await
            .map_err(query_failed(op))
    }

    async fn execute(
        &self,
        tx: &mut PgTx,
        statement: Statement,
        op: RepositoryOperation,
    ) -> RepositoryResult<u64> {
        debug!(sql = %statement.sql, "execute");
        let args = arguments(statement.params, op)?;
        let result = sqlx::query_with(&statement.sql, args)
            .execute(&mut **tx)
            .await
            .map_err(query_failed(op))?;
        Ok(result.rows_affected())
    }

    /// Attribute types needed to render `filters` and `sorts`, if any
    async fn attributes_for(
        &self,
        tx: &mut PgTx,
        filters: &[Filter],
        sorts: &[Sort],
    ) -> RepositoryResult<TypeMap> {
        let needed = filters.iter().any(|f| matches!(f, Filter::Attribute { .. }))
            || sorts.iter().any(Sort::is_attribute);
        if needed {
            self.attribute_type_map(tx).await
        } else {
            Ok(TypeMap::new())
        }
    }
}

impl<E, C> Repository for PgRepository<E, C>
where
    E: Entity + for<'r> FromRow<'r, PgRow> + Unpin,
    C: CreateFor<E>,
{
    type Entity = E;
    type Create = C;
    type Tx = PgTx;

    async fn find_by_id(&self, tx: &mut PgTx, id: i32) -> RepositoryResult<Option<E>> {
        self.fetch_optional(tx, sql::find_by_id::<E>(id), RepositoryOperation::FindById)
            .await
    }

    async fn find_by_ids(&self, tx: &mut PgTx, ids: &[i32]) -> RepositoryResult<Vec<E>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.fetch_all(tx, sql::find_by_ids::<E>(ids), RepositoryOperation::FindById)
            .await
    }

    async fn find_by_uid(&self, tx: &mut PgTx, uid: Uuid) -> RepositoryResult<Option<E>> {
        self.fetch_optional(tx, sql::find_by_uid::<E>(uid), RepositoryOperation::FindByUid)
            .await
    }

    async fn find_by_uids(&self, tx: &mut PgTx, uids: &[Uuid]) -> RepositoryResult<Vec<E>> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }
        self.fetch_all(tx, sql::find_by_uids::<E>(uids), RepositoryOperation::FindByUid)
            .await
    }

    async fn exists(&self, tx: &mut PgTx, id: i32) -> RepositoryResult<bool> {
        let statement = sql::exists::<E>(id);
        let args = arguments(statement.params, RepositoryOperation::Exists)?;
        sqlx::query_scalar_with::<_, bool, _>(&statement.sql, args)
            .fetch_one(&mut **tx)
            .await
            .map_err(query_failed(RepositoryOperation::Exists))
    }

    async fn insert(&self, tx: &mut PgTx, input: C) -> RepositoryResult<E> {
        let entity = input.into_entity(EntityMeta::fresh(0, Utc::now()));
        let inserted = self
            .fetch_optional(tx, sql::insert(&entity), RepositoryOperation::Insert)
            .await?;
        inserted.ok_or_else(|| {
            RepositoryError::database_error(RepositoryOperation::Insert, "insert returned no row")
                .with_entity(E::ENTITY_TYPE, entity.uid().to_string())
        })
    }

    async fn update(&self, tx: &mut PgTx, entity: E) -> RepositoryResult<E> {
        let id = entity.id();
        let updated = self
            .fetch_optional(tx, sql::update(&entity), RepositoryOperation::Update)
            .await?;
        updated.ok_or_else(|| RepositoryError::conflict(E::ENTITY_TYPE, id))
    }

    async fn delete_by_id(&self, tx: &mut PgTx, id: i32) -> RepositoryResult<u64> {
        self.execute(tx, sql::delete_by_id::<E>(id), RepositoryOperation::Delete)
            .await
    }

    async fn delete_by_ids(&self, tx: &mut PgTx, ids: &[i32]) -> RepositoryResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.execute(tx, sql::delete_by_ids::<E>(ids), RepositoryOperation::Delete)
            .await
    }

    async fn delete_by_uid(&self, tx: &mut PgTx, uid: Uuid) -> RepositoryResult<u64> {
        self.execute(tx, sql::delete_by_uid::<E>(uid), RepositoryOperation::Delete)
            .await
    }

    async fn delete_by_uids(&self, tx: &mut PgTx, uids: &[Uuid]) -> RepositoryResult<u64> {
        if uids.is_empty() {
            return Ok(0);
        }
        self.execute(tx, sql::delete_by_uids::<E>(uids), RepositoryOperation::Delete)
            .await
    }

    async fn find_many(
        &self,
        tx: &mut PgTx,
        filters: &[Filter],
        sorts: &[Sort],
    ) -> RepositoryResult<Vec<E>> {
        for filter in filters {
            filter.validate()?;
        }
        let attributes = self.attributes_for(tx, filters, sorts).await?;
        let statement = sql::find_many::<E>(filters, sorts, &attributes)?;
        self.fetch_all(tx, statement, RepositoryOperation::FindMany)
            .await
    }

    async fn count(&self, tx: &mut PgTx, filters: &[Filter]) -> RepositoryResult<u64> {
        for filter in filters {
            filter.validate()?;
        }
        let attributes = self.attributes_for(tx, filters, &[]).await?;
        let statement = sql::count::<E>(filters, &attributes)?;
        let args = arguments(statement.params, RepositoryOperation::Count)?;
        let count = sqlx::query_scalar_with::<_, i64, _>(&statement.sql, args)
            .fetch_one(&mut **tx)
            .await
            .map_err(query_failed(RepositoryOperation::Count))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn attribute_type_map(&self, tx: &mut PgTx) -> RepositoryResult<TypeMap> {
        let statement = sql::attribute_definitions(E::ENTITY_TYPE);
        let args = arguments(statement.params, RepositoryOperation::TypeMap)?;
        let rows: Vec<(String, String)> = sqlx::query_as_with(&statement.sql, args)
            .fetch_all(&mut **tx)
            .await
            .map_err(query_failed(RepositoryOperation::TypeMap))?;

        Ok(rows
            .into_iter()
            .filter_map(|(name, data_type)| match data_type.parse::<ScalarType>() {
                Ok(ty) => Some((name, ty)),
                Err(err) => {
                    warn!(attribute = %name, error = %err, "skipping attribute");
                    None
                }
            })
            .collect())
    }
}
