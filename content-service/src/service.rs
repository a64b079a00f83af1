//! Generic service layer
//!
//! [`BaseService`] wraps one [`Repository`] with business rules and runs every
//! public operation in its own unit of work: committed when the operation
//! succeeds, rolled back when it fails. Each operation also has an `*_in`
//! variant that joins a unit of work the caller already holds, which is how
//! composite operations nest without sub-transactions.
//!
//! Entity-specific checks (format validation, uniqueness) plug in through
//! [`EntityRules`].
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use content_service::cache::TypeMapCache;
//! use content_service::domain::{CreatePostType, PostTypeService};
//! use content_service::repository::filter;
//! use content_service::repository::memory::{MemoryRepository, MemoryStore};
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let store = MemoryStore::new();
//! let service: PostTypeService<_, _> = PostTypeService::new(
//!     Arc::new(MemoryRepository::new(store.clone())),
//!     Arc::new(store),
//!     Arc::new(TypeMapCache::new()),
//! );
//!
//! let blog = service
//!     .create(CreatePostType { code: "blog".into(), name: "Blog Post".into() })
//!     .await
//!     .unwrap();
//! let found = service
//!     .get_many(vec![filter::equal("code", "blog")], vec![])
//!     .await
//!     .unwrap();
//! assert_eq!(found, vec![blog]);
//! # });
//! ```

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::{CacheNamespace, TypeMapCache};
use crate::error::{Error, Result};
use crate::model::Entity;
use crate::repository::{Filter, Repository, Sort, TransactionManager, TypeMap};

/// Business checks run before writes
///
/// Both hooks receive the caller's unit of work so lookups (e.g. uniqueness
/// by code) see the same state the write will. The default implementations
/// accept everything.
pub trait EntityRules<R: Repository>: Send + Sync + 'static {
    /// Validate a creation input
    ///
    /// # Errors
    ///
    /// `BadRequest` for invalid input, `Conflict` for duplicates.
    fn check_create(
        &self,
        repo: &R,
        tx: &mut R::Tx,
        input: &R::Create,
    ) -> impl Future<Output = Result<()>> + Send {
        let _ = (repo, tx, input);
        async { Ok(()) }
    }

    /// Validate the merged entity about to be written over `current`
    ///
    /// # Errors
    ///
    /// `BadRequest` for invalid input, `Conflict` for duplicates.
    fn check_update(
        &self,
        repo: &R,
        tx: &mut R::Tx,
        current: &R::Entity,
        next: &R::Entity,
    ) -> impl Future<Output = Result<()>> + Send {
        let _ = (repo, tx, current, next);
        async { Ok(()) }
    }

    /// Invalidate whatever cached state depends on the service's rows
    ///
    /// Runs right after each write and again once the unit of work is
    /// finished.
    fn after_write(&self, cache: &TypeMapCache) {
        let _ = cache;
    }
}

/// Rules that accept every input
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRules;

impl<R: Repository> EntityRules<R> for NoRules {}

/// CRUD and composite operations over one repository
pub struct BaseService<R, M, V = NoRules> {
    repo: Arc<R>,
    transactions: Arc<M>,
    cache: Arc<TypeMapCache>,
    rules: V,
}

impl<R, M, V: Clone> Clone for BaseService<R, M, V> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
            transactions: Arc::clone(&self.transactions),
            cache: Arc::clone(&self.cache),
            rules: self.rules.clone(),
        }
    }
}

impl<R, M, V> BaseService<R, M, V>
where
    R: Repository,
    M: TransactionManager<Tx = R::Tx>,
    V: EntityRules<R>,
{
    /// Create a service with default rules
    pub fn new(repo: Arc<R>, transactions: Arc<M>, cache: Arc<TypeMapCache>) -> Self
    where
        V: Default,
    {
        Self::with_rules(repo, transactions, cache, V::default())
    }

    /// Create a service with explicit rules
    pub fn with_rules(
        repo: Arc<R>,
        transactions: Arc<M>,
        cache: Arc<TypeMapCache>,
        rules: V,
    ) -> Self {
        Self {
            repo,
            transactions,
            cache,
            rules,
        }
    }

    /// The wrapped repository
    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// The transaction manager
    pub fn transactions(&self) -> &M {
        &self.transactions
    }

    /// The shared type-map cache
    pub fn cache(&self) -> &TypeMapCache {
        &self.cache
    }

    /// Start a unit of work for use with the `*_in` operations
    ///
    /// # Errors
    ///
    /// Returns the storage error if the unit cannot be started.
    pub async fn begin(&self) -> Result<R::Tx> {
        Ok(self.transactions.begin().await?)
    }

    /// Commit on success, roll back on failure
    ///
    /// A failing rollback is logged and the original error returned.
    ///
    /// # Errors
    ///
    /// Returns `result`'s error, or the commit error.
    pub async fn finish<T>(&self, tx: R::Tx, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                self.transactions.commit(tx).await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.transactions.rollback(tx).await {
                    warn!(
                        table = self.repo.table_name(),
                        error = %rollback_err,
                        "rollback failed"
                    );
                }
                Err(err)
            }
        }
    }

    /// [`finish`](Self::finish) for units that wrote rows
    ///
    /// Attribute type maps loaded inside a failed unit may include
    /// definitions that were just rolled back, so they are dropped.
    async fn finish_write<T>(&self, tx: R::Tx, result: Result<T>) -> Result<T> {
        let result = self.finish(tx, result).await;
        if result.is_err() {
            self.cache.clear_namespace(CacheNamespace::AttributeTypeMap);
        }
        self.rules.after_write(&self.cache);
        result
    }

    fn entity_type() -> &'static str {
        <R::Entity as Entity>::ENTITY_TYPE
    }

    /// Get an entity by id
    ///
    /// # Errors
    ///
    /// `NotFound` when no entity has this id.
    pub async fn get_by_id(&self, id: i32) -> Result<R::Entity> {
        let mut tx = self.begin().await?;
        let result = self.get_by_id_in(&mut tx, id).await;
        self.finish(tx, result).await
    }

    /// [`get_by_id`](Self::get_by_id) inside an existing unit of work
    pub async fn get_by_id_in(&self, tx: &mut R::Tx, id: i32) -> Result<R::Entity> {
        self.repo
            .find_by_id(tx, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("{} {} not found", Self::entity_type(), id)))
    }

    /// Get an entity by uid
    ///
    /// # Errors
    ///
    /// `NotFound` when no entity has this uid.
    pub async fn get_by_uid(&self, uid: Uuid) -> Result<R::Entity> {
        let mut tx = self.begin().await?;
        let result = self.get_by_uid_in(&mut tx, uid).await;
        self.finish(tx, result).await
    }

    /// [`get_by_uid`](Self::get_by_uid) inside an existing unit of work
    pub async fn get_by_uid_in(&self, tx: &mut R::Tx, uid: Uuid) -> Result<R::Entity> {
        self.repo
            .find_by_uid(tx, uid)
            .await?
            .ok_or_else(|| Error::NotFound(format!("{} {} not found", Self::entity_type(), uid)))
    }

    /// Get the entities with the given ids; missing ids are omitted
    pub async fn get_by_ids(&self, ids: &[i32]) -> Result<Vec<R::Entity>> {
        let mut tx = self.begin().await?;
        let result = self.repo.find_by_ids(&mut tx, ids).await.map_err(Error::from);
        self.finish(tx, result).await
    }

    /// Get the entities with the given uids; missing uids are omitted
    pub async fn get_by_uids(&self, uids: &[Uuid]) -> Result<Vec<R::Entity>> {
        let mut tx = self.begin().await?;
        let result = self.repo.find_by_uids(&mut tx, uids).await.map_err(Error::from);
        self.finish(tx, result).await
    }

    /// Whether an entity with this id exists
    pub async fn exists(&self, id: i32) -> Result<bool> {
        let mut tx = self.begin().await?;
        let result = self.repo.exists(&mut tx, id).await.map_err(Error::from);
        self.finish(tx, result).await
    }

    /// Validate and insert a new entity
    ///
    /// # Errors
    ///
    /// Rule failures (`BadRequest`, `Conflict`) abort before anything is
    /// written.
    pub async fn create(&self, input: R::Create) -> Result<R::Entity> {
        let mut tx = self.begin().await?;
        let result = self.create_in(&mut tx, input).await;
        self.finish_write(tx, result).await
    }

    /// [`create`](Self::create) inside an existing unit of work
    pub async fn create_in(&self, tx: &mut R::Tx, input: R::Create) -> Result<R::Entity> {
        self.rules.check_create(&self.repo, tx, &input).await?;
        let created = self.repo.insert(tx, input).await?;
        self.rules.after_write(&self.cache);
        debug!(
            entity_type = Self::entity_type(),
            id = created.id(),
            "entity created"
        );
        Ok(created)
    }

    /// Update an entity, checking the version the caller read
    ///
    /// Immutable fields of `input` (id, uid, version, timestamps) are replaced
    /// by the stored ones before the rules run.
    ///
    /// # Errors
    ///
    /// `NotFound` when the id is unknown; `Conflict` when `input.version`
    /// differs from the stored version, before any write is attempted.
    pub async fn update(&self, id: i32, input: R::Entity) -> Result<R::Entity> {
        let mut tx = self.begin().await?;
        let result = self.update_in(&mut tx, id, input).await;
        self.finish_write(tx, result).await
    }

    /// [`update`](Self::update) inside an existing unit of work
    pub async fn update_in(
        &self,
        tx: &mut R::Tx,
        id: i32,
        mut input: R::Entity,
    ) -> Result<R::Entity> {
        let current = self.get_by_id_in(tx, id).await?;

        if current.version() != input.version() {
            warn!(
                entity_type = Self::entity_type(),
                id,
                stored = current.version(),
                supplied = input.version(),
                "version conflict"
            );
            return Err(Error::Conflict(format!(
                "{} {} was modified (version {} expected, {} supplied)",
                Self::entity_type(),
                id,
                current.version(),
                input.version()
            )));
        }

        *input.meta_mut() = current.meta().clone();
        self.rules.check_update(&self.repo, tx, &current, &input).await?;

        let updated = self.repo.update(tx, input).await?;
        self.rules.after_write(&self.cache);
        Ok(updated)
    }

    /// Delete by id, returning the number of removed rows
    pub async fn delete_by_id(&self, id: i32) -> Result<u64> {
        let mut tx = self.begin().await?;
        let result = self.delete_by_id_in(&mut tx, id).await;
        self.finish_write(tx, result).await
    }

    /// [`delete_by_id`](Self::delete_by_id) inside an existing unit of work
    pub async fn delete_by_id_in(&self, tx: &mut R::Tx, id: i32) -> Result<u64> {
        let removed = self.repo.delete_by_id(tx, id).await?;
        self.rules.after_write(&self.cache);
        Ok(removed)
    }

    /// Delete by ids
    pub async fn delete_by_ids(&self, ids: &[i32]) -> Result<u64> {
        let mut tx = self.begin().await?;
        let result = self.repo.delete_by_ids(&mut tx, ids).await.map_err(Error::from);
        self.finish_write(tx, result).await
    }

    /// Delete by uid
    pub async fn delete_by_uid(&self, uid: Uuid) -> Result<u64> {
        let mut tx = self.begin().await?;
        let result = self.repo.delete_by_uid(&mut tx, uid).await.map_err(Error::from);
        self.finish_write(tx, result).await
    }

    /// Delete by uids
    pub async fn delete_by_uids(&self, uids: &[Uuid]) -> Result<u64> {
        let mut tx = self.begin().await?;
        let result = self
            .repo
            .delete_by_uids(&mut tx, uids)
            .await
            .map_err(Error::from);
        self.finish_write(tx, result).await
    }

    /// Apply several updates atomically, in order
    ///
    /// # Errors
    ///
    /// The first failing update aborts the batch and every earlier update
    /// is rolled back.
    pub async fn update_multiple(
        &self,
        updates: Vec<(i32, R::Entity)>,
    ) -> Result<Vec<R::Entity>> {
        let mut tx = self.begin().await?;
        let result = self.update_multiple_in(&mut tx, updates).await;
        self.finish_write(tx, result).await
    }

    /// [`update_multiple`](Self::update_multiple) inside an existing unit of work
    pub async fn update_multiple_in(
        &self,
        tx: &mut R::Tx,
        updates: Vec<(i32, R::Entity)>,
    ) -> Result<Vec<R::Entity>> {
        let mut results = Vec::with_capacity(updates.len());
        for (id, entity) in updates {
            results.push(self.update_in(tx, id, entity).await?);
        }
        Ok(results)
    }

    /// Create an entity and run related work in the same unit of work
    ///
    /// `related` receives the unit of work and the created entity. If it
    /// fails, the creation is rolled back. The returned future may only
    /// borrow from its two arguments, so other state is moved in.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let attributes = Arc::clone(&attribute_service);
    /// let post_type = service
    ///     .create_with_related_operations(input, move |tx, created| {
    ///         Box::pin(async move {
    ///             attributes.create_in(tx, default_attribute(created)).await?;
    ///             Ok(())
    ///         })
    ///     })
    ///     .await?;
    /// ```
    pub async fn create_with_related_operations<F>(
        &self,
        input: R::Create,
        related: F,
    ) -> Result<R::Entity>
    where
        F: for<'a> FnOnce(&'a mut R::Tx, &'a R::Entity) -> BoxFuture<'a, Result<()>> + Send,
    {
        let mut tx = self.begin().await?;
        let result = self
            .create_with_related_operations_in(&mut tx, input, related)
            .await;
        self.finish_write(tx, result).await
    }

    /// [`create_with_related_operations`](Self::create_with_related_operations)
    /// inside an existing unit of work
    pub async fn create_with_related_operations_in<F>(
        &self,
        tx: &mut R::Tx,
        input: R::Create,
        related: F,
    ) -> Result<R::Entity>
    where
        F: for<'a> FnOnce(&'a mut R::Tx, &'a R::Entity) -> BoxFuture<'a, Result<()>> + Send,
    {
        let entity = self.create_in(tx, input).await?;
        related(tx, &entity).await?;
        Ok(entity)
    }

    /// Find entities matching every filter, ordered by the sorts
    ///
    /// Filters and sorts are checked against the cached type maps first:
    /// unknown names and invalid operator/value pairs fail with `BadRequest`
    /// before the repository is queried.
    pub async fn get_many(&self, filters: Vec<Filter>, sorts: Vec<Sort>) -> Result<Vec<R::Entity>> {
        let mut tx = self.begin().await?;
        let result = self.get_many_in(&mut tx, filters, sorts).await;
        self.finish(tx, result).await
    }

    /// [`get_many`](Self::get_many) inside an existing unit of work
    pub async fn get_many_in(
        &self,
        tx: &mut R::Tx,
        filters: Vec<Filter>,
        sorts: Vec<Sort>,
    ) -> Result<Vec<R::Entity>> {
        let filters = self.resolve_query(tx, filters, &sorts).await?;
        Ok(self.repo.find_many(tx, &filters, &sorts).await?)
    }

    /// Count entities matching every filter
    pub async fn count(&self, filters: Vec<Filter>) -> Result<u64> {
        let mut tx = self.begin().await?;
        let result = async {
            let filters = self.resolve_query(&mut tx, filters, &[]).await?;
            Ok(self.repo.count(&mut tx, &filters).await?)
        }
        .await;
        self.finish(tx, result).await
    }

    async fn resolve_query(
        &self,
        tx: &mut R::Tx,
        filters: Vec<Filter>,
        sorts: &[Sort],
    ) -> Result<Vec<Filter>> {
        let fields = self.get_property_type_map().await?;
        let attributes = self.get_attribute_type_map_in(tx).await?;

        for sort in sorts {
            sort.validate(&fields, &attributes)?;
        }
        let resolved = filters
            .into_iter()
            .map(|filter| filter.resolve(&fields, &attributes))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(resolved)
    }

    /// Column type map of the repository's table, through the cache
    pub async fn get_property_type_map(&self) -> Result<TypeMap> {
        let repo = &self.repo;
        self.cache
            .get_or_compute(
                CacheNamespace::FieldTypeMap,
                repo.table_name(),
                move || async move { Ok(repo.column_type_map()) },
            )
            .await
    }

    /// Attribute type map of the repository's entity type, through the cache
    pub async fn get_attribute_type_map(&self) -> Result<TypeMap> {
        let mut tx = self.begin().await?;
        let result = self.get_attribute_type_map_in(&mut tx).await;
        self.finish(tx, result).await
    }

    /// [`get_attribute_type_map`](Self::get_attribute_type_map) inside an
    /// existing unit of work
    pub async fn get_attribute_type_map_in(&self, tx: &mut R::Tx) -> Result<TypeMap> {
        let repo = &self.repo;
        self.cache
            .get_or_compute(
                CacheNamespace::AttributeTypeMap,
                repo.table_name(),
                move || async move { repo.attribute_type_map(tx).await.map_err(Error::from) },
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CreatePostType, PostType};
    use crate::error::ErrorKind;
    use crate::model::{CreateFor, EntityMeta};
    use crate::repository::memory::{MemoryRepository, MemoryStore};
    use crate::repository::{filter, RepositoryError};
    use chrono::Utc;

    type Service = BaseService<MemoryRepository<PostType, CreatePostType>, MemoryStore>;

    fn service() -> (Service, MemoryStore) {
        let store = MemoryStore::new();
        let service = Service::new(
            Arc::new(MemoryRepository::new(store.clone())),
            Arc::new(store.clone()),
            Arc::new(TypeMapCache::new()),
        );
        (service, store)
    }

    fn input(code: &str) -> CreatePostType {
        CreatePostType {
            code: code.to_string(),
            name: format!("{} name", code),
        }
    }

    fn edit(entity: &PostType, name: &str) -> PostType {
        PostType {
            name: name.to_string(),
            ..entity.clone()
        }
    }

    #[tokio::test]
    async fn test_get_by_id_not_found() {
        let (service, _) = service();
        let err = service.get_by_id(404).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_get_by_uid() {
        let (service, _) = service();
        let created = service.create(input("blog")).await.unwrap();
        let found = service.get_by_uid(created.meta.uid).await.unwrap();
        assert_eq!(found, created);

        let err = service.get_by_uid(Uuid::now_v7()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_version_monotonicity() {
        let (service, _) = service();
        let mut entity = service.create(input("blog")).await.unwrap();
        assert_eq!(entity.meta.version, 0);

        for n in 1..=5 {
            entity = service
                .update(entity.meta.id, edit(&entity, &format!("v{}", n)))
                .await
                .unwrap();
            assert_eq!(entity.meta.version, n);
            assert_eq!(service.get_by_id(entity.meta.id).await.unwrap().meta.version, n);
        }
    }

    #[tokio::test]
    async fn test_stale_update_conflicts_without_write() {
        let (service, _) = service();
        let original = service.create(input("blog")).await.unwrap();
        service
            .update(original.meta.id, edit(&original, "first"))
            .await
            .unwrap();

        let err = service
            .update(original.meta.id, edit(&original, "second"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let stored = service.get_by_id(original.meta.id).await.unwrap();
        assert_eq!(stored.meta.version, 1);
        assert_eq!(stored.name, "first");
    }

    #[tokio::test]
    async fn test_update_ignores_supplied_immutable_fields() {
        let (service, _) = service();
        let original = service.create(input("blog")).await.unwrap();

        let mut tampered = edit(&original, "renamed");
        tampered.meta.id = 999;
        tampered.meta.uid = Uuid::now_v7();
        tampered.meta.created_at = Utc::now() + chrono::Duration::days(1);

        let updated = service.update(original.meta.id, tampered).await.unwrap();
        assert_eq!(updated.meta.id, original.meta.id);
        assert_eq!(updated.meta.uid, original.meta.uid);
        assert_eq!(updated.meta.created_at, original.meta.created_at);
        assert!(updated.meta.updated_at > original.meta.updated_at);
    }

    #[tokio::test]
    async fn test_update_multiple_rolls_back_on_failure() {
        let (service, _) = service();
        let a = service.create(input("a")).await.unwrap();
        let b = service.create(input("b")).await.unwrap();

        let stale_b = PostType {
            meta: EntityMeta {
                version: 7,
                ..b.meta.clone()
            },
            ..b.clone()
        };
        let err = service
            .update_multiple(vec![(a.meta.id, edit(&a, "changed")), (b.meta.id, stale_b)])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let stored_a = service.get_by_id(a.meta.id).await.unwrap();
        assert_eq!(stored_a.meta.version, 0);
        assert_eq!(stored_a.name, a.name);
    }

    #[tokio::test]
    async fn test_update_multiple_applies_in_order() {
        let (service, _) = service();
        let a = service.create(input("a")).await.unwrap();
        let b = service.create(input("b")).await.unwrap();

        let updated = service
            .update_multiple(vec![(a.meta.id, edit(&a, "A")), (b.meta.id, edit(&b, "B"))])
            .await
            .unwrap();
        assert_eq!(updated.len(), 2);
        assert!(updated.iter().all(|e| e.meta.version == 1));
    }

    #[tokio::test]
    async fn test_create_with_related_operations_rolls_back() {
        let (service, _) = service();

        let err = service
            .create_with_related_operations(input("doomed"), |_tx, _created| {
                Box::pin(async { Err::<(), _>(Error::Internal("related step failed".into())) })
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);

        let remaining = service
            .get_many(vec![filter::equal("code", "doomed")], vec![])
            .await
            .unwrap();
        assert!(remaining.is_empty());
    }

    #[tokio::test]
    async fn test_create_with_related_operations_shares_unit_of_work() {
        let (service, store) = service();
        let related_repo: Arc<MemoryRepository<PostType, CreatePostType>> =
            Arc::new(MemoryRepository::new(store.clone()));

        let created = service
            .create_with_related_operations(input("parent"), move |tx, created| {
                Box::pin(async move {
                    // the parent row is visible inside the same unit of work
                    assert!(related_repo.exists(tx, created.meta.id).await?);
                    related_repo.insert(tx, input("child")).await?;
                    Ok::<(), Error>(())
                })
            })
            .await
            .unwrap();

        assert_eq!(created.code, "parent");
        let all = service.get_many(vec![], vec![]).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_get_many_rejects_unknown_field() {
        let (service, store) = service();
        let before = store.round_trips();

        let err = service
            .get_many(vec![filter::equal("nope", "x")], vec![])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
        match err {
            Error::Repository(RepositoryError { kind, .. }) => {
                assert_eq!(kind, crate::repository::RepositoryErrorKind::FieldNotFound)
            }
            other => panic!("unexpected error {:?}", other),
        }
        // only the attribute map lookup touched storage
        assert_eq!(store.round_trips(), before + 1);
    }

    #[tokio::test]
    async fn test_get_many_rejects_invalid_operator_value() {
        let (service, _) = service();
        service.create(input("blog")).await.unwrap();

        // Like on an Int column is matched on its text form
        let found = service
            .get_many(vec![filter::like("id", "1")], vec![])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);

        let err = service
            .get_many(vec![filter::greater_than("code", true)], vec![])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }

    #[tokio::test]
    async fn test_property_type_map_is_cached() {
        let (service, _) = service();
        let first = service.get_property_type_map().await.unwrap();
        let second = service.get_property_type_map().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(
            service.cache().get(CacheNamespace::FieldTypeMap, "post_types"),
            Some(first)
        );
    }

    #[tokio::test]
    async fn test_joined_unit_of_work_commits_once() {
        let (service, _) = service();
        let mut tx = service.begin().await.unwrap();
        let result = async {
            let a = service.create_in(&mut tx, input("a")).await?;
            service.update_in(&mut tx, a.meta.id, edit(&a, "A")).await
        }
        .await;
        let updated = service.finish(tx, result).await.unwrap();
        assert_eq!(updated.meta.version, 1);
    }

    #[tokio::test]
    async fn test_failed_unit_of_work_is_rolled_back() {
        let (service, _) = service();
        let mut tx = service.begin().await.unwrap();
        let result: Result<()> = async {
            service.create_in(&mut tx, input("temp")).await?;
            Err(Error::BadRequest("abort".into()))
        }
        .await;
        assert!(service.finish(tx, result).await.is_err());
        assert!(service.get_many(vec![], vec![]).await.unwrap().is_empty());
    }

    #[test]
    fn test_create_input_into_entity() {
        let meta = EntityMeta::fresh(3, Utc::now());
        let entity = input("blog").into_entity(meta.clone());
        assert_eq!(entity.meta, meta);
    }
}
