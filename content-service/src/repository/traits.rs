//! Repository and transaction contracts
//!
//! Both traits use RPITIT (Return Position Impl Trait In Traits) so
//! implementations can be written with plain `async fn`.
//!
//! Every storage operation takes the unit-of-work handle explicitly. Work
//! that must be atomic shares one handle; there is no ambient "current
//! transaction".
//!
//! # Example
//!
//! ```rust
//! use content_service::domain::{CreatePostType, PostType};
//! use content_service::repository::memory::{MemoryRepository, MemoryStore};
//! use content_service::repository::{Repository, TransactionManager};
//!
//! # tokio_test_block(async {
//! let store = MemoryStore::new();
//! let repo: MemoryRepository<PostType, CreatePostType> = MemoryRepository::new(store.clone());
//!
//! let mut tx = store.begin().await.unwrap();
//! let created = repo
//!     .insert(&mut tx, CreatePostType { code: "blog".into(), name: "Blog".into() })
//!     .await
//!     .unwrap();
//! store.commit(tx).await.unwrap();
//! assert_eq!(created.meta.version, 0);
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use std::future::Future;

use uuid::Uuid;

use super::error::RepositoryError;
use super::filter::Filter;
use super::sort::Sort;
use super::types::TypeMap;
use crate::model::{CreateFor, Entity};

/// Result type for repository operations
pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

/// Begins, commits and rolls back units of work
///
/// Dropping an unfinished handle must discard its writes.
pub trait TransactionManager: Send + Sync + 'static {
    /// Unit-of-work handle threaded through repository calls
    type Tx: Send;

    /// Start a unit of work
    fn begin(&self) -> impl Future<Output = RepositoryResult<Self::Tx>> + Send;

    /// Make every write performed through `tx` durable
    fn commit(&self, tx: Self::Tx) -> impl Future<Output = RepositoryResult<()>> + Send;

    /// Discard every write performed through `tx`
    fn rollback(&self, tx: Self::Tx) -> impl Future<Output = RepositoryResult<()>> + Send;
}

/// Sole point of contact with storage for one entity kind
///
/// # Optimistic concurrency
///
/// [`Repository::update`] writes only when the stored version still equals
/// the version carried by the entity. The stored version becomes
/// `entity.version + 1`; when no row matched the call fails with
/// [`RepositoryErrorKind::Conflict`](super::RepositoryErrorKind::Conflict).
pub trait Repository: Send + Sync + 'static {
    /// Entity kind stored by this repository
    type Entity: Entity;

    /// Caller-suppliable creation input
    type Create: CreateFor<Self::Entity>;

    /// Unit-of-work handle
    type Tx: Send;

    /// Find an entity by id
    fn find_by_id(
        &self,
        tx: &mut Self::Tx,
        id: i32,
    ) -> impl Future<Output = RepositoryResult<Option<Self::Entity>>> + Send;

    /// Find entities by id; missing ids are omitted
    ///
    /// An empty slice returns an empty list without touching storage.
    fn find_by_ids(
        &self,
        tx: &mut Self::Tx,
        ids: &[i32],
    ) -> impl Future<Output = RepositoryResult<Vec<Self::Entity>>> + Send;

    /// Find an entity by uid
    fn find_by_uid(
        &self,
        tx: &mut Self::Tx,
        uid: Uuid,
    ) -> impl Future<Output = RepositoryResult<Option<Self::Entity>>> + Send;

    /// Find entities by uid; missing uids are omitted
    fn find_by_uids(
        &self,
        tx: &mut Self::Tx,
        uids: &[Uuid],
    ) -> impl Future<Output = RepositoryResult<Vec<Self::Entity>>> + Send;

    /// Check whether an entity exists
    fn exists(
        &self,
        tx: &mut Self::Tx,
        id: i32,
    ) -> impl Future<Output = RepositoryResult<bool>> + Send;

    /// Persist a new entity
    ///
    /// Assigns a UUIDv7 uid, version 0 and `createdAt = updatedAt = now`.
    fn insert(
        &self,
        tx: &mut Self::Tx,
        input: Self::Create,
    ) -> impl Future<Output = RepositoryResult<Self::Entity>> + Send;

    /// Write an entity back, conditioned on its version
    fn update(
        &self,
        tx: &mut Self::Tx,
        entity: Self::Entity,
    ) -> impl Future<Output = RepositoryResult<Self::Entity>> + Send;

    /// Delete by id, returning the number of removed rows
    fn delete_by_id(
        &self,
        tx: &mut Self::Tx,
        id: i32,
    ) -> impl Future<Output = RepositoryResult<u64>> + Send;

    /// Delete by ids; an empty slice returns 0 without touching storage
    fn delete_by_ids(
        &self,
        tx: &mut Self::Tx,
        ids: &[i32],
    ) -> impl Future<Output = RepositoryResult<u64>> + Send;

    /// Delete by uid
    fn delete_by_uid(
        &self,
        tx: &mut Self::Tx,
        uid: Uuid,
    ) -> impl Future<Output = RepositoryResult<u64>> + Send;

    /// Delete by uids
    fn delete_by_uids(
        &self,
        tx: &mut Self::Tx,
        uids: &[Uuid],
    ) -> impl Future<Output = RepositoryResult<u64>> + Send;

    /// Find entities matching every filter, ordered by the sorts in order
    ///
    /// Ties are left in natural storage order.
    fn find_many(
        &self,
        tx: &mut Self::Tx,
        filters: &[Filter],
        sorts: &[Sort],
    ) -> impl Future<Output = RepositoryResult<Vec<Self::Entity>>> + Send;

    /// Count entities matching every filter
    fn count(
        &self,
        tx: &mut Self::Tx,
        filters: &[Filter],
    ) -> impl Future<Output = RepositoryResult<u64>> + Send;

    /// Storage table; the type-map cache key
    fn table_name(&self) -> &'static str {
        <Self::Entity as Entity>::TABLE
    }

    /// Column types inferred from the entity's column table
    fn column_type_map(&self) -> TypeMap {
        <Self::Entity as Entity>::type_map()
    }

    /// EAV attribute types declared for this entity kind
    ///
    /// Repositories without EAV support report no attributes.
    fn attribute_type_map(
        &self,
        tx: &mut Self::Tx,
    ) -> impl Future<Output = RepositoryResult<TypeMap>> + Send {
        let _ = tx;
        async { Ok(TypeMap::new()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CreatePostType, PostType};
    use crate::model::EntityMeta;
    use crate::repository::ScalarType;
    use chrono::Utc;

    struct MockRepository;

    impl Repository for MockRepository {
        type Entity = PostType;
        type Create = CreatePostType;
        type Tx = ();

        async fn find_by_id(&self, _tx: &mut (), _id: i32) -> RepositoryResult<Option<PostType>> {
            Ok(None)
        }

        async fn find_by_ids(&self, _tx: &mut (), _ids: &[i32]) -> RepositoryResult<Vec<PostType>> {
            Ok(vec![])
        }

        async fn find_by_uid(&self, _tx: &mut (), _uid: Uuid) -> RepositoryResult<Option<PostType>> {
            Ok(None)
        }

        async fn find_by_uids(
            &self,
            _tx: &mut (),
            _uids: &[Uuid],
        ) -> RepositoryResult<Vec<PostType>> {
            Ok(vec![])
        }

        async fn exists(&self, _tx: &mut (), _id: i32) -> RepositoryResult<bool> {
            Ok(false)
        }

        async fn insert(&self, _tx: &mut (), input: CreatePostType) -> RepositoryResult<PostType> {
            Ok(input.into_entity(EntityMeta::fresh(1, Utc::now())))
        }

        async fn update(&self, _tx: &mut (), entity: PostType) -> RepositoryResult<PostType> {
            Err(RepositoryError::conflict("post_type", entity.meta.id))
        }

        async fn delete_by_id(&self, _tx: &mut (), _id: i32) -> RepositoryResult<u64> {
            Ok(0)
        }

        async fn delete_by_ids(&self, _tx: &mut (), _ids: &[i32]) -> RepositoryResult<u64> {
            Ok(0)
        }

        async fn delete_by_uid(&self, _tx: &mut (), _uid: Uuid) -> RepositoryResult<u64> {
            Ok(0)
        }

        async fn delete_by_uids(&self, _tx: &mut (), _uids: &[Uuid]) -> RepositoryResult<u64> {
            Ok(0)
        }

        async fn find_many(
            &self,
            _tx: &mut (),
            _filters: &[Filter],
            _sorts: &[Sort],
        ) -> RepositoryResult<Vec<PostType>> {
            Ok(vec![])
        }

        async fn count(&self, _tx: &mut (), _filters: &[Filter]) -> RepositoryResult<u64> {
            Ok(0)
        }
    }

    #[test]
    fn test_default_table_name() {
        assert_eq!(MockRepository.table_name(), "post_types");
    }

    #[test]
    fn test_default_column_type_map() {
        let map = MockRepository.column_type_map();
        assert_eq!(map.len(), 7);
        assert_eq!(map["id"], ScalarType::Int);
        assert_eq!(map["code"], ScalarType::String);
        assert_eq!(map["updatedAt"], ScalarType::Datetime);
    }

    #[tokio::test]
    async fn test_default_attribute_type_map_is_empty() {
        let map = MockRepository.attribute_type_map(&mut ()).await.unwrap();
        assert!(map.is_empty());
    }

    #[tokio::test]
    async fn test_mock_insert_assigns_meta() {
        let created = MockRepository
            .insert(
                &mut (),
                CreatePostType {
                    code: "blog".into(),
                    name: "Blog".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(created.meta.version, 0);
        assert_eq!(created.code, "blog");
    }
}
