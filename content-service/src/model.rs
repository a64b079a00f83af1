//! Entity model shared by every persisted object
//!
//! Each entity kind embeds an [`EntityMeta`] carrying the five server-assigned
//! base columns, describes its domain columns in a static [`ColumnDef`] table
//! and exposes them through an explicit accessor. Repositories are generic
//! over [`Entity`] and never reflect on field names.
//!
//! # Example
//!
//! ```rust
//! use content_service::model::Entity;
//! use content_service::domain::PostType;
//!
//! assert_eq!(<PostType as Entity>::TABLE, "post_types");
//! let names: Vec<&str> = PostType::columns().map(|c| c.name).collect();
//! assert_eq!(names, ["id", "uid", "version", "createdAt", "updatedAt", "code", "name"]);
//! ```

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::repository::{infer_column_type, ScalarValue, TypeMap};

/// Static description of one persisted column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    /// Property name as seen by filters and JSON (camelCase)
    pub name: &'static str,
    /// Storage column name
    pub column: &'static str,
    /// Storage type as declared in the schema
    pub sql_type: &'static str,
}

impl ColumnDef {
    /// Describe a column
    #[must_use]
    pub const fn new(name: &'static str, column: &'static str, sql_type: &'static str) -> Self {
        Self {
            name,
            column,
            sql_type,
        }
    }
}

/// Base columns present on every entity table
pub const BASE_COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("id", "id", "serial"),
    ColumnDef::new("uid", "uid", "uuid"),
    ColumnDef::new("version", "version", "integer"),
    ColumnDef::new("createdAt", "created_at", "timestamp with time zone"),
    ColumnDef::new("updatedAt", "updated_at", "timestamp with time zone"),
];

/// Server-assigned identity, version and timestamps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct EntityMeta {
    /// Surrogate key, positive
    pub id: i32,
    /// Time-ordered external identifier
    pub uid: Uuid,
    /// Optimistic concurrency version, 0 at creation
    pub version: i32,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Time of the last successful update
    pub updated_at: DateTime<Utc>,
}

impl EntityMeta {
    /// Metadata for a freshly inserted row
    ///
    /// The uid is a UUIDv7 so that uids sort in creation order.
    #[must_use]
    pub fn fresh(id: i32, now: DateTime<Utc>) -> Self {
        Self {
            id,
            uid: Uuid::now_v7(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Value of a base column by property name
    #[must_use]
    pub fn field(&self, name: &str) -> Option<ScalarValue> {
        match name {
            "id" => Some(self.id.into()),
            "uid" => Some(self.uid.to_string().into()),
            "version" => Some(self.version.into()),
            "createdAt" => Some(self.created_at.into()),
            "updatedAt" => Some(self.updated_at.into()),
            _ => None,
        }
    }
}

/// A persisted domain object
///
/// Implementors list their domain columns in `COLUMNS` (base columns are
/// added by [`Entity::columns`]) and return their values from
/// [`Entity::domain_field`]; `None` stands for NULL.
pub trait Entity: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Storage table, also the type-map cache key
    const TABLE: &'static str;

    /// Discriminator used by EAV attribute definitions and values
    const ENTITY_TYPE: &'static str;

    /// Domain columns, excluding the base columns
    const COLUMNS: &'static [ColumnDef];

    /// Borrow the base columns
    fn meta(&self) -> &EntityMeta;

    /// Mutably borrow the base columns
    fn meta_mut(&mut self) -> &mut EntityMeta;

    /// Value of a domain column by property name
    fn domain_field(&self, name: &str) -> Option<ScalarValue>;

    /// Value of any column by property name
    fn field(&self, name: &str) -> Option<ScalarValue> {
        self.meta()
            .field(name)
            .or_else(|| self.domain_field(name))
    }

    /// Base columns followed by domain columns
    fn columns() -> impl Iterator<Item = &'static ColumnDef> {
        BASE_COLUMNS.iter().chain(Self::COLUMNS.iter())
    }

    /// Look up a column by property name
    fn column(name: &str) -> Option<&'static ColumnDef> {
        Self::columns().find(|c| c.name == name)
    }

    /// Column type map derived from the column table
    fn type_map() -> TypeMap {
        Self::columns()
            .map(|c| (c.name.to_string(), infer_column_type(c.name, c.sql_type)))
            .collect()
    }

    /// Surrogate key
    fn id(&self) -> i32 {
        self.meta().id
    }

    /// External identifier
    fn uid(&self) -> Uuid {
        self.meta().uid
    }

    /// Optimistic concurrency version
    fn version(&self) -> i32 {
        self.meta().version
    }
}

/// Caller-suppliable fields of an entity kind
///
/// Never carries id, uid, version or timestamps; those come from the
/// repository as an [`EntityMeta`].
pub trait CreateFor<E: Entity>: Send + Sync + 'static {
    /// Combine the input with server-assigned metadata
    fn into_entity(self, meta: EntityMeta) -> E;
}
