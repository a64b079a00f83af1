//! # content-service
//!
//! Backend core of a content management system: post types, posts and
//! dynamically declared EAV attributes behind a generic repository with
//! optimistic concurrency control.
//!
//! ## Features
//!
//! - **Generic repositories**: one [`Repository`](repository::Repository)
//!   contract over every entity kind, with version-conditioned updates
//! - **Filter / sort DSL**: typed filters with an operator/value validation
//!   table and a textual `name:operator:value[:dataType]` encoding
//! - **EAV attributes**: filter and sort on attributes declared at runtime
//! - **Explicit units of work**: every storage call takes the transaction
//!   handle it runs in
//! - **Type-map cache**: column and attribute types memoized per table
//! - **Storage backends**: in-memory store, PostgreSQL through `sqlx`
//!   (feature `database`)
//!
//! ## Example
//!
//! ```rust,no_run
//! use content_service::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     init_tracing(&config)?;
//!
//!     let app = build_router(&config).await?;
//!     Server::new(config).serve(app).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod cache;
pub mod config;
#[cfg(feature = "database")]
pub mod database;
pub mod domain;
pub mod error;
pub mod model;
pub mod observability;
pub mod repository;
pub mod server;
pub mod service;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cache::{CacheNamespace, TypeMapCache};
    pub use crate::config::{Config, StorageBackend};
    pub use crate::domain::{
        Attribute, AttributeService, AttributeValue, AttributeValueService, CreateAttribute,
        CreateAttributeValue, CreatePost, CreatePostType, Post, PostService, PostType,
        PostTypeService,
    };
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::model::{CreateFor, Entity, EntityMeta};
    pub use crate::observability::init_tracing;
    pub use crate::repository::memory::{MemoryRepository, MemoryStore};
    #[cfg(feature = "database")]
    pub use crate::repository::postgres::{PgRepository, PgTransactionManager};
    pub use crate::repository::{
        filter, Filter, FilterOperator, FilterValue, OrderDirection, Repository, RepositoryError,
        RepositoryErrorKind, ScalarType, ScalarValue, Sort, TransactionManager, TypeMap,
    };
    pub use crate::server::{build_router, Server};
    pub use crate::service::{BaseService, EntityRules, NoRules};
}
