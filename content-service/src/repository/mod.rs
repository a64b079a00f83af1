//! Storage abstractions for CRUD over entity tables
//!
//! This module provides the generic contracts every backend implements and
//! the query vocabulary shared by them:
//!
//! # Features
//!
//! - **Generic CRUD**: [`Repository`] over any [`Entity`](crate::model::Entity)
//! - **Units of work**: [`TransactionManager`] hands out explicit handles
//! - **Filtering**: [`Filter`] over columns, EAV attributes and free text
//! - **Ordering**: [`Sort`] with nulls last on ascending order
//! - **Type maps**: [`ScalarType`] per column and per attribute
//!
//! Two backends ship with the crate: [`memory`] (always available, used by
//! tests and local runs) and `postgres` behind the `database` feature.
//!
//! # Example
//!
//! ```rust
//! use content_service::repository::{filter, Filter, FilterOperator, Sort};
//!
//! let filters = vec![
//!     filter::equal("code", "blog"),
//!     "createdAt:gte:2024-01-01".parse::<Filter>().unwrap(),
//! ];
//! assert_eq!(filters[1].operator(), Some(FilterOperator::GreaterThanOrEqual));
//!
//! let sorts = vec![Sort::desc("createdAt"), "@priority:asc".parse().unwrap()];
//! assert!(sorts[1].is_attribute());
//! ```

mod error;
pub mod filter;
pub mod memory;
#[cfg(feature = "database")]
pub mod postgres;
pub mod sort;
pub mod sql;
mod traits;
mod types;

pub use error::{RepositoryError, RepositoryErrorKind, RepositoryOperation};
pub use filter::{Filter, FilterError, FilterOperator, FilterValue};
pub use sort::{OrderDirection, Sort};
pub use traits::{Repository, RepositoryResult, TransactionManager};
pub use types::{infer_column_type, ScalarType, ScalarValue, TypeMap, UnknownDataType};
