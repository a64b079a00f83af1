//! Type-map cache
//!
//! Memoizes the column and attribute type maps of each table, keyed by
//! `(namespace, table)`. The cache is an explicit object shared through an
//! `Arc`; services receive it at construction and tests can [`clear`] it.
//!
//! There is no eviction and no TTL. Column maps are static for the lifetime
//! of the process; attribute maps are dropped whenever attribute definitions
//! are written (see [`clear_namespace`]). Two callers computing the same
//! missing entry at the same time may both run their loader; the last write
//! wins.
//!
//! [`clear`]: TypeMapCache::clear
//! [`clear_namespace`]: TypeMapCache::clear_namespace
//!
//! # Example
//!
//! ```rust
//! use content_service::cache::{CacheNamespace, TypeMapCache};
//! use content_service::repository::{ScalarType, TypeMap};
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let cache = TypeMapCache::new();
//! let map = cache
//!     .get_or_compute(CacheNamespace::FieldTypeMap, "posts", || async {
//!         Ok::<_, std::convert::Infallible>(TypeMap::from([("id".to_string(), ScalarType::Int)]))
//!     })
//!     .await
//!     .unwrap();
//! assert_eq!(cache.get(CacheNamespace::FieldTypeMap, "posts"), Some(map));
//! # });
//! ```

use std::fmt;
use std::future::Future;

use dashmap::DashMap;

use crate::repository::TypeMap;

/// Partition of the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheNamespace {
    /// Column type maps
    FieldTypeMap,
    /// EAV attribute type maps
    AttributeTypeMap,
}

impl fmt::Display for CacheNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FieldTypeMap => write!(f, "FIELD_TYPE_MAP"),
            Self::AttributeTypeMap => write!(f, "ATTRIBUTE_TYPE_MAP"),
        }
    }
}

/// Concurrent memo of type maps per `(namespace, table)`
#[derive(Debug, Default)]
pub struct TypeMapCache {
    entries: DashMap<(CacheNamespace, String), TypeMap>,
}

impl TypeMapCache {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached map, or run `loader` once and cache its result
    ///
    /// Loader errors are returned and not cached, so the next call retries.
    ///
    /// # Errors
    ///
    /// Returns whatever error the loader produced.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        namespace: CacheNamespace,
        key: &str,
        loader: F,
    ) -> Result<TypeMap, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<TypeMap, E>>,
    {
        if let Some(cached) = self.get(namespace, key) {
            tracing::debug!(namespace = %namespace, key, "type map cache hit");
            return Ok(cached);
        }

        let computed = loader().await?;
        tracing::debug!(
            namespace = %namespace,
            key,
            entries = computed.len(),
            "type map computed"
        );
        self.entries
            .insert((namespace, key.to_string()), computed.clone());
        Ok(computed)
    }

    /// Overwrite an entry unconditionally
    pub async fn update<F, Fut, E>(
        &self,
        namespace: CacheNamespace,
        key: &str,
        supplier: F,
    ) -> Result<TypeMap, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<TypeMap, E>>,
    {
        let value = supplier().await?;
        self.entries.insert((namespace, key.to_string()), value.clone());
        Ok(value)
    }

    /// Peek at an entry without computing it
    #[must_use]
    pub fn get(&self, namespace: CacheNamespace, key: &str) -> Option<TypeMap> {
        self.entries
            .get(&(namespace, key.to_string()))
            .map(|entry| entry.value().clone())
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Drop every entry of one namespace
    pub fn clear_namespace(&self, namespace: CacheNamespace) {
        self.entries.retain(|(ns, _), _| *ns != namespace);
    }

    /// Number of cached entries across namespaces
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is cached
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
