//! In-process storage backend
//!
//! [`MemoryStore`] keeps every table as JSON rows keyed by id and hands out
//! one unit of work at a time: a [`MemoryTransaction`] owns the store's lock
//! until it is committed, rolled back or dropped. The first write of a unit
//! snapshots the store; rollback and drop restore the snapshot.
//!
//! [`MemoryRepository`] implements [`Repository`] for any [`Entity`],
//! including filter evaluation over EAV attributes read from the
//! `attributes` and `attribute_values` tables of the same store.
//!
//! Every operation that reads or writes rows counts one round trip; see
//! [`MemoryStore::round_trips`].
//!
//! # Example
//!
//! ```rust
//! use content_service::domain::{CreatePostType, PostType};
//! use content_service::repository::memory::{MemoryRepository, MemoryStore};
//! use content_service::repository::{Repository, TransactionManager};
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let store = MemoryStore::new();
//! let repo: MemoryRepository<PostType, CreatePostType> = MemoryRepository::new(store.clone());
//!
//! let mut tx = store.begin().await.unwrap();
//! repo.insert(&mut tx, CreatePostType { code: "page".into(), name: "Page".into() })
//!     .await
//!     .unwrap();
//! store.rollback(tx).await.unwrap();
//!
//! let mut tx = store.begin().await.unwrap();
//! assert!(repo.find_by_id(&mut tx, 1).await.unwrap().is_none());
//! # });
//! ```

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{self, AtomicU64};
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::Value;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

use super::error::{RepositoryError, RepositoryOperation};
use super::filter::{like_pattern, Filter, FilterError, FilterOperator, FilterValue};
use super::sort::{OrderDirection, Sort};
use super::traits::{Repository, RepositoryResult, TransactionManager};
use super::types::{infer_column_type, ScalarType, ScalarValue, TypeMap};
use crate::domain::{Attribute, AttributeValue};
use crate::model::{CreateFor, Entity, EntityMeta};

#[derive(Debug, Clone, Default)]
struct MemoryTable {
    rows: BTreeMap<i32, Value>,
    last_id: i32,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    tables: HashMap<&'static str, MemoryTable>,
}

/// Shared in-process store and its transaction manager
///
/// Cloning is cheap; clones share the same tables and counter.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    round_trips: Arc<AtomicU64>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of storage round trips performed so far
    ///
    /// Operations that short-circuit on empty input do not count.
    #[must_use]
    pub fn round_trips(&self) -> u64 {
        self.round_trips.load(atomic::Ordering::SeqCst)
    }
}

impl TransactionManager for MemoryStore {
    type Tx = MemoryTransaction;

    async fn begin(&self) -> RepositoryResult<MemoryTransaction> {
        let state = Arc::clone(&self.state).lock_owned().await;
        Ok(MemoryTransaction {
            state,
            snapshot: None,
            round_trips: Arc::clone(&self.round_trips),
        })
    }

    async fn commit(&self, mut tx: MemoryTransaction) -> RepositoryResult<()> {
        tx.snapshot = None;
        Ok(())
    }

    async fn rollback(&self, mut tx: MemoryTransaction) -> RepositoryResult<()> {
        tx.restore();
        Ok(())
    }
}

/// Exclusive unit of work over a [`MemoryStore`]
///
/// Dropping an uncommitted transaction discards its writes.
pub struct MemoryTransaction {
    state: OwnedMutexGuard<MemoryState>,
    snapshot: Option<MemoryState>,
    round_trips: Arc<AtomicU64>,
}

impl MemoryTransaction {
    fn round_trip(&self) {
        self.round_trips.fetch_add(1, atomic::Ordering::SeqCst);
    }

    fn table(&self, name: &str) -> Option<&MemoryTable> {
        self.state.tables.get(name)
    }

    fn table_mut(&mut self, name: &'static str) -> &mut MemoryTable {
        if self.snapshot.is_none() {
            self.snapshot = Some((*self.state).clone());
        }
        self.state.tables.entry(name).or_default()
    }

    fn restore(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            *self.state = snapshot;
        }
    }

    /// Decode every row of `T`'s table in id order
    fn scan<T: Entity>(&self, operation: RepositoryOperation) -> RepositoryResult<Vec<T>> {
        self.table(T::TABLE)
            .map(|table| {
                table
                    .rows
                    .values()
                    .map(|row| decode(row, operation))
                    .collect()
            })
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        self.restore();
    }
}

impl fmt::Debug for MemoryTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTransaction")
            .field("dirty", &self.snapshot.is_some())
            .finish()
    }
}

fn decode<T: Entity>(row: &Value, operation: RepositoryOperation) -> RepositoryResult<T> {
    serde_json::from_value(row.clone()).map_err(|e| {
        RepositoryError::serialization_error(operation, e.to_string())
            .with_entity(T::ENTITY_TYPE, row.get("id").map(Value::to_string).unwrap_or_default())
    })
}

fn encode<T: Entity>(entity: &T, operation: RepositoryOperation) -> RepositoryResult<Value> {
    serde_json::to_value(entity).map_err(|e| {
        RepositoryError::serialization_error(operation, e.to_string())
            .with_entity(T::ENTITY_TYPE, entity.id().to_string())
    })
}

/// Generic repository over a [`MemoryStore`]
pub struct MemoryRepository<E, C> {
    store: MemoryStore,
    _marker: PhantomData<fn() -> (E, C)>,
}

impl<E, C> MemoryRepository<E, C> {
    /// Create a repository over `store`
    #[must_use]
    pub fn new(store: MemoryStore) -> Self {
        Self {
            store,
            _marker: PhantomData,
        }
    }

    /// The backing store
    #[must_use]
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }
}

impl<E, C> Clone for MemoryRepository<E, C> {
    fn clone(&self) -> Self {
        Self::new(self.store.clone())
    }
}

impl<E, C> fmt::Debug for MemoryRepository<E, C>
where
    E: Entity,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryRepository")
            .field("table", &E::TABLE)
            .finish()
    }
}

impl<E, C> MemoryRepository<E, C>
where
    E: Entity,
    C: CreateFor<E>,
{
    fn remove_where(
        tx: &mut MemoryTransaction,
        operation: RepositoryOperation,
        matches: impl Fn(&E) -> bool,
    ) -> RepositoryResult<u64> {
        let doomed: Vec<i32> = tx
            .scan::<E>(operation)?
            .into_iter()
            .filter(|entity| matches(entity))
            .map(|entity| entity.id())
            .collect();
        if doomed.is_empty() {
            return Ok(0);
        }
        let table = tx.table_mut(E::TABLE);
        for id in &doomed {
            table.rows.remove(id);
        }
        Ok(doomed.len() as u64)
    }

    fn select(
        tx: &MemoryTransaction,
        filters: &[Filter],
        sorts: &[Sort],
        operation: RepositoryOperation,
    ) -> RepositoryResult<Vec<E>> {
        for filter in filters {
            filter.validate()?;
        }

        let needs_eav = filters.iter().any(|f| matches!(f, Filter::Attribute { .. }))
            || sorts.iter().any(Sort::is_attribute);
        let eav = if needs_eav {
            EavIndex::load(tx, E::ENTITY_TYPE, operation)?
        } else {
            EavIndex::default()
        };
        eav.check_names::<E>(filters, sorts)?;

        let mut entities: Vec<E> = tx
            .scan::<E>(operation)?
            .into_iter()
            .filter(|entity| filters.iter().all(|filter| eav.matches(entity, filter)))
            .collect();

        if !sorts.is_empty() {
            entities.sort_by(|a, b| {
                sorts
                    .iter()
                    .map(|sort| compare_for_sort(sort, &eav.sort_key(a, sort), &eav.sort_key(b, sort)))
                    .find(|ord| ord.is_ne())
                    .unwrap_or(Ordering::Equal)
            });
        }
        Ok(entities)
    }
}

impl<E, C> Repository for MemoryRepository<E, C>
where
    E: Entity,
    C: CreateFor<E>,
{
    type Entity = E;
    type Create = C;
    type Tx = MemoryTransaction;

    async fn find_by_id(&self, tx: &mut MemoryTransaction, id: i32) -> RepositoryResult<Option<E>> {
        tx.round_trip();
        tx.table(E::TABLE)
            .and_then(|table| table.rows.get(&id))
            .map(|row| decode(row, RepositoryOperation::FindById))
            .transpose()
    }

    async fn find_by_ids(&self, tx: &mut MemoryTransaction, ids: &[i32]) -> RepositoryResult<Vec<E>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        tx.round_trip();
        let Some(table) = tx.table(E::TABLE) else {
            return Ok(Vec::new());
        };
        table
            .rows
            .iter()
            .filter(|(id, _)| ids.contains(id))
            .map(|(_, row)| decode(row, RepositoryOperation::FindById))
            .collect()
    }

    async fn find_by_uid(&self, tx: &mut MemoryTransaction, uid: Uuid) -> RepositoryResult<Option<E>> {
        tx.round_trip();
        Ok(tx
            .scan::<E>(RepositoryOperation::FindByUid)?
            .into_iter()
            .find(|entity| entity.uid() == uid))
    }

    async fn find_by_uids(
        &self,
        tx: &mut MemoryTransaction,
        uids: &[Uuid],
    ) -> RepositoryResult<Vec<E>> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }
        tx.round_trip();
        Ok(tx
            .scan::<E>(RepositoryOperation::FindByUid)?
            .into_iter()
            .filter(|entity| uids.contains(&entity.uid()))
            .collect())
    }

    async fn exists(&self, tx: &mut MemoryTransaction, id: i32) -> RepositoryResult<bool> {
        tx.round_trip();
        Ok(tx
            .table(E::TABLE)
            .is_some_and(|table| table.rows.contains_key(&id)))
    }

    async fn insert(&self, tx: &mut MemoryTransaction, input: C) -> RepositoryResult<E> {
        tx.round_trip();
        let id = tx.table(E::TABLE).map_or(0, |table| table.last_id) + 1;
        let entity = input.into_entity(EntityMeta::fresh(id, Utc::now()));
        let row = encode(&entity, RepositoryOperation::Insert)?;

        let table = tx.table_mut(E::TABLE);
        table.rows.insert(id, row);
        table.last_id = id;

        debug!(table = E::TABLE, id, "row inserted");
        Ok(entity)
    }

    async fn update(&self, tx: &mut MemoryTransaction, entity: E) -> RepositoryResult<E> {
        tx.round_trip();
        let id = entity.id();
        let stored: Option<E> = tx
            .table(E::TABLE)
            .and_then(|table| table.rows.get(&id))
            .map(|row| decode(row, RepositoryOperation::Update))
            .transpose()?;

        let stored = match stored {
            Some(stored) if stored.version() == entity.version() => stored,
            _ => return Err(RepositoryError::conflict(E::ENTITY_TYPE, id)),
        };

        let previous = stored.meta();
        let now = Utc::now();
        let floor = previous.updated_at + Duration::microseconds(1);
        let mut updated = entity;
        *updated.meta_mut() = EntityMeta {
            id,
            uid: previous.uid,
            version: previous.version + 1,
            created_at: previous.created_at,
            updated_at: now.max(floor),
        };

        let row = encode(&updated, RepositoryOperation::Update)?;
        tx.table_mut(E::TABLE).rows.insert(id, row);
        Ok(updated)
    }

    async fn delete_by_id(&self, tx: &mut MemoryTransaction, id: i32) -> RepositoryResult<u64> {
        tx.round_trip();
        let present = tx
            .table(E::TABLE)
            .is_some_and(|table| table.rows.contains_key(&id));
        if !present {
            return Ok(0);
        }
        tx.table_mut(E::TABLE).rows.remove(&id);
        Ok(1)
    }

    async fn delete_by_ids(&self, tx: &mut MemoryTransaction, ids: &[i32]) -> RepositoryResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        tx.round_trip();
        Self::remove_where(tx, RepositoryOperation::Delete, |entity| {
            ids.contains(&entity.id())
        })
    }

    async fn delete_by_uid(&self, tx: &mut MemoryTransaction, uid: Uuid) -> RepositoryResult<u64> {
        tx.round_trip();
        Self::remove_where(tx, RepositoryOperation::Delete, |entity| entity.uid() == uid)
    }

    async fn delete_by_uids(
        &self,
        tx: &mut MemoryTransaction,
        uids: &[Uuid],
    ) -> RepositoryResult<u64> {
        if uids.is_empty() {
            return Ok(0);
        }
        tx.round_trip();
        Self::remove_where(tx, RepositoryOperation::Delete, |entity| {
            uids.contains(&entity.uid())
        })
    }

    async fn find_many(
        &self,
        tx: &mut MemoryTransaction,
        filters: &[Filter],
        sorts: &[Sort],
    ) -> RepositoryResult<Vec<E>> {
        tx.round_trip();
        let found = Self::select(tx, filters, sorts, RepositoryOperation::FindMany)?;
        debug!(
            table = E::TABLE,
            filters = filters.len(),
            sorts = sorts.len(),
            rows = found.len(),
            "find_many"
        );
        Ok(found)
    }

    async fn count(&self, tx: &mut MemoryTransaction, filters: &[Filter]) -> RepositoryResult<u64> {
        tx.round_trip();
        Ok(Self::select(tx, filters, &[], RepositoryOperation::Count)?.len() as u64)
    }

    async fn attribute_type_map(&self, tx: &mut MemoryTransaction) -> RepositoryResult<TypeMap> {
        tx.round_trip();
        let attributes = tx.scan::<Attribute>(RepositoryOperation::TypeMap)?;
        Ok(attribute_types(attributes, E::ENTITY_TYPE).collect())
    }
}

/// Declared attributes of an entity type with their parsed data types
///
/// Definitions with an unrecognized data type are skipped.
fn attribute_types(
    attributes: Vec<Attribute>,
    entity_type: &'static str,
) -> impl Iterator<Item = (String, ScalarType)> {
    attributes
        .into_iter()
        .filter(move |attr| attr.entity_type == entity_type)
        .filter_map(|attr| match attr.data_type.parse::<ScalarType>() {
            Ok(ty) => Some((attr.name, ty)),
            Err(err) => {
                warn!(attribute = %attr.name, error = %err, "skipping attribute");
                None
            }
        })
}

/// Attribute definitions and values of one entity type
#[derive(Default)]
struct EavIndex {
    attributes: HashMap<String, (i32, ScalarType)>,
    values: HashMap<(i32, i32), AttributeValue>,
}

impl EavIndex {
    fn load(
        tx: &MemoryTransaction,
        entity_type: &'static str,
        operation: RepositoryOperation,
    ) -> RepositoryResult<Self> {
        let definitions = tx.scan::<Attribute>(operation)?;
        let ids: HashMap<String, i32> = definitions
            .iter()
            .filter(|attr| attr.entity_type == entity_type)
            .map(|attr| (attr.name.clone(), attr.meta.id))
            .collect();
        let attributes = attribute_types(definitions, entity_type)
            .filter_map(|(name, ty)| ids.get(&name).map(|id| (name, (*id, ty))))
            .collect();
        let values = tx
            .scan::<AttributeValue>(operation)?
            .into_iter()
            .filter(|value| value.entity_type == entity_type)
            .map(|value| ((value.attribute_id, value.entity_id), value))
            .collect();
        Ok(Self { attributes, values })
    }

    /// Every referenced property must be a column of `E` and every
    /// attribute a declared one
    fn check_names<E: Entity>(&self, filters: &[Filter], sorts: &[Sort]) -> Result<(), FilterError> {
        let properties = filters
            .iter()
            .filter_map(|filter| match filter {
                Filter::Property { name, .. } => Some((name, false)),
                Filter::Attribute { name, .. } => Some((name, true)),
                Filter::Search { .. } => None,
            })
            .chain(sorts.iter().map(|sort| match sort {
                Sort::Field { name, .. } => (name, false),
                Sort::Attribute { name, .. } => (name, true),
            }));

        for (name, attribute) in properties {
            if attribute && !self.attributes.contains_key(name) {
                return Err(FilterError::AttributeNotFound(name.clone()));
            }
            if !attribute && E::column(name).is_none() {
                return Err(FilterError::FieldNotFound(name.clone()));
            }
        }
        Ok(())
    }

    fn attribute<E: Entity>(&self, entity: &E, name: &str) -> Option<ScalarValue> {
        let (attribute_id, ty) = self.attributes.get(name)?;
        self.values
            .get(&(*attribute_id, entity.id()))?
            .value(*ty)
    }

    fn sort_key<E: Entity>(&self, entity: &E, sort: &Sort) -> Option<ScalarValue> {
        match sort {
            Sort::Field { name, .. } => entity.field(name),
            Sort::Attribute { name, .. } => self.attribute(entity, name),
        }
    }

    fn matches<E: Entity>(&self, entity: &E, filter: &Filter) -> bool {
        match filter {
            Filter::Property {
                name,
                operator,
                value,
            } => evaluate(entity.field(name).as_ref(), *operator, value),
            Filter::Attribute {
                name,
                operator,
                value,
            } => evaluate(self.attribute(entity, name).as_ref(), *operator, value),
            Filter::Search { text } => {
                let needle = text.to_lowercase();
                E::COLUMNS
                    .iter()
                    .filter(|column| infer_column_type(column.name, column.sql_type) == ScalarType::String)
                    .filter_map(|column| entity.domain_field(column.name))
                    .any(|value| {
                        value
                            .as_str()
                            .is_some_and(|s| s.to_lowercase().contains(&needle))
                    })
            }
        }
    }
}

fn compare_for_sort(sort: &Sort, a: &Option<ScalarValue>, b: &Option<ScalarValue>) -> Ordering {
    let descending = sort.direction() == OrderDirection::Descending;
    match (a, b) {
        (None, None) => Ordering::Equal,
        // nulls last ascending, first descending
        (None, Some(_)) if descending => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) if descending => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => {
            let ord = a.compare(b).unwrap_or(Ordering::Equal);
            if descending {
                ord.reverse()
            } else {
                ord
            }
        }
    }
}

/// Evaluate one predicate with SQL NULL semantics
fn evaluate(actual: Option<&ScalarValue>, operator: FilterOperator, value: &FilterValue) -> bool {
    use FilterOperator as Op;

    match operator {
        Op::IsNull => return actual.is_none(),
        Op::NotNull => return actual.is_some(),
        _ => {}
    }
    let Some(actual) = actual else {
        return false;
    };

    match (operator, value) {
        (Op::Equal, FilterValue::Single(v)) => actual.compare(v) == Some(Ordering::Equal),
        (Op::NotEqual, FilterValue::Single(v)) => actual.compare(v).is_some_and(Ordering::is_ne),
        (Op::GreaterThan, FilterValue::Single(v)) => actual.compare(v).is_some_and(Ordering::is_gt),
        (Op::GreaterThanOrEqual, FilterValue::Single(v)) => {
            actual.compare(v).is_some_and(Ordering::is_ge)
        }
        (Op::LessThan, FilterValue::Single(v)) => actual.compare(v).is_some_and(Ordering::is_lt),
        (Op::LessThanOrEqual, FilterValue::Single(v)) => {
            actual.compare(v).is_some_and(Ordering::is_le)
        }
        (Op::Like, FilterValue::Single(ScalarValue::String(pattern))) => {
            like_matches(&actual.to_string(), &like_pattern(pattern))
        }
        (Op::NotLike, FilterValue::Single(ScalarValue::String(pattern))) => {
            !like_matches(&actual.to_string(), &like_pattern(pattern))
        }
        (Op::In, FilterValue::List(items)) => items
            .iter()
            .any(|item| actual.compare(item) == Some(Ordering::Equal)),
        (Op::NotIn, FilterValue::List(items)) => items
            .iter()
            .all(|item| actual.compare(item).is_some_and(Ordering::is_ne)),
        (Op::Between, FilterValue::Range(start, end)) => within(actual, start, end),
        (Op::NotBetween, FilterValue::Range(start, end)) => {
            actual.compare(start).is_some() && actual.compare(end).is_some() && !within(actual, start, end)
        }
        _ => false,
    }
}

fn within(actual: &ScalarValue, start: &ScalarValue, end: &ScalarValue) -> bool {
    actual.compare(start).is_some_and(Ordering::is_ge) && actual.compare(end).is_some_and(Ordering::is_le)
}

/// SQL LIKE matching: `%` is any run of characters, `_` exactly one
fn like_matches(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();

    let (mut t, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('%') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some('_') => {
                t += 1;
                p += 1;
            }
            Some(c) if *c == text[t] => {
                t += 1;
                p += 1;
            }
            _ => match backtrack {
                Some((star, start)) => {
                    p = star + 1;
                    t = start + 1;
                    backtrack = Some((star, start + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|c| *c == '%')
}
