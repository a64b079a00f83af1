//! EAV attributes
//!
//! An [`Attribute`] declares a typed field for one entity kind (its
//! `entityType`); an [`AttributeValue`] stores the value of that field for
//! one entity, in the column matching the declared type. Attribute filters
//! and sorts on any repository resolve through these two tables.
//!
//! # Example
//!
//! ```rust
//! use content_service::domain::{Attribute, CreateAttribute, CreateAttributeValue, PostType};
//! use content_service::model::{CreateFor, Entity, EntityMeta};
//!
//! let priority: Attribute = CreateAttribute::new(PostType::ENTITY_TYPE, "priority", "int")
//!     .into_entity(EntityMeta::fresh(1, chrono::Utc::now()));
//!
//! let value = CreateAttributeValue::for_attribute(&priority, 7, "3").unwrap();
//! assert_eq!(value.value().to_string(), "3");
//! ```

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::{CacheNamespace, TypeMapCache};
use crate::error::{Error, Result};
use crate::model::{ColumnDef, CreateFor, Entity, EntityMeta};
use crate::repository::{filter, Repository, ScalarType, ScalarValue};
use crate::service::{BaseService, EntityRules};

/// Declaration of a dynamic field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct Attribute {
    /// Identity, version and timestamps
    #[serde(flatten)]
    #[cfg_attr(feature = "database", sqlx(flatten))]
    pub meta: EntityMeta,
    /// Field name, unique per entity type
    pub name: String,
    /// Entity kind the field extends (e.g. `post_type`)
    pub entity_type: String,
    /// Data type token (`int`, `string`, `datetime`, ...)
    pub data_type: String,
}

impl Attribute {
    /// Parsed data type
    ///
    /// # Errors
    ///
    /// `BadRequest` when the stored token is not a known data type.
    pub fn scalar_type(&self) -> Result<ScalarType> {
        self.data_type
            .parse()
            .map_err(|e: crate::repository::UnknownDataType| Error::BadRequest(e.to_string()))
    }
}

impl Entity for Attribute {
    const TABLE: &'static str = "attributes";
    const ENTITY_TYPE: &'static str = "attribute";
    const COLUMNS: &'static [ColumnDef] = &[
        ColumnDef::new("name", "name", "text"),
        ColumnDef::new("entityType", "entity_type", "text"),
        ColumnDef::new("dataType", "data_type", "text"),
    ];

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn domain_field(&self, name: &str) -> Option<ScalarValue> {
        match name {
            "name" => Some(self.name.as_str().into()),
            "entityType" => Some(self.entity_type.as_str().into()),
            "dataType" => Some(self.data_type.as_str().into()),
            _ => None,
        }
    }
}

/// Fields supplied when declaring an attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAttribute {
    /// Field name
    pub name: String,
    /// Entity kind the field extends
    pub entity_type: String,
    /// Data type token
    pub data_type: String,
}

impl CreateAttribute {
    /// Declare `name` of type `data_type` on `entity_type`
    pub fn new(
        entity_type: impl Into<String>,
        name: impl Into<String>,
        data_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            entity_type: entity_type.into(),
            data_type: data_type.into(),
        }
    }
}

impl CreateFor<Attribute> for CreateAttribute {
    fn into_entity(self, meta: EntityMeta) -> Attribute {
        Attribute {
            meta,
            name: self.name,
            entity_type: self.entity_type,
            data_type: self.data_type,
        }
    }
}

/// Value of one attribute for one entity
///
/// Exactly one typed column is populated, the one matching the attribute's
/// data type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct AttributeValue {
    /// Identity, version and timestamps
    #[serde(flatten)]
    #[cfg_attr(feature = "database", sqlx(flatten))]
    pub meta: EntityMeta,
    /// Declaring attribute
    pub attribute_id: i32,
    /// Entity the value belongs to
    pub entity_id: i32,
    /// Kind of that entity
    pub entity_type: String,
    /// Set for `int` attributes
    pub int_value: Option<i32>,
    /// Set for `float` attributes
    pub double_value: Option<f64>,
    /// Set for `string` attributes
    pub string_value: Option<String>,
    /// Set for `bool` attributes
    pub boolean_value: Option<bool>,
    /// Set for `date` attributes
    pub date_value: Option<NaiveDate>,
    /// Set for `datetime` attributes
    pub datetime_value: Option<DateTime<Utc>>,
    /// Set for `time` attributes
    pub time_value: Option<NaiveTime>,
}

impl AttributeValue {
    /// Storage column holding values of type `ty`
    #[must_use]
    pub const fn value_column(ty: ScalarType) -> &'static str {
        match ty {
            ScalarType::Int => "int_value",
            ScalarType::Float => "double_value",
            ScalarType::String => "string_value",
            ScalarType::Bool => "boolean_value",
            ScalarType::Date => "date_value",
            ScalarType::Datetime => "datetime_value",
            ScalarType::Time => "time_value",
        }
    }

    /// Stored value read as type `ty`; `None` when that column is NULL
    #[must_use]
    pub fn value(&self, ty: ScalarType) -> Option<ScalarValue> {
        match ty {
            ScalarType::Int => self.int_value.map(Into::into),
            ScalarType::Float => self.double_value.map(Into::into),
            ScalarType::String => self.string_value.as_deref().map(Into::into),
            ScalarType::Bool => self.boolean_value.map(Into::into),
            ScalarType::Date => self.date_value.map(Into::into),
            ScalarType::Datetime => self.datetime_value.map(Into::into),
            ScalarType::Time => self.time_value.map(Into::into),
        }
    }
}

impl Entity for AttributeValue {
    const TABLE: &'static str = "attribute_values";
    const ENTITY_TYPE: &'static str = "attribute_value";
    const COLUMNS: &'static [ColumnDef] = &[
        ColumnDef::new("intValue", "int_value", "integer"),
        ColumnDef::new("doubleValue", "double_value", "double precision"),
        ColumnDef::new("stringValue", "string_value", "text"),
        ColumnDef::new("booleanValue", "boolean_value", "boolean"),
        ColumnDef::new("dateValue", "date_value", "date"),
        ColumnDef::new("datetimeValue", "datetime_value", "timestamp with time zone"),
        ColumnDef::new("timeValue", "time_value", "time"),
        ColumnDef::new("attributeId", "attribute_id", "integer"),
        ColumnDef::new("entityId", "entity_id", "integer"),
        ColumnDef::new("entityType", "entity_type", "text"),
    ];

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn domain_field(&self, name: &str) -> Option<ScalarValue> {
        match name {
            "intValue" => self.value(ScalarType::Int),
            "doubleValue" => self.value(ScalarType::Float),
            "stringValue" => self.value(ScalarType::String),
            "booleanValue" => self.value(ScalarType::Bool),
            "dateValue" => self.value(ScalarType::Date),
            "datetimeValue" => self.value(ScalarType::Datetime),
            "timeValue" => self.value(ScalarType::Time),
            "attributeId" => Some(self.attribute_id.into()),
            "entityId" => Some(self.entity_id.into()),
            "entityType" => Some(self.entity_type.as_str().into()),
            _ => None,
        }
    }
}

/// A typed value ready to be stored for an attribute
///
/// Built with [`CreateAttributeValue::for_attribute`], which converts the
/// value to the attribute's declared type.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateAttributeValue {
    attribute_id: i32,
    entity_id: i32,
    entity_type: String,
    value: ScalarValue,
}

impl CreateAttributeValue {
    /// Value of `attribute` for the entity with id `entity_id`
    ///
    /// # Errors
    ///
    /// `BadRequest` when the attribute's data type is unknown or the value
    /// cannot be converted to it.
    pub fn for_attribute(
        attribute: &Attribute,
        entity_id: i32,
        value: impl Into<ScalarValue>,
    ) -> Result<Self> {
        let ty = attribute.scalar_type()?;
        let value = value.into();
        let converted = value
            .coerce_to(ty)
            .filter(|v| match v {
                ScalarValue::Int(n) => i32::try_from(*n).is_ok(),
                _ => true,
            })
            .ok_or_else(|| {
                Error::BadRequest(format!(
                    "'{}' is not a valid {} for attribute '{}'",
                    value, ty, attribute.name
                ))
            })?;
        Ok(Self {
            attribute_id: attribute.meta.id,
            entity_id,
            entity_type: attribute.entity_type.clone(),
            value: converted,
        })
    }

    /// The converted value
    #[must_use]
    pub fn value(&self) -> &ScalarValue {
        &self.value
    }
}

impl CreateFor<AttributeValue> for CreateAttributeValue {
    fn into_entity(self, meta: EntityMeta) -> AttributeValue {
        let mut row = AttributeValue {
            meta,
            attribute_id: self.attribute_id,
            entity_id: self.entity_id,
            entity_type: self.entity_type,
            int_value: None,
            double_value: None,
            string_value: None,
            boolean_value: None,
            date_value: None,
            datetime_value: None,
            time_value: None,
        };
        match self.value {
            ScalarValue::Int(n) => row.int_value = i32::try_from(n).ok(),
            ScalarValue::Float(n) => row.double_value = Some(n),
            ScalarValue::String(s) => row.string_value = Some(s),
            ScalarValue::Bool(b) => row.boolean_value = Some(b),
            ScalarValue::Date(d) => row.date_value = Some(d),
            ScalarValue::DateTime(dt) => row.datetime_value = Some(dt),
            ScalarValue::Time(t) => row.time_value = Some(t),
        }
        row
    }
}

/// Name, data type and `(entityType, name)` uniqueness
#[derive(Debug, Clone, Copy, Default)]
pub struct AttributeRules;

impl AttributeRules {
    fn check_shape(name: &str, entity_type: &str, data_type: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(Error::BadRequest("Attribute name must not be empty".to_string()));
        }
        if entity_type.trim().is_empty() {
            return Err(Error::BadRequest("Attribute entity type must not be empty".to_string()));
        }
        data_type
            .parse::<ScalarType>()
            .map(|_| ())
            .map_err(|e| Error::BadRequest(e.to_string()))
    }

    async fn holder_of<R>(
        repo: &R,
        tx: &mut R::Tx,
        entity_type: &str,
        name: &str,
    ) -> Result<Option<Attribute>>
    where
        R: Repository<Entity = Attribute>,
    {
        let filters = [
            filter::equal("entityType", entity_type),
            filter::equal("name", name),
        ];
        Ok(repo.find_many(tx, &filters, &[]).await?.pop())
    }
}

impl<R> EntityRules<R> for AttributeRules
where
    R: Repository<Entity = Attribute, Create = CreateAttribute>,
{
    async fn check_create(&self, repo: &R, tx: &mut R::Tx, input: &CreateAttribute) -> Result<()> {
        Self::check_shape(&input.name, &input.entity_type, &input.data_type)?;
        if Self::holder_of(repo, tx, &input.entity_type, &input.name)
            .await?
            .is_some()
        {
            return Err(Error::Conflict(format!(
                "Attribute '{}' already exists for {}",
                input.name, input.entity_type
            )));
        }
        Ok(())
    }

    async fn check_update(
        &self,
        repo: &R,
        tx: &mut R::Tx,
        current: &Attribute,
        next: &Attribute,
    ) -> Result<()> {
        Self::check_shape(&next.name, &next.entity_type, &next.data_type)?;
        match Self::holder_of(repo, tx, &next.entity_type, &next.name).await? {
            Some(holder) if holder.meta.id != current.meta.id => Err(Error::Conflict(format!(
                "Attribute '{}' already exists for {}",
                next.name, next.entity_type
            ))),
            _ => Ok(()),
        }
    }

    fn after_write(&self, cache: &TypeMapCache) {
        cache.clear_namespace(CacheNamespace::AttributeTypeMap);
    }
}

/// Service over attribute definitions
pub type AttributeService<R, M> = BaseService<R, M, AttributeRules>;

/// Service over attribute values
pub type AttributeValueService<R, M> = BaseService<R, M>;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::cache::{CacheNamespace, TypeMapCache};
    use crate::domain::{CreatePostType, PostType, PostTypeService};
    use crate::error::ErrorKind;
    use crate::repository::memory::{MemoryRepository, MemoryStore};
    use crate::repository::{Filter, FilterOperator};

    fn attribute(data_type: &str) -> Attribute {
        CreateAttribute::new("post_type", "rating", data_type)
            .into_entity(EntityMeta::fresh(4, Utc::now()))
    }

    #[test]
    fn test_value_conversion() {
        let value = CreateAttributeValue::for_attribute(&attribute("int"), 1, "5").unwrap();
        assert_eq!(value.value(), &ScalarValue::Int(5));

        let value = CreateAttributeValue::for_attribute(&attribute("float"), 1, 5_i64).unwrap();
        assert_eq!(value.value(), &ScalarValue::Float(5.0));

        let err = CreateAttributeValue::for_attribute(&attribute("int"), 1, "five").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);

        let err =
            CreateAttributeValue::for_attribute(&attribute("int"), 1, i64::from(i32::MAX) + 1)
                .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);

        let err = CreateAttributeValue::for_attribute(&attribute("blob"), 1, "x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }

    #[test]
    fn test_value_lands_in_typed_column() {
        let time = NaiveTime::from_hms_opt(9, 30, 0).unwrap();
        let row = CreateAttributeValue::for_attribute(&attribute("time"), 2, time)
            .unwrap()
            .into_entity(EntityMeta::fresh(1, Utc::now()));

        assert_eq!(row.time_value, Some(time));
        assert_eq!(row.int_value, None);
        assert_eq!(row.value(ScalarType::Time), Some(ScalarValue::Time(time)));
        assert_eq!(row.value(ScalarType::Int), None);
        assert_eq!(row.attribute_id, 4);
        assert_eq!(row.entity_type, "post_type");
    }

    #[test]
    fn test_value_columns() {
        assert_eq!(AttributeValue::value_column(ScalarType::Float), "double_value");
        assert_eq!(AttributeValue::value_column(ScalarType::Datetime), "datetime_value");
        for ty in [ScalarType::Int, ScalarType::Bool, ScalarType::Date] {
            let column = AttributeValue::value_column(ty);
            assert!(AttributeValue::COLUMNS.iter().any(|c| c.column == column));
        }
    }

    #[tokio::test]
    async fn test_attribute_rules() {
        let store = MemoryStore::new();
        let service: AttributeService<_, _> = AttributeService::new(
            Arc::new(MemoryRepository::<Attribute, CreateAttribute>::new(store.clone())),
            Arc::new(store),
            Arc::new(TypeMapCache::new()),
        );

        service
            .create(CreateAttribute::new("post_type", "rating", "int"))
            .await
            .unwrap();

        let duplicate = service
            .create(CreateAttribute::new("post_type", "rating", "string"))
            .await
            .unwrap_err();
        assert_eq!(duplicate.kind(), ErrorKind::Conflict);

        // same name on another entity kind
        service
            .create(CreateAttribute::new("post", "rating", "int"))
            .await
            .unwrap();

        let bad_type = service
            .create(CreateAttribute::new("post", "weight", "kilograms"))
            .await
            .unwrap_err();
        assert_eq!(bad_type.kind(), ErrorKind::BadRequest);

        let blank = service
            .create(CreateAttribute::new("post", "  ", "int"))
            .await
            .unwrap_err();
        assert_eq!(blank.kind(), ErrorKind::BadRequest);
    }

    #[tokio::test]
    async fn test_post_types_filtered_by_attribute() {
        let store = MemoryStore::new();
        let cache = Arc::new(TypeMapCache::new());
        let post_types: PostTypeService<_, _> = PostTypeService::new(
            Arc::new(MemoryRepository::<PostType, CreatePostType>::new(store.clone())),
            Arc::new(store.clone()),
            Arc::clone(&cache),
        );
        let attributes: AttributeService<_, _> = AttributeService::new(
            Arc::new(MemoryRepository::<Attribute, CreateAttribute>::new(store.clone())),
            Arc::new(store.clone()),
            Arc::clone(&cache),
        );
        let values: AttributeValueService<_, _> = AttributeValueService::new(
            Arc::new(MemoryRepository::<AttributeValue, CreateAttributeValue>::new(
                store.clone(),
            )),
            Arc::new(store.clone()),
            Arc::clone(&cache),
        );

        let featured = attributes
            .create(CreateAttribute::new(PostType::ENTITY_TYPE, "featured", "bool"))
            .await
            .unwrap();
        let blog = post_types
            .create(CreatePostType {
                code: "blog".into(),
                name: "Blog".into(),
            })
            .await
            .unwrap();
        post_types
            .create(CreatePostType {
                code: "page".into(),
                name: "Page".into(),
            })
            .await
            .unwrap();
        values
            .create(CreateAttributeValue::for_attribute(&featured, blog.meta.id, true).unwrap())
            .await
            .unwrap();

        let found = post_types
            .get_many(vec!["@featured:eq:true:bool".parse::<Filter>().unwrap()], vec![])
            .await
            .unwrap();
        assert_eq!(found, vec![blog]);

        let unknown = post_types
            .get_many(
                vec![Filter::attribute("missing", FilterOperator::IsNull, filter::FilterValue::None)],
                vec![],
            )
            .await
            .unwrap_err();
        assert_eq!(unknown.kind(), ErrorKind::BadRequest);
        assert!(cache
            .get(CacheNamespace::AttributeTypeMap, PostType::TABLE)
            .is_some());
    }

    #[tokio::test]
    async fn test_attribute_writes_refresh_cached_maps() {
        let store = MemoryStore::new();
        let cache = Arc::new(TypeMapCache::new());
        let post_types: PostTypeService<_, _> = PostTypeService::new(
            Arc::new(MemoryRepository::<PostType, CreatePostType>::new(store.clone())),
            Arc::new(store.clone()),
            Arc::clone(&cache),
        );
        let attributes: Arc<AttributeService<_, _>> = Arc::new(AttributeService::new(
            Arc::new(MemoryRepository::<Attribute, CreateAttribute>::new(store.clone())),
            Arc::new(store.clone()),
            Arc::clone(&cache),
        ));
        post_types
            .create(CreatePostType {
                code: "blog".into(),
                name: "Blog".into(),
            })
            .await
            .unwrap();

        // warm the cache with no attributes declared
        assert_eq!(post_types.get_many(vec![], vec![]).await.unwrap().len(), 1);
        assert!(post_types.get_attribute_type_map().await.unwrap().is_empty());

        let featured = attributes
            .create(CreateAttribute::new(PostType::ENTITY_TYPE, "featured", "bool"))
            .await
            .unwrap();
        let unset = post_types
            .get_many(vec!["@featured:isnull".parse::<Filter>().unwrap()], vec![])
            .await
            .unwrap();
        assert_eq!(unset.len(), 1);

        let renamed = attributes
            .update(
                featured.meta.id,
                Attribute {
                    name: "pinned".into(),
                    ..featured.clone()
                },
            )
            .await
            .unwrap();
        let map = post_types.get_attribute_type_map().await.unwrap();
        assert!(map.contains_key("pinned"));
        assert!(!map.contains_key("featured"));

        assert_eq!(attributes.delete_by_id(renamed.meta.id).await.unwrap(), 1);
        let err = post_types
            .get_many(vec!["@pinned:isnull".parse::<Filter>().unwrap()], vec![])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);

        // a definition loaded inside a unit that rolls back is not kept
        let in_unit = Arc::clone(&attributes);
        let lookups = post_types.clone();
        let err = post_types
            .create_with_related_operations(
                CreatePostType {
                    code: "page".into(),
                    name: "Page".into(),
                },
                move |tx, _| {
                    Box::pin(async move {
                        in_unit
                            .create_in(tx, CreateAttribute::new(PostType::ENTITY_TYPE, "draft", "bool"))
                            .await?;
                        let map = lookups.get_attribute_type_map_in(tx).await?;
                        assert!(map.contains_key("draft"));
                        Err(Error::BadRequest("abandoned".into()))
                    })
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
        assert!(!post_types
            .get_attribute_type_map()
            .await
            .unwrap()
            .contains_key("draft"));
    }
}
