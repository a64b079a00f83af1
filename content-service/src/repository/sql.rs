//! PostgreSQL statement rendering
//!
//! Pure functions that turn repository operations, [`Filter`]s and [`Sort`]s
//! into parameterized SQL. Values never appear in the SQL text: each one is
//! a numbered placeholder (`$1`, `$2`, ...) cast to the type it is compared
//! with, and the values travel in [`Statement::params`] in placeholder order.
//!
//! Attribute filters become `EXISTS` subqueries against `attribute_values`
//! joined with `attributes`, reading the value column of the attribute's
//! declared type.
//!
//! # Example
//!
//! ```rust
//! use content_service::domain::PostType;
//! use content_service::repository::{filter, sql, Sort, TypeMap};
//!
//! let statement = sql::find_many::<PostType>(
//!     &[filter::equal("code", "blog")],
//!     &[Sort::desc("createdAt")],
//!     &TypeMap::new(),
//! )
//! .unwrap();
//!
//! assert_eq!(
//!     statement.sql,
//!     "SELECT id, uid, version, created_at, updated_at, code, name FROM post_types \
//!      WHERE code = $1::text \
//!      ORDER BY created_at DESC NULLS FIRST, post_types.id ASC"
//! );
//! assert_eq!(statement.params.len(), 1);
//! ```

use uuid::Uuid;

use super::filter::{like_pattern, Filter, FilterError, FilterOperator, FilterValue};
use super::sort::Sort;
use super::types::{infer_column_type, ScalarType, ScalarValue, TypeMap};
use crate::domain::{Attribute, AttributeValue};
use crate::model::{ColumnDef, Entity};

/// A value bound to a placeholder
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    /// A typed scalar
    Value(ScalarValue),
    /// NULL; the SQL text casts it to the column type
    Null,
    /// A uuid
    Uuid(Uuid),
    /// An `integer[]` for `= ANY(..)`
    Ids(Vec<i32>),
    /// A `uuid[]` for `= ANY(..)`
    Uids(Vec<Uuid>),
}

/// SQL text with its parameters in placeholder order
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// SQL with `$n` placeholders
    pub sql: String,
    /// Values for `$1..$n`
    pub params: Vec<SqlParam>,
}

struct Builder {
    sql: String,
    params: Vec<SqlParam>,
}

impl Builder {
    fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    fn push(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    /// Register a value and return its placeholder
    fn param(&mut self, param: SqlParam) -> String {
        self.params.push(param);
        format!("${}", self.params.len())
    }

    /// Placeholder cast to the value's own type
    fn typed(&mut self, value: &ScalarValue) -> String {
        let ty = value.scalar_type();
        format!("{}::{}", self.param(SqlParam::Value(value.clone())), cast(ty))
    }

    /// Placeholder cast to the column's storage type
    fn column_value(&mut self, column: &ColumnDef, value: Option<ScalarValue>) -> String {
        let param = value.map_or(SqlParam::Null, SqlParam::Value);
        format!("{}::{}", self.param(param), column.sql_type)
    }

    fn finish(self) -> Statement {
        Statement {
            sql: self.sql,
            params: self.params,
        }
    }
}

fn cast(ty: ScalarType) -> &'static str {
    match ty {
        ScalarType::String => "text",
        ScalarType::Int => "bigint",
        ScalarType::Float => "double precision",
        ScalarType::Bool => "boolean",
        ScalarType::Date => "date",
        ScalarType::Datetime => "timestamptz",
        ScalarType::Time => "time",
    }
}

/// Storage types decoded natively; anything else (enums, domains) is read as text
const NATIVE_TYPES: [&str; 14] = [
    "text", "char", "uuid", "time", "bool", "int", "serial", "real", "double", "float", "numeric",
    "decimal", "date", "json",
];

fn is_custom_type(sql_type: &str) -> bool {
    let sql_type = sql_type.to_ascii_lowercase();
    !NATIVE_TYPES.iter().any(|native| sql_type.contains(native))
}

fn is_string(column: &ColumnDef) -> bool {
    infer_column_type(column.name, column.sql_type) == ScalarType::String
}

/// Column as compared in conditions: non-text string columns go through `::text`
fn condition_expr(column: &ColumnDef) -> String {
    let sql_type = column.sql_type.to_ascii_lowercase();
    if is_string(column) && !(sql_type.contains("text") || sql_type.contains("char")) {
        format!("{}::text", column.column)
    } else {
        column.column.to_string()
    }
}

fn select_expr(column: &ColumnDef) -> String {
    if is_custom_type(column.sql_type) {
        format!("{0}::text AS {0}", column.column)
    } else {
        column.column.to_string()
    }
}

/// Select list of every column of `E`, in column order
#[must_use]
pub fn select_columns<E: Entity>() -> String {
    E::columns().map(select_expr).collect::<Vec<_>>().join(", ")
}

fn select_from<E: Entity>() -> Builder {
    Builder::new(format!("SELECT {} FROM {}", select_columns::<E>(), E::TABLE))
}

/// Row by id
#[must_use]
pub fn find_by_id<E: Entity>(id: i32) -> Statement {
    let mut b = select_from::<E>();
    let p = b.param(SqlParam::Value(id.into()));
    b.push(&format!(" WHERE id = {}", p));
    b.finish()
}

/// Rows by id, in id order
#[must_use]
pub fn find_by_ids<E: Entity>(ids: &[i32]) -> Statement {
    let mut b = select_from::<E>();
    let p = b.param(SqlParam::Ids(ids.to_vec()));
    b.push(&format!(" WHERE id = ANY({}) ORDER BY id", p));
    b.finish()
}

/// Row by uid
#[must_use]
pub fn find_by_uid<E: Entity>(uid: Uuid) -> Statement {
    let mut b = select_from::<E>();
    let p = b.param(SqlParam::Uuid(uid));
    b.push(&format!(" WHERE uid = {}", p));
    b.finish()
}

/// Rows by uid, in id order
#[must_use]
pub fn find_by_uids<E: Entity>(uids: &[Uuid]) -> Statement {
    let mut b = select_from::<E>();
    let p = b.param(SqlParam::Uids(uids.to_vec()));
    b.push(&format!(" WHERE uid = ANY({}) ORDER BY id", p));
    b.finish()
}

/// `SELECT EXISTS(..)` for one id
#[must_use]
pub fn exists<E: Entity>(id: i32) -> Statement {
    let mut b = Builder::new("SELECT EXISTS(SELECT 1 FROM ");
    b.push(E::TABLE);
    let p = b.param(SqlParam::Value(id.into()));
    b.push(&format!(" WHERE id = {})", p));
    b.finish()
}

/// Insert every column but the serial id, returning the stored row
#[must_use]
pub fn insert<E: Entity>(entity: &E) -> Statement {
    let meta = entity.meta();
    let mut b = Builder::new(format!("INSERT INTO {} (", E::TABLE));

    let columns: Vec<&ColumnDef> = E::columns().filter(|c| c.name != "id").collect();
    let names: Vec<&str> = columns.iter().map(|c| c.column).collect();
    b.push(&names.join(", "));
    b.push(") VALUES (");

    let mut values = Vec::with_capacity(columns.len());
    for column in &columns {
        let placeholder = match column.name {
            "uid" => format!("{}::uuid", b.param(SqlParam::Uuid(meta.uid))),
            _ => b.column_value(column, entity.field(column.name)),
        };
        values.push(placeholder);
    }
    b.push(&values.join(", "));
    b.push(&format!(") RETURNING {}", select_columns::<E>()));
    b.finish()
}

/// Version-conditioned update of every domain column
///
/// Bumps the version and moves `updated_at` strictly forward; matches no row
/// when the stored version differs from the entity's.
#[must_use]
pub fn update<E: Entity>(entity: &E) -> Statement {
    let mut b = Builder::new(format!("UPDATE {} SET ", E::TABLE));

    let mut assignments = Vec::with_capacity(E::COLUMNS.len() + 2);
    for column in E::COLUMNS {
        let value = b.column_value(column, entity.domain_field(column.name));
        assignments.push(format!("{} = {}", column.column, value));
    }
    assignments.push("version = version + 1".to_string());
    assignments.push(
        "updated_at = GREATEST(now(), updated_at + interval '1 microsecond')".to_string(),
    );
    b.push(&assignments.join(", "));

    let id = b.param(SqlParam::Value(entity.id().into()));
    let version = b.param(SqlParam::Value(entity.version().into()));
    b.push(&format!(
        " WHERE id = {} AND version = {} RETURNING {}",
        id,
        version,
        select_columns::<E>()
    ));
    b.finish()
}

/// Delete by id
#[must_use]
pub fn delete_by_id<E: Entity>(id: i32) -> Statement {
    let mut b = Builder::new(format!("DELETE FROM {}", E::TABLE));
    let p = b.param(SqlParam::Value(id.into()));
    b.push(&format!(" WHERE id = {}", p));
    b.finish()
}

/// Delete by ids
#[must_use]
pub fn delete_by_ids<E: Entity>(ids: &[i32]) -> Statement {
    let mut b = Builder::new(format!("DELETE FROM {}", E::TABLE));
    let p = b.param(SqlParam::Ids(ids.to_vec()));
    b.push(&format!(" WHERE id = ANY({})", p));
    b.finish()
}

/// Delete by uid
#[must_use]
pub fn delete_by_uid<E: Entity>(uid: Uuid) -> Statement {
    let mut b = Builder::new(format!("DELETE FROM {}", E::TABLE));
    let p = b.param(SqlParam::Uuid(uid));
    b.push(&format!(" WHERE uid = {}", p));
    b.finish()
}

/// Delete by uids
#[must_use]
pub fn delete_by_uids<E: Entity>(uids: &[Uuid]) -> Statement {
    let mut b = Builder::new(format!("DELETE FROM {}", E::TABLE));
    let p = b.param(SqlParam::Uids(uids.to_vec()));
    b.push(&format!(" WHERE uid = ANY({})", p));
    b.finish()
}

/// Filtered, ordered select
///
/// `attributes` is the attribute type map of `E`; it is only consulted for
/// attribute filters and sorts. Ties are broken by id.
///
/// # Errors
///
/// Invalid filters, and names that are neither columns of `E` nor declared
/// attributes.
pub fn find_many<E: Entity>(
    filters: &[Filter],
    sorts: &[Sort],
    attributes: &TypeMap,
) -> Result<Statement, FilterError> {
    let mut b = select_from::<E>();
    push_where::<E>(&mut b, filters, attributes)?;

    let mut keys = Vec::with_capacity(sorts.len() + 1);
    for sort in sorts {
        let expr = match sort {
            Sort::Field { name, .. } => condition_expr(
                E::column(name).ok_or_else(|| FilterError::FieldNotFound(name.clone()))?,
            ),
            Sort::Attribute { name, .. } => {
                let ty = attribute_type(attributes, name)?;
                let scope = attribute_scope::<E>(&mut b, name);
                format!(
                    "(SELECT av.{} {} LIMIT 1)",
                    AttributeValue::value_column(ty),
                    scope
                )
            }
        };
        keys.push(format!("{} {}", expr, sort.direction().as_sql()));
    }
    keys.push(format!("{}.id ASC", E::TABLE));
    b.push(" ORDER BY ");
    b.push(&keys.join(", "));
    Ok(b.finish())
}

/// `SELECT COUNT(*)` over the filtered rows
///
/// # Errors
///
/// As [`find_many`].
pub fn count<E: Entity>(filters: &[Filter], attributes: &TypeMap) -> Result<Statement, FilterError> {
    let mut b = Builder::new(format!("SELECT COUNT(*) FROM {}", E::TABLE));
    push_where::<E>(&mut b, filters, attributes)?;
    Ok(b.finish())
}

/// Names and data type tokens of the attributes declared for an entity type
#[must_use]
pub fn attribute_definitions(entity_type: &str) -> Statement {
    let mut b = Builder::new(format!(
        "SELECT name, data_type FROM {} WHERE entity_type = ",
        Attribute::TABLE
    ));
    let p = b.param(SqlParam::Value(entity_type.into()));
    b.push(&p);
    b.push(" ORDER BY name");
    b.finish()
}

fn attribute_type(attributes: &TypeMap, name: &str) -> Result<ScalarType, FilterError> {
    attributes
        .get(name)
        .copied()
        .ok_or_else(|| FilterError::AttributeNotFound(name.to_string()))
}

/// `FROM .. WHERE ..` selecting the value row of attribute `name` for the
/// current row of `E`
fn attribute_scope<E: Entity>(b: &mut Builder, name: &str) -> String {
    let entity_type = b.param(SqlParam::Value(E::ENTITY_TYPE.into()));
    let name = b.param(SqlParam::Value(name.into()));
    format!(
        "FROM {values} av JOIN {attrs} a ON a.id = av.attribute_id \
         WHERE a.entity_type = {et} AND a.name = {name} \
         AND av.entity_type = {et} AND av.entity_id = {table}.id",
        values = AttributeValue::TABLE,
        attrs = Attribute::TABLE,
        et = entity_type,
        name = name,
        table = E::TABLE,
    )
}

fn push_where<E: Entity>(
    b: &mut Builder,
    filters: &[Filter],
    attributes: &TypeMap,
) -> Result<(), FilterError> {
    let mut conditions = Vec::with_capacity(filters.len());
    for filter in filters {
        filter.validate()?;
        conditions.push(condition::<E>(b, filter, attributes)?);
    }
    if !conditions.is_empty() {
        b.push(" WHERE ");
        b.push(&conditions.join(" AND "));
    }
    Ok(())
}

fn condition<E: Entity>(
    b: &mut Builder,
    filter: &Filter,
    attributes: &TypeMap,
) -> Result<String, FilterError> {
    match filter {
        Filter::Property {
            name,
            operator,
            value,
        } => {
            let column = E::column(name).ok_or_else(|| FilterError::FieldNotFound(name.clone()))?;
            Ok(predicate(b, &condition_expr(column), *operator, value))
        }
        Filter::Attribute {
            name,
            operator,
            value,
        } => {
            let ty = attribute_type(attributes, name)?;
            let column = format!("av.{}", AttributeValue::value_column(ty));
            let scope = attribute_scope::<E>(b, name);
            Ok(match operator {
                FilterOperator::IsNull => {
                    format!("NOT EXISTS (SELECT 1 {} AND {} IS NOT NULL)", scope, column)
                }
                FilterOperator::NotNull => {
                    format!("EXISTS (SELECT 1 {} AND {} IS NOT NULL)", scope, column)
                }
                _ => format!(
                    "EXISTS (SELECT 1 {} AND {})",
                    scope,
                    predicate(b, &column, *operator, value)
                ),
            })
        }
        Filter::Search { text } => {
            let columns: Vec<String> = E::COLUMNS
                .iter()
                .filter(|c| is_string(c))
                .map(condition_expr)
                .collect();
            if columns.is_empty() {
                return Ok("FALSE".to_string());
            }
            let p = b.param(SqlParam::Value(format!("%{}%", escape_like(text)).into()));
            let matches: Vec<String> = columns
                .iter()
                .map(|c| format!("{} ILIKE {}::text", c, p))
                .collect();
            Ok(format!("({})", matches.join(" OR ")))
        }
    }
}

/// Escape LIKE wildcards so `text` matches literally (default escape `\`)
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn predicate(b: &mut Builder, expr: &str, operator: FilterOperator, value: &FilterValue) -> String {
    use FilterOperator as Op;

    match (operator, value) {
        (Op::IsNull, _) => format!("{} IS NULL", expr),
        (Op::NotNull, _) => format!("{} IS NOT NULL", expr),
        (Op::Like | Op::NotLike, FilterValue::Single(pattern)) => {
            let keyword = if operator == Op::Like { "LIKE" } else { "NOT LIKE" };
            let pattern = ScalarValue::String(like_pattern(&pattern.to_string()));
            format!("{}::text {} {}", expr, keyword, b.typed(&pattern))
        }
        (Op::In | Op::NotIn, FilterValue::List(items)) => {
            let keyword = if operator == Op::In { "IN" } else { "NOT IN" };
            let placeholders: Vec<String> = items.iter().map(|item| b.typed(item)).collect();
            format!("{} {} ({})", expr, keyword, placeholders.join(", "))
        }
        (Op::Between | Op::NotBetween, FilterValue::Range(start, end)) => {
            let keyword = if operator == Op::Between {
                "BETWEEN"
            } else {
                "NOT BETWEEN"
            };
            let start = b.typed(start);
            let end = b.typed(end);
            format!("{} {} {} AND {}", expr, keyword, start, end)
        }
        (_, FilterValue::Single(v)) => {
            let symbol = match operator {
                Op::Equal => "=",
                Op::NotEqual => "<>",
                Op::GreaterThan => ">",
                Op::GreaterThanOrEqual => ">=",
                Op::LessThan => "<",
                _ => "<=",
            };
            format!("{} {} {}", expr, symbol, b.typed(v))
        }
        // shapes are checked by Filter::validate before rendering
        _ => "FALSE".to_string(),
    }
}
