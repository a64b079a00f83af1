//! Scalar values, scalar types and column type inference
//!
//! Every filter and every field accessor speaks in [`ScalarValue`]s. The
//! type maps that describe a table (fixed columns and EAV attributes) map a
//! name to a [`ScalarType`].
//!
//! # Example
//!
//! ```rust
//! use content_service::repository::{infer_column_type, ScalarType, ScalarValue};
//!
//! assert_eq!(infer_column_type("title", "text"), ScalarType::String);
//! assert_eq!(infer_column_type("typeId", "integer"), ScalarType::Int);
//! assert_eq!(ScalarValue::from(42_i64).scalar_type(), ScalarType::Int);
//! ```

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Mapping of field or attribute name to its scalar type
pub type TypeMap = BTreeMap<String, ScalarType>;

/// Declared type of a column or attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ScalarType {
    /// Boolean
    Bool,
    /// Integer (any width)
    Int,
    /// Floating point or arbitrary precision number
    Float,
    /// Calendar date
    Date,
    /// Timestamp with time zone
    Datetime,
    /// Time of day; only attribute definitions declare it
    Time,
    /// Text
    String,
}

impl ScalarType {
    /// Whether values of this type are ordered numbers
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(self, Self::Int | Self::Float)
    }

    /// Whether values of this type are points in time
    #[must_use]
    pub const fn is_temporal(self) -> bool {
        matches!(self, Self::Date | Self::Datetime | Self::Time)
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => write!(f, "bool"),
            Self::Int => write!(f, "int"),
            Self::Float => write!(f, "float"),
            Self::Date => write!(f, "date"),
            Self::Datetime => write!(f, "datetime"),
            Self::Time => write!(f, "time"),
            Self::String => write!(f, "string"),
        }
    }
}

/// Error returned when a data type token is not recognized
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown data type '{0}'")]
pub struct UnknownDataType(pub String);

impl FromStr for ScalarType {
    type Err = UnknownDataType;

    /// Parses the data type tokens used by the textual filter encoding and by
    /// attribute definitions.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bool" | "boolean" => Ok(Self::Bool),
            "int" | "integer" => Ok(Self::Int),
            "float" | "double" | "numeric" => Ok(Self::Float),
            "date" => Ok(Self::Date),
            "datetime" | "timestamp" => Ok(Self::Datetime),
            "time" => Ok(Self::Time),
            "string" | "text" => Ok(Self::String),
            other => Err(UnknownDataType(other.to_string())),
        }
    }
}

/// A typed scalar used in filters and returned by entity field accessors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum ScalarValue {
    /// Text
    String(String),
    /// 64-bit integer
    Int(i64),
    /// 64-bit float
    Float(f64),
    /// Boolean
    Bool(bool),
    /// Calendar date
    Date(NaiveDate),
    /// UTC timestamp
    DateTime(DateTime<Utc>),
    /// Time of day
    Time(NaiveTime),
}

impl ScalarValue {
    /// The scalar type this value carries
    #[must_use]
    pub const fn scalar_type(&self) -> ScalarType {
        match self {
            Self::String(_) => ScalarType::String,
            Self::Int(_) => ScalarType::Int,
            Self::Float(_) => ScalarType::Float,
            Self::Bool(_) => ScalarType::Bool,
            Self::Date(_) => ScalarType::Date,
            Self::DateTime(_) => ScalarType::Datetime,
            Self::Time(_) => ScalarType::Time,
        }
    }

    /// Whether the value is an Int or a Float
    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        self.scalar_type().is_numeric()
    }

    /// Whether the value is a Date, DateTime or Time
    #[must_use]
    pub const fn is_temporal(&self) -> bool {
        self.scalar_type().is_temporal()
    }

    /// Borrow the text of a String value
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Parse raw text into a value of the given type
    ///
    /// Dates use `YYYY-MM-DD`, datetimes RFC 3339, times `HH:MM[:SS[.fff]]`.
    pub fn parse_as(raw: &str, ty: ScalarType) -> Option<Self> {
        let raw = raw.trim();
        match ty {
            ScalarType::String => Some(Self::String(raw.to_string())),
            ScalarType::Int => raw.parse().ok().map(Self::Int),
            ScalarType::Float => raw.parse().ok().map(Self::Float),
            ScalarType::Bool => match raw.to_ascii_lowercase().as_str() {
                "true" | "t" | "1" => Some(Self::Bool(true)),
                "false" | "f" | "0" => Some(Self::Bool(false)),
                _ => None,
            },
            ScalarType::Date => NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok().map(Self::Date),
            ScalarType::Datetime => DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| Self::DateTime(dt.with_timezone(&Utc))),
            ScalarType::Time => NaiveTime::parse_from_str(raw, "%H:%M:%S%.f")
                .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
                .ok()
                .map(Self::Time),
        }
    }

    /// Convert the value to the declared type of the column it is compared to
    ///
    /// Strings are parsed, Ints widen to Floats and Dates widen to midnight
    /// UTC. Returns `None` when no lossless conversion exists.
    #[must_use]
    pub fn coerce_to(&self, ty: ScalarType) -> Option<Self> {
        if self.scalar_type() == ty {
            return Some(self.clone());
        }
        match (self, ty) {
            (Self::String(s), _) => Self::parse_as(s, ty),
            (Self::Int(n), ScalarType::Float) => Some(Self::Float(*n as f64)),
            (Self::Date(d), ScalarType::Datetime) => {
                d.and_hms_opt(0, 0, 0).map(|dt| Self::DateTime(dt.and_utc()))
            }
            (value, ScalarType::String) => Some(Self::String(value.to_string())),
            _ => None,
        }
    }

    /// Compare two values of compatible types
    ///
    /// Ints and Floats compare numerically; every other combination of
    /// different types is incomparable.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            (Self::Int(a), Self::Float(b)) => (*a as f64).partial_cmp(b),
            (Self::Float(a), Self::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Date(a), Self::Date(b)) => Some(a.cmp(b)),
            (Self::DateTime(a), Self::DateTime(b)) => Some(a.cmp(b)),
            (Self::Time(a), Self::Time(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{}", s),
            Self::Int(n) => write!(f, "{}", n),
            Self::Float(n) => write!(f, "{}", n),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            Self::Time(t) => write!(f, "{}", t.format("%H:%M:%S%.f")),
        }
    }
}

impl From<&str> for ScalarValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for ScalarValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for ScalarValue {
    fn from(n: i32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<f64> for ScalarValue {
    fn from(n: f64) -> Self {
        Self::Float(n)
    }
}

impl From<bool> for ScalarValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<NaiveDate> for ScalarValue {
    fn from(d: NaiveDate) -> Self {
        Self::Date(d)
    }
}

impl From<DateTime<Utc>> for ScalarValue {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::DateTime(dt)
    }
}

impl From<NaiveTime> for ScalarValue {
    fn from(t: NaiveTime) -> Self {
        Self::Time(t)
    }
}

/// Infer the scalar type of a column from its storage type and name
///
/// The storage type is matched first (first match wins): `bool`, then
/// `int`/`serial`, then `real`/`double`/`float`/`numeric`/`decimal`, then
/// `timestamp`, then `date`. When nothing matches, well-known base field
/// names decide, and everything else is a String.
#[must_use]
pub fn infer_column_type(name: &str, sql_type: &str) -> ScalarType {
    let sql_type = sql_type.to_ascii_lowercase();

    if sql_type.contains("bool") {
        return ScalarType::Bool;
    }
    if sql_type.contains("int") || sql_type.contains("serial") {
        return ScalarType::Int;
    }
    if ["real", "double", "float", "numeric", "decimal"]
        .iter()
        .any(|t| sql_type.contains(t))
    {
        return ScalarType::Float;
    }
    if sql_type.contains("timestamp") {
        return ScalarType::Datetime;
    }
    if sql_type.contains("date") {
        return ScalarType::Date;
    }

    match name {
        "id" | "version" => ScalarType::Int,
        "createdAt" | "updatedAt" => ScalarType::Datetime,
        "uid" => ScalarType::String,
        _ => ScalarType::String,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_from_storage_type() {
        assert_eq!(infer_column_type("active", "boolean"), ScalarType::Bool);
        assert_eq!(infer_column_type("id", "serial"), ScalarType::Int);
        assert_eq!(infer_column_type("count", "bigint"), ScalarType::Int);
        assert_eq!(infer_column_type("score", "double precision"), ScalarType::Float);
        assert_eq!(infer_column_type("price", "numeric(10,2)"), ScalarType::Float);
        assert_eq!(infer_column_type("ratio", "real"), ScalarType::Float);
        assert_eq!(
            infer_column_type("publishedAt", "timestamp with time zone"),
            ScalarType::Datetime
        );
        assert_eq!(infer_column_type("birthday", "date"), ScalarType::Date);
        assert_eq!(infer_column_type("title", "text"), ScalarType::String);
    }

    #[test]
    fn test_infer_priority_order() {
        // "timestamp" would match too, but "int" is checked first
        assert_eq!(infer_column_type("x", "int_timestamp"), ScalarType::Int);
        // "date" inside "timestamp" never wins over it
        assert_eq!(infer_column_type("x", "timestamp"), ScalarType::Datetime);
    }

    #[test]
    fn test_infer_name_fallback() {
        assert_eq!(infer_column_type("id", "custom"), ScalarType::Int);
        assert_eq!(infer_column_type("version", ""), ScalarType::Int);
        assert_eq!(infer_column_type("createdAt", "custom"), ScalarType::Datetime);
        assert_eq!(infer_column_type("updatedAt", "custom"), ScalarType::Datetime);
        assert_eq!(infer_column_type("uid", "uuid"), ScalarType::String);
        assert_eq!(infer_column_type("status", "post_status"), ScalarType::String);
    }

    #[test]
    fn test_scalar_type_from_str() {
        assert_eq!("boolean".parse::<ScalarType>().unwrap(), ScalarType::Bool);
        assert_eq!("INT".parse::<ScalarType>().unwrap(), ScalarType::Int);
        assert_eq!("double".parse::<ScalarType>().unwrap(), ScalarType::Float);
        assert_eq!("datetime".parse::<ScalarType>().unwrap(), ScalarType::Datetime);
        assert_eq!("time".parse::<ScalarType>().unwrap(), ScalarType::Time);
        assert_eq!("text".parse::<ScalarType>().unwrap(), ScalarType::String);
        assert!("blob".parse::<ScalarType>().is_err());
    }

    #[test]
    fn test_parse_as() {
        assert_eq!(
            ScalarValue::parse_as("42", ScalarType::Int),
            Some(ScalarValue::Int(42))
        );
        assert_eq!(ScalarValue::parse_as("4x", ScalarType::Int), None);
        assert_eq!(
            ScalarValue::parse_as("true", ScalarType::Bool),
            Some(ScalarValue::Bool(true))
        );
        assert_eq!(
            ScalarValue::parse_as("2024-02-29", ScalarType::Date),
            Some(ScalarValue::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()))
        );
        assert_eq!(
            ScalarValue::parse_as("09:30", ScalarType::Time),
            Some(ScalarValue::Time(NaiveTime::from_hms_opt(9, 30, 0).unwrap()))
        );
        assert!(ScalarValue::parse_as("2024-01-01T10:00:00Z", ScalarType::Datetime).is_some());
    }

    #[test]
    fn test_coerce_to() {
        let five = ScalarValue::from("5");
        assert_eq!(five.coerce_to(ScalarType::Int), Some(ScalarValue::Int(5)));
        assert_eq!(
            ScalarValue::Int(2).coerce_to(ScalarType::Float),
            Some(ScalarValue::Float(2.0))
        );
        assert_eq!(ScalarValue::Bool(true).coerce_to(ScalarType::Int), None);
        assert_eq!(
            ScalarValue::Int(7).coerce_to(ScalarType::String),
            Some(ScalarValue::from("7"))
        );
    }

    #[test]
    fn test_compare_mixed_numeric() {
        assert_eq!(
            ScalarValue::Int(1).compare(&ScalarValue::Float(1.5)),
            Some(Ordering::Less)
        );
        assert_eq!(ScalarValue::Int(1).compare(&ScalarValue::from("1")), None);
    }
}
