//! Filter expressions for repository queries
//!
//! A [`Filter`] targets a fixed column ([`Filter::Property`]), a dynamic EAV
//! attribute ([`Filter::Attribute`]) or every text column at once
//! ([`Filter::Search`]). Filters are validated against the operator/value
//! compatibility table before any storage access, and can be parsed from the
//! textual `name:operator:value[:dataType]` encoding used in query strings.
//!
//! # Example
//!
//! ```rust
//! use content_service::repository::filter::{self, Filter, FilterOperator};
//!
//! let filters = vec![
//!     filter::equal("code", "blog"),
//!     filter::between("id", 1_i64, 1_000_000_i64),
//!     "@rating:gte:4:int".parse::<Filter>().unwrap(),
//! ];
//!
//! assert!(filters.iter().all(|f| f.validate().is_ok()));
//! assert_eq!(filters[2].operator(), Some(FilterOperator::GreaterThanOrEqual));
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::types::{ScalarType, ScalarValue, TypeMap, UnknownDataType};

/// Errors raised while parsing or validating filters
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FilterError {
    /// The operator cannot be used with the given value shape or type
    #[error("invalid value for operator '{operator}': {reason}")]
    InvalidValue {
        /// Operator that rejected the value
        operator: FilterOperator,
        /// Why the value was rejected
        reason: String,
    },

    /// Property filter or sort names an unknown column
    #[error("field '{0}' not found")]
    FieldNotFound(String),

    /// Attribute filter or sort names an unknown attribute
    #[error("attribute '{0}' not found")]
    AttributeNotFound(String),

    /// Operator token is not recognized
    #[error("unknown filter operator '{0}'")]
    UnknownOperator(String),

    /// Data type token is not recognized
    #[error(transparent)]
    UnknownDataType(#[from] UnknownDataType),

    /// Textual filter could not be parsed
    #[error("malformed filter '{input}': {reason}")]
    Malformed {
        /// The raw filter text
        input: String,
        /// What is wrong with it
        reason: String,
    },
}

impl FilterError {
    fn invalid(operator: FilterOperator, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            operator,
            reason: reason.into(),
        }
    }

    fn malformed(input: &str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

/// Comparison operators for filter conditions
///
/// Displays as the token used by the textual filter encoding.
///
/// # Example
///
/// ```rust
/// use content_service::repository::filter::FilterOperator;
///
/// assert_eq!(format!("{}", FilterOperator::NotBetween), "notbetween");
/// assert_eq!("gte".parse::<FilterOperator>().unwrap(), FilterOperator::GreaterThanOrEqual);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterOperator {
    /// Equal to (=)
    Equal,
    /// Not equal to (<>)
    NotEqual,
    /// Greater than (>)
    GreaterThan,
    /// Greater than or equal to (>=)
    GreaterThanOrEqual,
    /// Less than (<)
    LessThan,
    /// Less than or equal to (<=)
    LessThanOrEqual,
    /// Pattern matching (LIKE)
    Like,
    /// Negated pattern matching (NOT LIKE)
    NotLike,
    /// Value is in a list (IN)
    In,
    /// Value is not in a list (NOT IN)
    NotIn,
    /// Value is null (IS NULL)
    IsNull,
    /// Value is not null (IS NOT NULL)
    NotNull,
    /// Value lies in an inclusive range (BETWEEN)
    Between,
    /// Value lies outside an inclusive range (NOT BETWEEN)
    NotBetween,
}

impl FilterOperator {
    /// All operators, in declaration order
    pub const ALL: [Self; 14] = [
        Self::Equal,
        Self::NotEqual,
        Self::GreaterThan,
        Self::GreaterThanOrEqual,
        Self::LessThan,
        Self::LessThanOrEqual,
        Self::Like,
        Self::NotLike,
        Self::In,
        Self::NotIn,
        Self::IsNull,
        Self::NotNull,
        Self::Between,
        Self::NotBetween,
    ];

    /// Token used by the textual encoding
    #[must_use]
    pub const fn token(self) -> &'static str {
        match self {
            Self::Equal => "eq",
            Self::NotEqual => "ne",
            Self::GreaterThan => "gt",
            Self::GreaterThanOrEqual => "gte",
            Self::LessThan => "lt",
            Self::LessThanOrEqual => "lte",
            Self::Like => "like",
            Self::NotLike => "notlike",
            Self::In => "in",
            Self::NotIn => "notin",
            Self::IsNull => "isnull",
            Self::NotNull => "notnull",
            Self::Between => "between",
            Self::NotBetween => "notbetween",
        }
    }

    /// Whether the operator compares ordered values
    #[must_use]
    pub const fn is_ordering(self) -> bool {
        matches!(
            self,
            Self::GreaterThan | Self::GreaterThanOrEqual | Self::LessThan | Self::LessThanOrEqual
        )
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for FilterOperator {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|op| op.token() == token)
            .ok_or_else(|| FilterError::UnknownOperator(s.to_string()))
    }
}

/// Value shape carried by a filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterValue {
    /// A single scalar
    Single(ScalarValue),
    /// A list of scalars (In, NotIn)
    List(Vec<ScalarValue>),
    /// An inclusive range (Between, NotBetween)
    Range(ScalarValue, ScalarValue),
    /// No value (IsNull, NotNull)
    None,
}

impl FilterValue {
    fn shape(&self) -> &'static str {
        match self {
            Self::Single(_) => "a single value",
            Self::List(_) => "a list",
            Self::Range(..) => "a range",
            Self::None => "no value",
        }
    }

    fn map(self, f: impl Fn(ScalarValue) -> Result<ScalarValue, String>) -> Result<Self, String> {
        Ok(match self {
            Self::Single(v) => Self::Single(f(v)?),
            Self::List(items) => Self::List(items.into_iter().map(f).collect::<Result<_, _>>()?),
            Self::Range(start, end) => Self::Range(f(start)?, f(end)?),
            Self::None => Self::None,
        })
    }
}

impl From<ScalarValue> for FilterValue {
    fn from(value: ScalarValue) -> Self {
        Self::Single(value)
    }
}

macro_rules! single_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for FilterValue {
                fn from(value: $ty) -> Self {
                    Self::Single(value.into())
                }
            }
        )*
    };
}

single_from!(
    &str,
    String,
    i64,
    i32,
    f64,
    bool,
    chrono::NaiveDate,
    chrono::DateTime<chrono::Utc>,
    chrono::NaiveTime,
);

/// A predicate over one entity kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    /// Targets a fixed column by property name
    Property {
        /// Property name (camelCase)
        name: String,
        /// Comparison operator
        operator: FilterOperator,
        /// Operand
        value: FilterValue,
    },
    /// Targets a dynamic EAV attribute by name
    Attribute {
        /// Attribute name
        name: String,
        /// Comparison operator
        operator: FilterOperator,
        /// Operand
        value: FilterValue,
    },
    /// Case-insensitive free text over every text column
    Search {
        /// Text to look for
        text: String,
    },
}

impl Filter {
    /// Create a property filter
    pub fn property(name: impl Into<String>, operator: FilterOperator, value: FilterValue) -> Self {
        Self::Property {
            name: name.into(),
            operator,
            value,
        }
    }

    /// Create an attribute filter
    ///
    /// # Example
    ///
    /// ```rust
    /// use content_service::repository::filter::{Filter, FilterOperator, FilterValue};
    ///
    /// let filter = Filter::attribute("featured", FilterOperator::Equal, true.into());
    /// assert!(filter.validate().is_ok());
    /// ```
    pub fn attribute(
        name: impl Into<String>,
        operator: FilterOperator,
        value: FilterValue,
    ) -> Self {
        Self::Attribute {
            name: name.into(),
            operator,
            value,
        }
    }

    /// Create a free-text search filter
    pub fn search(text: impl Into<String>) -> Self {
        Self::Search { text: text.into() }
    }

    /// Operator of a property or attribute filter
    #[must_use]
    pub fn operator(&self) -> Option<FilterOperator> {
        match self {
            Self::Property { operator, .. } | Self::Attribute { operator, .. } => Some(*operator),
            Self::Search { .. } => None,
        }
    }

    /// Check the operator/value compatibility table
    ///
    /// Search filters are always valid.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::InvalidValue`] naming the operator when the
    /// value shape or scalar type is not accepted.
    pub fn validate(&self) -> Result<(), FilterError> {
        match self {
            Self::Property {
                operator, value, ..
            }
            | Self::Attribute {
                operator, value, ..
            } => check_operator_value(*operator, value),
            Self::Search { .. } => Ok(()),
        }
    }

    /// Validate against the known columns and attributes of a table
    ///
    /// Unknown names fail with `FieldNotFound` or `AttributeNotFound`.
    /// Operands are converted to the declared type of the column (so the
    /// string in `id:eq:5` compares as an Int); Like and NotLike patterns are
    /// left as text. The resolved filter is returned after the compatibility
    /// check.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown names, values that cannot be converted
    /// to the declared type, and incompatible operator/value pairs.
    pub fn resolve(self, fields: &TypeMap, attributes: &TypeMap) -> Result<Self, FilterError> {
        let resolved = match self {
            Self::Property {
                name,
                operator,
                value,
            } => {
                let ty = *fields
                    .get(&name)
                    .ok_or_else(|| FilterError::FieldNotFound(name.clone()))?;
                let value = coerce_value(&name, operator, value, ty)?;
                Self::Property {
                    name,
                    operator,
                    value,
                }
            }
            Self::Attribute {
                name,
                operator,
                value,
            } => {
                let ty = *attributes
                    .get(&name)
                    .ok_or_else(|| FilterError::AttributeNotFound(name.clone()))?;
                let value = coerce_value(&name, operator, value, ty)?;
                Self::Attribute {
                    name,
                    operator,
                    value,
                }
            }
            search @ Self::Search { .. } => search,
        };
        resolved.validate()?;
        Ok(resolved)
    }
}

fn coerce_value(
    name: &str,
    operator: FilterOperator,
    value: FilterValue,
    ty: ScalarType,
) -> Result<FilterValue, FilterError> {
    if matches!(operator, FilterOperator::Like | FilterOperator::NotLike) {
        return Ok(value);
    }
    value
        .map(|scalar| {
            if scalar.scalar_type() == ty || (scalar.is_numeric() && ty.is_numeric()) {
                return Ok(scalar);
            }
            scalar
                .coerce_to(ty)
                .ok_or_else(|| format!("'{}' is not a valid {} for '{}'", scalar, ty, name))
        })
        .map_err(|reason| FilterError::invalid(operator, reason))
}

fn check_operator_value(operator: FilterOperator, value: &FilterValue) -> Result<(), FilterError> {
    use FilterOperator as Op;

    let wrong_shape = || FilterError::invalid(operator, format!("{} is not accepted", value.shape()));

    match operator {
        Op::Equal | Op::NotEqual => match value {
            FilterValue::Single(_) => Ok(()),
            _ => Err(wrong_shape()),
        },
        Op::GreaterThan | Op::GreaterThanOrEqual | Op::LessThan | Op::LessThanOrEqual => {
            match value {
                FilterValue::Single(v) if v.is_numeric() || v.is_temporal() => Ok(()),
                FilterValue::Single(v) => Err(FilterError::invalid(
                    operator,
                    format!("{} values are not ordered", v.scalar_type()),
                )),
                _ => Err(wrong_shape()),
            }
        }
        Op::Like | Op::NotLike => match value {
            FilterValue::Single(ScalarValue::String(_)) => Ok(()),
            FilterValue::Single(v) => Err(FilterError::invalid(
                operator,
                format!("pattern must be a string, got {}", v.scalar_type()),
            )),
            _ => Err(wrong_shape()),
        },
        Op::In | Op::NotIn => match value {
            FilterValue::List(items) => {
                let first = items
                    .first()
                    .ok_or_else(|| FilterError::invalid(operator, "list must not be empty"))?
                    .scalar_type();
                if !matches!(first, ScalarType::Int | ScalarType::Float | ScalarType::String) {
                    return Err(FilterError::invalid(
                        operator,
                        format!("{} lists are not supported", first),
                    ));
                }
                if items.iter().any(|item| item.scalar_type() != first) {
                    return Err(FilterError::invalid(operator, "list must be homogeneous"));
                }
                Ok(())
            }
            _ => Err(wrong_shape()),
        },
        Op::IsNull | Op::NotNull => match value {
            FilterValue::None => Ok(()),
            _ => Err(wrong_shape()),
        },
        Op::Between | Op::NotBetween => match value {
            FilterValue::Range(start, end) => {
                if start.scalar_type() != end.scalar_type() {
                    return Err(FilterError::invalid(
                        operator,
                        "range bounds must have the same type",
                    ));
                }
                if !(start.is_numeric() || start.is_temporal()) {
                    return Err(FilterError::invalid(
                        operator,
                        format!("{} ranges are not supported", start.scalar_type()),
                    ));
                }
                Ok(())
            }
            _ => Err(wrong_shape()),
        },
    }
}

/// Parses `name:operator:value[:dataType]`
///
/// A leading `@` targets an attribute. Values may contain `:`; a trailing
/// segment is read as the data type only when it is purely alphabetic.
impl FromStr for Filter {
    type Err = FilterError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (name, rest) = input
            .split_once(':')
            .ok_or_else(|| FilterError::malformed(input, "expected name:operator:value"))?;
        let (is_attribute, name) = match name.strip_prefix('@') {
            Some(attr) => (true, attr),
            None => (false, name),
        };
        if name.is_empty() {
            return Err(FilterError::malformed(input, "missing name"));
        }

        let (op_token, remainder) = match rest.split_once(':') {
            Some((op, remainder)) => (op, Some(remainder)),
            None => (rest, None),
        };
        let operator: FilterOperator = op_token.parse()?;

        let (raw_value, data_type) = split_data_type(remainder.unwrap_or_default())?;

        let value = match operator {
            FilterOperator::IsNull | FilterOperator::NotNull => FilterValue::None,
            _ if remainder.is_none() => {
                return Err(FilterError::malformed(input, "missing value"));
            }
            FilterOperator::In | FilterOperator::NotIn => FilterValue::List(
                raw_value
                    .split(',')
                    .map(|item| parse_scalar(input, item, data_type))
                    .collect::<Result<_, _>>()?,
            ),
            FilterOperator::Between | FilterOperator::NotBetween => {
                let (start, end) = raw_value
                    .split_once(',')
                    .ok_or_else(|| FilterError::malformed(input, "range must be start,end"))?;
                FilterValue::Range(
                    parse_scalar(input, start, data_type)?,
                    parse_scalar(input, end, data_type)?,
                )
            }
            _ => FilterValue::Single(parse_scalar(input, raw_value, data_type)?),
        };

        Ok(if is_attribute {
            Self::attribute(name, operator, value)
        } else {
            Self::property(name, operator, value)
        })
    }
}

fn split_data_type(remainder: &str) -> Result<(&str, ScalarType), FilterError> {
    if let Some((value, token)) = remainder.rsplit_once(':') {
        if !token.is_empty() && token.chars().all(|c| c.is_ascii_alphabetic()) {
            return Ok((value, token.parse()?));
        }
    }
    Ok((remainder, ScalarType::String))
}

fn parse_scalar(input: &str, raw: &str, ty: ScalarType) -> Result<ScalarValue, FilterError> {
    ScalarValue::parse_as(raw, ty)
        .ok_or_else(|| FilterError::malformed(input, format!("'{}' is not a valid {}", raw, ty)))
}

/// Pattern actually matched by Like and NotLike
///
/// A pattern without `%` or `_` is wrapped in `%` so it matches as a
/// substring.
///
/// # Example
///
/// ```rust
/// use content_service::repository::filter::like_pattern;
///
/// assert_eq!(like_pattern("Post"), "%Post%");
/// assert_eq!(like_pattern("Post%"), "Post%");
/// ```
#[must_use]
pub fn like_pattern(pattern: &str) -> String {
    if pattern.contains(['%', '_']) {
        pattern.to_string()
    } else {
        format!("%{}%", pattern)
    }
}

/// Create an equality filter (name = value)
pub fn equal(name: impl Into<String>, value: impl Into<ScalarValue>) -> Filter {
    Filter::property(name, FilterOperator::Equal, FilterValue::Single(value.into()))
}

/// Create a not-equal filter (name <> value)
pub fn not_equal(name: impl Into<String>, value: impl Into<ScalarValue>) -> Filter {
    Filter::property(name, FilterOperator::NotEqual, FilterValue::Single(value.into()))
}

/// Create a greater-than filter (name > value)
pub fn greater_than(name: impl Into<String>, value: impl Into<ScalarValue>) -> Filter {
    Filter::property(name, FilterOperator::GreaterThan, FilterValue::Single(value.into()))
}

/// Create a greater-than-or-equal filter (name >= value)
pub fn greater_than_or_equal(name: impl Into<String>, value: impl Into<ScalarValue>) -> Filter {
    Filter::property(
        name,
        FilterOperator::GreaterThanOrEqual,
        FilterValue::Single(value.into()),
    )
}

/// Create a less-than filter (name < value)
pub fn less_than(name: impl Into<String>, value: impl Into<ScalarValue>) -> Filter {
    Filter::property(name, FilterOperator::LessThan, FilterValue::Single(value.into()))
}

/// Create a less-than-or-equal filter (name <= value)
pub fn less_than_or_equal(name: impl Into<String>, value: impl Into<ScalarValue>) -> Filter {
    Filter::property(
        name,
        FilterOperator::LessThanOrEqual,
        FilterValue::Single(value.into()),
    )
}

/// Create a LIKE filter
///
/// A pattern without `%` or `_` matches as a substring.
///
/// # Example
///
/// ```rust
/// use content_service::repository::filter;
///
/// let filter = filter::like("name", "Post");
/// ```
pub fn like(name: impl Into<String>, pattern: impl Into<String>) -> Filter {
    Filter::property(
        name,
        FilterOperator::Like,
        FilterValue::Single(ScalarValue::String(pattern.into())),
    )
}

/// Create a NOT LIKE filter
pub fn not_like(name: impl Into<String>, pattern: impl Into<String>) -> Filter {
    Filter::property(
        name,
        FilterOperator::NotLike,
        FilterValue::Single(ScalarValue::String(pattern.into())),
    )
}

/// Create an IN filter
///
/// # Example
///
/// ```rust
/// use content_service::repository::filter;
///
/// let filter = filter::in_list("status", ["DRAFT", "REVIEW"]);
/// assert!(filter.validate().is_ok());
/// ```
pub fn in_list<I, V>(name: impl Into<String>, values: I) -> Filter
where
    I: IntoIterator<Item = V>,
    V: Into<ScalarValue>,
{
    Filter::property(
        name,
        FilterOperator::In,
        FilterValue::List(values.into_iter().map(Into::into).collect()),
    )
}

/// Create a NOT IN filter
pub fn not_in<I, V>(name: impl Into<String>, values: I) -> Filter
where
    I: IntoIterator<Item = V>,
    V: Into<ScalarValue>,
{
    Filter::property(
        name,
        FilterOperator::NotIn,
        FilterValue::List(values.into_iter().map(Into::into).collect()),
    )
}

/// Create an IS NULL filter
pub fn is_null(name: impl Into<String>) -> Filter {
    Filter::property(name, FilterOperator::IsNull, FilterValue::None)
}

/// Create an IS NOT NULL filter
pub fn not_null(name: impl Into<String>) -> Filter {
    Filter::property(name, FilterOperator::NotNull, FilterValue::None)
}

/// Create an inclusive BETWEEN filter
pub fn between(
    name: impl Into<String>,
    start: impl Into<ScalarValue>,
    end: impl Into<ScalarValue>,
) -> Filter {
    Filter::property(
        name,
        FilterOperator::Between,
        FilterValue::Range(start.into(), end.into()),
    )
}

/// Create a NOT BETWEEN filter
pub fn not_between(
    name: impl Into<String>,
    start: impl Into<ScalarValue>,
    end: impl Into<ScalarValue>,
) -> Filter {
    Filter::property(
        name,
        FilterOperator::NotBetween,
        FilterValue::Range(start.into(), end.into()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};

    fn samples() -> Vec<ScalarValue> {
        vec![
            ScalarValue::from("a"),
            ScalarValue::Int(1),
            ScalarValue::Float(1.5),
            ScalarValue::Bool(true),
            ScalarValue::Date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
            ScalarValue::DateTime(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            ScalarValue::Time(NaiveTime::from_hms_opt(12, 0, 0).unwrap()),
        ]
    }

    fn accepted(operator: FilterOperator, value: FilterValue) -> bool {
        Filter::property("x", operator, value).validate().is_ok()
    }

    #[test]
    fn test_operator_tokens_round_trip() {
        for op in FilterOperator::ALL {
            assert_eq!(op.token().parse::<FilterOperator>().unwrap(), op);
        }
        assert!(matches!(
            "contains".parse::<FilterOperator>(),
            Err(FilterError::UnknownOperator(_))
        ));
    }

    #[test]
    fn test_equality_accepts_any_single_scalar() {
        for op in [FilterOperator::Equal, FilterOperator::NotEqual] {
            for v in samples() {
                assert!(accepted(op, FilterValue::Single(v)));
            }
            assert!(!accepted(op, FilterValue::None));
            assert!(!accepted(op, FilterValue::List(vec![ScalarValue::Int(1)])));
            assert!(!accepted(
                op,
                FilterValue::Range(ScalarValue::Int(1), ScalarValue::Int(2))
            ));
        }
    }

    #[test]
    fn test_ordering_requires_numeric_or_temporal() {
        for op in FilterOperator::ALL.into_iter().filter(|op| op.is_ordering()) {
            for v in samples() {
                let expected = v.is_numeric() || v.is_temporal();
                assert_eq!(accepted(op, FilterValue::Single(v)), expected, "{}", op);
            }
            assert!(!accepted(op, FilterValue::None));
        }
    }

    #[test]
    fn test_like_requires_string() {
        for op in [FilterOperator::Like, FilterOperator::NotLike] {
            for v in samples() {
                let expected = matches!(v, ScalarValue::String(_));
                assert_eq!(accepted(op, FilterValue::Single(v)), expected);
            }
        }
    }

    #[test]
    fn test_in_requires_homogeneous_non_empty_list() {
        for op in [FilterOperator::In, FilterOperator::NotIn] {
            assert!(accepted(op, FilterValue::List(vec![1_i64.into(), 2_i64.into()])));
            assert!(accepted(op, FilterValue::List(vec![1.0.into(), 2.5.into()])));
            assert!(accepted(op, FilterValue::List(vec!["a".into(), "b".into()])));
            assert!(!accepted(op, FilterValue::List(vec![])));
            assert!(!accepted(op, FilterValue::List(vec![1_i64.into(), "b".into()])));
            assert!(!accepted(op, FilterValue::List(vec![true.into()])));
            assert!(!accepted(op, FilterValue::Single(1_i64.into())));
        }
    }

    #[test]
    fn test_null_checks_require_no_value() {
        for op in [FilterOperator::IsNull, FilterOperator::NotNull] {
            assert!(accepted(op, FilterValue::None));
            assert!(!accepted(op, FilterValue::Single("a".into())));
        }
    }

    #[test]
    fn test_between_requires_matching_ordered_bounds() {
        for op in [FilterOperator::Between, FilterOperator::NotBetween] {
            for v in samples() {
                let expected = v.is_numeric() || v.is_temporal();
                assert_eq!(accepted(op, FilterValue::Range(v.clone(), v)), expected);
            }
            assert!(!accepted(
                op,
                FilterValue::Range(ScalarValue::Int(1), ScalarValue::Float(2.0))
            ));
            assert!(!accepted(op, FilterValue::Single(ScalarValue::Int(1))));
        }
    }

    #[test]
    fn test_search_is_always_valid() {
        assert!(Filter::search("anything").validate().is_ok());
    }

    #[test]
    fn test_error_names_operator() {
        let err = Filter::property("name", FilterOperator::Between, "x".into())
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("between"));
    }

    #[test]
    fn test_parse_simple() {
        let filter: Filter = "code:eq:blog".parse().unwrap();
        assert_eq!(filter, equal("code", "blog"));
    }

    #[test]
    fn test_parse_typed_and_attribute() {
        let filter: Filter = "@rating:gt:4:int".parse().unwrap();
        assert_eq!(
            filter,
            Filter::attribute("rating", FilterOperator::GreaterThan, 4_i64.into())
        );
    }

    #[test]
    fn test_parse_list_and_range() {
        let filter: Filter = "id:in:1,2,3:int".parse().unwrap();
        assert_eq!(filter, in_list("id", [1_i64, 2, 3]));

        let filter: Filter = "id:between:1,1000000:int".parse().unwrap();
        assert_eq!(filter, between("id", 1_i64, 1_000_000_i64));
    }

    #[test]
    fn test_parse_value_with_colons() {
        let filter: Filter = "@opens:gte:09:30:time".parse().unwrap();
        assert_eq!(
            filter,
            Filter::attribute(
                "opens",
                FilterOperator::GreaterThanOrEqual,
                NaiveTime::from_hms_opt(9, 30, 0).unwrap().into()
            )
        );

        let filter: Filter = "publishedAt:lt:2024-01-01T10:00:00Z:datetime".parse().unwrap();
        assert_eq!(
            filter,
            less_than(
                "publishedAt",
                Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()
            )
        );

        // numeric trailing segment stays part of the value
        let filter: Filter = "title:eq:10:30".parse().unwrap();
        assert_eq!(filter, equal("title", "10:30"));
    }

    #[test]
    fn test_parse_null_checks() {
        let filter: Filter = "summary:isnull".parse().unwrap();
        assert_eq!(filter, is_null("summary"));
        let filter: Filter = "summary:notnull:".parse().unwrap();
        assert_eq!(filter, not_null("summary"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            "code:has:blog".parse::<Filter>(),
            Err(FilterError::UnknownOperator(_))
        ));
        assert!(matches!(
            "code:eq:blog:blob".parse::<Filter>(),
            Err(FilterError::UnknownDataType(_))
        ));
        assert!(matches!(
            "id:eq:abc:int".parse::<Filter>(),
            Err(FilterError::Malformed { .. })
        ));
        assert!(matches!("code".parse::<Filter>(), Err(FilterError::Malformed { .. })));
        assert!(matches!("code:eq".parse::<Filter>(), Err(FilterError::Malformed { .. })));
        assert!(matches!(
            "id:between:1:int".parse::<Filter>(),
            Err(FilterError::Malformed { .. })
        ));
    }

    #[test]
    fn test_resolve_coerces_string_operands() {
        let fields = TypeMap::from([
            ("id".to_string(), ScalarType::Int),
            ("code".to_string(), ScalarType::String),
        ]);
        let resolved = "id:gt:5".parse::<Filter>().unwrap().resolve(&fields, &TypeMap::new());
        assert_eq!(resolved.unwrap(), greater_than("id", 5_i64));

        let resolved = "id:between:1,10"
            .parse::<Filter>()
            .unwrap()
            .resolve(&fields, &TypeMap::new());
        assert_eq!(resolved.unwrap(), between("id", 1_i64, 10_i64));

        let err = "id:eq:abc".parse::<Filter>().unwrap().resolve(&fields, &TypeMap::new());
        assert!(matches!(err, Err(FilterError::InvalidValue { .. })));
    }

    #[test]
    fn test_resolve_unknown_names() {
        let fields = TypeMap::from([("code".to_string(), ScalarType::String)]);
        assert_eq!(
            equal("nope", "x").resolve(&fields, &TypeMap::new()),
            Err(FilterError::FieldNotFound("nope".to_string()))
        );
        assert_eq!(
            Filter::attribute("color", FilterOperator::Equal, "red".into())
                .resolve(&fields, &TypeMap::new()),
            Err(FilterError::AttributeNotFound("color".to_string()))
        );
        assert!(Filter::search("x").resolve(&fields, &TypeMap::new()).is_ok());
    }
}
