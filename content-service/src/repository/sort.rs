//! Ordering for repository queries
//!
//! # Example
//!
//! ```rust
//! use content_service::repository::{OrderDirection, Sort};
//!
//! let sorts = vec![
//!     Sort::desc("createdAt"),
//!     "@priority:asc".parse::<Sort>().unwrap(),
//! ];
//!
//! assert_eq!(sorts[0].direction(), OrderDirection::Descending);
//! assert!(sorts[1].is_attribute());
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::filter::FilterError;
use super::types::TypeMap;

/// Direction for ordering results
///
/// Ascending places NULLs last, descending places them first.
///
/// # Example
///
/// ```rust
/// use content_service::repository::OrderDirection;
///
/// assert_eq!(format!("{}", OrderDirection::Ascending), "asc");
/// assert_eq!("DESC".parse::<OrderDirection>().unwrap(), OrderDirection::Descending);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OrderDirection {
    /// Sort in ascending order (A-Z, 0-9)
    #[default]
    Ascending,
    /// Sort in descending order (Z-A, 9-0)
    Descending,
}

impl OrderDirection {
    /// SQL keyword including the NULL placement
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Ascending => "ASC NULLS LAST",
            Self::Descending => "DESC NULLS FIRST",
        }
    }
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ascending => write!(f, "asc"),
            Self::Descending => write!(f, "desc"),
        }
    }
}

impl FromStr for OrderDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(Self::Ascending),
            "desc" | "descending" => Ok(Self::Descending),
            other => Err(format!("unknown sort direction '{}'", other)),
        }
    }
}

/// A single ordering key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sort {
    /// Order by a fixed column
    Field {
        /// Property name (camelCase)
        name: String,
        /// Direction
        direction: OrderDirection,
    },
    /// Order by a dynamic EAV attribute
    Attribute {
        /// Attribute name
        name: String,
        /// Direction
        direction: OrderDirection,
    },
}

impl Sort {
    /// Order by a column
    pub fn field(name: impl Into<String>, direction: OrderDirection) -> Self {
        Self::Field {
            name: name.into(),
            direction,
        }
    }

    /// Order by an attribute
    pub fn attribute(name: impl Into<String>, direction: OrderDirection) -> Self {
        Self::Attribute {
            name: name.into(),
            direction,
        }
    }

    /// Ascending by a column
    pub fn asc(name: impl Into<String>) -> Self {
        Self::field(name, OrderDirection::Ascending)
    }

    /// Descending by a column
    pub fn desc(name: impl Into<String>) -> Self {
        Self::field(name, OrderDirection::Descending)
    }

    /// Name of the column or attribute
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Field { name, .. } | Self::Attribute { name, .. } => name,
        }
    }

    /// Direction of the ordering
    #[must_use]
    pub fn direction(&self) -> OrderDirection {
        match self {
            Self::Field { direction, .. } | Self::Attribute { direction, .. } => *direction,
        }
    }

    /// Whether the key is an EAV attribute
    #[must_use]
    pub fn is_attribute(&self) -> bool {
        matches!(self, Self::Attribute { .. })
    }

    /// Check that the key names a known column or attribute
    ///
    /// # Errors
    ///
    /// Returns `FieldNotFound` or `AttributeNotFound`.
    pub fn validate(&self, fields: &TypeMap, attributes: &TypeMap) -> Result<(), FilterError> {
        match self {
            Self::Field { name, .. } if !fields.contains_key(name) => {
                Err(FilterError::FieldNotFound(name.clone()))
            }
            Self::Attribute { name, .. } if !attributes.contains_key(name) => {
                Err(FilterError::AttributeNotFound(name.clone()))
            }
            _ => Ok(()),
        }
    }
}

/// Parses `name[:asc|desc]`, with `@name` for attributes
impl FromStr for Sort {
    type Err = FilterError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (name, direction) = match input.split_once(':') {
            Some((name, dir)) => (
                name,
                dir.parse().map_err(|reason| FilterError::Malformed {
                    input: input.to_string(),
                    reason,
                })?,
            ),
            None => (input, OrderDirection::Ascending),
        };
        let (is_attribute, name) = match name.strip_prefix('@') {
            Some(attr) => (true, attr),
            None => (false, name),
        };
        if name.is_empty() {
            return Err(FilterError::Malformed {
                input: input.to_string(),
                reason: "missing sort name".to_string(),
            });
        }
        Ok(if is_attribute {
            Self::attribute(name, direction)
        } else {
            Self::field(name, direction)
        })
    }
}
