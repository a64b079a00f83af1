//! Repository error types
//!
//! Every storage operation fails with a [`RepositoryError`] that records the
//! operation, a coarse [`RepositoryErrorKind`] used by the HTTP layer to pick
//! a status code, and the entity involved when one is known.
//!
//! # Example
//!
//! ```rust
//! use content_service::repository::{RepositoryError, RepositoryErrorKind};
//!
//! let error = RepositoryError::conflict("post_type", 7);
//! assert_eq!(error.kind, RepositoryErrorKind::Conflict);
//! assert_eq!(error.entity_id.as_deref(), Some("7"));
//! ```

use std::fmt;

use super::filter::FilterError;

/// Operation being performed when the repository error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryOperation {
    /// Finding entities by id
    FindById,
    /// Finding entities by uid
    FindByUid,
    /// Finding entities with filters and sorts
    FindMany,
    /// Counting entities matching filters
    Count,
    /// Checking if an entity exists
    Exists,
    /// Inserting a new entity
    Insert,
    /// Updating an existing entity
    Update,
    /// Deleting entities
    Delete,
    /// Loading column or attribute type maps
    TypeMap,
    /// Beginning, committing or rolling back a unit of work
    Transaction,
}

impl fmt::Display for RepositoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FindById => write!(f, "find_by_id"),
            Self::FindByUid => write!(f, "find_by_uid"),
            Self::FindMany => write!(f, "find_many"),
            Self::Count => write!(f, "count"),
            Self::Exists => write!(f, "exists"),
            Self::Insert => write!(f, "insert"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
            Self::TypeMap => write!(f, "type_map"),
            Self::Transaction => write!(f, "transaction"),
        }
    }
}

/// Category of repository error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryErrorKind {
    /// Entity was not found
    NotFound,
    /// Entity already exists (duplicate key)
    AlreadyExists,
    /// Optimistic lock failure: the stored version moved
    Conflict,
    /// Database constraint violation
    ConstraintViolation,
    /// Validation failed before database operation
    ValidationFailed,
    /// Filter or sort names an unknown field or attribute
    FieldNotFound,
    /// The backend cannot perform the request
    Unsupported,
    /// Failed to connect to database
    ConnectionFailed,
    /// Operation timed out
    Timeout,
    /// Underlying database error
    DatabaseError,
    /// Serialization or deserialization error
    SerializationError,
    /// Other unclassified error
    Other,
}

impl fmt::Display for RepositoryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::AlreadyExists => write!(f, "already_exists"),
            Self::Conflict => write!(f, "conflict"),
            Self::ConstraintViolation => write!(f, "constraint_violation"),
            Self::ValidationFailed => write!(f, "validation_failed"),
            Self::FieldNotFound => write!(f, "field_not_found"),
            Self::Unsupported => write!(f, "unsupported"),
            Self::ConnectionFailed => write!(f, "connection_failed"),
            Self::Timeout => write!(f, "timeout"),
            Self::DatabaseError => write!(f, "database_error"),
            Self::SerializationError => write!(f, "serialization_error"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Structured repository error with operation context
///
/// # Example
///
/// ```rust
/// use content_service::repository::{RepositoryError, RepositoryOperation};
///
/// let error = RepositoryError::not_found("post", 42);
/// assert_eq!(
///     error.to_string(),
///     "Repository not_found error during find_by_id: Entity not found [post: 42]"
/// );
///
/// let error = RepositoryError::connection_failed("connection refused")
///     .with_operation(RepositoryOperation::Insert);
/// assert!(error.is_retriable());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryError {
    /// The operation being performed when the error occurred
    pub operation: RepositoryOperation,
    /// The category of error
    pub kind: RepositoryErrorKind,
    /// Human-readable error message
    pub message: String,
    /// The entity type discriminator involved (e.g. "post_type")
    pub entity_type: Option<String>,
    /// The id, uid or other identifier involved
    pub entity_id: Option<String>,
}

impl RepositoryError {
    /// Create a new repository error
    pub fn new(
        operation: RepositoryOperation,
        kind: RepositoryErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
            entity_type: None,
            entity_id: None,
        }
    }

    /// Create a "not found" error with entity context
    pub fn not_found(entity_type: impl Into<String>, entity_id: impl ToString) -> Self {
        Self::new(
            RepositoryOperation::FindById,
            RepositoryErrorKind::NotFound,
            "Entity not found",
        )
        .with_entity(entity_type, entity_id.to_string())
    }

    /// Create an "already exists" error with the duplicate identifier
    pub fn already_exists(entity_type: impl Into<String>, identifier: impl ToString) -> Self {
        Self::new(
            RepositoryOperation::Insert,
            RepositoryErrorKind::AlreadyExists,
            "Entity already exists",
        )
        .with_entity(entity_type, identifier.to_string())
    }

    /// Create an optimistic lock failure for an update
    ///
    /// # Example
    ///
    /// ```rust
    /// use content_service::repository::{RepositoryError, RepositoryOperation};
    ///
    /// let error = RepositoryError::conflict("post", 3);
    /// assert_eq!(error.operation, RepositoryOperation::Update);
    /// ```
    pub fn conflict(entity_type: impl Into<String>, entity_id: impl ToString) -> Self {
        Self::new(
            RepositoryOperation::Update,
            RepositoryErrorKind::Conflict,
            "Version mismatch, entity was modified concurrently",
        )
        .with_entity(entity_type, entity_id.to_string())
    }

    /// Create a validation failed error
    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::new(
            RepositoryOperation::FindMany,
            RepositoryErrorKind::ValidationFailed,
            message,
        )
    }

    /// Create an unknown field or attribute error
    pub fn field_not_found(message: impl Into<String>) -> Self {
        Self::new(
            RepositoryOperation::FindMany,
            RepositoryErrorKind::FieldNotFound,
            message,
        )
    }

    /// Create an error for requests the backend cannot perform
    pub fn unsupported(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::Unsupported, message)
    }

    /// Create a constraint violation error
    pub fn constraint_violation(
        operation: RepositoryOperation,
        message: impl Into<String>,
    ) -> Self {
        Self::new(operation, RepositoryErrorKind::ConstraintViolation, message)
    }

    /// Create a connection failed error
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::new(
            RepositoryOperation::Transaction,
            RepositoryErrorKind::ConnectionFailed,
            message,
        )
    }

    /// Create a timeout error
    pub fn timeout(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::Timeout, message)
    }

    /// Create a database error
    pub fn database_error(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::DatabaseError, message)
    }

    /// Create a serialization error
    pub fn serialization_error(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::SerializationError, message)
    }

    /// Add entity context to an existing error
    #[must_use]
    pub fn with_entity(
        mut self,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    /// Set the operation that caused the error
    #[must_use]
    pub fn with_operation(mut self, operation: RepositoryOperation) -> Self {
        self.operation = operation;
        self
    }

    /// Check if this error is retriable (transient errors that may succeed on retry)
    pub fn is_retriable(&self) -> bool {
        matches!(
            self.kind,
            RepositoryErrorKind::ConnectionFailed | RepositoryErrorKind::Timeout
        )
    }
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Repository {} error during {}: {}",
            self.kind, self.operation, self.message
        )?;
        if let (Some(entity_type), Some(entity_id)) = (&self.entity_type, &self.entity_id) {
            write!(f, " [{}: {}]", entity_type, entity_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for RepositoryError {}

impl From<FilterError> for RepositoryError {
    fn from(err: FilterError) -> Self {
        match err {
            FilterError::FieldNotFound(_) | FilterError::AttributeNotFound(_) => {
                Self::field_not_found(err.to_string())
            }
            other => Self::validation_failed(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization_error(RepositoryOperation::FindMany, err.to_string())
    }
}

#[cfg(feature = "database")]
impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::new(
                RepositoryOperation::FindById,
                RepositoryErrorKind::NotFound,
                "Entity not found",
            ),
            sqlx::Error::Database(db_err) => {
                let message = db_err.message().to_string();
                match db_err.kind() {
                    sqlx::error::ErrorKind::UniqueViolation => Self::new(
                        RepositoryOperation::Insert,
                        RepositoryErrorKind::AlreadyExists,
                        message,
                    ),
                    sqlx::error::ErrorKind::ForeignKeyViolation
                    | sqlx::error::ErrorKind::NotNullViolation
                    | sqlx::error::ErrorKind::CheckViolation => {
                        Self::constraint_violation(RepositoryOperation::Insert, message)
                    }
                    _ => Self::database_error(RepositoryOperation::FindMany, message),
                }
            }
            sqlx::Error::PoolTimedOut => {
                Self::timeout(RepositoryOperation::Transaction, "Connection pool timed out")
            }
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolClosed => {
                Self::connection_failed(err.to_string())
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                Self::serialization_error(RepositoryOperation::FindMany, err.to_string())
            }
            _ => Self::database_error(RepositoryOperation::FindMany, err.to_string()),
        }
    }
}
