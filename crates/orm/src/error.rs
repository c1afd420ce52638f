//! Error types for the ORM system
//!
//! Every failure the core can raise is a `ModelError`. Variants fall into four
//! families (see [`ErrorKind`]): configuration problems found while registering
//! models, validation problems caught before a backend is touched, concurrency
//! conflicts reported by the lifecycle engine, and backend failures that are
//! passed through untouched.

use std::error::Error as StdError;

use thiserror::Error;

use crate::config::ConfigError;
use crate::model::primary_key::IdentifierStrategy;

/// Result type alias for model operations
pub type ModelResult<T> = Result<T, ModelError>;

/// ORM error type alias
pub type OrmError = ModelError;

/// ORM result type alias
pub type OrmResult<T> = ModelResult<T>;

/// Broad classification of a [`ModelError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Detected at registration, fatal to startup, never retried
    Configuration,
    /// Surfaced before the operation reaches the backend
    Validation,
    /// Stale or vanished records; the caller owns the retry policy
    Concurrency,
    /// Reported by the backend and passed through verbatim
    Backend,
}

/// Error types for ORM operations
#[derive(Debug, Error)]
pub enum ModelError {
    /// Two fields resolve to the same storage key after flattening
    #[error("Duplicate field key '{key}' in schema '{schema}'")]
    DuplicateKey { schema: String, key: String },

    /// A model type was registered twice with differing descriptors
    #[error("Conflicting descriptor for schema '{schema}'")]
    ConflictingSchema { schema: String },

    /// No strategy was configured and none can be inferred from the identifier type
    #[error("Identifier '{key}' of schema '{schema}' requires an explicit generation strategy")]
    AmbiguousIdentifierStrategy { schema: String, key: String },

    /// The identifier value type cannot honour the configured strategy
    #[error("Identifier '{key}' of schema '{schema}' does not support the {strategy:?} strategy")]
    UnsupportedIdentifierStrategy {
        schema: String,
        key: String,
        strategy: IdentifierStrategy,
    },

    /// Any other invalid model or connection configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A filter, sort, patch or join referenced a key the schema does not have
    #[error("Unknown field '{field}' on schema '{schema}'")]
    UnknownField { schema: String, field: String },

    /// `with` named a relation the schema does not declare
    #[error("Unknown relation '{relation}' on schema '{schema}'")]
    UnknownRelation { schema: String, relation: String },

    /// A field reference named a schema or alias that is not part of the query
    #[error("Schema or alias '{0}' does not participate in this query")]
    UnknownSchemaReference(String),

    /// The same schema joined more than once without an alias
    #[error("Schema '{schema}' participates more than once; use an alias")]
    AmbiguousSchemaReference { schema: String },

    /// A user-supplied identifier was required but absent
    #[error("Identifier missing for schema '{schema}'")]
    MissingIdentifier { schema: String },

    /// A stored value could not be decoded into its field
    #[error("Invalid value for field '{key}': {message}")]
    InvalidFieldValue { key: String, message: String },

    /// A relation was read before being eager loaded
    #[error("Relation '{relation}' was not eager loaded")]
    RelationNotLoaded { relation: String },

    /// The backend cannot execute the requested shape of query
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Rejection raised by middleware or caller-side checks
    #[error("Validation error: {0}")]
    Validation(String),

    /// Value conversion failure
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Update or delete issued on an instance that is not persisted
    #[error("Model of schema '{schema}' does not exist in the database")]
    StaleModel { schema: String },

    /// Zero records matched an identifier-keyed write
    #[error("Record not found in schema '{0}'")]
    NotFound(String),

    /// Restore issued on an instance that is not soft deleted
    #[error("Model of schema '{schema}' is not soft deleted")]
    NotSoftDeleted { schema: String },

    /// Failure reported by the backend
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl ModelError {
    /// Classify this error into the ORM error taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            ModelError::DuplicateKey { .. }
            | ModelError::ConflictingSchema { .. }
            | ModelError::AmbiguousIdentifierStrategy { .. }
            | ModelError::UnsupportedIdentifierStrategy { .. }
            | ModelError::Configuration(_) => ErrorKind::Configuration,
            ModelError::UnknownField { .. }
            | ModelError::UnknownRelation { .. }
            | ModelError::UnknownSchemaReference(_)
            | ModelError::AmbiguousSchemaReference { .. }
            | ModelError::MissingIdentifier { .. }
            | ModelError::InvalidFieldValue { .. }
            | ModelError::RelationNotLoaded { .. }
            | ModelError::UnsupportedOperation(_)
            | ModelError::Validation(_)
            | ModelError::Serialization(_) => ErrorKind::Validation,
            ModelError::StaleModel { .. }
            | ModelError::NotFound(_)
            | ModelError::NotSoftDeleted { .. } => ErrorKind::Concurrency,
            ModelError::Backend(_) => ErrorKind::Backend,
        }
    }

    pub fn is_configuration(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }

    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }

    pub fn is_concurrency(&self) -> bool {
        self.kind() == ErrorKind::Concurrency
    }

    pub fn is_backend(&self) -> bool {
        self.kind() == ErrorKind::Backend
    }
}

/// Failure reported by a database backend
///
/// The message is the backend's own rendering of the failure; the original
/// error, when there is one, stays reachable through `source()`.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct BackendError {
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            message: error.to_string(),
            source: Some(Box::new(error)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<sqlx::Error> for BackendError {
    fn from(err: sqlx::Error) -> Self {
        BackendError::with_source(err)
    }
}

impl From<sqlx::Error> for ModelError {
    fn from(err: sqlx::Error) -> Self {
        ModelError::Backend(err.into())
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Serialization(err.to_string())
    }
}

impl From<ConfigError> for ModelError {
    fn from(err: ConfigError) -> Self {
        ModelError::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_follow_taxonomy() {
        let duplicate = ModelError::DuplicateKey {
            schema: "users".to_string(),
            key: "pet_name".to_string(),
        };
        assert_eq!(duplicate.kind(), ErrorKind::Configuration);

        let unknown = ModelError::UnknownField {
            schema: "users".to_string(),
            field: "nickname".to_string(),
        };
        assert!(unknown.is_validation());

        assert!(ModelError::NotFound("pets".to_string()).is_concurrency());
        assert!(ModelError::StaleModel { schema: "pets".to_string() }.is_concurrency());
        assert!(ModelError::Backend(BackendError::new("connection reset")).is_backend());
    }

    #[test]
    fn test_backend_error_is_passed_through_verbatim() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused by peer");
        let err: ModelError = BackendError::with_source(io).into();

        assert_eq!(err.to_string(), "refused by peer");
        let source = err.source().expect("backend error keeps its source");
        assert!(source.to_string().contains("refused by peer"));
    }

    #[test]
    fn test_error_display() {
        let err = ModelError::AmbiguousSchemaReference {
            schema: "planets".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Schema 'planets' participates more than once; use an alias"
        );

        let err = ModelError::MissingIdentifier {
            schema: "moons".to_string(),
        };
        assert!(err.to_string().contains("moons"));
    }
}
