//! # strata-orm: model metadata, query building and persistence lifecycle
//!
//! A model type describes its identifier, fields, nested field groups and
//! relations once. From that descriptor the crate provides:
//!
//! - identifier generation (user supplied, random, or database generated)
//! - a query builder with field validation, joins, ordering, pagination and
//!   batched eager loading
//! - a persistence lifecycle with create, update, soft delete, restore and
//!   force delete, wrapped in per-model middleware chains
//!
//! Storage is pluggable through [`DatabaseBackend`]; a PostgreSQL backend and
//! an in-memory backend ship with the crate.

pub mod backends;
pub mod config;
pub mod database;
pub mod error;
pub mod middleware;
pub mod model;
pub mod query;
pub mod relationships;
pub mod sql;


// Re-export core traits and types
pub use backends::{
    BackendCapabilities, ColumnSpec, DatabaseBackend, DatabaseBackendType, DatabaseValue, MemoryBackend,
    PostgresBackend, Row, WriteKind, WriteOutcome, WriteRequest,
};
pub use config::{ConfigError, OrmConfig, PoolConfig};
pub use database::{Database, DatabaseBuilder};
pub use error::{BackendError, ErrorKind, ModelError, ModelResult, OrmError, OrmResult};
pub use middleware::{LifecycleEvent, MiddlewareRegistry, ModelMiddleware, Next};
pub use model::{
    CodecKind, CrudOperations, FieldGroup, FieldSet, FieldValue, Identifier, IdentifierKind, IdentifierOutcome,
    IdentifierStrategy, LifecyclePhase, Model, ModelDescriptor, ModelRegistry, ModelState, SchemaBuilder, StringEnum,
    TimestampFormat, TimestampTrigger,
};
pub use query::{FieldRef, JoinType, OrderDirection, Patch, Predicate, QueryBuilder, QueryOperator, QuerySpec};
pub use relationships::{Related, RelationshipType};
