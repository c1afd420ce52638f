//! Database Backend Abstractions
//!
//! The ORM core talks to storage only through the [`DatabaseBackend`] trait:
//! compiled query specifications go in, flat rows come out. Relational and
//! document stores implement the same trait and advertise their semantic
//! differences through [`BackendCapabilities`].

pub mod core;
pub mod memory;
pub mod postgres;

// Re-export core traits and types
pub use self::core::{
    BackendCapabilities, ColumnSpec, DatabaseBackend, DatabaseValue, Row, WriteKind,
    WriteOutcome, WriteRequest, AGGREGATE_KEY,
};
pub use memory::MemoryBackend;
pub use postgres::{DatabaseConnectionConfig, PostgresBackend};

/// Database backend type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseBackendType {
    PostgreSQL,
    Memory,
}

impl std::fmt::Display for DatabaseBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseBackendType::PostgreSQL => write!(f, "postgresql"),
            DatabaseBackendType::Memory => write!(f, "memory"),
        }
    }
}

impl std::str::FromStr for DatabaseBackendType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgresql" | "postgres" => Ok(DatabaseBackendType::PostgreSQL),
            "memory" | "mem" => Ok(DatabaseBackendType::Memory),
            _ => Err(format!("Unsupported database backend: {}", s)),
        }
    }
}
