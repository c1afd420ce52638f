//! Model System - declaration, encoding and persistence of database entities
//!
//! - `core_trait`: the `Model` trait and per-instance state
//! - `field` / `group`: field metadata, value codecs and grouped fields
//! - `primary_key`: identifier types and generation strategies
//! - `descriptor`: the schema builder and the registered model descriptor
//! - `registry`: process-wide, publish-once descriptor registry
//! - `lifecycle` / `crud_operations`: the persistence state machine

pub mod core_trait;
pub mod crud_operations;
pub mod descriptor;
pub mod field;
pub mod group;
pub mod lifecycle;
pub mod primary_key;
pub mod registry;

pub use core_trait::{Model, ModelState};
pub use crud_operations::CrudOperations;
pub use descriptor::{DescriptorSignature, ModelDescriptor, SchemaBuilder, SchemaLookup};
pub use field::{CodecKind, FieldDescriptor, FieldInfo, FieldValue, StringEnum, TimestampFormat, TimestampTrigger};
pub use group::{flatten, FieldGroup, FieldSet};
pub use lifecycle::LifecyclePhase;
pub use primary_key::{Identifier, IdentifierDescriptor, IdentifierKind, IdentifierOutcome, IdentifierStrategy};
pub use registry::ModelRegistry;
