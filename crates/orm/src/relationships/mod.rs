//! Relationships Module - declared relations and batched eager loading

pub mod containers;
pub mod eager_loading;
pub mod metadata;

pub use containers::Related;
pub use eager_loading::{BelongsToLoader, HasManyLoader, HasOneLoader, RelationLoader};
pub use metadata::{RelationDescriptor, RelationshipType};
