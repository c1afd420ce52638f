//! Query Builder Module - fluent, validated queries over registered models
//!
//! A [`QueryBuilder`] resolves every field reference against the model
//! descriptors as it is built and compiles to a backend-neutral
//! [`QuerySpec`]. Terminal operations run the spec on the database handle the
//! builder was created from.

pub mod builder;
pub mod dml;
pub mod execution;
pub mod joins;
pub mod ordering;
pub mod types;
pub mod where_clause;
pub mod with;

pub use builder::QueryBuilder;
pub use dml::Patch;
pub use types::{
    FieldRef, FilterValue, JoinSpec, JoinType, OrderDirection, Predicate, QueryAction, QueryOperator, QuerySpec,
    SoftDeleteVisibility, Sort,
};
