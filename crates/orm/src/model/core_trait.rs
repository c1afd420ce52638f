//! Core Model Trait - Base definition for database entities
//!
//! A model declares its schema name, identifier type and field layout once,
//! through [`Model::describe`]. Everything else (encoding, querying,
//! persistence) is driven by the resulting descriptor.

use std::fmt::Debug;
use std::sync::Arc;

use super::descriptor::{ModelDescriptor, SchemaBuilder};
use super::primary_key::Identifier;
use super::registry::ModelRegistry;
use crate::error::ModelResult;

/// Core trait for database models
///
/// `Default` is the empty-construction path used to materialize query
/// results; it must only set default field values.
pub trait Model: Default + Clone + Debug + Send + Sync + 'static {
    /// The type used for this model's identifier
    type Id: Identifier;

    /// Schema (table or collection) name for this model
    fn schema() -> &'static str;

    /// Declare the identifier, fields, groups and relations of this model
    fn describe(schema: SchemaBuilder<Self>) -> SchemaBuilder<Self>;

    /// Persistence state of this instance
    fn state(&self) -> &ModelState;

    fn state_mut(&mut self) -> &mut ModelState;

    /// Registered descriptor of this model type, built on first use
    fn descriptor() -> ModelResult<Arc<ModelDescriptor<Self>>> {
        ModelRegistry::global().descriptor::<Self>()
    }

    /// Check if this instance is known to be present in the database
    fn exists(&self) -> bool {
        self.state().exists()
    }
}

/// Per-instance persistence flags maintained by the lifecycle engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModelState {
    exists: bool,
    destroyed: bool,
}

impl ModelState {
    pub fn exists(&self) -> bool {
        self.exists
    }

    /// Set after a force delete; the instance no longer maps to a record
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub(crate) fn mark_persisted(&mut self) {
        self.exists = true;
        self.destroyed = false;
    }

    pub(crate) fn mark_destroyed(&mut self) {
        self.exists = false;
        self.destroyed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions() {
        let mut state = ModelState::default();
        assert!(!state.exists());
        assert!(!state.is_destroyed());

        state.mark_persisted();
        assert!(state.exists());

        state.mark_destroyed();
        assert!(!state.exists());
        assert!(state.is_destroyed());
    }
}
