//! Relationship Containers - slots on a model that hold eager-loaded records

use crate::error::{ModelError, ModelResult};

/// Eager-loaded value of a relation
///
/// Empty until the relation is requested with `with(..)`; reading an empty
/// slot is an error rather than an implicit fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct Related<T> {
    value: Option<Box<T>>,
}

impl<T> Default for Related<T> {
    fn default() -> Self {
        Self { value: None }
    }
}

impl<T> Related<T> {
    /// Create an already-loaded container
    pub fn loaded(value: T) -> Self {
        Self {
            value: Some(Box::new(value)),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.value.is_some()
    }

    /// Get the loaded data, failing with `RelationNotLoaded` when absent
    pub fn get(&self) -> ModelResult<&T> {
        self.value.as_deref().ok_or_else(|| ModelError::RelationNotLoaded {
            relation: std::any::type_name::<T>().to_string(),
        })
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_deref()
    }

    /// Take the loaded data, leaving the container empty
    pub fn take(&mut self) -> Option<T> {
        self.value.take().map(|value| *value)
    }

    pub(crate) fn set(&mut self, value: T) {
        self.value = Some(Box::new(value));
    }
}
