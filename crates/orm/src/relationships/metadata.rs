//! Relationship Metadata System - declared relations of a model

use std::fmt;
use std::sync::Arc;

use super::eager_loading::RelationLoader;

/// Defines the type of relationship between models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationshipType {
    /// Many-to-one through a foreign key on this model
    BelongsTo,
    /// One-to-one through a foreign key on the related model
    HasOne,
    /// One-to-many through a foreign key on the related model
    HasMany,
}

impl RelationshipType {
    /// Returns true if this relationship returns a collection
    pub fn is_collection(self) -> bool {
        matches!(self, Self::HasMany)
    }

    /// Returns true if the foreign key lives on the declaring model
    pub fn owns_foreign_key(self) -> bool {
        matches!(self, Self::BelongsTo)
    }
}

/// A relation declared on model `M`, with the loader that fills it
pub struct RelationDescriptor<M> {
    name: String,
    relationship_type: RelationshipType,
    related_schema: String,
    foreign_key: String,
    loader: Arc<dyn RelationLoader<M>>,
}

impl<M> Clone for RelationDescriptor<M> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            relationship_type: self.relationship_type,
            related_schema: self.related_schema.clone(),
            foreign_key: self.foreign_key.clone(),
            loader: Arc::clone(&self.loader),
        }
    }
}

impl<M> fmt::Debug for RelationDescriptor<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationDescriptor")
            .field("name", &self.name)
            .field("relationship_type", &self.relationship_type)
            .field("related_schema", &self.related_schema)
            .field("foreign_key", &self.foreign_key)
            .finish()
    }
}

impl<M> RelationDescriptor<M> {
    pub fn new(
        name: &str,
        relationship_type: RelationshipType,
        related_schema: &str,
        foreign_key: &str,
        loader: Arc<dyn RelationLoader<M>>,
    ) -> Self {
        Self {
            name: name.to_string(),
            relationship_type,
            related_schema: related_schema.to_string(),
            foreign_key: foreign_key.to_string(),
            loader,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn relationship_type(&self) -> RelationshipType {
        self.relationship_type
    }

    pub fn related_schema(&self) -> &str {
        &self.related_schema
    }

    pub fn foreign_key(&self) -> &str {
        &self.foreign_key
    }

    pub fn loader(&self) -> &Arc<dyn RelationLoader<M>> {
        &self.loader
    }
}
