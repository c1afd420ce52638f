//! Query Builder eager loading

use super::builder::QueryBuilder;
use crate::error::ModelError;
use crate::model::Model;

impl<M: Model> QueryBuilder<M> {
    /// Eager load a declared relation of `M` for every result
    pub fn with(mut self, relation: &str) -> Self {
        if self.descriptor.relation(relation).is_none() {
            let error = ModelError::UnknownRelation {
                schema: self.descriptor.schema().to_string(),
                relation: relation.to_string(),
            };
            self.fail(error);
            return self;
        }
        if !self.spec.eager.iter().any(|name| name == relation) {
            self.spec.eager.push(relation.to_string());
        }
        self
    }
}
