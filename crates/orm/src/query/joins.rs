//! Query Builder JOIN operations
//!
//! A schema can participate in a query once under its own name; any further
//! participation needs an alias.

use std::sync::Arc;

use super::builder::QueryBuilder;
use super::types::*;
use crate::error::{ModelError, ModelResult};
use crate::model::{Model, SchemaLookup};

impl<M: Model> QueryBuilder<M> {
    /// Qualify the root schema with an alias
    pub fn alias(mut self, alias: &str) -> Self {
        if self.scopes.iter().any(|(name, _)| name == alias) {
            self.fail(ModelError::AmbiguousSchemaReference {
                schema: alias.to_string(),
            });
            return self;
        }
        self.spec.alias = Some(alias.to_string());
        self
    }

    /// Add INNER JOIN of `J`, matching `local` against `foreign_key` on `J`
    pub fn join<J: Model>(self, local: impl Into<FieldRef>, foreign_key: &str) -> Self {
        self.add_join::<J>(None, JoinType::Inner, local.into(), foreign_key)
    }

    /// Add LEFT JOIN of `J`
    pub fn left_join<J: Model>(self, local: impl Into<FieldRef>, foreign_key: &str) -> Self {
        self.add_join::<J>(None, JoinType::Left, local.into(), foreign_key)
    }

    /// Add a join of `J` under `alias`
    pub fn join_as<J: Model>(
        self,
        alias: &str,
        join_type: JoinType,
        local: impl Into<FieldRef>,
        foreign_key: &str,
    ) -> Self {
        self.add_join::<J>(Some(alias), join_type, local.into(), foreign_key)
    }

    fn add_join<J: Model>(
        self,
        alias: Option<&str>,
        join_type: JoinType,
        local: FieldRef,
        foreign_key: &str,
    ) -> Self {
        let join = self.plan_join::<J>(alias, join_type, &local, foreign_key);
        self.record(join, |builder, (join, lookup)| {
            builder.scopes.push((join.name().to_string(), lookup));
            builder.spec.joins.push(join);
        })
    }

    fn plan_join<J: Model>(
        &self,
        alias: Option<&str>,
        join_type: JoinType,
        local: &FieldRef,
        foreign_key: &str,
    ) -> ModelResult<(JoinSpec, Arc<dyn SchemaLookup>)> {
        let descriptor = self.database.descriptor::<J>()?;
        let name = alias.unwrap_or(descriptor.schema());
        if self.is_root(name) || self.scopes.iter().any(|(scope, _)| scope == name) {
            return Err(ModelError::AmbiguousSchemaReference {
                schema: name.to_string(),
            });
        }

        let (local, _) = self.resolve(local)?;
        let foreign = descriptor.resolve(foreign_key)?;

        let join = JoinSpec {
            schema: descriptor.schema().to_string(),
            alias: alias.map(str::to_string),
            join_type,
            local,
            foreign_key: foreign.key.clone(),
            columns: descriptor.columns(),
            filter: None,
        };
        Ok((join, descriptor as Arc<dyn SchemaLookup>))
    }
}
