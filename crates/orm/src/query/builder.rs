//! Query Builder - Core builder implementation
//!
//! Builder methods consume and return the builder. Every field reference is
//! resolved against the registered descriptors as soon as it is added; the
//! first failure is kept and reported by the terminal operation before any
//! backend call is made.

use std::sync::Arc;

use super::types::*;
use crate::backends::DatabaseValue;
use crate::database::Database;
use crate::error::{ModelError, ModelResult};
use crate::model::{FieldInfo, Model, ModelDescriptor, SchemaLookup};

/// Query builder for constructing database queries over `M`
pub struct QueryBuilder<M: Model> {
    pub(crate) database: Database,
    pub(crate) descriptor: Arc<ModelDescriptor<M>>,
    pub(crate) spec: QuerySpec,
    /// Joined schemas by the name their columns are qualified with
    pub(crate) scopes: Vec<(String, Arc<dyn SchemaLookup>)>,
    pub(crate) error: Option<ModelError>,
}

impl<M: Model> std::fmt::Debug for QueryBuilder<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryBuilder")
            .field("spec", &self.spec)
            .field("error", &self.error)
            .finish()
    }
}

impl<M: Model> QueryBuilder<M> {
    /// Create a new query builder
    pub fn new(database: Database) -> ModelResult<Self> {
        let descriptor = database.descriptor::<M>()?;
        let spec = QuerySpec::new(descriptor.schema(), descriptor.columns());
        Ok(Self {
            database,
            descriptor,
            spec,
            scopes: Vec::new(),
            error: None,
        })
    }

    /// The specification built so far
    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    /// First error recorded while building, if any
    pub fn error(&self) -> Option<&ModelError> {
        self.error.as_ref()
    }

    pub(crate) fn fail(&mut self, error: ModelError) {
        if self.error.is_none() {
            tracing::debug!(schema = self.descriptor.schema(), %error, "query rejected");
            self.error = Some(error);
        }
    }

    /// Keep the first error, or apply `f` on success
    pub(crate) fn record<T>(mut self, result: ModelResult<T>, f: impl FnOnce(&mut Self, T)) -> Self {
        match result {
            Ok(value) => f(&mut self, value),
            Err(error) => self.fail(error),
        }
        self
    }

    pub(crate) fn is_root(&self, scope: &str) -> bool {
        scope == self.spec.name()
    }

    pub(crate) fn scope(&self, name: &str) -> ModelResult<&Arc<dyn SchemaLookup>> {
        self.scopes
            .iter()
            .find(|(scope, _)| scope == name)
            .map(|(_, lookup)| lookup)
            .ok_or_else(|| ModelError::UnknownSchemaReference(name.to_string()))
    }

    /// Resolve a field reference to a storage key within a participating schema
    ///
    /// The root scope is normalized to `None`.
    pub(crate) fn resolve(&self, field: &FieldRef) -> ModelResult<(FieldRef, FieldInfo)> {
        match &field.scope {
            Some(scope) if self.is_root(scope) => {
                let info = self.descriptor.resolve(&field.key)?;
                Ok((FieldRef::new(info.key.clone()), info.clone()))
            }
            Some(scope) => {
                let info = self.scope(scope)?.lookup(&field.key)?;
                Ok((FieldRef::on(scope.clone(), info.key.clone()), info.clone()))
            }
            None => match self.descriptor.resolve(&field.key) {
                Ok(info) => Ok((FieldRef::new(info.key.clone()), info.clone())),
                Err(error) => {
                    let qualified = field
                        .key
                        .split_once('.')
                        .filter(|(scope, _)| self.is_root(scope) || self.scope(scope).is_ok());
                    match qualified {
                        Some((scope, rest)) => self.resolve(&FieldRef::on(scope, rest)),
                        None => Err(error),
                    }
                }
            },
        }
    }

    /// Resolve every field of a predicate and transcode its values
    pub(crate) fn resolve_predicate(&self, predicate: Predicate) -> ModelResult<Predicate> {
        Ok(match predicate {
            Predicate::Compare { field, operator, value } => {
                let (field, info) = self.resolve(&field)?;
                let value = match value {
                    FilterValue::Value(DatabaseValue::Array(values)) if operator.is_set() => {
                        FilterValue::List(values.into_iter().map(|v| info.normalize(v)).collect())
                    }
                    FilterValue::Value(value) => FilterValue::Value(info.normalize(value)),
                    FilterValue::List(values) => {
                        FilterValue::List(values.into_iter().map(|v| info.normalize(v)).collect())
                    }
                    FilterValue::Field(other) => FilterValue::Field(self.resolve(&other)?.0),
                    FilterValue::None => FilterValue::None,
                };
                check_operands(operator, &value)?;
                Predicate::Compare { field, operator, value }
            }
            Predicate::And(predicates) => Predicate::And(
                predicates
                    .into_iter()
                    .map(|p| self.resolve_predicate(p))
                    .collect::<ModelResult<_>>()?,
            ),
            Predicate::Or(predicates) => Predicate::Or(
                predicates
                    .into_iter()
                    .map(|p| self.resolve_predicate(p))
                    .collect::<ModelResult<_>>()?,
            ),
            Predicate::Not(predicate) => Predicate::Not(Box::new(self.resolve_predicate(*predicate)?)),
        })
    }
}

fn check_operands(operator: QueryOperator, value: &FilterValue) -> ModelResult<()> {
    let valid = match value {
        FilterValue::None => operator.is_unary(),
        FilterValue::List(_) => operator.is_set(),
        FilterValue::Value(_) | FilterValue::Field(_) => !operator.is_unary() && !operator.is_set(),
    };
    if valid {
        Ok(())
    } else {
        Err(ModelError::Validation(format!(
            "operator {} does not accept the given operand",
            operator
        )))
    }
}
