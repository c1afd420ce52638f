//! Query Builder bulk updates and deletes
//!
//! Bulk writes bypass middleware and never load the affected instances.

use chrono::Utc;

use super::builder::QueryBuilder;
use super::execution::aggregate;
use super::types::*;
use crate::backends::{DatabaseValue, Row};
use crate::error::{ModelError, ModelResult};
use crate::model::{Model, TimestampFormat, TimestampTrigger};

/// Set of field assignments for a bulk update, keyed by flat key or dotted path
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    values: Vec<(String, DatabaseValue)>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign `value` to `field`; a later assignment to the same field wins
    pub fn set(mut self, field: &str, value: impl Into<DatabaseValue>) -> Self {
        self.values.retain(|(existing, _)| existing != field);
        self.values.push((field.to_string(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DatabaseValue)> {
        self.values.iter().map(|(field, value)| (field.as_str(), value))
    }
}

impl<M: Model> QueryBuilder<M> {
    /// Apply `patch` to every matching record, returning the number affected
    ///
    /// Update-triggered timestamps not named in the patch are stamped with the
    /// current time.
    pub async fn update(self, patch: Patch) -> ModelResult<u64> {
        let assignments = self.assignments(&patch);
        let mut prepared = self.prepare(QueryAction::Update(Row::new()))?;
        prepared.spec.action = QueryAction::Update(assignments?);
        let rows = prepared.database.execute(&prepared.spec).await?;
        aggregate(&rows)
    }

    /// Delete every matching record
    ///
    /// Soft-deletable schemas have their deletion time set instead.
    pub async fn delete(self) -> ModelResult<u64> {
        let Some(info) = self.descriptor.soft_delete_field().map(|f| f.info().clone()) else {
            return self.force_delete().await;
        };

        let mut row = Row::new();
        row.insert(info.key.clone(), info.encode_time(TimestampFormat::normalize(Utc::now())));

        let mut prepared = self.prepare(QueryAction::Update(Row::new()))?;
        prepared.spec.action = QueryAction::Update(row);
        let rows = prepared.database.execute(&prepared.spec).await?;
        aggregate(&rows)
    }

    /// Physically remove every matching record, soft-deletable or not
    pub async fn force_delete(self) -> ModelResult<u64> {
        let prepared = self.prepare(QueryAction::Delete)?;
        let rows = prepared.database.execute(&prepared.spec).await?;
        aggregate(&rows)
    }

    fn assignments(&self, patch: &Patch) -> ModelResult<Row> {
        if patch.is_empty() {
            return Err(ModelError::Validation("update requires at least one assignment".to_string()));
        }

        let mut row = Row::new();
        for (path, value) in patch.iter() {
            let info = self.descriptor.resolve(path)?;
            if info.key == self.descriptor.identifier().key() {
                return Err(ModelError::Validation(format!(
                    "identifier '{}' cannot be assigned in bulk",
                    info.key
                )));
            }
            let value = info.normalize(value.clone());
            if value.is_null() && !info.nullable {
                return Err(ModelError::InvalidFieldValue {
                    key: info.key.clone(),
                    message: "null assigned to a non-nullable field".to_string(),
                });
            }
            row.insert(info.key.clone(), value);
        }

        let now = TimestampFormat::normalize(Utc::now());
        for field in self.descriptor.fields() {
            let info = field.info();
            if info.trigger == TimestampTrigger::Update {
                row.entry(info.key.clone())
                    .or_insert_with(|| info.encode_time(now));
            }
        }
        Ok(row)
    }
}
