//! Query Builder execution - compiling the specification and running it
//!
//! Soft-delete visibility is applied here, with the clock read once per
//! query, so a deletion time in the future keeps a record visible until it
//! passes.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::builder::QueryBuilder;
use super::types::*;
use crate::backends::{DatabaseValue, Row, AGGREGATE_KEY};
use crate::database::Database;
use crate::error::{ModelError, ModelResult};
use crate::model::{FieldInfo, Model, ModelDescriptor};

/// A compiled query ready for the backend
pub(crate) struct Prepared<M: Model> {
    pub(crate) database: Database,
    pub(crate) descriptor: Arc<ModelDescriptor<M>>,
    pub(crate) spec: QuerySpec,
}

/// Predicate keeping records whose deletion time is unset or still ahead
pub(crate) fn visibility_filter(scope: Option<&str>, info: &FieldInfo, now: DateTime<Utc>) -> Predicate {
    let field = match scope {
        Some(scope) => FieldRef::on(scope, info.key.clone()),
        None => FieldRef::new(info.key.clone()),
    };
    let now = info.encode_time(now);
    Predicate::Or(vec![
        Predicate::is_null(field.clone()),
        Predicate::Compare {
            field,
            operator: QueryOperator::GreaterThan,
            value: FilterValue::Value(now),
        },
    ])
}

impl<M: Model> QueryBuilder<M> {
    pub(crate) fn prepare(self, action: QueryAction) -> ModelResult<Prepared<M>> {
        if let Some(error) = self.error {
            return Err(error);
        }

        let QueryBuilder {
            database,
            descriptor,
            mut spec,
            scopes,
            ..
        } = self;

        if !spec.joins.is_empty() && !database.backend().capabilities().joins {
            return Err(ModelError::UnsupportedOperation(format!(
                "the {} backend cannot join schemas",
                database.backend().backend_type()
            )));
        }

        let bulk = matches!(action, QueryAction::Update(_) | QueryAction::Delete);
        if bulk && !spec.joins.is_empty() {
            return Err(ModelError::UnsupportedOperation(
                "bulk updates and deletes cannot join other schemas".to_string(),
            ));
        }
        if bulk && (spec.limit.is_some() || spec.offset.is_some()) {
            return Err(ModelError::UnsupportedOperation(
                "bulk updates and deletes cannot be paginated".to_string(),
            ));
        }

        if spec.visibility == SoftDeleteVisibility::ExcludeDeleted {
            let now = Utc::now();
            if let Some(field) = descriptor.soft_delete_field() {
                spec.add_filter(visibility_filter(None, field.info(), now));
            }
            for join in spec.joins.iter_mut() {
                let lookup = scopes.iter().find(|(name, _)| name == join.name());
                if let Some(info) = lookup.and_then(|(_, lookup)| lookup.soft_delete_info()) {
                    join.filter = Some(visibility_filter(Some(join.name()), info, now));
                }
            }
        }

        if !matches!(action, QueryAction::Read) {
            spec.sorts.clear();
            spec.eager.clear();
        }
        if matches!(action, QueryAction::Count) {
            spec.limit = None;
            spec.offset = None;
        }
        spec.action = action;

        Ok(Prepared {
            database,
            descriptor,
            spec,
        })
    }

    /// Compile the read query without executing it
    pub fn to_spec(self) -> ModelResult<QuerySpec> {
        Ok(self.prepare(QueryAction::Read)?.spec)
    }

    /// Execute the query and return all matching models
    pub async fn all(self) -> ModelResult<Vec<M>> {
        let prepared = self.prepare(QueryAction::Read)?;
        let rows = prepared.database.execute(&prepared.spec).await?;
        let mut models = rows
            .iter()
            .map(|row| materialize(&prepared.descriptor, row))
            .collect::<ModelResult<Vec<_>>>()?;
        load_relations(&prepared, &mut models).await?;
        Ok(models)
    }

    /// Execute the query and return the first matching model
    pub async fn first(self) -> ModelResult<Option<M>> {
        Ok(self.limit(1).all().await?.into_iter().next())
    }

    /// Count matching records, ignoring sorts and pagination
    pub async fn count(self) -> ModelResult<u64> {
        let prepared = self.prepare(QueryAction::Count)?;
        let rows = prepared.database.execute(&prepared.spec).await?;
        aggregate(&rows)
    }

    /// Execute a joined query, pairing each model with its match from `J`
    ///
    /// `J` is the first joined schema of that type; unmatched left joins yield `None`.
    pub async fn all_joined<J: Model>(self) -> ModelResult<Vec<(M, Option<J>)>> {
        let prepared = self.prepare(QueryAction::Read)?;
        let name = prepared
            .spec
            .joins
            .iter()
            .find(|join| join.schema == J::schema())
            .map(|join| join.name().to_string())
            .ok_or_else(|| ModelError::UnknownSchemaReference(J::schema().to_string()))?;
        let joined = prepared.database.descriptor::<J>()?;

        let rows = prepared.database.execute(&prepared.spec).await?;
        let mut models = Vec::with_capacity(rows.len());
        let mut matches = Vec::with_capacity(rows.len());
        for row in &rows {
            models.push(materialize(&prepared.descriptor, row)?);
            matches.push(materialize_joined(&joined, &name, row)?);
        }
        load_relations(&prepared, &mut models).await?;
        Ok(models.into_iter().zip(matches).collect())
    }
}

/// Decode a stored record into a persisted instance
pub(crate) fn materialize<M: Model>(descriptor: &ModelDescriptor<M>, row: &Row) -> ModelResult<M> {
    let mut model = descriptor.decode(row)?;
    model.state_mut().mark_persisted();
    Ok(model)
}

fn materialize_joined<J: Model>(descriptor: &ModelDescriptor<J>, name: &str, row: &Row) -> ModelResult<Option<J>> {
    let prefix = format!("{}.", name);
    let scoped: Row = row
        .iter()
        .filter_map(|(key, value)| key.strip_prefix(&prefix).map(|key| (key.to_string(), value.clone())))
        .collect();

    match scoped.get(descriptor.identifier().key()) {
        None | Some(DatabaseValue::Null) => Ok(None),
        Some(_) => materialize(descriptor, &scoped).map(Some),
    }
}

async fn load_relations<M: Model>(prepared: &Prepared<M>, models: &mut [M]) -> ModelResult<()> {
    if models.is_empty() {
        return Ok(());
    }
    for name in &prepared.spec.eager {
        let relation = prepared
            .descriptor
            .relation(name)
            .ok_or_else(|| ModelError::UnknownRelation {
                schema: prepared.descriptor.schema().to_string(),
                relation: name.clone(),
            })?;
        relation.loader().load(&prepared.database, models).await?;
    }
    Ok(())
}

pub(crate) fn aggregate(rows: &[Row]) -> ModelResult<u64> {
    rows.first()
        .and_then(|row| row.get(AGGREGATE_KEY))
        .and_then(DatabaseValue::as_i64)
        .map(|count| count.max(0) as u64)
        .ok_or_else(|| ModelError::Serialization("backend returned no aggregate".to_string()))
}
