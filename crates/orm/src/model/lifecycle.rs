//! Persistence Lifecycle - the state machine behind save, update, delete and restore
//!
//! Every operation works on a staged copy of the instance and commits it back
//! only after the backend reports success, so a failed identifier assignment,
//! encode or write leaves the caller's instance untouched.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::core_trait::Model;
use super::descriptor::ModelDescriptor;
use super::field::{TimestampFormat, TimestampTrigger};
use super::primary_key::IdentifierOutcome;
use crate::backends::{DatabaseValue, Row, WriteOutcome, WriteRequest};
use crate::database::Database;
use crate::error::{ModelError, ModelResult};
use crate::middleware::{LifecycleEvent, LifecycleOperation, Next};

/// Where an instance stands relative to its stored record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecyclePhase {
    /// Never written
    New,
    Persisted,
    /// Persisted with its deletion time set
    SoftDeleted,
    /// Physically removed
    Destroyed,
}

impl LifecyclePhase {
    pub fn of<M: Model>(descriptor: &ModelDescriptor<M>, model: &M) -> Self {
        let state = model.state();
        if state.is_destroyed() {
            LifecyclePhase::Destroyed
        } else if !state.exists() {
            LifecyclePhase::New
        } else if descriptor
            .soft_delete_field()
            .and_then(|field| field.stamped(model))
            .is_some()
        {
            LifecyclePhase::SoftDeleted
        } else {
            LifecyclePhase::Persisted
        }
    }
}

/// Run `event` for `model` through the middleware chain of its type
pub(crate) async fn dispatch<M: Model>(
    database: &Database,
    event: LifecycleEvent,
    model: &mut M,
    deleted_at: Option<DateTime<Utc>>,
) -> ModelResult<()> {
    let descriptor = database.descriptor::<M>()?;
    precheck(&descriptor, event, model)?;

    tracing::debug!(
        schema = descriptor.schema(),
        event = %event,
        identifier = ?descriptor.identifier().get(model),
        "lifecycle operation"
    );

    let operation = BackendOperation {
        database,
        descriptor: &descriptor,
        deleted_at,
    };
    Next::new(event, database.middleware::<M>(), &operation)
        .run(model)
        .await
}

fn precheck<M: Model>(descriptor: &ModelDescriptor<M>, event: LifecycleEvent, model: &M) -> ModelResult<()> {
    if event == LifecycleEvent::Create {
        return Ok(());
    }
    if !model.exists() {
        return Err(ModelError::StaleModel {
            schema: descriptor.schema().to_string(),
        });
    }

    match event {
        LifecycleEvent::SoftDelete | LifecycleEvent::Restore if !descriptor.is_soft_deletable() => {
            Err(ModelError::UnsupportedOperation(format!(
                "schema '{}' has no deletion timestamp",
                descriptor.schema()
            )))
        }
        LifecycleEvent::Restore if LifecyclePhase::of(descriptor, model) != LifecyclePhase::SoftDeleted => {
            Err(ModelError::NotSoftDeleted {
                schema: descriptor.schema().to_string(),
            })
        }
        _ => Ok(()),
    }
}

/// Innermost link of the chain: the write itself
struct BackendOperation<'a, M: Model> {
    database: &'a Database,
    descriptor: &'a ModelDescriptor<M>,
    /// Deletion time for soft deletes; the current time when unset
    deleted_at: Option<DateTime<Utc>>,
}

#[async_trait]
impl<'a, M: Model> LifecycleOperation<M> for BackendOperation<'a, M> {
    async fn apply(&self, event: LifecycleEvent, model: &mut M) -> ModelResult<()> {
        match event {
            LifecycleEvent::Create => self.create(model).await,
            LifecycleEvent::Update => self.update(model).await,
            LifecycleEvent::SoftDelete => {
                let at = self.deleted_at.unwrap_or_else(Utc::now);
                self.write_deletion(model, Some(at)).await
            }
            LifecycleEvent::Restore => self.write_deletion(model, None).await,
            LifecycleEvent::Delete { .. } => self.destroy(model).await,
        }
    }
}

impl<'a, M: Model> BackendOperation<'a, M> {
    fn schema(&self) -> &str {
        self.descriptor.schema()
    }

    fn identifier_value(&self, model: &M) -> ModelResult<DatabaseValue> {
        self.descriptor
            .identifier()
            .encoded(model)
            .ok_or_else(|| ModelError::MissingIdentifier {
                schema: self.schema().to_string(),
            })
    }

    async fn create(&self, model: &mut M) -> ModelResult<()> {
        let identifier = self.descriptor.identifier();
        let mut staged = model.clone();
        let outcome = identifier.assign(self.schema(), &mut staged)?;

        let now = TimestampFormat::normalize(Utc::now());
        self.descriptor.touch(&mut staged, TimestampTrigger::Create, now);
        self.descriptor.touch(&mut staged, TimestampTrigger::Update, now);

        let pending = outcome == IdentifierOutcome::Pending;
        let request = WriteRequest::create(self.schema(), identifier.key(), vec![self.descriptor.encode(&staged)])
            .with_columns(self.descriptor.columns())
            .returning_identifier(pending);
        let written = self.database.execute_write(request).await?;

        if pending {
            match written.generated_identifier {
                Some(generated) => identifier.write(&mut staged, generated)?,
                None => tracing::warn!(
                    schema = self.schema(),
                    "backend did not report the generated identifier"
                ),
            }
        }

        staged.state_mut().mark_persisted();
        *model = staged;
        Ok(())
    }

    async fn update(&self, model: &mut M) -> ModelResult<()> {
        let id = self.identifier_value(model)?;
        let mut staged = model.clone();
        self.descriptor
            .touch(&mut staged, TimestampTrigger::Update, TimestampFormat::normalize(Utc::now()));

        let mut row = self.descriptor.encode(&staged);
        row.remove(self.descriptor.identifier().key());
        self.write_matched(id, row).await?;

        *model = staged;
        Ok(())
    }

    /// Set or clear the deletion timestamp; no other field is written
    async fn write_deletion(&self, model: &mut M, at: Option<DateTime<Utc>>) -> ModelResult<()> {
        let field = self.descriptor.soft_delete_field().ok_or_else(|| {
            ModelError::UnsupportedOperation(format!("schema '{}' has no deletion timestamp", self.schema()))
        })?;
        let id = self.identifier_value(model)?;

        let mut staged = model.clone();
        field.stamp(&mut staged, at);
        let mut row = Row::new();
        row.insert(field.key().to_string(), field.read(&staged));
        self.write_matched(id, row).await?;

        *model = staged;
        Ok(())
    }

    async fn destroy(&self, model: &mut M) -> ModelResult<()> {
        let id = self.identifier_value(model)?;
        let request = WriteRequest::delete(self.schema(), self.descriptor.identifier().key(), id);
        let written = self.database.execute_write(request).await?;
        self.require_match(&written)?;

        model.state_mut().mark_destroyed();
        Ok(())
    }

    async fn write_matched(&self, id: DatabaseValue, row: Row) -> ModelResult<()> {
        let request = WriteRequest::update(self.schema(), self.descriptor.identifier().key(), id, row)
            .with_columns(self.descriptor.columns());
        let written = self.database.execute_write(request).await?;
        self.require_match(&written)
    }

    fn require_match(&self, written: &WriteOutcome) -> ModelResult<()> {
        if written.affected == 0 {
            return Err(ModelError::NotFound(self.schema().to_string()));
        }
        Ok(())
    }
}

/// Insert `models` in one round trip, bypassing middleware
///
/// Identifiers left to the database are not reported back per record; those
/// instances end with no identifier and a `NotCaptured` outcome.
pub(crate) async fn create_batch<M: Model>(
    database: &Database,
    models: &mut [M],
) -> ModelResult<Vec<IdentifierOutcome>> {
    if models.is_empty() {
        return Ok(Vec::new());
    }

    let descriptor = database.descriptor::<M>()?;
    let identifier = descriptor.identifier();
    let now = TimestampFormat::normalize(Utc::now());

    let mut staged = models.to_vec();
    let mut outcomes = Vec::with_capacity(staged.len());
    let mut rows = Vec::with_capacity(staged.len());
    for model in staged.iter_mut() {
        outcomes.push(identifier.assign(descriptor.schema(), model)?);
        descriptor.touch(model, TimestampTrigger::Create, now);
        descriptor.touch(model, TimestampTrigger::Update, now);
        rows.push(descriptor.encode(model));
    }

    tracing::debug!(schema = descriptor.schema(), count = rows.len(), "batch create");
    let request = WriteRequest::create(descriptor.schema(), identifier.key(), rows).with_columns(descriptor.columns());
    database.execute_write(request).await?;

    let mut not_captured = 0usize;
    for (model, outcome) in staged.iter_mut().zip(outcomes.iter_mut()) {
        if *outcome == IdentifierOutcome::Pending {
            identifier.set(model, None);
            *outcome = IdentifierOutcome::NotCaptured;
            not_captured += 1;
        }
        model.state_mut().mark_persisted();
    }
    if not_captured > 0 {
        tracing::warn!(
            schema = descriptor.schema(),
            count = not_captured,
            "batch create does not capture generated identifiers"
        );
    }

    for (slot, model) in models.iter_mut().zip(staged) {
        *slot = model;
    }
    Ok(outcomes)
}
