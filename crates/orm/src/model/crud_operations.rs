//! CRUD Operations - Create, Read, Update, Delete operations for models
//!
//! Every single-instance write passes through the middleware chain registered
//! for the model type on the given [`Database`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::core_trait::Model;
use super::field::FieldValue;
use super::lifecycle::{self, LifecyclePhase};
use super::primary_key::IdentifierOutcome;
use crate::database::Database;
use crate::error::{ModelError, ModelResult};
use crate::middleware::LifecycleEvent;
use crate::query::QueryBuilder;

/// Trait providing CRUD operations for models
#[async_trait]
pub trait CrudOperations: Model {
    /// Start a query over this model
    fn query(db: &Database) -> ModelResult<QueryBuilder<Self>> {
        db.query::<Self>()
    }

    /// Find a visible model by its identifier
    async fn find(db: &Database, id: Self::Id) -> ModelResult<Option<Self>> {
        let descriptor = db.descriptor::<Self>()?;
        db.query::<Self>()?
            .where_eq(descriptor.identifier().key(), id.encode_value())
            .first()
            .await
    }

    /// Create if never persisted, otherwise update
    async fn save(&mut self, db: &Database) -> ModelResult<()> {
        if self.exists() {
            self.update(db).await
        } else {
            self.create(db).await
        }
    }

    /// Insert this instance, assigning its identifier and creation timestamps
    async fn create(&mut self, db: &Database) -> ModelResult<()> {
        lifecycle::dispatch(db, LifecycleEvent::Create, self, None).await
    }

    /// Write every field of this persisted instance back to its record
    async fn update(&mut self, db: &Database) -> ModelResult<()> {
        lifecycle::dispatch(db, LifecycleEvent::Update, self, None).await
    }

    /// Soft delete when the model has a deletion timestamp and `force` is unset;
    /// physically remove the record otherwise
    async fn delete(&mut self, db: &Database, force: bool) -> ModelResult<()> {
        let descriptor = db.descriptor::<Self>()?;
        let event = if descriptor.is_soft_deletable() && !force {
            LifecycleEvent::SoftDelete
        } else {
            LifecycleEvent::Delete { force }
        };
        lifecycle::dispatch(db, event, self, None).await
    }

    /// Soft delete effective at `at`; records stay visible until then
    async fn soft_delete_at(&mut self, db: &Database, at: DateTime<Utc>) -> ModelResult<()> {
        lifecycle::dispatch(db, LifecycleEvent::SoftDelete, self, Some(at)).await
    }

    /// Clear the deletion timestamp of a soft-deleted instance
    async fn restore(&mut self, db: &Database) -> ModelResult<()> {
        lifecycle::dispatch(db, LifecycleEvent::Restore, self, None).await
    }

    /// Insert several instances in one round trip
    ///
    /// Middleware does not run. Identifiers generated by the database are not
    /// written back; the matching outcomes are `NotCaptured`.
    async fn create_batch(db: &Database, models: &mut [Self]) -> ModelResult<Vec<IdentifierOutcome>> {
        lifecycle::create_batch(db, models).await
    }

    /// Identifier of this instance, failing when it has none
    fn require_id(&self) -> ModelResult<&Self::Id> {
        Self::descriptor()?
            .identifier()
            .get(self)
            .ok_or_else(|| ModelError::MissingIdentifier {
                schema: Self::schema().to_string(),
            })
    }

    fn lifecycle_phase(&self) -> ModelResult<LifecyclePhase> {
        Ok(LifecyclePhase::of(&*Self::descriptor()?, self))
    }
}

impl<T: Model> CrudOperations for T {}
