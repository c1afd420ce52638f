//! Model Registry - process-wide, publish-once storage of model descriptors

use std::any::{Any, TypeId};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use once_cell::sync::Lazy;

use super::core_trait::Model;
use super::descriptor::{ModelDescriptor, SchemaBuilder};
use crate::error::{ModelError, ModelResult};

static GLOBAL_REGISTRY: Lazy<ModelRegistry> = Lazy::new(ModelRegistry::new);

/// Thread-safe registry of model descriptors keyed by model type
///
/// A descriptor is fully built before it is published, so readers only ever
/// see complete descriptors.
#[derive(Default)]
pub struct ModelRegistry {
    models: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self {
            models: DashMap::new(),
        }
    }

    /// The registry shared by every `Database` handle in the process
    pub fn global() -> &'static ModelRegistry {
        &GLOBAL_REGISTRY
    }

    /// Publish a descriptor for `M`
    ///
    /// Registering an identical descriptor again returns the published one;
    /// a differing descriptor is a `ConflictingSchema` error.
    pub fn register<M: Model>(&self, descriptor: ModelDescriptor<M>) -> ModelResult<Arc<ModelDescriptor<M>>> {
        match self.models.entry(TypeId::of::<M>()) {
            Entry::Occupied(entry) => {
                let existing = downcast::<M>(entry.get())?;
                if existing.signature() == descriptor.signature() {
                    Ok(existing)
                } else {
                    tracing::error!(schema = descriptor.schema(), "conflicting model registration");
                    Err(ModelError::ConflictingSchema {
                        schema: descriptor.schema().to_string(),
                    })
                }
            }
            Entry::Vacant(entry) => {
                let published = Arc::new(descriptor);
                entry.insert(published.clone() as Arc<dyn Any + Send + Sync>);
                tracing::debug!(
                    schema = published.schema(),
                    fields = published.fields().len(),
                    relations = published.relations().len(),
                    "registered model"
                );
                Ok(published)
            }
        }
    }

    /// Descriptor of `M`, building and publishing it on first use
    pub fn descriptor<M: Model>(&self) -> ModelResult<Arc<ModelDescriptor<M>>> {
        if let Some(entry) = self.models.get(&TypeId::of::<M>()) {
            return downcast::<M>(entry.value());
        }

        let descriptor = M::describe(SchemaBuilder::new(M::schema())).build()?;
        self.register(descriptor)
    }

    pub fn is_registered<M: Model>(&self) -> bool {
        self.models.contains_key(&TypeId::of::<M>())
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Empty instance of `M` used to materialize results
    pub fn instantiate<M: Model>(&self) -> ModelResult<M> {
        Ok(self.descriptor::<M>()?.instantiate())
    }
}

fn downcast<M: Model>(entry: &Arc<dyn Any + Send + Sync>) -> ModelResult<Arc<ModelDescriptor<M>>> {
    Arc::clone(entry)
        .downcast::<ModelDescriptor<M>>()
        .map_err(|_| ModelError::Configuration(format!("registry entry for '{}' has the wrong type", M::schema())))
}
