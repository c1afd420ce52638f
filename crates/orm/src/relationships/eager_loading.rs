//! Eager Loading System - batched relation loading without N+1 queries
//!
//! Each loader collects the distinct keys of a whole result set and fetches the
//! related records with `IN` queries of at most `eager_batch_size` keys, then
//! distributes them back onto the parents.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;

use super::containers::Related;
use crate::backends::DatabaseValue;
use crate::database::Database;
use crate::error::{ModelError, ModelResult};
use crate::model::{FieldDescriptor, Model, ModelDescriptor};

/// Fills one relation on a set of already-materialized models
#[async_trait]
pub trait RelationLoader<M>: Send + Sync {
    async fn load(&self, db: &Database, models: &mut [M]) -> ModelResult<()>;
}

/// Distinct non-null keys in first-seen order
fn distinct_keys(values: impl Iterator<Item = DatabaseValue>) -> Vec<DatabaseValue> {
    let mut seen = HashSet::new();
    values
        .filter(|value| !value.is_null())
        .filter(|value| seen.insert(value.to_string()))
        .collect()
}

/// Fetch every `T` whose `key` is one of `keys`, one query per chunk
async fn fetch_in<T: Model>(db: &Database, key: &str, keys: Vec<DatabaseValue>) -> ModelResult<Vec<T>> {
    let mut records = Vec::new();
    for chunk in keys.chunks(db.config().eager_batch_size.max(1)) {
        let mut batch = db.query::<T>()?.where_in(key, chunk.to_vec()).all().await?;
        records.append(&mut batch);
    }
    Ok(records)
}

fn related_field<'a, C: Model>(
    descriptor: &'a ModelDescriptor<C>,
    key: &str,
) -> ModelResult<&'a FieldDescriptor<C>> {
    descriptor.field(key).ok_or_else(|| ModelError::UnknownField {
        schema: descriptor.schema().to_string(),
        field: key.to_string(),
    })
}

/// Many-to-one: the foreign key lives on `M`
pub struct BelongsToLoader<M, P> {
    name: String,
    foreign_key: String,
    slot: fn(&mut M) -> &mut Related<Option<P>>,
}

impl<M, P> BelongsToLoader<M, P> {
    pub fn new(name: &str, foreign_key: &str, slot: fn(&mut M) -> &mut Related<Option<P>>) -> Self {
        Self {
            name: name.to_string(),
            foreign_key: foreign_key.to_string(),
            slot,
        }
    }
}

#[async_trait]
impl<M: Model, P: Model> RelationLoader<M> for BelongsToLoader<M, P> {
    async fn load(&self, db: &Database, models: &mut [M]) -> ModelResult<()> {
        let descriptor = db.descriptor::<M>()?;
        let parent_descriptor = db.descriptor::<P>()?;
        let foreign_key = related_field(&descriptor, &self.foreign_key)?;

        let keys = distinct_keys(models.iter().map(|m| foreign_key.read(m)));
        let parents = if keys.is_empty() {
            Vec::new()
        } else {
            fetch_in::<P>(db, parent_descriptor.identifier().key(), keys).await?
        };

        let mut index = HashMap::new();
        for parent in parents {
            if let Some(id) = parent_descriptor.identifier().encoded(&parent) {
                index.insert(id.to_string(), parent);
            }
        }

        for model in models.iter_mut() {
            let key = foreign_key.read(model);
            let parent = if key.is_null() {
                None
            } else {
                index.get(&key.to_string()).cloned()
            };
            (self.slot)(model).set(parent);
        }

        tracing::debug!(relation = %self.name, parents = index.len(), "loaded belongs-to relation");
        Ok(())
    }
}

/// One-to-one: the foreign key lives on the child `C`
pub struct HasOneLoader<M, C> {
    name: String,
    foreign_key: String,
    slot: fn(&mut M) -> &mut Related<Option<C>>,
}

impl<M, C> HasOneLoader<M, C> {
    pub fn new(name: &str, foreign_key: &str, slot: fn(&mut M) -> &mut Related<Option<C>>) -> Self {
        Self {
            name: name.to_string(),
            foreign_key: foreign_key.to_string(),
            slot,
        }
    }
}

#[async_trait]
impl<M: Model, C: Model> RelationLoader<M> for HasOneLoader<M, C> {
    async fn load(&self, db: &Database, models: &mut [M]) -> ModelResult<()> {
        let groups = load_children::<M, C>(db, &self.foreign_key, models).await?;
        let descriptor = db.descriptor::<M>()?;

        for model in models.iter_mut() {
            let child = descriptor
                .identifier()
                .encoded(model)
                .and_then(|id| groups.get(&id.to_string()))
                .and_then(|children| children.first().cloned());
            (self.slot)(model).set(child);
        }

        tracing::debug!(relation = %self.name, parents = groups.len(), "loaded has-one relation");
        Ok(())
    }
}

/// One-to-many: the foreign key lives on each child `C`
pub struct HasManyLoader<M, C> {
    name: String,
    foreign_key: String,
    slot: fn(&mut M) -> &mut Related<Vec<C>>,
}

impl<M, C> HasManyLoader<M, C> {
    pub fn new(name: &str, foreign_key: &str, slot: fn(&mut M) -> &mut Related<Vec<C>>) -> Self {
        Self {
            name: name.to_string(),
            foreign_key: foreign_key.to_string(),
            slot,
        }
    }
}

#[async_trait]
impl<M: Model, C: Model> RelationLoader<M> for HasManyLoader<M, C> {
    async fn load(&self, db: &Database, models: &mut [M]) -> ModelResult<()> {
        let groups = load_children::<M, C>(db, &self.foreign_key, models).await?;
        let descriptor = db.descriptor::<M>()?;

        for model in models.iter_mut() {
            let children = descriptor
                .identifier()
                .encoded(model)
                .and_then(|id| groups.get(&id.to_string()).cloned())
                .unwrap_or_default();
            (self.slot)(model).set(children);
        }

        tracing::debug!(relation = %self.name, parents = groups.len(), "loaded has-many relation");
        Ok(())
    }
}

/// Children of every model in `models`, grouped by the parent identifier
async fn load_children<M: Model, C: Model>(
    db: &Database,
    foreign_key: &str,
    models: &[M],
) -> ModelResult<HashMap<String, Vec<C>>> {
    let descriptor = db.descriptor::<M>()?;
    let child_descriptor = db.descriptor::<C>()?;
    let child_key = related_field(&child_descriptor, foreign_key)?;

    let keys = distinct_keys(models.iter().filter_map(|m| descriptor.identifier().encoded(m)));
    if keys.is_empty() {
        return Ok(HashMap::new());
    }

    let mut groups: HashMap<String, Vec<C>> = HashMap::new();
    for child in fetch_in::<C>(db, foreign_key, keys).await? {
        groups
            .entry(child_key.read(&child).to_string())
            .or_default()
            .push(child);
    }
    Ok(groups)
}
