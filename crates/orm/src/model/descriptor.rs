//! Model Descriptors - the static, shared layout of a model type
//!
//! [`SchemaBuilder`] is the registration API: a model lists its identifier,
//! fields, nested groups and relations, and `build` validates the flattened
//! result into an immutable [`ModelDescriptor`].

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::core_trait::Model;
use super::field::{FieldDescriptor, FieldInfo, FieldValue, TimestampFormat, TimestampTrigger};
use super::group::{FieldGroup, FieldSet};
use super::primary_key::{IdentifierDescriptor, IdentifierStrategy};
use crate::backends::{ColumnSpec, DatabaseValue, Row};
use crate::error::{ModelError, ModelResult};
use crate::relationships::eager_loading::{BelongsToLoader, HasManyLoader, HasOneLoader};
use crate::relationships::{Related, RelationDescriptor, RelationshipType};

struct PendingIdentifier<M: Model> {
    key: String,
    strategy: Option<IdentifierStrategy>,
    get: fn(&M) -> &Option<M::Id>,
    get_mut: fn(&mut M) -> &mut Option<M::Id>,
}

/// Registration builder for a model descriptor
pub struct SchemaBuilder<M: Model> {
    schema: String,
    identifier: Option<PendingIdentifier<M>>,
    fields: FieldSet<M>,
    relations: Vec<RelationDescriptor<M>>,
    error: Option<ModelError>,
}

impl<M: Model> SchemaBuilder<M> {
    pub fn new(schema: &str) -> Self {
        Self {
            schema: schema.to_string(),
            identifier: None,
            fields: FieldSet::new(),
            relations: Vec::new(),
            error: None,
        }
    }

    /// Identifier with an inferred generation strategy
    pub fn id(self, key: &str, get: fn(&M) -> &Option<M::Id>, get_mut: fn(&mut M) -> &mut Option<M::Id>) -> Self {
        self.set_identifier(key, None, get, get_mut)
    }

    /// Identifier with an explicit generation strategy
    pub fn id_with(
        self,
        key: &str,
        strategy: IdentifierStrategy,
        get: fn(&M) -> &Option<M::Id>,
        get_mut: fn(&mut M) -> &mut Option<M::Id>,
    ) -> Self {
        self.set_identifier(key, Some(strategy), get, get_mut)
    }

    fn set_identifier(
        mut self,
        key: &str,
        strategy: Option<IdentifierStrategy>,
        get: fn(&M) -> &Option<M::Id>,
        get_mut: fn(&mut M) -> &mut Option<M::Id>,
    ) -> Self {
        if self.identifier.is_some() {
            self.fail(ModelError::Configuration(format!(
                "schema '{}' declares more than one identifier",
                self.schema
            )));
            return self;
        }
        self.identifier = Some(PendingIdentifier {
            key: key.to_string(),
            strategy,
            get,
            get_mut,
        });
        self
    }

    pub fn field<V: FieldValue>(mut self, key: &str, get: fn(&M) -> &V, get_mut: fn(&mut M) -> &mut V) -> Self {
        self.fields = self.fields.field(key, get, get_mut);
        self
    }

    pub fn timestamp(
        mut self,
        key: &str,
        trigger: TimestampTrigger,
        format: TimestampFormat,
        get: fn(&M) -> &Option<DateTime<Utc>>,
        get_mut: fn(&mut M) -> &mut Option<DateTime<Utc>>,
    ) -> Self {
        self.fields = self.fields.timestamp(key, trigger, format, get, get_mut);
        self
    }

    /// Soft-deletion timestamp; makes `delete` non-destructive by default
    pub fn deleted_at(
        self,
        key: &str,
        format: TimestampFormat,
        get: fn(&M) -> &Option<DateTime<Utc>>,
        get_mut: fn(&mut M) -> &mut Option<DateTime<Utc>>,
    ) -> Self {
        self.timestamp(key, TimestampTrigger::Delete, format, get, get_mut)
    }

    pub fn group<G: FieldGroup>(mut self, key: &str, get: fn(&M) -> &G, get_mut: fn(&mut M) -> &mut G) -> Self {
        self.fields = self.fields.group(key, get, get_mut);
        self
    }

    /// Belongs-to relation through `foreign_key` on this model
    pub fn parent<P: Model>(
        mut self,
        name: &str,
        foreign_key: &str,
        slot: fn(&mut M) -> &mut Related<Option<P>>,
    ) -> Self {
        let loader = BelongsToLoader::<M, P>::new(name, foreign_key, slot);
        self.relations.push(RelationDescriptor::new(
            name,
            RelationshipType::BelongsTo,
            P::schema(),
            foreign_key,
            Arc::new(loader),
        ));
        self
    }

    /// Has-one relation through `foreign_key` on the child
    pub fn child<C: Model>(
        mut self,
        name: &str,
        foreign_key: &str,
        slot: fn(&mut M) -> &mut Related<Option<C>>,
    ) -> Self {
        let loader = HasOneLoader::<M, C>::new(name, foreign_key, slot);
        self.relations.push(RelationDescriptor::new(
            name,
            RelationshipType::HasOne,
            C::schema(),
            foreign_key,
            Arc::new(loader),
        ));
        self
    }

    /// Has-many relation through `foreign_key` on the children
    pub fn children<C: Model>(
        mut self,
        name: &str,
        foreign_key: &str,
        slot: fn(&mut M) -> &mut Related<Vec<C>>,
    ) -> Self {
        let loader = HasManyLoader::<M, C>::new(name, foreign_key, slot);
        self.relations.push(RelationDescriptor::new(
            name,
            RelationshipType::HasMany,
            C::schema(),
            foreign_key,
            Arc::new(loader),
        ));
        self
    }

    fn fail(&mut self, error: ModelError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// Validate the declared layout and freeze it
    pub fn build(self) -> ModelResult<ModelDescriptor<M>> {
        if let Some(error) = self.error {
            return Err(error);
        }

        let schema = self.schema;
        let pending = self.identifier.ok_or_else(|| {
            ModelError::Configuration(format!("schema '{}' declares no identifier", schema))
        })?;

        let strategy = match pending.strategy {
            Some(strategy) => strategy,
            None => IdentifierStrategy::infer::<M::Id>(&schema, &pending.key)?,
        };
        strategy.validate::<M::Id>(&schema, &pending.key)?;

        let fields = self.fields.into_fields();
        let mut seen = HashSet::new();
        for key in std::iter::once(pending.key.as_str()).chain(fields.iter().map(|f| f.key())) {
            if key.is_empty() || key.contains('.') {
                return Err(ModelError::Configuration(format!(
                    "invalid field key '{}' in schema '{}'",
                    key, schema
                )));
            }
            if !seen.insert(key.to_string()) {
                return Err(ModelError::DuplicateKey {
                    schema: schema.clone(),
                    key: key.to_string(),
                });
            }
        }

        let mut soft_delete = None;
        for (index, field) in fields.iter().enumerate() {
            if field.info().trigger == TimestampTrigger::Delete {
                if soft_delete.is_some() {
                    return Err(ModelError::Configuration(format!(
                        "schema '{}' declares more than one deletion timestamp",
                        schema
                    )));
                }
                soft_delete = Some(index);
            }
        }

        let mut names = HashSet::new();
        for relation in &self.relations {
            if !names.insert(relation.name().to_string()) {
                return Err(ModelError::Configuration(format!(
                    "relation '{}' declared twice on schema '{}'",
                    relation.name(),
                    schema
                )));
            }
            if relation.relationship_type() == RelationshipType::BelongsTo
                && !seen.contains(relation.foreign_key())
            {
                return Err(ModelError::Configuration(format!(
                    "relation '{}' uses unknown foreign key '{}' on schema '{}'",
                    relation.name(),
                    relation.foreign_key(),
                    schema
                )));
            }
        }

        let id_info = FieldInfo {
            key: pending.key.clone(),
            path: pending.key.clone(),
            kind: <M::Id as FieldValue>::codec_kind(),
            nullable: false,
            trigger: TimestampTrigger::None,
            format: None,
        };

        Ok(ModelDescriptor {
            identifier: IdentifierDescriptor::new(&pending.key, strategy, pending.get, pending.get_mut),
            schema,
            id_info,
            fields,
            relations: self.relations,
            soft_delete,
        })
    }
}

/// Comparable summary of a descriptor, used to detect conflicting registrations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorSignature {
    pub schema: String,
    pub identifier: (String, IdentifierStrategy),
    pub fields: Vec<FieldInfo>,
    pub relations: Vec<(String, RelationshipType, String, String)>,
}

/// Immutable layout of a model type
pub struct ModelDescriptor<M: Model> {
    schema: String,
    identifier: IdentifierDescriptor<M, M::Id>,
    id_info: FieldInfo,
    fields: Vec<FieldDescriptor<M>>,
    relations: Vec<RelationDescriptor<M>>,
    soft_delete: Option<usize>,
}

impl<M: Model> fmt::Debug for ModelDescriptor<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelDescriptor")
            .field("schema", &self.schema)
            .field("identifier", &self.identifier)
            .field("fields", &self.fields)
            .field("relations", &self.relations)
            .finish()
    }
}

impl<M: Model> ModelDescriptor<M> {
    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn identifier(&self) -> &IdentifierDescriptor<M, M::Id> {
        &self.identifier
    }

    pub fn identifier_info(&self) -> &FieldInfo {
        &self.id_info
    }

    /// Flattened fields in declaration order, identifier excluded
    pub fn fields(&self) -> &[FieldDescriptor<M>] {
        &self.fields
    }

    pub fn field(&self, key: &str) -> Option<&FieldDescriptor<M>> {
        self.fields.iter().find(|f| f.key() == key)
    }

    pub fn relations(&self) -> &[RelationDescriptor<M>] {
        &self.relations
    }

    pub fn relation(&self, name: &str) -> Option<&RelationDescriptor<M>> {
        self.relations.iter().find(|r| r.name() == name)
    }

    /// Deletion timestamp field, if the model is soft-deletable
    pub fn soft_delete_field(&self) -> Option<&FieldDescriptor<M>> {
        self.soft_delete.and_then(|index| self.fields.get(index))
    }

    pub fn is_soft_deletable(&self) -> bool {
        self.soft_delete.is_some()
    }

    /// Resolve a flat key or a dotted group path to its field
    pub fn resolve(&self, path: &str) -> ModelResult<&FieldInfo> {
        if path == self.id_info.key {
            return Ok(&self.id_info);
        }
        self.fields
            .iter()
            .map(FieldDescriptor::info)
            .find(|info| info.key == path || info.path == path)
            .ok_or_else(|| ModelError::UnknownField {
                schema: self.schema.clone(),
                field: path.to_string(),
            })
    }

    /// Storage columns, identifier first
    pub fn columns(&self) -> Vec<ColumnSpec> {
        std::iter::once(&self.id_info)
            .chain(self.fields.iter().map(FieldDescriptor::info))
            .map(|info| ColumnSpec::new(info.key.clone(), info.kind))
            .collect()
    }

    /// Flat representation of an instance; an absent identifier is omitted
    pub fn encode(&self, model: &M) -> Row {
        let mut row = Row::new();
        if let Some(id) = self.identifier.encoded(model) {
            row.insert(self.id_info.key.clone(), id);
        }
        for field in &self.fields {
            row.insert(field.key().to_string(), field.read(model));
        }
        row
    }

    /// Rebuild an instance from its flat representation
    ///
    /// Missing keys decode as null, which only nullable fields accept.
    pub fn decode(&self, row: &Row) -> ModelResult<M> {
        let mut model = self.instantiate();
        if let Some(id) = row.get(&self.id_info.key) {
            self.identifier.write(&mut model, id.clone())?;
        }
        for field in &self.fields {
            let value = row.get(field.key()).cloned().unwrap_or(DatabaseValue::Null);
            field.write(&mut model, value)?;
        }
        Ok(model)
    }

    /// Empty instance with default field values
    pub fn instantiate(&self) -> M {
        M::default()
    }

    /// Overwrite every timestamp field bound to `trigger`
    pub fn touch(&self, model: &mut M, trigger: TimestampTrigger, now: DateTime<Utc>) {
        for field in self.fields.iter().filter(|f| f.info().trigger == trigger) {
            field.stamp(model, Some(now));
        }
    }

    pub fn signature(&self) -> DescriptorSignature {
        DescriptorSignature {
            schema: self.schema.clone(),
            identifier: (self.id_info.key.clone(), self.identifier.strategy()),
            fields: self.fields.iter().map(|f| f.info().clone()).collect(),
            relations: self
                .relations
                .iter()
                .map(|r| {
                    (
                        r.name().to_string(),
                        r.relationship_type(),
                        r.related_schema().to_string(),
                        r.foreign_key().to_string(),
                    )
                })
                .collect(),
        }
    }
}

/// Schema-level view of a descriptor, independent of the model type
pub trait SchemaLookup: Send + Sync {
    fn schema_name(&self) -> &str;

    fn lookup(&self, path: &str) -> ModelResult<&FieldInfo>;

    fn column_specs(&self) -> Vec<ColumnSpec>;

    fn soft_delete_info(&self) -> Option<&FieldInfo>;
}

impl<M: Model> SchemaLookup for ModelDescriptor<M> {
    fn schema_name(&self) -> &str {
        self.schema()
    }

    fn lookup(&self, path: &str) -> ModelResult<&FieldInfo> {
        self.resolve(path)
    }

    fn column_specs(&self) -> Vec<ColumnSpec> {
        self.columns()
    }

    fn soft_delete_info(&self) -> Option<&FieldInfo> {
        self.soft_delete_field().map(FieldDescriptor::info)
    }
}
