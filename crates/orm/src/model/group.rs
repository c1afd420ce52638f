//! Grouped Fields - nested sub-records flattened into the parent key space
//!
//! A group stored at key `pet` with fields `name` and `type` contributes the
//! flat keys `pet_name` and `pet_type` to its parent. Groups may contain
//! groups; prefixes accumulate one level at a time.

use chrono::{DateTime, Utc};

use super::field::{FieldDescriptor, FieldValue, TimestampFormat, TimestampTrigger};

/// Ordered set of field descriptors of `T`
pub struct FieldSet<T> {
    fields: Vec<FieldDescriptor<T>>,
}

impl<T: 'static> Default for FieldSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> FieldSet<T> {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Add a value field
    pub fn field<V: FieldValue>(
        mut self,
        key: &str,
        get: fn(&T) -> &V,
        get_mut: fn(&mut T) -> &mut V,
    ) -> Self {
        self.fields.push(FieldDescriptor::value(key, get, get_mut));
        self
    }

    /// Add a timestamp field overwritten by the engine at `trigger`
    pub fn timestamp(
        mut self,
        key: &str,
        trigger: TimestampTrigger,
        format: TimestampFormat,
        get: fn(&T) -> &Option<DateTime<Utc>>,
        get_mut: fn(&mut T) -> &mut Option<DateTime<Utc>>,
    ) -> Self {
        self.fields
            .push(FieldDescriptor::timestamp(key, trigger, format, get, get_mut));
        self
    }

    /// Embed a group, flattening its fields under `key`
    pub fn group<G: FieldGroup>(
        mut self,
        key: &str,
        get: fn(&T) -> &G,
        get_mut: fn(&mut T) -> &mut G,
    ) -> Self {
        let group = G::describe(FieldSet::new());
        self.fields.extend(flatten(group, key, get, get_mut));
        self
    }

    pub fn fields(&self) -> &[FieldDescriptor<T>] {
        &self.fields
    }

    pub fn into_fields(self) -> Vec<FieldDescriptor<T>> {
        self.fields
    }
}

/// A struct embedded in a model whose fields are stored flat on the parent
pub trait FieldGroup: Default + Clone + Send + Sync + 'static {
    fn describe(fields: FieldSet<Self>) -> FieldSet<Self>;
}

/// Re-root every field of `group` under `prefix` on the parent type `P`
pub fn flatten<P: 'static, G: 'static>(
    group: FieldSet<G>,
    prefix: &str,
    get: fn(&P) -> &G,
    get_mut: fn(&mut P) -> &mut G,
) -> Vec<FieldDescriptor<P>> {
    group
        .into_fields()
        .into_iter()
        .map(|field| field.nest(prefix, get, get_mut))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::DatabaseValue;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Collar {
        color: String,
    }

    impl FieldGroup for Collar {
        fn describe(fields: FieldSet<Self>) -> FieldSet<Self> {
            fields.field("color", |c| &c.color, |c| &mut c.color)
        }
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    struct PetInfo {
        name: String,
        kind: String,
        collar: Collar,
    }

    impl FieldGroup for PetInfo {
        fn describe(fields: FieldSet<Self>) -> FieldSet<Self> {
            fields
                .field("name", |p| &p.name, |p| &mut p.name)
                .field("type", |p| &p.kind, |p| &mut p.kind)
                .group("collar", |p| &p.collar, |p| &mut p.collar)
        }
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Owner {
        pet: PetInfo,
    }

    #[test]
    fn test_nested_groups_flatten_with_underscores() {
        let set = FieldSet::<Owner>::new().group("pet", |o| &o.pet, |o| &mut o.pet);
        let keys: Vec<&str> = set.fields().iter().map(|f| f.key()).collect();
        let paths: Vec<&str> = set.fields().iter().map(|f| f.path()).collect();

        assert_eq!(keys, vec!["pet_name", "pet_type", "pet_collar_color"]);
        assert_eq!(paths, vec!["pet.name", "pet.type", "pet.collar.color"]);
    }

    #[test]
    fn test_flattened_accessors_reach_nested_values() {
        let set = FieldSet::<Owner>::new().group("pet", |o| &o.pet, |o| &mut o.pet);
        let mut owner = Owner::default();

        for field in set.fields() {
            let value = format!("{}-value", field.key());
            field.write(&mut owner, DatabaseValue::from(value)).unwrap();
        }

        assert_eq!(owner.pet.name, "pet_name-value");
        assert_eq!(owner.pet.kind, "pet_type-value");
        assert_eq!(owner.pet.collar.color, "pet_collar_color-value");
        assert_eq!(
            set.fields()[2].read(&owner),
            DatabaseValue::from("pet_collar_color-value")
        );
    }
}
