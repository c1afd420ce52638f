//! Shared fixtures for the integration suites
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Utc};
use strata_orm::{
    Database, FieldGroup, FieldSet, IdentifierStrategy, MemoryBackend, Model, ModelState, OrmConfig, Related,
    SchemaBuilder, StringEnum, TimestampFormat, TimestampTrigger,
};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct Planet {
    pub id: Option<Uuid>,
    pub name: String,
    pub state: ModelState,
}

impl Model for Planet {
    type Id = Uuid;

    fn schema() -> &'static str {
        "planets"
    }

    fn describe(schema: SchemaBuilder<Self>) -> SchemaBuilder<Self> {
        schema
            .id_with("id", IdentifierStrategy::Random, |p| &p.id, |p| &mut p.id)
            .field("name", |p| &p.name, |p| &mut p.name)
    }

    fn state(&self) -> &ModelState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ModelState {
        &mut self.state
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PetType {
    #[default]
    Dog,
    Cat,
    Bird,
}

impl StringEnum for PetType {
    const ENUM_NAME: &'static str = "pet_type";

    fn as_case(&self) -> &'static str {
        match self {
            PetType::Dog => "dog",
            PetType::Cat => "cat",
            PetType::Bird => "bird",
        }
    }

    fn from_case(case: &str) -> Option<Self> {
        match case {
            "dog" => Some(PetType::Dog),
            "cat" => Some(PetType::Cat),
            "bird" => Some(PetType::Bird),
            _ => None,
        }
    }
}

/// Favourite pet stored flat on the user as `pet_name` and `pet_type`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PetInfo {
    pub name: String,
    pub kind: PetType,
}

impl FieldGroup for PetInfo {
    fn describe(fields: FieldSet<Self>) -> FieldSet<Self> {
        fields
            .field("name", |p| &p.name, |p| &mut p.name)
            .field("type", |p| &p.kind, |p| &mut p.kind)
    }
}

#[derive(Debug, Clone, Default)]
pub struct User {
    pub id: Option<i64>,
    pub email: String,
    pub nickname: Option<String>,
    pub pet: PetInfo,
    pub created_at: Option<DateTime<Utc>>,
    pub pets: Related<Vec<Pet>>,
    pub state: ModelState,
}

impl Model for User {
    type Id = i64;

    fn schema() -> &'static str {
        "users"
    }

    fn describe(schema: SchemaBuilder<Self>) -> SchemaBuilder<Self> {
        schema
            .id("id", |u| &u.id, |u| &mut u.id)
            .field("email", |u| &u.email, |u| &mut u.email)
            .field("nickname", |u| &u.nickname, |u| &mut u.nickname)
            .group("pet", |u| &u.pet, |u| &mut u.pet)
            .timestamp(
                "created_at",
                TimestampTrigger::Create,
                TimestampFormat::Iso8601,
                |u| &u.created_at,
                |u| &mut u.created_at,
            )
            .children::<Pet>("pets", "owner_id", |u| &mut u.pets)
    }

    fn state(&self) -> &ModelState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ModelState {
        &mut self.state
    }
}

#[derive(Debug, Clone, Default)]
pub struct Pet {
    pub id: Option<i64>,
    pub name: String,
    pub owner_id: Option<i64>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub owner: Related<Option<User>>,
    pub state: ModelState,
}

impl Model for Pet {
    type Id = i64;

    fn schema() -> &'static str {
        "pets"
    }

    fn describe(schema: SchemaBuilder<Self>) -> SchemaBuilder<Self> {
        schema
            .id("id", |p| &p.id, |p| &mut p.id)
            .field("name", |p| &p.name, |p| &mut p.name)
            .field("owner_id", |p| &p.owner_id, |p| &mut p.owner_id)
            .timestamp(
                "updated_at",
                TimestampTrigger::Update,
                TimestampFormat::Native,
                |p| &p.updated_at,
                |p| &mut p.updated_at,
            )
            .deleted_at("deleted_at", TimestampFormat::Native, |p| &p.deleted_at, |p| &mut p.deleted_at)
            .parent::<User>("owner", "owner_id", |p| &mut p.owner)
    }

    fn state(&self) -> &ModelState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ModelState {
        &mut self.state
    }
}

pub fn planet(name: &str) -> Planet {
    Planet {
        name: name.to_string(),
        ..Planet::default()
    }
}

pub fn user(email: &str, pet_name: &str, kind: PetType) -> User {
    User {
        email: email.to_string(),
        pet: PetInfo {
            name: pet_name.to_string(),
            kind,
        },
        ..User::default()
    }
}

pub fn pet(name: &str, owner_id: Option<i64>) -> Pet {
    Pet {
        name: name.to_string(),
        owner_id,
        ..Pet::default()
    }
}

/// Relational in-memory database
pub fn memory() -> (Arc<MemoryBackend>, Database) {
    let backend = Arc::new(MemoryBackend::new());
    (backend.clone(), Database::new(backend))
}

/// In-memory database with a small eager-loading batch size
pub fn memory_with_batch_size(eager_batch_size: usize) -> (Arc<MemoryBackend>, Database) {
    let backend = Arc::new(MemoryBackend::new());
    let config = OrmConfig {
        eager_batch_size,
        ..OrmConfig::default()
    };
    (backend.clone(), Database::builder(backend).config(config).build())
}

/// Document-store flavoured in-memory database
pub fn document_store() -> (Arc<MemoryBackend>, Database) {
    let backend = Arc::new(MemoryBackend::document_store());
    (backend.clone(), Database::new(backend))
}
