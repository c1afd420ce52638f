mod common;

use chrono::{Duration, Utc};
use common::*;
use strata_orm::{CrudOperations, DatabaseValue, IdentifierOutcome, LifecyclePhase, Model, ModelError};

#[tokio::test]
async fn test_create_planet_with_random_identifier() {
    let (_, db) = memory();
    let mut earth = planet("Earth");
    earth.create(&db).await.unwrap();

    assert!(earth.exists());
    assert!(earth.id.is_some());
    assert_eq!(earth.name, "Earth");

    let found = Planet::find(&db, earth.id.unwrap()).await.unwrap().unwrap();
    assert_eq!(found.name, "Earth");
    assert_eq!(found.id, earth.id);
}

#[tokio::test]
async fn test_soft_delete_hides_and_restore_reveals() {
    let (_, db) = memory();
    let mut rex = pet("Rex", None);
    rex.create(&db).await.unwrap();

    rex.delete(&db, false).await.unwrap();
    assert!(rex.deleted_at.is_some());
    assert!(db.query::<Pet>().unwrap().all().await.unwrap().is_empty());

    let all = db.query::<Pet>().unwrap().with_deleted().all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert!(all[0].deleted_at.is_some());
    assert_eq!(all[0].lifecycle_phase().unwrap(), LifecyclePhase::SoftDeleted);

    rex.restore(&db).await.unwrap();
    let visible = db.query::<Pet>().unwrap().all().await.unwrap();
    assert_eq!(visible.len(), 1);
    assert!(visible[0].deleted_at.is_none());
}

#[tokio::test]
async fn test_future_deletion_time_keeps_record_visible() {
    let (_, db) = memory();
    let mut rex = pet("Rex", None);
    let mut tom = pet("Tom", None);
    rex.create(&db).await.unwrap();
    tom.create(&db).await.unwrap();

    rex.soft_delete_at(&db, Utc::now() + Duration::hours(1)).await.unwrap();
    tom.soft_delete_at(&db, Utc::now() - Duration::seconds(1)).await.unwrap();

    let visible = db.query::<Pet>().unwrap().all().await.unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].name, "Rex");
}

#[tokio::test]
async fn test_force_delete_removes_the_record() {
    let (backend, db) = memory();
    let mut rex = pet("Rex", None);
    rex.create(&db).await.unwrap();

    rex.delete(&db, true).await.unwrap();
    assert_eq!(rex.lifecycle_phase().unwrap(), LifecyclePhase::Destroyed);
    assert!(backend.dump("pets").await.is_empty());

    let err = rex.delete(&db, true).await.unwrap_err();
    assert!(matches!(err, ModelError::StaleModel { .. }));
}

#[tokio::test]
async fn test_force_delete_of_a_soft_deleted_record() {
    let (backend, db) = memory();
    let mut rex = pet("Rex", None);
    rex.create(&db).await.unwrap();
    rex.delete(&db, false).await.unwrap();

    rex.delete(&db, true).await.unwrap();
    assert!(backend.dump("pets").await.is_empty());
}

#[tokio::test]
async fn test_update_writes_fields_and_stamps() {
    let (_, db) = memory();
    let mut rex = pet("Rex", None);
    rex.create(&db).await.unwrap();
    let created = rex.updated_at.unwrap();

    rex.name = "Rex II".to_string();
    rex.save(&db).await.unwrap();
    assert!(rex.updated_at.unwrap() >= created);

    let stored = Pet::find(&db, rex.id.unwrap()).await.unwrap().unwrap();
    assert_eq!(stored.name, "Rex II");
    assert_eq!(stored.updated_at, rex.updated_at);
}

#[tokio::test]
async fn test_grouped_fields_round_trip_through_storage() {
    let (backend, db) = memory();
    let mut alice = user("alice@example.com", "Zizek", PetType::Cat);
    alice.nickname = Some("al".to_string());
    alice.create(&db).await.unwrap();

    let stored = backend.dump("users").await;
    assert_eq!(stored[0]["pet_name"], DatabaseValue::from("Zizek"));
    assert_eq!(
        stored[0]["pet_type"],
        DatabaseValue::Enum {
            name: "pet_type".to_string(),
            case: "cat".to_string()
        }
    );
    assert!(matches!(stored[0]["created_at"], DatabaseValue::String(_)));

    let found = User::find(&db, alice.id.unwrap()).await.unwrap().unwrap();
    assert_eq!(found.pet, alice.pet);
    assert_eq!(found.nickname.as_deref(), Some("al"));
    assert_eq!(found.created_at, alice.created_at);
}

#[tokio::test]
async fn test_document_store_keeps_enum_cases_as_text() {
    let (backend, db) = document_store();
    let mut bob = user("bob@example.com", "Tweety", PetType::Bird);
    bob.create(&db).await.unwrap();

    assert_eq!(backend.dump("users").await[0]["pet_type"], DatabaseValue::from("bird"));

    let birds = db.query::<User>().unwrap().where_eq("pet.type", "bird").all().await.unwrap();
    assert_eq!(birds.len(), 1);
    assert_eq!(birds[0].pet.kind, PetType::Bird);
}

#[tokio::test]
async fn test_batch_create_is_one_round_trip() {
    let (backend, db) = memory();
    let mut pets = vec![pet("Rex", None), pet("Tom", None), pet("Kit", None)];
    let outcomes = Pet::create_batch(&db, &mut pets).await.unwrap();

    assert_eq!(backend.round_trips(), 1);
    assert!(outcomes.iter().all(|o| *o == IdentifierOutcome::NotCaptured));
    assert!(outcomes.iter().all(|o| !o.is_known()));
    assert!(pets.iter().all(|p| p.id.is_none() && p.exists() && p.updated_at.is_some()));
    assert_eq!(db.query::<Pet>().unwrap().count().await.unwrap(), 3);
}

#[tokio::test]
async fn test_batch_create_with_supplied_identifiers() {
    let (_, db) = memory();
    let mut pets = vec![
        Pet {
            id: Some(10),
            ..pet("Rex", None)
        },
        Pet {
            id: Some(10),
            ..pet("Tom", None)
        },
    ];
    assert!(Pet::create_batch(&db, &mut pets).await.is_err());
    assert!(pets.iter().all(|p| !p.exists()));
    assert_eq!(db.query::<Pet>().unwrap().count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_operations_on_new_instances_are_stale() {
    let (_, db) = memory();
    let mut rex = pet("Rex", None);

    assert!(matches!(rex.update(&db).await, Err(ModelError::StaleModel { .. })));
    assert!(matches!(rex.delete(&db, false).await, Err(ModelError::StaleModel { .. })));
    assert!(matches!(rex.restore(&db).await, Err(ModelError::StaleModel { .. })));
    assert!(matches!(rex.require_id(), Err(ModelError::MissingIdentifier { .. })));
}

#[tokio::test]
async fn test_update_after_external_removal_is_not_found() {
    let (_, db) = memory();
    let mut rex = pet("Rex", None);
    rex.create(&db).await.unwrap();

    let removed = db
        .query::<Pet>()
        .unwrap()
        .where_eq("id", rex.id.unwrap())
        .force_delete()
        .await
        .unwrap();
    assert_eq!(removed, 1);

    rex.name = "Ghost".to_string();
    assert!(matches!(rex.update(&db).await, Err(ModelError::NotFound(_))));
    assert_eq!(rex.lifecycle_phase().unwrap(), LifecyclePhase::Persisted);
}
