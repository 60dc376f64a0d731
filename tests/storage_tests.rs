use chrono::{Duration, TimeZone, Utc};
use model_gallery::storage::models::{ImageRecord, ModelRecord, NewImage, NewModel};
use model_gallery::storage::{Database, MemStore, MetadataStore};

fn test_db() -> (tempfile::TempDir, Database) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().join("data")).unwrap();
    (dir, db)
}

fn sample_model(id: &str, minutes: i64) -> ModelRecord {
    ModelRecord {
        id: id.to_string(),
        name: format!("{id}.obj"),
        file_path: format!("/api/files/{id}"),
        file_size: 1024,
        vertices: Some(300),
        triangles: Some(100),
        description: None,
        uploaded_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::minutes(minutes),
    }
}

fn sample_image(id: &str, minutes: i64) -> ImageRecord {
    ImageRecord {
        id: id.to_string(),
        name: format!("{id}.png"),
        file_path: format!("/api/files/{id}"),
        category: Some("renders".to_string()),
        description: Some("A render".to_string()),
        uploaded_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::minutes(minutes),
    }
}

fn new_model(name: &str) -> NewModel {
    NewModel {
        name: name.to_string(),
        file_path: format!("/api/files/{name}"),
        file_size: 10,
        vertices: None,
        triangles: None,
        description: None,
    }
}

// ============================================================================
// redb
// ============================================================================

#[test]
fn test_put_and_find_model() {
    let (_dir, db) = test_db();
    let model = sample_model("model-1", 0);

    db.put_model(&model).unwrap();

    let retrieved = db.find_model("model-1").unwrap().expect("model should exist");
    assert_eq!(retrieved, model);
    assert!(db.find_model("missing").unwrap().is_none());
}

#[test]
fn test_models_list_newest_first() {
    let (_dir, db) = test_db();
    db.put_model(&sample_model("old", 0)).unwrap();
    db.put_model(&sample_model("newest", 20)).unwrap();
    db.put_model(&sample_model("middle", 10)).unwrap();

    let ids: Vec<String> = db.all_models().unwrap().into_iter().map(|m| m.id).collect();
    assert_eq!(ids, vec!["newest", "middle", "old"]);
}

#[test]
fn test_remove_model() {
    let (_dir, db) = test_db();
    db.put_model(&sample_model("model-1", 0)).unwrap();

    assert!(db.remove_model("model-1").unwrap());
    assert!(!db.remove_model("model-1").unwrap());
    assert!(db.all_models().unwrap().is_empty());
}

#[test]
fn test_images_round_trip_optional_fields() {
    let (_dir, db) = test_db();
    let mut bare = sample_image("bare", 5);
    bare.category = None;
    bare.description = None;
    db.put_image(&sample_image("full", 0)).unwrap();
    db.put_image(&bare).unwrap();

    let images = db.all_images().unwrap();
    assert_eq!(images.len(), 2);
    assert_eq!(images[0], bare);
    assert_eq!(images[1].category.as_deref(), Some("renders"));
}

#[test]
fn test_models_and_images_are_separate() {
    let (_dir, db) = test_db();
    db.put_model(&sample_model("shared-id", 0)).unwrap();

    assert!(db.find_image("shared-id").unwrap().is_none());
    assert!(!db.remove_image("shared-id").unwrap());
    assert!(db.find_model("shared-id").unwrap().is_some());
}

#[test]
fn test_database_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let db = Database::open(dir.path()).unwrap();
        db.put_model(&sample_model("persisted", 0)).unwrap();
    }
    let db = Database::open(dir.path()).unwrap();
    assert!(db.find_model("persisted").unwrap().is_some());
}

#[tokio::test]
async fn test_database_assigns_identity() {
    let (_dir, db) = test_db();
    let created = db.create_model(new_model("a.obj")).await.unwrap();

    assert!(uuid::Uuid::parse_str(&created.id).is_ok());
    assert_eq!(db.get_model(&created.id).await.unwrap(), Some(created));
}

// ============================================================================
// In-memory
// ============================================================================

#[tokio::test]
async fn test_mem_store_create_assigns_unique_ids() {
    let store = MemStore::new();
    let a = store.create_model(new_model("a.obj")).await.unwrap();
    let b = store.create_model(new_model("a.obj")).await.unwrap();

    assert_ne!(a.id, b.id);
    assert_eq!(store.model_count(), 2);
    assert_eq!(store.get_model(&a.id).await.unwrap(), Some(a));
}

#[tokio::test]
async fn test_mem_store_lists_newest_first() {
    let store = MemStore::new();
    store.insert_model(sample_model("old", 0));
    store.insert_model(sample_model("new", 30));

    // Same timestamp: later insert wins
    store.insert_image(sample_image("first", 0));
    store.insert_image(sample_image("second", 0));

    let models: Vec<String> = store
        .list_models()
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.id)
        .collect();
    assert_eq!(models, vec!["new", "old"]);

    let images: Vec<String> = store
        .list_images()
        .await
        .unwrap()
        .into_iter()
        .map(|i| i.id)
        .collect();
    assert_eq!(images, vec!["second", "first"]);
}

#[tokio::test]
async fn test_mem_store_delete_unknown_leaves_count() {
    let store = MemStore::new();
    store
        .create_image(NewImage {
            name: "a.png".to_string(),
            file_path: "/api/files/a".to_string(),
            category: None,
            description: None,
        })
        .await
        .unwrap();

    assert!(!store.delete_image("no-such-id").await.unwrap());
    assert_eq!(store.image_count(), 1);
}

#[tokio::test]
async fn test_mem_store_through_trait_object() {
    let store: std::sync::Arc<dyn MetadataStore> = std::sync::Arc::new(MemStore::new());
    let created = store.create_model(new_model("robot.obj")).await.unwrap();

    assert!(store.delete_model(&created.id).await.unwrap());
    assert!(store.get_model(&created.id).await.unwrap().is_none());
    assert!(store.list_models().await.unwrap().is_empty());
}
