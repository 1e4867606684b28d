//! Slug negotiation through the entity manager

mod fixtures;

use fixtures::{manager_with, Article};
use std::sync::Arc;

use elif_behaviors::{
    BehaviorError, BehaviorsConfig, EntityManager, EntityStore, FilterQuery, MemoryStore,
};

#[tokio::test]
async fn test_same_title_in_one_flush_gets_suffix() {
    let store = Arc::new(MemoryStore::new());
    let (mut manager, _) = manager_with(store.clone());

    let first = manager.persist(Article::new("Hello World")).await.unwrap();
    let second = manager.persist(Article::new("Hello World")).await.unwrap();
    manager.flush().await.unwrap();

    assert_eq!(manager.get::<Article>(first).unwrap().slug.as_deref(), Some("hello-world"));
    assert_eq!(manager.get::<Article>(second).unwrap().slug.as_deref(), Some("hello-world-1"));
    assert_eq!(store.row_count("articles"), 2);
}

#[tokio::test]
async fn test_stored_slug_forces_suffix() {
    let store = Arc::new(MemoryStore::new());
    let (mut manager, _) = manager_with(store.clone());
    manager.persist(Article::new("Hello World")).await.unwrap();
    manager.flush().await.unwrap();

    let (mut other, _) = manager_with(store.clone());
    let handle = other.persist(Article::new("Hello World")).await.unwrap();
    other.flush().await.unwrap();

    assert_eq!(other.get::<Article>(handle).unwrap().slug.as_deref(), Some("hello-world-1"));

    let metadata = other.class_metadata("Article").unwrap();
    let taken = store
        .count(&metadata, &FilterQuery::new("e").where_like("e:slug", "hello-world%"))
        .await
        .unwrap();
    assert_eq!(taken, 2);
}

#[tokio::test]
async fn test_update_keeps_own_slug() {
    let store = Arc::new(MemoryStore::new());
    let (mut manager, _) = manager_with(store.clone());

    manager.persist(Article::new("Hello World")).await.unwrap();
    let second = manager.persist(Article::new("Hello World")).await.unwrap();
    manager.flush().await.unwrap();

    manager.get_mut::<Article>(second).unwrap().body = "Edited".to_string();
    manager.flush().await.unwrap();

    let article = manager.get::<Article>(second).unwrap();
    assert_eq!(article.slug.as_deref(), Some("hello-world-1"));

    let id = article.id.unwrap();
    let metadata = manager.class_metadata("Article").unwrap();
    let row = store.find(&metadata, id).await.unwrap().unwrap();
    assert_eq!(row.get("slug").and_then(|v| v.as_str()), Some("hello-world-1"));
    assert_eq!(row.get("body").and_then(|v| v.as_str()), Some("Edited"));
}

#[tokio::test]
async fn test_title_change_regenerates_slug() {
    let store = Arc::new(MemoryStore::new());
    let (mut manager, _) = manager_with(store.clone());

    let handle = manager.persist(Article::new("Hello World")).await.unwrap();
    manager.flush().await.unwrap();

    manager.get_mut::<Article>(handle).unwrap().title = "Goodbye World".to_string();
    manager.flush().await.unwrap();

    let id = manager.get::<Article>(handle).unwrap().id.unwrap();
    let (mut fresh, _) = manager_with(store);
    let loaded = fresh.find::<Article>(id).await.unwrap().unwrap();
    assert_eq!(fresh.get::<Article>(loaded).unwrap().slug.as_deref(), Some("goodbye-world"));
}

#[tokio::test]
async fn test_slug_field_is_mapped() {
    let (mut manager, _) = manager_with(Arc::new(MemoryStore::new()));
    let metadata = manager.register::<Article>().await.unwrap();

    let slug = metadata.field("slug").unwrap();
    assert!(slug.nullable);
    assert!(metadata.has_field("title"));
}

#[tokio::test]
async fn test_empty_title_is_rejected_at_persist() {
    let store = Arc::new(MemoryStore::new());
    let (mut manager, _) = manager_with(store.clone());

    let result = manager.persist(Article::new("")).await;
    assert!(matches!(result, Err(BehaviorError::Sluggable(_))));

    manager.flush().await.unwrap();
    assert_eq!(store.row_count("articles"), 0);
}

#[tokio::test]
async fn test_non_latin_titles_get_transliterated_slugs() {
    let store = Arc::new(MemoryStore::new());
    let (mut manager, _) = manager_with(store.clone());

    let first = manager.persist(Article::new("Привет мир")).await.unwrap();
    let second = manager.persist(Article::new("Привет мир")).await.unwrap();
    let punctuation = manager.persist(Article::new("!!!")).await;
    manager.flush().await.unwrap();

    assert_eq!(manager.get::<Article>(first).unwrap().slug.as_deref(), Some("privet-mir"));
    assert_eq!(manager.get::<Article>(second).unwrap().slug.as_deref(), Some("privet-mir-1"));
    assert!(matches!(punctuation, Err(BehaviorError::Sluggable(_))));
    assert_eq!(store.row_count("articles"), 2);
}

#[tokio::test]
async fn test_default_behaviors_respect_probe_bound() {
    let store: Arc<dyn EntityStore> = Arc::new(MemoryStore::new());
    let config = BehaviorsConfig {
        max_slug_attempts: Some(1),
        ..BehaviorsConfig::default()
    };
    let mut manager = EntityManager::with_behaviors(store, &config).unwrap();

    manager.persist(Article::new("Hello World")).await.unwrap();
    let result = manager.persist(Article::new("Hello World")).await;

    assert!(matches!(
        result,
        Err(BehaviorError::SlugExhausted { attempts: 1, .. })
    ));
}
