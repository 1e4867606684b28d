//! Flush atomicity

mod fixtures;

use async_trait::async_trait;
use fixtures::{manager_with, Article, Note};
use std::sync::Arc;

use elif_behaviors::{
    BehaviorError, BehaviorResult, EventListener, LifecycleEventArgs, MemoryStore,
    OnFlushEventArgs,
};

struct FailOnFlush;

#[async_trait]
impl EventListener for FailOnFlush {
    async fn on_flush(&self, _args: &mut OnFlushEventArgs<'_>) -> BehaviorResult<()> {
        Err(BehaviorError::listener("flush refused"))
    }
}

struct FailOnUpdate;

#[async_trait]
impl EventListener for FailOnUpdate {
    async fn post_update(&self, _args: &mut LifecycleEventArgs<'_>) -> BehaviorResult<()> {
        Err(BehaviorError::listener("update refused"))
    }
}

#[tokio::test]
async fn test_listener_error_aborts_flush() {
    let store = Arc::new(MemoryStore::new());
    let (manager, _) = manager_with(store.clone());
    let mut manager = manager.with_listener(Arc::new(FailOnFlush));

    manager.persist(Article::new("Hello World")).await.unwrap();
    manager.persist(Note::new("pending")).await.unwrap();
    let result = manager.flush().await;

    assert!(matches!(result, Err(BehaviorError::Listener(_))));
    assert_eq!(store.row_count("articles"), 0);
    assert_eq!(store.row_count("notes"), 0);
}

#[tokio::test]
async fn test_error_after_writes_rolls_back() {
    let store = Arc::new(MemoryStore::new());
    let (mut manager, _) = manager_with(store.clone());
    let handle = manager.persist(Note::new("original")).await.unwrap();
    manager.flush().await.unwrap();

    manager.add_listener(Arc::new(FailOnUpdate));
    manager.get_mut::<Note>(handle).unwrap().content = "changed".to_string();
    manager.persist(Note::new("second")).await.unwrap();

    assert!(manager.flush().await.is_err());
    assert_eq!(store.row_count("notes"), 1);
    assert!(!store.in_transaction());

    manager.clear();
    let id = elif_behaviors::EntityId(1);
    let reloaded = manager.find::<Note>(id).await.unwrap().unwrap();
    assert_eq!(manager.get::<Note>(reloaded).unwrap().content, "original");
}
