mod common;

use common::{Thing, seed, thing_adapter};
use schemakv::{AdapterConfig, Condition, Context, Error, MemoryStore, QueryOptions, Value};
use std::sync::Arc;
use uuid::Uuid;

#[tokio::test]
async fn test_save_then_get_returns_entity() {
    let store = Arc::new(MemoryStore::new());
    let things = thing_adapter(&store, AdapterConfig::default()).await;
    let ctx = Context::background();

    let thing = Thing::new("lamp", 1).with_id("t-1").with_note("first");
    things.save(&ctx, &thing).await.unwrap();

    let loaded = things.get(&ctx, &["lamp".into(), 1i64.into()]).await.unwrap();
    assert_eq!(loaded, thing);
    assert_eq!(store.stats().consistent_gets, 1);
}

#[tokio::test]
async fn test_save_overwrites_whole_item() {
    let store = Arc::new(MemoryStore::new());
    let things = thing_adapter(&store, AdapterConfig::default()).await;
    let ctx = Context::background();

    things
        .save(&ctx, &Thing::new("lamp", 1).with_note("old"))
        .await
        .unwrap();
    things.save(&ctx, &Thing::new("lamp", 1)).await.unwrap();

    let loaded = things.get(&ctx, &["lamp".into(), 1i64.into()]).await.unwrap();
    assert_eq!(loaded.note, None);
    assert_eq!(store.items("things").await.len(), 1);
}

#[tokio::test]
async fn test_get_missing_reports_key() {
    let store = Arc::new(MemoryStore::new());
    let things = thing_adapter(&store, AdapterConfig::default()).await;

    let err = things
        .get(&Context::background(), &["a".into(), 1i64.into()])
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(err.to_string(), r#"Thing not found: name:"a",version:1"#);
}

#[tokio::test]
async fn test_create_succeeds_exactly_once() {
    let store = Arc::new(MemoryStore::new());
    let things = thing_adapter(&store, AdapterConfig::default()).await;
    let ctx = Context::background();

    things.create(&ctx, &Thing::new("a", 1)).await.unwrap();
    let err = things
        .create(&ctx, &Thing::new("a", 1).with_note("second"))
        .await
        .unwrap_err();

    match &err {
        Error::AlreadyExists { entity, key } => {
            assert_eq!(entity, "Thing");
            assert_eq!(key.to_string(), r#"name:"a",version:1"#);
        }
        other => panic!("expected AlreadyExists, got {other:?}"),
    }
    assert!(!err.is_condition_failed());

    let stored = things.get(&ctx, &["a".into(), 1i64.into()]).await.unwrap();
    assert_eq!(stored.note, None);
}

#[tokio::test]
async fn test_concurrent_creates_have_one_winner() {
    let store = Arc::new(MemoryStore::new());
    let things = thing_adapter(&store, AdapterConfig::default()).await;

    let mut handles = Vec::new();
    for writer in 0..8 {
        let things = things.clone();
        handles.push(tokio::spawn(async move {
            let thing = Thing::new("contended", 1).with_note(&format!("writer-{writer}"));
            things.create(&Context::background(), &thing).await
        }));
    }

    let mut created = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => created += 1,
            Err(err) if err.is_already_exists() => rejected += 1,
            Err(err) => panic!("unexpected error: {err}"),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(rejected, 7);
}

#[tokio::test]
async fn test_save_if_guards_on_existing_attribute() {
    let store = Arc::new(MemoryStore::new());
    let things = thing_adapter(&store, AdapterConfig::default()).await;
    let ctx = Context::background();

    things
        .save(&ctx, &Thing::new("a", 1).with_note("draft"))
        .await
        .unwrap();

    let guard = Condition::equals("note", "draft");
    things
        .save_if(&ctx, &Thing::new("a", 1).with_note("published"), &guard)
        .await
        .unwrap();

    let err = things
        .save_if(&ctx, &Thing::new("a", 1).with_note("again"), &guard)
        .await
        .unwrap_err();
    assert!(err.is_condition_failed());

    let stored = things.get(&ctx, &["a".into(), 1i64.into()]).await.unwrap();
    assert_eq!(stored.note.as_deref(), Some("published"));
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    let things = thing_adapter(&store, AdapterConfig::default()).await;
    let ctx = Context::background();
    let key: Vec<Value> = vec!["a".into(), 1i64.into()];

    things.save(&ctx, &Thing::new("a", 1)).await.unwrap();
    things.delete(&ctx, &key).await.unwrap();
    things.delete(&ctx, &key).await.unwrap();

    assert!(things.get(&ctx, &key).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_key_arity_is_checked_before_any_call() {
    let store = Arc::new(MemoryStore::new());
    let things = thing_adapter(&store, AdapterConfig::default()).await;

    let err = things
        .get(&Context::background(), &["only-hash".into()])
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InvalidOptions(_)));
    assert_eq!(store.stats().gets, 0);
}

#[tokio::test]
async fn test_get_by_thing_id_end_to_end() {
    let store = Arc::new(MemoryStore::new());
    let things = thing_adapter(&store, AdapterConfig::default()).await;
    let ctx = Context::background();

    let first_id = Uuid::new_v4().to_string();
    let second_id = Uuid::new_v4().to_string();
    things
        .save(&ctx, &Thing::new("a", 1).with_id(&first_id))
        .await
        .unwrap();
    things
        .save(&ctx, &Thing::new("a", 2).with_id(&second_id))
        .await
        .unwrap();
    things.save(&ctx, &Thing::new("b", 1)).await.unwrap();

    let found = things
        .get_by_index(&ctx, "thingID", second_id.as_str(), None)
        .await
        .unwrap();
    assert_eq!(found, Thing::new("a", 2).with_id(&second_id));
    assert_eq!(store.stats().queries, 1);

    let err = things
        .get_by_index(&ctx, "thingID", "t-missing", None)
        .await
        .unwrap_err();
    match err {
        Error::NotFound { key, .. } => assert_eq!(key.to_string(), r#"thingID:"t-missing""#),
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn test_sparse_index_skips_items_without_index_key() {
    let store = Arc::new(MemoryStore::new());
    let things = thing_adapter(&store, AdapterConfig::default()).await;
    let ctx = Context::background();

    seed(&things, "a", 3).await;
    things.save(&ctx, &Thing::new("a", 4)).await.unwrap();

    let indexed = things
        .scan_all(&ctx, schemakv::ScanOptions::new().index("thingID"))
        .await
        .unwrap();
    assert_eq!(indexed.len(), 3);
    assert!(indexed.iter().all(|thing| thing.thing_id.is_some()));

    let all = things
        .query_all(&ctx, None, "a", QueryOptions::new())
        .await
        .unwrap();
    assert_eq!(all.len(), 4);
}

#[tokio::test]
async fn test_unknown_index_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    let things = thing_adapter(&store, AdapterConfig::default()).await;

    let err = things
        .query_all(&Context::background(), Some("byColor"), "red", QueryOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::UnknownIndex { ref index, .. } if index == "byColor"));
    assert_eq!(store.stats().queries, 0);
}
