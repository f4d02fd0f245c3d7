mod common;

use chrono::{TimeZone, Utc};
use common::{Reading, Thing, reading_adapter, thing_adapter};
use schemakv::{
    AdapterConfig, Condition, Context, Error, MemoryStore, ScanOptions, Transaction,
    TransactionCoordinator,
};
use std::sync::Arc;

#[tokio::test]
async fn test_transact_save_writes_all_items() {
    let store = Arc::new(MemoryStore::new());
    let things = thing_adapter(&store, AdapterConfig::default()).await;
    let ctx = Context::background();

    things
        .transact_save(
            &ctx,
            &[
                (Thing::new("a", 1), None),
                (Thing::new("a", 2), Some(Condition::not_exists(&["name"]))),
            ],
        )
        .await
        .unwrap();

    assert_eq!(store.items("things").await.len(), 2);
    assert_eq!(store.stats().transactions, 1);
}

#[tokio::test]
async fn test_one_failed_condition_writes_nothing() {
    let store = Arc::new(MemoryStore::new());
    let things = thing_adapter(&store, AdapterConfig::default()).await;
    let ctx = Context::background();

    let err = things
        .transact_save(
            &ctx,
            &[
                (Thing::new("a", 1), None),
                (Thing::new("a", 2), Some(Condition::exists("name"))),
            ],
        )
        .await
        .unwrap_err();

    match err {
        Error::ConditionFailed { entity, key } => {
            assert_eq!(entity, "Thing");
            assert_eq!(key.to_string(), r#"name:"a",version:2"#);
        }
        other => panic!("expected ConditionFailed, got {other:?}"),
    }
    assert!(store.items("things").await.is_empty());
}

#[tokio::test]
async fn test_too_many_items_rejected_before_any_call() {
    let store = Arc::new(MemoryStore::new());
    let things = thing_adapter(&store, AdapterConfig::default().max_transaction_items(2)).await;

    let items: Vec<(Thing, Option<Condition>)> =
        (1..=3).map(|version| (Thing::new("a", version), None)).collect();
    let err = things
        .transact_save(&Context::background(), &items)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::TooManyTransactionItems { count: 3, max: 2 }));
    assert_eq!(store.stats().transactions, 0);
}

#[tokio::test]
async fn test_staged_create_conflict_is_already_exists() {
    let store = Arc::new(MemoryStore::new());
    let things = thing_adapter(&store, AdapterConfig::default()).await;
    let ctx = Context::background();
    things.save(&ctx, &Thing::new("a", 1)).await.unwrap();

    let mut transaction = Transaction::new();
    transaction
        .save(&things, &Thing::new("b", 1), None)
        .unwrap()
        .create(&things, &Thing::new("a", 1).with_note("dup"))
        .unwrap();

    let err = TransactionCoordinator::for_adapter(&things)
        .transact_save(&ctx, transaction)
        .await
        .unwrap_err();

    assert!(err.is_already_exists());
    let names: Vec<String> = things
        .scan_all(&ctx, ScanOptions::new())
        .await
        .unwrap()
        .into_iter()
        .map(|thing| thing.name)
        .collect();
    assert_eq!(names, vec!["a".to_string()]);
}

#[tokio::test]
async fn test_transaction_spans_entity_types() {
    let store = Arc::new(MemoryStore::new());
    let things = thing_adapter(&store, AdapterConfig::default()).await;
    let readings = reading_adapter(&store).await;
    let ctx = Context::background();

    things.save(&ctx, &Thing::new("stale", 1)).await.unwrap();

    let reading = Reading {
        device: "sensor-1".into(),
        taken_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        site: "lab".into(),
        celsius: Some(21.5),
        raw: None,
        ok: Some(true),
    };

    let mut transaction = Transaction::new();
    transaction
        .create(&things, &Thing::new("fresh", 1))
        .unwrap()
        .create(&readings, &reading)
        .unwrap()
        .delete(&things, &["stale".into(), 1i64.into()], None)
        .unwrap();
    assert_eq!(transaction.len(), 3);

    TransactionCoordinator::for_adapter(&things)
        .transact_save(&ctx, transaction)
        .await
        .unwrap();

    let stored: Vec<String> = things
        .scan_all(&ctx, ScanOptions::new())
        .await
        .unwrap()
        .into_iter()
        .map(|thing| thing.name)
        .collect();
    assert_eq!(stored, vec!["fresh".to_string()]);

    let loaded = readings
        .get(&ctx, &["sensor-1".into(), reading.taken_at.into()])
        .await
        .unwrap();
    assert_eq!(loaded, reading);
}

#[tokio::test]
async fn test_empty_transaction_makes_no_call() {
    let store = Arc::new(MemoryStore::new());
    let things = thing_adapter(&store, AdapterConfig::default()).await;

    TransactionCoordinator::for_adapter(&things)
        .transact_save(&Context::background(), Transaction::new())
        .await
        .unwrap();

    assert_eq!(store.stats().transactions, 0);
}
