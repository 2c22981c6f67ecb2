//! Async execution and cancellation.

#![cfg(feature = "sqlite")]

use std::sync::Arc;

use futures::TryStreamExt;
use strata::{CancellationToken, Database, Error, Model, Queryable, ValueType};

fn seeded() -> Database {
    let mut builder = Model::builder();
    builder.entity("Item", |e| {
        e.property("Id", ValueType::Int32)
            .optional_property("Label", ValueType::String)
            .key(&["Id"]);
    });
    let db = Database::sqlite_in_memory(Arc::new(builder.build().unwrap())).unwrap();
    db.execute_sql_command(
        "CREATE TABLE \"Item\" (\"Id\" INTEGER PRIMARY KEY, \"Label\" TEXT)",
        &[],
    )
    .unwrap();
    for id in 1..=4_i32 {
        db.execute_sql_command(
            "INSERT INTO \"Item\" VALUES ({0}, {1})",
            &[id.into(), format!("item {id}").into()],
        )
        .unwrap();
    }
    db
}

fn items(db: &Database) -> Queryable {
    Queryable::new(Arc::clone(db.model()), "Item")
}

#[tokio::test]
async fn test_stream_collects_rows() {
    let db = seeded();
    let query = items(&db)
        .filter(|i| i.get("Id").gt(2))
        .order_by(|i| i.get("Id"))
        .select(|i| i.get("Label"));

    let labels: Vec<Option<String>> = db
        .execute_async(query.expr(), CancellationToken::new())
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(
        labels,
        vec![Some("item 3".to_string()), Some("item 4".to_string())]
    );
    assert!(!db.connection().is_open());
}

#[tokio::test]
async fn test_single_async() {
    let db = seeded();
    let count = db
        .execute_single_async::<i32>(&items(&db).count(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(count, 4);
}

#[tokio::test]
async fn test_cancelled_stream_yields_cancelled() {
    let db = seeded();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = db
        .execute_async::<i32>(items(&db).select(|i| i.get("Id")).expr(), cancel)
        .unwrap()
        .try_collect::<Vec<_>>()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled), "{err}");
    assert!(!db.connection().is_open());
}

#[tokio::test]
async fn test_cancelled_raw_command_is_not_run() {
    let db = seeded();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = db
        .execute_sql_command_async("DELETE FROM \"Item\"", &[], &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled));

    let count = db
        .execute_single_async::<i32>(&items(&db).count(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(count, 4);
}

#[tokio::test]
async fn test_async_and_sync_cache_separately() {
    let db = seeded();
    let query = items(&db).select(|i| i.get("Id"));

    let sync: Vec<i32> = db
        .execute(query.expr())
        .unwrap()
        .collect::<strata::Result<_>>()
        .unwrap();
    let streamed: Vec<i32> = db
        .execute_async::<i32>(query.expr(), CancellationToken::new())
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(sync, streamed);
    assert_eq!(db.cache_stats().size, 2);
}
