// tests/relational/cte_test.rs
use std::sync::Arc;

use dataprovider::backend::relational::{Schema, SqlBackend, SqliteConnection};
use dataprovider::criterion::Criterion;
use dataprovider::domain::{GenericHandler, TimeField};
use dataprovider::sql::Dialect;
use dataprovider::{DataProviderError, DataProviderManager, Value, ValueType};

fn manager(db: Arc<SqliteConnection>) -> DataProviderManager {
    let schema = Schema::builder()
        .table("session", &["id"])
        .path("session.user", "session.user")
        .path("session.start_time", "session.start_time")
        .path("session.end_time", "session.end_time")
        .build()
        .unwrap();
    let handler = GenericHandler::new(
        "session",
        TimeField::Interval {
            start: "start_time".into(),
            end: "end_time".into(),
        },
        [
            ("session.user", ValueType::Text),
            ("session.start_time", ValueType::Time),
            ("session.end_time", ValueType::Time),
        ],
    );

    let mut manager = DataProviderManager::new();
    manager.register_handler(Arc::new(handler));
    manager
        .register_backend("session", Arc::new(SqlBackend::new(schema, Dialect::Sqlite).with_connection(db)))
        .unwrap();
    manager
}

fn db() -> Arc<SqliteConnection> {
    let db = SqliteConnection::open_in_memory().unwrap();
    db.execute_batch("CREATE TABLE session (id INTEGER PRIMARY KEY, user TEXT, start_time TEXT, end_time TEXT);")
        .unwrap();
    Arc::new(db)
}

fn window() -> Criterion {
    Criterion::parse("session.start_time < '2020-01-04' && session.end_time >= '2020-01-01'").unwrap()
}

#[test]
fn test_empty_buckets_still_yield_rows() {
    let manager = manager(db());
    let rows = manager
        .query(&["session._timeline:mday", "count(1)"], Some(window()), false, -1, 0, None)
        .unwrap();

    assert_eq!(rows.len(), 3);
    for row in rows.iter() {
        assert_eq!(row.unwrap()[1], Value::Int(0));
    }
}

#[test]
fn test_bucket_counts_overlapping_sessions() {
    let db = db();
    db.execute_batch(
        "INSERT INTO session (user, start_time, end_time) VALUES
            ('ann', '2020-01-01 10:00:00', '2020-01-02 10:00:00'),
            ('bob', '2020-01-03 08:00:00', '2020-01-03 09:00:00');",
    )
    .unwrap();
    let manager = manager(db);
    let rows = manager
        .query(&["session._timeline:mday", "count(1)"], Some(window()), false, -1, 0, None)
        .unwrap();

    let counts: Vec<Value> = rows.iter().map(|r| r.unwrap()[1].clone()).collect();
    assert_eq!(counts, vec![Value::Int(1), Value::Int(1), Value::Int(1)]);
}

#[test]
fn test_unbounded_timeline_is_rejected() {
    let manager = manager(db());
    let err = manager
        .query(&["session._timeline:mday", "count(1)"], None, false, -1, 0, None)
        .unwrap_err();
    assert!(matches!(err, DataProviderError::TimeBounds(_)));
}
