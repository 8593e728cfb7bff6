// tests/router/router_test.rs
use std::sync::Arc;

use dataprovider::backend::relational::{Schema, SqlBackend, SqliteConnection};
use dataprovider::config::Settings;
use dataprovider::criterion::Criterion;
use dataprovider::domain::{IdmefHandler, LogHandler};
use dataprovider::router::ValueHook;
use dataprovider::sql::Dialect;
use dataprovider::{DataProviderError, DataProviderManager, Result, Value};

const SETTINGS: &str = r#"
default_domain = "alert"

[relational.alert]
dialect = "sqlite"
database = ":memory:"
default_table = "alert"

[[relational.alert.tables]]
name = "alert"
primary_key = ["id"]

[relational.alert.paths]
"alert.messageid" = "alert.messageid"
"alert.create_time" = "alert.create_time"

[domains.session]
time_interval = ["start_time", "end_time"]

[domains.session.paths]
"session.user" = "text"
"session.start_time" = "time"
"session.end_time" = "time"
"#;

fn alert_store() -> (DataProviderManager, Arc<SqliteConnection>) {
    let schema = Schema::builder()
        .table("alert", &["id"])
        .default_table("alert")
        .path("alert.messageid", "alert.messageid")
        .path("alert.create_time", "alert.create_time")
        .path("alert.classification.text", "alert.classification")
        .build()
        .unwrap();
    let db = Arc::new(SqliteConnection::open_in_memory().unwrap());
    db.execute_batch("CREATE TABLE alert (id INTEGER PRIMARY KEY, messageid TEXT, create_time TEXT, classification TEXT);")
        .unwrap();

    let mut manager = DataProviderManager::new();
    manager.register_handler(Arc::new(IdmefHandler::alert()));
    manager.register_handler(Arc::new(LogHandler::new()));
    manager
        .register_backend("alert", Arc::new(SqlBackend::new(schema, Dialect::Sqlite).with_connection(db.clone())))
        .unwrap();
    (manager, db)
}

#[test]
fn test_count_on_empty_store() {
    let (manager, _db) = alert_store();
    let rows = manager.query(&["count(1)"], None, false, -1, 0, Some("alert")).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows.get(0).unwrap().unwrap(), &[Value::Int(0)][..]);
}

#[test]
fn test_no_backend_for_known_domain() {
    let (manager, _db) = alert_store();
    let err = manager.query(&["log.message"], None, false, -1, 0, None).unwrap_err();
    assert!(matches!(err, DataProviderError::NoBackend(ref domain) if domain == "log"));
}

#[test]
fn test_ambiguous_domain() {
    let (manager, _db) = alert_store();
    let criteria = Criterion::parse("log.host == 'web'").unwrap();
    let err = manager
        .query(&["alert.messageid"], Some(criteria.clone()), false, -1, 0, None)
        .unwrap_err();
    assert!(matches!(err, DataProviderError::AmbiguousDomain(_)));

    // An explicit domain wins over guessing.
    let err = manager
        .query(&["alert.messageid"], Some(criteria), false, -1, 0, Some("alert"))
        .unwrap_err();
    assert!(matches!(err, DataProviderError::InvalidPath(_)));
}

#[test]
fn test_rows_are_typed_per_column() {
    let (manager, db) = alert_store();
    db.execute_batch(
        "INSERT INTO alert (messageid, create_time, classification) VALUES
            ('a', '2021-02-03 04:05:06', 'ssh'),
            ('b', '2021-02-04 04:05:06', 'ssh'),
            ('c', '2021-02-04 09:00:00', 'http');",
    )
    .unwrap();

    let rows = manager
        .query(
            &["alert.classification.text/group_by", "count(alert.messageid)/order_desc", "max(alert.create_time)"],
            Some(Criterion::parse("alert.create_time >= '2021-02-01'").unwrap()),
            false,
            -1,
            0,
            None,
        )
        .unwrap();

    let first = rows.get(0).unwrap().unwrap();
    assert_eq!(first[0], Value::from("ssh"));
    assert_eq!(first[1], Value::Int(2));
    assert!(matches!(first[2], Value::Time(_)));
    assert_eq!(rows.total_count(), 2);
}

struct Mask;

impl ValueHook for Mask {
    fn on_read(&self, path: &str, value: &mut Value) -> Result<()> {
        if path == "alert.messageid" {
            *value = Value::from("***");
        }
        Ok(())
    }
}

#[test]
fn test_read_hooks_apply_to_rows_and_objects() {
    let (mut manager, db) = alert_store();
    manager.register_hook(Arc::new(Mask));
    db.execute_batch("INSERT INTO alert (messageid, create_time) VALUES ('secret', '2021-02-03 04:05:06');")
        .unwrap();

    let rows = manager.query(&["alert.messageid"], None, false, -1, 0, None).unwrap();
    assert_eq!(rows.get(0).unwrap().unwrap(), &[Value::from("***")][..]);

    let objects = manager.get(None, "time_desc", 10, 0, Some("alert")).unwrap();
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0].get("alert.messageid").unwrap(), Some(Value::from("***")));
    assert!(matches!(objects[0].get("alert.create_time").unwrap(), Some(Value::Time(_))));

    let err = manager.get(None, "newest", 10, 0, Some("alert")).unwrap_err();
    assert!(matches!(err, DataProviderError::InvalidParameter { .. }));
}

#[test]
fn test_from_settings() {
    let settings = Settings::from_toml(SETTINGS).unwrap();
    let manager = DataProviderManager::from_settings(&settings).unwrap();

    assert!(manager.has_domain("alert"));
    assert!(!manager.has_domain("session"));
    assert!(manager.handler("session").is_some());
    assert_eq!(manager.domains(), vec!["alert"]);

    let err = manager.query(&["session.user"], None, false, -1, 0, None).unwrap_err();
    assert!(matches!(err, DataProviderError::NoBackend(_)));

    let sql = manager.explain(&["count(1)"], None, false, 10, 0, None).unwrap();
    assert!(sql.contains("COUNT("), "{}", sql);
    assert!(sql.ends_with("LIMIT 10"), "{}", sql);
}
