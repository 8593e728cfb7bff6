// tests/relational/mutation_test.rs
use std::sync::Arc;

use dataprovider::backend::relational::{Schema, SqlBackend, SqlConnection, SqliteConnection};
use dataprovider::criterion::Criterion;
use dataprovider::domain::IdmefHandler;
use dataprovider::router::ValueHook;
use dataprovider::sql::Dialect;
use dataprovider::{DataProviderManager, Result, Value};

fn setup() -> (DataProviderManager, Arc<SqliteConnection>) {
    let schema = Schema::builder()
        .table("alert", &["id"])
        .table("source", &["id"])
        .default_table("alert")
        .relation("alert.id", "source.alert_id")
        .path("alert.messageid", "alert.messageid")
        .path("alert.create_time", "alert.create_time")
        .path("alert.classification.text", "alert.classification")
        .path("alert.source.node.name", "source.node_name")
        .build()
        .unwrap();
    let db = Arc::new(SqliteConnection::open_in_memory().unwrap());
    db.execute_batch(
        "CREATE TABLE alert (id INTEGER PRIMARY KEY, messageid TEXT, create_time TEXT, classification TEXT);
         CREATE TABLE source (id INTEGER PRIMARY KEY, alert_id INTEGER, node_name TEXT);",
    )
    .unwrap();

    let mut manager = DataProviderManager::new();
    manager.register_handler(Arc::new(IdmefHandler::alert()));
    manager
        .register_backend("alert", Arc::new(SqlBackend::new(schema, Dialect::Sqlite).with_connection(db.clone())))
        .unwrap();
    (manager, db)
}

#[test]
fn test_insert_then_query_back() {
    let (manager, _db) = setup();
    let id = manager
        .insert(
            &[
                ("alert.messageid", Value::from("m1")),
                ("alert.create_time", Value::from("2021-05-01 12:00:00")),
                ("alert.source.node.name", Value::from("web")),
            ],
            None,
            None,
        )
        .unwrap();
    assert_eq!(id, Some(Value::Int(1)));

    let rows = manager
        .query(&["alert.messageid", "alert.source.node.name"], None, false, -1, 0, None)
        .unwrap();
    assert_eq!(rows.get(0).unwrap().unwrap(), &[Value::from("m1"), Value::from("web")][..]);
}

#[test]
fn test_update_and_delete_through_router() {
    let (manager, db) = setup();
    db.execute_batch(
        "INSERT INTO alert (id, messageid, classification) VALUES (1, 'a', 'ssh'), (2, 'b', 'http');
         INSERT INTO source (alert_id, node_name) VALUES (1, 'web'), (2, 'db');",
    )
    .unwrap();

    manager
        .update(
            &[("alert.classification.text", Value::from("ssh brute force"))],
            Some(Criterion::parse("alert.source.node.name == 'web'").unwrap()),
            None,
        )
        .unwrap();
    assert_eq!(
        db.query("SELECT classification FROM alert ORDER BY id").unwrap(),
        vec![vec![Value::from("ssh brute force")], vec![Value::from("http")]]
    );

    manager
        .delete(Some(Criterion::parse("alert.source.node.name == 'db'").unwrap()), &["alert.messageid"], None)
        .unwrap();
    assert_eq!(db.query("SELECT messageid FROM alert").unwrap(), vec![vec![Value::from("a")]]);
}

struct Lowercase;

impl ValueHook for Lowercase {
    fn on_write(&self, _path: &str, value: &mut Value) -> Result<()> {
        if let Value::Text(s) = value {
            *s = s.to_lowercase();
        }
        Ok(())
    }
}

#[test]
fn test_write_hooks_see_inserted_values() {
    let (mut manager, db) = setup();
    manager.register_hook(Arc::new(Lowercase));
    manager
        .insert(&[("alert.messageid", Value::from("LOUD"))], None, None)
        .unwrap();
    assert_eq!(db.query("SELECT messageid FROM alert").unwrap(), vec![vec![Value::from("loud")]]);
}
