// tests/relational/join_test.rs
use std::sync::Arc;

use dataprovider::backend::relational::{Schema, SqlBackend, SqliteConnection};
use dataprovider::backend::{Backend, ValueQuery};
use dataprovider::criterion::Criterion;
use dataprovider::domain::{GenericHandler, TimeField, TypeHandler};
use dataprovider::sql::Dialect;
use dataprovider::{Value, ValueType};

/// order -> line -> product, where order and product only meet through line.
fn schema() -> Schema {
    Schema::builder()
        .table("orders", &["id"])
        .table("line", &["id"])
        .table("product", &["id"])
        .default_table("orders")
        .relation("orders.id", "line.order_id")
        .relation("product.id", "line.product_id")
        .path("shop.customer", "orders.customer")
        .path("shop.created", "orders.created")
        .path("shop.line.quantity", "line.quantity")
        .path("shop.product.name", "product.name")
        .build()
        .unwrap()
}

fn handler() -> GenericHandler {
    GenericHandler::new(
        "shop",
        TimeField::Instant("created".into()),
        [
            ("shop.customer", ValueType::Text),
            ("shop.created", ValueType::Time),
            ("shop.line.quantity", ValueType::Int),
            ("shop.product.name", ValueType::Text),
        ],
    )
}

fn query(paths: &[&str], criteria: &str) -> ValueQuery {
    let (selections, types) = handler().parse_paths(paths).unwrap();
    ValueQuery::new(selections, types).with_criteria(Criterion::parse(criteria).unwrap())
}

#[test]
fn test_two_hops_join_each_table_once() {
    let backend = SqlBackend::new(schema(), Dialect::Sqlite);
    let sql = backend
        .explain(
            &handler(),
            &query(&["shop.customer", "shop.product.name"], "shop.line.quantity > 1"),
        )
        .unwrap();

    assert_eq!(sql.matches("JOIN").count(), 2, "{}", sql);
    assert_eq!(sql.matches("\"line\" AS").count(), 1, "{}", sql);
    assert_eq!(sql.matches("\"product\" AS").count(), 1, "{}", sql);
    assert!(sql.starts_with("SELECT \"t0\".\"customer\" AS \"c0\", \"t2\".\"name\" AS \"c1\"\nFROM \"orders\" AS \"t0\""), "{}", sql);
}

#[test]
fn test_joined_query_runs() {
    let db = Arc::new(SqliteConnection::open_in_memory().unwrap());
    db.execute_batch(
        "CREATE TABLE orders (id INTEGER PRIMARY KEY, customer TEXT, created TEXT);
         CREATE TABLE line (id INTEGER PRIMARY KEY, order_id INTEGER, product_id INTEGER, quantity INTEGER);
         CREATE TABLE product (id INTEGER PRIMARY KEY, name TEXT);
         INSERT INTO product (id, name) VALUES (1, 'lamp'), (2, 'desk');
         INSERT INTO orders (id, customer, created) VALUES (1, 'ann', '2021-01-01 00:00:00'), (2, 'bob', '2021-01-02 00:00:00');
         INSERT INTO line (order_id, product_id, quantity) VALUES (1, 1, 3), (1, 2, 1), (2, 2, 5);",
    )
    .unwrap();
    let backend = SqlBackend::new(schema(), Dialect::Sqlite).with_connection(db);

    let mut rows = backend
        .execute(
            &handler(),
            &query(&["shop.customer", "shop.product.name"], "shop.line.quantity > 1"),
        )
        .unwrap()
        .rows;
    rows.sort_by(|a, b| a[0].loose_cmp(&b[0]));
    assert_eq!(
        rows,
        vec![
            vec![Value::from("ann"), Value::from("lamp")],
            vec![Value::from("bob"), Value::from("desk")],
        ]
    );
}

#[test]
fn test_dialects_quote_differently() {
    let backend = SqlBackend::new(schema(), Dialect::MySql);
    let sql = backend
        .explain(&handler(), &query(&["shop.product.name"], ""))
        .unwrap();
    assert!(sql.contains("`product`"), "{}", sql);
}

#[test]
fn test_single_table_has_no_join() {
    let backend = SqlBackend::new(schema(), Dialect::Postgres);
    let sql = backend
        .explain(&handler(), &query(&["shop.customer"], ""))
        .unwrap();
    insta::assert_snapshot!(sql, @r#"
    SELECT "t0"."customer" AS "c0"
    FROM "orders" AS "t0"
    "#);
}
