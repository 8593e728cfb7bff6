// tests/search/search_test.rs
use std::sync::{Arc, Mutex};

use serde_json::{json, Value as Json};

use dataprovider::backend::search::{Method, Response, SearchBackend, Transport};
use dataprovider::config::SearchSettings;
use dataprovider::criterion::Criterion;
use dataprovider::domain::{GenericHandler, TimeField};
use dataprovider::{DataProviderError, DataProviderManager, Result, Value, ValueType};

/// Serves the index mapping, then answers every search with `reply`.
struct MockTransport {
    reply: Response,
    searches: Mutex<Vec<Json>>,
}

impl Transport for MockTransport {
    fn send(&self, method: Method, path: &str, body: Option<&Json>) -> Result<Response> {
        if method == Method::Get {
            assert_eq!(path, "");
            return Ok(Response {
                status: 200,
                body: json!({"flows-2020": {"mappings": {"properties": {
                    "geo": {"properties": {
                        "country": {"type": "text", "fields": {"keyword": {"type": "keyword"}}},
                        "city": {"type": "keyword"},
                    }},
                    "bytes": {"type": "long"},
                    "@timestamp": {"type": "date"},
                }}}}),
            });
        }
        assert_eq!(path, "/_search");
        self.searches.lock().unwrap().extend(body.cloned());
        Ok(self.reply.clone())
    }
}

fn setup(status: u16, reply: Json) -> (DataProviderManager, Arc<MockTransport>) {
    let settings = SearchSettings {
        url: "http://localhost:9200/flows-*".into(),
        user: None,
        password: None,
        time_format: None,
        timezone: "UTC".into(),
        timeout_secs: 5,
        fields: [
            ("timestamp".to_string(), "@timestamp".to_string()),
            ("country".to_string(), "geo.country, geo.country.keyword".to_string()),
            ("city".to_string(), "geo.city".to_string()),
            ("bytes".to_string(), "bytes".to_string()),
        ]
        .into_iter()
        .collect(),
    };
    let transport = Arc::new(MockTransport {
        reply: Response { status, body: reply },
        searches: Mutex::new(Vec::new()),
    });

    let handler = GenericHandler::new(
        "flow",
        TimeField::Instant("timestamp".into()),
        [("flow.timestamp", ValueType::Time), ("flow.country", ValueType::Text)],
    );
    let mut manager = DataProviderManager::new();
    manager.register_handler(Arc::new(handler));
    let backend = SearchBackend::new("flow", &settings, transport.clone()).unwrap();
    manager.register_backend("flow", Arc::new(backend)).unwrap();
    (manager, transport)
}

fn country_city_reply() -> Json {
    json!({
        "hits": {"total": {"value": 6}},
        "aggregations": {"group_0": {"buckets": [
            {"key": "FR", "doc_count": 5, "group_1": {"buckets": [
                {"key": "Paris", "doc_count": 3},
                {"key": "Lyon", "doc_count": 2},
            ]}},
            {"key": "DE", "doc_count": 1, "group_1": {"buckets": [
                {"key": "Berlin", "doc_count": 1},
            ]}},
        ]}},
    })
}

#[test]
fn test_nested_groups_flatten_in_selection_order() {
    let (manager, transport) = setup(200, country_city_reply());
    let rows = manager
        .query(&["count(1)", "flow.country/group_by", "flow.city/group_by"], None, false, -1, 0, None)
        .unwrap();

    let rows: Vec<Vec<Value>> = rows.iter().map(|r| r.unwrap().to_vec()).collect();
    assert_eq!(
        rows,
        vec![
            vec![Value::Int(3), Value::from("FR"), Value::from("Paris")],
            vec![Value::Int(2), Value::from("FR"), Value::from("Lyon")],
            vec![Value::Int(1), Value::from("DE"), Value::from("Berlin")],
        ]
    );

    let sent = transport.searches.lock().unwrap();
    assert_eq!(sent[0]["size"], json!(0));
    assert_eq!(sent[0]["aggs"]["group_0"]["terms"]["field"], json!("geo.country.keyword"));
    assert_eq!(sent[0]["aggs"]["group_0"]["aggs"]["group_1"]["terms"]["field"], json!("geo.city"));
}

#[test]
fn test_ordering_applies_after_flattening() {
    let (manager, _) = setup(200, country_city_reply());
    let rows = manager
        .query(
            &["flow.country/group_by", "flow.city/group_by", "count(1)/order_asc"],
            None,
            false,
            2,
            0,
            None,
        )
        .unwrap();

    let cities: Vec<Value> = rows.iter().map(|r| r.unwrap()[1].clone()).collect();
    assert_eq!(cities, vec![Value::from("Berlin"), Value::from("Lyon")]);
}

#[test]
fn test_document_query_reports_total() {
    let reply = json!({
        "hits": {"total": {"value": 42}, "hits": [
            {"_source": {"geo": {"city": "Oslo", "country": "NO"}, "bytes": 512, "@timestamp": "2020-03-01T10:00:00Z"}},
        ]},
    });
    let (manager, transport) = setup(200, reply);
    let rows = manager
        .query(
            &["flow.city", "flow.bytes", "flow.timestamp"],
            Some(Criterion::parse("flow.country == 'NO'").unwrap()),
            false,
            1,
            0,
            None,
        )
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows.total_count(), 42);
    let row = rows.get(0).unwrap().unwrap();
    assert_eq!(row[0], Value::from("Oslo"));
    assert_eq!(row[1], Value::Int(512));
    assert!(matches!(row[2], Value::Time(_)));

    let sent = transport.searches.lock().unwrap();
    assert_eq!(sent[0]["query"]["bool"]["must"][0], json!({"term": {"geo.country.keyword": "NO"}}));
    assert_eq!(sent[0]["size"], json!(1));
}

#[test]
fn test_engine_errors_surface() {
    let reply = json!({"error": {"root_cause": [{"reason": "Result window is too large, from + size must be less than or equal to: [10000]"}]}});
    let (manager, _) = setup(500, reply);
    let err = manager.query(&["flow.city"], None, false, 10, 20000, None).unwrap_err();
    assert!(matches!(err, DataProviderError::ResultWindow));
}
