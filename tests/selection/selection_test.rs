// tests/selection/selection_test.rs
use dataprovider::domain::{IdmefHandler, LogHandler, TypeHandler};
use dataprovider::selection::{Extract, Function, Path, SelectionObject, SortOrder};
use dataprovider::{DataProviderError, ValueType};

#[test]
fn test_display_reparses() {
    for text in [
        "alert.messageid",
        "count(alert.create_time):year/group_by,order_desc",
        "count_distinct(alert.analyzer.name)",
        "alert.source(-1).node.address(0).address",
        "timezone(alert.create_time, 'Europe/Paris'):hour",
    ] {
        let selection = SelectionObject::parse(text).unwrap();
        assert_eq!(selection.to_string(), text);
        assert_eq!(SelectionObject::parse(&selection.to_string()).unwrap().object, selection.object);
    }
}

#[test]
fn test_selection_parts() {
    let s = SelectionObject::parse("max(log.timestamp):day/order_asc").unwrap();
    assert_eq!(s.function(), Some(Function::Max));
    assert_eq!(s.extract, Some(Extract::Day));
    assert_eq!(s.order(), Some(SortOrder::Asc));
    assert!(!s.is_group_by());
    assert_eq!(s.path().unwrap().domain(), "log");
    assert_eq!(s.raw, "max(log.timestamp):day/order_asc");
}

#[test]
fn test_return_types_through_handler() {
    let handler = IdmefHandler::alert();
    let (selections, types) = handler
        .parse_paths(&[
            "alert.messageid",
            "count(alert.messageid)",
            "alert.create_time",
            "alert.create_time:month",
            "min({backend}.create_time)",
        ])
        .unwrap();
    assert_eq!(selections.len(), 5);
    assert_eq!(
        types,
        vec![ValueType::Text, ValueType::Int, ValueType::Time, ValueType::Int, ValueType::Time]
    );
    assert_eq!(selections[4].path().unwrap().to_string(), "alert.create_time");
}

#[test]
fn test_unknown_paths_rejected() {
    let handler = LogHandler::new();
    let err = handler.parse_paths(&["log.nonexistent"]).unwrap_err();
    assert!(matches!(err, DataProviderError::InvalidPath(_)));

    let err = handler.parse_paths(&["alert.messageid"]).unwrap_err();
    assert!(matches!(err, DataProviderError::InvalidPath(_)));
}

#[test]
fn test_path_helpers() {
    let path = Path::parse("alert.target(0).node.name").unwrap();
    assert_eq!(path.domain(), "alert");
    assert_eq!(path.unindexed(), "alert.target.node.name");
    assert_eq!(path.field(), "target.node.name");
}

#[test]
fn test_parse_errors_point_into_input() {
    let err = SelectionObject::parse("count(alert.messageid").unwrap_err();
    let position = err.position().unwrap();
    assert!(position <= "count(alert.messageid".len());
}
