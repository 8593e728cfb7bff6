// tests/criterion/criterion_test.rs
use std::collections::BTreeSet;

use dataprovider::criterion::{and, not, or, Criterion, CriterionOperator, FlatCriterion};
use dataprovider::domain::{IdmefHandler, TypeHandler};
use dataprovider::{DataProviderError, Value};

fn eq(path: &str, value: &str) -> Criterion {
    Criterion::new(path, CriterionOperator::Equal, value)
}

fn leaf_multiset(c: &Criterion) -> Vec<(String, CriterionOperator, String)> {
    let mut leaves: Vec<_> = c
        .leaves()
        .into_iter()
        .map(|l| (l.path.clone(), l.operator, l.value.to_string()))
        .collect();
    leaves.sort_by(|a, b| (&a.0, &a.2).cmp(&(&b.0, &b.2)));
    leaves
}

#[test]
fn test_and_paths_are_union() {
    let a = or(eq("alert.messageid", "1"), eq("alert.analyzer.name", "x"));
    let b = not(eq("alert.classification.text", "ssh"));

    let expected: BTreeSet<String> = a.get_paths().union(&b.get_paths()).cloned().collect();
    assert_eq!(and(a, b).get_paths(), expected);
}

#[test]
fn test_flatten_idempotent() {
    let c = Criterion::parse("a.x == 1 && (a.y == 2 && (a.z == 3 || (a.w == 4 || a.v == 5))) && !(a.u == 6)")
        .unwrap();
    let flat = c.flatten();
    assert_eq!(flat.flatten(), flat);

    match &flat {
        FlatCriterion::Node { operator, operands } => {
            assert_eq!(*operator, CriterionOperator::And);
            assert_eq!(operands.len(), 4);
            assert!(matches!(
                &operands[2],
                FlatCriterion::Node { operator: CriterionOperator::Or, operands } if operands.len() == 3
            ));
        }
        other => panic!("expected an AND node, got {:?}", other),
    }
}

#[test]
fn test_equality_round_trip() {
    let c = or(
        and(eq("alert.messageid", "abc"), eq("alert.analyzer.name", "it's")),
        eq("alert.classification.text", "a b"),
    );
    let reparsed = Criterion::parse(&c.to_string()).unwrap();
    assert_eq!(reparsed.operator(), c.operator());
    assert_eq!(leaf_multiset(&reparsed), leaf_multiset(&c));
}

#[test]
fn test_empty_is_identity() {
    let a = eq("alert.messageid", "1");
    assert_eq!(and(Criterion::Empty, a.clone()), a);
    assert_eq!(or(a.clone(), Criterion::Empty), a);
    assert!(not(Criterion::Empty).is_empty());
    assert!(Criterion::parse("").unwrap().is_empty());
}

#[test]
fn test_compile_validates_paths() {
    let handler = IdmefHandler::alert();
    let c = Criterion::parse("alert.bogus.field == 1").unwrap();
    assert!(matches!(c.compile(&handler), Err(DataProviderError::InvalidPath(_))));

    let c = eq("{backend}.messageid", "x");
    let compiled = c.compile(&handler).unwrap();
    assert_eq!(compiled.leaves()[0].path, "alert.messageid");
    assert_eq!(compiled.leaves()[0].value, Value::from("x"));
    assert!(handler.get_paths().contains(&"alert.messageid".to_string()));
}

#[test]
fn test_parse_error_position() {
    let err = Criterion::parse("alert.messageid == 'x' ||").unwrap_err();
    assert!(err.position().is_some());
    assert!(Criterion::leaf("alert.messageid", "&&", "x").is_err());
}
