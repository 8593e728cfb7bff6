//! Parser for the textual criteria syntax.
//!
//! ```text
//! alert.classification.text <>* 'ssh' && !(alert.source(0).node.address.address == 10.0.0.1)
//! alert.assessment.impact.severity || !alert.correlation_alert.name
//! ```
//!
//! `||` binds loosest, then `&&`, then the `!` prefix. A bare path is an
//! existence test (`path != NULL`) and `!path` its negation (`path == NULL`).

use chumsky::prelude::*;

use super::{not, Criterion, CriterionOperator, Leaf};
use crate::error::{DataProviderError, Result};
use crate::selection::{lexeme_path, lexeme_quoted, to_error};
use crate::value::Value;

type Extra<'src> = extra::Err<Rich<'src, char>>;

fn operator<'src>() -> impl Parser<'src, &'src str, CriterionOperator, Extra<'src>> + Clone {
    // Longest tokens first so that `!<>*` is not read as `!<>`.
    choice((
        just("!<>*"),
        just("!<>"),
        just("!=*"),
        just("!="),
        just("!~*"),
        just("!~"),
        just("<>*"),
        just("<>"),
        just("<="),
        just(">="),
        just("=="),
        just("=*"),
        just("="),
        just("<"),
        just(">"),
        just("~*"),
        just("~"),
    ))
    .try_map(|token: &str, span| {
        CriterionOperator::from_token(token).map_err(|e| Rich::custom(span, e.to_string()))
    })
    .labelled("operator")
}

fn numeric(raw: &str) -> Option<Value> {
    let body = raw.strip_prefix('-').unwrap_or(raw);
    if body.is_empty() || !body.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    raw.parse::<i64>()
        .map(Value::Int)
        .ok()
        .or_else(|| raw.parse::<f64>().ok().map(Value::Float))
}

fn value<'src>() -> impl Parser<'src, &'src str, Value, Extra<'src>> + Clone {
    let escape = just('\\').ignore_then(any());
    let bare = escape
        .or(none_of(" \t\r\n&|()'\"\\"))
        .repeated()
        .at_least(1)
        .collect::<String>()
        .map(|raw| numeric(&raw).unwrap_or(Value::Text(raw)));

    lexeme_quoted().map(Value::Text).or(bare).labelled("value")
}

fn criteria<'src>() -> impl Parser<'src, &'src str, Criterion, Extra<'src>> {
    let expr = recursive(|expr| {
        let leaf = lexeme_path()
            .to_slice()
            .then(operator().padded().then(value()).or_not())
            .map(|(path, comparison): (&str, _)| match comparison {
                Some((operator, value)) => Criterion::Leaf(Leaf::new(path, operator, value)),
                None => Criterion::new(path, CriterionOperator::NotEqual, Value::Null),
            });

        let atom = expr.delimited_by(just('(').padded(), just(')').padded()).or(leaf.padded());

        let unary = recursive(|unary| {
            just('!')
                .padded()
                .ignore_then(unary)
                .map(|inner: Criterion| match inner {
                    Criterion::Leaf(Leaf {
                        path,
                        operator: CriterionOperator::NotEqual,
                        value: Value::Null,
                    }) => Criterion::new(path, CriterionOperator::Equal, Value::Null),
                    other => not(other),
                })
                .or(atom)
        });

        let conjunction = unary
            .clone()
            .foldl(just("&&").padded().ignore_then(unary).repeated(), Criterion::and);

        conjunction
            .clone()
            .foldl(just("||").padded().ignore_then(conjunction).repeated(), Criterion::or)
    });

    expr.padded().then_ignore(end())
}

/// Parse a criteria string. Blank input yields [`Criterion::Empty`].
pub fn parse_criteria(text: &str) -> Result<Criterion> {
    if text.trim().is_empty() {
        return Ok(Criterion::Empty);
    }

    let (output, errs) = criteria().parse(text).into_output_errors();
    match output {
        Some(criterion) if errs.is_empty() => Ok(criterion),
        _ => {
            let (position, message) = to_error(text, errs);
            Err(DataProviderError::InvalidCriterion {
                input: text.to_string(),
                position,
                message,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use CriterionOperator::*;

    #[test]
    fn test_blank_is_empty() {
        assert_eq!(parse_criteria("   ").unwrap(), Criterion::Empty);
    }

    #[test]
    fn test_operators_longest_match() {
        let c = parse_criteria("alert.classification.text !<>* ssh").unwrap();
        assert_eq!(c, Criterion::new("alert.classification.text", NotSubstrNocase, "ssh"));

        let c = parse_criteria("alert.source.service.port<=1024").unwrap();
        assert_eq!(c, Criterion::new("alert.source.service.port", LowerOrEqual, 1024));
    }

    #[test]
    fn test_bare_path_existence() {
        assert_eq!(
            parse_criteria("alert.messageid").unwrap(),
            Criterion::new("alert.messageid", NotEqual, Value::Null)
        );
        assert_eq!(
            parse_criteria("!alert.messageid").unwrap(),
            Criterion::new("alert.messageid", Equal, Value::Null)
        );
    }

    #[test]
    fn test_precedence() {
        let c = parse_criteria("a.x == 1 || a.y == 2 && a.z == 3").unwrap();
        assert_eq!(c.operator(), Some(Or));
        assert_eq!(c.to_string(), "(a.x == 1 || (a.y == 2 && a.z == 3))");
    }

    #[test]
    fn test_parentheses_and_not() {
        let c = parse_criteria("!(a.x == 'foo bar' || a.y ~* \"^ab\")").unwrap();
        assert_eq!(c.to_string(), "!((a.x == 'foo bar' || a.y ~* '^ab'))");
    }

    #[test]
    fn test_unquoted_values() {
        let c = parse_criteria("alert.source.node.address.address == 10.0.0.1").unwrap();
        assert_eq!(
            c,
            Criterion::new("alert.source.node.address.address", Equal, "10.0.0.1")
        );
        let c = parse_criteria("alert.assessment.confidence.confidence > 0.5").unwrap();
        assert_eq!(c, Criterion::new("alert.assessment.confidence.confidence", Greater, 0.5));
    }

    #[test]
    fn test_display_reparses() {
        let text = "(alert.messageid == 'it\\'s' && !alert.analyzer.name)";
        let c = parse_criteria(text).unwrap();
        assert_eq!(c.to_string(), text);
        assert_eq!(parse_criteria(&c.to_string()).unwrap(), c);
    }

    #[test]
    fn test_errors_carry_position() {
        let err = parse_criteria("alert.messageid == 'x' &&").unwrap_err();
        assert!(matches!(err, DataProviderError::InvalidCriterion { .. }));
        assert!(err.position().is_some());

        assert!(parse_criteria("(alert.messageid").is_err());
        assert!(parse_criteria("alert == x").is_err());
    }
}
