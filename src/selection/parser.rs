//! Parser for selection strings and dotted paths.

use chumsky::prelude::*;
use chumsky::span::Span as _;

use super::{Command, Extract, Function, Path, PathIndex, PathSegment, SelectionObject, SelectionValue};
use crate::error::{DataProviderError, Result};
use crate::value::Value;

type Extra<'src> = extra::Err<Rich<'src, char>>;

/// Segment name: a letter or underscore, then letters, digits, `_` or `-`.
pub(crate) fn lexeme_name<'src>() -> impl Parser<'src, &'src str, &'src str, Extra<'src>> + Clone {
    any()
        .filter(|c: &char| c.is_ascii_alphabetic() || *c == '_')
        .then(
            any()
                .filter(|c: &char| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
                .repeated(),
        )
        .to_slice()
        .labelled("name")
}

/// Single or double quoted string with backslash escapes.
pub(crate) fn lexeme_quoted<'src>() -> impl Parser<'src, &'src str, String, Extra<'src>> + Clone {
    let quoted_with = |quote: char| {
        let escape = just('\\').ignore_then(any());
        just(quote)
            .ignore_then(escape.or(none_of([quote, '\\'])).repeated().collect::<String>())
            .then_ignore(just(quote))
    };
    quoted_with('\'').or(quoted_with('"')).labelled("quoted string")
}

/// Integer or decimal literal, optionally negative.
pub(crate) fn lexeme_number<'src>() -> impl Parser<'src, &'src str, Value, Extra<'src>> + Clone {
    just('-')
        .or_not()
        .then(text::digits(10))
        .then(just('.').then(text::digits(10)).or_not())
        .to_slice()
        .try_map(|s: &str, span| {
            if s.contains('.') {
                s.parse::<f64>().map(Value::Float).map_err(|e| Rich::custom(span, e.to_string()))
            } else {
                s.parse::<i64>().map(Value::Int).map_err(|e| Rich::custom(span, e.to_string()))
            }
        })
        .labelled("number")
}

/// Dotted path with at least two segments, optional indexes and an optional `[key]`.
pub(crate) fn lexeme_path<'src>() -> impl Parser<'src, &'src str, Path, Extra<'src>> + Clone {
    let position = just('-')
        .or_not()
        .then(text::digits(10))
        .to_slice()
        .try_map(|s: &str, span| {
            s.parse::<i64>()
                .map(PathIndex::Position)
                .map_err(|e| Rich::custom(span, e.to_string()))
        });
    let index = position
        .or(lexeme_quoted().map(PathIndex::Key))
        .padded()
        .delimited_by(just('('), just(')'));

    let segment = lexeme_name()
        .then(index.or_not())
        .map(|(name, index)| PathSegment {
            name: name.to_string(),
            index,
        });

    let key = lexeme_quoted()
        .or(lexeme_name().map(String::from))
        .delimited_by(just('['), just(']'));

    segment
        .separated_by(just('.'))
        .at_least(2)
        .collect::<Vec<_>>()
        .then(key.or_not())
        .map(|(segments, key)| Path { segments, key })
        .labelled("path")
}

fn function_name<'src>() -> impl Parser<'src, &'src str, Function, Extra<'src>> + Clone {
    lexeme_name().try_map(|name: &str, span| {
        Function::from_name(name).ok_or_else(|| Rich::custom(span, format!("unknown function '{}'", name)))
    })
}

fn selection_value<'src>() -> impl Parser<'src, &'src str, SelectionValue, Extra<'src>> + Clone {
    recursive(|value| {
        let args = value
            .padded()
            .separated_by(just(','))
            .at_least(1)
            .collect::<Vec<_>>()
            .delimited_by(just('('), just(')'));

        let call = function_name()
            .then(args)
            .map(|(function, args)| SelectionValue::function(function, args));

        choice((
            call,
            lexeme_path().map(SelectionValue::Path),
            lexeme_number().map(SelectionValue::Constant),
            lexeme_quoted().map(|s| SelectionValue::Constant(Value::Text(s))),
        ))
    })
}

fn selection<'src>() -> impl Parser<'src, &'src str, SelectionObject, Extra<'src>> {
    let extract = just(':').ignore_then(lexeme_name().try_map(|name: &str, span| {
        Extract::from_name(name).ok_or_else(|| Rich::custom(span, format!("unknown extract '{}'", name)))
    }));

    let command = lexeme_name().try_map(|name: &str, span| {
        Command::from_name(name).ok_or_else(|| Rich::custom(span, format!("unknown command '{}'", name)))
    });
    let commands = just('/').ignore_then(
        command
            .padded()
            .separated_by(just(','))
            .at_least(1)
            .collect::<Vec<_>>(),
    );

    selection_value()
        .padded()
        .then(extract.or_not())
        .then(commands.or_not())
        .padded()
        .then_ignore(end())
        .map(|((object, extract), commands)| SelectionObject {
            raw: String::new(),
            object,
            extract,
            commands: commands.unwrap_or_default(),
        })
}

pub(crate) fn to_error(input: &str, errs: Vec<Rich<'_, char>>) -> (usize, String) {
    match errs.into_iter().next() {
        Some(e) => (e.span().start(), e.to_string()),
        None => (input.len(), "unexpected end of input".to_string()),
    }
}

/// Parse a selection string such as `count(alert.messageid)/group_by`.
pub fn parse_selection(text: &str) -> Result<SelectionObject> {
    let (output, errs) = selection().parse(text).into_output_errors();
    match output {
        Some(mut selection) if errs.is_empty() => {
            selection.raw = text.trim().to_string();
            selection.validate()
        }
        _ => {
            let (position, message) = to_error(text, errs);
            Err(DataProviderError::Parse {
                input: text.to_string(),
                position,
                message,
            })
        }
    }
}

/// Parse a bare path such as `alert.source(0).node.name`.
pub fn parse_path(text: &str) -> Result<Path> {
    let (output, errs) = lexeme_path()
        .padded()
        .then_ignore(end())
        .parse(text)
        .into_output_errors();
    match output {
        Some(path) if errs.is_empty() => Ok(path),
        _ => {
            let (position, message) = to_error(text, errs);
            Err(DataProviderError::Parse {
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
    use crate::selection::SortOrder;

    #[test]
    fn test_plain_path() {
        let s = parse_selection("alert.messageid").unwrap();
        assert_eq!(s.path().unwrap().unindexed(), "alert.messageid");
        assert!(s.function().is_none());
        assert!(s.commands.is_empty());
    }

    #[test]
    fn test_indexed_path() {
        let p = parse_path("alert.source(-1).node.address(0).address").unwrap();
        assert_eq!(p.unindexed(), "alert.source.node.address.address");
        let idx: Vec<_> = p.indexes().collect();
        assert_eq!(idx, vec![(1, &PathIndex::Position(-1)), (3, &PathIndex::Position(0))]);
        assert_eq!(p.to_string(), "alert.source(-1).node.address(0).address");
    }

    #[test]
    fn test_string_index_and_key() {
        let p = parse_path("alert.additional_data('Ports').data['x']").unwrap();
        assert_eq!(p.segments[1].index, Some(PathIndex::Key("Ports".into())));
        assert_eq!(p.key.as_deref(), Some("x"));
    }

    #[test]
    fn test_function_extract_commands() {
        let s = parse_selection("count(alert.create_time):year/group_by, order_desc").unwrap();
        assert_eq!(s.function(), Some(Function::Count));
        assert_eq!(s.extract, Some(Extract::Year));
        assert!(s.is_group_by());
        assert_eq!(s.order(), Some(SortOrder::Desc));
    }

    #[test]
    fn test_count_distinct_folding() {
        let s = parse_selection("count(distinct(alert.analyzer.name))").unwrap();
        assert_eq!(s.function(), Some(Function::CountDistinct));
        assert_eq!(s.paths().len(), 1);
    }

    #[test]
    fn test_constant_argument() {
        let s = parse_selection("count(1)").unwrap();
        assert_eq!(s.function_args(), &[SelectionValue::Constant(Value::Int(1))]);
        assert!(s.path().is_none());

        let s = parse_selection("timezone(alert.create_time, 'Europe/Paris')").unwrap();
        assert_eq!(s.function_args().len(), 2);
    }

    #[test]
    fn test_rejects_malformed() {
        for bad in ["alert", "count(alert.messageid", "alert.messageid:decade", "alert.messageid/sideways", "frobnicate(alert.x)"] {
            assert!(parse_selection(bad).is_err(), "{} should fail", bad);
        }
    }

    #[test]
    fn test_conflicting_orders() {
        let err = parse_selection("alert.messageid/order_asc,order_desc").unwrap_err();
        assert!(matches!(err, DataProviderError::Parse { .. }));
    }
}
