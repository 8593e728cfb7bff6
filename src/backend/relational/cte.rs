//! Time-series bucketing over a start/end interval.
//!
//! A selection on the composite time field (`<domain>._timeline:<unit>`)
//! produces one row per bucket between the query's time bounds, including
//! buckets no stored row falls into:
//!
//! ```text
//! WITH RECURSIVE _numbers(value) AS (start UNION ALL value + step ... < end),
//!      _intervals AS (SELECT value AS start, value + step AS end FROM _numbers),
//!      _main AS (SELECT <start> AS c0, <end> AS c1, <other paths> FROM ... WHERE ...)
//! SELECT ... FROM _intervals LEFT JOIN _main ON _main.c0 < _intervals.end AND _main.c1 >= _intervals.start
//! GROUP BY _intervals.start, ...
//! ```

use chrono::NaiveDateTime;

use crate::backend::ValueQuery;
use crate::criterion::{Criterion, CriterionOperator, FlatCriterion};
use crate::domain::{TimeField, TypeHandler, COMPOSITE_TIME_FIELD};
use crate::error::{DataProviderError, Result};
use crate::selection::{Function, Path, SelectionObject, SortOrder, TimeStep};
use crate::sql::{
    col, count, lit_int, table_col, template, Cte, Dialect, Expr, ExprExt, OrderByExpr, Query, SelectExpr,
    SqlDialect, TableRef,
};
use crate::value::{Value, ValueType};

use super::builder::{apply_extract, compile_value, is_composite, paginate, value_expr, SelectBuilder};
use super::schema::Schema;

const NUMBERS: &str = "_numbers";
const INTERVALS: &str = "_intervals";
const MAIN: &str = "_main";

/// True when a selection needs bucketing.
pub(crate) fn is_bucketed(query: &ValueQuery) -> bool {
    query
        .selections
        .iter()
        .any(|s| s.paths().into_iter().any(is_composite))
}

fn as_time(value: &Value) -> Result<NaiveDateTime> {
    match value.clone().cast(ValueType::Time)? {
        Value::Time(t) => Ok(t),
        other => Err(DataProviderError::Conversion {
            value: other.to_string(),
            target: ValueType::Time.to_string(),
        }),
    }
}

/// Lower and upper bound of the bucketed range.
///
/// The criteria must be a conjunction holding `start_path < X` (upper bound)
/// and `end_path > Y` (lower bound). `start_path > Y` and `end_path < X` are
/// accepted when the preferred form is missing.
pub(crate) fn time_bounds(
    criteria: &Criterion,
    start_path: &str,
    end_path: &str,
) -> Result<(NaiveDateTime, NaiveDateTime)> {
    use CriterionOperator::*;

    let flat = criteria.flatten();
    let (mut lower, mut upper) = (None, None);
    let (mut lower_fallback, mut upper_fallback) = (None, None);

    for term in flat.conjuncts() {
        let FlatCriterion::Leaf(leaf) = term else {
            continue;
        };
        let slot = match leaf.operator {
            Lower | LowerOrEqual if leaf.path == start_path => &mut upper,
            Greater | GreaterOrEqual if leaf.path == end_path => &mut lower,
            Greater | GreaterOrEqual if leaf.path == start_path => &mut lower_fallback,
            Lower | LowerOrEqual if leaf.path == end_path => &mut upper_fallback,
            _ => continue,
        };
        *slot = Some(as_time(&leaf.value)?);
    }

    let lower = lower
        .or(lower_fallback)
        .ok_or_else(|| DataProviderError::TimeBounds(format!("no lower bound on '{}'", end_path)))?;
    let upper = upper
        .or(upper_fallback)
        .ok_or_else(|| DataProviderError::TimeBounds(format!("no upper bound on '{}'", start_path)))?;

    if lower >= upper {
        return Err(DataProviderError::TimeBounds(format!(
            "empty range from {} to {}",
            lower, upper
        )));
    }
    Ok((lower, upper))
}

/// Coarsest extraction unit requested on the composite time field.
pub(crate) fn bucket_step(selections: &[SelectionObject]) -> Result<TimeStep> {
    selections
        .iter()
        .filter(|s| s.paths().into_iter().any(is_composite))
        .filter_map(|s| s.extract)
        .min_by_key(|e| e.rank())
        .map(|e| e.step())
        .ok_or_else(|| {
            DataProviderError::invalid_parameter(
                COMPOSITE_TIME_FIELD,
                "time buckets need an extraction unit, e.g. _timeline:hour",
            )
        })
}

fn counts_constants(selection: &SelectionObject) -> bool {
    selection.function() == Some(Function::Count) && selection.paths().is_empty()
}

pub(crate) fn build_bucketed(
    schema: &Schema,
    dialect: Dialect,
    handle_wildcards: bool,
    handler: &dyn TypeHandler,
    query: &ValueQuery,
) -> Result<Query> {
    let TimeField::Interval { start, end } = handler.time_field() else {
        return Err(DataProviderError::TimeBounds(format!(
            "domain '{}' has no start/end time interval",
            handler.name()
        )));
    };
    let start_path = Path::parse(&format!("{}.{}", handler.name(), start))?;
    let end_path = Path::parse(&format!("{}.{}", handler.name(), end))?;

    let (lower, upper) = time_bounds(&query.criteria, &start_path.to_string(), &end_path.to_string())?;
    let step = bucket_step(&query.selections)?;

    // Inner rows: interval bounds first, then every other selected path once.
    let mut inner_paths = vec![start_path.clone(), end_path];
    for selection in &query.selections {
        for path in selection.paths() {
            if !is_composite(path) && !inner_paths.contains(path) {
                inner_paths.push(path.clone());
            }
        }
    }

    let base = inner_paths
        .get(2)
        .unwrap_or(&start_path)
        .clone();
    let base = schema.column(&base)?.table.clone();
    let mut builder = SelectBuilder::new(schema, dialect, &base).with_wildcards(handle_wildcards);
    let mut inner_select = Vec::with_capacity(inner_paths.len());
    for (k, path) in inner_paths.iter().enumerate() {
        let expr = builder.column(path)?;
        inner_select.push(SelectExpr::new(expr).with_alias(&format!("c{}", k)));
    }
    let criteria = builder.criteria(&query.criteria)?;
    let inner = builder.into_query(inner_select, criteria);

    let add_step = |expr: Expr| template(dialect.interval_add_template(step), vec![expr]);
    let upper_literal = value_expr(dialect, &Value::Time(upper));

    let seed = Query::new().select(vec![value_expr(dialect, &Value::Time(lower))]);
    let next = Query::new()
        .select(vec![add_step(col("value"))])
        .from(TableRef::new(NUMBERS))
        .filter(add_step(col("value")).lt(upper_literal));
    let numbers = Cte::recursive(NUMBERS, seed.union_all(next).into_query()).with_columns(vec!["value"]);

    let intervals = Cte::new(
        INTERVALS,
        Query::new()
            .select(vec![
                SelectExpr::new(col("value")).with_alias("start"),
                SelectExpr::new(add_step(col("value"))).with_alias("end"),
            ])
            .from(TableRef::new(NUMBERS)),
    );

    let bucket_start = table_col(INTERVALS, "start");
    let mut distinct = query.distinct;
    let mut select = Vec::with_capacity(query.selections.len());
    for (i, selection) in query.selections.iter().enumerate() {
        let expr = if counts_constants(selection) {
            // COUNT over the joined side so that empty buckets count 0.
            count(table_col(MAIN, "c0"))
        } else {
            compile_value(
                &selection.object,
                dialect,
                &mut |path| {
                    if is_composite(path) {
                        return Ok(bucket_start.clone());
                    }
                    inner_paths
                        .iter()
                        .position(|p| p == path)
                        .map(|k| table_col(MAIN, &format!("c{}", k)))
                        .ok_or_else(|| DataProviderError::InvalidPath(path.to_string()))
                },
                &mut distinct,
            )?
        };
        select.push(SelectExpr::new(apply_extract(dialect, expr, selection.extract)).with_alias(&format!("c{}", i)));
    }

    let mut group_by = vec![bucket_start.clone()];
    let mut order_by = Vec::new();
    for (i, selection) in query.selections.iter().enumerate() {
        let position = lit_int(i as i64 + 1);
        if selection.is_group_by() && !selection.paths().into_iter().any(is_composite) {
            group_by.push(position.clone());
        }
        match selection.order() {
            Some(SortOrder::Asc) => order_by.push(OrderByExpr::asc(position)),
            Some(SortOrder::Desc) => order_by.push(OrderByExpr::desc(position)),
            None => {}
        }
    }
    if order_by.is_empty() {
        order_by.push(OrderByExpr::asc(bucket_start.clone()));
    }

    let on = table_col(MAIN, "c0")
        .lt(table_col(INTERVALS, "end"))
        .and(table_col(MAIN, "c1").gte(bucket_start));

    let mut outer = Query::new()
        .with_cte(numbers)
        .with_cte(intervals)
        .with_cte(Cte::new(MAIN, inner))
        .select(select)
        .from(TableRef::new(INTERVALS))
        .left_join(TableRef::new(MAIN), on)
        .group_by(group_by)
        .order_by(order_by);
    if distinct {
        outer = outer.distinct();
    }
    Ok(paginate(outer, query.limit, query.offset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criterion::{and, or};
    use crate::domain::GenericHandler;
    use crate::value::parse_time;

    fn handler() -> GenericHandler {
        GenericHandler::new(
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
        )
    }

    fn schema() -> Schema {
        Schema::builder()
            .table("session", &["id"])
            .path("session.user", "session.user")
            .path("session.start_time", "session.start_time")
            .path("session.end_time", "session.end_time")
            .build()
            .unwrap()
    }

    fn range() -> Criterion {
        and(
            Criterion::new("session.start_time", CriterionOperator::Lower, "2020-01-04"),
            Criterion::new("session.end_time", CriterionOperator::GreaterOrEqual, "2020-01-01"),
        )
    }

    #[test]
    fn test_time_bounds() {
        let (lower, upper) = time_bounds(&range(), "session.start_time", "session.end_time").unwrap();
        assert_eq!(lower, parse_time("2020-01-01").unwrap());
        assert_eq!(upper, parse_time("2020-01-04").unwrap());
    }

    #[test]
    fn test_time_bounds_fallback_forms() {
        let criteria = and(
            Criterion::new("session.start_time", CriterionOperator::GreaterOrEqual, "2020-01-01"),
            Criterion::new("session.end_time", CriterionOperator::LowerOrEqual, "2020-01-02"),
        );
        let (lower, upper) = time_bounds(&criteria, "session.start_time", "session.end_time").unwrap();
        assert_eq!(lower, parse_time("2020-01-01").unwrap());
        assert_eq!(upper, parse_time("2020-01-02").unwrap());
    }

    #[test]
    fn test_time_bounds_need_conjunction() {
        let err = time_bounds(
            &or(range(), Criterion::new("session.user", CriterionOperator::Equal, "bob")),
            "session.start_time",
            "session.end_time",
        )
        .unwrap_err();
        assert!(matches!(err, DataProviderError::TimeBounds(_)));

        let err = time_bounds(&Criterion::Empty, "session.start_time", "session.end_time").unwrap_err();
        assert!(matches!(err, DataProviderError::TimeBounds(_)));
    }

    #[test]
    fn test_coarsest_step_wins() {
        let selections: Vec<_> = ["session._timeline:hour", "session._timeline:mday", "session.user:year"]
            .iter()
            .map(|s| SelectionObject::parse(s).unwrap())
            .collect();
        assert_eq!(bucket_step(&selections).unwrap(), TimeStep::Day);

        let bare = vec![SelectionObject::parse("session._timeline").unwrap()];
        assert!(bucket_step(&bare).is_err());
    }

    #[test]
    fn test_bucketed_sql_shape() {
        let handler = handler();
        let (selections, types) = handler
            .parse_paths(&["session._timeline:mday", "count(1)", "session.user/group_by"])
            .unwrap();
        let query = ValueQuery::new(selections, types).with_criteria(range());
        assert!(is_bucketed(&query));

        let sql = build_bucketed(&schema(), Dialect::Sqlite, false, &handler, &query)
            .unwrap()
            .to_sql(Dialect::Sqlite);

        assert!(sql.starts_with("WITH RECURSIVE \"_numbers\"(\"value\") AS (\nSELECT datetime('2020-01-01 00:00:00')\nUNION ALL\n"), "{}", sql);
        assert!(sql.contains("WHERE datetime(\"value\", '+1 days') < datetime('2020-01-04 00:00:00')"), "{}", sql);
        assert!(sql.contains("SELECT \"t0\".\"start_time\" AS \"c0\", \"t0\".\"end_time\" AS \"c1\", \"t0\".\"user\" AS \"c2\""), "{}", sql);
        assert!(sql.contains("COUNT(\"_main\".\"c0\") AS \"c1\", \"_main\".\"c2\" AS \"c2\""), "{}", sql);
        assert!(sql.contains("LEFT JOIN \"_main\" ON \"_main\".\"c0\" < \"_intervals\".\"end\" AND \"_main\".\"c1\" >= \"_intervals\".\"start\""), "{}", sql);
        assert!(sql.ends_with("GROUP BY \"_intervals\".\"start\", 3\nORDER BY \"_intervals\".\"start\" ASC"), "{}", sql);
    }
}
