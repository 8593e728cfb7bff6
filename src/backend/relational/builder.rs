//! SELECT compilation: table aliases, join resolution, and translation of
//! selections and criteria into SQL expressions.
//!
//! Tables are aliased `t0` (the base table), then `t1..` in the order they
//! are first touched. Output columns are aliased `c0..cN`.

use crate::backend::ValueQuery;
use crate::criterion::{Criterion, CriterionOperator, Leaf};
use crate::domain::COMPOSITE_TIME_FIELD;
use crate::error::{DataProviderError, Result};
use crate::selection::{Extract, Function, Path, PathIndex, SelectionObject, SelectionValue, SortOrder};
use crate::sql::{
    col, func, lit_bool, lit_float, lit_int, lit_null, lit_str, table_col, template, BinaryOperator, Dialect, Expr,
    ExprExt, Join, JoinType, OrderByExpr, Query, SelectExpr, SqlDialect, TableRef,
};
use crate::value::Value;

use super::schema::{Column, IndexFilter, Schema};

/// Format used for time literals handed to the dialect's timestamp template.
const TIME_LITERAL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq)]
struct JoinedTable {
    name: String,
    index: Option<PathIndex>,
    parent: Option<usize>,
}

/// Per-query state: the tables joined so far and their aliases.
#[derive(Debug)]
pub(crate) struct SelectBuilder<'a> {
    schema: &'a Schema,
    dialect: Dialect,
    handle_wildcards: bool,
    qualify: bool,
    tables: Vec<JoinedTable>,
    joins: Vec<Join>,
    base_filters: Vec<Expr>,
}

impl<'a> SelectBuilder<'a> {
    pub fn new(schema: &'a Schema, dialect: Dialect, base: &str) -> Self {
        Self {
            schema,
            dialect,
            handle_wildcards: false,
            qualify: true,
            tables: vec![JoinedTable {
                name: base.to_string(),
                index: None,
                parent: None,
            }],
            joins: Vec::new(),
            base_filters: Vec::new(),
        }
    }

    pub fn with_wildcards(mut self, handle_wildcards: bool) -> Self {
        self.handle_wildcards = handle_wildcards;
        self
    }

    /// Emit bare column names, for single-table UPDATE and DELETE.
    pub fn unqualified(mut self) -> Self {
        self.qualify = false;
        self
    }

    pub fn base(&self) -> &str {
        &self.tables[0].name
    }

    /// True while nothing but the base table has been touched.
    pub fn is_single_table(&self) -> bool {
        self.joins.is_empty()
    }

    fn alias(position: usize) -> String {
        format!("t{}", position)
    }

    fn column_expr(&self, position: usize, column: &str) -> Expr {
        if self.qualify {
            table_col(&Self::alias(position), column)
        } else {
            col(column)
        }
    }

    /// Expression for the column holding `path`, joining whatever it needs.
    pub fn column(&mut self, path: &Path) -> Result<Expr> {
        let column = self.schema.column(path)?.clone();
        let filters = self.schema.index_filters(path)?;
        self.column_ref(&column, &filters)
    }

    /// Expression for a raw `table.column`, joined from the base table.
    pub fn column_ref(&mut self, column: &Column, filters: &[IndexFilter]) -> Result<Expr> {
        let base = self.base().to_string();
        let route = self.schema.graph().route(&base, &column.table)?;

        // The first indexed reference to the base table claims it; another
        // index on it joins a second copy through a neighbor.
        let mut current = 0;
        if let Some(filter) = filters.iter().find(|f| f.column.table == base) {
            match self.tables[0].index.clone() {
                None => {
                    self.tables[0].index = Some(filter.index.clone());
                    let condition = self.column_expr(0, &filter.column.column).eq(index_literal(&filter.index));
                    self.base_filters.push(condition);
                }
                Some(index) if index == filter.index => {}
                Some(_) => current = self.detour(filter)?,
            }
        }

        for hop in route.windows(2) {
            let (src, dest) = (&hop[0], &hop[1]);
            let filter = filters.iter().find(|f| &f.column.table == dest);
            current = self.join_once(current, src, dest, filter)?;
        }

        Ok(self.column_expr(current, &column.column))
    }

    fn join_once(&mut self, parent: usize, src: &str, dest: &str, filter: Option<&IndexFilter>) -> Result<usize> {
        let index = filter.map(|f| f.index.clone());
        let existing = self
            .tables
            .iter()
            .position(|t| t.name == dest && t.index == index && t.parent == Some(parent));
        match existing {
            Some(position) => Ok(position),
            None => self.add_join(parent, src, dest, filter),
        }
    }

    fn detour(&mut self, filter: &IndexFilter) -> Result<usize> {
        let base = self.base().to_string();
        let neighbor = self
            .schema
            .graph()
            .neighbors(&base)
            .into_iter()
            .next()
            .ok_or_else(|| DataProviderError::Unsupported(format!("table '{}' cannot be indexed twice", base)))?;
        let via = self.join_once(0, &base, &neighbor, None)?;
        self.join_once(via, &neighbor, &base, Some(filter))
    }

    fn add_join(&mut self, parent: usize, src: &str, dest: &str, filter: Option<&IndexFilter>) -> Result<usize> {
        let position = self.tables.len();
        let (src_alias, dest_alias) = (Self::alias(parent), Self::alias(position));

        let mut conditions: Vec<Expr> = self
            .schema
            .graph()
            .join_columns(src, dest)?
            .into_iter()
            .map(|(s, d)| table_col(&src_alias, &s).eq(table_col(&dest_alias, &d)))
            .collect();
        if let Some(filter) = filter {
            conditions.push(table_col(&dest_alias, &filter.column.column).eq(index_literal(&filter.index)));
        }

        let on = conjunction(conditions).ok_or_else(|| DataProviderError::JoinGraph {
            from: src.into(),
            to: dest.into(),
        })?;

        self.joins.push(Join {
            join_type: JoinType::Left,
            table: TableRef::new(dest).with_alias(&dest_alias).into(),
            on,
        });
        self.tables.push(JoinedTable {
            name: dest.to_string(),
            index: filter.map(|f| f.index.clone()),
            parent: Some(parent),
        });
        Ok(position)
    }

    /// Compile one selection, function and extraction included.
    pub fn selection(&mut self, selection: &SelectionObject, distinct: &mut bool) -> Result<Expr> {
        let dialect = self.dialect;
        let expr = compile_value(&selection.object, dialect, &mut |path| self.column(path), distinct)?;
        Ok(apply_extract(dialect, expr, selection.extract))
    }

    pub fn criteria(&mut self, criterion: &Criterion) -> Result<Option<Expr>> {
        Ok(match criterion {
            Criterion::Empty => None,
            Criterion::Leaf(leaf) => Some(self.leaf(leaf)?),
            Criterion::Not(inner) => self.criteria(inner)?.map(ExprExt::not),
            Criterion::And(a, b) | Criterion::Or(a, b) => {
                let op = if matches!(criterion, Criterion::And(..)) {
                    BinaryOperator::And
                } else {
                    BinaryOperator::Or
                };
                match (self.criteria(a)?, self.criteria(b)?) {
                    (Some(left), Some(right)) => Some(left.binary(op, right).paren()),
                    (single, None) | (None, single) => single,
                }
            }
        })
    }

    fn leaf(&mut self, leaf: &Leaf) -> Result<Expr> {
        use CriterionOperator::*;

        let path = Path::parse(&leaf.path)?;
        let column = self.column(&path)?;

        if leaf.value.is_null() {
            return match leaf.operator {
                Equal | EqualNocase => Ok(column.is_null()),
                NotEqual | NotEqualNocase => Ok(column.is_not_null()),
                other => Err(DataProviderError::UnsupportedOperator {
                    operator: other.to_string(),
                    context: "null values".into(),
                }),
            };
        }

        let comparison =
            self.dialect
                .comparison_template(leaf.operator)
                .ok_or_else(|| DataProviderError::UnsupportedOperator {
                    operator: leaf.operator.to_string(),
                    context: format!("the {} dialect", self.dialect),
                })?;

        let value = match &leaf.value {
            Value::Text(text) if self.handle_wildcards && leaf.operator.is_substring() => lit_str(&like_pattern(text)),
            other => value_expr(self.dialect, other),
        };
        Ok(template(comparison, vec![column, value]))
    }

    /// WHERE condition: the compiled criteria plus filters indexing the base table.
    pub fn where_clause(&self, criteria: Option<Expr>) -> Option<Expr> {
        let mut conditions: Vec<Expr> = criteria.into_iter().collect();
        conditions.extend(self.base_filters.iter().cloned());
        conjunction(conditions)
    }

    /// Assemble FROM, joins and WHERE around a SELECT list.
    pub fn into_query(self, select: Vec<SelectExpr>, criteria: Option<Expr>) -> Query {
        let mut from = TableRef::new(self.base());
        if self.qualify {
            from = from.with_alias(&Self::alias(0));
        }

        let where_clause = self.where_clause(criteria);
        let mut query = Query::new().select(select).from(from);
        query.joins = self.joins;
        query.where_clause = where_clause;
        query
    }
}

/// AND a list of conditions together, left to right.
pub(crate) fn conjunction(conditions: Vec<Expr>) -> Option<Expr> {
    conditions.into_iter().reduce(|acc, c| acc.and(c))
}

fn index_literal(index: &PathIndex) -> Expr {
    match index {
        PathIndex::Position(n) => lit_int(*n),
        PathIndex::Key(key) => lit_str(key),
    }
}

/// Literal for a criterion or write value.
pub(crate) fn value_expr(dialect: Dialect, value: &Value) -> Expr {
    match value {
        Value::Null => lit_null(),
        Value::Bool(b) => lit_bool(*b),
        Value::Int(n) => lit_int(*n),
        Value::Float(f) => lit_float(*f),
        Value::Text(s) => lit_str(s),
        Value::Time(t) => template(
            dialect.timestamp_template(),
            vec![lit_str(&t.format(TIME_LITERAL_FORMAT).to_string())],
        ),
    }
}

/// Rewrite a substring value for LIKE: unescaped `*` becomes `%`, and a
/// value without any wildcard matches anywhere.
pub(crate) fn like_pattern(value: &str) -> String {
    let mut pattern = String::with_capacity(value.len() + 2);
    let mut wildcard = false;
    let mut chars = value.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('*') => pattern.push('*'),
                Some(other) => {
                    pattern.push('\\');
                    pattern.push(other);
                }
                None => pattern.push('\\'),
            },
            '*' => {
                wildcard = true;
                pattern.push('%');
            }
            c => pattern.push(c),
        }
    }

    if wildcard {
        pattern
    } else {
        format!("%{}%", pattern)
    }
}

/// Compile a selection object with `resolve` turning paths into columns.
///
/// `distinct(x)` compiles to `x` and raises `distinct`, since SQL only
/// knows DISTINCT over the whole row.
pub(crate) fn compile_value(
    value: &SelectionValue,
    dialect: Dialect,
    resolve: &mut dyn FnMut(&Path) -> Result<Expr>,
    distinct: &mut bool,
) -> Result<Expr> {
    let (function, args) = match value {
        SelectionValue::Path(path) => return resolve(path),
        SelectionValue::Constant(constant) => return Ok(value_expr(dialect, constant)),
        SelectionValue::Function { function, args } => (*function, args),
    };

    let mut args = args
        .iter()
        .map(|arg| compile_value(arg, dialect, resolve, distinct))
        .collect::<Result<Vec<_>>>()?;

    Ok(match function {
        Function::Count => func("COUNT", args),
        Function::CountDistinct => Expr::Function {
            name: "COUNT".into(),
            args,
            distinct: true,
        },
        Function::Min => func("MIN", args),
        Function::Max => func("MAX", args),
        Function::Sum => func("SUM", args),
        Function::Avg => func("AVG", args),
        Function::Distinct => {
            if args.len() != 1 {
                return Err(DataProviderError::invalid_parameter("distinct", "expects exactly one argument"));
            }
            *distinct = true;
            args.remove(0)
        }
        Function::Timezone => {
            if args.len() != 2 {
                return Err(DataProviderError::invalid_parameter(
                    "timezone",
                    "expects a time and a zone, e.g. timezone(alert.create_time, '+02:00')",
                ));
            }
            template(dialect.timezone_template(), args)
        }
    })
}

pub(crate) fn apply_extract(dialect: Dialect, expr: Expr, extract: Option<Extract>) -> Expr {
    match extract {
        Some(unit) => template(dialect.extract_template(unit), vec![expr]),
        None => expr,
    }
}

pub(crate) fn is_composite(path: &Path) -> bool {
    path.segments.len() == 2 && path.segments[1].name == COMPOSITE_TIME_FIELD
}

/// The table hosting the first selected path, or the default table when
/// nothing but constants is selected (e.g. `count(1)`).
pub(crate) fn base_table(schema: &Schema, selections: &[SelectionObject]) -> Result<String> {
    for selection in selections {
        for path in selection.paths() {
            if is_composite(path) {
                continue;
            }
            return Ok(schema.column(path)?.table.clone());
        }
    }
    Ok(schema.default_table().to_string())
}

/// LIMIT/OFFSET as the backend emits them: only when `offset > 0 || limit > -1`.
pub(crate) fn paginate(mut query: Query, limit: i64, offset: i64) -> Query {
    if limit >= 0 {
        query = query.limit(limit as u64);
    }
    if offset > 0 {
        query = query.offset(offset as u64);
    }
    query
}

/// Positional GROUP BY and ORDER BY entries, 1-based.
pub(crate) fn directives(selections: &[SelectionObject]) -> (Vec<Expr>, Vec<OrderByExpr>) {
    let mut group_by = Vec::new();
    let mut order_by = Vec::new();
    for (i, selection) in selections.iter().enumerate() {
        let position = i as i64 + 1;
        if selection.is_group_by() {
            group_by.push(lit_int(position));
        }
        match selection.order() {
            Some(SortOrder::Asc) => order_by.push(OrderByExpr::asc(lit_int(position))),
            Some(SortOrder::Desc) => order_by.push(OrderByExpr::desc(lit_int(position))),
            None => {}
        }
    }
    (group_by, order_by)
}

/// Plain SELECT for a value query with no composite time selection.
pub(crate) fn build_select(
    schema: &Schema,
    dialect: Dialect,
    handle_wildcards: bool,
    query: &ValueQuery,
) -> Result<Query> {
    let base = base_table(schema, &query.selections)?;
    let mut builder = SelectBuilder::new(schema, dialect, &base).with_wildcards(handle_wildcards);

    let mut distinct = query.distinct;
    let mut select = Vec::with_capacity(query.selections.len());
    for (i, selection) in query.selections.iter().enumerate() {
        let expr = builder.selection(selection, &mut distinct)?;
        select.push(SelectExpr::new(expr).with_alias(&format!("c{}", i)));
    }

    let criteria = builder.criteria(&query.criteria)?;
    let (group_by, order_by) = directives(&query.selections);

    let mut sql = builder.into_query(select, criteria).group_by(group_by).order_by(order_by);
    if distinct {
        sql = sql.distinct();
    }
    Ok(paginate(sql, query.limit, query.offset))
}
