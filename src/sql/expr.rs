//! Expression AST - the core of SQL expression building.
//!
//! This module provides a strongly-typed AST for SQL expressions
//! with exhaustive pattern matching enforced by the compiler.

use super::dialect::{Dialect, SqlDialect};
use super::query::Query;
use super::token::{Token, TokenStream};

// =============================================================================
// Expression AST
// =============================================================================

/// A SQL expression.
///
/// Every variant must be handled in `to_tokens_for_dialect()` - the compiler enforces this.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column reference: optional_table.column
    Column {
        table: Option<String>,
        column: String,
    },

    Literal(Literal),

    /// Binary operation: left op right
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },

    UnaryOp { op: UnaryOperator, expr: Box<Expr> },

    /// Function call: name(args...)
    Function {
        name: String,
        args: Vec<Expr>,
        distinct: bool,
    },

    /// IN: expr IN (values...)
    In {
        expr: Box<Expr>,
        values: Vec<Expr>,
        negated: bool,
    },

    /// IN subquery: expr IN (SELECT ...)
    InSubquery {
        expr: Box<Expr>,
        subquery: Box<Query>,
        negated: bool,
    },

    IsNull { expr: Box<Expr>, negated: bool },

    /// Star: * or table.*
    Star { table: Option<String> },

    /// Parenthesized expression
    Paren(Box<Expr>),

    /// Row value: (a, b)
    Tuple(Vec<Expr>),

    /// Dialect template with `{0}`, `{1}`... placeholders filled by `args`.
    ///
    /// Templates come from [`SqlDialect`] tables only; values always travel
    /// in `args` so they are quoted by the dialect.
    Template { template: String, args: Vec<Expr> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Eq,
    Ne,
    Lt,
    Gt,
    Lte,
    Gte,
    And,
    Or,
    Plus,
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
}

fn binary_op_to_token(op: BinaryOperator) -> Token {
    match op {
        BinaryOperator::Eq => Token::Eq,
        BinaryOperator::Ne => Token::Ne,
        BinaryOperator::Lt => Token::Lt,
        BinaryOperator::Gt => Token::Gt,
        BinaryOperator::Lte => Token::Lte,
        BinaryOperator::Gte => Token::Gte,
        BinaryOperator::And => Token::And,
        BinaryOperator::Or => Token::Or,
        BinaryOperator::Plus => Token::Plus,
        BinaryOperator::Minus => Token::Minus,
    }
}

fn append_list(ts: &mut TokenStream, exprs: &[Expr], dialect: Dialect) {
    for (i, expr) in exprs.iter().enumerate() {
        if i > 0 {
            ts.comma().space();
        }
        ts.append(&expr.to_tokens_for_dialect(dialect));
    }
}

/// Expand `{n}` placeholders. Unmatched braces are kept verbatim.
fn append_template(ts: &mut TokenStream, template: &str, args: &[Expr], dialect: Dialect) {
    let mut raw = String::new();
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        let placeholder = after
            .find('}')
            .and_then(|end| after[..end].parse::<usize>().ok().map(|n| (n, end)))
            .and_then(|(n, end)| args.get(n).map(|arg| (arg, end)));

        match placeholder {
            Some((arg, end)) => {
                raw.push_str(&rest[..start]);
                if !raw.is_empty() {
                    ts.push(Token::Raw(std::mem::take(&mut raw)));
                }
                ts.append(&arg.to_tokens_for_dialect(dialect));
                rest = &after[end + 1..];
            }
            None => {
                raw.push_str(&rest[..=start]);
                rest = after;
            }
        }
    }

    raw.push_str(rest);
    if !raw.is_empty() {
        ts.push(Token::Raw(raw));
    }
}

impl Expr {
    /// Convert this expression to a token stream for a specific dialect.
    pub fn to_tokens_for_dialect(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();

        match self {
            Expr::Column { table, column } => {
                if let Some(t) = table {
                    ts.push(Token::Ident(t.clone()));
                    ts.push(Token::Dot);
                }
                ts.push(Token::Ident(column.clone()));
            }

            Expr::Literal(lit) => {
                ts.push(match lit {
                    Literal::Int(n) => Token::LitInt(*n),
                    Literal::Float(f) => Token::LitFloat(*f),
                    Literal::String(s) => Token::LitString(s.clone()),
                    Literal::Bool(b) => Token::LitBool(*b),
                    Literal::Null => Token::LitNull,
                });
            }

            Expr::BinaryOp { left, op, right } => {
                ts.append(&left.to_tokens_for_dialect(dialect));
                ts.space();
                ts.push(binary_op_to_token(*op));
                ts.space();
                ts.append(&right.to_tokens_for_dialect(dialect));
            }

            Expr::UnaryOp { op, expr } => {
                ts.push(match op {
                    UnaryOperator::Not => Token::Not,
                });
                ts.space();
                ts.append(&expr.to_tokens_for_dialect(dialect));
            }

            Expr::Function {
                name,
                args,
                distinct,
            } => {
                ts.push(Token::FunctionName(name.clone()));
                ts.lparen();
                if *distinct {
                    ts.push(Token::Distinct).space();
                }
                append_list(&mut ts, args, dialect);
                ts.rparen();
            }

            Expr::In {
                expr,
                values,
                negated,
            } => {
                // "x IN ()" is invalid SQL: it is FALSE, "x NOT IN ()" is TRUE
                if values.is_empty() {
                    ts.push(if *negated { Token::True } else { Token::False });
                } else {
                    ts.append(&expr.to_tokens_for_dialect(dialect));
                    if *negated {
                        ts.space().push(Token::Not);
                    }
                    ts.space().push(Token::In).space().lparen();
                    append_list(&mut ts, values, dialect);
                    ts.rparen();
                }
            }

            Expr::InSubquery {
                expr,
                subquery,
                negated,
            } => {
                ts.append(&expr.to_tokens_for_dialect(dialect));
                if *negated {
                    ts.space().push(Token::Not);
                }
                ts.space().push(Token::In).space().lparen();
                ts.append(&subquery.to_tokens_for_dialect(dialect));
                ts.rparen();
            }

            Expr::IsNull { expr, negated } => {
                ts.append(&expr.to_tokens_for_dialect(dialect));
                ts.space();
                ts.push(if *negated { Token::IsNotNull } else { Token::IsNull });
            }

            Expr::Star { table } => {
                if let Some(t) = table {
                    ts.push(Token::Ident(t.clone()));
                    ts.push(Token::Dot);
                }
                ts.push(Token::Star);
            }

            Expr::Paren(inner) => {
                ts.lparen();
                ts.append(&inner.to_tokens_for_dialect(dialect));
                ts.rparen();
            }

            Expr::Tuple(items) => {
                if let [single] = items.as_slice() {
                    ts.append(&single.to_tokens_for_dialect(dialect));
                } else {
                    ts.lparen();
                    append_list(&mut ts, items, dialect);
                    ts.rparen();
                }
            }

            Expr::Template { template, args } => {
                append_template(&mut ts, template, args, dialect);
            }
        }

        ts
    }

    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_tokens_for_dialect(dialect).serialize(dialect)
    }
}

// =============================================================================
// Builder functions
// =============================================================================

pub fn col(name: &str) -> Expr {
    Expr::Column {
        table: None,
        column: name.into(),
    }
}

pub fn table_col(table: &str, column: &str) -> Expr {
    Expr::Column {
        table: Some(table.into()),
        column: column.into(),
    }
}

pub fn lit_int(n: i64) -> Expr {
    Expr::Literal(Literal::Int(n))
}

pub fn lit_float(f: f64) -> Expr {
    Expr::Literal(Literal::Float(f))
}

pub fn lit_str(s: &str) -> Expr {
    Expr::Literal(Literal::String(s.into()))
}

pub fn lit_bool(b: bool) -> Expr {
    Expr::Literal(Literal::Bool(b))
}

pub fn lit_null() -> Expr {
    Expr::Literal(Literal::Null)
}

pub fn star() -> Expr {
    Expr::Star { table: None }
}

pub fn func(name: &str, args: Vec<Expr>) -> Expr {
    Expr::Function {
        name: name.into(),
        args,
        distinct: false,
    }
}

pub fn count(expr: Expr) -> Expr {
    func("COUNT", vec![expr])
}

pub fn count_distinct(expr: Expr) -> Expr {
    Expr::Function {
        name: "COUNT".into(),
        args: vec![expr],
        distinct: true,
    }
}

pub fn template(template: &str, args: Vec<Expr>) -> Expr {
    Expr::Template {
        template: template.into(),
        args,
    }
}

// =============================================================================
// Fluent combinators
// =============================================================================

pub trait ExprExt: Sized {
    fn binary(self, op: BinaryOperator, other: impl Into<Expr>) -> Expr;

    fn eq(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOperator::Eq, other)
    }

    fn lt(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOperator::Lt, other)
    }

    fn gte(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOperator::Gte, other)
    }

    fn and(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOperator::And, other)
    }

    fn or(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOperator::Or, other)
    }

    fn is_null(self) -> Expr;

    fn is_not_null(self) -> Expr;

    fn not(self) -> Expr;

    fn paren(self) -> Expr;

    fn in_list(self, values: Vec<Expr>) -> Expr;

    fn in_subquery(self, query: Query) -> Expr;
}

impl ExprExt for Expr {
    fn binary(self, op: BinaryOperator, other: impl Into<Expr>) -> Expr {
        Expr::BinaryOp {
            left: Box::new(self),
            op,
            right: Box::new(other.into()),
        }
    }

    fn is_null(self) -> Expr {
        Expr::IsNull {
            expr: Box::new(self),
            negated: false,
        }
    }

    fn is_not_null(self) -> Expr {
        Expr::IsNull {
            expr: Box::new(self),
            negated: true,
        }
    }

    fn not(self) -> Expr {
        Expr::UnaryOp {
            op: UnaryOperator::Not,
            expr: Box::new(self.paren()),
        }
    }

    fn paren(self) -> Expr {
        match self {
            Expr::Paren(_) => self,
            other => Expr::Paren(Box::new(other)),
        }
    }

    fn in_list(self, values: Vec<Expr>) -> Expr {
        Expr::In {
            expr: Box::new(self),
            values,
            negated: false,
        }
    }

    fn in_subquery(self, query: Query) -> Expr {
        Expr::InSubquery {
            expr: Box::new(self),
            subquery: Box::new(query),
            negated: false,
        }
    }
}

impl From<i64> for Expr {
    fn from(n: i64) -> Self {
        lit_int(n)
    }
}

impl From<&str> for Expr {
    fn from(s: &str) -> Self {
        lit_str(s)
    }
}

impl From<String> for Expr {
    fn from(s: String) -> Self {
        Expr::Literal(Literal::String(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_expansion() {
        let e = template("{0} = BINARY {1}", vec![table_col("t0", "name"), lit_str("it's")]);
        assert_eq!(e.to_sql(Dialect::MySql), "`t0`.`name` = BINARY 'it''s'");
    }

    #[test]
    fn test_template_repeated_placeholder() {
        let e = template(
            "(STRFTIME('%f', {0}) - STRFTIME('%S', {0})) * 1000",
            vec![table_col("t0", "create_time")],
        );
        assert_eq!(
            e.to_sql(Dialect::Sqlite),
            "(STRFTIME('%f', \"t0\".\"create_time\") - STRFTIME('%S', \"t0\".\"create_time\")) * 1000"
        );
    }

    #[test]
    fn test_template_literal_braces() {
        let e = template("{x} {0} {", vec![lit_int(1)]);
        assert_eq!(e.to_sql(Dialect::Sqlite), "{x} 1 {");
    }

    #[test]
    fn test_nested_dialect_is_kept() {
        let e = count_distinct(table_col("t1", "name")).not();
        assert_eq!(e.to_sql(Dialect::MySql), "NOT (COUNT(DISTINCT `t1`.`name`))");
    }

    #[test]
    fn test_empty_in_list() {
        assert_eq!(col("id").in_list(vec![]).to_sql(Dialect::Sqlite), "0");
        assert_eq!(
            col("id").in_list(vec![lit_int(1), lit_int(2)]).to_sql(Dialect::Sqlite),
            "\"id\" IN (1, 2)"
        );
    }

    #[test]
    fn test_is_null() {
        assert_eq!(col("name").is_not_null().to_sql(Dialect::Postgres), "\"name\" IS NOT NULL");
    }
}
