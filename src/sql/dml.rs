//! DML (Data Manipulation Language) support.
//!
//! Builders for the INSERT, UPDATE and DELETE statements issued by the
//! relational backend's write path.
//!
//! # Examples
//!
//! ```ignore
//! use dataprovider::sql::{col, lit_int, lit_str, Delete, Dialect, ExprExt, Insert, Update};
//!
//! let insert = Insert::into("alert")
//!     .columns(["messageid"])
//!     .values([lit_str("abc")]);
//!
//! let update = Update::table("alert")
//!     .set("messageid", lit_str("def"))
//!     .filter(col("id").eq(lit_int(1)));
//!
//! let delete = Delete::from("alert").filter(col("id").eq(lit_int(1)));
//! ```

use super::dialect::Dialect;
use super::expr::{Expr, ExprExt};
use super::token::{Token, TokenStream};

fn and_filter(existing: Option<Expr>, expr: Expr) -> Option<Expr> {
    Some(match existing {
        Some(existing) => existing.paren().and(expr.paren()),
        None => expr,
    })
}

fn append_where(ts: &mut TokenStream, where_clause: &Option<Expr>, dialect: Dialect) {
    if let Some(expr) = where_clause {
        ts.space().push(Token::Where).space();
        ts.append(&expr.to_tokens_for_dialect(dialect));
    }
}

// ============================================================================
// INSERT
// ============================================================================

/// INSERT statement.
#[derive(Debug, Clone)]
#[must_use = "DML statements have no effect until converted to SQL with to_sql()"]
pub struct Insert {
    pub table: String,
    pub columns: Vec<String>,
    pub values: Vec<Expr>,
}

impl Insert {
    pub fn into(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn columns(mut self, cols: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.columns = cols.into_iter().map(Into::into).collect();
        self
    }

    pub fn values(mut self, vals: impl IntoIterator<Item = impl Into<Expr>>) -> Self {
        self.values = vals.into_iter().map(Into::into).collect();
        self
    }

    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_tokens(dialect).serialize(dialect)
    }

    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();

        ts.push(Token::Insert)
            .space()
            .push(Token::Into)
            .space()
            .push(Token::Ident(self.table.clone()));

        ts.space().lparen();
        for (i, column) in self.columns.iter().enumerate() {
            if i > 0 {
                ts.comma().space();
            }
            ts.push(Token::Ident(column.clone()));
        }
        ts.rparen();

        ts.space().push(Token::Values).space().lparen();
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                ts.comma().space();
            }
            ts.append(&value.to_tokens_for_dialect(dialect));
        }
        ts.rparen();

        ts
    }
}

// ============================================================================
// UPDATE
// ============================================================================

/// UPDATE statement.
#[derive(Debug, Clone)]
#[must_use = "DML statements have no effect until converted to SQL with to_sql()"]
pub struct Update {
    pub table: String,
    pub assignments: Vec<(String, Expr)>,
    pub where_clause: Option<Expr>,
}

impl Update {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            assignments: Vec::new(),
            where_clause: None,
        }
    }

    pub fn set(mut self, column: impl Into<String>, value: impl Into<Expr>) -> Self {
        self.assignments.push((column.into(), value.into()));
        self
    }

    /// Add a WHERE condition. Repeated calls are ANDed.
    pub fn filter(mut self, expr: Expr) -> Self {
        self.where_clause = and_filter(self.where_clause.take(), expr);
        self
    }

    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_tokens(dialect).serialize(dialect)
    }

    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();

        ts.push(Token::Update)
            .space()
            .push(Token::Ident(self.table.clone()))
            .space()
            .push(Token::Set)
            .space();

        for (i, (column, value)) in self.assignments.iter().enumerate() {
            if i > 0 {
                ts.comma().space();
            }
            ts.push(Token::Ident(column.clone()))
                .space()
                .push(Token::Eq)
                .space();
            ts.append(&value.to_tokens_for_dialect(dialect));
        }

        append_where(&mut ts, &self.where_clause, dialect);
        ts
    }
}

// ============================================================================
// DELETE
// ============================================================================

/// DELETE statement.
#[derive(Debug, Clone)]
#[must_use = "DML statements have no effect until converted to SQL with to_sql()"]
pub struct Delete {
    pub table: String,
    pub where_clause: Option<Expr>,
}

impl Delete {
    pub fn from(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            where_clause: None,
        }
    }

    /// Add a WHERE condition. Repeated calls are ANDed.
    pub fn filter(mut self, expr: Expr) -> Self {
        self.where_clause = and_filter(self.where_clause.take(), expr);
        self
    }

    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_tokens(dialect).serialize(dialect)
    }

    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.push(Token::Delete)
            .space()
            .push(Token::From)
            .space()
            .push(Token::Ident(self.table.clone()));
        append_where(&mut ts, &self.where_clause, dialect);
        ts
    }
}
