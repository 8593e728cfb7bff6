//! Shared helper functions for SQL dialect implementations.
//!
//! This module provides reusable building blocks that dialects can compose
//! to implement the `SqlDialect` trait with minimal duplication.

use super::super::token::{Token, TokenStream};
use crate::criterion::CriterionOperator;

// =============================================================================
// Identifier Quoting
// =============================================================================

/// Quote identifier with double quotes (ANSI style).
/// Used by: PostgreSQL, SQLite
pub fn quote_double(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote identifier with backticks.
/// Used by: MySQL
pub fn quote_backtick(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

// =============================================================================
// String Quoting
// =============================================================================

/// Quote string with single quotes (standard SQL).
pub fn quote_string_single(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Quote string for servers that also treat backslash as an escape.
/// Used by: MySQL
pub fn quote_string_backslash(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "''"))
}

// =============================================================================
// Boolean Formatting
// =============================================================================

/// Used by: PostgreSQL
pub fn format_bool_literal(b: bool) -> &'static str {
    if b {
        "true"
    } else {
        "false"
    }
}

/// Used by: MySQL, SQLite
pub fn format_bool_numeric(b: bool) -> &'static str {
    if b {
        "1"
    } else {
        "0"
    }
}

// =============================================================================
// Pagination
// =============================================================================

/// Emit LIMIT ... OFFSET ... (standard SQL).
pub fn emit_limit_offset_standard(limit: Option<u64>, offset: Option<u64>) -> TokenStream {
    let mut ts = TokenStream::new();

    if let Some(lim) = limit {
        ts.push(Token::Limit).space().push(Token::LitInt(lim as i64));
    }

    if let Some(off) = offset {
        if limit.is_some() {
            ts.space();
        }
        ts.push(Token::Offset).space().push(Token::LitInt(off as i64));
    }

    ts
}

/// Emit LIMIT/OFFSET, writing `unbounded` as the limit when only an offset is given.
pub fn emit_limit_offset_unbounded(
    limit: Option<u64>,
    offset: Option<u64>,
    unbounded: &'static str,
) -> TokenStream {
    match (limit, offset) {
        (None, Some(_)) => {
            let mut ts = TokenStream::new();
            ts.push(Token::Limit).space().push(Token::Raw(unbounded.into())).space();
            ts.append(&emit_limit_offset_standard(None, offset));
            ts
        }
        _ => emit_limit_offset_standard(limit, offset),
    }
}

// =============================================================================
// Comparison Operators
// =============================================================================

/// Ordering comparisons shared by every dialect.
pub fn ordering_template(op: CriterionOperator) -> Option<&'static str> {
    match op {
        CriterionOperator::Lower => Some("{0} < {1}"),
        CriterionOperator::LowerOrEqual => Some("{0} <= {1}"),
        CriterionOperator::Greater => Some("{0} > {1}"),
        CriterionOperator::GreaterOrEqual => Some("{0} >= {1}"),
        _ => None,
    }
}
