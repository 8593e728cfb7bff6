//! SQL Dialect definitions and formatting rules.
//!
//! Each dialect implements `SqlDialect` to handle its specific syntax:
//!
//! - Identifier quoting: `"` (PostgreSQL/SQLite), `` ` `` (MySQL)
//! - Comparison operators: `BINARY` (MySQL), `ILIKE`/`~*` (PostgreSQL), `COLLATE NOCASE` (SQLite)
//! - Time extraction, time zone conversion and interval arithmetic
//! - Open-ended pagination (`LIMIT ALL`, `LIMIT -1`, ...)
//!
//! Templates use `{0}`, `{1}` placeholders, filled with rendered expressions
//! by [`Expr::Template`](super::expr::Expr::Template).
//!
//! # Usage
//!
//! ```ignore
//! use dataprovider::sql::{Dialect, SqlDialect};
//!
//! let dialect = Dialect::Postgres;
//! let quoted = dialect.quote_identifier("user");  // "user"
//! ```

pub mod helpers;
mod mysql;
mod postgres;
mod sqlite;

pub use mysql::MySql;
pub use postgres::Postgres;
pub use sqlite::Sqlite;

use std::str::FromStr;

use super::token::TokenStream;
use crate::criterion::CriterionOperator;
use crate::error::DataProviderError;
use crate::selection::{Extract, TimeStep};

/// SQL dialect trait - defines how SQL constructs are rendered.
///
/// The default implementations follow ANSI SQL where possible.
pub trait SqlDialect: std::fmt::Debug + Send + Sync {
    /// Dialect name as written in configuration.
    fn name(&self) -> &'static str;

    // =========================================================================
    // Identifier and Literal Quoting
    // =========================================================================

    fn quote_identifier(&self, ident: &str) -> String;

    /// Quote a string literal. All dialects double single quotes.
    fn quote_string(&self, s: &str) -> String {
        helpers::quote_string_single(s)
    }

    fn format_bool(&self, b: bool) -> &'static str;

    fn format_null(&self) -> &'static str {
        "NULL"
    }

    // =========================================================================
    // Pagination
    // =========================================================================

    /// Emit LIMIT/OFFSET. An offset without a limit needs a dialect-specific
    /// "no limit" marker.
    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        helpers::emit_limit_offset_standard(limit, offset)
    }

    // =========================================================================
    // CTE
    // =========================================================================

    fn emit_recursive_keyword(&self) -> bool {
        true
    }

    // =========================================================================
    // Criteria
    // =========================================================================

    /// Template for a comparison against a non-null value, `None` when the
    /// dialect has no equivalent.
    fn comparison_template(&self, op: CriterionOperator) -> Option<&'static str>;

    // =========================================================================
    // Date/Time
    // =========================================================================

    fn extract_template(&self, unit: Extract) -> &'static str;

    /// `{0}` is a UTC time, `{1}` the target zone literal.
    fn timezone_template(&self) -> &'static str;

    /// Turns a quoted `YYYY-MM-DD HH:MM:SS` literal into a timestamp.
    fn timestamp_template(&self) -> &'static str;

    /// Adds one `step` to `{0}`.
    fn interval_add_template(&self, step: TimeStep) -> &'static str;
}

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    Sqlite,
    MySql,
    Postgres,
}

impl Dialect {
    pub fn dialect(&self) -> &'static dyn SqlDialect {
        match self {
            Dialect::Sqlite => &Sqlite,
            Dialect::MySql => &MySql,
            Dialect::Postgres => &Postgres,
        }
    }
}

impl SqlDialect for Dialect {
    fn name(&self) -> &'static str {
        self.dialect().name()
    }

    fn quote_identifier(&self, ident: &str) -> String {
        self.dialect().quote_identifier(ident)
    }

    fn quote_string(&self, s: &str) -> String {
        self.dialect().quote_string(s)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        self.dialect().format_bool(b)
    }

    fn format_null(&self) -> &'static str {
        self.dialect().format_null()
    }

    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        self.dialect().emit_limit_offset(limit, offset)
    }

    fn emit_recursive_keyword(&self) -> bool {
        self.dialect().emit_recursive_keyword()
    }

    fn comparison_template(&self, op: CriterionOperator) -> Option<&'static str> {
        self.dialect().comparison_template(op)
    }

    fn extract_template(&self, unit: Extract) -> &'static str {
        self.dialect().extract_template(unit)
    }

    fn timezone_template(&self) -> &'static str {
        self.dialect().timezone_template()
    }

    fn timestamp_template(&self) -> &'static str {
        self.dialect().timestamp_template()
    }

    fn interval_add_template(&self, step: TimeStep) -> &'static str {
        self.dialect().interval_add_template(step)
    }
}

impl FromStr for Dialect {
    type Err = DataProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            "mysql" => Ok(Dialect::MySql),
            "pgsql" | "postgres" | "postgresql" => Ok(Dialect::Postgres),
            other => Err(DataProviderError::invalid_parameter(
                "dialect",
                format!("unknown SQL dialect '{}'", other),
            )),
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dialect().name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_display() {
        assert_eq!(Dialect::Sqlite.to_string(), "sqlite");
        assert_eq!(Dialect::Postgres.to_string(), "pgsql");
        assert_eq!(Dialect::MySql.to_string(), "mysql");
    }

    #[test]
    fn test_from_str() {
        assert_eq!("PgSQL".parse::<Dialect>().unwrap(), Dialect::Postgres);
        assert_eq!("sqlite3".parse::<Dialect>().unwrap(), Dialect::Sqlite);
        assert!("oracle".parse::<Dialect>().is_err());
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(Dialect::Sqlite.quote_identifier("alert"), "\"alert\"");
        assert_eq!(Dialect::MySql.quote_identifier("weird`name"), "`weird``name`");
    }

    #[test]
    fn test_comparison_tables() {
        use CriterionOperator::*;

        assert_eq!(Dialect::MySql.comparison_template(Equal), Some("{0} = BINARY {1}"));
        assert_eq!(Dialect::Postgres.comparison_template(SubstrNocase), Some("{0} ILIKE {1}"));
        assert_eq!(Dialect::Sqlite.comparison_template(Regex), None);
        for dialect in [Dialect::Sqlite, Dialect::MySql, Dialect::Postgres] {
            assert_eq!(dialect.comparison_template(GreaterOrEqual), Some("{0} >= {1}"));
        }
    }

    #[test]
    fn test_open_ended_limit() {
        let sql = |d: Dialect| d.emit_limit_offset(None, Some(5)).serialize(d);
        assert_eq!(sql(Dialect::Sqlite), "LIMIT -1 OFFSET 5");
        assert_eq!(sql(Dialect::Postgres), "LIMIT ALL OFFSET 5");
        assert_eq!(sql(Dialect::MySql), "LIMIT 18446744073709551615 OFFSET 5");
    }
}
