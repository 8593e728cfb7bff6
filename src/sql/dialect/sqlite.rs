//! SQLite SQL dialect.
//!
//! SQLite differences from ANSI:
//! - Times are stored as `YYYY-MM-DD HH:MM:SS` text and handled with
//!   `datetime()`/`STRFTIME()`
//! - No regular expressions without an extension function
//! - `LIKE` is case-insensitive for ASCII only, so there is no
//!   case-sensitive substring match
//! - No time zone support and no microsecond precision
//! - `LIMIT -1` means "no limit"

use super::helpers;
use super::SqlDialect;
use crate::criterion::CriterionOperator;
use crate::selection::{Extract, TimeStep};
use crate::sql::token::TokenStream;

/// SQLite SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Sqlite;

impl SqlDialect for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_numeric(b)
    }

    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        helpers::emit_limit_offset_unbounded(limit, offset, "-1")
    }

    fn comparison_template(&self, op: CriterionOperator) -> Option<&'static str> {
        use CriterionOperator::*;

        match op {
            Equal => Some("{0} = {1}"),
            EqualNocase => Some("{0} = {1} COLLATE NOCASE"),
            NotEqual => Some("{0} != {1}"),
            NotEqualNocase => Some("{0} != {1} COLLATE NOCASE"),
            SubstrNocase => Some("{0} LIKE {1}"),
            NotSubstrNocase => Some("{0} NOT LIKE {1}"),
            other => helpers::ordering_template(other),
        }
    }

    fn extract_template(&self, unit: Extract) -> &'static str {
        match unit {
            Extract::Year => "STRFTIME('%Y', {0}) + 0",
            Extract::Quarter => "((STRFTIME('%m', {0}) + 2) / 3)",
            Extract::Month => "STRFTIME('%m', {0}) + 0",
            Extract::Yday => "STRFTIME('%j', {0}) + 0",
            Extract::Mday => "STRFTIME('%d', {0}) + 0",
            Extract::Wday => "((STRFTIME('%w', {0}) + 6) % 7)",
            Extract::Hour => "STRFTIME('%H', {0}) + 0",
            Extract::Min => "STRFTIME('%M', {0}) + 0",
            Extract::Sec => "STRFTIME('%S', {0}) + 0",
            // No microsecond precision: usec is an alias of msec.
            Extract::Msec | Extract::Usec => "(STRFTIME('%f', {0}) - STRFTIME('%S', {0})) * 1000",
        }
    }

    fn timezone_template(&self) -> &'static str {
        "{0}"
    }

    fn timestamp_template(&self) -> &'static str {
        "datetime({0})"
    }

    fn interval_add_template(&self, step: TimeStep) -> &'static str {
        match step {
            TimeStep::Year => "datetime({0}, '+1 years')",
            TimeStep::Quarter => "datetime({0}, '+3 months')",
            TimeStep::Month => "datetime({0}, '+1 months')",
            TimeStep::Day => "datetime({0}, '+1 days')",
            TimeStep::Hour => "datetime({0}, '+1 hours')",
            TimeStep::Minute => "datetime({0}, '+1 minutes')",
            TimeStep::Second => "datetime({0}, '+1 seconds')",
            TimeStep::Millisecond | TimeStep::Microsecond => {
                "STRFTIME('%Y-%m-%d %H:%M:%f', {0}, '+0.001 seconds')"
            }
        }
    }
}
