//! PostgreSQL SQL dialect.
//!
//! PostgreSQL features:
//! - ANSI identifier quoting (`"`)
//! - Native boolean type (true/false)
//! - POSIX regular expressions (`~`, `~*`) and `ILIKE`
//! - `timezone()` for zone conversion, `INTERVAL` arithmetic

use super::helpers;
use super::SqlDialect;
use crate::criterion::CriterionOperator;
use crate::selection::{Extract, TimeStep};
use crate::sql::token::TokenStream;

/// PostgreSQL SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Postgres;

impl SqlDialect for Postgres {
    fn name(&self) -> &'static str {
        "pgsql"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_literal(b)
    }

    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        helpers::emit_limit_offset_unbounded(limit, offset, "ALL")
    }

    fn comparison_template(&self, op: CriterionOperator) -> Option<&'static str> {
        use CriterionOperator::*;

        Some(match op {
            Equal => "{0} = {1}",
            EqualNocase => "lower({0}) = lower({1})",
            NotEqual => "{0} != {1}",
            NotEqualNocase => "lower({0}) != lower({1})",
            Regex => "{0} ~ {1}",
            RegexNocase => "{0} ~* {1}",
            NotRegex => "{0} !~ {1}",
            NotRegexNocase => "{0} !~* {1}",
            Substr => "{0} LIKE {1}",
            SubstrNocase => "{0} ILIKE {1}",
            NotSubstr => "{0} NOT LIKE {1}",
            NotSubstrNocase => "{0} NOT ILIKE {1}",
            other => return helpers::ordering_template(other),
        })
    }

    fn extract_template(&self, unit: Extract) -> &'static str {
        match unit {
            Extract::Year => "EXTRACT(YEAR FROM {0})",
            Extract::Quarter => "EXTRACT(QUARTER FROM {0})",
            Extract::Month => "EXTRACT(MONTH FROM {0})",
            Extract::Yday => "EXTRACT(DOY FROM {0})",
            Extract::Mday => "EXTRACT(DAY FROM {0})",
            Extract::Wday => "(EXTRACT(ISODOW FROM {0}) - 1)",
            Extract::Hour => "EXTRACT(HOUR FROM {0})",
            Extract::Min => "EXTRACT(MINUTE FROM {0})",
            Extract::Sec => "EXTRACT(SECOND FROM {0})",
            Extract::Msec => "EXTRACT(MILLISECOND FROM {0})",
            Extract::Usec => "EXTRACT(MICROSECOND FROM {0})",
        }
    }

    fn timezone_template(&self) -> &'static str {
        "timezone({1}, timezone('UTC', {0}))"
    }

    fn timestamp_template(&self) -> &'static str {
        "TIMESTAMP {0}"
    }

    fn interval_add_template(&self, step: TimeStep) -> &'static str {
        match step {
            TimeStep::Year => "{0} + INTERVAL '1 year'",
            TimeStep::Quarter => "{0} + INTERVAL '3 months'",
            TimeStep::Month => "{0} + INTERVAL '1 month'",
            TimeStep::Day => "{0} + INTERVAL '1 day'",
            TimeStep::Hour => "{0} + INTERVAL '1 hour'",
            TimeStep::Minute => "{0} + INTERVAL '1 minute'",
            TimeStep::Second => "{0} + INTERVAL '1 second'",
            TimeStep::Millisecond => "{0} + INTERVAL '1 millisecond'",
            TimeStep::Microsecond => "{0} + INTERVAL '1 microsecond'",
        }
    }
}
