//! MySQL SQL dialect.
//!
//! MySQL differences from ANSI:
//! - Backtick identifier quoting (`` `name` ``)
//! - Boolean is TINYINT(1), returns 1/0
//! - Backslash is an escape character inside string literals
//! - Comparisons are case-insensitive unless forced with `BINARY`
//! - No `LIMIT ALL`: an offset alone needs the largest unsigned limit

use super::helpers;
use super::SqlDialect;
use crate::criterion::CriterionOperator;
use crate::selection::{Extract, TimeStep};
use crate::sql::token::TokenStream;

/// MySQL SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct MySql;

impl SqlDialect for MySql {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_backtick(ident)
    }

    fn quote_string(&self, s: &str) -> String {
        helpers::quote_string_backslash(s)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_numeric(b)
    }

    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        helpers::emit_limit_offset_unbounded(limit, offset, "18446744073709551615")
    }

    fn comparison_template(&self, op: CriterionOperator) -> Option<&'static str> {
        use CriterionOperator::*;

        Some(match op {
            Equal => "{0} = BINARY {1}",
            EqualNocase => "{0} = {1}",
            NotEqual => "{0} != BINARY {1}",
            NotEqualNocase => "{0} != {1}",
            Regex => "{0} REGEXP BINARY {1}",
            RegexNocase => "{0} REGEXP {1}",
            NotRegex => "{0} NOT REGEXP BINARY {1}",
            NotRegexNocase => "{0} NOT REGEXP {1}",
            Substr => "{0} LIKE BINARY {1}",
            SubstrNocase => "{0} LIKE {1}",
            NotSubstr => "{0} NOT LIKE BINARY {1}",
            NotSubstrNocase => "{0} NOT LIKE {1}",
            other => return helpers::ordering_template(other),
        })
    }

    fn extract_template(&self, unit: Extract) -> &'static str {
        match unit {
            Extract::Year => "EXTRACT(YEAR FROM {0})",
            Extract::Quarter => "QUARTER({0})",
            Extract::Month => "EXTRACT(MONTH FROM {0})",
            Extract::Yday => "DAYOFYEAR({0})",
            Extract::Mday => "DAYOFMONTH({0})",
            Extract::Wday => "WEEKDAY({0})",
            Extract::Hour => "EXTRACT(HOUR FROM {0})",
            Extract::Min => "EXTRACT(MINUTE FROM {0})",
            Extract::Sec => "EXTRACT(SECOND FROM {0})",
            Extract::Msec => "EXTRACT(MICROSECOND FROM {0}) / 1000",
            Extract::Usec => "EXTRACT(MICROSECOND FROM {0})",
        }
    }

    fn timezone_template(&self) -> &'static str {
        "CONVERT_TZ({0}, 'GMT', {1})"
    }

    fn timestamp_template(&self) -> &'static str {
        "TIMESTAMP({0})"
    }

    fn interval_add_template(&self, step: TimeStep) -> &'static str {
        match step {
            TimeStep::Year => "DATE_ADD({0}, INTERVAL 1 YEAR)",
            TimeStep::Quarter => "DATE_ADD({0}, INTERVAL 1 QUARTER)",
            TimeStep::Month => "DATE_ADD({0}, INTERVAL 1 MONTH)",
            TimeStep::Day => "DATE_ADD({0}, INTERVAL 1 DAY)",
            TimeStep::Hour => "DATE_ADD({0}, INTERVAL 1 HOUR)",
            TimeStep::Minute => "DATE_ADD({0}, INTERVAL 1 MINUTE)",
            TimeStep::Second => "DATE_ADD({0}, INTERVAL 1 SECOND)",
            TimeStep::Millisecond => "DATE_ADD({0}, INTERVAL 1000 MICROSECOND)",
            TimeStep::Microsecond => "DATE_ADD({0}, INTERVAL 1 MICROSECOND)",
        }
    }
}
