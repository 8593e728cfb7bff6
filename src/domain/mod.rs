//! Type handlers: one per logical data domain.
//!
//! A handler owns the domain's path namespace ([`PathCatalog`]), its time
//! field, and the hooks that normalize paths and criteria before a backend
//! compiles them. Handlers override only the hooks they need.

mod catalog;
mod generic;
mod idmef;
mod log;

pub use catalog::{PathCatalog, PathInfo};
pub use generic::GenericHandler;
pub use idmef::IdmefHandler;
pub use log::LogHandler;

use crate::criterion::{Criterion, CriterionOperator, Leaf};
use crate::error::{DataProviderError, Result};
use crate::selection::{Path, SelectionObject};
use crate::value::{Value, ValueType};

/// Virtual field spanning a start/end interval, used for time bucketing.
pub const COMPOSITE_TIME_FIELD: &str = "_timeline";

/// The field a domain orders and buckets by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeField {
    Instant(String),
    Interval { start: String, end: String },
}

impl TimeField {
    /// The instant field, or the start of the interval.
    pub fn primary(&self) -> &str {
        match self {
            TimeField::Instant(field) => field,
            TimeField::Interval { start, .. } => start,
        }
    }

    pub fn is_interval(&self) -> bool {
        matches!(self, TimeField::Interval { .. })
    }
}

/// Operators that make sense for a value type.
pub fn operators_for(value_type: ValueType) -> Vec<CriterionOperator> {
    use CriterionOperator::*;

    match value_type {
        ValueType::Text => CriterionOperator::COMPARISONS
            .into_iter()
            .filter(|op| op.is_equality() || op.is_regex() || op.is_substring())
            .collect(),
        ValueType::Time => vec![Equal, NotEqual, Lower, LowerOrEqual, Greater, GreaterOrEqual],
        _ => CriterionOperator::COMPARISONS
            .into_iter()
            .filter(|op| op.is_equality() || op.is_ordering())
            .collect(),
    }
}

/// Domain-specific path and criterion rules.
pub trait TypeHandler: Send + Sync {
    fn name(&self) -> &str;

    fn catalog(&self) -> &PathCatalog;

    fn time_field(&self) -> &TimeField;

    /// Substitute `{backend}` and `{time_field}` placeholders.
    fn format_path(&self, path: &str) -> String {
        path.replace("{backend}", self.name())
            .replace("{time_field}", self.time_field().primary())
    }

    /// Type of a path in this domain; fails with `InvalidPath` when unknown.
    fn path_type(&self, path: &Path) -> Result<ValueType> {
        if path.domain() != self.name() {
            return Err(DataProviderError::InvalidPath(path.to_string()));
        }
        if path.segments.len() == 2
            && path.segments[1].name == COMPOSITE_TIME_FIELD
            && self.time_field().is_interval()
        {
            return Ok(ValueType::Time);
        }
        self.catalog()
            .path_type(&path.unindexed())
            .ok_or_else(|| DataProviderError::InvalidPath(path.to_string()))
    }

    /// Parse and validate selections, returning each column's type.
    fn parse_paths(&self, paths: &[&str]) -> Result<(Vec<SelectionObject>, Vec<ValueType>)> {
        let mut selections = Vec::with_capacity(paths.len());
        let mut types = Vec::with_capacity(paths.len());
        for text in paths {
            let selection = self.catalog().parse_cached(&self.format_path(text))?;
            let value_type = selection.return_type(&mut |p| self.path_type(p))?;
            selections.push(selection);
            types.push(value_type);
        }
        Ok((selections, types))
    }

    /// Rewrite one criterion leaf. The default validates the path and operator.
    fn compile_criterion(&self, leaf: &Leaf) -> Result<Criterion> {
        check_leaf(self, leaf).map(Criterion::Leaf)
    }

    fn get_operator_by_datatype(&self, value_type: ValueType) -> Vec<CriterionOperator> {
        operators_for(value_type)
    }

    /// Sorted public paths.
    fn get_paths(&self) -> Vec<String> {
        self.catalog().public_paths()
    }

    fn register_path(&self, path: &str, value_type: ValueType, public: bool) {
        self.catalog().register(path, value_type, public);
    }
}

/// Validate a leaf against a handler: known path, legal operator, value
/// coerced to the path's type when it is a time.
pub fn check_leaf<H: TypeHandler + ?Sized>(handler: &H, leaf: &Leaf) -> Result<Leaf> {
    let formatted = handler.format_path(&leaf.path);
    let path = Path::parse(&formatted)?;
    let value_type = handler.path_type(&path)?;

    if leaf.value.is_null() {
        if !leaf.operator.is_equality() {
            return Err(DataProviderError::UnsupportedOperator {
                operator: leaf.operator.to_string(),
                context: "null values".into(),
            });
        }
        return Ok(Leaf::new(formatted, leaf.operator, Value::Null));
    }

    if !handler.get_operator_by_datatype(value_type).contains(&leaf.operator) {
        return Err(DataProviderError::UnsupportedOperator {
            operator: leaf.operator.to_string(),
            context: format!("{} path '{}'", value_type, formatted),
        });
    }

    let value = match value_type {
        ValueType::Time => leaf.value.clone().cast(ValueType::Time)?,
        _ => leaf.value.clone(),
    };
    Ok(Leaf::new(formatted, leaf.operator, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operators_for_text() {
        let ops = operators_for(ValueType::Text);
        assert!(ops.contains(&CriterionOperator::SubstrNocase));
        assert!(!ops.contains(&CriterionOperator::Lower));
    }

    #[test]
    fn test_operators_for_int() {
        let ops = operators_for(ValueType::Int);
        assert!(ops.contains(&CriterionOperator::GreaterOrEqual));
        assert!(!ops.contains(&CriterionOperator::Regex));
    }

    #[test]
    fn test_time_field_primary() {
        let tf = TimeField::Interval {
            start: "start_time".into(),
            end: "end_time".into(),
        };
        assert_eq!(tf.primary(), "start_time");
        assert!(tf.is_interval());
    }
}
