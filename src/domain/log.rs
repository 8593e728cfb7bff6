use crate::criterion::{Criterion, CriterionOperator, Leaf};
use crate::error::{DataProviderError, Result};
use crate::value::ValueType;

use super::{check_leaf, PathCatalog, TimeField, TypeHandler};

/// Path holding a raw engine query string rather than a field comparison.
pub const RAW_QUERY_PATH: &str = "log._raw_query";

const LOG_PATHS: &[(&str, ValueType)] = &[
    ("log.timestamp", ValueType::Time),
    ("log.message", ValueType::Text),
    ("log.raw_message", ValueType::Text),
    ("log.host", ValueType::Text),
    ("log.program", ValueType::Text),
];

/// Syslog-style log records.
#[derive(Debug)]
pub struct LogHandler {
    catalog: PathCatalog,
    time_field: TimeField,
}

impl LogHandler {
    pub fn new() -> Self {
        let catalog = PathCatalog::with_paths(LOG_PATHS.iter().copied());
        catalog.register(RAW_QUERY_PATH, ValueType::Text, false);
        Self {
            catalog,
            time_field: TimeField::Instant("timestamp".into()),
        }
    }
}

impl Default for LogHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeHandler for LogHandler {
    fn name(&self) -> &str {
        "log"
    }

    fn catalog(&self) -> &PathCatalog {
        &self.catalog
    }

    fn time_field(&self) -> &TimeField {
        &self.time_field
    }

    fn compile_criterion(&self, leaf: &Leaf) -> Result<Criterion> {
        if leaf.path == RAW_QUERY_PATH {
            if leaf.operator != CriterionOperator::Equal {
                return Err(DataProviderError::UnsupportedOperator {
                    operator: leaf.operator.to_string(),
                    context: RAW_QUERY_PATH.into(),
                });
            }
            return Ok(Criterion::Leaf(leaf.clone()));
        }
        check_leaf(self, leaf).map(Criterion::Leaf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_raw_query_is_private() {
        let handler = LogHandler::new();
        assert!(!handler.get_paths().contains(&RAW_QUERY_PATH.to_string()));
        let c = handler
            .compile_criterion(&Leaf::new(RAW_QUERY_PATH, CriterionOperator::Equal, "host:web*"))
            .unwrap();
        assert_eq!(c, Criterion::new(RAW_QUERY_PATH, CriterionOperator::Equal, "host:web*"));
    }

    #[test]
    fn test_time_value_coerced() {
        let handler = LogHandler::new();
        let c = handler
            .compile_criterion(&Leaf::new("log.timestamp", CriterionOperator::Greater, "2020-01-01"))
            .unwrap();
        match c {
            Criterion::Leaf(leaf) => assert!(matches!(leaf.value, Value::Time(_))),
            other => panic!("unexpected {:?}", other),
        }
    }
}
