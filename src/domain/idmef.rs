//! IDMEF alert and heartbeat domains.

use crate::criterion::{not, or, Criterion, CriterionOperator, Leaf};
use crate::error::Result;
use crate::selection::Path;
use crate::value::{Value, ValueType};

use super::{check_leaf, PathCatalog, TimeField, TypeHandler};

use ValueType::{Int, Text, Time};

const ANALYZER: &[(&str, ValueType)] = &[
    ("analyzer.analyzerid", Text),
    ("analyzer.name", Text),
    ("analyzer.manufacturer", Text),
    ("analyzer.model", Text),
    ("analyzer.version", Text),
    ("analyzer.class", Text),
    ("analyzer.ostype", Text),
    ("analyzer.osversion", Text),
    ("analyzer.node.name", Text),
    ("analyzer.node.location", Text),
    ("analyzer.node.address.address", Text),
    ("analyzer.process.name", Text),
    ("analyzer.process.pid", Int),
];

const ADDITIONAL_DATA: &[(&str, ValueType)] = &[
    ("additional_data.meaning", Text),
    ("additional_data.type", Text),
    ("additional_data.data", Text),
];

const ENDPOINT: &[(&str, ValueType)] = &[
    ("ident", Text),
    ("spoofed", Text),
    ("interface", Text),
    ("node.ident", Text),
    ("node.category", Text),
    ("node.location", Text),
    ("node.name", Text),
    ("node.address.category", Text),
    ("node.address.address", Text),
    ("node.address.netmask", Text),
    ("node.address.vlan_name", Text),
    ("user.category", Text),
    ("user.user_id.name", Text),
    ("user.user_id.number", Int),
    ("process.name", Text),
    ("process.pid", Int),
    ("process.path", Text),
    ("service.name", Text),
    ("service.port", Int),
    ("service.iana_protocol_number", Int),
    ("service.iana_protocol_name", Text),
    ("service.protocol", Text),
];

const ALERT: &[(&str, ValueType)] = &[
    ("messageid", Text),
    ("create_time", Time),
    ("detect_time", Time),
    ("analyzer_time", Time),
    ("classification.ident", Text),
    ("classification.text", Text),
    ("classification.reference.origin", Text),
    ("classification.reference.name", Text),
    ("classification.reference.url", Text),
    ("classification.reference.meaning", Text),
    ("assessment.impact.severity", Text),
    ("assessment.impact.completion", Text),
    ("assessment.impact.type", Text),
    ("assessment.impact.description", Text),
    ("assessment.action.category", Text),
    ("assessment.action.description", Text),
    ("assessment.confidence.rating", Text),
    ("assessment.confidence.confidence", ValueType::Float),
    ("correlation_alert.name", Text),
    ("correlation_alert.alertident.alertident", Text),
    ("correlation_alert.alertident.analyzerid", Text),
    ("tool_alert.name", Text),
    ("tool_alert.command", Text),
    ("overflow_alert.program", Text),
    ("overflow_alert.size", Int),
];

const ALERT_REPEATED: &[&str] = &[
    "alert.analyzer",
    "alert.source",
    "alert.target",
    "alert.source.node.address",
    "alert.target.node.address",
    "alert.classification.reference",
    "alert.assessment.action",
    "alert.additional_data",
    "alert.correlation_alert.alertident",
];

const HEARTBEAT: &[(&str, ValueType)] = &[
    ("messageid", Text),
    ("create_time", Time),
    ("analyzer_time", Time),
    ("heartbeat_interval", Int),
];

const HEARTBEAT_REPEATED: &[&str] = &["heartbeat.analyzer", "heartbeat.additional_data"];

/// Handler for IDMEF messages (`alert` and `heartbeat`).
#[derive(Debug)]
pub struct IdmefHandler {
    name: &'static str,
    catalog: PathCatalog,
    time_field: TimeField,
}

impl IdmefHandler {
    fn build(name: &'static str, groups: &[(&str, &[(&str, ValueType)])], repeated: &[&str]) -> Self {
        let catalog = PathCatalog::new();
        for (prefix, entries) in groups {
            for (suffix, value_type) in entries.iter() {
                let path = if prefix.is_empty() {
                    format!("{}.{}", name, suffix)
                } else {
                    format!("{}.{}.{}", name, prefix, suffix)
                };
                catalog.register(&path, *value_type, true);
            }
        }
        for prefix in repeated {
            catalog.register_repeated(prefix);
        }
        Self {
            name,
            catalog,
            time_field: TimeField::Instant("create_time".into()),
        }
    }

    pub fn alert() -> Self {
        Self::build(
            "alert",
            &[
                ("", ALERT),
                ("", ANALYZER),
                ("", ADDITIONAL_DATA),
                ("source", ENDPOINT),
                ("target", ENDPOINT),
            ],
            ALERT_REPEATED,
        )
    }

    pub fn heartbeat() -> Self {
        Self::build(
            "heartbeat",
            &[("", HEARTBEAT), ("", ANALYZER), ("", ADDITIONAL_DATA)],
            HEARTBEAT_REPEATED,
        )
    }

    /// Whether the path walks through a repeated element without selecting one.
    fn crosses_unindexed_repeated(&self, path: &Path) -> bool {
        (1..path.segments.len().saturating_sub(1)).any(|i| {
            path.segments[i].index.is_none() && self.catalog.is_repeated(&path.prefix(i + 1))
        })
    }
}

/// Trim a substring value and wrap it in `*` unless it already carries an unescaped wildcard.
pub(crate) fn inject_wildcards(value: &str) -> String {
    let value = value.trim();
    if has_unescaped_wildcard(value) {
        value.to_string()
    } else {
        format!("*{}*", value)
    }
}

pub(crate) fn has_unescaped_wildcard(value: &str) -> bool {
    let mut escaped = false;
    for c in value.chars() {
        match c {
            '\\' if !escaped => escaped = true,
            '*' if !escaped => return true,
            _ => escaped = false,
        }
    }
    false
}

impl TypeHandler for IdmefHandler {
    fn name(&self) -> &str {
        self.name
    }

    fn catalog(&self) -> &PathCatalog {
        &self.catalog
    }

    fn time_field(&self) -> &TimeField {
        &self.time_field
    }

    fn compile_criterion(&self, leaf: &Leaf) -> Result<Criterion> {
        use CriterionOperator::*;

        let path_text = self.format_path(&leaf.path);
        let path = Path::parse(&path_text)?;
        let value_type = self.path_type(&path)?;

        if matches!(leaf.operator, Equal | EqualNocase) && leaf.value.is_blank() {
            let is_null = Criterion::new(path_text.as_str(), Equal, Value::Null);
            return Ok(if value_type.is_textual() {
                or(is_null, Criterion::new(path_text.as_str(), Equal, ""))
            } else {
                is_null
            });
        }

        let value = match (&leaf.value, leaf.operator.is_substring()) {
            (Value::Text(text), true) => Value::Text(inject_wildcards(text)),
            (other, _) => other.clone(),
        };
        let checked = check_leaf(self, &Leaf::new(path_text, leaf.operator, value))?;

        if checked.operator.negated() && !checked.value.is_null() && self.crosses_unindexed_repeated(&path) {
            let positive = checked.operator.positive();
            return Ok(not(Criterion::Leaf(Leaf { operator: positive, ..checked })));
        }
        Ok(Criterion::Leaf(checked))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use CriterionOperator::*;

    fn compile(handler: &IdmefHandler, text: &str) -> String {
        Criterion::parse(text).unwrap().compile(handler).unwrap().to_string()
    }

    #[test]
    fn test_empty_equality_widening() {
        let alert = IdmefHandler::alert();
        assert_eq!(
            compile(&alert, "alert.classification.text == ''"),
            "(!alert.classification.text || alert.classification.text == '')"
        );
        let c = Criterion::new("alert.source.service.port", Equal, Value::Null).compile(&alert).unwrap();
        assert_eq!(c.to_string(), "!alert.source.service.port");
    }

    #[test]
    fn test_substring_wildcards() {
        let alert = IdmefHandler::alert();
        assert_eq!(
            compile(&alert, "alert.classification.text <>* ' ssh '"),
            "alert.classification.text <>* '*ssh*'"
        );
        assert_eq!(
            compile(&alert, "alert.classification.text <> 'ssh*'"),
            "alert.classification.text <> 'ssh*'"
        );
        assert_eq!(inject_wildcards("a\\*b"), "*a\\*b*");
    }

    #[test]
    fn test_repeated_negation_guard() {
        let alert = IdmefHandler::alert();
        assert_eq!(
            compile(&alert, "alert.source.node.address.address != 10.0.0.1"),
            "!(alert.source.node.address.address == '10.0.0.1')"
        );
        assert_eq!(
            compile(&alert, "alert.source(0).node.address(0).address != 10.0.0.1"),
            "alert.source(0).node.address(0).address != '10.0.0.1'"
        );
        assert_eq!(
            compile(&alert, "alert.messageid != x"),
            "alert.messageid != 'x'"
        );
    }

    #[test]
    fn test_operator_checked_against_type() {
        let alert = IdmefHandler::alert();
        let err = Criterion::parse("alert.source.service.port <> 80")
            .unwrap()
            .compile(&alert)
            .unwrap_err();
        assert!(matches!(err, crate::error::DataProviderError::UnsupportedOperator { .. }));
    }

    #[test]
    fn test_heartbeat_paths() {
        let heartbeat = IdmefHandler::heartbeat();
        assert!(heartbeat.get_paths().contains(&"heartbeat.analyzer.name".to_string()));
        assert_eq!(heartbeat.time_field().primary(), "create_time");
    }
}
