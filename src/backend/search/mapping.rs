//! Field-name remapping between domain fields and index fields, plus the
//! time conventions of one index.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use serde_json::Value as Json;

use crate::config::SearchSettings;
use crate::error::{DataProviderError, Result};
use crate::value::ValueType;

/// Index field types discovered from the index mapping, keyed by dotted field name.
pub type IndexMapping = HashMap<String, String>;

/// How time values are written into range filters.
#[derive(Debug, Clone, PartialEq)]
pub enum TimeFormat {
    Iso8601,
    EpochSeconds,
    Strftime(String),
}

impl TimeFormat {
    fn from_setting(setting: Option<&str>) -> Self {
        match setting {
            None => TimeFormat::Iso8601,
            Some("@") => TimeFormat::EpochSeconds,
            Some(format) => TimeFormat::Strftime(format.to_string()),
        }
    }

    pub fn format(&self, time: DateTime<Utc>) -> Json {
        match self {
            TimeFormat::Iso8601 => Json::String(time.to_rfc3339()),
            TimeFormat::EpochSeconds => Json::from(time.timestamp()),
            TimeFormat::Strftime(format) => Json::String(time.format(format).to_string()),
        }
    }
}

/// `UTC` or a fixed offset such as `+02:00`.
pub fn parse_timezone(name: &str) -> Result<FixedOffset> {
    let invalid = || DataProviderError::invalid_parameter("timezone", format!("unknown timezone '{}'", name));
    if name.eq_ignore_ascii_case("utc") || name == "Z" {
        return FixedOffset::east_opt(0).ok_or_else(invalid);
    }
    name.parse::<FixedOffset>().map_err(|_| invalid())
}

/// Value type of an index field type.
pub fn value_type_of(es_type: &str) -> ValueType {
    match es_type {
        "date" => ValueType::Time,
        "long" | "integer" | "short" | "byte" => ValueType::Int,
        "double" | "float" | "half_float" | "scaled_float" => ValueType::Float,
        _ => ValueType::Text,
    }
}

fn default_fields(domain: &str) -> &'static [(&'static str, &'static str)] {
    match domain {
        "log" => &[("timestamp", "timestamp"), ("message", "message"), ("raw_message", "raw_message")],
        "netflow" => &[("timestamp", "@timestamp")],
        "iodef" => &[("timestamp", "@timestamp"), ("message", "_source")],
        _ => &[("timestamp", "timestamp")],
    }
}

/// Two-way field map of one index.
#[derive(Debug, Clone)]
pub struct FieldMap {
    domain: String,
    fields: BTreeMap<String, String>,
    keywords: BTreeMap<String, String>,
    reverse: HashMap<String, String>,
    configured: Vec<String>,
    time_fields: HashSet<String>,
    time_format: TimeFormat,
    timezone: FixedOffset,
    timezone_name: String,
}

impl FieldMap {
    pub fn new(domain: &str, settings: &SearchSettings) -> Result<Self> {
        settings.validate()?;

        let mut fields: BTreeMap<String, String> = default_fields(domain)
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut keywords = BTreeMap::new();
        let mut configured = Vec::new();

        for (field, target) in &settings.fields {
            let field = field.to_lowercase();
            let mut parts = target.splitn(2, ',').map(str::trim);
            if let Some(es_field) = parts.next() {
                fields.insert(field.clone(), es_field.to_string());
            }
            if let Some(keyword) = parts.next() {
                keywords.insert(field.clone(), keyword.to_string());
            }
            if !default_fields(domain).iter().any(|(k, _)| *k == field) && field != "default_field" {
                configured.push(field);
            }
        }

        let reverse = fields.iter().map(|(k, v)| (v.clone(), k.clone())).collect();
        let timezone = parse_timezone(&settings.timezone)?;

        Ok(Self {
            domain: domain.to_string(),
            fields,
            keywords,
            reverse,
            configured,
            time_fields: HashSet::from(["timestamp".to_string()]),
            time_format: TimeFormat::from_setting(settings.time_format.as_deref()),
            timezone,
            timezone_name: settings.timezone.clone(),
        })
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Index field for `field`. A `.exact` suffix selects the keyword field.
    pub fn to_es(&self, field: &str) -> String {
        if let Some(base) = field.strip_suffix(".exact") {
            return self.to_es_keyword(base);
        }
        self.fields.get(field).cloned().unwrap_or_else(|| field.to_string())
    }

    /// Keyword (not analyzed) field for `field`, falling back to [`FieldMap::to_es`].
    pub fn to_es_keyword(&self, field: &str) -> String {
        match self.keywords.get(field) {
            Some(keyword) => keyword.clone(),
            None => self.to_es(field),
        }
    }

    /// Domain field for an index field.
    pub fn to_archive(&self, es_field: &str) -> String {
        self.reverse.get(es_field).cloned().unwrap_or_else(|| es_field.to_string())
    }

    pub fn is_time_field(&self, field: &str) -> bool {
        self.time_fields.contains(field)
    }

    pub fn time_format(&self) -> &TimeFormat {
        &self.time_format
    }

    pub fn timezone(&self) -> FixedOffset {
        self.timezone
    }

    pub fn timezone_name(&self) -> &str {
        &self.timezone_name
    }

    /// Read a naive datetime in the configured timezone.
    pub fn localize(&self, time: NaiveDateTime) -> Result<DateTime<Utc>> {
        time.and_local_timezone(self.timezone)
            .single()
            .map(|t| t.with_timezone(&Utc))
            .ok_or_else(|| DataProviderError::Conversion {
                value: time.to_string(),
                target: "time".into(),
            })
    }

    /// Configured extra fields as domain paths, typed from the index mapping.
    /// Date-typed fields also become time fields of this map.
    pub fn register_mapping(&mut self, mapping: &IndexMapping) -> Vec<(String, ValueType)> {
        let mut paths = Vec::with_capacity(self.configured.len());
        for field in &self.configured {
            let value_type = self
                .fields
                .get(field)
                .and_then(|es_field| mapping.get(es_field))
                .map(|es_type| value_type_of(es_type))
                .unwrap_or(ValueType::Text);
            if value_type == ValueType::Time {
                self.time_fields.insert(field.clone());
            }
            paths.push((format!("{}.{}", self.domain, field), value_type));
        }
        paths
    }
}

fn collect_properties(properties: &serde_json::Map<String, Json>, prefix: &str, out: &mut IndexMapping) {
    for (name, definition) in properties {
        let full = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{}.{}", prefix, name)
        };
        if let Some(es_type) = definition.get("type").and_then(Json::as_str) {
            out.insert(full.clone(), es_type.to_string());
        }
        for nested in ["fields", "properties"] {
            if let Some(children) = definition.get(nested).and_then(Json::as_object) {
                collect_properties(children, &full, out);
            }
        }
    }
}

/// Flatten a `GET <index>` response into field types.
///
/// Accepts both typeless (`mappings.properties`) and typed
/// (`mappings.<type>.properties`) layouts. Several indices are merged.
pub fn parse_index_mapping(response: &Json) -> Result<IndexMapping> {
    let indices = response
        .as_object()
        .filter(|o| !o.is_empty())
        .ok_or_else(|| DataProviderError::BackendQuery("the specified index does not exist".into()))?;

    let mut mapping = IndexMapping::new();
    for index in indices.values() {
        let Some(mappings) = index.get("mappings") else {
            continue;
        };
        let properties = match mappings.get("properties") {
            Some(properties) => properties.as_object(),
            None => mappings
                .as_object()
                .and_then(|types| types.values().next())
                .and_then(|t| t.get("properties"))
                .and_then(Json::as_object),
        };
        if let Some(properties) = properties {
            collect_properties(properties, "", &mut mapping);
        }
    }
    Ok(mapping)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn settings(fields: &[(&str, &str)]) -> SearchSettings {
        SearchSettings {
            url: "http://localhost:9200/logs".into(),
            user: None,
            password: None,
            time_format: None,
            timezone: "+02:00".into(),
            timeout_secs: 30,
            fields: fields.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }

    #[test]
    fn test_field_translation() {
        let map = FieldMap::new("log", &settings(&[("host", "hostname, hostname.keyword")])).unwrap();
        assert_eq!(map.to_es("host"), "hostname");
        assert_eq!(map.to_es_keyword("host"), "hostname.keyword");
        assert_eq!(map.to_es("host.exact"), "hostname.keyword");
        assert_eq!(map.to_es("message"), "message");
        assert_eq!(map.to_es_keyword("program"), "program");
        assert_eq!(map.to_archive("hostname"), "host");
    }

    #[test]
    fn test_netflow_defaults() {
        let map = FieldMap::new("netflow", &settings(&[])).unwrap();
        assert_eq!(map.to_es("timestamp"), "@timestamp");
        assert_eq!(map.to_archive("@timestamp"), "timestamp");
    }

    #[test]
    fn test_localize_and_format() {
        let map = FieldMap::new("log", &settings(&[])).unwrap();
        let naive = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap().and_hms_opt(2, 0, 0).unwrap();
        let utc = map.localize(naive).unwrap();
        assert_eq!(TimeFormat::Iso8601.format(utc), json!("2020-01-01T00:00:00+00:00"));
        assert_eq!(TimeFormat::EpochSeconds.format(utc), json!(1577836800));
        assert_eq!(TimeFormat::Strftime("%Y/%m/%d".into()).format(utc), json!("2020/01/01"));
    }

    #[test]
    fn test_register_mapping() {
        let mut map = FieldMap::new(
            "log",
            &settings(&[("host", "hostname"), ("pid", "process.pid"), ("seen", "seen_at")]),
        )
        .unwrap();
        let mapping = parse_index_mapping(&json!({
            "logs-1": {"mappings": {"properties": {
                "hostname": {"type": "text", "fields": {"keyword": {"type": "keyword"}}},
                "process": {"properties": {"pid": {"type": "long"}}},
                "seen_at": {"type": "date"}
            }}}
        }))
        .unwrap();
        assert_eq!(mapping["hostname.keyword"], "keyword");

        let mut paths = map.register_mapping(&mapping);
        paths.sort();
        assert_eq!(
            paths,
            vec![
                ("log.host".to_string(), ValueType::Text),
                ("log.pid".to_string(), ValueType::Int),
                ("log.seen".to_string(), ValueType::Time),
            ]
        );
        assert!(map.is_time_field("seen"));
    }

    #[test]
    fn test_timezone_names() {
        assert_eq!(parse_timezone("UTC").unwrap().local_minus_utc(), 0);
        assert_eq!(parse_timezone("-05:30").unwrap().local_minus_utc(), -(5 * 3600 + 1800));
        assert!(parse_timezone("Mars/Olympus").is_err());
    }
}
