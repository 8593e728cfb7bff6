//! TOML-based configuration for the dataprovider.
//!
//! Supports a config file (dataprovider.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! default_domain = "alert"
//!
//! [relational.alert]
//! dialect = "sqlite"
//! database = "${ALERT_DB}"
//! default_table = "alert"
//!
//! [[relational.alert.tables]]
//! name = "alert"
//! primary_key = ["id"]
//!
//! [[relational.alert.tables]]
//! name = "source"
//! primary_key = ["id"]
//!
//! [[relational.alert.relations]]
//! from = "alert.id"
//! to = "source.alert_id"
//!
//! [relational.alert.paths]
//! "alert.messageid" = "alert.messageid"
//! "alert.source.node.name" = "source.node_name"
//!
//! [search.log]
//! url = "http://localhost:9200/logs-*"
//! user = "${ES_USER}"
//! password = "${ES_PASS}"
//! time_format = "@"
//!
//! [search.log.fields]
//! host = "hostname, hostname.keyword"
//! ```

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::format::{Item, StrftimeItems};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::sql::Dialect;

static FIELD_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\w[\w\-]*$").expect("valid regex"));

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Unsupported dialect: {0}")]
    UnsupportedDialect(String),

    #[error("Invalid field name: {0}")]
    InvalidFieldName(String),

    #[error("Invalid time format: {0}")]
    InvalidTimeFormat(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Domain used when the caller gives none and none can be guessed.
    pub default_domain: Option<String>,

    /// Relational backends, keyed by the domain they serve.
    pub relational: BTreeMap<String, RelationalSettings>,

    /// Search-engine backends, keyed by the domain they serve.
    pub search: BTreeMap<String, SearchSettings>,

    /// Generic domains beyond the built-in ones.
    pub domains: BTreeMap<String, DomainSettings>,
}

/// A relational backend: connection, tables, join keys and the path mapping.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelationalSettings {
    #[serde(default = "default_dialect")]
    pub dialect: String,

    /// Database path or connection string (supports ${ENV_VAR} expansion).
    pub database: String,

    /// Base table used when no selection names a path (e.g. `count(1)`).
    pub default_table: String,

    /// Rewrite substring values into `LIKE` patterns.
    #[serde(default = "default_true")]
    pub handle_wildcards: bool,

    /// Tables in insertion order.
    pub tables: Vec<TableSettings>,

    #[serde(default)]
    pub relations: Vec<RelationSettings>,

    /// Domain path to `table.column`.
    pub paths: BTreeMap<String, String>,

    /// Repeated element prefix to the path filtered by a `("key")` index.
    #[serde(default)]
    pub string_indexes: BTreeMap<String, String>,

    /// Repeated element prefix to the path holding its `(n)` position.
    #[serde(default)]
    pub position_indexes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TableSettings {
    pub name: String,
    #[serde(default)]
    pub primary_key: Vec<String>,
}

/// Join key between two tables, written `table.column`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelationSettings {
    pub from: String,
    pub to: String,
}

/// A search-engine backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchSettings {
    /// Index URL, e.g. `http://localhost:9200/logs-*`.
    pub url: String,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Unset for ISO-8601, `@` for epoch seconds, otherwise a strftime format.
    #[serde(default)]
    pub time_format: Option<String>,

    /// Zone naive datetimes are read in: `UTC` or a fixed offset such as `+02:00`.
    #[serde(default = "default_timezone")]
    pub timezone: String,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// `field = "es_field[, keyword_field]"`.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

/// A generic domain: its paths and its time field.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DomainSettings {
    pub time_field: Option<String>,
    pub time_interval: Vec<String>,
    /// Path to type name (`text`, `int`, `float`, `time`, `duration`, `opaque`).
    pub paths: BTreeMap<String, String>,
}

fn default_dialect() -> String {
    "sqlite".to_string()
}

fn default_true() -> bool {
    true
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_timeout() -> u64 {
    30
}

/// Split `table.column`.
pub fn split_column(spec: &str) -> Result<(&str, &str), SettingsError> {
    match spec.split_once('.') {
        Some((table, column)) if !table.is_empty() && !column.is_empty() => Ok((table, column)),
        _ => Err(SettingsError::InvalidConfig(format!(
            "expected 'table.column', got '{}'",
            spec
        ))),
    }
}

impl RelationalSettings {
    pub fn dialect_type(&self) -> Result<Dialect, SettingsError> {
        self.dialect
            .parse()
            .map_err(|_| SettingsError::UnsupportedDialect(self.dialect.clone()))
    }

    /// Get the database with environment variables expanded.
    pub fn resolved_database(&self) -> Result<String, SettingsError> {
        expand_env_vars(&self.database)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        self.dialect_type()?;

        let declared = |table: &str| self.tables.iter().any(|t| t.name == table);
        if !declared(&self.default_table) {
            return Err(SettingsError::InvalidConfig(format!(
                "default table '{}' is not declared",
                self.default_table
            )));
        }

        for relation in &self.relations {
            for end in [&relation.from, &relation.to] {
                let (table, _) = split_column(end)?;
                if !declared(table) {
                    return Err(SettingsError::InvalidConfig(format!(
                        "relation endpoint '{}' refers to an undeclared table",
                        end
                    )));
                }
            }
        }

        for (path, column) in &self.paths {
            let (table, _) = split_column(column)?;
            if !declared(table) {
                return Err(SettingsError::InvalidConfig(format!(
                    "path '{}' maps to undeclared table '{}'",
                    path, table
                )));
            }
        }

        for target in self.string_indexes.values().chain(self.position_indexes.values()) {
            if !self.paths.contains_key(target) {
                return Err(SettingsError::InvalidConfig(format!(
                    "index path '{}' is not mapped to a column",
                    target
                )));
            }
        }

        Ok(())
    }
}

impl SearchSettings {
    pub fn resolved_url(&self) -> Result<String, SettingsError> {
        expand_env_vars(&self.url)
    }

    /// Credentials with environment variables expanded, if a user is set.
    pub fn resolved_credentials(&self) -> Result<Option<(String, Option<String>)>, SettingsError> {
        let Some(user) = &self.user else {
            return Ok(None);
        };
        let password = self.password.as_deref().map(expand_env_vars).transpose()?;
        Ok(Some((expand_env_vars(user)?, password)))
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        for (field, target) in &self.fields {
            if !FIELD_NAME.is_match(field) {
                return Err(SettingsError::InvalidFieldName(field.clone()));
            }
            if target.split(',').any(|part| part.trim().is_empty()) {
                return Err(SettingsError::InvalidFieldName(target.clone()));
            }
        }

        if let Some(format) = self.time_format.as_deref().filter(|f| *f != "@") {
            if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
                return Err(SettingsError::InvalidTimeFormat(format.to_string()));
            }
        }

        Ok(())
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `DATAPROVIDER_CONFIG`
    /// 2. `./dataprovider.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("DATAPROVIDER_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("dataprovider.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        Ok(Settings::default())
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        for relational in self.relational.values() {
            relational.validate()?;
        }
        for search in self.search.values() {
            search.validate()?;
        }
        for (name, domain) in &self.domains {
            if !matches!((&domain.time_field, domain.time_interval.len()), (Some(_), 0) | (None, 2)) {
                return Err(SettingsError::InvalidConfig(format!(
                    "domain '{}' must declare either time_field or a two-entry time_interval",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let braced = chars.peek() == Some(&'{');
        if braced {
            chars.next();
        }

        let mut var_name = String::new();
        while let Some(&ch) = chars.peek() {
            if braced && ch == '}' {
                chars.next();
                break;
            }
            if !braced && !(ch.is_alphanumeric() || ch == '_') {
                break;
            }
            var_name.push(ch);
            chars.next();
        }

        if var_name.is_empty() && !braced {
            // Just a lone $, keep it
            result.push('$');
            continue;
        }

        let value = env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
default_domain = "alert"

[relational.alert]
dialect = "pgsql"
database = "postgres://localhost/prelude"
default_table = "alert"

[[relational.alert.tables]]
name = "alert"
primary_key = ["id"]

[[relational.alert.tables]]
name = "source"
primary_key = ["id"]

[[relational.alert.relations]]
from = "alert.id"
to = "source.alert_id"

[relational.alert.paths]
"alert.messageid" = "alert.messageid"
"alert.source.node.name" = "source.node_name"

[search.log]
url = "http://localhost:9200/logs-*"
time_format = "@"

[search.log.fields]
host = "hostname, hostname.keyword"

[domains.session]
time_interval = ["start_time", "end_time"]

[domains.session.paths]
"session.user" = "text"
"session.start_time" = "time"
"session.end_time" = "time"
"#;

    #[test]
    fn test_parse_toml() {
        let settings = Settings::from_toml(SAMPLE).unwrap();

        assert_eq!(settings.default_domain.as_deref(), Some("alert"));
        let alert = &settings.relational["alert"];
        assert_eq!(alert.dialect_type().unwrap(), Dialect::Postgres);
        assert!(alert.handle_wildcards);
        assert_eq!(alert.tables.len(), 2);

        let log = &settings.search["log"];
        assert_eq!(log.timezone, "UTC");
        assert_eq!(log.timeout_secs, 30);
        assert_eq!(settings.domains["session"].time_interval.len(), 2);
    }

    #[test]
    fn test_undeclared_relation_table() {
        let broken = SAMPLE.replace("to = \"source.alert_id\"", "to = \"target.alert_id\"");
        let err = Settings::from_toml(&broken).unwrap_err();
        assert!(matches!(err, SettingsError::InvalidConfig(_)), "{}", err);
    }

    #[test]
    fn test_bad_field_name() {
        let broken = SAMPLE.replace("host = ", "\"-host\" = ");
        assert!(matches!(
            Settings::from_toml(&broken).unwrap_err(),
            SettingsError::InvalidFieldName(_)
        ));
    }

    #[test]
    fn test_bad_time_format() {
        let broken = SAMPLE.replace("time_format = \"@\"", "time_format = \"%Y-%!\"");
        assert!(matches!(
            Settings::from_toml(&broken).unwrap_err(),
            SettingsError::InvalidTimeFormat(_)
        ));
    }

    #[test]
    fn test_bad_dialect() {
        let broken = SAMPLE.replace("dialect = \"pgsql\"", "dialect = \"oracle\"");
        assert!(matches!(
            Settings::from_toml(&broken).unwrap_err(),
            SettingsError::UnsupportedDialect(_)
        ));
    }

    #[test]
    fn test_expand_env_vars() {
        env::set_var("DATAPROVIDER_TEST_VAR", "hello");
        assert_eq!(expand_env_vars("${DATAPROVIDER_TEST_VAR}").unwrap(), "hello");
        assert_eq!(expand_env_vars("x_$DATAPROVIDER_TEST_VAR!").unwrap(), "x_hello!");
        assert_eq!(expand_env_vars("cost: 5$").unwrap(), "cost: 5$");
        env::remove_var("DATAPROVIDER_TEST_VAR");

        assert!(expand_env_vars("${DATAPROVIDER_MISSING_12345}").is_err());
    }
}
