//! Typed cell values and the coercions applied to backend results.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{DataProviderError, Result};

/// Type attached to a domain path or to an output column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Text,
    Int,
    Float,
    Time,
    Duration,
    Opaque,
}

impl ValueType {
    pub fn name(&self) -> &'static str {
        match self {
            ValueType::Text => "text",
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Time => "time",
            ValueType::Duration => "duration",
            ValueType::Opaque => "opaque",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "text" | "string" | "str" => Some(ValueType::Text),
            "int" | "integer" => Some(ValueType::Int),
            "float" => Some(ValueType::Float),
            "time" | "datetime" => Some(ValueType::Time),
            "duration" => Some(ValueType::Duration),
            "opaque" => Some(ValueType::Opaque),
            _ => None,
        }
    }

    pub fn is_textual(&self) -> bool {
        matches!(self, ValueType::Text)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ValueType::Int | ValueType::Float | ValueType::Duration)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single value flowing through criteria, results and writes.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Time(NaiveDateTime),
}

const TIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Parse the textual time representations accepted in criteria and results.
pub fn parse_time(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    for format in TIME_FORMATS {
        if let Ok(t) = NaiveDateTime::parse_from_str(text, format) {
            return Some(t);
        }
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(text) {
        return Some(t.naive_utc());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn from_epoch(seconds: f64) -> Option<NaiveDateTime> {
    let secs = seconds.floor();
    let nanos = ((seconds - secs) * 1e9).round() as u32;
    DateTime::from_timestamp(secs as i64, nanos.min(999_999_999)).map(|t| t.naive_utc())
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Null or the empty string.
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Float(f) => Some(*f as i64),
            Value::Bool(b) => Some(*b as i64),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Time(t) => Some(*t),
            Value::Text(s) => parse_time(s),
            _ => None,
        }
    }

    /// Convert a search-engine JSON scalar.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
            },
            serde_json::Value::String(s) => Value::Text(s.clone()),
            other => Value::Text(other.to_string()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(n) => serde_json::Value::from(*n),
            Value::Float(f) => serde_json::Value::from(*f),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Time(t) => serde_json::Value::String(t.format("%Y-%m-%dT%H:%M:%S").to_string()),
        }
    }

    fn conversion_error(&self, target: ValueType) -> DataProviderError {
        DataProviderError::Conversion {
            value: self.to_string(),
            target: target.to_string(),
        }
    }

    /// Coerce this value to a column type. Null stays null for every type.
    pub fn cast(self, target: ValueType) -> Result<Value> {
        if self.is_null() {
            return Ok(Value::Null);
        }
        match target {
            ValueType::Opaque => Ok(self),
            ValueType::Text => Ok(match self {
                Value::Text(s) => Value::Text(s),
                other => Value::Text(other.to_string()),
            }),
            ValueType::Int => match &self {
                Value::Int(_) => Ok(self),
                Value::Float(f) => Ok(Value::Int(f.trunc() as i64)),
                Value::Bool(b) => Ok(Value::Int(*b as i64)),
                Value::Text(s) => s
                    .trim()
                    .parse::<i64>()
                    .ok()
                    .or_else(|| s.trim().parse::<f64>().ok().map(|f| f.trunc() as i64))
                    .map(Value::Int)
                    .ok_or_else(|| self.conversion_error(target)),
                _ => Err(self.conversion_error(target)),
            },
            ValueType::Float | ValueType::Duration => match &self {
                Value::Float(_) => Ok(self),
                Value::Int(n) => Ok(Value::Float(*n as f64)),
                Value::Text(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| self.conversion_error(target)),
                _ => Err(self.conversion_error(target)),
            },
            ValueType::Time => match &self {
                Value::Time(_) => Ok(self),
                Value::Int(n) => from_epoch(*n as f64)
                    .map(Value::Time)
                    .ok_or_else(|| self.conversion_error(target)),
                Value::Float(f) => from_epoch(*f)
                    .map(Value::Time)
                    .ok_or_else(|| self.conversion_error(target)),
                Value::Text(s) if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) => s
                    .parse::<i64>()
                    .ok()
                    .and_then(|n| from_epoch(n as f64))
                    .map(Value::Time)
                    .ok_or_else(|| self.conversion_error(target)),
                Value::Text(s) => parse_time(s)
                    .map(Value::Time)
                    .ok_or_else(|| self.conversion_error(target)),
                _ => Err(self.conversion_error(target)),
            },
        }
    }

    /// Total ordering used for in-memory sorts: nulls first, numbers numerically,
    /// then booleans, times and text.
    pub fn loose_cmp(&self, other: &Value) -> Ordering {
        fn rank(v: &Value) -> u8 {
            match v {
                Value::Null => 0,
                Value::Bool(_) => 1,
                Value::Int(_) | Value::Float(_) => 2,
                Value::Time(_) => 3,
                Value::Text(_) => 4,
            }
        }

        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                let a = self.as_f64().unwrap_or_default();
                let b = other.as_f64().unwrap_or_default();
                a.partial_cmp(&b).unwrap_or(Ordering::Equal)
            }
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Time(a), Value::Time(b)) => a.cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            _ => rank(self).cmp(&rank(other)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => {
                let mut buffer = ryu::Buffer::new();
                f.write_str(buffer.format(*x))
            }
            Value::Text(s) => f.write_str(s),
            Value::Time(t) => write!(f, "{}", t.format("%Y-%m-%d %H:%M:%S%.f")),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(t: NaiveDateTime) -> Self {
        Value::Time(t)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn time(s: &str) -> NaiveDateTime {
        parse_time(s).unwrap()
    }

    #[test]
    fn test_cast_int() {
        assert_eq!(Value::from("42").cast(ValueType::Int).unwrap(), Value::Int(42));
        assert_eq!(Value::Float(3.9).cast(ValueType::Int).unwrap(), Value::Int(3));
        assert_eq!(Value::Bool(true).cast(ValueType::Int).unwrap(), Value::Int(1));
        assert!(Value::from("abc").cast(ValueType::Int).is_err());
    }

    #[test]
    fn test_cast_time() {
        assert_eq!(
            Value::Int(0).cast(ValueType::Time).unwrap(),
            Value::Time(time("1970-01-01 00:00:00"))
        );
        assert_eq!(
            Value::from("86400").cast(ValueType::Time).unwrap(),
            Value::Time(time("1970-01-02 00:00:00"))
        );
        assert_eq!(
            Value::from("2020-01-04T10:11:12Z").cast(ValueType::Time).unwrap(),
            Value::Time(time("2020-01-04 10:11:12"))
        );
        assert!(Value::from("yesterday").cast(ValueType::Time).is_err());
    }

    #[test]
    fn test_cast_null_is_preserved() {
        for ty in [ValueType::Int, ValueType::Time, ValueType::Text] {
            assert_eq!(Value::Null.cast(ty).unwrap(), Value::Null);
        }
    }

    #[test]
    fn test_cast_text_renders() {
        assert_eq!(
            Value::Time(time("2020-01-01")).cast(ValueType::Text).unwrap(),
            Value::from("2020-01-01 00:00:00")
        );
        assert_eq!(Value::Float(1.5).cast(ValueType::Text).unwrap(), Value::from("1.5"));
    }

    #[test]
    fn test_loose_cmp() {
        assert_eq!(Value::Int(2).loose_cmp(&Value::Float(2.5)), Ordering::Less);
        assert_eq!(Value::Null.loose_cmp(&Value::Int(0)), Ordering::Less);
        assert_eq!(Value::from("b").loose_cmp(&Value::from("a")), Ordering::Greater);
    }
}
