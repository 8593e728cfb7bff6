//! Engine responses back into rows.
//!
//! Aggregated responses are walked bucket by bucket into one row per leaf
//! bucket. The engine orders and truncates per bucket, so rows are sorted
//! again in memory and truncated afterwards. With high-cardinality groups
//! this is a top-N approximation, not a global ordering.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDateTime, Timelike};
use serde_json::Value as Json;

use crate::backend::Record;
use crate::error::Result;
use crate::selection::{Extract, Function, SelectionObject, SelectionValue, SortOrder};
use crate::value::{parse_time, Value};

use super::mapping::{parse_timezone, FieldMap};
use super::query::{SearchRequest, Slot};

/// Total hit count, in either the legacy number or the `{"value": n}` form.
pub fn hits_total(body: &Json) -> Option<u64> {
    let total = body.pointer("/hits/total")?;
    total.as_u64().or_else(|| total.get("value").and_then(Json::as_u64))
}

fn bucket_key(bucket: &Json) -> Value {
    bucket
        .get("key_as_string")
        .or_else(|| bucket.get("key"))
        .map(Value::from_json)
        .unwrap_or_default()
}

fn doc_count(bucket: &Json) -> i64 {
    bucket.get("doc_count").and_then(Json::as_i64).unwrap_or(0)
}

fn metric_values(aggs: &Json, metrics: usize) -> impl Iterator<Item = Value> + '_ {
    (0..metrics).map(move |k| {
        aggs.get(format!("metric_{}", k))
            .and_then(|m| m.get("value"))
            .map(Value::from_json)
            .unwrap_or_default()
    })
}

/// Walk `group_{depth}` buckets, emitting `keys.., metrics.., doc_count` per leaf.
fn walk_buckets(aggs: &Json, depth: usize, request: &SearchRequest, keys: &mut Vec<Value>, out: &mut Vec<Vec<Value>>) {
    let Some(buckets) = aggs
        .get(format!("group_{}", depth))
        .and_then(|g| g.get("buckets"))
        .and_then(Json::as_array)
    else {
        return;
    };

    for bucket in buckets {
        keys.push(bucket_key(bucket));
        if depth + 1 < request.depth {
            walk_buckets(bucket, depth + 1, request, keys, out);
        } else {
            let count = doc_count(bucket);
            // Calendar-unit keys such as months repeat across years; their counts add up.
            let repeated = (request.metrics == 0)
                .then(|| out.iter_mut().find(|row| row[..keys.len()] == keys[..]))
                .flatten();
            match repeated {
                Some(row) => {
                    if let Some(Value::Int(total)) = row.last_mut() {
                        *total += count;
                    }
                }
                None => {
                    let mut row = keys.clone();
                    row.extend(metric_values(bucket, request.metrics));
                    row.push(Value::Int(count));
                    out.push(row);
                }
            }
        }
        keys.pop();
    }
}

/// Stable multi-key sort by the requested directions, first key most significant.
pub fn sort_rows(rows: &mut [Vec<Value>], keys: &[(usize, SortOrder)]) {
    for &(column, order) in keys.iter().rev() {
        rows.sort_by(|a, b| {
            let ordering = a[column].loose_cmp(&b[column]);
            match order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });
    }
}

/// Rows of an aggregated response in selection order, sorted and paginated.
pub fn aggregation_rows(request: &SearchRequest, selections: usize, body: &Json) -> Vec<Vec<Value>> {
    let mut raw = Vec::new();
    match body.get("aggregations") {
        Some(aggs) if request.depth > 0 => walk_buckets(aggs, 0, request, &mut Vec::new(), &mut raw),
        aggs => {
            let mut row: Vec<Value> = match aggs {
                Some(aggs) => metric_values(aggs, request.metrics).collect(),
                None => vec![Value::Null; request.metrics],
            };
            row.push(hits_total(body).map(|t| Value::Int(t as i64)).unwrap_or(Value::Int(0)));
            raw.push(row);
        }
    }

    let position = |slot: Slot| match slot {
        Slot::Group(depth) => depth,
        Slot::Metric(k) => request.depth + k,
        Slot::DocCount => request.depth + request.metrics,
    };
    let mut rows: Vec<Vec<Value>> = raw
        .into_iter()
        .map(|raw| {
            (0..selections)
                .map(|i| {
                    request
                        .final_order
                        .iter()
                        .find(|o| o.selection == i)
                        .and_then(|o| raw.get(position(o.slot)).cloned())
                        .unwrap_or_default()
                })
                .collect()
        })
        .collect();

    let keys: Vec<(usize, SortOrder)> = request
        .final_order
        .iter()
        .filter_map(|o| o.order.map(|order| (o.selection, order)))
        .collect();
    sort_rows(&mut rows, &keys);

    rows.into_iter().skip(request.offset).take(request.limit).collect()
}

/// Value at a dotted field, through nested objects or as a literal dotted key.
pub fn subfield<'a>(document: &'a Json, field: &str) -> Option<&'a Json> {
    let mut current = document;
    for part in field.split('.') {
        match current.get(part) {
            Some(next) => current = next,
            None => return document.get(field),
        }
    }
    Some(current)
}

/// Parse an engine time value into local time of `tz`.
pub fn parse_engine_time(value: &Json, tz: FixedOffset) -> Option<NaiveDateTime> {
    let from_epoch = |secs: i64| DateTime::from_timestamp(secs, 0).map(|t| t.with_timezone(&tz).naive_local());
    match value {
        Json::Number(n) => from_epoch(n.as_i64()?),
        Json::String(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => from_epoch(s.parse().ok()?),
        Json::String(s) => match DateTime::parse_from_rfc3339(s) {
            Ok(t) => Some(t.with_timezone(&tz).naive_local()),
            Err(_) => parse_time(s),
        },
        _ => None,
    }
}

/// Calendar component of `time`. Weekdays count from Monday = 0.
pub fn extract_from(time: NaiveDateTime, extract: Extract) -> i64 {
    match extract {
        Extract::Year => i64::from(time.year()),
        Extract::Quarter => i64::from(time.month0() / 3 + 1),
        Extract::Month => i64::from(time.month()),
        Extract::Yday => i64::from(time.ordinal()),
        Extract::Mday => i64::from(time.day()),
        Extract::Wday => i64::from(time.weekday().num_days_from_monday()),
        Extract::Hour => i64::from(time.hour()),
        Extract::Min => i64::from(time.minute()),
        Extract::Sec => i64::from(time.second()),
        Extract::Msec => i64::from(time.nanosecond() / 1_000_000),
        Extract::Usec => i64::from(time.nanosecond() / 1_000),
    }
}

fn time_value(map: &FieldMap, selection: &SelectionObject, raw: &Json) -> Result<Value> {
    let Some(mut time) = parse_engine_time(raw, map.timezone()) else {
        return Ok(Value::Null);
    };

    if selection.function() == Some(Function::Timezone) {
        if let Some(SelectionValue::Constant(Value::Text(zone))) = selection.function_args().get(1) {
            let target = parse_timezone(zone)?;
            time = map.localize(time)?.with_timezone(&target).naive_local();
        }
    }

    Ok(match selection.extract {
        Some(extract) => Value::Int(extract_from(time, extract)),
        None => Value::Time(time),
    })
}

/// `Mon DD HH:MM:SS host program message`, for records stored without their raw line.
fn rebuild_raw_message(map: &FieldMap, document: &Json) -> Value {
    let Some(time) = subfield(document, &map.to_es("timestamp")).and_then(|t| parse_engine_time(t, map.timezone()))
    else {
        return Value::Null;
    };
    let part = |field: &str| {
        subfield(document, &map.to_es(field))
            .map(|v| Value::from_json(v).to_string())
            .unwrap_or_default()
    };
    Value::Text(format!(
        "{} {} {} {}",
        time.format("%b %d %H:%M:%S"),
        part("host"),
        part("program"),
        part("message")
    ))
}

/// The hit as one document: `_source` merged over the hit's own fields.
fn hit_document(hit: &Json) -> Json {
    let mut document = hit.clone();
    if let Some(object) = document.as_object_mut() {
        if let Some(Json::Object(source)) = object.remove("_source") {
            object.extend(source);
        }
    }
    document
}

fn hits(body: &Json) -> &[Json] {
    body.pointer("/hits/hits")
        .and_then(Json::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Rows of a plain document response, one column per selection.
pub fn document_rows(map: &FieldMap, selections: &[SelectionObject], body: &Json) -> Result<Vec<Vec<Value>>> {
    let mut rows = Vec::new();
    for hit in hits(body) {
        let document = hit_document(hit);
        let mut row = Vec::with_capacity(selections.len());
        for selection in selections {
            let Some(path) = selection.path() else {
                row.push(Value::Null);
                continue;
            };
            let field = path.field();
            let raw = subfield(&document, &map.to_es(&field));

            let value = match raw {
                Some(raw) if map.is_time_field(&field) => time_value(map, selection, raw)?,
                Some(raw) => Value::from_json(raw),
                None if field == "raw_message" => rebuild_raw_message(map, &document),
                None => Value::Null,
            };
            row.push(value);
        }
        rows.push(row);
    }
    Ok(rows)
}

fn flatten_source(map: &FieldMap, prefix: &str, value: &Json, record: &mut Record) {
    match value {
        Json::Object(fields) => {
            for (key, child) in fields {
                let dotted = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten_source(map, &dotted, child, record);
            }
        }
        leaf => {
            let field = map.to_archive(prefix);
            let value = if map.is_time_field(&field) {
                parse_engine_time(leaf, map.timezone())
                    .map(Value::Time)
                    .unwrap_or_else(|| Value::from_json(leaf))
            } else {
                Value::from_json(leaf)
            };
            record.insert(format!("{}.{}", map.domain(), field), value);
        }
    }
}

/// Whole `_source` documents as records keyed by domain path.
pub fn documents(map: &FieldMap, body: &Json) -> Vec<Record> {
    hits(body)
        .iter()
        .map(|hit| {
            let mut record = Record::new();
            if let Some(source) = hit.get("_source") {
                flatten_source(map, "", source, &mut record);
            }
            record
        })
        .collect()
}
