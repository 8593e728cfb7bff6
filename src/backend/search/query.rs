//! Compiles a value query into a search request body.
//!
//! Criteria become a `bool` filter. `group_by` selections become nested
//! bucket aggregations (`group_0` outermost), aggregate functions become
//! metrics (`metric_0..`) under the innermost bucket, and `final_order`
//! records where each requested column sits in a flattened bucket row.

use serde_json::{json, Map, Value as Json};

use crate::backend::ValueQuery;
use crate::criterion::{Criterion, CriterionOperator, Leaf};
use crate::error::{DataProviderError, Result};
use crate::selection::{Extract, Function, Path, SelectionObject, SelectionValue, SortOrder};
use crate::value::Value;

use super::mapping::FieldMap;

/// Engine default for `index.max_result_window`.
pub const MAX_RESULT_WINDOW: usize = 10000;

const RAW_QUERY_FIELD: &str = "_raw_query";

/// Where a column's value sits in a flattened bucket row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Key of the bucket at this depth.
    Group(usize),
    /// Value of the n-th metric of the innermost bucket.
    Metric(usize),
    /// Document count of the innermost bucket, or the hit total without buckets.
    DocCount,
}

/// One requested column of an aggregated query.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalOrder {
    pub selection: usize,
    pub slot: Slot,
    pub order: Option<SortOrder>,
}

#[derive(Debug, Clone, PartialEq)]
enum Bucket {
    Terms { field: String },
    Histogram { field: String, interval: &'static str },
}

#[derive(Debug, Clone, PartialEq)]
struct Metric {
    kind: &'static str,
    field: String,
}

/// A compiled request and what is needed to read its response.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub body: Json,
    pub aggregated: bool,
    pub depth: usize,
    pub metrics: usize,
    pub final_order: Vec<FinalOrder>,
    pub limit: usize,
    pub offset: usize,
}

/// Native clause lists of one `bool` query.
#[derive(Debug, Default)]
struct BoolQuery {
    must: Vec<Json>,
    must_not: Vec<Json>,
    filter: Vec<Json>,
    should: Vec<Json>,
}

impl BoolQuery {
    fn is_empty(&self) -> bool {
        self.must.is_empty() && self.must_not.is_empty() && self.filter.is_empty() && self.should.is_empty()
    }

    fn into_json(self) -> Json {
        if self.is_empty() {
            return json!({"match_all": {}});
        }
        let mut body = Map::new();
        let has_should = !self.should.is_empty();
        for (name, clauses) in [
            ("must", self.must),
            ("must_not", self.must_not),
            ("filter", self.filter),
            ("should", self.should),
        ] {
            if !clauses.is_empty() {
                body.insert(name.to_string(), Json::Array(clauses));
            }
        }
        if has_should {
            body.insert("minimum_should_match".into(), json!(1));
        }
        json!({ "bool": body })
    }
}

fn range_operator(operator: CriterionOperator) -> Option<&'static str> {
    match operator {
        CriterionOperator::Lower => Some("lt"),
        CriterionOperator::LowerOrEqual => Some("lte"),
        CriterionOperator::Greater => Some("gt"),
        CriterionOperator::GreaterOrEqual => Some("gte"),
        _ => None,
    }
}

fn has_unescaped_star(value: &str) -> bool {
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

/// Calendar unit and key format of a time bucket grouped by `extract`.
fn histogram_unit(extract: Option<Extract>) -> Result<&'static str> {
    Ok(match extract {
        None => "timestamp",
        Some(Extract::Year) => "year",
        Some(Extract::Month) => "month",
        Some(Extract::Mday) => "day",
        Some(Extract::Hour) => "hour",
        Some(Extract::Min) => "minute",
        Some(Extract::Sec) => "second",
        Some(other) => {
            return Err(DataProviderError::Unsupported(format!(
                "grouping by '{}' is not supported by the search backend",
                other.name()
            )))
        }
    })
}

fn histogram_format(interval: &str) -> &'static str {
    match interval {
        "year" => "yyyy",
        "month" => "MM",
        "day" => "dd",
        "hour" => "HH",
        "minute" => "mm",
        "second" => "ss",
        _ => "yyyy-MM-dd HH:mm:ss",
    }
}

/// Operands of a chain of ORs.
fn disjuncts<'c>(criterion: &'c Criterion, out: &mut Vec<&'c Criterion>) {
    match criterion {
        Criterion::Or(a, b) => {
            disjuncts(a, out);
            disjuncts(b, out);
        }
        other => out.push(other),
    }
}

fn metric_kind(function: Function) -> Option<&'static str> {
    Some(match function {
        Function::Count => "value_count",
        Function::CountDistinct => "cardinality",
        Function::Min => "min",
        Function::Max => "max",
        Function::Avg => "avg",
        Function::Sum => "sum",
        Function::Distinct | Function::Timezone => return None,
    })
}

fn order_name(order: Option<SortOrder>, default: &'static str) -> &'static str {
    match order {
        Some(SortOrder::Asc) => "asc",
        Some(SortOrder::Desc) => "desc",
        None => default,
    }
}

/// Builder state for one request.
pub struct QueryCompiler<'a> {
    map: &'a FieldMap,
    raw_query: bool,
    exists: Vec<Json>,
}

impl<'a> QueryCompiler<'a> {
    pub fn new(map: &'a FieldMap) -> Self {
        Self {
            map,
            raw_query: false,
            exists: Vec::new(),
        }
    }

    /// Domain-relative field of a selection or criterion path.
    fn field(path: &Path) -> String {
        path.field()
    }

    pub fn compile(mut self, query: &ValueQuery) -> Result<SearchRequest> {
        let limit = usize::try_from(query.limit).unwrap_or(MAX_RESULT_WINDOW);
        let offset = usize::try_from(query.offset).unwrap_or(0);

        let mut filter = BoolQuery::default();
        self.criterion(&mut filter, &query.criteria)?;

        let (buckets, mut final_order, bucket_orders) = self.buckets(query)?;
        let mut metrics: Vec<Metric> = Vec::new();
        let mut metric_orders: Vec<(usize, SortOrder)> = Vec::new();
        let mut aggregated = !buckets.is_empty();

        for (i, selection) in query.selections.iter().enumerate() {
            if selection.is_group_by() {
                continue;
            }
            let Some(kind) = selection.function().and_then(metric_kind) else {
                continue;
            };
            aggregated = true;
            let order = selection.order();

            let field = selection.path().map(Self::field);
            let slot = match field {
                None => Slot::DocCount,
                Some(field) if kind == "value_count" && self.map.is_time_field(&field) => Slot::DocCount,
                Some(field) => {
                    let es_field = self.map.to_es_keyword(&field);
                    let exists = json!({"exists": {"field": self.map.to_es(&field)}});
                    if !self.exists.contains(&exists) {
                        self.exists.push(exists);
                    }
                    let metric = Metric { kind, field: es_field };
                    let position = match metrics.iter().position(|m| *m == metric) {
                        Some(position) => position,
                        None => {
                            metrics.push(metric);
                            metrics.len() - 1
                        }
                    };
                    if let Some(order) = order {
                        metric_orders.push((position, order));
                    }
                    Slot::Metric(position)
                }
            };
            final_order.push(FinalOrder { selection: i, slot, order });
        }
        final_order.sort_by_key(|o| o.selection);
        filter.must.append(&mut self.exists);

        let mut body = Map::new();
        body.insert("query".into(), filter.into_json());

        if aggregated {
            body.insert("size".into(), json!(0));
            body.insert("track_total_hits".into(), json!(true));
            if let Some(aggs) = self.aggregation_tree(&buckets, &bucket_orders, &metrics, &metric_orders) {
                body.insert("aggs".into(), aggs);
            }
        } else {
            body.insert("size".into(), json!(limit));
            body.insert("from".into(), json!(offset));
            let sort = self.sort(&query.selections);
            if !sort.is_empty() {
                body.insert("sort".into(), Json::Array(sort));
            }
        }

        Ok(SearchRequest {
            body: Json::Object(body),
            aggregated,
            depth: buckets.len(),
            metrics: metrics.len(),
            final_order,
            limit,
            offset,
        })
    }

    /// Bucket levels from `group_by` selections, first seen outermost.
    /// `distinct(x)` and plain paths of a distinct query group implicitly.
    #[allow(clippy::type_complexity)]
    fn buckets(&self, query: &ValueQuery) -> Result<(Vec<Bucket>, Vec<FinalOrder>, Vec<Option<SortOrder>>)> {
        let mut buckets: Vec<Bucket> = Vec::new();
        let mut orders: Vec<Option<SortOrder>> = Vec::new();
        let mut final_order = Vec::new();

        for (i, selection) in query.selections.iter().enumerate() {
            let implicit = selection.function() == Some(Function::Distinct)
                || (query.distinct && matches!(selection.object, SelectionValue::Path(_)));
            if !selection.is_group_by() && !implicit {
                continue;
            }
            let Some(path) = selection.path() else {
                continue;
            };

            let field = Self::field(path);
            let bucket = if self.map.is_time_field(&field) {
                Bucket::Histogram {
                    field: self.map.to_es(&field),
                    interval: histogram_unit(selection.extract)?,
                }
            } else {
                Bucket::Terms {
                    field: self.map.to_es_keyword(&field),
                }
            };

            let depth = match buckets.iter().position(|b| *b == bucket) {
                Some(depth) => depth,
                None => {
                    buckets.push(bucket);
                    orders.push(selection.order());
                    buckets.len() - 1
                }
            };
            final_order.push(FinalOrder {
                selection: i,
                slot: Slot::Group(depth),
                order: selection.order(),
            });
        }
        Ok((buckets, final_order, orders))
    }

    fn aggregation_tree(
        &self,
        buckets: &[Bucket],
        bucket_orders: &[Option<SortOrder>],
        metrics: &[Metric],
        metric_orders: &[(usize, SortOrder)],
    ) -> Option<Json> {
        let mut inner: Option<Map<String, Json>> = None;
        if !metrics.is_empty() {
            let mut aggs = Map::new();
            for (k, metric) in metrics.iter().enumerate() {
                aggs.insert(format!("metric_{}", k), json!({ metric.kind: {"field": metric.field} }));
            }
            inner = Some(aggs);
        }

        for (depth, bucket) in buckets.iter().enumerate().rev() {
            let innermost = depth + 1 == buckets.len();
            let mut agg = match bucket {
                Bucket::Terms { field } => {
                    let order = match metric_orders.first().filter(|_| innermost) {
                        Some((k, order)) => json!({ format!("metric_{}", k): order_name(Some(*order), "desc") }),
                        None => json!({"_count": order_name(bucket_orders[depth], "desc")}),
                    };
                    json!({"terms": {"field": field, "size": MAX_RESULT_WINDOW, "order": order}})
                }
                Bucket::Histogram { field, interval } => {
                    let mut histogram = json!({
                        "field": field,
                        "format": histogram_format(interval),
                        "time_zone": self.map.timezone_name(),
                        "min_doc_count": 0,
                        "order": {"_key": order_name(bucket_orders[depth], "asc")},
                    });
                    let key = if *interval == "timestamp" { "fixed_interval" } else { "calendar_interval" };
                    let value = if *interval == "timestamp" { "1s" } else { interval };
                    histogram[key] = json!(value);
                    json!({ "date_histogram": histogram })
                }
            };
            if let Some(children) = inner.take() {
                agg["aggs"] = Json::Object(children);
            }
            let mut level = Map::new();
            level.insert(format!("group_{}", depth), agg);
            inner = Some(level);
        }

        inner.map(Json::Object)
    }

    /// Sort clauses of a plain document query.
    fn sort(&self, selections: &[SelectionObject]) -> Vec<Json> {
        let mut sort = Vec::new();
        for selection in selections {
            let (Some(order), Some(path)) = (selection.order(), selection.path()) else {
                continue;
            };
            let field = Self::field(path);
            if field == "raw_message" {
                continue;
            }
            let clause = json!({ self.map.to_es_keyword(&field): order_name(Some(order), "asc") });
            if !sort.contains(&clause) {
                sort.push(clause);
            }
        }
        sort
    }

    fn criterion(&mut self, query: &mut BoolQuery, criterion: &Criterion) -> Result<()> {
        match criterion {
            Criterion::Empty => Ok(()),
            Criterion::Leaf(leaf) => self.leaf(query, leaf),
            Criterion::And(a, b) => {
                self.criterion(query, a)?;
                self.criterion(query, b)
            }
            Criterion::Or(..) => {
                let mut any = BoolQuery::default();
                let mut operands = Vec::new();
                disjuncts(criterion, &mut operands);
                for operand in operands {
                    let mut sub = BoolQuery::default();
                    self.criterion(&mut sub, operand)?;
                    any.should.push(sub.into_json());
                }
                query.must.push(any.into_json());
                Ok(())
            }
            Criterion::Not(inner) => {
                let mut sub = BoolQuery::default();
                self.criterion(&mut sub, inner)?;
                if !sub.is_empty() {
                    query.must_not.push(sub.into_json());
                }
                Ok(())
            }
        }
    }

    fn leaf(&mut self, query: &mut BoolQuery, leaf: &Leaf) -> Result<()> {
        let field = Self::field(&Path::parse(&leaf.path)?);
        let operator = leaf.operator;
        let unsupported = || DataProviderError::UnsupportedOperator {
            operator: operator.to_string(),
            context: format!("search field '{}'", field),
        };

        if field == RAW_QUERY_FIELD {
            if self.raw_query {
                return Err(DataProviderError::invalid_parameter(
                    &leaf.path,
                    "only one raw query can be given per request",
                ));
            }
            self.raw_query = true;
            let default_field = match self.map.to_es("default_field").as_str() {
                "default_field" => "message".to_string(),
                other => other.to_string(),
            };
            query.must.push(json!({"query_string": {
                "default_field": default_field,
                "query": leaf.value.to_string(),
                "default_operator": "AND",
                "analyze_wildcard": true,
            }}));
            return Ok(());
        }

        if leaf.value.is_null() {
            if !operator.is_equality() {
                return Err(unsupported());
            }
            let exists = json!({"exists": {"field": self.map.to_es(&field)}});
            if operator.negated() {
                query.must.push(exists);
            } else {
                query.must_not.push(exists);
            }
            return Ok(());
        }

        if self.map.is_time_field(&field) {
            return self.time_range(query, &field, leaf);
        }

        let value = match (&leaf.value, operator.case_insensitive()) {
            (Value::Text(text), true) => Value::Text(text.to_lowercase()),
            (value, _) => value.clone(),
        };
        let keyword = self.map.to_es_keyword(&field);

        let clause = match operator.positive().case_sensitive() {
            CriterionOperator::Equal => json!({"term": { keyword: value.to_json() }}),
            CriterionOperator::Substr => {
                let text = value.to_string();
                let pattern = if has_unescaped_star(&text) {
                    text
                } else {
                    format!("*{}*", text)
                };
                json!({"wildcard": { keyword: pattern }})
            }
            CriterionOperator::Regex => json!({"regexp": { keyword: value.to_string() }}),
            ordering => {
                let range = range_operator(ordering).ok_or_else(unsupported)?;
                json!({"range": { self.map.to_es(&field): { range: value.to_json() }}})
            }
        };

        if operator.negated() {
            query.must_not.push(clause);
        } else {
            query.must.push(clause);
        }
        Ok(())
    }

    /// Range filter on a time field, in UTC and in the configured format.
    fn time_range(&self, query: &mut BoolQuery, field: &str, leaf: &Leaf) -> Result<()> {
        let naive = leaf.value.as_time().ok_or_else(|| DataProviderError::Conversion {
            value: leaf.value.to_string(),
            target: "time".into(),
        })?;
        let value = self.map.time_format().format(self.map.localize(naive)?);
        let es_field = self.map.to_es(field);

        let bounds = match leaf.operator {
            CriterionOperator::Equal | CriterionOperator::NotEqual => json!({"gte": value, "lte": value}),
            operator => {
                let range = range_operator(operator).ok_or_else(|| DataProviderError::UnsupportedOperator {
                    operator: operator.to_string(),
                    context: format!("time field '{}'", field),
                })?;
                json!({ range: value })
            }
        };

        let clause = json!({"range": { es_field: bounds }});
        if leaf.operator == CriterionOperator::NotEqual {
            query.must_not.push(clause);
        } else {
            query.filter.push(clause);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchSettings;
    use crate::domain::{LogHandler, TypeHandler};

    fn map() -> FieldMap {
        let settings = SearchSettings {
            url: "http://localhost:9200/logs".into(),
            user: None,
            password: None,
            time_format: None,
            timezone: "UTC".into(),
            timeout_secs: 30,
            fields: [("host".to_string(), "hostname, hostname.raw".to_string())].into_iter().collect(),
        };
        FieldMap::new("log", &settings).unwrap()
    }

    fn compile(paths: &[&str], criteria: &str, limit: i64) -> SearchRequest {
        let handler = LogHandler::new();
        let (selections, types) = handler.parse_paths(paths).unwrap();
        let criteria = Criterion::parse(criteria).unwrap().compile(&handler).unwrap();
        let query = ValueQuery::new(selections, types)
            .with_criteria(criteria)
            .with_limit(limit, 0);
        let map = map();
        QueryCompiler::new(&map).compile(&query).unwrap()
    }

    #[test]
    fn test_plain_document_query() {
        let request = compile(&["log.host/order_desc", "log.message"], "log.host = 'web'", -1);
        assert!(!request.aggregated);
        assert_eq!(
            request.body,
            json!({
                "query": {"bool": {"must": [{"term": {"hostname.raw": "web"}}]}},
                "size": 10000,
                "from": 0,
                "sort": [{"hostname.raw": "desc"}],
            })
        );
    }

    #[test]
    fn test_operator_families() {
        let request = compile(
            &["log.message"],
            "log.message <>* 'Fail' && log.host !~ 'db[0-9]' && !log.program",
            10,
        );
        assert_eq!(
            request.body["query"],
            json!({"bool": {
                "must": [{"wildcard": {"message": "*fail*"}}],
                "must_not": [{"regexp": {"hostname.raw": "db[0-9]"}}, {"exists": {"field": "program"}}],
            }})
        );
    }

    #[test]
    fn test_or_becomes_should() {
        let request = compile(&["log.message"], "log.host = 'a' || log.host = 'b' || log.host = 'c'", 10);
        let should = &request.body["query"]["bool"]["must"][0]["bool"];
        assert_eq!(should["should"].as_array().unwrap().len(), 3);
        assert_eq!(should["minimum_should_match"], json!(1));
    }

    #[test]
    fn test_time_range_filter() {
        let request = compile(
            &["log.message"],
            "log.timestamp >= '2020-01-01 00:00:00' && log.timestamp < '2020-01-02'",
            10,
        );
        assert_eq!(
            request.body["query"]["bool"]["filter"],
            json!([
                {"range": {"timestamp": {"gte": "2020-01-01T00:00:00+00:00"}}},
                {"range": {"timestamp": {"lt": "2020-01-02T00:00:00+00:00"}}},
            ])
        );
    }

    #[test]
    fn test_single_raw_query() {
        let request = compile(&["log.message"], "log._raw_query = 'host:web*'", 10);
        assert_eq!(request.body["query"]["bool"]["must"][0]["query_string"]["query"], json!("host:web*"));

        let handler = LogHandler::new();
        let (selections, types) = handler.parse_paths(&["log.message"]).unwrap();
        let twice = Criterion::parse("log._raw_query = 'a' && log._raw_query = 'b'").unwrap();
        let query = ValueQuery::new(selections, types).with_criteria(twice);
        let map = map();
        assert!(QueryCompiler::new(&map).compile(&query).is_err());
    }

    #[test]
    fn test_nested_aggregation_tree() {
        let request = compile(
            &["log.host/group_by", "log.program/group_by", "count(log.message)/order_desc"],
            "",
            5,
        );
        assert!(request.aggregated);
        assert_eq!(request.depth, 2);
        assert_eq!(
            request.final_order,
            vec![
                FinalOrder { selection: 0, slot: Slot::Group(0), order: None },
                FinalOrder { selection: 1, slot: Slot::Group(1), order: None },
                FinalOrder { selection: 2, slot: Slot::Metric(0), order: Some(SortOrder::Desc) },
            ]
        );
        assert_eq!(
            request.body["aggs"],
            json!({"group_0": {
                "terms": {"field": "hostname.raw", "size": 10000, "order": {"_count": "desc"}},
                "aggs": {"group_1": {
                    "terms": {"field": "program", "size": 10000, "order": {"metric_0": "desc"}},
                    "aggs": {"metric_0": {"value_count": {"field": "message"}}},
                }},
            }})
        );
        assert_eq!(request.body["query"], json!({"bool": {"must": [{"exists": {"field": "message"}}]}}));
    }

    #[test]
    fn test_time_histogram_and_doc_count() {
        let request = compile(&["log.timestamp:hour/group_by", "count(1)"], "", -1);
        assert_eq!(request.final_order[1].slot, Slot::DocCount);
        let histogram = &request.body["aggs"]["group_0"]["date_histogram"];
        assert_eq!(histogram["calendar_interval"], json!("hour"));
        assert_eq!(histogram["format"], json!("HH"));
        assert!(request.body["aggs"]["group_0"].get("aggs").is_none());
    }

    #[test]
    fn test_count_without_groups() {
        let request = compile(&["count(1)"], "", -1);
        assert!(request.aggregated);
        assert!(request.body.get("aggs").is_none());
        assert_eq!(request.final_order, vec![FinalOrder { selection: 0, slot: Slot::DocCount, order: None }]);
    }
}
