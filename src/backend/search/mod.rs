//! Search-engine backend speaking the Elasticsearch JSON query DSL.

pub mod mapping;
pub mod query;
pub mod result;
pub mod transport;

use std::sync::Arc;

use serde_json::{json, Value as Json};
use tracing::debug;

pub use mapping::{FieldMap, IndexMapping, TimeFormat};
pub use query::{FinalOrder, QueryCompiler, SearchRequest, Slot};
pub use transport::{HttpTransport, Method, Response, Transport};

use crate::backend::{Backend, GetQuery, RawResults, Record, ValueQuery};
use crate::config::SearchSettings;
use crate::domain::TypeHandler;
use crate::error::Result;
use crate::selection::SortOrder;
use crate::value::ValueType;

use query::MAX_RESULT_WINDOW;

/// Search backend serving one domain.
pub struct SearchBackend {
    map: FieldMap,
    transport: Arc<dyn Transport>,
    extra_paths: Vec<(String, ValueType)>,
}

impl std::fmt::Debug for SearchBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchBackend")
            .field("domain", &self.map.domain())
            .field("extra_paths", &self.extra_paths)
            .finish_non_exhaustive()
    }
}

impl SearchBackend {
    /// Connect through `transport`, reading the index mapping to type the
    /// configured fields. Fails when the index is unreachable or missing.
    pub fn new(domain: &str, settings: &SearchSettings, transport: Arc<dyn Transport>) -> Result<Self> {
        let mut map = FieldMap::new(domain, settings)?;
        let response = transport.send(Method::Get, "", None)?;
        let index = mapping::parse_index_mapping(&transport::check_response(response, false)?)?;
        let extra_paths = map.register_mapping(&index);

        Ok(Self {
            map,
            transport,
            extra_paths,
        })
    }

    pub fn from_settings(domain: &str, settings: &SearchSettings) -> Result<Self> {
        let transport = HttpTransport::from_settings(settings)?;
        Self::new(domain, settings, Arc::new(transport))
    }

    pub fn field_map(&self) -> &FieldMap {
        &self.map
    }

    fn compile(&self, query: &ValueQuery) -> Result<SearchRequest> {
        QueryCompiler::new(&self.map).compile(query)
    }

    fn search(&self, body: &Json) -> Result<Json> {
        debug!(body = %body, "search body");
        let response = self.transport.send(Method::Post, "/_search", Some(body))?;
        transport::check_response(response, true)
    }
}

impl Backend for SearchBackend {
    fn kind(&self) -> &'static str {
        "search"
    }

    fn extra_paths(&self) -> Vec<(String, ValueType)> {
        self.extra_paths.clone()
    }

    fn explain(&self, _handler: &dyn TypeHandler, query: &ValueQuery) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.compile(query)?.body)?)
    }

    fn execute(&self, _handler: &dyn TypeHandler, query: &ValueQuery) -> Result<RawResults> {
        let request = self.compile(query)?;
        let body = self.search(&request.body)?;

        if request.aggregated {
            Ok(RawResults {
                rows: result::aggregation_rows(&request, query.selections.len(), &body),
                total: None,
            })
        } else {
            Ok(RawResults {
                rows: result::document_rows(&self.map, &query.selections, &body)?,
                total: result::hits_total(&body),
            })
        }
    }

    fn get(&self, _handler: &dyn TypeHandler, query: &GetQuery) -> Result<Vec<Record>> {
        let criteria_only = ValueQuery::new(Vec::new(), Vec::new()).with_criteria(query.criteria.clone());
        let filter = self.compile(&criteria_only)?.body["query"].take();

        let order = match query.order {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        };
        let body = json!({
            "query": filter,
            "size": usize::try_from(query.limit).unwrap_or(MAX_RESULT_WINDOW),
            "from": usize::try_from(query.offset).unwrap_or(0),
            "sort": [{ self.map.to_es("timestamp"): order }],
        });
        Ok(result::documents(&self.map, &self.search(&body)?))
    }
}
