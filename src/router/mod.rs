//! Query routing across domains.
//!
//! [`DataProviderManager`] owns the registry of type handlers and backends,
//! one of each per domain. Every call resolves the domain (explicitly or from
//! the path prefixes), normalizes paths and criteria through the handler, and
//! delegates to the backend. Value hooks see data flowing both ways.

mod hooks;
mod results;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, debug_span, info, warn};

pub use hooks::ValueHook;
pub use results::{ResultObject, RowSequence};

use hooks::HookChain;

use crate::backend::relational::SqlBackend;
use crate::backend::search::SearchBackend;
use crate::backend::{Backend, GetQuery, ValueQuery};
use crate::config::Settings;
use crate::criterion::Criterion;
use crate::domain::{GenericHandler, IdmefHandler, LogHandler, TypeHandler};
use crate::error::{DataProviderError, Result};
use crate::selection::{Path, SelectionObject, SortOrder};
use crate::value::Value;

const BACKEND_PLACEHOLDER: &str = "{backend}";

/// Domain implied by a path or selection text: the part before the first
/// dot, after any function call opening.
fn implied_domain(text: &str) -> Option<&str> {
    let (head, _) = text.split_once('.')?;
    let prefix = head.rsplit('(').next().unwrap_or(head).trim();
    if prefix.is_empty() || prefix == BACKEND_PLACEHOLDER {
        None
    } else {
        Some(prefix)
    }
}

/// Path handed to the read hooks for a result column.
fn column_name(selection: &SelectionObject) -> String {
    match selection.path() {
        Some(path) => path.to_string(),
        None => selection.raw.clone(),
    }
}

fn parse_order(order_by: &str) -> Result<SortOrder> {
    match order_by {
        "time_asc" => Ok(SortOrder::Asc),
        "time_desc" => Ok(SortOrder::Desc),
        other => Err(DataProviderError::invalid_parameter(
            "order_by",
            format!("'{}' is not one of time_asc, time_desc", other),
        )),
    }
}

/// A compiled value query and what the results need to be read back.
struct Prepared {
    handler: Arc<dyn TypeHandler>,
    backend: Arc<dyn Backend>,
    query: ValueQuery,
    columns: Vec<String>,
}

/// Registry of domains and entry point of every data access.
#[derive(Default)]
pub struct DataProviderManager {
    handlers: BTreeMap<String, Arc<dyn TypeHandler>>,
    backends: BTreeMap<String, Arc<dyn Backend>>,
    hooks: HookChain,
    default_domain: Option<String>,
}

impl std::fmt::Debug for DataProviderManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataProviderManager")
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .field(
                "backends",
                &self.backends.iter().map(|(d, b)| (d, b.kind())).collect::<Vec<_>>(),
            )
            .field("hooks", &self.hooks.len())
            .field("default_domain", &self.default_domain)
            .finish()
    }
}

impl DataProviderManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the built-in and configured domains with their backends.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        settings.validate()?;

        let mut manager = Self::new();
        manager.register_handler(Arc::new(IdmefHandler::alert()));
        manager.register_handler(Arc::new(IdmefHandler::heartbeat()));
        manager.register_handler(Arc::new(LogHandler::new()));
        for (name, domain) in &settings.domains {
            manager.register_handler(Arc::new(GenericHandler::from_settings(name, domain)?));
        }

        for (domain, relational) in &settings.relational {
            manager.register_backend(domain, Arc::new(SqlBackend::from_settings(relational)?))?;
        }
        for (domain, search) in &settings.search {
            manager.register_backend(domain, Arc::new(SearchBackend::from_settings(domain, search)?))?;
        }

        manager.default_domain = settings.default_domain.clone();
        Ok(manager)
    }

    /// Register or replace the handler of a domain.
    pub fn register_handler(&mut self, handler: Arc<dyn TypeHandler>) {
        debug!(domain = handler.name(), "registering type handler");
        self.handlers.insert(handler.name().to_string(), handler);
    }

    /// Attach a backend to a domain and publish the paths it discovered.
    ///
    /// A backend for a domain without a handler is skipped with a warning.
    pub fn register_backend(&mut self, domain: &str, backend: Arc<dyn Backend>) -> Result<()> {
        let Some(handler) = self.handlers.get(domain) else {
            warn!(domain, kind = backend.kind(), "no type handler for domain, backend ignored");
            return Ok(());
        };
        if self.backends.contains_key(domain) {
            return Err(DataProviderError::DuplicateBackend(domain.to_string()));
        }

        for (path, value_type) in backend.extra_paths() {
            handler.register_path(&path, value_type, true);
        }
        debug!(domain, kind = backend.kind(), "registering backend");
        self.backends.insert(domain.to_string(), backend);
        Ok(())
    }

    pub fn register_hook(&mut self, hook: Arc<dyn ValueHook>) {
        self.hooks.push(hook);
    }

    pub fn set_default_domain(&mut self, domain: impl Into<String>) {
        self.default_domain = Some(domain.into());
    }

    /// Whether the domain can be queried.
    pub fn has_domain(&self, domain: &str) -> bool {
        self.backends.contains_key(domain)
    }

    pub fn handler(&self, domain: &str) -> Option<&Arc<dyn TypeHandler>> {
        self.handlers.get(domain)
    }

    /// Domains with a backend, sorted.
    pub fn domains(&self) -> Vec<&str> {
        self.backends.keys().map(String::as_str).collect()
    }

    /// Public paths of a domain.
    pub fn get_paths(&self, domain: &str) -> Result<Vec<String>> {
        self.handlers
            .get(domain)
            .map(|h| h.get_paths())
            .ok_or_else(|| DataProviderError::UnknownDomain(domain.to_string()))
    }

    /// The single domain implied by `paths` and the criteria paths.
    ///
    /// Falls back to the default domain when nothing is implied.
    pub fn guess_domain<'a>(&self, paths: impl IntoIterator<Item = &'a str>, criteria: &Criterion) -> Result<String> {
        let criteria_paths = criteria.get_paths();
        let mut domains: BTreeSet<&str> = paths.into_iter().filter_map(implied_domain).collect();
        domains.extend(criteria_paths.iter().filter_map(|p| implied_domain(p)));

        let mut domains = domains.into_iter();
        match (domains.next(), domains.next()) {
            (Some(domain), None) => Ok(domain.to_string()),
            (None, _) => self.default_domain.clone().ok_or_else(|| {
                DataProviderError::invalid_parameter("domain", "no domain given and none implied by the paths")
            }),
            (Some(first), Some(second)) => {
                let mut all = vec![first.to_string(), second.to_string()];
                all.extend(domains.map(str::to_string));
                Err(DataProviderError::AmbiguousDomain(all))
            }
        }
    }

    fn resolve<'a>(
        &self,
        explicit: Option<&str>,
        paths: impl IntoIterator<Item = &'a str>,
        criteria: &Criterion,
    ) -> Result<String> {
        match explicit {
            Some(domain) => Ok(domain.to_string()),
            None => self.guess_domain(paths, criteria),
        }
    }

    fn pair(&self, domain: &str) -> Result<(Arc<dyn TypeHandler>, Arc<dyn Backend>)> {
        let handler = self
            .handlers
            .get(domain)
            .ok_or_else(|| DataProviderError::UnknownDomain(domain.to_string()))?;
        let backend = self
            .backends
            .get(domain)
            .ok_or_else(|| DataProviderError::NoBackend(domain.to_string()))?;
        Ok((handler.clone(), backend.clone()))
    }

    /// Run the criteria hooks, the write hooks on criterion values, then compile.
    fn compile_criteria(&self, domain: &str, handler: &dyn TypeHandler, criteria: Criterion) -> Result<Criterion> {
        let criteria = self.hooks.on_criteria(domain, criteria)?;
        self.hooks.write_criteria(&criteria)?.compile(handler)
    }

    fn prepare(
        &self,
        paths: &[&str],
        criteria: Option<Criterion>,
        distinct: bool,
        limit: i64,
        offset: i64,
        domain: Option<&str>,
    ) -> Result<Prepared> {
        let criteria = criteria.unwrap_or_default();
        let domain = self.resolve(domain, paths.iter().copied(), &criteria)?;
        let (handler, backend) = self.pair(&domain)?;

        let criteria = self.compile_criteria(&domain, handler.as_ref(), criteria)?;
        let (selections, types) = handler.parse_paths(paths)?;
        let columns = selections.iter().map(column_name).collect();
        let query = ValueQuery::new(selections, types)
            .with_criteria(criteria)
            .with_distinct(distinct)
            .with_limit(limit, offset);

        Ok(Prepared {
            handler,
            backend,
            query,
            columns,
        })
    }

    /// Select `paths`, filtered by `criteria`. A negative `limit` means unlimited.
    pub fn query(
        &self,
        paths: &[&str],
        criteria: Option<Criterion>,
        distinct: bool,
        limit: i64,
        offset: i64,
        domain: Option<&str>,
    ) -> Result<RowSequence> {
        let span = debug_span!("query", domain = domain.unwrap_or("?"), paths = paths.len());
        let _enter = span.enter();
        let started = Instant::now();

        let prepared = self.prepare(paths, criteria, distinct, limit, offset, domain)?;
        let raw = prepared.backend.execute(prepared.handler.as_ref(), &prepared.query)?;

        let duration = started.elapsed();
        debug!(rows = raw.rows.len(), ?duration, "query done");
        Ok(RowSequence::new(
            prepared.columns,
            prepared.query.types,
            raw.rows,
            raw.total,
            duration,
            self.hooks.clone(),
        ))
    }

    /// The native query `query` would run with the same arguments.
    pub fn explain(
        &self,
        paths: &[&str],
        criteria: Option<Criterion>,
        distinct: bool,
        limit: i64,
        offset: i64,
        domain: Option<&str>,
    ) -> Result<String> {
        let prepared = self.prepare(paths, criteria, distinct, limit, offset, domain)?;
        prepared.backend.explain(prepared.handler.as_ref(), &prepared.query)
    }

    /// Whole objects ordered by time. `order_by` is `time_asc` or `time_desc`.
    pub fn get(
        &self,
        criteria: Option<Criterion>,
        order_by: &str,
        limit: i64,
        offset: i64,
        domain: Option<&str>,
    ) -> Result<Vec<ResultObject>> {
        let order = parse_order(order_by)?;
        let criteria = criteria.unwrap_or_default();
        let domain = self.resolve(domain, [], &criteria)?;
        let (handler, backend) = self.pair(&domain)?;

        let query = GetQuery {
            criteria: self.compile_criteria(&domain, handler.as_ref(), criteria)?,
            order,
            limit,
            offset,
        };
        let records = backend.get(handler.as_ref(), &query)?;
        Ok(records
            .into_iter()
            .map(|record| ResultObject::new(record, self.hooks.clone()))
            .collect())
    }

    /// Validate data paths against the domain and run the write hooks on the values.
    fn normalize_data(&self, handler: &dyn TypeHandler, data: &[(&str, Value)]) -> Result<Vec<(Path, Value)>> {
        let mut out = Vec::with_capacity(data.len());
        for (text, value) in data {
            let path = Path::parse(&handler.format_path(text))?;
            let value_type = handler.path_type(&path)?;
            let mut value = value.clone().cast(value_type)?;
            self.hooks.on_write(&path.to_string(), &mut value)?;
            out.push((path, value));
        }
        Ok(out)
    }

    /// Store one object. Criteria select the existing parent rows to attach it to.
    pub fn insert(
        &self,
        data: &[(&str, Value)],
        criteria: Option<Criterion>,
        domain: Option<&str>,
    ) -> Result<Option<Value>> {
        let criteria = criteria.unwrap_or_default();
        let domain = self.resolve(domain, data.iter().map(|(p, _)| *p), &criteria)?;
        let (handler, backend) = self.pair(&domain)?;

        let data = self.normalize_data(handler.as_ref(), data)?;
        let criteria = self.compile_criteria(&domain, handler.as_ref(), criteria)?;
        backend.insert(handler.as_ref(), &data, &criteria)
    }

    pub fn update(&self, data: &[(&str, Value)], criteria: Option<Criterion>, domain: Option<&str>) -> Result<()> {
        let criteria = criteria.unwrap_or_default();
        let domain = self.resolve(domain, data.iter().map(|(p, _)| *p), &criteria)?;
        let (handler, backend) = self.pair(&domain)?;

        let data = self.normalize_data(handler.as_ref(), data)?;
        let criteria = self.compile_criteria(&domain, handler.as_ref(), criteria)?;
        info!(domain = %domain, fields = data.len(), "update");
        backend.update(handler.as_ref(), &data, &criteria)
    }

    /// Delete the objects matching `criteria`. `paths` narrow the deletion to
    /// the tables holding them.
    pub fn delete(&self, criteria: Option<Criterion>, paths: &[&str], domain: Option<&str>) -> Result<()> {
        let criteria = criteria.unwrap_or_default();
        let domain = self.resolve(domain, paths.iter().copied(), &criteria)?;
        let (handler, backend) = self.pair(&domain)?;

        let (selections, _) = handler.parse_paths(paths)?;
        let criteria = self.compile_criteria(&domain, handler.as_ref(), criteria)?;
        backend.delete(handler.as_ref(), &criteria, &selections)
    }
}
