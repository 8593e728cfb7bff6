//! Relational backend: compiles value queries to SQL over a mapped schema.
//!
//! ```text
//! ValueQuery ──▶ SelectBuilder (joins, criteria) ──▶ Query ──▶ SQL text
//!                      │                                         │
//!                      └── cte (composite time buckets)          ▼
//!                                                          SqlConnection
//! ```

pub mod builder;
pub mod connection;
pub mod cte;
pub mod graph;
pub mod mutation;
pub mod schema;

use std::sync::Arc;

use tracing::debug;

pub use connection::{SqlConnection, SqlSession, SqliteConnection};
pub use graph::JoinGraph;
pub use schema::{Column, Schema, SchemaBuilder, Table};

use crate::backend::{Backend, GetQuery, RawResults, Record, ValueQuery};
use crate::config::RelationalSettings;
use crate::criterion::Criterion;
use crate::domain::TypeHandler;
use crate::error::{DataProviderError, Result};
use crate::selection::{Path, SelectionObject, SortOrder};
use crate::sql::{Dialect, Query};
use crate::value::{Value, ValueType};

use mutation::Mutation;

/// SQL backend serving one domain.
pub struct SqlBackend {
    schema: Schema,
    dialect: Dialect,
    connection: Option<Arc<dyn SqlConnection>>,
    handle_wildcards: bool,
}

impl std::fmt::Debug for SqlBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlBackend")
            .field("dialect", &self.dialect)
            .field("default_table", &self.schema.default_table())
            .field("connected", &self.connection.is_some())
            .finish()
    }
}

impl SqlBackend {
    /// A backend that compiles SQL but has nothing to run it on.
    pub fn new(schema: Schema, dialect: Dialect) -> Self {
        Self {
            schema,
            dialect,
            connection: None,
            handle_wildcards: false,
        }
    }

    pub fn with_connection(mut self, connection: Arc<dyn SqlConnection>) -> Self {
        self.connection = Some(connection);
        self
    }

    pub fn with_wildcards(mut self, handle_wildcards: bool) -> Self {
        self.handle_wildcards = handle_wildcards;
        self
    }

    /// Build from configuration. SQLite databases are opened here; other
    /// dialects need a connection from [`SqlBackend::with_connection`].
    pub fn from_settings(settings: &RelationalSettings) -> Result<Self> {
        settings.validate()?;
        let dialect = settings.dialect_type()?;
        let schema = Schema::from_settings(settings)?;
        let mut backend = Self::new(schema, dialect).with_wildcards(settings.handle_wildcards);

        if dialect == Dialect::Sqlite {
            let database = settings.resolved_database()?;
            let connection = if database.is_empty() || database == ":memory:" {
                SqliteConnection::open_in_memory()?
            } else {
                SqliteConnection::open(&database)?
            };
            backend = backend.with_connection(Arc::new(connection));
        }
        Ok(backend)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn connection(&self) -> Result<&dyn SqlConnection> {
        self.connection.as_deref().ok_or_else(|| {
            DataProviderError::Unsupported(format!("no {} connection configured for this domain", self.dialect))
        })
    }

    fn mutation(&self) -> Mutation<'_> {
        Mutation {
            schema: &self.schema,
            dialect: self.dialect,
            handle_wildcards: self.handle_wildcards,
        }
    }

    fn compile(&self, handler: &dyn TypeHandler, query: &ValueQuery) -> Result<Query> {
        if cte::is_bucketed(query) {
            cte::build_bucketed(&self.schema, self.dialect, self.handle_wildcards, handler, query)
        } else {
            builder::build_select(&self.schema, self.dialect, self.handle_wildcards, query)
        }
    }
}

impl Backend for SqlBackend {
    fn kind(&self) -> &'static str {
        "sql"
    }

    fn explain(&self, handler: &dyn TypeHandler, query: &ValueQuery) -> Result<String> {
        Ok(self.compile(handler, query)?.to_sql(self.dialect))
    }

    fn execute(&self, handler: &dyn TypeHandler, query: &ValueQuery) -> Result<RawResults> {
        let connection = self.connection()?;
        let sql = self.explain(handler, query)?;
        debug!(%sql, "running query");
        Ok(RawResults {
            rows: connection.query(&sql)?,
            total: None,
        })
    }

    fn get(&self, handler: &dyn TypeHandler, query: &GetQuery) -> Result<Vec<Record>> {
        let time_path = format!("{}.{}", handler.name(), handler.time_field().primary());
        let default_table = self.schema.default_table();

        let mut paths: Vec<String> = self
            .schema
            .paths()
            .filter(|(_, column)| column.table == default_table)
            .map(|(path, _)| path.clone())
            .collect();
        paths.sort();
        if !paths.contains(&time_path) {
            paths.push(time_path.clone());
        }

        let order = match query.order {
            SortOrder::Asc => "order_asc",
            SortOrder::Desc => "order_desc",
        };
        let mut selections = Vec::with_capacity(paths.len());
        let mut types = Vec::with_capacity(paths.len());
        for path in &paths {
            let text = if *path == time_path {
                format!("{}/{}", path, order)
            } else {
                path.clone()
            };
            selections.push(SelectionObject::parse(&text)?);
            types.push(handler.path_type(&Path::parse(path)?).unwrap_or(ValueType::Opaque));
        }

        let value_query = ValueQuery::new(selections, types.clone())
            .with_criteria(query.criteria.clone())
            .with_limit(query.limit, query.offset);
        let results = self.execute(handler, &value_query)?;

        results
            .rows
            .into_iter()
            .map(|row| {
                paths
                    .iter()
                    .zip(&types)
                    .zip(row)
                    .map(|((path, value_type), value)| Ok((path.clone(), value.cast(*value_type)?)))
                    .collect()
            })
            .collect()
    }

    fn insert(&self, _handler: &dyn TypeHandler, data: &[(Path, Value)], criteria: &Criterion) -> Result<Option<Value>> {
        self.mutation().insert(self.connection()?, data, criteria)
    }

    fn update(&self, _handler: &dyn TypeHandler, data: &[(Path, Value)], criteria: &Criterion) -> Result<()> {
        self.mutation().update(self.connection()?, data, criteria)
    }

    fn delete(&self, _handler: &dyn TypeHandler, criteria: &Criterion, paths: &[SelectionObject]) -> Result<()> {
        let paths: Vec<Path> = paths.iter().flat_map(|s| s.paths()).cloned().collect();
        self.mutation().delete(self.connection()?, criteria, &paths)
    }
}
