//! Static description of a relational store: tables, join keys and the
//! mapping from domain paths to columns.

use std::collections::HashMap;

use crate::config::{split_column, RelationalSettings};
use crate::error::{DataProviderError, Result};
use crate::selection::{Path, PathIndex};

use super::graph::JoinGraph;

/// A `table.column` reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Column {
    pub table: String,
    pub column: String,
}

impl Column {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }

    pub fn parse(spec: &str) -> Result<Self> {
        let (table, column) = split_column(spec)?;
        Ok(Self::new(table, column))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub name: String,
    pub primary_key: Vec<String>,
}

/// Join key between two tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub from: Column,
    pub to: Column,
}

/// Extra join condition selecting one element of a repeated table.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexFilter {
    pub column: Column,
    pub index: PathIndex,
}

/// Tables, relations and path mapping of one relational domain.
///
/// Built once at start-up and shared by every query.
#[derive(Debug)]
pub struct Schema {
    tables: Vec<Table>,
    default_table: String,
    paths: HashMap<String, Column>,
    reverse_paths: HashMap<Column, String>,
    string_indexes: HashMap<String, String>,
    position_indexes: HashMap<String, String>,
    graph: JoinGraph,
}

/// Fluent builder for [`Schema`].
#[derive(Debug, Default)]
#[must_use = "builders have no effect until built"]
pub struct SchemaBuilder {
    tables: Vec<Table>,
    default_table: Option<String>,
    relations: Vec<(String, String)>,
    paths: Vec<(String, String)>,
    string_indexes: Vec<(String, String)>,
    position_indexes: Vec<(String, String)>,
}

impl SchemaBuilder {
    pub fn table(mut self, name: &str, primary_key: &[&str]) -> Self {
        self.tables.push(Table {
            name: name.into(),
            primary_key: primary_key.iter().map(|c| c.to_string()).collect(),
        });
        self
    }

    pub fn default_table(mut self, name: &str) -> Self {
        self.default_table = Some(name.into());
        self
    }

    /// Join key, both ends written `table.column`.
    pub fn relation(mut self, from: &str, to: &str) -> Self {
        self.relations.push((from.into(), to.into()));
        self
    }

    /// Map a domain path to `table.column`.
    pub fn path(mut self, path: &str, column: &str) -> Self {
        self.paths.push((path.into(), column.into()));
        self
    }

    pub fn string_index(mut self, prefix: &str, path: &str) -> Self {
        self.string_indexes.push((prefix.into(), path.into()));
        self
    }

    pub fn position_index(mut self, prefix: &str, path: &str) -> Self {
        self.position_indexes.push((prefix.into(), path.into()));
        self
    }

    pub fn build(self) -> Result<Schema> {
        let default_table = match self.default_table {
            Some(name) => name,
            None => self
                .tables
                .first()
                .map(|t| t.name.clone())
                .ok_or_else(|| DataProviderError::invalid_parameter("tables", "no table declared"))?,
        };

        let declared = |table: &str| self.tables.iter().any(|t| t.name == table);
        let check = |column: &Column| -> Result<()> {
            if declared(&column.table) {
                Ok(())
            } else {
                Err(DataProviderError::invalid_parameter(
                    "tables",
                    format!("table '{}' is not declared", column.table),
                ))
            }
        };

        if !declared(&default_table) {
            return Err(DataProviderError::invalid_parameter(
                "default_table",
                format!("table '{}' is not declared", default_table),
            ));
        }

        let mut relations = Vec::with_capacity(self.relations.len());
        for (from, to) in &self.relations {
            let relation = Relation {
                from: Column::parse(from)?,
                to: Column::parse(to)?,
            };
            check(&relation.from)?;
            check(&relation.to)?;
            relations.push(relation);
        }

        let mut paths = HashMap::with_capacity(self.paths.len());
        let mut reverse_paths = HashMap::with_capacity(self.paths.len());
        for (path, spec) in self.paths {
            let column = Column::parse(&spec)?;
            check(&column)?;
            reverse_paths.entry(column.clone()).or_insert_with(|| path.clone());
            paths.insert(path, column);
        }

        // A join column with no path of its own is reachable through the
        // path of the column it joins to.
        for relation in &relations {
            for (own, other) in [(&relation.to, &relation.from), (&relation.from, &relation.to)] {
                if !reverse_paths.contains_key(own) {
                    if let Some(path) = reverse_paths.get(other).cloned() {
                        reverse_paths.insert(own.clone(), path);
                    }
                }
            }
        }

        for (_, target) in self.string_indexes.iter().chain(&self.position_indexes) {
            if !paths.contains_key(target) {
                return Err(DataProviderError::InvalidPath(target.clone()));
            }
        }

        let graph = JoinGraph::new(&self.tables, &relations);

        Ok(Schema {
            tables: self.tables,
            default_table,
            paths,
            reverse_paths,
            string_indexes: self.string_indexes.into_iter().collect(),
            position_indexes: self.position_indexes.into_iter().collect(),
            graph,
        })
    }
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    pub fn from_settings(settings: &RelationalSettings) -> Result<Self> {
        let mut builder = Schema::builder().default_table(&settings.default_table);
        for table in &settings.tables {
            let pk: Vec<&str> = table.primary_key.iter().map(String::as_str).collect();
            builder = builder.table(&table.name, &pk);
        }
        for relation in &settings.relations {
            builder = builder.relation(&relation.from, &relation.to);
        }
        for (path, column) in &settings.paths {
            builder = builder.path(path, column);
        }
        for (prefix, path) in &settings.string_indexes {
            builder = builder.string_index(prefix, path);
        }
        for (prefix, path) in &settings.position_indexes {
            builder = builder.position_index(prefix, path);
        }
        builder.build()
    }

    /// Tables in declaration order.
    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn table_position(&self, name: &str) -> usize {
        self.tables.iter().position(|t| t.name == name).unwrap_or(usize::MAX)
    }

    pub fn default_table(&self) -> &str {
        &self.default_table
    }

    pub fn graph(&self) -> &JoinGraph {
        &self.graph
    }

    /// Every mapped path with its column.
    pub fn paths(&self) -> impl Iterator<Item = (&String, &Column)> {
        self.paths.iter()
    }

    /// Column holding a path, ignoring its indexes.
    pub fn column(&self, path: &Path) -> Result<&Column> {
        self.column_for(&path.unindexed())
    }

    pub fn column_for(&self, unindexed: &str) -> Result<&Column> {
        self.paths
            .get(unindexed)
            .ok_or_else(|| DataProviderError::InvalidPath(unindexed.to_string()))
    }

    /// Path whose column is `table.column`, following join keys.
    pub fn path_of(&self, table: &str, column: &str) -> Option<&str> {
        self.reverse_paths
            .get(&Column::new(table, column))
            .map(String::as_str)
    }

    /// Join filters implied by a path's indexes, keyed by the table they apply to.
    pub fn index_filters(&self, path: &Path) -> Result<Vec<IndexFilter>> {
        let mut filters = Vec::new();
        for (position, index) in path.indexes() {
            let prefix = path.prefix(position + 1);
            let table = match index {
                PathIndex::Key(_) => &self.string_indexes,
                PathIndex::Position(n) if *n < 0 => {
                    return Err(DataProviderError::Unsupported(format!(
                        "negative index in '{}' is not supported by the SQL backend",
                        path
                    )))
                }
                PathIndex::Position(_) => &self.position_indexes,
            };
            match table.get(&prefix) {
                Some(target) => filters.push(IndexFilter {
                    column: self.column_for(target)?.clone(),
                    index: index.clone(),
                }),
                None => {
                    return Err(DataProviderError::Unsupported(format!(
                        "'{}' cannot be indexed in the SQL backend",
                        prefix
                    )))
                }
            }
        }
        Ok(filters)
    }
}
