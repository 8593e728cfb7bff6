//! INSERT, UPDATE and DELETE over the mapped schema.
//!
//! Writes that touch a single table are issued directly. Writes spanning
//! several tables first read the primary keys they affect, then write each
//! table by key, all inside one transaction.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::criterion::Criterion;
use crate::error::{DataProviderError, Result};
use crate::selection::Path;
use crate::sql::{col, star, Delete, Dialect, Expr, ExprExt, Insert, Query, SelectExpr, TableSource, Update};
use crate::value::Value;

use super::builder::{value_expr, SelectBuilder};
use super::connection::{SqlConnection, SqlSession};
use super::schema::{Column, Schema, Table};

/// Shared inputs of one write.
pub(crate) struct Mutation<'a> {
    pub schema: &'a Schema,
    pub dialect: Dialect,
    pub handle_wildcards: bool,
}

/// Write values grouped per table, tables in declaration order.
fn group_by_table<'v>(schema: &Schema, data: &'v [(Path, Value)]) -> Result<Vec<(Table, Vec<(String, &'v Value)>)>> {
    let mut tables: Vec<(Table, Vec<(String, &Value)>)> = Vec::new();
    for (path, value) in data {
        let column = schema.column(path)?;
        match tables.iter_mut().find(|(t, _)| t.name == column.table) {
            Some((_, values)) => values.push((column.column.clone(), value)),
            None => {
                let table = schema
                    .table(&column.table)
                    .cloned()
                    .ok_or_else(|| DataProviderError::InvalidPath(path.to_string()))?;
                tables.push((table, vec![(column.column.clone(), value)]));
            }
        }
    }
    tables.sort_by_key(|(t, _)| schema.table_position(&t.name));
    Ok(tables)
}

fn key_expr(columns: &[String]) -> Expr {
    Expr::Tuple(columns.iter().map(|c| col(c)).collect())
}

fn row_key(dialect: Dialect, row: &[Value]) -> Expr {
    Expr::Tuple(row.iter().map(|v| value_expr(dialect, v)).collect())
}

impl Mutation<'_> {
    fn builder(&self, base: &str) -> SelectBuilder<'_> {
        SelectBuilder::new(self.schema, self.dialect, base).with_wildcards(self.handle_wildcards)
    }

    /// Compile `criteria` against `base`. Returns `None` when it needs joins.
    fn single_table_where(&self, base: &str, criteria: &Criterion) -> Result<Option<Option<Expr>>> {
        let mut probe = self.builder(base);
        probe.criteria(criteria)?;
        if !probe.is_single_table() {
            return Ok(None);
        }

        let mut builder = self.builder(base).unqualified();
        let compiled = builder.criteria(criteria)?;
        Ok(Some(builder.where_clause(compiled)))
    }

    /// SELECT of `columns` (all on `table`) from `base`, joined and filtered by `criteria`.
    fn select_columns(&self, base: &str, table: &str, columns: &[String], criteria: &Criterion) -> Result<Query> {
        let mut builder = self.builder(base);
        let mut select = Vec::with_capacity(columns.len());
        for column in columns {
            let expr = builder.column_ref(&Column::new(table, column.as_str()), &[])?;
            select.push(SelectExpr::new(expr));
        }
        let compiled = builder.criteria(criteria)?;
        Ok(builder.into_query(select, compiled))
    }

    pub fn delete(&self, connection: &dyn SqlConnection, criteria: &Criterion, paths: &[Path]) -> Result<()> {
        let base = match paths.first() {
            Some(path) => self.schema.column(path)?.table.clone(),
            None => self.schema.default_table().to_string(),
        };

        let statement = match self.single_table_where(&base, criteria)? {
            Some(where_clause) => {
                let mut delete = Delete::from(&base);
                if let Some(condition) = where_clause {
                    delete = delete.filter(condition);
                }
                delete
            }
            None => {
                let table = self
                    .schema
                    .table(&base)
                    .ok_or_else(|| DataProviderError::invalid_parameter("table", format!("table '{}' is not declared", base)))?;
                let keys = self.select_columns(&base, &base, &table.primary_key, criteria)?;
                // MySQL refuses a subquery on the target table unless it is materialized.
                let materialized = Query::new()
                    .select(vec![star()])
                    .from(TableSource::derived(keys, "dummy"));
                Delete::from(&base).filter(key_expr(&table.primary_key).in_subquery(materialized))
            }
        };

        let sql = statement.to_sql(self.dialect);
        info!(table = %base, "deleting rows");
        debug!(%sql);
        connection.execute(&sql)?;
        Ok(())
    }

    pub fn update(&self, connection: &dyn SqlConnection, data: &[(Path, Value)], criteria: &Criterion) -> Result<()> {
        let tables = group_by_table(self.schema, data)?;
        let Some((first, _)) = tables.first() else {
            return Ok(());
        };

        if tables.len() == 1 {
            if let Some(where_clause) = self.single_table_where(&first.name, criteria)? {
                let mut update = Update::table(&first.name);
                for (column, value) in &tables[0].1 {
                    update = update.set(column, value_expr(self.dialect, value));
                }
                if let Some(condition) = where_clause {
                    update = update.filter(condition);
                }

                let sql = update.to_sql(self.dialect);
                info!(table = %first.name, "updating rows");
                debug!(%sql);
                connection.execute(&sql)?;
                return Ok(());
            }
        }

        let base = first.name.clone();
        let mut reads = Vec::with_capacity(tables.len());
        for (table, _) in &tables {
            let sql = self
                .select_columns(&base, &table.name, &table.primary_key, criteria)?
                .to_sql(self.dialect);
            reads.push(sql);
        }

        connection.transaction(&mut |session| {
            for ((table, values), read) in tables.iter().zip(&reads) {
                debug!(sql = %read);
                let keys: Vec<Expr> = session
                    .query(read)?
                    .iter()
                    .filter(|row| row.iter().all(|v| !v.is_null()))
                    .map(|row| row_key(self.dialect, row))
                    .collect();
                if keys.is_empty() {
                    continue;
                }

                let mut update = Update::table(&table.name);
                for (column, value) in values {
                    update = update.set(column, value_expr(self.dialect, value));
                }
                let sql = update
                    .filter(key_expr(&table.primary_key).in_list(keys))
                    .to_sql(self.dialect);
                info!(table = %table.name, "updating rows");
                debug!(%sql);
                session.execute(&sql)?;
            }
            Ok(None)
        })?;
        Ok(())
    }

    /// Columns on other tables that `table` references through a relation,
    /// as `(own column, referenced column)`.
    fn references(&self, table: &str) -> Vec<(String, Column)> {
        let graph = self.schema.graph();
        let mut out = Vec::new();
        for neighbor in graph.neighbors(table) {
            if let Ok(keys) = graph.join_columns(table, &neighbor) {
                for (own, other) in keys {
                    out.push((own, Column::new(neighbor.as_str(), other)));
                }
            }
        }
        out
    }

    /// Key values of tables related to the written ones but not written
    /// themselves, read through `criteria`. `None` when nothing matches.
    fn parent_keys(
        &self,
        connection: &dyn SqlSession,
        written: &[&str],
        criteria: &Criterion,
    ) -> Result<Option<HashMap<Column, Value>>> {
        let mut parents: Vec<Column> = Vec::new();
        for table in written {
            for (_, referenced) in self.references(table) {
                if !written.contains(&referenced.table.as_str()) && !parents.contains(&referenced) {
                    parents.push(referenced);
                }
            }
        }

        let mut known = HashMap::new();
        if parents.is_empty() {
            return Ok(Some(known));
        }

        let base = self.schema.default_table().to_string();
        let mut builder = self.builder(&base);
        let mut select = Vec::with_capacity(parents.len());
        for column in &parents {
            select.push(SelectExpr::new(builder.column_ref(column, &[])?));
        }
        let compiled = builder.criteria(criteria)?;
        let sql = builder.into_query(select, compiled).limit(1).to_sql(self.dialect);
        debug!(%sql);

        let rows = connection.query(&sql)?;
        let Some(row) = rows.into_iter().next() else {
            return Ok(None);
        };
        for (column, value) in parents.into_iter().zip(row) {
            if !value.is_null() {
                known.insert(column, value);
            }
        }
        Ok(Some(known))
    }

    /// Insert one object. Tables are written in declaration order, foreign
    /// keys flow along relations, and generated single-column keys are read
    /// back. Returns the key of the first written table.
    pub fn insert(
        &self,
        connection: &dyn SqlConnection,
        data: &[(Path, Value)],
        criteria: &Criterion,
    ) -> Result<Option<Value>> {
        let tables = group_by_table(self.schema, data)?;
        let written: Vec<&str> = tables.iter().map(|(t, _)| t.name.as_str()).collect();

        connection.transaction(&mut |session| {
            let mut known = if criteria.is_empty() {
                HashMap::new()
            } else {
                match self.parent_keys(session, &written, criteria)? {
                    Some(known) => known,
                    None => return Ok(None),
                }
            };

            let mut first_id = None;
            for (table, values) in &tables {
                let mut row: Vec<(String, Value)> = values.iter().map(|(c, v)| (c.clone(), (*v).clone())).collect();
                for (own, referenced) in self.references(&table.name) {
                    if row.iter().any(|(c, _)| *c == own) {
                        continue;
                    }
                    if let Some(value) = known.get(&referenced) {
                        row.push((own, value.clone()));
                    }
                }

                let insert = Insert::into(&table.name)
                    .columns(row.iter().map(|(c, _)| c.as_str()))
                    .values(row.iter().map(|(_, v)| value_expr(self.dialect, v)));
                let sql = insert.to_sql(self.dialect);
                debug!(%sql);
                session.execute(&sql)?;

                for (column, value) in &row {
                    known.insert(Column::new(table.name.as_str(), column.as_str()), value.clone());
                }
                if let [pk] = table.primary_key.as_slice() {
                    let key = Column::new(table.name.as_str(), pk.as_str());
                    if !known.contains_key(&key) {
                        known.insert(key, session.last_insert_id()?);
                    }
                }

                if first_id.is_none() {
                    first_id = table
                        .primary_key
                        .first()
                        .and_then(|pk| known.get(&Column::new(table.name.as_str(), pk.as_str())))
                        .cloned();
                }
            }
            Ok(first_id)
        })
    }
}
