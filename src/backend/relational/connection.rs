//! Execution layer for generated SQL.
//!
//! The backend only produces SQL text; a [`SqlConnection`] runs it. The
//! bundled driver is SQLite through `rusqlite`. Embedding applications can
//! supply their own connection for MySQL or PostgreSQL.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::types::ValueRef;
use rusqlite::Connection;

use crate::error::{DataProviderError, Result};
use crate::value::Value;

/// Statement execution within one session or transaction.
pub trait SqlSession {
    fn query(&self, sql: &str) -> Result<Vec<Vec<Value>>>;

    /// Run a statement, returning the number of affected rows.
    fn execute(&self, sql: &str) -> Result<usize>;

    /// Identifier generated by the last insert.
    fn last_insert_id(&self) -> Result<Value>;
}

/// A shareable database handle.
pub trait SqlConnection: Send + Sync {
    fn query(&self, sql: &str) -> Result<Vec<Vec<Value>>>;

    fn execute(&self, sql: &str) -> Result<usize>;

    /// Run `body` inside one transaction. It commits when `body` succeeds
    /// and rolls back otherwise.
    fn transaction(
        &self,
        body: &mut dyn FnMut(&dyn SqlSession) -> Result<Option<Value>>,
    ) -> Result<Option<Value>>;
}

struct SqliteSession<'a>(&'a Connection);

fn to_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(n) => Value::Int(n),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
    }
}

impl SqlSession for SqliteSession<'_> {
    fn query(&self, sql: &str) -> Result<Vec<Vec<Value>>> {
        let mut stmt = self.0.prepare(sql)?;
        let columns = stmt.column_count();
        let mut rows = stmt.query([])?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(columns);
            for i in 0..columns {
                values.push(to_value(row.get_ref(i)?));
            }
            out.push(values);
        }
        Ok(out)
    }

    fn execute(&self, sql: &str) -> Result<usize> {
        Ok(self.0.execute(sql, [])?)
    }

    fn last_insert_id(&self) -> Result<Value> {
        Ok(Value::Int(self.0.last_insert_rowid()))
    }
}

/// SQLite database guarded by a mutex.
pub struct SqliteConnection {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection").finish_non_exhaustive()
    }
}

impl SqliteConnection {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(Connection::open(path)?),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        })
    }

    /// Run several `;`-separated statements, e.g. a schema script.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        Ok(self.lock()?.execute_batch(sql)?)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| DataProviderError::BackendRequest("SQLite connection lock poisoned".into()))
    }
}

impl SqlConnection for SqliteConnection {
    fn query(&self, sql: &str) -> Result<Vec<Vec<Value>>> {
        let conn = self.lock()?;
        SqliteSession(&conn).query(sql)
    }

    fn execute(&self, sql: &str) -> Result<usize> {
        let conn = self.lock()?;
        SqliteSession(&conn).execute(sql)
    }

    fn transaction(
        &self,
        body: &mut dyn FnMut(&dyn SqlSession) -> Result<Option<Value>>,
    ) -> Result<Option<Value>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let result = body(&SqliteSession(&tx))?;
        tx.commit()?;
        Ok(result)
    }
}
