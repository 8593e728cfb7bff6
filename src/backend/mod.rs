//! Backend adapters: compile normalized queries for one storage technology.
//!
//! Every adapter receives selections and criteria already parsed and compiled
//! by the domain's [`TypeHandler`], and returns raw rows in selection order.
//! Casting and value hooks are applied by the router.

pub mod relational;
pub mod search;

use std::collections::BTreeMap;

use crate::criterion::Criterion;
use crate::domain::TypeHandler;
use crate::error::{DataProviderError, Result};
use crate::selection::{Path, SelectionObject, SortOrder};
use crate::value::{Value, ValueType};

/// One stored object, keyed by domain path.
pub type Record = BTreeMap<String, Value>;

/// A normalized value query.
#[derive(Debug, Clone)]
pub struct ValueQuery {
    pub selections: Vec<SelectionObject>,
    /// Column types, parallel to `selections`.
    pub types: Vec<ValueType>,
    /// Criteria compiled by the domain handler.
    pub criteria: Criterion,
    pub distinct: bool,
    /// Negative means unlimited.
    pub limit: i64,
    pub offset: i64,
}

impl ValueQuery {
    pub fn new(selections: Vec<SelectionObject>, types: Vec<ValueType>) -> Self {
        Self {
            selections,
            types,
            criteria: Criterion::Empty,
            distinct: false,
            limit: -1,
            offset: 0,
        }
    }

    pub fn with_criteria(mut self, criteria: Criterion) -> Self {
        self.criteria = criteria;
        self
    }

    pub fn with_limit(mut self, limit: i64, offset: i64) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    pub fn with_distinct(mut self, distinct: bool) -> Self {
        self.distinct = distinct;
        self
    }
}

/// Rows as returned by a backend, before casting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawResults {
    pub rows: Vec<Vec<Value>>,
    /// Total matches reported by the engine, when it knows more than it returned.
    pub total: Option<u64>,
}

/// A whole-object read ordered by the domain's time field.
#[derive(Debug, Clone)]
pub struct GetQuery {
    pub criteria: Criterion,
    pub order: SortOrder,
    pub limit: i64,
    pub offset: i64,
}

/// Storage adapter for one domain.
pub trait Backend: Send + Sync {
    /// Short engine name used in logs and errors.
    fn kind(&self) -> &'static str;

    /// Paths discovered by the backend at start-up, registered on the domain.
    fn extra_paths(&self) -> Vec<(String, ValueType)> {
        Vec::new()
    }

    /// The native query that `execute` would run.
    fn explain(&self, handler: &dyn TypeHandler, query: &ValueQuery) -> Result<String>;

    fn execute(&self, handler: &dyn TypeHandler, query: &ValueQuery) -> Result<RawResults>;

    fn get(&self, handler: &dyn TypeHandler, query: &GetQuery) -> Result<Vec<Record>>;

    /// Insert one object. Returns its identifier when the engine assigns one.
    fn insert(
        &self,
        _handler: &dyn TypeHandler,
        _data: &[(Path, Value)],
        _criteria: &Criterion,
    ) -> Result<Option<Value>> {
        Err(unsupported(self.kind(), "insert"))
    }

    fn update(&self, _handler: &dyn TypeHandler, _data: &[(Path, Value)], _criteria: &Criterion) -> Result<()> {
        Err(unsupported(self.kind(), "update"))
    }

    fn delete(&self, _handler: &dyn TypeHandler, _criteria: &Criterion, _paths: &[SelectionObject]) -> Result<()> {
        Err(unsupported(self.kind(), "delete"))
    }
}

pub(crate) fn unsupported(kind: &str, operation: &str) -> DataProviderError {
    DataProviderError::Unsupported(format!("{} is not supported by the {} backend", operation, kind))
}
