//! # dataprovider
//!
//! A backend-agnostic query layer. Callers select typed paths such as
//! `alert.source.node.address.address` or `count(log.host)/group_by`, filter
//! them with boolean criteria, and get back rows typed per column, whatever
//! engine stores the domain.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │     paths + criteria text     (selection, criterion)     │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [router: domain, hooks]
//! ┌─────────────────────────────────────────────────────────┐
//! │        TypeHandler (path catalog, operator rules)        │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [ValueQuery]
//! ┌──────────────────────────┐   ┌──────────────────────────┐
//! │  relational: join graph, │   │  search: bool query,     │
//! │  SQL dialects, CTE time  │   │  aggregation tree,       │
//! │  buckets, mutations      │   │  result flattening       │
//! └──────────────────────────┘   └──────────────────────────┘
//!                          │
//!                          ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │           RowSequence (cast, hooked, cached)             │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod backend;
pub mod config;
pub mod criterion;
pub mod domain;
pub mod error;
pub mod router;
pub mod selection;
pub mod sql;
pub mod value;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::backend::relational::{Schema, SqlBackend, SqliteConnection};
    pub use crate::backend::search::SearchBackend;
    pub use crate::backend::{Backend, ValueQuery};
    pub use crate::criterion::{and, not, or, Criterion, CriterionOperator};
    pub use crate::domain::{GenericHandler, IdmefHandler, LogHandler, TimeField, TypeHandler};
    pub use crate::error::{DataProviderError, Result};
    pub use crate::router::{DataProviderManager, ResultObject, RowSequence, ValueHook};
    pub use crate::selection::{Path, SelectionObject};
    pub use crate::sql::Dialect;
    pub use crate::value::{Value, ValueType};
}

pub use criterion::Criterion;
pub use error::{DataProviderError, Result};
pub use router::DataProviderManager;
pub use value::{Value, ValueType};
