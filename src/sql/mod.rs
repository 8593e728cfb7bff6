//! SQL generation module.
//!
//! This module provides a type-safe SQL builder that generates multi-dialect SQL.
//! It includes:
//!
//! - [`query`] - SELECT query builder, CTEs and UNION
//! - [`expr`] - Expression AST, builder DSL and dialect templates
//! - [`dml`] - Data Manipulation Language (INSERT, UPDATE, DELETE)
//! - [`token`] - Token types for SQL generation
//! - [`dialect`] - SQL dialect implementations

pub mod dialect;
pub mod dml;
pub mod expr;
pub mod query;
pub mod token;

// Re-export commonly used types at the sql module level
pub use dialect::{Dialect, SqlDialect};
pub use expr::{
    col, count, count_distinct, func, lit_bool, lit_float, lit_int, lit_null, lit_str, star,
    table_col, template, BinaryOperator, Expr, ExprExt, Literal, UnaryOperator,
};
pub use query::{
    Cte, Join, JoinType, LimitOffset, OrderByExpr, Query, SelectExpr, SetOperation, SortDir,
    TableRef, TableSource,
};
pub use token::{Token, TokenStream};

// Re-export DML types
pub use dml::{Delete, Insert, Update};
