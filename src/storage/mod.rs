//! Storage module
//!
//! This module contains the store boundary used by the query engine:
//! - Value and Row types
//! - The `Store` trait
//! - The SQLite-backed store and catalog reader

pub mod sqlite;
pub mod value;

pub use sqlite::SqliteStore;
pub use value::{Row, Value};

use crate::error::Result;

/// A relational store that executes parameterized SQL.
///
/// Implementations must tolerate concurrent use from many request threads.
/// Arguments are bound positionally as text.
pub trait Store: Send + Sync {
    /// Run a statement that returns rows
    fn query(&self, sql: &str, args: &[String]) -> Result<Vec<Row>>;

    /// Run a statement and return the number of affected rows
    fn execute(&self, sql: &str, args: &[String]) -> Result<usize>;
}
