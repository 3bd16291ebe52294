//! Schemagate - schema-driven record access for relational databases
//!
//! This library introspects a database schema once at startup and serves
//! records through a uniform, relationship-aware query interface:
//! - Schema model (column sets, tables, foreign-key graph)
//! - Storage (the `Store` boundary and its SQLite implementation)
//! - Query execution (option-set planning, SQL generation, the driver)
//! - Table naming helpers for presentation
//! - JSON-lines TCP server

pub mod catalog;
pub mod error;
pub mod executor;
pub mod naming;
pub mod server;
pub mod storage;

pub use error::{Error, Result};
