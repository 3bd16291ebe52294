//! Catalog module
//!
//! This module contains the introspected schema model: column sets, table
//! records, the introspector and the relational graph built from them.

pub mod column_set;
pub mod graph;
pub mod introspect;
pub mod table;

pub use column_set::ColumnSet;
pub use graph::{quote_ident, ColumnMapping, RelatedFilter, RelationalGraph};
pub use introspect::{CatalogReader, ColumnInfo, ForeignKeyInfo, Introspector, UniqueColumnInfo};
pub use table::{Cardinality, Direction, LinkMap, Relationship, Table};
