//! Table records and relationship classification
//!
//! A `Table` is built once by the introspector and never mutated by request
//! handling. Links are keyed by this table's foreign-key columns, then by
//! the target table name.

use super::column_set::ColumnSet;
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;

/// Source columns -> target table -> target column sets
pub type LinkMap = IndexMap<ColumnSet, IndexMap<String, Vec<ColumnSet>>>;

/// One relation in the introspected schema
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Table {
    /// Table name
    pub name: String,
    /// Primary key columns in key order (may be empty)
    pub key: ColumnSet,
    /// All columns in schema order
    pub columns: ColumnSet,
    /// Columns covered by a single-column unique index
    pub unique_columns: ColumnSet,
    /// Foreign keys held by this table
    pub linked: LinkMap,
    /// Tables holding a foreign key that points at this table
    pub rev_linked: IndexSet<String>,
}

impl Table {
    /// Create an empty table record
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Check if column exists
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains(column)
    }

    /// Check if column is part of the primary key
    pub fn is_key_column(&self, column: &str) -> bool {
        self.key.contains(column)
    }

    /// True when `columns` is exactly this table's full primary key.
    ///
    /// This is the single to-one test: a link whose far side is identified
    /// by its whole key points at no more than one row.
    pub fn is_identified_by(&self, columns: &ColumnSet) -> bool {
        !self.key.is_empty() && &self.key == columns
    }

    /// (local, remote) column sets of every foreign key from this table to `target`
    pub fn links_to(&self, target: &str) -> Vec<(&ColumnSet, &ColumnSet)> {
        let mut links = Vec::new();
        for (local, others) in &self.linked {
            for remote in others.get(target).into_iter().flatten() {
                links.push((local, remote));
            }
        }
        links
    }

    /// Register a foreign key held by this table
    pub(crate) fn add_link(&mut self, local: ColumnSet, target: &str, remote: ColumnSet) {
        self.linked
            .entry(local)
            .or_default()
            .entry(target.to_string())
            .or_default()
            .push(remote);
    }
}

/// Relationship cardinality from the perspective of the local table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    /// At most one related row; may be nested as an include
    ToOne,
    /// Any number of related rows; exposed as a related listing
    ToMany,
}

impl Cardinality {
    /// Classify a link whose far side is `remote` on `target`
    pub fn classify(target: &Table, remote: &ColumnSet) -> Self {
        if target.is_identified_by(remote) {
            Cardinality::ToOne
        } else {
            Cardinality::ToMany
        }
    }
}

/// Which table physically stores the foreign key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// The local table holds the foreign key
    Outgoing,
    /// The related table holds the foreign key
    Incoming,
}

/// A classified relationship seen from one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Relationship {
    /// Related table name
    pub target: String,
    /// Columns on the local table
    pub local: ColumnSet,
    /// Columns on the related table
    pub remote: ColumnSet,
    pub direction: Direction,
    pub cardinality: Cardinality,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orders() -> Table {
        let mut t = Table::new("orders");
        t.columns = ColumnSet::new(["id", "placed_at"]);
        t.key = ColumnSet::new(["id"]);
        t
    }

    #[test]
    fn test_classification() {
        let target = orders();
        assert_eq!(
            Cardinality::classify(&target, &ColumnSet::new(["id"])),
            Cardinality::ToOne
        );
        assert_eq!(
            Cardinality::classify(&target, &ColumnSet::new(["placed_at"])),
            Cardinality::ToMany
        );
    }

    #[test]
    fn test_composite_key_classification() {
        let mut target = Table::new("shipments");
        target.key = ColumnSet::new(["order_id", "seq"]);

        assert_eq!(
            Cardinality::classify(&target, &ColumnSet::new(["order_id", "seq"])),
            Cardinality::ToOne
        );
        // strict subset and reordered sets are not the key
        assert_eq!(
            Cardinality::classify(&target, &ColumnSet::new(["order_id"])),
            Cardinality::ToMany
        );
        assert_eq!(
            Cardinality::classify(&target, &ColumnSet::new(["seq", "order_id"])),
            Cardinality::ToMany
        );
    }

    #[test]
    fn test_keyless_table_is_never_to_one() {
        let target = Table::new("audit_log");
        assert!(!target.is_identified_by(&ColumnSet::default()));
    }

    #[test]
    fn test_links_to() {
        let mut t = Table::new("transfers");
        t.add_link(ColumnSet::new(["from_account"]), "accounts", ColumnSet::new(["id"]));
        t.add_link(ColumnSet::new(["to_account"]), "accounts", ColumnSet::new(["id"]));
        t.add_link(ColumnSet::new(["currency"]), "currencies", ColumnSet::new(["code"]));

        let locals: Vec<String> = t
            .links_to("accounts")
            .into_iter()
            .map(|(l, _)| l.encode())
            .collect();
        assert_eq!(locals, vec!["from_account", "to_account"]);
        assert!(t.links_to("nowhere").is_empty());
    }
}
