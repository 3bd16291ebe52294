//! Relational graph over the introspected schema
//!
//! All lookups here are pure reads over state built once at startup, so a
//! graph can be shared between request threads behind an `Arc` without any
//! locking.

use super::column_set::ColumnSet;
use super::introspect::{CatalogReader, Introspector};
use super::table::{Cardinality, Direction, Relationship, Table};
use crate::error::{Error, Result};
use indexmap::{IndexMap, IndexSet};

/// Column mapping between two tables: local columns -> related column sets
pub type ColumnMapping = IndexMap<ColumnSet, Vec<ColumnSet>>;

/// Predicates and arguments scoping a listing to one parent row.
///
/// Placeholders are numbered from the `first_arg` passed to
/// [`RelationalGraph::subquery_mapping`], so the filter can be appended after
/// arguments the caller already holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelatedFilter {
    pub predicates: Vec<String>,
    pub args: Vec<String>,
}

impl RelatedFilter {
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }
}

/// Immutable schema model with its foreign-key graph
#[derive(Debug, Clone, Default)]
pub struct RelationalGraph {
    tables: IndexMap<String, Table>,
}

impl RelationalGraph {
    /// Build the graph from already-assembled table records
    pub fn new(tables: IndexMap<String, Table>) -> Self {
        Self { tables }
    }

    /// Introspect a catalog and build the graph
    pub fn introspect(reader: &dyn CatalogReader) -> Result<Self> {
        Ok(Self::new(Introspector::introspect(reader)?))
    }

    /// Table names in introspection order
    pub fn list_table_names(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Get a table by name
    pub fn get_table(&self, name: &str) -> Result<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }

    /// Tables reachable from `name` through outgoing then incoming links,
    /// de-duplicated in first-seen order.
    pub fn list_related_table_names(&self, name: &str) -> Vec<&str> {
        let Some(table) = self.tables.get(name) else {
            return Vec::new();
        };

        let mut related: IndexSet<&str> = IndexSet::new();
        for others in table.linked.values() {
            related.extend(others.keys().map(String::as_str));
        }
        related.extend(table.rev_linked.iter().map(String::as_str));
        related.into_iter().collect()
    }

    /// Every foreign key connecting `from` and `to`, in either direction,
    /// expressed as `from`'s columns -> `to`'s columns.
    pub fn get_related_table_mappings(&self, from: &str, to: &str) -> ColumnMapping {
        let mut mapping = ColumnMapping::new();
        for (local, remote, _) in self.edges(from, to) {
            mapping.entry(local.clone()).or_default().push(remote.clone());
        }
        mapping
    }

    /// Classified relationships from `name` to every related table
    pub fn relationships(&self, name: &str) -> Vec<Relationship> {
        self.list_related_table_names(name)
            .into_iter()
            .flat_map(|other| self.relationships_between(name, other))
            .collect()
    }

    /// Classified relationships from `from` to `to`
    pub fn relationships_between(&self, from: &str, to: &str) -> Vec<Relationship> {
        let Some(target) = self.tables.get(to) else {
            return Vec::new();
        };
        self.edges(from, to)
            .into_iter()
            .map(|(local, remote, direction)| Relationship {
                target: to.to_string(),
                local: local.clone(),
                remote: remote.clone(),
                direction,
                cardinality: Cardinality::classify(target, remote),
            })
            .collect()
    }

    /// Related tables that may be nested into a single-record fetch
    pub fn includable_tables(&self, name: &str) -> Vec<String> {
        self.related_with(name, Cardinality::ToOne)
    }

    /// Related tables exposed as a listing scoped to one record of `name`
    pub fn to_many_tables(&self, name: &str) -> Vec<String> {
        self.related_with(name, Cardinality::ToMany)
    }

    fn related_with(&self, name: &str, cardinality: Cardinality) -> Vec<String> {
        let mut found: IndexSet<String> = IndexSet::new();
        for rel in self.relationships(name) {
            if rel.cardinality == cardinality {
                found.insert(rel.target);
            }
        }
        found.into_iter().collect()
    }

    /// Find the to-one link used to nest `to` inside a row of `from`
    pub fn to_one_link(&self, from: &str, to: &str) -> Option<(ColumnSet, ColumnSet, Direction)> {
        let target = self.tables.get(to)?;
        self.edges(from, to)
            .into_iter()
            .find(|(_, remote, _)| target.is_identified_by(remote))
            .map(|(local, remote, direction)| (local.clone(), remote.clone(), direction))
    }

    /// Predicates restricting `child` rows to those related to the `parent`
    /// row whose first key column equals `key`.
    ///
    /// Emits one `child.col IN (SELECT parent.col FROM parent WHERE
    /// parent.key = ?N)` predicate per column pair; all predicates share the
    /// single bound argument `?N` where `N == first_arg`.
    pub fn subquery_mapping(
        &self,
        parent: &Table,
        child: &Table,
        key: &str,
        first_arg: usize,
    ) -> RelatedFilter {
        let mut filter = RelatedFilter::default();
        let Some(parent_key) = parent.key.first() else {
            return filter;
        };

        for (local, remotes) in self.get_related_table_mappings(&parent.name, &child.name) {
            for remote in remotes {
                for (parent_col, child_col) in local.iter().zip(remote.iter()) {
                    if filter.args.is_empty() {
                        filter.args.push(key.to_string());
                    }
                    filter.predicates.push(format!(
                        "{}.{} IN (SELECT {} FROM {} WHERE {} = ?{})",
                        quote_ident(&child.name),
                        quote_ident(child_col),
                        quote_ident(parent_col),
                        quote_ident(&parent.name),
                        quote_ident(parent_key),
                        first_arg
                    ));
                }
            }
        }
        filter
    }

    /// (local, remote, direction) for every foreign key between two tables
    fn edges<'a>(&'a self, from: &str, to: &str) -> Vec<(&'a ColumnSet, &'a ColumnSet, Direction)> {
        let (Some(table), Some(other)) = (self.tables.get(from), self.tables.get(to)) else {
            return Vec::new();
        };

        let mut edges: Vec<_> = table
            .links_to(to)
            .into_iter()
            .map(|(local, remote)| (local, remote, Direction::Outgoing))
            .collect();

        if table.rev_linked.contains(to) {
            // the foreign key lives on `other`; flip it to `from`'s view
            edges.extend(
                other
                    .links_to(from)
                    .into_iter()
                    .map(|(their_cols, our_cols)| (our_cols, their_cols, Direction::Incoming)),
            );
        }
        edges
    }
}

/// Quote an SQL identifier
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(name: &str, key: &[&str], columns: &[&str]) -> Table {
        let mut t = Table::new(name);
        t.key = ColumnSet::new(key.iter().copied());
        t.columns = ColumnSet::new(columns.iter().copied());
        t
    }

    fn link(tables: &mut IndexMap<String, Table>, from: &str, local: &[&str], to: &str, remote: &[&str]) {
        tables[from].add_link(
            ColumnSet::new(local.iter().copied()),
            to,
            ColumnSet::new(remote.iter().copied()),
        );
        tables[to].rev_linked.insert(from.to_string());
    }

    /// orders <- line_items -> products, users <- profiles (1:1)
    fn shop() -> RelationalGraph {
        let mut tables = IndexMap::new();
        for t in [
            table("orders", &["id"], &["id", "placed_at"]),
            table("line_items", &["id"], &["id", "order_id", "product_id", "qty"]),
            table("products", &["id"], &["id", "sku"]),
            table("users", &["id"], &["id", "email"]),
            table("profiles", &["user_id"], &["user_id", "bio"]),
        ] {
            tables.insert(t.name.clone(), t);
        }
        link(&mut tables, "line_items", &["order_id"], "orders", &["id"]);
        link(&mut tables, "line_items", &["product_id"], "products", &["id"]);
        link(&mut tables, "profiles", &["user_id"], "users", &["id"]);
        RelationalGraph::new(tables)
    }

    #[test]
    fn test_list_related_table_names() {
        let graph = shop();
        assert_eq!(graph.list_related_table_names("orders"), vec!["line_items"]);
        assert_eq!(
            graph.list_related_table_names("line_items"),
            vec!["orders", "products"]
        );
        assert!(graph.list_related_table_names("missing").is_empty());
    }

    #[test]
    fn test_mappings_are_inverse() {
        let graph = shop();
        let forward = graph.get_related_table_mappings("line_items", "orders");
        let reverse = graph.get_related_table_mappings("orders", "line_items");

        assert_eq!(forward[&ColumnSet::new(["order_id"])], vec![ColumnSet::new(["id"])]);
        assert_eq!(reverse[&ColumnSet::new(["id"])], vec![ColumnSet::new(["order_id"])]);

        for (local, remotes) in &forward {
            for remote in remotes {
                assert!(reverse[remote].contains(local));
            }
        }
    }

    #[test]
    fn test_relationship_classification() {
        let graph = shop();

        let from_child = graph.relationships_between("line_items", "orders");
        assert_eq!(from_child.len(), 1);
        assert_eq!(from_child[0].cardinality, Cardinality::ToOne);
        assert_eq!(from_child[0].direction, Direction::Outgoing);

        let from_parent = graph.relationships_between("orders", "line_items");
        assert_eq!(from_parent.len(), 1);
        assert_eq!(from_parent[0].cardinality, Cardinality::ToMany);
        assert_eq!(from_parent[0].direction, Direction::Incoming);

        assert_eq!(graph.includable_tables("line_items"), vec!["orders", "products"]);
        assert_eq!(graph.to_many_tables("orders"), vec!["line_items"]);
        assert!(graph.includable_tables("orders").is_empty());
    }

    #[test]
    fn test_reverse_to_one() {
        let graph = shop();
        // profiles.user_id is both the foreign key and the full key
        assert_eq!(graph.includable_tables("users"), vec!["profiles"]);
        assert_eq!(
            graph.to_one_link("users", "profiles"),
            Some((
                ColumnSet::new(["id"]),
                ColumnSet::new(["user_id"]),
                Direction::Incoming
            ))
        );
        assert_eq!(
            graph.to_one_link("line_items", "orders").map(|(_, _, d)| d),
            Some(Direction::Outgoing)
        );
        assert!(graph.to_one_link("orders", "line_items").is_none());
    }

    #[test]
    fn test_subquery_mapping() {
        let graph = shop();
        let orders = graph.get_table("orders").unwrap();
        let items = graph.get_table("line_items").unwrap();

        let filter = graph.subquery_mapping(orders, items, "42", 1);
        assert_eq!(filter.args, vec!["42"]);
        assert_eq!(
            filter.predicates,
            vec![r#""line_items"."order_id" IN (SELECT "id" FROM "orders" WHERE "id" = ?1)"#]
        );
    }

    #[test]
    fn test_subquery_mapping_shares_one_argument() {
        let mut tables = IndexMap::new();
        tables.insert("accounts".to_string(), table("accounts", &["id"], &["id"]));
        tables.insert(
            "transfers".to_string(),
            table("transfers", &["id"], &["id", "src", "dst"]),
        );
        link(&mut tables, "transfers", &["src"], "accounts", &["id"]);
        link(&mut tables, "transfers", &["dst"], "accounts", &["id"]);
        let graph = RelationalGraph::new(tables);

        let accounts = graph.get_table("accounts").unwrap();
        let transfers = graph.get_table("transfers").unwrap();
        let filter = graph.subquery_mapping(accounts, transfers, "7", 3);

        assert_eq!(filter.args, vec!["7"]);
        assert_eq!(filter.predicates.len(), 2);
        assert!(filter.predicates.iter().all(|p| p.ends_with("= ?3)")));
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("orders"), "\"orders\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
