//! Query driver for Schemagate
//!
//! Executes listing, single-record, insert, update and delete requests
//! against a `Store`, consulting the relational graph for nested includes
//! and related listings. Each call issues its own statements; nothing spans
//! requests and no row data is cached.

use std::sync::Arc;

use rusqlite::ErrorCode;

use super::options::{OptionSet, NEST};
use super::planner::{
    key_bindings, Binding, InsertQuery, ListingQuery, LookupQuery, PageConfig, UpdateQuery,
};
use super::sql;
use crate::catalog::{Direction, RelationalGraph, Table};
use crate::error::{Error, Result};
use crate::storage::{Row, Store};

/// Relationship-aware query driver
#[derive(Clone)]
pub struct Driver {
    graph: Arc<RelationalGraph>,
    store: Arc<dyn Store>,
    config: PageConfig,
}

impl Driver {
    /// Create a driver, validating its page settings
    pub fn new(graph: Arc<RelationalGraph>, store: Arc<dyn Store>, config: PageConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            graph,
            store,
            config,
        })
    }

    /// The schema model this driver queries
    pub fn graph(&self) -> &RelationalGraph {
        &self.graph
    }

    pub fn page_config(&self) -> &PageConfig {
        &self.config
    }

    /// List one page of rows from `table`
    pub fn listing(&self, table: &Table, opts: &OptionSet) -> Result<Vec<Row>> {
        let query = ListingQuery::plan(table, opts, &self.config)?;
        let (sql, args) = sql::listing_sql(table, &query);
        self.store.query(&sql, &args)
    }

    /// Fetch one row, with any requested to-one includes nested one level deep
    pub fn get(&self, table: &Table, opts: &OptionSet) -> Result<Row> {
        let query = LookupQuery::plan(table, opts)?;
        let mut row = self.fetch_one(table, &query.filters)?;

        for name in &query.includes {
            let nested = self.fetch_included(table, &row, name)?;
            row.nest(name.as_str(), nested);
        }
        Ok(row)
    }

    /// Fetch by single-column primary key, falling back to each unique
    /// column in declaration order when the key lookup finds nothing.
    pub fn get_by_identity(&self, table: &Table, value: &str, includes: &[String]) -> Result<Row> {
        let key = match table.key.as_slice() {
            [key] => key,
            _ => {
                return Err(Error::InvalidFilter(format!(
                    "table '{}' is not identified by a single column",
                    table.name
                )))
            }
        };

        let lookup = |column: &str| {
            let mut opts = OptionSet::new().with(column, value);
            opts.set(NEST, includes.to_vec());
            self.get(table, &opts)
        };

        match lookup(key.as_str()) {
            Err(Error::NotFound) => {}
            other => return other,
        }
        for column in table.unique_columns.iter() {
            match lookup(column) {
                Err(Error::NotFound) => continue,
                other => return other,
            }
        }
        Err(Error::NotFound)
    }

    /// List rows of `child` related to the `parent` row whose key is `key`.
    ///
    /// The subquery scoping is added to the planned query directly, never
    /// through the option set.
    pub fn listing_related(
        &self,
        parent: &Table,
        child: &Table,
        key: &str,
        opts: &OptionSet,
    ) -> Result<Vec<Row>> {
        if !self
            .graph
            .to_many_tables(&parent.name)
            .iter()
            .any(|t| *t == child.name)
        {
            return Err(Error::NoRelationship(
                parent.name.clone(),
                child.name.clone(),
            ));
        }

        let mut query = ListingQuery::plan(child, opts, &self.config)?;
        let filter = self
            .graph
            .subquery_mapping(parent, child, key, query.raw_args.len() + 1);
        if filter.is_empty() {
            // a keyless parent cannot scope the listing
            return Err(Error::InvalidFilter(format!(
                "table '{}' has no key to scope '{}' by",
                parent.name, child.name
            )));
        }
        query.scope(filter);

        let (sql, args) = sql::listing_sql(child, &query);
        self.store.query(&sql, &args)
    }

    /// Insert a row and return it as stored
    pub fn insert(&self, table: &Table, opts: &OptionSet) -> Result<Row> {
        let query = InsertQuery::plan(table, opts);
        let (sql, args) = sql::insert_sql(table, &query);
        let rows = self.store.query(&sql, &args).map_err(|e| match e {
            Error::Sqlite(inner) if is_constraint_violation(&inner) => {
                Error::InsertFailed(inner.to_string())
            }
            other => other,
        })?;
        rows.into_iter().next().ok_or(Error::NotFound)
    }

    /// Update the non-key columns of the row identified by its key
    pub fn update(&self, table: &Table, opts: &OptionSet) -> Result<Row> {
        let query = UpdateQuery::plan(table, opts)?;
        if query.set.is_empty() {
            return self.fetch_one(table, &query.key);
        }
        let (sql, args) = sql::update_sql(table, &query);
        self.store
            .query(&sql, &args)?
            .into_iter()
            .next()
            .ok_or(Error::NotFound)
    }

    /// Delete the row identified by its key
    pub fn delete(&self, table: &Table, opts: &OptionSet) -> Result<()> {
        let key = key_bindings(table, opts)?;
        let (sql, args) = sql::delete_sql(table, &key);
        match self.store.execute(&sql, &args)? {
            0 => Err(Error::NotFound),
            _ => Ok(()),
        }
    }

    fn fetch_one(&self, table: &Table, filters: &[Binding]) -> Result<Row> {
        let (sql, args) = sql::lookup_sql(table, filters);
        self.store
            .query(&sql, &args)?
            .into_iter()
            .next()
            .ok_or(Error::NotFound)
    }

    /// Resolve one include; `None` when the linking columns are NULL, or when
    /// a reverse link has no child row
    fn fetch_included(&self, table: &Table, row: &Row, name: &str) -> Result<Option<Row>> {
        let invalid = || Error::InvalidInclude(format!("'{}' from '{}'", name, table.name));

        let target = self.graph.get_table(name).map_err(|_| invalid())?;
        let (local, remote, direction) = self
            .graph
            .to_one_link(&table.name, name)
            .ok_or_else(invalid)?;

        let mut filters = Vec::with_capacity(remote.len());
        for (ours, theirs) in local.iter().zip(remote.iter()) {
            match row.get(ours).and_then(|v| v.to_param()) {
                Some(value) => filters.push(Binding::new(theirs, value)),
                None => return Ok(None),
            }
        }
        match self.fetch_one(target, &filters) {
            Ok(related) => Ok(Some(related)),
            Err(Error::NotFound) if direction == Direction::Incoming => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    err.sqlite_error_code() == Some(ErrorCode::ConstraintViolation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ColumnSet;
    use indexmap::IndexMap;
    use std::sync::Mutex;

    /// Records statements and answers with fixed rows
    #[derive(Default)]
    struct RecordingStore {
        statements: Mutex<Vec<(String, Vec<String>)>>,
        rows: Vec<Row>,
    }

    impl Store for RecordingStore {
        fn query(&self, sql: &str, args: &[String]) -> Result<Vec<Row>> {
            self.statements
                .lock()
                .unwrap()
                .push((sql.to_string(), args.to_vec()));
            Ok(self.rows.clone())
        }

        fn execute(&self, sql: &str, args: &[String]) -> Result<usize> {
            self.statements
                .lock()
                .unwrap()
                .push((sql.to_string(), args.to_vec()));
            Ok(self.rows.len())
        }
    }

    fn driver(store: Arc<RecordingStore>) -> (Driver, Arc<RelationalGraph>) {
        let mut tables = IndexMap::new();
        let mut log = Table::new("audit_log");
        log.columns = ColumnSet::new(["at", "message"]);
        tables.insert(log.name.clone(), log);

        let mut orders = Table::new("orders");
        orders.columns = ColumnSet::new(["id", "status"]);
        orders.key = ColumnSet::new(["id"]);
        tables.insert(orders.name.clone(), orders);

        let graph = Arc::new(RelationalGraph::new(tables));
        let driver = Driver::new(graph.clone(), store, PageConfig::default()).unwrap();
        (driver, graph)
    }

    #[test]
    fn test_delete_without_key_issues_nothing() {
        let store = Arc::new(RecordingStore::default());
        let (driver, graph) = driver(store.clone());
        let log = graph.get_table("audit_log").unwrap();

        let err = driver
            .delete(log, &OptionSet::new().with("message", "x"))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidFilter(_)));
        assert!(store.statements.lock().unwrap().is_empty());
    }

    #[test]
    fn test_delete_zero_rows_is_not_found() {
        let store = Arc::new(RecordingStore::default());
        let (driver, graph) = driver(store.clone());
        let orders = graph.get_table("orders").unwrap();

        let err = driver
            .delete(orders, &OptionSet::new().with("id", "1"))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound));
        assert_eq!(store.statements.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_listing_empty_is_ok() {
        let store = Arc::new(RecordingStore::default());
        let (driver, graph) = driver(store.clone());
        let orders = graph.get_table("orders").unwrap();

        let rows = driver.listing(orders, &OptionSet::new()).unwrap();
        assert!(rows.is_empty());
        let statements = store.statements.lock().unwrap();
        assert_eq!(
            statements[0].0,
            "SELECT * FROM \"orders\" ORDER BY \"id\" LIMIT 10 OFFSET 0"
        );
    }

    #[test]
    fn test_invalid_page_config_is_rejected() {
        let store: Arc<dyn Store> = Arc::new(RecordingStore::default());
        let graph = Arc::new(RelationalGraph::default());
        let config = PageConfig::new().default_per_page(50).max_per_page(20);
        assert!(matches!(
            Driver::new(graph, store, config),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_update_with_nothing_to_set_reads_row() {
        let mut row = Row::new();
        row.insert("id", 1i64);
        let store = Arc::new(RecordingStore {
            rows: vec![row.clone()],
            ..Default::default()
        });
        let (driver, graph) = driver(store.clone());
        let orders = graph.get_table("orders").unwrap();

        let updated = driver
            .update(orders, &OptionSet::new().with("id", "1"))
            .unwrap();
        assert_eq!(updated, row);
        assert!(store.statements.lock().unwrap()[0].0.starts_with("SELECT"));
    }
}
