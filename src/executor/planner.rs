//! Query planner for Schemagate
//!
//! This module converts a wire-level `OptionSet` into typed queries. Every
//! reserved option name is interpreted here and nowhere else; the driver only
//! sees validated filters, pages, sort orders and includes.

use super::options::{OptionSet, ARGS, FILTERS, NEST, PAGE, PER_PAGE, SORT_BY, WHERE};
use crate::catalog::{RelatedFilter, Table};
use crate::error::{Error, Result};
use indexmap::IndexSet;

/// Default number of rows per page
pub const DEFAULT_PER_PAGE: u32 = 10;
/// Upper bound on rows per page
pub const MAX_PER_PAGE: u32 = 500;

/// Pagination settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageConfig {
    /// Rows per page when the request gives none (or an invalid value)
    pub default_per_page: u32,
    /// Largest accepted rows-per-page value
    pub max_per_page: u32,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            default_per_page: DEFAULT_PER_PAGE,
            max_per_page: MAX_PER_PAGE,
        }
    }
}

impl PageConfig {
    /// Create a page config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default page size
    pub fn default_per_page(mut self, n: u32) -> Self {
        self.default_per_page = n;
        self
    }

    /// Set the maximum page size
    pub fn max_per_page(mut self, n: u32) -> Self {
        self.max_per_page = n;
        self
    }

    /// Check the settings are usable
    pub fn validate(&self) -> Result<()> {
        if self.default_per_page == 0 {
            return Err(Error::Config("default page size must be positive".to_string()));
        }
        if self.default_per_page > self.max_per_page {
            return Err(Error::Config(format!(
                "default page size {} exceeds maximum {}",
                self.default_per_page, self.max_per_page
            )));
        }
        Ok(())
    }
}

/// Resolved LIMIT/OFFSET
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: u32,
    pub offset: u64,
}

impl Page {
    /// Resolve raw page options.
    ///
    /// Non-numeric, non-positive or oversized page sizes fall back to the
    /// default; a missing, invalid or non-positive page yields offset 0.
    pub fn resolve(page: Option<&str>, per_page: Option<&str>, config: &PageConfig) -> Self {
        let limit = per_page
            .and_then(|s| s.trim().parse::<i64>().ok())
            .filter(|n| *n >= 1 && *n <= i64::from(config.max_per_page))
            .map(|n| n as u32)
            .unwrap_or(config.default_per_page);

        let offset = page
            .and_then(|s| s.trim().parse::<i64>().ok())
            .map(|n| n.saturating_sub(1).saturating_mul(i64::from(limit)))
            .filter(|n| *n > 0)
            .map(|n| n as u64)
            .unwrap_or(0);

        Self { limit, offset }
    }
}

/// A column bound to one value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub column: String,
    pub value: String,
}

impl Binding {
    pub fn new(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }
}

/// Typed listing request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingQuery {
    /// Pre-built predicates; placeholders refer to `raw_args` as `?1..?n`
    pub raw_predicates: Vec<String>,
    pub raw_args: Vec<String>,
    /// Equality filters, bound after `raw_args`
    pub filters: Vec<Binding>,
    /// Resolved ORDER BY columns; empty when the table has no usable order
    pub sort: Vec<String>,
    pub page: Page,
}

impl ListingQuery {
    /// Plan a listing of `table`
    pub fn plan(table: &Table, opts: &OptionSet, config: &PageConfig) -> Result<Self> {
        let mut filters = Vec::new();
        let mut seen = IndexSet::new();
        for column in opts.values(FILTERS) {
            if !seen.insert(column.as_str()) {
                continue;
            }
            filters.push(column_binding(table, column, opts.values(column))?);
        }

        Ok(Self {
            raw_predicates: opts.values(WHERE).to_vec(),
            raw_args: opts.values(ARGS).to_vec(),
            filters,
            sort: resolve_sort(table, opts.first(SORT_BY)),
            page: Page::resolve(opts.first(PAGE), opts.first(PER_PAGE), config),
        })
    }

    /// Restrict the listing to rows related to one parent row
    pub fn scope(&mut self, filter: RelatedFilter) {
        self.raw_predicates.extend(filter.predicates);
        self.raw_args.extend(filter.args);
    }
}

/// Requested sort columns that exist on `table`, else the primary key
fn resolve_sort(table: &Table, requested: Option<&str>) -> Vec<String> {
    let mut sort: IndexSet<String> = IndexSet::new();
    if let Some(requested) = requested {
        for name in requested.split(',').map(str::trim) {
            if table.has_column(name) {
                sort.insert(name.to_string());
            }
        }
    }
    if sort.is_empty() {
        return table.key.as_slice().to_vec();
    }
    sort.into_iter().collect()
}

/// Typed single-record request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupQuery {
    /// Equality filters from every non-reserved option
    pub filters: Vec<Binding>,
    /// Related tables to nest, in request order
    pub includes: Vec<String>,
}

impl LookupQuery {
    /// Plan a single-record fetch from `table`
    pub fn plan(table: &Table, opts: &OptionSet) -> Result<Self> {
        let filters = opts
            .columns()
            .map(|(column, values)| column_binding(table, column, values))
            .collect::<Result<Vec<_>>>()?;

        let includes: IndexSet<String> = opts.values(NEST).iter().cloned().collect();
        Ok(Self {
            filters,
            includes: includes.into_iter().collect(),
        })
    }
}

/// Typed insert request: supplied columns in declaration order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertQuery {
    pub values: Vec<Binding>,
}

impl InsertQuery {
    pub fn plan(table: &Table, opts: &OptionSet) -> Self {
        let values = table
            .columns
            .iter()
            .filter_map(|column| {
                opts.first(column)
                    .map(|value| Binding::new(column, value))
            })
            .collect();
        Self { values }
    }
}

/// Typed update request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateQuery {
    /// Non-key columns to assign, in declaration order
    pub set: Vec<Binding>,
    pub key: Vec<Binding>,
}

impl UpdateQuery {
    pub fn plan(table: &Table, opts: &OptionSet) -> Result<Self> {
        let key = key_bindings(table, opts)?;
        let set = table
            .columns
            .iter()
            .filter(|column| !table.is_key_column(column))
            .filter_map(|column| {
                opts.first(column)
                    .map(|value| Binding::new(column, value))
            })
            .collect();
        Ok(Self { set, key })
    }
}

/// Equality bindings over every primary-key column.
///
/// Fails with `InvalidFilter` when the table has no key or a key value is
/// missing, so no write ever runs without a full key predicate.
pub fn key_bindings(table: &Table, opts: &OptionSet) -> Result<Vec<Binding>> {
    if table.key.is_empty() {
        return Err(Error::InvalidFilter(format!(
            "table '{}' has no primary key",
            table.name
        )));
    }
    table
        .key
        .iter()
        .map(|column| {
            opts.first(column)
                .map(|value| Binding::new(column, value))
                .ok_or_else(|| {
                    Error::InvalidFilter(format!("missing key column '{}'", column))
                })
        })
        .collect()
}

fn column_binding(table: &Table, column: &str, values: &[String]) -> Result<Binding> {
    if !table.has_column(column) {
        return Err(Error::InvalidFilter(format!(
            "unknown column '{}' on table '{}'",
            column, table.name
        )));
    }
    let value = values
        .first()
        .ok_or_else(|| Error::InvalidFilter(format!("no value for column '{}'", column)))?;
    Ok(Binding::new(column, value.as_str()))
}
