//! Option set wire protocol
//!
//! The boundary layer describes every request as a mapping from option name
//! to an ordered list of string values. Plain column names carry filter or
//! key values; names starting with `_` are reserved. The planner turns an
//! option set into a typed query before any SQL is built.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Prefix shared by every reserved option name
pub const RESERVED_PREFIX: char = '_';

/// Column names to treat as equality filters (listing)
pub const FILTERS: &str = "_filters";
/// Pre-built SQL predicate fragments, ANDed
pub const WHERE: &str = "_where";
/// Positional arguments bound to `_where` fragments
pub const ARGS: &str = "_args";
/// 1-based page number
pub const PAGE: &str = "_page";
/// Rows per page
pub const PER_PAGE: &str = "_perpage";
/// Comma-separated sort columns
pub const SORT_BY: &str = "_sortby";
/// Related table names to nest into a single-record fetch
pub const NEST: &str = "_nest";

/// Request options: option name -> ordered values
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionSet(IndexMap<String, Vec<String>>);

impl OptionSet {
    /// Create an empty option set
    pub fn new() -> Self {
        Self::default()
    }

    /// True when `name` is a reserved option rather than a column
    pub fn is_reserved(name: &str) -> bool {
        name.starts_with(RESERVED_PREFIX)
    }

    /// Append one value, builder style
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(name, value);
        self
    }

    /// Append one value to `name`
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.entry(name.into()).or_default().push(value.into());
    }

    /// Replace all values of `name`
    pub fn set(&mut self, name: impl Into<String>, values: Vec<String>) {
        self.0.insert(name.into(), values);
    }

    /// Mark `column` as a listing filter with the given value
    pub fn filter(&mut self, column: &str, value: impl Into<String>) {
        self.push(column, value);
        self.push(FILTERS, column);
    }

    /// Values of `name`, empty when absent
    pub fn values(&self, name: &str) -> &[String] {
        self.0.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// First value of `name`
    pub fn first(&self, name: &str) -> Option<&str> {
        self.values(name).first().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Every option in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Non-reserved options, i.e. column values
    pub fn columns(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.iter().filter(|(k, _)| !Self::is_reserved(k))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Vec<String>)> for OptionSet {
    fn from_iter<T: IntoIterator<Item = (K, Vec<String>)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_names() {
        assert!(OptionSet::is_reserved(PAGE));
        assert!(OptionSet::is_reserved(NEST));
        assert!(!OptionSet::is_reserved("order_id"));
    }

    #[test]
    fn test_columns_skip_reserved() {
        let opts = OptionSet::new()
            .with("id", "1")
            .with(PAGE, "2")
            .with(NEST, "orders");
        let cols: Vec<_> = opts.columns().map(|(k, _)| k).collect();
        assert_eq!(cols, vec!["id"]);
        assert_eq!(opts.first(PAGE), Some("2"));
        assert!(opts.values(SORT_BY).is_empty());
    }

    #[test]
    fn test_wire_format() {
        let opts: OptionSet =
            serde_json::from_str(r#"{"status": ["open"], "_filters": ["status"]}"#).unwrap();
        assert_eq!(opts.first("status"), Some("open"));
        assert_eq!(opts.values(FILTERS), ["status"]);
    }
}
