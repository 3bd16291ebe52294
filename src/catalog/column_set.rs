//! Ordered column sets
//!
//! A `ColumnSet` is the unit used for primary keys and both sides of a
//! foreign key. Equality is positional: `[a, b]` and `[b, a]` differ.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Separator used by the canonical string encoding
pub const COLUMN_SEPARATOR: char = ',';

/// An ordered list of column names
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub struct ColumnSet(Vec<String>);

impl ColumnSet {
    /// Create a column set from any list of names
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(columns.into_iter().map(Into::into).collect())
    }

    /// Decode the canonical (comma-joined) form
    pub fn decode(encoded: &str) -> Self {
        if encoded.is_empty() {
            return Self::default();
        }
        Self(encoded.split(COLUMN_SEPARATOR).map(str::to_string).collect())
    }

    /// Encode to the canonical (comma-joined) form
    pub fn encode(&self) -> String {
        self.0.join(",")
    }

    /// Append a column at the end
    pub fn push(&mut self, column: impl Into<String>) {
        self.0.push(column.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Column at `index`
    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    /// First column, if any
    pub fn first(&self) -> Option<&str> {
        self.get(0)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.0.iter().any(|c| c == column)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for ColumnSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for ColumnSet {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::decode(s))
    }
}

impl From<String> for ColumnSet {
    fn from(s: String) -> Self {
        Self::decode(&s)
    }
}

impl From<ColumnSet> for String {
    fn from(cs: ColumnSet) -> Self {
        cs.encode()
    }
}

impl<'a> IntoIterator for &'a ColumnSet {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<String> for ColumnSet {
    fn from_iter<T: IntoIterator<Item = String>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_sensitive_equality() {
        let ab = ColumnSet::new(["a", "b"]);
        let ba = ColumnSet::new(["b", "a"]);
        assert_ne!(ab, ba);
        assert_eq!(ab, ColumnSet::new(["a", "b"]));
        assert_ne!(ab, ColumnSet::new(["a"]));
    }

    #[test]
    fn test_encode_decode() {
        let cs = ColumnSet::new(["order_id", "line_no"]);
        assert_eq!(cs.encode(), "order_id,line_no");
        assert_eq!(ColumnSet::decode(&cs.encode()), cs);

        let single = ColumnSet::new(["id"]);
        assert_eq!(ColumnSet::decode("id"), single);
    }

    #[test]
    fn test_empty_set() {
        let empty = ColumnSet::default();
        assert_eq!(empty.encode(), "");
        assert_eq!(ColumnSet::decode(""), empty);
        assert!(empty.first().is_none());
    }

    #[test]
    fn test_serializes_as_canonical_string() {
        let cs = ColumnSet::new(["a", "b"]);
        assert_eq!(serde_json::to_string(&cs).unwrap(), "\"a,b\"");
        let back: ColumnSet = serde_json::from_str("\"a,b\"").unwrap();
        assert_eq!(back, cs);
    }
}
