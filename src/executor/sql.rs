//! SQL text generation
//!
//! Identifiers come from introspected metadata and are always quoted; values
//! are always bound through numbered `?N` placeholders.

use super::planner::{Binding, InsertQuery, ListingQuery, UpdateQuery};
use crate::catalog::{quote_ident, Table};

/// Accumulates SQL text and its positional arguments
#[derive(Debug, Default)]
pub struct SqlBuilder {
    sql: String,
    args: Vec<String>,
}

impl SqlBuilder {
    /// Start a statement
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            args: Vec::new(),
        }
    }

    /// Append raw SQL text
    pub fn push(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    /// Bind a value and return its placeholder
    pub fn bind(&mut self, value: impl Into<String>) -> String {
        self.args.push(value.into());
        format!("?{}", self.args.len())
    }

    /// Bind arguments already referenced by pre-numbered fragments
    pub fn bind_raw(&mut self, args: &[String]) {
        self.args.extend_from_slice(args);
    }

    /// `"col" = ?N` for each binding
    pub fn equalities(&mut self, bindings: &[Binding]) -> Vec<String> {
        bindings
            .iter()
            .map(|b| format!("{} = {}", quote_ident(&b.column), self.bind(b.value.as_str())))
            .collect()
    }

    /// Append ` WHERE a AND b ...` unless there are no predicates
    pub fn where_all(&mut self, predicates: &[String]) -> &mut Self {
        if !predicates.is_empty() {
            self.sql.push_str(" WHERE ");
            self.sql.push_str(&predicates.join(" AND "));
        }
        self
    }

    /// Finish and return the statement with its arguments
    pub fn build(self) -> (String, Vec<String>) {
        (self.sql, self.args)
    }
}

fn select_all(table: &Table) -> SqlBuilder {
    SqlBuilder::new(format!("SELECT * FROM {}", quote_ident(&table.name)))
}

/// SELECT ... [WHERE ...] [ORDER BY ...] LIMIT n OFFSET m
pub fn listing_sql(table: &Table, query: &ListingQuery) -> (String, Vec<String>) {
    let mut sql = select_all(table);
    sql.bind_raw(&query.raw_args);

    let mut predicates = query.raw_predicates.clone();
    predicates.extend(sql.equalities(&query.filters));
    sql.where_all(&predicates);

    if !query.sort.is_empty() {
        let order: Vec<String> = query.sort.iter().map(|c| quote_ident(c)).collect();
        sql.push(" ORDER BY ").push(&order.join(", "));
    }
    sql.push(&format!(
        " LIMIT {} OFFSET {}",
        query.page.limit, query.page.offset
    ));
    sql.build()
}

/// SELECT ... WHERE <equalities> LIMIT 1
pub fn lookup_sql(table: &Table, filters: &[Binding]) -> (String, Vec<String>) {
    let mut sql = select_all(table);
    let predicates = sql.equalities(filters);
    sql.where_all(&predicates).push(" LIMIT 1");
    sql.build()
}

/// INSERT ... RETURNING *
pub fn insert_sql(table: &Table, query: &InsertQuery) -> (String, Vec<String>) {
    let mut sql = SqlBuilder::new(format!("INSERT INTO {}", quote_ident(&table.name)));
    if query.values.is_empty() {
        sql.push(" DEFAULT VALUES");
    } else {
        let columns: Vec<String> = query.values.iter().map(|b| quote_ident(&b.column)).collect();
        let placeholders: Vec<String> = query
            .values
            .iter()
            .map(|b| sql.bind(b.value.as_str()))
            .collect();
        sql.push(&format!(
            " ({}) VALUES ({})",
            columns.join(", "),
            placeholders.join(", ")
        ));
    }
    sql.push(" RETURNING *");
    sql.build()
}

/// UPDATE ... SET ... WHERE <key> RETURNING *
pub fn update_sql(table: &Table, query: &UpdateQuery) -> (String, Vec<String>) {
    let mut sql = SqlBuilder::new(format!("UPDATE {} SET ", quote_ident(&table.name)));
    let assignments = sql.equalities(&query.set);
    sql.push(&assignments.join(", "));
    let predicates = sql.equalities(&query.key);
    sql.where_all(&predicates).push(" RETURNING *");
    sql.build()
}

/// DELETE ... WHERE <key>
pub fn delete_sql(table: &Table, key: &[Binding]) -> (String, Vec<String>) {
    let mut sql = SqlBuilder::new(format!("DELETE FROM {}", quote_ident(&table.name)));
    let predicates = sql.equalities(key);
    sql.where_all(&predicates);
    sql.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::planner::Page;

    fn table() -> Table {
        let mut t = Table::new("line_items");
        t.key = crate::catalog::ColumnSet::new(["id"]);
        t
    }

    #[test]
    fn test_listing_sql_numbers_filters_after_raw_args() {
        let query = ListingQuery {
            raw_predicates: vec!["x IN (SELECT y FROM z WHERE id = ?1)".to_string()],
            raw_args: vec!["5".to_string()],
            filters: vec![Binding::new("qty", "2")],
            sort: vec!["id".to_string()],
            page: Page { limit: 10, offset: 20 },
        };
        let (sql, args) = listing_sql(&table(), &query);
        assert_eq!(
            sql,
            "SELECT * FROM \"line_items\" WHERE x IN (SELECT y FROM z WHERE id = ?1) \
             AND \"qty\" = ?2 ORDER BY \"id\" LIMIT 10 OFFSET 20"
        );
        assert_eq!(args, vec!["5", "2"]);
    }

    #[test]
    fn test_listing_sql_without_order() {
        let query = ListingQuery {
            raw_predicates: vec![],
            raw_args: vec![],
            filters: vec![],
            sort: vec![],
            page: Page { limit: 10, offset: 0 },
        };
        let (sql, args) = listing_sql(&Table::new("audit_log"), &query);
        assert_eq!(sql, "SELECT * FROM \"audit_log\" LIMIT 10 OFFSET 0");
        assert!(args.is_empty());
    }

    #[test]
    fn test_insert_sql() {
        let query = InsertQuery {
            values: vec![Binding::new("order_id", "1"), Binding::new("qty", "2")],
        };
        let (sql, args) = insert_sql(&table(), &query);
        assert_eq!(
            sql,
            "INSERT INTO \"line_items\" (\"order_id\", \"qty\") VALUES (?1, ?2) RETURNING *"
        );
        assert_eq!(args, vec!["1", "2"]);

        let (sql, _) = insert_sql(&table(), &InsertQuery { values: vec![] });
        assert_eq!(sql, "INSERT INTO \"line_items\" DEFAULT VALUES RETURNING *");
    }

    #[test]
    fn test_update_sql() {
        let query = UpdateQuery {
            set: vec![Binding::new("qty", "9")],
            key: vec![Binding::new("id", "7")],
        };
        let (sql, args) = update_sql(&table(), &query);
        assert_eq!(
            sql,
            "UPDATE \"line_items\" SET \"qty\" = ?1 WHERE \"id\" = ?2 RETURNING *"
        );
        assert_eq!(args, vec!["9", "7"]);
    }

    #[test]
    fn test_delete_sql() {
        let (sql, args) = delete_sql(&table(), &[Binding::new("id", "7")]);
        assert_eq!(sql, "DELETE FROM \"line_items\" WHERE \"id\" = ?1");
        assert_eq!(args, vec!["7"]);
    }
}
