//! SQLite store
//!
//! Wraps a single rusqlite connection behind a mutex. The same connection
//! answers both data queries and the catalog reads used by introspection.

use super::value::{Row, Value};
use super::Store;
use crate::catalog::{CatalogReader, ColumnInfo, ForeignKeyInfo, UniqueColumnInfo};
use crate::error::{Error, Result};
use rusqlite::{params_from_iter, Connection, OpenFlags};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

const COLUMNS_SQL: &str = "
SELECT m.name, p.name, p.\"notnull\", p.pk
  FROM sqlite_master AS m
  JOIN pragma_table_info(m.name) AS p
 WHERE m.type = 'table' AND m.name NOT LIKE 'sqlite_%'
 ORDER BY m.name, p.cid";

// single-column UNIQUE constraints and unique indexes, no partial indexes
const UNIQUE_COLUMNS_SQL: &str = "
SELECT m.name, MAX(x.name)
  FROM sqlite_master AS m
  JOIN pragma_index_list(m.name) AS i
  JOIN pragma_index_info(i.name) AS x
 WHERE m.type = 'table' AND i.\"unique\" = 1 AND i.origin IN ('u', 'c') AND i.partial = 0
 GROUP BY m.name, i.name
HAVING COUNT(*) = 1
 ORDER BY m.name, i.name";

const FOREIGN_KEYS_SQL: &str = "
SELECT f.id, m.name, f.\"from\", f.\"table\", f.\"to\", f.seq
  FROM sqlite_master AS m
  JOIN pragma_foreign_key_list(m.name) AS f
 WHERE m.type = 'table' AND m.name NOT LIKE 'sqlite_%'
 ORDER BY m.name, f.id, f.seq";

/// SQLite-backed store
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open an existing database file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let meta = std::fs::metadata(path).map_err(|e| {
            Error::Config(format!("cannot open database '{}': {}", path.display(), e))
        })?;
        if meta.is_dir() {
            return Err(Error::Config(format!(
                "cannot introspect a directory: '{}'",
                path.display()
            )));
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Self::from_connection(conn)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Wrap an already-open connection
    pub fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run a batch of statements, e.g. a schema fixture
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.lock()?.execute_batch(sql)?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Internal("store connection lock poisoned".to_string()))
    }
}

impl Store for SqliteStore {
    fn query(&self, sql: &str, args: &[String]) -> Result<Vec<Row>> {
        debug!(sql, args = args.len(), "store.query");

        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let mut rows = stmt.query(params_from_iter(args.iter()))?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let mut data = Row::new();
            for (i, column) in columns.iter().enumerate() {
                data.insert(column.clone(), Value::from(row.get_ref(i)?));
            }
            result.push(data);
        }
        Ok(result)
    }

    fn execute(&self, sql: &str, args: &[String]) -> Result<usize> {
        debug!(sql, args = args.len(), "store.execute");

        let conn = self.lock()?;
        Ok(conn.execute(sql, params_from_iter(args.iter()))?)
    }
}

impl CatalogReader for SqliteStore {
    fn read_columns(&self) -> Result<Vec<ColumnInfo>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(COLUMNS_SQL)?;
        let rows = stmt.query_map([], |row| {
            Ok(ColumnInfo {
                table: row.get(0)?,
                column: row.get(1)?,
                not_null: row.get(2)?,
                pk_ordinal: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn read_unique_columns(&self) -> Result<Vec<UniqueColumnInfo>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(UNIQUE_COLUMNS_SQL)?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
        })?;

        let mut unique = Vec::new();
        for row in rows {
            // expression indexes have no column name
            if let (table, Some(column)) = row? {
                unique.push(UniqueColumnInfo { table, column });
            }
        }
        Ok(unique)
    }

    fn read_foreign_keys(&self) -> Result<Vec<ForeignKeyInfo>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(FOREIGN_KEYS_SQL)?;
        let rows = stmt.query_map([], |row| {
            Ok(ForeignKeyInfo {
                id: row.get(0)?,
                table: row.get(1)?,
                column: row.get(2)?,
                target_table: row.get(3)?,
                target_column: row.get(4)?,
                seq: row.get(5)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}
