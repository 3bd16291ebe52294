//! Schema introspection
//!
//! Turns raw catalog rows (columns, unique indexes, foreign keys) into one
//! `Table` record per relation. The rows come from a `CatalogReader`, so the
//! assembly logic is independent of the store that produced them.

use super::column_set::ColumnSet;
use super::table::Table;
use crate::error::{Error, Result};
use indexmap::IndexMap;
use tracing::{debug, info};

/// One column as reported by the store catalog
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    pub table: String,
    pub column: String,
    pub not_null: bool,
    /// 1-based position in the primary key, 0 when not a key column
    pub pk_ordinal: i64,
}

/// A column covered by a single-column unique index
#[derive(Debug, Clone, PartialEq)]
pub struct UniqueColumnInfo {
    pub table: String,
    pub column: String,
}

/// One column pair of a foreign-key constraint
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeyInfo {
    /// Constraint id, unique within the source table
    pub id: i64,
    pub table: String,
    pub column: String,
    pub target_table: String,
    /// `None` when the constraint references the target's primary key implicitly
    pub target_column: Option<String>,
    /// Position of this pair within the constraint
    pub seq: i64,
}

/// Read access to the store's schema catalog
pub trait CatalogReader {
    /// Every column of every table, grouped by table in schema order
    fn read_columns(&self) -> Result<Vec<ColumnInfo>>;

    /// Single-column unique indexes
    fn read_unique_columns(&self) -> Result<Vec<UniqueColumnInfo>>;

    /// Foreign-key column pairs, ordered by table, constraint id and seq
    fn read_foreign_keys(&self) -> Result<Vec<ForeignKeyInfo>>;
}

/// Accumulated state of one foreign-key constraint
#[derive(Debug, Default)]
struct ForeignKeyAccumulator {
    source: String,
    target: String,
    local: ColumnSet,
    remote: Vec<Option<String>>,
}

/// Builds table records from a catalog
pub struct Introspector;

impl Introspector {
    /// Read the catalog and assemble every table record
    pub fn introspect(reader: &dyn CatalogReader) -> Result<IndexMap<String, Table>> {
        let mut tables = Self::load_columns(reader.read_columns()?);
        Self::load_unique_columns(&mut tables, reader.read_unique_columns()?)?;
        let fk_count = Self::load_foreign_keys(&mut tables, reader.read_foreign_keys()?)?;

        info!(
            tables = tables.len(),
            foreign_keys = fk_count,
            "introspect.complete"
        );
        Ok(tables)
    }

    fn load_columns(rows: Vec<ColumnInfo>) -> IndexMap<String, Table> {
        let mut tables: IndexMap<String, Table> = IndexMap::new();
        let mut key_ordinals: IndexMap<String, Vec<(i64, String)>> = IndexMap::new();

        for row in rows {
            let table = tables
                .entry(row.table.clone())
                .or_insert_with(|| Table::new(row.table.clone()));
            table.columns.push(row.column.clone());

            if row.pk_ordinal > 0 {
                key_ordinals
                    .entry(row.table)
                    .or_default()
                    .push((row.pk_ordinal, row.column));
            }
        }

        for (name, mut ordinals) in key_ordinals {
            ordinals.sort_by_key(|(ordinal, _)| *ordinal);
            if let Some(table) = tables.get_mut(&name) {
                table.key = ordinals.into_iter().map(|(_, column)| column).collect();
            }
        }

        tables
    }

    fn load_unique_columns(
        tables: &mut IndexMap<String, Table>,
        rows: Vec<UniqueColumnInfo>,
    ) -> Result<()> {
        for row in rows {
            let table = tables.get_mut(&row.table).ok_or_else(|| {
                Error::SchemaCorrupted(format!("unique index on unknown table '{}'", row.table))
            })?;
            if !table.has_column(&row.column) || table.unique_columns.contains(&row.column) {
                continue;
            }
            // the key itself is already the primary identity
            if table.key.len() == 1 && table.is_key_column(&row.column) {
                continue;
            }
            table.unique_columns.push(row.column);
        }

        // declaration order, independent of index creation order
        for table in tables.values_mut() {
            let columns = &table.columns;
            let mut unique: Vec<String> = table.unique_columns.as_slice().to_vec();
            unique.sort_by_key(|c| columns.iter().position(|x| x == c.as_str()));
            table.unique_columns = unique.into_iter().collect();
        }
        Ok(())
    }

    fn load_foreign_keys(
        tables: &mut IndexMap<String, Table>,
        rows: Vec<ForeignKeyInfo>,
    ) -> Result<usize> {
        let mut pending: IndexMap<(String, i64), ForeignKeyAccumulator> = IndexMap::new();

        for row in rows {
            let slot = (row.table.clone(), row.id);
            if row.seq == 0 {
                pending.insert(slot.clone(), ForeignKeyAccumulator::default());
            }
            let fk = pending.entry(slot).or_default();
            fk.source = row.table;
            fk.target = row.target_table;
            fk.local.push(row.column);
            fk.remote.push(row.target_column);
        }

        let count = pending.len();
        for (_, fk) in pending {
            if !tables.contains_key(&fk.source) {
                return Err(Error::SchemaCorrupted(format!(
                    "foreign key on unknown table '{}'",
                    fk.source
                )));
            }
            let target = tables.get_mut(&fk.target).ok_or_else(|| {
                Error::SchemaCorrupted(format!(
                    "table '{}' references unknown table '{}'",
                    fk.source, fk.target
                ))
            })?;

            let remote = Self::resolve_remote(&fk, target)?;
            target.rev_linked.insert(fk.source.clone());

            debug!(
                source = %fk.source,
                local = %fk.local,
                target = %fk.target,
                remote = %remote,
                "introspect.foreign_key"
            );
            if let Some(source) = tables.get_mut(&fk.source) {
                source.add_link(fk.local, &fk.target, remote);
            }
        }

        Ok(count)
    }

    /// Fill in target columns the catalog left implicit (`REFERENCES t`)
    fn resolve_remote(fk: &ForeignKeyAccumulator, target: &Table) -> Result<ColumnSet> {
        fk.remote
            .iter()
            .enumerate()
            .map(|(i, column)| match column {
                Some(column) => Ok(column.clone()),
                None => target.key.get(i).map(str::to_string).ok_or_else(|| {
                    Error::SchemaCorrupted(format!(
                        "table '{}' references missing key column {} of '{}'",
                        fk.source, i, fk.target
                    ))
                }),
            })
            .collect::<Result<Vec<_>>>()
            .map(ColumnSet::from_iter)
    }
}
