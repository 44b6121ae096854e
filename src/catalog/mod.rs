//! Catalog Facade Module
//!
//! This module holds the table metadata the join rewrites consult: column
//! names and the unique key column sets (primary key and unique indexes) of
//! every base table. A catalog is populated once and then shared read-only as
//! an `Arc` snapshot for the lifetime of one compilation.

pub mod schema;
pub mod table;
pub mod column;

// Re-export key types
pub use self::table::{ColumnSet, Table};
pub use self::column::Column;
pub use self::schema::DataType;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Errors raised while populating or querying the catalog
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CatalogError {
    #[error("Table {0} already exists")]
    TableExists(String),
    #[error("Table not found: {0}")]
    TableNotFound(String),
    #[error("Column {0} not found in table {1}")]
    ColumnNotFound(String, String),
    #[error("Duplicate column {0} in table {1}")]
    DuplicateColumn(String, String),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

// Every catalog gets a distinct version so a snapshot can be told apart from
// one built later in the same process.
static NEXT_VERSION: AtomicU64 = AtomicU64::new(1);

/// The Catalog is the repository of table definitions for one database state
#[derive(Debug, Clone)]
pub struct Catalog {
    /// Tables keyed by name
    tables: HashMap<String, Table>,
    /// Snapshot version, bumped on every change
    version: u64,
    /// Counter for assigning table IDs
    table_id_counter: u32,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog {
    /// Create a new, empty catalog
    pub fn new() -> Self {
        Catalog {
            tables: HashMap::new(),
            version: NEXT_VERSION.fetch_add(1, Ordering::SeqCst),
            table_id_counter: 1,
        }
    }

    /// Create a table, returning its assigned ID
    pub fn create_table(&mut self, mut table: Table) -> CatalogResult<u32> {
        if self.tables.contains_key(table.name()) {
            return Err(CatalogError::TableExists(table.name().to_string()));
        }

        let id = self.table_id_counter;
        self.table_id_counter += 1;
        table.set_id(id);
        self.tables.insert(table.name().to_string(), table);
        self.version = NEXT_VERSION.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    /// Declare a unique index on an existing table
    pub fn add_unique_index(&mut self, table_name: &str, column_names: &[&str]) -> CatalogResult<()> {
        let table = self
            .tables
            .get_mut(table_name)
            .ok_or_else(|| CatalogError::TableNotFound(table_name.to_string()))?;
        table.add_unique_index(column_names)?;
        self.version = NEXT_VERSION.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Check if a table exists
    pub fn table_exists(&self, table_name: &str) -> bool {
        self.tables.contains_key(table_name)
    }

    /// Get a table by name
    pub fn get_table(&self, table_name: &str) -> Option<&Table> {
        self.tables.get(table_name)
    }

    /// Unique key column sets of a table, possibly empty
    pub fn unique_keys(&self, table_name: &str) -> CatalogResult<Vec<ColumnSet>> {
        self.get_table(table_name)
            .map(|t| t.unique_keys())
            .ok_or_else(|| CatalogError::TableNotFound(table_name.to_string()))
    }

    /// Names of all tables, sorted
    pub fn table_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Freeze the catalog into a shareable read-only snapshot
    pub fn snapshot(self) -> Arc<Catalog> {
        Arc::new(self)
    }
}
