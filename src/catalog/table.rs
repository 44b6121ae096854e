//! Table Management Module
//!
//! This module defines the Table type: columns plus the uniqueness metadata
//! (primary key and unique indexes) the join rewrites consult.

use std::collections::{BTreeSet, HashMap};
use super::column::Column;
use super::CatalogError;
use serde::{Serialize, Deserialize};

/// A set of column ordinals no two distinct rows agree on
pub type ColumnSet = BTreeSet<usize>;

/// Represents a catalog table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    /// Table ID (unique within the catalog)
    id: u32,
    /// Table name
    name: String,
    /// Columns in the table
    columns: Vec<Column>,
    /// Column name to index lookup
    column_map: HashMap<String, usize>,
    /// Primary key column indices
    primary_key_columns: Vec<usize>,
    /// Unique indexes, each a set of column indices
    unique_indexes: Vec<ColumnSet>,
}

impl Table {
    /// Create a new table with the given name and columns
    pub fn new(name: String, columns: Vec<Column>) -> Result<Self, CatalogError> {
        let mut column_map = HashMap::new();
        let mut primary_key_columns = Vec::new();

        for (i, col) in columns.iter().enumerate() {
            if column_map.insert(col.name().to_string(), i).is_some() {
                return Err(CatalogError::DuplicateColumn(col.name().to_string(), name));
            }
            if col.is_primary_key() {
                primary_key_columns.push(i);
            }
        }

        Ok(Table {
            id: 0, // set by Catalog
            name,
            columns,
            column_map,
            primary_key_columns,
            unique_indexes: Vec::new(),
        })
    }

    /// Get the table ID
    pub fn id(&self) -> u32 {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: u32) {
        self.id = id;
    }

    /// Get the table name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get all columns
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Get the column index for a column name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.column_map.get(name).copied()
    }

    /// Get primary key column indices
    pub fn primary_key_columns(&self) -> &[usize] {
        &self.primary_key_columns
    }

    /// Declare a unique index over the named columns
    pub fn add_unique_index(&mut self, column_names: &[&str]) -> Result<(), CatalogError> {
        let mut key = ColumnSet::new();
        for name in column_names {
            let idx = self.column_index(name).ok_or_else(|| {
                CatalogError::ColumnNotFound(name.to_string(), self.name.clone())
            })?;
            key.insert(idx);
        }
        if !key.is_empty() && !self.unique_indexes.contains(&key) {
            self.unique_indexes.push(key);
        }
        Ok(())
    }

    /// Builder-style variant of `add_unique_index`
    pub fn with_unique_index(mut self, column_names: &[&str]) -> Result<Self, CatalogError> {
        self.add_unique_index(column_names)?;
        Ok(self)
    }

    /// All unique keys: the primary key (if any) followed by the unique indexes
    pub fn unique_keys(&self) -> Vec<ColumnSet> {
        let mut keys = Vec::with_capacity(self.unique_indexes.len() + 1);
        if !self.primary_key_columns.is_empty() {
            keys.push(self.primary_key_columns.iter().copied().collect());
        }
        for index in &self.unique_indexes {
            if !keys.contains(index) {
                keys.push(index.clone());
            }
        }
        keys
    }
}
