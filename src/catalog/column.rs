// Column Management Module
//
// This module defines the Column type that represents a catalog column.

use super::schema::DataType;
use serde::{Serialize, Deserialize};

/// Represents a column in a catalog table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    /// Column name
    name: String,
    /// Column data type
    data_type: DataType,
    /// Whether this column can contain NULL values
    nullable: bool,
    /// Whether this column is part of the primary key
    primary_key: bool,
}

impl Column {
    /// Create a new column
    pub fn new(name: String, data_type: DataType, nullable: bool, primary_key: bool) -> Self {
        Column {
            name,
            data_type,
            // primary key columns are implicitly NOT NULL
            nullable: nullable && !primary_key,
            primary_key,
        }
    }

    /// Shorthand for a nullable, non-key column
    pub fn nullable(name: &str, data_type: DataType) -> Self {
        Column::new(name.to_string(), data_type, true, false)
    }

    /// Shorthand for a primary key column
    pub fn primary_key(name: &str, data_type: DataType) -> Self {
        Column::new(name.to_string(), data_type, false, true)
    }

    /// Get the column name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the column data type
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Check if the column can contain NULL values
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Check if the column is part of the primary key
    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }
}
