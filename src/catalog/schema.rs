// Column Data Types
//
// This module defines the data types a catalog column can declare.

use std::fmt;
use serde::{Serialize, Deserialize};

/// Data types supported by the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Integer,
    Float,
    Text,
    Boolean,
}

impl Default for DataType {
    fn default() -> Self {
        DataType::Integer
    }
}

impl DataType {
    /// Convert a string representation to a DataType
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.to_uppercase().as_str() {
            "INT" | "INTEGER" => Ok(DataType::Integer),
            "FLOAT" | "REAL" | "DOUBLE" => Ok(DataType::Float),
            "TEXT" | "VARCHAR" | "CHAR" | "STRING" => Ok(DataType::Text),
            "BOOL" | "BOOLEAN" => Ok(DataType::Boolean),
            _ => Err(format!("Unknown data type: {}", s)),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Integer => "INTEGER",
            DataType::Float => "FLOAT",
            DataType::Text => "TEXT",
            DataType::Boolean => "BOOLEAN",
        };
        write!(f, "{}", name)
    }
}
