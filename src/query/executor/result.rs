// Query Result Implementation
//
// This module defines the value, row and error types of the reference
// evaluator.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::query::ast::Value;

/// Possible data types for values in a row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataValue {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Boolean(bool),
}

impl Eq for DataValue {}

impl Hash for DataValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            DataValue::Null => 0.hash(state),
            DataValue::Integer(i) => { 1.hash(state); i.hash(state); }
            DataValue::Float(f) => { 2.hash(state); f.to_bits().hash(state); }
            DataValue::Text(s) => { 3.hash(state); s.hash(state); }
            DataValue::Boolean(b) => { 4.hash(state); b.hash(state); }
        }
    }
}

impl fmt::Display for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataValue::Null => write!(f, "NULL"),
            DataValue::Integer(i) => write!(f, "{}", i),
            DataValue::Float(fl) => write!(f, "{}", fl),
            DataValue::Text(s) => write!(f, "{}", s),
            DataValue::Boolean(b) => write!(f, "{}", b),
        }
    }
}

impl PartialOrd for DataValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (DataValue::Null, DataValue::Null) => Some(Ordering::Equal),
            (DataValue::Null, _) => Some(Ordering::Less),
            (_, DataValue::Null) => Some(Ordering::Greater),

            (DataValue::Integer(a), DataValue::Integer(b)) => a.partial_cmp(b),
            (DataValue::Float(a), DataValue::Float(b)) => a.partial_cmp(b),
            (DataValue::Integer(a), DataValue::Float(b)) => (*a as f64).partial_cmp(b),
            (DataValue::Float(a), DataValue::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (DataValue::Text(a), DataValue::Text(b)) => Some(a.cmp(b)),
            (DataValue::Boolean(a), DataValue::Boolean(b)) => a.partial_cmp(b),

            _ => None,
        }
    }
}

impl From<&Value> for DataValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => DataValue::Null,
            Value::Integer(i) => DataValue::Integer(*i),
            Value::Float(f) => DataValue::Float(*f),
            Value::String(s) => DataValue::Text(s.clone()),
            Value::Boolean(b) => DataValue::Boolean(*b),
        }
    }
}

impl DataValue {
    pub fn is_null(&self) -> bool {
        matches!(self, DataValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DataValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// SQL comparison: `Ok(None)` when either side is NULL
    pub fn compare(&self, other: &Self) -> QueryResult<Option<Ordering>> {
        if self.is_null() || other.is_null() {
            return Ok(None);
        }
        self.partial_cmp(other).map(Some).ok_or_else(|| {
            QueryError::TypeError(format!("Cannot compare {:?} and {:?}", self, other))
        })
    }

    /// Total order used to sort result rows for multiset comparison.
    /// NULLs first, then by type, then by value. Integers and floats share a
    /// rank and compare by value; equal values order integers first.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        fn rank(v: &DataValue) -> u8 {
            match v {
                DataValue::Null => 0,
                DataValue::Boolean(_) => 1,
                DataValue::Integer(_) | DataValue::Float(_) => 2,
                DataValue::Text(_) => 3,
            }
        }
        fn variant(v: &DataValue) -> u8 {
            match v {
                DataValue::Float(_) => 1,
                _ => 0,
            }
        }
        let by_value = match (self, other) {
            (DataValue::Float(a), DataValue::Float(b)) => a.total_cmp(b),
            (DataValue::Integer(a), DataValue::Float(b)) => (*a as f64).total_cmp(b),
            (DataValue::Float(a), DataValue::Integer(b)) => a.total_cmp(&(*b as f64)),
            _ => self.partial_cmp(other).unwrap_or(Ordering::Equal),
        };
        rank(self)
            .cmp(&rank(other))
            .then(by_value)
            .then_with(|| variant(self).cmp(&variant(other)))
    }
}

/// One output row, in result column order
pub type Row = Vec<DataValue>;

/// Errors raised by the reference evaluator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    /// Error during query execution
    #[error("Execution error: {0}")]
    ExecutionError(String),
    /// Error in data type conversion
    #[error("Type error: {0}")]
    TypeError(String),
    /// Table data not supplied
    #[error("Table not found: {0}")]
    TableNotFound(String),
    /// Column not found
    #[error("Column not found: {0}")]
    ColumnNotFound(String),
    /// Expression the evaluator does not support
    #[error("Unsupported expression: {0}")]
    Unsupported(String),
    /// Numeric overflow
    #[error("Numeric overflow")]
    NumericOverflow,
    /// Division by zero
    #[error("Division by zero")]
    DivisionByZero,
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;

/// Query resultset representation
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResultSet {
    /// Column names in the resultset
    columns: Vec<String>,
    /// Rows of data
    rows: Vec<Row>,
}

impl QueryResultSet {
    /// Create a new empty resultset with column names
    pub fn new(columns: Vec<String>) -> Self {
        QueryResultSet {
            columns,
            rows: Vec::new(),
        }
    }

    /// Add a row to the resultset
    pub fn add_row(&mut self, row: Row) {
        self.rows.push(row);
    }

    /// Get the columns in the resultset
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Get the rows in the resultset
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Get the number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Rows sorted by the total value order, so two result sets holding the
    /// same multiset of rows compare equal
    pub fn sorted_rows(&self) -> Vec<Row> {
        let mut rows = self.rows.clone();
        rows.sort_by(|a, b| {
            a.iter()
                .zip(b.iter())
                .map(|(x, y)| x.total_cmp(y))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or_else(|| a.len().cmp(&b.len()))
        });
        rows
    }

    /// Whether both result sets hold the same multiset of rows
    pub fn same_rows(&self, other: &QueryResultSet) -> bool {
        self.sorted_rows() == other.sorted_rows()
    }

    /// Format the resultset as a string table
    pub fn to_string_table(&self) -> String {
        if self.columns.is_empty() {
            return "Empty result".to_string();
        }

        let mut result = String::new();

        // Add column headers
        result.push_str("| ");
        for col in &self.columns {
            result.push_str(&format!("{} | ", col));
        }
        result.push('\n');

        // Add separator
        result.push('|');
        for col in &self.columns {
            result.push_str(&format!("{}|", "-".repeat(col.len() + 2)));
        }
        result.push('\n');

        for row in &self.rows {
            result.push_str("| ");
            for value in row {
                result.push_str(&format!("{} | ", value));
            }
            result.push('\n');
        }

        result
    }
}
