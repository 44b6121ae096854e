// Query Executor Module
//
// This module evaluates a query block over in-memory table instances. It is
// a reference evaluator: nested loops, no indexes, exact SQL NULL semantics.

pub mod expression_eval;
pub mod nested_loop;
pub mod result;

// Export key types
pub use self::nested_loop::{execute, Instance};
pub use self::result::{DataValue, QueryError, QueryResult, QueryResultSet, Row};
