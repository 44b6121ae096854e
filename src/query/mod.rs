// Query Processing Module
//
// This module contains the expression model, the JSON binder, the join tree
// rewrites and the reference evaluator used to check them.

pub mod ast;
pub mod binder;
pub mod executor;
pub mod planner;

// Export key public interfaces
pub use binder::{bind, BindError, QueryDocument};
pub use executor::result::{QueryError, QueryResult};
pub use planner::{Optimizer, OptimizerConfig, QueryBlock, QueryBuilder};
