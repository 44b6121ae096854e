// Outer Join Rewrite Engine

pub mod catalog;
pub mod common;
pub mod query;

// Re-export key items for convenient access
pub use catalog::Catalog;
pub use query::binder::{bind, BindError, QueryDocument};
pub use query::executor::{execute, Instance, QueryResultSet};
pub use query::planner::{
    CancellationToken, CompilationContext, Deadline, JoinKind, Optimizer, OptimizerConfig, QueryBlock,
    QueryBuilder, RewriteError, RewriteOutcome, RewriteResult,
};
