// Query Planner Module
//
// This module rewrites the join tree of a bound query block before plan
// enumeration: outer join linearization, outer to inner join reduction and
// reordering of inner joins below outer joins.

pub mod context;
pub mod equivalence;
pub mod error;
pub mod join_reordering;
pub mod join_tree;
pub mod linearizer;
pub mod optimizer;
pub mod outer_join_reduction;
pub mod predicate;
pub mod query;
pub mod relation;
pub mod trace;

// Export key types
pub use self::context::{CancellationToken, CompilationContext, Deadline, Interrupt, NeverInterrupt};
pub use self::error::{RewriteError, RewriteResult};
pub use self::join_tree::{JoinKind, JoinNode, JoinTree};
pub use self::optimizer::{Optimizer, OptimizerConfig, RewriteOutcome};
pub use self::predicate::{classify, Predicate};
pub use self::query::{QueryBlock, QueryBuilder};
pub use self::relation::{Relation, RelationKind, Relations};
pub use self::trace::{RewriteRule, RewriteTrace};
