// Query Optimizer Implementation
//
// This module drives the outer join rewrites of one query block. Each round
// runs linearization, outer join reduction and inner join reordering in turn;
// the rounds repeat until one of them changes nothing, since a demoted outer
// join can unlock further rotations.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::query::ast::ColumnRef;
use crate::query::planner::context::CompilationContext;
use crate::query::planner::error::RewriteResult;
use crate::query::planner::join_reordering::InnerJoinReorderer;
use crate::query::planner::join_tree::{JoinKind, JoinTree};
use crate::query::planner::linearizer::OuterJoinLinearizer;
use crate::query::planner::outer_join_reduction::OuterJoinReducer;
use crate::query::planner::predicate::Predicate;
use crate::query::planner::query::QueryBlock;
use crate::query::planner::trace::RewriteTrace;

/// Optimizer settings, loadable from JSON
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub enable_linearization: bool,
    pub enable_outer_join_reduction: bool,
    pub enable_inner_join_reordering: bool,
    /// Move inner joins below outer joins even when no unique key backs the move
    pub reorder_without_unique_key: bool,
    /// Cap on driver rounds and on the sweeps of each pass
    pub max_iterations: usize,
    pub collect_trace: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig {
            enable_linearization: true,
            enable_outer_join_reduction: true,
            enable_inner_join_reordering: true,
            reorder_without_unique_key: false,
            max_iterations: 64,
            collect_trace: true,
        }
    }
}

/// What the optimizer hands to plan enumeration
#[derive(Debug, Clone)]
pub struct RewriteOutcome {
    /// Compacted rewritten tree over the same leaves
    pub tree: JoinTree,
    pub where_clause: Predicate,
    /// Client-visible column order of the input block
    pub projection: Vec<ColumnRef>,
    pub changed: bool,
    pub iterations: usize,
    pub trace: Option<RewriteTrace>,
}

impl RewriteOutcome {
    /// The rewritten block, selecting the original columns in their original order
    pub fn apply_to(&self, query: &QueryBlock) -> QueryBlock {
        QueryBlock {
            relations: query.relations.clone(),
            tree: self.tree.clone(),
            where_clause: self.where_clause.clone(),
            select: Some(self.projection.clone()),
        }
    }
}

/// The main optimizer class that applies the rewrite passes to a query block
#[derive(Debug, Clone, Default)]
pub struct Optimizer {
    config: OptimizerConfig,
}

impl Optimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Optimizer { config }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Rewrite `query` to a fixpoint. The input block is left untouched, so
    /// the caller still holds a valid tree when this returns an error.
    pub fn optimize(&self, query: &QueryBlock, ctx: &CompilationContext) -> RewriteResult<RewriteOutcome> {
        let relations = &query.relations;
        let projection = query.output_columns()?;
        let max_iterations = self.config.max_iterations.max(1);

        let mut tree = query.tree.clone();
        let mut trace = RewriteTrace::new(self.config.collect_trace);
        if trace.is_enabled() {
            trace.plan_before = tree.explain(relations)?;
        }

        let linearizer = OuterJoinLinearizer::new(max_iterations);
        let reducer = OuterJoinReducer::new();
        let reorderer = InnerJoinReorderer::new(!self.config.reorder_without_unique_key, max_iterations);

        let mut changed = false;
        let mut converged = false;
        let mut iterations = 0;
        while iterations < max_iterations {
            ctx.check_interrupt()?;
            iterations += 1;
            let mut round = false;
            if self.config.enable_linearization {
                round |= linearizer.run(&mut tree, relations, ctx, &mut trace)?;
            }
            if self.config.enable_outer_join_reduction {
                round |= reducer.run(&mut tree, &query.where_clause, relations, ctx, &mut trace)?;
            }
            if self.config.enable_inner_join_reordering {
                round |= reorderer.run(&mut tree, relations, ctx, &mut trace)?;
            }
            if !round {
                converged = true;
                break;
            }
            changed = true;
        }
        if !converged {
            warn!(
                "optimizer: stopped after {} iterations before reaching a fixpoint",
                max_iterations
            );
        }

        let tree = tree.compact()?;
        tree.validate()?;
        if trace.is_enabled() {
            trace.plan_after = tree.explain(relations)?;
        }
        info!(
            "optimizer: {} iteration(s), changed = {}, {} join(s), {} outer",
            iterations,
            changed,
            tree.join_count()?,
            tree.count_kind(JoinKind::LeftOuter)? + tree.count_kind(JoinKind::RightOuter)?
        );

        Ok(RewriteOutcome {
            tree,
            where_clause: query.where_clause.clone(),
            projection,
            changed,
            iterations,
            trace: self.config.collect_trace.then_some(trace),
        })
    }
}
