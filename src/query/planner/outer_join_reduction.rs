// Outer Join Reduction
//
// This module turns outer joins into inner joins when a predicate above them
// discards every NULL-extended row they could produce. The set of relations
// that must be non-NULL flows top-down from the WHERE clause: inner joins add
// their own ON clause to it, outer joins only hand it to their preserved input.

use std::collections::HashSet;

use log::debug;

use crate::common::{NodeId, TableSet};
use crate::query::planner::context::CompilationContext;
use crate::query::planner::error::RewriteResult;
use crate::query::planner::join_tree::{JoinKind, JoinTree};
use crate::query::planner::predicate::Predicate;
use crate::query::planner::relation::Relations;
use crate::query::planner::trace::{RewritePass, RewriteRule, RewriteStep, RewriteTrace};

#[derive(Debug, Default)]
pub struct OuterJoinReducer;

impl OuterJoinReducer {
    pub fn new() -> Self {
        OuterJoinReducer
    }

    /// Demote every outer join whose null-producing input is rejected from
    /// above. Returns whether any join was demoted.
    pub fn run(
        &self,
        tree: &mut JoinTree,
        where_clause: &Predicate,
        relations: &Relations,
        ctx: &CompilationContext,
        trace: &mut RewriteTrace,
    ) -> RewriteResult<bool> {
        let demote = self.collect_demotions(tree, where_clause, relations, ctx)?;
        if demote.is_empty() {
            return Ok(false);
        }

        tree.rewrite_bottom_up(ctx.interrupt(), |t, original, current| {
            if !demote.contains(&original) {
                return Ok(None);
            }
            let Some((kind, left, right, on)) = t.node(current)?.node.parts() else {
                return Ok(None);
            };
            let demoted = t.add_join(JoinKind::Inner, left, right, on)?;
            debug!("outer join reduction: {} join at node {} is now inner", kind, original);
            if trace.is_enabled() {
                trace.record(RewriteStep {
                    pass: RewritePass::OuterJoinReduction,
                    rule: RewriteRule::OuterToInner,
                    before: t.shape(current, relations)?,
                    after: t.shape(demoted, relations)?,
                });
            }
            Ok(Some(demoted))
        })
    }

    fn collect_demotions(
        &self,
        tree: &JoinTree,
        where_clause: &Predicate,
        relations: &Relations,
        ctx: &CompilationContext,
    ) -> RewriteResult<HashSet<NodeId>> {
        let mut demote = HashSet::new();
        let mut stack: Vec<(NodeId, TableSet)> = vec![(tree.root()?, where_clause.null_rejected())];
        while let Some((id, incoming)) = stack.pop() {
            ctx.check_interrupt()?;
            let Some((kind, left, right, on)) = tree.node(id)?.node.parts() else {
                continue;
            };
            let on = tree.predicate(on)?;
            let local = on.null_rejected();

            let (preserved, null_producing) = match kind {
                JoinKind::Inner => {
                    let pass = incoming.union(&local);
                    stack.push((right, pass));
                    stack.push((left, pass));
                    continue;
                }
                JoinKind::LeftOuter => (left, right),
                JoinKind::RightOuter => (right, left),
            };

            if on.is_contradiction() {
                debug!(
                    "outer join reduction: {} has an ON clause that never holds",
                    tree.shape(id, relations).unwrap_or_default()
                );
            }
            let rejected = incoming.overlaps(&tree.spanned(null_producing)?);
            if rejected && on.is_classifiable() {
                demote.insert(id);
                let pass = incoming.union(&local);
                stack.push((right, pass));
                stack.push((left, pass));
            } else {
                if rejected {
                    debug!(
                        "outer join reduction: {} kept, ON clause is not classifiable",
                        tree.shape(id, relations).unwrap_or_default()
                    );
                }
                stack.push((null_producing, local));
                stack.push((preserved, incoming));
            }
        }
        Ok(demote)
    }
}
