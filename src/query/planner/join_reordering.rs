// Join Reordering
//
// This module moves inner joins below left outer joins:
//
//     Inner(D, LeftOuter(B, C, q), p)  =>  LeftOuter(Inner(D, B, p), C, q)
//     Inner(LeftOuter(B, C, q), D, p)  =>  LeftOuter(Inner(B, D, p), C, q)
//
// The new inner join keeps travelling down the left spine for as long as the
// rule applies, so an inner join can cross several outer joins in one visit.

use std::fmt;

use log::debug;

use crate::common::{NodeId, RelId, TableSet};
use crate::query::ast::ColumnRef;
use crate::query::planner::context::CompilationContext;
use crate::query::planner::equivalence::EquivalenceClasses;
use crate::query::planner::error::RewriteResult;
use crate::query::planner::join_tree::{JoinKind, JoinNode, JoinTree, Rotation};
use crate::query::planner::predicate::Predicate;
use crate::query::planner::relation::Relations;
use crate::query::planner::trace::{RewritePass, RewriteRule, RewriteStep, RewriteTrace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReorderBlock {
    Unclassifiable,
    /// The inner ON clause references the null-producing input
    ReferencesNullProducingInput,
    /// The inner ON clause is not a conjunction of equalities
    NotEquiJoin,
    /// No equi-join between the inner join inputs
    NoJoinBetweenInputs,
    /// An equi-join pairs two instances of one base table
    SelfJoin,
    /// Neither side has a unique key determined by the other
    NoUniqueKey,
}

impl fmt::Display for ReorderBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ReorderBlock::Unclassifiable => "ON clause is not classifiable",
            ReorderBlock::ReferencesNullProducingInput => "inner ON clause references the null-producing input",
            ReorderBlock::NotEquiJoin => "inner ON clause is not a conjunction of equalities",
            ReorderBlock::NoJoinBetweenInputs => "inner ON clause does not join its inputs",
            ReorderBlock::SelfJoin => "self-join",
            ReorderBlock::NoUniqueKey => "no unique key covered",
        };
        write!(f, "{}", text)
    }
}

pub struct InnerJoinReorderer {
    require_unique_key: bool,
    max_sweeps: usize,
}

impl InnerJoinReorderer {
    pub fn new(require_unique_key: bool, max_sweeps: usize) -> Self {
        InnerJoinReorderer {
            require_unique_key,
            max_sweeps: max_sweeps.max(1),
        }
    }

    pub fn run(
        &self,
        tree: &mut JoinTree,
        relations: &Relations,
        ctx: &CompilationContext,
        trace: &mut RewriteTrace,
    ) -> RewriteResult<bool> {
        let mut changed = false;
        for sweep in 0..self.max_sweeps {
            let swept = tree.rewrite_bottom_up(ctx.interrupt(), |t, _, id| {
                t.pull_up_left_spine(ctx.interrupt(), id, |t, n| self.try_reorder(t, n, relations, ctx, trace))
            })?;
            if !swept {
                debug!("inner join reordering: fixpoint after {} sweep(s)", sweep + 1);
                return Ok(changed);
            }
            changed = true;
        }
        debug!("inner join reordering: stopped after {} sweeps", self.max_sweeps);
        Ok(changed)
    }

    fn try_reorder(
        &self,
        tree: &mut JoinTree,
        id: NodeId,
        relations: &Relations,
        ctx: &CompilationContext,
        trace: &mut RewriteTrace,
    ) -> RewriteResult<Option<Rotation>> {
        let JoinNode::Inner { left, right, on: p } = tree.node(id)?.node else {
            return Ok(None);
        };

        // (D, B, C, q, D goes left)
        let mut candidates = Vec::with_capacity(2);
        if let JoinNode::LeftOuter { left: b, right: c, on: q } = tree.node(right)?.node {
            candidates.push((left, b, c, q, true));
        }
        if let JoinNode::LeftOuter { left: b, right: c, on: q } = tree.node(left)?.node {
            candidates.push((right, b, c, q, false));
        }

        for (d, b, c, q, d_first) in candidates {
            let blocked = self.blocker(tree, d, b, c, tree.predicate(p)?, tree.predicate(q)?, relations, ctx)?;
            if let Some(reason) = blocked {
                debug!(
                    "inner join reordering: {} blocked: {}",
                    tree.shape(id, relations).unwrap_or_default(),
                    reason
                );
                continue;
            }
            let new_left = if d_first {
                tree.add_join(JoinKind::Inner, d, b, p)?
            } else {
                tree.add_join(JoinKind::Inner, b, d, p)?
            };
            if trace.is_enabled() {
                trace.record(RewriteStep {
                    pass: RewritePass::InnerJoinReordering,
                    rule: RewriteRule::InnerPastOuter,
                    before: tree.shape(id, relations)?,
                    after: tree.shape_of_join(JoinKind::LeftOuter, new_left, c, relations)?,
                });
            }
            debug!("inner join reordering: moved inner join at node {} below its outer input", id);
            return Ok(Some(Rotation {
                kind: JoinKind::LeftOuter,
                left: new_left,
                right: c,
                on: q,
            }));
        }
        Ok(None)
    }

    #[allow(clippy::too_many_arguments)]
    fn blocker(
        &self,
        tree: &JoinTree,
        d: NodeId,
        b: NodeId,
        c: NodeId,
        p: &Predicate,
        q: &Predicate,
        relations: &Relations,
        ctx: &CompilationContext,
    ) -> RewriteResult<Option<ReorderBlock>> {
        if !p.is_classifiable() || !q.is_classifiable() {
            return Ok(Some(ReorderBlock::Unclassifiable));
        }
        if p.referenced_tables().overlaps(&tree.spanned(c)?) {
            return Ok(Some(ReorderBlock::ReferencesNullProducingInput));
        }
        if !p.is_conjunction_of_equalities() {
            return Ok(Some(ReorderBlock::NotEquiJoin));
        }
        let d_span = tree.spanned(d)?;
        let b_span = tree.spanned(b)?;
        let joins_inputs = p.equi_joins().any(|(l, r)| {
            (d_span.contains(l.rel) && b_span.contains(r.rel)) || (b_span.contains(l.rel) && d_span.contains(r.rel))
        });
        if !joins_inputs {
            return Ok(Some(ReorderBlock::NoJoinBetweenInputs));
        }
        let self_join = p.equi_joins().any(|(l, r)| {
            let table = |rel: RelId| relations.get(rel).and_then(|r| r.base_table());
            matches!((table(l.rel), table(r.rel)), (Some(x), Some(y)) if x == y)
        });
        if self_join {
            return Ok(Some(ReorderBlock::SelfJoin));
        }
        if self.require_unique_key {
            let classes = EquivalenceClasses::from_predicate(p);
            let covered = self.key_covered(tree, d, &b_span, &classes, relations, ctx)?
                || self.key_covered(tree, b, &d_span, &classes, relations, ctx)?;
            if !covered {
                return Ok(Some(ReorderBlock::NoUniqueKey));
            }
        }
        Ok(None)
    }

    /// `side` is a base relation with a unique key whose every column is
    /// fixed by `other` or by a constant
    fn key_covered(
        &self,
        tree: &JoinTree,
        side: NodeId,
        other: &TableSet,
        classes: &EquivalenceClasses,
        relations: &Relations,
        ctx: &CompilationContext,
    ) -> RewriteResult<bool> {
        let JoinNode::Leaf(rel) = tree.node(side)?.node else {
            return Ok(false);
        };
        let keys = relations.unique_keys(ctx.catalog(), rel)?;
        Ok(keys.iter().any(|key| {
            !key.is_empty()
                && key
                    .iter()
                    .all(|&ordinal| classes.is_bound_by(ColumnRef::new(rel, ordinal), other))
        }))
    }
}
