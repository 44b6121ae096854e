// Outer-Join Linearizer
//
// This module rewrites nested left outer joins towards a left-deep chain:
//
//     LeftOuter(A, LeftOuter(B, C, q), p)  =>  LeftOuter(LeftOuter(A, B, p), C, q)
//
// Right outer joins are first turned into left outer joins by swapping their
// inputs. The rotation is only applied when it cannot change the result; every
// refused candidate is logged with the reason it was blocked.

use std::fmt;

use log::debug;

use crate::common::{NodeId, TableSet};
use crate::query::planner::context::CompilationContext;
use crate::query::planner::error::RewriteResult;
use crate::query::planner::join_tree::{JoinKind, JoinNode, JoinTree, Rotation};
use crate::query::planner::predicate::{ConjunctKind, Predicate};
use crate::query::planner::relation::Relations;
use crate::query::planner::trace::{RewritePass, RewriteRule, RewriteStep, RewriteTrace};

/// Why a rotation candidate was left alone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// One of the ON clauses has a conjunct we cannot reason about
    Unclassifiable,
    /// The outer ON clause references the innermost input
    ReferencesNullProducingInput,
    /// An OR in the outer ON clause spans both of its new inputs
    StraddlingDisjunction,
    /// The outer ON clause does not join its two new inputs
    DoesNotJoinInputs,
    /// A NULL-extended row of the middle input could satisfy the inner ON clause
    NotNullRejecting,
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            BlockReason::Unclassifiable => "ON clause is not classifiable",
            BlockReason::ReferencesNullProducingInput => "outer ON clause references the null-producing input",
            BlockReason::StraddlingDisjunction => "outer ON clause has a disjunction across its inputs",
            BlockReason::DoesNotJoinInputs => "outer ON clause does not join both inputs",
            BlockReason::NotNullRejecting => "inner ON clause does not reject NULLs of its preserved input",
        };
        write!(f, "{}", text)
    }
}

/// Legality of `LeftOuter(A, LeftOuter(B, C, q), p)` => `LeftOuter(LeftOuter(A, B, p), C, q)`.
///
/// Returns `None` when the rotation is allowed. `q` cannot reference `A`:
/// the tree keeps every ON clause inside the span of its own node.
pub fn rotation_blocker(a: &TableSet, b: &TableSet, p: &Predicate, q: &Predicate) -> Option<BlockReason> {
    if !p.is_classifiable() || !q.is_classifiable() {
        return Some(BlockReason::Unclassifiable);
    }
    if !p.referenced_tables().is_subset_of(&a.union(b)) {
        return Some(BlockReason::ReferencesNullProducingInput);
    }
    let straddles = p.conjuncts().iter().any(|c| {
        c.kind == ConjunctKind::Disjunction && c.referenced_tables.overlaps(a) && c.referenced_tables.overlaps(b)
    });
    if straddles {
        return Some(BlockReason::StraddlingDisjunction);
    }
    let joined = p.non_constant_tables();
    if !(joined.overlaps(a) && joined.overlaps(b)) {
        return Some(BlockReason::DoesNotJoinInputs);
    }
    // An all-NULL B row surviving q would be kept by the rotated form but
    // dropped by the original one.
    if !q.null_rejects_any(b) {
        return Some(BlockReason::NotNullRejecting);
    }
    None
}

pub struct OuterJoinLinearizer {
    max_sweeps: usize,
}

impl OuterJoinLinearizer {
    pub fn new(max_sweeps: usize) -> Self {
        OuterJoinLinearizer {
            max_sweeps: max_sweeps.max(1),
        }
    }

    /// Sweep the tree until no rotation fires. Returns whether it changed.
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
                self.visit(t, id, relations, ctx, trace)
            })?;
            if !swept {
                debug!("linearizer: fixpoint after {} sweep(s)", sweep + 1);
                return Ok(changed);
            }
            changed = true;
        }
        debug!("linearizer: stopped after {} sweeps", self.max_sweeps);
        Ok(changed)
    }

    fn visit(
        &self,
        tree: &mut JoinTree,
        id: NodeId,
        relations: &Relations,
        ctx: &CompilationContext,
        trace: &mut RewriteTrace,
    ) -> RewriteResult<Option<NodeId>> {
        let mut current = id;
        let mut normalized = false;
        if let JoinNode::RightOuter { left, right, on } = tree.node(id)?.node {
            current = tree.add_join(JoinKind::LeftOuter, right, left, on)?;
            normalized = true;
            debug!("linearizer: right outer join at node {} flipped", id);
            if trace.is_enabled() {
                trace.record(RewriteStep {
                    pass: RewritePass::Linearization,
                    rule: RewriteRule::NormalizeRightOuter,
                    before: tree.shape(id, relations)?,
                    after: tree.shape(current, relations)?,
                });
            }
        }

        let rotated = tree.pull_up_left_spine(ctx.interrupt(), current, |t, n| {
            self.try_rotate(t, n, relations, trace)
        })?;
        match rotated {
            Some(new_id) => Ok(Some(new_id)),
            None if normalized => Ok(Some(current)),
            None => Ok(None),
        }
    }

    fn try_rotate(
        &self,
        tree: &mut JoinTree,
        id: NodeId,
        relations: &Relations,
        trace: &mut RewriteTrace,
    ) -> RewriteResult<Option<Rotation>> {
        let JoinNode::LeftOuter { left: a, right, on: p } = tree.node(id)?.node else {
            return Ok(None);
        };
        let JoinNode::LeftOuter { left: b, right: c, on: q } = tree.node(right)?.node else {
            return Ok(None);
        };

        let a_span = tree.spanned(a)?;
        let b_span = tree.spanned(b)?;
        if let Some(reason) = rotation_blocker(&a_span, &b_span, tree.predicate(p)?, tree.predicate(q)?) {
            debug!(
                "linearizer: {} blocked: {}",
                tree.shape(id, relations).unwrap_or_default(),
                reason
            );
            return Ok(None);
        }

        let new_left = tree.add_join(JoinKind::LeftOuter, a, b, p)?;
        if trace.is_enabled() {
            trace.record(RewriteStep {
                pass: RewritePass::Linearization,
                rule: RewriteRule::OuterJoinAssociativity,
                before: tree.shape(id, relations)?,
                after: tree.shape_of_join(JoinKind::LeftOuter, new_left, c, relations)?,
            });
        }
        debug!("linearizer: rotated node {}", id);
        Ok(Some(Rotation {
            kind: JoinKind::LeftOuter,
            left: new_left,
            right: c,
            on: q,
        }))
    }
}
