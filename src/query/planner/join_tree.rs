//! Join Tree Model
//!
//! The join tree of one query block lives in an append-only arena. Nodes are
//! never mutated: a rewrite appends the nodes it creates and shares every
//! untouched subtree by id, so a pass that changes one branch allocates only
//! along that branch. `compact` drops the nodes no longer reachable from the
//! root once the optimizer is done.
//!
//! Traversals use explicit stacks so that deep trees cannot exhaust the
//! call stack.

use std::collections::HashMap;
use std::fmt;

use crate::common::{NodeId, PredId, RelId, TableSet};
use crate::query::ast::ColumnRef;
use crate::query::planner::context::Interrupt;
use crate::query::planner::error::{RewriteError, RewriteResult};
use crate::query::planner::predicate::Predicate;
use crate::query::planner::relation::Relations;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinKind {
    Inner,
    /// Left child preserves rows, right child is null-producing
    LeftOuter,
    /// Right child preserves rows, left child is null-producing
    RightOuter,
}

impl JoinKind {
    pub fn is_outer(&self) -> bool {
        !matches!(self, JoinKind::Inner)
    }

    /// Short form used in tree shapes
    pub fn abbrev(&self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER",
            JoinKind::LeftOuter => "LOJ",
            JoinKind::RightOuter => "ROJ",
        }
    }

    pub fn sql(&self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::LeftOuter => "LEFT OUTER JOIN",
            JoinKind::RightOuter => "RIGHT OUTER JOIN",
        }
    }
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JoinKind::Inner => "Inner",
            JoinKind::LeftOuter => "Left Outer",
            JoinKind::RightOuter => "Right Outer",
        };
        write!(f, "{}", name)
    }
}

/// A node of the join tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinNode {
    Leaf(RelId),
    Inner { left: NodeId, right: NodeId, on: PredId },
    LeftOuter { left: NodeId, right: NodeId, on: PredId },
    RightOuter { left: NodeId, right: NodeId, on: PredId },
}

impl JoinNode {
    pub fn join(kind: JoinKind, left: NodeId, right: NodeId, on: PredId) -> JoinNode {
        match kind {
            JoinKind::Inner => JoinNode::Inner { left, right, on },
            JoinKind::LeftOuter => JoinNode::LeftOuter { left, right, on },
            JoinKind::RightOuter => JoinNode::RightOuter { left, right, on },
        }
    }

    /// `(kind, left, right, on)` of a join node, `None` for a leaf
    pub fn parts(&self) -> Option<(JoinKind, NodeId, NodeId, PredId)> {
        match *self {
            JoinNode::Leaf(_) => None,
            JoinNode::Inner { left, right, on } => Some((JoinKind::Inner, left, right, on)),
            JoinNode::LeftOuter { left, right, on } => Some((JoinKind::LeftOuter, left, right, on)),
            JoinNode::RightOuter { left, right, on } => Some((JoinKind::RightOuter, left, right, on)),
        }
    }

    pub fn kind(&self) -> Option<JoinKind> {
        self.parts().map(|(kind, ..)| kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeNode {
    pub node: JoinNode,
    /// Relations of all leaves below this node
    pub spanned_tables: TableSet,
}

/// Result of a rotation rule at one node: the freshly built new left child,
/// plus the right child, ON predicate and kind of the join to put on top
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rotation {
    pub kind: JoinKind,
    pub left: NodeId,
    pub right: NodeId,
    pub on: PredId,
}

#[derive(Debug, Clone, Default)]
pub struct JoinTree {
    nodes: Vec<TreeNode>,
    predicates: Vec<Predicate>,
    root: Option<NodeId>,
}

impl JoinTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_leaf(&mut self, rel: RelId) -> NodeId {
        self.nodes.push(TreeNode {
            node: JoinNode::Leaf(rel),
            spanned_tables: TableSet::single(rel),
        });
        self.nodes.len() - 1
    }

    pub fn add_predicate(&mut self, predicate: Predicate) -> PredId {
        self.predicates.push(predicate);
        self.predicates.len() - 1
    }

    /// Append a join node, checking the structural invariants
    pub fn add_join(&mut self, kind: JoinKind, left: NodeId, right: NodeId, on: PredId) -> RewriteResult<NodeId> {
        let left_span = self.spanned(left)?;
        let right_span = self.spanned(right)?;
        if left_span.overlaps(&right_span) {
            return Err(RewriteError::InvalidTree(format!(
                "join inputs overlap: {:?} and {:?}",
                left_span, right_span
            )));
        }
        let spanned_tables = left_span.union(&right_span);
        let refs = self.predicate(on)?.referenced_tables();
        if !refs.is_subset_of(&spanned_tables) {
            return Err(RewriteError::InvalidTree(format!(
                "ON clause references {:?} outside of its join inputs {:?}",
                refs, spanned_tables
            )));
        }
        self.nodes.push(TreeNode {
            node: JoinNode::join(kind, left, right, on),
            spanned_tables,
        });
        Ok(self.nodes.len() - 1)
    }

    pub fn set_root(&mut self, root: NodeId) {
        self.root = Some(root);
    }

    pub fn root(&self) -> RewriteResult<NodeId> {
        self.root
            .ok_or_else(|| RewriteError::InvalidTree("join tree has no root".to_string()))
    }

    pub fn node(&self, id: NodeId) -> RewriteResult<&TreeNode> {
        self.nodes
            .get(id)
            .ok_or_else(|| RewriteError::InvalidTree(format!("no node {}", id)))
    }

    pub fn predicate(&self, id: PredId) -> RewriteResult<&Predicate> {
        self.predicates
            .get(id)
            .ok_or_else(|| RewriteError::InvalidTree(format!("no predicate {}", id)))
    }

    pub fn spanned(&self, id: NodeId) -> RewriteResult<TableSet> {
        Ok(self.node(id)?.spanned_tables)
    }

    /// Number of nodes in the arena, reachable or not
    pub fn arena_len(&self) -> usize {
        self.nodes.len()
    }

    /// Nodes below and including `root`, children before parents
    pub fn post_order(&self, root: NodeId) -> RewriteResult<Vec<NodeId>> {
        let mut order = Vec::new();
        let mut stack = vec![(root, false)];
        while let Some((id, expanded)) = stack.pop() {
            let node = self.node(id)?.node;
            match node.parts() {
                Some((_, left, right, _)) if !expanded => {
                    stack.push((id, true));
                    stack.push((right, false));
                    stack.push((left, false));
                }
                _ => order.push(id),
            }
        }
        Ok(order)
    }

    /// Leaf relations of the tree from left to right
    pub fn leaves(&self) -> RewriteResult<Vec<RelId>> {
        let root = self.root()?;
        let mut leaves = Vec::new();
        for id in self.post_order(root)? {
            if let JoinNode::Leaf(rel) = self.node(id)?.node {
                leaves.push(rel);
            }
        }
        Ok(leaves)
    }

    /// Join nodes reachable from the root
    pub fn join_count(&self) -> RewriteResult<usize> {
        let root = self.root()?;
        let mut count = 0;
        for id in self.post_order(root)? {
            if self.node(id)?.node.kind().is_some() {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Reachable join nodes of the given kind
    pub fn count_kind(&self, kind: JoinKind) -> RewriteResult<usize> {
        let root = self.root()?;
        let mut count = 0;
        for id in self.post_order(root)? {
            if self.node(id)?.node.kind() == Some(kind) {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Columns of all leaves in left-to-right order
    pub fn output_columns(&self, relations: &Relations) -> RewriteResult<Vec<ColumnRef>> {
        let mut columns = Vec::new();
        for rel in self.leaves()? {
            let relation = relations
                .get(rel)
                .ok_or_else(|| RewriteError::RelationNotFound(format!("#{}", rel)))?;
            columns.extend((0..relation.columns.len()).map(|ordinal| ColumnRef::new(rel, ordinal)));
        }
        Ok(columns)
    }

    /// Re-check the invariants of every reachable node
    pub fn validate(&self) -> RewriteResult<()> {
        let root = self.root()?;
        for id in self.post_order(root)? {
            let tree_node = self.node(id)?;
            if let Some((_, left, right, on)) = tree_node.node.parts() {
                let l = self.spanned(left)?;
                let r = self.spanned(right)?;
                if l.overlaps(&r) || l.union(&r) != tree_node.spanned_tables {
                    return Err(RewriteError::InvalidTree(format!("bad spanned tables at node {}", id)));
                }
                if !self.predicate(on)?.referenced_tables().is_subset_of(&tree_node.spanned_tables) {
                    return Err(RewriteError::InvalidTree(format!("ON clause escapes node {}", id)));
                }
            }
        }
        Ok(())
    }

    /// Copy the reachable part of the tree into a fresh arena
    pub fn compact(&self) -> RewriteResult<JoinTree> {
        let root = self.root()?;
        let mut out = JoinTree::new();
        let mut node_map: HashMap<NodeId, NodeId> = HashMap::new();
        let mut pred_map: HashMap<PredId, PredId> = HashMap::new();
        for id in self.post_order(root)? {
            let new_id = match self.node(id)?.node {
                JoinNode::Leaf(rel) => out.add_leaf(rel),
                other => {
                    let Some((kind, left, right, on)) = other.parts() else {
                        return Err(RewriteError::InvalidTree(format!("node {} has no inputs", id)));
                    };
                    let new_on = match pred_map.get(&on) {
                        Some(&p) => p,
                        None => {
                            let p = out.add_predicate(self.predicate(on)?.clone());
                            pred_map.insert(on, p);
                            p
                        }
                    };
                    out.add_join(kind, node_map[&left], node_map[&right], new_on)?
                }
            };
            node_map.insert(id, new_id);
        }
        out.set_root(node_map[&root]);
        Ok(out)
    }

    /// Rebuild `id` on top of the remapped children, if any child changed
    fn with_children_remapped(&mut self, id: NodeId, remap: &HashMap<NodeId, NodeId>) -> RewriteResult<NodeId> {
        match self.node(id)?.node.parts() {
            Some((kind, left, right, on)) => {
                let new_left = remap.get(&left).copied().unwrap_or(left);
                let new_right = remap.get(&right).copied().unwrap_or(right);
                if new_left == left && new_right == right {
                    Ok(id)
                } else {
                    self.add_join(kind, new_left, new_right, on)
                }
            }
            None => Ok(id),
        }
    }

    /// One bottom-up sweep: every reachable node is visited after its
    /// (already rewritten) children and offered to `rule` as
    /// `(original id, id rebuilt over the rewritten children)`. The rule
    /// returns the replacement node if it rewrote anything. The root is
    /// updated at the end. Returns whether anything changed.
    pub fn rewrite_bottom_up<F>(&mut self, interrupt: &dyn Interrupt, mut rule: F) -> RewriteResult<bool>
    where
        F: FnMut(&mut JoinTree, NodeId, NodeId) -> RewriteResult<Option<NodeId>>,
    {
        let root = self.root()?;
        let order = self.post_order(root)?;
        let mut remap: HashMap<NodeId, NodeId> = HashMap::new();
        for id in order {
            interrupt.check()?;
            let mut current = self.with_children_remapped(id, &remap)?;
            if let Some(replacement) = rule(self, id, current)? {
                current = replacement;
            }
            if current != id {
                remap.insert(id, current);
            }
        }
        match remap.get(&root) {
            Some(&new_root) => {
                self.root = Some(new_root);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Apply a rotation at `start` and keep applying it to each newly built
    /// left child, then rebuild the joins on top from the inside out.
    /// Returns the new subtree root if at least one rotation fired.
    pub fn pull_up_left_spine<F>(
        &mut self,
        interrupt: &dyn Interrupt,
        start: NodeId,
        mut rotate: F,
    ) -> RewriteResult<Option<NodeId>>
    where
        F: FnMut(&mut JoinTree, NodeId) -> RewriteResult<Option<Rotation>>,
    {
        let mut pending: Vec<(JoinKind, NodeId, PredId)> = Vec::new();
        let mut current = start;
        loop {
            interrupt.check()?;
            match rotate(self, current)? {
                Some(rotation) => {
                    pending.push((rotation.kind, rotation.right, rotation.on));
                    current = rotation.left;
                }
                None => break,
            }
        }
        if pending.is_empty() {
            return Ok(None);
        }
        while let Some((kind, right, on)) = pending.pop() {
            current = self.add_join(kind, current, right, on)?;
        }
        Ok(Some(current))
    }

    /// Compact shape of a subtree, e.g. `LOJ(INNER(t1, t2), t3)`
    pub fn shape(&self, id: NodeId, relations: &Relations) -> RewriteResult<String> {
        let mut rendered: HashMap<NodeId, String> = HashMap::new();
        for n in self.post_order(id)? {
            let text = match self.node(n)?.node {
                JoinNode::Leaf(rel) => relation_name(relations, rel),
                other => {
                    let Some((kind, left, right, _)) = other.parts() else {
                        return Err(RewriteError::InvalidTree(format!("node {} has no inputs", n)));
                    };
                    format!("{}({}, {})", kind.abbrev(), rendered[&left], rendered[&right])
                }
            };
            rendered.insert(n, text);
        }
        Ok(rendered.remove(&id).unwrap_or_default())
    }

    /// Shape of a join that is not built yet
    pub fn shape_of_join(
        &self,
        kind: JoinKind,
        left: NodeId,
        right: NodeId,
        relations: &Relations,
    ) -> RewriteResult<String> {
        Ok(format!(
            "{}({}, {})",
            kind.abbrev(),
            self.shape(left, relations)?,
            self.shape(right, relations)?
        ))
    }

    /// SQL text of the FROM clause
    pub fn render(&self, relations: &Relations) -> RewriteResult<String> {
        let root = self.root()?;
        let mut rendered: HashMap<NodeId, String> = HashMap::new();
        for n in self.post_order(root)? {
            let text = match self.node(n)?.node {
                JoinNode::Leaf(rel) => leaf_sql(relations, rel),
                other => {
                    let Some((kind, left, right, on)) = other.parts() else {
                        return Err(RewriteError::InvalidTree(format!("node {} has no inputs", n)));
                    };
                    let right_text = match self.node(right)?.node {
                        JoinNode::Leaf(_) => rendered[&right].clone(),
                        _ => format!("({})", rendered[&right]),
                    };
                    format!(
                        "{} {} {} ON {}",
                        rendered[&left],
                        kind.sql(),
                        right_text,
                        self.predicate(on)?.render(relations)
                    )
                }
            };
            rendered.insert(n, text);
        }
        Ok(rendered.remove(&root).unwrap_or_default())
    }

    /// Operator listing in pre-order, one line per node. Nesting depth is
    /// encoded by leading underscores:
    ///
    /// ```text
    /// Left Outer Join:
    /// Left input:
    /// _Scan: t1
    /// Right input:
    /// _Scan: t2
    /// ```
    pub fn explain(&self, relations: &Relations) -> RewriteResult<Vec<String>> {
        enum Item {
            Node(NodeId, usize),
            Line(String),
        }

        let mut lines = Vec::new();
        let mut stack = vec![Item::Node(self.root()?, 0)];
        while let Some(item) = stack.pop() {
            match item {
                Item::Line(line) => lines.push(line),
                Item::Node(id, depth) => {
                    let indent = "_".repeat(depth);
                    match self.node(id)?.node {
                        JoinNode::Leaf(rel) => {
                            lines.push(format!("{}Scan: {}", indent, relation_name(relations, rel)))
                        }
                        other => {
                            if let Some((kind, left, right, _)) = other.parts() {
                                lines.push(format!("{}{} Join:", indent, kind));
                                stack.push(Item::Node(right, depth + 1));
                                stack.push(Item::Line(format!("{}Right input:", indent)));
                                stack.push(Item::Node(left, depth + 1));
                                stack.push(Item::Line(format!("{}Left input:", indent)));
                            }
                        }
                    }
                }
            }
        }
        Ok(lines)
    }
}

fn relation_name(relations: &Relations, rel: RelId) -> String {
    relations
        .get(rel)
        .map(|r| r.name.clone())
        .unwrap_or_else(|| format!("r{}", rel))
}

fn leaf_sql(relations: &Relations, rel: RelId) -> String {
    match relations.get(rel) {
        Some(r) => match r.base_table() {
            Some(table) if table != r.name => format!("{} AS {}", table, r.name),
            _ => r.name.clone(),
        },
        None => format!("r{}", rel),
    }
}
