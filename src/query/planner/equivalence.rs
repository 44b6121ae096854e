// Column Equivalence Classes
//
// Union-find over the columns linked by equality conjuncts of one predicate
// scope. A class may also be bound to a constant by a `col = literal`
// conjunct. The inner join reorder pass uses it to decide whether a unique
// key is fully determined by the other side of a join.

use std::collections::HashMap;

use crate::common::TableSet;
use crate::query::ast::ColumnRef;
use crate::query::planner::predicate::{ConjunctKind, Predicate};

#[derive(Debug, Clone, Default)]
pub struct EquivalenceClasses {
    index: HashMap<ColumnRef, usize>,
    members: Vec<ColumnRef>,
    parent: Vec<usize>,
    constant: Vec<bool>,
}

impl EquivalenceClasses {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classes induced by the classifiable equality conjuncts of `predicate`
    pub fn from_predicate(predicate: &Predicate) -> Self {
        let mut classes = Self::new();
        for conjunct in predicate.conjuncts().iter().filter(|c| c.classifiable) {
            match &conjunct.kind {
                ConjunctKind::EquiJoin { left, right } => classes.add_equality(*left, *right),
                ConjunctKind::ColumnEqualsConstant { column, .. } => classes.bind_constant(*column),
                _ => {}
            }
        }
        classes
    }

    fn slot(&mut self, column: ColumnRef) -> usize {
        if let Some(&i) = self.index.get(&column) {
            return i;
        }
        let i = self.members.len();
        self.index.insert(column, i);
        self.members.push(column);
        self.parent.push(i);
        self.constant.push(false);
        i
    }

    fn find(&self, mut i: usize) -> usize {
        while self.parent[i] != i {
            i = self.parent[i];
        }
        i
    }

    fn find_compress(&mut self, i: usize) -> usize {
        let root = self.find(i);
        let mut cur = i;
        while self.parent[cur] != root {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    pub fn add_equality(&mut self, a: ColumnRef, b: ColumnRef) {
        let ia = self.slot(a);
        let ib = self.slot(b);
        let ra = self.find_compress(ia);
        let rb = self.find_compress(ib);
        if ra != rb {
            self.parent[rb] = ra;
            self.constant[ra] = self.constant[ra] || self.constant[rb];
        }
    }

    pub fn bind_constant(&mut self, column: ColumnRef) {
        let i = self.slot(column);
        let root = self.find_compress(i);
        self.constant[root] = true;
    }

    pub fn are_equal(&self, a: ColumnRef, b: ColumnRef) -> bool {
        if a == b {
            return true;
        }
        match (self.index.get(&a), self.index.get(&b)) {
            (Some(&ia), Some(&ib)) => self.find(ia) == self.find(ib),
            _ => false,
        }
    }

    pub fn is_constant(&self, column: ColumnRef) -> bool {
        self.index
            .get(&column)
            .map(|&i| self.constant[self.find(i)])
            .unwrap_or(false)
    }

    /// Members of the class of `column` (just the column if unconstrained)
    pub fn class_of(&self, column: ColumnRef) -> Vec<ColumnRef> {
        match self.index.get(&column) {
            Some(&i) => {
                let root = self.find(i);
                let mut class: Vec<ColumnRef> = (0..self.members.len())
                    .filter(|&j| self.find(j) == root)
                    .map(|j| self.members[j])
                    .collect();
                class.sort();
                class
            }
            None => vec![column],
        }
    }

    /// The column's value is fixed once a row of `side` is fixed: its class
    /// holds a column of a relation in `side`, or is bound to a constant
    pub fn is_bound_by(&self, column: ColumnRef, side: &TableSet) -> bool {
        self.is_constant(column) || self.class_of(column).iter().any(|c| side.contains(c.rel))
    }
}
