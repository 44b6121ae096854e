use std::fmt;

use serde::{Deserialize, Serialize};

/// Relation (range variable) ID within one query block
pub type RelId = usize;

/// Join tree node ID (index into the tree arena)
pub type NodeId = usize;

/// Predicate ID (index into the tree's predicate arena)
pub type PredId = usize;

/// Maximum number of relations a single query block may reference
pub const MAX_RELATIONS: usize = 128;

/// Immutable set of relation IDs, stored as a bitset.
///
/// Used everywhere the rewrite rules ask "which relations does this predicate
/// or subtree touch", so union, intersection and subset tests are single
/// word operations.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TableSet(u128);

impl TableSet {
    /// The empty set
    pub const EMPTY: TableSet = TableSet(0);

    /// A set holding exactly one relation
    pub fn single(rel: RelId) -> Self {
        debug_assert!(rel < MAX_RELATIONS, "relation id {} out of range", rel);
        TableSet(1u128 << rel)
    }

    pub fn insert(&mut self, rel: RelId) {
        self.0 |= TableSet::single(rel).0;
    }

    pub fn contains(&self, rel: RelId) -> bool {
        rel < MAX_RELATIONS && self.0 & (1u128 << rel) != 0
    }

    pub fn union(&self, other: &TableSet) -> TableSet {
        TableSet(self.0 | other.0)
    }

    pub fn intersection(&self, other: &TableSet) -> TableSet {
        TableSet(self.0 & other.0)
    }

    pub fn difference(&self, other: &TableSet) -> TableSet {
        TableSet(self.0 & !other.0)
    }

    pub fn is_subset_of(&self, other: &TableSet) -> bool {
        self.0 & !other.0 == 0
    }

    pub fn overlaps(&self, other: &TableSet) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Iterate the member IDs in ascending order
    pub fn iter(&self) -> impl Iterator<Item = RelId> + '_ {
        let bits = self.0;
        (0..MAX_RELATIONS).filter(move |i| bits & (1u128 << i) != 0)
    }

    /// The only member, if the set has exactly one
    pub fn only(&self) -> Option<RelId> {
        if self.len() == 1 {
            Some(self.0.trailing_zeros() as RelId)
        } else {
            None
        }
    }
}

impl FromIterator<RelId> for TableSet {
    fn from_iter<I: IntoIterator<Item = RelId>>(iter: I) -> Self {
        let mut set = TableSet::EMPTY;
        for rel in iter {
            set.insert(rel);
        }
        set
    }
}

impl fmt::Debug for TableSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
