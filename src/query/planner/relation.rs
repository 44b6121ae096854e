// Range Variables
//
// Every FROM item of a query block becomes one relation with a dense id.
// Two instances of the same base table (a self-join) are two relations.

use std::collections::HashMap;

use crate::catalog::{Catalog, ColumnSet};
use crate::common::{RelId, TableSet, MAX_RELATIONS};
use crate::query::ast::{ColumnNamer, ColumnRef};
use crate::query::planner::error::{RewriteError, RewriteResult};

/// What a relation ranges over
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationKind {
    /// Instance of a catalog table
    BaseTable { table: String },
    /// View or subquery result; `aggregated` if built with GROUP BY or aggregates
    Derived { aggregated: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    pub id: RelId,
    /// Exposed name (alias, or the table name when unaliased)
    pub name: String,
    pub kind: RelationKind,
    pub columns: Vec<String>,
}

impl Relation {
    pub fn base_table(&self) -> Option<&str> {
        match &self.kind {
            RelationKind::BaseTable { table } => Some(table),
            RelationKind::Derived { .. } => None,
        }
    }

    pub fn is_aggregated(&self) -> bool {
        matches!(self.kind, RelationKind::Derived { aggregated: true })
    }

    /// Name under which the reference evaluator looks up the rows
    pub fn data_source(&self) -> &str {
        self.base_table().unwrap_or(&self.name)
    }
}

/// The relations of one query block, addressable by id and by name
#[derive(Debug, Clone, Default)]
pub struct Relations {
    rels: Vec<Relation>,
    by_name: HashMap<String, RelId>,
}

impl Relations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an instance of a catalog table
    pub fn add_table(&mut self, catalog: &Catalog, table: &str, alias: Option<&str>) -> RewriteResult<RelId> {
        let def = catalog
            .get_table(table)
            .ok_or_else(|| RewriteError::TableNotFound(table.to_string()))?;
        let columns = def.columns().iter().map(|c| c.name().to_string()).collect();
        self.push(
            alias.unwrap_or(table),
            RelationKind::BaseTable { table: table.to_string() },
            columns,
        )
    }

    /// Register a derived table with the given output columns
    pub fn add_derived(&mut self, name: &str, columns: Vec<String>, aggregated: bool) -> RewriteResult<RelId> {
        self.push(name, RelationKind::Derived { aggregated }, columns)
    }

    fn push(&mut self, name: &str, kind: RelationKind, columns: Vec<String>) -> RewriteResult<RelId> {
        if self.by_name.contains_key(name) {
            return Err(RewriteError::DuplicateRelation(name.to_string()));
        }
        if self.rels.len() >= MAX_RELATIONS {
            return Err(RewriteError::TooManyRelations);
        }
        let id = self.rels.len();
        self.rels.push(Relation {
            id,
            name: name.to_string(),
            kind,
            columns,
        });
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn get(&self, id: RelId) -> Option<&Relation> {
        self.rels.get(id)
    }

    pub fn lookup(&self, name: &str) -> Option<RelId> {
        self.by_name.get(name).copied()
    }

    /// Resolve `relation.column` to a bound column reference
    pub fn resolve_column(&self, relation: &str, column: &str) -> RewriteResult<ColumnRef> {
        let id = self
            .lookup(relation)
            .ok_or_else(|| RewriteError::RelationNotFound(relation.to_string()))?;
        let ordinal = self.rels[id]
            .columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| RewriteError::ColumnNotFound {
                relation: relation.to_string(),
                column: column.to_string(),
            })?;
        Ok(ColumnRef::new(id, ordinal))
    }

    /// Unique keys of a relation; derived tables have none
    pub fn unique_keys(&self, catalog: &Catalog, id: RelId) -> RewriteResult<Vec<ColumnSet>> {
        match self.get(id).and_then(|r| r.base_table()) {
            Some(table) => Ok(catalog.unique_keys(table)?),
            None => Ok(Vec::new()),
        }
    }

    /// Relations built with aggregation
    pub fn aggregated(&self) -> TableSet {
        self.rels.iter().filter(|r| r.is_aggregated()).map(|r| r.id).collect()
    }

    pub fn len(&self) -> usize {
        self.rels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Relation> {
        self.rels.iter()
    }
}

impl ColumnNamer for Relations {
    fn column_name(&self, column: ColumnRef) -> String {
        match self.get(column.rel) {
            Some(rel) => match rel.columns.get(column.ordinal) {
                Some(name) => format!("{}.{}", rel.name, name),
                None => format!("{}.#{}", rel.name, column.ordinal),
            },
            None => format!("r{}.c{}", column.rel, column.ordinal),
        }
    }
}
