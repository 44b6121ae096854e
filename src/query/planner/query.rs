// Query Block
//
// A bound query block: its relations, the join tree of its FROM clause,
// the classified WHERE clause and the client-visible column list.

use std::sync::Arc;

use crate::catalog::Catalog;
use crate::common::NodeId;
use crate::query::ast::{ColumnNamer, ColumnRef, Expression};
use crate::query::planner::error::{RewriteError, RewriteResult};
use crate::query::planner::join_tree::{JoinKind, JoinTree};
use crate::query::planner::predicate::{classify, Predicate};
use crate::query::planner::relation::Relations;

#[derive(Debug, Clone)]
pub struct QueryBlock {
    pub relations: Relations,
    pub tree: JoinTree,
    pub where_clause: Predicate,
    /// Explicit select list; all columns in FROM order when absent
    pub select: Option<Vec<ColumnRef>>,
}

impl QueryBlock {
    /// Client-visible columns, in order
    pub fn output_columns(&self) -> RewriteResult<Vec<ColumnRef>> {
        match &self.select {
            Some(columns) => Ok(columns.clone()),
            None => self.tree.output_columns(&self.relations),
        }
    }

    pub fn column_names(&self, columns: &[ColumnRef]) -> Vec<String> {
        columns.iter().map(|c| self.relations.column_name(*c)).collect()
    }

    /// SQL text of the block
    pub fn to_sql(&self) -> RewriteResult<String> {
        let columns = match &self.select {
            Some(columns) => self.column_names(columns).join(", "),
            None => "*".to_string(),
        };
        let mut sql = format!("SELECT {} FROM {}", columns, self.tree.render(&self.relations)?);
        if !self.where_clause.is_always_true() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.where_clause.render(&self.relations));
        }
        Ok(sql)
    }
}

/// Builds a query block bottom-up: relations first, then joins over them.
///
/// ```ignore
/// let mut qb = QueryBuilder::new(catalog);
/// let t1 = qb.table("t1")?;
/// let t2 = qb.table("t2")?;
/// let on = Expression::eq(qb.col("t1", "c1")?, qb.col("t2", "c1")?);
/// let root = qb.left_outer(t1, t2, on)?;
/// let query = qb.build(root)?;
/// ```
pub struct QueryBuilder {
    catalog: Arc<Catalog>,
    relations: Relations,
    tree: JoinTree,
    where_clause: Option<Expression>,
    select: Option<Vec<ColumnRef>>,
}

impl QueryBuilder {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        QueryBuilder {
            catalog,
            relations: Relations::new(),
            tree: JoinTree::new(),
            where_clause: None,
            select: None,
        }
    }

    /// Add a catalog table under its own name
    pub fn table(&mut self, name: &str) -> RewriteResult<NodeId> {
        let rel = self.relations.add_table(&self.catalog, name, None)?;
        Ok(self.tree.add_leaf(rel))
    }

    /// Add a catalog table under an alias
    pub fn table_as(&mut self, name: &str, alias: &str) -> RewriteResult<NodeId> {
        let rel = self.relations.add_table(&self.catalog, name, Some(alias))?;
        Ok(self.tree.add_leaf(rel))
    }

    /// Add a derived table (view or subquery result)
    pub fn derived(&mut self, name: &str, columns: &[&str], aggregated: bool) -> RewriteResult<NodeId> {
        let columns = columns.iter().map(|c| c.to_string()).collect();
        let rel = self.relations.add_derived(name, columns, aggregated)?;
        Ok(self.tree.add_leaf(rel))
    }

    /// Column `relation.column` as an expression
    pub fn col(&self, relation: &str, column: &str) -> RewriteResult<Expression> {
        Ok(Expression::Column(self.relations.resolve_column(relation, column)?))
    }

    pub fn column_ref(&self, relation: &str, column: &str) -> RewriteResult<ColumnRef> {
        self.relations.resolve_column(relation, column)
    }

    /// Join with an optional ON clause; `None` means a cross product
    pub fn join(&mut self, kind: JoinKind, left: NodeId, right: NodeId, on: Option<Expression>) -> RewriteResult<NodeId> {
        let predicate = match on {
            Some(expr) => classify(&expr, &self.relations),
            None => Predicate::always_true(),
        };
        let on = self.tree.add_predicate(predicate);
        self.tree.add_join(kind, left, right, on)
    }

    pub fn inner(&mut self, left: NodeId, right: NodeId, on: Expression) -> RewriteResult<NodeId> {
        self.join(JoinKind::Inner, left, right, Some(on))
    }

    pub fn left_outer(&mut self, left: NodeId, right: NodeId, on: Expression) -> RewriteResult<NodeId> {
        self.join(JoinKind::LeftOuter, left, right, Some(on))
    }

    pub fn right_outer(&mut self, left: NodeId, right: NodeId, on: Expression) -> RewriteResult<NodeId> {
        self.join(JoinKind::RightOuter, left, right, Some(on))
    }

    pub fn cross(&mut self, left: NodeId, right: NodeId) -> RewriteResult<NodeId> {
        self.join(JoinKind::Inner, left, right, None)
    }

    pub fn filter(&mut self, predicate: Expression) -> &mut Self {
        self.where_clause = Some(match self.where_clause.take() {
            Some(existing) => Expression::and(existing, predicate),
            None => predicate,
        });
        self
    }

    pub fn select(&mut self, columns: Vec<ColumnRef>) -> &mut Self {
        self.select = Some(columns);
        self
    }

    pub fn relations(&self) -> &Relations {
        &self.relations
    }

    /// Finish the block with `root` as the top of the FROM clause
    pub fn build(mut self, root: NodeId) -> RewriteResult<QueryBlock> {
        self.tree.set_root(root);
        let leaves = self.tree.leaves()?;
        if leaves.len() != self.relations.len() {
            return Err(RewriteError::InvalidTree(format!(
                "{} relations declared but {} reachable from the root",
                self.relations.len(),
                leaves.len()
            )));
        }
        let tree = self.tree.compact()?;
        let where_clause = match &self.where_clause {
            Some(expr) => classify(expr, &self.relations),
            None => Predicate::always_true(),
        };
        if let Some(columns) = &self.select {
            for c in columns {
                if self.relations.get(c.rel).map_or(true, |r| c.ordinal >= r.columns.len()) {
                    return Err(RewriteError::InvalidTree(format!("select list column {:?} is unbound", c)));
                }
            }
        }
        Ok(QueryBlock {
            relations: self.relations,
            tree,
            where_clause,
            select: self.select,
        })
    }
}
