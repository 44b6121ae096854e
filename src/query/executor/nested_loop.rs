// Nested Loop Evaluation
//
// This file evaluates a whole query block bottom-up with nested loop joins,
// which works for any join condition but has O(n*m) time complexity. It is
// the oracle the rewrites are checked against: a rewritten block must return
// the same multiset of rows as the original one.

use std::collections::HashMap;

use crate::common::RelId;
use crate::query::ast::{ColumnRef, Expression};
use crate::query::executor::expression_eval::{evaluate_predicate, ColumnSource};
use crate::query::executor::result::{DataValue, QueryError, QueryResult, QueryResultSet, Row};
use crate::query::planner::join_tree::{JoinKind, JoinNode};
use crate::query::planner::query::QueryBlock;

/// Table contents keyed by base table name (or derived table name)
#[derive(Debug, Clone, Default)]
pub struct Instance {
    tables: HashMap<String, Vec<Row>>,
}

impl Instance {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, table: &str, rows: Vec<Row>) {
        self.tables.insert(table.to_string(), rows);
    }

    pub fn with(mut self, table: &str, rows: Vec<Row>) -> Self {
        self.insert(table, rows);
        self
    }

    pub fn rows(&self, table: &str) -> Option<&[Row]> {
        self.tables.get(table).map(|rows| rows.as_slice())
    }
}

// One row of a join result: a source row per relation, `None` where the
// relation is absent or NULL-extended.
type Tuple<'a> = Vec<Option<&'a Row>>;

struct TupleSource<'t, 'a> {
    tuple: &'t Tuple<'a>,
}

impl ColumnSource for TupleSource<'_, '_> {
    fn column_value(&self, column: ColumnRef) -> QueryResult<DataValue> {
        match self.tuple.get(column.rel) {
            Some(Some(row)) => row.get(column.ordinal).cloned().ok_or_else(|| {
                QueryError::ColumnNotFound(format!("column {} of relation {}", column.ordinal, column.rel))
            }),
            Some(None) => Ok(DataValue::Null),
            None => Err(QueryError::ExecutionError(format!("unknown relation {}", column.rel))),
        }
    }
}

fn merge<'a>(left: &Tuple<'a>, right: &Tuple<'a>) -> Tuple<'a> {
    left.iter().zip(right.iter()).map(|(l, r)| l.or(*r)).collect()
}

fn holds(on: Option<&Expression>, tuple: &Tuple<'_>) -> QueryResult<bool> {
    match on {
        Some(expr) => Ok(evaluate_predicate(expr, &TupleSource { tuple })? == Some(true)),
        None => Ok(true),
    }
}

fn tree_error(e: impl std::fmt::Display) -> QueryError {
    QueryError::ExecutionError(e.to_string())
}

/// Evaluate `query` over `instance`
pub fn execute(query: &QueryBlock, instance: &Instance) -> QueryResult<QueryResultSet> {
    let width = query.relations.len();
    let tree = &query.tree;
    let root = tree.root().map_err(tree_error)?;

    let mut results: HashMap<usize, Vec<Tuple<'_>>> = HashMap::new();
    for id in tree.post_order(root).map_err(tree_error)? {
        let node = tree.node(id).map_err(tree_error)?.node;
        let output = match node {
            JoinNode::Leaf(rel) => scan(query, instance, rel, width)?,
            other => {
                let Some((kind, left, right, on)) = other.parts() else {
                    return Err(tree_error(format!("node {} has no inputs", id)));
                };
                let left_rows = results.remove(&left).unwrap_or_default();
                let right_rows = results.remove(&right).unwrap_or_default();
                let on = tree.predicate(on).map_err(tree_error)?.expression();
                join(kind, &left_rows, &right_rows, on.as_ref())?
            }
        };
        results.insert(id, output);
    }

    let columns = query.output_columns().map_err(tree_error)?;
    let mut result = QueryResultSet::new(query.column_names(&columns));
    let filter = query.where_clause.expression();
    for tuple in results.remove(&root).unwrap_or_default() {
        if !holds(filter.as_ref(), &tuple)? {
            continue;
        }
        let source = TupleSource { tuple: &tuple };
        let row = columns
            .iter()
            .map(|c| source.column_value(*c))
            .collect::<QueryResult<Row>>()?;
        result.add_row(row);
    }
    Ok(result)
}

fn scan<'a>(query: &QueryBlock, instance: &'a Instance, rel: RelId, width: usize) -> QueryResult<Vec<Tuple<'a>>> {
    let relation = query
        .relations
        .get(rel)
        .ok_or_else(|| QueryError::ExecutionError(format!("unknown relation {}", rel)))?;
    let rows = instance
        .rows(relation.data_source())
        .ok_or_else(|| QueryError::TableNotFound(relation.data_source().to_string()))?;
    Ok(rows
        .iter()
        .map(|row| {
            let mut tuple = vec![None; width];
            tuple[rel] = Some(row);
            tuple
        })
        .collect())
}

fn join<'a>(
    kind: JoinKind,
    left: &[Tuple<'a>],
    right: &[Tuple<'a>],
    on: Option<&Expression>,
) -> QueryResult<Vec<Tuple<'a>>> {
    let mut output = Vec::new();
    match kind {
        JoinKind::Inner | JoinKind::LeftOuter => {
            for l in left {
                let mut matched = false;
                for r in right {
                    let tuple = merge(l, r);
                    if holds(on, &tuple)? {
                        matched = true;
                        output.push(tuple);
                    }
                }
                if !matched && kind == JoinKind::LeftOuter {
                    output.push(l.clone());
                }
            }
        }
        JoinKind::RightOuter => {
            for r in right {
                let mut matched = false;
                for l in left {
                    let tuple = merge(l, r);
                    if holds(on, &tuple)? {
                        matched = true;
                        output.push(tuple);
                    }
                }
                if !matched {
                    output.push(r.clone());
                }
            }
        }
    }
    Ok(output)
}
