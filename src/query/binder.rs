// Query Document Binder
//
// This module reads a query block described as JSON (table definitions, the
// FROM tree, the WHERE clause and an optional select list) and binds it:
// tables go into a fresh catalog, names are resolved to relations and column
// ordinals, and ON/WHERE expressions are classified.
//
// A document looks like this:
//
// {
//   "tables": [{"name": "t1", "columns": [{"name": "c1", "primary_key": true}]}],
//   "from": {"join": {"kind": "left", "left": {"table": {"name": "t1"}},
//            "right": {"table": {"name": "t2"}},
//            "on": {"binary": {"op": "=", "left": {"column": "t1.c1"},
//                                         "right": {"column": "t2.c1"}}}}},
//   "where": {"is_not_null": {"column": "t2.c1"}}
// }

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{Catalog, CatalogError, Column, DataType, Table};
use crate::common::{NodeId, TableSet};
use crate::query::ast::{ColumnRef, Expression, Operator, UnaryOperator, Value};
use crate::query::executor::nested_loop::Instance;
use crate::query::executor::result::{DataValue, Row};
use crate::query::planner::error::RewriteError;
use crate::query::planner::join_tree::JoinKind;
use crate::query::planner::query::{QueryBlock, QueryBuilder};
use crate::query::planner::relation::Relations;

#[derive(Error, Debug)]
pub enum BindError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Rewrite(#[from] RewriteError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("Invalid query document: {0}")]
    Invalid(String),
}

pub type BindResult<T> = Result<T, BindError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryDocument {
    pub tables: Vec<TableDoc>,
    pub from: FromDoc,
    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<ExprDoc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<Vec<String>>,
    /// Optional table contents, keyed by table name, for the reference evaluator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<BTreeMap<String, Vec<Vec<serde_json::Value>>>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDoc {
    pub name: String,
    pub columns: Vec<ColumnDoc>,
    /// Unique indexes, each a list of column names
    #[serde(default)]
    pub unique_keys: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDoc {
    pub name: String,
    #[serde(default, rename = "type")]
    pub data_type: DataType,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
}

fn default_nullable() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinKindDoc {
    Inner,
    Left,
    Right,
    Cross,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FromDoc {
    Table {
        name: String,
        #[serde(default)]
        alias: Option<String>,
    },
    Derived {
        name: String,
        columns: Vec<String>,
        #[serde(default)]
        aggregated: bool,
    },
    Join {
        kind: JoinKindDoc,
        left: Box<FromDoc>,
        right: Box<FromDoc>,
        #[serde(default)]
        on: Option<ExprDoc>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExprDoc {
    /// `relation.column`, or a bare column name unique across the block
    Column(String),
    Literal(serde_json::Value),
    Binary {
        op: String,
        left: Box<ExprDoc>,
        right: Box<ExprDoc>,
    },
    Not(Box<ExprDoc>),
    Negate(Box<ExprDoc>),
    IsNull(Box<ExprDoc>),
    IsNotNull(Box<ExprDoc>),
    InList {
        expr: Box<ExprDoc>,
        list: Vec<ExprDoc>,
        #[serde(default)]
        negated: bool,
    },
    Between {
        expr: Box<ExprDoc>,
        low: Box<ExprDoc>,
        high: Box<ExprDoc>,
        #[serde(default)]
        negated: bool,
    },
    Like {
        expr: Box<ExprDoc>,
        pattern: Box<ExprDoc>,
        #[serde(default)]
        negated: bool,
    },
    Function {
        name: String,
        #[serde(default)]
        args: Vec<ExprDoc>,
    },
    Case {
        #[serde(default)]
        operand: Option<Box<ExprDoc>>,
        when: Vec<(ExprDoc, ExprDoc)>,
        #[serde(default, rename = "else")]
        else_clause: Option<Box<ExprDoc>>,
    },
    /// Opaque subquery correlated to the named relations
    Subquery {
        #[serde(default)]
        correlated: Vec<String>,
    },
}

impl QueryDocument {
    pub fn from_json(text: &str) -> BindResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> BindResult<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Catalog holding the document's table definitions
    pub fn catalog(&self) -> BindResult<Arc<Catalog>> {
        let mut catalog = Catalog::new();
        for def in &self.tables {
            let columns = def
                .columns
                .iter()
                .map(|c| Column::new(c.name.clone(), c.data_type, c.nullable, c.primary_key))
                .collect();
            let mut table = Table::new(def.name.clone(), columns)?;
            for key in &def.unique_keys {
                let names: Vec<&str> = key.iter().map(String::as_str).collect();
                table.add_unique_index(&names)?;
            }
            catalog.create_table(table)?;
        }
        Ok(catalog.snapshot())
    }

    /// Table contents for the reference evaluator, if the document has any
    pub fn instance(&self) -> BindResult<Option<Instance>> {
        let Some(data) = &self.data else {
            return Ok(None);
        };
        let mut instance = Instance::new();
        for (table, rows) in data {
            let rows = rows
                .iter()
                .map(|row| row.iter().map(data_value).collect::<BindResult<Row>>())
                .collect::<BindResult<Vec<Row>>>()?;
            instance.insert(table, rows);
        }
        Ok(Some(instance))
    }
}

/// Bind a document into its catalog and query block
pub fn bind(doc: &QueryDocument) -> BindResult<(Arc<Catalog>, QueryBlock)> {
    let catalog = doc.catalog()?;
    let mut qb = QueryBuilder::new(catalog.clone());
    let root = bind_from(&mut qb, &doc.from)?;
    if let Some(filter) = &doc.where_clause {
        let expr = bind_expr(qb.relations(), filter)?;
        qb.filter(expr);
    }
    if let Some(select) = &doc.select {
        let columns = select
            .iter()
            .map(|name| resolve_column(qb.relations(), name))
            .collect::<BindResult<Vec<ColumnRef>>>()?;
        qb.select(columns);
    }
    let query = qb.build(root)?;
    Ok((catalog, query))
}

fn bind_from(qb: &mut QueryBuilder, from: &FromDoc) -> BindResult<NodeId> {
    match from {
        FromDoc::Table { name, alias: Some(alias) } => Ok(qb.table_as(name, alias)?),
        FromDoc::Table { name, alias: None } => Ok(qb.table(name)?),
        FromDoc::Derived {
            name,
            columns,
            aggregated,
        } => {
            let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
            Ok(qb.derived(name, &columns, *aggregated)?)
        }
        FromDoc::Join { kind, left, right, on } => {
            let left = bind_from(qb, left)?;
            let right = bind_from(qb, right)?;
            let on = match on {
                Some(expr) => Some(bind_expr(qb.relations(), expr)?),
                None => None,
            };
            let kind = match kind {
                JoinKindDoc::Inner | JoinKindDoc::Cross => JoinKind::Inner,
                JoinKindDoc::Left => JoinKind::LeftOuter,
                JoinKindDoc::Right => JoinKind::RightOuter,
            };
            Ok(qb.join(kind, left, right, on)?)
        }
    }
}

fn resolve_column(relations: &Relations, name: &str) -> BindResult<ColumnRef> {
    if let Some((relation, column)) = name.split_once('.') {
        return Ok(relations.resolve_column(relation, column)?);
    }
    let mut found = relations
        .iter()
        .filter_map(|r| r.columns.iter().position(|c| c == name).map(|i| ColumnRef::new(r.id, i)));
    match (found.next(), found.next()) {
        (Some(column), None) => Ok(column),
        (Some(_), Some(_)) => Err(BindError::Invalid(format!("column {} is ambiguous", name))),
        (None, _) => Err(BindError::Invalid(format!("column {} not found", name))),
    }
}

fn literal(value: &serde_json::Value) -> BindResult<Value> {
    match value {
        serde_json::Value::Null => Ok(Value::Null),
        serde_json::Value::Bool(b) => Ok(Value::Boolean(*b)),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(Value::Integer(i)),
            None => n
                .as_f64()
                .map(Value::Float)
                .ok_or_else(|| BindError::Invalid(format!("unsupported number {}", n))),
        },
        serde_json::Value::String(s) => Ok(Value::String(s.clone())),
        other => Err(BindError::Invalid(format!("unsupported literal {}", other))),
    }
}

fn data_value(value: &serde_json::Value) -> BindResult<DataValue> {
    Ok(DataValue::from(&literal(value)?))
}

fn boxed(relations: &Relations, doc: &ExprDoc) -> BindResult<Box<Expression>> {
    bind_expr(relations, doc).map(Box::new)
}

fn bind_expr(relations: &Relations, doc: &ExprDoc) -> BindResult<Expression> {
    let expr = match doc {
        ExprDoc::Column(name) => Expression::Column(resolve_column(relations, name)?),
        ExprDoc::Literal(value) => Expression::Literal(literal(value)?),
        ExprDoc::Binary { op, left, right } => {
            let op = Operator::from_symbol(op).ok_or_else(|| BindError::Invalid(format!("unknown operator {}", op)))?;
            Expression::BinaryOp {
                left: boxed(relations, left)?,
                op,
                right: boxed(relations, right)?,
            }
        }
        ExprDoc::Not(inner) => Expression::UnaryOp {
            op: UnaryOperator::Not,
            expr: boxed(relations, inner)?,
        },
        ExprDoc::Negate(inner) => Expression::UnaryOp {
            op: UnaryOperator::Minus,
            expr: boxed(relations, inner)?,
        },
        ExprDoc::IsNull(inner) => Expression::IsNull {
            expr: boxed(relations, inner)?,
            negated: false,
        },
        ExprDoc::IsNotNull(inner) => Expression::IsNull {
            expr: boxed(relations, inner)?,
            negated: true,
        },
        ExprDoc::InList { expr, list, negated } => Expression::InList {
            expr: boxed(relations, expr)?,
            list: list
                .iter()
                .map(|e| bind_expr(relations, e))
                .collect::<BindResult<Vec<_>>>()?,
            negated: *negated,
        },
        ExprDoc::Between {
            expr,
            low,
            high,
            negated,
        } => Expression::Between {
            expr: boxed(relations, expr)?,
            low: boxed(relations, low)?,
            high: boxed(relations, high)?,
            negated: *negated,
        },
        ExprDoc::Like { expr, pattern, negated } => Expression::Like {
            expr: boxed(relations, expr)?,
            pattern: boxed(relations, pattern)?,
            negated: *negated,
        },
        ExprDoc::Function { name, args } => Expression::function(
            name,
            args.iter()
                .map(|e| bind_expr(relations, e))
                .collect::<BindResult<Vec<_>>>()?,
        ),
        ExprDoc::Case {
            operand,
            when,
            else_clause,
        } => Expression::Case {
            operand: operand.as_ref().map(|e| boxed(relations, e)).transpose()?,
            when_then_clauses: when
                .iter()
                .map(|(w, t)| Ok((bind_expr(relations, w)?, bind_expr(relations, t)?)))
                .collect::<BindResult<Vec<_>>>()?,
            else_clause: else_clause.as_ref().map(|e| boxed(relations, e)).transpose()?,
        },
        ExprDoc::Subquery { correlated } => {
            let mut tables = TableSet::EMPTY;
            for name in correlated {
                let rel = relations
                    .lookup(name)
                    .ok_or_else(|| RewriteError::RelationNotFound(name.clone()))?;
                tables.insert(rel);
            }
            Expression::Subquery { correlated: tables }
        }
    };
    Ok(expr)
}
