// Random query blocks and table instances over five keyed integer tables
// t0..t4 (k, a, b). Keys are unique and non-null; a and b carry NULLs and
// duplicates.

use std::sync::Arc;

use anyhow::Result;
use ojrewrite::catalog::Table;
use ojrewrite::common::NodeId;
use ojrewrite::query::ast::{Expression, Operator};
use ojrewrite::query::executor::{DataValue, Row};
use ojrewrite::{Catalog, Instance, JoinKind, QueryBlock, QueryBuilder};
use rand::rngs::StdRng;
use rand::Rng;

use super::{catalog, int_table};

pub const TABLES: usize = 5;
pub const COLUMNS: [&str; 3] = ["k", "a", "b"];

pub fn random_catalog() -> Result<Arc<Catalog>> {
    let tables = (0..TABLES)
        .map(|i| int_table(&format!("t{}", i), &COLUMNS, &["k"]))
        .collect::<Result<Vec<Table>>>()?;
    catalog(tables)
}

fn random_value(rng: &mut StdRng) -> DataValue {
    if rng.gen_bool(0.2) {
        DataValue::Null
    } else {
        DataValue::Integer(rng.gen_range(0..4))
    }
}

fn random_rows(rng: &mut StdRng) -> Vec<Row> {
    let count = match rng.gen_range(0..10) {
        0 => 0,
        1 => 1,
        _ => rng.gen_range(2..6),
    };
    (0..count)
        .map(|k| vec![DataValue::Integer(k), random_value(rng), random_value(rng)])
        .collect()
}

pub fn random_instance(rng: &mut StdRng) -> Instance {
    let mut instance = Instance::new();
    for i in 0..TABLES {
        instance.insert(&format!("t{}", i), random_rows(rng));
    }
    instance
}

fn pick<'a>(rng: &mut StdRng, names: &'a [String]) -> &'a str {
    &names[rng.gen_range(0..names.len())]
}

fn random_column(rng: &mut StdRng, qb: &QueryBuilder, names: &[String]) -> Result<Expression> {
    let table = pick(rng, names);
    let column = COLUMNS[rng.gen_range(0..COLUMNS.len())];
    Ok(qb.col(table, column)?)
}

fn random_comparison(rng: &mut StdRng, qb: &QueryBuilder, left: &[String], right: &[String]) -> Result<Expression> {
    let l = random_column(rng, qb, left)?;
    let r = random_column(rng, qb, right)?;
    Ok(match rng.gen_range(0..6) {
        0 => Expression::binary(l, Operator::LessThan, r),
        1 => Expression::binary(Expression::binary(l, Operator::Plus, Expression::int(1)), Operator::Equals, r),
        _ => Expression::eq(l, r),
    })
}

// ON clauses: mostly equi-joins, sometimes conjunctions, null-tolerant
// disjunctions or constant terms
fn random_on(rng: &mut StdRng, qb: &QueryBuilder, left: &[String], right: &[String]) -> Result<Expression> {
    let base = random_comparison(rng, qb, left, right)?;
    Ok(match rng.gen_range(0..10) {
        0 => Expression::and(base, random_comparison(rng, qb, left, right)?),
        1 => Expression::or(base, Expression::is_null(random_column(rng, qb, right)?)),
        2 => Expression::and(
            base,
            Expression::binary(random_column(rng, qb, right)?, Operator::GreaterThan, Expression::int(0)),
        ),
        3 => Expression::eq(Expression::int(1), Expression::int(1)),
        _ => base,
    })
}

fn random_where(rng: &mut StdRng, qb: &QueryBuilder, names: &[String]) -> Result<Option<Expression>> {
    let column = random_column(rng, qb, names)?;
    Ok(match rng.gen_range(0..8) {
        0 => Some(Expression::is_not_null(column)),
        1 => Some(Expression::is_null(column)),
        2 => Some(Expression::binary(column, Operator::GreaterEquals, Expression::int(1))),
        3 => Some(Expression::or(
            Expression::eq(column, Expression::int(2)),
            Expression::is_null(random_column(rng, qb, names)?),
        )),
        4 => Some(Expression::eq(
            Expression::function("COALESCE", vec![column, Expression::int(0)]),
            Expression::int(0),
        )),
        5 => {
            let other = random_column(rng, qb, names)?;
            Some(Expression::eq(column, other))
        }
        _ => None,
    })
}

// Join kinds drawn from `kinds`; the first one listed is twice as likely
fn random_kind(rng: &mut StdRng, kinds: &[JoinKind]) -> JoinKind {
    let i = rng.gen_range(0..=kinds.len());
    kinds[i.saturating_sub(1)]
}

/// Join mix used by the equivalence tests
pub const ALL_KINDS: [JoinKind; 3] = [JoinKind::LeftOuter, JoinKind::RightOuter, JoinKind::Inner];

// Random binary tree over the tables `names`, split at a random point
fn random_tree(rng: &mut StdRng, qb: &mut QueryBuilder, names: &[String], kinds: &[JoinKind]) -> Result<NodeId> {
    if names.len() == 1 {
        return Ok(qb.table(&names[0])?);
    }
    let split = rng.gen_range(1..names.len());
    let (left_names, right_names) = names.split_at(split);
    let left = random_tree(rng, qb, left_names, kinds)?;
    let right = random_tree(rng, qb, right_names, kinds)?;
    let on = random_on(rng, qb, left_names, right_names)?;
    Ok(qb.join(random_kind(rng, kinds), left, right, Some(on))?)
}

pub fn random_query(rng: &mut StdRng, catalog: &Arc<Catalog>, kinds: &[JoinKind]) -> Result<QueryBlock> {
    let count = rng.gen_range(2..=TABLES);
    let names: Vec<String> = (0..count).map(|i| format!("t{}", i)).collect();
    let mut qb = QueryBuilder::new(catalog.clone());
    let root = random_tree(rng, &mut qb, &names, kinds)?;
    if let Some(filter) = random_where(rng, &qb, &names)? {
        qb.filter(filter);
    }
    Ok(qb.build(root)?)
}
