use std::sync::Arc;

use anyhow::Result;
use ojrewrite::catalog::{Column, DataType, Table};
use ojrewrite::query::ast::{Expression, Operator};
use ojrewrite::query::planner::RewriteRule;
use ojrewrite::{Catalog, Instance, OptimizerConfig, QueryBuilder};

#[path = "../common/mod.rs"]
mod common;

use common::*;

// Every table is (k, fk, v) keyed on k, except b: keyed on (k1, k2) with a
// unique index on u
fn reorder_catalog() -> Result<Arc<Catalog>> {
    let b = Table::new(
        "b".to_string(),
        vec![
            Column::primary_key("k1", DataType::Integer),
            Column::primary_key("k2", DataType::Integer),
            Column::nullable("u", DataType::Integer),
            Column::nullable("v", DataType::Integer),
        ],
    )?
    .with_unique_index(&["u"])?;
    catalog(vec![
        int_table("d", &["k", "fk", "v"], &["k"])?,
        int_table("c", &["k", "fk", "v"], &["k"])?,
        int_table("e", &["k", "fk", "v"], &["k"])?,
        b,
    ])
}

fn reorder_instance() -> Instance {
    Instance::new()
        .with("d", int_rows(&[&[1, 1, 10], &[2, 1, 20], &[3, 2, 20], &[4, 3, 99], &[5, 9, 10]]))
        .with("e", int_rows(&[&[1, 1, 0], &[2, 3, 0], &[3, 1, 1]]))
        .with("c", int_rows(&[&[5, 0, 0], &[6, 0, 1], &[7, 1, 1]]))
        .with(
            "b",
            vec![
                vec![int(Some(1)), int(Some(10)), int(Some(10)), int(Some(5))],
                vec![int(Some(1)), int(Some(20)), int(Some(20)), int(Some(6))],
                vec![int(Some(2)), int(Some(20)), int(None), int(Some(8))],
                vec![int(Some(3)), int(Some(10)), int(Some(30)), int(None)],
            ],
        )
}

// d JOIN (b LEFT JOIN c ON b.v = c.k) ON <on>
fn d_over_loj(catalog: &Arc<Catalog>, on: &[(&str, &str, &str, &str)]) -> Result<ojrewrite::QueryBlock> {
    let mut qb = QueryBuilder::new(catalog.clone());
    let d = qb.table("d")?;
    let b = qb.table("b")?;
    let c = qb.table("c")?;
    let q = Expression::eq(qb.col("b", "v")?, qb.col("c", "k")?);
    let loj = qb.left_outer(b, c, q)?;
    let mut conjuncts = Vec::new();
    for (lr, lc, rr, rc) in on {
        conjuncts.push(Expression::eq(qb.col(lr, lc)?, qb.col(rr, rc)?));
    }
    let p = Expression::conjunction(conjuncts).ok_or_else(|| anyhow::anyhow!("empty ON clause"))?;
    let root = qb.inner(d, loj, p)?;
    Ok(qb.build(root)?)
}

#[test]
fn test_full_composite_key_reorders() -> Result<()> {
    init_logging();
    let catalog = reorder_catalog()?;
    let query = d_over_loj(&catalog, &[("d", "fk", "b", "k1"), ("d", "v", "b", "k2")])?;
    let outcome = optimize(&query, &catalog)?;
    assert_eq!(rewritten_shape(&query, &outcome)?, "LOJ(INNER(d, b), c)");
    let trace = outcome.trace.as_ref().expect("trace is collected by default");
    assert_eq!(trace.rules(), vec![RewriteRule::InnerPastOuter]);

    let result = assert_same_rows(&query, &outcome, &reorder_instance())?;
    assert_eq!(result.row_count(), 3);
    Ok(())
}

#[test]
fn test_partial_composite_key_blocks() -> Result<()> {
    init_logging();
    let catalog = reorder_catalog()?;
    let query = d_over_loj(&catalog, &[("d", "fk", "b", "k1")])?;
    let outcome = optimize(&query, &catalog)?;
    assert!(!outcome.changed);
    assert_eq!(rewritten_shape(&query, &outcome)?, "INNER(d, LOJ(b, c))");
    let result = assert_same_rows(&query, &outcome, &reorder_instance())?;
    assert_eq!(result.row_count(), 6);

    // without the key requirement the same join travels
    let config = OptimizerConfig {
        reorder_without_unique_key: true,
        ..Default::default()
    };
    let outcome = optimize_with(&query, &catalog, config)?;
    assert_eq!(rewritten_shape(&query, &outcome)?, "LOJ(INNER(d, b), c)");
    assert_same_rows(&query, &outcome, &reorder_instance())?;
    Ok(())
}

#[test]
fn test_unique_index_and_constant_cover_key() -> Result<()> {
    init_logging();
    let catalog = reorder_catalog()?;

    let query = d_over_loj(&catalog, &[("d", "v", "b", "u")])?;
    let outcome = optimize(&query, &catalog)?;
    assert_eq!(rewritten_shape(&query, &outcome)?, "LOJ(INNER(d, b), c)");
    assert_same_rows(&query, &outcome, &reorder_instance())?;

    // d.fk = b.k1 AND b.k2 = 10
    let mut qb = QueryBuilder::new(catalog.clone());
    let d = qb.table("d")?;
    let b = qb.table("b")?;
    let c = qb.table("c")?;
    let q = Expression::eq(qb.col("b", "v")?, qb.col("c", "k")?);
    let loj = qb.left_outer(b, c, q)?;
    let p = Expression::and(
        Expression::eq(qb.col("d", "fk")?, qb.col("b", "k1")?),
        Expression::eq(qb.col("b", "k2")?, Expression::int(10)),
    );
    let root = qb.inner(d, loj, p)?;
    let query = qb.build(root)?;
    let outcome = optimize(&query, &catalog)?;
    assert_eq!(rewritten_shape(&query, &outcome)?, "LOJ(INNER(d, b), c)");
    assert_same_rows(&query, &outcome, &reorder_instance())?;
    Ok(())
}

#[test]
fn test_outer_join_on_the_left_reorders() -> Result<()> {
    init_logging();
    let catalog = reorder_catalog()?;
    let mut qb = QueryBuilder::new(catalog.clone());
    let b = qb.table("b")?;
    let c = qb.table("c")?;
    let d = qb.table("d")?;
    let q = Expression::eq(qb.col("b", "v")?, qb.col("c", "k")?);
    let loj = qb.left_outer(b, c, q)?;
    let p = Expression::eq(qb.col("b", "u")?, qb.col("d", "k")?);
    let root = qb.inner(loj, d, p)?;
    let query = qb.build(root)?;

    let outcome = optimize(&query, &catalog)?;
    assert_eq!(rewritten_shape(&query, &outcome)?, "LOJ(INNER(b, d), c)");
    assert_same_rows(&query, &outcome, &reorder_instance())?;
    Ok(())
}

#[test]
fn test_non_equality_and_disjunction_block() -> Result<()> {
    init_logging();
    let catalog = reorder_catalog()?;
    for range in [false, true] {
        let mut qb = QueryBuilder::new(catalog.clone());
        let d = qb.table("d")?;
        let b = qb.table("b")?;
        let c = qb.table("c")?;
        let q = Expression::eq(qb.col("b", "v")?, qb.col("c", "k")?);
        let loj = qb.left_outer(b, c, q)?;
        let key = Expression::eq(qb.col("d", "k")?, qb.col("b", "k1")?);
        let p = if range {
            Expression::and(
                key,
                Expression::binary(qb.col("d", "fk")?, Operator::GreaterEquals, qb.col("b", "k2")?),
            )
        } else {
            Expression::or(key, Expression::eq(qb.col("d", "fk")?, qb.col("b", "u")?))
        };
        let root = qb.inner(d, loj, p)?;
        let query = qb.build(root)?;

        let config = OptimizerConfig {
            reorder_without_unique_key: true,
            ..Default::default()
        };
        let outcome = optimize_with(&query, &catalog, config)?;
        assert!(!outcome.changed, "{}", query.to_sql()?);
        assert_same_rows(&query, &outcome, &reorder_instance())?;
    }
    Ok(())
}

#[test]
fn test_self_join_blocks() -> Result<()> {
    init_logging();
    let catalog = reorder_catalog()?;
    let mut qb = QueryBuilder::new(catalog.clone());
    let b2 = qb.table_as("b", "b2")?;
    let b = qb.table("b")?;
    let c = qb.table("c")?;
    let q = Expression::eq(qb.col("b", "v")?, qb.col("c", "k")?);
    let loj = qb.left_outer(b, c, q)?;
    let p = Expression::and(
        Expression::eq(qb.col("b2", "k1")?, qb.col("b", "k1")?),
        Expression::eq(qb.col("b2", "k2")?, qb.col("b", "k2")?),
    );
    let root = qb.inner(b2, loj, p)?;
    let query = qb.build(root)?;

    let outcome = optimize(&query, &catalog)?;
    assert_eq!(rewritten_shape(&query, &outcome)?, "INNER(b2, LOJ(b, c))");
    assert_same_rows(&query, &outcome, &reorder_instance())?;
    Ok(())
}

// e JOIN (d JOIN (b LEFT JOIN c ON b.v = c.k) ON d.fk = b.k1 AND d.v = b.k2) ON <on>
fn two_inner_joins(catalog: &Arc<Catalog>, outer_on_key: bool) -> Result<ojrewrite::QueryBlock> {
    let mut qb = QueryBuilder::new(catalog.clone());
    let e = qb.table("e")?;
    let d = qb.table("d")?;
    let b = qb.table("b")?;
    let c = qb.table("c")?;
    let q = Expression::eq(qb.col("b", "v")?, qb.col("c", "k")?);
    let loj = qb.left_outer(b, c, q)?;
    let p_db = Expression::and(
        Expression::eq(qb.col("d", "fk")?, qb.col("b", "k1")?),
        Expression::eq(qb.col("d", "v")?, qb.col("b", "k2")?),
    );
    let lower = qb.inner(d, loj, p_db)?;
    let p_ed = if outer_on_key {
        Expression::eq(qb.col("e", "k")?, qb.col("d", "fk")?)
    } else {
        Expression::eq(qb.col("e", "fk")?, qb.col("d", "k")?)
    };
    let root = qb.inner(e, lower, p_ed)?;
    Ok(qb.build(root)?)
}

#[test]
fn test_two_step_reordering() -> Result<()> {
    init_logging();
    let catalog = reorder_catalog()?;
    let query = two_inner_joins(&catalog, true)?;
    let outcome = optimize(&query, &catalog)?;
    assert_eq!(rewritten_shape(&query, &outcome)?, "LOJ(INNER(e, INNER(d, b)), c)");
    let trace = outcome.trace.as_ref().expect("trace is collected by default");
    assert_eq!(trace.count(RewriteRule::InnerPastOuter), 2);
    let result = assert_same_rows(&query, &outcome, &reorder_instance())?;
    assert_eq!(result.row_count(), 3);
    Ok(())
}

#[test]
fn test_partial_progress_when_upper_join_has_no_key() -> Result<()> {
    init_logging();
    let catalog = reorder_catalog()?;
    let query = two_inner_joins(&catalog, false)?;
    let outcome = optimize(&query, &catalog)?;
    assert_eq!(rewritten_shape(&query, &outcome)?, "INNER(e, LOJ(INNER(d, b), c))");
    let trace = outcome.trace.as_ref().expect("trace is collected by default");
    assert_eq!(trace.count(RewriteRule::InnerPastOuter), 1);
    let result = assert_same_rows(&query, &outcome, &reorder_instance())?;
    assert_eq!(result.row_count(), 3);
    Ok(())
}

// d JOIN (b LEFT JOIN c ON b.v = c.k) ON d.fk = b.k1 AND d.v = b.k2 AND d.k = c.fk
#[test]
fn test_inner_on_clause_reaching_null_producing_side_demotes_instead() -> Result<()> {
    init_logging();
    let catalog = reorder_catalog()?;
    let query = d_over_loj(
        &catalog,
        &[("d", "fk", "b", "k1"), ("d", "v", "b", "k2"), ("d", "k", "c", "fk")],
    )?;

    let config = OptimizerConfig {
        enable_outer_join_reduction: false,
        ..Default::default()
    };
    let kept = optimize_with(&query, &catalog, config)?;
    assert_eq!(rewritten_shape(&query, &kept)?, "INNER(d, LOJ(b, c))");

    let outcome = optimize(&query, &catalog)?;
    assert_eq!(rewritten_shape(&query, &outcome)?, "INNER(d, INNER(b, c))");
    assert_same_rows(&query, &outcome, &reorder_instance())?;
    Ok(())
}
