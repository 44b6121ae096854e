use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use ojrewrite::catalog::{Column, DataType, Table};
use ojrewrite::query::ast::Expression;
use ojrewrite::query::executor::DataValue;
use ojrewrite::query::planner::RewriteRule;
use ojrewrite::{
    CancellationToken, Catalog, CompilationContext, Deadline, Instance, Optimizer, OptimizerConfig, QueryBlock,
    QueryBuilder, RewriteError,
};

#[path = "../common/mod.rs"]
mod common;

use common::*;

fn ts_catalog() -> Result<Arc<Catalog>> {
    let t = Table::new(
        "t".to_string(),
        vec![
            Column::new("a".to_string(), DataType::Integer, false, false),
            Column::new("b".to_string(), DataType::Float, false, false),
            Column::new("c".to_string(), DataType::Text, false, false),
        ],
    )?;
    let s = Table::new(
        "s".to_string(),
        vec![
            Column::new("d".to_string(), DataType::Integer, false, false),
            Column::new("e".to_string(), DataType::Float, false, false),
            Column::new("f".to_string(), DataType::Text, false, false),
        ],
    )?;
    catalog(vec![t, s])
}

fn ts_row(i: i64) -> Vec<DataValue> {
    vec![DataValue::Integer(i), DataValue::Float(i as f64), text(Some(&i.to_string()))]
}

fn ts_instance() -> Instance {
    // v1 (fv, ev, dv, cv, bv, av) = SELECT f, e, d, c, b, a FROM t LEFT JOIN s ON b = e
    let v1 = vec![
        vec![DataValue::Null, DataValue::Null, DataValue::Null, text(Some("1")), DataValue::Float(1.0), int(Some(1))],
        vec![text(Some("2")), DataValue::Float(2.0), int(Some(2)), text(Some("2")), DataValue::Float(2.0), int(Some(2))],
        vec![text(Some("3")), DataValue::Float(3.0), int(Some(3)), text(Some("3")), DataValue::Float(3.0), int(Some(3))],
    ];
    Instance::new()
        .with("t", (1..=3).map(ts_row).collect())
        .with("s", (2..=4).map(ts_row).collect())
        .with("v1", v1)
}

#[test]
fn test_unmatched_row_appears_once_with_nulls() -> Result<()> {
    init_logging();
    let catalog = ts_catalog()?;
    let mut qb = QueryBuilder::new(catalog.clone());
    let t = qb.table("t")?;
    let s = qb.table("s")?;
    let on = Expression::eq(qb.col("t", "b")?, qb.col("s", "e")?);
    let root = qb.left_outer(t, s, on)?;
    let query = qb.build(root)?;

    let outcome = optimize(&query, &catalog)?;
    assert!(!outcome.changed);
    let result = assert_same_rows(&query, &outcome, &ts_instance())?;
    assert_eq!(result.row_count(), 3);
    let rows = result.sorted_rows();
    assert_eq!(rows[0][..3], ts_row(1)[..]);
    assert!(rows[0][3..].iter().all(|v| v.is_null()));
    assert_eq!(rows[1][..3], rows[1][3..]);
    assert_eq!(rows[2][..3], rows[2][3..]);
    Ok(())
}

// t LEFT JOIN (s LEFT JOIN v1 ON f = cv) ON d = a
fn view_query(catalog: &Arc<Catalog>, aggregated: bool) -> Result<QueryBlock> {
    let mut qb = QueryBuilder::new(catalog.clone());
    let t = qb.table("t")?;
    let s = qb.table("s")?;
    let v1 = qb.derived("v1", &["fv", "ev", "dv", "cv", "bv", "av"], aggregated)?;
    let q = Expression::eq(qb.col("s", "f")?, qb.col("v1", "cv")?);
    let lower = qb.left_outer(s, v1, q)?;
    let p = Expression::eq(qb.col("s", "d")?, qb.col("t", "a")?);
    let root = qb.left_outer(t, lower, p)?;
    Ok(qb.build(root)?)
}

#[test]
fn test_view_operand_is_linearized() -> Result<()> {
    init_logging();
    let catalog = ts_catalog()?;
    let query = view_query(&catalog, false)?;
    let outcome = optimize(&query, &catalog)?;
    assert_eq!(rewritten_shape(&query, &outcome)?, "LOJ(LOJ(t, s), v1)");

    let result = assert_same_rows(&query, &outcome, &ts_instance())?;
    assert_eq!(result.row_count(), 3);
    assert_eq!(result.columns().len(), 12);
    assert_eq!(result.columns()[6], "v1.fv");
    let padded = result.rows().iter().filter(|r| r[3..].iter().all(|v| v.is_null())).count();
    assert_eq!(padded, 1);
    Ok(())
}

#[test]
fn test_aggregated_view_blocks_rewrites() -> Result<()> {
    init_logging();
    let catalog = ts_catalog()?;
    let query = view_query(&catalog, true)?;
    let outcome = optimize(&query, &catalog)?;
    assert!(!outcome.changed);
    assert_eq!(rewritten_shape(&query, &outcome)?, "LOJ(t, LOJ(s, v1))");
    Ok(())
}

#[test]
fn test_second_optimization_changes_nothing() -> Result<()> {
    init_logging();
    let catalog = ts_catalog()?;
    let query = view_query(&catalog, false)?;
    let first = optimize(&query, &catalog)?;
    assert!(first.changed);

    let rewritten = first.apply_to(&query);
    let second = optimize(&rewritten, &catalog)?;
    assert!(!second.changed);
    assert_eq!(second.iterations, 1);
    assert_eq!(rewritten_shape(&query, &second)?, rewritten_shape(&query, &first)?);
    let trace = second.trace.as_ref().expect("trace is collected by default");
    assert!(trace.steps.is_empty());
    assert_eq!(trace.plan_before, trace.plan_after);
    Ok(())
}

// s RIGHT JOIN (t RIGHT JOIN s2 ON s2.d = t.a) ON s.d = t.a
#[test]
fn test_right_outer_joins_keep_column_order() -> Result<()> {
    init_logging();
    let catalog = ts_catalog()?;
    let mut qb = QueryBuilder::new(catalog.clone());
    let s = qb.table("s")?;
    let t = qb.table("t")?;
    let s2 = qb.table_as("s", "s2")?;
    let inner_on = Expression::eq(qb.col("s2", "d")?, qb.col("t", "a")?);
    let lower = qb.right_outer(t, s2, inner_on)?;
    let on = Expression::eq(qb.col("s", "d")?, qb.col("t", "a")?);
    let root = qb.right_outer(s, lower, on)?;
    let query = qb.build(root)?;

    let outcome = optimize(&query, &catalog)?;
    let trace = outcome.trace.as_ref().expect("trace is collected by default");
    assert_eq!(trace.count(RewriteRule::NormalizeRightOuter), 2);
    assert_eq!(rewritten_shape(&query, &outcome)?, "LOJ(LOJ(s2, t), s)");
    assert_eq!(query.column_names(&outcome.projection)[0], "s.d");

    let result = assert_same_rows(&query, &outcome, &ts_instance())?;
    assert_eq!(result.columns()[..3], ["s.d", "s.e", "s.f"]);
    assert_eq!(result.row_count(), 3);
    Ok(())
}

#[test]
fn test_cancellation_and_deadline() -> Result<()> {
    init_logging();
    let catalog = ts_catalog()?;
    let query = view_query(&catalog, false)?;

    let token = Arc::new(CancellationToken::new());
    let ctx = CompilationContext::new(catalog.clone()).with_interrupt(token.clone());
    assert!(Optimizer::default().optimize(&query, &ctx)?.changed);
    token.cancel();
    assert_eq!(Optimizer::default().optimize(&query, &ctx).unwrap_err(), RewriteError::Cancelled);

    let expired = Deadline::at(Instant::now());
    let ctx = CompilationContext::new(catalog.clone()).with_interrupt(Arc::new(expired));
    assert_eq!(
        Optimizer::default().optimize(&query, &ctx).unwrap_err(),
        RewriteError::DeadlineExceeded
    );

    // the input block is untouched and still optimizes
    let ctx = CompilationContext::new(catalog).with_interrupt(Arc::new(Deadline::after(Duration::from_secs(60))));
    assert_eq!(shape(&query)?, "LOJ(t, LOJ(s, v1))");
    assert!(Optimizer::default().optimize(&query, &ctx)?.changed);
    Ok(())
}

#[test]
fn test_iteration_cap_stops_early() -> Result<()> {
    init_logging();
    let catalog = catalog(vec![
        int_table("t1", &["c1"], &[])?,
        int_table("t2", &["c1"], &[])?,
        int_table("t3", &["c1"], &[])?,
    ])?;
    // t1 LEFT JOIN (t2 LEFT JOIN t3 ON t2.c1 = t3.c1) ON t1.c1 = t2.c1 WHERE t3.c1 > 0
    let mut qb = QueryBuilder::new(catalog.clone());
    let t1 = qb.table("t1")?;
    let t2 = qb.table("t2")?;
    let t3 = qb.table("t3")?;
    let q = Expression::eq(qb.col("t2", "c1")?, qb.col("t3", "c1")?);
    let lower = qb.left_outer(t2, t3, q)?;
    let p = Expression::eq(qb.col("t1", "c1")?, qb.col("t2", "c1")?);
    let root = qb.left_outer(t1, lower, p)?;
    let filter = Expression::binary(qb.col("t3", "c1")?, ojrewrite::query::ast::Operator::GreaterThan, Expression::int(0));
    qb.filter(filter);
    let query = qb.build(root)?;

    let capped = optimize_with(
        &query,
        &catalog,
        OptimizerConfig {
            max_iterations: 1,
            ..Default::default()
        },
    )?;
    assert_eq!(capped.iterations, 1);
    assert!(capped.changed);

    let full = optimize(&query, &catalog)?;
    assert_eq!(rewritten_shape(&query, &full)?, "INNER(INNER(t1, t2), t3)");
    assert_eq!(full.iterations, 2);

    let instance = Instance::new()
        .with("t1", int_column(&[Some(1), Some(2), None]))
        .with("t2", int_column(&[Some(1), Some(2), Some(2)]))
        .with("t3", int_column(&[Some(2), Some(-1), None]));
    assert_same_rows(&query, &capped, &instance)?;
    assert_same_rows(&query, &full, &instance)?;
    Ok(())
}

#[test]
fn test_trace_can_be_disabled() -> Result<()> {
    init_logging();
    let catalog = ts_catalog()?;
    let query = view_query(&catalog, false)?;
    let config: OptimizerConfig = serde_json::from_str(r#"{"collect_trace": false}"#)?;
    let outcome = optimize_with(&query, &catalog, config)?;
    assert!(outcome.changed);
    assert!(outcome.trace.is_none());
    Ok(())
}
