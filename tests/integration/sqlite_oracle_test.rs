use anyhow::Result;
use ojrewrite::query::executor::DataValue;
use ojrewrite::query::ast::Expression;
use ojrewrite::{execute, Instance, JoinKind, QueryBlock, QueryBuilder, QueryResultSet};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rusqlite::types::{Value as SqliteValue, ValueRef};
use rusqlite::{params_from_iter, Connection};

#[path = "../common/mod.rs"]
mod common;

use common::random::*;
use common::*;

fn to_sqlite(value: &DataValue) -> SqliteValue {
    match value {
        DataValue::Null => SqliteValue::Null,
        DataValue::Integer(i) => SqliteValue::Integer(*i),
        DataValue::Float(f) => SqliteValue::Real(*f),
        DataValue::Text(s) => SqliteValue::Text(s.clone()),
        DataValue::Boolean(b) => SqliteValue::Integer(*b as i64),
    }
}

fn from_sqlite(value: ValueRef<'_>) -> DataValue {
    match value {
        ValueRef::Null => DataValue::Null,
        ValueRef::Integer(i) => DataValue::Integer(i),
        ValueRef::Real(f) => DataValue::Float(f),
        ValueRef::Text(t) => DataValue::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => DataValue::Text(format!("{:?}", b)),
    }
}

// Fresh in-memory database holding t0..t4 with the instance's rows
fn load(instance: &Instance) -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    for i in 0..TABLES {
        let name = format!("t{}", i);
        conn.execute_batch(&format!(
            "CREATE TABLE {} (k INTEGER NOT NULL PRIMARY KEY, a INTEGER, b INTEGER);",
            name
        ))?;
        let insert = format!("INSERT INTO {} VALUES (?1, ?2, ?3)", name);
        for row in instance.rows(&name).unwrap_or_default() {
            conn.execute(&insert, params_from_iter(row.iter().map(to_sqlite)))?;
        }
    }
    Ok(conn)
}

fn run_sqlite(conn: &Connection, query: &QueryBlock, columns: &[String]) -> Result<QueryResultSet> {
    let sql = query.to_sql()?;
    let mut stmt = conn.prepare(&sql)?;
    let width = stmt.column_count();
    assert_eq!(width, columns.len(), "column count differs for {}", sql);
    let rows = stmt.query_map([], |row| {
        (0..width)
            .map(|i| row.get_ref(i).map(from_sqlite))
            .collect::<rusqlite::Result<Vec<_>>>()
    })?;
    let mut result = QueryResultSet::new(columns.to_vec());
    for row in rows {
        result.add_row(row?);
    }
    Ok(result)
}

// The evaluator, SQLite on the original SQL and SQLite on the rewritten SQL
// all agree
fn check_against_sqlite(query: &QueryBlock, rewritten: &QueryBlock, instance: &Instance) -> Result<()> {
    let expected = execute(query, instance)?;
    let conn = load(instance)?;
    for block in [query, rewritten] {
        let actual = run_sqlite(&conn, block, expected.columns())?;
        assert!(
            expected.same_rows(&actual),
            "{}\nevaluator:\n{}\nsqlite:\n{}",
            block.to_sql()?,
            expected.to_string_table(),
            actual.to_string_table()
        );
    }
    Ok(())
}

#[test]
fn test_random_outer_joins_match_sqlite() -> Result<()> {
    init_logging();
    let catalog = random_catalog()?;
    let mut rng = StdRng::seed_from_u64(2008);
    let kinds = [JoinKind::LeftOuter, JoinKind::Inner];

    for _ in 0..150 {
        let query = random_query(&mut rng, &catalog, &kinds)?;
        let outcome = optimize(&query, &catalog)?;
        let rewritten = outcome.apply_to(&query);
        for _ in 0..2 {
            let instance = random_instance(&mut rng);
            check_against_sqlite(&query, &rewritten, &instance)?;
        }
    }
    Ok(())
}

#[test]
fn test_right_outer_join_matches_sqlite() -> Result<()> {
    init_logging();
    let catalog = random_catalog()?;
    // t0 RIGHT JOIN t1 ON t0.a = t1.a LEFT JOIN t2 ON t1.b = t2.k WHERE t0.b IS NOT NULL
    let mut qb = QueryBuilder::new(catalog.clone());
    let t0 = qb.table("t0")?;
    let t1 = qb.table("t1")?;
    let t2 = qb.table("t2")?;
    let on = Expression::eq(qb.col("t0", "a")?, qb.col("t1", "a")?);
    let right = qb.right_outer(t0, t1, on)?;
    let on = Expression::eq(qb.col("t1", "b")?, qb.col("t2", "k")?);
    let root = qb.left_outer(right, t2, on)?;
    let filter = Expression::is_not_null(qb.col("t0", "b")?);
    qb.filter(filter);
    let query = qb.build(root)?;

    let outcome = optimize(&query, &catalog)?;
    assert_eq!(rewritten_shape(&query, &outcome)?, "LOJ(INNER(t1, t0), t2)");
    let rewritten = outcome.apply_to(&query);

    let mut rng = StdRng::seed_from_u64(3);
    for _ in 0..20 {
        check_against_sqlite(&query, &rewritten, &random_instance(&mut rng))?;
    }
    Ok(())
}
