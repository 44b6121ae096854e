use std::io::Write;
use std::process::{Command, Output};

use anyhow::Result;
use tempfile::NamedTempFile;

// t1 LEFT JOIN (t2 LEFT JOIN t3 ON t2.c2 = t3.c1) ON t1.c1 = t2.c1
const CHAIN: &str = r#"{
  "tables": [
    {"name": "t1", "columns": [{"name": "c1", "primary_key": true}]},
    {"name": "t2", "columns": [{"name": "c1"}, {"name": "c2"}]},
    {"name": "t3", "columns": [{"name": "c1"}]}
  ],
  "from": {"join": {
    "kind": "left",
    "left": {"table": {"name": "t1"}},
    "right": {"join": {
      "kind": "left",
      "left": {"table": {"name": "t2"}},
      "right": {"table": {"name": "t3"}},
      "on": {"binary": {"op": "=", "left": {"column": "t2.c2"}, "right": {"column": "t3.c1"}}}
    }},
    "on": {"binary": {"op": "=", "left": {"column": "t1.c1"}, "right": {"column": "t2.c1"}}}
  }},
  "data": {
    "t1": [[1], [2], [3]],
    "t2": [[1, 10], [1, 20], [2, null]],
    "t3": [[10], [10]]
  }
}"#;

fn write_temp(text: &str) -> Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    file.write_all(text.as_bytes())?;
    file.flush()?;
    Ok(file)
}

fn explain(args: &[&str]) -> Result<Output> {
    Ok(Command::new(env!("CARGO_BIN_EXE_ojr-explain")).args(args).output()?)
}

fn path_of(file: &NamedTempFile) -> String {
    file.path().to_string_lossy().into_owned()
}

/// Test the default text report
#[test]
fn test_text_report() -> Result<()> {
    let query = write_temp(CHAIN)?;
    let output = explain(&[&path_of(&query)])?;
    assert!(output.status.success(), "ojr-explain failed: {}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.contains("Shape:     LOJ(t1, LOJ(t2, t3)) => LOJ(LOJ(t1, t2), t3)"));
    assert!(stdout.contains("Rewritten: SELECT t1.c1, t2.c1, t2.c2, t3.c1 FROM t1 LEFT OUTER JOIN t2"));
    assert!(stdout.contains("Plan before:\n  Left Outer Join:\n  Left input:\n  _Scan: t1"));
    assert!(stdout.contains("outer join associativity"));
    assert!(stdout.contains("Rows: 5 original, 5 rewritten, same rows: true"));
    Ok(())
}

/// Test the JSON report
#[test]
fn test_json_report() -> Result<()> {
    let query = write_temp(CHAIN)?;
    let output = explain(&["--format", "json", &path_of(&query)])?;
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(report["original_shape"], "LOJ(t1, LOJ(t2, t3))");
    assert_eq!(report["rewritten_shape"], "LOJ(LOJ(t1, t2), t3)");
    assert_eq!(report["changed"], true);
    assert_eq!(report["trace"][0]["rule"], "outer_join_associativity");
    assert_eq!(report["trace"][0]["pass"], "linearization");
    assert_eq!(report["rows"]["same_rows"], true);
    assert_eq!(report["rows"]["original"], 5);
    Ok(())
}

/// Test --no-trace and --config
#[test]
fn test_trace_flag_and_config_file() -> Result<()> {
    let query = write_temp(CHAIN)?;

    let output = explain(&["--no-trace", "-f", "json", &path_of(&query)])?;
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert!(report.get("trace").is_none());
    assert_eq!(report["rewritten_shape"], "LOJ(LOJ(t1, t2), t3)");

    let config = write_temp(r#"{"enable_linearization": false}"#)?;
    let output = explain(&["--config", &path_of(&config), "-f", "json", &path_of(&query)])?;
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(report["changed"], false);
    assert_eq!(report["rewritten_shape"], "LOJ(t1, LOJ(t2, t3))");
    assert_eq!(report["trace"].as_array().map(Vec::len), Some(0));
    Ok(())
}

/// Test that bad input fails with a message
#[test]
fn test_bad_input() -> Result<()> {
    let output = explain(&["/nonexistent/query.json"])?;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("loading"));

    let broken = write_temp(r#"{"tables": [], "from": {"table": {"name": "missing"}}}"#)?;
    let output = explain(&[&path_of(&broken)])?;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("missing"));

    let config = write_temp("not json")?;
    let query = write_temp(CHAIN)?;
    let output = explain(&["--config", &path_of(&config), &path_of(&query)])?;
    assert!(!output.status.success());
    Ok(())
}
