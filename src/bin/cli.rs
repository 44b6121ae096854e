use std::path::PathBuf;
use std::fs;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use log::info;
use serde::Serialize;

use ojrewrite::query::executor::execute;
use ojrewrite::query::planner::trace::RewriteStep;
use ojrewrite::{bind, CompilationContext, Optimizer, OptimizerConfig, QueryDocument};

#[derive(Parser)]
#[command(author, version, about = "ojr-explain - show how the outer join rewrites reshape a query")]
struct Cli {
    /// Query document (JSON)
    query: PathBuf,

    /// Optimizer configuration (JSON); defaults apply to missing fields
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Do not collect or print the rewrite trace
    #[arg(long)]
    no_trace: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

/// Row counts of the original and rewritten query over the document's data
#[derive(Serialize)]
struct RowCheck {
    original: usize,
    rewritten: usize,
    same_rows: bool,
}

#[derive(Serialize)]
struct Report {
    original_sql: String,
    rewritten_sql: String,
    original_shape: String,
    rewritten_shape: String,
    changed: bool,
    iterations: usize,
    plan_before: Vec<String>,
    plan_after: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    trace: Option<Vec<RewriteStep>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rows: Option<RowCheck>,
}

fn load_config(path: Option<&PathBuf>) -> Result<OptimizerConfig> {
    match path {
        Some(path) => {
            let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
        }
        None => Ok(OptimizerConfig::default()),
    }
}

fn build_report(cli: &Cli) -> Result<Report> {
    let doc = QueryDocument::from_file(&cli.query).with_context(|| format!("loading {}", cli.query.display()))?;
    let mut config = load_config(cli.config.as_ref())?;
    if cli.no_trace {
        config.collect_trace = false;
    }

    let (catalog, query) = bind(&doc)?;
    let ctx = CompilationContext::new(catalog);
    let outcome = Optimizer::new(config).optimize(&query, &ctx)?;
    let rewritten = outcome.apply_to(&query);

    let rows = match doc.instance()? {
        Some(instance) => {
            let before = execute(&query, &instance)?;
            let after = execute(&rewritten, &instance)?;
            Some(RowCheck {
                original: before.row_count(),
                rewritten: after.row_count(),
                same_rows: before.same_rows(&after),
            })
        }
        None => None,
    };

    let trace = outcome.trace.as_ref();
    Ok(Report {
        original_sql: query.to_sql()?,
        rewritten_sql: rewritten.to_sql()?,
        original_shape: query.tree.shape(query.tree.root()?, &query.relations)?,
        rewritten_shape: outcome.tree.shape(outcome.tree.root()?, &query.relations)?,
        changed: outcome.changed,
        iterations: outcome.iterations,
        plan_before: query.tree.explain(&query.relations)?,
        plan_after: outcome.tree.explain(&query.relations)?,
        trace: trace.map(|t| t.steps.clone()),
        rows,
    })
}

fn print_text(report: &Report) {
    println!("Original:  {}", report.original_sql);
    println!("Rewritten: {}", report.rewritten_sql);
    println!("Shape:     {} => {}", report.original_shape, report.rewritten_shape);
    println!("Changed:   {} ({} iteration(s))", report.changed, report.iterations);

    println!();
    println!("Plan before:");
    for line in &report.plan_before {
        println!("  {}", line);
    }
    println!("Plan after:");
    for line in &report.plan_after {
        println!("  {}", line);
    }

    if let Some(steps) = &report.trace {
        println!();
        println!("Trace:");
        if steps.is_empty() {
            println!("  (no rewrites)");
        }
        for (i, step) in steps.iter().enumerate() {
            println!("{:>3}. {}: {} => {}", i + 1, step.rule, step.before, step.after);
        }
    }

    if let Some(rows) = &report.rows {
        println!();
        println!(
            "Rows: {} original, {} rewritten, same rows: {}",
            rows.original, rows.rewritten, rows.same_rows
        );
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let report = build_report(&cli)?;
    info!("explained {}", cli.query.display());
    match cli.format {
        Format::Text => print_text(&report),
        Format::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    if let Some(rows) = &report.rows {
        if !rows.same_rows {
            bail!("rewritten query returned different rows");
        }
    }
    Ok(())
}
