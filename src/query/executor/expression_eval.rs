// Expression Evaluation Utility
//
// Three-valued SQL evaluation of bound expressions against a row source.
// Also used by the predicate classifier to fold constant conjuncts.

use std::cmp::Ordering;

use crate::query::ast::{ColumnRef, Expression, Operator, UnaryOperator};
use crate::query::executor::result::{DataValue, QueryError, QueryResult};

/// Supplies column values while evaluating an expression
pub trait ColumnSource {
    fn column_value(&self, column: ColumnRef) -> QueryResult<DataValue>;
}

/// Row source without any columns, for constant expressions
pub struct NoColumns;

impl ColumnSource for NoColumns {
    fn column_value(&self, column: ColumnRef) -> QueryResult<DataValue> {
        Err(QueryError::ColumnNotFound(format!(
            "column {} of relation {} in a constant context",
            column.ordinal, column.rel
        )))
    }
}

/// Evaluate a boolean expression to TRUE, FALSE or UNKNOWN (`None`)
pub fn evaluate_predicate(expr: &Expression, source: &dyn ColumnSource) -> QueryResult<Option<bool>> {
    match evaluate_expression(expr, source)? {
        DataValue::Boolean(b) => Ok(Some(b)),
        DataValue::Null => Ok(None),
        other => Err(QueryError::TypeError(format!(
            "predicate evaluated to non-boolean value {}",
            other
        ))),
    }
}

/// Fold an expression that references no column; `None` if it does or if
/// evaluation fails
pub fn fold_constant(expr: &Expression) -> Option<DataValue> {
    if expr.any(|e| matches!(e, Expression::Column(_) | Expression::Subquery { .. })) {
        return None;
    }
    evaluate_expression(expr, &NoColumns).ok()
}

// Evaluate an expression in the context of a single row.
pub fn evaluate_expression(expr: &Expression, source: &dyn ColumnSource) -> QueryResult<DataValue> {
    match expr {
        Expression::Literal(val) => Ok(DataValue::from(val)),
        Expression::Column(col_ref) => source.column_value(*col_ref),
        Expression::BinaryOp { left, op: Operator::And, right } => {
            let l = evaluate_predicate(left, source)?;
            // FALSE AND x is FALSE without looking at x
            if l == Some(false) {
                return Ok(DataValue::Boolean(false));
            }
            let r = evaluate_predicate(right, source)?;
            Ok(match (l, r) {
                (_, Some(false)) => DataValue::Boolean(false),
                (Some(true), Some(true)) => DataValue::Boolean(true),
                _ => DataValue::Null,
            })
        }
        Expression::BinaryOp { left, op: Operator::Or, right } => {
            let l = evaluate_predicate(left, source)?;
            if l == Some(true) {
                return Ok(DataValue::Boolean(true));
            }
            let r = evaluate_predicate(right, source)?;
            Ok(match (l, r) {
                (_, Some(true)) => DataValue::Boolean(true),
                (Some(false), Some(false)) => DataValue::Boolean(false),
                _ => DataValue::Null,
            })
        }
        Expression::BinaryOp { left, op, right } => {
            let left_val = evaluate_expression(left, source)?;
            let right_val = evaluate_expression(right, source)?;

            // op(NULL, _) -> NULL, op(_, NULL) -> NULL
            if left_val.is_null() || right_val.is_null() {
                return Ok(DataValue::Null);
            }

            if op.is_comparison() {
                return compare_values(&left_val, *op, &right_val);
            }
            evaluate_arithmetic(left_val, *op, right_val)
        }
        Expression::UnaryOp { op, expr } => {
            let val = evaluate_expression(expr, source)?;
            match op {
                UnaryOperator::Minus => match val {
                    DataValue::Integer(i) => i.checked_neg().map(DataValue::Integer).ok_or(QueryError::NumericOverflow),
                    DataValue::Float(f) => Ok(DataValue::Float(-f)),
                    DataValue::Null => Ok(DataValue::Null),
                    other => Err(QueryError::TypeError(format!("Unary minus not supported for {:?}", other))),
                },
                // NOT TRUE -> FALSE, NOT FALSE -> TRUE, NOT NULL -> NULL
                UnaryOperator::Not => match val {
                    DataValue::Boolean(b) => Ok(DataValue::Boolean(!b)),
                    DataValue::Null => Ok(DataValue::Null),
                    other => Err(QueryError::TypeError(format!(
                        "Unary NOT requires a boolean or NULL operand, got {:?}",
                        other
                    ))),
                },
            }
        }
        Expression::IsNull { expr, negated } => {
            let val = evaluate_expression(expr, source)?;
            Ok(DataValue::Boolean(val.is_null() != *negated))
        }
        Expression::InList { expr, list, negated } => {
            let val = evaluate_expression(expr, source)?;
            let found = in_list(&val, list, source)?;
            Ok(negate_if(found, *negated))
        }
        Expression::Between { expr, low, high, negated } => {
            let val = evaluate_expression(expr, source)?;
            let low = evaluate_expression(low, source)?;
            let high = evaluate_expression(high, source)?;
            let ge = compare_values(&val, Operator::GreaterEquals, &low)?;
            let le = compare_values(&val, Operator::LessEquals, &high)?;
            let within = match (ge.as_bool(), le.as_bool()) {
                (Some(false), _) | (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            };
            Ok(negate_if(within, *negated))
        }
        Expression::Like { expr, pattern, negated } => {
            let val = evaluate_expression(expr, source)?;
            let pattern = evaluate_expression(pattern, source)?;
            let matched = match (&val, &pattern) {
                (DataValue::Null, _) | (_, DataValue::Null) => None,
                (DataValue::Text(s), DataValue::Text(p)) => Some(like_match(s, p)),
                _ => {
                    return Err(QueryError::TypeError(format!(
                        "LIKE requires text operands, got {:?} and {:?}",
                        val, pattern
                    )))
                }
            };
            Ok(negate_if(matched, *negated))
        }
        Expression::Function { name, args } => {
            let values = args
                .iter()
                .map(|a| evaluate_expression(a, source))
                .collect::<QueryResult<Vec<_>>>()?;
            evaluate_function(name, values)
        }
        Expression::Case { operand, when_then_clauses, else_clause } => {
            let operand_value = match operand {
                Some(op_expr) => Some(evaluate_expression(op_expr, source)?),
                None => None,
            };

            for (when_expr, then_expr) in when_then_clauses {
                let condition_met = match &operand_value {
                    // Simple CASE: NULL never matches
                    Some(op_val) => {
                        let when_value = evaluate_expression(when_expr, source)?;
                        compare_values(op_val, Operator::Equals, &when_value)?.as_bool() == Some(true)
                    }
                    // Searched CASE: UNKNOWN counts as not met
                    None => evaluate_predicate(when_expr, source)? == Some(true),
                };

                if condition_met {
                    return evaluate_expression(then_expr, source);
                }
            }

            match else_clause {
                Some(else_expr) => evaluate_expression(else_expr, source),
                None => Ok(DataValue::Null),
            }
        }
        Expression::Subquery { .. } => Err(QueryError::Unsupported(
            "subqueries are opaque to the reference evaluator".to_string(),
        )),
    }
}

fn negate_if(value: Option<bool>, negated: bool) -> DataValue {
    match value {
        Some(b) => DataValue::Boolean(b != negated),
        None => DataValue::Null,
    }
}

fn in_list(val: &DataValue, list: &[Expression], source: &dyn ColumnSource) -> QueryResult<Option<bool>> {
    if val.is_null() {
        return Ok(None);
    }
    let mut saw_null = false;
    for item in list {
        let item = evaluate_expression(item, source)?;
        match compare_values(val, Operator::Equals, &item)? {
            DataValue::Boolean(true) => return Ok(Some(true)),
            DataValue::Null => saw_null = true,
            _ => {}
        }
    }
    Ok(if saw_null { None } else { Some(false) })
}

fn compare_values(left: &DataValue, op: Operator, right: &DataValue) -> QueryResult<DataValue> {
    let ordering = match left.compare(right)? {
        Some(o) => o,
        None => return Ok(DataValue::Null),
    };
    let result = match op {
        Operator::Equals => ordering == Ordering::Equal,
        Operator::NotEquals => ordering != Ordering::Equal,
        Operator::LessThan => ordering == Ordering::Less,
        Operator::GreaterThan => ordering == Ordering::Greater,
        Operator::LessEquals => ordering != Ordering::Greater,
        Operator::GreaterEquals => ordering != Ordering::Less,
        other => {
            return Err(QueryError::ExecutionError(format!(
                "{} is not a comparison operator",
                other
            )))
        }
    };
    Ok(DataValue::Boolean(result))
}

fn evaluate_arithmetic(left_val: DataValue, op: Operator, right_val: DataValue) -> QueryResult<DataValue> {
    match op {
        Operator::Plus => match (left_val, right_val) {
            (DataValue::Integer(l), DataValue::Integer(r)) => Ok(DataValue::Integer(l.checked_add(r).ok_or(QueryError::NumericOverflow)?)),
            (DataValue::Float(l), DataValue::Float(r)) => Ok(DataValue::Float(l + r)),
            (DataValue::Integer(l), DataValue::Float(r)) => Ok(DataValue::Float(l as f64 + r)),
            (DataValue::Float(l), DataValue::Integer(r)) => Ok(DataValue::Float(l + r as f64)),
            _ => Err(QueryError::TypeError("Unsupported types for + operator".to_string())),
        },
        Operator::Minus => match (left_val, right_val) {
            (DataValue::Integer(l), DataValue::Integer(r)) => Ok(DataValue::Integer(l.checked_sub(r).ok_or(QueryError::NumericOverflow)?)),
            (DataValue::Float(l), DataValue::Float(r)) => Ok(DataValue::Float(l - r)),
            (DataValue::Integer(l), DataValue::Float(r)) => Ok(DataValue::Float(l as f64 - r)),
            (DataValue::Float(l), DataValue::Integer(r)) => Ok(DataValue::Float(l - r as f64)),
            _ => Err(QueryError::TypeError("Unsupported types for - operator".to_string())),
        },
        Operator::Multiply => match (left_val, right_val) {
            (DataValue::Integer(l), DataValue::Integer(r)) => Ok(DataValue::Integer(l.checked_mul(r).ok_or(QueryError::NumericOverflow)?)),
            (DataValue::Float(l), DataValue::Float(r)) => Ok(DataValue::Float(l * r)),
            (DataValue::Integer(l), DataValue::Float(r)) => Ok(DataValue::Float(l as f64 * r)),
            (DataValue::Float(l), DataValue::Integer(r)) => Ok(DataValue::Float(l * r as f64)),
            _ => Err(QueryError::TypeError("Unsupported types for * operator".to_string())),
        },
        Operator::Divide => match (left_val, right_val) {
            (DataValue::Integer(l), DataValue::Integer(r)) => {
                if r == 0 { Err(QueryError::DivisionByZero) } else { Ok(DataValue::Integer(l.checked_div(r).ok_or(QueryError::NumericOverflow)?)) }
            }
            (DataValue::Float(l), DataValue::Float(r)) => {
                if r == 0.0 { Err(QueryError::DivisionByZero) } else { Ok(DataValue::Float(l / r)) }
            }
            (DataValue::Integer(l), DataValue::Float(r)) => {
                if r == 0.0 { Err(QueryError::DivisionByZero) } else { Ok(DataValue::Float(l as f64 / r)) }
            }
            (DataValue::Float(l), DataValue::Integer(r)) => {
                if r == 0 { Err(QueryError::DivisionByZero) } else { Ok(DataValue::Float(l / r as f64)) }
            }
            _ => Err(QueryError::TypeError("Unsupported types for / operator".to_string())),
        },
        Operator::Modulo => modulo(left_val, right_val),
        other => Err(QueryError::ExecutionError(format!("Unsupported binary operator {}", other))),
    }
}

fn modulo(left_val: DataValue, right_val: DataValue) -> QueryResult<DataValue> {
    match (left_val, right_val) {
        (DataValue::Integer(l), DataValue::Integer(r)) => {
            if r == 0 { Err(QueryError::DivisionByZero) } else { Ok(DataValue::Integer(l.checked_rem(r).ok_or(QueryError::NumericOverflow)?)) }
        }
        _ => Err(QueryError::TypeError("Modulo operator only supports integers".to_string())),
    }
}

fn evaluate_function(name: &str, mut args: Vec<DataValue>) -> QueryResult<DataValue> {
    let upper = name.to_uppercase();
    if upper == "COALESCE" {
        return Ok(args.into_iter().find(|v| !v.is_null()).unwrap_or(DataValue::Null));
    }
    // Every other supported function is strict
    if args.iter().any(|v| v.is_null()) {
        return Ok(DataValue::Null);
    }
    let arity_error = || QueryError::TypeError(format!("Wrong number of arguments for {}", upper));
    match (upper.as_str(), args.len()) {
        ("UPPER", 1) | ("LOWER", 1) | ("TRIM", 1) | ("LENGTH", 1) => {
            let text = match args.remove(0) {
                DataValue::Text(s) => s,
                other => other.to_string(),
            };
            Ok(match upper.as_str() {
                "UPPER" => DataValue::Text(text.to_uppercase()),
                "LOWER" => DataValue::Text(text.to_lowercase()),
                "TRIM" => DataValue::Text(text.trim().to_string()),
                _ => DataValue::Integer(text.chars().count() as i64),
            })
        }
        ("CHAR", 1) => Ok(DataValue::Text(args.remove(0).to_string())),
        ("ABS", 1) => match args.remove(0) {
            DataValue::Integer(i) => i.checked_abs().map(DataValue::Integer).ok_or(QueryError::NumericOverflow),
            DataValue::Float(f) => Ok(DataValue::Float(f.abs())),
            other => Err(QueryError::TypeError(format!("ABS requires a number, got {:?}", other))),
        },
        ("MOD", 2) => {
            let right = args.remove(1);
            modulo(args.remove(0), right)
        }
        ("SUBSTR", 2) | ("SUBSTR", 3) => {
            let text = args[0].to_string();
            let start = match &args[1] {
                DataValue::Integer(i) => (*i).max(1) as usize - 1,
                other => return Err(QueryError::TypeError(format!("SUBSTR start must be an integer, got {:?}", other))),
            };
            let len = match args.get(2) {
                Some(DataValue::Integer(l)) => (*l).max(0) as usize,
                Some(other) => return Err(QueryError::TypeError(format!("SUBSTR length must be an integer, got {:?}", other))),
                None => usize::MAX,
            };
            Ok(DataValue::Text(text.chars().skip(start).take(len).collect()))
        }
        ("UPPER" | "LOWER" | "TRIM" | "LENGTH" | "CHAR" | "ABS" | "MOD" | "SUBSTR", _) => Err(arity_error()),
        _ => Err(QueryError::Unsupported(format!("function {}", upper))),
    }
}

/// SQL LIKE with `%` and `_` wildcards
fn like_match(text: &str, pattern: &str) -> bool {
    let t: Vec<char> = text.chars().collect();
    let p: Vec<char> = pattern.chars().collect();
    // matches[j] is true if t[..i] matches p[..j]
    let mut matches = vec![false; p.len() + 1];
    matches[0] = true;
    for j in 1..=p.len() {
        matches[j] = matches[j - 1] && p[j - 1] == '%';
    }
    for i in 1..=t.len() {
        let mut next = vec![false; p.len() + 1];
        for j in 1..=p.len() {
            next[j] = match p[j - 1] {
                '%' => next[j - 1] || matches[j],
                '_' => matches[j - 1],
                c => matches[j - 1] && c == t[i - 1],
            };
        }
        matches = next;
    }
    matches[p.len()]
}
