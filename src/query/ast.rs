// Bound Expression Tree
//
// This module defines the expression nodes that appear in ON and WHERE
// clauses after name resolution: every column is already bound to a
// relation of the query block.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::common::{RelId, TableSet};

/// A column of one relation of the query block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnRef {
    pub rel: RelId,
    pub ordinal: usize,
}

impl ColumnRef {
    pub fn new(rel: RelId, ordinal: usize) -> Self {
        ColumnRef { rel, ordinal }
    }
}

/// Expression in an ON or WHERE clause
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Literal value
    Literal(Value),
    /// Column reference
    Column(ColumnRef),
    /// Binary operation (e.g., a + b, x = y, p AND q)
    BinaryOp {
        left: Box<Expression>,
        op: Operator,
        right: Box<Expression>,
    },
    /// Unary operation (NOT p, -x)
    UnaryOp {
        op: UnaryOperator,
        expr: Box<Expression>,
    },
    /// x IS [NOT] NULL
    IsNull {
        expr: Box<Expression>,
        negated: bool,
    },
    /// x [NOT] IN (v1, v2, ...)
    InList {
        expr: Box<Expression>,
        list: Vec<Expression>,
        negated: bool,
    },
    /// x [NOT] BETWEEN low AND high
    Between {
        expr: Box<Expression>,
        low: Box<Expression>,
        high: Box<Expression>,
        negated: bool,
    },
    /// x [NOT] LIKE pattern
    Like {
        expr: Box<Expression>,
        pattern: Box<Expression>,
        negated: bool,
    },
    /// Scalar function call
    Function {
        name: String,
        args: Vec<Expression>,
    },
    /// CASE [operand] WHEN .. THEN .. [ELSE ..] END
    Case {
        operand: Option<Box<Expression>>,
        when_then_clauses: Vec<(Expression, Expression)>,
        else_clause: Option<Box<Expression>>,
    },
    /// Opaque subquery; `correlated` holds the outer relations it references
    Subquery {
        correlated: TableSet,
    },
}

/// SQL values
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    // Comparison
    Equals,
    NotEquals,
    LessThan,
    GreaterThan,
    LessEquals,
    GreaterEquals,
    // Logical
    And,
    Or,
    // Arithmetic
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    Not,
    Minus,
}

impl Operator {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Operator::Equals
                | Operator::NotEquals
                | Operator::LessThan
                | Operator::GreaterThan
                | Operator::LessEquals
                | Operator::GreaterEquals
        )
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            Operator::Plus | Operator::Minus | Operator::Multiply | Operator::Divide | Operator::Modulo
        )
    }

    /// SQL spelling of the operator
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Equals => "=",
            Operator::NotEquals => "<>",
            Operator::LessThan => "<",
            Operator::GreaterThan => ">",
            Operator::LessEquals => "<=",
            Operator::GreaterEquals => ">=",
            Operator::And => "AND",
            Operator::Or => "OR",
            Operator::Plus => "+",
            Operator::Minus => "-",
            Operator::Multiply => "*",
            Operator::Divide => "/",
            Operator::Modulo => "%",
        }
    }

    /// Parse the SQL spelling of a binary operator
    pub fn from_symbol(symbol: &str) -> Option<Operator> {
        let op = match symbol.to_uppercase().as_str() {
            "=" => Operator::Equals,
            "<>" | "!=" => Operator::NotEquals,
            "<" => Operator::LessThan,
            ">" => Operator::GreaterThan,
            "<=" => Operator::LessEquals,
            ">=" => Operator::GreaterEquals,
            "AND" => Operator::And,
            "OR" => Operator::Or,
            "+" => Operator::Plus,
            "-" => Operator::Minus,
            "*" => Operator::Multiply,
            "/" => Operator::Divide,
            "%" => Operator::Modulo,
            _ => return None,
        };
        Some(op)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Value::Boolean(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
        }
    }
}

/// Resolves bound column references back to printable names
pub trait ColumnNamer {
    fn column_name(&self, column: ColumnRef) -> String;
}

/// Fallback namer printing `r<rel>.c<ordinal>`
pub struct OrdinalNamer;

impl ColumnNamer for OrdinalNamer {
    fn column_name(&self, column: ColumnRef) -> String {
        format!("r{}.c{}", column.rel, column.ordinal)
    }
}

// Builder helpers, used by the binder, the query builder and tests.
impl Expression {
    pub fn col(rel: RelId, ordinal: usize) -> Expression {
        Expression::Column(ColumnRef::new(rel, ordinal))
    }

    pub fn int(value: i64) -> Expression {
        Expression::Literal(Value::Integer(value))
    }

    pub fn string(value: &str) -> Expression {
        Expression::Literal(Value::String(value.to_string()))
    }

    pub fn null() -> Expression {
        Expression::Literal(Value::Null)
    }

    pub fn binary(left: Expression, op: Operator, right: Expression) -> Expression {
        Expression::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn eq(left: Expression, right: Expression) -> Expression {
        Expression::binary(left, Operator::Equals, right)
    }

    pub fn and(left: Expression, right: Expression) -> Expression {
        Expression::binary(left, Operator::And, right)
    }

    pub fn or(left: Expression, right: Expression) -> Expression {
        Expression::binary(left, Operator::Or, right)
    }

    pub fn not(expr: Expression) -> Expression {
        Expression::UnaryOp {
            op: UnaryOperator::Not,
            expr: Box::new(expr),
        }
    }

    pub fn is_null(expr: Expression) -> Expression {
        Expression::IsNull {
            expr: Box::new(expr),
            negated: false,
        }
    }

    pub fn is_not_null(expr: Expression) -> Expression {
        Expression::IsNull {
            expr: Box::new(expr),
            negated: true,
        }
    }

    pub fn function(name: &str, args: Vec<Expression>) -> Expression {
        Expression::Function {
            name: name.to_uppercase(),
            args,
        }
    }

    /// AND together a list of expressions; `None` for an empty list
    pub fn conjunction(exprs: Vec<Expression>) -> Option<Expression> {
        exprs.into_iter().reduce(Expression::and)
    }

    /// Split top-level ANDs into their conjuncts, left to right
    pub fn split_conjunction(&self) -> Vec<&Expression> {
        let mut conjuncts = Vec::new();
        let mut stack = vec![self];
        while let Some(expr) = stack.pop() {
            match expr {
                Expression::BinaryOp { left, op: Operator::And, right } => {
                    stack.push(right);
                    stack.push(left);
                }
                other => conjuncts.push(other),
            }
        }
        conjuncts
    }

    /// Direct sub-expressions
    pub fn children(&self) -> Vec<&Expression> {
        match self {
            Expression::Literal(_) | Expression::Column(_) | Expression::Subquery { .. } => Vec::new(),
            Expression::BinaryOp { left, right, .. } => vec![left, right],
            Expression::UnaryOp { expr, .. } | Expression::IsNull { expr, .. } => vec![expr],
            Expression::InList { expr, list, .. } => {
                let mut out = vec![expr.as_ref()];
                out.extend(list.iter());
                out
            }
            Expression::Between { expr, low, high, .. } => vec![expr, low, high],
            Expression::Like { expr, pattern, .. } => vec![expr, pattern],
            Expression::Function { args, .. } => args.iter().collect(),
            Expression::Case { operand, when_then_clauses, else_clause } => {
                let mut out = Vec::new();
                if let Some(operand) = operand {
                    out.push(operand.as_ref());
                }
                for (when, then) in when_then_clauses {
                    out.push(when);
                    out.push(then);
                }
                if let Some(else_expr) = else_clause {
                    out.push(else_expr.as_ref());
                }
                out
            }
        }
    }

    /// Every column referenced anywhere in the expression
    pub fn columns(&self) -> Vec<ColumnRef> {
        let mut columns = Vec::new();
        let mut stack = vec![self];
        while let Some(expr) = stack.pop() {
            if let Expression::Column(c) = expr {
                columns.push(*c);
            }
            stack.extend(expr.children());
        }
        columns
    }

    /// Relations referenced by the expression, including the outer
    /// relations a correlated subquery reaches into
    pub fn referenced_tables(&self) -> TableSet {
        let mut tables = TableSet::EMPTY;
        let mut stack = vec![self];
        while let Some(expr) = stack.pop() {
            match expr {
                Expression::Column(c) => tables.insert(c.rel),
                Expression::Subquery { correlated } => tables = tables.union(correlated),
                _ => {}
            }
            stack.extend(expr.children());
        }
        tables
    }

    /// Whether any node of the expression satisfies `pred`
    pub fn any(&self, pred: impl Fn(&Expression) -> bool) -> bool {
        let mut stack = vec![self];
        while let Some(expr) = stack.pop() {
            if pred(expr) {
                return true;
            }
            stack.extend(expr.children());
        }
        false
    }

    /// Render the expression as SQL text
    pub fn render(&self, namer: &dyn ColumnNamer) -> String {
        match self {
            Expression::Literal(v) => v.to_string(),
            Expression::Column(c) => namer.column_name(*c),
            Expression::BinaryOp { left, op, right } => {
                let l = left.render_operand(namer, *op);
                let r = right.render_operand(namer, *op);
                format!("{} {} {}", l, op, r)
            }
            Expression::UnaryOp { op: UnaryOperator::Not, expr } => {
                format!("NOT ({})", expr.render(namer))
            }
            Expression::UnaryOp { op: UnaryOperator::Minus, expr } => {
                format!("-{}", expr.render_operand(namer, Operator::Multiply))
            }
            Expression::IsNull { expr, negated } => {
                let not = if *negated { " NOT" } else { "" };
                format!("{} IS{} NULL", expr.render_operand(namer, Operator::Equals), not)
            }
            Expression::InList { expr, list, negated } => {
                let items: Vec<String> = list.iter().map(|e| e.render(namer)).collect();
                let not = if *negated { " NOT" } else { "" };
                format!("{}{} IN ({})", expr.render(namer), not, items.join(", "))
            }
            Expression::Between { expr, low, high, negated } => {
                let not = if *negated { " NOT" } else { "" };
                format!(
                    "{}{} BETWEEN {} AND {}",
                    expr.render(namer),
                    not,
                    low.render(namer),
                    high.render(namer)
                )
            }
            Expression::Like { expr, pattern, negated } => {
                let not = if *negated { " NOT" } else { "" };
                format!("{}{} LIKE {}", expr.render(namer), not, pattern.render(namer))
            }
            Expression::Function { name, args } => {
                let args: Vec<String> = args.iter().map(|e| e.render(namer)).collect();
                format!("{}({})", name, args.join(", "))
            }
            Expression::Case { operand, when_then_clauses, else_clause } => {
                let mut out = String::from("CASE");
                if let Some(operand) = operand {
                    out.push_str(&format!(" {}", operand.render(namer)));
                }
                for (when, then) in when_then_clauses {
                    out.push_str(&format!(" WHEN {} THEN {}", when.render(namer), then.render(namer)));
                }
                if let Some(else_expr) = else_clause {
                    out.push_str(&format!(" ELSE {}", else_expr.render(namer)));
                }
                out.push_str(" END");
                out
            }
            Expression::Subquery { .. } => "(SUBQUERY)".to_string(),
        }
    }

    // Parenthesize an operand whose own operator binds looser than `parent`
    fn render_operand(&self, namer: &dyn ColumnNamer, parent: Operator) -> String {
        let text = self.render(namer);
        match self {
            Expression::BinaryOp { op, .. } if precedence(*op) < precedence(parent) => format!("({})", text),
            Expression::BinaryOp { op, .. }
                if *op == parent
                    && matches!(parent, Operator::And | Operator::Or | Operator::Plus | Operator::Multiply) =>
            {
                text
            }
            Expression::BinaryOp { op, .. } if precedence(*op) == precedence(parent) => format!("({})", text),
            _ => text,
        }
    }
}

fn precedence(op: Operator) -> u8 {
    match op {
        Operator::Or => 1,
        Operator::And => 2,
        Operator::Equals
        | Operator::NotEquals
        | Operator::LessThan
        | Operator::GreaterThan
        | Operator::LessEquals
        | Operator::GreaterEquals => 3,
        Operator::Plus | Operator::Minus => 4,
        Operator::Multiply | Operator::Divide | Operator::Modulo => 5,
    }
}
