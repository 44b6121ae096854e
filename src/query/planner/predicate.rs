//! Predicate Classifier
//!
//! Splits an ON or WHERE expression into its top-level conjuncts and tags
//! each with the relations it references, its shape and the set of
//! relations it null-rejects. The rewrite rules consult only these cached
//! facts; a conjunct the classifier cannot reason about soundly is marked
//! unclassifiable and never justifies a rewrite.

use std::collections::HashSet;

use once_cell::sync::Lazy;

use crate::common::TableSet;
use crate::query::ast::{ColumnNamer, ColumnRef, Expression, Operator, UnaryOperator, Value};
use crate::query::executor::expression_eval::fold_constant;
use crate::query::executor::result::DataValue;
use crate::query::planner::relation::Relations;

/// Scalar functions that return NULL whenever any argument is NULL
static STRICT_FUNCTIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["UPPER", "LOWER", "ABS", "CHAR", "LENGTH", "TRIM", "SUBSTR", "MOD"]
        .into_iter()
        .collect()
});

/// Functions whose result is not a deterministic function of their arguments
static VOLATILE_FUNCTIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "RANDOM",
        "RAND",
        "NEWID",
        "UUID",
        "CURRENT_TIMESTAMP",
        "CURRENT_DATE",
        "CURRENT_TIME",
        "NOW",
    ]
    .into_iter()
    .collect()
});

/// Shape of one top-level conjunct
#[derive(Debug, Clone, PartialEq)]
pub enum ConjunctKind {
    /// `a.x = b.y` over two different relations
    EquiJoin { left: ColumnRef, right: ColumnRef },
    /// `a.x = <non-null literal>`, either side
    ColumnEqualsConstant { column: ColumnRef, value: Value },
    /// Touches exactly one relation
    SelfReferential,
    /// References no relation; the folded value (`None` for UNKNOWN)
    Constant(Option<bool>),
    Disjunction,
    Negation,
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conjunct {
    pub expr: Expression,
    pub kind: ConjunctKind,
    pub referenced_tables: TableSet,
    /// Relations whose all-NULL row makes this conjunct not TRUE
    pub null_rejected: TableSet,
    pub classifiable: bool,
}

impl Conjunct {
    pub fn is_equality(&self) -> bool {
        matches!(
            self.kind,
            ConjunctKind::EquiJoin { .. } | ConjunctKind::ColumnEqualsConstant { .. }
        )
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.kind, ConjunctKind::Constant(_))
    }
}

/// A classified boolean expression
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    conjuncts: Vec<Conjunct>,
    referenced_tables: TableSet,
}

/// Classify an ON or WHERE expression against the relations of its block
pub fn classify(expr: &Expression, relations: &Relations) -> Predicate {
    Predicate::classify(expr, relations)
}

impl Predicate {
    /// The empty conjunction (cross join, absent WHERE)
    pub fn always_true() -> Self {
        Predicate {
            conjuncts: Vec::new(),
            referenced_tables: TableSet::EMPTY,
        }
    }

    pub fn classify(expr: &Expression, relations: &Relations) -> Self {
        let aggregated = relations.aggregated();
        let conjuncts: Vec<Conjunct> = expr
            .split_conjunction()
            .into_iter()
            .map(|c| classify_conjunct(c, aggregated))
            .collect();
        let referenced_tables = conjuncts
            .iter()
            .fold(TableSet::EMPTY, |acc, c| acc.union(&c.referenced_tables));
        Predicate {
            conjuncts,
            referenced_tables,
        }
    }

    pub fn conjuncts(&self) -> &[Conjunct] {
        &self.conjuncts
    }

    pub fn referenced_tables(&self) -> TableSet {
        self.referenced_tables
    }

    /// Relations referenced by the conjuncts that are not constants
    pub fn non_constant_tables(&self) -> TableSet {
        self.conjuncts
            .iter()
            .filter(|c| !c.is_constant())
            .fold(TableSet::EMPTY, |acc, c| acc.union(&c.referenced_tables))
    }

    pub fn is_always_true(&self) -> bool {
        self.conjuncts.is_empty()
    }

    /// Every conjunct can be reasoned about
    pub fn is_classifiable(&self) -> bool {
        self.conjuncts.iter().all(|c| c.classifiable)
    }

    /// Relations null-rejected by the classifiable conjuncts
    pub fn null_rejected(&self) -> TableSet {
        self.conjuncts
            .iter()
            .filter(|c| c.classifiable)
            .fold(TableSet::EMPTY, |acc, c| acc.union(&c.null_rejected))
    }

    pub fn null_rejects(&self, rel: usize) -> bool {
        self.null_rejected().contains(rel)
    }

    /// Whether an all-NULL row over `tables` can never satisfy the predicate
    pub fn null_rejects_any(&self, tables: &TableSet) -> bool {
        self.null_rejected().overlaps(tables)
    }

    /// Non-empty, and every conjunct is an equi-join or a column/constant equality
    pub fn is_conjunction_of_equalities(&self) -> bool {
        !self.conjuncts.is_empty() && self.conjuncts.iter().all(|c| c.is_equality())
    }

    pub fn is_self_referential(&self) -> bool {
        self.referenced_tables.len() == 1
    }

    /// Folded value when every conjunct is a constant
    pub fn constant_value(&self) -> Option<Option<bool>> {
        if self.conjuncts.is_empty() || !self.conjuncts.iter().all(|c| c.is_constant()) {
            return None;
        }
        let mut value = Some(true);
        for c in &self.conjuncts {
            value = match (value, &c.kind) {
                (_, ConjunctKind::Constant(Some(false))) | (Some(false), _) => Some(false),
                (Some(true), ConjunctKind::Constant(Some(true))) => Some(true),
                _ => None,
            };
        }
        Some(value)
    }

    /// A classifiable conjunct folds to FALSE or UNKNOWN, so the predicate never holds
    pub fn is_contradiction(&self) -> bool {
        self.conjuncts.iter().any(|c| {
            c.classifiable && matches!(c.kind, ConjunctKind::Constant(Some(false)) | ConjunctKind::Constant(None))
        })
    }

    /// Equi-join column pairs, in conjunct order
    pub fn equi_joins(&self) -> impl Iterator<Item = (ColumnRef, ColumnRef)> + '_ {
        self.conjuncts.iter().filter_map(|c| match c.kind {
            ConjunctKind::EquiJoin { left, right } => Some((left, right)),
            _ => None,
        })
    }

    /// Rebuild the expression; `None` for the empty conjunction
    pub fn expression(&self) -> Option<Expression> {
        Expression::conjunction(self.conjuncts.iter().map(|c| c.expr.clone()).collect())
    }

    pub fn render(&self, namer: &dyn ColumnNamer) -> String {
        if self.conjuncts.is_empty() {
            return "TRUE".to_string();
        }
        let many = self.conjuncts.len() > 1;
        self.conjuncts
            .iter()
            .map(|c| {
                let text = c.expr.render(namer);
                match c.expr {
                    Expression::BinaryOp { op: Operator::Or, .. } if many => format!("({})", text),
                    _ => text,
                }
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}

fn classify_conjunct(expr: &Expression, aggregated: TableSet) -> Conjunct {
    let referenced_tables = expr.referenced_tables();
    let has_subquery = expr.any(|e| matches!(e, Expression::Subquery { .. }));
    let volatile = expr.any(|e| match e {
        Expression::Function { name, .. } => VOLATILE_FUNCTIONS.contains(name.to_uppercase().as_str()),
        _ => false,
    });
    let mut classifiable = !has_subquery && !volatile && !referenced_tables.overlaps(&aggregated);

    let kind = if referenced_tables.is_empty() && !has_subquery {
        match fold_constant(expr) {
            Some(DataValue::Boolean(b)) => ConjunctKind::Constant(Some(b)),
            Some(DataValue::Null) => ConjunctKind::Constant(None),
            _ => {
                classifiable = false;
                ConjunctKind::Constant(None)
            }
        }
    } else {
        match expr {
            Expression::BinaryOp { left, op: Operator::Equals, right } => match (left.as_ref(), right.as_ref()) {
                (Expression::Column(l), Expression::Column(r)) if l.rel != r.rel => {
                    ConjunctKind::EquiJoin { left: *l, right: *r }
                }
                (Expression::Column(c), Expression::Literal(v)) | (Expression::Literal(v), Expression::Column(c))
                    if *v != Value::Null =>
                {
                    ConjunctKind::ColumnEqualsConstant {
                        column: *c,
                        value: v.clone(),
                    }
                }
                _ if referenced_tables.len() == 1 => ConjunctKind::SelfReferential,
                _ => ConjunctKind::Other,
            },
            Expression::BinaryOp { op: Operator::Or, .. } => ConjunctKind::Disjunction,
            Expression::UnaryOp { op: UnaryOperator::Not, .. } => ConjunctKind::Negation,
            _ if referenced_tables.len() == 1 => ConjunctKind::SelfReferential,
            _ => ConjunctKind::Other,
        }
    };

    let null_rejected = if classifiable { nonnullable_rels(expr) } else { TableSet::EMPTY };

    Conjunct {
        expr: expr.clone(),
        kind,
        referenced_tables,
        null_rejected,
        classifiable,
    }
}

/// Relations whose all-NULL row keeps `expr` from evaluating to TRUE
pub fn nonnullable_rels(expr: &Expression) -> TableSet {
    match expr {
        Expression::BinaryOp { left, op: Operator::And, right } => {
            nonnullable_rels(left).union(&nonnullable_rels(right))
        }
        Expression::BinaryOp { left, op: Operator::Or, right } => {
            nonnullable_rels(left).intersection(&nonnullable_rels(right))
        }
        Expression::BinaryOp { left, op, right } if op.is_comparison() => {
            null_if_rels(left).union(&null_if_rels(right))
        }
        Expression::UnaryOp { op: UnaryOperator::Not, expr } => not_false_rels(expr),
        Expression::IsNull { expr, negated: true } => null_if_rels(expr),
        Expression::IsNull { negated: false, .. } => TableSet::EMPTY,
        Expression::InList { expr, list, .. } => {
            let has_null = list.iter().any(|e| matches!(e, Expression::Literal(Value::Null)));
            if list.is_empty() || has_null {
                TableSet::EMPTY
            } else {
                null_if_rels(expr)
            }
        }
        Expression::Between { expr, low, high, negated: false } => {
            null_if_rels(expr).union(&null_if_rels(low)).union(&null_if_rels(high))
        }
        Expression::Between { expr, low, high, negated: true } => {
            null_if_rels(expr).union(&null_if_rels(low).intersection(&null_if_rels(high)))
        }
        Expression::Like { expr, pattern, .. } => null_if_rels(expr).union(&null_if_rels(pattern)),
        Expression::Literal(_) | Expression::Case { .. } | Expression::Subquery { .. } => TableSet::EMPTY,
        other => null_if_rels(other),
    }
}

// Relations whose all-NULL row keeps `expr` from evaluating to FALSE, which
// is what `NOT expr` needs to be rejected.
fn not_false_rels(expr: &Expression) -> TableSet {
    match expr {
        Expression::BinaryOp { left, op: Operator::And, right } => {
            not_false_rels(left).intersection(&not_false_rels(right))
        }
        Expression::BinaryOp { left, op: Operator::Or, right } => {
            not_false_rels(left).union(&not_false_rels(right))
        }
        Expression::UnaryOp { op: UnaryOperator::Not, expr } => nonnullable_rels(expr),
        // NOT (x IS NULL) behaves as x IS NOT NULL
        Expression::IsNull { expr, negated: false } => null_if_rels(expr),
        Expression::IsNull { negated: true, .. } => TableSet::EMPTY,
        other => null_if_rels(other),
    }
}

/// Relations whose all-NULL row forces `expr` to evaluate to NULL
pub fn null_if_rels(expr: &Expression) -> TableSet {
    match expr {
        Expression::Column(c) => TableSet::single(c.rel),
        Expression::Literal(_) => TableSet::EMPTY,
        Expression::BinaryOp { left, op: Operator::And | Operator::Or, right } => {
            null_if_rels(left).intersection(&null_if_rels(right))
        }
        Expression::BinaryOp { left, right, .. } => null_if_rels(left).union(&null_if_rels(right)),
        Expression::UnaryOp { expr, .. } => null_if_rels(expr),
        Expression::IsNull { .. } => TableSet::EMPTY,
        Expression::InList { expr, .. } => null_if_rels(expr),
        Expression::Between { expr, low, high, .. } => {
            null_if_rels(expr).union(&null_if_rels(low).intersection(&null_if_rels(high)))
        }
        Expression::Like { expr, pattern, .. } => null_if_rels(expr).union(&null_if_rels(pattern)),
        Expression::Function { name, args } => {
            let upper = name.to_uppercase();
            if upper == "COALESCE" {
                let mut sets = args.iter().map(null_if_rels);
                match sets.next() {
                    Some(first) => sets.fold(first, |acc, s| acc.intersection(&s)),
                    None => TableSet::EMPTY,
                }
            } else if STRICT_FUNCTIONS.contains(upper.as_str()) {
                args.iter().fold(TableSet::EMPTY, |acc, a| acc.union(&null_if_rels(a)))
            } else {
                TableSet::EMPTY
            }
        }
        Expression::Case { .. } | Expression::Subquery { .. } => TableSet::EMPTY,
    }
}
