// Rewrite Trace
//
// Ordered record of the rules the optimizer applied, with the shape of the
// rewritten subtree before and after each step.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewritePass {
    Linearization,
    OuterJoinReduction,
    InnerJoinReordering,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteRule {
    /// RightOuter(A, B) to LeftOuter(B, A)
    NormalizeRightOuter,
    /// LeftOuter(A, LeftOuter(B, C)) to LeftOuter(LeftOuter(A, B), C)
    OuterJoinAssociativity,
    /// Outer join demoted to inner join
    OuterToInner,
    /// Inner(D, LeftOuter(B, C)) to LeftOuter(Inner(D, B), C)
    InnerPastOuter,
}

impl fmt::Display for RewriteRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RewriteRule::NormalizeRightOuter => "normalize right outer join",
            RewriteRule::OuterJoinAssociativity => "outer join associativity",
            RewriteRule::OuterToInner => "outer to inner",
            RewriteRule::InnerPastOuter => "inner join past outer join",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewriteStep {
    pub pass: RewritePass,
    pub rule: RewriteRule,
    pub before: String,
    pub after: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RewriteTrace {
    #[serde(skip)]
    enabled: bool,
    pub steps: Vec<RewriteStep>,
    /// Explain listing of the input tree
    pub plan_before: Vec<String>,
    /// Explain listing of the rewritten tree
    pub plan_after: Vec<String>,
}

impl RewriteTrace {
    pub fn new(enabled: bool) -> Self {
        RewriteTrace {
            enabled,
            ..Default::default()
        }
    }

    /// A trace that records nothing
    pub fn disabled() -> Self {
        Self::new(false)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record a step; dropped when the trace is disabled
    pub fn record(&mut self, step: RewriteStep) {
        if self.enabled {
            self.steps.push(step);
        }
    }

    pub fn rules(&self) -> Vec<RewriteRule> {
        self.steps.iter().map(|s| s.rule).collect()
    }

    pub fn count(&self, rule: RewriteRule) -> usize {
        self.steps.iter().filter(|s| s.rule == rule).count()
    }
}

impl fmt::Display for RewriteTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            writeln!(f, "{:>3}. {}: {} => {}", i + 1, step.rule, step.before, step.after)?;
        }
        Ok(())
    }
}
