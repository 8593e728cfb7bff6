//! Boolean filter expressions over typed field paths.
//!
//! A [`Criterion`] is a binary tree of comparison leaves (`path OP value`)
//! joined by AND/OR/NOT. [`Criterion::Empty`] means "always true" and is the
//! identity of [`and`] and [`or`].
//!
//! ```ignore
//! use dataprovider::criterion::{and, Criterion, CriterionOperator};
//!
//! let c = and(
//!     Criterion::new("alert.messageid", CriterionOperator::Equal, "abc"),
//!     Criterion::parse("alert.assessment.impact.severity != 'low'")?,
//! );
//! assert_eq!(c.to_string(), "(alert.messageid == 'abc' && alert.assessment.impact.severity != 'low')");
//! ```

mod operator;
mod parser;

use std::collections::BTreeSet;
use std::fmt;

pub use operator::CriterionOperator;
pub use parser::parse_criteria;

use crate::domain::TypeHandler;
use crate::error::{DataProviderError, Result};
use crate::value::Value;

/// A comparison leaf.
#[derive(Debug, Clone, PartialEq)]
pub struct Leaf {
    pub path: String,
    pub operator: CriterionOperator,
    pub value: Value,
}

impl Leaf {
    pub fn new(path: impl Into<String>, operator: CriterionOperator, value: impl Into<Value>) -> Self {
        Self {
            path: path.into(),
            operator,
            value: value.into(),
        }
    }
}

/// A boolean filter expression.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Criterion {
    #[default]
    Empty,
    Leaf(Leaf),
    Not(Box<Criterion>),
    And(Box<Criterion>, Box<Criterion>),
    Or(Box<Criterion>, Box<Criterion>),
}

/// AND two criteria. An empty operand is absorbed.
pub fn and(a: Criterion, b: Criterion) -> Criterion {
    match (a, b) {
        (Criterion::Empty, x) | (x, Criterion::Empty) => x,
        (a, b) => Criterion::And(Box::new(a), Box::new(b)),
    }
}

/// OR two criteria. An empty operand is absorbed.
pub fn or(a: Criterion, b: Criterion) -> Criterion {
    match (a, b) {
        (Criterion::Empty, x) | (x, Criterion::Empty) => x,
        (a, b) => Criterion::Or(Box::new(a), Box::new(b)),
    }
}

/// Negate a criterion. The negation of the empty criterion stays empty.
pub fn not(a: Criterion) -> Criterion {
    match a {
        Criterion::Empty => Criterion::Empty,
        a => Criterion::Not(Box::new(a)),
    }
}

impl Criterion {
    /// Build a comparison leaf.
    pub fn new(path: impl Into<String>, operator: CriterionOperator, value: impl Into<Value>) -> Self {
        Criterion::Leaf(Leaf::new(path, operator, value))
    }

    /// Build a comparison leaf from an operator token such as `"!=*"`.
    pub fn leaf(path: impl Into<String>, token: &str, value: impl Into<Value>) -> Result<Self> {
        let operator = CriterionOperator::from_token(token)?;
        if operator.is_boolean() {
            return Err(DataProviderError::UnknownOperator(token.into()));
        }
        Ok(Criterion::new(path, operator, value))
    }

    /// Parse the textual filter syntax.
    pub fn parse(text: &str) -> Result<Self> {
        parse_criteria(text)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Criterion::Empty)
    }

    pub fn and(self, other: Criterion) -> Criterion {
        and(self, other)
    }

    pub fn or(self, other: Criterion) -> Criterion {
        or(self, other)
    }

    pub fn negate(self) -> Criterion {
        not(self)
    }

    /// The operator at the root, `None` for the empty criterion.
    pub fn operator(&self) -> Option<CriterionOperator> {
        match self {
            Criterion::Empty => None,
            Criterion::Leaf(leaf) => Some(leaf.operator),
            Criterion::Not(_) => Some(CriterionOperator::Not),
            Criterion::And(..) => Some(CriterionOperator::And),
            Criterion::Or(..) => Some(CriterionOperator::Or),
        }
    }

    /// Every leaf path, recursing through boolean nodes.
    pub fn get_paths(&self) -> BTreeSet<String> {
        let mut paths = BTreeSet::new();
        self.visit_leaves(&mut |leaf| {
            paths.insert(leaf.path.clone());
        });
        paths
    }

    pub fn leaves(&self) -> Vec<&Leaf> {
        let mut out = Vec::new();
        collect_leaves(self, &mut out);
        out
    }

    fn visit_leaves(&self, f: &mut impl FnMut(&Leaf)) {
        match self {
            Criterion::Empty => {}
            Criterion::Leaf(leaf) => f(leaf),
            Criterion::Not(inner) => inner.visit_leaves(f),
            Criterion::And(a, b) | Criterion::Or(a, b) => {
                a.visit_leaves(f);
                b.visit_leaves(f);
            }
        }
    }

    /// Rebuild the tree with every leaf replaced by `f(leaf)`.
    pub fn map_leaves(&self, f: &mut impl FnMut(&Leaf) -> Result<Criterion>) -> Result<Criterion> {
        Ok(match self {
            Criterion::Empty => Criterion::Empty,
            Criterion::Leaf(leaf) => f(leaf)?,
            Criterion::Not(inner) => not(inner.map_leaves(f)?),
            Criterion::And(a, b) => and(a.map_leaves(f)?, b.map_leaves(f)?),
            Criterion::Or(a, b) => or(a.map_leaves(f)?, b.map_leaves(f)?),
        })
    }

    /// Rewrite every leaf through the domain's hook. The receiver is left untouched.
    pub fn compile(&self, handler: &dyn TypeHandler) -> Result<Criterion> {
        self.map_leaves(&mut |leaf| handler.compile_criterion(leaf))
    }

    /// Collapse runs of the same associative operator into N-ary nodes.
    pub fn flatten(&self) -> FlatCriterion {
        match self {
            Criterion::Empty => FlatCriterion::Empty,
            Criterion::Leaf(leaf) => FlatCriterion::Leaf(leaf.clone()),
            Criterion::Not(inner) => FlatCriterion::node(CriterionOperator::Not, vec![inner.flatten()]),
            Criterion::And(a, b) => {
                FlatCriterion::node(CriterionOperator::And, vec![a.flatten(), b.flatten()])
            }
            Criterion::Or(a, b) => {
                FlatCriterion::node(CriterionOperator::Or, vec![a.flatten(), b.flatten()])
            }
        }
    }
}

fn collect_leaves<'a>(criterion: &'a Criterion, out: &mut Vec<&'a Leaf>) {
    match criterion {
        Criterion::Empty => {}
        Criterion::Leaf(leaf) => out.push(leaf),
        Criterion::Not(inner) => collect_leaves(inner, out),
        Criterion::And(a, b) | Criterion::Or(a, b) => {
            collect_leaves(a, out);
            collect_leaves(b, out);
        }
    }
}

/// N-ary view of a criterion produced by [`Criterion::flatten`].
#[derive(Debug, Clone, PartialEq)]
pub enum FlatCriterion {
    Empty,
    Leaf(Leaf),
    Node {
        operator: CriterionOperator,
        operands: Vec<FlatCriterion>,
    },
}

impl FlatCriterion {
    /// Build a node, merging children that carry the same associative operator.
    fn node(operator: CriterionOperator, children: Vec<FlatCriterion>) -> FlatCriterion {
        let mut operands = Vec::with_capacity(children.len());
        for child in children {
            match child {
                FlatCriterion::Empty => {}
                FlatCriterion::Node {
                    operator: child_op,
                    operands: grand,
                } if child_op == operator && operator != CriterionOperator::Not => {
                    operands.extend(grand)
                }
                other => operands.push(other),
            }
        }

        match (operator, operands.len()) {
            (_, 0) => FlatCriterion::Empty,
            (CriterionOperator::And | CriterionOperator::Or, 1) => {
                operands.pop().unwrap_or(FlatCriterion::Empty)
            }
            _ => FlatCriterion::Node { operator, operands },
        }
    }

    /// Re-normalize an already flat tree. Flattening is idempotent.
    pub fn flatten(&self) -> FlatCriterion {
        match self {
            FlatCriterion::Empty => FlatCriterion::Empty,
            FlatCriterion::Leaf(leaf) => FlatCriterion::Leaf(leaf.clone()),
            FlatCriterion::Node { operator, operands } => {
                FlatCriterion::node(*operator, operands.iter().map(|o| o.flatten()).collect())
            }
        }
    }

    pub fn operator(&self) -> Option<CriterionOperator> {
        match self {
            FlatCriterion::Empty => None,
            FlatCriterion::Leaf(leaf) => Some(leaf.operator),
            FlatCriterion::Node { operator, .. } => Some(*operator),
        }
    }

    /// Top-level conjunction terms: the operands of a root AND, or the node itself.
    pub fn conjuncts(&self) -> Vec<&FlatCriterion> {
        match self {
            FlatCriterion::Empty => vec![],
            FlatCriterion::Node {
                operator: CriterionOperator::And,
                operands,
            } => operands.iter().collect(),
            other => vec![other],
        }
    }
}

/// Escape a value for the quoted form used in the textual syntax.
pub fn escape_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn fmt_value(f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
    match value {
        Value::Int(_) | Value::Float(_) => write!(f, "{}", value),
        other => write!(f, "'{}'", escape_value(&other.to_string())),
    }
}

impl fmt::Display for Leaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.value, self.operator) {
            (Value::Null, CriterionOperator::Equal) => write!(f, "!{}", self.path),
            (Value::Null, CriterionOperator::NotEqual) => f.write_str(&self.path),
            (value, operator) => {
                write!(f, "{} {} ", self.path, operator)?;
                fmt_value(f, value)
            }
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Criterion::Empty => Ok(()),
            Criterion::Leaf(leaf) => write!(f, "{}", leaf),
            Criterion::Not(inner) => write!(f, "!({})", inner),
            Criterion::And(a, b) => write!(f, "({} && {})", a, b),
            Criterion::Or(a, b) => write!(f, "({} || {})", a, b),
        }
    }
}
