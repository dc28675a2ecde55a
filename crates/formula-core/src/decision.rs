#![forbid(unsafe_code)]

//! Boolean decisions: named flags combined with operators.
//!
//! A [`Decision`] is an immutable expression tree. Leaves reference a flag
//! by name; inner nodes apply an [`Operator`] to their children. Decisions
//! are evaluated against anything implementing [`BoolLookup`], typically a
//! [`BoolContext`](crate::bools::BoolContext).
//!
//! ```
//! use formula_core::decision::D;
//! use std::collections::HashMap;
//!
//! let visible = D::flag("a").and("b").or("c");
//! let ctx: HashMap<String, bool> =
//!     [("a", true), ("b", false), ("c", true)].map(|(k, v)| (k.to_string(), v)).into();
//! assert!(visible.evaluate(&ctx).unwrap());
//! ```
//!
//! # Evaluation
//!
//! `and` stops at the first `false` child, `or` at the first `true`, left to
//! right. Short-circuiting only changes which flags are looked up: a flag
//! that is never reached cannot produce an [`UnresolvedFlag`] error.
//! Custom operators evaluate all of their children first.
//!
//! [`UnresolvedFlag`]: crate::error::FormulaError::UnresolvedFlag

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use crate::error::{FormulaError, Result};
use crate::operator::{Operator, OperatorRegistry};

/// Read access to named boolean flags.
pub trait BoolLookup {
    fn lookup(&self, name: &str) -> Option<bool>;
}

impl BoolLookup for HashMap<String, bool> {
    fn lookup(&self, name: &str) -> Option<bool> {
        self.get(name).copied()
    }
}

impl BoolLookup for BTreeMap<String, bool> {
    fn lookup(&self, name: &str) -> Option<bool> {
        self.get(name).copied()
    }
}

/// Operator node with validated arity.
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorNode {
    operator: Operator,
    children: Vec<Decision>,
}

impl OperatorNode {
    #[must_use]
    pub fn operator(&self) -> &Operator {
        &self.operator
    }

    #[must_use]
    pub fn children(&self) -> &[Decision] {
        &self.children
    }

    fn only_child(&self) -> Result<&Decision> {
        match self.children.as_slice() {
            [only] => Ok(only),
            other => Err(FormulaError::InvalidArity {
                operator: self.operator.name().to_string(),
                expected: self.operator.arity().to_string(),
                actual: other.len(),
            }),
        }
    }
}

/// Compiled boolean expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Reference to a flag by name.
    Leaf(String),
    Operator(OperatorNode),
}

impl From<&str> for Decision {
    fn from(name: &str) -> Self {
        Self::Leaf(name.to_string())
    }
}

impl From<String> for Decision {
    fn from(name: String) -> Self {
        Self::Leaf(name)
    }
}

impl From<&Decision> for Decision {
    fn from(decision: &Decision) -> Self {
        decision.clone()
    }
}

impl Decision {
    /// Build an operator node, checking the operator's arity contract.
    pub fn operator(operator: Operator, children: Vec<Decision>) -> Result<Self> {
        operator.arity().check(operator.name(), children.len())?;
        Ok(Self::Operator(OperatorNode { operator, children }))
    }

    // Built-in arities are satisfied by construction in the helpers below.
    fn builtin(operator: Operator, children: Vec<Decision>) -> Self {
        Self::Operator(OperatorNode { operator, children })
    }

    /// `self AND other`.
    #[must_use]
    pub fn and(self, other: impl Into<Decision>) -> Self {
        Self::builtin(Operator::And, vec![self, other.into()])
    }

    /// `self OR other`.
    #[must_use]
    pub fn or(self, other: impl Into<Decision>) -> Self {
        Self::builtin(Operator::Or, vec![self, other.into()])
    }

    /// `NOT self`.
    #[must_use]
    pub fn not(self) -> Self {
        Self::builtin(Operator::Not, vec![self])
    }

    /// Apply a custom operator from the process-wide registry with `self` as
    /// the first operand.
    pub fn apply<I, N>(self, name: &str, operands: I) -> Result<Self>
    where
        I: IntoIterator<Item = N>,
        N: Into<Decision>,
    {
        self.apply_in(OperatorRegistry::global(), name, operands)
    }

    /// Like [`apply`](Self::apply) against an explicit registry.
    pub fn apply_in<I, N>(self, registry: &OperatorRegistry, name: &str, operands: I) -> Result<Self>
    where
        I: IntoIterator<Item = N>,
        N: Into<Decision>,
    {
        let operands = std::iter::once(self).chain(operands.into_iter().map(Into::into));
        registry.decision(name, operands)
    }

    /// Reduce the tree to a boolean against `ctx`.
    pub fn evaluate<C: BoolLookup + ?Sized>(&self, ctx: &C) -> Result<bool> {
        let node = match self {
            Self::Leaf(name) => {
                return ctx
                    .lookup(name)
                    .ok_or_else(|| FormulaError::unresolved_flag(name.as_str()));
            }
            Self::Operator(node) => node,
        };
        match &node.operator {
            Operator::And => {
                for child in &node.children {
                    if !child.evaluate(ctx)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Operator::Or => {
                for child in &node.children {
                    if child.evaluate(ctx)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Operator::Not => Ok(!node.only_child()?.evaluate(ctx)?),
            Operator::Use => node.only_child()?.evaluate(ctx),
            Operator::Custom(custom) => {
                let operands = node
                    .children
                    .iter()
                    .map(|child| child.evaluate(ctx))
                    .collect::<Result<Vec<bool>>>()?;
                Ok(custom.apply(&operands))
            }
        }
    }

    /// Every flag name referenced anywhere in the tree.
    #[must_use]
    pub fn flags(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_flags(&mut out);
        out
    }

    fn collect_flags<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Self::Leaf(name) => {
                out.insert(name.as_str());
            }
            Self::Operator(node) => {
                for child in &node.children {
                    child.collect_flags(out);
                }
            }
        }
    }

    /// Number of nodes in the tree.
    #[must_use]
    pub fn size(&self) -> usize {
        match self {
            Self::Leaf(_) => 1,
            Self::Operator(node) => 1 + node.children.iter().map(Decision::size).sum::<usize>(),
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Leaf(name) => f.write_str(name),
            Self::Operator(node) => {
                write!(f, "{}(", node.operator.name())?;
                for (i, child) in node.children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{child}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Entry points for building decisions.
pub struct D;

impl D {
    /// `USE name`: a single flag standing alone as a decision.
    pub fn flag(node: impl Into<Decision>) -> Decision {
        Decision::builtin(Operator::Use, vec![node.into()])
    }

    pub fn and(left: impl Into<Decision>, right: impl Into<Decision>) -> Decision {
        Decision::builtin(Operator::And, vec![left.into(), right.into()])
    }

    pub fn or(left: impl Into<Decision>, right: impl Into<Decision>) -> Decision {
        Decision::builtin(Operator::Or, vec![left.into(), right.into()])
    }

    pub fn not(node: impl Into<Decision>) -> Decision {
        Decision::builtin(Operator::Not, vec![node.into()])
    }

    /// Variadic AND. Fails on an empty operand list.
    pub fn all<I, N>(operands: I) -> Result<Decision>
    where
        I: IntoIterator<Item = N>,
        N: Into<Decision>,
    {
        Decision::operator(Operator::And, operands.into_iter().map(Into::into).collect())
    }

    /// Variadic OR. Fails on an empty operand list.
    pub fn any<I, N>(operands: I) -> Result<Decision>
    where
        I: IntoIterator<Item = N>,
        N: Into<Decision>,
    {
        Decision::operator(Operator::Or, operands.into_iter().map(Into::into).collect())
    }

    /// Custom operator from the process-wide registry.
    pub fn custom<I, N>(name: &str, operands: I) -> Result<Decision>
    where
        I: IntoIterator<Item = N>,
        N: Into<Decision>,
    {
        OperatorRegistry::global().decision(name, operands)
    }
}
