#![forbid(unsafe_code)]

//! Declarative (JSON) form of decisions.
//!
//! ```json
//! { "or": [ { "and": ["isAdult", { "not": "isGuest" }] }, "isAdmin" ] }
//! ```
//!
//! A bare string is a flag. An object with exactly one key is an operator
//! node whose key names the operator (built-in or custom) and whose value is
//! either a single operand or an array of operands.
//! [`DecisionExpr::compile`] turns the data into a [`Decision`], resolving
//! operator names against a registry.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::decision::Decision;
use crate::error::{FormulaError, Result};
use crate::operator::OperatorRegistry;

/// Uncompiled decision expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DecisionExpr {
    Flag(String),
    Operator(BTreeMap<String, Operands>),
}

/// Operand(s) of an operator node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operands {
    Many(Vec<DecisionExpr>),
    One(Box<DecisionExpr>),
}

impl DecisionExpr {
    /// Parse an expression from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Compile against the process-wide operator registry.
    pub fn compile_global(&self) -> Result<Decision> {
        self.compile(OperatorRegistry::global())
    }

    /// Compile into a [`Decision`].
    ///
    /// Fails with `UnknownOperator` for unregistered operator names,
    /// `InvalidArity` when the operand count breaks the operator's contract
    /// and `InvalidExpression` for objects without exactly one key.
    pub fn compile(&self, registry: &OperatorRegistry) -> Result<Decision> {
        match self {
            Self::Flag(name) => Ok(Decision::Leaf(name.clone())),
            Self::Operator(entries) => {
                let mut iter = entries.iter();
                let (Some((name, operands)), None) = (iter.next(), iter.next()) else {
                    return Err(FormulaError::InvalidExpression {
                        reason: format!(
                            "operator objects need exactly one key, found {}",
                            entries.len()
                        ),
                    });
                };
                let children = match operands {
                    Operands::One(expr) => vec![expr.compile(registry)?],
                    Operands::Many(exprs) => exprs
                        .iter()
                        .map(|expr| expr.compile(registry))
                        .collect::<Result<Vec<_>>>()?,
                };
                registry.decision(name, children)
            }
        }
    }
}
