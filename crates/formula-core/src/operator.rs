#![forbid(unsafe_code)]

//! Decision operators and the custom-operator registry.
//!
//! Four operators are built in (`and`, `or`, `not`, `use`). Applications add
//! their own by registering a named reducer `(&[bool]) -> bool` together with
//! an [`Arity`] contract. Registration goes into an explicit
//! [`OperatorRegistry`]; a process-wide instance is available through
//! [`OperatorRegistry::global`] and is shared by every form in the process.
//!
//! A custom operator is resolved when a decision is *constructed*: the node
//! stores the reducer itself, so evaluation never consults the registry and
//! unregistering an operator does not break decisions already built.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use crate::decision::Decision;
use crate::error::{FormulaError, Result};

/// Names reserved for the built-in operators.
pub const BUILTIN_OPERATORS: [&str; 4] = ["and", "or", "not", "use"];

/// Operand-count contract of an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exactly(usize),
    AtLeast(usize),
}

impl Arity {
    #[must_use]
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Self::Exactly(n) => count == n,
            Self::AtLeast(n) => count >= n,
        }
    }

    pub(crate) fn check(self, operator: &str, count: usize) -> Result<()> {
        if self.accepts(count) {
            Ok(())
        } else {
            Err(FormulaError::InvalidArity {
                operator: operator.to_string(),
                expected: self.to_string(),
                actual: count,
            })
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exactly(n) => write!(f, "exactly {n}"),
            Self::AtLeast(n) => write!(f, "at least {n}"),
        }
    }
}

type Reducer = Arc<dyn Fn(&[bool]) -> bool + Send + Sync>;

/// A registered custom operator: name, arity contract and reducer.
#[derive(Clone)]
pub struct CustomOperator {
    name: Arc<str>,
    arity: Arity,
    reduce: Reducer,
}

impl CustomOperator {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn arity(&self) -> Arity {
        self.arity
    }

    #[must_use]
    pub fn apply(&self, operands: &[bool]) -> bool {
        (self.reduce)(operands)
    }
}

impl fmt::Debug for CustomOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomOperator")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

impl PartialEq for CustomOperator {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && Arc::ptr_eq(&self.reduce, &other.reduce)
    }
}

/// Operator of a decision node.
#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    And,
    Or,
    Not,
    Use,
    Custom(CustomOperator),
}

impl Operator {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::And => "and",
            Self::Or => "or",
            Self::Not => "not",
            Self::Use => "use",
            Self::Custom(custom) => custom.name(),
        }
    }

    #[must_use]
    pub fn arity(&self) -> Arity {
        match self {
            Self::And | Self::Or => Arity::AtLeast(1),
            Self::Not | Self::Use => Arity::Exactly(1),
            Self::Custom(custom) => custom.arity(),
        }
    }

    fn builtin(name: &str) -> Option<Self> {
        match name {
            "and" => Some(Self::And),
            "or" => Some(Self::Or),
            "not" => Some(Self::Not),
            "use" => Some(Self::Use),
            _ => None,
        }
    }
}

/// Named table of custom operators.
#[derive(Default)]
pub struct OperatorRegistry {
    operators: RwLock<HashMap<String, CustomOperator>>,
}

impl fmt::Debug for OperatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorRegistry")
            .field("operators", &self.names())
            .finish()
    }
}

impl OperatorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static OperatorRegistry {
        static GLOBAL: OnceLock<OperatorRegistry> = OnceLock::new();
        GLOBAL.get_or_init(OperatorRegistry::new)
    }

    /// Register a variadic operator (`at least 1` operand).
    pub fn register(
        &self,
        name: &str,
        reduce: impl Fn(&[bool]) -> bool + Send + Sync + 'static,
    ) -> Result<()> {
        self.register_with_arity(name, Arity::AtLeast(1), reduce)
    }

    /// Register an operator with an explicit arity contract. Re-registering
    /// a custom name replaces the previous reducer.
    pub fn register_with_arity(
        &self,
        name: &str,
        arity: Arity,
        reduce: impl Fn(&[bool]) -> bool + Send + Sync + 'static,
    ) -> Result<()> {
        if BUILTIN_OPERATORS.contains(&name) {
            return Err(FormulaError::ReservedOperator {
                name: name.to_string(),
            });
        }
        let operator = CustomOperator {
            name: Arc::from(name),
            arity,
            reduce: Arc::new(reduce),
        };
        self.operators
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), operator);
        tracing::debug!(message = "formula.operator.register", name, %arity);
        Ok(())
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.operators
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some()
    }

    /// Drop every custom operator.
    pub fn reset(&self) {
        self.operators
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<CustomOperator> {
        self.operators
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Whether `name` is a built-in or a registered custom operator.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        Operator::builtin(name).is_some() || self.get(name).is_some()
    }

    /// Registered custom operator names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .operators
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Resolve an operator by name (built-ins first).
    pub fn resolve(&self, name: &str) -> Result<Operator> {
        Operator::builtin(name)
            .or_else(|| self.get(name).map(Operator::Custom))
            .ok_or_else(|| FormulaError::unknown_operator(name))
    }

    /// Build a decision node for the operator called `name`.
    pub fn decision<I, N>(&self, name: &str, operands: I) -> Result<Decision>
    where
        I: IntoIterator<Item = N>,
        N: Into<Decision>,
    {
        let operator = self.resolve(name)?;
        Decision::operator(operator, operands.into_iter().map(Into::into).collect())
    }
}

/// Register a custom operator in the process-wide registry.
pub fn register_custom_operator(
    name: &str,
    reduce: impl Fn(&[bool]) -> bool + Send + Sync + 'static,
) -> Result<()> {
    OperatorRegistry::global().register(name, reduce)
}
