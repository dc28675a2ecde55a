#![forbid(unsafe_code)]

//! The boolean context: named flags derived from the form's data model.
//!
//! Each predicate `(model) -> bool` is wrapped in its own [`Computed`], so a
//! flag is recomputed lazily, only after something it read changed, and
//! reading it twice between changes runs the predicate once.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use formula_runtime::Computed;

use crate::decision::{BoolLookup, Decision};
use crate::error::{FormulaError, Result};

pub type Predicate<M> = Rc<dyn Fn(&M) -> bool>;

/// Named predicates over a model of type `M`.
pub struct BoolsConfig<M> {
    predicates: Vec<(String, Predicate<M>)>,
}

impl<M> Default for BoolsConfig<M> {
    fn default() -> Self {
        Self {
            predicates: Vec::new(),
        }
    }
}

impl<M> Clone for BoolsConfig<M> {
    fn clone(&self) -> Self {
        Self {
            predicates: self.predicates.clone(),
        }
    }
}

impl<M> fmt::Debug for BoolsConfig<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.predicates.iter().map(|(name, _)| name))
            .finish()
    }
}

impl<M> BoolsConfig<M> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the predicate called `name`.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, predicate: impl Fn(&M) -> bool + 'static) -> Self {
        let name = name.into();
        self.predicates.retain(|(existing, _)| *existing != name);
        self.predicates.push((name, Rc::new(predicate)));
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }
}

/// Live mapping from flag name to a cached derived boolean.
///
/// Cloning shares the same flags.
#[derive(Clone, Default)]
pub struct BoolContext {
    flags: Rc<BTreeMap<String, Computed<bool>>>,
}

impl fmt::Debug for BoolContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoolContext")
            .field("flags", &self.flags.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl BoolContext {
    /// Wire every predicate of `config` as a derived cell over `model`.
    pub fn setup<M: Clone + 'static>(config: &BoolsConfig<M>, model: M) -> Self {
        let flags = config
            .predicates
            .iter()
            .map(|(name, predicate)| {
                let predicate = Rc::clone(predicate);
                let model = model.clone();
                (name.clone(), Computed::new(move || predicate(&model)))
            })
            .collect();
        tracing::debug!(message = "formula.bools.setup", flags = config.len());
        Self {
            flags: Rc::new(flags),
        }
    }

    /// Current value of `name`, tracked when read inside a computation.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<bool> {
        self.flags.get(name).map(Computed::get)
    }

    /// The derived cell behind `name`.
    #[must_use]
    pub fn flag(&self, name: &str) -> Option<Computed<bool>> {
        self.flags.get(name).cloned()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.flags.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.flags.keys().map(String::as_str)
    }

    /// Every flag's current value. Reads are tracked.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, bool> {
        self.flags
            .iter()
            .map(|(name, flag)| (name.clone(), flag.get()))
            .collect()
    }

    /// Fail with `UnresolvedFlag` if `decision` references an unknown flag.
    pub fn ensure_resolvable(&self, decision: &Decision) -> Result<()> {
        match decision.flags().into_iter().find(|name| !self.contains(name)) {
            Some(missing) => Err(FormulaError::unresolved_flag(missing)),
            None => Ok(()),
        }
    }

    pub fn evaluate(&self, decision: &Decision) -> Result<bool> {
        decision.evaluate(self)
    }
}

impl BoolLookup for BoolContext {
    fn lookup(&self, name: &str) -> Option<bool> {
        self.get(name)
    }
}
