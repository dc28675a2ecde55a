#![forbid(unsafe_code)]

//! Relations: "when these dependencies change, run this callback".
//!
//! A [`Relation`] pairs a dependency accessor with a callback. Defining it on
//! a field creates one [`Effect`] whose tracked body reads the dependencies;
//! the callback runs, untracked, whenever the read value changes. The first
//! run only records dependencies and never calls the callback.
//!
//! Because effects are scheduled through the batch queue, several
//! dependency writes inside one [`batch`](formula_runtime::batch) produce a
//! single callback with all of them applied. A run whose dependency value
//! equals the value last delivered is skipped.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use formula_runtime::{Effect, untrack};
use serde_json::Value;

use crate::error::Result;
use crate::field::Field;

pub type RelationCallback = Rc<dyn Fn(&Field, &Value)>;

/// What a relation depends on.
#[derive(Clone)]
pub enum RelationDeps {
    /// One field path. The callback receives its value.
    Path(String),
    /// Several paths. The callback receives an array of their values.
    Paths(Vec<String>),
    /// Arbitrary tracked accessor.
    Custom(Rc<dyn Fn(&Field) -> Value>),
}

impl fmt::Debug for RelationDeps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Paths(paths) => f.debug_tuple("Paths").field(paths).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl From<&str> for RelationDeps {
    fn from(path: &str) -> Self {
        Self::Path(path.to_string())
    }
}

impl From<String> for RelationDeps {
    fn from(path: String) -> Self {
        Self::Path(path)
    }
}

impl From<Vec<String>> for RelationDeps {
    fn from(paths: Vec<String>) -> Self {
        Self::Paths(paths)
    }
}

impl<const N: usize> From<[&str; N]> for RelationDeps {
    fn from(paths: [&str; N]) -> Self {
        Self::Paths(paths.iter().map(|path| (*path).to_string()).collect())
    }
}

impl RelationDeps {
    /// Read the dependency value (tracked when called inside an effect).
    pub fn read(&self, field: &Field) -> Result<Value> {
        match self {
            Self::Path(path) => field.model().get_field_value(path),
            Self::Paths(paths) => field.model().get_field_values(paths),
            Self::Custom(accessor) => Ok(accessor(field)),
        }
    }
}

/// Dependency accessor plus callback.
#[derive(Clone)]
pub struct Relation {
    deps: RelationDeps,
    callback: RelationCallback,
}

impl fmt::Debug for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relation")
            .field("deps", &self.deps)
            .finish_non_exhaustive()
    }
}

impl Relation {
    pub fn new(deps: impl Into<RelationDeps>, callback: impl Fn(&Field, &Value) + 'static) -> Self {
        Self {
            deps: deps.into(),
            callback: Rc::new(callback),
        }
    }

    /// Relation over a custom accessor.
    pub fn custom(
        accessor: impl Fn(&Field) -> Value + 'static,
        callback: impl Fn(&Field, &Value) + 'static,
    ) -> Self {
        Self::new(RelationDeps::Custom(Rc::new(accessor)), callback)
    }

    #[must_use]
    pub fn deps(&self) -> &RelationDeps {
        &self.deps
    }
}

/// Create the reaction for `relation` on `field`.
///
/// Path dependencies are resolved once up front so that a bad path fails
/// here rather than inside the reaction. Later resolution failures (a
/// dependency removed from the graph) are logged and skip the run.
pub fn define_relation(field: &Field, relation: Relation) -> Result<Effect> {
    let Relation { deps, callback } = relation;
    untrack(|| deps.read(field))?;

    let weak = field.downgrade();
    let last: RefCell<Option<Value>> = RefCell::new(None);
    let effect = Effect::new(move || {
        let Some(field) = weak.upgrade() else {
            return;
        };
        let value = match deps.read(&field) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(
                    message = "formula.relation.unresolved",
                    path = %field.path(),
                    error = %err
                );
                return;
            }
        };
        let previous = last.replace(Some(value.clone()));
        match previous {
            None => {}
            Some(previous) if previous == value => {
                tracing::trace!(message = "formula.relation.unchanged", path = %field.path());
            }
            Some(_) => {
                tracing::debug!(message = "formula.relation.run", path = %field.path(), deps = ?deps);
                untrack(|| callback(&field, &value));
            }
        }
    });
    Ok(effect)
}

/// Create one reaction per relation, in order.
pub fn define_relations(field: &Field, relations: impl IntoIterator<Item = Relation>) -> Result<Vec<Effect>> {
    relations
        .into_iter()
        .map(|relation| define_relation(field, relation))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FieldConfig, FormConfig};
    use crate::error::FormulaError;
    use crate::model::AbstractModel;
    use serde_json::json;
    use std::cell::Cell;

    fn form() -> AbstractModel {
        AbstractModel::new(
            FormConfig::new("t")
                .with_field(FieldConfig::new("a"))
                .with_field(FieldConfig::new("b"))
                .with_field(FieldConfig::new("total")),
        )
        .unwrap()
    }

    #[test]
    fn first_run_records_without_calling_back() {
        let model = form();
        let total = model.get_field("total").unwrap();
        let calls = Rc::new(Cell::new(0));
        let calls_in = Rc::clone(&calls);
        let effect = define_relation(&total, Relation::new("a", move |_, _| calls_in.set(calls_in.get() + 1))).unwrap();
        assert_eq!(calls.get(), 0);
        assert_eq!(effect.run_count(), 1);
        model.set_field_value("a", json!(1)).unwrap();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn batched_writes_deliver_once() {
        let model = form();
        let total = model.get_field("total").unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_in = Rc::clone(&seen);
        let _effect = define_relation(
            &total,
            Relation::new(["a", "b"], move |field, values| {
                seen_in.borrow_mut().push(values.clone());
                let sum: i64 = values
                    .as_array()
                    .into_iter()
                    .flatten()
                    .filter_map(Value::as_i64)
                    .sum();
                field.set_value(json!(sum));
            }),
        )
        .unwrap();

        model.batch(|| {
            model.set_field_value("a", json!(2)).unwrap();
            model.set_field_value("b", json!(3)).unwrap();
        });
        assert_eq!(*seen.borrow(), vec![json!([2, 3])]);
        assert_eq!(model.peek_field_value("total").unwrap(), json!(5));
    }

    #[test]
    fn same_value_write_does_not_call_back() {
        let model = form();
        let total = model.get_field("total").unwrap();
        let calls = Rc::new(Cell::new(0));
        let calls_in = Rc::clone(&calls);
        let _effect = define_relation(&total, Relation::new("a", move |_, _| calls_in.set(calls_in.get() + 1))).unwrap();
        model.set_field_value("a", json!(1)).unwrap();
        model.set_field_value("a", json!(1)).unwrap();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn custom_accessor_tracks_what_it_reads() {
        let model = form();
        let total = model.get_field("total").unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_in = Rc::clone(&seen);
        let _effect = define_relation(
            &total,
            Relation::custom(
                |field| field.model().value("b"),
                move |_, value| seen_in.borrow_mut().push(value.clone()),
            ),
        )
        .unwrap();
        model.set_field_value("a", json!(1)).unwrap();
        model.set_field_value("b", json!("x")).unwrap();
        assert_eq!(*seen.borrow(), vec![json!("x")]);
    }

    #[test]
    fn disposed_relation_never_runs() {
        let model = form();
        let total = model.get_field("total").unwrap();
        let calls = Rc::new(Cell::new(0));
        let calls_in = Rc::clone(&calls);
        let effect = define_relation(&total, Relation::new("a", move |_, _| calls_in.set(calls_in.get() + 1))).unwrap();
        effect.dispose();
        model.set_field_value("a", json!(1)).unwrap();
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn unresolvable_path_fails_definition() {
        let model = form();
        let total = model.get_field("total").unwrap();
        let err = define_relation(&total, Relation::new("ghost.deep", |_, _| {})).unwrap_err();
        assert!(matches!(err, FormulaError::PathResolution { .. }));
    }

    #[test]
    fn define_relations_keeps_order() {
        let model = form();
        let total = model.get_field("total").unwrap();
        let order = Rc::new(RefCell::new(Vec::new()));
        let relations: Vec<Relation> = (0..3)
            .map(|tag| {
                let order = Rc::clone(&order);
                Relation::new("a", move |_, _| order.borrow_mut().push(tag))
            })
            .collect();
        let effects = define_relations(&total, relations).unwrap();
        assert_eq!(effects.len(), 3);
        model.set_field_value("a", json!(true)).unwrap();
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
    }
}
