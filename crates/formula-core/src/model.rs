#![forbid(unsafe_code)]

//! The abstract model: one form instance.
//!
//! [`AbstractModel`] binds the boolean context, the field graph, the
//! relations attached to its fields and the validation engine into one
//! handle, and is the only place UI adapters mutate form state through.
//! Fields and predicates reach back into their form through a [`ModelRef`],
//! a weak handle that never keeps the form alive.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use formula_runtime::{Effect, Observable, batch, untrack};
use futures::future::{LocalBoxFuture, join_all};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::bools::BoolContext;
use crate::config::{FieldConfig, FormConfig};
use crate::error::{FormulaError, Result};
use crate::field::Field;
use crate::graph::FieldGraph;
use crate::path;
use crate::relation::{self, Relation};
use crate::validation::{ErrorMessage, FieldErrors, ValidationEngine, ValidationReport};

pub(crate) struct FormState {
    pub(crate) id: String,
    pub(crate) bools: BoolContext,
    pub(crate) graph: FieldGraph,
    pub(crate) validation: ValidationEngine,
    pub(crate) submitted: Observable<bool>,
    pub(crate) is_updating: Observable<bool>,
}

impl FormState {
    fn errors(&self) -> BTreeMap<String, FieldErrors> {
        let _ = self.graph.structure_version();
        self.graph
            .fields()
            .into_iter()
            .filter_map(|field| {
                let errors = field.errors();
                (!errors.is_empty()).then(|| (field.path().to_string(), errors))
            })
            .collect()
    }
}

/// Weak handle to a form, passed to boolean predicates and held by fields.
#[derive(Clone)]
pub struct ModelRef {
    state: Weak<FormState>,
}

impl fmt::Debug for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state.upgrade() {
            Some(state) => f.debug_tuple("ModelRef").field(&state.id).finish(),
            None => f.write_str("ModelRef(<dropped>)"),
        }
    }
}

impl ModelRef {
    pub(crate) fn new(state: Weak<FormState>) -> Self {
        Self { state }
    }

    pub(crate) fn state(&self) -> Option<Rc<FormState>> {
        self.state.upgrade()
    }

    fn live(&self, path: &str) -> Result<Rc<FormState>> {
        self.state().ok_or_else(|| FormulaError::Detached {
            path: path.to_string(),
        })
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.state.strong_count() > 0
    }

    pub(crate) fn bools(&self) -> Option<BoolContext> {
        self.state().map(|state| state.bools.clone())
    }

    /// Value at `path`, tracked.
    pub fn get_field_value(&self, path: &str) -> Result<Value> {
        self.live(path)?.graph.resolve(path)
    }

    /// Value at `path` without registering a dependency.
    pub fn peek_field_value(&self, path: &str) -> Result<Value> {
        untrack(|| self.get_field_value(path))
    }

    /// Like [`get_field_value`](Self::get_field_value) with failures read
    /// as `null`. Convenient inside predicates.
    #[must_use]
    pub fn value(&self, path: &str) -> Value {
        self.get_field_value(path).unwrap_or(Value::Null)
    }

    /// Values at `paths` as a JSON array, tracked.
    pub fn get_field_values<S: AsRef<str>>(&self, paths: &[S]) -> Result<Value> {
        paths
            .iter()
            .map(|path| self.get_field_value(path.as_ref()))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array)
    }

    /// The whole model, tracked. `null` once the form is gone.
    #[must_use]
    pub fn model(&self) -> Value {
        self.state().map_or(Value::Null, |state| state.graph.value())
    }
}

/// Everything `on_subscribe` observers receive.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSnapshot {
    pub bools: BTreeMap<String, bool>,
    pub submitted: bool,
    pub errors: BTreeMap<String, FieldErrors>,
    pub model: Value,
    pub is_updating: bool,
}

/// Result of [`AbstractModel::submit`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitOutcome {
    pub valid: bool,
    pub value: Value,
}

/// One form instance. Cloning shares the instance.
#[derive(Clone)]
pub struct AbstractModel {
    state: Rc<FormState>,
}

impl fmt::Debug for AbstractModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbstractModel")
            .field("id", &self.state.id)
            .field("bools", &self.state.bools)
            .field("graph", &self.state.graph)
            .field("validation", &self.state.validation)
            .finish()
    }
}

impl AbstractModel {
    /// Wire the boolean context, build the field graph and attach every
    /// configured reaction.
    ///
    /// Configuration errors (unknown flags, bad paths, duplicate ids,
    /// unregistered validator engines) fail here.
    pub fn new(config: FormConfig) -> Result<Self> {
        let FormConfig {
            id,
            fields,
            bools,
            default_validator_engine,
            resolvers,
        } = config;
        let state = Rc::new_cyclic(|weak: &Weak<FormState>| FormState {
            bools: BoolContext::setup(&bools, ModelRef::new(weak.clone())),
            id,
            graph: FieldGraph::new(),
            validation: ValidationEngine::new(default_validator_engine, resolvers),
            submitted: Observable::new(false),
            is_updating: Observable::new(false),
        });
        let model = Self { state };
        let mut built = Vec::with_capacity(fields.len());
        for config in fields {
            let field = Field::build(config, None, &model.state).inspect_err(|_| model.state.graph.clear())?;
            if let Err(err) = model.state.graph.insert(None, field.clone()) {
                field.destroy();
                model.state.graph.clear();
                return Err(err);
            }
            built.push(field);
        }
        for field in &built {
            field.wire().inspect_err(|_| model.state.graph.clear())?;
        }
        tracing::debug!(
            message = "formula.model.init",
            id = %model.state.id,
            fields = model.state.graph.len(),
            flags = model.state.bools.names().count()
        );
        Ok(model)
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.state.id
    }

    #[must_use]
    pub fn model_ref(&self) -> ModelRef {
        ModelRef::new(Rc::downgrade(&self.state))
    }

    #[must_use]
    pub fn bools(&self) -> &BoolContext {
        &self.state.bools
    }

    #[must_use]
    pub fn graph(&self) -> &FieldGraph {
        &self.state.graph
    }

    /// Run `f` as one batch: reactions see only its final state.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        batch(f)
    }

    pub fn get_field(&self, path: &str) -> Result<Field> {
        self.state.graph.get_field(path)
    }

    pub fn set_field_value(&self, path: &str, value: Value) -> Result<bool> {
        let field = self.get_field(path)?;
        tracing::trace!(message = "formula.model.set_value", path);
        Ok(field.set_value(value))
    }

    /// Value at a dot/bracket path, tracked.
    pub fn get_field_value(&self, path: &str) -> Result<Value> {
        self.state.graph.resolve(path)
    }

    /// Value at a dot/bracket path without registering a dependency.
    pub fn peek_field_value(&self, path: &str) -> Result<Value> {
        untrack(|| self.get_field_value(path))
    }

    /// Values at several paths, as a JSON array in the same order. Tracked.
    pub fn get_field_values<S: AsRef<str>>(&self, paths: &[S]) -> Result<Value> {
        self.model_ref().get_field_values(paths)
    }

    /// The whole model as one object. Tracked.
    #[must_use]
    pub fn value(&self) -> Value {
        self.state.graph.value()
    }

    pub fn set_field_errors(&self, path: &str, trigger: &str, errors: Vec<ErrorMessage>) -> Result<()> {
        self.get_field(path)?.set_trigger_errors(trigger, errors);
        Ok(())
    }

    /// Replace the errors of several fields in one batch. Fails before
    /// writing anything if a path is unknown.
    pub fn set_errors(&self, errors: BTreeMap<String, FieldErrors>) -> Result<()> {
        let targets = errors
            .into_iter()
            .map(|(path, errors)| Ok((self.get_field(&path)?, errors)))
            .collect::<Result<Vec<_>>>()?;
        batch(|| {
            for (field, errors) in targets {
                field.set_errors(errors);
            }
        });
        Ok(())
    }

    /// Clear the errors of every field.
    pub fn clean_errors(&self) {
        batch(|| {
            for field in self.state.graph.fields() {
                field.clean_errors();
            }
        });
    }

    pub fn clean_field_errors(&self, path: &str) -> Result<()> {
        self.get_field(path)?.clean_errors();
        Ok(())
    }

    /// Non-empty error maps keyed by field path. Tracked.
    #[must_use]
    pub fn errors(&self) -> BTreeMap<String, FieldErrors> {
        self.state.errors()
    }

    /// Whether any visible field currently holds errors. Not tracked.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        untrack(|| self.state.graph.visible_fields().iter().any(Field::has_errors))
    }

    pub fn set_field_props(&self, path: &str, props: Value) -> Result<bool> {
        Ok(self.get_field(path)?.set_props(props))
    }

    #[must_use]
    pub fn submitted(&self) -> bool {
        self.state.submitted.get()
    }

    #[must_use]
    pub fn is_updating(&self) -> bool {
        self.state.is_updating.get()
    }

    /// Call `callback` now and whenever the flags, `submitted`, the errors,
    /// the model or `is_updating` change. Dropping the returned effect
    /// unsubscribes.
    pub fn on_subscribe(&self, callback: impl Fn(&FormSnapshot) + 'static) -> Effect {
        let weak = Rc::downgrade(&self.state);
        Effect::new(move || {
            let Some(state) = weak.upgrade() else {
                return;
            };
            let snapshot = FormSnapshot {
                bools: state.bools.snapshot(),
                submitted: state.submitted.get(),
                errors: state.errors(),
                model: state.graph.value(),
                is_updating: state.is_updating.get(),
            };
            untrack(|| callback(&snapshot));
        })
    }

    /// Attach a relation to the field at `path`. The field owns the
    /// reaction (removing the field disposes it); the returned handle can
    /// dispose it earlier.
    pub fn define_relation(&self, path: &str, relation: Relation) -> Result<Effect> {
        let field = self.get_field(path)?;
        let effect = relation::define_relation(&field, relation)?;
        field.attach(effect.clone());
        Ok(effect)
    }

    pub fn define_relations(&self, path: &str, relations: impl IntoIterator<Item = Relation>) -> Result<Vec<Effect>> {
        relations
            .into_iter()
            .map(|relation| self.define_relation(path, relation))
            .collect()
    }

    /// Build `config` under `parent` (or as a root) and attach its
    /// reactions.
    pub fn add_field(&self, parent: Option<&str>, config: FieldConfig) -> Result<Field> {
        let field = Field::build(config, parent, &self.state)?;
        if let Err(err) = self.state.graph.insert(parent, field.clone()) {
            field.destroy();
            return Err(err);
        }
        if let Err(err) = field.wire() {
            self.state.graph.remove(field.path())?;
            return Err(err);
        }
        tracing::debug!(message = "formula.model.add_field", id = %self.state.id, path = %field.path());
        Ok(field)
    }

    /// Detach and destroy the subtree at `path`.
    pub fn remove_field(&self, path: &str) -> Result<Field> {
        let field = self.state.graph.remove(path)?;
        tracing::debug!(message = "formula.model.remove_field", id = %self.state.id, path);
        Ok(field)
    }

    /// Validate one field for `trigger`.
    pub fn validate(&self, path: &str, trigger: &str) -> Result<LocalBoxFuture<'static, ValidationReport>> {
        Ok(self.get_field(path)?.validate(trigger))
    }

    /// Run every trigger of every visible field concurrently. Returns
    /// whether the form ended up without errors.
    pub async fn validate_all(&self) -> bool {
        let pending: Vec<_> = self
            .state
            .graph
            .visible_fields()
            .iter()
            .flat_map(|field| {
                field
                    .validator()
                    .triggers()
                    .into_iter()
                    .map(|trigger| field.validate(trigger))
                    .collect::<Vec<_>>()
            })
            .collect();
        let runs = pending.len();
        join_all(pending).await;
        let valid = !self.has_errors();
        tracing::debug!(message = "formula.model.validate_all", id = %self.state.id, runs, valid);
        valid
    }

    /// Populate leaf fields from `initial`.
    ///
    /// A field with a `set_default_value` action takes the action's result;
    /// any other leaf takes the value at its own path in `initial` when one
    /// is present. All writes land in one batch; `is_updating` is set for
    /// the duration.
    pub async fn load(&self, initial: Value) {
        self.state.is_updating.set(true);
        let leaves: Vec<Field> = self
            .state
            .graph
            .fields()
            .into_iter()
            .filter(|field| !field.is_container())
            .collect();
        let mut writes = Vec::with_capacity(leaves.len());
        for field in leaves {
            let value = match field.actions().set_default_value.clone() {
                Some(action) => Some(action(&initial).await),
                None => path::descend(&initial, &field.key_segments(), field.path())
                    .ok()
                    .filter(|value| !value.is_null()),
            };
            if let Some(value) = value {
                writes.push((field, value));
            }
        }
        let count = writes.len();
        batch(|| {
            for (field, value) in writes {
                field.set_value(value);
            }
            self.state.is_updating.set(false);
        });
        tracing::debug!(message = "formula.model.load", id = %self.state.id, fields = count);
    }

    /// Mark the form submitted, validate everything and build the payload:
    /// visible leaves only, each passed through its `on_submit_value`
    /// action.
    pub async fn submit(&self) -> SubmitOutcome {
        self.state.submitted.set(true);
        let valid = self.validate_all().await;
        let mut value = Value::Object(Map::new());
        let leaves: Vec<Field> = self
            .state
            .graph
            .visible_fields()
            .into_iter()
            .filter(|field| !field.is_container())
            .collect();
        for field in leaves {
            let raw = field.peek_value();
            let out = match field.actions().on_submit_value.clone() {
                Some(action) => action(&raw).await,
                None => raw,
            };
            path::insert(&mut value, &field.key_segments(), out);
        }
        tracing::info!(message = "formula.model.submit", id = %self.state.id, valid);
        SubmitOutcome { valid, value }
    }

    /// Destroy every field and its reactions. The model stays usable as an
    /// empty form.
    pub fn dispose(&self) {
        self.state.graph.clear();
        tracing::debug!(message = "formula.model.dispose", id = %self.state.id);
    }
}
