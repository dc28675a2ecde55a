#![forbid(unsafe_code)]

//! Field nodes.
//!
//! A [`Field`] is one unit of form state: a JSON value cell, derived
//! `hidden`/`disabled` flags, per-trigger errors, lifecycle flags and an
//! optional list of child fields. Handles are cheap clones of the same
//! node. Reactions owned by a field hold it through a [`WeakField`], so a
//! field is freed as soon as the graph lets go of it.
//!
//! # Visibility transitions
//!
//! Whenever `hidden` flips, the value the field had just before the flip is
//! stashed for the opposite state and the field takes the value stashed for
//! the state it enters, if the matching recover flag is set:
//!
//! | transition     | flag                      | new value                    |
//! |----------------|---------------------------|------------------------------|
//! | shown → hidden | `recover_value_on_hidden` | value stashed when last shown |
//! | hidden → shown | `recover_value_on_shown`  | value stashed when last hidden |
//!
//! Without the flag the value is cleared (`null`).
//!
//! # Lifecycle
//!
//! `on_init` fires at construction, parent before children and before any
//! reaction is attached. `on_mounted` fires on the first
//! [`mount`](Field::mount). Leaving the UI ([`unmount`](Field::unmount)) ends
//! the field: `on_destroy` then `on_unmounted` fire and the field is marked
//! destroyed. Removal from the graph (or disposing the form) fires
//! `on_destroy`, plus `on_unmounted` for a mounted field, and disposes the
//! field's reactions. Each hook fires at most once, always in the order
//! init, mounted, destroy, unmounted.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use formula_runtime::{Computed, Effect, Observable, batch, untrack};
use futures::FutureExt;
use futures::future::{LocalBoxFuture, ready};
use serde_json::{Map, Value};

use crate::bools::BoolContext;
use crate::config::{
    EventHandler, FieldActions, FieldConfig, Hook, LifecycleHooks, ON_BLUR, ON_CHANGE, ON_FOCUS,
    SignalFn,
};
use crate::decision::Decision;
use crate::error::{FormulaError, Result};
use crate::model::{FormState, ModelRef};
use crate::path::{self, Segment};
use crate::relation::{self, Relation};
use crate::validation::{
    DiscardReason, ErrorMessage, FieldErrors, ValidationReport, ValidationTokens, ValidatorConfig,
    run_jobs,
};

bitflags::bitflags! {
    /// Lifecycle hooks that have already run.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct LifecycleFired: u8 {
        const INIT      = 0b0001;
        const MOUNTED   = 0b0010;
        const DESTROY   = 0b0100;
        const UNMOUNTED = 0b1000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Init,
    Mounted,
    Destroy,
    Unmounted,
}

impl Stage {
    fn flag(self) -> LifecycleFired {
        match self {
            Self::Init => LifecycleFired::INIT,
            Self::Mounted => LifecycleFired::MOUNTED,
            Self::Destroy => LifecycleFired::DESTROY,
            Self::Unmounted => LifecycleFired::UNMOUNTED,
        }
    }
}

/// Reactions declared in configuration, attached once the field is in the
/// graph.
struct Wiring {
    signals: BTreeMap<String, SignalFn>,
    conditions: Vec<(Decision, Hook)>,
    relations: Vec<Relation>,
}

struct FieldInner {
    id: String,
    path: String,
    parent: Option<String>,
    component: Option<String>,
    value: Observable<Value>,
    props: Observable<Value>,
    hidden: Computed<bool>,
    disabled: Computed<bool>,
    errors: Observable<FieldErrors>,
    is_mounted: Observable<bool>,
    is_focused: Observable<bool>,
    is_blurred: Observable<bool>,
    is_destroyed: Observable<bool>,
    children: RefCell<Vec<Field>>,
    recover_value_on_hidden: bool,
    recover_value_on_shown: bool,
    /// Value held when the field last became shown → hidden, for restoring
    /// on the way back, and vice versa.
    shown_stash: RefCell<Option<Value>>,
    hidden_stash: RefCell<Option<Value>>,
    hooks: LifecycleHooks,
    fired: Cell<LifecycleFired>,
    events: BTreeMap<String, EventHandler>,
    validator: ValidatorConfig,
    actions: FieldActions,
    tokens: ValidationTokens,
    wiring: RefCell<Option<Wiring>>,
    reactions: RefCell<Vec<Effect>>,
    model: ModelRef,
}

/// Handle to a field node.
#[derive(Clone)]
pub struct Field {
    inner: Rc<FieldInner>,
}

/// Non-owning handle to a field node.
#[derive(Clone)]
pub struct WeakField {
    inner: Weak<FieldInner>,
}

impl WeakField {
    #[must_use]
    pub fn upgrade(&self) -> Option<Field> {
        self.inner.upgrade().map(|inner| Field { inner })
    }
}

impl fmt::Debug for WeakField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(field) => f.debug_tuple("WeakField").field(&field.path()).finish(),
            None => f.write_str("WeakField(<dropped>)"),
        }
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("path", &self.inner.path)
            .field("component", &self.inner.component)
            .field("value", &self.inner.value.peek())
            .field("children", &self.inner.children.borrow().len())
            .field("destroyed", &self.destroyed())
            .finish()
    }
}

fn check_id(id: &str) -> Result<()> {
    if id.is_empty() || id.contains(['.', '[', ']']) {
        return Err(FormulaError::InvalidFieldId { id: id.to_string() });
    }
    Ok(())
}

fn decision_cell(bools: &BoolContext, decision: Option<Decision>, path: &str) -> Computed<bool> {
    let Some(decision) = decision else {
        return Computed::constant(false);
    };
    let bools = bools.clone();
    let path = path.to_string();
    Computed::new(move || {
        bools.evaluate(&decision).unwrap_or_else(|err| {
            tracing::warn!(message = "formula.field.decision_failed", path = %path, error = %err);
            false
        })
    })
}

impl Field {
    /// Build the subtree described by `config` under `parent`.
    ///
    /// Decisions are checked against the form's boolean context and
    /// validators against its engine table before anything is created.
    pub(crate) fn build(config: FieldConfig, parent: Option<&str>, state: &Rc<FormState>) -> Result<Self> {
        let FieldConfig {
            id,
            component,
            hidden,
            disabled,
            props,
            default_value,
            recover_value_on_hidden,
            recover_value_on_shown,
            properties,
            hooks,
            events,
            validator,
            actions,
            relations,
            signals,
            conditions,
        } = config;

        check_id(&id)?;
        let path = path::join(parent, &id);
        let decisions = hidden
            .iter()
            .chain(disabled.iter())
            .chain(conditions.iter().map(|(decision, _)| decision));
        for decision in decisions {
            state.bools.ensure_resolvable(decision)?;
        }
        state.validation.check(&validator)?;

        let field = Field {
            inner: Rc::new(FieldInner {
                hidden: decision_cell(&state.bools, hidden, &path),
                disabled: decision_cell(&state.bools, disabled, &path),
                id,
                parent: parent.map(str::to_string),
                component,
                value: Observable::new(default_value),
                props: Observable::new(props),
                errors: Observable::new(FieldErrors::new()),
                is_mounted: Observable::new(false),
                is_focused: Observable::new(false),
                is_blurred: Observable::new(false),
                is_destroyed: Observable::new(false),
                children: RefCell::new(Vec::with_capacity(properties.len())),
                recover_value_on_hidden,
                recover_value_on_shown,
                shown_stash: RefCell::new(None),
                hidden_stash: RefCell::new(None),
                hooks,
                fired: Cell::new(LifecycleFired::empty()),
                events,
                validator,
                actions,
                tokens: ValidationTokens::default(),
                wiring: RefCell::new(Some(Wiring {
                    signals,
                    conditions,
                    relations,
                })),
                reactions: RefCell::new(Vec::new()),
                model: ModelRef::new(Rc::downgrade(state)),
                path,
            }),
        };
        field.fire(Stage::Init);

        let parent_path = field.path().to_string();
        for child in properties {
            let attached = Field::build(child, Some(&parent_path), state).and_then(|child| {
                field.push_child(child.clone()).inspect_err(|_| child.destroy())
            });
            if let Err(err) = attached {
                field.destroy();
                return Err(err);
            }
        }
        Ok(field)
    }

    /// Attach this subtree's reactions. Runs once; later calls are no-ops.
    pub(crate) fn wire(&self) -> Result<()> {
        let Some(wiring) = self.inner.wiring.borrow_mut().take() else {
            return Ok(());
        };
        self.attach(self.visibility_reaction());
        for (name, signal) in wiring.signals {
            self.attach(self.signal_reaction(name, signal));
        }
        for (decision, action) in wiring.conditions {
            self.attach(self.condition_reaction(decision, action));
        }
        for effect in relation::define_relations(self, wiring.relations)? {
            self.attach(effect);
        }
        for child in self.children() {
            child.wire()?;
        }
        Ok(())
    }

    fn visibility_reaction(&self) -> Effect {
        let weak = self.downgrade();
        let previous: Cell<Option<bool>> = Cell::new(None);
        Effect::new(move || {
            let Some(field) = weak.upgrade() else {
                return;
            };
            let hidden = field.inner.hidden.get();
            if previous.replace(Some(hidden)).is_some_and(|was| was != hidden) {
                untrack(|| field.transition(hidden));
            }
        })
    }

    fn transition(&self, hidden: bool) {
        let inner = &self.inner;
        let current = self.peek_value();
        let (leaving, entering, recover) = if hidden {
            (&inner.shown_stash, &inner.hidden_stash, inner.recover_value_on_hidden)
        } else {
            (&inner.hidden_stash, &inner.shown_stash, inner.recover_value_on_shown)
        };
        *leaving.borrow_mut() = Some(current);
        let restored = if recover { entering.borrow_mut().take() } else { None };
        tracing::debug!(
            message = "formula.field.transition",
            path = %inner.path,
            hidden,
            recovered = restored.is_some()
        );
        match restored {
            Some(value) => {
                self.set_value(value);
            }
            None => self.clear_value(),
        }
    }

    /// Null every leaf of this subtree in one batch.
    fn clear_value(&self) {
        let children = self.children();
        if children.is_empty() {
            self.inner.value.set(Value::Null);
            return;
        }
        batch(|| {
            for child in &children {
                child.clear_value();
            }
        });
    }

    fn signal_reaction(&self, name: String, signal: SignalFn) -> Effect {
        let weak = self.downgrade();
        Effect::new(move || {
            let Some(field) = weak.upgrade() else {
                return;
            };
            let Some(bools) = field.inner.model.bools() else {
                return;
            };
            let value = field.value();
            tracing::trace!(message = "formula.field.signal", path = %field.path(), signal = %name);
            signal(&field, &value, &bools);
        })
    }

    fn condition_reaction(&self, decision: Decision, action: Hook) -> Effect {
        let weak = self.downgrade();
        Effect::new(move || {
            let Some(field) = weak.upgrade() else {
                return;
            };
            let Some(bools) = field.inner.model.bools() else {
                return;
            };
            if bools.evaluate(&decision).unwrap_or(false) {
                untrack(|| action(&field));
            }
        })
    }

    /// Keep `effect` alive for as long as this field is; dispose it with the
    /// field.
    pub fn attach(&self, effect: Effect) {
        if self.destroyed() {
            effect.dispose();
            return;
        }
        self.inner.reactions.borrow_mut().push(effect);
    }

    /// Number of live reactions owned by this field.
    #[must_use]
    pub fn reaction_count(&self) -> usize {
        self.inner
            .reactions
            .borrow()
            .iter()
            .filter(|effect| effect.is_active())
            .count()
    }

    fn fire(&self, stage: Stage) {
        let fired = self.inner.fired.get();
        if fired.contains(stage.flag()) {
            return;
        }
        self.inner.fired.set(fired | stage.flag());
        let hooks = &self.inner.hooks;
        let (name, hook) = match stage {
            Stage::Init => ("on_init", &hooks.on_init),
            Stage::Mounted => ("on_mounted", &hooks.on_mounted),
            Stage::Destroy => ("on_destroy", &hooks.on_destroy),
            Stage::Unmounted => ("on_unmounted", &hooks.on_unmounted),
        };
        tracing::debug!(message = "formula.field.lifecycle", path = %self.inner.path, hook = name);
        if let Some(hook) = hook {
            untrack(|| hook(self));
        }
    }

    /// UI mount boundary.
    pub fn mount(&self) {
        if self.destroyed() {
            return;
        }
        self.inner.is_mounted.set(true);
        self.fire(Stage::Mounted);
    }

    /// UI unmount boundary. Ends the field's lifecycle: `on_destroy`, then
    /// `on_unmounted`, then the field reads as destroyed. Reactions stay
    /// attached until the field leaves the graph.
    pub fn unmount(&self) {
        if !self.inner.is_mounted.peek() {
            return;
        }
        self.fire(Stage::Destroy);
        self.fire(Stage::Unmounted);
        batch(|| {
            self.inner.is_mounted.set(false);
            self.inner.is_destroyed.set(true);
        });
    }

    /// Tear down this subtree: children first, then own reactions. Safe to
    /// call again, including after [`unmount`](Self::unmount).
    pub(crate) fn destroy(&self) {
        for child in self.children() {
            child.destroy();
        }
        let reactions = self.inner.reactions.take();
        for effect in &reactions {
            effect.dispose();
        }
        self.inner.wiring.borrow_mut().take();
        self.fire(Stage::Destroy);
        let mounted = self.inner.is_mounted.peek();
        if mounted {
            self.fire(Stage::Unmounted);
        }
        batch(|| {
            self.inner.is_destroyed.set(true);
            self.inner.is_mounted.set(false);
        });
    }

    // ── identity ────────────────────────────────────────────────────────

    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Dot path from the root of the graph (`userinfo.phone`).
    #[must_use]
    pub fn path(&self) -> &str {
        &self.inner.path
    }

    #[must_use]
    pub fn parent_path(&self) -> Option<&str> {
        self.inner.parent.as_deref()
    }

    pub(crate) fn key_segments(&self) -> Vec<Segment> {
        self.inner
            .path
            .split('.')
            .map(|key| Segment::Key(key.to_string()))
            .collect()
    }

    #[must_use]
    pub fn component(&self) -> Option<&str> {
        self.inner.component.as_deref()
    }

    /// The form this field belongs to.
    #[must_use]
    pub fn model(&self) -> &ModelRef {
        &self.inner.model
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakField {
        WeakField {
            inner: Rc::downgrade(&self.inner),
        }
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Field) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // ── tree ────────────────────────────────────────────────────────────

    #[must_use]
    pub fn children(&self) -> Vec<Field> {
        self.inner.children.borrow().clone()
    }

    #[must_use]
    pub fn child(&self, id: &str) -> Option<Field> {
        self.inner
            .children
            .borrow()
            .iter()
            .find(|child| child.id() == id)
            .cloned()
    }

    #[must_use]
    pub fn is_container(&self) -> bool {
        !self.inner.children.borrow().is_empty()
    }

    pub(crate) fn push_child(&self, child: Field) -> Result<()> {
        if self.child(child.id()).is_some() {
            return Err(FormulaError::DuplicateField {
                path: child.path().to_string(),
            });
        }
        self.inner.children.borrow_mut().push(child);
        Ok(())
    }

    pub(crate) fn remove_child(&self, id: &str) -> Option<Field> {
        let mut children = self.inner.children.borrow_mut();
        let position = children.iter().position(|child| child.id() == id)?;
        Some(children.remove(position))
    }

    /// This field followed by every descendant, depth first.
    #[must_use]
    pub fn subtree(&self) -> Vec<Field> {
        let mut out = vec![self.clone()];
        for child in self.inner.children.borrow().iter() {
            out.extend(child.subtree());
        }
        out
    }

    // ── value ───────────────────────────────────────────────────────────

    /// Current value, tracked. A container's value is the object of its
    /// children's values.
    #[must_use]
    pub fn value(&self) -> Value {
        let children = self.inner.children.borrow();
        if children.is_empty() {
            return self.inner.value.get();
        }
        let object: Map<String, Value> = children
            .iter()
            .map(|child| (child.id().to_string(), child.value()))
            .collect();
        Value::Object(object)
    }

    /// Current value without registering a dependency.
    #[must_use]
    pub fn peek_value(&self) -> Value {
        untrack(|| self.value())
    }

    /// Write the value. Containers distribute an object over their
    /// children by id, in one batch. Returns whether anything changed.
    pub fn set_value(&self, value: Value) -> bool {
        let children = self.children();
        if children.is_empty() {
            return self.inner.value.set(value);
        }
        let Value::Object(mut object) = value else {
            tracing::debug!(message = "formula.field.set_ignored", path = %self.inner.path);
            return false;
        };
        batch(|| {
            children.iter().fold(false, |changed, child| match object.remove(child.id()) {
                Some(value) => child.set_value(value) || changed,
                None => changed,
            })
        })
    }

    #[must_use]
    pub fn props(&self) -> Value {
        self.inner.props.get()
    }

    /// Merge `props` into the current props (objects merge key by key,
    /// anything else replaces).
    pub fn set_props(&self, props: Value) -> bool {
        self.inner.props.update(|current| match (current, props) {
            (Value::Object(current), Value::Object(next)) => current.extend(next),
            (current, next) => *current = next,
        })
    }

    // ── derived flags ───────────────────────────────────────────────────

    #[must_use]
    pub fn hidden(&self) -> bool {
        self.inner.hidden.get()
    }

    #[must_use]
    pub fn peek_hidden(&self) -> bool {
        self.inner.hidden.peek()
    }

    #[must_use]
    pub fn disabled(&self) -> bool {
        self.inner.disabled.get()
    }

    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.inner.is_mounted.get()
    }

    #[must_use]
    pub fn is_focused(&self) -> bool {
        self.inner.is_focused.get()
    }

    #[must_use]
    pub fn is_blurred(&self) -> bool {
        self.inner.is_blurred.get()
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.inner.is_destroyed.get()
    }

    fn destroyed(&self) -> bool {
        self.inner.is_destroyed.peek()
    }

    // ── errors ──────────────────────────────────────────────────────────

    #[must_use]
    pub fn errors(&self) -> FieldErrors {
        self.inner.errors.get()
    }

    #[must_use]
    pub fn peek_errors(&self) -> FieldErrors {
        self.inner.errors.peek()
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.inner.errors.with(|errors| errors.values().any(|list| !list.is_empty()))
    }

    /// Replace the errors of one trigger. An empty list removes the entry.
    pub fn set_trigger_errors(&self, trigger: &str, errors: Vec<ErrorMessage>) {
        self.inner.errors.update(|map| {
            if errors.is_empty() {
                map.remove(trigger);
            } else {
                map.insert(trigger.to_string(), errors);
            }
        });
    }

    pub fn set_errors(&self, errors: FieldErrors) {
        self.inner
            .errors
            .set(errors.into_iter().filter(|(_, list)| !list.is_empty()).collect());
    }

    pub fn clean_errors(&self) {
        self.inner.errors.set(FieldErrors::new());
    }

    // ── configuration views ─────────────────────────────────────────────

    #[must_use]
    pub fn validator(&self) -> &ValidatorConfig {
        &self.inner.validator
    }

    #[must_use]
    pub fn actions(&self) -> &FieldActions {
        &self.inner.actions
    }

    #[must_use]
    pub fn has_event(&self, name: &str) -> bool {
        self.inner.events.contains_key(name)
    }

    // ── UI entry points ─────────────────────────────────────────────────

    /// A new value from the UI: the `onChange` handler if configured,
    /// otherwise a plain write, then `onChange` validation.
    pub fn on_change(&self, value: Value) -> LocalBoxFuture<'static, ValidationReport> {
        match self.inner.events.get(ON_CHANGE) {
            Some(handler) => untrack(|| handler(self, &value)),
            None => {
                self.set_value(value);
            }
        }
        self.validate(ON_CHANGE)
    }

    /// Focus left the field: flags flip in one batch, then the `onBlur`
    /// handler and `onBlur` validation.
    pub fn on_blur(&self, value: Value) -> LocalBoxFuture<'static, ValidationReport> {
        batch(|| {
            self.inner.is_focused.set(false);
            self.inner.is_blurred.set(true);
        });
        if let Some(handler) = self.inner.events.get(ON_BLUR) {
            untrack(|| handler(self, &value));
        }
        self.validate(ON_BLUR)
    }

    pub fn on_focus(&self) {
        batch(|| {
            self.inner.is_focused.set(true);
            self.inner.is_blurred.set(false);
        });
        if let Some(handler) = self.inner.events.get(ON_FOCUS) {
            let value = self.peek_value();
            untrack(|| handler(self, &value));
        }
    }

    /// Dispatch an arbitrary named event, then validation keyed by `event`.
    pub fn emit(&self, event: &str, value: Value) -> LocalBoxFuture<'static, ValidationReport> {
        match self.inner.events.get(event) {
            Some(handler) => untrack(|| handler(self, &value)),
            None => {
                tracing::debug!(message = "formula.field.unhandled_event", path = %self.inner.path, event);
            }
        }
        self.validate(event)
    }

    // ── validation ──────────────────────────────────────────────────────

    /// Run the validators configured for `trigger`.
    ///
    /// The sequence token is taken before this returns; the result is
    /// applied only if no newer call for the same trigger started in the
    /// meantime and the field still exists when the resolvers finish.
    pub fn validate(&self, trigger: &str) -> LocalBoxFuture<'static, ValidationReport> {
        if self.destroyed() {
            return ready(ValidationReport::Discarded(DiscardReason::Destroyed)).boxed_local();
        }
        let Some(state) = self.inner.model.state() else {
            return ready(ValidationReport::Discarded(DiscardReason::Destroyed)).boxed_local();
        };
        let jobs = match state.validation.jobs(&self.inner.validator, trigger) {
            Ok(jobs) => jobs,
            Err(err) => {
                tracing::warn!(message = "formula.validation.misconfigured", path = %self.inner.path, trigger, error = %err);
                return ready(ValidationReport::Skipped).boxed_local();
            }
        };
        if jobs.is_empty() {
            return ready(ValidationReport::Skipped).boxed_local();
        }

        let token = self.inner.tokens.begin(trigger);
        tracing::trace!(message = "formula.validation.start", path = %self.inner.path, trigger, token);
        let value = self.peek_value();
        let weak = self.downgrade();
        let path = self.inner.path.clone();
        let trigger = trigger.to_string();
        async move {
            let errors = run_jobs(&path, &trigger, jobs, value).await;
            let reason = match weak.upgrade() {
                Some(field) if field.destroyed() || !field.inner.model.is_alive() => DiscardReason::Destroyed,
                Some(field) if field.inner.tokens.is_current(&trigger, token) => {
                    field.set_trigger_errors(&trigger, errors.clone());
                    tracing::debug!(
                        message = "formula.validation.applied",
                        path = %path,
                        trigger = %trigger,
                        token,
                        errors = errors.len()
                    );
                    return ValidationReport::Applied(errors);
                }
                Some(_) => DiscardReason::Superseded,
                None => DiscardReason::Destroyed,
            };
            tracing::debug!(
                message = "formula.validation.discarded",
                path = %path,
                trigger = %trigger,
                token,
                reason = %reason
            );
            ValidationReport::Discarded(reason)
        }
        .boxed_local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FormConfig;
    use crate::decision::D;
    use crate::model::AbstractModel;
    use serde_json::json;

    fn toggled_form(field: FieldConfig) -> (AbstractModel, Observable<bool>) {
        let hide = Observable::new(false);
        let hide_in = hide.clone();
        let model = AbstractModel::new(
            FormConfig::new("t")
                .with_bool("hide", move |_| hide_in.get())
                .with_field(field.with_hidden(D::flag("hide"))),
        )
        .unwrap();
        (model, hide)
    }

    #[test]
    fn recover_on_shown_restores_value() {
        let (model, hide) = toggled_form(FieldConfig::new("x").with_recover_value_on_shown(true));
        let field = model.get_field("x").unwrap();
        field.set_value(json!("X"));
        hide.set(true);
        assert!(field.hidden());
        assert_eq!(field.peek_value(), Value::Null);
        hide.set(false);
        assert_eq!(field.peek_value(), json!("X"));
    }

    #[test]
    fn without_recover_value_is_cleared() {
        let (model, hide) = toggled_form(FieldConfig::new("x"));
        let field = model.get_field("x").unwrap();
        field.set_value(json!("X"));
        hide.set(true);
        hide.set(false);
        assert_eq!(field.peek_value(), Value::Null);
    }

    #[test]
    fn recover_on_hidden_restores_hidden_value() {
        let (model, hide) = toggled_form(FieldConfig::new("x").with_recover_value_on_hidden(true));
        let field = model.get_field("x").unwrap();
        hide.set(true);
        field.set_value(json!("while hidden"));
        hide.set(false);
        assert_eq!(field.peek_value(), Value::Null);
        hide.set(true);
        assert_eq!(field.peek_value(), json!("while hidden"));
    }

    #[test]
    fn lifecycle_hooks_fire_once_in_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let push = |tag: &'static str| {
            let log = Rc::clone(&log);
            move |_: &Field| log.borrow_mut().push(tag)
        };
        let model = AbstractModel::new(
            FormConfig::new("t").with_field(
                FieldConfig::new("x")
                    .with_on_init(push("init"))
                    .with_on_mounted(push("mounted"))
                    .with_on_destroy(push("destroy"))
                    .with_on_unmounted(push("unmounted")),
            ),
        )
        .unwrap();
        let field = model.get_field("x").unwrap();
        field.mount();
        field.mount();
        model.remove_field("x").unwrap();
        field.unmount();
        field.mount();
        assert_eq!(*log.borrow(), vec!["init", "mounted", "destroy", "unmounted"]);
        assert!(field.is_destroyed());
        assert!(!field.is_mounted());
    }

    #[test]
    fn unmount_fires_destroy_then_unmounted() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let push = |tag: &'static str| {
            let log = Rc::clone(&log);
            move |_: &Field| log.borrow_mut().push(tag)
        };
        let model = AbstractModel::new(
            FormConfig::new("t").with_field(
                FieldConfig::new("x")
                    .with_hidden(D::flag("hide"))
                    .with_on_init(push("init"))
                    .with_on_mounted(push("mounted"))
                    .with_on_destroy(push("destroy"))
                    .with_on_unmounted(push("unmounted")),
            )
            .with_bool("hide", |_| false),
        )
        .unwrap();
        let field = model.get_field("x").unwrap();
        let attached = field.reaction_count();
        assert!(attached > 0);
        field.mount();
        field.unmount();
        assert_eq!(*log.borrow(), vec!["init", "mounted", "destroy", "unmounted"]);
        assert!(field.is_destroyed());
        assert!(!field.is_mounted());
        assert_eq!(field.reaction_count(), attached);

        model.remove_field("x").unwrap();
        assert_eq!(*log.borrow(), vec!["init", "mounted", "destroy", "unmounted"]);
        assert_eq!(field.reaction_count(), 0);
    }

    #[test]
    fn removing_an_unmounted_field_skips_unmounted_hook() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let push = |tag: &'static str| {
            let log = Rc::clone(&log);
            move |_: &Field| log.borrow_mut().push(tag)
        };
        let model = AbstractModel::new(
            FormConfig::new("t").with_field(
                FieldConfig::new("x")
                    .with_on_destroy(push("destroy"))
                    .with_on_unmounted(push("unmounted")),
            ),
        )
        .unwrap();
        let field = model.get_field("x").unwrap();
        model.remove_field("x").unwrap();
        assert_eq!(*log.borrow(), vec!["destroy"]);
        assert!(field.is_destroyed());
    }

    #[test]
    fn lifecycle_bits_accumulate() {
        let mut fired = LifecycleFired::empty();
        for stage in [Stage::Init, Stage::Mounted, Stage::Destroy] {
            assert!(!fired.contains(stage.flag()));
            fired |= stage.flag();
        }
        assert!(fired.contains(LifecycleFired::INIT | LifecycleFired::DESTROY));
        assert!(!fired.contains(Stage::Unmounted.flag()));
    }

    #[test]
    fn parent_init_runs_before_children() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let push = |tag: &'static str| {
            let log = Rc::clone(&log);
            move |field: &Field| {
                assert_eq!(field.path(), tag);
                log.borrow_mut().push(tag)
            }
        };
        let _model = AbstractModel::new(
            FormConfig::new("t").with_field(
                FieldConfig::new("address")
                    .with_on_init(push("address"))
                    .with_property(FieldConfig::new("city").with_on_init(push("address.city")))
                    .with_property(FieldConfig::new("zip").with_on_init(push("address.zip"))),
            ),
        )
        .unwrap();
        assert_eq!(*log.borrow(), vec!["address", "address.city", "address.zip"]);
    }

    #[test]
    fn duplicate_child_tears_down_the_partial_subtree() {
        let destroyed = Rc::new(RefCell::new(Vec::new()));
        let on_destroy = |tag: &'static str| {
            let destroyed = Rc::clone(&destroyed);
            move |_: &Field| destroyed.borrow_mut().push(tag)
        };
        let err = AbstractModel::new(
            FormConfig::new("t").with_field(
                FieldConfig::new("address")
                    .with_on_destroy(on_destroy("address"))
                    .with_property(FieldConfig::new("city").with_on_destroy(on_destroy("first")))
                    .with_property(FieldConfig::new("city").with_on_destroy(on_destroy("second"))),
            ),
        )
        .unwrap_err();
        assert!(matches!(err, FormulaError::DuplicateField { ref path } if path == "address.city"));
        assert_eq!(*destroyed.borrow(), vec!["second", "first", "address"]);
    }

    #[test]
    fn hidden_container_clears_and_recovers_children() {
        let (model, hide) = toggled_form(
            FieldConfig::new("address")
                .with_recover_value_on_shown(true)
                .with_property(FieldConfig::new("city"))
                .with_property(FieldConfig::new("zip")),
        );
        let address = model.get_field("address").unwrap();
        model.set_field_value("address.city", json!("Oslo")).unwrap();
        model.set_field_value("address.zip", json!("0150")).unwrap();
        assert_eq!(address.peek_value(), json!({ "city": "Oslo", "zip": "0150" }));

        hide.set(true);
        assert!(address.hidden());
        assert_eq!(address.peek_value(), json!({ "city": null, "zip": null }));
        assert_eq!(model.get_field_value("address.city").unwrap(), Value::Null);

        hide.set(false);
        assert_eq!(address.peek_value(), json!({ "city": "Oslo", "zip": "0150" }));
        assert_eq!(model.get_field_value("address.zip").unwrap(), json!("0150"));
    }

    #[test]
    fn focus_and_blur_flags_stay_consistent() {
        let model = AbstractModel::new(FormConfig::new("t").with_field(FieldConfig::new("x"))).unwrap();
        let field = model.get_field("x").unwrap();
        field.on_focus();
        assert!(field.is_focused() && !field.is_blurred());
        let report = futures::executor::block_on(field.on_blur(json!("v")));
        assert_eq!(report, ValidationReport::Skipped);
        assert!(!field.is_focused() && field.is_blurred());
    }

    #[test]
    fn on_change_prefers_custom_handler() {
        let model = AbstractModel::new(
            FormConfig::new("t").with_field(
                FieldConfig::new("x").with_event("onChange", |field, value| {
                    let upper = value.as_str().unwrap_or_default().to_uppercase();
                    field.set_value(Value::String(upper));
                }),
            ),
        )
        .unwrap();
        let field = model.get_field("x").unwrap();
        drop(field.on_change(json!("abc")));
        assert_eq!(field.peek_value(), json!("ABC"));
    }

    #[test]
    fn container_value_aggregates_children() {
        let model = AbstractModel::new(FormConfig::new("t").with_field(
            FieldConfig::new("user")
                .with_property(FieldConfig::new("name").with_default_value(json!("ada")))
                .with_property(FieldConfig::new("age")),
        ))
        .unwrap();
        let user = model.get_field("user").unwrap();
        assert!(user.is_container());
        assert_eq!(user.peek_value(), json!({ "name": "ada", "age": null }));
        assert!(user.set_value(json!({ "age": 36, "ignored": true })));
        assert_eq!(user.peek_value(), json!({ "name": "ada", "age": 36 }));
        assert!(!user.set_value(json!("not an object")));
    }

    #[test]
    fn props_merge() {
        let model = AbstractModel::new(
            FormConfig::new("t").with_field(FieldConfig::new("x").with_props(json!({ "a": 1 }))),
        )
        .unwrap();
        let field = model.get_field("x").unwrap();
        assert!(field.set_props(json!({ "b": 2 })));
        assert_eq!(field.props(), json!({ "a": 1, "b": 2 }));
    }

    #[test]
    fn condition_runs_when_decision_holds() {
        let flag = Observable::new(false);
        let flag_in = flag.clone();
        let model = AbstractModel::new(
            FormConfig::new("t")
                .with_bool("ready", move |_| flag_in.get())
                .with_field(FieldConfig::new("x").with_condition(D::flag("ready"), |field| {
                    field.set_value(json!("ready"));
                })),
        )
        .unwrap();
        let field = model.get_field("x").unwrap();
        assert_eq!(field.peek_value(), Value::Null);
        flag.set(true);
        assert_eq!(field.peek_value(), json!("ready"));
    }

    #[test]
    fn signal_sees_value_and_bools() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_in = Rc::clone(&seen);
        let model = AbstractModel::new(
            FormConfig::new("t")
                .with_bool("on", |_| true)
                .with_field(FieldConfig::new("x").with_signal("log", move |_, value, bools| {
                    seen_in.borrow_mut().push((value.clone(), bools.get("on")));
                })),
        )
        .unwrap();
        model.set_field_value("x", json!(1)).unwrap();
        assert_eq!(
            *seen.borrow(),
            vec![(Value::Null, Some(true)), (json!(1), Some(true))]
        );
    }

    #[test]
    fn invalid_ids_are_rejected() {
        for id in ["", "a.b", "a[0]"] {
            let err = AbstractModel::new(FormConfig::new("t").with_field(FieldConfig::new(id))).unwrap_err();
            assert!(matches!(err, FormulaError::InvalidFieldId { .. }));
        }
    }

    #[test]
    fn unresolved_hidden_flag_fails_construction() {
        let err = AbstractModel::new(
            FormConfig::new("t").with_field(FieldConfig::new("x").with_hidden(D::flag("ghost"))),
        )
        .unwrap_err();
        assert!(matches!(err, FormulaError::UnresolvedFlag { ref name } if name == "ghost"));
    }
}
