#![forbid(unsafe_code)]

//! Form and field configuration records.
//!
//! A [`FieldConfig`] carries everything a field needs before it is built:
//! identity, visibility decisions, props, lifecycle hooks, named events,
//! validators, async actions, relations, signals and conditions. A
//! [`FormConfig`] groups the root fields with the boolean predicates and the
//! validator-engine table of one form.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use serde_json::Value;

use crate::bools::{BoolContext, BoolsConfig};
use crate::decision::Decision;
use crate::field::Field;
use crate::model::ModelRef;
use crate::relation::Relation;
use crate::validation::{Resolver, ValidateItem, ValidatorConfig};

pub type Hook = Rc<dyn Fn(&Field)>;
pub type EventHandler = Rc<dyn Fn(&Field, &Value)>;
pub type SignalFn = Rc<dyn Fn(&Field, &Value, &BoolContext)>;
pub type ValueAction = Rc<dyn Fn(&Value) -> LocalBoxFuture<'static, Value>>;

/// Name of the event that replaces the default value write in `on_change`.
pub const ON_CHANGE: &str = "onChange";
pub const ON_BLUR: &str = "onBlur";
pub const ON_FOCUS: &str = "onFocus";

/// Lifecycle hooks. Each fires at most once per field.
#[derive(Clone, Default)]
pub struct LifecycleHooks {
    pub on_init: Option<Hook>,
    pub on_mounted: Option<Hook>,
    pub on_destroy: Option<Hook>,
    pub on_unmounted: Option<Hook>,
}

/// Async value transforms used when loading and submitting.
#[derive(Clone, Default)]
pub struct FieldActions {
    /// Produce the field's value from the data passed to `load`.
    pub set_default_value: Option<ValueAction>,
    /// Transform the field's value for the submitted payload.
    pub on_submit_value: Option<ValueAction>,
}

/// Configuration of one field (and, through `properties`, its subtree).
#[derive(Clone)]
pub struct FieldConfig {
    pub(crate) id: String,
    pub(crate) component: Option<String>,
    pub(crate) hidden: Option<Decision>,
    pub(crate) disabled: Option<Decision>,
    pub(crate) props: Value,
    pub(crate) default_value: Value,
    pub(crate) recover_value_on_hidden: bool,
    pub(crate) recover_value_on_shown: bool,
    pub(crate) properties: Vec<FieldConfig>,
    pub(crate) hooks: LifecycleHooks,
    pub(crate) events: BTreeMap<String, EventHandler>,
    pub(crate) validator: ValidatorConfig,
    pub(crate) actions: FieldActions,
    pub(crate) relations: Vec<Relation>,
    pub(crate) signals: BTreeMap<String, SignalFn>,
    pub(crate) conditions: Vec<(Decision, Hook)>,
}

impl fmt::Debug for FieldConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldConfig")
            .field("id", &self.id)
            .field("component", &self.component)
            .field("hidden", &self.hidden.as_ref().map(ToString::to_string))
            .field("disabled", &self.disabled.as_ref().map(ToString::to_string))
            .field("properties", &self.properties)
            .field("events", &self.events.keys().collect::<Vec<_>>())
            .field("relations", &self.relations.len())
            .finish_non_exhaustive()
    }
}

impl FieldConfig {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            component: None,
            hidden: None,
            disabled: None,
            props: Value::Object(serde_json::Map::new()),
            default_value: Value::Null,
            recover_value_on_hidden: false,
            recover_value_on_shown: false,
            properties: Vec::new(),
            hooks: LifecycleHooks::default(),
            events: BTreeMap::new(),
            validator: ValidatorConfig::default(),
            actions: FieldActions::default(),
            relations: Vec::new(),
            signals: BTreeMap::new(),
            conditions: Vec::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Opaque token the UI adapter maps to a component.
    #[must_use]
    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    #[must_use]
    pub fn with_hidden(mut self, decision: Decision) -> Self {
        self.hidden = Some(decision);
        self
    }

    #[must_use]
    pub fn with_disabled(mut self, decision: Decision) -> Self {
        self.disabled = Some(decision);
        self
    }

    #[must_use]
    pub fn with_props(mut self, props: Value) -> Self {
        self.props = props;
        self
    }

    #[must_use]
    pub fn with_default_value(mut self, value: Value) -> Self {
        self.default_value = value;
        self
    }

    #[must_use]
    pub fn with_recover_value_on_hidden(mut self, enabled: bool) -> Self {
        self.recover_value_on_hidden = enabled;
        self
    }

    #[must_use]
    pub fn with_recover_value_on_shown(mut self, enabled: bool) -> Self {
        self.recover_value_on_shown = enabled;
        self
    }

    /// Append a child field.
    #[must_use]
    pub fn with_property(mut self, child: FieldConfig) -> Self {
        self.properties.push(child);
        self
    }

    #[must_use]
    pub fn with_properties(mut self, children: impl IntoIterator<Item = FieldConfig>) -> Self {
        self.properties.extend(children);
        self
    }

    #[must_use]
    pub fn with_hooks(mut self, hooks: LifecycleHooks) -> Self {
        self.hooks = hooks;
        self
    }

    #[must_use]
    pub fn with_on_init(mut self, hook: impl Fn(&Field) + 'static) -> Self {
        self.hooks.on_init = Some(Rc::new(hook));
        self
    }

    #[must_use]
    pub fn with_on_mounted(mut self, hook: impl Fn(&Field) + 'static) -> Self {
        self.hooks.on_mounted = Some(Rc::new(hook));
        self
    }

    #[must_use]
    pub fn with_on_destroy(mut self, hook: impl Fn(&Field) + 'static) -> Self {
        self.hooks.on_destroy = Some(Rc::new(hook));
        self
    }

    #[must_use]
    pub fn with_on_unmounted(mut self, hook: impl Fn(&Field) + 'static) -> Self {
        self.hooks.on_unmounted = Some(Rc::new(hook));
        self
    }

    /// Named event handler. `onChange`, `onBlur` and `onFocus` are called by
    /// the matching UI entry points; any other name is reached via `emit`.
    #[must_use]
    pub fn with_event(mut self, name: impl Into<String>, handler: impl Fn(&Field, &Value) + 'static) -> Self {
        self.events.insert(name.into(), Rc::new(handler));
        self
    }

    #[must_use]
    pub fn with_validator(mut self, validator: ValidatorConfig) -> Self {
        self.validator = validator;
        self
    }

    /// Add a UI-triggered validator.
    #[must_use]
    pub fn with_signal_validator(mut self, trigger: impl Into<String>, item: ValidateItem) -> Self {
        self.validator
            .signal
            .entry(trigger.into())
            .or_default()
            .push(item);
        self
    }

    /// Add a programmatically triggered validator.
    #[must_use]
    pub fn with_initiative_validator(mut self, trigger: impl Into<String>, item: ValidateItem) -> Self {
        self.validator
            .initiative
            .entry(trigger.into())
            .or_default()
            .push(item);
        self
    }

    #[must_use]
    pub fn with_set_default_value(
        mut self,
        action: impl Fn(&Value) -> LocalBoxFuture<'static, Value> + 'static,
    ) -> Self {
        self.actions.set_default_value = Some(Rc::new(action));
        self
    }

    #[must_use]
    pub fn with_on_submit_value(
        mut self,
        action: impl Fn(&Value) -> LocalBoxFuture<'static, Value> + 'static,
    ) -> Self {
        self.actions.on_submit_value = Some(Rc::new(action));
        self
    }

    #[must_use]
    pub fn with_relation(mut self, relation: Relation) -> Self {
        self.relations.push(relation);
        self
    }

    #[must_use]
    pub fn with_relations(mut self, relations: impl IntoIterator<Item = Relation>) -> Self {
        self.relations.extend(relations);
        self
    }

    /// Named reaction over the field's value and the boolean context.
    #[must_use]
    pub fn with_signal(
        mut self,
        name: impl Into<String>,
        signal: impl Fn(&Field, &Value, &BoolContext) + 'static,
    ) -> Self {
        self.signals.insert(name.into(), Rc::new(signal));
        self
    }

    /// Run `action` every time `decision` evaluates to `true`.
    #[must_use]
    pub fn with_condition(mut self, decision: Decision, action: impl Fn(&Field) + 'static) -> Self {
        self.conditions.push((decision, Rc::new(action)));
        self
    }
}

/// Configuration of a whole form.
#[derive(Clone)]
pub struct FormConfig {
    pub(crate) id: String,
    pub(crate) fields: Vec<FieldConfig>,
    pub(crate) bools: BoolsConfig<ModelRef>,
    pub(crate) default_validator_engine: String,
    pub(crate) resolvers: BTreeMap<String, Rc<dyn Resolver>>,
}

impl fmt::Debug for FormConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormConfig")
            .field("id", &self.id)
            .field("fields", &self.fields)
            .field("bools", &self.bools)
            .field("default_validator_engine", &self.default_validator_engine)
            .field("resolvers", &self.resolvers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for FormConfig {
    fn default() -> Self {
        Self::new("form")
    }
}

impl FormConfig {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: Vec::new(),
            bools: BoolsConfig::new(),
            default_validator_engine: String::new(),
            resolvers: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn with_field(mut self, field: FieldConfig) -> Self {
        self.fields.push(field);
        self
    }

    #[must_use]
    pub fn with_fields(mut self, fields: impl IntoIterator<Item = FieldConfig>) -> Self {
        self.fields.extend(fields);
        self
    }

    /// Add a boolean flag derived from the model.
    #[must_use]
    pub fn with_bool(mut self, name: impl Into<String>, predicate: impl Fn(&ModelRef) -> bool + 'static) -> Self {
        self.bools = self.bools.with(name, predicate);
        self
    }

    #[must_use]
    pub fn with_bools(mut self, bools: BoolsConfig<ModelRef>) -> Self {
        self.bools = bools;
        self
    }

    #[must_use]
    pub fn with_default_validator_engine(mut self, engine: impl Into<String>) -> Self {
        self.default_validator_engine = engine.into();
        self
    }

    #[must_use]
    pub fn with_resolver(mut self, engine: impl Into<String>, resolver: impl Resolver + 'static) -> Self {
        self.resolvers.insert(engine.into(), Rc::new(resolver));
        self
    }
}
