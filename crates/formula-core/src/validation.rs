#![forbid(unsafe_code)]

//! Validation orchestration.
//!
//! A field declares validators per *trigger* (`onChange`, `onBlur`, or any
//! custom event name) in two tables: `signal` (fired by UI events) and
//! `initiative` (fired programmatically, e.g. on submit). Running the
//! validators of one trigger goes through a [`Resolver`], the adapter for
//! a schema-validation backend, selected by engine name.
//!
//! # Supersession
//!
//! Every call to [`Field::validate`](crate::field::Field::validate) takes a
//! fresh token from the field's per-trigger [`ValidationTokens`] before it
//! suspends. When the resolver finishes, the result is applied only if the
//! token is still the latest one issued for that trigger; otherwise the
//! call reports [`ValidationReport::Discarded`]. Results arriving after the
//! field was destroyed are discarded the same way.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use futures::FutureExt;
use futures::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FormulaError, Result, ValidationEngineError};

/// Error code of the synthetic entry produced when an engine fails.
pub const ENGINE_FAILURE_CODE: &str = "engine_failure";

/// Structured validation message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorMessage {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub(crate) fn engine_failure(err: &ValidationEngineError) -> Self {
        Self::new(err.to_string()).with_code(ENGINE_FAILURE_CODE)
    }
}

impl fmt::Display for ErrorMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Errors of one field keyed by trigger.
pub type FieldErrors = BTreeMap<String, Vec<ErrorMessage>>;

/// What a resolver reports for one schema check.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(default)]
    pub errors: Vec<ErrorMessage>,
}

impl ValidationResult {
    #[must_use]
    pub fn valid() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    #[must_use]
    pub fn invalid(errors: Vec<ErrorMessage>) -> Self {
        Self {
            valid: false,
            errors,
        }
    }
}

pub type ResolveResult = std::result::Result<ValidationResult, ValidationEngineError>;
pub type ResolverFuture = LocalBoxFuture<'static, ResolveResult>;

/// Adapter for one schema-validation backend.
pub trait Resolver {
    /// Check `value` against `schema`. The future owns everything it needs.
    fn resolve(&self, schema: &Value, value: &Value) -> ResolverFuture;
}

impl<F> Resolver for F
where
    F: Fn(&Value, &Value) -> ResolverFuture,
{
    fn resolve(&self, schema: &Value, value: &Value) -> ResolverFuture {
        self(schema, value)
    }
}

/// Resolver wrapping a synchronous check.
pub struct SyncResolver<F>(pub F);

impl<F> Resolver for SyncResolver<F>
where
    F: Fn(&Value, &Value) -> ResolveResult,
{
    fn resolve(&self, schema: &Value, value: &Value) -> ResolverFuture {
        futures::future::ready((self.0)(schema, value)).boxed_local()
    }
}

/// One validator: a schema for an engine, with an optional message that
/// replaces whatever the engine reports on failure.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateItem {
    #[serde(default)]
    pub schema: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ValidateItem {
    #[must_use]
    pub fn new(schema: Value) -> Self {
        Self {
            schema,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = Some(engine.into());
        self
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Per-field validator tables.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Triggered by UI events.
    #[serde(default)]
    pub signal: BTreeMap<String, Vec<ValidateItem>>,
    /// Triggered programmatically.
    #[serde(default)]
    pub initiative: BTreeMap<String, Vec<ValidateItem>>,
}

impl ValidatorConfig {
    /// Validators of `trigger`, signal entries first.
    pub fn items(&self, trigger: &str) -> impl Iterator<Item = &ValidateItem> {
        self.signal
            .get(trigger)
            .into_iter()
            .chain(self.initiative.get(trigger))
            .flatten()
    }

    /// Every trigger with at least one validator, sorted.
    #[must_use]
    pub fn triggers(&self) -> BTreeSet<&str> {
        self.signal
            .iter()
            .chain(&self.initiative)
            .filter(|(_, items)| !items.is_empty())
            .map(|(trigger, _)| trigger.as_str())
            .collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.triggers().is_empty()
    }
}

/// Why a finished validation was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// A newer call for the same trigger was started.
    Superseded,
    /// The field was destroyed (or its form dropped) meanwhile.
    Destroyed,
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Superseded => f.write_str("superseded"),
            Self::Destroyed => f.write_str("destroyed"),
        }
    }
}

/// Outcome of one validation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationReport {
    /// No validator is configured for the trigger.
    Skipped,
    /// The errors were written to the field (empty means valid).
    Applied(Vec<ErrorMessage>),
    Discarded(DiscardReason),
}

impl ValidationReport {
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    #[must_use]
    pub fn is_discarded(&self) -> bool {
        matches!(self, Self::Discarded(_))
    }

    /// Applied errors, if any were applied.
    #[must_use]
    pub fn errors(&self) -> Option<&[ErrorMessage]> {
        match self {
            Self::Applied(errors) => Some(errors),
            _ => None,
        }
    }
}

/// Monotonic per-trigger sequence numbers of one field.
#[derive(Debug, Default)]
pub struct ValidationTokens {
    latest: RefCell<AHashMap<String, u64>>,
}

impl ValidationTokens {
    /// Issue the next token for `trigger`.
    pub fn begin(&self, trigger: &str) -> u64 {
        let mut latest = self.latest.borrow_mut();
        let token = latest.entry(trigger.to_string()).or_insert(0);
        *token += 1;
        *token
    }

    /// Whether `token` is still the newest one issued for `trigger`.
    #[must_use]
    pub fn is_current(&self, trigger: &str, token: u64) -> bool {
        self.latest.borrow().get(trigger) == Some(&token)
    }
}

/// Engine table of one form.
#[derive(Clone, Default)]
pub struct ValidationEngine {
    default_engine: String,
    resolvers: BTreeMap<String, Rc<dyn Resolver>>,
}

impl fmt::Debug for ValidationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationEngine")
            .field("default_engine", &self.default_engine)
            .field("resolvers", &self.resolvers.keys().collect::<Vec<_>>())
            .finish()
    }
}

pub(crate) type ValidationJob = (String, Rc<dyn Resolver>, ValidateItem);

impl ValidationEngine {
    #[must_use]
    pub fn new(default_engine: impl Into<String>, resolvers: BTreeMap<String, Rc<dyn Resolver>>) -> Self {
        Self {
            default_engine: default_engine.into(),
            resolvers,
        }
    }

    #[must_use]
    pub fn default_engine(&self) -> &str {
        &self.default_engine
    }

    fn engine_for<'a>(&'a self, item: &'a ValidateItem) -> &'a str {
        item.engine.as_deref().unwrap_or(&self.default_engine)
    }

    pub fn resolver(&self, engine: &str) -> Result<Rc<dyn Resolver>> {
        self.resolvers
            .get(engine)
            .cloned()
            .ok_or_else(|| FormulaError::UnknownValidatorEngine {
                engine: engine.to_string(),
            })
    }

    /// Fail fast if any validator of `config` names an unregistered engine.
    pub fn check(&self, config: &ValidatorConfig) -> Result<()> {
        for item in config.signal.values().chain(config.initiative.values()).flatten() {
            self.resolver(self.engine_for(item))?;
        }
        Ok(())
    }

    pub(crate) fn jobs(&self, config: &ValidatorConfig, trigger: &str) -> Result<Vec<ValidationJob>> {
        config
            .items(trigger)
            .map(|item| {
                let engine = self.engine_for(item).to_string();
                let resolver = self.resolver(&engine)?;
                Ok((engine, resolver, item.clone()))
            })
            .collect()
    }
}

/// Run `jobs` in order against `value` and collect the failures.
///
/// An engine error ends the run with a single synthetic entry.
pub(crate) async fn run_jobs(path: &str, trigger: &str, jobs: Vec<ValidationJob>, value: Value) -> Vec<ErrorMessage> {
    let mut errors = Vec::new();
    for (engine, resolver, item) in jobs {
        match resolver.resolve(&item.schema, &value).await {
            Ok(result) if result.valid => {}
            Ok(result) => match &item.message {
                Some(message) => errors.push(ErrorMessage::new(message.clone())),
                None if result.errors.is_empty() => {
                    errors.push(ErrorMessage::new(format!("invalid value for `{path}`")));
                }
                None => errors.extend(result.errors),
            },
            Err(err) => {
                tracing::warn!(
                    message = "formula.validation.engine_failed",
                    path,
                    trigger,
                    engine = %engine,
                    error = %err
                );
                return vec![ErrorMessage::engine_failure(&err)];
            }
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use serde_json::json;

    fn not_empty() -> Rc<dyn Resolver> {
        Rc::new(SyncResolver(|_schema: &Value, value: &Value| -> ResolveResult {
            Ok(match value.as_str() {
                Some("") | None => ValidationResult::invalid(vec![ErrorMessage::new("required")]),
                Some(_) => ValidationResult::valid(),
            })
        }))
    }

    fn engine() -> ValidationEngine {
        let mut resolvers = BTreeMap::new();
        resolvers.insert("basic".to_string(), not_empty());
        ValidationEngine::new("basic", resolvers)
    }

    #[test]
    fn tokens_are_monotonic_per_trigger() {
        let tokens = ValidationTokens::default();
        let first = tokens.begin("onChange");
        let other = tokens.begin("onBlur");
        let second = tokens.begin("onChange");
        assert!(second > first);
        assert!(!tokens.is_current("onChange", first));
        assert!(tokens.is_current("onChange", second));
        assert!(tokens.is_current("onBlur", other));
    }

    #[test]
    fn items_chain_signal_then_initiative() {
        let mut config = ValidatorConfig::default();
        config
            .signal
            .insert("onChange".into(), vec![ValidateItem::new(json!(1))]);
        config
            .initiative
            .insert("onChange".into(), vec![ValidateItem::new(json!(2))]);
        config.initiative.insert("submit".into(), Vec::new());
        let schemas: Vec<_> = config.items("onChange").map(|i| i.schema.clone()).collect();
        assert_eq!(schemas, vec![json!(1), json!(2)]);
        assert_eq!(config.triggers().into_iter().collect::<Vec<_>>(), vec!["onChange"]);
    }

    #[test]
    fn unknown_engine_fails_check() {
        let mut config = ValidatorConfig::default();
        config.signal.insert(
            "onChange".into(),
            vec![ValidateItem::new(Value::Null).with_engine("zod")],
        );
        let err = engine().check(&config).unwrap_err();
        assert!(matches!(err, FormulaError::UnknownValidatorEngine { ref engine } if engine == "zod"));
    }

    #[test]
    fn run_jobs_collects_failures_and_overrides_message() {
        let mut config = ValidatorConfig::default();
        config.signal.insert(
            "onChange".into(),
            vec![
                ValidateItem::new(Value::Null),
                ValidateItem::new(Value::Null).with_message("please fill in"),
            ],
        );
        let jobs = engine().jobs(&config, "onChange").unwrap();
        let errors = block_on(run_jobs("name", "onChange", jobs, json!("")));
        assert_eq!(
            errors,
            vec![ErrorMessage::new("required"), ErrorMessage::new("please fill in")]
        );
    }

    #[test]
    fn engine_failure_becomes_single_synthetic_entry() {
        let failing: Rc<dyn Resolver> = Rc::new(SyncResolver(|_: &Value, _: &Value| -> ResolveResult {
            Err(ValidationEngineError::new("broken", "schema exploded"))
        }));
        let mut resolvers = BTreeMap::new();
        resolvers.insert("broken".to_string(), failing);
        let engine = ValidationEngine::new("broken", resolvers);
        let mut config = ValidatorConfig::default();
        config.signal.insert(
            "onBlur".into(),
            vec![ValidateItem::new(Value::Null), ValidateItem::new(Value::Null)],
        );
        let jobs = engine.jobs(&config, "onBlur").unwrap();
        let errors = block_on(run_jobs("x", "onBlur", jobs, Value::Null));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code.as_deref(), Some(ENGINE_FAILURE_CODE));
    }

    #[test]
    fn error_message_serializes_without_empty_code() {
        let text = serde_json::to_string(&ErrorMessage::new("required")).unwrap();
        assert_eq!(text, r#"{"message":"required"}"#);
    }
}
