#![forbid(unsafe_code)]

//! Structured log events emitted while a form runs.

use std::sync::{Arc, Mutex};

use formula_core::validation::ResolveResult;
use formula_core::{
    AbstractModel, FieldConfig, FormConfig, Relation, SyncResolver, ValidateItem, ValidationResult,
};
use futures::executor::block_on;
use serde_json::{Value, json};
use tracing::Subscriber;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};

#[derive(Clone, Default)]
struct MessageCapture {
    messages: Arc<Mutex<Vec<String>>>,
}

impl MessageCapture {
    fn messages(&self) -> Vec<String> {
        self.messages.lock().expect("capture lock").clone()
    }
}

struct MessageVisitor(Option<String>);

impl tracing::field::Visit for MessageVisitor {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.0 = Some(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" && self.0.is_none() {
            self.0 = Some(format!("{value:?}").trim_matches('"').to_string());
        }
    }
}

impl<S> Layer<S> for MessageCapture
where
    S: Subscriber + for<'lookup> tracing_subscriber::registry::LookupSpan<'lookup>,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor(None);
        event.record(&mut visitor);
        if let Some(message) = visitor.0 {
            self.messages.lock().expect("capture lock").push(message);
        }
    }
}

fn capture() -> (MessageCapture, tracing::subscriber::DefaultGuard) {
    let capture = MessageCapture::default();
    let subscriber = tracing_subscriber::registry().with(capture.clone());
    let guard = tracing::subscriber::set_default(subscriber);
    (capture, guard)
}

#[test]
fn model_construction_and_relations_are_logged() {
    let (capture, _guard) = capture();
    let model = AbstractModel::new(
        FormConfig::new("logged")
            .with_field(FieldConfig::new("a"))
            .with_field(FieldConfig::new("b").with_relation(Relation::new("a", |field, value| {
                field.set_value(value.clone());
            }))),
    )
    .unwrap();
    model.set_field_value("a", json!(1)).unwrap();

    let messages = capture.messages();
    assert!(messages.iter().any(|m| m == "formula.model.init"), "{messages:?}");
    assert!(messages.iter().any(|m| m == "formula.graph.restructure"), "{messages:?}");
    assert!(messages.iter().any(|m| m == "formula.relation.run"), "{messages:?}");
}

#[test]
fn superseded_validation_is_logged_as_discarded() {
    let (capture, _guard) = capture();
    let model = AbstractModel::new(
        FormConfig::new("logged")
            .with_default_validator_engine("basic")
            .with_resolver(
                "basic",
                SyncResolver(|_: &Value, _: &Value| -> ResolveResult { Ok(ValidationResult::valid()) }),
            )
            .with_field(FieldConfig::new("name").with_signal_validator("onChange", ValidateItem::new(Value::Null))),
    )
    .unwrap();
    let field = model.get_field("name").unwrap();

    let stale = field.on_change(json!("a"));
    let fresh = field.on_change(json!("ab"));
    assert!(block_on(fresh).is_applied());
    assert!(block_on(stale).is_discarded());

    let messages = capture.messages();
    let applied = messages.iter().position(|m| m == "formula.validation.applied");
    let discarded = messages.iter().position(|m| m == "formula.validation.discarded");
    assert!(applied.is_some() && discarded.is_some(), "{messages:?}");
    assert!(applied < discarded);
}

#[test]
fn submit_is_logged_at_info() {
    let (capture, _guard) = capture();
    let model = AbstractModel::new(FormConfig::new("logged").with_field(FieldConfig::new("x"))).unwrap();
    let outcome = block_on(model.submit());
    assert!(outcome.valid);
    assert!(capture.messages().iter().any(|m| m == "formula.model.submit"));
}
