#![forbid(unsafe_code)]

//! The facade prelude is enough to describe, run and submit a form.

use formula::prelude::*;
use futures::executor::block_on;
use serde_json::{Value, json};

const FIELDS: &str = r#"[
    { "id": "country", "defaultValue": "NZ" },
    {
        "id": "address",
        "properties": [
            { "id": "street" },
            { "id": "postcode", "hidden": { "not": "domestic" }, "recoverValueOnShown": true }
        ]
    }
]"#;

fn form(id: &str) -> FormConfig {
    let fields = FieldDescriptor::list_from_json(FIELDS)
        .unwrap()
        .into_iter()
        .map(|descriptor| descriptor.into_config(&OperatorRegistry::new()).unwrap());
    FormConfig::new(id)
        .with_bool("domestic", |model| model.value("country") == json!("NZ"))
        .with_fields(fields)
}

#[test]
fn descriptors_build_a_working_form() {
    let mut group = FormGroup::new();
    let model = group.create(form("shipping")).unwrap();
    assert!(group.contains("shipping"));

    model.set_field_value("address.postcode", json!("6011")).unwrap();
    model.set_field_value("country", json!("AU")).unwrap();
    assert_eq!(model.get_field_value("address.postcode").unwrap(), Value::Null);

    model.set_field_value("country", json!("NZ")).unwrap();
    assert_eq!(model.get_field_value("address.postcode").unwrap(), json!("6011"));

    let outcome = block_on(model.submit());
    assert!(outcome.valid);
    assert_eq!(
        outcome.value,
        json!({ "country": "NZ", "address": { "street": null, "postcode": "6011" } })
    );
}

#[test]
fn runtime_batch_is_reexported() {
    let model = AbstractModel::new(form("batched")).unwrap();
    let runs = std::rc::Rc::new(std::cell::Cell::new(0));
    let runs_in = runs.clone();
    let _watch = model.on_subscribe(move |_| runs_in.set(runs_in.get() + 1));
    batch(|| {
        model.set_field_value("address.street", json!("Cuba St")).unwrap();
        model.set_field_value("country", json!("AU")).unwrap();
    });
    assert_eq!(runs.get(), 2);
}
