#![no_main]

use std::collections::HashMap;

use formula_core::{DecisionExpr, OperatorRegistry};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(expr) = DecisionExpr::from_json(text) else {
        return;
    };
    let registry = OperatorRegistry::new();
    let Ok(decision) = expr.compile(&registry) else {
        return;
    };
    let flags: HashMap<String, bool> = decision
        .flags()
        .into_iter()
        .enumerate()
        .map(|(i, name)| (name.to_string(), i % 2 == 0))
        .collect();
    assert!(decision.evaluate(&flags).is_ok());
});
