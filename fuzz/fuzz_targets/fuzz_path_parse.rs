#![no_main]

use arbitrary::Arbitrary;
use formula_core::path;
use libfuzzer_sys::fuzz_target;
use serde_json::{Value, json};

#[derive(Arbitrary, Debug)]
struct Input {
    path: String,
    depth: u8,
}

fuzz_target!(|input: Input| {
    let Ok(segments) = path::parse(&input.path) else {
        return;
    };
    assert!(!segments.is_empty());
    let mut value = json!({ "a": [1, { "b": null }] });
    for _ in 0..input.depth % 4 {
        value = json!({ "a": value });
    }
    // Descending never panics, whatever the shape.
    let _: Result<Value, _> = path::descend(&value, &segments, &input.path);
});
