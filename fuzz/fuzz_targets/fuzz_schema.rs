// Copyright 2026 BadCompany
// Licensed under the Apache License, Version 2.0

#![no_main]

use arbitrary::{Arbitrary, Unstructured};
use libfuzzer_sys::fuzz_target;
use std::sync::OnceLock;
use toolgate::engine::schema::SchemaValidator;
use toolgate::engine_core::models::ToolDefinition;
use toolgate::tools::default_registry;

#[derive(Debug, Arbitrary)]
struct FuzzArgs {
    tool: u8,
    fields: Vec<(String, FuzzValue)>,
}

#[derive(Debug, Arbitrary)]
enum FuzzValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<String>),
}

impl FuzzValue {
    fn into_json(self) -> serde_json::Value {
        match self {
            FuzzValue::Null => serde_json::Value::Null,
            FuzzValue::Bool(b) => b.into(),
            FuzzValue::Int(i) => i.into(),
            FuzzValue::Float(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            FuzzValue::Text(s) => s.into(),
            FuzzValue::List(items) => items.into(),
        }
    }
}

fn tools() -> &'static Vec<ToolDefinition> {
    static TOOLS: OnceLock<Vec<ToolDefinition>> = OnceLock::new();
    TOOLS.get_or_init(|| default_registry(&[]).definitions())
}

fuzz_target!(|data: &[u8]| {
    let mut unstructured = Unstructured::new(data);
    let Ok(input) = FuzzArgs::arbitrary(&mut unstructured) else {
        return;
    };
    let tools = tools();
    let tool = &tools[input.tool as usize % tools.len()];

    let args: serde_json::Map<String, serde_json::Value> = input
        .fields
        .into_iter()
        .map(|(k, v)| (k, v.into_json()))
        .collect();
    let raw = serde_json::Value::Object(args);

    // Accepted arguments only ever carry declared fields
    if let Ok(validated) = SchemaValidator::validate(tool, &raw) {
        if !tool.allow_unknown_fields {
            for key in validated.into_inner().keys() {
                assert!(tool.field(key).is_some(), "undeclared field {} accepted", key);
            }
        }
    }
});
