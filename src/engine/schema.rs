// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Argument validation against a tool's declared input contract.
//!
//! Validation is lax about representation (numeric strings, `"true"`,
//! integral floats) and strict about shape. The first violation found is
//! reported; unknown fields are checked before declared ones so the
//! reported field is stable for a given payload.

use serde_json::{Map, Number, Value};
use url::Url;

use crate::engine_core::errors::{SchemaError, Violation};
use crate::engine_core::models::{FieldKind, FieldSpec, ToolDefinition};
use crate::engine_core::types::ValidatedArgs;

pub struct SchemaValidator;

impl SchemaValidator {
    pub fn validate(tool: &ToolDefinition, raw: &Value) -> Result<ValidatedArgs, SchemaError> {
        let empty = Map::new();
        let input = match raw {
            Value::Object(map) => map,
            Value::Null => &empty,
            _ => return Err(SchemaError::new("$", Violation::NotAnObject)),
        };

        if !tool.allow_unknown_fields {
            if let Some(unknown) = input.keys().find(|k| tool.field(k).is_none()) {
                return Err(SchemaError::new(unknown.as_str(), Violation::UnknownField));
            }
        }

        let mut out = Map::new();
        for spec in &tool.fields {
            match input.get(&spec.name).filter(|v| !v.is_null()) {
                Some(value) => {
                    let coerced = coerce(spec, value)?;
                    check_constraints(spec, &coerced)?;
                    out.insert(spec.name.clone(), coerced);
                }
                None => {
                    if let Some(default) = &spec.default {
                        out.insert(spec.name.clone(), default.clone());
                    } else if spec.required {
                        return Err(SchemaError::new(spec.name.as_str(), Violation::Missing));
                    }
                }
            }
        }

        if tool.allow_unknown_fields {
            for (key, value) in input {
                if tool.field(key).is_none() {
                    out.insert(key.clone(), value.clone());
                }
            }
        }

        Ok(ValidatedArgs::new(out))
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn coerce(spec: &FieldSpec, value: &Value) -> Result<Value, SchemaError> {
    let mismatch = || {
        SchemaError::new(
            spec.name.as_str(),
            Violation::TypeMismatch {
                expected: spec.kind.to_string(),
                found: type_name(value).to_string(),
            },
        )
    };

    match spec.kind {
        FieldKind::String => match value {
            Value::String(_) => Ok(value.clone()),
            _ => Err(mismatch()),
        },
        FieldKind::Integer => match value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Value::from(i))
                } else {
                    match n.as_f64() {
                        Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                            Ok(Value::from(f as i64))
                        }
                        _ => Err(mismatch()),
                    }
                }
            }
            Value::String(s) => s.trim().parse::<i64>().map(Value::from).map_err(|_| mismatch()),
            _ => Err(mismatch()),
        },
        FieldKind::Number => match value {
            Value::Number(_) => Ok(value.clone()),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(mismatch),
            _ => Err(mismatch()),
        },
        FieldKind::Boolean => match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
            Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
            _ => Err(mismatch()),
        },
        FieldKind::Object => match value {
            Value::Object(_) => Ok(value.clone()),
            _ => Err(mismatch()),
        },
        FieldKind::Array => match value {
            Value::Array(_) => Ok(value.clone()),
            _ => Err(mismatch()),
        },
        FieldKind::Email => {
            let Value::String(s) = value else {
                return Err(mismatch());
            };
            let trimmed = s.trim();
            if is_email(trimmed) {
                Ok(Value::String(trimmed.to_string()))
            } else {
                Err(SchemaError::new(
                    spec.name.as_str(),
                    Violation::Malformed {
                        reason: "not an e-mail address".to_string(),
                    },
                ))
            }
        }
        FieldKind::Url => {
            let Value::String(s) = value else {
                return Err(mismatch());
            };
            let malformed = |reason: String| {
                SchemaError::new(spec.name.as_str(), Violation::Malformed { reason })
            };
            let url = Url::parse(s.trim()).map_err(|e| malformed(e.to_string()))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(malformed(format!("unsupported scheme '{}'", url.scheme())));
            }
            Ok(Value::String(url.to_string()))
        }
    }
}

fn is_email(s: &str) -> bool {
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !s.chars().any(char::is_whitespace)
}

fn check_constraints(spec: &FieldSpec, value: &Value) -> Result<(), SchemaError> {
    let field = spec.name.as_str();

    let length = match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) => Some(items.len()),
        _ => None,
    };
    if let Some(length) = length {
        if let Some(min) = spec.min_length {
            if length < min {
                return Err(SchemaError::new(field, Violation::TooShort { length, min }));
            }
        }
        if let Some(max) = spec.max_length {
            if length > max {
                return Err(SchemaError::new(field, Violation::TooLong { length, max }));
            }
        }
    }

    if let Some(n) = value.as_f64() {
        let below = spec.minimum.is_some_and(|min| n < min);
        let above = spec.maximum.is_some_and(|max| n > max);
        if below || above {
            return Err(SchemaError::new(
                field,
                Violation::OutOfRange {
                    value: n,
                    min: spec.minimum,
                    max: spec.maximum,
                },
            ));
        }
    }

    if let Some(allowed) = &spec.allowed {
        let text = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        if !allowed.contains(&text) {
            return Err(SchemaError::new(
                field,
                Violation::NotAllowed {
                    value: text,
                    allowed: allowed.clone(),
                },
            ));
        }
    }

    Ok(())
}
