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

//! Content helpers for text leaving the gate.
//!
//! PII redaction and clamping for argument and result snapshots written into
//! audit payloads, and spotlighting for evidence handed back to the planner.

use rand::distr::Alphanumeric;
use rand::Rng;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use crate::engine_core::constants::spotlight;

static PII_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"\b\d{3}-\d{2}-\d{4}\b", "[REDACTED_SSN]"),
        (
            r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
            "[REDACTED_EMAIL]",
        ),
        (
            r"(\+?\d{1,2}[\s.-]?)?\(?\d{3}\)?[\s.-]?\d{3}[\s.-]?\d{4}\b",
            "[REDACTED_PHONE]",
        ),
    ]
    .into_iter()
    .filter_map(|(pattern, marker)| Regex::new(pattern).ok().map(|re| (re, marker)))
    .collect()
});

pub struct ContentGuard;

impl ContentGuard {
    /// Wraps evidence in randomized delimiters so the planner can tell
    /// retrieved data from instructions.
    pub fn spotlight(content: &str) -> String {
        let id: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(spotlight::RANDOM_ID_LENGTH)
            .map(char::from)
            .collect();

        format!(
            "{}{}{}\n{}\n{}{}{}",
            spotlight::DATA_START_PREFIX,
            id,
            spotlight::DELIMITER_SUFFIX,
            content,
            spotlight::DATA_END_PREFIX,
            id,
            spotlight::DELIMITER_SUFFIX
        )
    }

    /// Mask SSNs, e-mail addresses and phone numbers.
    pub fn redact_pii(text: &str) -> String {
        PII_PATTERNS
            .iter()
            .fold(text.to_string(), |acc, (re, marker)| {
                re.replace_all(&acc, *marker).into_owned()
            })
    }

    /// Truncate to `max_chars`, marking the cut.
    pub fn clamp_text(text: &str, max_chars: usize) -> String {
        if text.chars().count() <= max_chars {
            return text.to_string();
        }
        let mut out: String = text.chars().take(max_chars).collect();
        out.push('…');
        out
    }

    /// Redact and clamp every string inside a JSON value.
    pub fn snapshot(value: &Value, max_chars: usize) -> Value {
        match value {
            Value::String(s) => Value::String(Self::clamp_text(&Self::redact_pii(s), max_chars)),
            Value::Array(items) => Value::Array(items.iter().map(|v| Self::snapshot(v, max_chars)).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::snapshot(v, max_chars)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}
