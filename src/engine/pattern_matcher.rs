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

//! Pattern matching for rule fields.
//!
//! Tool, scope and actor patterns are globs where `*` matches any run of
//! characters (including none). Everything else matches literally.

use crate::engine_core::models::{Actor, Subject};

pub struct PatternMatcher;

impl PatternMatcher {
    /// Match `value` against a glob `pattern`.
    pub fn matches(pattern: &str, value: &str) -> bool {
        if pattern == "*" {
            return true;
        }
        if !pattern.contains('*') {
            return pattern == value;
        }

        let parts: Vec<&str> = pattern.split('*').collect();
        let first = parts[0];
        let last = parts[parts.len() - 1];
        if !value.starts_with(first) {
            return false;
        }
        let mut rest = &value[first.len()..];
        if rest.len() < last.len() {
            return false;
        }

        // Middle segments are matched greedily left to right
        for part in &parts[1..parts.len() - 1] {
            if part.is_empty() {
                continue;
            }
            match rest.find(part) {
                Some(idx) => rest = &rest[idx + part.len()..],
                None => return false,
            }
        }
        rest.ends_with(last)
    }

    /// A literal pattern names exactly one value.
    pub fn is_literal(pattern: &str) -> bool {
        !pattern.contains('*')
    }

    pub fn matches_subject(subject: &Subject, actor: &Actor) -> bool {
        match subject {
            Subject::Any => true,
            Subject::Role(role) => actor.role == *role,
            Subject::MinRole(role) => actor.role.includes(*role),
            Subject::Actor(pattern) => Self::matches(pattern, &actor.id),
        }
    }
}
