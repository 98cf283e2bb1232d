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

// Policy validation - fail fast at load time rather than at first call

use regex::Regex;
use std::collections::HashSet;

use crate::engine_core::constants::policy;
use crate::engine_core::errors::GateError;
use crate::engine_core::models::{PolicyDefinition, PolicyRule, Subject};

/// Validates policy definitions for structural correctness
pub struct PolicyValidator;

impl PolicyValidator {
    /// Validate a loaded policy. Call before handing it to the gate.
    pub fn validate_policy(policy: &PolicyDefinition) -> Result<(), GateError> {
        if policy.name.trim().is_empty() {
            return Err(GateError::Configuration(
                "Policy name cannot be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for (idx, rule) in policy.rules.iter().enumerate() {
            Self::validate_rule(rule, &policy.name, idx)?;
            if !seen.insert(rule.id.as_str()) {
                return Err(GateError::Configuration(format!(
                    "Policy '{}': duplicate rule id '{}'",
                    policy.name, rule.id
                )));
            }
        }

        for (role, tools) in &policy.role_permissions {
            if tools.iter().any(|t| t.trim().is_empty()) {
                return Err(GateError::Configuration(format!(
                    "Policy '{}': role_permissions for {} contains an empty tool pattern",
                    policy.name, role
                )));
            }
        }

        if policy.reviewer_roles.is_empty() {
            return Err(GateError::Configuration(format!(
                "Policy '{}': reviewer_roles cannot be empty",
                policy.name
            )));
        }

        for (tool, over) in &policy.tools {
            if over.approval_ttl_secs == Some(0) {
                return Err(GateError::Configuration(format!(
                    "Policy '{}': tool '{}' has a zero approval TTL",
                    policy.name, tool
                )));
            }
        }

        for (idx, spec) in policy.firewall.patterns.iter().enumerate() {
            if let Err(e) = Regex::new(&spec.regex) {
                return Err(GateError::Configuration(format!(
                    "Policy '{}', firewall pattern #{} ({}): {}",
                    policy.name,
                    idx + 1,
                    spec.class,
                    e
                )));
            }
        }

        Ok(())
    }

    fn validate_rule(rule: &PolicyRule, policy_name: &str, idx: usize) -> Result<(), GateError> {
        let context = format!("Policy '{}', rule #{}", policy_name, idx + 1);

        if rule.id.trim().is_empty() {
            return Err(GateError::Configuration(format!(
                "{}: rule id cannot be empty",
                context
            )));
        }

        // Reserved ids would make audit entries ambiguous
        if rule.id == policy::DEFAULT_DENY_RULE
            || rule.id == policy::INJECTION_FLOOR_RULE
            || rule.id.starts_with(policy::ROLE_DEFAULT_PREFIX)
        {
            return Err(GateError::Configuration(format!(
                "{}: rule id '{}' is reserved",
                context, rule.id
            )));
        }

        if rule.priority == policy::ROLE_DEFAULT_PRIORITY {
            return Err(GateError::Configuration(format!(
                "{}: priority {} is reserved for role defaults",
                context, rule.priority
            )));
        }

        if rule.tool.trim().is_empty() || rule.scope.trim().is_empty() {
            return Err(GateError::Configuration(format!(
                "{}: tool and scope patterns cannot be empty",
                context
            )));
        }

        if let Subject::Actor(pattern) = &rule.subject {
            if pattern.trim().is_empty() {
                return Err(GateError::Configuration(format!(
                    "{}: actor pattern cannot be empty",
                    context
                )));
            }
        }

        Ok(())
    }

    /// Check that every literal tool name a policy mentions is registered.
    /// Glob patterns are skipped.
    pub fn validate_tool_names(
        policy: &PolicyDefinition,
        known_tools: &HashSet<String>,
    ) -> Result<(), GateError> {
        let literal_rule_tools = policy
            .rules
            .iter()
            .map(|r| r.tool.as_str())
            .filter(|t| crate::engine::pattern_matcher::PatternMatcher::is_literal(t));
        let override_tools = policy.tools.keys().map(String::as_str);

        for tool in literal_rule_tools.chain(override_tools) {
            if !known_tools.contains(tool) {
                let mut known: Vec<&String> = known_tools.iter().collect();
                known.sort();
                return Err(GateError::Configuration(format!(
                    "Policy '{}': unknown tool '{}'. Known tools: {:?}",
                    policy.name, tool, known
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_core::models::{
        Decision, PatternClass, PatternSpec, Role, ToolOverride,
    };

    fn rule(id: &str, tool: &str) -> PolicyRule {
        PolicyRule {
            id: id.to_string(),
            priority: 10,
            subject: Subject::MinRole(Role::Researcher),
            tool: tool.to_string(),
            scope: "*".to_string(),
            decision: Decision::Allow,
            reason: None,
        }
    }

    fn policy(rules: Vec<PolicyRule>) -> PolicyDefinition {
        PolicyDefinition {
            name: "test".to_string(),
            rules,
            ..PolicyDefinition::default()
        }
    }

    #[test]
    fn test_valid_policy() {
        let p = policy(vec![rule("a", "summarize_text"), rule("b", "create_*")]);
        assert!(PolicyValidator::validate_policy(&p).is_ok());
    }

    #[test]
    fn test_duplicate_rule_id() {
        let p = policy(vec![rule("a", "x"), rule("a", "y")]);
        let err = PolicyValidator::validate_policy(&p).unwrap_err();
        assert!(err.to_string().contains("duplicate rule id 'a'"));
    }

    #[test]
    fn test_reserved_rule_ids() {
        for id in ["default-deny", "firewall-floor", "role-default:Admin:x"] {
            let p = policy(vec![rule(id, "x")]);
            let err = PolicyValidator::validate_policy(&p).unwrap_err();
            assert!(err.to_string().contains("reserved"), "{}", id);
        }
    }

    #[test]
    fn test_bad_firewall_regex() {
        let mut p = policy(vec![]);
        p.firewall.patterns.push(PatternSpec {
            class: PatternClass::ToolHijack,
            regex: "(unclosed".to_string(),
            severity: None,
        });
        let err = PolicyValidator::validate_policy(&p).unwrap_err();
        assert!(err.to_string().contains("firewall pattern #1"));
    }

    #[test]
    fn test_zero_ttl_and_empty_reviewers() {
        let mut p = policy(vec![]);
        p.tools.insert(
            "webhook_post".to_string(),
            ToolOverride {
                approval_ttl_secs: Some(0),
                ..ToolOverride::default()
            },
        );
        assert!(PolicyValidator::validate_policy(&p).is_err());

        let mut p = policy(vec![]);
        p.reviewer_roles.clear();
        assert!(PolicyValidator::validate_policy(&p).is_err());
    }

    #[test]
    fn test_unknown_tool_names() {
        let known: HashSet<String> = ["summarize_text".to_string()].into_iter().collect();
        let ok = policy(vec![rule("a", "summarize_text"), rule("b", "*")]);
        assert!(PolicyValidator::validate_tool_names(&ok, &known).is_ok());

        let bad = policy(vec![rule("a", "sumarize_text")]);
        let err = PolicyValidator::validate_tool_names(&bad, &known).unwrap_err();
        assert!(err.to_string().contains("sumarize_text"));
    }
}
