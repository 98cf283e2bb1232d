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

//! Policy evaluation engine.
//!
//! `PolicyEvaluator` is a pure decision function over a compiled, priority
//! ordered rule set: (actor, tool, scope, findings) -> ALLOW | DENY |
//! REQUIRE_APPROVAL plus the rule that produced it. No I/O, no state.

use crate::engine::pattern_matcher::PatternMatcher;
use crate::engine_core::constants::policy;
use crate::engine_core::models::{
    Actor, AuditSeverity, Decision, InjectionFinding, PolicyDefinition, PolicyRule, RiskTier,
    Role, Severity, Subject, ToolDefinition,
};

/// Result of one evaluation, ready to be audited.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyOutcome {
    pub decision: Decision,
    pub matched_rule: String,
    pub reason: String,
    pub severity: AuditSeverity,
    /// An explicit literal rule granted ALLOW on a high risk tool
    pub explicit_override: bool,
}

pub struct PolicyEvaluator {
    rules: Vec<PolicyRule>,
}

impl PolicyEvaluator {
    /// Compile explicit rules and role defaults into one ordered list.
    pub fn new(policy: &PolicyDefinition) -> Self {
        let mut rules = policy.rules.clone();
        // Stable sort: equal priorities keep declaration order
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));

        // Role defaults sit below every explicit rule. A grant to a role is
        // inherited by every role above it, so emit one MinRole rule per grant.
        for role in Role::ALL {
            if let Some(tools) = policy.role_permissions.get(&role) {
                for tool in tools {
                    rules.push(PolicyRule {
                        id: format!("{}:{}:{}", policy::ROLE_DEFAULT_PREFIX, role, tool),
                        priority: policy::ROLE_DEFAULT_PRIORITY,
                        subject: Subject::MinRole(role),
                        tool: tool.clone(),
                        scope: "*".to_string(),
                        decision: Decision::Allow,
                        reason: Some(format!("{} default permission", role)),
                    });
                }
            }
        }

        Self { rules }
    }

    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }

    pub fn evaluate(
        &self,
        actor: &Actor,
        tool: &ToolDefinition,
        scope: &str,
        findings: &[InjectionFinding],
    ) -> PolicyOutcome {
        // Non-overridable floor: unresolved high severity content always denies
        if let Some(finding) = findings
            .iter()
            .find(|f| f.is_unresolved() && f.severity == Severity::High)
        {
            return PolicyOutcome {
                decision: Decision::Deny,
                matched_rule: policy::INJECTION_FLOOR_RULE.to_string(),
                reason: format!(
                    "Injection pattern '{}' detected in {}",
                    finding.class, finding.source
                ),
                severity: AuditSeverity::Alert,
                explicit_override: false,
            };
        }

        let matched = self.rules.iter().find(|rule| {
            PatternMatcher::matches_subject(&rule.subject, actor)
                && PatternMatcher::matches(&rule.tool, &tool.name)
                && PatternMatcher::matches(&rule.scope, scope)
        });

        let Some(rule) = matched else {
            return PolicyOutcome {
                decision: Decision::Deny,
                matched_rule: policy::DEFAULT_DENY_RULE.to_string(),
                reason: format!(
                    "No rule grants {} ({}) access to '{}' in scope '{}'",
                    actor.id, actor.role, tool.name, scope
                ),
                severity: AuditSeverity::Alert,
                explicit_override: false,
            };
        };

        let reason = rule
            .reason
            .clone()
            .unwrap_or_else(|| format!("Matched rule '{}'", rule.id));

        match rule.decision {
            Decision::Deny => PolicyOutcome {
                decision: Decision::Deny,
                matched_rule: rule.id.clone(),
                reason,
                severity: AuditSeverity::Alert,
                explicit_override: false,
            },
            Decision::RequireApproval => PolicyOutcome {
                decision: Decision::RequireApproval,
                matched_rule: rule.id.clone(),
                reason,
                severity: AuditSeverity::Info,
                explicit_override: false,
            },
            Decision::Allow => self.apply_allow_floors(rule, tool, findings, reason),
        }
    }

    fn apply_allow_floors(
        &self,
        rule: &PolicyRule,
        tool: &ToolDefinition,
        findings: &[InjectionFinding],
        reason: String,
    ) -> PolicyOutcome {
        // An explicit triple lifts the high-risk floor only; later floors still apply.
        let lifted = tool.risk == RiskTier::High && Self::is_explicit_triple(rule);
        let escalate = |why: String| PolicyOutcome {
            decision: Decision::RequireApproval,
            matched_rule: rule.id.clone(),
            reason: why,
            severity: AuditSeverity::Info,
            explicit_override: lifted,
        };

        if tool.risk == RiskTier::High && !lifted {
            return escalate(format!("High-risk tool '{}' requires approval", tool.name));
        }

        if tool.requires_approval {
            return escalate(format!("Tool '{}' is configured to require approval", tool.name));
        }

        if let Some(finding) = findings
            .iter()
            .find(|f| f.is_unresolved() && f.severity == Severity::Medium)
        {
            return escalate(format!(
                "Suspicious content '{}' in {} requires review",
                finding.class, finding.source
            ));
        }

        if lifted {
            return PolicyOutcome {
                decision: Decision::Allow,
                matched_rule: rule.id.clone(),
                reason: format!("{} (explicit high-risk override)", reason),
                severity: AuditSeverity::Elevated,
                explicit_override: true,
            };
        }

        PolicyOutcome {
            decision: Decision::Allow,
            matched_rule: rule.id.clone(),
            reason,
            severity: AuditSeverity::Info,
            explicit_override: false,
        }
    }

    /// Exact actor + exact tool + exact scope.
    fn is_explicit_triple(rule: &PolicyRule) -> bool {
        matches!(&rule.subject, Subject::Actor(p) if PatternMatcher::is_literal(p))
            && PatternMatcher::is_literal(&rule.tool)
            && PatternMatcher::is_literal(&rule.scope)
    }
}
