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

//! Domain models for the toolgate pipeline.
//!
//! This module contains pure data structures representing actors, tools,
//! policies, invocations and decisions. It is free of I/O side effects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::engine_core::errors::{ErrorKind, GateError};

// --- Identifiers ---

macro_rules! uuid_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(Uuid);

        impl $name {
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map($name)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0.to_string()
            }
        }

        impl TryFrom<String> for $name {
            type Error = uuid::Error;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                Uuid::parse_str(&s).map($name)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_newtype!(
    /// Immutable identifier of one planner-proposed tool call
    InvocationId
);
uuid_newtype!(
    /// Identifier of an approval ticket
    TicketId
);

// --- Actors ---

/// Fixed role set. Privilege order: Admin ⊇ Researcher ⊇ Viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    Viewer,
    Researcher,
    Admin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Viewer, Role::Researcher, Role::Admin];

    fn rank(self) -> u8 {
        match self {
            Role::Viewer => 0,
            Role::Researcher => 1,
            Role::Admin => 2,
        }
    }

    /// True when `self` holds at least the privileges of `other`.
    pub fn includes(self, other: Role) -> bool {
        self.rank() >= other.rank()
    }
}

impl FromStr for Role {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "researcher" => Ok(Role::Researcher),
            "viewer" => Ok(Role::Viewer),
            other => Err(GateError::Configuration(format!("unknown role '{}'", other))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Admin => "Admin",
            Role::Researcher => "Researcher",
            Role::Viewer => "Viewer",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self { id: id.into(), role }
    }
}

// --- Tools ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffect {
    ReadOnly,
    Mutating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
    Email,
    Url,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FieldKind::String => "string",
            FieldKind::Integer => "integer",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::Object => "object",
            FieldKind::Array => "array",
            FieldKind::Email => "email",
            FieldKind::Url => "url",
        };
        f.write_str(s)
    }
}

/// Input contract of a single argument field
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<String>>,
    /// Value is externally sourced text and must pass the context firewall
    #[serde(default)]
    pub external: bool,
}

impl FieldSpec {
    pub fn required(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            required: true,
            default: None,
            min_length: None,
            max_length: None,
            minimum: None,
            maximum: None,
            allowed: None,
            external: false,
        }
    }

    pub fn optional(name: &str, kind: FieldKind) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind)
        }
    }

    pub fn length(mut self, min: usize, max: usize) -> Self {
        self.min_length = Some(min);
        self.max_length = Some(max);
        self
    }

    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.minimum = Some(min);
        self.maximum = Some(max);
        self
    }

    pub fn with_default(mut self, value: serde_json::Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn one_of(mut self, allowed: &[&str]) -> Self {
        self.allowed = Some(allowed.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn external(mut self) -> Self {
        self.external = true;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub fields: Vec<FieldSpec>,
    pub risk: RiskTier,
    pub side_effect: SideEffect,
    #[serde(default)]
    pub requires_approval: bool,
    #[serde(default)]
    pub allow_unknown_fields: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_ttl_secs: Option<u64>,
}

impl ToolDefinition {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Apply a policy-level override (risk, approval requirement, ticket TTL).
    pub fn apply_override(&mut self, over: &ToolOverride) {
        if let Some(risk) = over.risk {
            self.risk = risk;
        }
        if let Some(requires) = over.requires_approval {
            self.requires_approval = requires;
        }
        if over.approval_ttl_secs.is_some() {
            self.approval_ttl_secs = over.approval_ttl_secs;
        }
    }
}

// --- Policy ---

/// Policy evaluation decision result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Allow,
    Deny,
    RequireApproval,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Decision::Allow => "ALLOW",
            Decision::Deny => "DENY",
            Decision::RequireApproval => "REQUIRE_APPROVAL",
        };
        f.write_str(s)
    }
}

/// Who a rule applies to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subject {
    Any,
    Role(Role),
    MinRole(Role),
    Actor(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    pub id: String,
    #[serde(default)]
    pub priority: i64,
    #[serde(with = "serde_yaml_ng::with::singleton_map")]
    pub subject: Subject,
    #[serde(default = "wildcard")]
    pub tool: String,
    #[serde(default = "wildcard")]
    pub scope: String,
    pub decision: Decision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

fn wildcard() -> String {
    "*".to_string()
}

/// Per-tool settings layered over the tool's built-in definition
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolOverride {
    #[serde(default)]
    pub risk: Option<RiskTier>,
    #[serde(default)]
    pub requires_approval: Option<bool>,
    #[serde(default)]
    pub approval_ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectionResponse {
    /// Redact matched spans and continue
    Strip,
    /// Leave findings unresolved; high severity findings deny
    #[default]
    Deny,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternSpec {
    pub class: PatternClass,
    pub regex: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirewallSettings {
    #[serde(default)]
    pub injection_response: InjectionResponse,
    /// Extra patterns layered over the built-in classes
    #[serde(default)]
    pub patterns: Vec<PatternSpec>,
    #[serde(default = "default_true")]
    pub builtin_patterns: bool,
}

impl Default for FirewallSettings {
    fn default() -> Self {
        Self {
            injection_response: InjectionResponse::Deny,
            patterns: Vec::new(),
            builtin_patterns: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_reviewer_roles() -> Vec<Role> {
    vec![Role::Admin]
}

/// Policy definition, usually loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyDefinition {
    pub name: String,
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
    /// Role -> tool patterns allowed by default (inherited upward)
    #[serde(default)]
    pub role_permissions: BTreeMap<Role, Vec<String>>,
    #[serde(default = "default_reviewer_roles")]
    pub reviewer_roles: Vec<Role>,
    #[serde(default)]
    pub tools: BTreeMap<String, ToolOverride>,
    #[serde(default)]
    pub firewall: FirewallSettings,
}

impl Default for PolicyDefinition {
    fn default() -> Self {
        Self {
            name: "deny-all".to_string(),
            version: 1,
            rules: Vec::new(),
            role_permissions: BTreeMap::new(),
            reviewer_roles: default_reviewer_roles(),
            tools: BTreeMap::new(),
            firewall: FirewallSettings::default(),
        }
    }
}

// --- Firewall findings ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternClass {
    InstructionOverride,
    RoleReassignment,
    Exfiltration,
    ToolHijack,
    EncodedPayload,
}

impl PatternClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternClass::InstructionOverride => "instruction_override",
            PatternClass::RoleReassignment => "role_reassignment",
            PatternClass::Exfiltration => "exfiltration",
            PatternClass::ToolHijack => "tool_hijack",
            PatternClass::EncodedPayload => "encoded_payload",
        }
    }

    pub fn default_severity(&self) -> Severity {
        match self {
            PatternClass::EncodedPayload => Severity::Medium,
            _ => Severity::High,
        }
    }
}

impl fmt::Display for PatternClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingAction {
    Flagged,
    Stripped,
}

/// Byte range `[start, end)` in the scanned text
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn union(&self, other: &Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InjectionFinding {
    /// Where the text came from, e.g. `evidence[0]` or `arg:body`
    pub source: String,
    pub span: Span,
    pub class: PatternClass,
    pub severity: Severity,
    pub action: FindingAction,
    pub excerpt: String,
}

impl InjectionFinding {
    pub fn is_unresolved(&self) -> bool {
        self.action == FindingAction::Flagged
    }
}

// --- Invocations ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvocationState {
    Created,
    Validated,
    Scanned,
    PolicyEvaluated,
    PendingApproval,
    Approved,
    Rejected,
    Expired,
    Executing,
    Completed,
    Failed,
    Audited,
}

impl InvocationState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InvocationState::Rejected | InvocationState::Expired | InvocationState::Audited
        )
    }
}

impl fmt::Display for InvocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InvocationState::Created => "CREATED",
            InvocationState::Validated => "VALIDATED",
            InvocationState::Scanned => "SCANNED",
            InvocationState::PolicyEvaluated => "POLICY_EVALUATED",
            InvocationState::PendingApproval => "PENDING_APPROVAL",
            InvocationState::Approved => "APPROVED",
            InvocationState::Rejected => "REJECTED",
            InvocationState::Expired => "EXPIRED",
            InvocationState::Executing => "EXECUTING",
            InvocationState::Completed => "COMPLETED",
            InvocationState::Failed => "FAILED",
            InvocationState::Audited => "AUDITED",
        };
        f.write_str(s)
    }
}

/// One proposed tool call as emitted by the planner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub actor: Actor,
    pub tool: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
    pub scope: String,
    /// Retrieved passages or document excerpts that informed the call
    #[serde(default)]
    pub evidence: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invocation {
    pub id: InvocationId,
    pub actor: Actor,
    pub tool: String,
    pub arguments: serde_json::Value,
    pub scope: String,
    pub created_at: DateTime<Utc>,
    pub state: InvocationState,
    #[serde(default)]
    pub findings: Vec<InjectionFinding>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Approve,
    Reject,
}

/// Reviewer action arriving from the review surface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewerDecision {
    pub reviewer: Actor,
    pub verdict: Verdict,
    #[serde(default)]
    pub rationale: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalTicket {
    pub id: TicketId,
    pub invocation_id: InvocationId,
    pub requested_by: Actor,
    pub tool: String,
    pub created_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub status: TicketStatus,
    #[serde(default)]
    pub reviewer: Option<String>,
    #[serde(default)]
    pub verdict: Option<Verdict>,
    #[serde(default)]
    pub rationale: Option<String>,
    #[serde(default)]
    pub decided_at: Option<DateTime<Utc>>,
}

impl ApprovalTicket {
    pub fn is_open(&self) -> bool {
        self.status == TicketStatus::Pending
    }
}

// --- Audit ---

/// Pipeline stage recorded by an audit entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditStage {
    ValidationRejected,
    PolicyEvaluated,
    PendingApproval,
    Approved,
    Rejected,
    Expired,
    Cancelled,
    Executing,
    Completed,
    Failed,
}

impl fmt::Display for AuditStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        f.write_str(&s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
    Info,
    Elevated,
    Alert,
}

/// Outcome handed back to the planner for every submitted call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub invocation_id: InvocationId,
    pub status: InvocationState,
    pub reason: String,
    pub audit_seq: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_rule: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<TicketId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub findings: Vec<InjectionFinding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    /// Screened evidence wrapped in spotlight delimiters
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<String>,
}
