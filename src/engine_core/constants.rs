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

//! toolgate Constants - Single source of truth for all configuration values.
//!
//! This module centralizes magic numbers, rule identifiers, and configuration
//! keys so the gate, the CLI and the tests agree on them.

/// Audit chain constants
pub mod chain {
    /// `prev_hash` of the first entry in every ledger (64 hex zeros).
    pub const GENESIS_HASH: &str =
        "0000000000000000000000000000000000000000000000000000000000000000";
    /// Length of a hex-encoded SHA-256 digest
    pub const HASH_HEX_LENGTH: usize = 64;
}

/// Policy evaluation constants
pub mod policy {
    /// Rule id reported when nothing matched
    pub const DEFAULT_DENY_RULE: &str = "default-deny";
    /// Rule id reported when a high severity finding forced the decision
    pub const INJECTION_FLOOR_RULE: &str = "firewall-floor";
    /// Prefix of rules compiled from `role_permissions`
    pub const ROLE_DEFAULT_PREFIX: &str = "role-default";
    /// Priority assigned to compiled role-default rules; explicit rules must sit above it
    pub const ROLE_DEFAULT_PRIORITY: i64 = i64::MIN;
}

/// Firewall constants
pub mod firewall {
    /// Minimum length of a base64 run considered an encoded payload
    pub const MIN_ENCODED_RUN: usize = 24;
    /// Maximum characters of matched text kept in a finding excerpt
    pub const EXCERPT_CHARS: usize = 80;
    /// Redaction marker prefix, completed as `[REDACTED:<class>]`
    pub const REDACTION_PREFIX: &str = "[REDACTED:";
}

/// Spotlighting delimiters for evidence handed back to the planner
pub mod spotlight {
    /// Start delimiter prefix
    pub const DATA_START_PREFIX: &str = "<<<TOOLGATE_EVIDENCE_START:";
    /// End delimiter prefix
    pub const DATA_END_PREFIX: &str = "<<<TOOLGATE_EVIDENCE_END:";
    /// Delimiter suffix
    pub const DELIMITER_SUFFIX: &str = ">>>";
    /// Random ID length for spotlighting delimiters
    pub const RANDOM_ID_LENGTH: usize = 8;
}

/// Configuration Environment Variables
pub mod config {
    pub const ENV_POLICY_PATH: &str = "TOOLGATE_POLICY_PATH";
    pub const ENV_LEDGER_PATH: &str = "TOOLGATE_LEDGER_PATH";
    pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";
    pub const ENV_LOG_FORMAT: &str = "LOG_FORMAT";
    pub const ENV_APPROVAL_TTL_SECS: &str = "TOOLGATE_APPROVAL_TTL_SECS";
    pub const ENV_EXEC_TIMEOUT_MS: &str = "TOOLGATE_EXEC_TIMEOUT_MS";
    pub const ENV_SWEEP_INTERVAL_MS: &str = "TOOLGATE_SWEEP_INTERVAL_MS";
    pub const ENV_WEBHOOK_ALLOWLIST: &str = "TOOLGATE_WEBHOOK_ALLOWLIST";

    pub const DEFAULT_APPROVAL_TTL_SECS: u64 = 900;
    pub const DEFAULT_EXEC_TIMEOUT_MS: u64 = 15_000;
    pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 5_000;
}

/// Limits (DoS Protection)
pub mod limits {
    /// Maximum allowed request line size on the stdio surface (1 MB)
    pub const MAX_MESSAGE_SIZE_BYTES: u64 = 1024 * 1024;
    /// Maximum characters of a tool result or argument kept in an audit payload
    pub const MAX_AUDIT_TEXT_CHARS: usize = 2_000;
    /// Maximum characters of a webhook response preview
    pub const WEBHOOK_PREVIEW_CHARS: usize = 300;
}
