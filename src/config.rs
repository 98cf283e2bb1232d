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

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::engine_core::constants::config as keys;
use crate::engine_core::errors::GateError;
use crate::engine_core::gate_core::GateSettings;
use crate::engine_core::models::PolicyDefinition;
use crate::utils::policy_validator::PolicyValidator;

/// Policy used when no policy file is configured.
const BUNDLED_POLICY: &str = include_str!("../policies/default.yaml");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub policy_path: Option<PathBuf>,
    /// Ledger file; `None` keeps the chain in memory
    pub ledger_path: Option<PathBuf>,
    pub log_level: String,
    pub log_format: String, // "json" or "text"
    pub approval_ttl_secs: u64,
    pub exec_timeout_ms: u64,
    pub sweep_interval_ms: u64,
    /// Hosts `webhook_post` may reach
    pub webhook_allowlist: Vec<String>,
}

fn parse_var<T: FromStr>(key: &str, default: T) -> Result<T, GateError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| {
            GateError::Configuration(format!("{} must be a non-negative integer, got '{}'", key, raw))
        }),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, GateError> {
        let config = Self {
            policy_path: env::var(keys::ENV_POLICY_PATH).ok().map(PathBuf::from),
            ledger_path: env::var(keys::ENV_LEDGER_PATH).ok().map(PathBuf::from),
            log_level: env::var(keys::ENV_LOG_LEVEL).unwrap_or_else(|_| "info".to_string()),
            log_format: env::var(keys::ENV_LOG_FORMAT).unwrap_or_else(|_| "text".to_string()),
            approval_ttl_secs: parse_var(keys::ENV_APPROVAL_TTL_SECS, keys::DEFAULT_APPROVAL_TTL_SECS)?,
            exec_timeout_ms: parse_var(keys::ENV_EXEC_TIMEOUT_MS, keys::DEFAULT_EXEC_TIMEOUT_MS)?,
            sweep_interval_ms: parse_var(keys::ENV_SWEEP_INTERVAL_MS, keys::DEFAULT_SWEEP_INTERVAL_MS)?,
            webhook_allowlist: env::var(keys::ENV_WEBHOOK_ALLOWLIST)
                .ok()
                .map(|s| {
                    s.split(',')
                        .map(|h| h.trim().to_lowercase())
                        .filter(|h| !h.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        };
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<(), GateError> {
        if self.approval_ttl_secs == 0 {
            return Err(GateError::Configuration(format!(
                "{} must be greater than zero",
                keys::ENV_APPROVAL_TTL_SECS
            )));
        }
        if self.exec_timeout_ms == 0 || self.sweep_interval_ms == 0 {
            return Err(GateError::Configuration(
                "timeouts and intervals must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn gate_settings(&self) -> GateSettings {
        GateSettings {
            approval_ttl_secs: self.approval_ttl_secs,
            exec_timeout: Duration::from_millis(self.exec_timeout_ms),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Load and validate the configured policy, or the bundled default.
    pub fn load_policy(&self) -> Result<PolicyDefinition, GateError> {
        match &self.policy_path {
            Some(path) => load_policy_file(path),
            None => {
                info!("No policy file configured, using bundled default");
                parse_policy(BUNDLED_POLICY)
            }
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            policy_path: None,
            ledger_path: None,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            approval_ttl_secs: keys::DEFAULT_APPROVAL_TTL_SECS,
            exec_timeout_ms: keys::DEFAULT_EXEC_TIMEOUT_MS,
            sweep_interval_ms: keys::DEFAULT_SWEEP_INTERVAL_MS,
            webhook_allowlist: Vec::new(),
        }
    }
}

/// Parse and validate a YAML policy document.
pub fn parse_policy(yaml: &str) -> Result<PolicyDefinition, GateError> {
    let policy: PolicyDefinition = serde_yaml_ng::from_str(yaml)
        .map_err(|e| GateError::Configuration(format!("Invalid policy YAML: {}", e)))?;
    PolicyValidator::validate_policy(&policy)?;
    Ok(policy)
}

pub fn load_policy_file(path: &Path) -> Result<PolicyDefinition, GateError> {
    let yaml = std::fs::read_to_string(path).map_err(|e| {
        GateError::Configuration(format!("Cannot read policy {}: {}", path.display(), e))
    })?;
    let policy = parse_policy(&yaml)?;
    info!(path = %path.display(), policy = %policy.name, rules = policy.rules.len(), "Loaded policy");
    Ok(policy)
}
