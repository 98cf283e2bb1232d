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

//! Wiring a gate from configuration.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::engine_core::audit::AuditChain;
use crate::engine_core::errors::GateError;
use crate::engine_core::gate_core::GateCore;
use crate::engine_core::models::PolicyDefinition;
use crate::engine_core::store::{JsonlStore, MemoryStore};
use crate::engine_core::traits::ChainStore;
use crate::tools;
use crate::utils::policy_validator::PolicyValidator;

/// Open the configured ledger: the JSON-lines file if one is set,
/// otherwise an in-memory chain.
pub async fn open_chain(config: &Config) -> Result<Arc<AuditChain>, GateError> {
    let store: Arc<dyn ChainStore> = match &config.ledger_path {
        Some(path) => {
            info!(path = %path.display(), "Opening ledger");
            Arc::new(JsonlStore::open(path)?)
        }
        None => {
            info!("No ledger path configured, audit chain is in memory only");
            Arc::new(MemoryStore::new())
        }
    };
    let chain = AuditChain::open(store).await?;
    info!(entries = chain.len().await, head = %chain.head().await, "Ledger ready");
    Ok(Arc::new(chain))
}

/// Build a gate with the built-in tools over an opened chain.
pub fn build_gate(
    config: &Config,
    policy: &PolicyDefinition,
    chain: Arc<AuditChain>,
) -> Result<GateCore, GateError> {
    let registry = tools::default_registry(&config.webhook_allowlist);
    let known: HashSet<String> = registry.definitions().into_iter().map(|d| d.name).collect();
    PolicyValidator::validate_tool_names(policy, &known)?;
    GateCore::new(policy, registry, chain, config.gate_settings())
}
