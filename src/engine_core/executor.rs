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

//! Tool registry and executor.
//!
//! The executor carries no authorization logic. Its only entry point takes
//! an [`ExecutionPermit`], which the state machine mints when an invocation
//! is audited into `EXECUTING`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::engine_core::errors::ErrorKind;
use crate::engine_core::models::{ToolDefinition, ToolOverride};
use crate::engine_core::state::ExecutionPermit;
use crate::engine_core::traits::Tool;

/// What a dispatch produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Completed { result: Value },
    Failed { error: ErrorKind, reason: String },
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Completed { .. })
    }
}

struct Registered {
    definition: ToolDefinition,
    tool: Arc<dyn Tool>,
}

/// Tools registered by name against their (policy adjusted) definitions.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Registered>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let definition = tool.definition();
        debug!(tool = %definition.name, risk = ?definition.risk, "Registered tool");
        self.tools
            .insert(definition.name.clone(), Registered { definition, tool });
    }

    /// Layer the policy file's per-tool overrides over the built-in definitions.
    pub fn apply_overrides(&mut self, overrides: &BTreeMap<String, ToolOverride>) {
        for (name, over) in overrides {
            match self.tools.get_mut(name) {
                Some(entry) => entry.definition.apply_override(over),
                None => warn!(tool = %name, "Override names an unregistered tool"),
            }
        }
    }

    pub fn definition(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name).map(|r| &r.definition)
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> =
            self.tools.values().map(|r| r.definition.clone()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(|r| r.tool.clone())
    }
}

pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run the permitted call. Tool errors, panics and hangs all come back
    /// as `Failed`; this never returns an error to the pipeline.
    pub(crate) async fn dispatch(&self, permit: ExecutionPermit) -> ExecutionOutcome {
        let invocation_id = permit.invocation_id();
        let (name, args, ctx) = permit.into_parts();

        let Some(tool) = self.registry.get(&name) else {
            return ExecutionOutcome::Failed {
                error: ErrorKind::ExecutionFailure,
                reason: format!("tool '{}' has no implementation", name),
            };
        };

        let handle = tokio::spawn(async move { tool.invoke(args, ctx).await });
        let abort = handle.abort_handle();

        let outcome = match tokio::time::timeout(self.timeout, handle).await {
            Ok(Ok(Ok(result))) => ExecutionOutcome::Completed { result },
            Ok(Ok(Err(failure))) => ExecutionOutcome::Failed {
                error: ErrorKind::ExecutionFailure,
                reason: failure.reason,
            },
            Ok(Err(join_error)) => ExecutionOutcome::Failed {
                error: ErrorKind::ExecutionFailure,
                reason: if join_error.is_panic() {
                    "tool panicked".to_string()
                } else {
                    "tool task was cancelled".to_string()
                },
            },
            Err(_) => {
                abort.abort();
                ExecutionOutcome::Failed {
                    error: ErrorKind::Timeout,
                    reason: format!("timed out after {} ms", self.timeout.as_millis()),
                }
            }
        };

        match &outcome {
            ExecutionOutcome::Completed { .. } => {
                info!(%invocation_id, tool = %name, "Tool completed")
            }
            ExecutionOutcome::Failed { error, reason } => {
                warn!(%invocation_id, tool = %name, ?error, %reason, "Tool failed")
            }
        }
        outcome
    }
}
