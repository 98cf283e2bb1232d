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

//! Seams between the gate and the outside world.
//!
//! `ChainStore` is the durable side of the audit chain; `Tool` is the call
//! contract every registered tool implementation satisfies.

use async_trait::async_trait;
use serde_json::Value;

use crate::engine_core::errors::GateError;
use crate::engine_core::models::{Actor, InvocationId, ToolDefinition};
use crate::engine_core::types::ValidatedArgs;

/// Durable storage for serialized audit entries.
///
/// Implementations must persist lines in call order and report failure
/// rather than buffer silently: a line is committed only once `persist`
/// returns `Ok`.
#[async_trait]
pub trait ChainStore: Send + Sync {
    /// Durably append one serialized entry.
    async fn persist(&self, line: &str) -> Result<(), GateError>;

    /// Every stored line in append order.
    async fn load(&self) -> Result<Vec<String>, GateError>;
}

/// Context handed to a tool alongside its validated arguments.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub invocation_id: InvocationId,
    pub actor: Actor,
    pub scope: String,
}

/// Structured failure reported by a tool implementation.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolFailure {
    pub reason: String,
}

impl ToolFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for ToolFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.reason)
    }
}

/// A tool implementation registered by name against its definition.
#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    async fn invoke(&self, args: ValidatedArgs, ctx: ToolContext) -> Result<Value, ToolFailure>;
}
