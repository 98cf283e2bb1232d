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

// Domain error types - every rejection stays traceable to a rule, pattern or constraint

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::engine_core::models::InvocationState;

/// Main error type for the gate
#[derive(Error, Debug)]
pub enum GateError {
    /// Malformed call. Recoverable: the actor may resubmit.
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Content-level injection risk
    #[error("Injection detected: {0}")]
    InjectionDetected(String),

    /// Authorization failure, terminal for the invocation
    #[error("Policy denied ({rule}): {reason}")]
    PolicyDenied { rule: String, reason: String },

    /// Approval race loser
    #[error("Ticket {ticket} already decided ({state})")]
    AlreadyDecided {
        ticket: String,
        state: InvocationState,
    },

    /// Ledger unavailable. Blocks forward progress of the affected invocation.
    #[error("Audit chain I/O error: {0}")]
    ChainIo(String),

    /// Tool-level failure
    #[error("Execution failure: {0}")]
    ExecutionFailure(String),

    /// Execution exceeded its bound
    #[error("Execution timed out after {0} ms")]
    Timeout(u64),

    /// Transition not permitted by the state machine
    #[error("Invalid transition {from} -> {to}")]
    InvalidTransition {
        from: InvocationState,
        to: InvocationState,
    },

    /// Unknown invocation or ticket
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration or policy file error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// I/O Error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GateError {
    /// Serializable tag for decision records.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GateError::Schema(_) => ErrorKind::SchemaError,
            GateError::InjectionDetected(_) => ErrorKind::InjectionDetected,
            GateError::PolicyDenied { .. } => ErrorKind::PolicyDenied,
            GateError::AlreadyDecided { .. } => ErrorKind::AlreadyDecided,
            GateError::ChainIo(_) => ErrorKind::ChainIoError,
            GateError::ExecutionFailure(_) => ErrorKind::ExecutionFailure,
            GateError::Timeout(_) => ErrorKind::Timeout,
            GateError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            GateError::NotFound(_) => ErrorKind::NotFound,
            GateError::Configuration(_) | GateError::Io(_) => ErrorKind::Internal,
        }
    }

    /// Get user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            GateError::Schema(e) => format!("Invalid tool arguments: {}", e),
            GateError::InjectionDetected(reason) => format!("Unsafe content: {}", reason),
            GateError::PolicyDenied { rule, reason } => {
                format!("Blocked by policy rule '{}': {}", rule, reason)
            }
            GateError::AlreadyDecided { state, .. } => {
                format!("This request was already resolved ({})", state)
            }
            GateError::ChainIo(_) => "Audit ledger unavailable; request not processed".to_string(),
            GateError::ExecutionFailure(reason) => format!("Tool failed: {}", reason),
            GateError::Timeout(ms) => format!("Tool timed out after {} ms", ms),
            GateError::InvalidTransition { .. } => "Request is not in a valid state".to_string(),
            GateError::NotFound(what) => format!("Not found: {}", what),
            GateError::Configuration(_) | GateError::Io(_) => "Internal error".to_string(),
        }
    }

    /// Only chain failures block; everything else resolves into a terminal state.
    pub fn is_blocking(&self) -> bool {
        matches!(self, GateError::ChainIo(_))
    }
}

/// Error taxonomy tag carried by decision records and the wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SchemaError,
    InjectionDetected,
    PolicyDenied,
    AlreadyDecided,
    ChainIoError,
    ExecutionFailure,
    Timeout,
    InvalidTransition,
    NotFound,
    Internal,
}

/// A schema violation naming the offending field and the violated constraint.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("field '{field}': {violation}")]
pub struct SchemaError {
    pub field: String,
    pub violation: Violation,
}

impl SchemaError {
    pub fn new(field: impl Into<String>, violation: Violation) -> Self {
        Self {
            field: field.into(),
            violation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    Missing,
    TypeMismatch { expected: String, found: String },
    OutOfRange { value: f64, min: Option<f64>, max: Option<f64> },
    TooShort { length: usize, min: usize },
    TooLong { length: usize, max: usize },
    NotAllowed { value: String, allowed: Vec<String> },
    Malformed { reason: String },
    UnknownField,
    UnknownTool,
    NotAnObject,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::Missing => write!(f, "required field is missing"),
            Violation::TypeMismatch { expected, found } => {
                write!(f, "expected {}, found {}", expected, found)
            }
            Violation::OutOfRange { value, min, max } => {
                write!(f, "value {} out of range", value)?;
                match (min, max) {
                    (Some(lo), Some(hi)) => write!(f, " [{}, {}]", lo, hi),
                    (Some(lo), None) => write!(f, " (minimum {})", lo),
                    (None, Some(hi)) => write!(f, " (maximum {})", hi),
                    (None, None) => Ok(()),
                }
            }
            Violation::TooShort { length, min } => {
                write!(f, "length {} below minimum {}", length, min)
            }
            Violation::TooLong { length, max } => {
                write!(f, "length {} above maximum {}", length, max)
            }
            Violation::NotAllowed { value, allowed } => {
                write!(f, "'{}' not one of [{}]", value, allowed.join(", "))
            }
            Violation::Malformed { reason } => write!(f, "malformed value: {}", reason),
            Violation::UnknownField => write!(f, "field is not declared by the tool"),
            Violation::UnknownTool => write!(f, "tool is not registered"),
            Violation::NotAnObject => write!(f, "arguments must be a JSON object"),
        }
    }
}
